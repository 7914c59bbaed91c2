//! Integration tests for imbi-graph against a live Neo4j instance.
//!
//! Run with: cargo test --package imbi-graph --test integration -- --ignored
//!
//! Connection settings come from `IMBI__NEO4J__*` environment variables.
//! Skipped automatically if Neo4j is not available.

use chrono::Utc;
use futures::TryStreamExt;
use uuid::Uuid;

use serde_json::{json, Map, Value};

use imbi_core::{relationships, NoProperties, Organization, Role, Settings, Team};
use imbi_graph::{Direction, GraphClient, GraphError, Matcher, OrderBy, Relationship};

async fn connect_or_skip() -> Option<GraphClient> {
    let settings = Settings::load().unwrap_or_default();
    let client = GraphClient::new();
    match client.initialize(&settings.neo4j).await {
        Ok(()) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test (Neo4j not available): {e}");
            None
        }
    }
}

fn unique_slug(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

fn make_org(slug: &str) -> Organization {
    Organization {
        slug: slug.to_string(),
        name: format!("Org {slug}"),
        description: None,
        icon: None,
        created_at: Utc::now(),
        updated_at: None,
    }
}

fn make_team(slug: &str) -> Team {
    Team {
        slug: slug.to_string(),
        name: format!("Team {slug}"),
        description: Some("Platform engineering".to_string()),
        icon: None,
        created_at: Utc::now(),
        updated_at: None,
    }
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_create_and_fetch_round_trip() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let org = make_org(&unique_slug("acme"));

    client.create(&org).await.unwrap();
    let fetched: Organization = client
        .fetch(&Matcher::of(&org).unwrap())
        .await
        .unwrap()
        .expect("organization should exist");
    assert_eq!(fetched, org);

    client.delete(&org).await.unwrap();
    client.close().await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_numeric_and_boolean_fields_round_trip() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let role = Role {
        slug: unique_slug("admin"),
        name: "Administrator".to_string(),
        description: None,
        permissions: vec!["project:read".to_string(), "project:write".to_string()],
        priority: 100,
        is_system: true,
    };

    client.create(&role).await.unwrap();
    let fetched: Role = client
        .fetch_unique(&Matcher::of(&role).unwrap())
        .await
        .unwrap()
        .expect("role should exist");
    assert_eq!(fetched, role);
    assert_eq!(
        client
            .count::<Role>(&Matcher::new().eq("priority", 100).eq("slug", role.slug.as_str()))
            .await
            .unwrap(),
        1
    );

    client.delete(&role).await.unwrap();
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_duplicate_create_is_constraint_violation() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let org = make_org(&unique_slug("dup"));

    client.create(&org).await.unwrap();
    let err = client.create(&org).await.unwrap_err();
    match err {
        GraphError::ConstraintViolation { label, field, value } => {
            assert_eq!(label, "Organization");
            assert_eq!(field, "slug");
            assert_eq!(value, serde_json::json!(org.slug));
        }
        other => panic!("expected ConstraintViolation, got {other}"),
    }

    client.delete(&org).await.unwrap();
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_concurrent_create_single_winner() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let org = make_org(&unique_slug("race"));

    let (a, b) = tokio::join!(client.create(&org), client.create(&org));
    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(GraphError::ConstraintViolation { .. }))));

    let count = client
        .count::<Organization>(&Matcher::of(&org).unwrap())
        .await
        .unwrap();
    assert_eq!(count, 1);

    client.delete(&org).await.unwrap();
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_upsert_is_idempotent_and_merges() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let mut team = make_team(&unique_slug("upsert"));

    let stored = client.upsert(&team, &[]).await.unwrap();
    assert_eq!(stored, team);
    client.upsert(&team, &["slug"]).await.unwrap();

    // Omitted fields keep their stored values.
    team.description = None;
    team.name = "Renamed".to_string();
    let stored = client.upsert(&team, &["slug"]).await.unwrap();
    assert_eq!(stored.name, "Renamed");
    assert_eq!(stored.description.as_deref(), Some("Platform engineering"));

    let count = client
        .count::<Team>(&Matcher::of(&team).unwrap())
        .await
        .unwrap();
    assert_eq!(count, 1);

    client.delete(&team).await.unwrap();
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_delete_is_idempotent() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let org = make_org(&unique_slug("gone"));

    client.create(&org).await.unwrap();
    client.delete(&org).await.unwrap();
    client.delete(&org).await.unwrap();

    let fetched: Option<Organization> = client.fetch(&Matcher::of(&org).unwrap()).await.unwrap();
    assert!(fetched.is_none());
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_fetch_many_streams_in_order() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let name = unique_slug("bulk");
    let mut orgs: Vec<Organization> = (0..5)
        .map(|i| {
            let mut org = make_org(&format!("{name}-{i}"));
            org.name = name.clone();
            org
        })
        .collect();
    for org in &orgs {
        client.create(org).await.unwrap();
    }

    let fetched: Vec<Organization> = client
        .fetch_many(Matcher::new().eq("name", name.as_str()), OrderBy::desc("slug"))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    orgs.reverse();
    assert_eq!(fetched, orgs);

    let err = client
        .fetch_unique::<Organization>(&Matcher::new().eq("name", name.as_str()))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::MultipleResults { count: 5, .. }));

    for org in &orgs {
        client.delete(org).await.unwrap();
    }
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_team_managed_by_organization() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let org = make_org(&unique_slug("acme"));
    let team = make_team(&unique_slug("platform"));
    client.create(&org).await.unwrap();
    client.create(&team).await.unwrap();

    client
        .create_relationship(&team, &org, relationships::MANAGED_BY, None::<&NoProperties>)
        .await
        .unwrap();
    // A second create refreshes the same edge.
    client
        .create_relationship(&team, &org, relationships::MANAGED_BY, Some(&NoProperties {}))
        .await
        .unwrap();

    let related: Vec<_> = client
        .fetch_relationships::<Team, Organization, NoProperties>(
            &team,
            relationships::MANAGED_BY,
            Direction::Outgoing,
        )
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].node, org);
    assert_eq!(related[0].relationship.to.label, "Organization");
    assert_eq!(related[0].relationship.to.key, serde_json::json!(org.slug));
    assert!(related[0].relationship.created_at.is_some());

    let incoming: Vec<_> = client
        .fetch_relationships::<Organization, Team, NoProperties>(
            &org,
            relationships::MANAGED_BY,
            Direction::Incoming,
        )
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].relationship.from.key, serde_json::json!(team.slug));

    client
        .delete_relationship(&team, &org, relationships::MANAGED_BY)
        .await
        .unwrap();
    client
        .delete_relationship(&team, &org, relationships::MANAGED_BY)
        .await
        .unwrap();

    client.delete(&team).await.unwrap();
    client.delete(&org).await.unwrap();
}

async fn managed_by(client: &GraphClient, team: &Team) -> Relationship<Map<String, Value>> {
    let related: Vec<_> = client
        .fetch_relationships::<Team, Organization, Map<String, Value>>(
            team,
            relationships::MANAGED_BY,
            Direction::Outgoing,
        )
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(related.len(), 1);
    related.into_iter().next().unwrap().relationship
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_recreating_relationship_replaces_payload() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let org = make_org(&unique_slug("acme"));
    let team = make_team(&unique_slug("payload"));
    client.create(&org).await.unwrap();
    client.create(&team).await.unwrap();

    let payload = json!({"since": 2019}).as_object().cloned().unwrap();
    client
        .create_relationship(&team, &org, relationships::MANAGED_BY, Some(&payload))
        .await
        .unwrap();
    let first = managed_by(&client, &team).await;
    assert_eq!(first.properties.get("since"), Some(&json!(2019)));

    client
        .create_relationship(&team, &org, relationships::MANAGED_BY, None::<&NoProperties>)
        .await
        .unwrap();
    let second = managed_by(&client, &team).await;
    assert!(second.properties.is_empty(), "{:?}", second.properties);
    assert_eq!(second.created_at, first.created_at);

    client.delete(&team).await.unwrap();
    client.delete(&org).await.unwrap();
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_relationship_to_missing_endpoint_is_not_found() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let org = make_org(&unique_slug("lonely"));
    let ghost = make_team(&unique_slug("ghost"));
    client.create(&org).await.unwrap();

    let err = client
        .create_relationship(&ghost, &org, relationships::MANAGED_BY, None::<&NoProperties>)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::NotFound { ref label, .. } if label == "Team"));

    client.delete(&org).await.unwrap();
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_delete_cascades_relationships() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let org = make_org(&unique_slug("cascade"));
    let team = make_team(&unique_slug("cascade"));
    client.create(&org).await.unwrap();
    client.create(&team).await.unwrap();
    client
        .create_relationship(&team, &org, relationships::MANAGED_BY, None::<&NoProperties>)
        .await
        .unwrap();

    client.delete(&org).await.unwrap();

    let related: Vec<_> = client
        .fetch_relationships::<Team, Organization, NoProperties>(
            &team,
            relationships::MANAGED_BY,
            Direction::Outgoing,
        )
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert!(related.is_empty());

    client.delete(&team).await.unwrap();
}
