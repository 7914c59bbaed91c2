//! Typed, directed relationships between registered entities.
//!
//! A relationship is identified by its type name plus the natural keys of
//! its two endpoints, so at most one edge of a type joins a given pair.

use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::BoxStream;
use neo4rs::{query, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use imbi_core::{Entity, NoProperties};

use crate::client::{GraphClient, GraphError};
use crate::nodes::decode_entity;
use crate::paging::paged;
use crate::props::{map_to_bolt, row_map, row_value, to_bolt};

/// Stored on every edge when it is first created; used for ordering.
const CREATED_AT: &str = "created_at";

/// Which way to traverse from the anchor entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// anchor → other
    Outgoing,
    /// other → anchor
    Incoming,
}

/// A node reference by label and natural key.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRef {
    pub label: String,
    pub key: Value,
}

/// A directed edge with its decoded property payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship<P = NoProperties> {
    pub type_name: String,
    pub from: NodeRef,
    pub to: NodeRef,
    pub created_at: Option<DateTime<Utc>>,
    pub properties: P,
}

/// A relationship together with the entity at its far end.
#[derive(Debug, Clone, PartialEq)]
pub struct Related<B, P = NoProperties> {
    pub node: B,
    pub relationship: Relationship<P>,
}

impl GraphClient {
    /// Create (or refresh) the `type_name` edge from `from` to `to`.
    ///
    /// The stored payload is replaced by `properties` (empty for `None`);
    /// the original creation time is kept. Fails with
    /// [`GraphError::NotFound`] naming the missing endpoint.
    pub async fn create_relationship<A, B, P>(
        &self,
        from: &A,
        to: &B,
        type_name: &str,
        properties: Option<&P>,
    ) -> Result<(), GraphError>
    where
        A: Entity,
        B: Entity,
        P: Serialize,
    {
        validate_type_name(type_name)?;
        let (from_desc, to_desc) = (A::descriptor(), B::descriptor());
        let from_key = from.natural_key()?;
        let to_key = to.natural_key()?;
        let props = payload(properties)?;

        let cypher = format!(
            "OPTIONAL MATCH (a:{from_label} {{{from_field}: $from_key}})
             OPTIONAL MATCH (b:{to_label} {{{to_field}: $to_key}})
             FOREACH (_x IN CASE WHEN a IS NOT NULL AND b IS NOT NULL THEN [1] ELSE [] END |
               MERGE (a)-[r:{type_name}]->(b)
               SET r = $props, r.{CREATED_AT} = coalesce(r.{CREATED_AT}, $now))
             RETURN a IS NOT NULL AS from_exists, b IS NOT NULL AS to_exists",
            from_label = from_desc.label,
            from_field = from_desc.natural_key,
            to_label = to_desc.label,
            to_field = to_desc.natural_key,
        );

        let q = query(&cypher)
            .param("from_key", to_bolt(&from_key))
            .param("to_key", to_bolt(&to_key))
            .param("props", map_to_bolt(&props))
            .param("now", Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true));

        let row = self.handle().await?.query_one(q).await?;
        let (from_exists, to_exists) = match row {
            Some(row) => (
                row_value::<bool>(&row, "from_exists")?,
                row_value::<bool>(&row, "to_exists")?,
            ),
            None => (false, false),
        };

        if !from_exists {
            return Err(GraphError::NotFound {
                label: from_desc.label.to_string(),
                field: from_desc.natural_key.to_string(),
                value: from_key,
            });
        }
        if !to_exists {
            return Err(GraphError::NotFound {
                label: to_desc.label.to_string(),
                field: to_desc.natural_key.to_string(),
                value: to_key,
            });
        }

        tracing::debug!(
            from = %from_key,
            to = %to_key,
            rel_type = type_name,
            "Created relationship"
        );
        Ok(())
    }

    /// Lazily stream `type_name` edges between `anchor` and entities of
    /// type `B`, oldest edge first (ties broken by the far end's key).
    pub async fn fetch_relationships<A, B, P>(
        &self,
        anchor: &A,
        type_name: &str,
        direction: Direction,
    ) -> Result<BoxStream<'static, Result<Related<B, P>, GraphError>>, GraphError>
    where
        A: Entity,
        B: Entity,
        P: DeserializeOwned + Send + 'static,
    {
        validate_type_name(type_name)?;
        let (anchor_desc, other_desc) = (A::descriptor(), B::descriptor());
        let anchor_key = anchor.natural_key()?;

        let pattern = match direction {
            Direction::Outgoing => format!("(a)-[r:{type_name}]->(b:{})", other_desc.label),
            Direction::Incoming => format!("(a)<-[r:{type_name}]-(b:{})", other_desc.label),
        };
        let cypher = format!(
            "MATCH (a:{anchor_label} {{{anchor_field}: $anchor_key}})
             MATCH {pattern}
             RETURN properties(b) AS props, properties(r) AS rel
             ORDER BY r.{CREATED_AT} ASC, b.{other_field} ASC
             SKIP $skip LIMIT $limit",
            anchor_label = anchor_desc.label,
            anchor_field = anchor_desc.natural_key,
            other_field = other_desc.natural_key,
        );

        let anchor_ref = NodeRef {
            label: anchor_desc.label.to_string(),
            key: anchor_key.clone(),
        };
        let type_name = type_name.to_string();
        let params = vec![("anchor_key".to_string(), to_bolt(&anchor_key))];

        Ok(paged(self.handle().await?, cypher, params, move |row: Row| {
            decode_related::<B, P>(row, &anchor_ref, &type_name, direction)
        }))
    }

    /// Remove the `type_name` edge from `from` to `to`. Absent edges are
    /// not an error.
    pub async fn delete_relationship<A: Entity, B: Entity>(
        &self,
        from: &A,
        to: &B,
        type_name: &str,
    ) -> Result<(), GraphError> {
        validate_type_name(type_name)?;
        let (from_desc, to_desc) = (A::descriptor(), B::descriptor());
        let from_key = from.natural_key()?;
        let to_key = to.natural_key()?;

        let cypher = format!(
            "MATCH (a:{from_label} {{{from_field}: $from_key}})-[r:{type_name}]->(b:{to_label} {{{to_field}: $to_key}})
             DELETE r",
            from_label = from_desc.label,
            from_field = from_desc.natural_key,
            to_label = to_desc.label,
            to_field = to_desc.natural_key,
        );
        let q = query(&cypher)
            .param("from_key", to_bolt(&from_key))
            .param("to_key", to_bolt(&to_key));

        self.handle().await?.run(q).await?;
        tracing::debug!(from = %from_key, to = %to_key, rel_type = type_name, "Deleted relationship");
        Ok(())
    }
}

/// Relationship type names are interpolated into Cypher, so only
/// `[A-Z][A-Z0-9_]*` is accepted.
pub fn validate_type_name(type_name: &str) -> Result<(), GraphError> {
    let mut chars = type_name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(GraphError::InvalidIdentifier(type_name.to_string()))
    }
}

fn payload<P: Serialize>(properties: Option<&P>) -> Result<Map<String, Value>, GraphError> {
    let Some(properties) = properties else {
        return Ok(Map::new());
    };
    match serde_json::to_value(properties).map_err(|e| GraphError::Serialization(e.to_string()))? {
        Value::Object(map) => Ok(map
            .into_iter()
            .filter(|(key, value)| !value.is_null() && key != CREATED_AT)
            .collect()),
        Value::Null => Ok(Map::new()),
        other => Err(GraphError::Serialization(format!(
            "relationship properties must be an object, got {other}"
        ))),
    }
}

fn decode_related<B, P>(
    row: Row,
    anchor: &NodeRef,
    type_name: &str,
    direction: Direction,
) -> Result<Related<B, P>, GraphError>
where
    B: Entity,
    P: DeserializeOwned,
{
    let mut rel = row_map(&row, "rel")?;
    let node: B = decode_entity(row)?;
    let other = NodeRef {
        label: B::label().to_string(),
        key: node.natural_key()?,
    };

    let created_at = match rel.remove(CREATED_AT) {
        None | Some(Value::Null) => None,
        Some(value) => {
            let parsed = value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .ok_or_else(|| {
                    GraphError::Serialization(format!("{type_name} has malformed {CREATED_AT}: {value}"))
                })?;
            Some(parsed.with_timezone(&Utc))
        }
    };
    let properties: P = serde_json::from_value(Value::Object(rel))
        .map_err(|e| GraphError::Serialization(format!("Failed to decode {type_name} properties: {e}")))?;

    let (from, to) = match direction {
        Direction::Outgoing => (anchor.clone(), other),
        Direction::Incoming => (other, anchor.clone()),
    };

    Ok(Related {
        node,
        relationship: Relationship {
            type_name: type_name.to_string(),
            from,
            to,
            created_at,
            properties,
        },
    })
}
