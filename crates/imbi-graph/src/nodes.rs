//! Typed node CRUD for registered entities.
//!
//! Every operation is a single Cypher statement, so a cancelled or failed
//! call leaves either no change or the complete change. Property names are
//! checked against the entity descriptor before they reach a query; values
//! are always bound as parameters.

use futures::stream::BoxStream;
use neo4rs::{query, BoltType, Query, Row};
use serde_json::{Map, Value};

use imbi_core::{Entity, EntityDescriptor};

use crate::client::{is_constraint_violation, GraphClient, GraphError};
use crate::paging::paged;
use crate::props::{map_to_bolt, row_map, row_value, to_bolt};

/// Field-equality predicates used to select nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matcher {
    predicates: Vec<(String, Value)>,
}

impl Matcher {
    /// Matches every node of the label.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality predicate.
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.predicates.push((field.to_string(), value.into()));
        self
    }

    /// Match on the natural key of `E`.
    pub fn key<E: Entity>(value: impl Into<Value>) -> Self {
        Self::new().eq(E::descriptor().natural_key, value)
    }

    /// Match the stored node of an entity instance.
    pub fn of<E: Entity>(entity: &E) -> Result<Self, GraphError> {
        Ok(Self::new().eq(E::descriptor().natural_key, entity.natural_key()?))
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn predicates(&self) -> &[(String, Value)] {
        &self.predicates
    }

    /// Render `WHERE ...` for node alias `n`, binding values as `$m<i>`.
    fn where_clause(
        &self,
        descriptor: &EntityDescriptor,
        params: &mut Vec<(String, BoltType)>,
    ) -> Result<String, GraphError> {
        if self.predicates.is_empty() {
            return Ok(String::new());
        }
        let mut conditions = Vec::with_capacity(self.predicates.len());
        for (i, (field, value)) in self.predicates.iter().enumerate() {
            check_field(descriptor, field)?;
            let param = format!("m{i}");
            conditions.push(format!("n.{field} = ${param}"));
            params.push((param, to_bolt(value)));
        }
        Ok(format!("WHERE {}", conditions.join(" AND ")))
    }
}

/// Sort direction for [`OrderBy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Result ordering for [`GraphClient::fetch_many`]. Ties are broken by the
/// natural key so the order is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortOrder,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortOrder::Ascending,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortOrder::Descending,
        }
    }

    /// Order by the natural key of `E`.
    pub fn natural_key<E: Entity>() -> Self {
        Self::asc(E::descriptor().natural_key)
    }
}

impl GraphClient {
    // ── Writes ───────────────────────────────────────────────────

    /// Insert a new node. Fails with [`GraphError::ConstraintViolation`]
    /// when the natural key is already taken; never overwrites.
    pub async fn create<E: Entity>(&self, entity: &E) -> Result<(), GraphError> {
        let descriptor = E::descriptor();
        entity.validate()?;
        let props = entity.to_properties()?;
        let key = key_value(descriptor, &props)?;

        let q = query(&format!("CREATE (n:{}) SET n = $props", descriptor.label))
            .param("props", map_to_bolt(&props));

        match self.handle().await?.run(q).await {
            Err(err) if is_constraint_violation(&err) => Err(GraphError::ConstraintViolation {
                label: descriptor.label.to_string(),
                field: descriptor.natural_key.to_string(),
                value: key,
            }),
            Err(err) => Err(err),
            Ok(()) => {
                tracing::debug!(label = descriptor.label, key = %key, "Created node");
                Ok(())
            }
        }
    }

    /// Create or update the node matching `constraint` fields of `entity`.
    ///
    /// Fields present on the entity overwrite stored values; fields it
    /// omits are left untouched. Returns the stored entity.
    pub async fn upsert<E: Entity>(&self, entity: &E, constraint: &[&str]) -> Result<E, GraphError> {
        let descriptor = E::descriptor();
        entity.validate()?;
        let props = entity.to_properties()?;
        let key = key_value(descriptor, &props)?;

        let constraint: Vec<&str> = if constraint.is_empty() {
            vec![descriptor.natural_key]
        } else {
            constraint.to_vec()
        };
        let mut pattern = Vec::with_capacity(constraint.len());
        let mut params = Vec::with_capacity(constraint.len() + 1);
        for (i, field) in constraint.iter().enumerate() {
            check_field(descriptor, field)?;
            let value = props.get(*field).ok_or_else(|| {
                imbi_core::ValidationError::new(
                    descriptor.label,
                    *field,
                    imbi_core::Violation::Missing,
                )
            })?;
            pattern.push(format!("{field}: $c{i}"));
            params.push((format!("c{i}"), to_bolt(value)));
        }
        params.push(("props".to_string(), map_to_bolt(&props)));

        let cypher = format!(
            "MERGE (n:{label} {{{pattern}}})
             SET n += $props
             RETURN properties(n) AS props",
            label = descriptor.label,
            pattern = pattern.join(", "),
        );

        let row = match self.handle().await?.query_one(bind(&cypher, &params)).await {
            Err(err) if is_constraint_violation(&err) => {
                return Err(GraphError::ConstraintViolation {
                    label: descriptor.label.to_string(),
                    field: descriptor.natural_key.to_string(),
                    value: key,
                })
            }
            other => other?,
        };
        let row = row.ok_or_else(|| {
            GraphError::Serialization(format!("MERGE on {} returned no row", descriptor.label))
        })?;

        tracing::debug!(label = descriptor.label, key = %key, "Upserted node");
        decode_entity(row)
    }

    /// Remove the node with the entity's natural key and its relationships.
    /// Deleting an absent node succeeds.
    pub async fn delete<E: Entity>(&self, entity: &E) -> Result<(), GraphError> {
        let descriptor = E::descriptor();
        let key = entity.natural_key()?;
        let q = query(&format!(
            "MATCH (n:{label}) WHERE n.{field} = $key
             DETACH DELETE n",
            label = descriptor.label,
            field = descriptor.natural_key,
        ))
        .param("key", to_bolt(&key));

        self.handle().await?.run(q).await?;
        tracing::debug!(label = descriptor.label, key = %key, "Deleted node");
        Ok(())
    }

    // ── Reads ────────────────────────────────────────────────────

    /// The first node matching `matcher` (by natural key order), or `None`.
    pub async fn fetch<E: Entity>(&self, matcher: &Matcher) -> Result<Option<E>, GraphError> {
        let rows = self.fetch_rows::<E>(matcher, 1).await?;
        rows.into_iter().next().map(decode_entity::<E>).transpose()
    }

    /// Like [`GraphClient::fetch`], but more than one match is an error.
    pub async fn fetch_unique<E: Entity>(&self, matcher: &Matcher) -> Result<Option<E>, GraphError> {
        let descriptor = E::descriptor();
        let mut params = Vec::new();
        let where_clause = matcher.where_clause(descriptor, &mut params)?;
        let cypher = format!(
            "MATCH (n:{label}) {where_clause}
             RETURN count(n) AS cnt, head(collect(properties(n))) AS props",
            label = descriptor.label,
        );

        let Some(row) = self.handle().await?.query_one(bind(&cypher, &params)).await? else {
            return Ok(None);
        };
        match row_value::<i64>(&row, "cnt")? {
            0 => Ok(None),
            1 => decode_entity(row).map(Some),
            count => Err(GraphError::MultipleResults {
                label: descriptor.label.to_string(),
                count: count as usize,
            }),
        }
    }

    /// Lazily stream all nodes matching `filters`, ordered by `order_by`
    /// then natural key. Pages are fetched as the stream is polled.
    pub async fn fetch_many<E: Entity>(
        &self,
        filters: Matcher,
        order_by: OrderBy,
    ) -> Result<BoxStream<'static, Result<E, GraphError>>, GraphError> {
        let descriptor = E::descriptor();
        check_field(descriptor, &order_by.field)?;
        let mut params = Vec::new();
        let where_clause = filters.where_clause(descriptor, &mut params)?;
        let direction = match order_by.direction {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };

        let cypher = format!(
            "MATCH (n:{label}) {where_clause}
             RETURN properties(n) AS props
             ORDER BY n.{order} {direction}, n.{key} ASC
             SKIP $skip LIMIT $limit",
            label = descriptor.label,
            order = order_by.field,
            key = descriptor.natural_key,
        );

        Ok(paged(self.handle().await?, cypher, params, decode_entity::<E>))
    }

    /// Count nodes matching `matcher`.
    pub async fn count<E: Entity>(&self, matcher: &Matcher) -> Result<i64, GraphError> {
        let descriptor = E::descriptor();
        let mut params = Vec::new();
        let where_clause = matcher.where_clause(descriptor, &mut params)?;
        let cypher = format!(
            "MATCH (n:{label}) {where_clause} RETURN count(n) AS cnt",
            label = descriptor.label,
        );

        match self.handle().await?.query_one(bind(&cypher, &params)).await? {
            Some(row) => row_value::<i64>(&row, "cnt"),
            None => Ok(0),
        }
    }

    async fn fetch_rows<E: Entity>(&self, matcher: &Matcher, limit: i64) -> Result<Vec<Row>, GraphError> {
        let descriptor = E::descriptor();
        let mut params = Vec::new();
        let where_clause = matcher.where_clause(descriptor, &mut params)?;
        params.push(("limit".to_string(), BoltType::from(limit)));
        let cypher = format!(
            "MATCH (n:{label}) {where_clause}
             RETURN properties(n) AS props
             ORDER BY n.{key} ASC
             LIMIT $limit",
            label = descriptor.label,
            key = descriptor.natural_key,
        );

        self.handle().await?.query_rows(bind(&cypher, &params)).await
    }
}

// ── Helpers ──────────────────────────────────────────────────────

pub(crate) fn check_field(descriptor: &EntityDescriptor, field: &str) -> Result<(), GraphError> {
    if descriptor.has_field(field) {
        Ok(())
    } else {
        Err(GraphError::UnknownField {
            label: descriptor.label.to_string(),
            field: field.to_string(),
        })
    }
}

pub(crate) fn bind(cypher: &str, params: &[(String, BoltType)]) -> Query {
    params
        .iter()
        .fold(query(cypher), |q, (key, value)| q.param(key.as_str(), value.clone()))
}

pub(crate) fn decode_entity<E: Entity>(row: Row) -> Result<E, GraphError> {
    let props = row_map(&row, "props")?;
    Ok(E::from_properties(props)?)
}

fn key_value(descriptor: &EntityDescriptor, props: &Map<String, Value>) -> Result<Value, GraphError> {
    props.get(descriptor.natural_key).cloned().ok_or_else(|| {
        imbi_core::ValidationError::new(
            descriptor.label,
            descriptor.natural_key,
            imbi_core::Violation::Missing,
        )
        .into()
    })
}
