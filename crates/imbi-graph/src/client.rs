//! Neo4j connection lifecycle and per-operation graph handles.

use std::sync::Arc;
use std::time::Instant;

use neo4rs::{query, ConfigBuilder, Graph, Query};
use serde_json::Value;
use tokio::sync::RwLock;

use imbi_core::{ImbiError, ModelRegistry, Neo4jSettings, ValidationError};

use crate::schema;

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j connection is not initialized")]
    NotInitialized,

    #[error("Neo4j query error: {0}")]
    Query(neo4rs::Error),

    #[error("{label} with {field} = {value} already exists")]
    ConstraintViolation {
        label: String,
        field: String,
        value: Value,
    },

    #[error("{label} with {field} = {value} not found")]
    NotFound {
        label: String,
        field: String,
        value: Value,
    },

    #[error("Expected at most one {label}, matched {count}")]
    MultipleResults { label: String, count: usize },

    #[error("{label} has no field named {field}")]
    UnknownField { label: String, field: String },

    #[error("Invalid graph identifier: {0}")]
    InvalidIdentifier(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GraphError {
    /// Whether the store was unreachable or the client unusable.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::NotInitialized)
    }
}

impl From<neo4rs::Error> for GraphError {
    fn from(err: neo4rs::Error) -> Self {
        match err {
            neo4rs::Error::IOError { .. }
            | neo4rs::Error::ConnectionError
            | neo4rs::Error::InvalidDnsName(_)
            | neo4rs::Error::UnsupportedScheme(_)
            | neo4rs::Error::AuthenticationError(_) => Self::Connection(err.to_string()),
            other => Self::Query(other),
        }
    }
}

impl From<ImbiError> for GraphError {
    fn from(err: ImbiError) -> Self {
        match err {
            ImbiError::Validation(e) => Self::Validation(e),
            ImbiError::Config(msg) => Self::Connection(msg),
            other => Self::Serialization(other.to_string()),
        }
    }
}

/// Lifecycle-managed Neo4j connection pool.
///
/// Construct one per process (or per test), call [`GraphClient::initialize`]
/// at startup and [`GraphClient::close`] at shutdown. Clone is cheap
/// (inner Arc); all clones share the same pool.
#[derive(Clone)]
pub struct GraphClient {
    inner: Arc<Inner>,
}

struct Inner {
    registry: ModelRegistry,
    state: RwLock<Option<Connection>>,
}

struct Connection {
    graph: Graph,
    settings: Neo4jSettings,
    connected_at: Instant,
}

impl Connection {
    fn handle(&self) -> GraphHandle {
        GraphHandle {
            graph: self.graph.clone(),
            fetch_size: self.settings.fetch_size.max(1),
        }
    }

    fn expired(&self) -> bool {
        let lifetime = self.settings.max_connection_lifetime();
        !lifetime.is_zero() && self.connected_at.elapsed() >= lifetime
    }
}

impl Default for GraphClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphClient {
    /// A client for the standard Imbi model registry.
    pub fn new() -> Self {
        Self::with_registry(ModelRegistry::standard())
    }

    /// A client whose startup schema is derived from `registry`.
    pub fn with_registry(registry: ModelRegistry) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                state: RwLock::new(None),
            }),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.inner.registry
    }

    /// Connect, verify liveness, and declare constraints and indexes.
    ///
    /// A no-op when already initialized.
    pub async fn initialize(&self, settings: &Neo4jSettings) -> Result<(), GraphError> {
        let mut state = self.inner.state.write().await;
        if state.is_some() {
            tracing::debug!("Neo4j already initialized");
            return Ok(());
        }

        let graph = connect(settings).await?;
        let connection = Connection {
            graph,
            settings: settings.clone(),
            connected_at: Instant::now(),
        };
        schema::apply(&connection.handle(), &self.inner.registry).await?;

        *state = Some(connection);
        Ok(())
    }

    /// Release the pool. Safe to call when not initialized.
    ///
    /// Handles already issued keep their connections until dropped.
    pub async fn close(&self) {
        if self.inner.state.write().await.take().is_some() {
            tracing::info!("Closed Neo4j connection pool");
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.inner.state.read().await.is_some()
    }

    /// Obtain a handle for a single logical operation.
    ///
    /// Rebuilds the pool first when it has outlived the configured
    /// maximum connection lifetime.
    pub async fn handle(&self) -> Result<GraphHandle, GraphError> {
        {
            let state = self.inner.state.read().await;
            match state.as_ref() {
                None => return Err(GraphError::NotInitialized),
                Some(conn) if !conn.expired() => return Ok(conn.handle()),
                Some(_) => {}
            }
        }

        let mut state = self.inner.state.write().await;
        let conn = state.as_mut().ok_or(GraphError::NotInitialized)?;
        if conn.expired() {
            conn.graph = connect(&conn.settings).await?;
            conn.connected_at = Instant::now();
            tracing::info!("Recycled Neo4j connection pool");
        }
        Ok(conn.handle())
    }
}

async fn connect(settings: &Neo4jSettings) -> Result<Graph, GraphError> {
    let uri = settings.connection_uri()?;
    let (user, password) = settings.credentials()?;
    if !settings.keep_alive {
        tracing::debug!("keep_alive=false has no effect; pooled connections stay open");
    }

    let neo_config = ConfigBuilder::default()
        .uri(uri.as_str())
        .user(user.as_str())
        .password(password.as_str())
        .db(settings.database.as_str())
        .max_connections(settings.max_connections)
        .fetch_size(settings.fetch_size)
        .build()
        .map_err(|e| GraphError::Connection(e.to_string()))?;

    let graph = Graph::connect(neo_config)
        .await
        .map_err(|e| GraphError::Connection(e.to_string()))?;

    let probe = graph.run(query("RETURN 1"));
    let alive = match settings.liveness_check_timeout() {
        Some(timeout) => tokio::time::timeout(timeout, probe)
            .await
            .map_err(|_| GraphError::Connection(format!("liveness check timed out after {timeout:?}")))?,
        None => probe.await,
    };
    alive.map_err(|e| GraphError::Connection(format!("liveness check failed: {e}")))?;

    tracing::info!(uri = %uri, database = %settings.database, "Connected to Neo4j");
    Ok(graph)
}

/// A graph handle scoped to one logical operation.
#[derive(Clone)]
pub struct GraphHandle {
    graph: Graph,
    fetch_size: usize,
}

impl GraphHandle {
    /// Rows fetched per page by streaming reads.
    pub fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    /// Execute a write-only query (CREATE, MERGE, DELETE, SET).
    pub async fn run(&self, query: Query) -> Result<(), GraphError> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Execute a read query and collect all rows.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a read query and return the first row, if any.
    pub async fn query_one(&self, query: Query) -> Result<Option<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }
}

const CONSTRAINT_VALIDATION_FAILED: &str = "Neo.ClientError.Schema.ConstraintValidationFailed";

/// Whether a store error reports a uniqueness constraint violation.
pub(crate) fn is_constraint_violation(err: &GraphError) -> bool {
    match err {
        GraphError::Query(neo4rs::Error::Neo4j(e)) => e.code() == CONSTRAINT_VALIDATION_FAILED,
        // Older servers report some violations without the status code.
        GraphError::Query(e) => e.to_string().contains("already exists with label"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_operations_before_initialize_fail() {
        let client = GraphClient::new();
        assert!(!client.is_initialized().await);
        let err = client.handle().await.err().unwrap();
        assert!(matches!(err, GraphError::NotInitialized));
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn test_close_when_not_initialized_is_safe() {
        let client = GraphClient::new();
        client.close().await;
        client.close().await;
        assert!(!client.is_initialized().await);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_connection_error() {
        let settings = Neo4jSettings {
            url: "bolt://127.0.0.1:1".into(),
            liveness_check_timeout_secs: Some(2),
            ..Default::default()
        };
        let client = GraphClient::new();
        let err = client.initialize(&settings).await.unwrap_err();
        assert!(err.is_connection(), "{err}");
        assert!(!client.is_initialized().await);
    }

    #[test]
    fn test_dropped_connection_is_connection_error() {
        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = GraphError::from(neo4rs::Error::from(reset));
        assert!(err.is_connection(), "{err}");

        let err = GraphError::from(neo4rs::Error::ConnectionError);
        assert!(err.is_connection(), "{err}");

        let err = GraphError::from(neo4rs::Error::AuthenticationError("bad credentials".into()));
        assert!(err.is_connection(), "{err}");
    }

    #[test]
    fn test_driver_errors_stay_query_errors() {
        let err = GraphError::from(neo4rs::Error::ConversionError);
        assert!(matches!(err, GraphError::Query(_)));
        assert!(!err.is_connection());
        assert!(!is_constraint_violation(&err));
    }

    #[test]
    fn test_constraint_violation_message_fallback() {
        let err = GraphError::from(neo4rs::Error::UnexpectedMessage(
            "Node(12) already exists with label `Team` and property `slug` = 'platform'".into(),
        ));
        assert!(is_constraint_violation(&err));
        assert!(!is_constraint_violation(&GraphError::NotInitialized));
    }

    #[test]
    fn test_validation_errors_keep_their_kind() {
        let err: GraphError = ImbiError::Validation(ValidationError::new(
            "Team",
            "slug",
            imbi_core::Violation::Missing,
        ))
        .into();
        assert!(matches!(err, GraphError::Validation(ref v) if v.field == "slug"));
    }
}
