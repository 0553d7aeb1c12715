//! Connection settings for the Neo4j store.

/// Default number of pooled Bolt connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 4;

/// Connection settings for [`crate::neo4j::Neo4jConnector`].
///
/// Nothing here has an embedded default apart from the pool size: the URI and
/// credentials always come from the caller.
#[derive(Clone)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    /// Target database, or the server default when `None`.
    pub database: Option<String>,
    pub max_connections: usize,
}

impl Neo4jConfig {
    pub fn new(uri: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            user: user.into(),
            password: password.into(),
            database: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }
}

// Hand-written so the password never reaches logs.
impl std::fmt::Debug for Neo4jConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jConfig")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}
