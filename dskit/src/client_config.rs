//! Resolved identity of a store client.

use std::sync::Arc;

/// The project, database and connection settings a client was opened with.
///
/// Immutable once built; produced by [`ClientBuilder`](crate::client::ClientBuilder)
/// from the environment and explicit overrides, or directly with
/// [`ClientConfig::new`] / [`ClientConfig::local`].
///
/// Uses the PIMPL pattern, clones are cheap.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    inner: Arc<ClientConfigInner>,
}

#[derive(Clone, PartialEq, Eq)]
struct ClientConfigInner {
    project_id: String,
    database_id: String,
    emulator_host: Option<String>,
    credentials_file: Option<String>,
}

impl ClientConfig {
    /// A configuration for `project_id` and `database_id`. An empty database
    /// id selects the default database.
    pub fn new(project_id: &str, database_id: &str) -> Self {
        ClientConfig {
            inner: Arc::new(ClientConfigInner {
                project_id: project_id.to_string(),
                database_id: database_id.to_string(),
                emulator_host: None,
                credentials_file: None,
            }),
        }
    }

    /// The configuration of a local, in-process store.
    pub fn local() -> Self {
        ClientConfig::new("local", "")
    }

    pub fn with_emulator_host(self, host: &str) -> Self {
        let mut inner = (*self.inner).clone();
        inner.emulator_host = Some(host.to_string());
        ClientConfig { inner: Arc::new(inner) }
    }

    pub fn with_credentials_file(self, path: &str) -> Self {
        let mut inner = (*self.inner).clone();
        inner.credentials_file = Some(path.to_string());
        ClientConfig { inner: Arc::new(inner) }
    }

    pub fn project_id(&self) -> &str {
        &self.inner.project_id
    }

    pub fn database_id(&self) -> &str {
        &self.inner.database_id
    }

    pub fn emulator_host(&self) -> Option<&str> {
        self.inner.emulator_host.as_deref()
    }

    /// True when the client talks to a store emulator.
    pub fn is_emulator(&self) -> bool {
        self.inner.emulator_host.is_some()
    }

    pub fn credentials_file(&self) -> Option<&str> {
        self.inner.credentials_file.as_deref()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig::local()
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("project_id", &self.inner.project_id)
            .field("database_id", &self.inner.database_id)
            .field("emulator_host", &self.inner.emulator_host)
            .field("credentials_file", &self.inner.credentials_file)
            .finish()
    }
}
