//! Opening a store client from the execution environment.
//!
//! [`ClientBuilder`] works out which project and database a client talks to,
//! from explicit settings first and the process environment second:
//!
//! - with an emulator host (`DATASTORE_EMULATOR_HOST`), the project is
//!   `GCP_PROJECT_ID`, else `DATASTORE_PROJECT_ID`, else the database id;
//!   one of them must be set
//! - otherwise the project is `GCP_PROJECT_ID`, else it is asked from the
//!   compute metadata service, and `GOOGLE_APPLICATION_CREDENTIALS` names
//!   the credentials file
//!
//! The resolved [`ClientConfig`] is handed to a [`DatastoreConnector`],
//! which builds the provider. The default connector opens an in-memory
//! store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::client_config::ClientConfig;
use crate::common::{
    DEFAULT_DATABASE_ID, DEFAULT_METADATA_HOST, ENV_CREDENTIALS_FILE, ENV_DATASTORE_PROJECT_ID,
    ENV_EMULATOR_HOST, ENV_GCP_PROJECT_ID, ENV_METADATA_HOST, METADATA_FLAVOR,
    METADATA_FLAVOR_HEADER, METADATA_PROJECT_PATH,
};
use crate::context::Context;
use crate::errors::{DsError, DsResult, ErrorKind};
use crate::store::memory::{InMemoryDatastore, MemoryStoreConfig};
use crate::store::{Datastore, DatastoreProvider};

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Read access to environment variables.
///
/// Empty values count as unset.
pub trait Environment: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// The process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|value| !value.is_empty())
    }
}

/// A fixed set of variables.
#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        MapEnv::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }
}

impl Environment for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).filter(|value| !value.is_empty()).cloned()
    }
}

/// Source of the project id when none is configured.
pub trait MetadataSource: Send + Sync {
    fn project_id(&self, ctx: &Context) -> DsResult<String>;
}

/// The compute metadata service.
///
/// Sends `GET http://<host>/computeMetadata/v1/project/project-id` with the
/// `Metadata-Flavor: Google` header. The request is bounded by the context
/// deadline, or five seconds without one.
#[derive(Clone, Debug)]
pub struct GceMetadata {
    host: String,
}

impl GceMetadata {
    pub fn new(host: &str) -> Self {
        GceMetadata {
            host: host.trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}{}", self.host, METADATA_PROJECT_PATH)
    }
}

impl Default for GceMetadata {
    fn default() -> Self {
        GceMetadata::new(DEFAULT_METADATA_HOST)
    }
}

impl MetadataSource for GceMetadata {
    fn project_id(&self, ctx: &Context) -> DsResult<String> {
        ctx.check()?;
        let timeout = ctx
            .remaining()
            .map_or(METADATA_TIMEOUT, |left| left.min(METADATA_TIMEOUT));
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();

        let response = agent
            .get(&self.url())
            .set(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .call()?;
        let project_id = response.into_string()?.trim().to_string();
        if project_id.is_empty() {
            return Err(DsError::new(
                "metadata server returned an empty project id",
                ErrorKind::ConfigurationError,
            ));
        }
        Ok(project_id)
    }
}

/// Builds the provider behind a client for a resolved configuration.
pub trait DatastoreConnector: Send + Sync {
    fn connect(&self, ctx: &Context, config: &ClientConfig) -> DsResult<Arc<dyn DatastoreProvider>>;
}

/// Connects every configuration to a fresh in-memory store.
#[derive(Clone, Debug, Default)]
pub struct InMemoryConnector {
    config: MemoryStoreConfig,
}

impl InMemoryConnector {
    pub fn new(config: MemoryStoreConfig) -> Self {
        InMemoryConnector { config }
    }
}

impl DatastoreConnector for InMemoryConnector {
    fn connect(&self, _ctx: &Context, config: &ClientConfig) -> DsResult<Arc<dyn DatastoreProvider>> {
        log::debug!("opening in-memory store for project {}", config.project_id());
        Ok(Arc::new(InMemoryDatastore::with_config(self.config.clone())))
    }
}

/// Fluent builder for a [`Datastore`] client.
///
/// Invalid settings are captured and reported by [`open`](Self::open) or
/// [`resolve`](Self::resolve); after the first one, further settings are
/// ignored.
///
/// # Examples
///
/// ```rust,ignore
/// use dskit::context::Context;
/// use dskit::store::Datastore;
///
/// let ctx = Context::background();
/// let client = Datastore::builder()
///     .database_id("orders")
///     .open(&ctx)?;
/// ```
pub struct ClientBuilder {
    error: Option<DsError>,
    database_id: String,
    project_id: Option<String>,
    emulator_host: Option<String>,
    credentials_file: Option<String>,
    environment: Arc<dyn Environment>,
    metadata: Option<Arc<dyn MetadataSource>>,
    connector: Arc<dyn DatastoreConnector>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        ClientBuilder::new()
    }
}

impl Datastore {
    /// A builder reading the process environment.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        ClientBuilder {
            error: None,
            database_id: DEFAULT_DATABASE_ID.to_string(),
            project_id: None,
            emulator_host: None,
            credentials_file: None,
            environment: Arc::new(ProcessEnv),
            metadata: None,
            connector: Arc::new(InMemoryConnector::default()),
        }
    }

    fn require(&mut self, setting: &str, value: &str) -> bool {
        if self.error.is_some() {
            return false;
        }
        if value.is_empty() {
            self.error = Some(DsError::new(
                &format!("{} cannot be empty", setting),
                ErrorKind::ConfigurationError,
            ));
            return false;
        }
        true
    }

    /// The database to use. Empty selects the default database.
    pub fn database_id(mut self, database_id: &str) -> Self {
        if self.error.is_none() {
            self.database_id = database_id.to_string();
        }
        self
    }

    /// Overrides the project from the environment.
    pub fn project_id(mut self, project_id: &str) -> Self {
        if self.require("project id", project_id) {
            self.project_id = Some(project_id.to_string());
        }
        self
    }

    /// Talks to the emulator at `host`, whatever the environment says.
    pub fn emulator_host(mut self, host: &str) -> Self {
        if self.require("emulator host", host) {
            self.emulator_host = Some(host.to_string());
        }
        self
    }

    pub fn credentials_file(mut self, path: &str) -> Self {
        if self.require("credentials file", path) {
            self.credentials_file = Some(path.to_string());
        }
        self
    }

    /// Reads variables from `environment` instead of the process.
    pub fn environment<E: Environment + 'static>(mut self, environment: E) -> Self {
        self.environment = Arc::new(environment);
        self
    }

    /// Asks `source` for the project id instead of the metadata service.
    pub fn metadata_source<M: MetadataSource + 'static>(mut self, source: M) -> Self {
        self.metadata = Some(Arc::new(source));
        self
    }

    pub fn connector<C: DatastoreConnector + 'static>(mut self, connector: C) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Works out the client configuration without opening anything.
    ///
    /// # Errors
    /// [`ErrorKind::ConfigurationError`] for a captured invalid setting, a
    /// missing project id under the emulator, or a failed metadata lookup.
    pub fn resolve(&self, ctx: &Context) -> DsResult<ClientConfig> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        let env = &self.environment;
        let emulator_host = self
            .emulator_host
            .clone()
            .or_else(|| env.var(ENV_EMULATOR_HOST));

        let config = match emulator_host {
            Some(host) => {
                let project_id = self
                    .project_id
                    .clone()
                    .or_else(|| env.var(ENV_GCP_PROJECT_ID))
                    .or_else(|| env.var(ENV_DATASTORE_PROJECT_ID))
                    .or_else(|| Some(self.database_id.clone()).filter(|id| !id.is_empty()))
                    .ok_or_else(|| {
                        DsError::new(
                            "project ID must be provided via GCP_PROJECT_ID, DATASTORE_PROJECT_ID, or databaseID when using the Datastore emulator",
                            ErrorKind::ConfigurationError,
                        )
                    })?;
                ClientConfig::new(&project_id, &self.database_id).with_emulator_host(&host)
            }
            None => {
                let project_id = match self
                    .project_id
                    .clone()
                    .or_else(|| env.var(ENV_GCP_PROJECT_ID))
                {
                    Some(project_id) => project_id,
                    None => self.lookup_project(ctx)?,
                };
                ClientConfig::new(&project_id, &self.database_id)
            }
        };

        let credentials = self.credentials_file.clone().or_else(|| {
            if config.is_emulator() {
                None
            } else {
                env.var(ENV_CREDENTIALS_FILE)
            }
        });
        Ok(match credentials {
            Some(path) => config.with_credentials_file(&path),
            None => config,
        })
    }

    fn lookup_project(&self, ctx: &Context) -> DsResult<String> {
        let result = match &self.metadata {
            Some(source) => source.project_id(ctx),
            None => {
                let host = self
                    .environment
                    .var(ENV_METADATA_HOST)
                    .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string());
                GceMetadata::new(&host).project_id(ctx)
            }
        };
        result.map_err(|err| {
            log::error!("could not resolve project id from metadata: {}", err);
            DsError::new_with_cause(
                "project id could not be resolved from the metadata service",
                ErrorKind::ConfigurationError,
                err,
            )
        })
    }

    /// Resolves the configuration and opens a client on it.
    pub fn open(self, ctx: &Context) -> DsResult<Datastore> {
        let config = self.resolve(ctx)?;
        let provider = self.connector.connect(ctx, &config)?;
        log::debug!(
            "opened datastore client for project {} database {:?}",
            config.project_id(),
            config.database_id()
        );
        Ok(Datastore::from_provider(provider, config))
    }
}
