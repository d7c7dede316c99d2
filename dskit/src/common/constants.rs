// entity constants
pub const KEY_PROPERTY: &str = "__key__";
pub const CREATED_PROPERTY: &str = "_created";
pub const UPDATED_PROPERTY: &str = "_updated";
pub const RESERVED_PROPERTIES: [&str; 3] = [KEY_PROPERTY, CREATED_PROPERTY, UPDATED_PROPERTY];

// aggregation constants
pub const COUNT_ALIAS: &str = "count";

// store constants
pub const MAX_BATCH_SIZE: usize = 500;
pub const DEFAULT_QUERY_BATCH_SIZE: usize = 300;
pub const MAX_AGGREGATIONS: usize = 5;

// environment constants
pub const ENV_EMULATOR_HOST: &str = "DATASTORE_EMULATOR_HOST";
pub const ENV_GCP_PROJECT_ID: &str = "GCP_PROJECT_ID";
pub const ENV_DATASTORE_PROJECT_ID: &str = "DATASTORE_PROJECT_ID";
pub const ENV_CREDENTIALS_FILE: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const ENV_METADATA_HOST: &str = "GCE_METADATA_HOST";
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
pub const METADATA_PROJECT_PATH: &str = "/computeMetadata/v1/project/project-id";
pub const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
pub const METADATA_FLAVOR: &str = "Google";
pub const DEFAULT_DATABASE_ID: &str = "";
