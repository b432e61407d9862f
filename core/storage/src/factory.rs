//! Environment-driven factory for storage providers.

use std::sync::Arc;

use nimbus_common::{Error, Result};

use crate::credentials::Credentials;
use crate::provider::{BucketContext, StorageProvider};
use crate::registry;

/// Environment variable holding the namespace name.
pub const ENV_NAMESPACE: &str = "NIMBUS_NAMESPACE";
/// Environment variable holding the API host URL.
pub const ENV_API_HOST: &str = "NIMBUS_API_HOST";
/// Environment variable holding the serialized credential bundle.
pub const ENV_STORAGE_KEY: &str = "NIMBUS_STORAGE_KEY";

/// Driver used when the credential bundle does not name one.
pub const DEFAULT_PROVIDER: &str = "@nimbus/storage-gcs";

/// Inputs required to open a storage handle.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Namespace owning the buckets.
    pub namespace: String,
    /// API host the namespace is served from.
    pub api_host: String,
    /// Serialized JSON credential bundle.
    pub credentials: String,
}

impl StorageConfig {
    /// Read the configuration from the process environment.
    ///
    /// Missing variables read as empty strings; validation happens when
    /// the configuration is used, so both entry points report identically.
    pub fn from_env() -> Self {
        Self {
            namespace: std::env::var(ENV_NAMESPACE).unwrap_or_default(),
            api_host: std::env::var(ENV_API_HOST).unwrap_or_default(),
            credentials: std::env::var(ENV_STORAGE_KEY).unwrap_or_default(),
        }
    }
}

/// Open a storage provider using configuration from the environment.
///
/// `web` selects the namespace's web bucket; otherwise the handle binds to
/// the data bucket.
pub async fn storage(web: bool) -> Result<Arc<dyn StorageProvider>> {
    storage_from(&StorageConfig::from_env(), web).await
}

/// Open a storage provider from an explicit configuration.
///
/// # Preconditions
/// - `namespace` and `api_host` are non-empty
/// - `credentials` holds a JSON object
///
/// # Errors
/// - `Config` describing the missing precondition
/// - `Config` naming the provider when its driver is not registered
/// - Driver errors from opening the provider
pub async fn storage_from(config: &StorageConfig, web: bool) -> Result<Arc<dyn StorageProvider>> {
    if config.namespace.is_empty() || config.api_host.is_empty() {
        return Err(Error::Config(
            "Not enough information in the environment to determine the object store bucket name."
                .to_string(),
        ));
    }

    if config.credentials.is_empty() {
        return Err(Error::Config(
            "Object store credentials are not available.".to_string(),
        ));
    }

    let credentials = Credentials::from_json(&config.credentials)?;
    let id = credentials.provider().unwrap_or(DEFAULT_PROVIDER).to_string();

    let driver = registry::global()
        .resolve(&id)
        .ok_or_else(|| Error::Config(format!("Unable to load storage provider '{}'", id)))?;

    tracing::debug!(provider = %id, web, "opening storage provider");

    let ctx = BucketContext::new(config.namespace.clone(), config.api_host.clone(), web);
    driver.open(ctx, credentials).await
}
