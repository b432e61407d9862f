//! Driver registry for dynamic provider resolution.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use nimbus_common::{Error, Result};

use crate::credentials::Credentials;
use crate::provider::{BucketContext, StorageProvider};

/// A registered storage backend.
///
/// Drivers are stateless: [`ProviderDriver::open`] performs the full bind
/// sequence (credential preparation, client construction, bucket binding)
/// and returns a ready provider handle.
#[async_trait]
pub trait ProviderDriver: Send + Sync {
    /// Stable identifier the driver is registered under.
    fn id(&self) -> &'static str;

    /// Open a provider bound to the bucket selected by `ctx`.
    ///
    /// # Errors
    /// - Credentials missing required keys or invalid
    /// - Bucket unreachable, where the backend verifies eagerly
    async fn open(
        &self,
        ctx: BucketContext,
        credentials: Credentials,
    ) -> Result<Arc<dyn StorageProvider>>;
}

/// Registry of storage drivers keyed by identifier.
pub struct ProviderRegistry {
    drivers: HashMap<String, Arc<dyn ProviderDriver>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Register a driver under its self-reported identifier.
    ///
    /// # Errors
    /// - Returns `AlreadyExists` if the identifier is already registered
    pub fn register(&mut self, driver: Arc<dyn ProviderDriver>) -> Result<()> {
        let id = driver.id();
        if self.drivers.contains_key(id) {
            return Err(Error::AlreadyExists(format!(
                "Provider '{}' is already registered",
                id
            )));
        }
        tracing::debug!(provider = id, "registering storage driver");
        self.drivers.insert(id.to_string(), driver);
        Ok(())
    }

    /// Resolve a driver by identifier.
    ///
    /// Absence is a normal outcome, reported as `None` rather than an
    /// error; the caller decides how to handle an unknown identifier.
    pub fn resolve(&self, id: &str) -> Option<Arc<dyn ProviderDriver>> {
        self.drivers.get(id).cloned()
    }

    /// Get the list of registered identifiers.
    pub fn providers(&self) -> Vec<String> {
        self.drivers.keys().cloned().collect()
    }

    /// Check if a driver is registered.
    pub fn has_provider(&self, id: &str) -> bool {
        self.drivers.contains_key(id)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the built-in drivers.
pub fn create_default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    registry
        .register(Arc::new(crate::gcs::GcsDriver))
        .expect("Failed to register gcs driver");

    registry
        .register(Arc::new(crate::s3::S3Driver))
        .expect("Failed to register s3 driver");

    registry
        .register(Arc::new(crate::memory::MemoryDriver))
        .expect("Failed to register memory driver");

    registry
}

static GLOBAL: OnceLock<ProviderRegistry> = OnceLock::new();

/// Process-wide registry, populated with the built-in drivers on first
/// access.
///
/// Population happens exactly once, even under concurrent first access;
/// every call returns the same instance.
pub fn global() -> &'static ProviderRegistry {
    GLOBAL.get_or_init(|| {
        tracing::debug!("populating storage driver registry");
        create_default_registry()
    })
}
