//! In-memory storage provider for tests and local development.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use nimbus_common::{Error, Result};

use crate::credentials::Credentials;
use crate::file::{SignedUrlOptions, StorageFile};
use crate::provider::{host_bucket_name, BucketContext, StorageProvider};
use crate::registry::ProviderDriver;

/// A stored object with its content headers.
#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
    cache_control: Option<String>,
    metadata: HashMap<String, String>,
}

/// Website configuration recorded by `set_website`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebsiteConfig {
    pub main_page_suffix: Option<String>,
    pub not_found_page: Option<String>,
}

/// Shared state behind every handle cloned from one provider.
#[derive(Default)]
struct MemoryStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    website: RwLock<Option<WebsiteConfig>>,
    /// Number of bulk-delete requests actually issued.
    bulk_deletes: AtomicUsize,
}

/// In-memory storage provider.
///
/// Useful for testing and development. All data is stored in memory and
/// lost on drop. The provider observes the same contract as the cloud
/// backends, including the host-derived bucket naming.
pub struct MemoryProvider {
    bucket: String,
    web: bool,
    web_url: Option<String>,
    store: Arc<MemoryStore>,
}

impl MemoryProvider {
    /// Create an empty provider bound to the bucket selected by `ctx`.
    pub fn new(ctx: &BucketContext) -> Self {
        Self::with_credentials(ctx, &Credentials::default())
    }

    /// Create an empty provider honoring credential overrides.
    pub fn with_credentials(ctx: &BucketContext, credentials: &Credentials) -> Self {
        Self {
            bucket: host_bucket_name(ctx),
            web: ctx.web,
            web_url: credentials.web_url().map(str::to_string),
            store: Arc::new(MemoryStore::default()),
        }
    }

    /// Number of bulk-delete requests issued so far.
    pub fn bulk_delete_count(&self) -> usize {
        self.store.bulk_deletes.load(Ordering::SeqCst)
    }

    /// Website configuration recorded by the last `set_website` call.
    pub fn website(&self) -> Option<WebsiteConfig> {
        self.store.website.read().unwrap().clone()
    }

    /// Content headers recorded for an object: `(content_type, cache_control)`.
    pub fn object_headers(&self, name: &str) -> Option<(String, Option<String>)> {
        let objects = self.store.objects.read().unwrap();
        objects
            .get(name)
            .map(|object| (object.content_type.clone(), object.cache_control.clone()))
    }

    fn matching_keys(objects: &HashMap<String, StoredObject>, prefix: Option<&str>) -> Vec<String> {
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|key| prefix.map(|prefix| key.starts_with(prefix)).unwrap_or(true))
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

/// Handle to an object held by a [`MemoryProvider`].
pub struct MemoryFile {
    bucket: String,
    name: String,
    store: Arc<MemoryStore>,
}

#[async_trait]
impl StorageFile for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn metadata(&self) -> Result<HashMap<String, String>> {
        let objects = self.store.objects.read().unwrap();
        Ok(objects
            .get(&self.name)
            .map(|object| object.metadata.clone())
            .unwrap_or_default())
    }

    async fn set_metadata(&self, metadata: HashMap<String, String>) -> Result<()> {
        let mut objects = self.store.objects.write().unwrap();
        match objects.get_mut(&self.name) {
            Some(object) => {
                object.metadata = metadata;
                Ok(())
            }
            None => Err(Error::NotFound(format!("Object not found: {}", self.name))),
        }
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.store.objects.read().unwrap().contains_key(&self.name))
    }

    async fn delete(&self) -> Result<()> {
        let mut objects = self.store.objects.write().unwrap();
        match objects.remove(&self.name) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("Object not found: {}", self.name))),
        }
    }

    async fn save(&self, data: Vec<u8>, content_type: &str) -> Result<()> {
        let object = StoredObject {
            data,
            content_type: content_type.to_string(),
            cache_control: None,
            metadata: HashMap::new(),
        };
        self.store
            .objects
            .write()
            .unwrap()
            .insert(self.name.clone(), object);
        Ok(())
    }

    async fn download(&self) -> Result<Vec<u8>> {
        let objects = self.store.objects.read().unwrap();
        match objects.get(&self.name) {
            Some(object) => Ok(object.data.clone()),
            None => Err(Error::NotFound(format!("Object not found: {}", self.name))),
        }
    }

    async fn signed_url(&self, options: SignedUrlOptions) -> Result<String> {
        // Synthetic URL carrying the same query facts a real scheme embeds.
        let issued_at = Utc::now().timestamp();
        Ok(format!(
            "memory://{}/{}?method={}&expires={}&issued={}",
            self.bucket,
            self.name,
            options.action.method(),
            options.expires_in,
            issued_at
        ))
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn id(&self) -> &'static str {
        MemoryDriver::ID
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn url(&self) -> Option<String> {
        if !self.web {
            return None;
        }
        match &self.web_url {
            Some(url) => Some(url.clone()),
            None => Some(format!("memory://{}", self.bucket)),
        }
    }

    async fn set_website(
        &self,
        main_page_suffix: Option<&str>,
        not_found_page: Option<&str>,
    ) -> Result<()> {
        let config = WebsiteConfig {
            main_page_suffix: main_page_suffix.map(str::to_string),
            not_found_page: not_found_page.map(str::to_string),
        };
        *self.store.website.write().unwrap() = Some(config);
        Ok(())
    }

    async fn delete_files(&self, prefix: Option<&str>) -> Result<()> {
        let mut objects = self.store.objects.write().unwrap();
        let keys = Self::matching_keys(&objects, prefix);
        if keys.is_empty() {
            return Ok(());
        }

        self.store.bulk_deletes.fetch_add(1, Ordering::SeqCst);
        for key in keys {
            objects.remove(&key);
        }
        Ok(())
    }

    async fn upload(
        &self,
        local_path: &Path,
        destination: &str,
        content_type: &str,
        cache_control: &str,
    ) -> Result<()> {
        let data = tokio::fs::read(local_path).await?;
        let object = StoredObject {
            data,
            content_type: content_type.to_string(),
            cache_control: if cache_control.is_empty() {
                None
            } else {
                Some(cache_control.to_string())
            },
            metadata: HashMap::new(),
        };
        self.store
            .objects
            .write()
            .unwrap()
            .insert(destination.to_string(), object);
        Ok(())
    }

    fn file(&self, destination: &str) -> Box<dyn StorageFile> {
        Box::new(MemoryFile {
            bucket: self.bucket.clone(),
            name: destination.to_string(),
            store: self.store.clone(),
        })
    }

    async fn get_files(&self, prefix: Option<&str>) -> Result<Vec<Box<dyn StorageFile>>> {
        let objects = self.store.objects.read().unwrap();
        let files = Self::matching_keys(&objects, prefix)
            .into_iter()
            .map(|name| {
                Box::new(MemoryFile {
                    bucket: self.bucket.clone(),
                    name,
                    store: self.store.clone(),
                }) as Box<dyn StorageFile>
            })
            .collect();
        Ok(files)
    }
}

/// Driver registering the in-memory backend.
pub struct MemoryDriver;

impl MemoryDriver {
    /// Identifier the driver is registered under.
    pub const ID: &'static str = "@nimbus/storage-memory";
}

#[async_trait]
impl ProviderDriver for MemoryDriver {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn open(
        &self,
        ctx: BucketContext,
        credentials: Credentials,
    ) -> Result<Arc<dyn StorageProvider>> {
        Ok(Arc::new(MemoryProvider::with_credentials(&ctx, &credentials)))
    }
}
