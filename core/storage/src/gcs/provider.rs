//! Google Cloud Storage provider implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use nimbus_common::{Error, Result};

use crate::credentials::Credentials;
use crate::file::{SignedUrlOptions, StorageFile};
use crate::provider::{host_bucket_name, host_token, BucketContext, StorageProvider};
use crate::registry::ProviderDriver;

use super::auth::{GcsCredentials, TokenManager};
use super::client::{GcsClient, WebsiteResource};
use super::signer::UrlSigner;

/// Cloud Storage provider bound to one bucket.
///
/// Bucket names follow the host-derived policy: the API host collapses into
/// a token and the bucket is `{namespace}-{token}`, with a `data-` prefix
/// for non-web buckets.
pub struct GcsProvider {
    bucket: String,
    namespace: String,
    api_host: String,
    web: bool,
    web_url: Option<String>,
    client: Arc<GcsClient>,
    signer: Option<Arc<UrlSigner>>,
}

impl GcsProvider {
    /// Bind a provider to the bucket selected by `ctx`.
    ///
    /// The bucket is verified to exist before the handle is returned, so a
    /// missing bucket or rejected credentials surface here rather than on
    /// first use.
    ///
    /// # Errors
    /// - `NotFound` when the bucket does not exist
    /// - Authentication/permission errors from the API
    pub async fn bind(
        client: Arc<GcsClient>,
        signer: Option<Arc<UrlSigner>>,
        ctx: BucketContext,
        credentials: &Credentials,
    ) -> Result<Self> {
        let bucket = host_bucket_name(&ctx);
        client.get_bucket(&bucket).await?;

        Ok(Self {
            bucket,
            namespace: ctx.namespace,
            api_host: ctx.api_host,
            web: ctx.web,
            web_url: credentials.web_url().map(str::to_string),
            client,
            signer,
        })
    }

    fn make_file(&self, name: String) -> GcsFile {
        GcsFile {
            bucket: self.bucket.clone(),
            name,
            client: self.client.clone(),
            signer: self.signer.clone(),
        }
    }
}

#[async_trait]
impl StorageProvider for GcsProvider {
    fn id(&self) -> &'static str {
        GcsDriver::ID
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
            None => Some(format!(
                "https://{}-{}",
                self.namespace,
                host_token(&self.api_host)
            )),
        }
    }

    async fn set_website(
        &self,
        main_page_suffix: Option<&str>,
        not_found_page: Option<&str>,
    ) -> Result<()> {
        let website = WebsiteResource {
            main_page_suffix: main_page_suffix.map(str::to_string),
            not_found_page: not_found_page.map(str::to_string),
        };
        self.client
            .patch_bucket_website(&self.bucket, &website)
            .await?;
        Ok(())
    }

    async fn delete_files(&self, prefix: Option<&str>) -> Result<()> {
        let objects = self.client.list_objects(&self.bucket, prefix).await?;
        if objects.is_empty() {
            return Ok(());
        }

        // The JSON API has no bulk-delete call; objects go one at a time.
        for object in objects {
            self.client.delete_object(&self.bucket, &object.name).await?;
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
        let cache_control = if cache_control.is_empty() {
            None
        } else {
            Some(cache_control)
        };
        self.client
            .upload_multipart(&self.bucket, destination, data, content_type, cache_control)
            .await?;
        Ok(())
    }

    fn file(&self, destination: &str) -> Box<dyn StorageFile> {
        Box::new(self.make_file(destination.to_string()))
    }

    async fn get_files(&self, prefix: Option<&str>) -> Result<Vec<Box<dyn StorageFile>>> {
        let objects = self.client.list_objects(&self.bucket, prefix).await?;
        Ok(objects
            .into_iter()
            .map(|object| Box::new(self.make_file(object.name)) as Box<dyn StorageFile>)
            .collect())
    }
}

/// Handle to one object in a Cloud Storage bucket.
pub struct GcsFile {
    bucket: String,
    name: String,
    client: Arc<GcsClient>,
    signer: Option<Arc<UrlSigner>>,
}

#[async_trait]
impl StorageFile for GcsFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn metadata(&self) -> Result<HashMap<String, String>> {
        match self.client.get_object(&self.bucket, &self.name).await {
            Ok(object) => Ok(object.metadata.unwrap_or_default()),
            Err(Error::NotFound(_)) => Ok(HashMap::new()),
            Err(e) => Err(e),
        }
    }

    async fn set_metadata(&self, metadata: HashMap<String, String>) -> Result<()> {
        self.client
            .patch_object_metadata(&self.bucket, &self.name, &metadata)
            .await?;
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        match self.client.get_object(&self.bucket, &self.name).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self) -> Result<()> {
        self.client.delete_object(&self.bucket, &self.name).await
    }

    async fn save(&self, data: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .upload_media(&self.bucket, &self.name, data, content_type)
            .await?;
        Ok(())
    }

    async fn download(&self) -> Result<Vec<u8>> {
        self.client.download_object(&self.bucket, &self.name).await
    }

    async fn signed_url(&self, options: SignedUrlOptions) -> Result<String> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            Error::Config(
                "Signed URLs require service account credentials with a private key".to_string(),
            )
        })?;
        signer.signed_url(&self.bucket, &self.name, &options)
    }
}

/// Driver registering the Cloud Storage backend.
pub struct GcsDriver;

impl GcsDriver {
    /// Identifier the driver is registered under.
    pub const ID: &'static str = "@nimbus/storage-gcs";
}

#[async_trait]
impl ProviderDriver for GcsDriver {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn open(
        &self,
        ctx: BucketContext,
        credentials: Credentials,
    ) -> Result<Arc<dyn StorageProvider>> {
        let prepared = GcsCredentials::prepare(&credentials)?;
        let token_manager = Arc::new(TokenManager::new(&prepared));

        let (client, signer) = match credentials.endpoint() {
            Some(endpoint) => (
                GcsClient::with_endpoint(endpoint, token_manager),
                UrlSigner::with_endpoint(endpoint, &prepared)?,
            ),
            None => (GcsClient::new(token_manager), UrlSigner::new(&prepared)?),
        };

        let provider = GcsProvider::bind(
            Arc::new(client),
            Some(Arc::new(signer)),
            ctx,
            &credentials,
        )
        .await?;
        Ok(Arc::new(provider))
    }
}
