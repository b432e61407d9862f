//! S3 storage provider implementation.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials as AwsCredentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    Delete, ErrorDocument, IndexDocument, MetadataDirective, ObjectCannedAcl, ObjectIdentifier,
    WebsiteConfiguration,
};
use aws_sdk_s3::Client;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use nimbus_common::{Error, Result};

use crate::credentials::Credentials;
use crate::file::{SignedUrlOptions, StorageFile, UrlAction};
use crate::provider::{BucketContext, StorageProvider};
use crate::registry::ProviderDriver;

/// A delete request may carry at most this many keys.
const BULK_DELETE_BATCH: usize = 1000;

/// Credentials prepared for the AWS SDK.
#[derive(Debug, Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub endpoint: Option<String>,
}

impl S3Credentials {
    /// Extract SDK credentials from the generic bundle. Pure, no network.
    ///
    /// # Errors
    /// Returns `Error::Config` when the access key pair is missing.
    pub fn prepare(credentials: &Credentials) -> Result<Self> {
        let access_key_id = credentials
            .get_str("accessKeyId")
            .ok_or_else(|| Error::Config("S3 credentials are missing 'accessKeyId'".to_string()))?
            .to_string();
        let secret_access_key = credentials
            .get_str("secretAccessKey")
            .ok_or_else(|| {
                Error::Config("S3 credentials are missing 'secretAccessKey'".to_string())
            })?
            .to_string();

        Ok(Self {
            access_key_id,
            secret_access_key,
            region: credentials.get_str("region").unwrap_or("us-east-1").to_string(),
            endpoint: credentials.endpoint().map(str::to_string),
        })
    }
}

/// Build an SDK client from prepared credentials.
///
/// Local setup only: no request is issued and the bucket is not assumed to
/// exist. Endpoint overrides switch the client to path-style addressing,
/// which S3-compatible stores generally require.
pub fn create_client(prepared: S3Credentials) -> Client {
    let credentials = AwsCredentials::new(
        prepared.access_key_id,
        prepared.secret_access_key,
        None,
        None,
        "nimbus-storage",
    );

    let mut builder = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(prepared.region))
        .credentials_provider(credentials);
    if let Some(endpoint) = prepared.endpoint {
        builder = builder.endpoint_url(endpoint).force_path_style(true);
    }

    Client::from_conf(builder.build())
}

/// Compute the platform-suffix bucket name for a context.
///
/// Web buckets are named `{namespace}-nimbus-io`; data buckets carry an
/// additional `data-` prefix. Unlike the host-derived policy used by the
/// other backends, the API host does not participate.
pub fn platform_bucket_name(ctx: &BucketContext) -> String {
    let prefix = if ctx.web { "" } else { "data-" };
    format!("{}{}-nimbus-io", prefix, ctx.namespace)
}

/// Map an SDK failure onto the error taxonomy, keeping the full error
/// chain in the message.
fn vendor_error<E, R>(action: &str, err: SdkError<E, R>) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let diagnostic = format!("Failed to {}: {}", action, DisplayErrorContext(&err));
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => Error::Network(diagnostic),
        _ => Error::Provider(diagnostic),
    }
}

/// S3 provider bound to one bucket.
///
/// The bind is lazy: construction does not verify the bucket, so a missing
/// bucket surfaces on first use with the operation that hit it.
pub struct S3Provider {
    client: Client,
    bucket: String,
    web: bool,
    web_url: Option<String>,
    endpoint: Option<String>,
}

impl S3Provider {
    /// Create a provider bound to the bucket selected by `ctx`.
    pub fn new(client: Client, ctx: &BucketContext, credentials: &Credentials) -> Self {
        Self {
            client,
            bucket: platform_bucket_name(ctx),
            web: ctx.web,
            web_url: credentials.web_url().map(str::to_string),
            endpoint: credentials.endpoint().map(str::to_string),
        }
    }

    fn make_file(&self, name: String) -> S3File {
        S3File {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            name,
            web: self.web,
        }
    }

    /// Canned ACL applied to written objects.
    fn acl(web: bool) -> ObjectCannedAcl {
        if web {
            ObjectCannedAcl::PublicRead
        } else {
            ObjectCannedAcl::Private
        }
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if let Some(prefix) = prefix {
                request = request.prefix(prefix);
            }
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| vendor_error("list objects", e))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl StorageProvider for S3Provider {
    fn id(&self) -> &'static str {
        S3Driver::ID
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn url(&self) -> Option<String> {
        if !self.web {
            return None;
        }
        if let Some(url) = &self.web_url {
            return Some(url.clone());
        }

        // Virtual-host form of the web bucket under the endpoint host.
        let endpoint = self.endpoint.as_deref()?;
        let host = url::Url::parse(endpoint)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))?;
        Some(format!("http://{}.{}", self.bucket, host))
    }

    async fn set_website(
        &self,
        main_page_suffix: Option<&str>,
        not_found_page: Option<&str>,
    ) -> Result<()> {
        let mut configuration = WebsiteConfiguration::builder();
        if let Some(suffix) = main_page_suffix {
            let index = IndexDocument::builder()
                .suffix(suffix)
                .build()
                .map_err(|e| Error::InvalidInput(format!("Invalid index document: {}", e)))?;
            configuration = configuration.index_document(index);
        }
        if let Some(key) = not_found_page {
            let error = ErrorDocument::builder()
                .key(key)
                .build()
                .map_err(|e| Error::InvalidInput(format!("Invalid error document: {}", e)))?;
            configuration = configuration.error_document(error);
        }

        self.client
            .put_bucket_website()
            .bucket(&self.bucket)
            .website_configuration(configuration.build())
            .send()
            .await
            .map_err(|e| vendor_error("configure bucket website", e))?;
        Ok(())
    }

    async fn delete_files(&self, prefix: Option<&str>) -> Result<()> {
        let keys = self.list_keys(prefix).await?;
        // S3 rejects a delete request with an empty object list.
        if keys.is_empty() {
            return Ok(());
        }

        for batch in keys.chunks(BULK_DELETE_BATCH) {
            let objects = batch
                .iter()
                .map(|key| {
                    ObjectIdentifier::builder()
                        .key(key)
                        .build()
                        .map_err(|e| Error::InvalidInput(format!("Invalid object key: {}", e)))
                })
                .collect::<Result<Vec<_>>>()?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| Error::InvalidInput(format!("Invalid delete request: {}", e)))?;

            self.client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| vendor_error("delete objects", e))?;
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

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(destination)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .acl(Self::acl(self.web));
        if !cache_control.is_empty() {
            request = request.cache_control(cache_control);
        }

        request
            .send()
            .await
            .map_err(|e| vendor_error("upload object", e))?;
        Ok(())
    }

    fn file(&self, destination: &str) -> Box<dyn StorageFile> {
        Box::new(self.make_file(destination.to_string()))
    }

    async fn get_files(&self, prefix: Option<&str>) -> Result<Vec<Box<dyn StorageFile>>> {
        let keys = self.list_keys(prefix).await?;
        Ok(keys
            .into_iter()
            .map(|key| Box::new(self.make_file(key)) as Box<dyn StorageFile>)
            .collect())
    }
}

/// Handle to one object in an S3 bucket.
pub struct S3File {
    client: Client,
    bucket: String,
    name: String,
    web: bool,
}

#[async_trait]
impl StorageFile for S3File {
    fn name(&self) -> &str {
        &self.name
    }

    async fn metadata(&self) -> Result<HashMap<String, String>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&self.name)
            .send()
            .await
        {
            Ok(head) => Ok(head.metadata().cloned().unwrap_or_default()),
            Err(SdkError::ServiceError(context)) if context.err().is_not_found() => {
                Ok(HashMap::new())
            }
            Err(e) => Err(vendor_error("read object metadata", e)),
        }
    }

    async fn set_metadata(&self, metadata: HashMap<String, String>) -> Result<()> {
        // S3 has no in-place metadata patch: a same-key copy with a REPLACE
        // directive rewrites the metadata. The directive also resets the
        // content type, so the current one is read first and re-supplied.
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&self.name)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(ref context) if context.err().is_not_found() => {
                    Error::NotFound(format!("Object not found: {}", self.name))
                }
                other => vendor_error("read object metadata", other),
            })?;

        let mut request = self
            .client
            .copy_object()
            .copy_source(format!("{}/{}", self.bucket, self.name))
            .bucket(&self.bucket)
            .key(&self.name)
            .metadata_directive(MetadataDirective::Replace)
            .set_metadata(Some(metadata))
            .acl(S3Provider::acl(self.web));
        if let Some(content_type) = head.content_type() {
            request = request.content_type(content_type);
        }

        request
            .send()
            .await
            .map_err(|e| vendor_error("replace object metadata", e))?;
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&self.name)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(context)) if context.err().is_not_found() => Ok(false),
            Err(e) => Err(vendor_error("check object existence", e)),
        }
    }

    async fn delete(&self) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&self.name)
            .send()
            .await
            .map_err(|e| vendor_error("delete object", e))?;
        Ok(())
    }

    async fn save(&self, data: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.name)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .acl(S3Provider::acl(self.web))
            .send()
            .await
            .map_err(|e| vendor_error("save object", e))?;
        Ok(())
    }

    async fn download(&self) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.name)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(ref context) if context.err().is_no_such_key() => {
                    Error::NotFound(format!("Object not found: {}", self.name))
                }
                other => vendor_error("download object", other),
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Network(format!("Failed to read object content: {}", e)))?;
        Ok(data.into_bytes().to_vec())
    }

    /// Generate a presigned URL.
    ///
    /// The SDK signs SigV4 only, so `options.version` is ignored here.
    /// Signing is local: no request is issued.
    async fn signed_url(&self, options: SignedUrlOptions) -> Result<String> {
        let config = PresigningConfig::expires_in(Duration::from_secs(options.expires_in))
            .map_err(|e| Error::InvalidInput(format!("Invalid URL expiry: {}", e)))?;

        let url = match options.action {
            UrlAction::Get => self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&self.name)
                .presigned(config)
                .await
                .map_err(|e| vendor_error("presign object URL", e))?
                .uri()
                .to_string(),
            UrlAction::Put => {
                let mut request = self
                    .client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(&self.name);
                if let Some(content_type) = &options.content_type {
                    request = request.content_type(content_type);
                }
                request
                    .presigned(config)
                    .await
                    .map_err(|e| vendor_error("presign object URL", e))?
                    .uri()
                    .to_string()
            }
        };
        Ok(url)
    }
}

/// Driver registering the S3 backend.
pub struct S3Driver;

impl S3Driver {
    /// Identifier the driver is registered under.
    pub const ID: &'static str = "@nimbus/storage-s3";
}

#[async_trait]
impl ProviderDriver for S3Driver {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn open(
        &self,
        ctx: BucketContext,
        credentials: Credentials,
    ) -> Result<Arc<dyn StorageProvider>> {
        let prepared = S3Credentials::prepare(&credentials)?;
        let client = create_client(prepared);
        Ok(Arc::new(S3Provider::new(client, &ctx, &credentials)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials(json: &str) -> Credentials {
        Credentials::from_json(json).unwrap()
    }

    fn minimal_credentials() -> Credentials {
        test_credentials(r#"{"accessKeyId":"AKID","secretAccessKey":"SECRET"}"#)
    }

    fn provider(ctx: &BucketContext, credentials: &Credentials) -> S3Provider {
        let prepared = S3Credentials::prepare(credentials).unwrap();
        S3Provider::new(create_client(prepared), ctx, credentials)
    }

    #[test]
    fn test_driver_id() {
        assert_eq!(S3Driver::ID, "@nimbus/storage-s3");
        assert_eq!(S3Driver.id(), S3Driver::ID);
    }

    #[test]
    fn test_prepare_requires_key_pair() {
        let result = S3Credentials::prepare(&test_credentials(r#"{"accessKeyId":"AKID"}"#));
        assert!(matches!(result, Err(Error::Config(message)) if message.contains("secretAccessKey")));

        let result = S3Credentials::prepare(&test_credentials("{}"));
        assert!(matches!(result, Err(Error::Config(message)) if message.contains("accessKeyId")));
    }

    #[test]
    fn test_prepare_defaults_region_and_reads_endpoint() {
        let prepared = S3Credentials::prepare(&minimal_credentials()).unwrap();
        assert_eq!(prepared.region, "us-east-1");
        assert!(prepared.endpoint.is_none());

        let prepared = S3Credentials::prepare(&test_credentials(
            r#"{"accessKeyId":"AKID","secretAccessKey":"SECRET","region":"eu-west-1","endpoint":"http://localhost:9000"}"#,
        ))
        .unwrap();
        assert_eq!(prepared.region, "eu-west-1");
        assert_eq!(prepared.endpoint.as_deref(), Some("http://localhost:9000"));
    }

    #[test]
    fn test_platform_bucket_name() {
        let namespace = "this-is-a-namespace";
        let web = BucketContext::new(namespace, "https://this.is.a.host.com", true);
        assert_eq!(platform_bucket_name(&web), "this-is-a-namespace-nimbus-io");

        let data = BucketContext::new(namespace, "https://this.is.a.host.com", false);
        assert_eq!(
            platform_bucket_name(&data),
            "data-this-is-a-namespace-nimbus-io"
        );
    }

    #[test]
    fn test_bucket_name_ignores_api_host() {
        let first = BucketContext::new("acme", "https://api.example.com", true);
        let second = BucketContext::new("acme", "https://other.host.net", true);
        assert_eq!(platform_bucket_name(&first), platform_bucket_name(&second));
    }

    #[test]
    fn test_url_derived_from_endpoint_host() {
        let ctx = BucketContext::new("this-is-a-namespace", "https://this.is.a.host.com", true);
        let credentials = test_credentials(
            r#"{"accessKeyId":"AKID","secretAccessKey":"SECRET","endpoint":"https://bucket.host.com"}"#,
        );

        let provider = provider(&ctx, &credentials);
        assert_eq!(
            provider.url(),
            Some("http://this-is-a-namespace-nimbus-io.bucket.host.com".to_string())
        );
    }

    #[test]
    fn test_url_override_wins() {
        let ctx = BucketContext::new("this-is-a-namespace", "https://this.is.a.host.com", true);
        let credentials = test_credentials(
            r#"{"accessKeyId":"AKID","secretAccessKey":"SECRET","endpoint":"https://bucket.host.com","weburl":"http://some_other_address.com"}"#,
        );

        let provider = provider(&ctx, &credentials);
        assert_eq!(
            provider.url(),
            Some("http://some_other_address.com".to_string())
        );
    }

    #[test]
    fn test_url_absent_for_data_buckets() {
        let ctx = BucketContext::new("this-is-a-namespace", "https://this.is.a.host.com", false);
        let credentials = test_credentials(
            r#"{"accessKeyId":"AKID","secretAccessKey":"SECRET","endpoint":"https://bucket.host.com"}"#,
        );

        let provider = provider(&ctx, &credentials);
        assert_eq!(provider.url(), None);
    }

    #[tokio::test]
    async fn test_presigned_url_embeds_exact_expiry() {
        let ctx = BucketContext::new("acme", "https://api.example.com", false);
        let credentials = minimal_credentials();
        let provider = provider(&ctx, &credentials);

        let file = provider.file("greeting.txt");
        let url = file
            .signed_url(SignedUrlOptions {
                expires_in: 86400,
                ..SignedUrlOptions::default()
            })
            .await
            .unwrap();

        assert!(url.contains("X-Amz-Expires=86400"));
        assert!(url.contains("data-acme-nimbus-io"));
        assert!(url.contains("greeting.txt"));
    }

    #[tokio::test]
    async fn test_presigned_put_url_uses_put_method_signature() {
        let ctx = BucketContext::new("acme", "https://api.example.com", false);
        let credentials = minimal_credentials();
        let provider = provider(&ctx, &credentials);

        let file = provider.file("greeting.txt");
        let url = file
            .signed_url(SignedUrlOptions {
                action: UrlAction::Put,
                expires_in: 600,
                content_type: Some("text/plain".to_string()),
                ..SignedUrlOptions::default()
            })
            .await
            .unwrap();

        assert!(url.contains("X-Amz-Expires=600"));
        assert!(url.contains("X-Amz-Signature="));
    }

    #[tokio::test]
    async fn test_driver_open_binds_lazily() {
        // No bucket exists, but the bind is lazy: open succeeds and the
        // handle reports the computed bucket name.
        let ctx = BucketContext::new("acme", "https://api.example.com", false);
        let provider = S3Driver.open(ctx, minimal_credentials()).await.unwrap();
        assert_eq!(provider.id(), "@nimbus/storage-s3");
        assert_eq!(provider.bucket(), "data-acme-nimbus-io");
    }
}
