//! Storage provider trait definition and bucket naming.

use async_trait::async_trait;
use std::path::Path;

use nimbus_common::Result;

use crate::file::StorageFile;

/// Parameters that deterministically select the bucket a provider binds to.
#[derive(Debug, Clone)]
pub struct BucketContext {
    /// Namespace owning the bucket.
    pub namespace: String,
    /// API host the namespace is served from.
    pub api_host: String,
    /// Whether this handle addresses the web bucket or the data bucket.
    pub web: bool,
}

impl BucketContext {
    /// Create a new bucket context.
    pub fn new(namespace: impl Into<String>, api_host: impl Into<String>, web: bool) -> Self {
        Self {
            namespace: namespace.into(),
            api_host: api_host.into(),
            web,
        }
    }
}

/// Collapse an API host URL into a bucket-name-safe token.
///
/// Strips the URL scheme and replaces dots with dashes, so
/// `https://api.example.com` becomes `api-example-com`.
pub fn host_token(api_host: &str) -> String {
    let host = api_host
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    host.replace('.', "-")
}

/// Compute the host-derived bucket name for a context.
///
/// Web buckets are named `{namespace}-{host token}`; data buckets carry an
/// additional `data-` prefix.
pub fn host_bucket_name(ctx: &BucketContext) -> String {
    let prefix = if ctx.web { "" } else { "data-" };
    format!("{}{}-{}", prefix, ctx.namespace, host_token(&ctx.api_host))
}

/// Storage provider bound to a single bucket.
///
/// A provider is obtained through the driver registry and addresses exactly
/// one bucket, selected by its [`BucketContext`] at construction time.
/// All object access goes through [`StorageFile`] handles.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Identifier of the driver that produced this provider.
    fn id(&self) -> &'static str;

    /// Name of the bucket this provider is bound to.
    fn bucket(&self) -> &str;

    /// External URL serving the bucket's content.
    ///
    /// Only web buckets have one: an explicit `weburl` credential takes
    /// precedence, otherwise the provider derives its documented form.
    /// Data buckets return `None`.
    fn url(&self) -> Option<String>;

    /// Configure static-website serving for the bucket.
    ///
    /// # Postconditions
    /// - Requests for a directory resolve to `main_page_suffix`
    /// - Requests for a missing object resolve to `not_found_page`
    async fn set_website(
        &self,
        main_page_suffix: Option<&str>,
        not_found_page: Option<&str>,
    ) -> Result<()>;

    /// Delete every object whose key starts with `prefix`.
    ///
    /// A `None` prefix deletes all objects in the bucket. When nothing
    /// matches, the call succeeds locally without issuing a delete request.
    async fn delete_files(&self, prefix: Option<&str>) -> Result<()>;

    /// Upload a local file to `destination` in a single call.
    ///
    /// The content type and cache-control header are set atomically with
    /// the write. An empty `cache_control` leaves the header unset.
    ///
    /// # Errors
    /// - Local file unreadable
    /// - Network/provider errors
    async fn upload(
        &self,
        local_path: &Path,
        destination: &str,
        content_type: &str,
        cache_control: &str,
    ) -> Result<()>;

    /// Get a handle to an object in the bucket.
    ///
    /// Always succeeds; existence is only checked when the handle is used.
    fn file(&self, destination: &str) -> Box<dyn StorageFile>;

    /// List handles for every object whose key starts with `prefix`.
    ///
    /// The listing is finite and restartable: invoking it again yields the
    /// current bucket contents from the beginning.
    async fn get_files(&self, prefix: Option<&str>) -> Result<Vec<Box<dyn StorageFile>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_token_strips_scheme_and_dots() {
        assert_eq!(host_token("https://api.example.com"), "api-example-com");
        assert_eq!(host_token("http://api.example.com"), "api-example-com");
        assert_eq!(host_token("api.example.com"), "api-example-com");
    }

    #[test]
    fn test_web_bucket_name() {
        let ctx = BucketContext::new("this-is-a-namespace", "https://this.is.a.host.com", true);
        assert_eq!(
            host_bucket_name(&ctx),
            "this-is-a-namespace-this-is-a-host-com"
        );
    }

    #[test]
    fn test_data_bucket_name() {
        let ctx = BucketContext::new("this-is-a-namespace", "https://this.is.a.host.com", false);
        assert_eq!(
            host_bucket_name(&ctx),
            "data-this-is-a-namespace-this-is-a-host-com"
        );
    }

    #[test]
    fn test_web_and_data_names_differ_only_by_prefix() {
        let web = BucketContext::new("acme", "https://api.example.com", true);
        let data = BucketContext::new("acme", "https://api.example.com", false);
        assert_eq!(
            format!("data-{}", host_bucket_name(&web)),
            host_bucket_name(&data)
        );
    }

    proptest::proptest! {
        #[test]
        fn prop_data_prefix_is_the_only_difference(
            namespace in "[a-z][a-z0-9-]{0,24}",
            host in "[a-z][a-z0-9]{0,8}(\\.[a-z][a-z0-9]{0,8}){0,3}",
        ) {
            let web = BucketContext::new(namespace.clone(), format!("https://{}", host), true);
            let data = BucketContext::new(namespace, format!("https://{}", host), false);
            proptest::prop_assert_eq!(
                format!("data-{}", host_bucket_name(&web)),
                host_bucket_name(&data)
            );
            proptest::prop_assert!(!host_bucket_name(&web).contains('.'));
        }
    }
}
