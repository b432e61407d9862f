//! Storage file trait definition and signed-URL options.

use async_trait::async_trait;
use std::collections::HashMap;

use nimbus_common::Result;

/// Action a signed URL authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlAction {
    /// Read the object.
    Get,
    /// Write the object.
    Put,
}

impl UrlAction {
    /// HTTP method the action maps to.
    pub fn method(&self) -> &'static str {
        match self {
            UrlAction::Get => "GET",
            UrlAction::Put => "PUT",
        }
    }
}

/// Signed-URL scheme selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureVersion {
    /// Legacy query-string signature.
    V2,
    /// Current signature scheme.
    #[default]
    V4,
}

/// Options for generating a signed URL.
#[derive(Debug, Clone)]
pub struct SignedUrlOptions {
    /// Signature scheme. Providers supporting a single scheme ignore this
    /// and sign with their native one.
    pub version: SignatureVersion,
    /// Action the URL authorizes.
    pub action: UrlAction,
    /// Lifetime of the URL in seconds from issuance.
    pub expires_in: u64,
    /// Content type the request must carry. When set, it becomes part of
    /// the signature and the matching header is required on use.
    pub content_type: Option<String>,
}

impl Default for SignedUrlOptions {
    fn default() -> Self {
        Self {
            version: SignatureVersion::default(),
            action: UrlAction::Get,
            expires_in: 3600,
            content_type: None,
        }
    }
}

/// Handle to a single object in a bucket.
///
/// Handles carry identity only (bucket, key, client reference): they are
/// created without any provider round trip and every method call reflects
/// the current remote state.
#[async_trait]
pub trait StorageFile: Send + Sync {
    /// Object key within the bucket.
    fn name(&self) -> &str;

    /// Custom metadata stored with the object.
    ///
    /// Returns an empty map when the object has no metadata or does not
    /// exist.
    async fn metadata(&self) -> Result<HashMap<String, String>>;

    /// Replace the object's custom metadata without altering its content.
    ///
    /// # Errors
    /// - Object not found
    /// - Network/provider errors
    async fn set_metadata(&self, metadata: HashMap<String, String>) -> Result<()>;

    /// Check whether the object exists.
    ///
    /// A provider "not found" response maps to `Ok(false)`; transport and
    /// authentication failures propagate as errors.
    async fn exists(&self) -> Result<bool>;

    /// Delete the object.
    ///
    /// Provider-reported failures are not masked, including whatever the
    /// provider reports for a missing object.
    async fn delete(&self) -> Result<()>;

    /// Write the full object content with the given content type.
    async fn save(&self, data: Vec<u8>, content_type: &str) -> Result<()>;

    /// Read the full object content.
    ///
    /// # Errors
    /// - Object not found
    /// - Network/provider errors
    async fn download(&self) -> Result<Vec<u8>>;

    /// Generate a presigned URL granting direct access to the object.
    ///
    /// The URL expires exactly `options.expires_in` seconds after issuance.
    async fn signed_url(&self, options: SignedUrlOptions) -> Result<String>;
}
