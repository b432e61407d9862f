//! Google Cloud Storage JSON API client.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use nimbus_common::{Error, Result};

use super::auth::TokenManager;

/// Default Cloud Storage endpoint.
const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Characters kept verbatim when object keys appear in request paths.
/// Everything else, including `/`, is percent-encoded as the JSON API requires.
const OBJECT_KEY_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode an object key for use as a single path segment.
pub fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, OBJECT_KEY_ENCODE).to_string()
}

/// Object metadata from the JSON API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectResource {
    /// Object name (the full key, including any `/` separators).
    pub name: String,
    /// Bucket holding the object.
    #[serde(default)]
    pub bucket: Option<String>,
    /// Content type served with the object.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Object size in bytes, serialized by the API as a decimal string.
    #[serde(default)]
    pub size: Option<String>,
    /// HTTP cache directive attached to the object.
    #[serde(default)]
    pub cache_control: Option<String>,
    /// Last update time.
    #[serde(default)]
    pub updated: Option<String>,
    /// Custom key/value metadata.
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

impl ObjectResource {
    /// Get size as u64.
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_ref().and_then(|s| s.parse().ok())
    }
}

/// Static website configuration on a bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteResource {
    /// Object served for directory requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_page_suffix: Option<String>,
    /// Object served when no key matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_found_page: Option<String>,
}

/// Bucket metadata from the JSON API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketResource {
    /// Bucket name.
    pub name: String,
    /// Bucket location.
    #[serde(default)]
    pub location: Option<String>,
    /// Website configuration, if any.
    #[serde(default)]
    pub website: Option<WebsiteResource>,
}

/// Response from listing objects.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectListResponse {
    #[serde(default)]
    items: Vec<ObjectResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Cloud Storage JSON API client.
pub struct GcsClient {
    http: Client,
    token_manager: std::sync::Arc<TokenManager>,
    api_base: String,
    upload_base: String,
}

impl GcsClient {
    /// Create a client against the public Cloud Storage endpoint.
    pub fn new(token_manager: std::sync::Arc<TokenManager>) -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT, token_manager)
    }

    /// Create a client against an alternate endpoint, e.g. an emulator.
    pub fn with_endpoint(endpoint: &str, token_manager: std::sync::Arc<TokenManager>) -> Self {
        let endpoint = endpoint.trim_end_matches('/');
        let http = Client::builder()
            .user_agent(super::USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            token_manager,
            api_base: format!("{}/storage/v1", endpoint),
            upload_base: format!("{}/upload/storage/v1", endpoint),
        }
    }

    /// Get authorization header.
    async fn auth_header(&self) -> Result<String> {
        let token = self.token_manager.get_access_token().await?;
        Ok(format!("Bearer {}", token))
    }

    /// Get bucket metadata.
    pub async fn get_bucket(&self, bucket: &str) -> Result<BucketResource> {
        let url = format!("{}/b/{}", self.api_base, bucket);
        let auth = self.auth_header().await?;

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to get bucket: {}", e)))?;

        self.handle_response(response).await
    }

    /// Get object metadata by key.
    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectResource> {
        let url = format!("{}/b/{}/o/{}", self.api_base, bucket, encode_key(key));
        let auth = self.auth_header().await?;

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to get object: {}", e)))?;

        self.handle_response(response).await
    }

    /// Download object content.
    pub async fn download_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let url = format!("{}/b/{}/o/{}", self.api_base, bucket, encode_key(key));
        let auth = self.auth_header().await?;

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, auth)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to download object: {}", e)))?;

        if !response.status().is_success() {
            return Err(self.response_error(response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Failed to read object content: {}", e)))?;
        Ok(bytes.to_vec())
    }

    /// Upload object content in a single media request.
    pub async fn upload_media(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<ObjectResource> {
        let url = format!("{}/b/{}/o?uploadType=media", self.upload_base, bucket);
        let auth = self.auth_header().await?;

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, auth)
            .header(header::CONTENT_TYPE, content_type)
            .query(&[("name", key)])
            .body(data)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to upload object: {}", e)))?;

        self.handle_response(response).await
    }

    /// Upload object content together with resource metadata.
    ///
    /// The media variant cannot carry fields like `cacheControl`, so uploads
    /// that set them go through a multipart/related request instead.
    pub async fn upload_multipart(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        cache_control: Option<&str>,
    ) -> Result<ObjectResource> {
        let url = format!("{}/b/{}/o?uploadType=multipart", self.upload_base, bucket);
        let auth = self.auth_header().await?;

        let mut resource = serde_json::json!({
            "name": key,
            "contentType": content_type,
        });
        if let Some(cache_control) = cache_control {
            resource["cacheControl"] = serde_json::json!(cache_control);
        }

        let resource_json = serde_json::to_string(&resource)
            .map_err(|e| Error::InvalidInput(format!("Failed to serialize metadata: {}", e)))?;

        // Build multipart request
        let boundary = "NimbusStorageBoundary";
        let mut body = Vec::new();

        // Metadata part
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(resource_json.as_bytes());
        body.extend_from_slice(b"\r\n");

        // Data part
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(&data);
        body.extend_from_slice(b"\r\n");

        // End boundary
        body.extend_from_slice(format!("--{}--", boundary).as_bytes());

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, auth)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to upload object: {}", e)))?;

        self.handle_response(response).await
    }

    /// Replace the custom metadata map on an object.
    pub async fn patch_object_metadata(
        &self,
        bucket: &str,
        key: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<ObjectResource> {
        let url = format!("{}/b/{}/o/{}", self.api_base, bucket, encode_key(key));
        let auth = self.auth_header().await?;

        let response = self
            .http
            .patch(&url)
            .header(header::AUTHORIZATION, auth)
            .json(&serde_json::json!({ "metadata": metadata }))
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to update object metadata: {}", e)))?;

        self.handle_response(response).await
    }

    /// Delete an object.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let url = format!("{}/b/{}/o/{}", self.api_base, bucket, encode_key(key));
        let auth = self.auth_header().await?;

        let response = self
            .http
            .delete(&url)
            .header(header::AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to delete object: {}", e)))?;

        if response.status() == StatusCode::NO_CONTENT || response.status().is_success() {
            Ok(())
        } else {
            Err(self.response_error(response).await)
        }
    }

    /// List objects in a bucket, optionally restricted to a key prefix.
    ///
    /// Follows `nextPageToken` until the listing is exhausted, so the
    /// returned vector covers the whole bucket.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<ObjectResource>> {
        let url = format!("{}/b/{}/o", self.api_base, bucket);
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let auth = self.auth_header().await?;

            let mut request = self
                .http
                .get(&url)
                .header(header::AUTHORIZATION, auth)
                .query(&[("maxResults", "1000")]);

            if let Some(prefix) = prefix {
                request = request.query(&[("prefix", prefix)]);
            }
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::Network(format!("Failed to list objects: {}", e)))?;

            let list_response: ObjectListResponse = self.handle_response(response).await?;
            objects.extend(list_response.items);

            match list_response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(objects)
    }

    /// Configure static website serving on a bucket.
    pub async fn patch_bucket_website(
        &self,
        bucket: &str,
        website: &WebsiteResource,
    ) -> Result<BucketResource> {
        let url = format!("{}/b/{}", self.api_base, bucket);
        let auth = self.auth_header().await?;

        let response = self
            .http
            .patch(&url)
            .header(header::AUTHORIZATION, auth)
            .json(&serde_json::json!({ "website": website }))
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to configure bucket website: {}", e)))?;

        self.handle_response(response).await
    }

    /// Handle API response with error checking.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T> {
        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| Error::Serialization(format!("Failed to parse response: {}", e)))
        } else {
            Err(self.response_error(response).await)
        }
    }

    /// Map a non-success API response onto the error taxonomy.
    async fn response_error(&self, response: Response) -> Error {
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            Error::NotFound("Resource not found".to_string())
        } else if status == StatusCode::UNAUTHORIZED {
            Error::Authentication("Invalid or expired token".to_string())
        } else if status == StatusCode::FORBIDDEN {
            Error::PermissionDenied("Access denied".to_string())
        } else {
            let body = response.text().await.unwrap_or_default();
            Error::Provider(format!("API error: {} - {}", status, body))
        }
    }
}
