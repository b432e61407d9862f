//! Signed URL generation for Cloud Storage.
//!
//! URLs are signed locally with the service account's RSA key, so no API
//! round trip is needed. Both signature schemes are supported: the legacy
//! V2 query-string form and the V4 form Google documents today. The
//! canonical-string builders are pure functions over their inputs, with the
//! issuance time passed in explicitly.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

use nimbus_common::{Error, Result};

use crate::file::{SignatureVersion, SignedUrlOptions};

use super::auth::GcsCredentials;

const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";
const V4_ALGORITHM: &str = "GOOG4-RSA-SHA256";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Characters kept verbatim in query values and path segments.
const STRICT_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, STRICT_ENCODE).to_string()
}

/// Percent-encode an object key for the URL path, keeping `/` separators.
fn encode_path(key: &str) -> String {
    key.split('/')
        .map(encode_component)
        .collect::<Vec<_>>()
        .join("/")
}

/// String-to-sign for a V2 signed URL.
fn v2_string_to_sign(
    method: &str,
    content_type: Option<&str>,
    expires_at: i64,
    resource: &str,
) -> String {
    format!(
        "{}\n\n{}\n{}\n{}",
        method,
        content_type.unwrap_or(""),
        expires_at,
        resource
    )
}

/// Sorted `name:value` header block and the matching signed-headers list.
fn v4_headers(host: &str, content_type: Option<&str>) -> (String, String) {
    // Header names sort alphabetically; content-type precedes host.
    match content_type {
        Some(content_type) => (
            format!("content-type:{}\nhost:{}\n", content_type, host),
            "content-type;host".to_string(),
        ),
        None => (format!("host:{}\n", host), "host".to_string()),
    }
}

/// Canonical query string for a V4 signed URL, in sorted parameter order.
fn v4_canonical_query(
    client_email: &str,
    timestamp: &str,
    date: &str,
    expires_in: u64,
    signed_headers: &str,
) -> String {
    let credential = format!("{}/{}/auto/storage/goog4_request", client_email, date);
    format!(
        "X-Goog-Algorithm={}&X-Goog-Credential={}&X-Goog-Date={}&X-Goog-Expires={}&X-Goog-SignedHeaders={}",
        V4_ALGORITHM,
        encode_component(&credential),
        timestamp,
        expires_in,
        encode_component(signed_headers)
    )
}

/// Canonical request for a V4 signed URL.
fn v4_canonical_request(
    method: &str,
    canonical_uri: &str,
    canonical_query: &str,
    canonical_headers: &str,
    signed_headers: &str,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method, canonical_uri, canonical_query, canonical_headers, signed_headers, UNSIGNED_PAYLOAD
    )
}

/// String-to-sign derived from a V4 canonical request.
fn v4_string_to_sign(timestamp: &str, date: &str, canonical_request: &str) -> String {
    let digest = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    format!(
        "{}\n{}\n{}/auto/storage/goog4_request\n{}",
        V4_ALGORITHM, timestamp, date, digest
    )
}

/// Signs object URLs with a service account key.
pub struct UrlSigner {
    client_email: String,
    encoding_key: EncodingKey,
    endpoint: String,
    host: String,
}

impl UrlSigner {
    /// Create a signer for the public Cloud Storage endpoint.
    pub fn new(credentials: &GcsCredentials) -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT, credentials)
    }

    /// Create a signer for an alternate endpoint, e.g. an emulator.
    pub fn with_endpoint(endpoint: &str, credentials: &GcsCredentials) -> Result<Self> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let parsed = url::Url::parse(&endpoint)
            .map_err(|e| Error::Config(format!("Invalid storage endpoint: {}", e)))?;
        let mut host = parsed
            .host_str()
            .ok_or_else(|| Error::Config("Storage endpoint has no host".to_string()))?
            .to_string();
        if let Some(port) = parsed.port() {
            host = format!("{}:{}", host, port);
        }

        Ok(Self {
            client_email: credentials.key.client_email.clone(),
            encoding_key: credentials.encoding_key.clone(),
            endpoint,
            host,
        })
    }

    /// Generate a signed URL for an object, issued now.
    pub fn signed_url(
        &self,
        bucket: &str,
        key: &str,
        options: &SignedUrlOptions,
    ) -> Result<String> {
        self.signed_url_at(bucket, key, options, Utc::now())
    }

    /// Generate a signed URL with an explicit issuance time.
    pub fn signed_url_at(
        &self,
        bucket: &str,
        key: &str,
        options: &SignedUrlOptions,
        issued_at: DateTime<Utc>,
    ) -> Result<String> {
        match options.version {
            SignatureVersion::V2 => self.sign_v2(bucket, key, options, issued_at),
            SignatureVersion::V4 => self.sign_v4(bucket, key, options, issued_at),
        }
    }

    fn sign_v2(
        &self,
        bucket: &str,
        key: &str,
        options: &SignedUrlOptions,
        issued_at: DateTime<Utc>,
    ) -> Result<String> {
        let expires_at = issued_at.timestamp() + options.expires_in as i64;
        let resource = format!("/{}/{}", bucket, encode_path(key));
        let string_to_sign = v2_string_to_sign(
            options.action.method(),
            options.content_type.as_deref(),
            expires_at,
            &resource,
        );

        let signature = STANDARD.encode(self.sign_bytes(string_to_sign.as_bytes())?);

        Ok(format!(
            "{}{}?GoogleAccessId={}&Expires={}&Signature={}",
            self.endpoint,
            resource,
            encode_component(&self.client_email),
            expires_at,
            encode_component(&signature)
        ))
    }

    fn sign_v4(
        &self,
        bucket: &str,
        key: &str,
        options: &SignedUrlOptions,
        issued_at: DateTime<Utc>,
    ) -> Result<String> {
        let timestamp = issued_at.format("%Y%m%dT%H%M%SZ").to_string();
        let date = issued_at.format("%Y%m%d").to_string();

        let canonical_uri = format!("/{}/{}", bucket, encode_path(key));
        let (canonical_headers, signed_headers) =
            v4_headers(&self.host, options.content_type.as_deref());
        let canonical_query = v4_canonical_query(
            &self.client_email,
            &timestamp,
            &date,
            options.expires_in,
            &signed_headers,
        );
        let canonical_request = v4_canonical_request(
            options.action.method(),
            &canonical_uri,
            &canonical_query,
            &canonical_headers,
            &signed_headers,
        );
        let string_to_sign = v4_string_to_sign(&timestamp, &date, &canonical_request);

        let signature = hex::encode(self.sign_bytes(string_to_sign.as_bytes())?);

        Ok(format!(
            "{}{}?{}&X-Goog-Signature={}",
            self.endpoint, canonical_uri, canonical_query, signature
        ))
    }

    /// RSA-SHA256 signature of `message` as raw bytes.
    fn sign_bytes(&self, message: &[u8]) -> Result<Vec<u8>> {
        let encoded = jsonwebtoken::crypto::sign(message, &self.encoding_key, Algorithm::RS256)
            .map_err(|e| Error::Authentication(format!("Failed to sign URL: {}", e)))?;
        URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| Error::Authentication(format!("Failed to decode signature: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_path_keeps_separators() {
        assert_eq!(encode_path("folder/file.txt"), "folder/file.txt");
        assert_eq!(encode_path("folder/a file"), "folder/a%20file");
    }

    #[test]
    fn test_v2_string_to_sign_layout() {
        let string_to_sign = v2_string_to_sign(
            "GET",
            None,
            1600000000,
            "/data-acme-api-example-com/greeting.txt",
        );
        assert_eq!(
            string_to_sign,
            "GET\n\n\n1600000000\n/data-acme-api-example-com/greeting.txt"
        );
    }

    #[test]
    fn test_v2_string_to_sign_with_content_type() {
        let string_to_sign = v2_string_to_sign("PUT", Some("text/plain"), 1600000000, "/b/k");
        assert_eq!(string_to_sign, "PUT\n\ntext/plain\n1600000000\n/b/k");
    }

    #[test]
    fn test_v4_headers_sorted() {
        let (headers, signed) = v4_headers("storage.googleapis.com", Some("text/plain"));
        assert_eq!(
            headers,
            "content-type:text/plain\nhost:storage.googleapis.com\n"
        );
        assert_eq!(signed, "content-type;host");

        let (headers, signed) = v4_headers("storage.googleapis.com", None);
        assert_eq!(headers, "host:storage.googleapis.com\n");
        assert_eq!(signed, "host");
    }

    #[test]
    fn test_v4_canonical_query_embeds_exact_expiry() {
        let query = v4_canonical_query(
            "svc@project.iam.gserviceaccount.com",
            "20260101T000000Z",
            "20260101",
            86400,
            "host",
        );
        assert!(query.contains("X-Goog-Expires=86400&"));
        assert!(query.contains("X-Goog-Algorithm=GOOG4-RSA-SHA256"));
        assert!(query.contains(
            "X-Goog-Credential=svc%40project.iam.gserviceaccount.com%2F20260101%2Fauto%2Fstorage%2Fgoog4_request"
        ));
        assert!(query.contains("X-Goog-Date=20260101T000000Z"));
    }

    #[test]
    fn test_v4_canonical_request_layout() {
        let request = v4_canonical_request(
            "GET",
            "/bucket/key.txt",
            "X-Goog-Expires=3600",
            "host:storage.googleapis.com\n",
            "host",
        );
        let lines: Vec<&str> = request.split('\n').collect();
        assert_eq!(
            lines,
            vec![
                "GET",
                "/bucket/key.txt",
                "X-Goog-Expires=3600",
                "host:storage.googleapis.com",
                "",
                "host",
                "UNSIGNED-PAYLOAD",
            ]
        );
    }

    #[test]
    fn test_v4_string_to_sign_hashes_request() {
        let string_to_sign = v4_string_to_sign("20260101T000000Z", "20260101", "request");
        let lines: Vec<&str> = string_to_sign.split('\n').collect();
        assert_eq!(lines[0], "GOOG4-RSA-SHA256");
        assert_eq!(lines[1], "20260101T000000Z");
        assert_eq!(lines[2], "20260101/auto/storage/goog4_request");
        assert_eq!(lines[3], hex::encode(Sha256::digest(b"request")));
    }
}
