//! Google Cloud Storage backend.
//!
//! Talks to the Cloud Storage JSON API directly over HTTP:
//! - Service account authentication with automatic token refresh
//! - Object CRUD, listing and bucket website configuration
//! - V2 and V4 signed URLs built locally from the service account key
//! - Host-derived bucket naming

pub mod auth;
pub mod client;
pub mod provider;
pub mod signer;

pub use auth::{AccessToken, GcsCredentials, ServiceAccountKey, TokenManager};
pub use client::GcsClient;
pub use provider::{GcsDriver, GcsProvider};
pub use signer::UrlSigner;

/// User agent sent with every API request.
pub(crate) const USER_AGENT: &str = "NimbusStorage/0.1";
