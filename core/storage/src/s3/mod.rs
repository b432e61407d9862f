//! S3-compatible storage backend.
//!
//! Built on the official AWS SDK, which also covers S3-compatible stores
//! through the `endpoint` credential override. Presigned URLs, bulk delete
//! and website configuration all go through the SDK; bucket names follow
//! the fixed platform-suffix policy (`{namespace}-nimbus-io`).

pub mod provider;

pub use provider::{S3Credentials, S3Driver, S3Provider};
