//! Provider-agnostic object storage for Nimbus.
//!
//! This crate exposes a single bucket/file API over heterogeneous cloud
//! backends (Google Cloud Storage, S3-compatible stores, an in-memory
//! backend for tests) and a driver registry for dynamic provider
//! resolution.
//!
//! # Design Principles
//! - Provider isolation: callers never see vendor SDK types
//! - Deferred binding: the backend is selected at runtime from the
//!   `provider` field of the credential bundle
//! - Async operations: all I/O operations are async
//! - Unified error semantics: consistent error types across providers

pub mod credentials;
pub mod factory;
pub mod file;
pub mod gcs;
pub mod memory;
pub mod provider;
pub mod registry;
pub mod s3;

pub use credentials::Credentials;
pub use factory::{storage, storage_from, StorageConfig};
pub use file::{SignatureVersion, SignedUrlOptions, StorageFile, UrlAction};
pub use provider::{BucketContext, StorageProvider};
pub use registry::{create_default_registry, ProviderDriver, ProviderRegistry};
