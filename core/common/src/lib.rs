//! Common types shared across Nimbus crates.
//!
//! This module provides the error and result types used throughout the
//! codebase, ensuring consistent error reporting.

pub mod error;

pub use error::{Error, Result};
