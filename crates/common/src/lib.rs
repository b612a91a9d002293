//! Shared infrastructure utilities for Calbridge crates.
//!
//! This crate has no domain knowledge. It provides:
//! - Error classification primitives used by retry policies
//! - Authenticated encryption for credential blobs
//! - Retry/backoff strategy shared by the HTTP client and job executor

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod crypto;
pub mod error;
pub mod retry;

pub use crypto::{EncryptedData, EncryptionService};
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
pub use retry::RetryStrategy;
