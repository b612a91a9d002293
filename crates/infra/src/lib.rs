//! # Calbridge Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - SQLite-backed stores (sessions, rate counters, jobs, credentials)
//! - Per-provider HTTP connectors (Google, Outlook, CalDAV, Notion)
//! - The credential vault and the AI parse/transcription client
//! - The background job executor and the token-refresh sweep scheduler
//!
//! ## Architecture
//! - Implements traits defined in `calbridge-core`
//! - Depends on `calbridge-common`, `calbridge-domain` and `calbridge-core`
//! - Contains all "impure" code (I/O, network, persistence)

pub mod ai;
pub mod config;
pub mod connectors;
pub mod database;
pub mod errors;
pub mod executor;
pub mod gateway;
pub mod http;
pub mod scheduling;
pub mod vault;

// Re-export commonly used items
pub use connectors::ConnectorRegistry;
pub use database::DatabaseManager;
pub use errors::InfraError;
pub use executor::{JobDispatcher, JobExecutor, JobExecutorConfig, LiveDispatcher};
pub use gateway::LiveCalendarGateway;
pub use http::HttpClient;
pub use vault::CredentialVault;
