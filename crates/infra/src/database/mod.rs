//! SQLite-backed implementations of the core store ports.
//!
//! One repository per aggregate, all sharing a pooled connection manager.
//! Blocking rusqlite calls run on the tokio blocking pool so the async
//! request path never stalls on the database.

mod credential_repository;
mod event_log_repository;
mod job_repository;
mod manager;
mod rate_limit_repository;
mod session_repository;

pub use credential_repository::SqliteCredentialStore;
pub use event_log_repository::SqliteEventLog;
pub use job_repository::SqliteJobStore;
pub use manager::DatabaseManager;
pub use rate_limit_repository::SqliteRateCounterStore;
pub use session_repository::SqliteSessionStore;
