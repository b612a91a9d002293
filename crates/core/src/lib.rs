//! # Calbridge Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits) for stores, connectors, and AI
//!   collaborators
//! - The availability aggregator and conflict/slot finder
//! - The deterministic local parser and the request router/classifier
//! - The pending-session state machine and rate limiter
//!
//! ## Architecture Principles
//! - Only depends on `calbridge-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod availability;
pub mod connector;
pub mod jobs;
pub mod parser;
pub mod ports;
pub mod ratelimit;
pub mod router;
pub mod session;
pub mod slots;

// Re-export specific items to avoid ambiguity
pub use availability::{AggregationOutcome, AggregationWarning, AvailabilityService};
pub use connector::{CalendarConnector, CalendarRead, CalendarWrite, Connector, NotesWrite};
pub use jobs::idempotency_key;
pub use parser::{local_parse, LocalParse};
pub use ports::{
    AiParser, CalendarGateway, CredentialStore, EnqueueOutcome, EventLog, JobQueue, JobStore,
    RateCounterStore, SessionStore, Transcriber,
};
pub use ratelimit::{Acquisition, RateLimiter};
pub use router::{complexity, Complexity, ParseRequest, RoutedParse, RouterService};
pub use session::SessionService;
pub use slots::{check_conflicts, find_slots};
