//! Connector capability port interfaces.
//!
//! One adapter per provider implements the subset of capabilities its
//! provider supports; protocol differences (OAuth REST, CalDAV, webhook
//! bridges) stay behind these traits. Capabilities are composed, not
//! inherited: a notes-only provider implements [`NotesWrite`] and nothing
//! else.
//!
//! Decrypted secrets are passed per call as [`ProviderAccess`] so the
//! credential vault can scope their lifetime to a single connector call.

use async_trait::async_trait;
use calbridge_domain::{
    BusyInterval, Capability, ConferenceKind, ConfirmedEvent, CreatedNote, EventDraft, NoteDraft,
    ProviderAccess, ProviderKind, RemoteCalendar, Result, TimeRange, TokenRefresh,
};

/// Base contract every provider adapter implements.
#[async_trait]
pub trait Connector: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// The capability subset this adapter supports.
    fn capabilities(&self) -> &'static [Capability];

    /// Whether the provider supports token refresh (app-password providers
    /// do not).
    fn supports_refresh(&self) -> bool {
        true
    }

    /// Cheap end-to-end check that the credentials still work.
    async fn test_connection(&self, access: &ProviderAccess) -> Result<()>;

    /// Exchange the refresh token for a new access token.
    async fn refresh_credentials(&self, access: &ProviderAccess) -> Result<TokenRefresh>;
}

/// Calendar-read capability tier.
#[async_trait]
pub trait CalendarRead: Connector {
    async fn list_calendars(&self, access: &ProviderAccess) -> Result<Vec<RemoteCalendar>>;

    async fn list_events(
        &self,
        access: &ProviderAccess,
        calendar_id: &str,
        range: &TimeRange,
    ) -> Result<Vec<ConfirmedEvent>>;

    /// Busy intervals within the range, as the provider reports them.
    /// Unmerged; the availability aggregator coalesces across calendars.
    async fn busy_intervals(
        &self,
        access: &ProviderAccess,
        calendar_id: &str,
        range: &TimeRange,
    ) -> Result<Vec<BusyInterval>>;
}

/// Calendar-write capability tier.
#[async_trait]
pub trait CalendarWrite: Connector {
    /// Create an event.
    ///
    /// `client_event_id` is a deterministic, client-generated identifier;
    /// adapters whose provider offers a deduplication primitive (e.g. a
    /// caller-chosen event id) must pass it through so a retried call cannot
    /// create a duplicate. Providers without one rely on the job executor's
    /// idempotency guard alone. `conference` asks the provider to attach a
    /// video-conference link when it supports one.
    async fn create_event(
        &self,
        access: &ProviderAccess,
        calendar_id: &str,
        draft: &EventDraft,
        client_event_id: &str,
        conference: Option<ConferenceKind>,
    ) -> Result<ConfirmedEvent>;
}

/// Notes-write capability tier.
#[async_trait]
pub trait NotesWrite: Connector {
    /// List databases/folders notes can be filed into.
    async fn list_databases(&self, access: &ProviderAccess) -> Result<Vec<RemoteCalendar>>;

    async fn create_note(
        &self,
        access: &ProviderAccess,
        database_id: Option<&str>,
        note: &NoteDraft,
    ) -> Result<CreatedNote>;
}

/// Convenience trait object for full calendar providers.
pub trait CalendarConnector: CalendarRead + CalendarWrite {}

impl<T: CalendarRead + CalendarWrite> CalendarConnector for T {}
