//! Common data types used throughout the application.

pub mod calendar;
pub mod credentials;
pub mod drafts;
pub mod jobs;
pub mod session;

pub use calendar::{
    BusyInterval, Capability, CalendarHandle, ConfirmedEvent, CreatedNote, EventStatus,
    ProviderKind, RemoteCalendar, SlotPreferences, TimeRange, TimeSlot,
};
pub use credentials::{ProviderAccess, ProviderCredential, TokenRefresh};
pub use drafts::{suggest_conference, ConferenceKind, EventDraft, NoteDraft, ParseOutcome};
pub use jobs::{
    CreateEventPayload, CreateNotePayload, JobRecord, JobStatus, OperationKind, RateQuota,
    LimitedOperation, RefreshTokenPayload, TranscribePayload,
};
pub use session::{PendingSession, SessionDraft, SessionKey, SessionState};
