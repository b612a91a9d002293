//! Calendar-facing domain types: providers, capabilities, intervals, slots.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// External provider kinds Calbridge can talk to.
///
/// `CalDav` covers the app-password CalDAV family (Yandex, iCloud); the
/// OAuth REST providers get their own variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    GoogleCalendar,
    Outlook,
    CalDav,
    Notion,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GoogleCalendar => "google_calendar",
            Self::Outlook => "outlook",
            Self::CalDav => "caldav",
            Self::Notion => "notion",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "google_calendar" => Some(Self::GoogleCalendar),
            "outlook" => Some(Self::Outlook),
            "caldav" => Some(Self::CalDav),
            "notion" => Some(Self::Notion),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability tiers a connector may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CalendarRead,
    CalendarWrite,
    NotesWrite,
}

/// A user's handle on one provider-side calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarHandle {
    pub provider: ProviderKind,
    pub external_id: String,
    pub display_name: String,
    pub is_primary: bool,
    pub is_enabled: bool,
}

/// Calendar metadata as reported by the provider itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCalendar {
    pub id: String,
    pub name: String,
    pub is_primary: bool,
}

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Strict half-open overlap: back-to-back ranges do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether the two ranges overlap or touch (for interval coalescing).
    pub fn touches(&self, other: &TimeRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// A time range during which one calendar reports the user unavailable.
///
/// Derived data: built during availability aggregation and never persisted
/// beyond the aggregation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub range: TimeRange,
    pub source_calendar: String,
}

impl BusyInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, source_calendar: impl Into<String>) -> Self {
        Self { range: TimeRange::new(start, end), source_calendar: source_calendar.into() }
    }
}

/// A ranked free slot proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub range: TimeRange,
    pub score: f64,
}

/// User preferences steering slot ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotPreferences {
    /// Working-hours band (inclusive start hour, exclusive end hour, UTC).
    pub working_hours_start: u32,
    pub working_hours_end: u32,
    pub max_per_day: usize,
    pub max_total: usize,
}

impl Default for SlotPreferences {
    fn default() -> Self {
        Self {
            working_hours_start: 9,
            working_hours_end: 18,
            max_per_day: crate::constants::MAX_SLOTS_PER_DAY,
            max_total: crate::constants::MAX_SLOTS_TOTAL,
        }
    }
}

/// Outcome of a provider-side event write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Created,
    Failed,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// An event as written to (or reported by) a provider. Append-only log
/// entry; immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmedEvent {
    pub external_event_id: String,
    pub calendar_id: String,
    pub provider: ProviderKind,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub html_link: Option<String>,
    pub status: EventStatus,
}

/// A note created on a notes provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedNote {
    pub external_id: String,
    pub title: String,
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn range(start_h: u32, end_h: u32) -> TimeRange {
        TimeRange::new(
            Utc.with_ymd_and_hms(2026, 8, 10, start_h, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 10, end_h, 0, 0).unwrap(),
        )
    }

    #[test]
    fn overlap_is_strict_half_open() {
        assert!(range(10, 12).overlaps(&range(11, 13)));
        assert!(range(10, 12).overlaps(&range(9, 11)));
        // Back-to-back intervals never conflict.
        assert!(!range(10, 12).overlaps(&range(12, 14)));
        assert!(!range(12, 14).overlaps(&range(10, 12)));
    }

    #[test]
    fn touching_ranges_coalesce() {
        assert!(range(10, 12).touches(&range(12, 14)));
        assert!(!range(10, 12).touches(&range(13, 14)));
    }

    #[test]
    fn provider_kind_round_trips() {
        for kind in [
            ProviderKind::GoogleCalendar,
            ProviderKind::Outlook,
            ProviderKind::CalDav,
            ProviderKind::Notion,
        ] {
            assert_eq!(ProviderKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ProviderKind::parse("fax"), None);
    }
}
