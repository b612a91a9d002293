//! Draft types produced by the router/classifier.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_EVENT_DURATION_MINUTES;

/// An unconfirmed, provisional calendar event extracted from user input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    pub start: DateTime<Utc>,
    /// Explicit end, when the request named one.
    pub end: Option<DateTime<Utc>>,
    pub duration_minutes: u32,
    pub location: Option<String>,
    pub participants: Vec<String>,
    /// Parser confidence in `[0, 1]`.
    pub confidence: f64,
    /// The raw text the draft was extracted from.
    pub source_text: String,
}

impl EventDraft {
    /// Effective end: the explicit end when present, otherwise start plus
    /// the extracted (or default) duration.
    pub fn end_or_default(&self) -> DateTime<Utc> {
        self.end.unwrap_or_else(|| {
            let minutes = if self.duration_minutes == 0 {
                DEFAULT_EVENT_DURATION_MINUTES
            } else {
                self.duration_minutes
            };
            self.start + Duration::minutes(i64::from(minutes))
        })
    }
}

/// An unconfirmed note draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub confidence: f64,
    pub source_text: String,
}

/// Normalized output of any parsing strategy. A raw parser error is never
/// surfaced; unparseable input becomes `Unclear` with a clarification
/// prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseOutcome {
    Event(EventDraft),
    Note(NoteDraft),
    Unclear {
        prompt: String,
        /// Best-effort partial draft, kept so a clarifying answer can
        /// complete it instead of starting over.
        partial: Option<EventDraft>,
    },
}

impl ParseOutcome {
    pub fn confidence(&self) -> f64 {
        match self {
            Self::Event(draft) => draft.confidence,
            Self::Note(note) => note.confidence,
            Self::Unclear { partial, .. } => {
                partial.as_ref().map(|d| d.confidence).unwrap_or(0.0)
            }
        }
    }

    pub fn is_unclear(&self) -> bool {
        matches!(self, Self::Unclear { .. })
    }
}

/// Video-conference flavors the event creator can attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConferenceKind {
    GoogleMeet,
    Zoom,
}

/// Heuristic: should a conference link be attached to this event?
///
/// Explicit platform mentions win; generic online-meeting vocabulary
/// defaults to Google Meet.
pub fn suggest_conference(title: &str) -> Option<ConferenceKind> {
    let title = title.to_lowercase();

    if title.contains("zoom") {
        return Some(ConferenceKind::Zoom);
    }
    if title.contains("meet") {
        return Some(ConferenceKind::GoogleMeet);
    }

    const ONLINE_KEYWORDS: [&str; 4] = ["call", "sync", "online", "remote"];
    if ONLINE_KEYWORDS.iter().any(|kw| title.contains(kw)) {
        return Some(ConferenceKind::GoogleMeet);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn draft(duration: u32) -> EventDraft {
        EventDraft {
            title: "Meeting".into(),
            start: Utc.with_ymd_and_hms(2026, 8, 10, 15, 0, 0).unwrap(),
            end: None,
            duration_minutes: duration,
            location: None,
            participants: vec![],
            confidence: 0.8,
            source_text: "meeting at 3".into(),
        }
    }

    #[test]
    fn end_defaults_to_duration() {
        let d = draft(90);
        assert_eq!(d.end_or_default(), d.start + Duration::minutes(90));
    }

    #[test]
    fn zero_duration_falls_back_to_default() {
        let d = draft(0);
        assert_eq!(
            d.end_or_default(),
            d.start + Duration::minutes(i64::from(DEFAULT_EVENT_DURATION_MINUTES))
        );
    }

    #[test]
    fn conference_suggestion_prefers_explicit_platform() {
        assert_eq!(suggest_conference("Zoom interview"), Some(ConferenceKind::Zoom));
        assert_eq!(suggest_conference("Meet with design"), Some(ConferenceKind::GoogleMeet));
        assert_eq!(suggest_conference("Weekly sync"), Some(ConferenceKind::GoogleMeet));
        assert_eq!(suggest_conference("Dentist appointment"), None);
    }
}
