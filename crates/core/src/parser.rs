//! Deterministic local parser.
//!
//! Rule- and vocabulary-based extraction of event/note drafts from message
//! text: relative-date vocabulary, explicit and named times, durations,
//! locations, participants. Pure function of `(text, timezone, now)` with
//! no I/O, cheap enough to run on every message before any AI escalation
//! is considered.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use calbridge_domain::constants::DEFAULT_EVENT_DURATION_MINUTES;
use calbridge_domain::{EventDraft, NoteDraft, ParseOutcome};

/// Result of a local parsing attempt.
#[derive(Debug, Clone)]
pub struct LocalParse {
    pub outcome: ParseOutcome,
    /// The message looks like an event but deterministic handling could not
    /// pin it down; AI escalation is worthwhile.
    pub needs_ai: bool,
}

const NOTE_KEYWORDS: [&str; 10] = [
    "idea",
    "thought",
    "note",
    "remember to",
    "don't forget",
    "write down",
    "jot down",
    "todo",
    "to-do",
    "shopping list",
];

const EVENT_KEYWORDS: [&str; 20] = [
    "meeting",
    "call",
    "sync",
    "zoom",
    "meet",
    "standup",
    "stand-up",
    "lunch",
    "dinner",
    "breakfast",
    "appointment",
    "interview",
    "webinar",
    "conference",
    "seminar",
    "training",
    "lesson",
    "presentation",
    "demo",
    "1:1",
];

/// Named times of day, first match wins.
const TIME_OF_DAY: [(&str, (u32, u32)); 8] = [
    ("tonight", (19, 0)),
    ("after lunch", (14, 0)),
    ("at lunch", (13, 0)),
    ("lunchtime", (13, 0)),
    ("morning", (10, 0)),
    ("afternoon", (14, 0)),
    ("evening", (19, 0)),
    ("night", (23, 0)),
];

static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:from\s+)?(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\s*(?:-|–|to|until|till)\s*(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\b",
    )
    .unwrap()
});
static CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:at\s+)?(\d{1,2}):(\d{2})\s*(am|pm)?\b").unwrap());
static AT_HOUR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bat\s+(\d{1,2})\s*(am|pm|o'clock)?\b").unwrap());
static HOUR_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,2})\s*(am|pm)\b").unwrap());
static WEEKDAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(next\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b").unwrap()
});
static IN_DAYS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bin\s+(\d{1,2})\s+days?\b").unwrap());
static HOURS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bfor\s+(\d{1,2})\s*(?:hours?|hrs?)\b").unwrap());
static MINUTES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bfor\s+(\d{1,3})\s*(?:minutes?|mins?)\b").unwrap());
static LOCATION_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:location|where|place):\s*([^.,\n]+)").unwrap());
static LOCATION_PLACE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:at|in)\s+(?:the\s+)?((?:cafe|restaurant|office|room|conference room|lobby|park|hotel)(?:\s+[\w'-]+)?)",
    )
    .unwrap()
});
static ZOOM_LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S*zoom\.us/\S+").unwrap());
static MEET_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://meet\.google\.com/\S+").unwrap());
static PARTICIPANT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bwith\s+([A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+)?)").unwrap());
static TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(meeting|call|sync|lunch|dinner|breakfast|interview|presentation|webinar|demo|standup)\s+(?:with\s+)?([a-z][a-z &'-]+?)(?:\s+(?:at|on|in|tomorrow|today|next|from|for)\b|[.,]|$)",
    )
    .unwrap()
});

/// Content classification with a confidence estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentKind {
    Event,
    Note,
    Unclear,
}

fn detect_content_kind(lower: &str, has_time: bool, has_date: bool) -> (ContentKind, f64) {
    let note_score = NOTE_KEYWORDS.iter().filter(|kw| lower.contains(*kw)).count();
    let event_score = EVENT_KEYWORDS.iter().filter(|kw| lower.contains(*kw)).count();

    if note_score > 0 && event_score == 0 && !has_time {
        let confidence = 0.8 + note_score as f64 * 0.05;
        return (ContentKind::Note, confidence.min(0.95));
    }

    if event_score > 0 || has_time {
        let mut confidence = 0.6 + event_score as f64 * 0.1;
        if has_date {
            confidence += 0.1;
        }
        if has_time {
            confidence += 0.1;
        }
        return (ContentKind::Event, confidence.min(0.95));
    }

    if has_date {
        return (ContentKind::Event, 0.5);
    }

    (ContentKind::Unclear, 0.3)
}

/// How the date component of the message was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateSource {
    Absent,
    Relative,
    Weekday,
}

fn extract_date(lower: &str, today: NaiveDate) -> (Option<NaiveDate>, DateSource) {
    if lower.contains("day after tomorrow") {
        return (Some(today + Duration::days(2)), DateSource::Relative);
    }
    if lower.contains("tomorrow") {
        return (Some(today + Duration::days(1)), DateSource::Relative);
    }
    if lower.contains("today") || lower.contains("tonight") {
        return (Some(today), DateSource::Relative);
    }
    if let Some(caps) = IN_DAYS_RE.captures(lower) {
        if let Ok(days) = caps[1].parse::<i64>() {
            return (Some(today + Duration::days(days)), DateSource::Relative);
        }
    }
    if let Some(caps) = WEEKDAY_RE.captures(lower) {
        let target = match &caps[2] {
            "monday" => Weekday::Mon,
            "tuesday" => Weekday::Tue,
            "wednesday" => Weekday::Wed,
            "thursday" => Weekday::Thu,
            "friday" => Weekday::Fri,
            "saturday" => Weekday::Sat,
            _ => Weekday::Sun,
        };
        let mut ahead = (i64::from(target.num_days_from_monday())
            - i64::from(today.weekday().num_days_from_monday()))
        .rem_euclid(7);
        if caps.get(1).is_some() && ahead == 0 {
            ahead = 7;
        }
        return (Some(today + Duration::days(ahead)), DateSource::Weekday);
    }

    (None, DateSource::Absent)
}

fn to_24h(hour: u32, minute: u32, marker: Option<&str>, lower: &str) -> Option<(u32, u32)> {
    if minute > 59 {
        return None;
    }
    let hour = match marker {
        Some("pm") => {
            if hour > 12 {
                return None;
            }
            hour % 12 + 12
        }
        Some("am") => {
            if hour > 12 {
                return None;
            }
            hour % 12
        }
        _ => {
            if hour > 23 {
                return None;
            }
            if hour < 12 && (lower.contains("evening") || lower.contains("tonight")) {
                hour + 12
            } else if hour >= 1
                && hour < 8
                && !lower.contains("morning")
                && !lower.contains("night")
            {
                // Business-hours heuristic: a bare "at 3" means 15:00.
                hour + 12
            } else {
                hour
            }
        }
    };
    Some((hour, minute))
}

fn extract_time_range(lower: &str) -> Option<((u32, u32), (u32, u32))> {
    let caps = RANGE_RE.captures(lower)?;
    let start_hour: u32 = caps[1].parse().ok()?;
    let start_min: u32 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    let end_hour: u32 = caps[4].parse().ok()?;
    let end_min: u32 = caps.get(5).map_or(Ok(0), |m| m.as_str().parse()).ok()?;

    // A marker on either side disambiguates both.
    let start_marker = caps.get(3).map(|m| m.as_str());
    let end_marker = caps.get(6).map(|m| m.as_str());

    let start = to_24h(start_hour, start_min, start_marker.or(end_marker), lower)?;
    let mut end = to_24h(end_hour, end_min, end_marker.or(start_marker), lower)?;

    // "10 to 2" crosses noon: push the end into the afternoon.
    if end <= start {
        if end.0 + 12 <= 23 {
            end = (end.0 + 12, end.1);
        } else {
            return None;
        }
    }
    Some((start, end))
}

fn extract_explicit_time(lower: &str) -> Option<(u32, u32)> {
    if let Some(caps) = CLOCK_RE.captures(lower) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        return to_24h(hour, minute, caps.get(3).map(|m| m.as_str()), lower);
    }
    if let Some(caps) = AT_HOUR_RE.captures(lower) {
        let hour: u32 = caps[1].parse().ok()?;
        let marker = caps.get(2).map(|m| m.as_str()).filter(|m| *m != "o'clock");
        return to_24h(hour, 0, marker, lower);
    }
    if let Some(caps) = HOUR_MARKER_RE.captures(lower) {
        let hour: u32 = caps[1].parse().ok()?;
        return to_24h(hour, 0, caps.get(2).map(|m| m.as_str()), lower);
    }
    None
}

fn extract_time_of_day(lower: &str) -> Option<(u32, u32)> {
    TIME_OF_DAY
        .iter()
        .find(|(word, _)| lower.contains(word))
        .map(|(_, time)| *time)
}

/// Duration in minutes, defaulting to an hour.
fn extract_duration(lower: &str) -> u32 {
    if let Some(caps) = HOURS_RE.captures(lower) {
        if let Ok(hours) = caps[1].parse::<u32>() {
            return hours * 60;
        }
    }
    if let Some(caps) = MINUTES_RE.captures(lower) {
        if let Ok(minutes) = caps[1].parse::<u32>() {
            return minutes;
        }
    }
    if lower.contains("half an hour") {
        return 30;
    }
    if lower.contains("an hour and a half") || lower.contains("hour and a half") {
        return 90;
    }
    DEFAULT_EVENT_DURATION_MINUTES
}

fn extract_location(text: &str, lower: &str) -> Option<String> {
    // Meeting links are the strongest location signal.
    if let Some(m) = ZOOM_LINK_RE.find(text).or_else(|| MEET_LINK_RE.find(text)) {
        return Some(m.as_str().trim_end_matches(['.', ',']).to_string());
    }
    if let Some(caps) = LOCATION_LABEL_RE.captures(lower) {
        return Some(caps[1].trim().to_string());
    }
    if let Some(caps) = LOCATION_PLACE_RE.captures(lower) {
        return Some(caps[1].trim().to_string());
    }
    None
}

fn extract_participants(text: &str) -> Vec<String> {
    const NON_NAMES: [&str; 12] = [
        "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday", "Zoom",
        "Google", "Meet", "Teams", "Tomorrow",
    ];

    let mut participants = Vec::new();
    for caps in PARTICIPANT_RE.captures_iter(text) {
        let name = caps[1].trim().to_string();
        if NON_NAMES.iter().any(|w| name.starts_with(w)) {
            continue;
        }
        if !participants.contains(&name) {
            participants.push(name);
        }
    }
    participants
}

fn capitalize_words(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_title(text: &str, lower: &str) -> String {
    if let Some(caps) = TITLE_RE.captures(lower) {
        let kind = capitalize_words(&caps[1]);
        let subject = caps[2].trim();
        if subject.len() > 2 {
            return format!("{}: {}", kind, capitalize_words(subject));
        }
        return kind;
    }

    let first_line = text.lines().next().unwrap_or(text);
    if first_line.chars().count() > 50 {
        let mut title: String = first_line.chars().take(50).collect();
        title.push_str("...");
        title
    } else {
        first_line.to_string()
    }
}

fn to_utc(tz: Tz, date: NaiveDate, (hour, minute): (u32, u32)) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        chrono::LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
        // DST gap: nudge forward an hour.
        chrono::LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

/// Parse message text without any network calls.
///
/// `now` is injected so relative vocabulary resolves deterministically in
/// tests; production callers pass `Utc::now()`.
pub fn local_parse(text: &str, tz: Tz, now: DateTime<Utc>) -> LocalParse {
    let lower = text.to_lowercase();
    let now_local = now.with_timezone(&tz);
    let today = now_local.date_naive();

    let time_range = extract_time_range(&lower);
    let explicit_time = extract_explicit_time(&lower);
    let named_time = extract_time_of_day(&lower);
    let has_time = time_range.is_some() || explicit_time.is_some() || named_time.is_some();

    let (date, date_source) = extract_date(&lower, today);
    let has_date = date.is_some();

    let (kind, mut confidence) = detect_content_kind(&lower, has_time, has_date);

    if kind == ContentKind::Note {
        let title = text
            .split(['.', '!', '?', '\n'])
            .next()
            .unwrap_or(text)
            .trim()
            .chars()
            .take(100)
            .collect::<String>();
        return LocalParse {
            outcome: ParseOutcome::Note(NoteDraft {
                title,
                content: text.to_string(),
                confidence,
                source_text: text.to_string(),
            }),
            needs_ai: false,
        };
    }

    if kind == ContentKind::Unclear {
        return LocalParse {
            outcome: ParseOutcome::Unclear {
                prompt: "I couldn't tell whether that's an event or a note. \
                         Could you add a date and time, or say it's a note?"
                    .to_string(),
                partial: None,
            },
            needs_ai: confidence < 0.5,
        };
    }

    // Event: combine date and time parts.
    let duration_minutes = extract_duration(&lower);
    let location = extract_location(text, &lower);
    let participants = extract_participants(text);
    let title = extract_title(text, &lower);

    let start_time = time_range.map(|(start, _)| start).or(explicit_time).or(named_time);

    let resolved = match (date, start_time) {
        (Some(date), Some(time)) => to_utc(tz, date, time).map(|start| (start, date_source)),
        (None, Some(time)) => to_utc(tz, today, time).map(|start| (start, DateSource::Absent)),
        _ => None,
    };

    let Some((mut start, source)) = resolved else {
        // Event-shaped but no resolvable datetime: hand the partial context
        // to a clarification round (or the AI fallback).
        let partial = date.and_then(|d| to_utc(tz, d, (10, 0))).map(|start| EventDraft {
            title: title.clone(),
            start,
            end: None,
            duration_minutes,
            location: location.clone(),
            participants: participants.clone(),
            confidence: 0.4,
            source_text: text.to_string(),
        });
        return LocalParse {
            outcome: ParseOutcome::Unclear {
                prompt: "What time should I schedule that for?".to_string(),
                partial,
            },
            needs_ai: true,
        };
    };

    // Prefer future occurrences: a time already past rolls forward.
    let mut end = time_range
        .map(|(_, end_time)| end_time)
        .and_then(|end_time| to_utc(tz, start.with_timezone(&tz).date_naive(), end_time));
    if start <= now {
        let shift = match source {
            DateSource::Weekday => Duration::days(7),
            _ => Duration::days(1),
        };
        start += shift;
        end = end.map(|e| e + shift);
    }

    confidence = confidence.max(if has_date { 0.7 } else { 0.6 });

    LocalParse {
        outcome: ParseOutcome::Event(EventDraft {
            title,
            start,
            end,
            duration_minutes,
            location,
            participants,
            confidence,
            source_text: text.to_string(),
        }),
        needs_ai: false,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::Tz;

    use super::*;

    // Friday noon UTC.
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap()
    }

    fn parse(text: &str) -> LocalParse {
        local_parse(text, Tz::UTC, now())
    }

    fn event(parse: &LocalParse) -> &EventDraft {
        match &parse.outcome {
            ParseOutcome::Event(draft) => draft,
            other => panic!("expected event draft, got {other:?}"),
        }
    }

    #[test]
    fn tomorrow_with_explicit_range() {
        let parsed = parse("Meeting with Anna tomorrow 15:00-16:00");
        let draft = event(&parsed);

        assert_eq!(draft.start, Utc.with_ymd_and_hms(2026, 8, 8, 15, 0, 0).unwrap());
        assert_eq!(draft.end, Some(Utc.with_ymd_and_hms(2026, 8, 8, 16, 0, 0).unwrap()));
        assert_eq!(draft.participants, vec!["Anna".to_string()]);
        assert!(draft.confidence >= 0.7);
        assert!(!parsed.needs_ai);
    }

    #[test]
    fn bare_afternoon_hour_gets_pm_heuristic() {
        let parsed = parse("meeting tomorrow at 3");
        let draft = event(&parsed);
        assert_eq!(draft.start, Utc.with_ymd_and_hms(2026, 8, 8, 15, 0, 0).unwrap());
    }

    #[test]
    fn morning_context_suppresses_pm_heuristic() {
        let parsed = parse("call tomorrow at 7 in the morning");
        let draft = event(&parsed);
        assert_eq!(draft.start, Utc.with_ymd_and_hms(2026, 8, 8, 7, 0, 0).unwrap());
    }

    #[test]
    fn time_without_date_prefers_future() {
        // 9am has already passed at the injected noon "now".
        let parsed = parse("standup at 9am");
        let draft = event(&parsed);
        assert_eq!(draft.start, Utc.with_ymd_and_hms(2026, 8, 8, 9, 0, 0).unwrap());
    }

    #[test]
    fn weekday_resolves_to_next_occurrence() {
        let parsed = parse("interview on monday at 11:00");
        let draft = event(&parsed);
        // 2026-08-07 is a Friday; next Monday is the 10th.
        assert_eq!(draft.start, Utc.with_ymd_and_hms(2026, 8, 10, 11, 0, 0).unwrap());
    }

    #[test]
    fn duration_extraction() {
        let parsed = parse("sync tomorrow at 2pm for 30 minutes");
        let draft = event(&parsed);
        assert_eq!(draft.duration_minutes, 30);

        let parsed = parse("workshop tomorrow at 2pm for 2 hours");
        assert_eq!(event(&parsed).duration_minutes, 120);
    }

    #[test]
    fn meeting_link_becomes_location() {
        let parsed = parse("call tomorrow at 4pm https://meet.google.com/abc-defg-hij");
        let draft = event(&parsed);
        assert_eq!(draft.location.as_deref(), Some("https://meet.google.com/abc-defg-hij"));
    }

    #[test]
    fn note_keywords_without_time_yield_note() {
        let parsed = parse("idea: add dark mode to the settings screen");
        match &parsed.outcome {
            ParseOutcome::Note(note) => {
                assert!(note.title.starts_with("idea"));
                assert!(note.confidence >= 0.8);
            }
            other => panic!("expected note, got {other:?}"),
        }
        assert!(!parsed.needs_ai);
    }

    #[test]
    fn event_without_time_requests_clarification() {
        let parsed = parse("meeting with Bob tomorrow");
        match &parsed.outcome {
            ParseOutcome::Unclear { partial, .. } => {
                assert!(partial.is_some());
            }
            other => panic!("expected unclear, got {other:?}"),
        }
        assert!(parsed.needs_ai);
    }

    #[test]
    fn gibberish_is_unclear_and_low_confidence() {
        let parsed = parse("hmm maybe later perhaps");
        assert!(parsed.outcome.is_unclear());
        assert!(parsed.needs_ai);
    }

    #[test]
    fn title_combines_kind_and_subject() {
        let parsed = parse("interview with Dana tomorrow at 10am");
        let draft = event(&parsed);
        assert!(draft.title.starts_with("Interview"));
    }
}
