//! Generic CalDAV connector (app-password providers: Yandex, iCloud).
//!
//! Speaks the minimal CalDAV subset the scheduling flow needs: PROPFIND for
//! calendar discovery, REPORT time-range queries with lightweight ICS
//! parsing, and PUT of a generated VEVENT. The event UID is the client id,
//! which together with `If-None-Match: *` makes a retried PUT naturally
//! idempotent. App passwords never refresh.

use async_trait::async_trait;
use calbridge_core::{CalendarRead, CalendarWrite, Connector};
use calbridge_domain::constants::{
    CALDAV_MAX_DESCRIPTION_LEN, CALDAV_MAX_LOCATION_LEN, CALDAV_MAX_SUMMARY_LEN,
};
use calbridge_domain::{
    BusyInterval, CalbridgeError, Capability, ConferenceKind, ConfirmedEvent, EventDraft,
    EventStatus, ProviderAccess, ProviderKind, RemoteCalendar, Result, TimeRange, TokenRefresh,
};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Method, StatusCode};
use tracing::debug;

use super::response_failure;
use crate::http::HttpClient;

const CAPABILITIES: [Capability; 2] = [Capability::CalendarRead, Capability::CalendarWrite];

static HREF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*href[^>]*>([^<]+)</[^>]*href[^>]*>").unwrap());
static DISPLAYNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]*displayname[^>]*>([^<]*)</[^>]*displayname[^>]*>").unwrap());
static VEVENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)BEGIN:VEVENT(.*?)END:VEVENT").unwrap());
static DTSTART_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"DTSTART(?:;[^:]*)?:(\d{8}T\d{6}Z?)").unwrap());
static DTEND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"DTEND(?:;[^:]*)?:(\d{8}T\d{6}Z?)").unwrap());
static SUMMARY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"SUMMARY:([^\r\n]*)").unwrap());
static UID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"UID:([^\r\n]*)").unwrap());

/// CalDAV provider adapter.
pub struct CalDavConnector {
    http: HttpClient,
    base_url: String,
}

impl CalDavConnector {
    pub fn new(http: HttpClient, base_url: String) -> Self {
        Self { http, base_url: base_url.trim_end_matches('/').to_string() }
    }

    fn credentials<'a>(&self, access: &'a ProviderAccess) -> Result<(&'a str, &'a str)> {
        match access {
            ProviderAccess::AppPassword { username, password } => Ok((username, password)),
            ProviderAccess::OAuth { .. } => Err(CalbridgeError::InvalidInput(
                "caldav requires an app-password credential".into(),
            )),
        }
    }

    fn principal_path(&self, username: &str) -> String {
        format!("{}/calendars/users/{}/", self.base_url, username)
    }

    fn calendar_url(&self, username: &str, calendar_id: &str) -> String {
        if calendar_id.starts_with('/') {
            format!("{}{}", self.base_url, calendar_id)
        } else {
            format!("{}{}/", self.principal_path(username), calendar_id)
        }
    }

    async fn report_events(
        &self,
        access: &ProviderAccess,
        calendar_id: &str,
        range: &TimeRange,
    ) -> Result<Vec<ParsedVEvent>> {
        let (username, password) = self.credentials(access)?;
        let url = self.calendar_url(username, calendar_id);

        let body = format!(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:prop><C:calendar-data/></D:prop>
  <C:filter>
    <C:comp-filter name="VCALENDAR">
      <C:comp-filter name="VEVENT">
        <C:time-range start="{}" end="{}"/>
      </C:comp-filter>
    </C:comp-filter>
  </C:filter>
</C:calendar-query>"#,
            ics_datetime(range.start),
            ics_datetime(range.end),
        );

        let method = Method::from_bytes(b"REPORT")
            .map_err(|e| CalbridgeError::Internal(format!("REPORT method: {e}")))?;
        let response = self
            .http
            .send(
                self.http
                    .request(method, &url)
                    .basic_auth(username, Some(password))
                    .header("Depth", "1")
                    .header("Content-Type", "application/xml; charset=utf-8")
                    .body(body),
            )
            .await?;

        if !response.status().is_success() {
            return Err(response_failure(response).await);
        }

        let xml = response.text().await.map_err(|e| CalbridgeError::Serialization(e.to_string()))?;
        let mut events: Vec<ParsedVEvent> = VEVENT_RE
            .captures_iter(&xml)
            .filter_map(|caps| parse_vevent(&caps[1]))
            .collect();
        events.sort_by_key(|event| event.start);
        debug!(calendar = %calendar_id, count = events.len(), "caldav events fetched");
        Ok(events)
    }
}

struct ParsedVEvent {
    uid: String,
    summary: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

fn parse_vevent(block: &str) -> Option<ParsedVEvent> {
    let start = parse_ics_datetime(DTSTART_RE.captures(block)?.get(1)?.as_str())?;
    let end = parse_ics_datetime(DTEND_RE.captures(block)?.get(1)?.as_str())?;
    Some(ParsedVEvent {
        uid: UID_RE
            .captures(block)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
        summary: SUMMARY_RE
            .captures(block)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
        start,
        end,
    })
}

fn ics_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Parse `20260808T150000Z` (or the naive form, treated as UTC).
fn parse_ics_datetime(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim_end_matches('Z');
    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y%m%dT%H%M%S").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Truncate to the provider's field limit, preferring a word boundary.
fn truncate_field(value: &str, max_len: usize) -> String {
    if value.chars().count() <= max_len {
        return value.to_string();
    }
    let truncated: String = value.chars().take(max_len.saturating_sub(3)).collect();
    let cut = match truncated.rfind(' ') {
        Some(idx) if idx > max_len / 2 => &truncated[..idx],
        _ => truncated.as_str(),
    };
    format!("{cut}...")
}

/// Escape text for ICS property values.
fn ics_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

#[async_trait]
impl Connector for CalDavConnector {
    fn provider(&self) -> ProviderKind {
        ProviderKind::CalDav
    }

    fn capabilities(&self) -> &'static [Capability] {
        &CAPABILITIES
    }

    fn supports_refresh(&self) -> bool {
        false
    }

    async fn test_connection(&self, access: &ProviderAccess) -> Result<()> {
        let (username, password) = self.credentials(access)?;
        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|e| CalbridgeError::Internal(format!("PROPFIND method: {e}")))?;
        let response = self
            .http
            .send(
                self.http
                    .request(method, self.principal_path(username))
                    .basic_auth(username, Some(password))
                    .header("Depth", "0"),
            )
            .await?;

        if !response.status().is_success() {
            return Err(response_failure(response).await);
        }
        Ok(())
    }

    async fn refresh_credentials(&self, _access: &ProviderAccess) -> Result<TokenRefresh> {
        Err(CalbridgeError::InvalidInput("app-password credentials do not refresh".into()))
    }
}

#[async_trait]
impl CalendarRead for CalDavConnector {
    async fn list_calendars(&self, access: &ProviderAccess) -> Result<Vec<RemoteCalendar>> {
        let (username, password) = self.credentials(access)?;
        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|e| CalbridgeError::Internal(format!("PROPFIND method: {e}")))?;
        let body = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:"><D:prop><D:displayname/><D:resourcetype/></D:prop></D:propfind>"#;

        let response = self
            .http
            .send(
                self.http
                    .request(method, self.principal_path(username))
                    .basic_auth(username, Some(password))
                    .header("Depth", "1")
                    .header("Content-Type", "application/xml; charset=utf-8")
                    .body(body),
            )
            .await?;

        if !response.status().is_success() {
            return Err(response_failure(response).await);
        }

        let xml = response.text().await.map_err(|e| CalbridgeError::Serialization(e.to_string()))?;

        // Pair hrefs with display names per multistatus response block; the
        // principal collection itself has no display name worth keeping.
        let hrefs: Vec<String> =
            HREF_RE.captures_iter(&xml).map(|c| c[1].trim().to_string()).collect();
        let names: Vec<String> =
            DISPLAYNAME_RE.captures_iter(&xml).map(|c| c[1].trim().to_string()).collect();

        let principal = format!("/calendars/users/{username}/");
        Ok(hrefs
            .into_iter()
            .filter(|href| *href != principal)
            .zip(names.into_iter().chain(std::iter::repeat(String::new())))
            .map(|(href, name)| RemoteCalendar {
                id: href.clone(),
                name: if name.is_empty() { href } else { name },
                is_primary: false,
            })
            .collect())
    }

    async fn list_events(
        &self,
        access: &ProviderAccess,
        calendar_id: &str,
        range: &TimeRange,
    ) -> Result<Vec<ConfirmedEvent>> {
        let events = self.report_events(access, calendar_id, range).await?;
        Ok(events
            .into_iter()
            .map(|event| ConfirmedEvent {
                external_event_id: event.uid,
                calendar_id: calendar_id.to_string(),
                provider: ProviderKind::CalDav,
                title: event.summary,
                start: event.start,
                end: event.end,
                html_link: None,
                status: EventStatus::Created,
            })
            .collect())
    }

    async fn busy_intervals(
        &self,
        access: &ProviderAccess,
        calendar_id: &str,
        range: &TimeRange,
    ) -> Result<Vec<BusyInterval>> {
        let events = self.report_events(access, calendar_id, range).await?;
        Ok(events
            .into_iter()
            .map(|event| BusyInterval::new(event.start, event.end, calendar_id))
            .collect())
    }
}

#[async_trait]
impl CalendarWrite for CalDavConnector {
    async fn create_event(
        &self,
        access: &ProviderAccess,
        calendar_id: &str,
        draft: &EventDraft,
        client_event_id: &str,
        _conference: Option<ConferenceKind>,
    ) -> Result<ConfirmedEvent> {
        let (username, password) = self.credentials(access)?;
        let uid = client_event_id.replace(':', "-");
        let url = format!("{}{uid}.ics", self.calendar_url(username, calendar_id));

        let end = draft.end_or_default();
        let summary = ics_escape(&truncate_field(&draft.title, CALDAV_MAX_SUMMARY_LEN));
        let mut vevent = format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//calbridge//EN\r\nBEGIN:VEVENT\r\n\
             UID:{uid}\r\nDTSTAMP:{}\r\nDTSTART:{}\r\nDTEND:{}\r\nSUMMARY:{summary}\r\n",
            ics_datetime(Utc::now()),
            ics_datetime(draft.start),
            ics_datetime(end),
        );
        if let Some(location) = &draft.location {
            vevent.push_str(&format!(
                "LOCATION:{}\r\n",
                ics_escape(&truncate_field(location, CALDAV_MAX_LOCATION_LEN))
            ));
        }
        if !draft.participants.is_empty() {
            let description = format!("With: {}", draft.participants.join(", "));
            vevent.push_str(&format!(
                "DESCRIPTION:{}\r\n",
                ics_escape(&truncate_field(&description, CALDAV_MAX_DESCRIPTION_LEN))
            ));
        }
        vevent.push_str("END:VEVENT\r\nEND:VCALENDAR\r\n");

        let response = self
            .http
            .send(
                self.http
                    .request(Method::PUT, &url)
                    .basic_auth(username, Some(password))
                    .header("Content-Type", "text/calendar; charset=utf-8")
                    .header("If-None-Match", "*")
                    .body(vevent),
            )
            .await?;

        // 412 means an event with this UID already exists: the retried PUT
        // found its earlier effect, which is exactly what idempotency wants.
        if !response.status().is_success() && response.status() != StatusCode::PRECONDITION_FAILED {
            return Err(response_failure(response).await);
        }

        Ok(ConfirmedEvent {
            external_event_id: uid,
            calendar_id: calendar_id.to_string(),
            provider: ProviderKind::CalDav,
            title: draft.title.clone(),
            start: draft.start,
            end,
            html_link: None,
            status: EventStatus::Created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ics_datetime_round_trips() {
        let dt = Utc.with_ymd_and_hms(2026, 8, 8, 15, 0, 0).unwrap();
        assert_eq!(ics_datetime(dt), "20260808T150000Z");
        assert_eq!(parse_ics_datetime("20260808T150000Z"), Some(dt));
        assert_eq!(parse_ics_datetime("20260808T150000"), Some(dt));
        assert_eq!(parse_ics_datetime("garbage"), None);
    }

    #[test]
    fn vevent_blocks_are_parsed() {
        let xml = "prefix BEGIN:VEVENT\r\nUID:abc-1\r\nSUMMARY:Standup\r\n\
                   DTSTART:20260808T090000Z\r\nDTEND:20260808T091500Z\r\nEND:VEVENT suffix";
        let caps = VEVENT_RE.captures(xml).unwrap();
        let event = parse_vevent(&caps[1]).unwrap();
        assert_eq!(event.uid, "abc-1");
        assert_eq!(event.summary, "Standup");
        assert_eq!(event.end - event.start, chrono::Duration::minutes(15));
    }

    #[test]
    fn dtstart_with_tzid_parameter_is_matched() {
        let block = "DTSTART;TZID=Europe/Moscow:20260808T150000\r\nDTEND;TZID=Europe/Moscow:20260808T160000";
        assert!(DTSTART_RE.captures(block).is_some());
        assert!(DTEND_RE.captures(block).is_some());
    }

    #[test]
    fn truncation_respects_word_boundaries() {
        let long = "word ".repeat(100);
        let truncated = truncate_field(&long, 255);
        assert!(truncated.chars().count() <= 255);
        assert!(truncated.ends_with("..."));
        assert!(!truncated.trim_end_matches("...").ends_with("wor"));

        assert_eq!(truncate_field("short", 255), "short");
    }

    #[test]
    fn ics_escaping() {
        assert_eq!(ics_escape("a,b;c\nd"), "a\\,b\\;c\\nd");
    }
}
