//! Google Calendar connector (Calendar API v3).
//!
//! Busy intervals come from the FreeBusy endpoint rather than a full event
//! listing. Event creation passes a client-generated event id, Google's
//! deduplication primitive: retrying the insert with the same id cannot
//! create a second event.

use async_trait::async_trait;
use calbridge_core::{CalendarRead, CalendarWrite, Connector};
use calbridge_domain::{
    BusyInterval, CalbridgeError, Capability, ConferenceKind, ConfirmedEvent, EventDraft,
    EventStatus, OAuthAppConfig, ProviderAccess, ProviderFailure, ProviderKind, RemoteCalendar,
    Result, TimeRange, TokenRefresh,
};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::response_failure;
use crate::http::HttpClient;

const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const CAPABILITIES: [Capability; 2] = [Capability::CalendarRead, Capability::CalendarWrite];

/// Google Calendar provider adapter.
pub struct GoogleCalendarConnector {
    http: HttpClient,
    app: Option<OAuthAppConfig>,
    api_base: String,
    token_url: String,
}

impl GoogleCalendarConnector {
    pub fn new(http: HttpClient, app: Option<OAuthAppConfig>) -> Self {
        Self {
            http,
            app,
            api_base: GOOGLE_CALENDAR_API_BASE.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    /// Override the endpoints (wiremock-based tests).
    pub fn with_base_urls(mut self, api_base: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.token_url = token_url.into();
        self
    }

    fn bearer<'a>(&self, access: &'a ProviderAccess) -> Result<&'a str> {
        match access {
            ProviderAccess::OAuth { access_token, .. } => Ok(access_token),
            ProviderAccess::AppPassword { .. } => Err(CalbridgeError::InvalidInput(
                "google calendar requires an OAuth credential".into(),
            )),
        }
    }

    fn app(&self) -> Result<&OAuthAppConfig> {
        self.app
            .as_ref()
            .ok_or_else(|| CalbridgeError::Config("google OAuth app is not configured".into()))
    }
}

/// Google requires event ids in base32hex (`0-9a-v`); the idempotency key's
/// hex digest already fits once separators are dropped.
fn sanitize_event_id(client_event_id: &str) -> String {
    client_event_id
        .chars()
        .filter(|c| matches!(c, '0'..='9' | 'a'..='v'))
        .collect()
}

fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CalbridgeError::Serialization(format!("bad datetime {value}: {e}")))
}

#[async_trait]
impl Connector for GoogleCalendarConnector {
    fn provider(&self) -> ProviderKind {
        ProviderKind::GoogleCalendar
    }

    fn capabilities(&self) -> &'static [Capability] {
        &CAPABILITIES
    }

    async fn test_connection(&self, access: &ProviderAccess) -> Result<()> {
        let token = self.bearer(access)?;
        let url = format!("{}/users/me/calendarList", self.api_base);
        let response = self
            .http
            .send(
                self.http
                    .request(Method::GET, &url)
                    .bearer_auth(token)
                    .query(&[("maxResults", "1")]),
            )
            .await?;

        if !response.status().is_success() {
            return Err(response_failure(response).await);
        }
        Ok(())
    }

    async fn refresh_credentials(&self, access: &ProviderAccess) -> Result<TokenRefresh> {
        let app = self.app()?;
        let refresh_token = match access {
            ProviderAccess::OAuth { refresh_token: Some(token), .. } => token,
            _ => {
                return Err(ProviderFailure::PermanentRejection(
                    "no refresh token on google credential".into(),
                )
                .into())
            }
        };

        let response = self
            .http
            .send(self.http.request(Method::POST, &self.token_url).form(&[
                ("client_id", app.client_id.as_str()),
                ("client_secret", app.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ]))
            .await?;

        if !response.status().is_success() {
            return Err(response_failure(response).await);
        }

        let refreshed: GoogleTokenResponse =
            response.json().await.map_err(|e| CalbridgeError::Serialization(e.to_string()))?;
        Ok(TokenRefresh {
            access_token: refreshed.access_token,
            expires_in: refreshed.expires_in,
        })
    }
}

#[async_trait]
impl CalendarRead for GoogleCalendarConnector {
    async fn list_calendars(&self, access: &ProviderAccess) -> Result<Vec<RemoteCalendar>> {
        let token = self.bearer(access)?;
        let url = format!("{}/users/me/calendarList", self.api_base);
        let response =
            self.http.send(self.http.request(Method::GET, &url).bearer_auth(token)).await?;

        if !response.status().is_success() {
            return Err(response_failure(response).await);
        }

        let list: GoogleCalendarList =
            response.json().await.map_err(|e| CalbridgeError::Serialization(e.to_string()))?;
        Ok(list
            .items
            .into_iter()
            .map(|item| RemoteCalendar {
                id: item.id,
                name: item.summary.unwrap_or_default(),
                is_primary: item.primary.unwrap_or(false),
            })
            .collect())
    }

    async fn list_events(
        &self,
        access: &ProviderAccess,
        calendar_id: &str,
        range: &TimeRange,
    ) -> Result<Vec<ConfirmedEvent>> {
        let token = self.bearer(access)?;
        let url = format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        );
        let response = self
            .http
            .send(self.http.request(Method::GET, &url).bearer_auth(token).query(&[
                ("timeMin", rfc3339(range.start)),
                ("timeMax", rfc3339(range.end)),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ]))
            .await?;

        if !response.status().is_success() {
            return Err(response_failure(response).await);
        }

        let events: GoogleEventList =
            response.json().await.map_err(|e| CalbridgeError::Serialization(e.to_string()))?;

        let mut confirmed = Vec::with_capacity(events.items.len());
        for event in events.items {
            let (Some(start), Some(end)) = (event.start.date_time, event.end.date_time) else {
                // All-day events carry dates, not datetimes; skip them here.
                continue;
            };
            confirmed.push(ConfirmedEvent {
                external_event_id: event.id,
                calendar_id: calendar_id.to_string(),
                provider: ProviderKind::GoogleCalendar,
                title: event.summary.unwrap_or_default(),
                start: parse_rfc3339(&start)?,
                end: parse_rfc3339(&end)?,
                html_link: event.html_link,
                status: EventStatus::Created,
            });
        }
        Ok(confirmed)
    }

    async fn busy_intervals(
        &self,
        access: &ProviderAccess,
        calendar_id: &str,
        range: &TimeRange,
    ) -> Result<Vec<BusyInterval>> {
        let token = self.bearer(access)?;
        let url = format!("{}/freeBusy", self.api_base);
        let body = json!({
            "timeMin": rfc3339(range.start),
            "timeMax": rfc3339(range.end),
            "items": [{"id": calendar_id}],
        });

        let response = self
            .http
            .send(self.http.request(Method::POST, &url).bearer_auth(token).json(&body))
            .await?;

        if !response.status().is_success() {
            return Err(response_failure(response).await);
        }

        let freebusy: GoogleFreeBusyResponse =
            response.json().await.map_err(|e| CalbridgeError::Serialization(e.to_string()))?;

        let periods = freebusy
            .calendars
            .get(calendar_id)
            .map(|c| c.busy.clone())
            .unwrap_or_default();

        let mut intervals = Vec::with_capacity(periods.len());
        for period in periods {
            intervals.push(BusyInterval::new(
                parse_rfc3339(&period.start)?,
                parse_rfc3339(&period.end)?,
                calendar_id,
            ));
        }
        debug!(calendar = %calendar_id, count = intervals.len(), "google freebusy fetched");
        Ok(intervals)
    }
}

#[async_trait]
impl CalendarWrite for GoogleCalendarConnector {
    async fn create_event(
        &self,
        access: &ProviderAccess,
        calendar_id: &str,
        draft: &EventDraft,
        client_event_id: &str,
        conference: Option<ConferenceKind>,
    ) -> Result<ConfirmedEvent> {
        let token = self.bearer(access)?;
        let url = format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        );

        let end = draft.end_or_default();
        let mut body = json!({
            "id": sanitize_event_id(client_event_id),
            "summary": draft.title,
            "start": {"dateTime": rfc3339(draft.start)},
            "end": {"dateTime": rfc3339(end)},
        });
        if let Some(location) = &draft.location {
            body["location"] = json!(location);
        }
        if !draft.participants.is_empty() {
            body["description"] = json!(format!("With: {}", draft.participants.join(", ")));
        }
        if matches!(conference, Some(ConferenceKind::GoogleMeet)) {
            body["conferenceData"] = json!({
                "createRequest": {
                    "requestId": sanitize_event_id(client_event_id),
                    "conferenceSolutionKey": {"type": "hangoutsMeet"},
                }
            });
        }

        let response = self
            .http
            .send(
                self.http
                    .request(Method::POST, &url)
                    .bearer_auth(token)
                    .query(&[("conferenceDataVersion", "1")])
                    .json(&body),
            )
            .await?;

        if !response.status().is_success() {
            return Err(response_failure(response).await);
        }

        let created: GoogleEvent =
            response.json().await.map_err(|e| CalbridgeError::Serialization(e.to_string()))?;

        Ok(ConfirmedEvent {
            external_event_id: created.id,
            calendar_id: calendar_id.to_string(),
            provider: ProviderKind::GoogleCalendar,
            title: created.summary.unwrap_or_else(|| draft.title.clone()),
            start: draft.start,
            end,
            html_link: created.html_link,
            status: EventStatus::Created,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarList {
    #[serde(default)]
    items: Vec<GoogleCalendarListItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarListItem {
    id: String,
    summary: Option<String>,
    primary: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct GoogleEventList {
    #[serde(default)]
    items: Vec<GoogleEvent>,
}

#[derive(Debug, Deserialize)]
struct GoogleEvent {
    id: String,
    summary: Option<String>,
    #[serde(default)]
    start: GoogleEventTime,
    #[serde(default)]
    end: GoogleEventTime,
    #[serde(rename = "htmlLink")]
    html_link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GoogleEventTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleFreeBusyResponse {
    #[serde(default)]
    calendars: std::collections::HashMap<String, GoogleFreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct GoogleFreeBusyCalendar {
    #[serde(default)]
    busy: Vec<GoogleBusyPeriod>,
}

#[derive(Debug, Clone, Deserialize)]
struct GoogleBusyPeriod {
    start: String,
    end: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_is_base32hex_safe() {
        let id = sanitize_event_id("create_event:00ffab12cd34ef56");
        assert!(id.chars().all(|c| matches!(c, '0'..='9' | 'a'..='v')));
        assert!(id.len() >= 5);
    }

    #[test]
    fn rfc3339_round_trip() {
        let dt = Utc::now();
        let parsed = parse_rfc3339(&rfc3339(dt)).unwrap();
        assert_eq!(parsed.timestamp(), dt.timestamp());
    }
}
