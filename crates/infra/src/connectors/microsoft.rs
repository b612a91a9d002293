//! Outlook connector (Microsoft Graph).
//!
//! Graph offers no client-chosen event id, so a retried create relies on the
//! job executor's idempotency guard alone. Busy intervals are derived from
//! the calendar view; the `Prefer: outlook.timezone="UTC"` header pins the
//! returned datetimes to UTC.

use async_trait::async_trait;
use calbridge_core::{CalendarRead, CalendarWrite, Connector};
use calbridge_domain::{
    BusyInterval, CalbridgeError, Capability, ConferenceKind, ConfirmedEvent, EventDraft,
    EventStatus, OAuthAppConfig, ProviderAccess, ProviderFailure, ProviderKind, RemoteCalendar,
    Result, TimeRange, TokenRefresh,
};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use super::response_failure;
use crate::http::HttpClient;

const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
const GRAPH_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const GRAPH_SCOPE: &str = "offline_access Calendars.ReadWrite";

const CAPABILITIES: [Capability; 2] = [Capability::CalendarRead, Capability::CalendarWrite];

/// Outlook provider adapter over Microsoft Graph.
pub struct MicrosoftCalendarConnector {
    http: HttpClient,
    app: Option<OAuthAppConfig>,
    api_base: String,
    token_url: String,
}

impl MicrosoftCalendarConnector {
    pub fn new(http: HttpClient, app: Option<OAuthAppConfig>) -> Self {
        Self {
            http,
            app,
            api_base: GRAPH_API_BASE.to_string(),
            token_url: GRAPH_TOKEN_URL.to_string(),
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
                "outlook requires an OAuth credential".into(),
            )),
        }
    }

    async fn calendar_view(
        &self,
        access: &ProviderAccess,
        calendar_id: &str,
        range: &TimeRange,
    ) -> Result<Vec<GraphEvent>> {
        let token = self.bearer(access)?;
        let url = format!(
            "{}/me/calendars/{}/calendarView",
            self.api_base,
            urlencoding::encode(calendar_id)
        );
        let response = self
            .http
            .send(
                self.http
                    .request(Method::GET, &url)
                    .bearer_auth(token)
                    .header("Prefer", "outlook.timezone=\"UTC\"")
                    .query(&[
                        ("startDateTime", graph_datetime(range.start)),
                        ("endDateTime", graph_datetime(range.end)),
                    ]),
            )
            .await?;

        if !response.status().is_success() {
            return Err(response_failure(response).await);
        }

        let view: GraphEventList =
            response.json().await.map_err(|e| CalbridgeError::Serialization(e.to_string()))?;
        Ok(view.value)
    }
}

fn graph_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Graph returns naive datetimes like `2026-08-08T15:00:00.0000000`; the
/// Prefer header above guarantees they are UTC.
fn parse_graph_datetime(value: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| CalbridgeError::Serialization(format!("bad graph datetime {value}: {e}")))?;
    Ok(Utc.from_utc_datetime(&naive))
}

#[async_trait]
impl Connector for MicrosoftCalendarConnector {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Outlook
    }

    fn capabilities(&self) -> &'static [Capability] {
        &CAPABILITIES
    }

    async fn test_connection(&self, access: &ProviderAccess) -> Result<()> {
        let token = self.bearer(access)?;
        let url = format!("{}/me/calendars", self.api_base);
        let response = self
            .http
            .send(self.http.request(Method::GET, &url).bearer_auth(token).query(&[("$top", "1")]))
            .await?;

        if !response.status().is_success() {
            return Err(response_failure(response).await);
        }
        Ok(())
    }

    async fn refresh_credentials(&self, access: &ProviderAccess) -> Result<TokenRefresh> {
        let app = self
            .app
            .as_ref()
            .ok_or_else(|| CalbridgeError::Config("microsoft OAuth app is not configured".into()))?;
        let refresh_token = match access {
            ProviderAccess::OAuth { refresh_token: Some(token), .. } => token,
            _ => {
                return Err(ProviderFailure::PermanentRejection(
                    "no refresh token on outlook credential".into(),
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
                ("scope", GRAPH_SCOPE),
            ]))
            .await?;

        if !response.status().is_success() {
            return Err(response_failure(response).await);
        }

        let refreshed: GraphTokenResponse =
            response.json().await.map_err(|e| CalbridgeError::Serialization(e.to_string()))?;
        Ok(TokenRefresh {
            access_token: refreshed.access_token,
            expires_in: refreshed.expires_in,
        })
    }
}

#[async_trait]
impl CalendarRead for MicrosoftCalendarConnector {
    async fn list_calendars(&self, access: &ProviderAccess) -> Result<Vec<RemoteCalendar>> {
        let token = self.bearer(access)?;
        let url = format!("{}/me/calendars", self.api_base);
        let response =
            self.http.send(self.http.request(Method::GET, &url).bearer_auth(token)).await?;

        if !response.status().is_success() {
            return Err(response_failure(response).await);
        }

        let list: GraphCalendarList =
            response.json().await.map_err(|e| CalbridgeError::Serialization(e.to_string()))?;
        Ok(list
            .value
            .into_iter()
            .map(|calendar| RemoteCalendar {
                id: calendar.id,
                name: calendar.name,
                is_primary: calendar.is_default_calendar.unwrap_or(false),
            })
            .collect())
    }

    async fn list_events(
        &self,
        access: &ProviderAccess,
        calendar_id: &str,
        range: &TimeRange,
    ) -> Result<Vec<ConfirmedEvent>> {
        let events = self.calendar_view(access, calendar_id, range).await?;

        let mut confirmed = Vec::with_capacity(events.len());
        for event in events {
            confirmed.push(ConfirmedEvent {
                external_event_id: event.id,
                calendar_id: calendar_id.to_string(),
                provider: ProviderKind::Outlook,
                title: event.subject.unwrap_or_default(),
                start: parse_graph_datetime(&event.start.date_time)?,
                end: parse_graph_datetime(&event.end.date_time)?,
                html_link: event.web_link,
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
        let events = self.calendar_view(access, calendar_id, range).await?;

        let mut intervals = Vec::new();
        for event in events {
            // Free-marked events do not block the timeline.
            if event.show_as.as_deref() == Some("free") {
                continue;
            }
            intervals.push(BusyInterval::new(
                parse_graph_datetime(&event.start.date_time)?,
                parse_graph_datetime(&event.end.date_time)?,
                calendar_id,
            ));
        }
        Ok(intervals)
    }
}

#[async_trait]
impl CalendarWrite for MicrosoftCalendarConnector {
    async fn create_event(
        &self,
        access: &ProviderAccess,
        calendar_id: &str,
        draft: &EventDraft,
        _client_event_id: &str,
        conference: Option<ConferenceKind>,
    ) -> Result<ConfirmedEvent> {
        let token = self.bearer(access)?;
        let url = format!(
            "{}/me/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        );

        let end = draft.end_or_default();
        let mut body = json!({
            "subject": draft.title,
            "start": {"dateTime": graph_datetime(draft.start), "timeZone": "UTC"},
            "end": {"dateTime": graph_datetime(end), "timeZone": "UTC"},
        });
        if let Some(location) = &draft.location {
            body["location"] = json!({"displayName": location});
        }
        if !draft.participants.is_empty() {
            body["body"] = json!({
                "contentType": "text",
                "content": format!("With: {}", draft.participants.join(", ")),
            });
        }
        // Teams is the Graph-native conference; a Zoom request degrades to
        // the provider default.
        if conference.is_some() {
            body["isOnlineMeeting"] = json!(true);
            body["onlineMeetingProvider"] = json!("teamsForBusiness");
        }

        let response = self
            .http
            .send(self.http.request(Method::POST, &url).bearer_auth(token).json(&body))
            .await?;

        if !response.status().is_success() {
            return Err(response_failure(response).await);
        }

        let created: GraphEvent =
            response.json().await.map_err(|e| CalbridgeError::Serialization(e.to_string()))?;

        Ok(ConfirmedEvent {
            external_event_id: created.id,
            calendar_id: calendar_id.to_string(),
            provider: ProviderKind::Outlook,
            title: created.subject.unwrap_or_else(|| draft.title.clone()),
            start: draft.start,
            end,
            html_link: created.web_link,
            status: EventStatus::Created,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GraphTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct GraphCalendarList {
    #[serde(default)]
    value: Vec<GraphCalendar>,
}

#[derive(Debug, Deserialize)]
struct GraphCalendar {
    id: String,
    name: String,
    #[serde(rename = "isDefaultCalendar")]
    is_default_calendar: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct GraphEventList {
    #[serde(default)]
    value: Vec<GraphEvent>,
}

#[derive(Debug, Deserialize)]
struct GraphEvent {
    id: String,
    subject: Option<String>,
    start: GraphDateTime,
    end: GraphDateTime,
    #[serde(rename = "webLink")]
    web_link: Option<String>,
    #[serde(rename = "showAs")]
    show_as: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphDateTime {
    #[serde(rename = "dateTime")]
    date_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_datetimes_parse_with_and_without_fraction() {
        let a = parse_graph_datetime("2026-08-08T15:00:00.0000000").unwrap();
        let b = parse_graph_datetime("2026-08-08T15:00:00").unwrap();
        assert_eq!(a, b);
        assert!(parse_graph_datetime("tomorrow").is_err());
    }
}
