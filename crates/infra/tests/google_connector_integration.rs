//! Google connector tests against a mocked provider API.

use calbridge_core::{CalendarRead, CalendarWrite, Connector};
use calbridge_domain::{
    CalbridgeError, EventDraft, ProviderAccess, ProviderFailure, TimeRange,
};
use calbridge_infra::connectors::GoogleCalendarConnector;
use calbridge_infra::HttpClient;
use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn oauth() -> ProviderAccess {
    ProviderAccess::OAuth {
        access_token: "access-1".into(),
        refresh_token: Some("refresh-1".into()),
    }
}

fn draft() -> EventDraft {
    EventDraft {
        title: "Planning".into(),
        start: Utc.with_ymd_and_hms(2026, 8, 8, 15, 0, 0).unwrap(),
        end: Some(Utc.with_ymd_and_hms(2026, 8, 8, 16, 0, 0).unwrap()),
        duration_minutes: 60,
        location: None,
        participants: vec![],
        confidence: 0.9,
        source_text: "planning tomorrow at 3".into(),
    }
}

fn range() -> TimeRange {
    TimeRange::new(
        Utc.with_ymd_and_hms(2026, 8, 8, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 8, 9, 0, 0, 0).unwrap(),
    )
}

async fn connector(server: &MockServer, max_attempts: u32) -> GoogleCalendarConnector {
    let http = HttpClient::builder().max_attempts(max_attempts).build().unwrap();
    GoogleCalendarConnector::new(
        http,
        Some(calbridge_domain::OAuthAppConfig {
            client_id: "cid".into(),
            client_secret: "secret".into(),
        }),
    )
    .with_base_urls(server.uri(), format!("{}/token", server.uri()))
}

#[tokio::test]
async fn freebusy_periods_become_busy_intervals() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/freeBusy"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "calendars": {
                "primary": {
                    "busy": [
                        {"start": "2026-08-08T09:00:00Z", "end": "2026-08-08T10:00:00Z"},
                        {"start": "2026-08-08T15:30:00Z", "end": "2026-08-08T16:30:00Z"}
                    ]
                }
            }
        })))
        .mount(&server)
        .await;

    let connector = connector(&server, 3).await;
    let intervals = connector.busy_intervals(&oauth(), "primary", &range()).await.unwrap();

    assert_eq!(intervals.len(), 2);
    assert_eq!(
        intervals[1].range.start,
        Utc.with_ymd_and_hms(2026, 8, 8, 15, 30, 0).unwrap()
    );
    assert_eq!(intervals[0].source_calendar, "primary");
}

#[tokio::test]
async fn create_event_passes_client_id_for_dedup() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .and(body_partial_json(json!({"summary": "Planning"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "createevent00ffab12cd34ef56",
            "summary": "Planning",
            "htmlLink": "https://calendar.google.com/event?eid=abc",
            "start": {"dateTime": "2026-08-08T15:00:00Z"},
            "end": {"dateTime": "2026-08-08T16:00:00Z"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let connector = connector(&server, 3).await;
    let event = connector
        .create_event(&oauth(), "primary", &draft(), "create_event:00ffab12cd34ef56", None)
        .await
        .unwrap();

    assert_eq!(event.external_event_id, "createevent00ffab12cd34ef56");
    assert_eq!(event.html_link.as_deref(), Some("https://calendar.google.com/event?eid=abc"));
}

#[tokio::test]
async fn unauthorized_maps_to_auth_expired() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;

    let connector = connector(&server, 1).await;
    let err = connector
        .create_event(&oauth(), "primary", &draft(), "key", None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CalbridgeError::Provider(ProviderFailure::AuthExpired)
    ));
}

#[tokio::test]
async fn throttling_maps_to_rate_limited_with_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/freeBusy"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "42")
                .set_body_string("slow down"),
        )
        .mount(&server)
        .await;

    let connector = connector(&server, 1).await;
    let err = connector.busy_intervals(&oauth(), "primary", &range()).await.unwrap_err();

    assert!(matches!(
        err,
        CalbridgeError::Provider(ProviderFailure::RateLimited { retry_after_secs: Some(42) })
    ));
}

#[tokio::test]
async fn server_errors_map_to_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/calendarList"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let connector = connector(&server, 1).await;
    let err = connector.test_connection(&oauth()).await.unwrap_err();

    assert!(matches!(
        err,
        CalbridgeError::Provider(ProviderFailure::Unavailable(_))
    ));
}

#[tokio::test]
async fn bad_request_is_a_permanent_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid start time"))
        .mount(&server)
        .await;

    let connector = connector(&server, 1).await;
    let err = connector
        .create_event(&oauth(), "primary", &draft(), "key", None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CalbridgeError::Provider(ProviderFailure::PermanentRejection(_))
    ));
}

#[tokio::test]
async fn token_refresh_round_trips() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;

    let connector = connector(&server, 3).await;
    let refreshed = connector.refresh_credentials(&oauth()).await.unwrap();

    assert_eq!(refreshed.access_token, "access-2");
    assert_eq!(refreshed.expires_in, 3600);
}

#[tokio::test]
async fn refresh_without_refresh_token_is_permanent() {
    let server = MockServer::start().await;
    let connector = connector(&server, 1).await;

    let access = ProviderAccess::OAuth { access_token: "a".into(), refresh_token: None };
    let err = connector.refresh_credentials(&access).await.unwrap_err();

    assert!(matches!(
        err,
        CalbridgeError::Provider(ProviderFailure::PermanentRejection(_))
    ));
}
