//! End-to-end tests of the synchronous request path: parse, aggregate,
//! conflict-check, open a session.

mod support;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};

use calbridge_core::{
    check_conflicts, idempotency_key, jobs, AvailabilityService, ParseRequest, RateLimiter,
    RouterService, SessionService,
};
use calbridge_domain::{
    BusyInterval, CalendarHandle, EventDraft, LimitedOperation, OperationKind, ParseOutcome,
    ProviderKind, RateQuota, SessionDraft, SessionKey, SessionState, TimeRange,
};

use support::{
    MockAiParser, MockCalendarGateway, MockJobQueue, MockRateCounterStore, MockSessionStore,
};

fn handle(id: &str) -> CalendarHandle {
    CalendarHandle {
        provider: ProviderKind::GoogleCalendar,
        external_id: id.to_string(),
        display_name: id.to_string(),
        is_primary: id == "primary",
        is_enabled: true,
    }
}

fn limiter_with_quota(max: u32) -> Arc<RateLimiter> {
    let quotas = HashMap::from([(
        LimitedOperation::AiParse,
        RateQuota { max_requests: max, window: std::time::Duration::from_secs(3600) },
    )]);
    Arc::new(RateLimiter::new(Arc::new(MockRateCounterStore::default()), quotas))
}

// Friday noon UTC; "tomorrow" resolves to Saturday the 8th.
fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap()
}

#[tokio::test]
async fn clear_calendar_yields_confirmable_draft() {
    let ai = Arc::new(MockAiParser::never_called());
    let router = RouterService::new(limiter_with_quota(50), ai.clone());

    let request = ParseRequest {
        user_id: "u1".into(),
        text: "meeting tomorrow 15:00-16:00".into(),
        timezone: "UTC".into(),
        forwarded_from: None,
    };
    let routed = router.route_at(&request, now()).await;

    let draft = match routed.outcome {
        ParseOutcome::Event(draft) => draft,
        other => panic!("expected event draft, got {other:?}"),
    };
    assert_eq!(draft.start, Utc.with_ymd_and_hms(2026, 8, 8, 15, 0, 0).unwrap());
    assert_eq!(draft.end, Some(Utc.with_ymd_and_hms(2026, 8, 8, 16, 0, 0).unwrap()));
    assert_eq!(ai.call_count(), 0);

    // No busy intervals anywhere: zero conflicts.
    let gateway = Arc::new(MockCalendarGateway::default());
    let availability = AvailabilityService::new(gateway);
    let window = TimeRange::new(draft.start, draft.end.unwrap());
    let outcome = availability.busy_timeline("u1", &[handle("primary")], &window).await;
    assert!(outcome.warnings.is_empty());

    let conflicts = check_conflicts(&window, &outcome.timeline);
    assert!(conflicts.is_empty());

    // Session opens awaiting confirmation.
    let sessions = SessionService::new(Arc::new(MockSessionStore::default()), 30);
    let session = sessions
        .open(SessionKey::new("u1", "c1"), SessionDraft::Event(draft), conflicts)
        .await
        .unwrap();
    assert_eq!(session.state, SessionState::AwaitingConfirmation);
}

#[tokio::test]
async fn overlapping_busy_interval_is_reported() {
    let candidate = TimeRange::new(
        Utc.with_ymd_and_hms(2026, 8, 8, 15, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 8, 8, 16, 0, 0).unwrap(),
    );
    let existing = BusyInterval::new(
        Utc.with_ymd_and_hms(2026, 8, 8, 15, 30, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 8, 8, 16, 30, 0).unwrap(),
        "primary",
    );

    let gateway =
        Arc::new(MockCalendarGateway::default().with_busy("primary", vec![existing.clone()]));
    let availability = AvailabilityService::new(gateway);
    let outcome = availability.busy_timeline("u1", &[handle("primary")], &candidate).await;

    let conflicts = check_conflicts(&candidate, &outcome.timeline);
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].range, existing.range);
}

#[tokio::test]
async fn unreachable_calendar_degrades_to_warning() {
    let busy = BusyInterval::new(
        Utc.with_ymd_and_hms(2026, 8, 8, 9, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 8, 8, 10, 0, 0).unwrap(),
        "primary",
    );
    let gateway = Arc::new(
        MockCalendarGateway::default()
            .with_busy("primary", vec![busy.clone()])
            .with_failure("work"),
    );
    let availability = AvailabilityService::new(gateway);

    let range = TimeRange::new(
        Utc.with_ymd_and_hms(2026, 8, 8, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 8, 9, 0, 0, 0).unwrap(),
    );
    let outcome =
        availability.busy_timeline("u1", &[handle("primary"), handle("work")], &range).await;

    // The healthy calendar still contributes; the broken one is a warning.
    assert_eq!(outcome.timeline.len(), 1);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].calendar, "work");
}

#[tokio::test]
async fn exhausted_quota_returns_unclear_without_ai_call() {
    let ai = Arc::new(MockAiParser::never_called());
    let limiter = limiter_with_quota(0);
    let router = RouterService::new(limiter, ai.clone());

    let request = ParseRequest {
        user_id: "u1".into(),
        // Event-shaped but ambiguous for the local parser: no time at all.
        text: "we should probably meet sometime to go over the roadmap".into(),
        timezone: "UTC".into(),
        forwarded_from: None,
    };
    let routed = router.route_at(&request, now()).await;

    assert!(routed.outcome.is_unclear());
    assert!(routed.quota_denied);
    assert_eq!(ai.call_count(), 0, "no AI call may be attempted when the quota is exhausted");
}

#[tokio::test]
async fn ai_failure_degrades_to_local_result() {
    let ai = Arc::new(MockAiParser::new(vec![Err(
        calbridge_domain::CalbridgeError::Internal("model timeout".into()),
    )]));
    let router = RouterService::new(limiter_with_quota(50), ai.clone());

    let request = ParseRequest {
        user_id: "u1".into(),
        text: "we should probably meet sometime to go over the roadmap".into(),
        timezone: "UTC".into(),
        forwarded_from: None,
    };
    let routed = router.route_at(&request, now()).await;

    assert_eq!(ai.call_count(), 1);
    assert!(!routed.used_ai);
    assert!(routed.outcome.is_unclear());
}

#[tokio::test]
async fn repeated_submission_collapses_to_one_job() {
    let queue = MockJobQueue::default();
    let draft = EventDraft {
        title: "Meeting".into(),
        start: Utc.with_ymd_and_hms(2026, 8, 8, 15, 0, 0).unwrap(),
        end: None,
        duration_minutes: 60,
        location: None,
        participants: vec![],
        confidence: 0.9,
        source_text: "meeting tomorrow at 3".into(),
    };

    let mut keys = Vec::new();
    for _ in 0..3 {
        let (key, _) = jobs::submit(&queue, "u1", OperationKind::CreateEvent, &draft)
            .await
            .unwrap();
        keys.push(key);
    }

    assert!(keys.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(queue.accepted_jobs().len(), 1, "duplicates must not enqueue");
}

#[tokio::test]
async fn cached_result_is_returned_for_succeeded_key() {
    let payload = r#"{"title":"Meeting"}"#;
    let key = idempotency_key("u1", OperationKind::CreateEvent, payload);
    let queue = MockJobQueue::default().with_succeeded(&key, r#"{"event_id":"evt-1"}"#);

    let outcome = calbridge_core::ports::JobQueue::enqueue(
        &queue,
        OperationKind::CreateEvent,
        payload.to_string(),
        key,
    )
    .await
    .unwrap();

    match outcome {
        calbridge_core::EnqueueOutcome::AlreadySucceeded(result) => {
            assert!(result.contains("evt-1"));
        }
        other => panic!("expected cached result, got {other:?}"),
    }
    assert!(queue.accepted_jobs().is_empty());
}
