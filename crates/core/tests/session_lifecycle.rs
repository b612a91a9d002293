//! Pending-session state machine integration tests.

mod support;

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use calbridge_core::SessionService;
use calbridge_domain::{
    CalbridgeError, EventDraft, SessionDraft, SessionKey, SessionState,
};

use support::MockSessionStore;

fn draft(title: &str) -> SessionDraft {
    SessionDraft::Event(EventDraft {
        title: title.into(),
        start: Utc.with_ymd_and_hms(2026, 8, 8, 15, 0, 0).unwrap(),
        end: None,
        duration_minutes: 60,
        location: None,
        participants: vec![],
        confidence: 0.9,
        source_text: title.into(),
    })
}

fn service() -> SessionService {
    SessionService::new(Arc::new(MockSessionStore::default()), 30)
}

#[tokio::test]
async fn confirm_transitions_once() {
    let sessions = service();
    let key = SessionKey::new("u1", "c1");

    sessions.open(key.clone(), draft("Standup"), vec![]).await.unwrap();

    let confirmed = sessions.confirm(&key).await.unwrap();
    assert_eq!(confirmed.state, SessionState::Confirmed);

    // A second confirm hits a terminal state and must fail.
    let err = sessions.confirm(&key).await.unwrap_err();
    assert!(matches!(err, CalbridgeError::SessionExpired));
}

#[tokio::test]
async fn new_draft_supersedes_pending_session() {
    let sessions = service();
    let key = SessionKey::new("u1", "c1");

    sessions.open(key.clone(), draft("First"), vec![]).await.unwrap();
    sessions.open(key.clone(), draft("Second"), vec![]).await.unwrap();

    let live = sessions.peek(&key).await.unwrap().expect("session should exist");
    match live.draft {
        SessionDraft::Event(event) => assert_eq!(event.title, "Second"),
        other => panic!("unexpected draft {other:?}"),
    }
}

#[tokio::test]
async fn edit_keeps_session_awaiting() {
    let sessions = service();
    let key = SessionKey::new("u1", "c1");

    sessions.open(key.clone(), draft("Standup"), vec![]).await.unwrap();

    let edited = sessions
        .edit(&key, |draft| {
            if let SessionDraft::Event(event) = draft {
                event.title = "Renamed standup".into();
            }
        })
        .await
        .unwrap();

    assert_eq!(edited.state, SessionState::AwaitingConfirmation);
    match edited.draft {
        SessionDraft::Event(event) => assert_eq!(event.title, "Renamed standup"),
        other => panic!("unexpected draft {other:?}"),
    }
}

#[tokio::test]
async fn calendar_reselection_round_trips() {
    let sessions = service();
    let key = SessionKey::new("u1", "c1");

    sessions.open(key.clone(), draft("Standup"), vec![]).await.unwrap();
    let updated = sessions.reselect_calendar(&key, "work-calendar").await.unwrap();

    assert_eq!(updated.target_calendar.as_deref(), Some("work-calendar"));
    assert_eq!(updated.state, SessionState::AwaitingConfirmation);

    // Still confirmable after reselection.
    assert!(sessions.confirm(&key).await.is_ok());
}

#[tokio::test]
async fn cancelled_session_cannot_be_confirmed() {
    let sessions = service();
    let key = SessionKey::new("u1", "c1");

    sessions.open(key.clone(), draft("Standup"), vec![]).await.unwrap();
    sessions.cancel(&key).await.unwrap();

    let err = sessions.confirm(&key).await.unwrap_err();
    assert!(matches!(err, CalbridgeError::SessionExpired));
}

#[tokio::test]
async fn cancel_of_missing_session_is_noop() {
    let sessions = service();
    assert!(sessions.cancel(&SessionKey::new("u1", "missing")).await.is_ok());
}

#[tokio::test]
async fn expired_session_rejects_confirm() {
    let sessions = service();
    let key = SessionKey::new("u1", "c1");

    // Open in the past so the TTL has already elapsed.
    let past = Utc::now() - Duration::minutes(31);
    sessions.open_at(key.clone(), draft("Standup"), vec![], past).await.unwrap();

    let err = sessions.confirm(&key).await.unwrap_err();
    assert!(matches!(err, CalbridgeError::SessionExpired));

    // The expired record reads as absent.
    assert!(sessions.peek(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn edit_of_expired_session_fails() {
    let sessions = service();
    let key = SessionKey::new("u1", "c1");

    let past = Utc::now() - Duration::minutes(31);
    sessions.open_at(key.clone(), draft("Standup"), vec![], past).await.unwrap();

    let err = sessions.edit(&key, |_| {}).await.unwrap_err();
    assert!(matches!(err, CalbridgeError::SessionExpired));
}
