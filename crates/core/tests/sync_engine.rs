//! Incremental reconciliation behaviour of `SyncEngine::sync_calendar`.

mod support;

use calsync_domain::{
    CalSyncError, CredentialOwner, EventStatus, SkipReason, SyncOutcome, SyncSummary,
};
use support::{calendar, credentials, event, page, Harness};

fn summary(outcome: SyncOutcome) -> SyncSummary {
    match outcome {
        SyncOutcome::Synced(summary) => summary,
        SyncOutcome::Skipped { reason } => panic!("expected a sync, got skip: {reason:?}"),
    }
}

#[tokio::test]
async fn full_sync_then_empty_delta_keeps_token() {
    let h = Harness::new().with_calendar(calendar("C1"));
    h.provider.push_page(Ok(page(
        vec![event("E1", EventStatus::Confirmed), event("E2", EventStatus::Cancelled)],
        None,
        Some("tok-1"),
    )));

    let first = summary(h.engine.sync_calendar("C1").await.unwrap());
    assert_eq!((first.created, first.updated, first.cancelled), (1, 0, 1));
    assert!(first.full_sync);
    assert_eq!(first.next_sync_token.as_deref(), Some("tok-1"));

    let events = h.registry.events("C1");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].provider_event_id, "E1");
    assert!(!events[0].is_deleted());
    assert_eq!(events[1].provider_event_id, "E2");
    assert!(events[1].is_deleted());
    assert_eq!(h.registry.calendar("C1").unwrap().sync_token.as_deref(), Some("tok-1"));

    // Delta fetch with no changes: same token comes back, nothing moves.
    h.provider.push_page(Ok(page(vec![], None, Some("tok-1"))));
    let second = summary(h.engine.sync_calendar("C1").await.unwrap());
    assert_eq!(second.total(), 0);
    assert!(!second.full_sync);

    let calls = h.provider.fetch_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].sync_token, None);
    assert_eq!(calls[1].sync_token.as_deref(), Some("tok-1"));
    assert_eq!(h.registry.events("C1"), events);
    assert_eq!(h.registry.calendar("C1").unwrap().sync_token.as_deref(), Some("tok-1"));
}

#[tokio::test]
async fn applying_the_same_batch_twice_is_idempotent() {
    let h = Harness::new().with_calendar(calendar("C1"));
    let batch = vec![
        event("A", EventStatus::Confirmed),
        event("B", EventStatus::Tentative),
        event("C", EventStatus::Cancelled),
    ];
    h.provider.push_page(Ok(page(batch.clone(), None, Some("tok-1"))));
    h.provider.push_page(Ok(page(batch, None, Some("tok-2"))));

    h.engine.sync_calendar("C1").await.unwrap();
    let once = h.registry.events("C1");

    let again = summary(h.engine.sync_calendar("C1").await.unwrap());
    assert_eq!((again.created, again.updated, again.cancelled), (0, 2, 1));
    assert_eq!(h.registry.events("C1"), once);
}

#[tokio::test]
async fn interrupted_batch_keeps_previous_token_and_replays() {
    let mut cal = calendar("C1");
    cal.sync_token = Some("tok-0".into());
    let h = Harness::new().with_calendar(cal);

    let batch = vec![
        event("A", EventStatus::Confirmed),
        event("B", EventStatus::Confirmed),
        event("C", EventStatus::Cancelled),
    ];
    h.provider.push_page(Ok(page(batch.clone(), None, Some("tok-1"))));
    h.registry.fail_upserts_after(1);

    let err = h.engine.sync_calendar("C1").await.unwrap_err();
    assert!(matches!(err, CalSyncError::Database(_)));
    assert_eq!(h.registry.calendar("C1").unwrap().sync_token.as_deref(), Some("tok-0"));
    assert_eq!(h.registry.events("C1").len(), 1);

    h.registry.heal();
    h.provider.push_page(Ok(page(batch, None, Some("tok-1"))));
    let replay = summary(h.engine.sync_calendar("C1").await.unwrap());

    let calls = h.provider.fetch_calls();
    assert_eq!(calls[1].sync_token.as_deref(), Some("tok-0"));
    assert_eq!((replay.created, replay.updated, replay.cancelled), (1, 1, 1));
    assert_eq!(h.registry.events("C1").len(), 3);
    assert_eq!(h.registry.calendar("C1").unwrap().sync_token.as_deref(), Some("tok-1"));
}

#[tokio::test]
async fn expired_token_triggers_exactly_one_full_resync() {
    let mut cal = calendar("C1");
    cal.sync_token = Some("stale".into());
    let h = Harness::new().with_calendar(cal);

    h.provider.push_page(Err(CalSyncError::SyncTokenExpired("410 Gone".into())));
    h.provider.push_page(Ok(page(vec![event("E1", EventStatus::Confirmed)], None, Some("fresh"))));

    let result = summary(h.engine.sync_calendar("C1").await.unwrap());
    assert!(result.recovered_from_expired_token);
    assert!(result.full_sync);
    assert_eq!(result.created, 1);

    let calls = h.provider.fetch_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].sync_token.as_deref(), Some("stale"));
    assert_eq!(calls[1].sync_token, None);
    assert_eq!(h.registry.calendar("C1").unwrap().sync_token.as_deref(), Some("fresh"));
}

#[tokio::test]
async fn second_consecutive_token_expiry_is_surfaced() {
    let mut cal = calendar("C1");
    cal.sync_token = Some("stale".into());
    let h = Harness::new().with_calendar(cal);

    h.provider.push_page(Err(CalSyncError::SyncTokenExpired("410 Gone".into())));
    h.provider.push_page(Err(CalSyncError::SyncTokenExpired("410 Gone again".into())));
    h.provider.push_page(Ok(page(vec![event("never", EventStatus::Confirmed)], None, Some("x"))));

    let err = h.engine.sync_calendar("C1").await.unwrap_err();
    assert!(matches!(err, CalSyncError::SyncTokenExpired(_)));
    assert_eq!(h.provider.fetch_calls().len(), 2);
    assert!(h.registry.events("C1").is_empty());
    // The rejected token stays discarded; the next pass starts from scratch.
    assert_eq!(h.registry.calendar("C1").unwrap().sync_token, None);
}

#[tokio::test]
async fn pages_are_followed_until_exhausted() {
    let h = Harness::new().with_calendar(calendar("C1"));
    h.provider.push_page(Ok(page(vec![event("A", EventStatus::Confirmed)], Some("p2"), None)));
    h.provider.push_page(Ok(page(vec![event("B", EventStatus::Confirmed)], Some("p3"), None)));
    h.provider.push_page(Ok(page(vec![event("C", EventStatus::Confirmed)], None, Some("tok"))));

    let result = summary(h.engine.sync_calendar("C1").await.unwrap());
    assert_eq!(result.created, 3);

    let page_tokens: Vec<_> =
        h.provider.fetch_calls().into_iter().map(|call| call.page_token).collect();
    assert_eq!(page_tokens, vec![None, Some("p2".to_string()), Some("p3".to_string())]);
    assert_eq!(h.registry.calendar("C1").unwrap().sync_token.as_deref(), Some("tok"));
}

#[tokio::test]
async fn provider_outage_leaves_state_unchanged() {
    let mut cal = calendar("C1");
    cal.sync_token = Some("tok-0".into());
    let h = Harness::new().with_calendar(cal);
    h.provider.push_page(Err(CalSyncError::ProviderUnavailable("503".into())));

    let err = h.engine.sync_calendar("C1").await.unwrap_err();
    assert!(matches!(err, CalSyncError::ProviderUnavailable(_)));
    assert_eq!(h.registry.mutation_count(), 0);
}

#[tokio::test]
async fn missing_and_inactive_calendars_are_skipped() {
    let mut inactive = calendar("C2");
    inactive.is_active = false;
    let h = Harness::new().with_calendar(inactive);

    let missing = h.engine.sync_calendar("nope").await.unwrap();
    assert_eq!(missing, SyncOutcome::Skipped { reason: SkipReason::CalendarNotFound });

    let skipped = h.engine.sync_calendar("C2").await.unwrap();
    assert_eq!(skipped, SyncOutcome::Skipped { reason: SkipReason::CalendarInactive });

    assert!(h.provider.fetch_calls().is_empty());
    assert_eq!(h.registry.mutation_count(), 0);
}

#[tokio::test]
async fn missing_credentials_skip_the_pass() {
    let h = Harness::new().with_calendar(calendar("C1"));
    h.tokens.remove(&CredentialOwner::Account("acc-1".into()));

    let outcome = h.engine.sync_calendar("C1").await.unwrap();
    assert_eq!(outcome, SyncOutcome::Skipped { reason: SkipReason::CredentialsNotFound });
    assert!(h.provider.fetch_calls().is_empty());
}

#[tokio::test]
async fn connected_account_credentials_are_used_when_set() {
    let mut cal = calendar("C1");
    cal.connected_account_id = Some("conn-1".into());
    let h = Harness::new().with_calendar(cal);
    h.tokens.insert(credentials(CredentialOwner::ConnectedAccount("conn-1".into()), "conn-token"));
    h.provider.push_page(Ok(page(vec![], None, Some("tok"))));

    h.engine.sync_calendar("C1").await.unwrap();

    let calls = h.provider.fetch_calls();
    assert_eq!(calls[0].access_token, "conn-token");
    assert_eq!(calls[0].calendar_id, "C1@group.calendar.google.com");
}

#[tokio::test]
async fn concurrent_syncs_of_one_calendar_converge() {
    let h = Harness::new().with_calendar(calendar("C1"));
    let batch = vec![event("A", EventStatus::Confirmed), event("B", EventStatus::Cancelled)];
    h.provider.push_page(Ok(page(batch.clone(), None, Some("tok-1"))));
    h.provider.push_page(Ok(page(batch, None, Some("tok-1"))));

    let (a, b) = tokio::join!(h.engine.sync_calendar("C1"), h.engine.sync_calendar("C1"));
    a.unwrap();
    b.unwrap();

    let events = h.registry.events("C1");
    assert_eq!(events.len(), 2);
    assert!(events[1].is_deleted());
    assert_eq!(h.registry.calendar("C1").unwrap().sync_token.as_deref(), Some("tok-1"));
}
