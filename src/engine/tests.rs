use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveTime, TimeZone, Utc};
use tracing_test::traced_test;
use ulid::Ulid;

use super::*;
use crate::limits::MAX_REASON_LEN;
use crate::notify::{NotificationStore, NotifyError};
use crate::wal::Wal;

// ── Helpers ──────────────────────────────────────────────

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("rentald_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

/// Engine plus the inbox it notifies, each on a fresh log.
fn setup(name: &str) -> (Arc<Engine>, Arc<NotificationStore>, PathBuf) {
    let path = test_wal_path(&format!("{name}.wal"));
    let inbox = Arc::new(NotificationStore::new(test_wal_path(&format!("{name}.notifications.wal"))).unwrap());
    let engine = Arc::new(Engine::new(path.clone(), inbox.clone()).unwrap());
    (engine, inbox, path)
}

/// `days` days and `hours` hours after the start of today (UTC).
fn at(days: i64, hours: i64) -> Timestamp {
    Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc() + Duration::days(days) + Duration::hours(hours)
}

fn daily(price: f64) -> PriceTiers {
    PriceTiers {
        per_day: Some(price),
        ..Default::default()
    }
}

async fn register(engine: &Engine, owner: Ulid, prices: PriceTiers, auto_approve: bool) -> Equipment {
    engine
        .register_equipment(
            owner,
            NewEquipment {
                name: "Pressure washer".into(),
                category: Some("cleaning".into()),
                prices,
                auto_approve,
            },
        )
        .await
        .unwrap()
}

struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn record(&self, _draft: NotificationDraft) -> Result<Notification, NotifyError> {
        Err(NotifyError::Storage("inbox offline".into()))
    }
}

// ── Create ───────────────────────────────────────────────

#[tokio::test]
async fn create_prices_and_starts_pending() {
    let (engine, _, _) = setup("create_pending");
    let owner = Ulid::new();
    let renter = Ulid::new();
    let eq = register(
        &engine,
        owner,
        PriceTiers {
            per_day: Some(50.0),
            per_week: Some(300.0),
            ..Default::default()
        },
        false,
    )
    .await;

    let r = engine
        .create_reservation(renter, eq.id, at(3, 0), at(11, 0))
        .await
        .unwrap();
    assert_eq!(r.status, ReservationStatus::Pending);
    assert_eq!(r.total_price, 350.0);
    assert_eq!(r.renter_id, renter);
    assert_eq!(r.equipment_id, eq.id);
}

#[tokio::test]
async fn shared_boundary_conflicts() {
    let (engine, _, _) = setup("shared_boundary");
    let eq = register(&engine, Ulid::new(), daily(20.0), false).await;
    let year = Utc::now().year() + 1;
    let jan = |d| Utc.with_ymd_and_hms(year, 1, d, 0, 0, 0).unwrap();

    engine
        .create_reservation(Ulid::new(), eq.id, jan(10), jan(12))
        .await
        .unwrap();
    let err = engine
        .create_reservation(Ulid::new(), eq.id, jan(12), jan(14))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(matches!(err, EngineError::Conflict { blocking: Some(_), .. }));

    engine
        .create_reservation(Ulid::new(), eq.id, jan(15), jan(16))
        .await
        .unwrap();
}

#[tokio::test]
async fn concurrent_creates_admit_exactly_one() {
    let (engine, _, _) = setup("concurrent_creates");
    let eq = register(&engine, Ulid::new(), daily(20.0), false).await;
    let equipment_id = eq.id;

    let attempts = (0..16).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .create_reservation(Ulid::new(), equipment_id, at(5, i % 3), at(7, i % 5))
                .await
        })
    });
    let results = futures::future::join_all(attempts).await;

    let mut ok = 0;
    for result in results {
        match result.unwrap() {
            Ok(_) => ok += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict),
        }
    }
    assert_eq!(ok, 1);
    let (list, total) = engine.list_reservations_for_owner(eq.owner_id, Page::default()).await;
    assert_eq!((list.len(), total), (1, 1));
}

#[tokio::test]
async fn released_dates_can_be_rebooked() {
    let (engine, _, _) = setup("released_dates");
    let owner = Ulid::new();
    let eq = register(&engine, owner, daily(20.0), false).await;
    let first = engine
        .create_reservation(Ulid::new(), eq.id, at(4, 0), at(6, 0))
        .await
        .unwrap();
    engine
        .reject_reservation(first.id, owner, Some("servicing".into()))
        .await
        .unwrap();

    engine
        .create_reservation(Ulid::new(), eq.id, at(4, 0), at(6, 0))
        .await
        .unwrap();
}

#[tokio::test]
async fn create_validates_dates() {
    let (engine, _, _) = setup("create_validation");
    let eq = register(&engine, Ulid::new(), daily(20.0), false).await;

    let err = engine
        .create_reservation(Ulid::new(), eq.id, at(-1, 0), at(2, 0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.to_string(), "validation failed: start_date must be in the future");

    let err = engine
        .create_reservation(Ulid::new(), eq.id, at(3, 0), at(3, 0))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "validation failed: end_date must be after start_date");

    // earlier today is still today
    engine
        .create_reservation(Ulid::new(), eq.id, at(0, 0), at(1, 0))
        .await
        .unwrap();
}

#[tokio::test]
async fn create_on_missing_or_unavailable_equipment() {
    let (engine, _, _) = setup("unavailable");
    let owner = Ulid::new();

    let err = engine
        .create_reservation(Ulid::new(), Ulid::new(), at(2, 0), at(3, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { entity: Entity::Equipment, .. }));

    let eq = register(&engine, owner, daily(20.0), false).await;
    engine
        .update_equipment(
            eq.id,
            owner,
            EquipmentUpdate {
                available: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let err = engine
        .create_reservation(Ulid::new(), eq.id, at(2, 0), at(3, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict { blocking: None, .. }));
    assert!(!engine.check_availability(eq.id, at(2, 0), at(3, 0)).await.unwrap());
}

// ── Notifications ────────────────────────────────────────

#[tokio::test]
async fn auto_approve_notifies_both_parties() {
    let (engine, inbox, _) = setup("auto_approve");
    let owner = Ulid::new();
    let renter = Ulid::new();
    let eq = register(&engine, owner, daily(20.0), true).await;

    let r = engine
        .create_reservation(renter, eq.id, at(2, 0), at(4, 0))
        .await
        .unwrap();
    assert_eq!(r.status, ReservationStatus::Approved);

    let (owner_inbox, _) = inbox.list(owner, Page::default()).await;
    assert_eq!(owner_inbox.len(), 1);
    assert_eq!(owner_inbox[0].kind, NotificationKind::ReservationCreated);
    assert_eq!(owner_inbox[0].title, "New Reservation Request");
    assert_eq!(owner_inbox[0].message, "You have a new reservation request for Pressure washer");
    assert_eq!(owner_inbox[0].reference, Some(Reference::reservation(r.id)));

    let (renter_inbox, _) = inbox.list(renter, Page::default()).await;
    assert_eq!(renter_inbox.len(), 1);
    assert_eq!(renter_inbox[0].kind, NotificationKind::ReservationApproved);
}

#[tokio::test]
async fn pending_create_notifies_owner_only() {
    let (engine, inbox, _) = setup("pending_notice");
    let owner = Ulid::new();
    let renter = Ulid::new();
    let eq = register(&engine, owner, daily(20.0), false).await;
    engine
        .create_reservation(renter, eq.id, at(2, 0), at(4, 0))
        .await
        .unwrap();

    assert_eq!(inbox.unread_count(owner).await, 1);
    assert_eq!(inbox.unread_count(renter).await, 0);
}

#[tokio::test]
#[traced_test]
async fn failed_notification_does_not_fail_mutation() {
    let path = test_wal_path("failing_sink.wal");
    let engine = Engine::new(path, Arc::new(FailingSink)).unwrap();
    let owner = Ulid::new();
    let eq = register(&engine, owner, daily(20.0), false).await;

    let r = engine
        .create_reservation(Ulid::new(), eq.id, at(2, 0), at(4, 0))
        .await
        .unwrap();
    let approved = engine.approve_reservation(r.id, owner).await.unwrap();

    assert_eq!(approved.status, ReservationStatus::Approved);
    assert!(logs_contain("failed to record notification"));
    assert!(logs_contain("inbox offline"));
}

// ── Transitions ──────────────────────────────────────────

#[tokio::test]
async fn approve_then_complete() {
    let (engine, inbox, _) = setup("approve_complete");
    let owner = Ulid::new();
    let renter = Ulid::new();
    let eq = register(&engine, owner, daily(20.0), false).await;
    let r = engine
        .create_reservation(renter, eq.id, at(2, 0), at(4, 0))
        .await
        .unwrap();

    let err = engine.complete_reservation(r.id, owner).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let approved = engine.approve_reservation(r.id, owner).await.unwrap();
    assert_eq!(approved.status, ReservationStatus::Approved);
    assert!(approved.updated_at >= r.updated_at);

    let completed = engine.complete_reservation(r.id, owner).await.unwrap();
    assert_eq!(completed.status, ReservationStatus::Completed);

    let (renter_inbox, total) = inbox.list(renter, Page::default()).await;
    assert_eq!(total, 2);
    assert_eq!(renter_inbox[0].kind, NotificationKind::ReservationCompleted);
    assert_eq!(renter_inbox[1].kind, NotificationKind::ReservationApproved);
}

#[tokio::test]
async fn review_of_approved_is_invalid_state() {
    let (engine, _, _) = setup("review_approved");
    let owner = Ulid::new();
    let eq = register(&engine, owner, daily(20.0), true).await;
    let r = engine
        .create_reservation(Ulid::new(), eq.id, at(2, 0), at(4, 0))
        .await
        .unwrap();

    let err = engine.approve_reservation(r.id, owner).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidState {
            actual: ReservationStatus::Approved,
            expected: ReservationStatus::Pending,
            ..
        }
    ));
    let err = engine.reject_reservation(r.id, owner, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn reject_stores_reason() {
    let (engine, _, _) = setup("reject_reason");
    let owner = Ulid::new();
    let eq = register(&engine, owner, daily(20.0), false).await;
    let r = engine
        .create_reservation(Ulid::new(), eq.id, at(2, 0), at(4, 0))
        .await
        .unwrap();

    let err = engine
        .reject_reservation(r.id, owner, Some("x".repeat(MAX_REASON_LEN + 1)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let unchanged = engine.get_reservation(r.id, owner).await.unwrap();
    assert_eq!(unchanged.status, ReservationStatus::Pending);

    let rejected = engine
        .reject_reservation(r.id, owner, Some("blade is dull".into()))
        .await
        .unwrap();
    assert_eq!(rejected.status, ReservationStatus::Rejected);
    assert_eq!(rejected.cancellation_reason.as_deref(), Some("blade is dull"));
}

#[tokio::test]
async fn blank_reasons_are_dropped_and_long_cancels_refused() {
    let (engine, _, _) = setup("reason_bounds");
    let owner = Ulid::new();
    let renter = Ulid::new();
    let eq = register(&engine, owner, daily(20.0), false).await;
    let first = engine
        .create_reservation(renter, eq.id, at(2, 0), at(3, 0))
        .await
        .unwrap();
    let second = engine
        .create_reservation(renter, eq.id, at(5, 0), at(6, 0))
        .await
        .unwrap();

    let rejected = engine
        .reject_reservation(first.id, owner, Some("   ".into()))
        .await
        .unwrap();
    assert_eq!(rejected.status, ReservationStatus::Rejected);
    assert_eq!(rejected.cancellation_reason, None);

    let err = engine
        .cancel_reservation(second.id, renter, Some("y".repeat(10_000)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let unchanged = engine.get_reservation(second.id, renter).await.unwrap();
    assert_eq!(unchanged.status, ReservationStatus::Pending);
    assert_eq!(unchanged.cancellation_reason, None);
}

#[tokio::test]
async fn cancel_respects_lead_time() {
    let (engine, inbox, _) = setup("cancel_lead_time");
    let owner = Ulid::new();
    let renter = Ulid::new();
    let eq = register(&engine, owner, daily(20.0), true).await;
    let now = Utc::now();

    let soon = engine
        .create_reservation(renter, eq.id, now + Duration::hours(10), now + Duration::hours(20))
        .await
        .unwrap();
    let err = engine.cancel_reservation(soon.id, renter, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CannotCancel);

    let later = engine
        .create_reservation(renter, eq.id, now + Duration::hours(30), now + Duration::hours(40))
        .await
        .unwrap();
    let cancelled = engine
        .cancel_reservation(later.id, renter, Some("plans changed".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("plans changed"));

    let (owner_inbox, _) = inbox.list(owner, Page::default()).await;
    assert_eq!(owner_inbox[0].kind, NotificationKind::ReservationCancelled);

    let err = engine.cancel_reservation(later.id, renter, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CannotCancel);
}

#[tokio::test]
async fn pending_is_cancellable_close_to_start() {
    let (engine, _, _) = setup("cancel_pending");
    let owner = Ulid::new();
    let renter = Ulid::new();
    let eq = register(&engine, owner, daily(20.0), false).await;
    let now = Utc::now();
    let r = engine
        .create_reservation(renter, eq.id, now + Duration::hours(2), now + Duration::hours(5))
        .await
        .unwrap();

    let cancelled = engine.cancel_reservation(r.id, owner, None).await.unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason, None);
}

#[tokio::test]
async fn concurrent_approvals_commit_once() {
    let (engine, inbox, _) = setup("concurrent_approve");
    let owner = Ulid::new();
    let renter = Ulid::new();
    let eq = register(&engine, owner, daily(20.0), false).await;
    let r = engine
        .create_reservation(renter, eq.id, at(2, 0), at(4, 0))
        .await
        .unwrap();

    let id = r.id;
    let attempts = (0..8).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.approve_reservation(id, owner).await })
    });
    let results = futures::future::join_all(attempts).await;

    let ok = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
    assert_eq!(ok, 1);
    for result in results {
        if let Err(e) = result.unwrap() {
            assert_eq!(e.kind(), ErrorKind::InvalidState);
        }
    }
    assert_eq!(inbox.unread_count(renter).await, 1);
}

// ── Authorization ────────────────────────────────────────

#[tokio::test]
async fn only_parties_can_view_or_act() {
    let (engine, _, _) = setup("authorization");
    let owner = Ulid::new();
    let renter = Ulid::new();
    let stranger = Ulid::new();
    let eq = register(&engine, owner, daily(20.0), false).await;
    let r = engine
        .create_reservation(renter, eq.id, at(2, 0), at(4, 0))
        .await
        .unwrap();

    assert!(engine.get_reservation(r.id, renter).await.is_ok());
    assert!(engine.get_reservation(r.id, owner).await.is_ok());
    let err = engine.get_reservation(r.id, stranger).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let err = engine.approve_reservation(r.id, renter).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    let err = engine.cancel_reservation(r.id, stranger, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let err = engine
        .update_equipment(eq.id, renter, EquipmentUpdate::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let stored = engine.get_reservation(r.id, owner).await.unwrap();
    assert_eq!(stored.status, ReservationStatus::Pending);
}

#[tokio::test]
async fn unknown_reservation_is_not_found() {
    let (engine, _, _) = setup("unknown_reservation");
    let id = Ulid::new();
    let err = engine.get_reservation(id, Ulid::new()).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { entity: Entity::Reservation, .. }));
    let err = engine.approve_reservation(id, Ulid::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ── Catalog ──────────────────────────────────────────────

#[tokio::test]
async fn register_validates_and_update_merges() {
    let (engine, _, _) = setup("catalog");
    let owner = Ulid::new();

    let err = engine
        .register_equipment(
            owner,
            NewEquipment {
                name: "  ".into(),
                category: None,
                prices: daily(10.0),
                auto_approve: false,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = engine
        .register_equipment(
            owner,
            NewEquipment {
                name: "Ladder".into(),
                category: None,
                prices: PriceTiers::default(),
                auto_approve: false,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let eq = register(&engine, owner, daily(10.0), false).await;
    let updated = engine
        .update_equipment(
            eq.id,
            owner,
            EquipmentUpdate {
                per_hour: Some(4.0),
                auto_approve: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.prices.per_day, Some(10.0));
    assert_eq!(updated.prices.per_hour, Some(4.0));
    assert!(updated.auto_approve);

    let err = engine
        .update_equipment(
            eq.id,
            owner,
            EquipmentUpdate {
                per_week: Some(f64::NAN),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let listed = engine.list_equipment_for_owner(owner).await;
    assert_eq!(listed, vec![updated.clone()]);
    assert_eq!(engine.get_equipment(eq.id).await.unwrap(), updated);
}

#[tokio::test]
async fn categories_are_distinct_and_sorted() {
    let (engine, _, _) = setup("categories");
    assert!(engine.list_categories().await.is_empty());

    for (owner, category) in [
        (Ulid::new(), Some("garden")),
        (Ulid::new(), Some("cleaning")),
        (Ulid::new(), Some("garden")),
        (Ulid::new(), None),
    ] {
        engine
            .register_equipment(
                owner,
                NewEquipment {
                    name: "Hedge trimmer".into(),
                    category: category.map(str::to_string),
                    prices: daily(15.0),
                    auto_approve: false,
                },
            )
            .await
            .unwrap();
    }
    assert_eq!(engine.list_categories().await, vec!["cleaning", "garden"]);
}

#[tokio::test]
async fn price_change_keeps_existing_totals() {
    let (engine, _, _) = setup("price_change");
    let owner = Ulid::new();
    let eq = register(&engine, owner, daily(10.0), false).await;
    let r = engine
        .create_reservation(Ulid::new(), eq.id, at(2, 0), at(4, 0))
        .await
        .unwrap();
    assert_eq!(r.total_price, 20.0);

    engine
        .update_equipment(
            eq.id,
            owner,
            EquipmentUpdate {
                per_day: Some(99.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let stored = engine.get_reservation(r.id, owner).await.unwrap();
    assert_eq!(stored.total_price, 20.0);
}

// ── Queries ──────────────────────────────────────────────

#[tokio::test]
async fn calendar_marks_touched_days() {
    let (engine, _, _) = setup("calendar");
    let owner = Ulid::new();
    let eq = register(&engine, owner, daily(10.0), false).await;
    engine
        .create_reservation(Ulid::new(), eq.id, at(2, 10), at(4, 2))
        .await
        .unwrap();
    let gone = engine
        .create_reservation(Ulid::new(), eq.id, at(6, 0), at(6, 5))
        .await
        .unwrap();
    engine.cancel_reservation(gone.id, owner, None).await.unwrap();

    let from = at(1, 0).date_naive();
    let to = at(6, 0).date_naive();
    let days = engine.get_availability(eq.id, from, to).await.unwrap();
    let flags: Vec<bool> = days.iter().map(|d| d.available).collect();
    assert_eq!(flags, vec![true, false, false, false, true, true]);
    assert_eq!(days[0].date, from);
    assert_eq!(days[5].date, to);

    let err = engine.get_availability(eq.id, to, from).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = engine.get_availability(Ulid::new(), from, to).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn availability_lookups() {
    let (engine, _, _) = setup("availability_lookups");
    let eq = register(&engine, Ulid::new(), daily(10.0), false).await;
    let r = engine
        .create_reservation(Ulid::new(), eq.id, at(3, 0), at(5, 0))
        .await
        .unwrap();

    assert!(!engine.check_availability(eq.id, at(4, 0), at(6, 0)).await.unwrap());
    assert!(engine.check_availability(eq.id, at(6, 0), at(7, 0)).await.unwrap());

    let blocking = engine
        .blocking_reservations_overlapping(eq.id, at(1, 0), at(3, 0))
        .await
        .unwrap();
    assert_eq!(blocking, vec![r]);
}

#[tokio::test]
async fn lookups_reject_inverted_ranges() {
    let (engine, _, _) = setup("inverted_lookups");
    let eq = register(&engine, Ulid::new(), daily(10.0), false).await;

    let err = engine
        .blocking_reservations_overlapping(eq.id, at(5, 0), at(3, 0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = engine
        .check_availability(eq.id, at(4, 0), at(4, 0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    // past ranges are fine for lookups
    let past = engine
        .blocking_reservations_overlapping(eq.id, at(-10, 0), at(-8, 0))
        .await
        .unwrap();
    assert!(past.is_empty());
}

#[tokio::test]
async fn listings_page_newest_first() {
    let (engine, _, _) = setup("listings");
    let owner = Ulid::new();
    let renter = Ulid::new();
    let first = register(&engine, owner, daily(10.0), false).await;
    let second = register(&engine, owner, daily(15.0), false).await;

    let mut created = Vec::new();
    for day in 0..3 {
        let eq = if day % 2 == 0 { &first } else { &second };
        let r = engine
            .create_reservation(renter, eq.id, at(2 + 3 * day, 0), at(3 + 3 * day, 0))
            .await
            .unwrap();
        created.push(r.id);
    }
    engine
        .create_reservation(Ulid::new(), second.id, at(20, 0), at(21, 0))
        .await
        .unwrap();

    let (page_one, total) = engine.list_reservations_for_renter(renter, Page::new(1, 2)).await;
    assert_eq!(total, 3);
    assert_eq!(page_one.len(), 2);
    let (page_two, _) = engine.list_reservations_for_renter(renter, Page::new(2, 2)).await;
    assert_eq!(page_two.len(), 1);

    let all: Vec<_> = page_one.iter().chain(&page_two).collect();
    assert!(all.windows(2).all(|w| (w[0].created_at, w[0].id) > (w[1].created_at, w[1].id)));
    let mut ids: Vec<Ulid> = all.iter().map(|r| r.id).collect();
    ids.sort();
    created.sort();
    assert_eq!(ids, created);

    let (owner_list, owner_total) = engine.list_reservations_for_owner(owner, Page::new(0, 500)).await;
    assert_eq!(owner_total, 4);
    assert_eq!(owner_list.len(), 4);

    let (empty, zero) = engine.list_reservations_for_renter(Ulid::new(), Page::default()).await;
    assert!(empty.is_empty());
    assert_eq!(zero, 0);
}

#[tokio::test]
async fn summary_counts_by_status() {
    let (engine, _, _) = setup("summary");
    let owner = Ulid::new();
    let eq = register(&engine, owner, daily(10.0), false).await;
    let r = engine
        .create_reservation(Ulid::new(), eq.id, at(2, 0), at(3, 0))
        .await
        .unwrap();
    engine
        .create_reservation(Ulid::new(), eq.id, at(5, 0), at(6, 0))
        .await
        .unwrap();
    engine.approve_reservation(r.id, owner).await.unwrap();

    let summary = engine.summary().await;
    assert_eq!(summary.equipment, 1);
    assert_eq!(summary.available_equipment, 1);
    assert_eq!(summary.reservations, 2);
    assert_eq!(summary.by_status.get("approved"), Some(&1));
    assert_eq!(summary.by_status.get("pending"), Some(&1));
    assert_eq!(summary.wal_appends_since_compact, 4);
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn replay_restores_state() {
    let (engine, _, path) = setup("replay");
    let owner = Ulid::new();
    let renter = Ulid::new();
    let eq = register(&engine, owner, daily(10.0), false).await;
    let kept = engine
        .create_reservation(renter, eq.id, at(2, 0), at(4, 0))
        .await
        .unwrap();
    let dropped = engine
        .create_reservation(renter, eq.id, at(8, 0), at(9, 0))
        .await
        .unwrap();
    engine.approve_reservation(kept.id, owner).await.unwrap();
    engine
        .cancel_reservation(dropped.id, renter, Some("found one".into()))
        .await
        .unwrap();
    drop(engine);

    let reopened = Engine::new(path, Arc::new(FailingSink)).unwrap();
    let r = reopened.get_reservation(kept.id, renter).await.unwrap();
    assert_eq!(r.status, ReservationStatus::Approved);
    assert_eq!(r.total_price, 20.0);
    let d = reopened.get_reservation(dropped.id, owner).await.unwrap();
    assert_eq!(d.status, ReservationStatus::Cancelled);
    assert_eq!(d.cancellation_reason.as_deref(), Some("found one"));

    assert_eq!(reopened.list_equipment_for_owner(owner).await.len(), 1);
    let (list, total) = reopened.list_reservations_for_renter(renter, Page::default()).await;
    assert_eq!((list.len(), total), (2, 2));

    let err = reopened
        .create_reservation(Ulid::new(), eq.id, at(3, 0), at(5, 0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn compaction_preserves_state() {
    let (engine, _, path) = setup("compaction");
    let owner = Ulid::new();
    let renter = Ulid::new();
    let eq = register(&engine, owner, daily(10.0), false).await;
    let r = engine
        .create_reservation(renter, eq.id, at(2, 0), at(4, 0))
        .await
        .unwrap();
    engine.approve_reservation(r.id, owner).await.unwrap();
    engine
        .update_equipment(
            eq.id,
            owner,
            EquipmentUpdate {
                name: Some("Pressure washer XL".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(engine.summary().await.wal_appends_since_compact, 4);

    engine.compact_wal().await.unwrap();
    assert_eq!(engine.summary().await.wal_appends_since_compact, 0);
    let records: Vec<Event> = Wal::replay(&path).unwrap();
    assert_eq!(records.len(), 2);

    // still writable after the swap
    let later = engine
        .create_reservation(renter, eq.id, at(6, 0), at(7, 0))
        .await
        .unwrap();
    drop(engine);

    let reopened = Engine::new(path, Arc::new(FailingSink)).unwrap();
    assert_eq!(reopened.get_equipment(eq.id).await.unwrap().name, "Pressure washer XL");
    let restored = reopened.get_reservation(r.id, owner).await.unwrap();
    assert_eq!(restored.status, ReservationStatus::Approved);
    assert!(reopened.get_reservation(later.id, renter).await.is_ok());
}

#[tokio::test]
async fn open_compacts_past_threshold() {
    let (engine, _, path) = setup("open_threshold");
    let owner = Ulid::new();
    let eq = register(&engine, owner, daily(10.0), false).await;
    let r = engine
        .create_reservation(Ulid::new(), eq.id, at(2, 0), at(4, 0))
        .await
        .unwrap();
    engine.approve_reservation(r.id, owner).await.unwrap();
    engine.complete_reservation(r.id, owner).await.unwrap();
    drop(engine);
    assert_eq!(Wal::<Event>::replay(&path).unwrap().len(), 4);

    let reopened = Engine::open(path.clone(), Arc::new(FailingSink), 3).await.unwrap();
    assert_eq!(Wal::<Event>::replay(&path).unwrap().len(), 2);
    let restored = reopened.get_reservation(r.id, owner).await.unwrap();
    assert_eq!(restored.status, ReservationStatus::Completed);
}

// ── Pure helpers ─────────────────────────────────────────

fn state_with(reservations: Vec<(i64, i64, ReservationStatus)>) -> EquipmentState {
    let now = Utc::now();
    let equipment = Equipment {
        id: Ulid::new(),
        owner_id: Ulid::new(),
        name: "Generator".into(),
        category: None,
        prices: daily(30.0),
        available: true,
        auto_approve: false,
        created_at: now,
        updated_at: now,
    };
    let id = equipment.id;
    let mut state = EquipmentState::new(equipment);
    for (start, end, status) in reservations {
        state.insert_reservation(Reservation {
            id: Ulid::new(),
            equipment_id: id,
            renter_id: Ulid::new(),
            start_date: at(start, 0),
            end_date: at(end, 0),
            status,
            total_price: 0.0,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        });
    }
    state
}

#[test]
fn conflict_check_ignores_released_reservations() {
    let state = state_with(vec![
        (2, 4, ReservationStatus::Rejected),
        (6, 8, ReservationStatus::Completed),
        (10, 12, ReservationStatus::Approved),
    ]);
    assert!(conflict::check_no_conflict(&state, &DateRange::new(at(3, 0), at(7, 0))).is_ok());

    let blocking = state.reservations[2].id;
    let err = conflict::check_no_conflict(&state, &DateRange::new(at(12, 0), at(13, 0))).unwrap_err();
    assert!(matches!(err, EngineError::Conflict { blocking: Some(id), .. } if id == blocking));
}

#[test]
fn blocked_days_clamp_to_window() {
    let state = state_with(vec![
        (1, 3, ReservationStatus::Pending),
        (9, 20, ReservationStatus::Approved),
        (5, 6, ReservationStatus::Cancelled),
    ]);
    let from = at(2, 0).date_naive();
    let to = at(10, 0).date_naive();
    let blocked = blocked_days(&state.reservations, from, to);
    let expected: Vec<_> = [2, 3, 9, 10].iter().map(|d| at(*d, 0).date_naive()).collect();
    assert_eq!(blocked.into_iter().collect::<Vec<_>>(), expected);

    let days = calendar(&state, from, to);
    assert_eq!(days.len(), 9);
    assert_eq!(days.iter().filter(|d| !d.available).count(), 4);
}

#[test]
fn calendar_window_limits() {
    let today = at(0, 0).date_naive();
    assert!(availability::validate_window(today, today).is_ok());
    assert!(availability::validate_window(today, today + Duration::days(365)).is_ok());
    assert!(availability::validate_window(today, today + Duration::days(366)).is_err());
    assert!(availability::validate_window(today + Duration::days(1), today).is_err());
}

#[test]
fn reasons_are_bounded_and_trimmed_to_none() {
    assert_eq!(conflict::validate_reason(Some("   ".into())).unwrap(), None);
    assert_eq!(
        conflict::validate_reason(Some("late return".into())).unwrap().as_deref(),
        Some("late return")
    );
    assert!(conflict::validate_reason(Some("x".repeat(MAX_REASON_LEN + 1))).is_err());
}
