// End-to-end booking flow and ledger invariant tests

use std::thread;

use chrono::NaiveDate;
use slotbook::db::DbPool;
use slotbook::error::AppError;
use slotbook::models::availability::{DayOfWeek, DayRule, TimeSlot};
use slotbook::models::booking::{
    BookingCreateInput, BookingFilter, BookingLine, BookingStatus, Customer,
};
use slotbook::models::service::ServiceCreateInput;
use slotbook::services::timespan;
use slotbook::BookingEngine;
use tempfile::tempdir;

fn setup_engine() -> (BookingEngine, tempfile::TempDir) {
    let dir = tempdir().expect("temp dir");
    let db_path = dir.path().join("engine.sqlite");
    let pool = DbPool::new(db_path).expect("db pool");
    (BookingEngine::new(pool), dir)
}

fn customer(name: &str) -> Customer {
    Customer {
        name: name.into(),
        email: format!("{}@example.com", name.to_lowercase()),
        phone: Some("555-0100".into()),
    }
}

// 2025-06-02 is a Monday.
fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).expect("valid date")
}

fn all_week_open(slots: &[(&str, &str)]) -> Vec<DayRule> {
    use DayOfWeek::*;
    [Monday, Tuesday, Wednesday, Thursday, Friday, Saturday, Sunday]
        .into_iter()
        .map(|day| DayRule {
            day,
            is_available: true,
            slots: slots
                .iter()
                .map(|(start, end)| TimeSlot {
                    start: (*start).into(),
                    end: (*end).into(),
                })
                .collect(),
        })
        .collect()
}

fn seed_service(engine: &BookingEngine, name: &str, price: f64, duration: i64) -> String {
    let service = engine
        .create_service(ServiceCreateInput {
            name: name.into(),
            price,
            duration_minutes: duration,
            ..Default::default()
        })
        .expect("create service");
    engine
        .set_calendar(&service.id, all_week_open(&[("09:00", "17:00")]), vec![])
        .expect("set calendar");
    service.id
}

#[test]
fn full_booking_lifecycle() {
    let (engine, _dir) = setup_engine();
    let haircut = seed_service(&engine, "Haircut", 20.0, 30);
    let trim = seed_service(&engine, "Beard trim", 10.0, 15);

    let check = engine
        .check_availability(&[haircut.clone(), trim.clone()], monday(), "09:00")
        .expect("check availability");
    assert!(check.iter().all(|result| result.available));

    let booking = engine
        .create_booking(BookingCreateInput {
            customer: customer("Ada"),
            lines: vec![
                BookingLine {
                    service_id: haircut.clone(),
                    quantity: 2,
                },
                BookingLine {
                    service_id: trim,
                    quantity: 1,
                },
            ],
            date: monday(),
            start_time: "09:00".into(),
        })
        .expect("create booking");

    assert_eq!(booking.end_time, "10:15");
    assert_eq!(booking.total_price, 50.0);
    assert_eq!(booking.status, BookingStatus::Pending);

    let confirmed = engine
        .update_status(&booking.id, "confirmed")
        .expect("confirm");
    assert_eq!(confirmed.status, BookingStatus::Confirmed);

    let fetched = engine.get_booking(&booking.id).expect("get booking");
    assert_eq!(fetched.status, BookingStatus::Confirmed);
    assert_eq!(fetched.lines.len(), 2);

    let listed = engine
        .list_bookings(BookingFilter {
            date: Some(monday()),
            service_id: Some(haircut),
            ..Default::default()
        })
        .expect("list bookings");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, booking.id);
}

#[test]
fn concurrent_identical_requests_yield_one_booking() {
    let (engine, _dir) = setup_engine();
    let service_id = seed_service(&engine, "Haircut", 20.0, 60);

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = engine.clone();
        let service_id = service_id.clone();
        handles.push(thread::spawn(move || {
            engine.create_booking(BookingCreateInput {
                customer: customer(&format!("Caller{i}")),
                lines: vec![BookingLine {
                    service_id,
                    quantity: 1,
                }],
                date: monday(),
                start_time: "09:00".into(),
            })
        }));
    }

    let mut successes = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.join().expect("thread join") {
            Ok(_) => successes += 1,
            Err(AppError::SlotConflict { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(conflicts, 7);
}

#[test]
fn concurrent_overlapping_requests_leave_ledger_conflict_free() {
    let (engine, _dir) = setup_engine();
    let service_id = seed_service(&engine, "Massage", 40.0, 90);

    // Staggered starts, every neighbouring pair overlapping.
    let starts = ["09:00", "09:30", "10:00", "10:30", "11:00", "11:30"];
    let mut handles = Vec::new();
    for (i, start) in starts.iter().enumerate() {
        let engine = engine.clone();
        let service_id = service_id.clone();
        let start = start.to_string();
        handles.push(thread::spawn(move || {
            engine.create_booking(BookingCreateInput {
                customer: customer(&format!("Caller{i}")),
                lines: vec![BookingLine {
                    service_id,
                    quantity: 1,
                }],
                date: monday(),
                start_time: start,
            })
        }));
    }
    for handle in handles {
        // Either accepted or a clean conflict; never a partial write.
        match handle.join().expect("thread join") {
            Ok(_) | Err(AppError::SlotConflict { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    let accepted = engine
        .list_bookings(BookingFilter {
            date: Some(monday()),
            status: Some(BookingStatus::Pending),
            ..Default::default()
        })
        .expect("list accepted");
    assert!(!accepted.is_empty());

    for (i, a) in accepted.iter().enumerate() {
        for b in accepted.iter().skip(i + 1) {
            let a_start = timespan::to_minutes(&a.start_time).expect("stored time");
            let a_end = timespan::to_minutes(&a.end_time).expect("stored time");
            let b_start = timespan::to_minutes(&b.start_time).expect("stored time");
            let b_end = timespan::to_minutes(&b.end_time).expect("stored time");
            assert!(
                !timespan::overlaps(a_start, a_end, b_start, b_end),
                "ledger holds overlapping bookings {} and {}",
                a.id,
                b.id
            );
        }
    }
}

#[test]
fn racing_confirm_and_cancel_never_resurrects_a_cancelled_booking() {
    let (engine, _dir) = setup_engine();
    let service_id = seed_service(&engine, "Haircut", 20.0, 30);

    for round in 0..50 {
        let booking = engine
            .create_booking(BookingCreateInput {
                customer: customer("Ada"),
                lines: vec![BookingLine {
                    service_id: service_id.clone(),
                    quantity: 1,
                }],
                date: monday() + chrono::Duration::days(round),
                start_time: "09:00".into(),
            })
            .expect("booking");

        let confirm = {
            let engine = engine.clone();
            let id = booking.id.clone();
            thread::spawn(move || engine.update_status(&id, "confirmed"))
        };
        let cancel = {
            let engine = engine.clone();
            let id = booking.id.clone();
            thread::spawn(move || engine.update_status(&id, "cancelled"))
        };

        let confirm_result = confirm.join().expect("confirm thread");
        let cancel_result = cancel.join().expect("cancel thread");

        let stored = engine.get_booking(&booking.id).expect("get booking");

        // Cancelled is terminal: once the cancel lands, no interleaving may
        // leave the booking back in the active conflict set.
        if cancel_result.is_ok() {
            assert_eq!(stored.status, BookingStatus::Cancelled, "round {round}");
        } else {
            // Cancel can only fail by losing to confirm->completed style
            // moves; here the sole competitor is confirm, which never blocks
            // a cancel, so both must have succeeded in some order.
            panic!(
                "cancel unexpectedly failed in round {round}: {:?}",
                cancel_result.err()
            );
        }

        // Confirm either won the race (and was then cancelled) or lost and
        // was rejected as an illegal cancelled -> confirmed transition.
        if let Err(err) = confirm_result {
            assert!(
                matches!(err, AppError::InvalidStatus { .. }),
                "round {round}: {err:?}"
            );
        }
    }
}

#[test]
fn different_dates_commit_independently() {
    let (engine, _dir) = setup_engine();
    let service_id = seed_service(&engine, "Haircut", 20.0, 60);

    let mut handles = Vec::new();
    for day_offset in 0..4 {
        let engine = engine.clone();
        let service_id = service_id.clone();
        handles.push(thread::spawn(move || {
            engine.create_booking(BookingCreateInput {
                customer: customer(&format!("Caller{day_offset}")),
                lines: vec![BookingLine {
                    service_id,
                    quantity: 1,
                }],
                date: monday() + chrono::Duration::days(day_offset),
                start_time: "09:00".into(),
            })
        }));
    }

    for handle in handles {
        handle.join().expect("thread join").expect("booking accepted");
    }

    let all = engine
        .list_bookings(BookingFilter::default())
        .expect("list all");
    assert_eq!(all.len(), 4);
}

#[test]
fn rejected_requests_leave_no_trace() {
    let (engine, _dir) = setup_engine();
    let service_id = seed_service(&engine, "Haircut", 20.0, 60);

    engine
        .create_booking(BookingCreateInput {
            customer: customer("Ada"),
            lines: vec![BookingLine {
                service_id: service_id.clone(),
                quantity: 1,
            }],
            date: monday(),
            start_time: "09:00".into(),
        })
        .expect("first booking");

    let rejected = engine.create_booking(BookingCreateInput {
        customer: customer("Grace"),
        lines: vec![BookingLine {
            service_id,
            quantity: 1,
        }],
        date: monday(),
        start_time: "09:30".into(),
    });
    assert!(matches!(rejected, Err(AppError::SlotConflict { .. })));

    let all = engine
        .list_bookings(BookingFilter::default())
        .expect("list all");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].customer.name, "Ada");
}
