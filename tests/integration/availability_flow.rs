// Calendar configuration and availability resolution tests

use chrono::NaiveDate;
use slotbook::db::DbPool;
use slotbook::error::AppError;
use slotbook::models::availability::{DateException, DayOfWeek, DayRule, TimeSlot};
use slotbook::models::booking::{BookingCreateInput, BookingLine, Customer};
use slotbook::models::service::ServiceCreateInput;
use slotbook::BookingEngine;
use tempfile::tempdir;

fn setup_engine() -> (BookingEngine, tempfile::TempDir) {
    let dir = tempdir().expect("temp dir");
    let db_path = dir.path().join("availability.sqlite");
    let pool = DbPool::new(db_path).expect("db pool");
    (BookingEngine::new(pool), dir)
}

fn slot(start: &str, end: &str) -> TimeSlot {
    TimeSlot {
        start: start.into(),
        end: end.into(),
    }
}

// 2025-06-02 is a Monday.
fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).expect("valid date")
}

fn customer() -> Customer {
    Customer {
        name: "Ada".into(),
        email: "ada@example.com".into(),
        phone: None,
    }
}

fn seed_service(engine: &BookingEngine, duration: i64) -> String {
    engine
        .create_service(ServiceCreateInput {
            name: "Haircut".into(),
            price: 20.0,
            duration_minutes: duration,
            ..Default::default()
        })
        .expect("create service")
        .id
}

#[test]
fn booking_across_adjacent_slots_is_rejected() {
    let (engine, _dir) = setup_engine();
    let service_id = seed_service(&engine, 120);

    engine
        .set_calendar(
            &service_id,
            vec![DayRule {
                day: DayOfWeek::Monday,
                is_available: true,
                slots: vec![slot("09:00", "12:00"), slot("12:00", "17:00")],
            }],
            vec![],
        )
        .expect("set calendar");

    // 11:00-13:00 is covered by the union of the two slots but fits neither.
    let result = engine.create_booking(BookingCreateInput {
        customer: customer(),
        lines: vec![BookingLine {
            service_id: service_id.clone(),
            quantity: 1,
        }],
        date: monday(),
        start_time: "11:00".into(),
    });
    assert!(matches!(result, Err(AppError::ServiceUnavailable { .. })));

    // Entirely inside the first slot: accepted.
    engine
        .create_booking(BookingCreateInput {
            customer: customer(),
            lines: vec![BookingLine {
                service_id,
                quantity: 1,
            }],
            date: monday(),
            start_time: "09:30".into(),
        })
        .expect("booking inside one slot");
}

#[test]
fn exception_takes_precedence_over_weekly_rule() {
    let (engine, _dir) = setup_engine();
    let service_id = seed_service(&engine, 60);

    engine
        .set_calendar(
            &service_id,
            vec![DayRule {
                day: DayOfWeek::Monday,
                is_available: true,
                slots: vec![slot("09:00", "17:00")],
            }],
            vec![DateException {
                date: monday(),
                is_available: false,
                slots: vec![],
            }],
        )
        .expect("set calendar");

    let checks = engine
        .check_availability(&[service_id.clone()], monday(), "10:00")
        .expect("check");
    assert!(!checks[0].available);
    assert_eq!(
        checks[0].reason.as_deref(),
        Some("Exception date not available")
    );

    let result = engine.create_booking(BookingCreateInput {
        customer: customer(),
        lines: vec![BookingLine {
            service_id: service_id.clone(),
            quantity: 1,
        }],
        date: monday(),
        start_time: "10:00".into(),
    });
    assert!(matches!(result, Err(AppError::ServiceUnavailable { .. })));

    // The following Monday falls back to the weekly rule.
    let next_monday = monday() + chrono::Duration::days(7);
    engine
        .create_booking(BookingCreateInput {
            customer: customer(),
            lines: vec![BookingLine {
                service_id,
                quantity: 1,
            }],
            date: next_monday,
            start_time: "10:00".into(),
        })
        .expect("weekly rule applies on other dates");
}

#[test]
fn replacing_the_calendar_drops_old_exceptions() {
    let (engine, _dir) = setup_engine();
    let service_id = seed_service(&engine, 60);

    let weekly = vec![DayRule {
        day: DayOfWeek::Monday,
        is_available: true,
        slots: vec![slot("09:00", "17:00")],
    }];

    engine
        .set_calendar(
            &service_id,
            weekly.clone(),
            vec![DateException {
                date: monday(),
                is_available: false,
                slots: vec![],
            }],
        )
        .expect("first replace");
    engine
        .set_calendar(&service_id, weekly, vec![])
        .expect("second replace");

    let calendar = engine.get_calendar(&service_id).expect("get calendar");
    assert!(calendar.exceptions.is_empty());

    engine
        .create_booking(BookingCreateInput {
            customer: customer(),
            lines: vec![BookingLine {
                service_id,
                quantity: 1,
            }],
            date: monday(),
            start_time: "10:00".into(),
        })
        .expect("previously blocked date is open again");
}

#[test]
fn invalid_calendar_payloads_are_rejected_not_repaired() {
    let (engine, _dir) = setup_engine();
    let service_id = seed_service(&engine, 60);

    let result = engine.set_calendar(
        &service_id,
        vec![
            DayRule {
                day: DayOfWeek::Monday,
                is_available: true,
                slots: vec![slot("09:00", "12:00")],
            },
            DayRule {
                day: DayOfWeek::Monday,
                is_available: false,
                slots: vec![],
            },
        ],
        vec![],
    );
    assert!(matches!(result, Err(AppError::InvalidCalendar { .. })));

    let result = engine.set_calendar(
        &service_id,
        vec![],
        vec![
            DateException {
                date: monday(),
                is_available: true,
                slots: vec![slot("09:00", "12:00")],
            },
            DateException {
                date: monday(),
                is_available: false,
                slots: vec![],
            },
        ],
    );
    assert!(matches!(result, Err(AppError::InvalidCalendar { .. })));

    // Nothing was persisted by the failed replaces.
    assert!(matches!(
        engine.get_calendar(&service_id),
        Err(AppError::NotFound)
    ));
}

#[test]
fn check_availability_is_a_pure_read() {
    let (engine, _dir) = setup_engine();
    let service_id = seed_service(&engine, 60);

    engine
        .set_calendar(
            &service_id,
            vec![DayRule {
                day: DayOfWeek::Monday,
                is_available: true,
                slots: vec![slot("09:00", "10:00")],
            }],
            vec![],
        )
        .expect("set calendar");

    engine
        .create_booking(BookingCreateInput {
            customer: customer(),
            lines: vec![BookingLine {
                service_id: service_id.clone(),
                quantity: 1,
            }],
            date: monday(),
            start_time: "09:00".into(),
        })
        .expect("booking");

    // The check consults calendars only; the committed booking does not
    // affect it.
    let checks = engine
        .check_availability(&[service_id], monday(), "09:30")
        .expect("check");
    assert!(checks[0].available);
}

#[test]
fn deleting_a_service_cascades_its_calendar() {
    let (engine, _dir) = setup_engine();
    let service_id = seed_service(&engine, 60);

    engine
        .set_calendar(
            &service_id,
            vec![DayRule {
                day: DayOfWeek::Monday,
                is_available: true,
                slots: vec![slot("09:00", "17:00")],
            }],
            vec![],
        )
        .expect("set calendar");

    engine.delete_service(&service_id).expect("delete service");
    assert!(matches!(
        engine.get_calendar(&service_id),
        Err(AppError::NotFound)
    ));
    assert!(matches!(
        engine.get_service(&service_id),
        Err(AppError::ServiceNotFound { .. })
    ));
}
