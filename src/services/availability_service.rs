use chrono::{Datelike, NaiveDate, Utc};
use serde_json::json;
use tracing::{debug, info};

use crate::db::repositories::availability_repository::{AvailabilityRepository, AvailabilityRow};
use crate::db::repositories::service_repository::ServiceRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::availability::{
    AvailabilityRecord, CheckResult, DateException, DayOfWeek, DayRule, TimeSlot,
};
use crate::services::timespan;

/// Per-service availability calendar: recurring weekly rules plus dated
/// exceptions. An exception overrides the weekly rule for its date entirely,
/// it is never merged with it.
#[derive(Clone)]
pub struct AvailabilityService {
    db: DbPool,
}

impl AvailabilityService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Atomically replaces the whole calendar for a service. There is no
    /// partial-update path; callers send the complete desired state, so a
    /// replace with an empty exception list drops every prior exception.
    pub fn set_calendar(
        &self,
        service_id: &str,
        working_hours: Vec<DayRule>,
        exceptions: Vec<DateException>,
    ) -> AppResult<AvailabilityRecord> {
        self.db.with_connection(|conn| {
            ServiceRepository::find_by_id(conn, service_id)?
                .ok_or_else(|| AppError::service_not_found(service_id))?;
            Ok(())
        })?;

        validate_working_hours(&working_hours)?;
        validate_exceptions(&exceptions)?;

        let now = Utc::now().to_rfc3339();
        let record = AvailabilityRecord {
            service_id: service_id.to_string(),
            working_hours,
            exceptions,
            created_at: now.clone(),
            updated_at: now,
        };

        let row = AvailabilityRow::from_record(&record)?;
        self.db
            .with_connection(|conn| AvailabilityRepository::upsert(conn, &row))?;
        info!(
            service_id,
            days = record.working_hours.len(),
            exceptions = record.exceptions.len(),
            "calendar replaced"
        );
        Ok(record)
    }

    pub fn get_calendar(&self, service_id: &str) -> AppResult<AvailabilityRecord> {
        let row = self
            .db
            .with_connection(|conn| AvailabilityRepository::find_by_service(conn, service_id))?
            .ok_or_else(AppError::not_found)?;
        let record = row.into_record()?;
        debug!(service_id, "calendar fetched");
        Ok(record)
    }

    /// Whether `[start_min, end_min)` fits inside one open slot for the
    /// service on `date`. A missing calendar is a distinct state from an
    /// empty one and always rejects with `CalendarNotConfigured`.
    pub fn is_span_open(
        &self,
        service_id: &str,
        date: NaiveDate,
        start_min: i64,
        end_min: i64,
    ) -> AppResult<bool> {
        let row = self
            .db
            .with_connection(|conn| AvailabilityRepository::find_by_service(conn, service_id))?
            .ok_or_else(|| AppError::calendar_not_configured(service_id))?;
        let record = row.into_record()?;
        span_open(&record, date, start_min, end_min)
    }

    /// Pure read mirroring the caller-facing check-availability
    /// surface. Only the start minute is tested against the open slots; the
    /// requested duration is unknown at check time and only enforced by
    /// `create_booking`. Never touches the booking ledger.
    pub fn check_availability(
        &self,
        service_ids: &[String],
        date: NaiveDate,
        start_time: &str,
    ) -> AppResult<Vec<CheckResult>> {
        let start_min = timespan::to_minutes(start_time)?;
        let weekday: DayOfWeek = date.weekday().into();
        let mut results = Vec::with_capacity(service_ids.len());

        for service_id in service_ids {
            let row = self.db.with_connection(|conn| {
                AvailabilityRepository::find_by_service(conn, service_id)
            })?;

            let record = match row {
                Some(row) => row.into_record()?,
                None => {
                    results.push(CheckResult {
                        service_id: service_id.clone(),
                        available: false,
                        reason: Some("Availability not set".to_string()),
                    });
                    continue;
                }
            };

            if let Some(exception) = find_exception(&record, date) {
                if !exception.is_available {
                    results.push(CheckResult {
                        service_id: service_id.clone(),
                        available: false,
                        reason: Some("Exception date not available".to_string()),
                    });
                    continue;
                }
                let available = start_in_slots(&exception.slots, start_min)?;
                results.push(CheckResult {
                    service_id: service_id.clone(),
                    available,
                    reason: if available {
                        None
                    } else {
                        Some("Time slot not available in exception".to_string())
                    },
                });
                continue;
            }

            let rule = find_day_rule(&record, weekday);
            match rule {
                Some(rule) if rule.is_available => {
                    let available = start_in_slots(&rule.slots, start_min)?;
                    results.push(CheckResult {
                        service_id: service_id.clone(),
                        available,
                        reason: if available {
                            None
                        } else {
                            Some("Time slot not available".to_string())
                        },
                    });
                }
                _ => {
                    results.push(CheckResult {
                        service_id: service_id.clone(),
                        available: false,
                        reason: Some(format!("Not available on {weekday}")),
                    });
                }
            }
        }

        debug!(
            date = %date,
            start_time,
            count = results.len(),
            "availability checked"
        );
        Ok(results)
    }
}

/// Resolution order: exception for the exact date wins outright, otherwise
/// the weekly rule for the weekday applies. Closed day or no rule means no
/// span is ever open.
pub fn span_open(
    record: &AvailabilityRecord,
    date: NaiveDate,
    start_min: i64,
    end_min: i64,
) -> AppResult<bool> {
    if let Some(exception) = find_exception(record, date) {
        if !exception.is_available {
            return Ok(false);
        }
        return span_in_slots(&exception.slots, start_min, end_min);
    }

    let weekday: DayOfWeek = date.weekday().into();
    match find_day_rule(record, weekday) {
        Some(rule) if rule.is_available => span_in_slots(&rule.slots, start_min, end_min),
        _ => Ok(false),
    }
}

fn find_exception(record: &AvailabilityRecord, date: NaiveDate) -> Option<&DateException> {
    record.exceptions.iter().find(|ex| ex.date == date)
}

fn find_day_rule(record: &AvailabilityRecord, weekday: DayOfWeek) -> Option<&DayRule> {
    record.working_hours.iter().find(|rule| rule.day == weekday)
}

fn span_in_slots(slots: &[TimeSlot], start_min: i64, end_min: i64) -> AppResult<bool> {
    for slot in slots {
        let slot_start = timespan::to_minutes(&slot.start)?;
        let slot_end = timespan::to_minutes(&slot.end)?;
        if timespan::contains(slot_start, slot_end, start_min, end_min) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn start_in_slots(slots: &[TimeSlot], start_min: i64) -> AppResult<bool> {
    for slot in slots {
        let slot_start = timespan::to_minutes(&slot.start)?;
        let slot_end = timespan::to_minutes(&slot.end)?;
        if start_min >= slot_start && start_min < slot_end {
            return Ok(true);
        }
    }
    Ok(false)
}

fn validate_working_hours(working_hours: &[DayRule]) -> AppResult<()> {
    let mut seen_days = std::collections::HashSet::new();
    for rule in working_hours {
        if !seen_days.insert(rule.day) {
            return Err(AppError::invalid_calendar_with_details(
                "duplicate weekly rule for day",
                json!({"day": rule.day.as_str()}),
            ));
        }
        validate_slots(&rule.slots, rule.day.as_str())?;
    }
    Ok(())
}

fn validate_exceptions(exceptions: &[DateException]) -> AppResult<()> {
    let mut seen_dates = std::collections::HashSet::new();
    for exception in exceptions {
        if !seen_dates.insert(exception.date) {
            return Err(AppError::invalid_calendar_with_details(
                "duplicate exception for date",
                json!({"date": exception.date.to_string()}),
            ));
        }
        validate_slots(&exception.slots, &exception.date.to_string())?;
    }
    Ok(())
}

fn validate_slots(slots: &[TimeSlot], context: &str) -> AppResult<()> {
    let mut spans = Vec::with_capacity(slots.len());
    for slot in slots {
        let start = timespan::to_minutes(&slot.start).map_err(|_| {
            AppError::invalid_calendar_with_details(
                "malformed slot time",
                json!({"context": context, "value": slot.start}),
            )
        })?;
        let end = timespan::to_minutes(&slot.end).map_err(|_| {
            AppError::invalid_calendar_with_details(
                "malformed slot time",
                json!({"context": context, "value": slot.end}),
            )
        })?;
        if start >= end {
            return Err(AppError::invalid_calendar_with_details(
                "slot start must be before end",
                json!({"context": context, "start": slot.start, "end": slot.end}),
            ));
        }
        spans.push((start, end));
    }

    spans.sort_unstable();
    for pair in spans.windows(2) {
        if timespan::overlaps(pair[0].0, pair[0].1, pair[1].0, pair[1].1) {
            return Err(AppError::invalid_calendar_with_details(
                "slots overlap within a day",
                json!({"context": context}),
            ));
        }
    }

    Ok(())
}
