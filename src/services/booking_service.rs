use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::db::repositories::booking_repository::{BookingRepository, BookingRow};
use crate::db::DbPool;
use crate::error::{AppError, AppResult, ConflictEntry};
use crate::models::availability::DayOfWeek;
use crate::models::booking::{
    BookingCreateInput, BookingFilter, BookingLine, BookingRecord, BookingStatus, Customer,
};
use crate::services::availability_service::AvailabilityService;
use crate::services::catalog_service::CatalogService;
use crate::services::timespan;

const COMMIT_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// The booking ledger. Validates a prospective booking against every
/// requested service's calendar and against all committed bookings for the
/// date, then commits atomically.
///
/// Commits are serialized per date: a process-wide lock registry shared by
/// all clones keeps the check-then-act window closed, and the insert runs
/// inside an IMMEDIATE transaction so the ledger never shows a partial
/// booking. Different dates commit fully in parallel.
#[derive(Clone)]
pub struct BookingService {
    db: DbPool,
    catalog: Arc<CatalogService>,
    availability: Arc<AvailabilityService>,
    date_locks: Arc<Mutex<HashMap<NaiveDate, Arc<Mutex<()>>>>>,
}

/// Aggregated request span: all lines of one booking occupy a single
/// contiguous block, executed sequentially.
struct AggregatedSpan {
    lines: Vec<BookingLine>,
    start_min: i64,
    end_min: i64,
    total_price: f64,
    total_duration: i64,
}

impl BookingService {
    pub fn new(
        db: DbPool,
        catalog: Arc<CatalogService>,
        availability: Arc<AvailabilityService>,
    ) -> Self {
        Self {
            db,
            catalog,
            availability,
            date_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn create_booking(&self, input: BookingCreateInput) -> AppResult<BookingRecord> {
        validate_customer(&input.customer)?;
        let span = self.aggregate_lines(&input.lines, &input.start_time)?;

        // Every distinct service must be open for the whole aggregated span,
        // not a per-service sub-slice of it.
        let day: DayOfWeek = input.date.weekday().into();
        let mut checked = std::collections::HashSet::new();
        for line in &span.lines {
            if !checked.insert(line.service_id.clone()) {
                continue;
            }
            let open = self.availability.is_span_open(
                &line.service_id,
                input.date,
                span.start_min,
                span.end_min,
            )?;
            if !open {
                return Err(AppError::service_unavailable(
                    line.service_id.clone(),
                    day.as_str(),
                ));
            }
        }

        let record = self.commit_with_retry(&input, &span)?;
        info!(
            booking_id = %record.id,
            date = %record.date,
            start = %record.start_time,
            end = %record.end_time,
            "booking created"
        );
        Ok(record)
    }

    pub fn get_booking(&self, id: &str) -> AppResult<BookingRecord> {
        let row = self
            .db
            .with_connection(|conn| BookingRepository::find_by_id(conn, id))?
            .ok_or_else(AppError::not_found)?;
        let record = row.into_record()?;
        debug!(booking_id = %record.id, "booking fetched");
        Ok(record)
    }

    /// Lists bookings sorted by (date, start_time) ascending. The
    /// service-line filter runs after deserialization since lines live in a
    /// JSON column.
    pub fn list_bookings(&self, filter: BookingFilter) -> AppResult<Vec<BookingRecord>> {
        let rows = self
            .db
            .with_connection(|conn| BookingRepository::list_filtered(conn, &filter))?;

        let mut bookings = Vec::with_capacity(rows.len());
        for row in rows {
            let record = row.into_record()?;
            if let Some(service_id) = &filter.service_id {
                if !record.lines.iter().any(|line| &line.service_id == service_id) {
                    continue;
                }
            }
            bookings.push(record);
        }

        debug!(count = bookings.len(), "bookings listed");
        Ok(bookings)
    }

    /// Lifecycle transitions: pending→confirmed, pending|confirmed→cancelled,
    /// confirmed→completed. A same-status update is an idempotent no-op.
    /// Date, times, lines and price never change here; cancelling and
    /// rebooking is the only path to a different slot.
    pub fn update_status(&self, id: &str, new_status: &str) -> AppResult<BookingRecord> {
        let next = BookingStatus::parse(new_status)?;

        // Compare-and-swap loop: the write only lands while the status is
        // still the one the transition was checked against, so a concurrent
        // operator can never resurrect a terminal booking.
        loop {
            let mut existing = self.get_booking(id)?;

            if existing.status == next {
                debug!(booking_id = %id, status = %next, "status unchanged");
                return Ok(existing);
            }

            if !existing.status.can_transition_to(next) {
                warn!(
                    booking_id = %id,
                    from = %existing.status,
                    to = %next,
                    "illegal status transition"
                );
                return Err(AppError::invalid_status(format!(
                    "{} -> {}",
                    existing.status, next
                )));
            }

            let updated_at = Utc::now().to_rfc3339();
            let changed = self.db.with_connection(|conn| {
                BookingRepository::update_status(conn, id, existing.status, next, &updated_at)
            })?;
            if changed > 0 {
                existing.status = next;
                existing.updated_at = updated_at;
                info!(booking_id = %id, status = %next, "booking status updated");
                return Ok(existing);
            }

            debug!(booking_id = %id, "status changed concurrently, re-reading");
        }
    }

    /// Resolves each line against the catalog and folds the request into one
    /// sequential span. Price and duration are fixed here, at creation, and
    /// never recomputed.
    fn aggregate_lines(&self, lines: &[BookingLine], start_time: &str) -> AppResult<AggregatedSpan> {
        if lines.is_empty() {
            return Err(AppError::validation("booking requires at least one service line"));
        }

        let start_min = timespan::to_minutes(start_time)?;
        let mut total_price = 0.0;
        let mut total_duration: i64 = 0;

        for line in lines {
            if line.quantity <= 0 {
                return Err(AppError::validation("line quantity must be greater than 0"));
            }
            let service = self.catalog.get_service(&line.service_id)?;
            total_price += service.price * line.quantity as f64;
            total_duration = service
                .duration_minutes
                .checked_mul(line.quantity)
                .and_then(|line_duration| total_duration.checked_add(line_duration))
                .ok_or_else(|| AppError::validation("booking duration is too large"))?;
        }

        let end_min = start_min
            .checked_add(total_duration)
            .ok_or_else(|| AppError::validation("booking duration is too large"))?;
        if end_min > timespan::MINUTES_PER_DAY {
            return Err(AppError::validation("booking must end within the same day"));
        }

        Ok(AggregatedSpan {
            lines: lines.to_vec(),
            start_min,
            end_min,
            total_price,
            total_duration,
        })
    }

    fn commit_with_retry(
        &self,
        input: &BookingCreateInput,
        span: &AggregatedSpan,
    ) -> AppResult<BookingRecord> {
        let mut attempt = 0;
        let result = loop {
            match self.commit(input, span) {
                Err(AppError::Unavailable) if attempt < COMMIT_RETRIES => {
                    attempt += 1;
                    warn!(date = %input.date, attempt, "ledger busy, retrying commit");
                    std::thread::sleep(RETRY_BACKOFF);
                }
                other => break other,
            }
        };
        self.release_date_lock(input.date);
        result
    }

    /// Steps 2-3 of the validation order: conflict check and insert, under
    /// the per-date lock and a single IMMEDIATE transaction.
    fn commit(&self, input: &BookingCreateInput, span: &AggregatedSpan) -> AppResult<BookingRecord> {
        let lock = self.lock_for_date(input.date);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        self.db.with_immediate_transaction(|tx| {
            let existing = BookingRepository::list_active_for_date(tx, &input.date)?;
            let mut conflicts = Vec::new();
            for row in &existing {
                let other_start = timespan::to_minutes(&row.start_time)?;
                let other_end = timespan::to_minutes(&row.end_time)?;
                if timespan::overlaps(other_start, other_end, span.start_min, span.end_min) {
                    conflicts.push(ConflictEntry {
                        booking_id: row.id.clone(),
                        time: format!("{}-{}", row.start_time, row.end_time),
                    });
                }
            }
            if !conflicts.is_empty() {
                return Err(AppError::slot_conflict(conflicts));
            }

            let now = Utc::now().to_rfc3339();
            let record = BookingRecord {
                id: uuid::Uuid::new_v4().to_string(),
                customer: input.customer.clone(),
                lines: span.lines.clone(),
                date: input.date,
                start_time: timespan::from_minutes(span.start_min),
                end_time: timespan::from_minutes(span.end_min),
                total_price: span.total_price,
                total_duration_minutes: span.total_duration,
                status: BookingStatus::Pending,
                created_at: now.clone(),
                updated_at: now,
            };

            let row = BookingRow::from_record(&record)?;
            BookingRepository::insert(tx, &row)?;

            Ok(record)
        })
    }

    fn lock_for_date(&self, date: NaiveDate) -> Arc<Mutex<()>> {
        let mut locks = self
            .date_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(date).or_default())
    }

    /// Evicts the date entry once no commit holds a clone of its lock, so
    /// the registry stays bounded by the number of in-flight dates rather
    /// than every date ever booked. The registry mutex serializes this
    /// against `lock_for_date`, so an entry with waiters is never dropped.
    fn release_date_lock(&self, date: NaiveDate) {
        let mut locks = self
            .date_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(lock) = locks.get(&date) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(&date);
            }
        }
    }
}

fn validate_customer(customer: &Customer) -> AppResult<()> {
    if customer.name.trim().is_empty() {
        return Err(AppError::validation("customer name must not be empty"));
    }
    let email = customer.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::validation("customer email is not valid"));
    }
    Ok(())
}
