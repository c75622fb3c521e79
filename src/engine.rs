use std::sync::Arc;

use chrono::NaiveDate;

use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::availability::{AvailabilityRecord, CheckResult, DateException, DayRule};
use crate::models::booking::{BookingCreateInput, BookingFilter, BookingRecord};
use crate::models::service::{ServiceCreateInput, ServiceRecord, ServiceUpdateInput};
use crate::services::availability_service::AvailabilityService;
use crate::services::booking_service::BookingService;
use crate::services::catalog_service::CatalogService;

/// Narrow facade over the engine. Callers (HTTP layer, admin UI, tests)
/// only ever talk to this; everything behind it is stateless between calls
/// apart from the persisted ledger and calendars.
#[derive(Clone)]
pub struct BookingEngine {
    catalog: Arc<CatalogService>,
    availability: Arc<AvailabilityService>,
    bookings: BookingService,
}

impl BookingEngine {
    pub fn new(db: DbPool) -> Self {
        let catalog = Arc::new(CatalogService::new(db.clone()));
        let availability = Arc::new(AvailabilityService::new(db.clone()));
        let bookings = BookingService::new(db, Arc::clone(&catalog), Arc::clone(&availability));
        Self {
            catalog,
            availability,
            bookings,
        }
    }

    // Catalog

    pub fn create_service(&self, input: ServiceCreateInput) -> AppResult<ServiceRecord> {
        self.catalog.create_service(input)
    }

    pub fn update_service(&self, id: &str, input: ServiceUpdateInput) -> AppResult<ServiceRecord> {
        self.catalog.update_service(id, input)
    }

    pub fn delete_service(&self, id: &str) -> AppResult<()> {
        self.catalog.delete_service(id)
    }

    pub fn get_service(&self, id: &str) -> AppResult<ServiceRecord> {
        self.catalog.get_service(id)
    }

    pub fn list_services(&self, search: Option<&str>) -> AppResult<Vec<ServiceRecord>> {
        self.catalog.list_services(search)
    }

    // Availability

    pub fn set_calendar(
        &self,
        service_id: &str,
        working_hours: Vec<DayRule>,
        exceptions: Vec<DateException>,
    ) -> AppResult<AvailabilityRecord> {
        self.availability
            .set_calendar(service_id, working_hours, exceptions)
    }

    pub fn get_calendar(&self, service_id: &str) -> AppResult<AvailabilityRecord> {
        self.availability.get_calendar(service_id)
    }

    pub fn check_availability(
        &self,
        service_ids: &[String],
        date: NaiveDate,
        start_time: &str,
    ) -> AppResult<Vec<CheckResult>> {
        self.availability
            .check_availability(service_ids, date, start_time)
    }

    // Bookings

    pub fn create_booking(&self, input: BookingCreateInput) -> AppResult<BookingRecord> {
        self.bookings.create_booking(input)
    }

    pub fn get_booking(&self, id: &str) -> AppResult<BookingRecord> {
        self.bookings.get_booking(id)
    }

    pub fn list_bookings(&self, filter: BookingFilter) -> AppResult<Vec<BookingRecord>> {
        self.bookings.list_bookings(filter)
    }

    pub fn update_status(&self, id: &str, new_status: &str) -> AppResult<BookingRecord> {
        self.bookings.update_status(id, new_status)
    }
}
