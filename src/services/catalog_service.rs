use chrono::Utc;
use tracing::{debug, info};

use crate::db::repositories::service_repository::{ServiceRepository, ServiceRow};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::service::{ServiceCreateInput, ServiceRecord, ServiceUpdateInput};

/// Read/write catalog of bookable services. The booking engine itself only
/// ever reads price and duration from here.
#[derive(Clone)]
pub struct CatalogService {
    db: DbPool,
}

impl CatalogService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn create_service(&self, input: ServiceCreateInput) -> AppResult<ServiceRecord> {
        let now = Utc::now().to_rfc3339();
        let record = ServiceRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: normalize_name(&input.name)?,
            description: normalize_optional_string(input.description),
            price: normalize_price(input.price)?,
            duration_minutes: normalize_duration(input.duration_minutes)?,
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        };

        let row = ServiceRow::from_record(&record);
        self.db
            .with_connection(|conn| ServiceRepository::insert(conn, &row))?;
        info!(service_id = %record.id, name = %record.name, "service created");
        Ok(record)
    }

    pub fn update_service(&self, id: &str, update: ServiceUpdateInput) -> AppResult<ServiceRecord> {
        let mut existing = self.get_service(id)?;

        if let Some(name) = update.name {
            existing.name = normalize_name(&name)?;
        }
        if let Some(description) = update.description {
            existing.description = normalize_optional_string(description);
        }
        if let Some(price) = update.price {
            existing.price = normalize_price(price)?;
        }
        if let Some(duration) = update.duration_minutes {
            existing.duration_minutes = normalize_duration(duration)?;
        }
        if let Some(is_active) = update.is_active {
            existing.is_active = is_active;
        }
        existing.updated_at = Utc::now().to_rfc3339();

        let row = ServiceRow::from_record(&existing);
        self.db
            .with_connection(|conn| ServiceRepository::update(conn, &row))?;
        info!(service_id = %existing.id, "service updated");
        Ok(existing)
    }

    /// Removes the service and, via the FK cascade, its calendar row.
    /// Stored bookings keep their copied lines so historical reads survive.
    pub fn delete_service(&self, id: &str) -> AppResult<()> {
        let changed = self
            .db
            .with_connection(|conn| ServiceRepository::delete(conn, id))?;
        if changed == 0 {
            return Err(AppError::service_not_found(id));
        }
        info!(service_id = %id, "service deleted");
        Ok(())
    }

    pub fn get_service(&self, id: &str) -> AppResult<ServiceRecord> {
        let row = self
            .db
            .with_connection(|conn| ServiceRepository::find_by_id(conn, id))?
            .ok_or_else(|| AppError::service_not_found(id))?;
        let record = row.into_record();
        debug!(service_id = %record.id, "service fetched");
        Ok(record)
    }

    pub fn list_services(&self, search: Option<&str>) -> AppResult<Vec<ServiceRecord>> {
        let search = search.map(str::trim).filter(|term| !term.is_empty());
        let rows = self
            .db
            .with_connection(|conn| ServiceRepository::list_active(conn, search))?;
        let services = rows.into_iter().map(ServiceRow::into_record).collect::<Vec<_>>();
        debug!(count = services.len(), "services listed");
        Ok(services)
    }
}

fn normalize_name(name: &str) -> AppResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("service name must not be empty"));
    }
    if trimmed.chars().count() > 120 {
        return Err(AppError::validation("service name must be 120 characters or fewer"));
    }
    Ok(trimmed.to_string())
}

fn normalize_optional_string(value: Option<String>) -> Option<String> {
    value.and_then(|val| {
        let trimmed = val.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

fn normalize_price(price: f64) -> AppResult<f64> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::validation("price must be a non-negative number"));
    }
    Ok(price)
}

fn normalize_duration(minutes: i64) -> AppResult<i64> {
    if minutes <= 0 {
        return Err(AppError::validation("duration must be greater than 0 minutes"));
    }
    if minutes > 24 * 60 {
        return Err(AppError::validation("duration must fit within one day"));
    }
    Ok(minutes)
}
