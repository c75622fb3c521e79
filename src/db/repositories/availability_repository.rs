use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::AppResult;
use crate::models::availability::{AvailabilityRecord, DateException, DayRule};

#[derive(Debug, Clone)]
pub struct AvailabilityRow {
    pub service_id: String,
    pub working_hours: String,
    pub exceptions: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<&Row<'_>> for AvailabilityRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            service_id: row.get("service_id")?,
            working_hours: row.get("working_hours")?,
            exceptions: row.get("exceptions")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl AvailabilityRow {
    pub fn from_record(record: &AvailabilityRecord) -> AppResult<Self> {
        Ok(Self {
            service_id: record.service_id.clone(),
            working_hours: serde_json::to_string(&record.working_hours)?,
            exceptions: serde_json::to_string(&record.exceptions)?,
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        })
    }

    pub fn into_record(self) -> AppResult<AvailabilityRecord> {
        let working_hours: Vec<DayRule> = serde_json::from_str(&self.working_hours)?;
        let exceptions: Vec<DateException> = serde_json::from_str(&self.exceptions)?;
        Ok(AvailabilityRecord {
            service_id: self.service_id,
            working_hours,
            exceptions,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub struct AvailabilityRepository;

impl AvailabilityRepository {
    /// Whole-row upsert: the calendar is replaced in one shot, never patched.
    pub fn upsert(conn: &Connection, row: &AvailabilityRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO availabilities (
                    service_id, working_hours, exceptions, created_at, updated_at
                ) VALUES (
                    :service_id, :working_hours, :exceptions, :created_at, :updated_at
                )
                ON CONFLICT(service_id) DO UPDATE SET
                    working_hours = excluded.working_hours,
                    exceptions = excluded.exceptions,
                    updated_at = excluded.updated_at
            "#,
            named_params! {
                ":service_id": row.service_id,
                ":working_hours": row.working_hours,
                ":exceptions": row.exceptions,
                ":created_at": row.created_at,
                ":updated_at": row.updated_at,
            },
        )?;
        Ok(())
    }

    pub fn find_by_service(conn: &Connection, service_id: &str) -> AppResult<Option<AvailabilityRow>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT service_id, working_hours, exceptions, created_at, updated_at
                FROM availabilities
                WHERE service_id = ?1
            "#,
        )?;

        let row = stmt
            .query_row([service_id], |row| AvailabilityRow::try_from(row))
            .optional()?;

        Ok(row)
    }
}
