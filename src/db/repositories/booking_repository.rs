use std::convert::TryFrom;

use chrono::NaiveDate;
use rusqlite::types::Value as SqlValue;
use rusqlite::{named_params, Connection, OptionalExtension, Row, ToSql};

use crate::error::{AppError, AppResult};
use crate::models::booking::{
    BookingFilter, BookingLine, BookingRecord, BookingStatus, Customer,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

const BASE_SELECT: &str = r#"
    SELECT
        id,
        customer_name,
        customer_email,
        customer_phone,
        lines,
        date,
        start_time,
        end_time,
        total_price,
        total_duration_minutes,
        status,
        created_at,
        updated_at
    FROM bookings
"#;

#[derive(Debug, Clone)]
pub struct BookingRow {
    pub id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub lines: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub total_price: f64,
    pub total_duration_minutes: i64,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<&Row<'_>> for BookingRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            customer_name: row.get("customer_name")?,
            customer_email: row.get("customer_email")?,
            customer_phone: row.get("customer_phone")?,
            lines: row.get("lines")?,
            date: row.get("date")?,
            start_time: row.get("start_time")?,
            end_time: row.get("end_time")?,
            total_price: row.get("total_price")?,
            total_duration_minutes: row.get("total_duration_minutes")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl BookingRow {
    pub fn from_record(record: &BookingRecord) -> AppResult<Self> {
        Ok(Self {
            id: record.id.clone(),
            customer_name: record.customer.name.clone(),
            customer_email: record.customer.email.clone(),
            customer_phone: record.customer.phone.clone(),
            lines: serde_json::to_string(&record.lines)?,
            date: record.date.format(DATE_FORMAT).to_string(),
            start_time: record.start_time.clone(),
            end_time: record.end_time.clone(),
            total_price: record.total_price,
            total_duration_minutes: record.total_duration_minutes,
            status: record.status.as_str().to_string(),
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        })
    }

    pub fn into_record(self) -> AppResult<BookingRecord> {
        let lines: Vec<BookingLine> = serde_json::from_str(&self.lines)?;
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT)
            .map_err(|err| AppError::database(format!("bad stored date {}: {err}", self.date)))?;
        let status = BookingStatus::parse(&self.status)?;

        Ok(BookingRecord {
            id: self.id,
            customer: Customer {
                name: self.customer_name,
                email: self.customer_email,
                phone: self.customer_phone,
            },
            lines,
            date,
            start_time: self.start_time,
            end_time: self.end_time,
            total_price: self.total_price,
            total_duration_minutes: self.total_duration_minutes,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub struct BookingRepository;

impl BookingRepository {
    pub fn insert(conn: &Connection, row: &BookingRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO bookings (
                    id, customer_name, customer_email, customer_phone, lines,
                    date, start_time, end_time, total_price,
                    total_duration_minutes, status, created_at, updated_at
                ) VALUES (
                    :id, :customer_name, :customer_email, :customer_phone, :lines,
                    :date, :start_time, :end_time, :total_price,
                    :total_duration_minutes, :status, :created_at, :updated_at
                )
            "#,
            named_params! {
                ":id": row.id,
                ":customer_name": row.customer_name,
                ":customer_email": row.customer_email,
                ":customer_phone": row.customer_phone,
                ":lines": row.lines,
                ":date": row.date,
                ":start_time": row.start_time,
                ":end_time": row.end_time,
                ":total_price": row.total_price,
                ":total_duration_minutes": row.total_duration_minutes,
                ":status": row.status,
                ":created_at": row.created_at,
                ":updated_at": row.updated_at,
            },
        )?;
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<BookingRow>> {
        let mut stmt = conn.prepare(&format!("{BASE_SELECT} WHERE id = ?1"))?;
        let row = stmt
            .query_row([id], |row| BookingRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    /// Active (pending/confirmed) bookings for one date; the conflict check
    /// working set.
    pub fn list_active_for_date(conn: &Connection, date: &NaiveDate) -> AppResult<Vec<BookingRow>> {
        let mut stmt = conn.prepare(&format!(
            "{BASE_SELECT} WHERE date = :date AND status IN ('pending', 'confirmed') ORDER BY start_time ASC"
        ))?;

        let rows = stmt
            .query_map(
                named_params! {":date": date.format(DATE_FORMAT).to_string()},
                |row| BookingRow::try_from(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Filtered listing, sorted by (date, start_time) ascending. The
    /// service-line filter is applied by the caller after deserializing the
    /// JSON lines column.
    pub fn list_filtered(conn: &Connection, filter: &BookingFilter) -> AppResult<Vec<BookingRow>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<(&str, SqlValue)> = Vec::new();

        if let Some(date) = &filter.date {
            clauses.push("date = :date".to_string());
            params.push((":date", SqlValue::Text(date.format(DATE_FORMAT).to_string())));
        }

        if let Some(customer) = &filter.customer {
            clauses.push("lower(customer_email) LIKE :customer".to_string());
            params.push((
                ":customer",
                SqlValue::Text(format!("%{}%", customer.to_lowercase())),
            ));
        }

        if let Some(status) = &filter.status {
            clauses.push("status = :status".to_string());
            params.push((":status", SqlValue::Text(status.as_str().to_string())));
        }

        let mut sql = BASE_SELECT.to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY date ASC, start_time ASC");

        let mut stmt = conn.prepare(&sql)?;
        let bound: Vec<(&str, &dyn ToSql)> = params
            .iter()
            .map(|(name, value)| (*name, value as &dyn ToSql))
            .collect();

        let rows = stmt
            .query_map(bound.as_slice(), |row| BookingRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Compare-and-swap status write: only succeeds while the stored status
    /// still equals `expected`. Zero rows changed means a concurrent
    /// transition won; the caller re-reads and re-evaluates.
    pub fn update_status(
        conn: &Connection,
        id: &str,
        expected: BookingStatus,
        status: BookingStatus,
        updated_at: &str,
    ) -> AppResult<usize> {
        let changed = conn.execute(
            r#"
                UPDATE bookings SET status = :status, updated_at = :updated_at
                WHERE id = :id AND status = :expected
            "#,
            named_params! {
                ":id": id,
                ":expected": expected.as_str(),
                ":status": status.as_str(),
                ":updated_at": updated_at,
            },
        )?;
        Ok(changed)
    }
}
