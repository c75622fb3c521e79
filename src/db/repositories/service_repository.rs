use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::AppResult;
use crate::models::service::ServiceRecord;

const BASE_SELECT: &str = r#"
    SELECT
        id,
        name,
        description,
        price,
        duration_minutes,
        is_active,
        created_at,
        updated_at
    FROM services
"#;

#[derive(Debug, Clone)]
pub struct ServiceRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub duration_minutes: i64,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<&Row<'_>> for ServiceRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            price: row.get("price")?,
            duration_minutes: row.get("duration_minutes")?,
            is_active: row.get("is_active")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl ServiceRow {
    pub fn from_record(record: &ServiceRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            price: record.price,
            duration_minutes: record.duration_minutes,
            is_active: record.is_active,
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    pub fn into_record(self) -> ServiceRecord {
        ServiceRecord {
            id: self.id,
            name: self.name,
            description: self.description,
            price: self.price,
            duration_minutes: self.duration_minutes,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

pub struct ServiceRepository;

impl ServiceRepository {
    pub fn insert(conn: &Connection, row: &ServiceRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO services (
                    id, name, description, price, duration_minutes,
                    is_active, created_at, updated_at
                ) VALUES (
                    :id, :name, :description, :price, :duration_minutes,
                    :is_active, :created_at, :updated_at
                )
            "#,
            named_params! {
                ":id": row.id,
                ":name": row.name,
                ":description": row.description,
                ":price": row.price,
                ":duration_minutes": row.duration_minutes,
                ":is_active": row.is_active,
                ":created_at": row.created_at,
                ":updated_at": row.updated_at,
            },
        )?;
        Ok(())
    }

    pub fn update(conn: &Connection, row: &ServiceRow) -> AppResult<usize> {
        let changed = conn.execute(
            r#"
                UPDATE services SET
                    name = :name,
                    description = :description,
                    price = :price,
                    duration_minutes = :duration_minutes,
                    is_active = :is_active,
                    updated_at = :updated_at
                WHERE id = :id
            "#,
            named_params! {
                ":id": row.id,
                ":name": row.name,
                ":description": row.description,
                ":price": row.price,
                ":duration_minutes": row.duration_minutes,
                ":is_active": row.is_active,
                ":updated_at": row.updated_at,
            },
        )?;
        Ok(changed)
    }

    pub fn delete(conn: &Connection, id: &str) -> AppResult<usize> {
        let changed = conn.execute("DELETE FROM services WHERE id = ?1", [id])?;
        Ok(changed)
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<ServiceRow>> {
        let mut stmt = conn.prepare(&format!("{BASE_SELECT} WHERE id = ?1"))?;
        let row = stmt
            .query_row([id], |row| ServiceRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    /// Lists active services, optionally filtered by a case-insensitive
    /// substring match on name or description.
    pub fn list_active(conn: &Connection, search: Option<&str>) -> AppResult<Vec<ServiceRow>> {
        match search {
            Some(term) => {
                let pattern = format!("%{}%", term.to_lowercase());
                let mut stmt = conn.prepare(&format!(
                    r#"{BASE_SELECT}
                    WHERE is_active = 1
                      AND (lower(name) LIKE :pattern
                           OR lower(coalesce(description, '')) LIKE :pattern)
                    ORDER BY name ASC"#
                ))?;
                let rows = stmt
                    .query_map(named_params! {":pattern": pattern}, |row| {
                        ServiceRow::try_from(row)
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!("{BASE_SELECT} WHERE is_active = 1 ORDER BY name ASC"))?;
                let rows = stmt
                    .query_map([], |row| ServiceRow::try_from(row))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            }
        }
    }
}
