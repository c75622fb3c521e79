use rusqlite;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

/// One conflicting booking reported inside [`AppError::SlotConflict`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictEntry {
    pub booking_id: String,
    pub time: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {message}")]
    Database { message: String },

    #[error("record not found")]
    NotFound,

    #[error("malformed time value: {value}")]
    MalformedTime { value: String },

    #[error("invalid calendar: {message}")]
    InvalidCalendar {
        message: String,
        details: Option<JsonValue>,
    },

    #[error("availability not set for service {service_id}")]
    CalendarNotConfigured { service_id: String },

    #[error("service {service_id} not found")]
    ServiceNotFound { service_id: String },

    #[error("service {service_id} not available on {day}")]
    ServiceUnavailable { service_id: String, day: String },

    #[error("time slot already booked")]
    SlotConflict { conflicts: Vec<ConflictEntry> },

    #[error("invalid status value: {value}")]
    InvalidStatus { value: String },

    #[error("validation failed: {message}")]
    Validation {
        message: String,
        details: Option<JsonValue>,
    },

    #[error("storage temporarily unavailable")]
    Unavailable,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "validation error");
        AppError::Validation {
            message,
            details: None,
        }
    }

    pub fn malformed_time(value: impl Into<String>) -> Self {
        let value = value.into();
        warn!(target: "app::validation", %value, "malformed time");
        AppError::MalformedTime { value }
    }

    pub fn invalid_calendar_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(target: "app::calendar", %message, details = %details, "invalid calendar");
        AppError::InvalidCalendar {
            message,
            details: Some(details),
        }
    }

    pub fn calendar_not_configured(service_id: impl Into<String>) -> Self {
        let service_id = service_id.into();
        warn!(target: "app::calendar", %service_id, "calendar not configured");
        AppError::CalendarNotConfigured { service_id }
    }

    pub fn service_not_found(service_id: impl Into<String>) -> Self {
        let service_id = service_id.into();
        warn!(target: "app::catalog", %service_id, "service not found");
        AppError::ServiceNotFound { service_id }
    }

    pub fn service_unavailable(service_id: impl Into<String>, day: impl Into<String>) -> Self {
        let service_id = service_id.into();
        let day = day.into();
        warn!(target: "app::booking", %service_id, %day, "service unavailable");
        AppError::ServiceUnavailable { service_id, day }
    }

    pub fn slot_conflict(conflicts: Vec<ConflictEntry>) -> Self {
        warn!(target: "app::booking", count = conflicts.len(), "slot conflict");
        AppError::SlotConflict { conflicts }
    }

    pub fn invalid_status(value: impl Into<String>) -> Self {
        let value = value.into();
        warn!(target: "app::booking", %value, "invalid status");
        AppError::InvalidStatus { value }
    }

    pub fn not_found() -> Self {
        warn!(target: "app::database", "resource not found");
        AppError::NotFound
    }

    pub fn database(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::database", %message, "database error");
        AppError::Database { message }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        use rusqlite::Error::{QueryReturnedNoRows, SqliteFailure};
        use rusqlite::ErrorCode;

        match &error {
            QueryReturnedNoRows => AppError::not_found(),
            SqliteFailure(err, _)
                if err.code == ErrorCode::DatabaseBusy || err.code == ErrorCode::DatabaseLocked =>
            {
                warn!(target: "app::database", error = ?error, "sqlite busy");
                AppError::Unavailable
            }
            _ => {
                error!(target: "app::database", error = ?error, "sqlite error");
                AppError::database(error.to_string())
            }
        }
    }
}
