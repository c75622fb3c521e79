use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// One contiguous open interval within a day, minute granularity.
/// Times are zero-padded `HH:MM` strings; the services layer validates them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn as_str(self) -> &'static str {
        match self {
            DayOfWeek::Monday => "monday",
            DayOfWeek::Tuesday => "tuesday",
            DayOfWeek::Wednesday => "wednesday",
            DayOfWeek::Thursday => "thursday",
            DayOfWeek::Friday => "friday",
            DayOfWeek::Saturday => "saturday",
            DayOfWeek::Sunday => "sunday",
        }
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

impl std::fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recurring weekly availability for one weekday.
/// Invariant (enforced by `AvailabilityService::set_calendar`): at most one
/// rule per weekday, slots non-overlapping with `start < end`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DayRule {
    pub day: DayOfWeek,
    pub is_available: bool,
    #[serde(default)]
    pub slots: Vec<TimeSlot>,
}

/// Date-specific override. Takes total precedence over the weekly rule for
/// its date; at most one exception per date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DateException {
    pub date: NaiveDate,
    pub is_available: bool,
    #[serde(default)]
    pub slots: Vec<TimeSlot>,
}

/// The full calendar for one service. Replaced wholesale, never patched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRecord {
    pub service_id: String,
    pub working_hours: Vec<DayRule>,
    pub exceptions: Vec<DateException>,
    pub created_at: String,
    pub updated_at: String,
}

/// Outcome of a single-service availability check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub service_id: String,
    pub available: bool,
    #[serde(default)]
    pub reason: Option<String>,
}
