use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
    Waitlist,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
            BookingStatus::NoShow => "no_show",
            BookingStatus::Waitlist => "waitlist",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "completed" => Some(BookingStatus::Completed),
            "no_show" => Some(BookingStatus::NoShow),
            "waitlist" => Some(BookingStatus::Waitlist),
            _ => None,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub professional_id: Uuid,
    pub service_id: Uuid,
    pub booking_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub client_name: String,
    pub client_phone: String,
    pub status: BookingStatus,
    pub notes: Option<String>,
}

impl Booking {
    /// Half-open `[start, end)` overlap test.
    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        start < self.end_time && end > self.start_time
    }
}

/// Insert request for a booking; always written as `confirmed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBooking {
    pub professional_id: Uuid,
    pub service_id: Uuid,
    pub booking_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub client_name: String,
    pub client_phone: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingHours {
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start.format("%H:%M"))
    }
}

/// Why a booking request was not written.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("slot {date} {start} is no longer available")]
    SlotUnavailable { date: NaiveDate, start: NaiveTime },

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("{start} is outside working hours on {date}")]
    OutsideWorkingHours { date: NaiveDate, start: NaiveTime },

    #[error("{0} is blocked")]
    DateBlocked(NaiveDate),

    #[error("{date} {start} is in the past")]
    InPast { date: NaiveDate, start: NaiveTime },

    #[error("invalid booking request: {0}")]
    InvalidRequest(String),

    #[error("database error: {0}")]
    Database(String),
}

impl BookingError {
    /// Outcomes the agent answers with alternative slots rather than an apology.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            BookingError::SlotUnavailable { .. }
                | BookingError::OutsideWorkingHours { .. }
                | BookingError::DateBlocked(_)
                | BookingError::InPast { .. }
        )
    }

    pub fn metric_label(&self) -> &'static str {
        match self {
            BookingError::SlotUnavailable { .. } => "slot_unavailable",
            BookingError::ServiceNotFound(_) => "service_not_found",
            BookingError::OutsideWorkingHours { .. } => "outside_working_hours",
            BookingError::DateBlocked(_) => "date_blocked",
            BookingError::InPast { .. } => "in_past",
            BookingError::InvalidRequest(_) => "invalid_request",
            BookingError::Database(_) => "database_error",
        }
    }
}

impl From<sqlx::Error> for BookingError {
    fn from(err: sqlx::Error) -> Self {
        BookingError::Database(err.to_string())
    }
}
