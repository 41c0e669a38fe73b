use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::TimeSlot;

#[derive(Debug)]
pub enum StoreError {
    NotFound(Ulid),
    /// Uniqueness violation on `(guide, date, time_slot)`.
    Duplicate {
        date: NaiveDate,
        time_slot: TimeSlot,
    },
    AlreadyBooked {
        date: NaiveDate,
        time_slot: TimeSlot,
    },
    LimitExceeded(&'static str),
    JournalError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "slot not found: {id}"),
            StoreError::Duplicate { date, time_slot } => {
                write!(f, "slot already exists: {date} {time_slot}")
            }
            StoreError::AlreadyBooked { date, time_slot } => {
                write!(f, "slot already booked: {date} {time_slot}")
            }
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::JournalError(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}
