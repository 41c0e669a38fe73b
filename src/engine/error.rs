use crate::model::TimeSlot;
use crate::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    /// A directive targeted a slot already consumed by a booking.
    SlotBooked(TimeSlot),
    /// The bulk range matched more dates than `limit`.
    RangeTooLarge { limit: usize },
    /// The bulk range and weekday filter matched nothing.
    NoMatchingDates,
    /// The final bulk insert failed. Earlier deletes/updates of the same call
    /// may already be applied.
    InsertFailed(StoreError),
    Validation(&'static str),
    Forbidden,
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::SlotBooked(ts) => write!(f, "slot is booked: {ts}"),
            EngineError::RangeTooLarge { limit } => {
                write!(f, "range too large: more than {limit} matching dates")
            }
            EngineError::NoMatchingDates => write!(f, "no dates in range match the weekday filter"),
            EngineError::InsertFailed(e) => {
                write!(f, "insert failed (earlier changes may be applied, re-query before retrying): {e}")
            }
            EngineError::Validation(msg) => write!(f, "invalid request: {msg}"),
            EngineError::Forbidden => write!(f, "not allowed to manage this calendar"),
            EngineError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::InsertFailed(e) | EngineError::Store(e) => Some(e),
            _ => None,
        }
    }
}
