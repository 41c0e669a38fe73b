mod error;
mod journal;

pub use error::StoreError;
pub use journal::{JournalStore, SharedCalendar};

use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

/// Persistence port for guide calendars.
///
/// Implementations must reject an insert batch that would put two rows on the
/// same `(guide, date, time_slot)` key. Each method is one independent write;
/// callers that need several to appear together serialize per guide.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// Rows of `guide_id` dated on any of `dates`.
    async fn find_slots(
        &self,
        guide_id: Ulid,
        dates: &[NaiveDate],
    ) -> Result<Vec<AvailabilitySlot>, StoreError>;

    /// Rows of `guide_id` dated within `[from, to]`, in `(date, time_slot)` order.
    async fn find_range(
        &self,
        guide_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AvailabilitySlot>, StoreError>;

    async fn delete_slot(&self, id: Ulid) -> Result<(), StoreError>;

    async fn update_status(&self, id: Ulid, status: SlotStatus) -> Result<(), StoreError>;

    /// Insert all rows or none. Returns the number inserted.
    async fn insert_slots(&self, rows: Vec<NewSlot>) -> Result<usize, StoreError>;
}
