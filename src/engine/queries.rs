use chrono::NaiveDate;

use crate::access::GuideGrant;
use crate::limits::*;
use crate::model::*;
use crate::store::AvailabilityStore;

use super::{EngineError, SchedulingEngine};

impl<S: AvailabilityStore> SchedulingEngine<S> {
    /// Rows of the grant's guide with `from <= date <= to`, ordered by date
    /// then time slot.
    pub async fn list_slots(
        &self,
        grant: &GuideGrant,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AvailabilitySlot>, EngineError> {
        if from > to {
            return Err(EngineError::Validation("from date is after to date"));
        }
        if (to - from).num_days() >= MAX_LIST_WINDOW_DAYS {
            return Err(EngineError::Validation("listing window too wide"));
        }
        let mut rows = self.store.find_range(grant.guide_profile_id(), from, to).await?;
        rows.sort_by_key(AvailabilitySlot::key);
        Ok(rows)
    }
}
