use chrono::NaiveDate;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::access::GuideGrant;
use crate::limits::*;
use crate::model::*;
use crate::store::{AvailabilityStore, JournalStore, StoreError};

use super::plan::{plan_bulk, plan_day_edit, shape_bulk};
use super::{EngineError, SchedulingEngine};

impl<S: AvailabilityStore> SchedulingEngine<S> {
    /// Apply per-slot directives to one date of the grant's guide.
    ///
    /// Nothing is written if any directive targets a booked slot.
    pub async fn set_day_slots(
        &self,
        grant: &GuideGrant,
        date: NaiveDate,
        directives: &[SlotDirective],
    ) -> Result<(), EngineError> {
        let guide_id = grant.guide_profile_id();
        let _guard = self.lock_guide(guide_id).await;

        let existing = self.store.find_slots(guide_id, &[date]).await?;
        let plan = plan_day_edit(grant.organization_id(), guide_id, date, &existing, directives)?;
        if plan.is_empty() {
            debug!(%guide_id, %date, "day edit: nothing to change");
            return Ok(());
        }

        self.apply_writes(&plan.writes).await?;
        let inserted = if plan.inserts.is_empty() {
            0
        } else {
            self.store.insert_slots(plan.inserts).await?
        };
        metrics::counter!(crate::observability::SLOT_WRITES_TOTAL, "kind" => "insert")
            .increment(inserted as u64);

        debug!(%guide_id, %date, writes = plan.writes.len(), inserted, "day edit applied");
        Ok(())
    }

    /// Set `request.status` on every `(date, time_slot)` pair the request
    /// covers. Booked pairs are skipped and counted.
    ///
    /// Deletes and updates run before the single insert batch. If that batch
    /// fails the call returns `InsertFailed` with the earlier writes applied.
    pub async fn bulk_set_availability(
        &self,
        grant: &GuideGrant,
        request: &BulkRequest,
    ) -> Result<BulkOutcome, EngineError> {
        let shape = shape_bulk(request, MAX_BULK_DATES)?;
        let guide_id = grant.guide_profile_id();
        let _guard = self.lock_guide(guide_id).await;

        let existing = self.store.find_slots(guide_id, &shape.dates).await?;
        let plan = plan_bulk(grant.organization_id(), guide_id, &shape, &existing);

        self.apply_writes(&plan.writes).await?;
        let created = if plan.inserts.is_empty() {
            0
        } else {
            match self.store.insert_slots(plan.inserts).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(%guide_id, error = %e, "bulk insert failed after {} writes", plan.writes.len());
                    return Err(EngineError::InsertFailed(e));
                }
            }
        };
        metrics::counter!(crate::observability::SLOT_WRITES_TOTAL, "kind" => "insert")
            .increment(created as u64);
        metrics::counter!(crate::observability::BOOKED_SKIPS_TOTAL).increment(plan.skipped as u64);

        let outcome = BulkOutcome {
            created,
            updated: plan.updated,
            skipped: plan.skipped,
        };
        info!(
            %guide_id,
            dates = shape.dates.len(),
            created = outcome.created,
            updated = outcome.updated,
            skipped = outcome.skipped,
            "bulk availability applied"
        );
        Ok(outcome)
    }
}

impl SchedulingEngine<JournalStore> {
    /// Mark a key booked on behalf of the booking workflow. Serialized with
    /// calendar edits of the same guide.
    pub async fn record_booking(
        &self,
        grant: &GuideGrant,
        date: NaiveDate,
        time_slot: TimeSlot,
        booking_id: Ulid,
    ) -> Result<Ulid, EngineError> {
        let guide_id = grant.guide_profile_id();
        let _guard = self.lock_guide(guide_id).await;
        let id = self
            .store
            .record_booking(grant.organization_id(), guide_id, date, time_slot, booking_id)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyBooked { time_slot, .. } => EngineError::SlotBooked(time_slot),
                other => EngineError::Store(other),
            })?;
        info!(%guide_id, %date, %time_slot, %booking_id, "booking recorded");
        Ok(id)
    }
}
