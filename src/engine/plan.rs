use std::collections::HashMap;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::EngineError;

// ── Planned store writes ──────────────────────────────────────────

/// A single id-addressed store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Write {
    Delete(Ulid),
    Update { id: Ulid, status: SlotStatus },
}

/// Result of planning: ordered deletes/updates, then one insert batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub writes: Vec<Write>,
    pub inserts: Vec<NewSlot>,
    /// Pairs that hit an existing open row (bulk only).
    pub updated: usize,
    /// Pairs whose exact key is booked (bulk only).
    pub skipped: usize,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.inserts.is_empty()
    }
}

// ── Working view ─────────────────────────────────────────────────

enum Entry {
    Stored(AvailabilitySlot),
    /// Index into `Workspace::queued`.
    Queued(usize),
}

enum Put {
    Updated,
    Queued,
}

/// Calendar rows as they will look once the writes planned so far are applied.
struct Workspace<'a> {
    organization_id: &'a str,
    guide_id: Ulid,
    view: HashMap<SlotKey, Entry>,
    writes: Vec<Write>,
    queued: Vec<Option<NewSlot>>,
}

impl<'a> Workspace<'a> {
    fn new(organization_id: &'a str, guide_id: Ulid, existing: &[AvailabilitySlot]) -> Self {
        let view = existing
            .iter()
            .filter(|s| s.guide_profile_id == guide_id)
            .map(|s| (s.key(), Entry::Stored(s.clone())))
            .collect();
        Self {
            organization_id,
            guide_id,
            view,
            writes: Vec::new(),
            queued: Vec::new(),
        }
    }

    fn is_booked(&self, key: &SlotKey) -> bool {
        matches!(self.view.get(key), Some(Entry::Stored(s)) if s.is_booked())
    }

    /// Remove whatever occupies `key`, unless it is booked.
    fn clear(&mut self, key: SlotKey) {
        if self.is_booked(&key) {
            return;
        }
        match self.view.remove(&key) {
            Some(Entry::Stored(slot)) => self.writes.push(Write::Delete(slot.id)),
            Some(Entry::Queued(idx)) => self.queued[idx] = None,
            None => {}
        }
    }

    /// Remove the other tier's rows on `key.date`. Booked rows stay.
    fn clear_opposite_tier(&mut self, key: SlotKey) {
        for &other in key.time_slot.opposite_tier() {
            self.clear(SlotKey::new(key.date, other));
        }
    }

    /// Give `key` the status `status`: update in place, or queue an insert.
    /// Callers check `is_booked` first.
    fn put(&mut self, key: SlotKey, status: SlotStatus) -> Put {
        match self.view.get_mut(&key) {
            Some(Entry::Stored(slot)) => {
                if slot.status != status {
                    slot.status = status;
                    self.writes.push(Write::Update { id: slot.id, status });
                }
                Put::Updated
            }
            Some(Entry::Queued(idx)) => {
                if let Some(row) = self.queued[*idx].as_mut() {
                    row.status = status;
                }
                Put::Queued
            }
            None => {
                self.queued.push(Some(NewSlot {
                    organization_id: self.organization_id.to_string(),
                    guide_profile_id: self.guide_id,
                    date: key.date,
                    time_slot: key.time_slot,
                    status,
                }));
                self.view.insert(key, Entry::Queued(self.queued.len() - 1));
                Put::Queued
            }
        }
    }

    fn finish(self) -> Plan {
        Plan {
            writes: self.writes,
            inserts: self.queued.into_iter().flatten().collect(),
            updated: 0,
            skipped: 0,
        }
    }
}

// ── Single-day edit ──────────────────────────────────────────────

fn validate_directives(directives: &[SlotDirective]) -> Result<(), EngineError> {
    if directives.is_empty() {
        return Err(EngineError::Validation("no slot directives"));
    }
    let mut seen = [false; TimeSlot::ALL.len()];
    for d in directives {
        let idx = d.time_slot as usize;
        if seen[idx] {
            return Err(EngineError::Validation("duplicate time slot in directives"));
        }
        seen[idx] = true;
    }
    let sets_full = directives
        .iter()
        .any(|d| d.time_slot == TimeSlot::FullDay && d.desired.is_set());
    let sets_half = directives
        .iter()
        .any(|d| d.time_slot.is_half_day() && d.desired.is_set());
    if sets_full && sets_half {
        return Err(EngineError::Validation(
            "full-day and half-day slots cannot both be set",
        ));
    }
    Ok(())
}

/// Plan a single-day edit against the guide's current rows for `date`.
///
/// Fails with `SlotBooked` before planning anything if a directive targets a
/// booked row. Opposite-tier rows are removed unless booked.
pub fn plan_day_edit(
    organization_id: &str,
    guide_id: Ulid,
    date: NaiveDate,
    existing: &[AvailabilitySlot],
    directives: &[SlotDirective],
) -> Result<Plan, EngineError> {
    validate_directives(directives)?;

    let on_date: Vec<AvailabilitySlot> = existing.iter().filter(|s| s.date == date).cloned().collect();
    let mut ws = Workspace::new(organization_id, guide_id, &on_date);

    if let Some(d) = directives
        .iter()
        .find(|d| ws.is_booked(&SlotKey::new(date, d.time_slot)))
    {
        return Err(EngineError::SlotBooked(d.time_slot));
    }

    let has_full_day = directives
        .iter()
        .any(|d| d.time_slot == TimeSlot::FullDay && d.desired.is_set());
    let has_half_day = directives
        .iter()
        .any(|d| d.time_slot.is_half_day() && d.desired.is_set());

    if has_full_day {
        ws.clear_opposite_tier(SlotKey::new(date, TimeSlot::FullDay));
    }
    if has_half_day {
        ws.clear(SlotKey::new(date, TimeSlot::FullDay));
    }

    for d in directives {
        let key = SlotKey::new(date, d.time_slot);
        match d.desired.target() {
            None => ws.clear(key),
            Some(status) => {
                ws.put(key, status);
            }
        }
    }

    Ok(ws.finish())
}

// ── Bulk range edit ──────────────────────────────────────────────

/// Validated, de-duplicated form of a `BulkRequest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkShape {
    pub dates: Vec<NaiveDate>,
    pub time_slots: Vec<TimeSlot>,
    pub status: SlotStatus,
}

/// Every date in `[start, end]` whose weekday number is in `weekdays`,
/// ascending. Stops walking once more than `limit` dates have matched.
pub fn enumerate_dates(
    start: NaiveDate,
    end: NaiveDate,
    weekdays: &[u8],
    limit: usize,
) -> Result<Vec<NaiveDate>, EngineError> {
    let mut wanted = [false; 7];
    for &w in weekdays {
        if let Some(slot) = wanted.get_mut(usize::from(w)) {
            *slot = true;
        }
    }

    let mut dates = Vec::new();
    for date in start.iter_days().take_while(|d| *d <= end) {
        if wanted[usize::from(weekday_number(date))] {
            dates.push(date);
            if dates.len() > limit {
                return Err(EngineError::RangeTooLarge { limit });
            }
        }
    }
    if dates.is_empty() {
        return Err(EngineError::NoMatchingDates);
    }
    Ok(dates)
}

/// Check a bulk request and expand it to the dates it covers.
/// Touches no store: every error here leaves the calendar unchanged.
pub fn shape_bulk(request: &BulkRequest, limit: usize) -> Result<BulkShape, EngineError> {
    if request.weekdays.is_empty() {
        return Err(EngineError::Validation("no weekdays selected"));
    }
    if request.weekdays.iter().any(|&w| w > 6) {
        return Err(EngineError::Validation("weekday must be 0 (Sunday) to 6 (Saturday)"));
    }
    if request.time_slots.is_empty() {
        return Err(EngineError::Validation("no time slots selected"));
    }
    if request.status == SlotStatus::Booked {
        return Err(EngineError::Validation("bulk status must be available or blocked"));
    }

    let mut time_slots = Vec::with_capacity(request.time_slots.len());
    for &ts in &request.time_slots {
        if !time_slots.contains(&ts) {
            time_slots.push(ts);
        }
    }

    let dates = enumerate_dates(request.start, request.end, &request.weekdays, limit)?;
    Ok(BulkShape {
        dates,
        time_slots,
        status: request.status,
    })
}

/// Plan a bulk edit against the guide's current rows on `shape.dates`.
///
/// Pairs are visited dates-ascending, then in requested slot order. An exact
/// booked key is skipped; otherwise the opposite tier on that date is cleared
/// (booked rows survive) and the key is updated or queued for insert.
pub fn plan_bulk(
    organization_id: &str,
    guide_id: Ulid,
    shape: &BulkShape,
    existing: &[AvailabilitySlot],
) -> Plan {
    let mut ws = Workspace::new(organization_id, guide_id, existing);
    let mut updated = 0;
    let mut skipped = 0;

    for &date in &shape.dates {
        for &time_slot in &shape.time_slots {
            let key = SlotKey::new(date, time_slot);
            if ws.is_booked(&key) {
                skipped += 1;
                continue;
            }
            ws.clear_opposite_tier(key);
            if let Put::Updated = ws.put(key, shape.status) {
                updated += 1;
            }
        }
    }

    let mut plan = ws.finish();
    plan.updated = updated;
    plan.skipped = skipped;
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::MAX_BULK_DATES;

    const ORG: &str = "acme";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn slot(guide: Ulid, d: NaiveDate, time_slot: TimeSlot, status: SlotStatus) -> AvailabilitySlot {
        AvailabilitySlot {
            id: Ulid::new(),
            organization_id: ORG.into(),
            guide_profile_id: guide,
            date: d,
            time_slot,
            status,
            booking_id: (status == SlotStatus::Booked).then(Ulid::new),
        }
    }

    fn dir(time_slot: TimeSlot, desired: DesiredStatus) -> SlotDirective {
        SlotDirective::new(time_slot, desired)
    }

    fn bulk(start: NaiveDate, end: NaiveDate, weekdays: &[u8], time_slots: &[TimeSlot]) -> BulkRequest {
        BulkRequest {
            start,
            end,
            weekdays: weekdays.to_vec(),
            time_slots: time_slots.to_vec(),
            status: SlotStatus::Available,
        }
    }

    // ── Day edit ─────────────────────────────────────────

    #[test]
    fn full_day_replaces_morning() {
        let guide = Ulid::new();
        let d = date(2024, 6, 1);
        let morning = slot(guide, d, TimeSlot::Morning, SlotStatus::Available);
        let plan = plan_day_edit(
            ORG,
            guide,
            d,
            &[morning.clone()],
            &[dir(TimeSlot::FullDay, DesiredStatus::Available)],
        )
        .unwrap();
        assert_eq!(plan.writes, vec![Write::Delete(morning.id)]);
        assert_eq!(plan.inserts.len(), 1);
        assert_eq!(plan.inserts[0].time_slot, TimeSlot::FullDay);
        assert_eq!(plan.inserts[0].status, SlotStatus::Available);
        assert_eq!(plan.inserts[0].organization_id, ORG);
    }

    #[test]
    fn half_day_replaces_full_day() {
        let guide = Ulid::new();
        let d = date(2024, 6, 1);
        let full = slot(guide, d, TimeSlot::FullDay, SlotStatus::Blocked);
        let plan = plan_day_edit(
            ORG,
            guide,
            d,
            &[full.clone()],
            &[
                dir(TimeSlot::Morning, DesiredStatus::Available),
                dir(TimeSlot::Afternoon, DesiredStatus::Blocked),
            ],
        )
        .unwrap();
        assert_eq!(plan.writes, vec![Write::Delete(full.id)]);
        assert_eq!(plan.inserts.len(), 2);
    }

    #[test]
    fn directive_on_booked_slot_fails_whole_call() {
        let guide = Ulid::new();
        let d = date(2024, 6, 1);
        let booked = slot(guide, d, TimeSlot::Morning, SlotStatus::Booked);
        let afternoon = slot(guide, d, TimeSlot::Afternoon, SlotStatus::Available);
        let result = plan_day_edit(
            ORG,
            guide,
            d,
            &[booked, afternoon],
            &[
                dir(TimeSlot::Afternoon, DesiredStatus::Blocked),
                dir(TimeSlot::Morning, DesiredStatus::Blocked),
            ],
        );
        assert!(matches!(result, Err(EngineError::SlotBooked(TimeSlot::Morning))));
    }

    #[test]
    fn unset_on_booked_slot_is_rejected() {
        let guide = Ulid::new();
        let d = date(2024, 6, 1);
        let booked = slot(guide, d, TimeSlot::FullDay, SlotStatus::Booked);
        let result = plan_day_edit(ORG, guide, d, &[booked], &[dir(TimeSlot::FullDay, DesiredStatus::Unset)]);
        assert!(matches!(result, Err(EngineError::SlotBooked(TimeSlot::FullDay))));
    }

    #[test]
    fn tier_exclusion_leaves_booked_opposite_tier() {
        let guide = Ulid::new();
        let d = date(2024, 6, 1);
        let booked_morning = slot(guide, d, TimeSlot::Morning, SlotStatus::Booked);
        let afternoon = slot(guide, d, TimeSlot::Afternoon, SlotStatus::Blocked);
        let plan = plan_day_edit(
            ORG,
            guide,
            d,
            &[booked_morning, afternoon.clone()],
            &[dir(TimeSlot::FullDay, DesiredStatus::Available)],
        )
        .unwrap();
        assert_eq!(plan.writes, vec![Write::Delete(afternoon.id)]);
        assert_eq!(plan.inserts.len(), 1);
    }

    #[test]
    fn status_change_is_update_in_place() {
        let guide = Ulid::new();
        let d = date(2024, 6, 1);
        let morning = slot(guide, d, TimeSlot::Morning, SlotStatus::Available);
        let plan = plan_day_edit(
            ORG,
            guide,
            d,
            &[morning.clone()],
            &[dir(TimeSlot::Morning, DesiredStatus::Blocked)],
        )
        .unwrap();
        assert_eq!(
            plan.writes,
            vec![Write::Update { id: morning.id, status: SlotStatus::Blocked }]
        );
        assert!(plan.inserts.is_empty());
    }

    #[test]
    fn same_status_is_elided() {
        let guide = Ulid::new();
        let d = date(2024, 6, 1);
        let morning = slot(guide, d, TimeSlot::Morning, SlotStatus::Blocked);
        let plan = plan_day_edit(ORG, guide, d, &[morning], &[dir(TimeSlot::Morning, DesiredStatus::Blocked)]).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn unset_after_tier_clear_does_not_delete_twice() {
        let guide = Ulid::new();
        let d = date(2024, 6, 1);
        let morning = slot(guide, d, TimeSlot::Morning, SlotStatus::Available);
        let plan = plan_day_edit(
            ORG,
            guide,
            d,
            &[morning.clone()],
            &[
                dir(TimeSlot::FullDay, DesiredStatus::Blocked),
                dir(TimeSlot::Morning, DesiredStatus::Unset),
            ],
        )
        .unwrap();
        assert_eq!(plan.writes, vec![Write::Delete(morning.id)]);
        assert_eq!(plan.inserts.len(), 1);
    }

    #[test]
    fn unset_missing_rows_is_noop() {
        let guide = Ulid::new();
        let d = date(2024, 6, 1);
        let plan = plan_day_edit(
            ORG,
            guide,
            d,
            &[],
            &[
                dir(TimeSlot::Morning, DesiredStatus::Unset),
                dir(TimeSlot::Afternoon, DesiredStatus::Unset),
                dir(TimeSlot::FullDay, DesiredStatus::Unset),
            ],
        )
        .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn rows_on_other_dates_are_ignored() {
        let guide = Ulid::new();
        let other = slot(guide, date(2024, 6, 2), TimeSlot::Morning, SlotStatus::Available);
        let plan = plan_day_edit(
            ORG,
            guide,
            date(2024, 6, 1),
            &[other],
            &[dir(TimeSlot::FullDay, DesiredStatus::Available)],
        )
        .unwrap();
        assert!(plan.writes.is_empty());
        assert_eq!(plan.inserts.len(), 1);
    }

    #[test]
    fn directive_validation() {
        let guide = Ulid::new();
        let d = date(2024, 6, 1);
        assert!(matches!(plan_day_edit(ORG, guide, d, &[], &[]), Err(EngineError::Validation(_))));
        assert!(matches!(
            plan_day_edit(
                ORG,
                guide,
                d,
                &[],
                &[
                    dir(TimeSlot::Morning, DesiredStatus::Available),
                    dir(TimeSlot::Morning, DesiredStatus::Blocked),
                ],
            ),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            plan_day_edit(
                ORG,
                guide,
                d,
                &[],
                &[
                    dir(TimeSlot::FullDay, DesiredStatus::Available),
                    dir(TimeSlot::Afternoon, DesiredStatus::Blocked),
                ],
            ),
            Err(EngineError::Validation(_))
        ));
        // Unsetting one tier while setting the other is fine.
        assert!(plan_day_edit(
            ORG,
            guide,
            d,
            &[],
            &[
                dir(TimeSlot::FullDay, DesiredStatus::Available),
                dir(TimeSlot::Afternoon, DesiredStatus::Unset),
            ],
        )
        .is_ok());
    }

    // ── Date enumeration ─────────────────────────────────

    #[test]
    fn enumerate_weekdays_in_week() {
        // 2024-06-01 is a Saturday.
        let dates = enumerate_dates(date(2024, 6, 1), date(2024, 6, 7), &[1, 2, 3, 4, 5], MAX_BULK_DATES).unwrap();
        assert_eq!(
            dates,
            (3..=7).map(|d| date(2024, 6, d)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn enumerate_single_day_range() {
        let dates = enumerate_dates(date(2024, 6, 2), date(2024, 6, 2), &[0], MAX_BULK_DATES).unwrap();
        assert_eq!(dates, vec![date(2024, 6, 2)]);
    }

    #[test]
    fn enumerate_cap_is_exact() {
        let start = date(2024, 1, 1);
        let day90 = start + chrono::Days::new(89);
        let all = [0, 1, 2, 3, 4, 5, 6];
        assert_eq!(enumerate_dates(start, day90, &all, MAX_BULK_DATES).unwrap().len(), 90);
        let day91 = start + chrono::Days::new(90);
        assert!(matches!(
            enumerate_dates(start, day91, &all, MAX_BULK_DATES),
            Err(EngineError::RangeTooLarge { limit: 90 })
        ));
    }

    #[test]
    fn enumerate_cap_counts_matches_not_calendar_days() {
        // 200 calendar days, but only Sundays: ~29 matches.
        let start = date(2024, 1, 1);
        let end = start + chrono::Days::new(199);
        let dates = enumerate_dates(start, end, &[0], MAX_BULK_DATES).unwrap();
        assert!(dates.iter().all(|d| weekday_number(*d) == 0));
        assert_eq!(dates.len(), 29);
    }

    #[test]
    fn enumerate_huge_range_fails_fast() {
        let start = date(2000, 1, 1);
        let end = date(9000, 1, 1);
        assert!(matches!(
            enumerate_dates(start, end, &[3], MAX_BULK_DATES),
            Err(EngineError::RangeTooLarge { .. })
        ));
    }

    #[test]
    fn enumerate_no_matches() {
        // Mon..Fri filter on a Saturday-Sunday range.
        assert!(matches!(
            enumerate_dates(date(2024, 6, 1), date(2024, 6, 2), &[1, 2, 3, 4, 5], MAX_BULK_DATES),
            Err(EngineError::NoMatchingDates)
        ));
        assert!(matches!(
            enumerate_dates(date(2024, 6, 7), date(2024, 6, 1), &[0, 1, 2, 3, 4, 5, 6], MAX_BULK_DATES),
            Err(EngineError::NoMatchingDates)
        ));
    }

    #[test]
    fn shape_validation() {
        let d = date(2024, 6, 1);
        let mut req = bulk(d, d, &[], &[TimeSlot::Morning]);
        assert!(matches!(shape_bulk(&req, MAX_BULK_DATES), Err(EngineError::Validation(_))));
        req.weekdays = vec![7];
        assert!(matches!(shape_bulk(&req, MAX_BULK_DATES), Err(EngineError::Validation(_))));
        req.weekdays = vec![6];
        req.time_slots.clear();
        assert!(matches!(shape_bulk(&req, MAX_BULK_DATES), Err(EngineError::Validation(_))));
        req.time_slots = vec![TimeSlot::Morning, TimeSlot::Morning, TimeSlot::Afternoon];
        req.status = SlotStatus::Booked;
        assert!(matches!(shape_bulk(&req, MAX_BULK_DATES), Err(EngineError::Validation(_))));
        req.status = SlotStatus::Blocked;
        let shape = shape_bulk(&req, MAX_BULK_DATES).unwrap();
        assert_eq!(shape.dates, vec![d]);
        assert_eq!(shape.time_slots, vec![TimeSlot::Morning, TimeSlot::Afternoon]);
        assert_eq!(shape.status, SlotStatus::Blocked);
    }

    // ── Bulk planning ────────────────────────────────────

    #[test]
    fn bulk_on_empty_calendar_queues_inserts() {
        let guide = Ulid::new();
        let req = bulk(date(2024, 6, 1), date(2024, 6, 7), &[1, 2, 3, 4, 5], &[TimeSlot::FullDay]);
        let shape = shape_bulk(&req, MAX_BULK_DATES).unwrap();
        let plan = plan_bulk(ORG, guide, &shape, &[]);
        assert_eq!(plan.inserts.len(), 5);
        assert_eq!(plan.updated, 0);
        assert_eq!(plan.skipped, 0);
        assert!(plan.writes.is_empty());
        let dates: Vec<_> = plan.inserts.iter().map(|r| r.date).collect();
        assert_eq!(dates, shape.dates);
    }

    #[test]
    fn bulk_skips_exact_booked_key() {
        let guide = Ulid::new();
        let req = bulk(date(2024, 6, 1), date(2024, 6, 7), &[1, 2, 3, 4, 5], &[TimeSlot::FullDay]);
        let shape = shape_bulk(&req, MAX_BULK_DATES).unwrap();
        let booked = slot(guide, date(2024, 6, 5), TimeSlot::FullDay, SlotStatus::Booked);
        let plan = plan_bulk(ORG, guide, &shape, &[booked]);
        assert_eq!(plan.inserts.len(), 4);
        assert_eq!(plan.skipped, 1);
        assert!(plan.writes.is_empty());
    }

    #[test]
    fn bulk_updates_open_rows_and_counts_same_status() {
        let guide = Ulid::new();
        let d = date(2024, 6, 3);
        let blocked = slot(guide, d, TimeSlot::Morning, SlotStatus::Blocked);
        let available = slot(guide, d, TimeSlot::Afternoon, SlotStatus::Available);
        let req = bulk(d, d, &[1], &[TimeSlot::Morning, TimeSlot::Afternoon]);
        let shape = shape_bulk(&req, MAX_BULK_DATES).unwrap();
        let plan = plan_bulk(ORG, guide, &shape, &[blocked.clone(), available]);
        assert_eq!(plan.updated, 2);
        assert_eq!(
            plan.writes,
            vec![Write::Update { id: blocked.id, status: SlotStatus::Available }]
        );
        assert!(plan.inserts.is_empty());
    }

    #[test]
    fn bulk_half_day_clears_open_full_day() {
        let guide = Ulid::new();
        let d = date(2024, 6, 3);
        let full = slot(guide, d, TimeSlot::FullDay, SlotStatus::Available);
        let req = bulk(d, d, &[1], &[TimeSlot::Morning]);
        let shape = shape_bulk(&req, MAX_BULK_DATES).unwrap();
        let plan = plan_bulk(ORG, guide, &shape, &[full.clone()]);
        assert_eq!(plan.writes, vec![Write::Delete(full.id)]);
        assert_eq!(plan.inserts.len(), 1);
        assert_eq!(plan.inserts[0].time_slot, TimeSlot::Morning);
    }

    #[test]
    fn bulk_half_day_beside_booked_full_day_is_created() {
        // Booked FullDay survives tier exclusion; the morning row is still created.
        let guide = Ulid::new();
        let d = date(2024, 6, 3);
        let booked = slot(guide, d, TimeSlot::FullDay, SlotStatus::Booked);
        let req = bulk(d, d, &[1], &[TimeSlot::Morning]);
        let shape = shape_bulk(&req, MAX_BULK_DATES).unwrap();
        let plan = plan_bulk(ORG, guide, &shape, &[booked]);
        assert!(plan.writes.is_empty());
        assert_eq!(plan.skipped, 0);
        assert_eq!(plan.inserts.len(), 1);
    }

    #[test]
    fn bulk_both_tiers_later_tier_wins() {
        let guide = Ulid::new();
        let d = date(2024, 6, 3);
        let req = bulk(d, d, &[1], &[TimeSlot::Morning, TimeSlot::FullDay]);
        let shape = shape_bulk(&req, MAX_BULK_DATES).unwrap();
        let plan = plan_bulk(ORG, guide, &shape, &[]);
        assert_eq!(plan.inserts.len(), 1);
        assert_eq!(plan.inserts[0].time_slot, TimeSlot::FullDay);

        let existing_morning = slot(guide, d, TimeSlot::Morning, SlotStatus::Blocked);
        let plan = plan_bulk(ORG, guide, &shape, &[existing_morning.clone()]);
        assert_eq!(plan.updated, 1);
        assert_eq!(
            plan.writes,
            vec![
                Write::Update { id: existing_morning.id, status: SlotStatus::Available },
                Write::Delete(existing_morning.id),
            ]
        );
        assert_eq!(plan.inserts.len(), 1);
        assert_eq!(plan.inserts[0].time_slot, TimeSlot::FullDay);
    }

    #[test]
    fn bulk_ignores_other_guides_rows() {
        let guide = Ulid::new();
        let d = date(2024, 6, 3);
        let foreign = slot(Ulid::new(), d, TimeSlot::FullDay, SlotStatus::Booked);
        let req = bulk(d, d, &[1], &[TimeSlot::FullDay]);
        let shape = shape_bulk(&req, MAX_BULK_DATES).unwrap();
        let plan = plan_bulk(ORG, guide, &shape, &[foreign]);
        assert_eq!(plan.skipped, 0);
        assert_eq!(plan.inserts.len(), 1);
    }
}
