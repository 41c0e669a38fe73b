use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Weekday number of a date: 0 = Sunday .. 6 = Saturday.
pub fn weekday_number(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Part of a guide's day. `FullDay` and the two half-day slots form
/// mutually exclusive tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeSlot {
    Morning,
    Afternoon,
    FullDay,
}

impl TimeSlot {
    pub const ALL: [TimeSlot; 3] = [TimeSlot::Morning, TimeSlot::Afternoon, TimeSlot::FullDay];

    pub fn is_half_day(self) -> bool {
        matches!(self, TimeSlot::Morning | TimeSlot::Afternoon)
    }

    /// Slots belonging to the other tier.
    pub fn opposite_tier(self) -> &'static [TimeSlot] {
        match self {
            TimeSlot::FullDay => &[TimeSlot::Morning, TimeSlot::Afternoon],
            TimeSlot::Morning | TimeSlot::Afternoon => &[TimeSlot::FullDay],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeSlot::Morning => "morning",
            TimeSlot::Afternoon => "afternoon",
            TimeSlot::FullDay => "full_day",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "morning" => Some(TimeSlot::Morning),
            "afternoon" => Some(TimeSlot::Afternoon),
            "full_day" | "fullday" => Some(TimeSlot::FullDay),
            _ => None,
        }
    }
}

impl std::fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored status of a slot row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotStatus {
    Available,
    Blocked,
    /// Set only by the booking workflow. Never touched by the engine.
    Booked,
}

impl SlotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SlotStatus::Available => "available",
            SlotStatus::Blocked => "blocked",
            SlotStatus::Booked => "booked",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "available" => Some(SlotStatus::Available),
            "blocked" => Some(SlotStatus::Blocked),
            "booked" => Some(SlotStatus::Booked),
            _ => None,
        }
    }
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller wants a single-day slot to become. `Unset` removes the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DesiredStatus {
    Available,
    Blocked,
    Unset,
}

impl DesiredStatus {
    /// Row status this directive writes, or `None` for `Unset`.
    pub fn target(self) -> Option<SlotStatus> {
        match self {
            DesiredStatus::Available => Some(SlotStatus::Available),
            DesiredStatus::Blocked => Some(SlotStatus::Blocked),
            DesiredStatus::Unset => None,
        }
    }

    pub fn is_set(self) -> bool {
        self != DesiredStatus::Unset
    }

    /// Next state of the calendar UI toggle: unset → available → blocked → unset.
    ///
    /// For clients that render the click-to-cycle control. The server never
    /// cycles; directives always carry the explicit desired status.
    pub fn next(self) -> Self {
        match self {
            DesiredStatus::Unset => DesiredStatus::Available,
            DesiredStatus::Available => DesiredStatus::Blocked,
            DesiredStatus::Blocked => DesiredStatus::Unset,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "available" => Some(DesiredStatus::Available),
            "blocked" => Some(DesiredStatus::Blocked),
            "unset" | "none" => Some(DesiredStatus::Unset),
            _ => None,
        }
    }
}

/// One `(time_slot, desired)` entry of a single-day edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotDirective {
    pub time_slot: TimeSlot,
    pub desired: DesiredStatus,
}

impl SlotDirective {
    pub fn new(time_slot: TimeSlot, desired: DesiredStatus) -> Self {
        Self { time_slot, desired }
    }
}

/// Position of a slot inside one guide's calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
}

impl SlotKey {
    pub fn new(date: NaiveDate, time_slot: TimeSlot) -> Self {
        Self { date, time_slot }
    }
}

/// A single row of a guide's calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: Ulid,
    pub organization_id: String,
    pub guide_profile_id: Ulid,
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    pub status: SlotStatus,
    /// Present only when `status` is `Booked`.
    pub booking_id: Option<Ulid>,
}

impl AvailabilitySlot {
    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.date, self.time_slot)
    }

    pub fn is_booked(&self) -> bool {
        self.status == SlotStatus::Booked
    }
}

/// A row queued for insertion. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSlot {
    pub organization_id: String,
    pub guide_profile_id: Ulid,
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    pub status: SlotStatus,
}

impl NewSlot {
    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.date, self.time_slot)
    }
}

/// Range edit request: every date in `[start, end]` whose weekday is listed,
/// crossed with every listed time slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// 0 = Sunday .. 6 = Saturday.
    pub weekdays: Vec<u8>,
    pub time_slots: Vec<TimeSlot>,
    /// `Available` or `Blocked`.
    pub status: SlotStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl BulkOutcome {
    /// Rows written: created plus updated.
    pub fn count(&self) -> usize {
        self.created + self.updated
    }
}

/// All rows of one guide, ordered by `(date, time_slot)`.
#[derive(Debug, Clone)]
pub struct GuideCalendar {
    pub guide_id: Ulid,
    slots: BTreeMap<SlotKey, AvailabilitySlot>,
    /// Slot id → key, for id-addressed mutations.
    keys: HashMap<Ulid, SlotKey>,
}

impl GuideCalendar {
    pub fn new(guide_id: Ulid) -> Self {
        Self {
            guide_id,
            slots: BTreeMap::new(),
            keys: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, key: &SlotKey) -> Option<&AvailabilitySlot> {
        self.slots.get(key)
    }

    pub fn get_by_id(&self, id: &Ulid) -> Option<&AvailabilitySlot> {
        self.keys.get(id).and_then(|k| self.slots.get(k))
    }

    /// Insert a row, replacing whatever occupied its key.
    pub fn insert(&mut self, slot: AvailabilitySlot) {
        let key = slot.key();
        if let Some(old) = self.slots.insert(key, slot.clone()) {
            self.keys.remove(&old.id);
        }
        self.keys.insert(slot.id, key);
    }

    pub fn remove(&mut self, id: &Ulid) -> Option<AvailabilitySlot> {
        let key = self.keys.remove(id)?;
        self.slots.remove(&key)
    }

    /// Rewrite status (and booking reference) in place. Returns false if the id is unknown.
    pub fn set_status(&mut self, id: &Ulid, status: SlotStatus, booking_id: Option<Ulid>) -> bool {
        let Some(key) = self.keys.get(id) else {
            return false;
        };
        match self.slots.get_mut(key) {
            Some(slot) => {
                slot.status = status;
                slot.booking_id = booking_id;
                true
            }
            None => false,
        }
    }

    /// Rows dated within `[from, to]`, in key order.
    pub fn between(&self, from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = &AvailabilitySlot> {
        let range = if from <= to {
            Some(SlotKey::new(from, TimeSlot::Morning)..=SlotKey::new(to, TimeSlot::FullDay))
        } else {
            None
        };
        range
            .into_iter()
            .flat_map(move |r| self.slots.range(r).map(|(_, slot)| slot))
    }

    pub fn on_date(&self, date: NaiveDate) -> impl Iterator<Item = &AvailabilitySlot> {
        self.between(date, date)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AvailabilitySlot> {
        self.slots.values()
    }
}

/// Journal record format: flat, one variant per store mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SlotInserted {
        id: Ulid,
        organization_id: String,
        guide_id: Ulid,
        date: NaiveDate,
        time_slot: TimeSlot,
        status: SlotStatus,
    },
    SlotStatusChanged {
        id: Ulid,
        guide_id: Ulid,
        status: SlotStatus,
    },
    SlotDeleted {
        id: Ulid,
        guide_id: Ulid,
    },
    BookingRecorded {
        id: Ulid,
        organization_id: String,
        guide_id: Ulid,
        date: NaiveDate,
        time_slot: TimeSlot,
        booking_id: Ulid,
    },
}

impl Event {
    pub fn guide_id(&self) -> Ulid {
        match self {
            Event::SlotInserted { guide_id, .. }
            | Event::SlotStatusChanged { guide_id, .. }
            | Event::SlotDeleted { guide_id, .. }
            | Event::BookingRecorded { guide_id, .. } => *guide_id,
        }
    }
}
