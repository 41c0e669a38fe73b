use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::wal::Wal;

use super::{AvailabilityStore, StoreError};

pub type SharedCalendar = Arc<RwLock<GuideCalendar>>;

// ── Group-commit journal channel ─────────────────────────

enum JournalCommand {
    /// Events of one append share a single flush and a single reply.
    Append {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// Blocks for the first append, drains whatever else is already queued,
/// then issues one `flush_sync` for the whole batch.
async fn journal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { events, response } => {
                let mut batch = vec![(events, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { events, response }) => {
                            batch.push((events, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE)
                    .record(batch.iter().map(|(events, _)| events.len()).sum::<usize>() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                respond_batch(batch, &result);

                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

type PendingAppend = (Vec<Event>, oneshot::Sender<io::Result<()>>);

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let append_err = batch
        .iter()
        .flat_map(|(events, _)| events)
        .find_map(|event| wal.append_buffered(event).err());
    // Flush even after an append error so buffered bytes of a failed batch
    // never end up prefixed to the next one.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        JournalCommand::Append { events, response } => {
            let batch = vec![(events, response)];
            let result = flush_batch(wal, &batch);
            respond_batch(batch, &result);
        }
    }
}

/// Apply a journal event to a calendar (caller holds the write lock).
fn apply_to_calendar(cal: &mut GuideCalendar, event: &Event, slot_index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::SlotInserted {
            id,
            organization_id,
            guide_id,
            date,
            time_slot,
            status,
        } => {
            cal.insert(AvailabilitySlot {
                id: *id,
                organization_id: organization_id.clone(),
                guide_profile_id: *guide_id,
                date: *date,
                time_slot: *time_slot,
                status: *status,
                booking_id: None,
            });
            slot_index.insert(*id, *guide_id);
        }
        Event::SlotStatusChanged { id, status, .. } => {
            // Only a booking record attaches a booking id; a status change onto
            // Booked keeps whichever one the row already carries.
            let booking_id = match status {
                SlotStatus::Booked => cal.get_by_id(id).and_then(|slot| slot.booking_id),
                _ => None,
            };
            cal.set_status(id, *status, booking_id);
        }
        Event::SlotDeleted { id, .. } => {
            cal.remove(id);
            slot_index.remove(id);
        }
        Event::BookingRecorded {
            id,
            organization_id,
            guide_id,
            date,
            time_slot,
            booking_id,
        } => {
            if !cal.set_status(id, SlotStatus::Booked, Some(*booking_id)) {
                cal.insert(AvailabilitySlot {
                    id: *id,
                    organization_id: organization_id.clone(),
                    guide_profile_id: *guide_id,
                    date: *date,
                    time_slot: *time_slot,
                    status: SlotStatus::Booked,
                    booking_id: Some(*booking_id),
                });
            }
            slot_index.insert(*id, *guide_id);
        }
    }
}

/// Journaled in-memory slot store for one organization.
///
/// Every mutation is appended to the WAL (group-committed by a background
/// writer) before it is applied, so a restart replays to the same state.
pub struct JournalStore {
    calendars: DashMap<Ulid, SharedCalendar>,
    journal_tx: mpsc::Sender<JournalCommand>,
    /// Reverse lookup: slot id → guide id.
    slot_index: DashMap<Ulid, Ulid>,
    /// Writers hold this shared for their whole write; compaction holds it
    /// exclusively, so no append can slip between snapshot and file swap.
    /// Always taken before any calendar lock.
    compaction_gate: RwLock<()>,
}

impl JournalStore {
    /// Replay the journal at `path` and start its writer task.
    /// Must be called inside a tokio runtime.
    pub fn open(path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&path)?;
        let wal = Wal::open(&path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(wal, journal_rx));

        let store = Self {
            calendars: DashMap::new(),
            journal_tx,
            slot_index: DashMap::new(),
            compaction_gate: RwLock::new(()),
        };

        // Sole owner of every Arc during replay: try_write never contends.
        // Never block here; this may run inside an async context.
        for event in &events {
            let cal = store.calendar_or_create(event.guide_id());
            let mut guard = cal
                .try_write()
                .map_err(|_| io::Error::other("replay: calendar contended"))?;
            apply_to_calendar(&mut guard, event, &store.slot_index);
        }
        if !events.is_empty() {
            info!(
                path = %path.display(),
                events = events.len(),
                guides = store.calendars.len(),
                "journal replayed"
            );
        }

        Ok(store)
    }

    async fn journal_append(&self, events: Vec<Event>) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                events,
                response: tx,
            })
            .await
            .map_err(|_| StoreError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| StoreError::JournalError(e.to_string()))
    }

    /// Journal-append then apply, in one step.
    async fn persist_and_apply(&self, cal: &mut GuideCalendar, event: &Event) -> Result<(), StoreError> {
        self.journal_append(vec![event.clone()]).await?;
        apply_to_calendar(cal, event, &self.slot_index);
        Ok(())
    }

    pub fn calendar(&self, guide_id: &Ulid) -> Option<SharedCalendar> {
        self.calendars.get(guide_id).map(|e| e.value().clone())
    }

    fn calendar_or_create(&self, guide_id: Ulid) -> SharedCalendar {
        self.calendars
            .entry(guide_id)
            .or_insert_with(|| Arc::new(RwLock::new(GuideCalendar::new(guide_id))))
            .value()
            .clone()
    }

    /// Lookup slot → guide, acquire that calendar's write lock.
    async fn resolve_slot_write(&self, slot_id: &Ulid) -> Result<OwnedRwLockWriteGuard<GuideCalendar>, StoreError> {
        let guide_id = self
            .slot_index
            .get(slot_id)
            .map(|e| *e.value())
            .ok_or(StoreError::NotFound(*slot_id))?;
        let cal = self.calendar(&guide_id).ok_or(StoreError::NotFound(*slot_id))?;
        let guard = cal.write_owned().await;
        if guard.get_by_id(slot_id).is_none() {
            return Err(StoreError::NotFound(*slot_id));
        }
        Ok(guard)
    }

    pub fn guide_count(&self) -> usize {
        self.calendars.len()
    }

    pub fn slot_count(&self) -> usize {
        self.slot_index.len()
    }

    /// Producer side of the booking workflow: mark `(guide, date, time_slot)` as
    /// booked. An open row at that key is converted in place; otherwise a new
    /// booked row is created. Returns the slot id.
    pub async fn record_booking(
        &self,
        organization_id: &str,
        guide_id: Ulid,
        date: NaiveDate,
        time_slot: TimeSlot,
        booking_id: Ulid,
    ) -> Result<Ulid, StoreError> {
        let _gate = self.compaction_gate.read().await;
        let cal = self.calendar_or_create(guide_id);
        let mut guard = cal.write().await;

        let id = match guard.get(&SlotKey::new(date, time_slot)) {
            Some(existing) if existing.is_booked() => {
                return Err(StoreError::AlreadyBooked { date, time_slot });
            }
            Some(existing) => existing.id,
            None => {
                if guard.len() >= MAX_SLOTS_PER_GUIDE {
                    return Err(StoreError::LimitExceeded("too many slots for guide"));
                }
                Ulid::new()
            }
        };

        let event = Event::BookingRecorded {
            id,
            organization_id: organization_id.to_string(),
            guide_id,
            date,
            time_slot,
            booking_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        debug!(%guide_id, %date, %time_slot, %booking_id, "booking recorded");
        Ok(id)
    }

    /// Rewrite the journal with only the records needed to recreate the current state.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _gate = self.compaction_gate.write().await;
        let mut events = Vec::with_capacity(self.slot_index.len());
        let calendars: Vec<SharedCalendar> = self.calendars.iter().map(|e| e.value().clone()).collect();

        for cal in calendars {
            let guard = cal.read().await;
            for slot in guard.iter() {
                let event = match slot.booking_id {
                    Some(booking_id) if slot.is_booked() => Event::BookingRecorded {
                        id: slot.id,
                        organization_id: slot.organization_id.clone(),
                        guide_id: slot.guide_profile_id,
                        date: slot.date,
                        time_slot: slot.time_slot,
                        booking_id,
                    },
                    _ => Event::SlotInserted {
                        id: slot.id,
                        organization_id: slot.organization_id.clone(),
                        guide_id: slot.guide_profile_id,
                        date: slot.date,
                        time_slot: slot.time_slot,
                        status: slot.status,
                    },
                };
                events.push(event);
            }
        }

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| StoreError::JournalError(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl AvailabilityStore for JournalStore {
    async fn find_slots(
        &self,
        guide_id: Ulid,
        dates: &[NaiveDate],
    ) -> Result<Vec<AvailabilitySlot>, StoreError> {
        let Some(cal) = self.calendar(&guide_id) else {
            return Ok(Vec::new());
        };
        let guard = cal.read().await;
        let wanted: HashSet<NaiveDate> = dates.iter().copied().collect();
        let mut found = Vec::new();
        for date in &wanted {
            found.extend(guard.on_date(*date).cloned());
        }
        found.sort_by_key(|s| s.key());
        Ok(found)
    }

    async fn find_range(
        &self,
        guide_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AvailabilitySlot>, StoreError> {
        let Some(cal) = self.calendar(&guide_id) else {
            return Ok(Vec::new());
        };
        let guard = cal.read().await;
        Ok(guard.between(from, to).cloned().collect())
    }

    async fn delete_slot(&self, id: Ulid) -> Result<(), StoreError> {
        let _gate = self.compaction_gate.read().await;
        let mut guard = self.resolve_slot_write(&id).await?;
        let event = Event::SlotDeleted {
            id,
            guide_id: guard.guide_id,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    async fn update_status(&self, id: Ulid, status: SlotStatus) -> Result<(), StoreError> {
        let _gate = self.compaction_gate.read().await;
        let mut guard = self.resolve_slot_write(&id).await?;
        let event = Event::SlotStatusChanged {
            id,
            guide_id: guard.guide_id,
            status,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// All-or-nothing: the whole batch is validated against current state and
    /// against itself before the first row is journaled.
    async fn insert_slots(&self, rows: Vec<NewSlot>) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        if rows.len() > MAX_INSERT_BATCH {
            return Err(StoreError::LimitExceeded("insert batch too large"));
        }

        let mut by_guide: BTreeMap<Ulid, Vec<NewSlot>> = BTreeMap::new();
        for row in rows {
            by_guide.entry(row.guide_profile_id).or_default().push(row);
        }

        let _gate = self.compaction_gate.read().await;
        // BTreeMap order = sorted guide ids, so locks are always taken in the same order.
        let mut guards = Vec::with_capacity(by_guide.len());
        for guide_id in by_guide.keys() {
            guards.push(self.calendar_or_create(*guide_id).write_owned().await);
        }

        // Phase 1: validate.
        for (guard, batch) in guards.iter().zip(by_guide.values()) {
            if guard.len() + batch.len() > MAX_SLOTS_PER_GUIDE {
                return Err(StoreError::LimitExceeded("too many slots for guide"));
            }
            let mut seen = HashSet::with_capacity(batch.len());
            for row in batch {
                let key = row.key();
                if guard.get(&key).is_some() || !seen.insert(key) {
                    return Err(StoreError::Duplicate {
                        date: row.date,
                        time_slot: row.time_slot,
                    });
                }
            }
        }

        // Phase 2: journal the whole batch in one append, then apply.
        let per_guide: Vec<Vec<Event>> = by_guide
            .into_values()
            .map(|batch| {
                batch
                    .into_iter()
                    .map(|row| Event::SlotInserted {
                        id: Ulid::new(),
                        organization_id: row.organization_id,
                        guide_id: row.guide_profile_id,
                        date: row.date,
                        time_slot: row.time_slot,
                        status: row.status,
                    })
                    .collect()
            })
            .collect();
        self.journal_append(per_guide.iter().flatten().cloned().collect())
            .await?;

        let mut inserted = 0;
        for (guard, events) in guards.iter_mut().zip(&per_guide) {
            for event in events {
                apply_to_calendar(guard, event, &self.slot_index);
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
