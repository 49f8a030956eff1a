use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::engine::AvailabilityEngine;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

use super::{
    InsertError, ReservationFilter, ReservationStore, SpaceLedger, StatusPatch, StoreError, check_transition,
};

pub type SharedLedger = Arc<Mutex<SpaceLedger>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
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

/// Owns the WAL. Takes the first append, drains whatever else is already
/// queued, then fsyncs once and answers every sender with the same result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        // A compaction queued behind the batch runs only after the batch is durable.
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let appended = batch.iter().try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so half-written bytes do not leak into the next batch.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// WAL-backed, in-memory reservation store.
///
/// Reservations are grouped per space type; each group sits behind its own
/// async mutex, which is what makes `insert_if_available` an atomic
/// check-then-insert. Every mutation is durable before it becomes visible.
pub struct ReservationBook {
    spaces: DashMap<String, SharedLedger>,
    /// Shared by every mutation, held exclusively by compaction. Space types
    /// first booked while a compaction waits cannot slip past it.
    writes: RwLock<()>,
    /// Reservation id → space type.
    index: DashMap<Ulid, String>,
    wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
}

impl ReservationBook {
    /// Replay the log at `wal_path` and start the background writer.
    pub fn open(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut ledgers: std::collections::HashMap<String, SpaceLedger> = Default::default();
        let index = DashMap::new();
        for event in events {
            match event {
                Event::Recorded(reservation) if reservation.start_date > reservation.end_date => {
                    tracing::warn!(
                        "skipping replayed reservation {}: start {} after end {}",
                        reservation.id,
                        reservation.start_date,
                        reservation.end_date
                    );
                }
                Event::Recorded(reservation) => {
                    index.insert(reservation.id, reservation.space_type.clone());
                    ledgers
                        .entry(reservation.space_type.clone())
                        .or_default()
                        .upsert(reservation);
                }
                Event::StatusChanged { id, space_type, status } => {
                    if let Some(r) = ledgers.get_mut(&space_type).and_then(|l| l.get_mut(&id)) {
                        r.status = status;
                    }
                }
            }
        }

        let spaces = DashMap::new();
        for (key, ledger) in ledgers {
            spaces.insert(key, Arc::new(Mutex::new(ledger)));
        }
        tracing::info!(
            "reservation book opened: {} reservations across {} space types",
            index.len(),
            spaces.len()
        );
        Ok(Self {
            spaces,
            writes: RwLock::new(()),
            index,
            wal_tx,
            notify,
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::WriteFailure("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WriteFailure("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WriteFailure(e.to_string()))
    }

    fn ledger(&self, space_type: &str) -> Option<SharedLedger> {
        self.spaces.get(space_type).map(|e| e.value().clone())
    }

    fn ledger_or_create(&self, space_type: &str) -> SharedLedger {
        self.spaces
            .entry(space_type.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SpaceLedger::new())))
            .clone()
    }

    pub async fn get(&self, id: Ulid) -> Option<Reservation> {
        let space_type = self.index.get(&id).map(|e| e.value().clone())?;
        let ledger = self.ledger(&space_type)?;
        let guard = ledger.lock().await;
        guard.get(&id).cloned()
    }

    /// Insert `reservation` only if its space type still has room for the whole range.
    ///
    /// Availability is re-evaluated under the space type's lock, so concurrent
    /// callers that both saw a free slot cannot jointly exceed capacity.
    pub async fn insert_if_available(
        &self,
        reservation: Reservation,
        engine: &AvailabilityEngine,
    ) -> Result<Reservation, InsertError> {
        if !reservation.status.is_active() {
            return Err(StoreError::InvalidInitialStatus(reservation.status).into());
        }
        engine.capacity(&reservation.space_type)?;
        let range = engine.validate_range(reservation.start_date, reservation.end_date)?;

        let _writes = self.writes.read().await;
        let ledger = self.ledger_or_create(&reservation.space_type);
        let mut guard = ledger.lock().await;
        if self.index.contains_key(&reservation.id) {
            return Err(StoreError::AlreadyExists(reservation.id).into());
        }

        let nearby: Vec<Reservation> = guard.overlapping(&range).cloned().collect();
        let report = engine.check_availability(
            &nearby,
            &reservation.space_type,
            range.start,
            range.end,
        )?;
        if !report.is_available {
            return Err(InsertError::Unavailable(report));
        }

        self.wal_append(&Event::Recorded(reservation.clone())).await?;
        self.index.insert(reservation.id, reservation.space_type.clone());
        guard.insert(reservation.clone());
        Ok(reservation)
    }

    /// Lock every ledger in key order. Used where a consistent view across space types matters.
    async fn lock_all(&self) -> Vec<OwnedMutexGuard<SpaceLedger>> {
        let mut keys: Vec<String> = self.spaces.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(ledger) = self.ledger(&key) {
                guards.push(ledger.lock_owned().await);
            }
        }
        guards
    }

    pub async fn appends_since_compact(&self) -> Result<u64, StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .map_err(|_| StoreError::WriteFailure("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WriteFailure("WAL writer dropped response".into()))
    }

    /// Rewrite the log as one `Recorded` event per reservation.
    ///
    /// Mutations are shut out until the swap completes so none can land in the
    /// old file after its state was captured.
    pub async fn compact_wal(&self) -> Result<usize, StoreError> {
        let exclusive = self.writes.write().await;
        let guards = self.lock_all().await;
        let events: Vec<Event> = guards
            .iter()
            .flat_map(|g| g.reservations.iter().cloned().map(Event::Recorded))
            .collect();
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::WriteFailure("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WriteFailure("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WriteFailure(e.to_string()))?;
        drop(guards);
        drop(exclusive);
        Ok(count)
    }
}

#[async_trait]
impl ReservationStore for ReservationBook {
    async fn list(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, StoreError> {
        let ledgers: Vec<SharedLedger> = match &filter.space_type {
            Some(space) => self.ledger(space).into_iter().collect(),
            None => self.spaces.iter().map(|e| e.value().clone()).collect(),
        };

        let mut out = Vec::new();
        for ledger in ledgers {
            let guard = ledger.lock().await;
            match &filter.window {
                Some(window) => out.extend(guard.overlapping(window).filter(|r| filter.matches(r)).cloned()),
                None => out.extend(guard.reservations.iter().filter(|r| filter.matches(r)).cloned()),
            }
        }
        out.sort_by(|a, b| a.start_date.cmp(&b.start_date).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn update(&self, id: Ulid, patch: StatusPatch) -> Result<Reservation, StoreError> {
        let space_type = self
            .index
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(StoreError::NotFound(id))?;
        let _writes = self.writes.read().await;
        let ledger = self.ledger(&space_type).ok_or(StoreError::NotFound(id))?;
        let mut guard = ledger.lock().await;
        let current = guard.get(&id).ok_or(StoreError::NotFound(id))?.status;
        check_transition(id, current, &patch)?;

        let event = Event::StatusChanged {
            id,
            space_type: space_type.clone(),
            status: patch.status,
        };
        self.wal_append(&event).await?;
        let record = guard.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.status = patch.status;
        let updated = record.clone();
        drop(guard);

        self.notify.send(&StatusEvent {
            reservation_id: id,
            space_type,
            from: current,
            to: patch.status,
            reason: TransitionReason::for_status(&patch.status),
            at: Utc::now(),
        });
        Ok(updated)
    }
}
