mod catalog;
mod error;
mod lookups;
mod tx;

pub use error::StoreError;
pub use tx::Transaction;

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedEventState = Arc<RwLock<EventState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        changes: Vec<Change>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        changes: Vec<Change>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Vec<Change>, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches commits for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { changes, response } => {
                let mut batch = vec![(changes, response)];

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { changes, response }) => {
                            batch.push((changes, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (changes, _) in batch {
        if let Err(e) = wal.append_buffered(changes) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even on append error so partially buffered bytes don't leak
    // into the next batch.
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { changes, response } => {
            let result = Wal::write_compact_file(wal.path(), &changes)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        // The writer loop routes appends itself.
        WalCommand::Append { response, .. } => {
            let _ = response.send(Err(io::Error::other("append routed to non-append handler")));
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Upper bound on waiting for an event's row lock.
    pub lock_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(2),
        }
    }
}

/// Embedded transactional store for events and bookings.
///
/// Each event's state sits behind its own `RwLock`; a [`Transaction`] holds
/// the write half for its whole lifetime, which makes the seat counter's
/// read-compare-write atomic against every other writer of that event.
pub struct Store {
    events: DashMap<Ulid, SharedEventState>,
    /// Unique title → event id.
    titles: DashMap<String, Ulid>,
    /// Reverse lookup: booking id → event id.
    booking_index: DashMap<Ulid, Ulid>,
    /// User → booking ids, in insertion order.
    user_bookings: DashMap<Ulid, Vec<Ulid>>,
    venues: DashMap<Ulid, Venue>,
    genres: DashMap<Ulid, Genre>,
    /// Unique genre name → genre id.
    genre_names: DashMap<String, Ulid>,
    performers: DashMap<Ulid, Performer>,
    next_seq: AtomicU64,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Writers hold this shared for their lifetime; compaction takes it exclusively.
    commit_gate: Arc<RwLock<()>>,
    options: StoreOptions,
}

impl Store {
    /// Open the store, replaying the WAL at `wal_path`. Must be called from
    /// within a Tokio runtime (the WAL writer is spawned here).
    pub fn open(wal_path: PathBuf, options: StoreOptions) -> io::Result<Self> {
        let commits = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Self {
            events: DashMap::new(),
            titles: DashMap::new(),
            booking_index: DashMap::new(),
            user_bookings: DashMap::new(),
            venues: DashMap::new(),
            genres: DashMap::new(),
            genre_names: DashMap::new(),
            performers: DashMap::new(),
            next_seq: AtomicU64::new(0),
            wal_tx,
            commit_gate: Arc::new(RwLock::new(())),
            options,
        };

        // We're the sole owner of these Arcs during replay, so try_write always
        // succeeds instantly. Never use blocking_write here: this may run inside
        // an async context.
        let mut replayed = 0usize;
        for change in commits.iter().flatten() {
            replayed += 1;
            match change.event_id() {
                Some(event_id) => {
                    if let Some(state) = store.get_event_state(&event_id)
                        && let Ok(mut guard) = state.try_write()
                    {
                        store.apply_row(&mut guard, change);
                    }
                }
                None => store.apply_catalog(change),
            }
        }

        metrics::gauge!(crate::observability::EVENTS_ACTIVE).set(store.events.len() as f64);
        info!(
            commits = commits.len(),
            changes = replayed,
            events = store.events.len(),
            bookings = store.booking_index.len(),
            "store replayed from {}",
            wal_path.display()
        );
        Ok(store)
    }

    /// Open a transaction on one event, waiting at most `lock_timeout` for its row lock.
    pub async fn begin(&self, event_id: Ulid) -> Result<Transaction<'_>, StoreError> {
        let gate = self.commit_gate.clone().read_owned().await;
        let state = self
            .get_event_state(&event_id)
            .ok_or(StoreError::NotFound(event_id))?;

        let wait = Instant::now();
        let guard = tokio::time::timeout(self.options.lock_timeout, state.write_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(event_id))?;
        metrics::histogram!(crate::observability::LOCK_WAIT_SECONDS)
            .record(wait.elapsed().as_secs_f64());

        // The event may have been deleted while we waited.
        if !self.events.contains_key(&event_id) {
            return Err(StoreError::NotFound(event_id));
        }
        Ok(Transaction::new(self, gate, guard))
    }

    /// Write one commit to the WAL via the background group-commit writer.
    async fn wal_append(&self, changes: Vec<Change>) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                changes,
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    /// Apply a row-level change to an event's state (caller holds the lock).
    fn apply_row(&self, state: &mut EventState, change: &Change) {
        match change {
            Change::SeatsDecremented { seats, .. } => {
                state.event.available_seats = state.event.available_seats.saturating_sub(*seats);
            }
            Change::SeatsIncremented { seats, .. } => {
                state.event.available_seats = state.event.available_seats.saturating_add(*seats);
            }
            Change::BookingInserted { booking } => {
                self.booking_index.insert(booking.id, booking.event_id);
                self.user_bookings
                    .entry(booking.user_id)
                    .or_default()
                    .push(booking.id);
                state.bookings.push(booking.clone());
            }
            Change::BookingDeleted { id, .. } => {
                if let Some(booking) = state.remove_booking(id) {
                    self.booking_index.remove(id);
                    if let Some(mut ids) = self.user_bookings.get_mut(&booking.user_id) {
                        ids.retain(|b| b != id);
                    }
                }
            }
            // Map-level changes never reach a row.
            Change::VenueAdded { .. }
            | Change::GenreAdded { .. }
            | Change::PerformerAdded { .. }
            | Change::EventCreated { .. }
            | Change::EventDeleted { .. } => {}
        }
    }

    /// Apply a registry or event create/delete change at the map level.
    fn apply_catalog(&self, change: &Change) {
        match change {
            Change::VenueAdded { venue } => {
                self.venues.insert(venue.id, venue.clone());
            }
            Change::GenreAdded { genre } => {
                self.genre_names.insert(genre.name.clone(), genre.id);
                self.genres.insert(genre.id, genre.clone());
            }
            Change::PerformerAdded { performer } => {
                self.performers.insert(performer.id, performer.clone());
            }
            Change::EventCreated {
                event,
                capacity,
                seq,
            } => {
                self.titles.insert(event.title.clone(), event.id);
                self.next_seq.fetch_max(seq + 1, Ordering::SeqCst);
                let state = EventState::new(event.clone(), *capacity, *seq);
                self.events.insert(event.id, Arc::new(RwLock::new(state)));
            }
            Change::EventDeleted { id, title } => {
                self.events.remove(id);
                self.titles.remove(title);
            }
            Change::SeatsDecremented { .. }
            | Change::SeatsIncremented { .. }
            | Change::BookingInserted { .. }
            | Change::BookingDeleted { .. } => {
                debug!("row-level change routed to catalog apply, ignored");
            }
        }
    }
}
