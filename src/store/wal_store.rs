use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

use super::{ReservationStore, StoreError};

pub type SharedFacilitySlots = Arc<RwLock<FacilitySlots>>;

/// All reservations of one facility, sorted by `span.start`.
#[derive(Debug, Default)]
pub struct FacilitySlots {
    reservations: Vec<Reservation>,
}

impl FacilitySlots {
    pub(crate) fn len(&self) -> usize {
        self.reservations.len()
    }

    /// Reservations starting in `range`. Binary search on both ends.
    pub fn starting_within(&self, range: &Span) -> &[Reservation] {
        let lo = self
            .reservations
            .partition_point(|r| r.span.start < range.start);
        let hi = self
            .reservations
            .partition_point(|r| r.span.start < range.end);
        &self.reservations[lo..hi.max(lo)]
    }

    pub fn at(&self, court: CourtId, start: Ms) -> Option<&Reservation> {
        let lo = self.reservations.partition_point(|r| r.span.start < start);
        self.reservations[lo..]
            .iter()
            .take_while(|r| r.span.start == start)
            .find(|r| r.court_id == court)
    }

    /// Insert keeping start order. Returns the id of the holder if the slot is taken.
    pub fn insert(&mut self, reservation: Reservation) -> Result<(), Ulid> {
        if let Some(existing) = self.at(reservation.court_id, reservation.span.start) {
            return Err(existing.id);
        }
        let pos = self
            .reservations
            .partition_point(|r| r.span.start <= reservation.span.start);
        self.reservations.insert(pos, reservation);
        Ok(())
    }
}

// ── Group-commit WAL channel ─────────────────────────────

struct WalAppend {
    event: Event,
    response: oneshot::Sender<io::Result<()>>,
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first append arrives.
/// 2. Drain all immediately available appends (the batch window).
/// 3. Single flush_sync for the whole batch.
/// 4. Respond to every sender with the batch result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalAppend>) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        respond_batch(batch, &result);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[WalAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for append in batch {
        if let Err(e) = wal.append_buffered(&append.event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: Vec<WalAppend>, result: &io::Result<()>) {
    for append in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = append.response.send(r);
    }
}

/// Reservation store kept in memory and made durable through the WAL.
///
/// Each facility's reservations sit behind their own `RwLock`; an insert holds
/// the write lock across the uniqueness check, the WAL append and the apply,
/// so two inserts for the same slot are serialized and the second one fails.
pub struct WalStore {
    facilities: DashMap<FacilityId, SharedFacilitySlots>,
    wal_tx: mpsc::Sender<WalAppend>,
}

impl WalStore {
    /// Replay `wal_path` and start the group-commit writer. Must run inside a tokio runtime.
    pub fn open(wal_path: &Path) -> io::Result<Self> {
        let events = Wal::replay(wal_path)?;
        let wal = Wal::open(wal_path)?;
        info!("reservation log {} replayed: {} events", wal.path().display(), events.len());

        let mut replayed: HashMap<FacilityId, FacilitySlots> = HashMap::new();
        for event in events {
            match event {
                Event::ReservationCommitted { reservation } => {
                    let id = reservation.id;
                    let slots = replayed.entry(reservation.facility_id).or_default();
                    if let Err(holder) = slots.insert(reservation) {
                        warn!("replay: reservation {id} duplicates slot held by {holder}, skipped");
                    }
                }
            }
        }

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let facilities = DashMap::new();
        for (facility, slots) in replayed {
            facilities.insert(facility, Arc::new(RwLock::new(slots)));
        }
        Ok(Self { facilities, wal_tx })
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalAppend {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn existing_slots(&self, facility: FacilityId) -> Option<SharedFacilitySlots> {
        self.facilities.get(&facility).map(|e| e.value().clone())
    }

    fn slots_for(&self, facility: FacilityId) -> SharedFacilitySlots {
        self.facilities.entry(facility).or_default().value().clone()
    }
}

#[async_trait]
impl ReservationStore for WalStore {
    async fn find_by_court_and_start(
        &self,
        facility: FacilityId,
        court: CourtId,
        start: Ms,
    ) -> Result<Option<Reservation>, StoreError> {
        let Some(slots) = self.existing_slots(facility) else {
            return Ok(None);
        };
        let guard = slots.read().await;
        Ok(guard.at(court, start).cloned())
    }

    async fn find_by_facility_and_range(
        &self,
        facility: FacilityId,
        range: Span,
    ) -> Result<Vec<Reservation>, StoreError> {
        let Some(slots) = self.existing_slots(facility) else {
            return Ok(Vec::new());
        };
        let guard = slots.read().await;
        Ok(guard.starting_within(&range).to_vec())
    }

    async fn insert_if_absent(&self, reservation: Reservation) -> Result<(), StoreError> {
        let slots = self.slots_for(reservation.facility_id);
        let mut guard = slots.write().await;
        if let Some(existing) = guard.at(reservation.court_id, reservation.span.start) {
            return Err(StoreError::AlreadyExists(existing.id));
        }
        let event = Event::ReservationCommitted {
            reservation: reservation.clone(),
        };
        self.wal_append(&event).await?;
        guard.insert(reservation).map_err(StoreError::AlreadyExists)
    }

    async fn count_for_facility(&self, facility: FacilityId) -> Result<usize, StoreError> {
        let Some(slots) = self.existing_slots(facility) else {
            return Ok(0);
        };
        let guard = slots.read().await;
        Ok(guard.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const H: Ms = 3_600_000;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("courtbook_test_store");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn reservation(facility: FacilityId, court: u32, start: Ms) -> Reservation {
        Reservation {
            id: Ulid::new(),
            facility_id: facility,
            court_id: CourtId(court),
            span: Span::new(start, start + H),
            match_id: None,
        }
    }

    #[test]
    fn slots_stay_sorted_and_unique() {
        let facility = FacilityId(Ulid::new());
        let mut slots = FacilitySlots::default();
        slots.insert(reservation(facility, 1, 3 * H)).unwrap();
        slots.insert(reservation(facility, 1, H)).unwrap();
        slots.insert(reservation(facility, 2, H)).unwrap();
        let holder = slots.at(CourtId(1), H).unwrap().id;
        assert_eq!(slots.insert(reservation(facility, 1, H)), Err(holder));

        let starts: Vec<Ms> = slots.starting_within(&Span::new(0, 10 * H)).iter().map(|r| r.span.start).collect();
        assert_eq!(starts, vec![H, H, 3 * H]);
        assert_eq!(slots.len(), 3);
    }

    #[test]
    fn starting_within_is_half_open() {
        let facility = FacilityId(Ulid::new());
        let mut slots = FacilitySlots::default();
        for start in [0, H, 2 * H, 3 * H] {
            slots.insert(reservation(facility, 1, start)).unwrap();
        }
        let hits = slots.starting_within(&Span::new(H, 3 * H));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].span.start, H);
        assert_eq!(hits[1].span.start, 2 * H);
        assert!(slots.starting_within(&Span::new(10 * H, 11 * H)).is_empty());
    }

    #[tokio::test]
    async fn insert_then_find() {
        let store = WalStore::open(&test_wal_path("insert_find.wal")).unwrap();
        let facility = FacilityId(Ulid::new());
        let r = reservation(facility, 1, 9 * H);

        assert_eq!(store.find_by_court_and_start(facility, CourtId(1), 9 * H).await.unwrap(), None);
        store.insert_if_absent(r.clone()).await.unwrap();
        assert_eq!(
            store.find_by_court_and_start(facility, CourtId(1), 9 * H).await.unwrap(),
            Some(r.clone())
        );
        // Same start on another court is a different slot
        assert_eq!(store.find_by_court_and_start(facility, CourtId(2), 9 * H).await.unwrap(), None);
        // Another facility never sees it
        assert_eq!(
            store
                .find_by_court_and_start(FacilityId(Ulid::new()), CourtId(1), 9 * H)
                .await
                .unwrap(),
            None
        );
        assert_eq!(store.count_for_facility(facility).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn insert_if_absent_rejects_second_holder() {
        let store = WalStore::open(&test_wal_path("dup_insert.wal")).unwrap();
        let facility = FacilityId(Ulid::new());
        let first = reservation(facility, 3, 10 * H);
        store.insert_if_absent(first.clone()).await.unwrap();

        let result = store.insert_if_absent(reservation(facility, 3, 10 * H)).await;
        assert_eq!(result, Err(StoreError::AlreadyExists(first.id)));
        assert_eq!(store.count_for_facility(facility).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_single_winner() {
        let store = Arc::new(WalStore::open(&test_wal_path("concurrent_insert.wal")).unwrap());
        let facility = FacilityId(Ulid::new());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert_if_absent(reservation(facility, 1, 8 * H)).await
            }));
        }
        let mut wins = 0;
        let mut losses = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(()) => wins += 1,
                Err(StoreError::AlreadyExists(_)) => losses += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(losses, 15);
    }

    #[tokio::test]
    async fn reopen_replays_reservations() {
        let path = test_wal_path("reopen.wal");
        let facility = FacilityId(Ulid::new());
        let a = reservation(facility, 1, 9 * H);
        let b = reservation(facility, 2, 9 * H);
        {
            let store = WalStore::open(&path).unwrap();
            store.insert_if_absent(a.clone()).await.unwrap();
            store.insert_if_absent(b.clone()).await.unwrap();
        }

        let reopened = WalStore::open(&path).unwrap();
        let found = reopened
            .find_by_facility_and_range(facility, Span::new(0, 24 * H))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&a));
        assert!(found.contains(&b));
        // Uniqueness survives the restart
        assert!(matches!(
            reopened.insert_if_absent(reservation(facility, 1, 9 * H)).await,
            Err(StoreError::AlreadyExists(id)) if id == a.id
        ));
    }
}
