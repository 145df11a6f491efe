mod wal_store;

pub use wal_store::WalStore;

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The (facility, court, start) slot is already held by this reservation.
    AlreadyExists(Ulid),
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::AlreadyExists(id) => write!(f, "slot already held by reservation {id}"),
            StoreError::Unavailable(e) => write!(f, "reservation store unavailable: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Durable set of committed reservations.
///
/// `insert_if_absent` is the only mutation and must itself enforce that at
/// most one reservation exists per (facility, court, start); callers treat
/// any lookup beforehand as a fast path only.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn find_by_court_and_start(
        &self,
        facility: FacilityId,
        court: CourtId,
        start: Ms,
    ) -> Result<Option<Reservation>, StoreError>;

    /// Reservations of `facility` whose start lies in `range`, ordered by start.
    async fn find_by_facility_and_range(
        &self,
        facility: FacilityId,
        range: Span,
    ) -> Result<Vec<Reservation>, StoreError>;

    async fn insert_if_absent(&self, reservation: Reservation) -> Result<(), StoreError>;

    async fn count_for_facility(&self, facility: FacilityId) -> Result<usize, StoreError>;
}
