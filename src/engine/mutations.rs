use tracing::{debug, info};
use ulid::Ulid;

use crate::interval::{compute_slot_end, parse_instant};
use crate::limits::MAX_SLOT_DURATION_MINUTES;
use crate::model::*;
use crate::observability::{RESERVATIONS_COMMITTED_TOTAL, RESERVATIONS_REJECTED_TOTAL};
use crate::store::StoreError;

use super::{Engine, EngineError};

impl Engine {
    /// Book `court_id` at `requested_start` (RFC 3339) on behalf of the facility itself.
    ///
    /// `DependencyUnavailable` means the outcome is unknown: if the store
    /// timed out during the insert, the reservation may still land. Re-read
    /// occupancy before retrying.
    pub async fn commit_reservation(
        &self,
        identity: &Identity,
        court_id: CourtId,
        requested_start: &str,
    ) -> Result<Reservation, EngineError> {
        self.commit(identity, court_id, requested_start, None).await
    }

    /// Same as `commit_reservation`, linked to a match, so the slot is
    /// reported as player-initiated.
    pub async fn commit_match_reservation(
        &self,
        identity: &Identity,
        court_id: CourtId,
        requested_start: &str,
        match_id: Ulid,
    ) -> Result<Reservation, EngineError> {
        self.commit(identity, court_id, requested_start, Some(match_id))
            .await
    }

    async fn commit(
        &self,
        identity: &Identity,
        court_id: CourtId,
        requested_start: &str,
        match_id: Option<Ulid>,
    ) -> Result<Reservation, EngineError> {
        let result = self
            .try_commit(identity, court_id, requested_start, match_id)
            .await;
        match &result {
            Ok(r) => {
                metrics::counter!(RESERVATIONS_COMMITTED_TOTAL).increment(1);
                info!(
                    "reservation {} committed: facility {} court {} at {} for {} min",
                    r.id,
                    r.facility_id,
                    r.court_id,
                    r.span.start,
                    r.span.duration_ms() / MINUTE_MS
                );
            }
            Err(e) => {
                metrics::counter!(RESERVATIONS_REJECTED_TOTAL, "reason" => e.code()).increment(1);
                debug!("reservation on court {court_id} at {requested_start:?} rejected: {e}");
            }
        }
        result
    }

    async fn try_commit(
        &self,
        identity: &Identity,
        court_id: CourtId,
        requested_start: &str,
        match_id: Option<Ulid>,
    ) -> Result<Reservation, EngineError> {
        let start = parse_instant(requested_start)?;

        let facility_id = self.resolve_identity(identity).await?;
        let shared = self.facility_gate(facility_id).read_owned().await;
        let facility = self.load_facility(facility_id).await?;

        if facility.court(court_id).is_none() {
            return Err(EngineError::ResourceNotFound(court_id));
        }

        if let Some(existing) = self.find_conflict(facility_id, court_id, start).await? {
            return Err(EngineError::SlotAlreadyBooked {
                court_id,
                start,
                existing: existing.id,
            });
        }

        let end = compute_slot_end(start, i64::from(facility.slot_duration_minutes))?;
        let reservation = Reservation {
            id: Ulid::new(),
            facility_id,
            court_id,
            span: Span::new(start, end),
            match_id,
        };

        // Detached so a timeout cannot cancel the insert between the WAL
        // append and the in-memory apply. The task keeps the shared gate until
        // the insert settles, so a slot-duration change waits for it even
        // after the caller has been told the store is unavailable.
        let store = self.store.clone();
        let pending = reservation.clone();
        let insert = tokio::spawn(async move {
            let _shared = shared;
            store.insert_if_absent(pending).await
        });
        let joined = self
            .bounded("reservation store", insert)
            .await?
            .map_err(|e| EngineError::DependencyUnavailable(format!("insert task failed: {e}")))?;

        match joined {
            Ok(()) => Ok(reservation),
            Err(StoreError::AlreadyExists(existing)) => Err(EngineError::SlotAlreadyBooked {
                court_id,
                start,
                existing,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Change the facility's slot duration. Refused once the facility has any
    /// reservation, since conflict detection compares start instants only.
    pub async fn change_slot_duration(
        &self,
        identity: &Identity,
        minutes: i64,
    ) -> Result<(), EngineError> {
        if minutes <= 0 {
            return Err(EngineError::InvalidDuration(minutes));
        }
        if minutes > i64::from(MAX_SLOT_DURATION_MINUTES) {
            return Err(EngineError::LimitExceeded("slot duration too long"));
        }

        let facility_id = self.resolve_identity(identity).await?;
        let gate = self.facility_gate(facility_id);
        let _exclusive = gate.write().await;

        let existing = self
            .bounded("reservation store", self.store.count_for_facility(facility_id))
            .await??;
        if existing > 0 {
            return Err(EngineError::SlotDurationLocked(facility_id));
        }

        self.bounded(
            "facility registry",
            self.registry.set_slot_duration(facility_id, minutes as u32),
        )
        .await??;
        info!("facility {facility_id} slot duration set to {minutes} minutes");
        Ok(())
    }
}
