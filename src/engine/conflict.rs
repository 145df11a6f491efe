use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    /// The reservation already holding `court` at exactly `start`, if any.
    ///
    /// Exact-start equality only detects every overlap while all reservations
    /// of a facility share one length. `change_slot_duration` refuses to run
    /// once a facility has reservations, which keeps that precondition true.
    pub async fn find_conflict(
        &self,
        facility: FacilityId,
        court: CourtId,
        start: Ms,
    ) -> Result<Option<Reservation>, EngineError> {
        let found = self
            .bounded(
                "reservation store",
                self.store.find_by_court_and_start(facility, court, start),
            )
            .await??;
        Ok(found)
    }
}
