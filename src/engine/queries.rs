use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::warn;

use crate::interval::{day_bounds, parse_reference_date};
use crate::model::*;
use crate::observability::{DATA_INTEGRITY_WARNINGS_TOTAL, OCCUPANCY_QUERIES_TOTAL};

use super::{Engine, EngineError};

impl Engine {
    /// Per-court occupancy of the identity's facility for the day selected by
    /// `reference_date` under the configured day-bounds convention.
    ///
    /// Reservations on courts the facility no longer has are left out and
    /// reported in `warnings`; they never fail the query.
    pub async fn get_occupancy(
        &self,
        identity: &Identity,
        reference_date: Option<&str>,
    ) -> Result<OccupancyReport, EngineError> {
        let facility_id = self.resolve_identity(identity).await?;
        let facility = self.load_facility(facility_id).await?;

        let raw = reference_date
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(EngineError::MissingParameter("reference date"))?;
        let day = parse_reference_date(raw)?;
        let window = day_bounds(day, self.settings.day_bounds)?;

        let reservations = self
            .bounded(
                "reservation store",
                self.store.find_by_facility_and_range(facility_id, window),
            )
            .await??;

        let report = build_report(&facility, day, window, reservations);
        metrics::counter!(OCCUPANCY_QUERIES_TOTAL).increment(1);
        if !report.warnings.is_empty() {
            metrics::counter!(DATA_INTEGRITY_WARNINGS_TOTAL).increment(report.warnings.len() as u64);
            for w in &report.warnings {
                warn!("occupancy of facility {facility_id} on {day}: {w}");
            }
        }
        Ok(report)
    }
}

/// Group `reservations` by court and category for `facility`.
///
/// Every court of the facility gets a bucket, empty if nothing is booked on it.
/// Opening hours come from the weekday of `day` itself.
pub fn build_report(
    facility: &Facility,
    day: NaiveDate,
    window: Span,
    mut reservations: Vec<Reservation>,
) -> OccupancyReport {
    reservations.sort_by_key(|r| (r.span.start, r.id));

    let mut indoor = Vec::new();
    let mut outdoor = Vec::new();
    let mut bucket_of: HashMap<CourtId, (CourtCategory, usize)> = HashMap::new();
    for court in &facility.courts {
        let bucket = match court.category {
            CourtCategory::Indoor => &mut indoor,
            CourtCategory::Outdoor => &mut outdoor,
        };
        bucket_of.insert(court.id, (court.category, bucket.len()));
        bucket.push(CourtOccupancy {
            court_id: court.id,
            reservations: Vec::new(),
        });
    }

    let mut warnings = Vec::new();
    for r in reservations {
        let Some(&(category, idx)) = bucket_of.get(&r.court_id) else {
            warnings.push(DataIntegrityWarning {
                reservation_id: r.id,
                court_id: r.court_id,
                reason: "court no longer exists in facility".into(),
            });
            continue;
        };
        let bucket = match category {
            CourtCategory::Indoor => &mut indoor,
            CourtCategory::Outdoor => &mut outdoor,
        };
        bucket[idx].reservations.push(OccupiedSlot {
            id: r.id,
            start: r.span.start,
            end: r.span.end,
            requester: r.requester(),
        });
    }

    let weekday = WeekdayIndex::of(day);
    let hours = facility.schedule.day(weekday);
    OccupancyReport {
        facility_id: facility.id,
        day,
        window,
        weekday,
        opens: hours.opens,
        closes: hours.closes,
        open: hours.open,
        slot_duration_minutes: facility.slot_duration_minutes,
        indoor,
        outdoor,
        warnings,
    }
}
