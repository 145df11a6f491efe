use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only instant type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

}

// ── Identifiers ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityId(pub Ulid);

impl std::fmt::Display for FacilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Court number, unique only within its facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourtId(pub u32);

impl std::fmt::Display for CourtId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque credential issued by the authentication layer. The registry maps it to a facility.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(pub String);

impl Identity {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ── Facility ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourtCategory {
    Indoor,
    Outdoor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Court {
    pub id: CourtId,
    pub category: CourtCategory,
}

/// Index into a weekly schedule. Sunday-first: 0 = Sunday .. 6 = Saturday.
///
/// Every calendar date is mapped through [`WeekdayIndex::of`]; data laid out
/// Monday-first must be converted with [`WeekdayIndex::from_monday_based`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum WeekdayIndex {
    Sunday = 0,
    Monday = 1,
    Tuesday = 2,
    Wednesday = 3,
    Thursday = 4,
    Friday = 5,
    Saturday = 6,
}

impl WeekdayIndex {
    pub const ALL: [WeekdayIndex; 7] = [
        WeekdayIndex::Sunday,
        WeekdayIndex::Monday,
        WeekdayIndex::Tuesday,
        WeekdayIndex::Wednesday,
        WeekdayIndex::Thursday,
        WeekdayIndex::Friday,
        WeekdayIndex::Saturday,
    ];

    pub fn of(date: NaiveDate) -> Self {
        Self::from_chrono(date.weekday())
    }

    pub fn from_chrono(day: Weekday) -> Self {
        Self::ALL[day.num_days_from_sunday() as usize]
    }

    pub fn from_sunday_based(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn from_monday_based(index: u8) -> Option<Self> {
        if index > 6 {
            return None;
        }
        Self::from_sunday_based((index + 1) % 7)
    }

    pub fn sunday_based(self) -> usize {
        self as usize
    }

    pub fn monday_based(self) -> usize {
        (self as usize + 6) % 7
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub opens: NaiveTime,
    pub closes: NaiveTime,
    #[serde(default = "default_open")]
    pub open: bool,
}

fn default_open() -> bool {
    true
}

/// Exactly seven entries, Sunday first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeeklySchedule {
    days: [DaySchedule; 7],
}

impl WeeklySchedule {
    pub fn new(days: [DaySchedule; 7]) -> Self {
        Self { days }
    }

    /// Same opening hours every day of the week.
    pub fn uniform(opens: NaiveTime, closes: NaiveTime) -> Self {
        Self::new([DaySchedule { opens, closes, open: true }; 7])
    }

    pub fn day(&self, weekday: WeekdayIndex) -> &DaySchedule {
        &self.days[weekday.sunday_based()]
    }

    pub fn day_mut(&mut self, weekday: WeekdayIndex) -> &mut DaySchedule {
        &mut self.days[weekday.sunday_based()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    pub id: FacilityId,
    pub name: String,
    pub email: String,
    /// Postal address, only consumed by distance lookups outside this crate.
    #[serde(default)]
    pub address: Option<String>,
    pub slot_duration_minutes: u32,
    pub schedule: WeeklySchedule,
    pub courts: Vec<Court>,
}

impl Facility {
    pub fn court(&self, id: CourtId) -> Option<&Court> {
        self.courts.iter().find(|c| c.id == id)
    }
}

// ── Reservations ─────────────────────────────────────────────────

/// Who asked for a reservation, derived from the presence of a linked match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequesterKind {
    FacilityInitiated,
    PlayerInitiated,
}

/// A committed booking of one court. `span.end` is always
/// `span.start + slot duration` of the facility at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub facility_id: FacilityId,
    pub court_id: CourtId,
    pub span: Span,
    pub match_id: Option<Ulid>,
}

impl Reservation {
    pub fn requester(&self) -> RequesterKind {
        match self.match_id {
            Some(_) => RequesterKind::PlayerInitiated,
            None => RequesterKind::FacilityInitiated,
        }
    }
}

/// WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCommitted { reservation: Reservation },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccupiedSlot {
    pub id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub requester: RequesterKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourtOccupancy {
    pub court_id: CourtId,
    pub reservations: Vec<OccupiedSlot>,
}

/// Non-fatal inconsistency found while rebuilding an occupancy view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataIntegrityWarning {
    pub reservation_id: Ulid,
    pub court_id: CourtId,
    pub reason: String,
}

impl std::fmt::Display for DataIntegrityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "reservation {} on court {}: {}",
            self.reservation_id, self.court_id, self.reason
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccupancyReport {
    pub facility_id: FacilityId,
    pub day: NaiveDate,
    /// Instants actually scanned for reservations.
    pub window: Span,
    pub weekday: WeekdayIndex,
    pub opens: NaiveTime,
    pub closes: NaiveTime,
    pub open: bool,
    pub slot_duration_minutes: u32,
    pub indoor: Vec<CourtOccupancy>,
    pub outdoor: Vec<CourtOccupancy>,
    pub warnings: Vec<DataIntegrityWarning>,
}

impl OccupancyReport {
    pub fn court(&self, id: CourtId) -> Option<&CourtOccupancy> {
        self.indoor
            .iter()
            .chain(self.outdoor.iter())
            .find(|c| c.court_id == id)
    }
}
