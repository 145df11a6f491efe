use ulid::Ulid;

use crate::interval::IntervalError;
use crate::model::{CourtId, FacilityId, Ms};
use crate::registry::RegistryError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    InvalidInput(String),
    InvalidDuration(i64),
    /// The identity does not resolve to a facility.
    Unauthorized,
    ResourceNotFound(CourtId),
    SlotAlreadyBooked {
        court_id: CourtId,
        start: Ms,
        existing: Ulid,
    },
    MissingParameter(&'static str),
    /// A store or registry call failed or did not answer in time. On a
    /// commit the reservation may still be written after this is returned.
    DependencyUnavailable(String),
    SlotDurationLocked(FacilityId),
    LimitExceeded(&'static str),
}

impl EngineError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::InvalidDuration(_) => "invalid_duration",
            EngineError::Unauthorized => "unauthorized",
            EngineError::ResourceNotFound(_) => "resource_not_found",
            EngineError::SlotAlreadyBooked { .. } => "slot_already_booked",
            EngineError::MissingParameter(_) => "missing_parameter",
            EngineError::DependencyUnavailable(_) => "dependency_unavailable",
            EngineError::SlotDurationLocked(_) => "slot_duration_locked",
            EngineError::LimitExceeded(_) => "limit_exceeded",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::InvalidDuration(m) => {
                write!(f, "slot duration must be positive, got {m} minutes")
            }
            EngineError::Unauthorized => write!(f, "no facility for this identity"),
            EngineError::ResourceNotFound(id) => write!(f, "court not found: {id}"),
            EngineError::SlotAlreadyBooked {
                court_id,
                start,
                existing,
            } => write!(
                f,
                "court {court_id} already booked at {start} by reservation {existing}"
            ),
            EngineError::MissingParameter(name) => write!(f, "missing parameter: {name}"),
            EngineError::DependencyUnavailable(e) => write!(f, "dependency unavailable: {e}"),
            EngineError::SlotDurationLocked(id) => write!(
                f,
                "facility {id} has reservations; slot duration cannot change"
            ),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<IntervalError> for EngineError {
    fn from(e: IntervalError) -> Self {
        match e {
            IntervalError::InvalidDuration(m) => EngineError::InvalidDuration(m),
            IntervalError::OutOfRange(msg) => EngineError::LimitExceeded(msg),
            other @ IntervalError::Unparseable { .. } => EngineError::InvalidInput(other.to_string()),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::DependencyUnavailable(e.to_string())
    }
}

impl From<RegistryError> for EngineError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Invalid(msg) => EngineError::InvalidInput(msg),
            RegistryError::LimitExceeded(msg) => EngineError::LimitExceeded(msg),
            RegistryError::NotFound(_) => EngineError::Unauthorized,
            RegistryError::Unavailable(e) => EngineError::DependencyUnavailable(e),
        }
    }
}
