mod conflict;
mod error;
mod mutations;
mod queries;

pub use error::EngineError;
pub use queries::build_report;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::warn;

use crate::interval::DayBounds;
use crate::model::*;
use crate::registry::{FacilityRegistry, IdentityResolver};
use crate::store::ReservationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Upper bound on every store/registry call.
    pub dependency_timeout: Duration,
    pub day_bounds: DayBounds,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dependency_timeout: Duration::from_secs(2),
            day_bounds: DayBounds::default(),
        }
    }
}

/// Slot-reservation core: commits reservations and rebuilds daily occupancy.
///
/// Holds no reservation state of its own. Everything lives in the store; the
/// only in-process state is one gate per facility, taken shared by commits and
/// exclusively by slot-duration changes.
pub struct Engine {
    identities: Arc<dyn IdentityResolver>,
    registry: Arc<dyn FacilityRegistry>,
    store: Arc<dyn ReservationStore>,
    settings: EngineSettings,
    facility_gates: DashMap<FacilityId, Arc<RwLock<()>>>,
}

impl Engine {
    pub fn new(
        identities: Arc<dyn IdentityResolver>,
        registry: Arc<dyn FacilityRegistry>,
        store: Arc<dyn ReservationStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            identities,
            registry,
            store,
            settings,
            facility_gates: DashMap::new(),
        }
    }

    /// Run a dependency call under the configured timeout.
    pub(super) async fn bounded<F: Future>(
        &self,
        dependency: &'static str,
        fut: F,
    ) -> Result<F::Output, EngineError> {
        let limit = self.settings.dependency_timeout;
        tokio::time::timeout(limit, fut).await.map_err(|_| {
            metrics::counter!(crate::observability::DEPENDENCY_TIMEOUTS_TOTAL, "dependency" => dependency)
                .increment(1);
            warn!("{dependency} did not answer within {limit:?}");
            EngineError::DependencyUnavailable(format!(
                "{dependency} timed out after {} ms",
                limit.as_millis()
            ))
        })
    }

    pub(super) async fn resolve_identity(&self, identity: &Identity) -> Result<FacilityId, EngineError> {
        self.bounded("identity resolver", self.identities.resolve(identity))
            .await??
            .ok_or(EngineError::Unauthorized)
    }

    pub(super) async fn load_facility(&self, id: FacilityId) -> Result<Arc<Facility>, EngineError> {
        self.bounded("facility registry", self.registry.facility(id))
            .await??
            .ok_or(EngineError::Unauthorized)
    }

    pub(super) fn facility_gate(&self, id: FacilityId) -> Arc<RwLock<()>> {
        self.facility_gates.entry(id).or_default().value().clone()
    }
}
