use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use tracing::info;

use crate::limits::*;
use crate::model::*;

#[derive(Debug)]
pub enum RegistryError {
    NotFound(FacilityId),
    Invalid(String),
    LimitExceeded(&'static str),
    Unavailable(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::NotFound(id) => write!(f, "facility not found: {id}"),
            RegistryError::Invalid(msg) => write!(f, "invalid facility data: {msg}"),
            RegistryError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            RegistryError::Unavailable(e) => write!(f, "facility registry unavailable: {e}"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Maps an authenticated identity to the facility it acts for.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, identity: &Identity) -> Result<Option<FacilityId>, RegistryError>;
}

/// Facility metadata: courts, weekly schedule, slot duration.
#[async_trait]
pub trait FacilityRegistry: Send + Sync {
    async fn facility(&self, id: FacilityId) -> Result<Option<Arc<Facility>>, RegistryError>;

    async fn set_slot_duration(&self, id: FacilityId, minutes: u32) -> Result<(), RegistryError>;
}

// ── Seed file ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SeedFile {
    facilities: Vec<SeedFacility>,
}

#[derive(Debug, Deserialize)]
struct SeedFacility {
    #[serde(flatten)]
    facility: Facility,
    #[serde(default)]
    tokens: Vec<String>,
}

/// In-memory registry that also resolves access tokens.
#[derive(Default)]
pub struct InMemoryRegistry {
    facilities: DashMap<FacilityId, Arc<Facility>>,
    tokens: DashMap<String, FacilityId>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load facilities from a JSON seed file (see `facilities.example.json`).
    pub fn from_seed_file(path: &Path) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::Unavailable(format!("{}: {e}", path.display())))?;
        let registry = Self::from_seed_json(&raw)?;
        info!(
            "loaded {} facilities from {}",
            registry.facilities.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn from_seed_json(raw: &str) -> Result<Self, RegistryError> {
        let seed: SeedFile =
            serde_json::from_str(raw).map_err(|e| RegistryError::Invalid(e.to_string()))?;
        let registry = Self::new();
        for entry in seed.facilities {
            registry.register(entry.facility, entry.tokens)?;
        }
        Ok(registry)
    }

    /// Add a facility and the tokens that act for it.
    pub fn register(&self, facility: Facility, tokens: Vec<String>) -> Result<(), RegistryError> {
        validate_facility(&facility)?;
        if self.facilities.len() >= MAX_FACILITIES {
            return Err(RegistryError::LimitExceeded("too many facilities"));
        }
        if self.facilities.contains_key(&facility.id) {
            return Err(RegistryError::Invalid(format!(
                "duplicate facility id {}",
                facility.id
            )));
        }
        for token in &tokens {
            if token.is_empty() || token.len() > MAX_TOKEN_LEN {
                return Err(RegistryError::LimitExceeded("token length"));
            }
            if let Some(owner) = self.tokens.get(token)
                && *owner != facility.id
            {
                return Err(RegistryError::Invalid(format!(
                    "token already assigned to facility {}",
                    *owner
                )));
            }
        }

        let id = facility.id;
        self.facilities.insert(id, Arc::new(facility));
        for token in tokens {
            self.tokens.insert(token, id);
        }
        Ok(())
    }

    /// Replace a facility's court list, e.g. after a court was demolished.
    pub fn replace_courts(&self, id: FacilityId, courts: Vec<Court>) -> Result<(), RegistryError> {
        let mut entry = self
            .facilities
            .get_mut(&id)
            .ok_or(RegistryError::NotFound(id))?;
        let mut updated = Facility::clone(&entry);
        updated.courts = courts;
        validate_facility(&updated)?;
        *entry = Arc::new(updated);
        Ok(())
    }
}

fn validate_facility(facility: &Facility) -> Result<(), RegistryError> {
    if facility.name.len() > MAX_NAME_LEN || facility.email.len() > MAX_NAME_LEN {
        return Err(RegistryError::LimitExceeded("facility name too long"));
    }
    validate_slot_duration(facility.slot_duration_minutes)?;
    if facility.courts.len() > MAX_COURTS_PER_FACILITY {
        return Err(RegistryError::LimitExceeded("too many courts"));
    }
    let mut seen = HashSet::new();
    for court in &facility.courts {
        if !seen.insert(court.id) {
            return Err(RegistryError::Invalid(format!(
                "duplicate court id {} in facility {}",
                court.id, facility.id
            )));
        }
    }
    Ok(())
}

fn validate_slot_duration(minutes: u32) -> Result<(), RegistryError> {
    if minutes == 0 || minutes > MAX_SLOT_DURATION_MINUTES {
        return Err(RegistryError::Invalid(format!(
            "slot duration must be within 1..={MAX_SLOT_DURATION_MINUTES} minutes, got {minutes}"
        )));
    }
    Ok(())
}

#[async_trait]
impl IdentityResolver for InMemoryRegistry {
    async fn resolve(&self, identity: &Identity) -> Result<Option<FacilityId>, RegistryError> {
        Ok(self.tokens.get(identity.as_str()).map(|e| *e.value()))
    }
}

#[async_trait]
impl FacilityRegistry for InMemoryRegistry {
    async fn facility(&self, id: FacilityId) -> Result<Option<Arc<Facility>>, RegistryError> {
        Ok(self.facilities.get(&id).map(|e| e.value().clone()))
    }

    async fn set_slot_duration(&self, id: FacilityId, minutes: u32) -> Result<(), RegistryError> {
        validate_slot_duration(minutes)?;
        let mut entry = self
            .facilities
            .get_mut(&id)
            .ok_or(RegistryError::NotFound(id))?;
        let mut updated = Facility::clone(&entry);
        updated.slot_duration_minutes = minutes;
        *entry = Arc::new(updated);
        Ok(())
    }
}
