//! In-memory repository for tests and embedding.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::models::{listing_order, DemandSummary};
use crate::domain::ports::outbound::{DemandRepository, SaveOutcome};
use crate::domain::{Demand, DemandError, DemandId};

/// Repository backed by a shared `HashMap`. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDemandRepository {
    demands: Arc<RwLock<HashMap<DemandId, Demand>>>,
}

impl InMemoryDemandRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_demands(self, demands: Vec<Demand>) -> Self {
        {
            let mut stored = self.write();
            for demand in demands {
                stored.insert(demand.id.clone(), demand);
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<DemandId, Demand>> {
        self.demands.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<DemandId, Demand>> {
        self.demands.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DemandRepository for InMemoryDemandRepository {
    fn save(&self, demand: &Demand) -> Result<SaveOutcome, DemandError> {
        if !demand.has_meaningful_content() {
            return Ok(SaveOutcome::SkippedEmpty);
        }
        self.write().insert(demand.id.clone(), demand.clone());
        Ok(SaveOutcome::Saved)
    }

    fn load(&self, id: &DemandId) -> Result<Demand, DemandError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| DemandError::NotFound(id.clone()))
    }

    fn list_summaries(&self) -> Result<Vec<DemandSummary>, DemandError> {
        let mut summaries: Vec<DemandSummary> =
            self.read().values().map(DemandSummary::from).collect();
        summaries.sort_by(listing_order);
        Ok(summaries)
    }

    fn delete(&self, id: &DemandId) -> Result<(), DemandError> {
        self.write().remove(id);
        Ok(())
    }
}
