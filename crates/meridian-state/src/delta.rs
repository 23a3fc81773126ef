//! Field-level differences between two state records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use meridian_contracts::{error::MeridianResult, state::ComputationState};

/// What changed from one record to the next: fields set (new or different)
/// and fields removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub changed: Map<String, Value>,
    pub removed: Vec<String>,
}

impl StateDelta {
    pub fn between(previous: &Map<String, Value>, next: &Map<String, Value>) -> Self {
        let changed = next
            .iter()
            .filter(|(k, v)| previous.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let removed = previous
            .keys()
            .filter(|k| !next.contains_key(*k))
            .cloned()
            .collect();
        Self { changed, removed }
    }

    pub fn between_states(previous: &ComputationState, next: &ComputationState) -> MeridianResult<Self> {
        Ok(Self::between(&previous.to_record()?, &next.to_record()?))
    }

    /// `base` with this delta applied.
    pub fn apply(&self, base: &Map<String, Value>) -> Map<String, Value> {
        let mut out = base.clone();
        for name in &self.removed {
            out.remove(name);
        }
        for (k, v) in &self.changed {
            out.insert(k.clone(), v.clone());
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}
