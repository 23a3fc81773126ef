//! Routing telemetry: query hashing and the in-memory recorder.

use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};

use meridian_contracts::{
    error::{MeridianError, MeridianResult},
    reasoning::RoutingMetadata,
};
use meridian_core::traits::RoutingRecorder;

/// First 16 hex chars of SHA-256 over the trimmed query.
pub fn query_hash(query: &str) -> String {
    let mut hash = hex::encode(Sha256::digest(query.trim().as_bytes()));
    hash.truncate(16);
    hash
}

/// Keeps every routing record in append order. Clones share the log.
#[derive(Clone, Default)]
pub struct InMemoryRoutingLog {
    records: Arc<Mutex<Vec<RoutingMetadata>>>,
}

impl InMemoryRoutingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RoutingMetadata> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Records emitted for one originating query.
    pub fn for_query(&self, query: &str) -> Vec<RoutingMetadata> {
        let hash = query_hash(query);
        self.records()
            .into_iter()
            .filter(|r| r.query_hash == hash)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RoutingRecorder for InMemoryRoutingLog {
    fn record(&self, metadata: &RoutingMetadata) -> MeridianResult<()> {
        let mut records = self.records.lock().map_err(|e| MeridianError::Serialization {
            reason: format!("routing log lock poisoned: {e}"),
        })?;
        records.push(metadata.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use meridian_contracts::reasoning::ClassificationMethod;

    use super::*;

    #[test]
    fn hash_is_stable_and_short() {
        let a = query_hash("Route from Singapore to Rotterdam");
        assert_eq!(a.len(), 16);
        assert_eq!(a, query_hash("  Route from Singapore to Rotterdam "));
        assert_ne!(a, query_hash("Route from Rotterdam to Singapore"));
    }

    #[test]
    fn records_filter_by_query() {
        let log = InMemoryRoutingLog::new();
        let meta = RoutingMetadata {
            query_hash: query_hash("q1"),
            matched_intent: None,
            target_agent: Some("route_agent".into()),
            confidence: 90,
            method: ClassificationMethod::PatternMatch,
            reasoning: "keyword match".into(),
            extracted_params: json!({}),
            latency_ms: 1,
            completion_calls: 0,
            estimated_cost_usd: 0.0,
            timestamp: Utc::now(),
        };
        log.record(&meta).unwrap();
        log.clone().record(&meta).unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(log.for_query("q1").len(), 2);
        assert!(log.for_query("q2").is_empty());
    }
}
