//! Reference compression of large, effectively immutable payloads.
//!
//! A referenceable field larger than `min_reference_bytes` is written once to
//! the cache store under `state_ref:<hash16>` (SHA-256 of its compact JSON,
//! first 16 hex chars) and replaced in the record by `ref:<hash16>`. Storing
//! the same content again reuses the key and extends its TTL.
//!
//! Decompression resolves every token it finds. A token whose content has
//! expired, or whose lookup fails or times out, stays in place; a token that
//! resolves back into itself is an error.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio::time::timeout;
use tracing::{debug, warn};

use meridian_contracts::error::{MeridianError, MeridianResult};
use meridian_core::traits::CacheStore;

use crate::limits::LifecycleLimits;
use crate::validate::{record_size, serialized_size};

pub const REF_PREFIX: &str = "ref:";
pub const REF_KEY_PREFIX: &str = "state_ref:";

const HASH_LEN: usize = 16;

/// Fields eligible for reference compression.
pub const DEFAULT_REFERENCEABLE: [&str; 10] = [
    "route_data",
    "ports_found",
    "price_data",
    "weather_forecast",
    "weather_data",
    "bunker_analysis",
    "compliance_data",
    "hull_performance",
    "weather_consumption",
    "checksum",
];

/// The hash inside a `ref:<hash16>` token, if `value` is one.
pub fn is_reference(value: &Value) -> Option<&str> {
    let hash = value.as_str()?.strip_prefix(REF_PREFIX)?;
    (hash.len() == HASH_LEN && hash.bytes().all(|b| b.is_ascii_hexdigit())).then_some(hash)
}

/// First 16 hex chars of SHA-256 over `payload`.
pub fn content_hash(payload: &str) -> String {
    let digest = Sha256::digest(payload.as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(HASH_LEN);
    hash
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressionStats {
    pub fields_compressed: Vec<String>,
    /// Tokens whose content was already stored.
    pub references_reused: usize,
    pub bytes_before: usize,
    pub bytes_after: usize,
}

impl CompressionStats {
    /// `bytes_after / bytes_before`; 1.0 for an empty record.
    pub fn ratio(&self) -> f64 {
        if self.bytes_before == 0 {
            1.0
        } else {
            self.bytes_after as f64 / self.bytes_before as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecompressionStats {
    pub references_resolved: usize,
    /// Tokens left in place because their content is gone.
    pub references_missing: Vec<String>,
    /// Tokens left in place because the store lookup failed.
    #[serde(default)]
    pub references_unavailable: Vec<String>,
}

pub(crate) async fn bounded<T, F>(operation: &str, limit: Duration, fut: F) -> MeridianResult<T>
where
    F: Future<Output = MeridianResult<T>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(MeridianError::Timeout {
            operation: format!("cache {operation}"),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}

pub struct Compressor {
    store: Arc<dyn CacheStore>,
    limits: LifecycleLimits,
    referenceable: BTreeSet<String>,
}

impl Compressor {
    pub fn new(store: Arc<dyn CacheStore>, limits: LifecycleLimits) -> Self {
        Self {
            store,
            limits,
            referenceable: DEFAULT_REFERENCEABLE.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Replace the allowlist of referenceable fields.
    pub fn with_referenceable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.referenceable = fields.into_iter().map(Into::into).collect();
        self
    }

    pub async fn compress(
        &self,
        mut record: Map<String, Value>,
    ) -> MeridianResult<(Map<String, Value>, CompressionStats)> {
        let mut stats = CompressionStats {
            bytes_before: record_size(&record),
            ..CompressionStats::default()
        };
        let limit = self.limits.cache_timeout;
        let ttl = self.limits.reference_ttl_secs;

        for field in &self.referenceable {
            let Some(value) = record.get(field) else {
                continue;
            };
            if value.is_null() || is_reference(value).is_some() {
                continue;
            }
            if serialized_size(value) <= self.limits.min_reference_bytes {
                continue;
            }

            let payload = serde_json::to_string(value)?;
            let hash = content_hash(&payload);
            let key = format!("{REF_KEY_PREFIX}{hash}");

            if bounded("exists", limit, self.store.exists(&key)).await? {
                bounded("expire", limit, self.store.expire(&key, ttl)).await?;
                stats.references_reused += 1;
            } else {
                bounded("set", limit, self.store.set(&key, payload, ttl)).await?;
            }
            record.insert(field.clone(), Value::String(format!("{REF_PREFIX}{hash}")));
            stats.fields_compressed.push(field.clone());
        }

        stats.bytes_after = record_size(&record);
        debug!(
            fields = stats.fields_compressed.len(),
            reused = stats.references_reused,
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            "state compressed"
        );
        Ok((record, stats))
    }

    pub async fn decompress(
        &self,
        record: Map<String, Value>,
    ) -> MeridianResult<(Map<String, Value>, DecompressionStats)> {
        let mut stats = DecompressionStats::default();
        let mut out = Map::new();
        for (name, value) in record {
            let mut visiting = Vec::new();
            let resolved = self.resolve(value, &mut visiting, &mut stats).await?;
            out.insert(name, resolved);
        }
        debug!(
            resolved = stats.references_resolved,
            missing = stats.references_missing.len(),
            unavailable = stats.references_unavailable.len(),
            "state decompressed"
        );
        Ok((out, stats))
    }

    fn resolve<'a>(
        &'a self,
        value: Value,
        visiting: &'a mut Vec<String>,
        stats: &'a mut DecompressionStats,
    ) -> std::pin::Pin<Box<dyn Future<Output = MeridianResult<Value>> + Send + 'a>> {
        Box::pin(async move {
            match value {
                Value::String(_) if is_reference(&value).is_some() => {
                    let hash = is_reference(&value).unwrap_or_default().to_string();
                    if visiting.contains(&hash) {
                        return Err(MeridianError::Checkpoint {
                            reason: format!("reference cycle through ref:{hash}"),
                        });
                    }
                    let key = format!("{REF_KEY_PREFIX}{hash}");
                    let limit = self.limits.cache_timeout;
                    match bounded("get", limit, self.store.get(&key)).await {
                        Err(err) => {
                            warn!(reference = %hash, error = %err, "reference lookup failed, token left in place");
                            stats.references_unavailable.push(hash);
                            Ok(value)
                        }
                        Ok(None) => {
                            warn!(reference = %hash, "reference content missing, token left in place");
                            stats.references_missing.push(hash);
                            Ok(value)
                        }
                        Ok(Some(payload)) => {
                            let stored: Value = serde_json::from_str(&payload)?;
                            stats.references_resolved += 1;
                            visiting.push(hash);
                            let resolved = self.resolve(stored, visiting, stats).await;
                            visiting.pop();
                            resolved
                        }
                    }
                }
                Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.resolve(item, visiting, stats).await?);
                    }
                    Ok(Value::Array(out))
                }
                Value::Object(map) => {
                    let mut out = Map::new();
                    for (k, v) in map {
                        out.insert(k, self.resolve(v, visiting, stats).await?);
                    }
                    Ok(Value::Object(out))
                }
                other => Ok(other),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use meridian_contracts::state::ComputationState;

    use super::*;
    use crate::memory::InMemoryCacheStore;

    fn compressor(store: &InMemoryCacheStore) -> Compressor {
        Compressor::new(Arc::new(store.clone()), LifecycleLimits::default())
    }

    #[test]
    fn reference_tokens_are_recognised_strictly() {
        assert_eq!(is_reference(&json!("ref:0123456789abcdef")), Some("0123456789abcdef"));
        assert!(is_reference(&json!("ref:short")).is_none());
        assert!(is_reference(&json!("ref: please check the route")).is_none());
        assert!(is_reference(&json!(42)).is_none());
        assert_eq!(content_hash("payload").len(), 16);
    }

    #[tokio::test]
    async fn large_checksum_round_trips_and_shrinks_record() {
        let store = InMemoryCacheStore::new();
        let compressor = compressor(&store);

        let mut state = ComputationState::new("corr-checksum");
        state
            .domain
            .insert("checksum".into(), json!("a".repeat(10 * 1024)));
        let original = state.to_record().unwrap();

        let (compressed, stats) = compressor.compress(original.clone()).await.unwrap();
        assert_eq!(stats.fields_compressed, vec!["checksum"]);
        assert!(is_reference(&compressed["checksum"]).is_some());
        assert!(record_size(&compressed) < record_size(&original));
        assert!(stats.ratio() < 1.0);

        let (restored, dstats) = compressor.decompress(compressed).await.unwrap();
        assert_eq!(dstats.references_resolved, 1);
        assert_eq!(restored, original);
        let state_back = ComputationState::from_record(restored).unwrap();
        assert_eq!(state_back, state);
    }

    #[tokio::test]
    async fn small_fields_stay_inline() {
        let store = InMemoryCacheStore::new();
        let mut record = ComputationState::new("c").to_record().unwrap();
        record.insert("route_data".into(), json!({ "distance_nm": 100.0 }));

        let (compressed, stats) = compressor(&store).compress(record.clone()).await.unwrap();
        assert!(stats.fields_compressed.is_empty());
        assert_eq!(compressed, record);
    }

    #[tokio::test]
    async fn identical_content_reuses_reference() {
        let store = InMemoryCacheStore::new();
        let compressor = compressor(&store);
        let mut record = Map::new();
        record.insert("route_data".into(), json!({ "waypoints": vec![[1.0, 103.8]; 200] }));

        let (first, _) = compressor.compress(record.clone()).await.unwrap();
        let (second, stats) = compressor.compress(record).await.unwrap();

        assert_eq!(first["route_data"], second["route_data"]);
        assert_eq!(stats.references_reused, 1);
        assert_eq!(store.keys("state_ref:*").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_reference_degrades_to_token() {
        let store = InMemoryCacheStore::new();
        let mut record = Map::new();
        record.insert("route_data".into(), json!("ref:00000000deadbeef"));

        let (out, stats) = compressor(&store).decompress(record).await.unwrap();
        assert_eq!(out["route_data"], json!("ref:00000000deadbeef"));
        assert_eq!(stats.references_missing, vec!["00000000deadbeef"]);
    }

    /// Serves everything except reference content, whose lookups fail or stall.
    struct FlakyRefs {
        inner: InMemoryCacheStore,
        stall: bool,
    }

    #[async_trait::async_trait]
    impl CacheStore for FlakyRefs {
        async fn get(&self, key: &str) -> MeridianResult<Option<String>> {
            if !key.starts_with(REF_KEY_PREFIX) {
                return self.inner.get(key).await;
            }
            if self.stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Err(MeridianError::Cache {
                reason: "connection reset".into(),
            })
        }
        async fn set(&self, key: &str, value: String, ttl_secs: u64) -> MeridianResult<()> {
            self.inner.set(key, value, ttl_secs).await
        }
        async fn exists(&self, key: &str) -> MeridianResult<bool> {
            self.inner.exists(key).await
        }
        async fn expire(&self, key: &str, ttl_secs: u64) -> MeridianResult<bool> {
            self.inner.expire(key, ttl_secs).await
        }
        async fn del(&self, key: &str) -> MeridianResult<bool> {
            self.inner.del(key).await
        }
        async fn keys(&self, pattern: &str) -> MeridianResult<Vec<String>> {
            self.inner.keys(pattern).await
        }
    }

    fn token_record() -> Map<String, Value> {
        let mut record = Map::new();
        record.insert("route_data".into(), json!("ref:0123456789abcdef"));
        record.insert("intent".into(), json!("bunker_planning"));
        record
    }

    #[tokio::test]
    async fn failed_lookup_keeps_token() {
        let store = FlakyRefs {
            inner: InMemoryCacheStore::new(),
            stall: false,
        };
        let compressor = Compressor::new(Arc::new(store), LifecycleLimits::default());

        let (out, stats) = compressor.decompress(token_record()).await.unwrap();
        assert_eq!(out["route_data"], json!("ref:0123456789abcdef"));
        assert_eq!(out["intent"], json!("bunker_planning"));
        assert_eq!(stats.references_unavailable, vec!["0123456789abcdef"]);
        assert!(stats.references_missing.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_lookup_keeps_token() {
        let store = FlakyRefs {
            inner: InMemoryCacheStore::new(),
            stall: true,
        };
        let compressor = Compressor::new(Arc::new(store), LifecycleLimits::default());

        let (out, stats) = compressor.decompress(token_record()).await.unwrap();
        assert_eq!(out["route_data"], json!("ref:0123456789abcdef"));
        assert_eq!(stats.references_unavailable.len(), 1);
    }

    #[tokio::test]
    async fn self_referencing_content_is_a_cycle() {
        let store = InMemoryCacheStore::new();
        store
            .set(
                "state_ref:aaaaaaaaaaaaaaaa",
                r#"{"inner":"ref:aaaaaaaaaaaaaaaa"}"#.to_string(),
                60,
            )
            .await
            .unwrap();
        let mut record = Map::new();
        record.insert("route_data".into(), json!("ref:aaaaaaaaaaaaaaaa"));

        let err = compressor(&store).decompress(record).await.unwrap_err();
        assert!(matches!(err, MeridianError::Checkpoint { .. }));
    }
}
