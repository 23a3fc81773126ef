//! Checkpoint persistence for `ComputationState`.
//!
//! Write path:  [optimize (display only)] → compress → validate(sizes) → persist
//! Read path:   load → migrate (if needed) → decompress → validate
//!
//! Keys for one conversation:
//!
//!   checkpoint:{conversation}:latest     full record
//!   checkpoint:{conversation}:delta:{n}  change from checkpoint n-1 to n
//!
//! A write-time size violation blocks only the offending field; a fatal
//! condition (cycle, total budget) blocks the whole checkpoint. A read-time
//! violation after migration fails the load.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use meridian_contracts::{
    error::{MeridianError, MeridianResult},
    state::ComputationState,
    validation::IssueKind,
};
use meridian_core::traits::CacheStore;

use crate::catalog::SchemaCatalog;
use crate::compress::{bounded, CompressionStats, Compressor, DecompressionStats};
use crate::delta::StateDelta;
use crate::limits::LifecycleLimits;
use crate::migrate::Migrator;
use crate::optimize::Optimizer;
use crate::validate::Validator;

/// Why a checkpoint is written. Only `Display` runs the lossy optimize pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPurpose {
    /// The decision loop will resume from this state.
    Resume,
    /// The state is kept for later display only.
    Display,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointReceipt {
    pub key: String,
    pub delta_key: Option<String>,
    pub sequence: u64,
    pub purpose: CheckpointPurpose,
    pub bytes: usize,
    /// Fields withheld because they failed write-time validation.
    pub blocked_fields: Vec<String>,
    pub compression: CompressionStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedCheckpoint {
    pub state: ComputationState,
    /// The schema version the record was stored under.
    pub stored_version: String,
    pub migrated: bool,
    pub decompression: DecompressionStats,
    pub warnings: Vec<String>,
}

pub fn latest_key(conversation_id: &str) -> String {
    format!("checkpoint:{conversation_id}:latest")
}

pub fn delta_key(conversation_id: &str, sequence: u64) -> String {
    format!("checkpoint:{conversation_id}:delta:{sequence}")
}

fn conversation_pattern(conversation_id: &str) -> String {
    format!("checkpoint:{conversation_id}:*")
}

pub struct CheckpointManager {
    store: Arc<dyn CacheStore>,
    limits: LifecycleLimits,
    migrator: Migrator,
    validator: Validator,
    compressor: Compressor,
    optimizer: Optimizer,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CacheStore>, catalog: SchemaCatalog, limits: LifecycleLimits) -> Self {
        Self {
            compressor: Compressor::new(store.clone(), limits.clone()),
            validator: Validator::new(limits.clone()),
            optimizer: Optimizer::new(limits.clone()),
            migrator: Migrator::new(catalog),
            store,
            limits,
        }
    }

    /// Manager over the maritime catalog with default limits.
    pub fn with_defaults(store: Arc<dyn CacheStore>) -> Self {
        Self::new(store, SchemaCatalog::maritime(), LifecycleLimits::default())
    }

    pub fn compressor(&self) -> &Compressor {
        &self.compressor
    }

    pub async fn save(
        &self,
        conversation_id: &str,
        state: &ComputationState,
        purpose: CheckpointPurpose,
    ) -> MeridianResult<CheckpointReceipt> {
        let schema = self.migrator.catalog().latest()?;
        let mut record = state.to_record()?;

        if purpose == CheckpointPurpose::Display {
            record = self.optimizer.optimize(record, schema).0;
        }
        let (mut record, compression) = self.compressor.compress(record).await?;

        let report = self.validator.validate_sizes(&record, schema);
        if report.has_record_level_error() || report.has_error_kind(IssueKind::CycleDetected) {
            warn!(
                conversation_id,
                errors = %report.summary(),
                "checkpoint blocked by validation"
            );
            return Err(MeridianError::Checkpoint {
                reason: report.summary(),
            });
        }
        let blocked_fields: Vec<String> = report
            .failing_fields()
            .into_iter()
            .map(str::to_string)
            .collect();
        for field in &blocked_fields {
            warn!(conversation_id, field = %field, "field withheld from checkpoint");
            record.remove(field);
        }

        let key = latest_key(conversation_id);
        let limit = self.limits.cache_timeout;
        let ttl = self.limits.checkpoint_ttl_secs;

        let previous = match bounded("get", limit, self.store.get(&key)).await? {
            Some(raw) => Some(parse_record(&raw)?),
            None => None,
        };
        let sequence = if previous.is_some() {
            self.delta_count(conversation_id).await? as u64 + 2
        } else {
            1
        };

        let written_delta = match &previous {
            Some(prev) => {
                let delta = StateDelta::between(prev, &record);
                let dkey = delta_key(conversation_id, sequence);
                bounded("set", limit, self.store.set(&dkey, serde_json::to_string(&delta)?, ttl))
                    .await?;
                debug!(
                    conversation_id,
                    sequence,
                    changed = delta.changed.len(),
                    removed = delta.removed.len(),
                    "checkpoint delta stored"
                );
                Some(dkey)
            }
            None => None,
        };

        let payload = serde_json::to_string(&record)?;
        let bytes = payload.len();
        bounded("set", limit, self.store.set(&key, payload, ttl)).await?;

        info!(
            conversation_id,
            ?purpose,
            sequence,
            bytes,
            blocked = blocked_fields.len(),
            "checkpoint saved"
        );
        Ok(CheckpointReceipt {
            key,
            delta_key: written_delta,
            sequence,
            purpose,
            bytes,
            blocked_fields,
            compression,
        })
    }

    /// Load, migrate, decompress, and validate the latest checkpoint.
    ///
    /// `Ok(None)` when the conversation has no checkpoint.
    ///
    /// # Errors
    ///
    /// Migration failures and post-migration validation errors are fatal for
    /// this load and are returned, never swallowed.
    pub async fn load(&self, conversation_id: &str) -> MeridianResult<Option<LoadedCheckpoint>> {
        let key = latest_key(conversation_id);
        let Some(raw) = bounded("get", self.limits.cache_timeout, self.store.get(&key)).await? else {
            return Ok(None);
        };
        let record = parse_record(&raw)?;

        let (record, from) = self.migrator.upgrade(record)?;
        let schema = self.migrator.catalog().latest()?;
        let migrated = from != schema.version;

        let (record, decompression) = self.compressor.decompress(record).await?;

        let report = self.validator.validate(&record, schema);
        if !report.valid {
            warn!(conversation_id, errors = %report.summary(), "checkpoint failed validation on load");
            return Err(MeridianError::SchemaValidation {
                reason: report.summary(),
            });
        }

        let warnings = report.warnings.iter().map(|w| w.message.clone()).collect();
        let state = ComputationState::from_record(record)?;
        debug!(conversation_id, %from, migrated, "checkpoint loaded");
        Ok(Some(LoadedCheckpoint {
            state,
            stored_version: from.to_string(),
            migrated,
            decompression,
            warnings,
        }))
    }

    /// Deltas stored for a conversation, oldest first.
    pub async fn deltas(&self, conversation_id: &str) -> MeridianResult<Vec<StateDelta>> {
        let limit = self.limits.cache_timeout;
        let mut keyed: Vec<(u64, String)> = bounded(
            "keys",
            limit,
            self.store.keys(&format!("checkpoint:{conversation_id}:delta:*")),
        )
        .await?
        .into_iter()
        .filter_map(|k| {
            let n = k.rsplit(':').next()?.parse::<u64>().ok()?;
            Some((n, k))
        })
        .collect();
        keyed.sort();

        let mut deltas = Vec::with_capacity(keyed.len());
        for (_, key) in keyed {
            if let Some(raw) = bounded("get", limit, self.store.get(&key)).await? {
                deltas.push(serde_json::from_str(&raw)?);
            }
        }
        Ok(deltas)
    }

    /// Delete every checkpoint key of a conversation. Returns the number removed.
    pub async fn cleanup(&self, conversation_id: &str) -> MeridianResult<usize> {
        let limit = self.limits.cache_timeout;
        let keys = bounded("keys", limit, self.store.keys(&conversation_pattern(conversation_id))).await?;
        let mut removed = 0;
        for key in keys {
            if bounded("del", limit, self.store.del(&key)).await? {
                removed += 1;
            }
        }
        info!(conversation_id, removed, "checkpoints cleaned up");
        Ok(removed)
    }

    async fn delta_count(&self, conversation_id: &str) -> MeridianResult<usize> {
        let pattern = format!("checkpoint:{conversation_id}:delta:*");
        Ok(bounded("keys", self.limits.cache_timeout, self.store.keys(&pattern))
            .await?
            .len())
    }
}

fn parse_record(raw: &str) -> MeridianResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(MeridianError::Checkpoint {
            reason: "checkpoint record is not a JSON object".to_string(),
        }),
    }
}
