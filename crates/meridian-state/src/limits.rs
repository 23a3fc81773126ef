//! Size and retention limits shared by every lifecycle pass.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleLimits {
    /// Referenceable fields at or below this serialized size stay inline.
    pub min_reference_bytes: usize,
    pub reference_ttl_secs: u64,
    pub checkpoint_ttl_secs: u64,
    /// Per-field warning threshold.
    pub field_soft_limit_bytes: usize,
    /// Per-field error threshold, unless the field declares its own `max_size`.
    pub field_hard_limit_bytes: usize,
    pub total_budget_bytes: usize,
    /// Nesting beyond this depth is treated as a reference cycle.
    pub max_nesting_depth: usize,
    pub array_head: usize,
    pub array_tail: usize,
    pub max_message_chars: usize,
    /// Bound on every cache store call.
    #[serde(with = "secs")]
    pub cache_timeout: Duration,
}

impl Default for LifecycleLimits {
    fn default() -> Self {
        Self {
            min_reference_bytes: 1024,
            reference_ttl_secs: 86_400,
            checkpoint_ttl_secs: 604_800,
            field_soft_limit_bytes: 100 * 1024,
            field_hard_limit_bytes: 1024 * 1024,
            total_budget_bytes: 5 * 1024 * 1024,
            max_nesting_depth: 64,
            array_head: 10,
            array_tail: 5,
            max_message_chars: 2000,
            cache_timeout: Duration::from_secs(5),
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
