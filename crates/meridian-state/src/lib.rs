//! # meridian-state
//!
//! The state lifecycle manager. Four composable passes over a state record:
//!
//! - `Validator`: schema conformance, sizes, nesting
//! - `Migrator`: version detection and additive upgrade
//! - `Compressor`: content-addressed reference compression and its inverse
//! - `Optimizer`: lossy reduction for display checkpoints
//!
//! `CheckpointManager` composes them into the checkpoint write and read
//! paths over any `CacheStore`; `InMemoryCacheStore` is the reference store.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let store = Arc::new(InMemoryCacheStore::new());
//! let checkpoints = CheckpointManager::with_defaults(store);
//! checkpoints.save("conv-1", &state, CheckpointPurpose::Resume).await?;
//! let restored = checkpoints.load("conv-1").await?;
//! ```

pub mod catalog;
pub mod checkpoint;
pub mod compress;
pub mod delta;
pub mod limits;
pub mod memory;
pub mod migrate;
pub mod optimize;
pub mod shape;
pub mod validate;

pub use catalog::SchemaCatalog;
pub use checkpoint::{CheckpointManager, CheckpointPurpose, CheckpointReceipt, LoadedCheckpoint};
pub use compress::{CompressionStats, Compressor, DecompressionStats};
pub use delta::StateDelta;
pub use limits::LifecycleLimits;
pub use memory::InMemoryCacheStore;
pub use migrate::Migrator;
pub use optimize::{OptimizationStats, Optimizer};
pub use validate::Validator;

// ── Tests ─────────────────────────────────────────────────────────────────────
