//! Sticky buffer materialization for protocol-aware detection
//!
//! Detection rules can target derived buffers: byte sequences computed from
//! decoded transaction state, such as a TLS client's JA3 digest or the
//! CYU fingerprints of a gQUIC client hello. This crate:
//! - registers buffer types once at startup into an immutable registry
//! - lazily extracts, transforms and memoizes buffers per transaction
//! - rewrites rule literals into each buffer's canonical form at setup time,
//!   rebuilding their search structures only when bytes changed
//!
//! Typical use:
//! 1. build a `BufferRegistry` (`buffers::builtin_registry`)
//! 2. compile rules into a `DetectEngine`
//! 3. per worker, keep an `InspectionCache` and call `DetectEngine::inspect`
//!    for each transaction, tearing its slots down when it completes

pub mod buffers;
pub mod config;
pub mod content;
pub mod detect;
pub mod protocols;
pub mod telemetry;

pub use buffers::{
    builtin_registry, BufferId, BufferRegistry, BufferView, InspectionCache, TxBuffers,
};
pub use config::{ConfigError, EngineConfig};
pub use content::{LiteralPattern, SearchCtx};
pub use detect::{ContentSpec, DetectEngine, RuleError, RuleSpec};
pub use protocols::{AppProto, Direction, Transaction, TxId};
