//! Derived buffers
//!
//! This module provides:
//! - Buffer type registration and lookup
//! - Extraction from TLS/QUIC transaction state
//! - Transform pipelines
//! - The per-transaction materialization cache

pub mod builtin;
pub mod cache;
pub mod extract;
pub mod registry;
pub mod transform;

pub use builtin::{builtin_registry, register_builtin};
pub use cache::{
    BufferSlot, BufferView, InspectionCache, SlotState, TxBuffers, DEFAULT_MAX_INSTANCES,
};
pub use extract::{Extract, Extractor};
pub use registry::{
    BufferId, BufferRegistry, BufferRegistryBuilder, BufferType, BufferTypeDef,
    RegistrationState, RegistryError,
};
pub use transform::{Transform, TransformPipeline};
