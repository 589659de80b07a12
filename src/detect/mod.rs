//! Rule compilation and matching on sticky buffers
//!
//! This module provides:
//! - Rule compilation with setup-time literal canonicalization
//! - Per-transaction inspection producing alert events

pub mod engine;
pub mod rule;

pub use engine::DetectEngine;
pub use rule::{
    BufferCondition, CompileReport, CompiledRule, ContentSpec, RejectedRule, RuleCompiler,
    RuleError, RuleSpec,
};
