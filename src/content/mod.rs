//! Literal content for sticky buffers
//!
//! This module provides:
//! - Compiled single-pattern search structures
//! - Literal patterns bound to a buffer type
//! - Setup-time canonicalization and validation of those literals

pub mod canonical;
pub mod literal;
pub mod search;

pub use canonical::{
    canonicalize, CanonicalizeReport, Canonicalizer, SetupError, ValidationError, Validator,
};
pub use literal::LiteralPattern;
pub use search::{SearchBuildError, SearchCtx, SearchParams, SpmAlgorithm};
