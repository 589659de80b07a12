//! Literal canonicalization and validation
//!
//! Some buffers have a fixed comparison form: a JA3 digest is lowercase
//! hex no matter how a rule writer typed it. At setup time every literal
//! bound to such a buffer is rewritten into that form, and its matcher is
//! rebuilt, but only when a byte actually changed.

use log::{debug, warn};
use thiserror::Error;

use super::literal::LiteralPattern;
use super::search::SearchBuildError;
use crate::buffers::BufferType;

/// Length of an MD5 digest in hex
pub const MD5_HEX_LEN: usize = 32;

/// Canonical form of a buffer's literals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Canonicalizer {
    /// Fold ASCII uppercase to lowercase
    AsciiLowercase,
}

impl Canonicalizer {
    /// Canonical bytes for `bytes`, or `None` when already canonical
    pub fn canonicalize(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        match self {
            Canonicalizer::AsciiLowercase => {
                if bytes.iter().any(u8::is_ascii_uppercase) {
                    Some(bytes.to_ascii_lowercase())
                } else {
                    None
                }
            }
        }
    }
}

/// Content constraints of a buffer type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validator {
    /// Exactly 32 hex digits
    Md5Hex,
    /// Exactly this many bytes
    FixedLength(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid content length {actual} for {buffer}, expected {expected}; this rule would never match")]
    WrongLength {
        buffer: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid content for {buffer}: byte 0x{byte:02x} at offset {offset} is not a hex digit")]
    NotHex {
        buffer: String,
        offset: usize,
        byte: u8,
    },
}

impl Validator {
    /// Check one literal against this constraint
    pub fn validate(&self, buffer: &str, literal: &LiteralPattern) -> Result<(), ValidationError> {
        let bytes = literal.bytes();

        match self {
            Validator::Md5Hex => {
                if literal.nocase() {
                    warn!(
                        "{} should not be used together with nocase, since the rule is \
                         automatically lowercased anyway which makes nocase redundant",
                        buffer
                    );
                }
                check_length(buffer, bytes, MD5_HEX_LEN)?;
                if let Some((offset, &byte)) =
                    bytes.iter().enumerate().find(|(_, b)| !b.is_ascii_hexdigit())
                {
                    return Err(ValidationError::NotHex {
                        buffer: buffer.to_string(),
                        offset,
                        byte,
                    });
                }
                Ok(())
            }
            Validator::FixedLength(expected) => check_length(buffer, bytes, *expected),
        }
    }
}

fn check_length(buffer: &str, bytes: &[u8], expected: usize) -> Result<(), ValidationError> {
    if bytes.len() != expected {
        return Err(ValidationError::WrongLength {
            buffer: buffer.to_string(),
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Setup failure for a single literal; the owning rule must not load
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to rebuild search structure: {0}")]
    Rebuild(#[from] SearchBuildError),
}

/// Outcome of one canonicalization pass over a buffer type
#[derive(Debug, Default)]
pub struct CanonicalizeReport {
    /// Literals whose bytes changed and whose matcher was rebuilt
    pub rebuilt: usize,
    /// Failed literals, by position in the input slice
    pub failures: Vec<(usize, SetupError)>,
}

impl CanonicalizeReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Validate and canonicalize every literal bound to `buffer`
///
/// Literals bound to other buffer types are skipped. A literal that fails
/// keeps its previous, self-consistent matcher and is reported; callers
/// reject the rule that owns it.
pub fn canonicalize(buffer: &BufferType, literals: &mut [&mut LiteralPattern]) -> CanonicalizeReport {
    let mut report = CanonicalizeReport::default();

    for (position, literal) in literals.iter_mut().enumerate() {
        if literal.buffer() != buffer.id() {
            continue;
        }
        match canonicalize_one(buffer, literal) {
            Ok(true) => report.rebuilt += 1,
            Ok(false) => {}
            Err(e) => report.failures.push((position, e)),
        }
    }

    if report.rebuilt > 0 {
        debug!(
            "{}: rebuilt {} literal(s) in canonical form",
            buffer.name(),
            report.rebuilt
        );
    }

    report
}

fn canonicalize_one(buffer: &BufferType, literal: &mut LiteralPattern) -> Result<bool, SetupError> {
    if let Some(validator) = buffer.validator() {
        validator.validate(buffer.name(), literal)?;
    }

    let Some(canonicalizer) = buffer.canonicalizer() else {
        return Ok(false);
    };

    match canonicalizer.canonicalize(literal.bytes()) {
        Some(canonical) => {
            debug!(
                "{}: canonicalized {:?} -> {:?}",
                buffer.name(),
                String::from_utf8_lossy(literal.bytes()),
                String::from_utf8_lossy(&canonical)
            );
            literal.rebuild(&canonical)?;
            Ok(true)
        }
        None => Ok(false),
    }
}
