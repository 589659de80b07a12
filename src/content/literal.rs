//! Literal content bound to a sticky buffer

use std::sync::Arc;

use super::search::{SearchBuildError, SearchCtx, SearchParams};
use crate::buffers::BufferId;

/// A literal pattern and its compiled matcher, bound to one buffer type
///
/// The pair lives in a single `SearchCtx` behind an `Arc`. Rewriting the
/// literal builds a complete new `SearchCtx` first and then replaces the
/// `Arc` in one assignment, so readers never see bytes and matcher disagree.
#[derive(Debug, Clone)]
pub struct LiteralPattern {
    buffer: BufferId,
    compiled: Arc<SearchCtx>,
}

impl LiteralPattern {
    /// Compile `content` for `buffer`
    pub fn new(
        buffer: BufferId,
        content: &[u8],
        params: SearchParams,
    ) -> Result<Self, SearchBuildError> {
        Ok(Self {
            buffer,
            compiled: Arc::new(SearchCtx::build(content, params)?),
        })
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// Current literal bytes
    pub fn bytes(&self) -> &[u8] {
        self.compiled.pattern()
    }

    pub fn nocase(&self) -> bool {
        self.compiled.params().nocase
    }

    /// Shared handle on the compiled matcher
    pub fn search(&self) -> &Arc<SearchCtx> {
        &self.compiled
    }

    pub fn is_match(&self, haystack: &[u8]) -> bool {
        self.compiled.is_match(haystack)
    }

    /// Replace the literal with `content`, rebuilt with the current parameters
    ///
    /// On error the existing pair is left untouched.
    pub fn rebuild(&mut self, content: &[u8]) -> Result<(), SearchBuildError> {
        let rebuilt = SearchCtx::build(content, self.compiled.params())?;
        self.compiled = Arc::new(rebuilt);
        Ok(())
    }
}
