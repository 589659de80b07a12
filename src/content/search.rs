//! Single-pattern search structures
//!
//! A `SearchCtx` is the compiled form of one literal. It owns the exact
//! pattern bytes it was built from, so the bytes a rule shows and the bytes
//! the matcher searches for can never drift apart.
//!
//! Two algorithms are available:
//! - `Kmp`: byte-at-a-time automaton with a failure table, O(n + m)
//! - `Horspool`: bad-character skip table, sublinear on typical input
//!
//! With `nocase` both fold ASCII case on pattern and haystack.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Search algorithm selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpmAlgorithm {
    Kmp,
    #[default]
    Horspool,
}

/// Parameters a search structure is built with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchParams {
    /// Fold ASCII case when comparing
    pub nocase: bool,
    pub algorithm: SpmAlgorithm,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchBuildError {
    #[error("cannot build a search structure for an empty pattern")]
    EmptyPattern,
}

#[derive(Debug, Clone)]
enum Matcher {
    Kmp { failure: Vec<usize> },
    Horspool { skip: Box<[usize; 256]> },
}

/// Compiled single-pattern matcher
#[derive(Debug, Clone)]
pub struct SearchCtx {
    /// Pattern exactly as given
    pattern: Box<[u8]>,
    /// Pattern as compared (lowercased when nocase)
    needle: Box<[u8]>,
    params: SearchParams,
    matcher: Matcher,
}

#[inline]
fn fold(byte: u8, nocase: bool) -> u8 {
    if nocase {
        byte.to_ascii_lowercase()
    } else {
        byte
    }
}

impl SearchCtx {
    /// Build a matcher for `pattern`
    pub fn build(pattern: &[u8], params: SearchParams) -> Result<Self, SearchBuildError> {
        if pattern.is_empty() {
            return Err(SearchBuildError::EmptyPattern);
        }

        let needle: Box<[u8]> = pattern.iter().map(|&b| fold(b, params.nocase)).collect();

        let matcher = match params.algorithm {
            SpmAlgorithm::Kmp => Matcher::Kmp {
                failure: failure_table(&needle),
            },
            SpmAlgorithm::Horspool => Matcher::Horspool {
                skip: skip_table(&needle, params.nocase),
            },
        };

        Ok(Self {
            pattern: pattern.into(),
            needle,
            params,
            matcher,
        })
    }

    /// The exact bytes this matcher was built from
    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    pub fn params(&self) -> SearchParams {
        self.params
    }

    /// Offset of the first occurrence in `haystack`
    pub fn find(&self, haystack: &[u8]) -> Option<usize> {
        match &self.matcher {
            Matcher::Kmp { failure } => self.find_kmp(haystack, failure),
            Matcher::Horspool { skip } => self.find_horspool(haystack, skip),
        }
    }

    pub fn is_match(&self, haystack: &[u8]) -> bool {
        self.find(haystack).is_some()
    }

    fn find_kmp(&self, haystack: &[u8], failure: &[usize]) -> Option<usize> {
        let needle = &self.needle;
        let mut matched = 0;

        for (i, &byte) in haystack.iter().enumerate() {
            let byte = fold(byte, self.params.nocase);

            while matched > 0 && needle[matched] != byte {
                matched = failure[matched - 1];
            }
            if needle[matched] == byte {
                matched += 1;
            }
            if matched == needle.len() {
                return Some(i + 1 - matched);
            }
        }

        None
    }

    fn find_horspool(&self, haystack: &[u8], skip: &[usize; 256]) -> Option<usize> {
        let needle = &self.needle;
        let n = needle.len();
        let nocase = self.params.nocase;
        let mut pos = 0;

        while pos + n <= haystack.len() {
            let window = &haystack[pos..pos + n];
            if window
                .iter()
                .zip(needle.iter())
                .all(|(&h, &p)| fold(h, nocase) == p)
            {
                return Some(pos);
            }
            pos += skip[window[n - 1] as usize];
        }

        None
    }
}

/// Longest proper prefix that is also a suffix, for each prefix of `needle`
fn failure_table(needle: &[u8]) -> Vec<usize> {
    let mut failure = vec![0; needle.len()];
    let mut k = 0;

    for i in 1..needle.len() {
        while k > 0 && needle[i] != needle[k] {
            k = failure[k - 1];
        }
        if needle[i] == needle[k] {
            k += 1;
        }
        failure[i] = k;
    }

    failure
}

fn skip_table(needle: &[u8], nocase: bool) -> Box<[usize; 256]> {
    let n = needle.len();
    let mut skip = Box::new([n; 256]);

    for (i, &b) in needle[..n - 1].iter().enumerate() {
        let shift = n - 1 - i;
        skip[b as usize] = shift;
        if nocase {
            skip[b.to_ascii_uppercase() as usize] = shift;
        }
    }

    skip
}

#[cfg(test)]
mod tests {
    use super::*;

    fn both(nocase: bool) -> [SearchParams; 2] {
        [
            SearchParams {
                nocase,
                algorithm: SpmAlgorithm::Kmp,
            },
            SearchParams {
                nocase,
                algorithm: SpmAlgorithm::Horspool,
            },
        ]
    }

    #[test]
    fn test_simple_match() {
        for params in both(false) {
            let ctx = SearchCtx::build(b"test", params).unwrap();
            assert_eq!(ctx.find(b"this is a test"), Some(10));
            assert_eq!(ctx.find(b"test"), Some(0));
            assert!(!ctx.is_match(b"tes"));
        }
    }

    #[test]
    fn test_case_sensitive() {
        for params in both(false) {
            let ctx = SearchCtx::build(b"abc", params).unwrap();
            assert!(!ctx.is_match(b"xxABCxx"));
            assert!(ctx.is_match(b"xxabcxx"));
        }
    }

    #[test]
    fn test_case_insensitive() {
        for params in both(true) {
            let ctx = SearchCtx::build(b"TeSt", params).unwrap();
            assert_eq!(ctx.find(b"a TEST b"), Some(2));
            assert_eq!(ctx.pattern(), b"TeSt");
        }
    }

    #[test]
    fn test_partial_match_restart() {
        // "tes" then a mismatch, then the full pattern
        for params in both(false) {
            let ctx = SearchCtx::build(b"test", params).unwrap();
            assert_eq!(ctx.find(b"tesxtest"), Some(4));
        }
        for params in both(false) {
            let ctx = SearchCtx::build(b"aab", params).unwrap();
            assert_eq!(ctx.find(b"aaab"), Some(1));
        }
    }

    #[test]
    fn test_haystack_shorter_than_pattern() {
        for params in both(false) {
            let ctx = SearchCtx::build(b"longer", params).unwrap();
            assert_eq!(ctx.find(b"long"), None);
            assert_eq!(ctx.find(b""), None);
        }
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert_eq!(
            SearchCtx::build(b"", SearchParams::default()).unwrap_err(),
            SearchBuildError::EmptyPattern
        );
    }

    #[test]
    fn test_failure_table() {
        assert_eq!(failure_table(b"abab"), vec![0, 0, 1, 2]);
        assert_eq!(failure_table(b"aaa"), vec![0, 1, 2]);
    }
}
