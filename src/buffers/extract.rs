//! Extraction of derived buffers from transaction state
//!
//! An extractor maps (transaction, instance index, direction) to a borrowed
//! byte slice, or `None` when the protocol state does not carry the field.
//! Extractors must be idempotent: the cache memoizes their first answer.

use std::fmt::Debug;

use crate::protocols::{AppState, Direction, DirectionMask, Transaction};

/// Source of derived buffer bytes
pub trait Extract: Debug + Send + Sync {
    /// Borrow the bytes of occurrence `index`, or `None` if unavailable
    fn extract<'a>(&'a self, tx: &'a Transaction, index: u32, direction: Direction)
        -> Option<&'a [u8]>;

    /// Directions this extractor can yield bytes in
    fn directions(&self) -> DirectionMask {
        DirectionMask::all()
    }
}

/// Built-in extraction kinds for the TLS and QUIC decoders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    /// Client JA3 digest (TLS or QUIC)
    Ja3Hash,
    /// Client JA3 field string (TLS or QUIC)
    Ja3String,
    /// Server JA3S digest
    Ja3sHash,
    /// Server JA3S field string
    Ja3sString,
    /// TLS server name indication
    TlsSni,
    /// N-th QUIC CYU string
    QuicCyuString,
    /// N-th QUIC CYU digest
    QuicCyuHash,
    /// QUIC user agent id
    QuicUserAgent,
}

impl Extractor {
    /// Direction the field travels in
    pub fn direction(&self) -> Direction {
        match self {
            Extractor::Ja3sHash | Extractor::Ja3sString => Direction::ToClient,
            _ => Direction::ToServer,
        }
    }
}

impl Extract for Extractor {
    fn directions(&self) -> DirectionMask {
        DirectionMask::from(self.direction())
    }

    fn extract<'a>(
        &'a self,
        tx: &'a Transaction,
        index: u32,
        direction: Direction,
    ) -> Option<&'a [u8]> {
        if direction != self.direction() {
            return None;
        }

        match (self, &tx.state) {
            (Extractor::Ja3Hash, AppState::Tls(tls)) if index == 0 => {
                tls.ja3.as_ref().map(|j| j.hash.as_bytes())
            }
            (Extractor::Ja3Hash, AppState::Quic(quic)) if index == 0 => {
                quic.ja3.as_ref().map(|j| j.hash.as_bytes())
            }
            (Extractor::Ja3String, AppState::Tls(tls)) if index == 0 => {
                tls.ja3.as_ref().map(|j| j.string.as_bytes())
            }
            (Extractor::Ja3String, AppState::Quic(quic)) if index == 0 => {
                quic.ja3.as_ref().map(|j| j.string.as_bytes())
            }
            (Extractor::Ja3sHash, AppState::Tls(tls)) if index == 0 => {
                tls.ja3s.as_ref().map(|j| j.hash.as_bytes())
            }
            (Extractor::Ja3sString, AppState::Tls(tls)) if index == 0 => {
                tls.ja3s.as_ref().map(|j| j.string.as_bytes())
            }
            (Extractor::TlsSni, AppState::Tls(tls)) if index == 0 => {
                tls.sni.as_deref().map(str::as_bytes)
            }
            (Extractor::QuicCyuString, AppState::Quic(quic)) => {
                quic.cyu.get(index as usize).map(|c| c.string.as_slice())
            }
            (Extractor::QuicCyuHash, AppState::Quic(quic)) => {
                quic.cyu.get(index as usize).map(|c| c.hash.as_bytes())
            }
            (Extractor::QuicUserAgent, AppState::Quic(quic)) if index == 0 => quic.ua.as_deref(),
            _ => None,
        }
    }
}
