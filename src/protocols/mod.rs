//! Decoded transaction state handed over by the protocol decoders
//!
//! Parsing lives elsewhere. This module only describes the shape of
//! what the TLS and QUIC decoders produce per transaction:
//! - TLS: client JA3, server JA3S, SNI
//! - QUIC: client JA3, ordered CYU entries, user agent

pub mod quic;
pub mod tls;

use bitflags::bitflags;
use serde::Serialize;

pub use quic::{Cyu, QuicState};
pub use tls::{Ja3, TlsState};

/// Application layer protocol of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppProto {
    Tls,
    Quic,
}

/// Direction of the flow a buffer is inspected in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ToServer,
    ToClient,
}

bitflags! {
    /// Set of directions a buffer type can be inspected in
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DirectionMask: u8 {
        const TO_SERVER = 0b01;
        const TO_CLIENT = 0b10;
    }
}

impl DirectionMask {
    /// Check if the mask admits a direction
    pub fn allows(&self, direction: Direction) -> bool {
        self.contains(DirectionMask::from(direction))
    }
}

impl From<Direction> for DirectionMask {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::ToServer => DirectionMask::TO_SERVER,
            Direction::ToClient => DirectionMask::TO_CLIENT,
        }
    }
}

/// Transaction identity, unique within a worker's inspection cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TxId(pub u64);

/// Per-protocol decoded state
#[derive(Debug, Clone)]
pub enum AppState {
    Tls(TlsState),
    Quic(QuicState),
}

/// A decoded application layer transaction
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TxId,
    pub state: AppState,
}

impl Transaction {
    /// Wrap decoded TLS state
    pub fn tls(id: u64, state: TlsState) -> Self {
        Self {
            id: TxId(id),
            state: AppState::Tls(state),
        }
    }

    /// Wrap decoded QUIC state
    pub fn quic(id: u64, state: QuicState) -> Self {
        Self {
            id: TxId(id),
            state: AppState::Quic(state),
        }
    }

    pub fn protocol(&self) -> AppProto {
        match self.state {
            AppState::Tls(_) => AppProto::Tls,
            AppState::Quic(_) => AppProto::Quic,
        }
    }
}
