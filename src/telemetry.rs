//! Structured detection events
//!
//! Events are serialized to one JSON line and emitted through `log`, so
//! whichever logger the host installs collects them.

use log::{info, warn};
use serde::Serialize;

use crate::protocols::{AppProto, Direction, TxId};

const EVENT_PREFIX: &str = "[STICKY-BUFFERS]";

/// A rule matched a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertEvent {
    pub sid: u32,
    pub msg: String,
    pub tx_id: TxId,
    pub protocol: AppProto,
    pub direction: Direction,
    /// Sticky buffers the rule matched on
    pub buffers: Vec<MatchedBuffer>,
}

/// A buffer a rule matched on, and the instance for multi-instance buffers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedBuffer {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<u32>,
}

/// A rule failed to compile
#[derive(Debug, Clone, Serialize)]
pub struct RuleRejectedEvent {
    pub sid: u32,
    pub reason: String,
}

impl AlertEvent {
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(json) => info!("{} alert {}", EVENT_PREFIX, json),
            Err(e) => warn!("Failed to serialize alert event: {}", e),
        }
    }
}

impl RuleRejectedEvent {
    pub fn new(sid: u32, reason: &str) -> Self {
        Self {
            sid,
            reason: reason.to_string(),
        }
    }

    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(json) => warn!("{} rule_rejected {}", EVENT_PREFIX, json),
            Err(e) => warn!("Failed to serialize rule rejection: {}", e),
        }
    }
}
