//! Transaction inspection against compiled rules

use std::sync::Arc;

use log::trace;

use super::rule::{CompiledRule, RejectedRule, RuleCompiler, RuleSpec};
use crate::buffers::{BufferRegistry, InspectionCache, TxBuffers};
use crate::config::EngineConfig;
use crate::protocols::{Direction, Transaction};
use crate::telemetry::{AlertEvent, MatchedBuffer};

/// Compiled rule set plus the registry it was compiled against
///
/// Immutable after construction; share it between workers behind an `Arc`.
#[derive(Debug)]
pub struct DetectEngine {
    registry: Arc<BufferRegistry>,
    config: EngineConfig,
    rules: Vec<CompiledRule>,
}

impl DetectEngine {
    /// Compile `specs` and build an engine from the rules that loaded
    pub fn compile(
        registry: Arc<BufferRegistry>,
        config: EngineConfig,
        specs: Vec<RuleSpec>,
    ) -> (Self, Vec<RejectedRule>) {
        let report = RuleCompiler::new(&registry, &config).compile(specs);
        let engine = Self {
            registry,
            config,
            rules: report.rules,
        };
        (engine, report.rejected)
    }

    pub fn registry(&self) -> &BufferRegistry {
        &self.registry
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Slot tables for a worker, sized by the configured instance cap
    pub fn new_inspection_cache(&self) -> InspectionCache {
        InspectionCache::new(self.config.max_buffer_instances)
    }

    /// Run every rule against `tx`, filling `buffers` as needed
    pub fn inspect(
        &self,
        tx: &Transaction,
        buffers: &mut TxBuffers,
        direction: Direction,
    ) -> Vec<AlertEvent> {
        let mut alerts = Vec::new();

        for rule in &self.rules {
            if !rule.protocols().contains(&tx.protocol()) {
                continue;
            }
            if let Some(matched) = self.match_rule(rule, tx, buffers, direction) {
                let alert = AlertEvent {
                    sid: rule.sid(),
                    msg: rule.msg().to_string(),
                    tx_id: tx.id,
                    protocol: tx.protocol(),
                    direction,
                    buffers: matched,
                };
                if self.config.log_alerts {
                    alert.emit();
                }
                alerts.push(alert);
            }
        }

        alerts
    }

    fn match_rule(
        &self,
        rule: &CompiledRule,
        tx: &Transaction,
        buffers: &mut TxBuffers,
        direction: Direction,
    ) -> Option<Vec<MatchedBuffer>> {
        let mut matched = Vec::with_capacity(rule.conditions().len());

        for condition in rule.conditions() {
            let buffer = self.registry.get(condition.buffer())?;

            let instance = if buffer.is_multi_instance() {
                let index = buffers.find_instance(
                    &self.registry,
                    tx,
                    buffer.id(),
                    direction,
                    |_, bytes| condition.matches(bytes),
                )?;
                Some(index)
            } else {
                let bytes = buffers
                    .get_or_create(&self.registry, tx, buffer.id(), 0, direction)
                    .bytes()?;
                if !condition.matches(bytes) {
                    return None;
                }
                None
            };

            trace!("sid {}: {} matched", rule.sid(), buffer.name());
            matched.push(MatchedBuffer {
                name: buffer.name().to_string(),
                instance,
            });
        }

        Some(matched)
    }
}
