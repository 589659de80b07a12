//! Rule compilation against the buffer registry
//!
//! Rules arrive already parsed as `RuleSpec`s: a sid, a message and a list
//! of literal contents, each naming the sticky buffer it applies to.
//! Compilation resolves buffer names, checks protocol compatibility, builds
//! the literal matchers and finally runs the canonicalization pass once per
//! buffer type over every literal bound to it. A failing rule is reported
//! and dropped; the rest of the set still loads.

use log::{debug, info};
use serde::Deserialize;
use thiserror::Error;

use crate::buffers::{BufferId, BufferRegistry, RegistryError};
use crate::config::EngineConfig;
use crate::content::{canonicalize, LiteralPattern, SearchBuildError, SearchParams, SetupError};
use crate::protocols::AppProto;
use crate::telemetry::RuleRejectedEvent;

/// A literal content and the sticky buffer it applies to
#[derive(Debug, Clone, Deserialize)]
pub struct ContentSpec {
    pub buffer: String,
    pub content: String,
    #[serde(default)]
    pub nocase: bool,
}

impl ContentSpec {
    pub fn new(buffer: &str, content: &str) -> Self {
        Self {
            buffer: buffer.to_string(),
            content: content.to_string(),
            nocase: false,
        }
    }

    pub fn nocase(mut self) -> Self {
        self.nocase = true;
        self
    }
}

/// A parsed rule
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSpec {
    pub sid: u32,
    #[serde(default)]
    pub msg: String,
    pub contents: Vec<ContentSpec>,
}

impl RuleSpec {
    pub fn new(sid: u32, msg: &str) -> Self {
        Self {
            sid,
            msg: msg.to_string(),
            contents: Vec::new(),
        }
    }

    pub fn content(mut self, content: ContentSpec) -> Self {
        self.contents.push(content);
        self
    }
}

/// Reasons a rule fails to compile
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error(transparent)]
    UnknownBuffer(#[from] RegistryError),

    #[error("rule contains conflicting protocols")]
    ConflictingProtocols,

    #[error("{0} requires ja3 support, which is not enabled")]
    Ja3Disabled(String),

    #[error("rule has no content")]
    EmptyRule,

    #[error("empty content for {buffer}: {source}")]
    EmptyContent {
        buffer: String,
        source: SearchBuildError,
    },

    #[error("{buffer}: {source}")]
    Setup { buffer: String, source: SetupError },
}

/// All literals of a rule bound to one buffer type
#[derive(Debug, Clone)]
pub struct BufferCondition {
    buffer: BufferId,
    literals: Vec<LiteralPattern>,
}

impl BufferCondition {
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    pub fn literals(&self) -> &[LiteralPattern] {
        &self.literals
    }

    /// Every literal occurs in `haystack`
    pub fn matches(&self, haystack: &[u8]) -> bool {
        self.literals.iter().all(|l| l.is_match(haystack))
    }
}

/// A rule ready for matching
#[derive(Debug, Clone)]
pub struct CompiledRule {
    sid: u32,
    msg: String,
    protocols: Vec<AppProto>,
    conditions: Vec<BufferCondition>,
}

impl CompiledRule {
    pub fn sid(&self) -> u32 {
        self.sid
    }

    pub fn msg(&self) -> &str {
        &self.msg
    }

    pub fn protocols(&self) -> &[AppProto] {
        &self.protocols
    }

    pub fn conditions(&self) -> &[BufferCondition] {
        &self.conditions
    }
}

/// A rule that failed to compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRule {
    pub sid: u32,
    pub error: RuleError,
}

/// Result of compiling a rule set
#[derive(Debug, Default)]
pub struct CompileReport {
    pub rules: Vec<CompiledRule>,
    pub rejected: Vec<RejectedRule>,
    /// Literals rebuilt by canonicalization
    pub rebuilt: usize,
}

/// Compiles rule specs against a registry
pub struct RuleCompiler<'a> {
    registry: &'a BufferRegistry,
    config: &'a EngineConfig,
}

impl<'a> RuleCompiler<'a> {
    pub fn new(registry: &'a BufferRegistry, config: &'a EngineConfig) -> Self {
        Self { registry, config }
    }

    /// Compile a rule set; failing rules are reported, not fatal
    pub fn compile(&self, specs: Vec<RuleSpec>) -> CompileReport {
        let mut report = CompileReport::default();
        let mut pending: Vec<CompiledRule> = Vec::with_capacity(specs.len());

        for spec in specs {
            match self.prepare(&spec) {
                Ok(rule) => pending.push(rule),
                Err(error) => report.rejected.push(reject(spec.sid, error)),
            }
        }

        let mut errors: Vec<Option<RuleError>> = vec![None; pending.len()];

        for buffer in self.registry.iter() {
            if buffer.canonicalizer().is_none() && buffer.validator().is_none() {
                continue;
            }

            let mut owners = Vec::new();
            let mut literals: Vec<&mut LiteralPattern> = Vec::new();
            for (rule_idx, rule) in pending.iter_mut().enumerate() {
                if errors[rule_idx].is_some() {
                    continue;
                }
                for condition in rule.conditions.iter_mut() {
                    if condition.buffer != buffer.id() {
                        continue;
                    }
                    for literal in condition.literals.iter_mut() {
                        owners.push(rule_idx);
                        literals.push(literal);
                    }
                }
            }
            if literals.is_empty() {
                continue;
            }

            let result = canonicalize(buffer, &mut literals);
            report.rebuilt += result.rebuilt;
            for (position, source) in result.failures {
                let slot = &mut errors[owners[position]];
                if slot.is_none() {
                    *slot = Some(RuleError::Setup {
                        buffer: buffer.name().to_string(),
                        source,
                    });
                }
            }
        }

        for (rule, error) in pending.into_iter().zip(errors) {
            match error {
                Some(error) => report.rejected.push(reject(rule.sid, error)),
                None => report.rules.push(rule),
            }
        }

        info!(
            "{} rules compiled, {} rejected, {} literals canonicalized",
            report.rules.len(),
            report.rejected.len(),
            report.rebuilt
        );

        report
    }

    /// Resolve and build a single rule, before canonicalization
    fn prepare(&self, spec: &RuleSpec) -> Result<CompiledRule, RuleError> {
        if spec.contents.is_empty() {
            return Err(RuleError::EmptyRule);
        }

        let mut protocols = vec![AppProto::Tls, AppProto::Quic];
        let mut conditions: Vec<BufferCondition> = Vec::new();

        for content in &spec.contents {
            let id = self.registry.lookup(&content.buffer)?;
            let buffer = self
                .registry
                .get(id)
                .ok_or_else(|| RegistryError::UnknownName(content.buffer.clone()))?;

            if buffer.requires_ja3() && !self.config.ja3_enabled {
                return Err(RuleError::Ja3Disabled(buffer.name().to_string()));
            }

            protocols.retain(|p| buffer.supports_protocol(*p));
            if protocols.is_empty() {
                return Err(RuleError::ConflictingProtocols);
            }

            let params = SearchParams {
                nocase: content.nocase,
                algorithm: self.config.spm_algorithm,
            };
            let literal = LiteralPattern::new(id, content.content.as_bytes(), params).map_err(
                |source| RuleError::EmptyContent {
                    buffer: buffer.name().to_string(),
                    source,
                },
            )?;

            match conditions.iter_mut().find(|c| c.buffer == id) {
                Some(condition) => condition.literals.push(literal),
                None => conditions.push(BufferCondition {
                    buffer: id,
                    literals: vec![literal],
                }),
            }
        }

        debug!(
            "sid {}: {} buffer condition(s), protocols {:?}",
            spec.sid,
            conditions.len(),
            protocols
        );

        Ok(CompiledRule {
            sid: spec.sid,
            msg: spec.msg.clone(),
            protocols,
            conditions,
        })
    }
}

fn reject(sid: u32, error: RuleError) -> RejectedRule {
    RuleRejectedEvent::new(sid, &error.to_string()).emit();
    RejectedRule { sid, error }
}
