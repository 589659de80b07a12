//! Buffer type registry
//!
//! Buffer types are registered once at startup through a
//! `BufferRegistryBuilder`, then frozen into an immutable `BufferRegistry`
//! that the rule compiler and the matching workers share by reference.
//!
//! Lifecycle of a type: unregistered -> registered -> (setup callback
//! bound) -> active. Building the registry makes every type active; there
//! is no way back.

use std::collections::HashMap;
use std::fmt;

use log::debug;
use thiserror::Error;

use super::extract::Extract;
use super::transform::{Transform, TransformPipeline};
use crate::content::{Canonicalizer, Validator};
use crate::protocols::{AppProto, DirectionMask};

/// Index of a buffer type in its registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

impl BufferId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registry configuration errors. All of them are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("buffer type '{0}' is already registered")]
    DuplicateName(String),

    #[error("alias '{alias}' collides with registered buffer '{existing}'")]
    AliasCollision { alias: String, existing: String },

    #[error("unknown buffer type '{0}'")]
    UnknownName(String),
}

/// Registration state of a buffer type name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Registered,
    SetupBound,
    Active,
}

/// Definition of a buffer type, before registration
#[derive(Debug)]
pub struct BufferTypeDef {
    name: String,
    aliases: Vec<String>,
    description: String,
    protocols: Vec<AppProto>,
    directions: DirectionMask,
    multi_instance: bool,
    requires_ja3: bool,
    extractor: Box<dyn Extract>,
    transforms: TransformPipeline,
    canonicalizer: Option<Canonicalizer>,
    validator: Option<Validator>,
}

impl BufferTypeDef {
    /// Create a definition for all protocols, inspected in the directions
    /// the extractor serves
    pub fn new(name: &str, extractor: impl Extract + 'static) -> Self {
        let directions = extractor.directions();
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            description: String::new(),
            protocols: vec![AppProto::Tls, AppProto::Quic],
            directions,
            multi_instance: false,
            requires_ja3: false,
            extractor: Box::new(extractor),
            transforms: TransformPipeline::default(),
            canonicalizer: None,
            validator: None,
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Restrict to these owning protocols
    pub fn protocols(mut self, protocols: &[AppProto]) -> Self {
        self.protocols = protocols.to_vec();
        self
    }

    pub fn directions(mut self, directions: DirectionMask) -> Self {
        self.directions = directions;
        self
    }

    /// Allow several indexed occurrences per transaction
    pub fn multi_instance(mut self) -> Self {
        self.multi_instance = true;
        self
    }

    /// Mark as part of the JA3 family (subject to `ja3_enabled`)
    pub fn requires_ja3(mut self) -> Self {
        self.requires_ja3 = true;
        self
    }

    pub fn transforms(mut self, transforms: Vec<Transform>) -> Self {
        self.transforms = TransformPipeline::new(transforms);
        self
    }

    pub fn canonicalizer(mut self, canonicalizer: Canonicalizer) -> Self {
        self.canonicalizer = Some(canonicalizer);
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }
}

/// An active buffer type
#[derive(Debug)]
pub struct BufferType {
    id: BufferId,
    def: BufferTypeDef,
}

impl BufferType {
    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.def.aliases
    }

    pub fn description(&self) -> &str {
        &self.def.description
    }

    pub fn protocols(&self) -> &[AppProto] {
        &self.def.protocols
    }

    pub fn supports_protocol(&self, proto: AppProto) -> bool {
        self.def.protocols.contains(&proto)
    }

    pub fn directions(&self) -> DirectionMask {
        self.def.directions
    }

    pub fn is_multi_instance(&self) -> bool {
        self.def.multi_instance
    }

    pub fn requires_ja3(&self) -> bool {
        self.def.requires_ja3
    }

    pub fn extractor(&self) -> &dyn Extract {
        self.def.extractor.as_ref()
    }

    pub fn transforms(&self) -> &TransformPipeline {
        &self.def.transforms
    }

    pub fn canonicalizer(&self) -> Option<Canonicalizer> {
        self.def.canonicalizer
    }

    pub fn validator(&self) -> Option<Validator> {
        self.def.validator
    }
}

/// Collects buffer types during startup
#[derive(Debug, Default)]
pub struct BufferRegistryBuilder {
    types: Vec<(BufferTypeDef, RegistrationState)>,
    names: HashMap<String, BufferId>,
}

impl BufferRegistryBuilder {
    /// Register a new buffer type and its aliases
    pub fn register(&mut self, def: BufferTypeDef) -> Result<BufferId, RegistryError> {
        if self.names.contains_key(&def.name) {
            return Err(RegistryError::DuplicateName(def.name));
        }

        for (i, alias) in def.aliases.iter().enumerate() {
            if let Some(existing) = self.names.get(alias) {
                return Err(RegistryError::AliasCollision {
                    alias: alias.clone(),
                    existing: self.types[existing.index()].0.name.clone(),
                });
            }
            if *alias == def.name || def.aliases[..i].contains(alias) {
                return Err(RegistryError::AliasCollision {
                    alias: alias.clone(),
                    existing: def.name.clone(),
                });
            }
        }

        let id = BufferId(self.types.len() as u32);
        self.names.insert(def.name.clone(), id);
        for alias in &def.aliases {
            self.names.insert(alias.clone(), id);
        }

        debug!(
            "registered buffer type {} {} (multi_instance: {}, transforms: [{}])",
            id,
            def.name,
            def.multi_instance,
            def.transforms.describe()
        );

        self.types.push((def, RegistrationState::Registered));
        Ok(id)
    }

    /// Attach a canonicalization callback to a registered type
    pub fn set_setup_callback(
        &mut self,
        name: &str,
        canonicalizer: Canonicalizer,
    ) -> Result<(), RegistryError> {
        let entry = self.entry_mut(name)?;
        entry.0.canonicalizer = Some(canonicalizer);
        entry.1 = RegistrationState::SetupBound;
        Ok(())
    }

    /// Attach a validation callback to a registered type
    pub fn set_validate_callback(
        &mut self,
        name: &str,
        validator: Validator,
    ) -> Result<(), RegistryError> {
        let entry = self.entry_mut(name)?;
        entry.0.validator = Some(validator);
        entry.1 = RegistrationState::SetupBound;
        Ok(())
    }

    pub fn state(&self, name: &str) -> RegistrationState {
        match self.names.get(name) {
            Some(id) => self.types[id.index()].1,
            None => RegistrationState::Unregistered,
        }
    }

    fn entry_mut(
        &mut self,
        name: &str,
    ) -> Result<&mut (BufferTypeDef, RegistrationState), RegistryError> {
        let id = *self
            .names
            .get(name)
            .ok_or_else(|| RegistryError::UnknownName(name.to_string()))?;
        Ok(&mut self.types[id.index()])
    }

    /// Freeze the registry; every type becomes active
    pub fn build(self) -> BufferRegistry {
        let types = self
            .types
            .into_iter()
            .enumerate()
            .map(|(i, (def, _))| BufferType {
                id: BufferId(i as u32),
                def,
            })
            .collect();

        BufferRegistry {
            types,
            names: self.names,
        }
    }
}

/// Immutable, shareable table of active buffer types
#[derive(Debug)]
pub struct BufferRegistry {
    types: Vec<BufferType>,
    names: HashMap<String, BufferId>,
}

impl BufferRegistry {
    pub fn builder() -> BufferRegistryBuilder {
        BufferRegistryBuilder::default()
    }

    /// Resolve a buffer name or alias
    pub fn lookup(&self, name: &str) -> Result<BufferId, RegistryError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| RegistryError::UnknownName(name.to_string()))
    }

    pub fn get(&self, id: BufferId) -> Option<&BufferType> {
        self.types.get(id.index())
    }

    pub fn get_by_name(&self, name: &str) -> Option<&BufferType> {
        self.names.get(name).and_then(|id| self.get(*id))
    }

    pub fn state(&self, name: &str) -> RegistrationState {
        if self.names.contains_key(name) {
            RegistrationState::Active
        } else {
            RegistrationState::Unregistered
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
