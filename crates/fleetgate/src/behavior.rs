use crate::error::{FleetError, FleetResult};
use crate::handle::InstanceHandle;
use crate::protocol::InstanceDescriptor;
use crate::session::SessionFactory;
use std::collections::{HashMap, HashSet};

/// Game-specific behavior shared by every instance handle.
///
/// Implementations translate high-level actions into console commands. They
/// never perform I/O; the handle sends whatever they return.
pub trait InstanceBehavior: Send + Sync {
    /// Variant name, for logs and summaries.
    fn name(&self) -> &'static str;

    /// Console line to send for free-form console text.
    fn console_command(&self, text: &str) -> String {
        text.to_string()
    }

    /// Console command that broadcasts `message` to connected players.
    fn broadcast_command(&self, message: &str) -> Option<String>;

    /// Console command adding `user` to the allow-list.
    fn whitelist_add_command(&self, user: &str) -> Option<String>;

    /// Console command removing `user` from the allow-list.
    fn whitelist_remove_command(&self, user: &str) -> Option<String>;
}

/// Fallback for instances whose capability tag has no registered variant.
pub struct GenericBehavior;

impl InstanceBehavior for GenericBehavior {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn broadcast_command(&self, _message: &str) -> Option<String> {
        None
    }

    fn whitelist_add_command(&self, _user: &str) -> Option<String> {
        None
    }

    fn whitelist_remove_command(&self, _user: &str) -> Option<String> {
        None
    }
}

pub type BehaviorConstructor = fn(&InstanceDescriptor) -> Box<dyn InstanceBehavior>;

/// A behavior variant: the capability tags it governs and its constructor.
#[derive(Clone)]
pub struct Variant {
    pub name: &'static str,
    pub tags: Vec<String>,
    pub construct: BehaviorConstructor,
}

/// Fallible loader for one variant definition.
pub type VariantLoader = fn() -> FleetResult<Variant>;

fn generic_constructor(_descriptor: &InstanceDescriptor) -> Box<dyn InstanceBehavior> {
    Box::new(GenericBehavior)
}

/// Capability tag → behavior constructor. Populated at startup, read-only
/// afterwards.
pub struct BehaviorRegistry {
    constructors: HashMap<String, (&'static str, BehaviorConstructor)>,
}

impl Default for BehaviorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Build a registry from a static table of loaders. A loader that fails,
    /// or whose tags collide with an earlier variant, is logged and skipped.
    pub fn from_loaders(loaders: &[VariantLoader]) -> Self {
        let mut registry = Self::new();
        for loader in loaders {
            let loaded = loader().and_then(|variant| registry.register_variant(variant));
            if let Err(e) = loaded {
                tracing::warn!(err = %e, "skipping behavior variant");
            }
        }
        tracing::info!(tags = registry.len(), "behavior registry ready");
        registry
    }

    /// Register one constructor under one tag. Tags are unique.
    pub fn register(
        &mut self,
        tag: &str,
        name: &'static str,
        construct: BehaviorConstructor,
    ) -> FleetResult<()> {
        if tag.is_empty() {
            return Err(FleetError::VariantLoad {
                variant: name.to_string(),
                message: "empty capability tag".to_string(),
            });
        }
        if let Some((existing, _)) = self.constructors.get(tag) {
            return Err(FleetError::VariantLoad {
                variant: name.to_string(),
                message: format!("tag {tag} already registered by {existing}"),
            });
        }
        self.constructors.insert(tag.to_string(), (name, construct));
        Ok(())
    }

    /// Register every tag of a variant, or none of them.
    pub fn register_variant(&mut self, variant: Variant) -> FleetResult<()> {
        if variant.tags.is_empty() {
            return Err(FleetError::VariantLoad {
                variant: variant.name.to_string(),
                message: "no capability tags declared".to_string(),
            });
        }
        if variant.tags.iter().any(|tag| tag.is_empty()) {
            return Err(FleetError::VariantLoad {
                variant: variant.name.to_string(),
                message: "empty capability tag".to_string(),
            });
        }
        let distinct: HashSet<&str> = variant.tags.iter().map(String::as_str).collect();
        if distinct.len() != variant.tags.len() {
            return Err(FleetError::VariantLoad {
                variant: variant.name.to_string(),
                message: "capability tag declared more than once".to_string(),
            });
        }
        if let Some(taken) = variant
            .tags
            .iter()
            .find(|tag| self.constructors.contains_key(tag.as_str()))
        {
            return Err(FleetError::VariantLoad {
                variant: variant.name.to_string(),
                message: format!("tag {taken} already registered"),
            });
        }
        for tag in &variant.tags {
            self.register(tag, variant.name, variant.construct)?;
        }
        tracing::debug!(variant = variant.name, tags = ?variant.tags, "registered behavior variant");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Behavior for a descriptor, falling back to [`GenericBehavior`].
    pub fn behavior_for(&self, descriptor: &InstanceDescriptor) -> Box<dyn InstanceBehavior> {
        let construct = self
            .constructors
            .get(&descriptor.capability_tag)
            .map(|(_, c)| *c)
            .unwrap_or(generic_constructor);
        construct(descriptor)
    }

    /// Build a handle for a descriptor. Never fails and never touches the
    /// network.
    pub fn construct(
        &self,
        descriptor: &InstanceDescriptor,
        sessions: &SessionFactory,
    ) -> InstanceHandle {
        InstanceHandle::new(
            descriptor.clone(),
            sessions.for_instance(&descriptor.instance_id),
            self.behavior_for(descriptor),
        )
    }
}
