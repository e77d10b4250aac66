//! Built-in behavior variants, registered at startup from a fixed table.

pub mod minecraft;
pub mod palworld;
pub mod seven_days;

use fleetgate::{BehaviorRegistry, VariantLoader};

/// Every variant shipped with fleetgate, in registration order.
pub const BUILTIN_VARIANTS: &[VariantLoader] = &[
    minecraft::variant,
    palworld::variant,
    seven_days::variant,
];

/// Registry with all built-in variants plus the generic fallback.
pub fn builtin_registry() -> BehaviorRegistry {
    BehaviorRegistry::from_loaders(BUILTIN_VARIANTS)
}

/// Strip characters that would let a player name smuggle extra console input.
pub(crate) fn sanitize_argument(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetgate::InstanceDescriptor;

    fn descriptor(tag: &str) -> InstanceDescriptor {
        InstanceDescriptor {
            instance_id: "i-1".to_string(),
            module_kind: "GenericModule".to_string(),
            capability_tag: tag.to_string(),
            friendly_name: "Test".to_string(),
            display_name: None,
            target_name: None,
            hidden: false,
            admin_asset: None,
            running: true,
        }
    }

    #[test]
    fn builtin_tags_do_not_collide() {
        let registry = builtin_registry();
        let declared: usize = BUILTIN_VARIANTS
            .iter()
            .map(|load| load().unwrap().tags.len())
            .sum();
        assert_eq!(registry.len(), declared);
    }

    #[test]
    fn dispatch_by_tag() {
        let registry = builtin_registry();
        assert_eq!(
            registry.behavior_for(&descriptor("internal:MinecraftJava")).name(),
            "minecraft"
        );
        assert_eq!(
            registry.behavior_for(&descriptor("steam:2394010")).name(),
            "palworld"
        );
        assert_eq!(
            registry.behavior_for(&descriptor("steam:294420")).name(),
            "seven-days"
        );
        assert_eq!(registry.behavior_for(&descriptor("steam:0")).name(), "generic");
    }

    #[test]
    fn sanitize_drops_control_characters() {
        assert_eq!(sanitize_argument(" steve\nop steve "), "steveop steve");
    }
}
