use crate::sanitize_argument;
use fleetgate::{FleetResult, InstanceBehavior, InstanceDescriptor, Variant};

const TAGS: &[&str] = &[
    "internal:MinecraftJava",
    "internal:MinecraftBedrock",
    "internal:MinecraftGeneric",
];

pub struct Minecraft {
    bedrock: bool,
}

impl InstanceBehavior for Minecraft {
    fn name(&self) -> &'static str {
        "minecraft"
    }

    fn broadcast_command(&self, message: &str) -> Option<String> {
        Some(format!("say {}", sanitize_argument(message)))
    }

    fn whitelist_add_command(&self, user: &str) -> Option<String> {
        let user = sanitize_argument(user);
        if self.bedrock {
            Some(format!("allowlist add \"{user}\""))
        } else {
            Some(format!("whitelist add {user}"))
        }
    }

    fn whitelist_remove_command(&self, user: &str) -> Option<String> {
        let user = sanitize_argument(user);
        if self.bedrock {
            Some(format!("allowlist remove \"{user}\""))
        } else {
            Some(format!("whitelist remove {user}"))
        }
    }
}

fn construct(descriptor: &InstanceDescriptor) -> Box<dyn InstanceBehavior> {
    Box::new(Minecraft {
        bedrock: descriptor.capability_tag.ends_with("Bedrock"),
    })
}

pub fn variant() -> FleetResult<Variant> {
    Ok(Variant {
        name: "minecraft",
        tags: TAGS.iter().map(|t| t.to_string()).collect(),
        construct,
    })
}
