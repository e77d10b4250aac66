use crate::sanitize_argument;
use fleetgate::{FleetResult, InstanceBehavior, InstanceDescriptor, Variant};

/// Palworld has no console allow-list; only broadcasts are mapped.
pub struct Palworld;

impl InstanceBehavior for Palworld {
    fn name(&self) -> &'static str {
        "palworld"
    }

    fn broadcast_command(&self, message: &str) -> Option<String> {
        // The server splits broadcast arguments on spaces.
        Some(format!(
            "Broadcast {}",
            sanitize_argument(message).replace(' ', "_")
        ))
    }

    fn whitelist_add_command(&self, _user: &str) -> Option<String> {
        None
    }

    fn whitelist_remove_command(&self, _user: &str) -> Option<String> {
        None
    }
}

fn construct(_descriptor: &InstanceDescriptor) -> Box<dyn InstanceBehavior> {
    Box::new(Palworld)
}

pub fn variant() -> FleetResult<Variant> {
    Ok(Variant {
        name: "palworld",
        tags: vec!["steam:2394010".to_string()],
        construct,
    })
}
