use crate::sanitize_argument;
use fleetgate::{FleetResult, InstanceBehavior, InstanceDescriptor, Variant};

pub struct SevenDays;

impl InstanceBehavior for SevenDays {
    fn name(&self) -> &'static str {
        "seven-days"
    }

    fn broadcast_command(&self, message: &str) -> Option<String> {
        let message = sanitize_argument(message).replace('"', "'");
        Some(format!("say \"{message}\""))
    }

    fn whitelist_add_command(&self, user: &str) -> Option<String> {
        Some(format!("whitelist add {} 0", sanitize_argument(user)))
    }

    fn whitelist_remove_command(&self, user: &str) -> Option<String> {
        Some(format!("whitelist remove {}", sanitize_argument(user)))
    }
}

fn construct(_descriptor: &InstanceDescriptor) -> Box<dyn InstanceBehavior> {
    Box::new(SevenDays)
}

pub fn variant() -> FleetResult<Variant> {
    Ok(Variant {
        name: "seven-days",
        tags: vec!["steam:294420".to_string(), "steam:251570".to_string()],
        construct,
    })
}
