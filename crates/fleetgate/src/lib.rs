pub mod behavior;
pub mod config;
pub mod context;
pub mod error;
pub mod handle;
pub mod protocol;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod totp;

pub use behavior::{BehaviorRegistry, GenericBehavior, InstanceBehavior, Variant, VariantLoader};
pub use context::FleetContext;
pub use error::{FleetError, FleetResult};
pub use handle::{BehaviorResult, InstanceHandle, InstanceOverrides, InstanceSummary};
pub use protocol::{CallOutcome, InstanceDescriptor};
pub use registry::{InstanceRegistry, ReconcileOutcome, ReconcileReport};
pub use scheduler::{FleetPoller, PollingScheduler, SchedulerState};
pub use session::{Credentials, SessionClient, SessionFactory};
