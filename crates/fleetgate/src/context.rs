use crate::behavior::{BehaviorRegistry, VariantLoader};
use crate::config::FleetConfig;
use crate::error::FleetResult;
use crate::protocol::{self, InstanceDescriptor, LIST_INSTANCES_ENDPOINT};
use crate::registry::{InstanceRegistry, ReconcileOutcome};
use crate::scheduler::FleetPoller;
use crate::session::{SessionClient, SessionFactory};
use serde_json::json;
use std::sync::Arc;

/// Everything the scheduler and command handlers need, built once at startup
/// and passed around explicitly.
pub struct FleetContext {
    sessions: SessionFactory,
    controller: SessionClient,
    behaviors: Arc<BehaviorRegistry>,
    registry: InstanceRegistry,
}

impl FleetContext {
    pub fn new(sessions: SessionFactory, behaviors: BehaviorRegistry) -> Arc<Self> {
        let behaviors = Arc::new(behaviors);
        Arc::new(Self {
            controller: sessions.controller(),
            registry: InstanceRegistry::new(behaviors.clone(), sessions.clone()),
            sessions,
            behaviors,
        })
    }

    pub fn from_config(config: &FleetConfig, variants: &[VariantLoader]) -> FleetResult<Arc<Self>> {
        let sessions = SessionFactory::from_config(&config.controller)?;
        Ok(Self::new(sessions, BehaviorRegistry::from_loaders(variants)))
    }

    pub fn sessions(&self) -> &SessionFactory {
        &self.sessions
    }

    pub fn controller(&self) -> &SessionClient {
        &self.controller
    }

    pub fn behaviors(&self) -> &BehaviorRegistry {
        &self.behaviors
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    /// Fetch the fleet listing from the controller.
    pub async fn fetch_listing(&self) -> FleetResult<Vec<InstanceDescriptor>> {
        let payload = self
            .controller
            .perform(LIST_INSTANCES_ENDPOINT, json!({}))
            .await?;
        protocol::parse_listing(&payload)
    }

    /// Fetch the listing and reconcile the registry against it.
    pub async fn sync_fleet(&self) -> FleetResult<ReconcileOutcome> {
        let listing = self.fetch_listing().await?;
        Ok(self.registry.reconcile(&listing).await)
    }
}

impl FleetPoller for FleetContext {
    async fn poll_once(&self) {
        self.registry.probe_liveness().await;
        match self.sync_fleet().await {
            Ok(ReconcileOutcome::Applied(report)) if report.mutated() => {
                tracing::info!(
                    added = report.added.len(),
                    retired = report.retired.len(),
                    rebuilt = report.rebuilt.len(),
                    "fleet reconciled"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(err = %e, "failed to reach controller listing, retrying next cycle");
            }
        }
    }
}
