//! Local registry of instance handles and the reconciliation pass that keeps
//! it in agreement with the controller's fleet listing.

use crate::behavior::BehaviorRegistry;
use crate::error::{FleetError, FleetResult};
use crate::handle::{InstanceHandle, InstanceOverrides, InstanceSummary};
use crate::protocol::InstanceDescriptor;
use crate::session::SessionFactory;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};

/// What one reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// First populated pass; nothing is retired.
    pub startup: bool,
    pub added: Vec<String>,
    pub retired: Vec<String>,
    /// Known handles whose descriptor snapshot changed.
    pub refreshed: Vec<String>,
    /// Known handles rebuilt because their capability tag changed.
    pub rebuilt: Vec<String>,
    pub excluded: Vec<String>,
}

impl ReconcileReport {
    /// True when registry membership changed.
    pub fn mutated(&self) -> bool {
        !(self.added.is_empty() && self.retired.is_empty() && self.rebuilt.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The listing was empty; the registry was left untouched.
    EmptyFleet,
    Applied(ReconcileReport),
}

/// instance id → handle. Handles are shared out as `Arc`s so operations in
/// flight keep working while a pass mutates the map.
pub struct InstanceRegistry {
    handles: RwLock<HashMap<String, Arc<InstanceHandle>>>,
    behaviors: Arc<BehaviorRegistry>,
    sessions: SessionFactory,
    initialized: AtomicBool,
    /// Serializes passes against each other.
    pass_lock: Mutex<()>,
}

impl InstanceRegistry {
    pub fn new(behaviors: Arc<BehaviorRegistry>, sessions: SessionFactory) -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
            behaviors,
            sessions,
            initialized: AtomicBool::new(false),
            pass_lock: Mutex::new(()),
        }
    }

    /// Bring the registry in line with `listing`.
    pub async fn reconcile(&self, listing: &[InstanceDescriptor]) -> ReconcileOutcome {
        let _pass = self.pass_lock.lock().await;

        if listing.is_empty() {
            tracing::warn!("controller reported no instances, leaving registry unchanged");
            return ReconcileOutcome::EmptyFleet;
        }

        let startup = !self.initialized.load(Ordering::Acquire);
        let mut report = ReconcileReport {
            startup,
            ..Default::default()
        };
        let mut available: HashSet<&str> = HashSet::new();

        let mut handles = self.handles.write().await;
        for descriptor in listing {
            if descriptor.is_excluded() {
                tracing::debug!(
                    instance_id = %descriptor.instance_id,
                    module = %descriptor.module_kind,
                    "excluding management instance"
                );
                report.excluded.push(descriptor.instance_id.clone());
                continue;
            }
            if !available.insert(descriptor.instance_id.as_str()) {
                tracing::warn!(instance_id = %descriptor.instance_id, "duplicate instance in listing");
                continue;
            }

            match handles.get(&descriptor.instance_id) {
                Some(existing)
                    if existing.descriptor().capability_tag == descriptor.capability_tag =>
                {
                    if existing.refresh(descriptor) {
                        report.refreshed.push(descriptor.instance_id.clone());
                    }
                }
                Some(existing) => {
                    let overrides = existing.overrides();
                    let handle = self.behaviors.construct(descriptor, &self.sessions);
                    handle.set_overrides(overrides);
                    tracing::info!(
                        instance_id = %descriptor.instance_id,
                        tag = %descriptor.capability_tag,
                        behavior = handle.behavior().name(),
                        "capability tag changed, rebuilt instance handle"
                    );
                    handles.insert(descriptor.instance_id.clone(), Arc::new(handle));
                    report.rebuilt.push(descriptor.instance_id.clone());
                }
                None => {
                    let handle = self.behaviors.construct(descriptor, &self.sessions);
                    if !startup {
                        tracing::info!(
                            instance_id = %descriptor.instance_id,
                            name = %descriptor.friendly_name,
                            behavior = handle.behavior().name(),
                            "discovered new instance"
                        );
                    }
                    handles.insert(descriptor.instance_id.clone(), Arc::new(handle));
                    report.added.push(descriptor.instance_id.clone());
                }
            }
        }

        if !startup {
            let stale: Vec<String> = handles
                .keys()
                .filter(|id| !available.contains(id.as_str()))
                .cloned()
                .collect();
            for id in stale {
                if let Some(handle) = handles.remove(&id) {
                    tracing::info!(
                        instance_id = %id,
                        name = %handle.descriptor().friendly_name,
                        "instance no longer listed, retired handle"
                    );
                }
                report.retired.push(id);
            }
        }
        drop(handles);

        if startup {
            self.initialized.store(true, Ordering::Release);
            tracing::info!(instances = report.added.len(), "initial fleet loaded");
        }
        ReconcileOutcome::Applied(report)
    }

    pub async fn get(&self, instance_id: &str) -> Option<Arc<InstanceHandle>> {
        self.handles.read().await.get(instance_id).cloned()
    }

    /// Look up by identifier or, case-insensitively, by any of the names.
    pub async fn find(&self, query: &str) -> Option<Arc<InstanceHandle>> {
        let handles = self.handles.read().await;
        if let Some(handle) = handles.get(query) {
            return Some(handle.clone());
        }
        handles
            .values()
            .find(|h| {
                let d = h.descriptor();
                h.display_name().eq_ignore_ascii_case(query)
                    || d.friendly_name.eq_ignore_ascii_case(query)
                    || d
                        .display_name
                        .as_deref()
                        .is_some_and(|n| n.eq_ignore_ascii_case(query))
            })
            .cloned()
    }

    pub async fn handles(&self) -> Vec<Arc<InstanceHandle>> {
        self.handles.read().await.values().cloned().collect()
    }

    /// Summaries sorted by display name.
    pub async fn summaries(&self) -> Vec<InstanceSummary> {
        let mut out: Vec<InstanceSummary> = self
            .handles
            .read()
            .await
            .values()
            .map(|h| h.summary())
            .collect();
        out.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        out
    }

    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.read().await.is_empty()
    }

    pub async fn contains(&self, instance_id: &str) -> bool {
        self.handles.read().await.contains_key(instance_id)
    }

    /// Apply presentation overrides. Membership is unaffected.
    pub async fn set_overrides(
        &self,
        instance_id: &str,
        overrides: InstanceOverrides,
    ) -> FleetResult<()> {
        let handle = self
            .get(instance_id)
            .await
            .ok_or_else(|| FleetError::UnknownInstance(instance_id.to_string()))?;
        handle.set_overrides(overrides);
        Ok(())
    }

    /// Probe every handle concurrently. One failure never affects the others.
    pub async fn probe_liveness(&self) {
        let handles = self.handles().await;
        let probes = handles.iter().map(|handle| async move {
            if let Err(e) = handle.probe_liveness().await {
                handle.mark_unreachable();
                tracing::debug!(instance_id = %handle.instance_id(), err = %e, "liveness probe failed");
            }
        });
        futures_util::future::join_all(probes).await;
    }
}
