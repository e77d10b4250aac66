use crate::behavior::InstanceBehavior;
use crate::error::{FleetError, FleetResult};
use crate::protocol::InstanceDescriptor;
use crate::session::SessionClient;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

/// Presentation-only overrides supplied by the persistence layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceOverrides {
    pub display_name: Option<String>,
    pub hidden: Option<bool>,
}

/// Read-only view of a handle for UI and persistence collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub instance_id: String,
    pub friendly_name: String,
    pub display_name: String,
    pub hidden: bool,
    pub capability_tag: String,
    pub behavior: String,
    pub running: bool,
    pub online: Option<bool>,
}

/// Last result of the lightweight status probe.
#[derive(Debug, Clone, PartialEq)]
pub struct LivenessStatus {
    pub online: bool,
    pub checked_at: SystemTime,
    pub detail: Option<Value>,
}

/// Outcome of a behavior-mapped operation.
#[derive(Debug, Clone, PartialEq)]
pub enum BehaviorResult {
    Sent(String),
    /// The instance's variant has no command for this action.
    Unsupported,
}

/// One managed instance: its latest descriptor, a session scoped to its API,
/// and the behavior chosen from its capability tag.
pub struct InstanceHandle {
    instance_id: String,
    descriptor: RwLock<Arc<InstanceDescriptor>>,
    session: SessionClient,
    behavior: Box<dyn InstanceBehavior>,
    overrides: RwLock<InstanceOverrides>,
    liveness: RwLock<Option<LivenessStatus>>,
}

impl InstanceHandle {
    pub fn new(
        descriptor: InstanceDescriptor,
        session: SessionClient,
        behavior: Box<dyn InstanceBehavior>,
    ) -> Self {
        Self {
            instance_id: descriptor.instance_id.clone(),
            descriptor: RwLock::new(Arc::new(descriptor)),
            session,
            behavior,
            overrides: RwLock::new(InstanceOverrides::default()),
            liveness: RwLock::new(None),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn descriptor(&self) -> Arc<InstanceDescriptor> {
        self.descriptor
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn session(&self) -> &SessionClient {
        &self.session
    }

    pub fn behavior(&self) -> &dyn InstanceBehavior {
        self.behavior.as_ref()
    }

    /// Replace the descriptor snapshot if the listing reports different
    /// fields. Returns true when something changed.
    pub(crate) fn refresh(&self, latest: &InstanceDescriptor) -> bool {
        let mut current = self.descriptor.write().unwrap_or_else(|e| e.into_inner());
        if **current == *latest {
            return false;
        }
        *current = Arc::new(latest.clone());
        true
    }

    pub fn overrides(&self) -> InstanceOverrides {
        self.overrides
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_overrides(&self, overrides: InstanceOverrides) {
        *self.overrides.write().unwrap_or_else(|e| e.into_inner()) = overrides;
    }

    /// Override, then remote display name, then friendly name.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.overrides().display_name.filter(|n| !n.is_empty()) {
            return name;
        }
        let descriptor = self.descriptor();
        descriptor
            .display_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| descriptor.friendly_name.clone())
    }

    pub fn is_hidden(&self) -> bool {
        self.overrides()
            .hidden
            .unwrap_or_else(|| self.descriptor().hidden)
    }

    pub fn liveness(&self) -> Option<LivenessStatus> {
        self.liveness
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn summary(&self) -> InstanceSummary {
        let descriptor = self.descriptor();
        InstanceSummary {
            instance_id: self.instance_id.clone(),
            friendly_name: descriptor.friendly_name.clone(),
            display_name: self.display_name(),
            hidden: self.is_hidden(),
            capability_tag: descriptor.capability_tag.clone(),
            behavior: self.behavior.name().to_string(),
            running: descriptor.running,
            online: self.liveness().map(|l| l.online),
        }
    }

    /// Best-effort status probe. Stopped instances are marked offline
    /// without a network call.
    pub async fn probe_liveness(&self) -> FleetResult<LivenessStatus> {
        let status = if self.descriptor().running {
            let detail = self.status().await?;
            LivenessStatus {
                online: true,
                checked_at: SystemTime::now(),
                detail: Some(detail),
            }
        } else {
            LivenessStatus {
                online: false,
                checked_at: SystemTime::now(),
                detail: None,
            }
        };
        *self.liveness.write().unwrap_or_else(|e| e.into_inner()) = Some(status.clone());
        Ok(status)
    }

    pub(crate) fn mark_unreachable(&self) {
        *self.liveness.write().unwrap_or_else(|e| e.into_inner()) = Some(LivenessStatus {
            online: false,
            checked_at: SystemTime::now(),
            detail: None,
        });
    }

    // ── lifecycle ──

    pub async fn start(&self) -> FleetResult<Value> {
        self.session.perform("Core/Start", json!({})).await
    }

    pub async fn stop(&self) -> FleetResult<Value> {
        self.session.perform("Core/Stop", json!({})).await
    }

    pub async fn restart(&self) -> FleetResult<Value> {
        self.session.perform("Core/Restart", json!({})).await
    }

    pub async fn kill(&self) -> FleetResult<Value> {
        self.session.perform("Core/Kill", json!({})).await
    }

    pub async fn status(&self) -> FleetResult<Value> {
        self.session.perform("Core/GetStatus", json!({})).await
    }

    // ── console ──

    pub async fn send_console(&self, text: &str) -> FleetResult<()> {
        let line = self.behavior.console_command(text);
        self.session
            .perform("Core/SendConsoleMessage", json!({ "message": line }))
            .await?;
        Ok(())
    }

    /// Pending console output and status updates since the last poll.
    pub async fn console_updates(&self) -> FleetResult<Value> {
        self.session.perform("Core/GetUpdates", json!({})).await
    }

    pub async fn broadcast(&self, message: &str) -> FleetResult<BehaviorResult> {
        let command = self.behavior.broadcast_command(message);
        self.send_mapped(command).await
    }

    pub async fn whitelist_add(&self, user: &str) -> FleetResult<BehaviorResult> {
        let command = self.behavior.whitelist_add_command(user);
        self.send_mapped(command).await
    }

    pub async fn whitelist_remove(&self, user: &str) -> FleetResult<BehaviorResult> {
        let command = self.behavior.whitelist_remove_command(user);
        self.send_mapped(command).await
    }

    async fn send_mapped(&self, command: Option<String>) -> FleetResult<BehaviorResult> {
        let Some(command) = command else {
            tracing::debug!(
                instance_id = %self.instance_id,
                behavior = self.behavior.name(),
                "action not supported by variant, skipping"
            );
            return Ok(BehaviorResult::Unsupported);
        };
        self.session
            .perform("Core/SendConsoleMessage", json!({ "message": command }))
            .await?;
        Ok(BehaviorResult::Sent(command))
    }

    // ── files ──

    pub async fn list_directory(&self, dir: &str) -> FleetResult<Value> {
        self.session
            .perform("FileManagerPlugin/GetDirectoryListing", json!({ "Dir": dir }))
            .await
    }

    /// Read up to `length` bytes of a file starting at `offset`.
    pub async fn read_file_chunk(
        &self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> FleetResult<Vec<u8>> {
        let payload = self
            .session
            .perform(
                "FileManagerPlugin/ReadFileChunk",
                json!({ "Filename": path, "Offset": offset, "ChunkSize": length }),
            )
            .await?;
        let encoded = payload
            .get("Base64Data")
            .and_then(Value::as_str)
            .or_else(|| payload.as_str())
            .ok_or_else(|| FleetError::Decode {
                endpoint: "FileManagerPlugin/ReadFileChunk".to_string(),
                message: "missing Base64Data".to_string(),
            })?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| FleetError::Decode {
                endpoint: "FileManagerPlugin/ReadFileChunk".to_string(),
                message: e.to_string(),
            })
    }

    /// Write a whole file in a single final chunk.
    pub async fn write_file(&self, path: &str, data: &[u8]) -> FleetResult<()> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        self.session
            .perform(
                "FileManagerPlugin/WriteFileChunk",
                json!({ "Filename": path, "Data": encoded, "Offset": 0, "FinalChunk": true }),
            )
            .await?;
        Ok(())
    }

    // ── roles ──

    pub async fn role_ids(&self) -> FleetResult<Value> {
        self.session.perform("Core/GetRoleIds", json!({})).await
    }

    pub async fn set_user_role(
        &self,
        user_id: &str,
        role_id: &str,
        member: bool,
    ) -> FleetResult<()> {
        self.session
            .perform(
                "Core/SetAMPUserRoleMembership",
                json!({ "UserId": user_id, "RoleId": role_id, "IsMember": member }),
            )
            .await?;
        Ok(())
    }

    // ── backups ──

    pub async fn take_backup(
        &self,
        title: &str,
        description: &str,
        sticky: bool,
    ) -> FleetResult<()> {
        self.session
            .perform(
                "LocalFileBackupPlugin/TakeBackup",
                json!({ "Title": title, "Description": description, "Sticky": sticky }),
            )
            .await?;
        Ok(())
    }

    pub async fn list_backups(&self) -> FleetResult<Value> {
        self.session
            .perform("LocalFileBackupPlugin/GetBackups", json!({}))
            .await
    }

    pub async fn restore_backup(&self, backup_id: &str, delete_existing: bool) -> FleetResult<()> {
        self.session
            .perform(
                "LocalFileBackupPlugin/RestoreBackup",
                json!({ "BackupId": backup_id, "DeleteExistingData": delete_existing }),
            )
            .await?;
        Ok(())
    }
}
