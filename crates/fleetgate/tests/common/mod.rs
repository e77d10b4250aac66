//! In-process mock of the control-plane HTTP API.

#![allow(dead_code)]

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use fleetgate::{Credentials, SessionFactory};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Default)]
pub struct PanelState {
    pub logins: AtomicUsize,
    pub reject_logins: AtomicBool,
    /// Deny every non-login call, even with a fresh token.
    pub deny_all: AtomicBool,
    pub totp_seed: Mutex<Option<String>>,
    pub valid_tokens: Mutex<HashSet<String>>,
    pub listing: Mutex<Value>,
    pub calls: Mutex<Vec<(String, Value)>>,
}

pub struct MockPanel {
    pub addr: SocketAddr,
    pub state: Arc<PanelState>,
    task: JoinHandle<()>,
}

impl MockPanel {
    pub async fn start() -> Self {
        let state = Arc::new(PanelState {
            listing: Mutex::new(json!([])),
            ..Default::default()
        });
        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state, task }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn sessions(&self) -> SessionFactory {
        SessionFactory::new(
            &self.base_url(),
            Credentials::new("admin", "hunter2"),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    pub fn set_listing(&self, listing: Value) {
        *self.state.listing.lock().unwrap() = listing;
    }

    /// Invalidate every issued session token.
    pub fn revoke_sessions(&self) {
        self.state.valid_tokens.lock().unwrap().clear();
    }

    pub fn logins(&self) -> usize {
        self.state.logins.load(Ordering::SeqCst)
    }

    /// Calls whose path ends with `suffix`, in order.
    pub fn calls_to(&self, suffix: &str) -> Vec<(String, Value)> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| path.ends_with(suffix))
            .cloned()
            .collect()
    }
}

impl Drop for MockPanel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(
    State(panel): State<Arc<PanelState>>,
    uri: Uri,
    body: String,
) -> (StatusCode, String) {
    let path = uri.path().to_string();
    let params: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    panel.calls.lock().unwrap().push((path.clone(), params.clone()));

    if path.ends_with("/Core/Login") {
        return login(&panel, &params);
    }

    let token = params.get("SESSIONID").and_then(Value::as_str).unwrap_or("");
    let authorized = !panel.deny_all.load(Ordering::SeqCst)
        && panel.valid_tokens.lock().unwrap().contains(token);
    if !authorized {
        return ok(json!({"Title": "Unauthorized Access", "Message": "session expired"}));
    }

    let endpoint = path.rsplit("/API/").next().unwrap_or("");
    match endpoint {
        "ADSModule/GetInstances" => {
            let listing = panel.listing.lock().unwrap().clone();
            ok(json!({ "result": listing }))
        }
        "Core/GetStatus" => ok(json!({"result": {"State": 20, "Uptime": "01:00:00"}})),
        "Core/Start" => ok(json!({"result": {"Status": true, "Reason": ""}})),
        "Core/Stop" => ok(json!({"result": {"Status": false, "Reason": "already stopped"}})),
        "Core/Restart" => (StatusCode::OK, String::new()),
        "Core/Kill" => (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()),
        "Core/SendConsoleMessage" => ok(json!({})),
        "FileManagerPlugin/ReadFileChunk" => ok(json!({"result": {"Base64Data": "aGVsbG8="}})),
        "LocalFileBackupPlugin/GetBackups" => ok(json!({"result": [{"Id": "b-1", "Name": "nightly"}]})),
        _ => ok(json!({"result": true})),
    }
}

fn login(panel: &PanelState, params: &Value) -> (StatusCode, String) {
    panel.logins.fetch_add(1, Ordering::SeqCst);
    if panel.reject_logins.load(Ordering::SeqCst) {
        return ok(json!({
            "success": false,
            "result": 7,
            "resultReason": "invalid username or password",
        }));
    }
    if let Some(seed) = panel.totp_seed.lock().unwrap().clone() {
        let code = params.get("token").and_then(Value::as_str).unwrap_or("");
        let totp = fleetgate::totp::totp_from_seed(&seed).unwrap();
        if !totp.check_current(code).unwrap_or(false) {
            return ok(json!({
                "success": false,
                "result": 15,
                "resultReason": "two-factor code required",
            }));
        }
    }
    let mut tokens = panel.valid_tokens.lock().unwrap();
    let token = format!("session-{}", panel.logins.load(Ordering::SeqCst));
    tokens.insert(token.clone());
    ok(json!({
        "success": true,
        "sessionID": token,
        "rememberMeToken": "",
        "result": 0,
        "resultReason": "",
    }))
}

fn ok(body: Value) -> (StatusCode, String) {
    (StatusCode::OK, body.to_string())
}

pub fn instance(id: &str, module: &str, tag: &str) -> Value {
    json!({
        "InstanceID": id,
        "Module": module,
        "DisplayImageSource": tag,
        "FriendlyName": format!("Server {id}"),
        "Running": true,
    })
}

pub fn target(name: &str, instances: Vec<Value>) -> Value {
    json!({ "FriendlyName": name, "AvailableInstances": instances })
}
