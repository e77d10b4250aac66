use crate::error::{FleetError, FleetResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token value meaning "no authenticated session".
pub const UNAUTHENTICATED_TOKEN: &str = "0";

/// Parameter key under which the session token travels on every call.
pub const SESSION_KEY: &str = "SESSIONID";

/// `Module` value of the fleet-management role (the controller itself).
pub const MANAGEMENT_MODULE: &str = "ADS";

/// Marker expected in the administrative display asset of our own container.
pub const SELF_MARKER: &str = "fleetgate";

pub const LOGIN_ENDPOINT: &str = "Core/Login";
pub const LIST_INSTANCES_ENDPOINT: &str = "ADSModule/GetInstances";

const UNAUTHORIZED_TITLE: &str = "Unauthorized Access";

// ---------------------------------------------------------------------------
// Instance listing
// ---------------------------------------------------------------------------

/// One instance as reported by the controller's fleet listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    #[serde(rename = "InstanceID")]
    pub instance_id: String,
    #[serde(rename = "Module", default)]
    pub module_kind: String,
    #[serde(rename = "DisplayImageSource", default)]
    pub capability_tag: String,
    #[serde(rename = "FriendlyName", default)]
    pub friendly_name: String,
    #[serde(rename = "DisplayName", default)]
    pub display_name: Option<String>,
    #[serde(rename = "TargetName", default)]
    pub target_name: Option<String>,
    #[serde(rename = "Hidden", alias = "IsHidden", default)]
    pub hidden: bool,
    #[serde(rename = "AdminDisplayAsset", default)]
    pub admin_asset: Option<String>,
    #[serde(rename = "Running", default)]
    pub running: bool,
}

impl InstanceDescriptor {
    /// True for the controller role, which is never managed as an instance.
    pub fn is_management_role(&self) -> bool {
        self.module_kind.eq_ignore_ascii_case(MANAGEMENT_MODULE)
    }

    /// True when the descriptor looks like the container hosting this process.
    ///
    /// Substring match on the admin display asset. Any unrelated instance
    /// whose asset happens to contain the marker is excluded as well.
    pub fn is_self_hosted(&self) -> bool {
        self.admin_asset
            .as_deref()
            .is_some_and(|asset| asset.to_ascii_lowercase().contains(SELF_MARKER))
    }

    pub fn is_excluded(&self) -> bool {
        self.is_management_role() || self.is_self_hosted()
    }
}

/// Flatten a listing payload into descriptors.
///
/// The controller returns one entry per target, each carrying its
/// `AvailableInstances`; a flat array of instances is accepted too.
/// Entries that fail to decode are skipped.
pub fn parse_listing(payload: &Value) -> FleetResult<Vec<InstanceDescriptor>> {
    let entries = payload.as_array().ok_or_else(|| FleetError::Decode {
        endpoint: LIST_INSTANCES_ENDPOINT.to_string(),
        message: "instance listing is not an array".to_string(),
    })?;

    let mut out = Vec::new();
    for entry in entries {
        match entry.get("AvailableInstances").and_then(Value::as_array) {
            Some(instances) => {
                let target = entry
                    .get("FriendlyName")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                for raw in instances {
                    if let Some(mut descriptor) = decode_descriptor(raw) {
                        if descriptor.target_name.is_none() {
                            descriptor.target_name = target.clone();
                        }
                        out.push(descriptor);
                    }
                }
            }
            None => out.extend(decode_descriptor(entry)),
        }
    }
    Ok(out)
}

fn decode_descriptor(raw: &Value) -> Option<InstanceDescriptor> {
    match serde_json::from_value::<InstanceDescriptor>(raw.clone()) {
        Ok(d) => Some(d),
        Err(e) => {
            tracing::warn!(err = %e, "skipping undecodable instance descriptor");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Response classification
// ---------------------------------------------------------------------------

/// Uniform result of one control-plane call, decided once from the body shape.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Success(Value),
    BusinessFailure(String),
    Unauthorized,
}

/// Classify a raw HTTP response. Transport-level problems become errors;
/// everything else is decided by the shape of the decoded body.
pub fn classify_response(endpoint: &str, status: u16, body: &str) -> FleetResult<CallOutcome> {
    decode_response(endpoint, status, body).map(classify_value)
}

/// Decode a raw HTTP response into JSON without interpreting the envelope.
pub fn decode_response(endpoint: &str, status: u16, body: &str) -> FleetResult<Value> {
    if !(200..300).contains(&status) {
        return Err(FleetError::Status {
            endpoint: endpoint.to_string(),
            status,
        });
    }
    if body.trim().is_empty() {
        return Err(FleetError::EmptyBody {
            endpoint: endpoint.to_string(),
        });
    }
    serde_json::from_str(body).map_err(|e| FleetError::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

pub fn classify_value(value: Value) -> CallOutcome {
    if value.get("Title").and_then(Value::as_str) == Some(UNAUTHORIZED_TITLE) {
        return CallOutcome::Unauthorized;
    }
    if let Some(reason) = failure_reason(&value) {
        return CallOutcome::BusinessFailure(reason);
    }
    match value {
        Value::Object(mut map) => match map.remove("result") {
            Some(result) => {
                if let Some(reason) = failure_reason(&result) {
                    CallOutcome::BusinessFailure(reason)
                } else {
                    CallOutcome::Success(result)
                }
            }
            None => CallOutcome::Success(Value::Object(map)),
        },
        other => CallOutcome::Success(other),
    }
}

/// `false` or a `{Status: false, Reason: ..}` envelope.
fn failure_reason(value: &Value) -> Option<String> {
    match value {
        Value::Bool(false) => Some("remote returned false".to_string()),
        Value::Object(map) => {
            let status = lookup_ci(map, "status")?;
            if status.as_bool() != Some(false) {
                return None;
            }
            let reason = lookup_ci(map, "reason")
                .and_then(Value::as_str)
                .filter(|r| !r.is_empty())
                .unwrap_or("request failed");
            Some(reason.to_string())
        }
        _ => None,
    }
}

fn lookup_ci<'a>(map: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

/// Expected shape of a successful `Core/Login` payload.
#[derive(Debug, Deserialize)]
struct LoginPayload {
    success: bool,
    #[serde(rename = "sessionID", default)]
    session_id: Option<String>,
    #[serde(rename = "resultReason", default)]
    result_reason: Option<String>,
}

/// Extract the session token from a raw login response body.
///
/// The login envelope carries its own `result` code next to `success` and
/// `sessionID`, so it is read whole rather than through [`classify_value`].
pub fn login_token(body: &Value) -> FleetResult<String> {
    if body.get("Title").and_then(Value::as_str) == Some(UNAUTHORIZED_TITLE) {
        return Err(FleetError::LoginRejected("controller denied login".to_string()));
    }
    parse_login(body)
}

/// Extract the session token from a login payload.
pub fn parse_login(payload: &Value) -> FleetResult<String> {
    let login: LoginPayload = serde_json::from_value(payload.clone()).map_err(|_| {
        FleetError::LoginRejected("login response did not have the expected shape".to_string())
    })?;
    match (login.success, login.session_id) {
        (true, Some(token)) if !token.is_empty() && token != UNAUTHENTICATED_TOKEN => Ok(token),
        (true, _) => Err(FleetError::LoginRejected(
            "login succeeded without a session id".to_string(),
        )),
        (false, _) => Err(FleetError::LoginRejected(
            login
                .result_reason
                .unwrap_or_else(|| "credentials rejected".to_string()),
        )),
    }
}
