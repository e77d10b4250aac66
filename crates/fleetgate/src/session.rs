//! Authenticated session against one control-plane API root.
//!
//! A [`SessionClient`] holds an opaque rotating token. The token is attached
//! to every call once known, reset when the remote denies it, and re-obtained
//! lazily by [`SessionClient::ensure_authenticated`]. At most one login is in
//! flight per client; concurrent callers wait on the login mutex and then see
//! the fresh token.

use crate::config::ControllerConfig;
use crate::error::{FleetError, FleetResult};
use crate::protocol::{self, CallOutcome, LOGIN_ENDPOINT, SESSION_KEY, UNAUTHENTICATED_TOKEN};
use crate::totp;
use serde_json::{Map, Value, json};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use zeroize::Zeroizing;

/// Login credentials shared by every client built from one factory.
pub struct Credentials {
    pub username: String,
    pub password: Zeroizing<String>,
    pub totp_seed: Option<Zeroizing<String>>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
            totp_seed: None,
        }
    }

    pub fn with_totp_seed(mut self, seed: impl Into<String>) -> Self {
        self.totp_seed = Some(Zeroizing::new(seed.into()));
        self
    }
}

/// Builds correctly scoped [`SessionClient`]s sharing one connection pool.
#[derive(Clone)]
pub struct SessionFactory {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<Credentials>,
}

impl SessionFactory {
    pub fn new(
        base_url: &str,
        credentials: Credentials,
        request_timeout: Duration,
    ) -> FleetResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("fleetgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FleetError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: Arc::new(credentials),
        })
    }

    pub fn from_config(config: &ControllerConfig) -> FleetResult<Self> {
        let credentials = Credentials {
            username: config.username.clone(),
            password: config.password.clone(),
            totp_seed: config
                .totp_seed
                .clone()
                .filter(|seed| !seed.trim().is_empty()),
        };
        Self::new(
            &config.url,
            credentials,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Client for the controller root.
    pub fn controller(&self) -> SessionClient {
        self.scoped(format!("{}/API", self.base_url))
    }

    /// Client for one instance's API, proxied through the controller.
    pub fn for_instance(&self, instance_id: &str) -> SessionClient {
        self.scoped(format!(
            "{}/API/ADSModule/Servers/{instance_id}/API",
            self.base_url
        ))
    }

    fn scoped(&self, api_root: String) -> SessionClient {
        SessionClient {
            http: self.http.clone(),
            api_root,
            credentials: self.credentials.clone(),
            token: RwLock::new(UNAUTHENTICATED_TOKEN.to_string()),
            login_lock: Mutex::new(()),
            disabled: OnceLock::new(),
        }
    }
}

/// Session-authenticated client bound to one API root.
pub struct SessionClient {
    http: reqwest::Client,
    api_root: String,
    credentials: Arc<Credentials>,
    token: RwLock<String>,
    login_lock: Mutex<()>,
    /// Set once a configuration problem makes login impossible.
    disabled: OnceLock<String>,
}

impl SessionClient {
    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    pub async fn is_authenticated(&self) -> bool {
        *self.token.read().await != UNAUTHENTICATED_TOKEN
    }

    /// Reason this client can never authenticate, if any.
    pub fn disabled_reason(&self) -> Option<&str> {
        self.disabled.get().map(String::as_str)
    }

    /// Issue one call and classify the response.
    ///
    /// An `Unauthorized` outcome resets the token so the next
    /// `ensure_authenticated` logs in again. The reset only happens if the
    /// token still equals the one this call carried, so a login completed
    /// concurrently is not discarded.
    pub async fn call(&self, endpoint: &str, params: Value) -> FleetResult<CallOutcome> {
        let sent_token = self.token.read().await.clone();
        let mut body = into_object(params);
        if sent_token != UNAUTHENTICATED_TOKEN {
            body.insert(SESSION_KEY.to_string(), Value::String(sent_token.clone()));
        }

        let outcome = protocol::classify_value(self.post(endpoint, Value::Object(body)).await?);
        if outcome == CallOutcome::Unauthorized {
            let mut token = self.token.write().await;
            if *token == sent_token && sent_token != UNAUTHENTICATED_TOKEN {
                tracing::info!(api = %self.api_root, endpoint, "session rejected, resetting token");
                *token = UNAUTHENTICATED_TOKEN.to_string();
            }
        }
        Ok(outcome)
    }

    /// Log in if no session token is held. Idempotent.
    pub async fn ensure_authenticated(&self) -> FleetResult<()> {
        if let Some(reason) = self.disabled.get() {
            return Err(FleetError::AuthenticationConfig(reason.clone()));
        }
        if self.is_authenticated().await {
            return Ok(());
        }

        let _guard = self.login_lock.lock().await;
        // Another caller may have finished logging in while we waited.
        if self.is_authenticated().await {
            return Ok(());
        }

        match self.login().await {
            Ok(new_token) => {
                *self.token.write().await = new_token;
                tracing::debug!(api = %self.api_root, "login succeeded");
                Ok(())
            }
            Err(e) => {
                if let FleetError::AuthenticationConfig(reason) = &e {
                    let _ = self.disabled.set(reason.clone());
                    tracing::error!(api = %self.api_root, err = %e, "login disabled until configuration is fixed");
                } else {
                    tracing::warn!(api = %self.api_root, err = %e, "login failed, will retry on next use");
                }
                Err(e)
            }
        }
    }

    /// Authenticate, issue the call, and re-authenticate once if the session
    /// turns out to be stale.
    pub async fn perform(&self, endpoint: &str, params: Value) -> FleetResult<Value> {
        self.ensure_authenticated().await?;
        match self.call(endpoint, params.clone()).await? {
            CallOutcome::Unauthorized => {}
            other => return settle(endpoint, other),
        }

        self.ensure_authenticated().await?;
        settle(endpoint, self.call(endpoint, params).await?)
    }

    async fn login(&self) -> FleetResult<String> {
        let one_time_code = match &self.credentials.totp_seed {
            Some(seed) => totp::current_code(seed)?,
            None => String::new(),
        };
        let params = json!({
            "username": self.credentials.username,
            "password": self.credentials.password.as_str(),
            "token": one_time_code,
            "rememberMe": false,
        });

        let body = self.post(LOGIN_ENDPOINT, params).await?;
        protocol::login_token(&body)
    }

    async fn post(&self, endpoint: &str, body: Value) -> FleetResult<Value> {
        let url = format!("{}/{}", self.api_root, endpoint);
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(endpoint, e))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(endpoint, e))?;
        protocol::decode_response(endpoint, status, &text)
    }
}

fn settle(endpoint: &str, outcome: CallOutcome) -> FleetResult<Value> {
    match outcome {
        CallOutcome::Success(payload) => Ok(payload),
        CallOutcome::BusinessFailure(reason) => Err(FleetError::Rejected {
            endpoint: endpoint.to_string(),
            reason,
        }),
        CallOutcome::Unauthorized => Err(FleetError::AuthorizationDenied {
            endpoint: endpoint.to_string(),
        }),
    }
}

fn into_object(params: Value) -> Map<String, Value> {
    match params {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

fn transport_error(endpoint: &str, err: reqwest::Error) -> FleetError {
    if err.is_timeout() {
        FleetError::Timeout {
            endpoint: endpoint.to_string(),
        }
    } else {
        FleetError::Transport {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> SessionFactory {
        SessionFactory::new(
            "http://127.0.0.1:9/",
            Credentials::new("admin", "pw"),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn controller_and_instance_roots() {
        let f = factory();
        assert_eq!(f.controller().api_root(), "http://127.0.0.1:9/API");
        assert_eq!(
            f.for_instance("abc-123").api_root(),
            "http://127.0.0.1:9/API/ADSModule/Servers/abc-123/API"
        );
    }

    #[tokio::test]
    async fn new_client_is_unauthenticated() {
        let client = factory().controller();
        assert!(!client.is_authenticated().await);
        assert!(client.disabled_reason().is_none());
    }

    #[tokio::test]
    async fn malformed_seed_disables_client_without_network() {
        let f = SessionFactory::new(
            "http://127.0.0.1:9",
            Credentials::new("admin", "pw").with_totp_seed("bad seed!!"),
            Duration::from_secs(1),
        )
        .unwrap();
        let client = f.for_instance("i-1");
        let err = client.ensure_authenticated().await.unwrap_err();
        assert!(matches!(err, FleetError::AuthenticationConfig(_)));
        assert!(client.disabled_reason().is_some());

        // Stays disabled.
        let again = client.ensure_authenticated().await.unwrap_err();
        assert!(matches!(again, FleetError::AuthenticationConfig(_)));
    }

    #[tokio::test]
    async fn unreachable_login_is_transport_error() {
        let client = factory().controller();
        let err = client.ensure_authenticated().await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
        assert!(client.disabled_reason().is_none());
        assert!(!client.is_authenticated().await);
    }

    #[test]
    fn non_object_params_are_wrapped() {
        let map = into_object(Value::String("hi".into()));
        assert_eq!(map.get("value"), Some(&Value::String("hi".into())));
        assert!(into_object(Value::Null).is_empty());
    }
}
