use thiserror::Error;

pub type FleetResult<T> = std::result::Result<T, FleetError>;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("transport error calling {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("{endpoint} returned an empty body")]
    EmptyBody { endpoint: String },

    #[error("{endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("failed to decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("authorization denied for {endpoint}")]
    AuthorizationDenied { endpoint: String },

    #[error("authentication misconfigured: {0}")]
    AuthenticationConfig(String),

    #[error("login rejected: {0}")]
    LoginRejected(String),

    #[error("{endpoint} rejected the request: {reason}")]
    Rejected { endpoint: String, reason: String },

    #[error("failed to load variant {variant}: {message}")]
    VariantLoad { variant: String, message: String },

    #[error("unknown instance: {0}")]
    UnknownInstance(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FleetError {
    /// Short, user-facing description of the failure class.
    pub fn user_message(&self) -> &'static str {
        match self {
            FleetError::Transport { .. } | FleetError::EmptyBody { .. } => "unreachable",
            FleetError::Status { .. } => "remote error",
            FleetError::Timeout { .. } => "timed out",
            FleetError::Decode { .. } => "unexpected response",
            FleetError::AuthorizationDenied { .. } => "permission denied",
            FleetError::AuthenticationConfig(_) => "authentication misconfigured",
            FleetError::LoginRejected(_) => "login failed",
            FleetError::Rejected { .. } => "request rejected",
            FleetError::VariantLoad { .. } => "variant unavailable",
            FleetError::UnknownInstance(_) => "unknown instance",
            FleetError::Config(_) => "invalid configuration",
        }
    }

    /// Failures that a later attempt may resolve without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FleetError::Transport { .. }
                | FleetError::EmptyBody { .. }
                | FleetError::Timeout { .. }
                | FleetError::Status { .. }
                | FleetError::LoginRejected(_)
        )
    }
}
