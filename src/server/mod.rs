//! Scope controllers and the per-connection driver (§4.4-§4.11).

pub mod game;
pub mod host_provisioner;
pub mod lobby;
pub mod room;
pub mod session;

pub use host_provisioner::GameHostProvisioner;

use thiserror::Error;

/// Errors raised by scope controllers, mapped to an outbound
/// `{"error":...}`/`{"warning":...}`/`{"info":...}` frame without tearing
/// down the connection (§7).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("{0}")]
    BadPayload(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    ScopeLogic(String),
}

impl ProtocolError {
    /// Whether this should render as `{"warning":...}` rather than `{"info":...}`.
    ///
    /// Authorization faults are warnings; scope-logic faults (unknown lobby,
    /// room full, already joined) are info-level by default (§7).
    #[must_use]
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    #[must_use]
    pub fn to_outbound(&self) -> crate::protocol::Outbound {
        use crate::protocol::Outbound;
        match self {
            Self::BadPayload(msg) => Outbound::Error(msg.clone()),
            Self::Unauthorized(msg) => Outbound::Warning(msg.clone()),
            Self::ScopeLogic(msg) => Outbound::Info(msg.clone()),
        }
    }
}

impl From<crate::admin::AdminError> for ProtocolError {
    fn from(err: crate::admin::AdminError) -> Self {
        let msg = match err {
            crate::admin::AdminError::NotAdmin => "Admin privileges required.",
            crate::admin::AdminError::NotModOrAdmin => "Mod or admin privileges required.",
        };
        Self::Unauthorized(msg.to_string())
    }
}
