//! Root configuration type.

use super::logging::LoggingConfig;
use super::map_provider::MapProviderConfig;
use super::protocol::ProtocolConfig;
use super::secrets::SecretsConfig;
use super::server::{ListenerConfig, RoomConfig};
use serde::{Deserialize, Serialize};

/// Root configuration struct.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ListenerConfig,
    #[serde(default)]
    pub room: RoomConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub map_provider: MapProviderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
}

impl Config {
    /// A copy of this configuration with every secret string blanked out,
    /// safe to serialize for `--print-config` or diagnostic logging.
    #[must_use]
    pub fn redacted_for_display(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(secrets) = value.get_mut("secrets") {
            *secrets = serde_json::json!({
                "blob_store": "<redacted>",
                "identity_verifier": "<redacted>",
                "game_host_provisioner": "<redacted>",
            });
        }
        value
    }
}
