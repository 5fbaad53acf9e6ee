//! Configuration module.
//!
//! This module provides configuration management with support for:
//! - JSON configuration files
//! - Environment variable overrides
//! - Stdin input
//! - Sensible defaults
//!
//! # Module Structure
//!
//! - [`types`]: Root `Config` struct
//! - [`server`]: Listener and room/game bounds
//! - [`protocol`]: Wire-protocol limits (framing, chat, join codes)
//! - [`map_provider`]: Random-map provisioning tunables
//! - [`secrets`]: Credentials for external collaborators
//! - [`logging`]: Logging configuration
//! - [`loader`]: Configuration loading functions
//! - [`validation`]: Configuration validation functions
//! - [`defaults`]: Default value functions

pub mod defaults;
pub mod loader;
pub mod logging;
pub mod map_provider;
pub mod protocol;
pub mod secrets;
pub mod server;
pub mod types;
pub mod validation;

pub use loader::load;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use map_provider::MapProviderConfig;
pub use protocol::ProtocolConfig;
pub use secrets::{BlobStoreSecrets, GameHostProvisionerSecrets, IdentityVerifierSecrets, SecretsConfig};
pub use server::{ListenerConfig, RoomConfig};
pub use types::Config;
pub use validation::{is_production_mode, validate_config_security};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();

        assert_eq!(config.server.port, 15277);
        assert_eq!(config.room.min_players, 2);
        assert_eq!(config.room.max_players, 64);
        assert_eq!(config.room.min_teams, 2);
        assert_eq!(config.room.max_teams, 16);
        assert_eq!(config.protocol.join_code_len, 6);
        assert_eq!(config.protocol.max_frame_bytes, 65_535);
        assert_eq!(config.map_provider.maintain_n_maps, 200);
        assert_eq!(config.logging.dir, "logs");
        assert_eq!(config.logging.filename, "server.log");
        assert_eq!(config.logging.rotation, "daily");
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.server.port, deserialized.server.port);
        assert_eq!(config.room.max_players, deserialized.room.max_players);
        assert_eq!(
            config.protocol.join_code_len,
            deserialized.protocol.join_code_len
        );
    }

    #[test]
    fn test_redacted_for_display_hides_secrets() {
        let mut config = Config::default();
        config.secrets.blob_store.secret_key = Some("supersecret".to_string());
        let redacted = config.redacted_for_display();
        let rendered = redacted.to_string();
        assert!(!rendered.contains("supersecret"));
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert_eq!(LogLevel::Error.to_string(), "error");
    }

    #[test]
    fn test_validate_rejects_inverted_player_bounds() {
        let mut config = Config::default();
        config.room.min_players = 10;
        config.room.max_players = 2;
        assert!(validate_config_security(&config).is_err());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let config = Config::default();
        assert!(validate_config_security(&config).is_ok());
    }
}
