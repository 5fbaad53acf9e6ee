//! Configuration validation functions.

use super::Config;

/// Validate invariants that `serde` defaults alone can't enforce, and warn
/// about missing credentials that will make external collaborators inert.
pub fn validate_config_security(config: &Config) -> anyhow::Result<()> {
    let room = &config.room;

    if room.min_players < 1 {
        anyhow::bail!("room.min_players must be at least 1");
    }
    if room.max_players < room.min_players {
        anyhow::bail!(
            "room.max_players ({}) must be >= room.min_players ({})",
            room.max_players,
            room.min_players
        );
    }
    if room.min_teams < 1 {
        anyhow::bail!("room.min_teams must be at least 1");
    }
    if room.max_teams < room.min_teams {
        anyhow::bail!(
            "room.max_teams ({}) must be >= room.min_teams ({})",
            room.max_teams,
            room.min_teams
        );
    }
    if room.min_maps_required < 1 {
        anyhow::bail!("room.min_maps_required must be at least 1");
    }
    if room.max_maps_required < room.min_maps_required {
        anyhow::bail!(
            "room.max_maps_required ({}) must be >= room.min_maps_required ({})",
            room.max_maps_required,
            room.min_maps_required
        );
    }
    if room.min_map_secs < 1 {
        anyhow::bail!("room.min_map_secs must be at least 1");
    }
    if room.max_map_secs < room.min_map_secs {
        anyhow::bail!(
            "room.max_map_secs ({}) must be >= room.min_map_secs ({})",
            room.max_map_secs,
            room.min_map_secs
        );
    }

    let protocol = &config.protocol;
    if protocol.join_code_alphabet.chars().count() < 2 {
        anyhow::bail!("protocol.join_code_alphabet must contain at least two characters");
    }
    if protocol.join_code_len == 0 {
        anyhow::bail!("protocol.join_code_len must be at least 1");
    }
    if protocol.max_frame_bytes < 64 {
        anyhow::bail!("protocol.max_frame_bytes is unreasonably small (< 64 bytes)");
    }

    if !config.server.local_dev {
        warn_if_unset(
            "secrets.identity_verifier.url",
            config.secrets.identity_verifier.url.is_some(),
        );
        warn_if_unset(
            "secrets.identity_verifier.secret",
            config.secrets.identity_verifier.secret.is_some(),
        );
        warn_if_unset(
            "secrets.blob_store.access_key",
            config.secrets.blob_store.access_key.is_some(),
        );
        warn_if_unset(
            "secrets.blob_store.secret_key",
            config.secrets.blob_store.secret_key.is_some(),
        );
    }

    Ok(())
}

fn warn_if_unset(field: &str, present: bool) {
    if !present {
        eprintln!(
            "WARNING: {field} is not configured; the corresponding external collaborator \
             will be unreachable outside local_dev mode"
        );
    }
}

/// Detect whether we're running with production-like expectations.
///
/// Checks `RACEWAY_COOP_PRODUCTION` and the generic `PRODUCTION` / `PROD`
/// environment variables, falling back to `server.local_dev` when none are set.
pub fn is_production_mode() -> bool {
    use std::env;

    if let Ok(mode) = env::var("RACEWAY_COOP__ENVIRONMENT") {
        return mode.eq_ignore_ascii_case("production") || mode.eq_ignore_ascii_case("prod");
    }

    env::var("RACEWAY_COOP_PRODUCTION").is_ok()
        || env::var("PRODUCTION").is_ok()
        || env::var("PROD").is_ok()
}
