//! Listener and room/game bounds configuration.

use super::defaults::{
    default_countdown_join_grace_secs, default_countdown_secs, default_db_name,
    default_empty_room_retirement_secs, default_host, default_local_dev, default_lobby_push_interval_secs,
    default_max_difficulty, default_max_map_secs, default_max_maps_required, default_max_players,
    default_max_room_age_secs, default_max_teams, default_min_map_secs, default_min_maps_required,
    default_min_players, default_min_teams, default_port, default_resumption_window_secs,
    default_room_sweep_interval_secs,
};
use serde::{Deserialize, Serialize};

/// Where the server listens and which database/dev-mode it runs with.
///
/// Mirrors the `CGF_HOST_NAME` / `CGF_PORT` / `CGF_DB_NAME` / `CFG_LOCAL_DEV` environment
/// variables named in the external interfaces section.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ListenerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_name")]
    pub db_name: String,
    #[serde(default = "default_local_dev")]
    pub local_dev: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_name: default_db_name(),
            local_dev: default_local_dev(),
        }
    }
}

/// Numeric bounds and timing for rooms and games.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RoomConfig {
    #[serde(default = "default_min_players")]
    pub min_players: u8,
    #[serde(default = "default_max_players")]
    pub max_players: u8,
    #[serde(default = "default_min_teams")]
    pub min_teams: u8,
    #[serde(default = "default_max_teams")]
    pub max_teams: u8,
    #[serde(default = "default_min_maps_required")]
    pub min_maps_required: u32,
    #[serde(default = "default_max_maps_required")]
    pub max_maps_required: u32,
    #[serde(default = "default_min_map_secs")]
    pub min_map_secs: u32,
    #[serde(default = "default_max_map_secs")]
    pub max_map_secs: u32,
    /// Ceiling a `CREATE_ROOM` request's `max_difficulty` is clamped to.
    #[serde(default = "default_max_difficulty")]
    pub max_difficulty_ceiling: u8,
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u64,
    #[serde(default = "default_countdown_join_grace_secs")]
    pub countdown_join_grace_secs: u64,
    #[serde(default = "default_empty_room_retirement_secs")]
    pub empty_room_retirement_secs: u64,
    #[serde(default = "default_max_room_age_secs")]
    pub max_room_age_secs: u64,
    #[serde(default = "default_lobby_push_interval_secs")]
    pub lobby_push_interval_secs: u64,
    #[serde(default = "default_room_sweep_interval_secs")]
    pub room_sweep_interval_secs: u64,
    #[serde(default = "default_resumption_window_secs")]
    pub resumption_window_secs: u64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            min_players: default_min_players(),
            max_players: default_max_players(),
            min_teams: default_min_teams(),
            max_teams: default_max_teams(),
            min_maps_required: default_min_maps_required(),
            max_maps_required: default_max_maps_required(),
            min_map_secs: default_min_map_secs(),
            max_map_secs: default_max_map_secs(),
            max_difficulty_ceiling: default_max_difficulty(),
            countdown_secs: default_countdown_secs(),
            countdown_join_grace_secs: default_countdown_join_grace_secs(),
            empty_room_retirement_secs: default_empty_room_retirement_secs(),
            max_room_age_secs: default_max_room_age_secs(),
            lobby_push_interval_secs: default_lobby_push_interval_secs(),
            room_sweep_interval_secs: default_room_sweep_interval_secs(),
            resumption_window_secs: default_resumption_window_secs(),
        }
    }
}
