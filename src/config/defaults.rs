//! Default value functions for configuration fields.
//!
//! Organized by category so `#[serde(default = ...)]` attributes throughout the
//! configuration system have a single place to look up a constant.

use super::logging::LogFormat;

// =============================================================================
// Listener defaults
// =============================================================================

pub fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub const fn default_port() -> u16 {
    15277
}

pub fn default_db_name() -> String {
    "raceway_coop".to_string()
}

pub const fn default_local_dev() -> bool {
    false
}

// =============================================================================
// Room / game bounds (§3 Room invariants)
// =============================================================================

pub const fn default_min_players() -> u8 {
    2
}

pub const fn default_max_players() -> u8 {
    64
}

pub const fn default_min_teams() -> u8 {
    2
}

pub const fn default_max_teams() -> u8 {
    16
}

pub const fn default_min_maps_required() -> u32 {
    1
}

pub const fn default_max_maps_required() -> u32 {
    100
}

pub const fn default_min_map_secs() -> u32 {
    15
}

pub const fn default_max_map_secs() -> u32 {
    600
}

pub const fn default_max_difficulty() -> u8 {
    5
}

pub const fn default_countdown_secs() -> u64 {
    5
}

pub const fn default_countdown_join_grace_secs() -> u64 {
    1
}

pub const fn default_empty_room_retirement_secs() -> u64 {
    120
}

pub const fn default_max_room_age_secs() -> u64 {
    6 * 3600
}

pub const fn default_lobby_push_interval_secs() -> u64 {
    5
}

pub const fn default_room_sweep_interval_secs() -> u64 {
    60
}

pub const fn default_resumption_window_secs() -> u64 {
    3 * 3600
}

// =============================================================================
// Protocol / framing defaults
// =============================================================================

pub const fn default_max_frame_bytes() -> usize {
    65_535
}

pub const fn default_max_chat_len() -> usize {
    1024
}

pub const fn default_chat_recent_window() -> usize {
    20
}

pub const fn default_join_code_len() -> usize {
    6
}

pub fn default_join_code_alphabet() -> String {
    "ABCDEFGHJKLMNPQRSTUVWXYZ23456789".to_string()
}

pub const fn default_room_suffix_hex_len() -> usize {
    4
}

pub const fn default_legacy_login_enabled() -> bool {
    true
}

// =============================================================================
// Map provider defaults
// =============================================================================

pub const fn default_maintain_n_maps() -> usize {
    200
}

pub const fn default_maintain_n_maps_local_dev() -> usize {
    20
}

pub const fn default_blob_retry_attempts() -> u32 {
    10
}

pub const fn default_blob_retry_backoff_secs() -> u64 {
    10
}

pub const fn default_totd_poll_interval_secs() -> u64 {
    5
}

pub fn default_catalog_base_url() -> String {
    "https://trackmania.exchange".to_string()
}

// =============================================================================
// Logging defaults
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "server.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub const fn default_enable_file_logging() -> bool {
    false
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Text
}
