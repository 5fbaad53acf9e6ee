//! Wire-protocol limits: framing size, chat length, join codes.

use super::defaults::{
    default_chat_recent_window, default_join_code_alphabet, default_join_code_len,
    default_legacy_login_enabled, default_max_chat_len, default_max_frame_bytes,
    default_room_suffix_hex_len,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProtocolConfig {
    /// Maximum frame payload in bytes (§4.1): frames above this are rejected.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Maximum `content` length for a chat message (§4.8).
    #[serde(default = "default_max_chat_len")]
    pub max_chat_len: usize,
    /// Size of the in-memory chat tail kept per `ChatContainer` (§4.8).
    #[serde(default = "default_chat_recent_window")]
    pub chat_recent_window: usize,
    /// Length of a generated room join code (§3 Room.join_code).
    #[serde(default = "default_join_code_len")]
    pub join_code_len: usize,
    /// Alphabet join codes are drawn from; deliberately excludes visually
    /// ambiguous characters (0/O, 1/I, etc).
    #[serde(default = "default_join_code_alphabet")]
    pub join_code_alphabet: String,
    /// Length (in hex characters) of the random suffix appended to room names.
    #[serde(default = "default_room_suffix_hex_len")]
    pub room_suffix_hex_len: usize,
    /// Whether the legacy `LOGIN`/`REGISTER` handshake is accepted alongside
    /// `LOGIN_TOKEN` (§4.11).
    #[serde(default = "default_legacy_login_enabled")]
    pub legacy_login_enabled: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
            max_chat_len: default_max_chat_len(),
            chat_recent_window: default_chat_recent_window(),
            join_code_len: default_join_code_len(),
            join_code_alphabet: default_join_code_alphabet(),
            room_suffix_hex_len: default_room_suffix_hex_len(),
            legacy_login_enabled: default_legacy_login_enabled(),
        }
    }
}
