//! MainLobby and game-lobby controller (§4.5): one type serves both, since
//! `parent_lobby` is the only thing distinguishing them.

use crate::chat::ChatLog;
use crate::config::{ProtocolConfig, RoomConfig};
use crate::domain::{scope_string, Lobby, Room, ScopeLevel, Uid};
use crate::protocol::Outbound;
use crate::server::ProtocolError;
use rand::RngExt;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc::UnboundedSender;

/// In-memory occupancy wrapping a persisted `Lobby`.
pub struct LobbyRuntime {
    pub lobby: Lobby,
    pub clients: HashSet<Uid>,
    pub chat: ChatLog,
    pub senders: HashMap<Uid, UnboundedSender<Outbound>>,
}

/// A snapshot pushed as `LOBBY_INFO` every `lobby_push_interval_secs`.
#[derive(Debug, Clone)]
pub struct LobbySummary {
    pub name: String,
    pub n_clients: usize,
    pub n_rooms: usize,
    pub is_public: bool,
}

/// The as-submitted `CREATE_ROOM` payload, before clamping/validation.
pub struct CreateRoomRequest {
    pub name: String,
    pub player_limit: u8,
    pub n_teams: u8,
    pub maps_required: u32,
    pub min_secs: u32,
    pub max_secs: u32,
    pub max_difficulty: u8,
    pub game_opts: Map<String, Value>,
}

impl LobbyRuntime {
    #[must_use]
    pub fn new(lobby: Lobby) -> Self {
        let level = if lobby.parent_lobby.is_some() {
            ScopeLevel::Lobby
        } else {
            ScopeLevel::MainLobby
        };
        let chat = ChatLog::new(scope_string(level, &lobby.name));
        Self {
            lobby,
            clients: HashSet::new(),
            chat,
            senders: HashMap::new(),
        }
    }

    /// Entry into this lobby. The first entrant of a lobby with no admins
    /// becomes its admin (§4.5 "The lobby also auto-assigns...").
    pub fn join(&mut self, uid: &str) {
        self.clients.insert(uid.to_string());
        if self.lobby.admins.is_empty() {
            self.lobby.admins.push(uid.to_string());
        }
    }

    pub fn leave(&mut self, uid: &str) {
        self.unregister_sender(uid);
        self.clients.remove(uid);
    }

    pub fn register_sender(&mut self, uid: &str, tx: UnboundedSender<Outbound>) {
        self.senders.insert(uid.to_string(), tx);
    }

    pub fn unregister_sender(&mut self, uid: &str) {
        self.senders.remove(uid);
    }

    pub fn broadcast(&self, outbound: &Outbound) {
        for tx in self.senders.values() {
            let _ = tx.send(outbound.clone());
        }
    }

    #[must_use]
    pub fn summary(&self, n_rooms: usize) -> LobbySummary {
        LobbySummary {
            name: self.lobby.name.clone(),
            n_clients: self.clients.len(),
            n_rooms,
            is_public: self.lobby.is_public,
        }
    }
}

/// `CREATE_ROOM` (§4.5). Clamps numeric fields to `cfg`'s configured ranges,
/// rejects structurally invalid combinations, and assigns the unique room
/// name and join code. `unique_suffix` and `join_code` are supplied by the
/// caller, which is responsible for retrying against the registry/store on
/// collision (this function is pure and cannot do that itself).
pub fn build_room(
    cfg: &RoomConfig,
    lobby_name: &str,
    request: CreateRoomRequest,
    unique_suffix: &str,
    join_code: String,
    now: i64,
) -> Result<Room, ProtocolError> {
    let player_limit = request.player_limit.clamp(cfg.min_players, cfg.max_players);
    let n_teams = request.n_teams.clamp(cfg.min_teams, cfg.max_teams);
    let maps_required = request
        .maps_required
        .clamp(cfg.min_maps_required, cfg.max_maps_required);
    let min_secs = request.min_secs.clamp(cfg.min_map_secs, cfg.max_map_secs);
    let max_secs = request.max_secs.clamp(cfg.min_map_secs, cfg.max_map_secs);
    let max_difficulty = request.max_difficulty.min(cfg.max_difficulty_ceiling);

    if n_teams as u32 > player_limit as u32 {
        return Err(ProtocolError::BadPayload(
            "n_teams cannot exceed player_limit".to_string(),
        ));
    }
    if max_secs < min_secs {
        return Err(ProtocolError::BadPayload(
            "max_secs cannot be less than min_secs".to_string(),
        ));
    }

    let game_opts = scalar_string_map(&request.game_opts)?;
    let name = format!("{}##{unique_suffix}", request.name);

    Ok(Room {
        name,
        lobby: lobby_name.to_string(),
        is_public: true,
        is_open: true,
        is_retired: false,
        join_code,
        player_limit,
        n_teams,
        maps_required,
        min_secs,
        max_secs,
        max_difficulty,
        map_list: Vec::new(),
        game_start_time: crate::domain::NOT_SCHEDULED,
        game_start_forced: false,
        game_opts,
        admins: Vec::new(),
        mods: Vec::new(),
        kicked_players: Vec::new(),
        creation_ts: now,
    })
}

/// Rejects `game_opts` values that are not JSON strings: no nesting, no
/// numbers/bools/null (§4.5 "rejects... non-scalar values").
fn scalar_string_map(raw: &Map<String, Value>) -> Result<HashMap<String, String>, ProtocolError> {
    let mut out = HashMap::with_capacity(raw.len());
    for (key, value) in raw {
        match value {
            Value::String(s) => {
                out.insert(key.clone(), s.clone());
            }
            _ => {
                return Err(ProtocolError::BadPayload(format!(
                    "game_opts.{key} must be a string"
                )))
            }
        }
    }
    Ok(out)
}

/// Generates a random `##<hex>` room-name suffix of `hex_len` characters.
#[must_use]
pub fn random_room_suffix(hex_len: usize) -> String {
    const HEX_CHARS: &[u8] = b"0123456789abcdef";
    let mut rng = rand::rng();
    (0..hex_len)
        .map(|_| HEX_CHARS[rng.random_range(0..HEX_CHARS.len())] as char)
        .collect()
}

/// Generates a random join code drawn from `cfg.join_code_alphabet`.
#[must_use]
pub fn random_join_code(cfg: &ProtocolConfig) -> String {
    let alphabet: Vec<char> = cfg.join_code_alphabet.chars().collect();
    let mut rng = rand::rng();
    (0..cfg.join_code_len)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> CreateRoomRequest {
        CreateRoomRequest {
            name: "Alpha".to_string(),
            player_limit: 4,
            n_teams: 2,
            maps_required: 3,
            min_secs: 30,
            max_secs: 90,
            max_difficulty: 3,
            game_opts: Map::new(),
        }
    }

    #[test]
    fn first_entrant_becomes_admin() {
        let mut runtime = LobbyRuntime::new(Lobby::main_lobby("uid-1".to_string(), 0));
        runtime.join("u1");
        assert_eq!(runtime.lobby.admins, vec!["u1".to_string()]);
        runtime.join("u2");
        assert_eq!(runtime.lobby.admins, vec!["u1".to_string()], "second entrant is not auto-promoted");
    }

    #[test]
    fn build_room_appends_unique_suffix() {
        let cfg = RoomConfig::default();
        let room = build_room(&cfg, "Alpha", sample_request(), "a1b2", "ABCDEF".to_string(), 0).unwrap();
        assert_eq!(room.name, "Alpha##a1b2");
        assert_eq!(room.lobby, "Alpha");
    }

    #[test]
    fn build_room_clamps_player_limit_to_configured_bounds() {
        let cfg = RoomConfig::default();
        let mut request = sample_request();
        request.player_limit = 255;
        let room = build_room(&cfg, "Alpha", request, "a1b2", "ABCDEF".to_string(), 0).unwrap();
        assert_eq!(room.player_limit, cfg.max_players);
    }

    #[test]
    fn build_room_rejects_more_teams_than_players() {
        let cfg = RoomConfig::default();
        let mut request = sample_request();
        request.player_limit = 2;
        request.n_teams = 5;
        let result = build_room(&cfg, "Alpha", request, "a1b2", "ABCDEF".to_string(), 0);
        assert!(matches!(result, Err(ProtocolError::BadPayload(_))));
    }

    #[test]
    fn build_room_rejects_inverted_map_length_bounds() {
        let cfg = RoomConfig::default();
        let mut request = sample_request();
        request.min_secs = 90;
        request.max_secs = 30;
        let result = build_room(&cfg, "Alpha", request, "a1b2", "ABCDEF".to_string(), 0);
        assert!(matches!(result, Err(ProtocolError::BadPayload(_))));
    }

    #[test]
    fn build_room_rejects_non_string_game_opts() {
        let cfg = RoomConfig::default();
        let mut request = sample_request();
        request
            .game_opts
            .insert("nested".to_string(), serde_json::json!({"a": 1}));
        let result = build_room(&cfg, "Alpha", request, "a1b2", "ABCDEF".to_string(), 0);
        assert!(matches!(result, Err(ProtocolError::BadPayload(_))));
    }

    #[test]
    fn build_room_accepts_scalar_string_game_opts() {
        let cfg = RoomConfig::default();
        let mut request = sample_request();
        request.game_opts.insert("mode".to_string(), Value::String("sprint".to_string()));
        let room = build_room(&cfg, "Alpha", request, "a1b2", "ABCDEF".to_string(), 0).unwrap();
        assert_eq!(room.game_opts.get("mode"), Some(&"sprint".to_string()));
    }

    #[test]
    fn random_room_suffix_has_requested_length() {
        let suffix = random_room_suffix(4);
        assert_eq!(suffix.len(), 4);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn random_join_code_uses_configured_length_and_alphabet() {
        let cfg = ProtocolConfig::default();
        let code = random_join_code(&cfg);
        assert_eq!(code.len(), cfg.join_code_len);
        assert!(code.chars().all(|c| cfg.join_code_alphabet.contains(c)));
    }
}
