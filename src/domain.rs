//! Core data model (§3): the entities every component reads and mutates.
//!
//! These are plain data holders. Scope-transition logic, ready/team rules, and
//! the event log live in `server::{lobby,room,game}`; this module only carries
//! the durable shape and the invariants that are cheap to assert at construction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type Uid = String;
pub type SessionUid = String;

/// Visibility tag on a validated [`Message`] (§3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Global,
    Team,
    Map,
    None,
}

/// A user identity (§3 User). Created at first authenticated login, mutated
/// on every login and scope transition, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub uid: Uid,
    pub name: String,
    /// Opaque server-issued credential; never logged.
    pub secret: String,
    /// Upstream identity-verifier account id, when registered via `LOGIN_TOKEN`. `None` for legacy logins.
    pub account_id: Option<String>,
    pub registration_ts: i64,
    pub last_seen: i64,
    pub n_logins: u64,
    /// `"<level>|<name>"`, e.g. `"2|Alpha##a1b2"`. `None` before the user's first scope hand-off.
    pub last_scope: Option<String>,
}

impl User {
    pub fn new(uid: Uid, name: String, secret: String, now: i64) -> Self {
        Self {
            uid,
            name,
            secret,
            account_id: None,
            registration_ts: now,
            last_seen: now,
            n_logins: 0,
            last_scope: None,
        }
    }

    pub fn login_touch(&mut self, now: i64) {
        self.n_logins += 1;
        self.last_seen = now;
    }
}

/// A validated inbound/outbound payload (§3 Message, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Map<String, serde_json::Value>,
    pub visibility: Visibility,
    pub user: Option<Uid>,
    pub ts: i64,
}

/// Scope levels encoded in the `"<level>|<name>"` resumption string (§4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeLevel {
    MainLobby = 0,
    Lobby = 1,
    Room = 2,
    Game = 3,
}

impl ScopeLevel {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::MainLobby),
            1 => Some(Self::Lobby),
            2 => Some(Self::Room),
            3 => Some(Self::Game),
            _ => None,
        }
    }
}

/// Formats the `"<level>|<name>"` resumption string written to `User::last_scope`.
#[must_use]
pub fn scope_string(level: ScopeLevel, name: &str) -> String {
    format!("{}|{name}", level.as_u8())
}

/// Parses a `"<level>|<name>"` resumption string.
#[must_use]
pub fn parse_scope_string(raw: &str) -> Option<(ScopeLevel, &str)> {
    let (level_str, name) = raw.split_once('|')?;
    let level = ScopeLevel::from_u8(level_str.parse().ok()?)?;
    Some((level, name))
}

pub const MAIN_LOBBY_NAME: &str = "MainLobby";

/// A named scope containing rooms (§3 Lobby).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lobby {
    pub uid: String,
    pub name: String,
    /// Non-null iff this is a game lobby hosted under MainLobby.
    pub parent_lobby: Option<String>,
    pub admins: Vec<Uid>,
    pub mods: Vec<Uid>,
    pub is_public: bool,
    pub creation_ts: i64,
}

impl Lobby {
    pub fn main_lobby(uid: String, now: i64) -> Self {
        Self {
            uid,
            name: MAIN_LOBBY_NAME.to_string(),
            parent_lobby: None,
            admins: Vec::new(),
            mods: Vec::new(),
            is_public: true,
            creation_ts: now,
        }
    }

    pub fn game_lobby(uid: String, name: String, now: i64) -> Self {
        Self {
            uid,
            name,
            parent_lobby: Some(MAIN_LOBBY_NAME.to_string()),
            admins: Vec::new(),
            mods: Vec::new(),
            is_public: true,
            creation_ts: now,
        }
    }
}

/// Sentinel for `Room::game_start_time` / `RoomState` meaning "no countdown scheduled" (§9(c)).
pub const NOT_SCHEDULED: i64 = -1;

/// A prospective game within a game lobby (§3 Room).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub name: String,
    pub lobby: String,
    pub is_public: bool,
    pub is_open: bool,
    pub is_retired: bool,
    pub join_code: String,
    pub player_limit: u8,
    pub n_teams: u8,
    pub maps_required: u32,
    pub min_secs: u32,
    pub max_secs: u32,
    pub max_difficulty: u8,
    pub map_list: Vec<String>,
    /// Absolute epoch seconds; `NOT_SCHEDULED` (`-1`) means no countdown is active.
    pub game_start_time: i64,
    pub game_start_forced: bool,
    pub game_opts: HashMap<String, String>,
    pub admins: Vec<Uid>,
    pub mods: Vec<Uid>,
    pub kicked_players: Vec<Uid>,
    pub creation_ts: i64,
}

impl Room {
    #[must_use]
    pub fn has_active_countdown(&self) -> bool {
        self.game_start_time != NOT_SCHEDULED
    }
}

/// The frozen snapshot of a Room at start (§3 GameSession).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    pub name: String,
    pub room: String,
    pub lobby: String,
    /// Teams flattened in team order.
    pub players: Vec<Uid>,
    pub teams: Vec<Vec<Uid>>,
    /// Permutation of `[0, n_teams)` fixed at creation.
    pub team_order: Vec<u8>,
    pub map_list: Vec<String>,
    pub admins: Vec<Uid>,
    pub mods: Vec<Uid>,
    pub creation_ts: i64,
}

/// A cataloged map record (§3 Map).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Map {
    pub track_id: String,
    pub name: String,
    pub length_secs: u32,
    pub difficulty: u8,
}

/// A cataloged pack of maps (§3 ambient addition: MapPack).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapPack {
    pub pack_id: String,
    pub name: String,
    pub track_ids: Vec<String>,
}

/// Persisted snapshot of MapProvider's in-memory pool (§3 ambient addition: RandomMapQueue).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomMapQueue {
    pub maps: Vec<Map>,
    pub refreshed_ts: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_string_round_trips() {
        let encoded = scope_string(ScopeLevel::Room, "Alpha##a1b2");
        assert_eq!(encoded, "2|Alpha##a1b2");
        let (level, name) = parse_scope_string(&encoded).unwrap();
        assert_eq!(level, ScopeLevel::Room);
        assert_eq!(name, "Alpha##a1b2");
    }

    #[test]
    fn parse_scope_string_rejects_garbage() {
        assert!(parse_scope_string("not-a-scope").is_none());
        assert!(parse_scope_string("9|Whatever").is_none());
    }

    #[test]
    fn room_not_scheduled_sentinel_is_negative_one() {
        assert_eq!(NOT_SCHEDULED, -1);
        let room = Room {
            name: "Alpha##a1b2".to_string(),
            lobby: "Alpha".to_string(),
            is_public: true,
            is_open: true,
            is_retired: false,
            join_code: "ABCDEF".to_string(),
            player_limit: 2,
            n_teams: 2,
            maps_required: 1,
            min_secs: 30,
            max_secs: 60,
            max_difficulty: 2,
            map_list: Vec::new(),
            game_start_time: NOT_SCHEDULED,
            game_start_forced: false,
            game_opts: HashMap::new(),
            admins: Vec::new(),
            mods: Vec::new(),
            kicked_players: Vec::new(),
            creation_ts: 0,
        };
        assert!(!room.has_active_countdown());
    }
}
