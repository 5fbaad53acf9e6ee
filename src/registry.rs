//! Holds the unique live `Lobby`, `Room`, and `Game` runtimes by name and the
//! set of live client sessions (§4.4). Used by `LobbyController`/`RoomController`
//! for hand-off lookup.

use crate::config::RoomConfig;
use crate::metrics::ServerMetrics;
use crate::server::game::GameRuntime;
use crate::server::lobby::LobbyRuntime;
use crate::server::room::RoomRuntime;
use crate::store::GameStore;
use dashmap::DashMap;
use dashmap::DashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A live lobby runtime, guarded for single-writer mutation.
pub type SharedLobby = Arc<RwLock<LobbyRuntime>>;
/// A live room runtime, guarded for single-writer mutation.
pub type SharedRoom = Arc<RwLock<RoomRuntime>>;
/// A live game runtime, guarded for single-writer mutation.
pub type SharedGame = Arc<RwLock<GameRuntime>>;

/// The registry of every live Lobby, Room, and Game, plus every live client
/// session uid.
///
/// Uniqueness is enforced at construction: registering two lobbies with the
/// same name is a program-logic fault, not a recoverable error, because the
/// store's own `insert_lobby` already rejects the collision before a lobby
/// ever reaches here. Rooms carry a random `##<hex>` suffix precisely so this
/// same assumption holds for them without a retry loop.
#[derive(Default)]
pub struct ScopeRegistry {
    lobbies: DashMap<String, SharedLobby>,
    rooms: DashMap<String, SharedRoom>,
    games: DashMap<String, SharedGame>,
    live_sessions: DashSet<String>,
}

impl ScopeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly created lobby. Panics on name collision: the
    /// caller is expected to have already reserved the name in the store.
    pub fn register_lobby(&self, runtime: LobbyRuntime) -> SharedLobby {
        let name = runtime.lobby.name.clone();
        let shared = Arc::new(RwLock::new(runtime));
        let previous = self.lobbies.insert(name.clone(), shared.clone());
        assert!(
            previous.is_none(),
            "program-logic fault: lobby \"{name}\" registered twice"
        );
        shared
    }

    #[must_use]
    pub fn lobby(&self, name: &str) -> Option<SharedLobby> {
        self.lobbies.get(name).map(|entry| entry.clone())
    }

    pub fn remove_lobby(&self, name: &str) {
        self.lobbies.remove(name);
    }

    #[must_use]
    pub fn lobby_names(&self) -> Vec<String> {
        self.lobbies.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Registers a freshly created room under its (already-unique) name.
    pub fn register_room(&self, runtime: RoomRuntime) -> SharedRoom {
        let name = runtime.room.name.clone();
        let shared = Arc::new(RwLock::new(runtime));
        let previous = self.rooms.insert(name.clone(), shared.clone());
        assert!(
            previous.is_none(),
            "program-logic fault: room \"{name}\" registered twice"
        );
        shared
    }

    #[must_use]
    pub fn room(&self, name: &str) -> Option<SharedRoom> {
        self.rooms.get(name).map(|entry| entry.clone())
    }

    pub fn remove_room(&self, name: &str) {
        self.rooms.remove(name);
    }

    #[must_use]
    pub fn rooms_in_lobby(&self, lobby: &str) -> Vec<SharedRoom> {
        let prefix = format!("{lobby}##");
        self.rooms
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| entry.clone())
            .collect()
    }

    /// Registers a freshly promoted game under its (already-unique) name.
    pub fn register_game(&self, runtime: GameRuntime) -> SharedGame {
        let name = runtime.session.name.clone();
        let shared = Arc::new(RwLock::new(runtime));
        let previous = self.games.insert(name.clone(), shared.clone());
        assert!(
            previous.is_none(),
            "program-logic fault: game \"{name}\" registered twice"
        );
        shared
    }

    #[must_use]
    pub fn game(&self, name: &str) -> Option<SharedGame> {
        self.games.get(name).map(|entry| entry.clone())
    }

    pub fn remove_game(&self, name: &str) {
        self.games.remove(name);
    }

    pub fn mark_session_live(&self, uid: &str) {
        self.live_sessions.insert(uid.to_string());
    }

    pub fn mark_session_gone(&self, uid: &str) {
        self.live_sessions.remove(uid);
    }

    #[must_use]
    pub fn is_session_live(&self, uid: &str) -> bool {
        self.live_sessions.contains(uid)
    }

    #[must_use]
    pub fn live_session_count(&self) -> u64 {
        self.live_sessions.len() as u64
    }

    /// Sweeps every registered room once (§4.6 "Retirement"). A room whose
    /// game still has clients is left alone entirely, matching the original's
    /// `is_empty = not has_clients and not game_has_clients`. A room whose
    /// game has just run out of clients gets its game pointer cleared and its
    /// empty-retirement clock restarted, so it gets a fresh grace window
    /// rather than retiring off a stale `empty_since` left over from the
    /// moment its players moved into the game. Returns the names of any rooms
    /// retired this pass.
    pub async fn sweep_rooms(&self, store: &dyn GameStore, metrics: &ServerMetrics, room_cfg: &RoomConfig, now: i64) -> Vec<String> {
        let mut retired = Vec::new();
        for lobby_name in self.lobby_names() {
            for room in self.rooms_in_lobby(&lobby_name) {
                let game_name = room.read().await.game_name.clone();
                let mut game_still_live = false;
                if let Some(game_name) = &game_name {
                    match self.game(game_name) {
                        Some(game_rt) => {
                            if game_rt.read().await.clients.is_empty() {
                                self.remove_game(game_name);
                                room.write().await.clear_finished_game(now);
                            } else {
                                game_still_live = true;
                            }
                        }
                        None => room.write().await.game_name = None,
                    }
                }
                if game_still_live {
                    continue;
                }

                let room_name = {
                    let mut runtime = room.write().await;
                    if runtime.eligible_for_retirement(now, room_cfg.empty_room_retirement_secs, room_cfg.max_room_age_secs) {
                        runtime.retire();
                        Some(runtime.room.name.clone())
                    } else {
                        None
                    }
                };
                if let Some(room_name) = room_name {
                    self.remove_room(&room_name);
                    if let Err(err) = store.remove_room(&room_name).await {
                        tracing::warn!(error = %err, room = %room_name, "failed to remove retired room from the store");
                    }
                    metrics.increment_rooms_retired();
                    tracing::info!(room = %room_name, "retired");
                    retired.push(room_name);
                }
            }
        }
        retired
    }
}
