//! Persistence abstraction (§4.14, §6): the document store is an out-of-scope
//! external collaborator. `GameStore` is the seam; [`memory::InMemoryStore`] is
//! the only implementation, and what the running server uses.

pub mod memory;

use crate::domain::{GameSession, Lobby, Map, MapPack, Message, RandomMapQueue, Room, User};
use anyhow::Result;
use async_trait::async_trait;

pub use memory::InMemoryStore;

/// Persistence operations over every durable collection named in §6.
///
/// Write paths are "persist changed fields only" in spirit: callers pass a
/// full up-to-date value and the store upserts it, but callers are expected
/// to mutate in memory first and persist on the hot path only when a field
/// that matters across restarts changed (`touch_user`, `touch_room`).
#[async_trait]
pub trait GameStore: Send + Sync {
    async fn upsert_user(&self, user: User) -> Result<()>;
    async fn find_user(&self, uid: &str) -> Result<Option<User>>;
    async fn find_user_by_account_id(&self, account_id: &str) -> Result<Option<User>>;
    async fn touch_user(&self, user: &User) -> Result<()> {
        self.upsert_user(user.clone()).await
    }

    async fn append_chat_message(&self, scope: &str, message: Message) -> Result<()>;
    async fn chat_history(&self, scope: &str) -> Result<Vec<Message>>;

    async fn append_game_message(&self, game_name: &str, message: Message) -> Result<()>;
    async fn game_messages(&self, game_name: &str) -> Result<Vec<Message>>;

    /// Inserts a lobby, failing if one with the same name already exists.
    async fn insert_lobby(&self, lobby: Lobby) -> Result<()>;
    async fn find_lobby(&self, name: &str) -> Result<Option<Lobby>>;
    async fn list_lobbies(&self) -> Result<Vec<Lobby>>;
    async fn remove_lobby(&self, name: &str) -> Result<()>;

    async fn upsert_room(&self, room: Room) -> Result<()>;
    async fn touch_room(&self, room: &Room) -> Result<()> {
        self.upsert_room(room.clone()).await
    }
    async fn find_room(&self, name: &str) -> Result<Option<Room>>;
    async fn find_room_by_join_code(&self, join_code: &str) -> Result<Option<Room>>;
    async fn list_rooms_in_lobby(&self, lobby: &str) -> Result<Vec<Room>>;
    async fn remove_room(&self, name: &str) -> Result<()>;

    async fn insert_game(&self, game: GameSession) -> Result<()>;
    async fn find_game(&self, name: &str) -> Result<Option<GameSession>>;

    async fn upsert_map(&self, map: Map) -> Result<()>;
    async fn find_map(&self, track_id: &str) -> Result<Option<Map>>;
    async fn list_maps(&self) -> Result<Vec<Map>>;

    async fn upsert_map_pack(&self, pack: MapPack) -> Result<()>;
    async fn find_map_pack(&self, pack_id: &str) -> Result<Option<MapPack>>;

    async fn save_random_map_queue(&self, queue: RandomMapQueue) -> Result<()>;
    async fn load_random_map_queue(&self) -> Result<Option<RandomMapQueue>>;

    async fn health_check(&self) -> bool {
        true
    }
}
