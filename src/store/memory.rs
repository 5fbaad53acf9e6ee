//! The in-memory `GameStore` implementation (§4.14). This is what the
//! running server persists to; there is no durable backing.

use super::GameStore;
use crate::domain::{GameSession, Lobby, Map, MapPack, Message, RandomMapQueue, Room, User};
use anyhow::{bail, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryStore {
    users: DashMap<String, User>,
    users_by_account: DashMap<String, String>,
    chat_history: DashMap<String, Vec<Message>>,
    game_messages: DashMap<String, Vec<Message>>,
    lobbies: DashMap<String, Lobby>,
    rooms: DashMap<String, Room>,
    games: DashMap<String, GameSession>,
    maps: DashMap<String, Map>,
    map_packs: DashMap<String, MapPack>,
    random_map_queue: RwLock<Option<RandomMapQueue>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GameStore for InMemoryStore {
    async fn upsert_user(&self, user: User) -> Result<()> {
        if let Some(account_id) = &user.account_id {
            self.users_by_account
                .insert(account_id.clone(), user.uid.clone());
        }
        self.users.insert(user.uid.clone(), user);
        Ok(())
    }

    async fn find_user(&self, uid: &str) -> Result<Option<User>> {
        Ok(self.users.get(uid).map(|entry| entry.clone()))
    }

    async fn find_user_by_account_id(&self, account_id: &str) -> Result<Option<User>> {
        let Some(uid) = self.users_by_account.get(account_id).map(|e| e.clone()) else {
            return Ok(None);
        };
        Ok(self.users.get(&uid).map(|entry| entry.clone()))
    }

    async fn append_chat_message(&self, scope: &str, message: Message) -> Result<()> {
        self.chat_history
            .entry(scope.to_string())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn chat_history(&self, scope: &str) -> Result<Vec<Message>> {
        Ok(self
            .chat_history
            .get(scope)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    async fn append_game_message(&self, game_name: &str, message: Message) -> Result<()> {
        self.game_messages
            .entry(game_name.to_string())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn game_messages(&self, game_name: &str) -> Result<Vec<Message>> {
        Ok(self
            .game_messages
            .get(game_name)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    async fn insert_lobby(&self, lobby: Lobby) -> Result<()> {
        if self.lobbies.contains_key(&lobby.name) {
            bail!("lobby \"{}\" already exists", lobby.name);
        }
        self.lobbies.insert(lobby.name.clone(), lobby);
        Ok(())
    }

    async fn find_lobby(&self, name: &str) -> Result<Option<Lobby>> {
        Ok(self.lobbies.get(name).map(|entry| entry.clone()))
    }

    async fn list_lobbies(&self) -> Result<Vec<Lobby>> {
        Ok(self.lobbies.iter().map(|entry| entry.clone()).collect())
    }

    async fn remove_lobby(&self, name: &str) -> Result<()> {
        self.lobbies.remove(name);
        Ok(())
    }

    async fn upsert_room(&self, room: Room) -> Result<()> {
        self.rooms.insert(room.name.clone(), room);
        Ok(())
    }

    async fn find_room(&self, name: &str) -> Result<Option<Room>> {
        Ok(self.rooms.get(name).map(|entry| entry.clone()))
    }

    async fn find_room_by_join_code(&self, join_code: &str) -> Result<Option<Room>> {
        Ok(self
            .rooms
            .iter()
            .find(|entry| entry.join_code == join_code)
            .map(|entry| entry.clone()))
    }

    async fn list_rooms_in_lobby(&self, lobby: &str) -> Result<Vec<Room>> {
        Ok(self
            .rooms
            .iter()
            .filter(|entry| entry.lobby == lobby)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn remove_room(&self, name: &str) -> Result<()> {
        self.rooms.remove(name);
        Ok(())
    }

    async fn insert_game(&self, game: GameSession) -> Result<()> {
        self.games.insert(game.name.clone(), game);
        Ok(())
    }

    async fn find_game(&self, name: &str) -> Result<Option<GameSession>> {
        Ok(self.games.get(name).map(|entry| entry.clone()))
    }

    async fn upsert_map(&self, map: Map) -> Result<()> {
        self.maps.insert(map.track_id.clone(), map);
        Ok(())
    }

    async fn find_map(&self, track_id: &str) -> Result<Option<Map>> {
        Ok(self.maps.get(track_id).map(|entry| entry.clone()))
    }

    async fn list_maps(&self) -> Result<Vec<Map>> {
        Ok(self.maps.iter().map(|entry| entry.clone()).collect())
    }

    async fn upsert_map_pack(&self, pack: MapPack) -> Result<()> {
        self.map_packs.insert(pack.pack_id.clone(), pack);
        Ok(())
    }

    async fn find_map_pack(&self, pack_id: &str) -> Result<Option<MapPack>> {
        Ok(self.map_packs.get(pack_id).map(|entry| entry.clone()))
    }

    async fn save_random_map_queue(&self, queue: RandomMapQueue) -> Result<()> {
        *self.random_map_queue.write().unwrap() = Some(queue);
        Ok(())
    }

    async fn load_random_map_queue(&self) -> Result<Option<RandomMapQueue>> {
        Ok(self.random_map_queue.read().unwrap().clone())
    }
}
