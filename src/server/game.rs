//! The game event log (§4.7): ordered append-only stream of gameplay
//! messages, broadcast to participants and replayed in full on join.

use crate::chat::ChatLog;
use crate::domain::{scope_string, GameSession, Message, ScopeLevel, Uid};
use crate::protocol::Outbound;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

/// Classification of an inbound message once it reaches the game scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEventClass {
    Leave,
    Chat,
    AdminOp,
    Gameplay,
    MapLifecycle,
    MapVote,
    ModOnlyMapVote,
    Ignored,
}

const MAP_LIFECYCLE_TYPES: &[&str] = &["ENTER_MAP", "LEAVE_MAP", "CP_TIME", "FINAL_TIME"];
const MAP_VOTE_TYPES: &[&str] = &["MAP_REROLL_VOTE_START", "MAP_REROLL_VOTE_SUBMIT"];
const ADMIN_OP_TYPES: &[&str] = &["ADD_ADMIN", "RM_ADMIN", "ADD_MOD", "RM_MOD", "KICK_PLAYER"];

/// Classifies an inbound message type per §4.7 "Event ingestion".
#[must_use]
pub fn classify(kind: &str) -> GameEventClass {
    if kind == "LEAVE" {
        GameEventClass::Leave
    } else if kind == "SEND_CHAT" {
        GameEventClass::Chat
    } else if ADMIN_OP_TYPES.contains(&kind) {
        GameEventClass::AdminOp
    } else if kind == "MOD_MAP_REROLL" {
        GameEventClass::ModOnlyMapVote
    } else if MAP_VOTE_TYPES.contains(&kind) {
        GameEventClass::MapVote
    } else if MAP_LIFECYCLE_TYPES.contains(&kind) {
        GameEventClass::MapLifecycle
    } else if kind.starts_with("G_") {
        GameEventClass::Gameplay
    } else {
        GameEventClass::Ignored
    }
}

/// The durable, ordered event log for one live game.
pub struct GameRuntime {
    pub session: GameSession,
    pub clients: Vec<Uid>,
    pub game_msgs: Vec<Message>,
    pub chat: ChatLog,
    pub senders: HashMap<Uid, UnboundedSender<Outbound>>,
}

impl GameRuntime {
    #[must_use]
    pub fn new(session: GameSession) -> Self {
        let chat = ChatLog::new(scope_string(ScopeLevel::Game, &session.name));
        Self {
            session,
            clients: Vec::new(),
            game_msgs: Vec::new(),
            chat,
            senders: HashMap::new(),
        }
    }

    #[must_use]
    pub fn team_of(&self, uid: &str) -> Option<usize> {
        self.session
            .teams
            .iter()
            .position(|team| team.iter().any(|m| m == uid))
    }

    /// Admits a client to the game roster (§4.7 "Entry"). Idempotent: a
    /// rejoining client is not duplicated.
    pub fn join(&mut self, uid: &str) {
        if !self.clients.iter().any(|c| c == uid) {
            self.clients.push(uid.to_string());
        }
    }

    pub fn leave(&mut self, uid: &str) {
        self.unregister_sender(uid);
        self.clients.retain(|c| c != uid);
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

    pub fn broadcast_except(&self, exclude_uid: &str, outbound: &Outbound) {
        for (uid, tx) in &self.senders {
            if uid != exclude_uid {
                let _ = tx.send(outbound.clone());
            }
        }
    }

    /// Appends a gameplay/map-lifecycle/vote message, stamping `payload.seq`
    /// with the pre-append length (§4.7 "Ordering", §8 invariant 3).
    pub fn append(&mut self, mut message: Message) -> Message {
        let seq = self.game_msgs.len();
        message
            .payload
            .insert("seq".to_string(), Value::Number(seq.into()));
        self.game_msgs.push(message.clone());
        message
    }

    /// Replay bounded by `GAME_REPLAY_START {n_msgs}` / `GAME_REPLAY_END {}`
    /// (§4.7 "Entry", §8 invariant 4).
    #[must_use]
    pub fn replay(&self) -> (usize, Vec<Message>) {
        (self.game_msgs.len(), self.game_msgs.clone())
    }
}
