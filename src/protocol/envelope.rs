//! Outbound wire shapes (§6): the superset of frames the server can send.
//!
//! Inbound traffic is always the canonical `{type, payload, visibility}`
//! envelope, validated by [`super::validation::MessageValidator`] into a
//! [`crate::domain::Message`]. Outbound traffic additionally includes the
//! control/status shapes below, so `Outbound` carries its own `Serialize`.

use crate::domain::{Message, Visibility};
use serde::Serialize;
use serde_json::{Map, Value};

/// Every shape the server may write to a client connection.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// `{"server": {"version": ..., "n_clients": ...}}`
    Server { version: String, n_clients: u64 },
    /// `{"scope": "<level>|<name>"}`
    Scope(String),
    Error(String),
    Warning(String),
    Info(String),
    /// A typed event frame, e.g. `NEW_ROOM`, `GAME_STARTING_AT`, `PLAYER_LIST`.
    Event {
        kind: String,
        fields: Map<String, Value>,
    },
    /// A validated message echoed back out (chat, gameplay), in canonical envelope shape.
    Echo(Message),
}

impl Outbound {
    pub fn event(kind: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self::Event {
            kind: kind.into(),
            fields,
        }
    }

    pub fn event_empty(kind: impl Into<String>) -> Self {
        Self::event(kind, Map::new())
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Server { version, n_clients } => serde_json::json!({
                "server": { "version": version, "n_clients": n_clients }
            }),
            Self::Scope(scope) => serde_json::json!({ "scope": scope }),
            Self::Error(message) => serde_json::json!({ "error": message }),
            Self::Warning(message) => serde_json::json!({ "warning": message }),
            Self::Info(message) => serde_json::json!({ "info": message }),
            Self::Event { kind, fields } => {
                let mut object = fields.clone();
                object.insert("type".to_string(), Value::String(kind.clone()));
                Value::Object(object)
            }
            Self::Echo(message) => serde_json::json!({
                "type": message.kind,
                "payload": message.payload,
                "visibility": visibility_str(message.visibility),
                "from": message.user,
                "ts": message.ts,
            }),
        }
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        self.to_json().to_string()
    }
}

const fn visibility_str(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Global => "global",
        Visibility::Team => "team",
        Visibility::Map => "map",
        Visibility::None => "none",
    }
}

/// Marker so `Outbound` composes with `serde_json::to_string` call sites that
/// expect a `Serialize` bound (e.g. generic broadcast helpers).
impl Serialize for Outbound {
    fn serialize<Ser>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error>
    where
        Ser: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_frame_matches_wire_shape() {
        let outbound = Outbound::Scope("0|MainLobby".to_string());
        assert_eq!(outbound.to_json(), serde_json::json!({"scope": "0|MainLobby"}));
    }

    #[test]
    fn event_frame_merges_type_into_fields() {
        let mut fields = Map::new();
        fields.insert("name".to_string(), Value::String("Alpha".to_string()));
        let outbound = Outbound::event("NEW_ROOM", fields);
        assert_eq!(
            outbound.to_json(),
            serde_json::json!({"type": "NEW_ROOM", "name": "Alpha"})
        );
    }
}
