//! The per-connection driver (§4.11): framing, the login handshake, scope
//! hand-off, and the periodic server push.

use crate::admin::{AdminControl, AdminError};
use crate::auth::{LegacyRegistration, UserDirectory};
use crate::chat::{ChatLog, ChatRejection};
use crate::config::{ProtocolConfig, RoomConfig};
use crate::domain::{parse_scope_string, scope_string, Lobby, Message, ScopeLevel, User, MAIN_LOBBY_NAME};
use crate::map_provider::MapProvider;
use crate::metrics::ServerMetrics;
use crate::protocol::{Frame, FrameCodec, FrameError, MessageValidator, Outbound, ValidationError};
use crate::registry::{ScopeRegistry, SharedGame, SharedLobby, SharedRoom};
use crate::server::game::{classify, GameEventClass, GameRuntime};
use crate::server::lobby::{build_room, random_join_code, random_room_suffix, CreateRoomRequest, LobbyRuntime};
use crate::server::room::{JoinGameNowOutcome, RoomEvent, RoomRuntime};
use crate::server::ProtocolError;
use crate::store::GameStore;
use rand::RngExt;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::io::{split, AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

const SERVER_PUSH_INTERVAL_SECS: u64 = 5;
/// The server version reported in `{"server":...}` pushes and `LOGGED_IN`.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The collaborators every `ClientSession` needs, shared across the process.
pub struct SessionServices {
    pub store: Arc<dyn GameStore>,
    pub registry: Arc<ScopeRegistry>,
    pub users: Arc<UserDirectory>,
    pub metrics: Arc<ServerMetrics>,
    pub map_provider: Option<Arc<MapProvider>>,
    pub room_cfg: RoomConfig,
    pub protocol_cfg: ProtocolConfig,
}

/// One level of the scope stack the session is currently nested in.
#[derive(Debug, Clone)]
struct ScopeFrame {
    level: ScopeLevel,
    name: String,
}

/// What a per-scope message handler decided should happen next.
enum Outcome {
    Stay,
    Leave,
    Enter(ScopeLevel, String),
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

fn random_session_uid() -> String {
    const HEX_CHARS: &[u8] = b"0123456789abcdef";
    let mut rng = rand::rng();
    (0..16)
        .map(|_| HEX_CHARS[rng.random_range(0..HEX_CHARS.len())] as char)
        .collect()
}

/// Drives one accepted TCP connection end to end. Spawned once per accept by
/// the listener loop in `main`.
pub async fn run(stream: TcpStream, peer: std::net::SocketAddr, services: Arc<SessionServices>) {
    let session_uid = random_session_uid();
    let (read_half, write_half) = split(stream);
    let mut reader = FrameCodec::new(read_half);
    let mut writer = FrameCodec::new(write_half);
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    services.metrics.increment_clients_connected();
    services.registry.mark_session_live(&session_uid);
    info!(session = %session_uid, %peer, "client connected");

    let greeting = Outbound::Server {
        version: SERVER_VERSION.to_string(),
        n_clients: services.registry.live_session_count(),
    };
    if writer.write_frame(&greeting.to_text()).await.is_err() {
        cleanup(&services, &session_uid, None, &[]).await;
        return;
    }

    let user = match login_handshake(&mut reader, &mut writer, &services).await {
        Some(user) => user,
        None => {
            cleanup(&services, &session_uid, None, &[]).await;
            return;
        }
    };

    let mut user = user;
    let mut stack = resolve_resumption(&services.registry, &user, services.room_cfg.resumption_window_secs).await;

    'scopes: loop {
        let frame = stack.last().expect("scope stack is never empty");
        let scope_str = scope_string(frame.level, &frame.name);
        if writer.write_frame(&Outbound::Scope(scope_str.clone()).to_text()).await.is_err() {
            break;
        }
        let _ = services.users.set_last_scope(&mut user, scope_str).await;

        let outcome = run_scope(
            &mut reader,
            &mut writer,
            &mut rx,
            &services,
            &session_uid,
            &user.uid,
            frame.level,
            frame.name.clone(),
            &tx,
        )
        .await;

        match outcome {
            ScopeLoopResult::Leave => {
                if stack.len() > 1 {
                    stack.pop();
                } else {
                    // Already at MainLobby; LEAVE is a no-op there.
                    let _ = writer
                        .write_frame(&Outbound::Info("Already at MainLobby.".to_string()).to_text())
                        .await;
                }
            }
            ScopeLoopResult::Enter(level, name) => {
                stack.push(ScopeFrame { level, name });
            }
            ScopeLoopResult::Disconnected => break 'scopes,
        }
    }

    let roster: Vec<(ScopeLevel, String)> = stack.iter().map(|f| (f.level, f.name.clone())).collect();
    cleanup(&services, &session_uid, Some(&user.uid), &roster).await;
}

async fn login_handshake<R, W>(
    reader: &mut FrameCodec<R>,
    writer: &mut FrameCodec<W>,
    services: &SessionServices,
) -> Option<User>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let message = match read_validated(reader, writer).await {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(()) => return None,
        };

        let now = now_ts();
        let result: anyhow::Result<(User, Outbound)> = match message.kind.as_str() {
            "LOGIN_TOKEN" => login_with_token(&message, services, now).await,
            "LOGIN" if services.protocol_cfg.legacy_login_enabled => login_legacy(&message, services, now).await,
            "REGISTER" if services.protocol_cfg.legacy_login_enabled => register_legacy(&message, services, now).await,
            "LOGIN" | "REGISTER" => {
                Err(anyhow::anyhow!("legacy login/register is disabled by configuration"))
            }
            other => {
                let _ = writer
                    .write_frame(&Outbound::Error(format!("expected a login message, got \"{other}\"")).to_text())
                    .await;
                continue;
            }
        };

        match result {
            Ok((mut user, login_event)) => {
                services.users.login_touch(&mut user, now).await.ok();
                if writer.write_frame(&login_event.to_text()).await.is_err() {
                    return None;
                }
                return Some(user);
            }
            Err(err) => {
                warn!(error = %err, "login failed");
                if writer.write_frame(&Outbound::Error("Login failed".to_string()).to_text()).await.is_err() {
                    return None;
                }
            }
        }
    }
}

async fn login_with_token(message: &Message, services: &SessionServices, now: i64) -> anyhow::Result<(User, Outbound)> {
    let token = message
        .payload
        .get("t")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("payload.t must be a string"))?;
    let identity = services.users.verify_token(token).await?;
    let user = services
        .users
        .get_or_register_by_account(&identity.account_id, &identity.display_name, now)
        .await?;
    let event = Outbound::event(
        "LOGGED_IN",
        object([
            ("uid", Value::String(user.uid.clone())),
            ("account_id", Value::String(identity.account_id)),
            ("display_name", Value::String(identity.display_name)),
        ]),
    );
    Ok((user, event))
}

async fn login_legacy(message: &Message, services: &SessionServices, _now: i64) -> anyhow::Result<(User, Outbound)> {
    let uid = message
        .payload
        .get("uid")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("payload.uid must be a string"))?;
    let secret = message
        .payload
        .get("secret")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("payload.secret must be a string"))?;
    let user = services.users.authenticate(uid, secret).await?;
    let event = Outbound::event("LOGGED_IN", object([("uid", Value::String(user.uid.clone()))]));
    Ok((user, event))
}

async fn register_legacy(message: &Message, services: &SessionServices, now: i64) -> anyhow::Result<(User, Outbound)> {
    let name = message
        .payload
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("payload.name must be a string"))?;
    let upload_ts = message
        .payload
        .get("upload_ts")
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow::anyhow!("payload.upload_ts must be an integer"))?;
    let wsid = message
        .payload
        .get("wsid")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("payload.wsid must be a string"))?;

    let user = services
        .users
        .get_or_register_legacy(LegacyRegistration { name, upload_ts, wsid }, now)
        .await?;
    let event = Outbound::event(
        "REGISTERED",
        object([
            ("uid", Value::String(user.uid.clone())),
            ("secret", Value::String(user.secret.clone())),
        ]),
    );
    Ok((user, event))
}

fn object<const N: usize>(entries: [(&str, Value); N]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert(key.to_string(), value);
    }
    map
}

/// Reads one frame and validates it, replying with `{"error":...}` and
/// looping on a bad envelope rather than dropping the connection (§4.2).
async fn read_validated<R, W>(reader: &mut FrameCodec<R>, writer: &mut FrameCodec<W>) -> Result<Option<Message>, ()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let frame = match reader.read_frame().await {
        Ok(frame) => frame,
        Err(FrameError::Closed) => return Err(()),
        Err(err) => {
            warn!(error = %err, "frame transport fault, disconnecting");
            return Err(());
        }
    };

    let text = match frame {
        Frame::Text(text) => text,
        Frame::End => return Err(()),
    };

    match MessageValidator::parse(&text, now_ts()) {
        Ok(message) => Ok(Some(message)),
        Err(ValidationError::NotJson(reason)) | Err(ValidationError::BadPayload(reason)) => {
            if writer.write_frame(&Outbound::Error(reason).to_text()).await.is_err() {
                return Err(());
            }
            Ok(None)
        }
    }
}

/// Walks `user.last_scope` down to the deepest still-live scope (§4.11
/// "Resumption"), stopping at the first missing hop. Always returns a
/// non-empty stack rooted at MainLobby.
async fn resolve_resumption(registry: &ScopeRegistry, user: &User, resumption_window_secs: u64) -> Vec<ScopeFrame> {
    let root = vec![ScopeFrame {
        level: ScopeLevel::MainLobby,
        name: MAIN_LOBBY_NAME.to_string(),
    }];

    let Some(last_scope) = &user.last_scope else {
        return root;
    };
    if now_ts() - user.last_seen > resumption_window_secs as i64 {
        return root;
    }
    let Some((level, name)) = parse_scope_string(last_scope) else {
        return root;
    };

    match level {
        ScopeLevel::MainLobby => root,
        ScopeLevel::Lobby => {
            if registry.lobby(name).is_some() {
                vec![root[0].clone(), ScopeFrame { level, name: name.to_string() }]
            } else {
                root
            }
        }
        ScopeLevel::Room => {
            let Some(room) = registry.room(name) else { return root };
            let room = room.read().await;
            let lobby_name = room.room.lobby.clone();
            drop(room);
            if registry.lobby(&lobby_name).is_some() {
                vec![
                    root[0].clone(),
                    ScopeFrame { level: ScopeLevel::Lobby, name: lobby_name },
                    ScopeFrame { level: ScopeLevel::Room, name: name.to_string() },
                ]
            } else {
                // Room's lobby is gone; that's the deepest hop that still
                // resolves, so traversal stops at MainLobby.
                root
            }
        }
        ScopeLevel::Game => {
            let Some(game) = registry.game(name) else { return root };
            let game = game.read().await;
            let lobby_name = game.session.lobby.clone();
            let room_name = game.session.room.clone();
            drop(game);
            if registry.lobby(&lobby_name).is_none() {
                return root;
            }
            if registry.room(&room_name).is_none() {
                // The game outlived its room (e.g. retirement swept it
                // while the game itself is still live): stop at Lobby
                // instead of falling all the way back to MainLobby.
                return vec![root[0].clone(), ScopeFrame { level: ScopeLevel::Lobby, name: lobby_name }];
            }
            vec![
                root[0].clone(),
                ScopeFrame { level: ScopeLevel::Lobby, name: lobby_name },
                ScopeFrame { level: ScopeLevel::Room, name: room_name },
                ScopeFrame { level: ScopeLevel::Game, name: name.to_string() },
            ]
        }
    }
}

enum ScopeLoopResult {
    Leave,
    Enter(ScopeLevel, String),
    Disconnected,
}

/// Runs the read loop for one scope until it's left, a hand-off is
/// requested, or the connection dies.
#[allow(clippy::too_many_arguments)]
async fn run_scope<R, W>(
    reader: &mut FrameCodec<R>,
    writer: &mut FrameCodec<W>,
    rx: &mut mpsc::UnboundedReceiver<Outbound>,
    services: &SessionServices,
    session_uid: &str,
    uid: &str,
    level: ScopeLevel,
    name: String,
    tx: &UnboundedSender<Outbound>,
) -> ScopeLoopResult
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match level {
        ScopeLevel::MainLobby | ScopeLevel::Lobby => {
            run_lobby_scope(reader, writer, rx, services, uid, &name, tx).await
        }
        ScopeLevel::Room => run_room_scope(reader, writer, rx, services, session_uid, uid, &name, tx).await,
        ScopeLevel::Game => run_game_scope(reader, writer, rx, services, uid, &name, tx).await,
    }
}

async fn push_outbound<W>(writer: &mut FrameCodec<W>, outbound: &Outbound) -> bool
where
    W: AsyncWrite + Unpin,
{
    writer.write_frame(&outbound.to_text()).await.is_ok()
}

// ---------------------------------------------------------------------
// MainLobby / Lobby
// ---------------------------------------------------------------------

async fn run_lobby_scope<R, W>(
    reader: &mut FrameCodec<R>,
    writer: &mut FrameCodec<W>,
    rx: &mut mpsc::UnboundedReceiver<Outbound>,
    services: &SessionServices,
    uid: &str,
    name: &str,
    tx: &UnboundedSender<Outbound>,
) -> ScopeLoopResult
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Some(lobby) = services.registry.lobby(name) else {
        return ScopeLoopResult::Leave;
    };

    {
        let mut runtime = lobby.write().await;
        runtime.join(uid);
        runtime.register_sender(uid, tx.clone());
    }
    services.metrics.increment_lobbies_entered();
    if !push_outbound(writer, &lobby_info(&lobby, services).await).await {
        leave_lobby(&lobby, uid).await;
        return ScopeLoopResult::Disconnected;
    }

    let mut push_tick = interval(Duration::from_secs(services.room_cfg.lobby_push_interval_secs));
    push_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut server_tick = interval(Duration::from_secs(SERVER_PUSH_INTERVAL_SECS));
    server_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            message = read_validated(reader, writer) => {
                match message {
                    Ok(Some(message)) => {
                        match handle_lobby_message(&lobby, uid, name, message, services).await {
                            (Outcome::Stay, Some(outbound)) => {
                                if !push_outbound(writer, &outbound).await {
                                    leave_lobby(&lobby, uid).await;
                                    return ScopeLoopResult::Disconnected;
                                }
                            }
                            (Outcome::Stay, None) => {}
                            (Outcome::Leave, _) => {
                                leave_lobby(&lobby, uid).await;
                                return ScopeLoopResult::Leave;
                            }
                            (Outcome::Enter(level, target), _) => {
                                leave_lobby(&lobby, uid).await;
                                return ScopeLoopResult::Enter(level, target);
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(()) => {
                        leave_lobby(&lobby, uid).await;
                        return ScopeLoopResult::Disconnected;
                    }
                }
            }
            Some(outbound) = rx.recv() => {
                if !push_outbound(writer, &outbound).await {
                    leave_lobby(&lobby, uid).await;
                    return ScopeLoopResult::Disconnected;
                }
            }
            _ = push_tick.tick() => {
                if !push_outbound(writer, &lobby_info(&lobby, services).await).await {
                    leave_lobby(&lobby, uid).await;
                    return ScopeLoopResult::Disconnected;
                }
            }
            _ = server_tick.tick() => {
                let outbound = Outbound::Server {
                    version: SERVER_VERSION.to_string(),
                    n_clients: services.registry.live_session_count(),
                };
                if !push_outbound(writer, &outbound).await {
                    leave_lobby(&lobby, uid).await;
                    return ScopeLoopResult::Disconnected;
                }
            }
        }
    }
}

async fn leave_lobby(lobby: &SharedLobby, uid: &str) {
    lobby.write().await.leave(uid);
}

async fn lobby_info(lobby: &SharedLobby, services: &SessionServices) -> Outbound {
    let runtime = lobby.read().await;
    let n_rooms = services.registry.rooms_in_lobby(&runtime.lobby.name).len();
    Outbound::event(
        "LOBBY_INFO",
        object([
            ("name", Value::String(runtime.lobby.name.clone())),
            ("n_clients", Value::Number(runtime.clients.len().into())),
            ("n_rooms", Value::Number(n_rooms.into())),
            ("is_public", Value::Bool(runtime.lobby.is_public)),
        ]),
    )
}

async fn handle_lobby_message(
    lobby: &SharedLobby,
    uid: &str,
    lobby_name: &str,
    message: Message,
    services: &SessionServices,
) -> (Outcome, Option<Outbound>) {
    let is_main_lobby = lobby_name == MAIN_LOBBY_NAME;

    match message.kind.as_str() {
        "LEAVE" => (Outcome::Leave, None),

        "SEND_CHAT" => {
            let chat_outcome = {
                let runtime = lobby.read().await;
                dispatch_chat(&runtime.chat, services.store.as_ref(), uid, &message).await
            };
            match chat_outcome {
                Ok(echo) => {
                    lobby.read().await.broadcast(&echo);
                    (Outcome::Stay, None)
                }
                Err(outbound) => (Outcome::Stay, Some(outbound)),
            }
        }

        "ADD_ADMIN" | "RM_ADMIN" | "ADD_MOD" | "RM_MOD" => {
            let mut runtime = lobby.write().await;
            let outbound = dispatch_admin(
                &mut runtime.lobby.admins,
                &mut runtime.lobby.mods,
                uid,
                &message,
            );
            (Outcome::Stay, outbound)
        }

        "CREATE_LOBBY" if is_main_lobby => {
            let Some(name) = message.payload.get("name").and_then(Value::as_str) else {
                return (Outcome::Stay, Some(ProtocolError::BadPayload("payload.name must be a string".to_string()).to_outbound()));
            };
            match services.store.find_lobby(name).await {
                Ok(Some(_)) => (
                    Outcome::Stay,
                    Some(ProtocolError::ScopeLogic(format!("Lobby named {name} already exists.")).to_outbound()),
                ),
                Ok(None) => {
                    let new_lobby = Lobby::game_lobby(random_session_uid(), name.to_string(), now_ts());
                    if services.store.insert_lobby(new_lobby.clone()).await.is_err() {
                        return (Outcome::Stay, Some(Outbound::Error("Could not create lobby.".to_string())));
                    }
                    services.registry.register_lobby(LobbyRuntime::new(new_lobby));
                    lobby.read().await.broadcast(&Outbound::Info(format!("Lobby named {name} created successfully.")));
                    (Outcome::Stay, None)
                }
                Err(_) => (Outcome::Stay, Some(Outbound::Error("Could not create lobby.".to_string()))),
            }
        }

        "JOIN_LOBBY" if is_main_lobby => {
            let Some(name) = message.payload.get("name").and_then(Value::as_str) else {
                return (Outcome::Stay, Some(ProtocolError::BadPayload("payload.name must be a string".to_string()).to_outbound()));
            };
            if services.registry.lobby(name).is_some() {
                (Outcome::Enter(ScopeLevel::Lobby, name.to_string()), None)
            } else {
                (Outcome::Stay, Some(ProtocolError::ScopeLogic(format!("No such lobby: {name}")).to_outbound()))
            }
        }

        "LIST_LOBBIES" => {
            let names = services.registry.lobby_names();
            let mut summaries = Vec::with_capacity(names.len());
            for lobby_name in names {
                if let Some(shared) = services.registry.lobby(&lobby_name) {
                    let runtime = shared.read().await;
                    let n_rooms = services.registry.rooms_in_lobby(&runtime.lobby.name).len();
                    summaries.push(serde_json::json!({
                        "name": runtime.lobby.name,
                        "n_clients": runtime.clients.len(),
                        "n_rooms": n_rooms,
                        "is_public": runtime.lobby.is_public,
                    }));
                }
            }
            (
                Outcome::Stay,
                Some(Outbound::event(
                    "LOBBY_LIST",
                    object([("lobbies", Value::Array(summaries))]),
                )),
            )
        }

        "CREATE_ROOM" => match handle_create_room(lobby_name, &message, services).await {
            Ok(room_name) => {
                lobby.read().await.broadcast(&Outbound::event(
                    "NEW_ROOM",
                    object([("name", Value::String(room_name.clone()))]),
                ));
                (Outcome::Enter(ScopeLevel::Room, room_name), None)
            }
            Err(err) => (Outcome::Stay, Some(err.to_outbound())),
        },

        "JOIN_ROOM" => {
            let Some(name) = message.payload.get("name").and_then(Value::as_str) else {
                return (Outcome::Stay, Some(ProtocolError::BadPayload("payload.name must be a string".to_string()).to_outbound()));
            };
            match services.registry.room(name) {
                Some(room) if room.read().await.room.is_public && !room.read().await.room.is_retired => {
                    (Outcome::Enter(ScopeLevel::Room, name.to_string()), None)
                }
                Some(_) => (Outcome::Stay, Some(ProtocolError::ScopeLogic("That room is not joinable.".to_string()).to_outbound())),
                None => (Outcome::Stay, Some(ProtocolError::ScopeLogic(format!("No such room: {name}")).to_outbound())),
            }
        }

        "JOIN_CODE" => {
            let Some(code) = message.payload.get("code").and_then(Value::as_str) else {
                return (Outcome::Stay, Some(ProtocolError::BadPayload("payload.code must be a string".to_string()).to_outbound()));
            };
            match services.store.find_room_by_join_code(code).await {
                Ok(Some(room)) if services.registry.room(&room.name).is_some() => {
                    (Outcome::Enter(ScopeLevel::Room, room.name), None)
                }
                Ok(_) => (Outcome::Stay, Some(ProtocolError::ScopeLogic("No live room with that code.".to_string()).to_outbound())),
                Err(_) => (Outcome::Stay, Some(Outbound::Error("Could not look up that code.".to_string()))),
            }
        }

        _ => (Outcome::Stay, None),
    }
}

async fn handle_create_room(lobby_name: &str, message: &Message, services: &SessionServices) -> Result<String, ProtocolError> {
    let payload = &message.payload;
    let name = payload
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::BadPayload("payload.name must be a string".to_string()))?
        .to_string();
    let as_u8 = |key: &str, default: u8| payload.get(key).and_then(Value::as_u64).map_or(default, |v| v as u8);
    let as_u32 = |key: &str, default: u32| payload.get(key).and_then(Value::as_u64).map_or(default, |v| v as u32);
    let game_opts = payload.get("game_opts").and_then(Value::as_object).cloned().unwrap_or_default();

    let request = CreateRoomRequest {
        name,
        player_limit: as_u8("player_limit", services.room_cfg.min_players),
        n_teams: as_u8("n_teams", services.room_cfg.min_teams),
        maps_required: as_u32("maps_required", services.room_cfg.min_maps_required),
        min_secs: as_u32("min_secs", services.room_cfg.min_map_secs),
        max_secs: as_u32("max_secs", services.room_cfg.max_map_secs),
        max_difficulty: as_u8("max_difficulty", services.room_cfg.max_difficulty_ceiling),
        game_opts,
    };

    let suffix = random_room_suffix(services.protocol_cfg.room_suffix_hex_len);
    let join_code = random_join_code(&services.protocol_cfg);
    let mut room = build_room(&services.room_cfg, lobby_name, request, &suffix, join_code, now_ts())?;

    let mut still_needed = room.maps_required as usize;
    if let Some(provider) = &services.map_provider {
        let pooled = provider.take_pooled(still_needed, room.min_secs, room.max_secs, room.max_difficulty).await;
        still_needed -= pooled.len();
        room.map_list = pooled.into_iter().map(|map| map.track_id).collect();
    }

    services
        .store
        .upsert_room(room.clone())
        .await
        .map_err(|err| ProtocolError::BadPayload(format!("could not persist room: {err}")))?;
    services.metrics.increment_rooms_created();
    let room_name = room.name.clone();
    services.registry.register_room(RoomRuntime::new(room.clone()));

    if still_needed > 0 {
        if let Some(provider) = services.map_provider.clone() {
            let store = services.store.clone();
            let registry = services.registry.clone();
            let (min_secs, max_secs, max_difficulty) = (room.min_secs, room.max_secs, room.max_difficulty);
            let room_name = room_name.clone();
            tokio::spawn(async move {
                let mut rx = provider.get_some_maps(still_needed, min_secs, max_secs, max_difficulty).await;
                let mut extra = Vec::new();
                while let Some(map) = rx.recv().await {
                    extra.push(map.track_id);
                }
                if extra.is_empty() {
                    return;
                }
                let Some(room_rt) = registry.room(&room_name) else { return };
                let mut runtime = room_rt.write().await;
                runtime.room.map_list.extend(extra);
                let snapshot = runtime.room.clone();
                runtime.broadcast(&Outbound::event_empty("MAPS_LOADED"));
                drop(runtime);
                if let Err(err) = store.upsert_room(snapshot).await {
                    warn!(error = %err, room = %room_name, "failed to persist map list after background load");
                }
            });
        }
    }

    Ok(room_name)
}

// ---------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
async fn run_room_scope<R, W>(
    reader: &mut FrameCodec<R>,
    writer: &mut FrameCodec<W>,
    rx: &mut mpsc::UnboundedReceiver<Outbound>,
    services: &SessionServices,
    session_uid: &str,
    uid: &str,
    name: &str,
    tx: &UnboundedSender<Outbound>,
) -> ScopeLoopResult
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Some(room) = services.registry.room(name) else {
        return ScopeLoopResult::Leave;
    };

    {
        let mut runtime = room.write().await;
        if let Err(err) = runtime.join(uid) {
            let _ = push_outbound(writer, &err.to_outbound()).await;
            return ScopeLoopResult::Leave;
        }
        runtime.register_sender(uid, tx.clone());
    }
    services.metrics.increment_rooms_joined();
    let _ = session_uid;

    if !push_outbound(writer, &room_info(&room).await).await
        || !push_outbound(writer, &list_teams(&room).await).await
        || !push_outbound(writer, &list_ready_status(&room).await).await
    {
        room.write().await.leave(uid, now_ts());
        return ScopeLoopResult::Disconnected;
    }

    let mut push_tick = interval(Duration::from_secs(services.room_cfg.lobby_push_interval_secs));
    push_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut server_tick = interval(Duration::from_secs(SERVER_PUSH_INTERVAL_SECS));
    server_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            message = read_validated(reader, writer) => {
                match message {
                    Ok(Some(message)) => {
                        match handle_room_message(&room, uid, message, services).await {
                            (Outcome::Stay, Some(outbound)) => {
                                if !push_outbound(writer, &outbound).await {
                                    room.write().await.leave(uid, now_ts());
                                    return ScopeLoopResult::Disconnected;
                                }
                            }
                            (Outcome::Stay, None) => {}
                            (Outcome::Leave, _) => {
                                room.write().await.leave(uid, now_ts());
                                return ScopeLoopResult::Leave;
                            }
                            (Outcome::Enter(level, target), _) => {
                                return ScopeLoopResult::Enter(level, target);
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(()) => {
                        room.write().await.leave(uid, now_ts());
                        return ScopeLoopResult::Disconnected;
                    }
                }
            }
            Some(outbound) = rx.recv() => {
                if !push_outbound(writer, &outbound).await {
                    room.write().await.leave(uid, now_ts());
                    return ScopeLoopResult::Disconnected;
                }
            }
            _ = push_tick.tick() => {
                let ok = push_outbound(writer, &room_info(&room).await).await
                    && push_outbound(writer, &list_teams(&room).await).await
                    && push_outbound(writer, &list_ready_status(&room).await).await;
                if !ok {
                    room.write().await.leave(uid, now_ts());
                    return ScopeLoopResult::Disconnected;
                }
            }
            _ = server_tick.tick() => {
                let outbound = Outbound::Server {
                    version: SERVER_VERSION.to_string(),
                    n_clients: services.registry.live_session_count(),
                };
                if !push_outbound(writer, &outbound).await {
                    room.write().await.leave(uid, now_ts());
                    return ScopeLoopResult::Disconnected;
                }
            }
        }
    }
}

async fn room_info(room: &SharedRoom) -> Outbound {
    let runtime = room.read().await;
    Outbound::event(
        "ROOM_INFO",
        object([
            ("name", Value::String(runtime.room.name.clone())),
            ("n_clients", Value::Number(runtime.clients.len().into())),
            ("player_limit", Value::Number(runtime.room.player_limit.into())),
            ("is_open", Value::Bool(runtime.room.is_open)),
            ("game_start_time", Value::Number(runtime.room.game_start_time.into())),
        ]),
    )
}

async fn list_teams(room: &SharedRoom) -> Outbound {
    let runtime = room.read().await;
    Outbound::event(
        "LIST_TEAMS",
        object([("teams", serde_json::to_value(&runtime.teams).unwrap_or(Value::Null))]),
    )
}

async fn list_ready_status(room: &SharedRoom) -> Outbound {
    let runtime = room.read().await;
    let status: Map<String, Value> = runtime
        .players_ready
        .iter()
        .map(|(uid, ready)| (uid.clone(), Value::Bool(*ready)))
        .collect();
    Outbound::event("LIST_READY_STATUS", object([("ready", Value::Object(status))]))
}

async fn handle_room_message(room: &SharedRoom, uid: &str, message: Message, services: &SessionServices) -> (Outcome, Option<Outbound>) {
    match message.kind.as_str() {
        "LEAVE" => (Outcome::Leave, None),

        "SEND_CHAT" => {
            let chat_outcome = {
                let runtime = room.read().await;
                dispatch_chat(&runtime.chat, services.store.as_ref(), uid, &message).await
            };
            match chat_outcome {
                Ok(echo) => {
                    room.read().await.broadcast(&echo);
                    (Outcome::Stay, None)
                }
                Err(outbound) => (Outcome::Stay, Some(outbound)),
            }
        }

        "ADD_ADMIN" | "RM_ADMIN" | "ADD_MOD" | "RM_MOD" => {
            let mut runtime = room.write().await;
            let outbound = dispatch_admin(&mut runtime.room.admins, &mut runtime.room.mods, uid, &message);
            (Outcome::Stay, outbound)
        }

        "KICK_PLAYER" => {
            let Some(target) = message.payload.get("uid").and_then(Value::as_str) else {
                return (Outcome::Stay, Some(ProtocolError::BadPayload("payload.uid must be a string".to_string()).to_outbound()));
            };
            let mut runtime = room.write().await;
            match AdminControl::kick_player(&runtime.room.admins, &runtime.room.mods, &mut runtime.room.kicked_players, uid, target.to_string()) {
                Ok(()) => {
                    runtime.broadcast(&Outbound::event("PLAYER_LEFT", object([("uid", Value::String(target.to_string()))])));
                    (Outcome::Stay, None)
                }
                Err(err) => (Outcome::Stay, Some(ProtocolError::from(err).to_outbound())),
            }
        }

        "JOIN_TEAM" => {
            let Some(team_n) = message.payload.get("team_n").and_then(Value::as_u64) else {
                return (Outcome::Stay, Some(ProtocolError::BadPayload("payload.team_n must be an integer".to_string()).to_outbound()));
            };
            let mut runtime = room.write().await;
            match runtime.join_team(uid, team_n as u8, now_ts()) {
                Ok(()) => {
                    runtime.broadcast(&Outbound::event(
                        "PLAYER_JOINED_TEAM",
                        object([("uid", Value::String(uid.to_string())), ("team_n", Value::Number(team_n.into()))]),
                    ));
                    (Outcome::Stay, None)
                }
                Err(err) => (Outcome::Stay, Some(err.to_outbound())),
            }
        }

        "MARK_READY" => {
            let Some(ready) = message.payload.get("ready").and_then(Value::as_bool) else {
                return (Outcome::Stay, Some(ProtocolError::BadPayload("payload.ready must be a bool".to_string()).to_outbound()));
            };
            let mut runtime = room.write().await;
            match runtime.mark_ready(uid, ready, now_ts(), services.room_cfg.countdown_secs) {
                Ok(event) => {
                    runtime.broadcast(&Outbound::event(
                        "PLAYER_READY",
                        object([("uid", Value::String(uid.to_string())), ("ready", Value::Bool(ready))]),
                    ));
                    (Outcome::Stay, room_event_outbound(event))
                }
                Err(err) => (Outcome::Stay, Some(err.to_outbound())),
            }
        }

        "FORCE_START" => {
            let mut runtime = room.write().await;
            match runtime.force_start(uid, now_ts(), services.room_cfg.countdown_secs) {
                Ok(event) => (Outcome::Stay, room_event_outbound(event)),
                Err(err) => (Outcome::Stay, Some(err.to_outbound())),
            }
        }

        "JOIN_GAME_NOW" => {
            let room_name = room.read().await.room.name.clone();
            let game_name = format!("{room_name}##{}", random_room_suffix(4));
            let grace_secs = services.room_cfg.countdown_join_grace_secs;

            let mut outcome = room.write().await.join_game_now(uid, now_ts(), game_name.clone(), grace_secs);
            if let Ok(JoinGameNowOutcome::Wait(wait_secs)) = outcome {
                tokio::time::sleep(Duration::from_secs(wait_secs.max(1))).await;
                outcome = room.write().await.join_game_now(uid, now_ts(), game_name.clone(), grace_secs);
            }

            match outcome {
                Ok(JoinGameNowOutcome::Admit(Some(session))) => {
                    let started_name = session.name.clone();
                    if services.store.insert_game(session.clone()).await.is_err() {
                        return (Outcome::Stay, Some(Outbound::Error("Could not start the game.".to_string())));
                    }
                    services.metrics.increment_games_started();
                    services.registry.register_game(GameRuntime::new(session));
                    (Outcome::Enter(ScopeLevel::Game, started_name), None)
                }
                Ok(JoinGameNowOutcome::Admit(None)) => {
                    let started_name = room.read().await.game_name.clone().unwrap_or(game_name);
                    (Outcome::Enter(ScopeLevel::Game, started_name), None)
                }
                Ok(JoinGameNowOutcome::Wait(_)) => (
                    Outcome::Stay,
                    Some(ProtocolError::ScopeLogic("Can't join the game early.".to_string()).to_outbound()),
                ),
                Err(err) => (Outcome::Stay, Some(err.to_outbound())),
            }
        }

        _ => (Outcome::Stay, None),
    }
}

fn room_event_outbound(event: RoomEvent) -> Option<Outbound> {
    match event {
        RoomEvent::NoChange => None,
        RoomEvent::CountdownStarted { start_time, forced } => Some(Outbound::event(
            "GAME_STARTING_AT",
            object([
                ("start_time", Value::Number(start_time.into())),
                ("wait_time", serde_json::json!(5.0)),
                ("forced", Value::Bool(forced)),
            ]),
        )),
        RoomEvent::CountdownAborted => Some(Outbound::event_empty("GAME_START_ABORT")),
    }
}

// ---------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------

async fn run_game_scope<R, W>(
    reader: &mut FrameCodec<R>,
    writer: &mut FrameCodec<W>,
    rx: &mut mpsc::UnboundedReceiver<Outbound>,
    services: &SessionServices,
    uid: &str,
    name: &str,
    tx: &UnboundedSender<Outbound>,
) -> ScopeLoopResult
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Some(game) = services.registry.game(name) else {
        return ScopeLoopResult::Leave;
    };

    {
        let mut runtime = game.write().await;
        runtime.join(uid);
        runtime.register_sender(uid, tx.clone());
    }

    if !send_game_entry_burst(writer, &game, uid).await {
        game.write().await.leave(uid);
        return ScopeLoopResult::Disconnected;
    }
    game.read().await.broadcast_except(uid, &Outbound::event("PLAYER_JOINED", object([("uid", Value::String(uid.to_string()))])));

    let mut server_tick = interval(Duration::from_secs(SERVER_PUSH_INTERVAL_SECS));
    server_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            message = read_validated(reader, writer) => {
                match message {
                    Ok(Some(message)) => {
                        match handle_game_message(&game, uid, message, services).await {
                            (Outcome::Stay, Some(outbound)) => {
                                if !push_outbound(writer, &outbound).await {
                                    game.write().await.leave(uid);
                                    return ScopeLoopResult::Disconnected;
                                }
                            }
                            (Outcome::Stay, None) => {}
                            (Outcome::Leave, _) => {
                                game.write().await.leave(uid);
                                return ScopeLoopResult::Leave;
                            }
                            (Outcome::Enter(level, target), _) => {
                                game.write().await.leave(uid);
                                return ScopeLoopResult::Enter(level, target);
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(()) => {
                        game.write().await.leave(uid);
                        return ScopeLoopResult::Disconnected;
                    }
                }
            }
            Some(outbound) = rx.recv() => {
                if !push_outbound(writer, &outbound).await {
                    game.write().await.leave(uid);
                    return ScopeLoopResult::Disconnected;
                }
            }
            _ = server_tick.tick() => {
                let outbound = Outbound::Server {
                    version: SERVER_VERSION.to_string(),
                    n_clients: services.registry.live_session_count(),
                };
                if !push_outbound(writer, &outbound).await {
                    game.write().await.leave(uid);
                    return ScopeLoopResult::Disconnected;
                }
            }
        }
    }
}

/// The entry burst from §4.7 "Entry": status frames, then the bounded replay.
async fn send_game_entry_burst<W>(writer: &mut FrameCodec<W>, game: &SharedGame, uid: &str) -> bool
where
    W: AsyncWrite + Unpin,
{
    let runtime = game.read().await;
    let role = object([(
        "role",
        Value::String(format!("{:?}", AdminControl::role_of(&runtime.session.admins, &runtime.session.mods, uid)).to_lowercase()),
    )]);
    let team = runtime.team_of(uid);
    let (n_msgs, replay) = runtime.replay();

    let admin_status = Outbound::event("ADMIN_MOD_STATUS", role);
    let player_list = Outbound::event("PLAYER_LIST", object([("players", serde_json::to_value(&runtime.session.players).unwrap_or(Value::Null))]));
    let game_info = Outbound::event(
        "GAME_INFO_FULL",
        object([
            ("name", Value::String(runtime.session.name.clone())),
            ("room", Value::String(runtime.session.room.clone())),
            ("lobby", Value::String(runtime.session.lobby.clone())),
            ("team_order", serde_json::to_value(&runtime.session.team_order).unwrap_or(Value::Null)),
            ("team", team.map_or(Value::Null, |t| Value::Number(t.into()))),
        ]),
    );
    let maps_info = Outbound::event("MAPS_INFO_FULL", object([("map_list", serde_json::to_value(&runtime.session.map_list).unwrap_or(Value::Null))]));
    drop(runtime);

    if !push_outbound(writer, &admin_status).await
        || !push_outbound(writer, &player_list).await
        || !push_outbound(writer, &game_info).await
        || !push_outbound(writer, &maps_info).await
    {
        return false;
    }

    if !push_outbound(writer, &Outbound::event("GAME_REPLAY_START", object([("n_msgs", Value::Number(n_msgs.into()))]))).await {
        return false;
    }
    for message in replay {
        if !push_outbound(writer, &Outbound::Echo(message)).await {
            return false;
        }
    }
    push_outbound(writer, &Outbound::event_empty("GAME_REPLAY_END")).await
}

async fn handle_game_message(game: &SharedGame, uid: &str, mut message: Message, services: &SessionServices) -> (Outcome, Option<Outbound>) {
    match classify(&message.kind) {
        GameEventClass::Leave => (Outcome::Leave, None),

        GameEventClass::Chat => {
            let chat_outcome = {
                let runtime = game.read().await;
                dispatch_chat(&runtime.chat, services.store.as_ref(), uid, &message).await
            };
            match chat_outcome {
                Ok(echo) => {
                    game.read().await.broadcast(&echo);
                    (Outcome::Stay, None)
                }
                Err(outbound) => (Outcome::Stay, Some(outbound)),
            }
        }

        GameEventClass::AdminOp => {
            let mut runtime = game.write().await;
            // `KICK_PLAYER` has no `kicked_players` list on `GameSession` to
            // record against (unlike Room); a kick here only broadcasts
            // `PLAYER_LEFT` and relies on clients to act on it.
            let outbound = if message.kind == "KICK_PLAYER" {
                let Some(target) = message.payload.get("uid").and_then(Value::as_str) else {
                    return (Outcome::Stay, Some(ProtocolError::BadPayload("payload.uid must be a string".to_string()).to_outbound()));
                };
                match AdminControl::require_mod_or_admin(&runtime.session.admins, &runtime.session.mods, uid) {
                    Ok(()) => {
                        runtime.broadcast(&Outbound::event("PLAYER_LEFT", object([("uid", Value::String(target.to_string()))])));
                        None
                    }
                    Err(err) => Some(ProtocolError::from(err).to_outbound()),
                }
            } else {
                dispatch_admin(&mut runtime.session.admins, &mut runtime.session.mods, uid, &message)
            };
            (Outcome::Stay, outbound)
        }

        GameEventClass::ModOnlyMapVote => {
            let mut runtime = game.write().await;
            if let Err(err) = AdminControl::require_mod_or_admin(&runtime.session.admins, &runtime.session.mods, uid) {
                return (Outcome::Stay, Some(ProtocolError::from(err).to_outbound()));
            }
            append_game_event(&mut runtime, services, message).await
        }

        GameEventClass::MapVote | GameEventClass::MapLifecycle | GameEventClass::Gameplay => {
            message.user = Some(uid.to_string());
            let mut runtime = game.write().await;
            append_game_event(&mut runtime, services, message).await
        }

        GameEventClass::Ignored => (Outcome::Stay, None),
    }
}

async fn append_game_event(runtime: &mut GameRuntime, services: &SessionServices, message: Message) -> (Outcome, Option<Outbound>) {
    let appended = runtime.append(message);
    if let Err(err) = services.store.append_game_message(&runtime.session.name, appended.clone()).await {
        warn!(error = %err, "failed to persist game message");
    }
    services.metrics.increment_game_messages();
    runtime.broadcast(&Outbound::Echo(appended));
    (Outcome::Stay, None)
}

// ---------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------

/// `SEND_CHAT` handling shared by every scope type (§4.8).
async fn dispatch_chat(chat: &ChatLog, store: &dyn GameStore, uid: &str, message: &Message) -> Result<Outbound, Outbound> {
    let mut stamped = message.clone();
    stamped.user = Some(uid.to_string());
    stamped.ts = now_ts();

    if let Err(rejection) = ChatLog::validate(&stamped) {
        let text = match rejection {
            ChatRejection::BadShape => "Chat payload must be {\"content\": <string>}.",
            ChatRejection::TooLong => "Chat content is too long.",
        };
        return Err(Outbound::Error(text.to_string()));
    }

    if let Err(err) = chat.append(store, stamped.clone()).await {
        warn!(error = %err, "failed to persist chat message");
    }
    Ok(Outbound::Echo(stamped))
}

/// `ADD_ADMIN`/`RM_ADMIN`/`ADD_MOD`/`RM_MOD` shared by every scope with
/// `admins`/`mods` lists (§4.9).
fn dispatch_admin(admins: &mut Vec<String>, mods: &mut Vec<String>, uid: &str, message: &Message) -> Option<Outbound> {
    let Some(target) = message.payload.get("uid").and_then(Value::as_str) else {
        return Some(ProtocolError::BadPayload("payload.uid must be a string".to_string()).to_outbound());
    };

    let result: Result<(), AdminError> = match message.kind.as_str() {
        "ADD_ADMIN" => AdminControl::add_admin(admins, uid, target.to_string()),
        "RM_ADMIN" => AdminControl::remove_admin(admins, uid, target),
        "ADD_MOD" => AdminControl::add_mod(admins, mods, uid, target.to_string()),
        "RM_MOD" => AdminControl::remove_mod(admins, mods, uid, target),
        _ => return None,
    };

    match result {
        Ok(()) => Some(Outbound::event(
            "ADMIN_MOD_STATUS",
            object([("admins", serde_json::to_value(&*admins).unwrap_or(Value::Null)), ("mods", serde_json::to_value(&*mods).unwrap_or(Value::Null))]),
        )),
        Err(err) => Some(ProtocolError::from(err).to_outbound()),
    }
}

/// Releases any scope membership the session still holds and marks the
/// session gone, regardless of which exit path brought us here (§9 "Scoped
/// resource release").
async fn cleanup(services: &SessionServices, session_uid: &str, uid: Option<&str>, roster: &[(ScopeLevel, String)]) {
    if let Some(uid) = uid {
        for (level, name) in roster {
            match level {
                ScopeLevel::MainLobby | ScopeLevel::Lobby => {
                    if let Some(lobby) = services.registry.lobby(name) {
                        lobby.write().await.leave(uid);
                    }
                }
                ScopeLevel::Room => {
                    if let Some(room) = services.registry.room(name) {
                        room.write().await.leave(uid, now_ts());
                    }
                }
                ScopeLevel::Game => {
                    if let Some(game) = services.registry.game(name) {
                        game.write().await.leave(uid);
                    }
                }
            }
        }
    }
    services.registry.mark_session_gone(session_uid);
    services.metrics.decrement_clients_active();
    info!(session = %session_uid, "client disconnected");
}

#[cfg(test)]
mod resumption_tests {
    use super::*;
    use crate::domain::{GameSession, Lobby, Room};
    use crate::server::game::GameRuntime;
    use crate::server::lobby::LobbyRuntime;
    use crate::server::room::RoomRuntime;

    fn sample_user(last_scope: Option<&str>, last_seen: i64) -> User {
        let mut user = User::new("u1".to_string(), "alice".to_string(), "secret".to_string(), 0);
        user.last_scope = last_scope.map(str::to_string);
        user.last_seen = last_seen;
        user
    }

    fn sample_room(name: &str, lobby: &str) -> Room {
        Room {
            name: name.to_string(),
            lobby: lobby.to_string(),
            is_public: true,
            is_open: true,
            is_retired: false,
            join_code: String::new(),
            player_limit: 8,
            n_teams: 2,
            maps_required: 1,
            min_secs: 0,
            max_secs: 0,
            max_difficulty: 0,
            map_list: Vec::new(),
            game_start_time: crate::domain::NOT_SCHEDULED,
            game_start_forced: false,
            game_opts: std::collections::HashMap::new(),
            admins: Vec::new(),
            mods: Vec::new(),
            kicked_players: Vec::new(),
            creation_ts: 0,
        }
    }

    fn sample_game(name: &str, room: &str, lobby: &str) -> GameSession {
        GameSession {
            name: name.to_string(),
            room: room.to_string(),
            lobby: lobby.to_string(),
            players: Vec::new(),
            teams: Vec::new(),
            team_order: Vec::new(),
            map_list: Vec::new(),
            admins: Vec::new(),
            mods: Vec::new(),
            creation_ts: 0,
        }
    }

    #[tokio::test]
    async fn no_last_scope_resumes_to_main_lobby() {
        let registry = ScopeRegistry::new();
        let user = sample_user(None, 0);
        let stack = resolve_resumption(&registry, &user, 120).await;
        assert_eq!(stack.len(), 1);
        assert_eq!(stack[0].level, ScopeLevel::MainLobby);
    }

    #[tokio::test]
    async fn stale_last_scope_resumes_to_main_lobby() {
        let registry = ScopeRegistry::new();
        let scope = scope_string(ScopeLevel::Lobby, "Alpha");
        let user = sample_user(Some(&scope), -1000);
        let stack = resolve_resumption(&registry, &user, 120).await;
        assert_eq!(stack.len(), 1);
        assert_eq!(stack[0].level, ScopeLevel::MainLobby);
    }

    #[tokio::test]
    async fn room_level_resumption_falls_back_when_its_lobby_is_gone() {
        let registry = ScopeRegistry::new();
        registry.register_room(RoomRuntime::new(sample_room("Alpha##a1b2", "Ephemeral")));
        let scope = scope_string(ScopeLevel::Room, "Alpha##a1b2");
        let user = sample_user(Some(&scope), 0);
        let stack = resolve_resumption(&registry, &user, 120).await;
        assert_eq!(stack.len(), 1);
        assert_eq!(stack[0].level, ScopeLevel::MainLobby);
    }

    #[tokio::test]
    async fn room_level_resumption_rebuilds_the_full_stack_when_live() {
        let registry = ScopeRegistry::new();
        registry.register_lobby(LobbyRuntime::new(Lobby::main_lobby("lobby-uid".to_string(), 0)));
        registry.register_room(RoomRuntime::new(sample_room("Alpha##a1b2", MAIN_LOBBY_NAME)));
        let scope = scope_string(ScopeLevel::Room, "Alpha##a1b2");
        let user = sample_user(Some(&scope), 0);
        let stack = resolve_resumption(&registry, &user, 120).await;
        assert_eq!(stack.len(), 3);
        assert_eq!(stack[1].level, ScopeLevel::Lobby);
        assert_eq!(stack[2].level, ScopeLevel::Room);
        assert_eq!(stack[2].name, "Alpha##a1b2");
    }

    #[tokio::test]
    async fn game_level_resumption_falls_back_to_main_lobby_when_lobby_is_gone() {
        let registry = ScopeRegistry::new();
        registry.register_game(GameRuntime::new(sample_game("Alpha##a1b2##g1", "Alpha##a1b2", "Ephemeral")));
        let scope = scope_string(ScopeLevel::Game, "Alpha##a1b2##g1");
        let user = sample_user(Some(&scope), 0);
        let stack = resolve_resumption(&registry, &user, 120).await;
        assert_eq!(stack.len(), 1);
        assert_eq!(stack[0].level, ScopeLevel::MainLobby);
    }

    #[tokio::test]
    async fn game_level_resumption_stops_at_lobby_when_its_room_is_gone() {
        let registry = ScopeRegistry::new();
        registry.register_lobby(LobbyRuntime::new(Lobby::main_lobby("lobby-uid".to_string(), 0)));
        registry.register_game(GameRuntime::new(sample_game("Alpha##a1b2##g1", "Alpha##a1b2", MAIN_LOBBY_NAME)));
        let scope = scope_string(ScopeLevel::Game, "Alpha##a1b2##g1");
        let user = sample_user(Some(&scope), 0);
        let stack = resolve_resumption(&registry, &user, 120).await;
        assert_eq!(stack.len(), 2);
        assert_eq!(stack[0].level, ScopeLevel::MainLobby);
        assert_eq!(stack[1].level, ScopeLevel::Lobby);
        assert_eq!(stack[1].name, MAIN_LOBBY_NAME);
    }

    #[tokio::test]
    async fn game_level_resumption_rebuilds_the_full_stack_when_live() {
        let registry = ScopeRegistry::new();
        registry.register_lobby(LobbyRuntime::new(Lobby::main_lobby("lobby-uid".to_string(), 0)));
        registry.register_room(RoomRuntime::new(sample_room("Alpha##a1b2", MAIN_LOBBY_NAME)));
        registry.register_game(GameRuntime::new(sample_game("Alpha##a1b2##g1", "Alpha##a1b2", MAIN_LOBBY_NAME)));
        let scope = scope_string(ScopeLevel::Game, "Alpha##a1b2##g1");
        let user = sample_user(Some(&scope), 0);
        let stack = resolve_resumption(&registry, &user, 120).await;
        assert_eq!(stack.len(), 4);
        assert_eq!(stack[3].level, ScopeLevel::Game);
        assert_eq!(stack[3].name, "Alpha##a1b2##g1");
    }
}
