//! Countdown edge cases: joining the game before the clock elapses, and a
//! ready flip that cancels an unforced countdown.


use raceway_coop_server::config::ProtocolConfig;
use serde_json::json;
use test_helpers::{fast_room_cfg, spawn_server, TestClient};

async fn login(client: &mut TestClient, name: &str) {
    client.recv().await; // greeting
    client.register(name).await;
    client.recv().await; // scope: MainLobby
}

#[tokio::test]
async fn ready_flip_aborts_countdown_and_blocks_early_join() {
    let addr = spawn_server(fast_room_cfg(), ProtocolConfig::default(), None).await;

    let mut alice = TestClient::connect(addr).await;
    login(&mut alice, "alice").await;
    let mut bob = TestClient::connect(addr).await;
    login(&mut bob, "bob").await;

    alice.send("CREATE_ROOM", json!({"name": "AbortCup"}), "none").await;
    alice.recv_matching(|v| v.get("scope").is_some()).await;
    alice.recv_type("ROOM_INFO").await;
    alice.recv_type("LIST_TEAMS").await;
    alice.recv_type("LIST_READY_STATUS").await;
    let room_name = "AbortCup".to_string();

    bob.send("JOIN_ROOM", json!({"name": room_name}), "none").await;
    bob.recv_matching(|v| v.get("scope").is_some()).await;
    bob.recv_type("ROOM_INFO").await;
    bob.recv_type("LIST_TEAMS").await;
    bob.recv_type("LIST_READY_STATUS").await;

    alice.send("JOIN_TEAM", json!({"team_n": 0}), "none").await;
    alice.recv_type("PLAYER_JOINED_TEAM").await;
    bob.recv_type("PLAYER_JOINED_TEAM").await;
    bob.send("JOIN_TEAM", json!({"team_n": 1}), "none").await;
    alice.recv_type("PLAYER_JOINED_TEAM").await;
    bob.recv_type("PLAYER_JOINED_TEAM").await;

    alice.send("MARK_READY", json!({"ready": true}), "none").await;
    alice.recv_type("PLAYER_READY").await;
    bob.recv_type("PLAYER_READY").await;

    bob.send("MARK_READY", json!({"ready": true}), "none").await;
    alice.recv_type("PLAYER_READY").await;
    let bob_frames = bob.recv_n(2).await;
    assert!(bob_frames.iter().any(|v| v["type"] == "GAME_STARTING_AT"));
    assert!(bob_frames.iter().any(|v| v["type"] == "PLAYER_READY"));

    // The countdown is active but hasn't elapsed: joining now is refused.
    alice.send("JOIN_GAME_NOW", json!({}), "none").await;
    let early = alice.recv().await;
    assert_eq!(early["info"], "Can't join the game early.");

    // Flip ready off before start_time: unforced, so the countdown aborts.
    alice.send("MARK_READY", json!({"ready": false}), "none").await;
    let alice_frames = alice.recv_n(2).await;
    assert!(alice_frames.iter().any(|v| v["type"] == "GAME_START_ABORT"));
    assert!(alice_frames.iter().any(|v| v["type"] == "PLAYER_READY"));
    bob.recv_type("PLAYER_READY").await;

    // No countdown is active any more; joining now fails differently.
    bob.send("JOIN_GAME_NOW", json!({}), "none").await;
    let refusal = bob.recv().await;
    assert_eq!(refusal["info"], "No game is starting.");
}

#[tokio::test]
async fn force_start_rejects_a_plain_player() {
    // Rooms carry no auto-admin bootstrap for their creator (unlike
    // MainLobby/game lobbies); FORCE_START stays mod-only even for whoever
    // made the room.
    let addr = spawn_server(fast_room_cfg(), ProtocolConfig::default(), None).await;

    let mut alice = TestClient::connect(addr).await;
    login(&mut alice, "alice").await;

    alice.send("CREATE_ROOM", json!({"name": "ForceCup"}), "none").await;
    alice.recv_matching(|v| v.get("scope").is_some()).await;
    alice.recv_type("ROOM_INFO").await;
    alice.recv_type("LIST_TEAMS").await;
    alice.recv_type("LIST_READY_STATUS").await;

    alice.send("FORCE_START", json!({}), "none").await;
    let reply = alice.recv().await;
    assert_eq!(reply["warning"], "Mod privileges required.");
}
