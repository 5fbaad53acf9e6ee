//! MainLobby operations: creating a game lobby, listing lobbies, and
//! joining one by name.


use raceway_coop_server::config::{ProtocolConfig, RoomConfig};
use serde_json::json;
use test_helpers::{spawn_server, TestClient};

#[tokio::test]
async fn create_and_join_lobby() {
    let addr = spawn_server(RoomConfig::default(), ProtocolConfig::default(), None).await;

    let mut creator = TestClient::connect(addr).await;
    creator.recv().await; // greeting
    creator.register("host").await;
    creator.recv().await; // scope: MainLobby

    creator.send("CREATE_LOBBY", json!({"name": "NightCup"}), "none").await;
    let info = creator.recv_status("info").await;
    assert!(info["info"].as_str().unwrap().contains("NightCup"));

    let mut joiner = TestClient::connect(addr).await;
    joiner.recv().await; // greeting
    joiner.register("guest").await;
    joiner.recv().await; // scope: MainLobby

    joiner.send("LIST_LOBBIES", json!({}), "none").await;
    let list = joiner.recv_type("LOBBY_LIST").await;
    let lobbies = list["lobbies"].as_array().unwrap();
    assert!(lobbies.iter().any(|l| l["name"] == "NightCup"));

    joiner.send("JOIN_LOBBY", json!({"name": "NightCup"}), "none").await;
    let scope = joiner.recv().await;
    assert_eq!(scope["scope"], "1|NightCup");

    let lobby_info = joiner.recv_type("LOBBY_INFO").await;
    assert_eq!(lobby_info["name"], "NightCup");
    assert_eq!(lobby_info["n_clients"], 1);
}

#[tokio::test]
async fn create_lobby_rejects_duplicate_name() {
    let addr = spawn_server(RoomConfig::default(), ProtocolConfig::default(), None).await;
    let mut client = TestClient::connect(addr).await;
    client.recv().await;
    client.register("host").await;
    client.recv().await;

    client.send("CREATE_LOBBY", json!({"name": "Dup"}), "none").await;
    client.recv_status("info").await;

    client.send("CREATE_LOBBY", json!({"name": "Dup"}), "none").await;
    let reply = client.recv().await;
    assert!(reply["info"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn join_lobby_rejects_unknown_name() {
    let addr = spawn_server(RoomConfig::default(), ProtocolConfig::default(), None).await;
    let mut client = TestClient::connect(addr).await;
    client.recv().await;
    client.register("solo").await;
    client.recv().await;

    client.send("JOIN_LOBBY", json!({"name": "Nowhere"}), "none").await;
    let reply = client.recv().await;
    assert!(reply["info"].as_str().unwrap().contains("No such lobby"));
}
