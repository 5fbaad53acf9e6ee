//! The upstream game-hosting provisioner (§6): interface-only. The core does
//! not commit to activating this for every game.

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct ProvisionedRoom {
    pub room_id: String,
    pub join_link: Option<String>,
}

/// Session-based provisioning: Basic auth to a ticket, ticket to audience
/// tokens, tokens refreshed when `now > rat + 10s`. Specified at an
/// interface level only (§6); no concrete activation is required.
#[async_trait]
pub trait GameHostProvisioner: Send + Sync {
    async fn create_room(&self, game_name: &str, max_players: u8) -> anyhow::Result<ProvisionedRoom>;
    async fn delete_room(&self, room_id: &str) -> anyhow::Result<()>;
    async fn get_room(&self, room_id: &str) -> anyhow::Result<Option<ProvisionedRoom>>;

    /// Polls "join" until `starting` becomes false, up to 60 tries 750ms apart.
    async fn poll_join_link(&self, room_id: &str) -> anyhow::Result<Option<String>>;
}
