#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use raceway_coop_server::auth::{HttpIdentityVerifier, IdentityVerifier, UserDirectory};
use raceway_coop_server::config;
use raceway_coop_server::domain::Lobby;
use raceway_coop_server::logging;
use raceway_coop_server::map_provider::{
    BlobStore, HttpBlobStore, HttpMapCatalogClient, MapCatalogClient, MapProvider,
};
use raceway_coop_server::metrics::ServerMetrics;
use raceway_coop_server::registry::ScopeRegistry;
use raceway_coop_server::server::lobby::LobbyRuntime;
use raceway_coop_server::server::session::{self, SessionServices};
use raceway_coop_server::store::{GameStore, InMemoryStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::interval;

/// Raceway Co-op -- persistent lobby/room/game coordination server for a racing game's community co-op mode
#[derive(Parser, Debug)]
#[command(name = "raceway-coop-server")]
#[command(about = "A persistent lobby/room/game coordination server")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines and pre-deployment checks.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    /// Useful for debugging configuration loading from multiple sources.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration from config.json if present; otherwise use code defaults.
    let cfg = Arc::new(config::load());

    // Handle --print-config: output the loaded configuration as JSON, secrets redacted.
    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg.redacted_for_display())
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate_config_security(&cfg);

    // Handle --validate-config: exit after validation.
    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Host: {}:{}", cfg.server.host, cfg.server.port);
                println!("  Storage backend: InMemory");
                println!("  Local dev mode: {}", cfg.server.local_dev);
                println!(
                    "  Player bounds: {}..={}",
                    cfg.room.min_players, cfg.room.max_players
                );
                println!(
                    "  Legacy login enabled: {}",
                    cfg.protocol.legacy_login_enabled
                );
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    // In normal operation, propagate validation errors.
    validation_result?;

    logging::init_with_config(&cfg.logging);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
    tracing::info!(%addr, host = %cfg.server.host, "starting raceway-coop-server");

    let store: Arc<dyn GameStore> = Arc::new(InMemoryStore::new());
    let metrics = Arc::new(ServerMetrics::new());
    let registry = Arc::new(ScopeRegistry::new());

    let main_lobby = Lobby::main_lobby(random_uid(), now_ts());
    store.insert_lobby(main_lobby.clone()).await?;
    registry.register_lobby(LobbyRuntime::new(main_lobby));

    let verifier: Option<Arc<dyn IdentityVerifier>> = HttpIdentityVerifier::new(&cfg.secrets.identity_verifier)
        .map(|v| Arc::new(v) as Arc<dyn IdentityVerifier>);
    if verifier.is_none() {
        tracing::warn!("no identity verifier configured; LOGIN_TOKEN will always fail");
    }
    let users = Arc::new(UserDirectory::new(store.clone(), verifier));

    let catalog: Arc<dyn MapCatalogClient> = Arc::new(HttpMapCatalogClient::new(cfg.map_provider.catalog_base_url.clone()));
    let blob: Option<Arc<dyn BlobStore>> = HttpBlobStore::new(&cfg.secrets.blob_store).map(|b| Arc::new(b) as Arc<dyn BlobStore>);
    if blob.is_none() {
        tracing::warn!("no blob store configured; map binary caching is disabled");
    }
    let map_provider = Arc::new(MapProvider::new(
        catalog,
        blob,
        store.clone(),
        metrics.clone(),
        cfg.server.local_dev,
    ));
    if let Err(err) = map_provider.restore_from_store().await {
        tracing::warn!(error = %err, "failed to restore the random-map pool from the store");
    }
    tokio::spawn(map_provider.clone().run_replenishment());

    let services = Arc::new(SessionServices {
        store: store.clone(),
        registry: registry.clone(),
        users,
        metrics: metrics.clone(),
        map_provider: Some(map_provider),
        room_cfg: cfg.room.clone(),
        protocol_cfg: cfg.protocol.clone(),
    });

    tokio::spawn(run_room_sweep(registry.clone(), store.clone(), metrics.clone(), cfg.room.clone()));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening for connections");

    loop {
        let (stream, peer) = listener.accept().await?;
        if let Err(err) = stream.set_nodelay(true) {
            tracing::warn!(error = %err, %peer, "failed to set TCP_NODELAY");
        }
        let services = services.clone();
        tokio::spawn(async move {
            session::run(stream, peer, services).await;
        });
    }
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

fn random_uid() -> String {
    const HEX_CHARS: &[u8] = b"0123456789abcdef";
    use rand::RngExt;
    let mut rng = rand::rng();
    (0..20)
        .map(|_| HEX_CHARS[rng.random_range(0..HEX_CHARS.len())] as char)
        .collect()
}

/// Periodically retires empty-past-window or too-old rooms (§4.6 "Retirement").
/// A room whose game is still live is left alone regardless of how long its
/// own roster has been empty; see `ScopeRegistry::sweep_rooms`.
async fn run_room_sweep(
    registry: Arc<ScopeRegistry>,
    store: Arc<dyn GameStore>,
    metrics: Arc<ServerMetrics>,
    room_cfg: raceway_coop_server::config::RoomConfig,
) {
    let mut tick = interval(Duration::from_secs(room_cfg.room_sweep_interval_secs));
    loop {
        tick.tick().await;
        registry.sweep_rooms(store.as_ref(), &metrics, &room_cfg, now_ts()).await;
    }
}

#[cfg(test)]
mod cli_tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn test_cli_default_no_flags() {
        let cli = Cli::try_parse_from(["raceway-coop-server"]).unwrap();
        assert!(!cli.validate_config);
        assert!(!cli.print_config);
    }

    #[test]
    fn test_cli_validate_config_long() {
        let cli = Cli::try_parse_from(["raceway-coop-server", "--validate-config"]).unwrap();
        assert!(cli.validate_config);
        assert!(!cli.print_config);
    }

    #[test]
    fn test_cli_validate_config_short() {
        let cli = Cli::try_parse_from(["raceway-coop-server", "-c"]).unwrap();
        assert!(cli.validate_config);
        assert!(!cli.print_config);
    }

    #[test]
    fn test_cli_print_config() {
        let cli = Cli::try_parse_from(["raceway-coop-server", "--print-config"]).unwrap();
        assert!(!cli.validate_config);
        assert!(cli.print_config);
    }

    #[test]
    fn test_cli_validate_and_print_config_conflict() {
        let result = Cli::try_parse_from(["raceway-coop-server", "--validate-config", "--print-config"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("cannot be used with"));
    }

    #[test]
    fn test_cli_version() {
        let result = Cli::try_parse_from(["raceway-coop-server", "--version"]);
        assert!(result.is_err());
    }
}
