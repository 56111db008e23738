//! wold-client binary
//!
//! Restores the saved session, optionally loads a scene, then joins the
//! real-time channel and logs presence until interrupted. Notifications
//! are dismissed once their display time is up.
//!
//! ## Configuration (env / TOML via `config` crate)
//!
//! | Key                          | Default                 | Description                  |
//! |------------------------------|-------------------------|------------------------------|
//! | `WOLD_API_URL`               | `http://localhost:8000` | REST base URL                |
//! | `WOLD_WS_URL`                | `ws://localhost:3001`   | Real-time channel base URL   |
//! | `WOLD_MAX_RECONNECT_ATTEMPTS`| `5`                     | Failed handshakes before giving up |
//! | `WOLD_RECONNECT_DELAY_MS`    | `1000`                  | Delay between attempts       |
//! | `WOLD_HANDSHAKE_TIMEOUT_MS`  | `10000`                 | Per-attempt handshake timeout |
//! | `WOLD_TOKEN_DIR`             | platform config dir     | Where `auth-storage.json` lives |

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use wold_client::{
    sync::WsConnector, AppContext, BridgeEvent, ClientConfig, FileTokenStore, HttpApi,
    InboundEvent, TokenStore,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "wold-client", about = "Wold Virtual client", version)]
struct Args {
    /// Config file (defaults to ./wold-client.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// REST base URL (overrides config)
    #[arg(long)]
    api_url: Option<String>,

    /// Real-time channel base URL (overrides config)
    #[arg(long)]
    ws_url: Option<String>,

    /// Save this token as the session before start-up
    #[arg(long, env = "WOLD_TOKEN")]
    token: Option<String>,

    /// Scene to load after start-up
    #[arg(long)]
    scene: Option<String>,

    /// Skip the real-time channel
    #[arg(long)]
    offline: bool,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialise logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wold_client=debug".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut cfg = ClientConfig::load(args.config.as_deref()).context("loading config")?;
    if let Some(url) = args.api_url {
        cfg.api_url = url;
    }
    if let Some(url) = args.ws_url {
        cfg.ws_url = url;
    }

    let tokens = match &cfg.token_dir {
        Some(dir) => FileTokenStore::new(dir, wold_client::persist::AUTH_STORAGE_KEY),
        None => FileTokenStore::in_config_dir()?,
    };
    if let Some(token) = &args.token {
        tokens.save(token)?;
    }

    log::info!(
        "Starting wold-client (api='{}', ws='{}', tokens='{}')",
        cfg.api_url,
        cfg.ws_url,
        tokens.path().display(),
    );

    let mut ctx = AppContext::new(HttpApi::new(&cfg.api_url), tokens);
    ctx.initialize().await;
    log::info!(
        "Session: authenticated={}",
        ctx.store().state().session.is_authenticated
    );

    if let Some(scene) = &args.scene {
        if ctx.load_scene(scene).await.is_ok() {
            let s = &ctx.store().state().scene;
            log::info!(
                "Loaded scene '{}' ({} objects, environment '{}')",
                scene,
                s.objects.len(),
                s.environment
            );
        }
    }

    if args.offline {
        return Ok(());
    }

    let _presence = ctx.store().subscribe_slice(
        |s| s.presence.users.len(),
        |n| log::info!("{n} user(s) present"),
    );

    ctx.initialize_sync(cfg.sync_config(None), WsConnector::new(&cfg.ws_url))
        .await;

    loop {
        let dismissal = ctx.next_dismissal();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, shutting down");
                break;
            }
            _ = dismissal => {
                for id in ctx.expire_notifications() {
                    log::debug!("Notification {id} dismissed");
                }
            }
            ev = ctx.next_sync_event() => match ev {
                Some(BridgeEvent::State(state)) => log::info!("Channel {state}"),
                Some(BridgeEvent::Inbound(InboundEvent::Joined { kind, entity })) => {
                    log::info!("{kind} '{}' joined at {}", entity.id, entity.position);
                }
                Some(BridgeEvent::Inbound(InboundEvent::Left { kind, id })) => {
                    log::info!("{kind} '{id}' left");
                }
                Some(BridgeEvent::Inbound(ev)) => log::debug!("{ev:?}"),
                None => {
                    log::warn!("Channel closed");
                    break;
                }
            },
        }
    }

    ctx.cleanup_sync().await;
    Ok(())
}
