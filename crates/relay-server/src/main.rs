mod bot;
mod config;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use relay_codec::TokenCodec;
use relay_db::{Database, SqliteCatalog, SubscriberRegistry};
use relay_notify::{Dispatcher, Poller, Renderer};
use relay_telegram::{BotApi, ChatClient};

use crate::bot::Bot;
use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay=info,relay_notify=info,relay_db=info,relay_telegram=info".into()),
        )
        .init();

    // Config
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {}.", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let tokens = match TokenCodec::new(&config.send_secret) {
        Ok(tokens) => tokens,
        Err(e) => {
            eprintln!("FATAL: SEND_SECRET is unusable: {}.", e);
            std::process::exit(1);
        }
    };

    // Init DB
    let db = Arc::new(Database::open(&config.db_path)?);
    let catalog = SqliteCatalog::new(db.clone());
    catalog.ensure_tables(&config.catalog_tables)?;
    let registry = SubscriberRegistry::new(db, config.subscriber_table.clone());
    if let Err(e) = registry.ensure_table() {
        warn!("Cannot create subscriber table {}: {:#}", config.subscriber_table, e);
    }
    let catalog = Arc::new(catalog);
    let registry = Arc::new(registry);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let api = BotApi::new(&config.bot_token, &config.api_url)?;
    let bot_username = match &config.bot_username {
        Some(name) => name.clone(),
        None => match bot::resolve_username(&api, bot::RETRY_DELAY, &shutdown).await {
            Ok(Some(name)) => name,
            Ok(None) => {
                info!("Relay stopped before startup completed");
                return Ok(());
            }
            Err(e) => {
                eprintln!("FATAL: cannot resolve the bot username: {}.", e);
                eprintln!("       Check BOT_TOKEN, or set BOT_USERNAME.");
                std::process::exit(1);
            }
        },
    };
    info!("Running as @{}", bot_username);

    let chat: Arc<dyn ChatClient> = Arc::new(api.clone());
    let renderer = Renderer::new(&bot_username, tokens.clone());

    // Notifications
    let dispatcher = Dispatcher::new(chat.clone(), registry.clone(), renderer.clone(), shutdown.clone());
    let poller = Arc::new(Poller::new(catalog.clone(), dispatcher, config.poller()));
    let ready = poller.bootstrap().await;
    info!(
        "Watching {}/{} catalog tables every {}s",
        ready,
        config.catalog_tables.len(),
        config.poll_interval.as_secs()
    );
    let poller = poller.start();

    // Inbound updates
    let bot = Arc::new(Bot::new(
        chat,
        registry,
        catalog,
        renderer,
        tokens,
        config.table_names(),
        &bot_username,
    ));
    let updates = tokio::spawn(bot::run_update_loop(bot, api, shutdown.clone()));

    shutdown.cancelled().await;
    poller.stop().await;
    if let Err(e) = updates.await {
        warn!("Update loop failed: {}", e);
    }

    info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
