use std::sync::Arc;
use tracing::{error, info};

mod api;
mod bus;
mod chat;
mod config;
mod error;
mod flow;
mod interface;
mod manager;
mod profile;
mod prompt;

use config::{Config, InterfaceKind};
use flow::FlowOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let dotenv = dotenvy::dotenv();

    // Initialize logging with default filter if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dotenv {
        // It's not fatal if .env doesn't exist
        info!("No .env file found or failed to load: {}", e);
    }

    let config = Config::from_env()?;
    info!("MindBridge counsel client starting against {}", config.api_base_url);

    let bus = Arc::new(bus::EventBus::new());
    let api = Arc::new(api::HttpCounselApi::new(
        config.api_base_url.clone(),
        config.http_timeout,
    )?);

    let manager = Arc::new(manager::Manager::new(
        api,
        bus.clone(),
        FlowOptions {
            auto_start_from_profile: config.auto_start_from_profile,
        },
    ));

    let interface_handle = match config.interface {
        InterfaceKind::Console => {
            let console =
                interface::console::ConsoleInterface::new(bus.clone(), manager.clone(), config.profile.clone());
            tokio::spawn(async move { console.run().await })
        }
        InterfaceKind::Telegram => {
            let token = config.telegram_token.clone().ok_or_else(|| {
                anyhow::anyhow!("TELOXIDE_TOKEN or TELEGRAM_BOT_TOKEN not set")
            })?;
            let telegram = interface::telegram::TelegramInterface::new(
                bus.clone(),
                manager.clone(),
                token,
                config.telegram_whitelist.clone(),
            );
            tokio::spawn(async move { telegram.run().await })
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        res = interface_handle => {
            match res {
                Ok(Ok(())) => info!("Interface stopped"),
                Ok(Err(e)) => error!("Interface stopped with error: {}", e),
                Err(e) => error!("Interface task failed: {}", e),
            }
        }
    }

    Ok(())
}
