use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use tracing::{info, warn};

use tg_bale_bridge::admin::AdminEngine;
use tg_bale_bridge::channels::{BaleClient, DestinationClient, SourceClient, TelegramSource};
use tg_bale_bridge::config::BridgeConfig;
use tg_bale_bridge::error::Result;
use tg_bale_bridge::relay::RelayDispatcher;
use tg_bale_bridge::routing::RoutingTable;
use tg_bale_bridge::store::{SqliteStore, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BridgeConfig::from_env()?;

    let store: Arc<dyn Storage> =
        Arc::new(SqliteStore::open(Path::new(&config.db_path)).await?);

    let table = Arc::new(RoutingTable::new());
    let routes = store.list_routes().await?;
    info!(count = routes.len(), "Loaded channels from store");
    table.publish(routes);

    let source: Arc<dyn SourceClient> =
        Arc::new(TelegramSource::new(config.telegram_bot_token.clone()));
    let dest: Arc<dyn DestinationClient> = Arc::new(BaleClient::new(config.bale_bot_token.clone()));

    let mut admin = AdminEngine::new(
        config.admin_id,
        Arc::clone(&store),
        Arc::clone(&source),
        Arc::clone(&table),
    );
    let relay = RelayDispatcher::new(
        store,
        table,
        Arc::clone(&source),
        dest,
        config.keywords.clone(),
        config.remove_patterns.clone(),
        config.send_delay,
    );

    let mut events = source.subscribe().await?;
    info!("Bridge is running; admin can use /panel in a private chat");

    // Single consumer: each event runs to completion before the next one,
    // so the admin path and the relay path never interleave mid-handler.
    while let Some(event) = events.next().await {
        if event.is_private {
            let Some(sender_id) = event.sender_id else {
                continue;
            };
            let Some(text) = event.text.as_deref() else {
                continue;
            };
            if let Some(reply) = admin.handle(sender_id, text).await {
                if let Err(e) = source.send_message(event.chat_id, &reply).await {
                    warn!("Failed to send admin reply: {e}");
                }
            }
        } else {
            relay.handle(&event).await;
        }
    }

    info!("Source update stream ended; shutting down");
    Ok(())
}
