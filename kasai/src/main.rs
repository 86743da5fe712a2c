use async_trait::async_trait;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kasai::config::load_settings;
use kasai::events::ModActionEvent;
use kasai::{Event, EventKind, GatewayApp, HostBot, Result};

/// Stand-in host for running the bridge on its own: it only logs its lifecycle.
struct ConsoleHost;

#[async_trait]
impl HostBot for ConsoleHost {
    async fn start(&self) -> Result<()> {
        tracing::info!("Console host started");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        tracing::info!("Console host closed");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    kasai::ux::display_splash();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_PKG_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = load_settings()?;
    tracing::info!(channels = ?settings.bot.channels, "Configuration loaded");

    let app = GatewayApp::new(ConsoleHost, settings.twitch);

    app.subscribe_fn(EventKind::MessageCreate, |event| async move {
        let Event::MessageCreate(event) = event else {
            return;
        };
        tracing::info!(
            channel.name = %event.channel().username,
            author = %event.author().username(),
            content = %event.content(),
            "Chat message"
        );
        if event.content().trim() == "!ping" {
            if let Err(e) = event.respond("Pong!", true).await {
                tracing::warn!(error = %e, "Failed to answer !ping");
            }
        }
    })
    .await;

    app.subscribe_fn(EventKind::JoinRoomstate, |event| async move {
        if let Event::JoinRoomstate(event) = event {
            tracing::info!(
                channel.name = %event.channel.username,
                game = %event.game().name,
                title = %event.title(),
                "Channel ready"
            );
        }
    })
    .await;

    app.subscribe_fn(EventKind::ModAction, |event| async move {
        if let Some(action) = event.as_mod_action() {
            tracing::info!(
                event.kind = ?event.kind(),
                channel.name = %action.channel().username,
                "Moderation action"
            );
        }
    })
    .await;

    app.start().await?;
    if !settings.bot.channels.is_empty() {
        app.twitch().join(&settings.bot.channels).await?;
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    app.close().await
}
