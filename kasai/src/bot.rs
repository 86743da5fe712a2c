use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::config::TwitchConfig;
use crate::error::Result;
use crate::events::{Event, EventKind, EventListener, EventManager};
use crate::twitch::TwitchClient;

/// Lifecycle of the chat bot Kasai is attached to (for instance a Discord
/// gateway bot).
#[async_trait]
pub trait HostBot: Send + Sync {
    async fn start(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// A host bot with a Twitch client attached. Both share one event manager, so
/// the host's listeners receive Twitch events.
pub struct GatewayApp<H> {
    host: H,
    twitch: TwitchClient,
    events: EventManager,
}

impl<H: HostBot> GatewayApp<H> {
    pub fn new(host: H, config: TwitchConfig) -> Self {
        Self::with_events(host, config, EventManager::new())
    }

    pub fn with_events(host: H, config: TwitchConfig, events: EventManager) -> Self {
        let twitch = TwitchClient::new(config, events.clone());
        Self {
            host,
            twitch,
            events,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn twitch(&self) -> &TwitchClient {
        &self.twitch
    }

    pub fn events(&self) -> &EventManager {
        &self.events
    }

    pub async fn subscribe(&self, kind: EventKind, listener: Arc<dyn EventListener>) {
        self.events.subscribe(kind, listener).await;
    }

    pub async fn subscribe_fn<F, Fut>(&self, kind: EventKind, listener: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.events.subscribe_fn(kind, listener).await;
    }

    /// Starts the host, then the Twitch services.
    pub async fn start(&self) -> Result<()> {
        self.host.start().await?;
        self.twitch.start().await
    }

    /// Closes the Twitch services if they are running, then the host.
    pub async fn close(&self) -> Result<()> {
        if self.twitch.is_alive().await {
            self.twitch.close().await?;
        }
        self.host.close().await
    }
}
