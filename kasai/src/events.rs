//! Events fired by the Twitch client and the registry that routes them to
//! listeners.
//!
//! Listeners subscribe to an [`EventKind`]. Besides the kind of the event
//! itself, every event is also delivered to [`EventKind::Any`] listeners, and
//! moderation events (clear, ban, timeout) to [`EventKind::ModAction`]
//! listeners.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};

use crate::error::{KasaiError, Result};
use crate::models::{Channel, Game, Message, User, Viewer};
use crate::twitch::TwitchClient;

const EVENT_STREAM_CAPACITY: usize = 256;

/// Fired for every chat message Twitch delivers. Messages sent by this
/// client are not echoed back by Twitch, so they never produce this event.
#[derive(Debug, Clone)]
pub struct MessageCreateEvent {
    pub client: TwitchClient,
    pub message: Message,
}

impl MessageCreateEvent {
    pub fn message_id(&self) -> &str {
        &self.message.id
    }

    pub fn author(&self) -> &Viewer {
        &self.message.author
    }

    pub fn author_id(&self) -> &str {
        self.message.author.id()
    }

    pub fn channel(&self) -> &Channel {
        &self.message.channel
    }

    pub fn channel_id(&self) -> &str {
        &self.message.channel.id
    }

    pub fn bits(&self) -> u64 {
        self.message.bits
    }

    pub fn content(&self) -> &str {
        &self.message.content
    }

    pub async fn respond(&self, content: &str, reply: bool) -> Result<()> {
        self.message.respond(&self.client, content, reply).await
    }
}

#[derive(Debug, Clone)]
pub struct PingEvent {
    pub client: TwitchClient,
}

/// The client joined a channel's chat. Richer channel data arrives separately
/// as a [`JoinRoomstateEvent`].
#[derive(Debug, Clone)]
pub struct JoinEvent {
    pub client: TwitchClient,
    /// Login name of the channel.
    pub channel: String,
}

#[derive(Debug, Clone)]
pub struct PartEvent {
    pub client: TwitchClient,
    pub channel: String,
}

/// Full channel information, fetched once Twitch sends the ROOMSTATE for a
/// freshly joined channel.
#[derive(Debug, Clone)]
pub struct JoinRoomstateEvent {
    pub client: TwitchClient,
    pub channel: Channel,
}

impl JoinRoomstateEvent {
    pub fn channel_id(&self) -> &str {
        &self.channel.id
    }

    pub fn game(&self) -> &Game {
        &self.channel.game
    }

    pub fn game_id(&self) -> &str {
        &self.channel.game.id
    }

    pub fn title(&self) -> &str {
        &self.channel.title
    }
}

/// Shared shape of moderation events.
pub trait ModActionEvent {
    fn channel(&self) -> &Channel;

    fn created_at(&self) -> DateTime<Utc>;

    fn channel_id(&self) -> &str {
        &self.channel().id
    }
}

#[derive(Debug, Clone)]
pub struct ClearEvent {
    pub client: TwitchClient,
    pub channel: Channel,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BanEvent {
    pub client: TwitchClient,
    pub channel: Channel,
    pub created_at: DateTime<Utc>,
    pub user: User,
}

impl BanEvent {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

#[derive(Debug, Clone)]
pub struct TimeoutEvent {
    pub client: TwitchClient,
    pub channel: Channel,
    pub created_at: DateTime<Utc>,
    pub user: User,
    /// Timeout length in seconds.
    pub duration: u64,
}

impl TimeoutEvent {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

macro_rules! impl_mod_action {
    ($($event:ty),+) => {
        $(
            impl ModActionEvent for $event {
                fn channel(&self) -> &Channel {
                    &self.channel
                }

                fn created_at(&self) -> DateTime<Utc> {
                    self.created_at
                }
            }
        )+
    };
}

impl_mod_action!(ClearEvent, BanEvent, TimeoutEvent);

#[derive(Debug, Clone)]
pub enum Event {
    MessageCreate(MessageCreateEvent),
    Ping(PingEvent),
    Join(JoinEvent),
    Part(PartEvent),
    JoinRoomstate(JoinRoomstateEvent),
    Clear(ClearEvent),
    Ban(BanEvent),
    Timeout(TimeoutEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageCreate,
    Ping,
    Join,
    Part,
    JoinRoomstate,
    Clear,
    Ban,
    Timeout,
    /// Clear, ban and timeout events.
    ModAction,
    /// Every event.
    Any,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::MessageCreate(_) => EventKind::MessageCreate,
            Event::Ping(_) => EventKind::Ping,
            Event::Join(_) => EventKind::Join,
            Event::Part(_) => EventKind::Part,
            Event::JoinRoomstate(_) => EventKind::JoinRoomstate,
            Event::Clear(_) => EventKind::Clear,
            Event::Ban(_) => EventKind::Ban,
            Event::Timeout(_) => EventKind::Timeout,
        }
    }

    /// Every kind a listener may have subscribed with to receive this event.
    pub fn kinds(&self) -> Vec<EventKind> {
        let mut kinds = vec![self.kind()];
        if self.as_mod_action().is_some() {
            kinds.push(EventKind::ModAction);
        }
        kinds.push(EventKind::Any);
        kinds
    }

    pub fn matches(&self, kind: EventKind) -> bool {
        self.kinds().contains(&kind)
    }

    pub fn as_mod_action(&self) -> Option<&dyn ModActionEvent> {
        match self {
            Event::Clear(e) => Some(e as &dyn ModActionEvent),
            Event::Ban(e) => Some(e as &dyn ModActionEvent),
            Event::Timeout(e) => Some(e as &dyn ModActionEvent),
            _ => None,
        }
    }

    pub fn client(&self) -> &TwitchClient {
        match self {
            Event::MessageCreate(e) => &e.client,
            Event::Ping(e) => &e.client,
            Event::Join(e) => &e.client,
            Event::Part(e) => &e.client,
            Event::JoinRoomstate(e) => &e.client,
            Event::Clear(e) => &e.client,
            Event::Ban(e) => &e.client,
            Event::Timeout(e) => &e.client,
        }
    }
}

#[async_trait]
pub trait EventListener: Send + Sync {
    async fn on_event(&self, event: Event);
}

/// Adapts an async closure into an [`EventListener`].
pub struct FnListener<F>(F);

#[async_trait]
impl<F, Fut> EventListener for FnListener<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn on_event(&self, event: Event) {
        (self.0)(event).await
    }
}

struct EventManagerInner {
    listeners: RwLock<HashMap<EventKind, Vec<Arc<dyn EventListener>>>>,
    stream: broadcast::Sender<Event>,
}

/// Listener registry shared between the host bot and the Twitch client.
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct EventManager {
    inner: Arc<EventManagerInner>,
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventManager").finish_non_exhaustive()
    }
}

impl EventManager {
    pub fn new() -> Self {
        let (stream, _) = broadcast::channel(EVENT_STREAM_CAPACITY);
        Self {
            inner: Arc::new(EventManagerInner {
                listeners: RwLock::new(HashMap::new()),
                stream,
            }),
        }
    }

    pub async fn subscribe(&self, kind: EventKind, listener: Arc<dyn EventListener>) {
        self.inner
            .listeners
            .write()
            .await
            .entry(kind)
            .or_default()
            .push(listener);
        tracing::debug!(event.kind = ?kind, "Listener subscribed");
    }

    pub async fn subscribe_fn<F, Fut>(&self, kind: EventKind, listener: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.subscribe(kind, Arc::new(FnListener(listener))).await;
    }

    /// Removes every listener registered for `kind`, returning how many there were.
    pub async fn unsubscribe_all(&self, kind: EventKind) -> usize {
        self.inner
            .listeners
            .write()
            .await
            .remove(&kind)
            .map_or(0, |listeners| listeners.len())
    }

    pub async fn listener_count(&self, kind: EventKind) -> usize {
        self.inner
            .listeners
            .read()
            .await
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Hands the event to every matching listener, each on its own task, and
    /// returns how many listeners were invoked. Does not wait for them.
    pub async fn dispatch(&self, event: Event) -> usize {
        let targets: Vec<Arc<dyn EventListener>> = {
            let listeners = self.inner.listeners.read().await;
            event
                .kinds()
                .iter()
                .filter_map(|kind| listeners.get(kind))
                .flatten()
                .cloned()
                .collect()
        };

        tracing::trace!(
            event.kind = ?event.kind(),
            listeners = targets.len(),
            "Dispatching event"
        );

        for listener in &targets {
            let listener = Arc::clone(listener);
            let event = event.clone();
            tokio::spawn(async move { listener.on_event(event).await });
        }

        // No receivers just means nobody is waiting.
        let _ = self.inner.stream.send(event);
        targets.len()
    }

    /// Waits for the next event matching `kind`.
    pub async fn wait_for(&self, kind: EventKind, timeout: Duration) -> Result<Event> {
        let mut rx = self.inner.stream.subscribe();
        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(event) if event.matches(kind) => return Ok(event),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "wait_for lagged behind the event stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(KasaiError::NotAlive("event stream closed".to_string()));
                    }
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| KasaiError::Timeout(format!("no {kind:?} event within {timeout:?}")))?
    }
}
