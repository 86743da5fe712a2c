use rand::Rng;
use reqwest::Method;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;

use super::auth::fetch_app_access_token;
use super::connection::IrcConnection;
use super::helix::HelixSession;
use super::irc_parser::{
    CMD_CLEARCHAT, CMD_JOIN, CMD_NOTICE, CMD_PART, CMD_PING, CMD_PONG, CMD_PRIVMSG,
    CMD_ROOMSTATE, IrcMessage, RPL_WELCOME, SERVER_NAME, TAG_BAN_DURATION,
    TAG_REPLY_PARENT_MSG_ID, TAG_ROOM_ID, TAG_TARGET_USER_ID, TAG_TMI_SENT_TS, TAG_USER_ID, Tags,
    escape_tag_value,
};
use crate::config::TwitchConfig;
use crate::entity_factory::{
    DefaultEntityFactory, TwitchEntityFactory, parse_tmi_timestamp, required_tag,
};
use crate::error::{KasaiError, Result};
use crate::events::{
    BanEvent, ClearEvent, Event, EventManager, JoinEvent, JoinRoomstateEvent, MessageCreateEvent,
    PartEvent, PingEvent, TimeoutEvent,
};
use crate::models::{Channel, Stream, User, Viewer};

const LINE_BUFFER: usize = 256;

/// Strips the leading `#` Twitch puts on channel names and lowercases the rest.
pub fn normalise_channel(name: &str) -> String {
    name.trim().trim_start_matches('#').to_lowercase()
}

fn random_nickname() -> String {
    format!("{:07x}", rand::thread_rng().gen_range(0..0x1000_0000u32))
}

struct ClientInner {
    config: TwitchConfig,
    nickname: String,
    events: EventManager,
    factory: Arc<dyn TwitchEntityFactory>,
    session: RwLock<Option<HelixSession>>,
    me: RwLock<Option<User>>,
    /// Login the chat server welcomed us as. Twitch ignores NICK and uses the
    /// token's account, so this is what our own JOIN/PART lines carry.
    login: RwLock<Option<String>>,
    channels: RwLock<Vec<String>>,
    irc: RwLock<Option<IrcConnection>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the Twitch side of the bridge: the Helix session, the chat
/// connection and the task turning chat lines into events. Clones share the
/// same state.
#[derive(Clone)]
pub struct TwitchClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for TwitchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwitchClient")
            .field("nickname", &self.inner.nickname)
            .field("irc_addr", &self.inner.config.irc_addr())
            .finish_non_exhaustive()
    }
}

impl TwitchClient {
    pub fn new(config: TwitchConfig, events: EventManager) -> Self {
        Self::with_entity_factory(config, events, Arc::new(DefaultEntityFactory))
    }

    pub fn with_entity_factory(
        config: TwitchConfig,
        events: EventManager,
        factory: Arc<dyn TwitchEntityFactory>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                nickname: random_nickname(),
                events,
                factory,
                session: RwLock::new(None),
                me: RwLock::new(None),
                login: RwLock::new(None),
                channels: RwLock::new(Vec::new()),
                irc: RwLock::new(None),
                listener: Mutex::new(None),
            }),
        }
    }

    pub fn nickname(&self) -> &str {
        &self.inner.nickname
    }

    pub fn events(&self) -> &EventManager {
        &self.inner.events
    }

    pub fn entity_factory(&self) -> &dyn TwitchEntityFactory {
        self.inner.factory.as_ref()
    }

    pub async fn is_alive(&self) -> bool {
        self.inner.session.read().await.is_some()
    }

    pub async fn is_authorised(&self) -> bool {
        self.inner
            .session
            .read()
            .await
            .as_ref()
            .is_some_and(HelixSession::is_authorised)
    }

    pub async fn is_connected(&self) -> bool {
        self.inner
            .irc
            .read()
            .await
            .as_ref()
            .is_some_and(|conn| !conn.is_closed())
    }

    /// Channels currently joined, by login name.
    pub async fn channels(&self) -> Vec<String> {
        self.inner.channels.read().await.clone()
    }

    /// The bot's own Twitch user, once the chat server has welcomed us.
    pub async fn get_me(&self) -> Option<User> {
        self.inner.me.read().await.clone()
    }

    pub async fn start(&self) -> Result<()> {
        if self.is_alive().await {
            return Err(KasaiError::IsAlive("the Twitch client is already started".to_string()));
        }
        tracing::info!(nickname = %self.inner.nickname, "Starting Twitch services");

        let result = match self.start_api().await {
            Ok(()) => self.start_irc().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::error!(error = %e, "Failed to start Twitch services");
            self.inner.session.write().await.take();
            return Err(e);
        }

        tracing::info!("Twitch services started");
        Ok(())
    }

    async fn start_api(&self) -> Result<()> {
        let config = &self.inner.config;
        let mut session =
            HelixSession::new(reqwest::Client::new(), &config.helix_url, &config.client_id);
        *self.inner.session.write().await = Some(session.clone());

        let token = fetch_app_access_token(
            session.http(),
            &config.token_url,
            &config.client_id,
            &config.client_secret,
        )
        .await?;
        session.authorise(token);
        *self.inner.session.write().await = Some(session);
        tracing::debug!(helix.url = %config.helix_url, "Helix session authorised");
        Ok(())
    }

    async fn start_irc(&self) -> Result<()> {
        let mut irc = self.inner.irc.write().await;
        if irc.as_ref().is_some_and(|conn| !conn.is_closed()) {
            return Err(KasaiError::IsAlive("the IRC socket is already open".to_string()));
        }

        let (lines_tx, lines_rx) = mpsc::channel(LINE_BUFFER);
        let conn = IrcConnection::open(
            &self.inner.config.irc_addr(),
            &self.inner.config.irc_token,
            &self.inner.nickname,
            lines_tx,
        )
        .await?;
        *irc = Some(conn);
        drop(irc);

        let client = self.clone();
        let handle = tokio::spawn(async move { client.listen(lines_rx).await });
        if let Some(previous) = self.inner.listener.lock().await.replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Parts every joined channel, then drops the Helix session and the chat
    /// connection.
    pub async fn close(&self) -> Result<()> {
        if !self.is_alive().await {
            return Err(KasaiError::NotAlive("the Twitch client was never started".to_string()));
        }
        tracing::info!("Closing Twitch services");

        let joined = self.channels().await;
        if !joined.is_empty() && self.is_connected().await {
            if let Err(e) = self.part(&joined).await {
                tracing::warn!(error = %e, "Failed to part channels while closing");
            }
        }

        self.inner.session.write().await.take();
        let conn = self.inner.irc.write().await.take();
        if let Some(conn) = conn {
            conn.shutdown().await;
        }
        if let Some(listener) = self.inner.listener.lock().await.take() {
            listener.abort();
        }
        self.inner.channels.write().await.clear();
        self.inner.login.write().await.take();

        tracing::info!("Twitch services closed");
        Ok(())
    }

    /// Writes one raw line to the chat socket.
    pub async fn send_raw(&self, line: &str) -> Result<()> {
        match self.inner.irc.read().await.as_ref() {
            Some(conn) => conn.send_raw(line).await,
            None => Err(KasaiError::NotAlive("there are no alive IRC sockets".to_string())),
        }
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.inner.irc.read().await.is_none() {
            return Err(KasaiError::NotAlive("there are no alive IRC sockets".to_string()));
        }
        Ok(())
    }

    /// Requests to join each channel. The channel only counts as joined once
    /// Twitch echoes the JOIN back.
    pub async fn join<I>(&self, channels: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let channels: Vec<String> = channels
            .into_iter()
            .map(|c| normalise_channel(c.as_ref()))
            .collect();
        self.ensure_connected().await?;
        for channel in channels {
            if channel.is_empty() {
                continue;
            }
            tracing::debug!(channel.name = %channel, "Joining channel");
            self.send_raw(&format!("{CMD_JOIN} #{channel}")).await?;
        }
        Ok(())
    }

    pub async fn part<I>(&self, channels: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let channels: Vec<String> = channels
            .into_iter()
            .map(|c| normalise_channel(c.as_ref()))
            .collect();
        self.ensure_connected().await?;
        for channel in channels {
            if channel.is_empty() {
                continue;
            }
            tracing::debug!(channel.name = %channel, "Parting channel");
            self.send_raw(&format!("{CMD_PART} #{channel}")).await?;
        }
        Ok(())
    }

    /// Sends a chat message to a joined channel, optionally as a reply to the
    /// message with id `reply_to`.
    pub async fn create_message(
        &self,
        channel: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<()> {
        self.ensure_connected().await?;
        let channel = normalise_channel(channel);
        if !self.inner.channels.read().await.contains(&channel) {
            return Err(KasaiError::NotJoined(channel));
        }

        let content = content.replace(['\r', '\n'], " ");
        let line = match reply_to {
            Some(id) => format!(
                "@{TAG_REPLY_PARENT_MSG_ID}={} {CMD_PRIVMSG} #{channel} :{content}",
                escape_tag_value(id)
            ),
            None => format!("{CMD_PRIVMSG} #{channel} :{content}"),
        };
        self.send_raw(&line).await
    }

    /// The open Helix session, with its app access token renewed first if it
    /// has expired.
    async fn helix_session(&self) -> Result<HelixSession> {
        let mut session = self
            .inner
            .session
            .read()
            .await
            .clone()
            .ok_or_else(|| KasaiError::NotAlive("the Helix session is not open".to_string()))?;
        if !session.token_expired() {
            return Ok(session);
        }

        tracing::info!("App access token expired, fetching a new one");
        let config = &self.inner.config;
        let token = fetch_app_access_token(
            session.http(),
            &config.token_url,
            &config.client_id,
            &config.client_secret,
        )
        .await?;
        session.authorise(token);

        let mut stored = self.inner.session.write().await;
        // close() may have run while the token was being fetched.
        if stored.is_none() {
            return Err(KasaiError::NotAlive("the Helix session is not open".to_string()));
        }
        *stored = Some(session.clone());
        Ok(session)
    }

    /// Sends a request to any Helix route. A `body` is sent wrapped as
    /// `{"data": body}`; the response's `data` array is returned.
    pub async fn helix_request(
        &self,
        method: Method,
        route: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Vec<Value>> {
        self.helix_session()
            .await?
            .request(method, route, query, body)
            .await
    }

    async fn helix_get(&self, route: &str, query: &[(&str, &str)]) -> Result<Vec<Value>> {
        self.helix_request(Method::GET, route, query, None).await
    }

    async fn fetch_user_payload(&self, user: &str) -> Result<Value> {
        let key = if !user.is_empty() && user.chars().all(|c| c.is_ascii_digit()) {
            "id"
        } else {
            "login"
        };
        self.helix_get("users", &[(key, user)])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| KasaiError::NotFound(format!("user {user}")))
    }

    /// Looks a user up by numeric id or by login.
    pub async fn fetch_user(&self, user: &str) -> Result<User> {
        let payload = self.fetch_user_payload(user).await?;
        self.inner.factory.deserialize_twitch_user(payload)
    }

    /// Like [`fetch_user`](Self::fetch_user), with the chat-only details taken
    /// from a message's tags.
    pub async fn fetch_viewer(&self, user: &str, tags: &Tags) -> Result<Viewer> {
        let payload = self.fetch_user_payload(user).await?;
        self.inner.factory.deserialize_twitch_viewer(payload, tags)
    }

    pub async fn fetch_channel(&self, broadcaster_id: &str) -> Result<Channel> {
        let payload = self
            .helix_get("channels", &[("broadcaster_id", broadcaster_id)])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| KasaiError::NotFound(format!("channel {broadcaster_id}")))?;
        self.inner.factory.deserialize_twitch_channel(payload)
    }

    /// The live stream of a user, or `None` when they are offline.
    pub async fn fetch_stream(&self, user: &str) -> Result<Option<Stream>> {
        let owner = self.fetch_user(user).await?;
        let Some(payload) = self
            .helix_get("streams", &[("user_id", owner.id.as_str())])
            .await?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        let channel = self.fetch_channel(&owner.id).await?;
        self.inner
            .factory
            .deserialize_twitch_stream(payload, channel)
            .map(Some)
    }

    async fn listen(self, mut lines_rx: mpsc::Receiver<String>) {
        tracing::debug!("Twitch IRC listener started");
        while let Some(line) = lines_rx.recv().await {
            if let Err(e) = self.handle_line(&line).await {
                tracing::warn!(error = %e, payload = %line, "Failed to handle IRC payload");
            }
        }

        tracing::warn!("Twitch IRC connection ended");
        let conn = self.inner.irc.write().await.take();
        if let Some(conn) = conn {
            conn.shutdown().await;
        }
        self.inner.channels.write().await.clear();
        self.inner.login.write().await.take();
    }

    async fn is_self(&self, nick: Option<&str>) -> bool {
        let Some(nick) = nick else {
            return true;
        };
        if nick.eq_ignore_ascii_case(&self.inner.nickname) {
            return true;
        }
        if self
            .inner
            .login
            .read()
            .await
            .as_deref()
            .is_some_and(|login| login.eq_ignore_ascii_case(nick))
        {
            return true;
        }
        self.inner
            .me
            .read()
            .await
            .as_ref()
            .is_some_and(|me| me.username.eq_ignore_ascii_case(nick))
    }

    async fn dispatch(&self, event: Event) {
        self.inner.events.dispatch(event).await;
    }

    /// Turns one line from the chat socket into client state changes and
    /// events.
    pub(crate) async fn handle_line(&self, line: &str) -> Result<()> {
        let msg = IrcMessage::parse(line);
        let Some(command) = msg.command() else {
            return Ok(());
        };

        match command {
            CMD_PING => {
                let payload = msg.trailing().unwrap_or(SERVER_NAME);
                self.send_raw(&format!("{CMD_PONG} :{payload}")).await?;
                self.dispatch(Event::Ping(PingEvent {
                    client: self.clone(),
                })).await;
            }
            RPL_WELCOME => {
                let Some(login) = msg.params().first() else {
                    return Ok(());
                };
                *self.inner.login.write().await = Some(login.to_lowercase());
                match self.fetch_user(login).await {
                    Ok(me) => {
                        tracing::info!(user.login = %me.username, user.id = %me.id, "Logged in to Twitch chat");
                        *self.inner.me.write().await = Some(me);
                    }
                    Err(e) => {
                        tracing::warn!(user.login = %login, error = %e, "Could not resolve the bot's own user");
                    }
                }
            }
            CMD_JOIN => {
                let Some(channel) = msg.channel().map(normalise_channel) else {
                    return Ok(());
                };
                if !self.is_self(msg.prefix_nick()).await {
                    return Ok(());
                }
                {
                    let mut channels = self.inner.channels.write().await;
                    if !channels.contains(&channel) {
                        channels.push(channel.clone());
                    }
                }
                tracing::info!(channel.name = %channel, "Joined channel");
                self.dispatch(Event::Join(JoinEvent {
                    client: self.clone(),
                    channel,
                })).await;
            }
            CMD_PART => {
                let Some(channel) = msg.channel().map(normalise_channel) else {
                    return Ok(());
                };
                if !self.is_self(msg.prefix_nick()).await {
                    return Ok(());
                }
                self.inner.channels.write().await.retain(|c| c != &channel);
                tracing::info!(channel.name = %channel, "Parted channel");
                self.dispatch(Event::Part(PartEvent {
                    client: self.clone(),
                    channel,
                })).await;
            }
            CMD_ROOMSTATE => {
                let tags = msg.tags();
                // Partial ROOMSTATEs only announce a single setting change.
                if tags.len() <= 2 {
                    return Ok(());
                }
                let channel = self
                    .fetch_channel(required_tag(&tags, TAG_ROOM_ID)?)
                    .await?;
                tracing::debug!(channel.name = %channel.username, channel.id = %channel.id, "Received channel state");
                self.dispatch(Event::JoinRoomstate(JoinRoomstateEvent {
                    client: self.clone(),
                    channel,
                })).await;
            }
            CMD_CLEARCHAT => self.handle_clearchat(&msg.tags()).await?,
            CMD_PRIVMSG => {
                let tags = msg.tags();
                let room_id = required_tag(&tags, TAG_ROOM_ID)?;
                let author = match tags.get(TAG_USER_ID) {
                    Some(id) => id.as_str(),
                    None => msg.prefix_nick().ok_or(KasaiError::MissingTag(TAG_USER_ID))?,
                };
                let viewer = self.fetch_viewer(author, &tags).await?;
                let channel = self.fetch_channel(room_id).await?;
                let message = self.inner.factory.deserialize_twitch_message(
                    msg.trailing().unwrap_or_default(),
                    &tags,
                    viewer,
                    channel,
                )?;
                self.dispatch(Event::MessageCreate(MessageCreateEvent {
                    client: self.clone(),
                    message,
                })).await;
            }
            CMD_NOTICE => {
                tracing::warn!(
                    notice.id = msg.tag("msg-id").unwrap_or_default(),
                    notice = msg.trailing().unwrap_or_default(),
                    "Twitch notice"
                );
            }
            _ => {
                tracing::trace!(command, "Ignoring IRC command");
            }
        }
        Ok(())
    }

    async fn handle_clearchat(&self, tags: &Tags) -> Result<()> {
        let created_at = parse_tmi_timestamp(required_tag(tags, TAG_TMI_SENT_TS)?)?;
        let channel = self.fetch_channel(required_tag(tags, TAG_ROOM_ID)?).await?;
        let client = self.clone();

        let event = if let Some(duration) = tags.get(TAG_BAN_DURATION) {
            let user = self
                .fetch_user(required_tag(tags, TAG_TARGET_USER_ID)?)
                .await?;
            let duration = duration.parse::<u64>().map_err(|_| {
                KasaiError::Deserialize(format!("invalid ban-duration: {duration:?}"))
            })?;
            tracing::info!(channel.name = %channel.username, user.login = %user.username, duration, "User timed out");
            Event::Timeout(TimeoutEvent {
                client,
                channel,
                created_at,
                user,
                duration,
            })
        } else if let Some(target) = tags.get(TAG_TARGET_USER_ID) {
            let user = self.fetch_user(target).await?;
            tracing::info!(channel.name = %channel.username, user.login = %user.username, "User banned");
            Event::Ban(BanEvent {
                client,
                channel,
                created_at,
                user,
            })
        } else {
            tracing::info!(channel.name = %channel.username, "Chat cleared");
            Event::Clear(ClearEvent {
                client,
                channel,
                created_at,
            })
        };
        self.dispatch(event).await;
        Ok(())
    }
}
