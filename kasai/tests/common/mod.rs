//! Spoof Twitch services for the integration tests: a chat server speaking
//! just enough of Twitch's IRC dialect, and a Helix API with fixed fixtures.

#![allow(dead_code)]

use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use kasai::config::TwitchConfig;
use kasai::{Event, EventKind, EventManager};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

pub const SERVER_NAME: &str = "tmi.twitch.tv";
pub const APP_TOKEN: &str = "spoof-app-token";
pub const CLIENT_ID: &str = "client_id";
pub const CLIENT_SECRET: &str = "client_secret";
/// Accepted like [`CLIENT_SECRET`], but the issued token is already stale.
pub const SHORT_LIVED_SECRET: &str = "short_lived";
pub const TWITCHDEV_ID: &str = "141981764";
pub const VIEWER_ID: &str = "713936733";
pub const MESSAGE_ID: &str = "885196de-cb67-427a-baa8-82f9b0fcd05f";
pub const WAIT: Duration = Duration::from_secs(5);

/// The fixture PRIVMSG: lovingt3s posting in #twitchdev.
pub const PRIVMSG: &str = "@badge-info=;badges=broadcaster/1;client-nonce=459e3142897c7a22b7d275178f2259e0;color=#0000FF;display-name=lovingt3s;emote-only=1;emotes=62835:0-10;first-msg=0;flags=;id=885196de-cb67-427a-baa8-82f9b0fcd05f;mod=0;room-id=141981764;subscriber=0;tmi-sent-ts=1643904084794;turbo=0;user-id=713936733;user-type= :lovingt3s!lovingt3s@lovingt3s.tmi.twitch.tv PRIVMSG #twitchdev :HeyGuys <3 PartyTime";

fn room_id_for(channel: &str) -> String {
    match channel {
        "twitchdev" => TWITCHDEV_ID.to_string(),
        other => format!("room-for-{other}"),
    }
}

#[derive(Clone, Debug)]
enum Outgoing {
    Bytes(Vec<u8>),
    Hangup,
}

/// Chat server. Every line a client sends is recorded; lines pushed with
/// [`SpoofIrcServer::send`] go to every connected client.
pub struct SpoofIrcServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    to_clients: broadcast::Sender<Outgoing>,
}

impl SpoofIrcServer {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let (to_clients, _) = broadcast::channel(100);

        let server_received = Arc::clone(&received);
        let server_to_clients = to_clients.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let broadcast_rx = server_to_clients.subscribe();
                tokio::spawn(handle_client(
                    stream,
                    Arc::clone(&server_received),
                    broadcast_rx,
                ));
            }
        });

        Self {
            addr,
            received,
            to_clients,
        }
    }

    pub fn send(&self, line: &str) {
        self.send_bytes(format!("{line}\r\n").into_bytes());
    }

    /// Pushes raw bytes, line endings included, to every client.
    pub fn send_bytes(&self, bytes: impl Into<Vec<u8>>) {
        self.to_clients.send(Outgoing::Bytes(bytes.into())).unwrap();
    }

    /// Closes the write half of every client connection.
    pub fn hang_up(&self) {
        self.to_clients.send(Outgoing::Hangup).unwrap();
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Waits until a client has sent a line equal to `expected`.
    pub async fn expect_line(&self, expected: &str) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while tokio::time::Instant::now() < deadline {
            if self.received().iter().any(|line| line == expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "never received {expected:?}; got {:?}",
            self.received()
        );
    }
}

async fn handle_client(
    stream: TcpStream,
    received: Arc<Mutex<Vec<String>>>,
    mut broadcast_rx: broadcast::Receiver<Outgoing>,
) {
    let (reader, mut writer) = tokio::io::split(stream);
    let (direct_tx, mut direct_rx) = mpsc::channel::<String>(32);

    tokio::spawn(async move {
        loop {
            let bytes = tokio::select! {
                Some(line) = direct_rx.recv() => format!("{line}\r\n").into_bytes(),
                Ok(outgoing) = broadcast_rx.recv() => match outgoing {
                    Outgoing::Bytes(bytes) => bytes,
                    Outgoing::Hangup => {
                        let _ = writer.shutdown().await;
                        break;
                    }
                },
                else => break,
            };
            if writer.write_all(&bytes).await.is_err() || writer.flush().await.is_err() {
                break;
            }
        }
    });

    let mut reader = BufReader::new(reader);
    let mut buffer = String::new();
    let mut nick = String::new();
    loop {
        buffer.clear();
        match reader.read_line(&mut buffer).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = buffer.trim_end_matches(['\r', '\n']).to_string();
        if line.is_empty() {
            continue;
        }
        received.lock().unwrap().push(line.clone());

        let parts: Vec<&str> = line.split_whitespace().collect();
        let replies = match parts.as_slice() {
            ["CAP", "REQ", caps @ ..] => vec![format!(
                ":{SERVER_NAME} CAP * ACK :{}",
                caps.join(" ").trim_start_matches(':')
            )],
            ["NICK", name, ..] => {
                nick = name.to_string();
                vec![
                    format!(":{SERVER_NAME} 001 {nick} :Welcome, GLHF!"),
                    format!(":{SERVER_NAME} 002 {nick} :Your host is {SERVER_NAME}"),
                    format!(":{SERVER_NAME} 376 {nick} :>"),
                ]
            }
            ["JOIN", channel, ..] => {
                let channel = channel.trim_start_matches('#');
                vec![
                    format!(":{nick}!{nick}@{nick}.{SERVER_NAME} JOIN #{channel}"),
                    format!(
                        "@emote-only=0;followers-only=-1;r9k=0;room-id={};slow=0;subs-only=0 :{SERVER_NAME} ROOMSTATE #{channel}",
                        room_id_for(channel)
                    ),
                ]
            }
            ["PART", channel, ..] => {
                vec![format!(":{nick}!{nick}@{nick}.{SERVER_NAME} PART {channel}")]
            }
            _ => Vec::new(),
        };
        for reply in replies {
            if direct_tx.send(reply).await.is_err() {
                return;
            }
        }
    }
}

fn twitchdev_user() -> Value {
    json!({
        "id": TWITCHDEV_ID,
        "login": "twitchdev",
        "display_name": "TwitchDev",
        "type": "",
        "broadcaster_type": "partner",
        "description": "Supporting third-party developers building Twitch integrations from chatbots to game integrations.",
        "profile_image_url": "https://static-cdn.jtvnw.net/jtv_user_pictures/8a6381c7-d0c0-4576-b179-38bd5ce1d6af-profile_image-300x300.png",
        "offline_image_url": "https://static-cdn.jtvnw.net/jtv_user_pictures/3f13ab61-ec78-4fe6-8481-8682cb3b0ac2-channel_offline_image-1920x1080.png",
        "view_count": 5980557,
        "created_at": "2016-12-14T20:32:28Z"
    })
}

fn generic_user(id: &str, login: &str) -> Value {
    json!({
        "id": id,
        "login": login,
        "display_name": login,
        "type": "",
        "broadcaster_type": "",
        "description": "",
        "profile_image_url": "",
        "offline_image_url": "",
        "created_at": "2022-01-20T21:55:56Z"
    })
}

fn find_user(query: &HashMap<String, String>) -> Option<Value> {
    if let Some(id) = query.get("id") {
        return match id.as_str() {
            TWITCHDEV_ID => Some(twitchdev_user()),
            VIEWER_ID => Some(generic_user(VIEWER_ID, "lovingt3s")),
            // Bot nicknames are seven hex characters, which can be all digits.
            other if other.len() == 7 => Some(generic_user("100000001", other)),
            _ => None,
        };
    }
    match query.get("login").map(String::as_str) {
        Some("twitchdev") => Some(twitchdev_user()),
        Some("lovingt3s") => Some(generic_user(VIEWER_ID, "lovingt3s")),
        Some(login) if login.len() == 7 => Some(generic_user("100000001", login)),
        Some("amar") => Some(generic_user("84720493", "amar")),
        _ => None,
    }
}

fn check_auth(headers: &HeaderMap) -> Result<(), Response> {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {APP_TOKEN}"))
        .unwrap_or(false);
    let client_id = headers
        .get("client-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == CLIENT_ID)
        .unwrap_or(false);
    if bearer && client_id {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized", "status": 401, "message": "Invalid OAuth token" })),
        )
            .into_response())
    }
}

fn data(items: Vec<Value>) -> Response {
    Json(json!({ "data": items })).into_response()
}

async fn token_handler(
    State(issued): State<Arc<AtomicUsize>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let secret = form.get("client_secret").map(String::as_str);
    let valid = form.get("grant_type").map(String::as_str) == Some("client_credentials")
        && form.get("client_id").map(String::as_str) == Some(CLIENT_ID)
        && matches!(secret, Some(CLIENT_SECRET | SHORT_LIVED_SECRET));
    if !valid {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": 400, "message": "invalid client secret" })),
        )
            .into_response();
    }
    issued.fetch_add(1, Ordering::SeqCst);
    let expires_in = if secret == Some(SHORT_LIVED_SECRET) { 5 } else { 5011271 };
    Json(json!({ "access_token": APP_TOKEN, "expires_in": expires_in, "token_type": "bearer" }))
        .into_response()
}

async fn users_handler(
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Err(response) = check_auth(&headers) {
        return response;
    }
    data(find_user(&query).into_iter().collect())
}

async fn channels_handler(
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Err(response) = check_auth(&headers) {
        return response;
    }
    let channels = match query.get("broadcaster_id").map(String::as_str) {
        Some(TWITCHDEV_ID) => vec![json!({
            "broadcaster_id": TWITCHDEV_ID,
            "broadcaster_login": "twitchdev",
            "broadcaster_name": "TwitchDev",
            "broadcaster_language": "en",
            "game_id": "509670",
            "game_name": "Science & Technology",
            "title": "TwitchDev Monthly Update // May 6, 2021",
            "delay": 0
        })],
        _ => Vec::new(),
    };
    data(channels)
}

async fn streams_handler(
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Err(response) = check_auth(&headers) {
        return response;
    }
    let streams = match query.get("user_id").map(String::as_str) {
        Some(TWITCHDEV_ID) => vec![json!({
            "id": "40952121085",
            "user_id": TWITCHDEV_ID,
            "user_login": "twitchdev",
            "user_name": "TwitchDev",
            "game_id": "509670",
            "game_name": "Science & Technology",
            "type": "live",
            "title": "TwitchDev Monthly Update // May 6, 2021",
            "viewer_count": 78365,
            "started_at": "2021-03-10T15:04:21Z",
            "language": "en",
            "thumbnail_url": "https://static-cdn.jtvnw.net/previews-ttv/live_user_twitchdev-{width}x{height}.jpg",
            "is_mature": false
        })],
        _ => Vec::new(),
    };
    data(streams)
}

/// Answers with whatever JSON body it was sent, wrapped as a single item.
async fn echo_handler(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(response) = check_auth(&headers) {
        return response;
    }
    data(vec![body])
}

/// Serves the token endpoint under `/oauth2/token` and Helix under `/helix/`.
pub async fn spawn_helix_api() -> SocketAddr {
    spawn_counting_helix_api().await.0
}

/// Like [`spawn_helix_api`], also returning how many tokens have been issued.
pub async fn spawn_counting_helix_api() -> (SocketAddr, Arc<AtomicUsize>) {
    let issued = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/oauth2/token", post(token_handler))
        .route("/helix/users", get(users_handler))
        .route("/helix/channels", get(channels_handler))
        .route("/helix/streams", get(streams_handler))
        .route("/helix/echo", post(echo_handler))
        .with_state(Arc::clone(&issued));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, issued)
}

pub fn test_config(irc: SocketAddr, helix: SocketAddr) -> TwitchConfig {
    let mut config = TwitchConfig::new("oauth:irc_token", CLIENT_ID, CLIENT_SECRET);
    config.helix_url = format!("http://{helix}/helix/");
    config.token_url = format!("http://{helix}/oauth2/token");
    config.irc_host = irc.ip().to_string();
    config.irc_port = irc.port();
    config
}

/// Collects every event of `kind` into a channel.
pub async fn record(events: &EventManager, kind: EventKind) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    events
        .subscribe_fn(kind, move |event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event);
            }
        })
        .await;
    rx
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}
