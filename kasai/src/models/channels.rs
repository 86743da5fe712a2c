use super::games::Game;
use crate::error::Result;
use crate::twitch::TwitchClient;
use serde::Serialize;
use std::hash::{Hash, Hasher};

/// A Twitch channel as returned by the Helix `channels` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Channel {
    /// Same as the broadcaster's user ID.
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub language: String,
    pub game: Game,
    pub title: String,
    /// Stream delay in seconds.
    pub delay: u32,
}

impl Channel {
    /// The channel name the way chat commands expect it (`#login`).
    pub fn irc_format(&self) -> String {
        format!("#{}", self.username)
    }

    pub async fn send(&self, client: &TwitchClient, content: &str) -> Result<()> {
        client.create_message(&self.username, content, None).await
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Channel {}

impl Hash for Channel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
