use super::channels::Channel;
use super::users::Viewer;
use crate::error::Result;
use crate::twitch::TwitchClient;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::hash::{Hash, Hasher};

/// A chat message (PRIVMSG) received from Twitch.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub author: Viewer,
    pub channel: Channel,
    pub created_at: DateTime<Utc>,
    /// Bits cheered with this message.
    pub bits: u64,
    pub content: String,
}

impl Message {
    /// Sends `content` to the channel this message was posted in, optionally
    /// as a threaded reply to it.
    pub async fn respond(&self, client: &TwitchClient, content: &str, reply: bool) -> Result<()> {
        let reply_to = reply.then_some(self.id.as_str());
        client
            .create_message(&self.channel.username, content, reply_to)
            .await
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Message {}

impl Hash for Message {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
