//! Conversion of Helix JSON payloads and chat tags into model types.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{KasaiError, Result};
use crate::models::{
    BroadcasterType, Channel, Game, Message, Stream, StreamType, User, UserType, Viewer,
};
use crate::twitch::irc_parser::{
    TAG_BADGES, TAG_BITS, TAG_COLOR, TAG_ID, TAG_MOD, TAG_SUBSCRIBER, TAG_TMI_SENT_TS, TAG_TURBO,
    Tags,
};

pub trait TwitchEntityFactory: Send + Sync {
    fn deserialize_twitch_user(&self, payload: Value) -> Result<User>;

    fn deserialize_twitch_viewer(&self, payload: Value, tags: &Tags) -> Result<Viewer>;

    fn deserialize_twitch_channel(&self, payload: Value) -> Result<Channel>;

    fn deserialize_twitch_stream(&self, payload: Value, channel: Channel) -> Result<Stream>;

    fn deserialize_twitch_message(
        &self,
        content: &str,
        tags: &Tags,
        author: Viewer,
        channel: Channel,
    ) -> Result<Message>;
}

#[derive(Deserialize)]
struct UserPayload {
    id: String,
    login: String,
    display_name: String,
    #[serde(rename = "type")]
    user_type: UserType,
    broadcaster_type: BroadcasterType,
    #[serde(default)]
    description: String,
    #[serde(default)]
    profile_image_url: String,
    #[serde(default)]
    offline_image_url: String,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ChannelPayload {
    broadcaster_id: String,
    broadcaster_login: String,
    broadcaster_name: String,
    broadcaster_language: String,
    game_id: String,
    game_name: String,
    title: String,
    #[serde(default)]
    delay: u32,
}

#[derive(Deserialize)]
struct StreamPayload {
    id: String,
    #[serde(rename = "type")]
    stream_type: StreamType,
    viewer_count: u64,
    started_at: DateTime<Utc>,
    #[serde(default)]
    is_mature: bool,
    thumbnail_url: String,
}

fn from_payload<T: DeserializeOwned>(payload: Value, what: &str) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| KasaiError::Deserialize(format!("{what} payload: {e}")))
}

pub(crate) fn required_tag<'t>(tags: &'t Tags, key: &'static str) -> Result<&'t str> {
    tags.get(key)
        .map(String::as_str)
        .ok_or(KasaiError::MissingTag(key))
}

fn flag_tag(tags: &Tags, key: &'static str) -> Result<bool> {
    let value = required_tag(tags, key)?;
    if value.is_empty() {
        return Ok(false);
    }
    value
        .parse::<u8>()
        .map(|v| v != 0)
        .map_err(|_| KasaiError::Deserialize(format!("tag '{key}' is not a flag: {value:?}")))
}

/// `#RRGGBB` to a 24-bit integer. Users that never set a color have an empty tag.
pub fn parse_color(value: Option<&str>) -> Result<u32> {
    let hex = value.unwrap_or_default().trim_start_matches('#');
    if hex.is_empty() {
        return Ok(0);
    }
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(KasaiError::Deserialize(format!("invalid color: {hex:?}")));
    }
    u32::from_str_radix(hex, 16)
        .map_err(|_| KasaiError::Deserialize(format!("invalid color: {hex:?}")))
}

/// Millisecond Unix timestamp, as sent in `tmi-sent-ts`.
pub fn parse_tmi_timestamp(value: &str) -> Result<DateTime<Utc>> {
    value
        .parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| KasaiError::Deserialize(format!("invalid tmi-sent-ts: {value:?}")))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEntityFactory;

impl TwitchEntityFactory for DefaultEntityFactory {
    fn deserialize_twitch_user(&self, payload: Value) -> Result<User> {
        let p: UserPayload = from_payload(payload, "user")?;
        Ok(User {
            id: p.id,
            username: p.login,
            display_name: p.display_name,
            description: p.description,
            user_type: p.user_type,
            broadcaster_type: p.broadcaster_type,
            profile_image_url: p.profile_image_url,
            offline_image_url: p.offline_image_url,
            created_at: p.created_at,
        })
    }

    fn deserialize_twitch_viewer(&self, payload: Value, tags: &Tags) -> Result<Viewer> {
        let user = self.deserialize_twitch_user(payload)?;
        Ok(Viewer {
            user,
            color: parse_color(tags.get(TAG_COLOR).map(String::as_str))?,
            is_mod: flag_tag(tags, TAG_MOD)?,
            is_subscriber: flag_tag(tags, TAG_SUBSCRIBER)?,
            is_turbo: flag_tag(tags, TAG_TURBO)?,
            is_broadcaster: tags
                .get(TAG_BADGES)
                .is_some_and(|badges| badges.contains("broadcaster")),
        })
    }

    fn deserialize_twitch_channel(&self, payload: Value) -> Result<Channel> {
        let p: ChannelPayload = from_payload(payload, "channel")?;
        Ok(Channel {
            id: p.broadcaster_id,
            username: p.broadcaster_login,
            display_name: p.broadcaster_name,
            language: p.broadcaster_language,
            game: Game {
                id: p.game_id,
                name: p.game_name,
            },
            title: p.title,
            delay: p.delay,
        })
    }

    fn deserialize_twitch_stream(&self, payload: Value, channel: Channel) -> Result<Stream> {
        let p: StreamPayload = from_payload(payload, "stream")?;
        Ok(Stream {
            id: p.id,
            channel,
            stream_type: p.stream_type,
            viewer_count: p.viewer_count,
            created_at: p.started_at,
            is_mature: p.is_mature,
            thumbnail_url: p.thumbnail_url,
        })
    }

    fn deserialize_twitch_message(
        &self,
        content: &str,
        tags: &Tags,
        author: Viewer,
        channel: Channel,
    ) -> Result<Message> {
        let bits = match tags.get(TAG_BITS).map(String::as_str) {
            None | Some("") => 0,
            Some(raw) => raw
                .parse()
                .map_err(|_| KasaiError::Deserialize(format!("invalid bits: {raw:?}")))?,
        };
        Ok(Message {
            id: required_tag(tags, TAG_ID)?.to_string(),
            author,
            channel,
            created_at: parse_tmi_timestamp(required_tag(tags, TAG_TMI_SENT_TS)?)?,
            bits,
            content: content.to_string(),
        })
    }
}
