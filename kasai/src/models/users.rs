use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserType {
    #[serde(rename = "")]
    Normal,
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "global_mod")]
    GlobalMod,
    #[serde(rename = "staff")]
    Staff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BroadcasterType {
    #[serde(rename = "partner")]
    Partner,
    #[serde(rename = "affiliate")]
    Affiliate,
    #[serde(rename = "")]
    Normal,
}

/// A Twitch user as returned by the Helix `users` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    /// Login name. Always lowercase.
    pub username: String,
    pub display_name: String,
    pub description: String,
    pub user_type: UserType,
    pub broadcaster_type: BroadcasterType,
    pub profile_image_url: String,
    pub offline_image_url: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn login(&self) -> &str {
        &self.username
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for User {}

impl Hash for User {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

/// A user seen in a specific channel's chat.
///
/// Carries the same information as a [`User`] plus the chat-side context
/// Twitch attaches to each message (badges, color, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Viewer {
    pub user: User,
    /// 24-bit RGB value of the name color, 0 when the user never picked one.
    pub color: u32,
    pub is_mod: bool,
    pub is_subscriber: bool,
    pub is_turbo: bool,
    pub is_broadcaster: bool,
}

impl Viewer {
    pub fn id(&self) -> &str {
        &self.user.id
    }

    pub fn username(&self) -> &str {
        &self.user.username
    }

    pub fn display_name(&self) -> &str {
        &self.user.display_name
    }

    pub fn colour(&self) -> u32 {
        self.color
    }
}

impl fmt::Display for Viewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.user.fmt(f)
    }
}
