use super::channels::Channel;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamType {
    #[serde(rename = "live")]
    Live,
    /// Twitch only reports this when something went wrong on its side.
    #[serde(rename = "", other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stream {
    pub id: String,
    pub channel: Channel,
    pub stream_type: StreamType,
    /// Viewer count at the time of the request.
    pub viewer_count: u64,
    pub created_at: DateTime<Utc>,
    pub is_mature: bool,
    /// Thumbnail URL template with `{width}` and `{height}` placeholders.
    pub thumbnail_url: String,
}

impl Stream {
    pub fn uptime(&self) -> TimeDelta {
        Utc::now() - self.created_at
    }

    pub fn thumbnail_url(&self, width: u32, height: u32) -> String {
        self.thumbnail_url
            .replace("{width}", &width.to_string())
            .replace("{height}", &height.to_string())
    }
}

impl PartialEq for Stream {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Stream {}

impl Hash for Stream {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Game;

    fn amar() -> Stream {
        Stream {
            id: "40944942733".to_string(),
            channel: Channel {
                id: "67931625".to_string(),
                username: "amar".to_string(),
                display_name: "Amar".to_string(),
                language: "de".to_string(),
                game: Game {
                    id: "33214".to_string(),
                    name: "Fortnite".to_string(),
                },
                title: "27h Stream Pringles Deathrun Map + 12k MK Turnier".to_string(),
                delay: 0,
            },
            stream_type: StreamType::Live,
            viewer_count: 14944,
            created_at: Utc::now() - TimeDelta::seconds(3600),
            is_mature: false,
            thumbnail_url: "https://static-cdn.jtvnw.net/previews-ttv/live_user_amar-{width}x{height}.jpg".to_string(),
        }
    }

    #[test]
    fn uptime_counts_from_start() {
        let uptime = amar().uptime();
        assert!(uptime >= TimeDelta::seconds(3600));
        assert!(uptime < TimeDelta::seconds(3605));
    }

    #[test]
    fn thumbnail_url_fills_in_dimensions() {
        assert_eq!(
            amar().thumbnail_url(1280, 720),
            "https://static-cdn.jtvnw.net/previews-ttv/live_user_amar-1280x720.jpg"
        );
    }

    #[test]
    fn unrecognised_type_is_unknown() {
        let parsed: StreamType = serde_json::from_str("\"rerun\"").unwrap();
        assert_eq!(parsed, StreamType::Unknown);
    }
}
