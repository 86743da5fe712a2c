use thiserror::Error;

#[derive(Error, Debug)]
pub enum KasaiError {
    #[error("Twitch services are not alive: {0}")]
    NotAlive(String),
    #[error("Twitch services are already alive: {0}")]
    IsAlive(String),
    #[error("{code}: {message}")]
    RequestFailed { code: u16, message: String },
    #[error("Channel not joined: {0}")]
    NotJoined(String),
    #[error("Nothing found for {0}")]
    NotFound(String),
    #[error("IRC message is missing the '{0}' tag")]
    MissingTag(&'static str),
    #[error("Malformed payload: {0}")]
    Deserialize(String),
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("JSON deserialization failed: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Host bot error: {0}")]
    Host(String),
}

impl KasaiError {
    /// Whether this error came from talking to the Helix API.
    pub fn is_helix_error(&self) -> bool {
        matches!(
            self,
            KasaiError::RequestFailed { .. }
                | KasaiError::NotFound(_)
                | KasaiError::Reqwest(_)
                | KasaiError::SerdeJson(_)
        )
    }

    /// Whether this error came from the chat connection.
    pub fn is_irc_error(&self) -> bool {
        matches!(
            self,
            KasaiError::NotJoined(_) | KasaiError::MissingTag(_) | KasaiError::Io(_)
        )
    }
}

pub type Result<T, E = KasaiError> = std::result::Result<T, E>;
