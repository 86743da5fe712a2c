use crate::error::Result;
use crate::twitch::normalise_channel;
use crate::{TWITCH_HELIX_URL, TWITCH_TOKEN_URL};
use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use serde::{Deserialize, Deserializer};

pub const DEFAULT_IRC_HOST: &str = "irc.chat.twitch.tv";
pub const DEFAULT_IRC_PORT: u16 = 6667;

#[derive(Debug, Clone, Deserialize)]
pub struct TwitchConfig {
    /// Chat (IRC) OAuth token. This is not the same as a Helix access token.
    pub irc_token: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_helix_url")]
    pub helix_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_irc_host")]
    pub irc_host: String,
    #[serde(default = "default_irc_port")]
    pub irc_port: u16,
}

impl TwitchConfig {
    pub fn new(
        irc_token: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            irc_token: irc_token.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            helix_url: default_helix_url(),
            token_url: default_token_url(),
            irc_host: default_irc_host(),
            irc_port: default_irc_port(),
        }
    }

    pub fn irc_addr(&self) -> String {
        format!("{}:{}", self.irc_host, self.irc_port)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotConfig {
    #[serde(default, deserialize_with = "deserialize_channel_list")]
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    pub twitch: TwitchConfig,
    #[serde(default)]
    pub bot: BotConfig,
}

fn default_helix_url() -> String {
    TWITCH_HELIX_URL.to_string()
}

fn default_token_url() -> String {
    TWITCH_TOKEN_URL.to_string()
}

fn default_irc_host() -> String {
    DEFAULT_IRC_HOST.to_string()
}

fn default_irc_port() -> u16 {
    DEFAULT_IRC_PORT
}

/// Environment (`KASAI__TWITCH__CLIENT_ID`, ...) first, then an optional `config.*` file.
pub fn settings_builder() -> ConfigBuilder<DefaultState> {
    Config::builder()
        .add_source(
            Environment::with_prefix("KASAI")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("bot.channels")
                .try_parsing(true),
        )
        .add_source(File::with_name("config").required(false))
}

pub fn load_settings() -> Result<AppSettings> {
    settings_from(settings_builder())
}

pub fn settings_from(builder: ConfigBuilder<DefaultState>) -> Result<AppSettings> {
    let settings = builder.build()?;
    Ok(settings.try_deserialize()?)
}

fn deserialize_channel_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    use serde_json::Value;

    let value = Value::deserialize(deserializer)?;
    let raw: Vec<String> = match value {
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        Value::Array(arr) => arr
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                _ => Err(D::Error::custom("Array must contain only strings")),
            })
            .collect::<Result<_, _>>()?,
        _ => return Err(D::Error::custom("Expected string or array of strings")),
    };

    Ok(raw
        .iter()
        .map(|c| normalise_channel(c))
        .filter(|c| !c.is_empty())
        .collect())
}
