//! Bridges a Discord bot with Twitch: chat over Twitch's IRC interface is
//! turned into events on an [`EventManager`](events::EventManager), and a
//! [`TwitchClient`] exposes the Helix REST API and chat commands.

pub mod bot;
pub mod config;
pub mod entity_factory;
pub mod error;
pub mod events;
pub mod models;
pub mod twitch;
pub mod ux;

pub const TWITCH_HELIX_URL: &str = "https://api.twitch.tv/helix/";
pub const TWITCH_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

pub use bot::{GatewayApp, HostBot};
pub use error::{KasaiError, Result};
pub use events::{Event, EventKind, EventListener, EventManager};
pub use twitch::TwitchClient;
