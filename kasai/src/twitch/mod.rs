pub mod auth;
pub mod client;
pub mod connection;
pub mod helix;
pub mod irc_parser;

pub use client::{TwitchClient, normalise_channel};
pub use irc_parser::{IrcMessage, Tags};
