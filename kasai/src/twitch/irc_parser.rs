use std::collections::HashMap;

pub type Tags = HashMap<String, String>;

pub const TWITCH_CAPABILITIES: &str = "CAP REQ :twitch.tv/commands twitch.tv/tags";
pub const SERVER_NAME: &str = "tmi.twitch.tv";

pub const CMD_CAP: &str = "CAP";
pub const CMD_CLEARCHAT: &str = "CLEARCHAT";
pub const CMD_JOIN: &str = "JOIN";
pub const CMD_NICK: &str = "NICK";
pub const CMD_NOTICE: &str = "NOTICE";
pub const CMD_PART: &str = "PART";
pub const CMD_PASS: &str = "PASS";
pub const CMD_PING: &str = "PING";
pub const CMD_PONG: &str = "PONG";
pub const CMD_PRIVMSG: &str = "PRIVMSG";
pub const CMD_ROOMSTATE: &str = "ROOMSTATE";

pub const RPL_WELCOME: &str = "001";

pub const TAG_BADGES: &str = "badges";
pub const TAG_BAN_DURATION: &str = "ban-duration";
pub const TAG_BITS: &str = "bits";
pub const TAG_COLOR: &str = "color";
pub const TAG_ID: &str = "id";
pub const TAG_MOD: &str = "mod";
pub const TAG_REPLY_PARENT_MSG_ID: &str = "reply-parent-msg-id";
pub const TAG_ROOM_ID: &str = "room-id";
pub const TAG_SUBSCRIBER: &str = "subscriber";
pub const TAG_TARGET_USER_ID: &str = "target-user-id";
pub const TAG_TMI_SENT_TS: &str = "tmi-sent-ts";
pub const TAG_TURBO: &str = "turbo";
pub const TAG_USER_ID: &str = "user-id";

/// A single chat line split into its parts. Borrows from the line it was
/// parsed from.
#[derive(Debug, Default, PartialEq)]
pub struct IrcMessage<'a> {
    raw: &'a str,
    tags: Option<&'a str>,
    prefix: Option<&'a str>,
    command: Option<&'a str>,
    params: Vec<&'a str>,
}

impl<'a> IrcMessage<'a> {
    pub fn raw(&self) -> &'a str {
        self.raw
    }

    pub fn command(&self) -> Option<&'a str> {
        self.command
    }

    pub fn prefix(&self) -> Option<&'a str> {
        self.prefix
    }

    pub fn params(&self) -> &[&'a str] {
        &self.params
    }

    pub fn parse(line: &'a str) -> Self {
        let mut message = IrcMessage {
            raw: line,
            ..Default::default()
        };
        let mut remainder = line.trim_end_matches(['\r', '\n']);

        if remainder.starts_with('@') {
            if let Some(space_idx) = remainder.find(' ') {
                message.tags = Some(&remainder[1..space_idx]);
                remainder = &remainder[space_idx + 1..];
            } else {
                message.tags = Some(&remainder[1..]);
                return message;
            }
        }
        if remainder.starts_with(':') {
            if let Some(space_idx) = remainder.find(' ') {
                message.prefix = Some(&remainder[1..space_idx]);
                remainder = &remainder[space_idx + 1..];
            } else {
                message.prefix = Some(&remainder[1..]);
                return message;
            }
        }

        let (middle, trailing) = match remainder.find(" :") {
            Some(idx) => (&remainder[..idx], Some(&remainder[idx + 2..])),
            None => (remainder, None),
        };
        let mut parts = middle.split(' ').filter(|s| !s.is_empty());
        message.command = parts.next();
        message.params.extend(parts);
        if let Some(trailing) = trailing {
            message.params.push(trailing);
        }
        message
    }

    /// Raw (still escaped) value of a tag. Present-but-empty tags yield `Some("")`.
    pub fn tag(&self, key_to_find: &str) -> Option<&'a str> {
        self.tags.and_then(|tags_str| {
            tags_str.split(';').find_map(|component| {
                let mut parts = component.splitn(2, '=');
                let key = parts.next()?;
                if key == key_to_find {
                    parts.next().or(Some(""))
                } else {
                    None
                }
            })
        })
    }

    pub fn tags(&self) -> Tags {
        self.tags.map(transform_tags).unwrap_or_default()
    }

    pub fn prefix_nick(&self) -> Option<&'a str> {
        self.prefix.and_then(|p| p.split('!').next())
    }

    /// First parameter without its leading `#`.
    pub fn channel(&self) -> Option<&'a str> {
        self.params
            .first()
            .map(|p| p.trim_start_matches('#'))
            .filter(|p| !p.is_empty())
    }

    pub fn trailing(&self) -> Option<&'a str> {
        if self.params.len() > 1 || self.command == Some(CMD_PING) {
            self.params.last().copied()
        } else {
            None
        }
    }
}

/// Turns a raw tag section (`@key=value;key2=value2`, leading `@` optional)
/// into a map with unescaped values.
pub fn transform_tags(raw: &str) -> Tags {
    raw.strip_prefix('@')
        .unwrap_or(raw)
        .split(';')
        .filter(|component| !component.is_empty())
        .map(|component| {
            let mut parts = component.splitn(2, '=');
            let key = parts.next().unwrap_or_default();
            let value = parts.next().unwrap_or_default();
            (key.to_string(), unescape_tag_value(value))
        })
        .collect()
}

pub fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            // trailing lone backslash is dropped
            None => {}
        }
    }
    out
}

/// Escapes a value for use in an outgoing tag section.
pub fn escape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ';' => out.push_str(r"\:"),
            ' ' => out.push_str(r"\s"),
            '\\' => out.push_str(r"\\"),
            '\r' => out.push_str(r"\r"),
            '\n' => out.push_str(r"\n"),
            other => out.push(other),
        }
    }
    out
}
