//! Inbound command events.
//!
//! A [`CommandEvent`] is built by the transport once per user-issued command
//! and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Platform chat identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user as seen in an event: identifier plus display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Stable identifier.
    pub id: UserId,
    /// Display name at the time of the event.
    pub name: String,
}

impl Actor {
    /// Create an actor.
    #[must_use]
    pub fn new(id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Typed value of a named command argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// Free-form text.
    Text(String),
    /// Whole number.
    Integer(i64),
    /// A resolved user.
    User(Actor),
}

/// Named arguments in the order the user supplied them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandArgs(Vec<(String, ArgValue)>);

impl CommandArgs {
    /// Empty argument list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Append an argument, keeping insertion order.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: ArgValue) -> Self {
        self.0.push((name.into(), value));
        self
    }

    /// Append an argument in place.
    pub fn push(&mut self, name: impl Into<String>, value: ArgValue) {
        self.0.push((name.into(), value));
    }

    /// Look up an argument by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// The named argument if it holds a user.
    #[must_use]
    pub fn user(&self, name: &str) -> Option<&Actor> {
        match self.get(name) {
            Some(ArgValue::User(actor)) => Some(actor),
            _ => None,
        }
    }

    /// The named argument if it holds non-blank text.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(ArgValue::Text(text)) if !text.trim().is_empty() => Some(text.trim()),
            _ => None,
        }
    }

    /// The named argument if it holds an integer.
    #[must_use]
    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(ArgValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    /// Iterate over `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no argument was supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Where a command was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// One-to-one chat with the bot.
    Direct,
    /// Group chat; `elevated` is the actor's moderation capability there.
    Group {
        /// Whether the actor may run purge-style commands.
        elevated: bool,
    },
}

impl Origin {
    /// Whether this is a direct-message context.
    #[must_use]
    pub const fn is_direct(self) -> bool {
        matches!(self, Self::Direct)
    }

    /// Whether the actor holds the elevated capability.
    #[must_use]
    pub const fn is_elevated(self) -> bool {
        matches!(self, Self::Group { elevated: true })
    }
}

/// One user-issued command.
#[derive(Debug, Clone)]
pub struct CommandEvent {
    /// Who issued the command.
    pub actor: Actor,
    /// Command name without prefix, lowercase.
    pub command: String,
    /// Named arguments.
    pub args: CommandArgs,
    /// Direct or group context.
    pub origin: Origin,
    /// Chat the reply goes to.
    pub channel: ChannelId,
    /// Message that carried the command, when the platform exposes one.
    pub message_id: Option<i32>,
}

impl CommandEvent {
    /// Create an event without arguments.
    #[must_use]
    pub fn new(actor: Actor, command: impl Into<String>, origin: Origin, channel: ChannelId) -> Self {
        Self {
            actor,
            command: command.into().to_lowercase(),
            args: CommandArgs::new(),
            origin,
            channel,
            message_id: None,
        }
    }

    /// Attach arguments.
    #[must_use]
    pub fn with_args(mut self, args: CommandArgs) -> Self {
        self.args = args;
        self
    }

    /// Attach the triggering message.
    #[must_use]
    pub const fn with_message_id(mut self, message_id: i32) -> Self {
        self.message_id = Some(message_id);
        self
    }
}
