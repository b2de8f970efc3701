//! Reply payloads and the reply sink interface.
//!
//! Handlers never talk to the platform directly: they hand [`Reply`] values
//! to a [`ReplySink`], which returns a [`MessageRef`] for later edits.

use crate::event::{Actor, ChannelId, UserId};
use crate::session::SessionHandle;
use async_trait::async_trait;
use thiserror::Error;

/// Reference to a delivered message, usable for later edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    /// Chat holding the message.
    pub channel: ChannelId,
    /// Platform message identifier.
    pub message_id: i32,
}

/// Page navigation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavDirection {
    /// One page back.
    Previous,
    /// One page forward.
    Next,
}

impl NavDirection {
    /// Short wire token used in callback payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Previous => "prev",
            Self::Next => "next",
        }
    }

    /// Parse a wire token.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "prev" => Some(Self::Previous),
            "next" => Some(Self::Next),
            _ => None,
        }
    }
}

/// An interactive navigation control attached to a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavControl {
    /// Session the control drives.
    pub handle: SessionHandle,
    /// Which way it moves.
    pub direction: NavDirection,
    /// Disabled controls are rendered inert.
    pub enabled: bool,
}

/// Payload of one reply: HTML text plus optional controls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// HTML-formatted body.
    pub text: String,
    /// Navigation controls, empty for plain replies.
    pub controls: Vec<NavControl>,
    /// Page indicator shown between the controls, e.g. `3/12`.
    pub indicator: Option<String>,
}

impl Reply {
    /// Plain text reply without controls.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            controls: Vec::new(),
            indicator: None,
        }
    }

    /// Whether the reply carries any navigation control.
    #[must_use]
    pub fn is_interactive(&self) -> bool {
        !self.controls.is_empty()
    }
}

/// Errors raised by a reply sink.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The referenced message no longer exists.
    #[error("message not found")]
    NotFound,
    /// The recipient cannot be reached (blocked the bot, never started it...).
    #[error("recipient unavailable: {0}")]
    Forbidden(String),
    /// The bot lacks the rights for the operation.
    #[error("missing permission: {0}")]
    Permission(String),
    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Outbound side of the platform.
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Send a reply into a chat.
    async fn send(&self, channel: ChannelId, reply: Reply) -> Result<MessageRef, SinkError>;

    /// Replace the content and controls of a previously sent reply.
    async fn edit(&self, message: &MessageRef, reply: Reply) -> Result<(), SinkError>;

    /// Send a private message to a user.
    async fn send_direct(&self, user: UserId, text: String) -> Result<MessageRef, SinkError>;

    /// Delete up to `count` messages preceding `before` in a chat.
    ///
    /// Returns how many message IDs were submitted for deletion. The platform
    /// silently skips IDs that no longer exist, so this is an upper bound on
    /// what was removed.
    async fn purge(
        &self,
        channel: ChannelId,
        before: Option<i32>,
        count: u32,
    ) -> Result<u32, SinkError>;
}

/// HTML mention linking to the user's profile.
///
/// # Examples
///
/// ```
/// use ayumi_core::event::Actor;
/// use ayumi_core::reply::mention;
///
/// let html = mention(&Actor::new(42, "<Ayu>"));
/// assert_eq!(html, "<a href=\"tg://user?id=42\">&lt;Ayu&gt;</a>");
/// ```
#[must_use]
pub fn mention(actor: &Actor) -> String {
    format!(
        "<a href=\"tg://user?id={}\">{}</a>",
        actor.id,
        html_escape::encode_text(&actor.name)
    )
}

/// Escape user-provided text for an HTML reply.
#[must_use]
pub fn escape(text: &str) -> String {
    html_escape::encode_text(text).to_string()
}
