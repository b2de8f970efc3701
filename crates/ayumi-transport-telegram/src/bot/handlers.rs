//! Inbound Telegram updates.
//!
//! Turns command messages into [`CommandEvent`]s for the core dispatcher and
//! routes pagination button presses to their sessions.

use crate::bot::directory::{actor_of, UserDirectory};
use crate::bot::views::{parse_callback, PageCallback};
use crate::config::BotSettings;
use anyhow::Result;
use ayumi_core::dispatcher::{CommandKind, Dispatcher as CommandDispatcher, ParamKind};
use ayumi_core::event::{Actor, ArgValue, ChannelId, CommandArgs, CommandEvent, Origin, UserId};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{MessageEntityKind, User};
use tracing::{debug, warn};

/// A command found at the start of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    /// Lowercase command name.
    pub name: String,
    /// Whether the command was explicitly addressed to this bot.
    pub addressed: bool,
    /// Everything after the command token.
    pub rest: &'a str,
}

/// Split `text` into a command and its arguments.
///
/// Returns `None` when the text is not a command, or when it is addressed
/// to another bot via `/command@other_bot`.
#[must_use]
pub fn parse_command<'a>(text: &'a str, prefix: &str, bot_username: &str) -> Option<ParsedCommand<'a>> {
    let body = text.trim_start().strip_prefix(prefix)?;
    let (token, rest) = body
        .split_once(char::is_whitespace)
        .unwrap_or((body, ""));

    let (name, addressed) = match token.split_once('@') {
        Some((name, target)) => {
            if !target.eq_ignore_ascii_case(bot_username) {
                return None;
            }
            (name, true)
        }
        None => (token, false),
    };
    if name.is_empty() {
        return None;
    }

    Some(ParsedCommand {
        name: name.to_lowercase(),
        addressed,
        rest: rest.trim(),
    })
}

/// Users the message points at, in order of precedence.
#[derive(Debug, Clone, Default)]
pub struct TargetHints {
    /// User picked through a text mention entity.
    pub text_mention: Option<Actor>,
    /// User named by a leading `@username`, resolved through the directory.
    pub named: Option<Actor>,
    /// Author of the replied-to message.
    pub reply_to: Option<Actor>,
}

impl TargetHints {
    fn best(&self) -> Option<Actor> {
        self.text_mention
            .clone()
            .or_else(|| self.named.clone())
            .or_else(|| self.reply_to.clone())
    }
}

/// Build typed arguments for `kind` out of the text after the command.
#[must_use]
pub fn build_args(kind: CommandKind, rest: &str, hints: &TargetHints) -> CommandArgs {
    let mut args = CommandArgs::new();
    for param in kind.params() {
        let value = match param.kind {
            ParamKind::User => hints.best().map(ArgValue::User),
            ParamKind::Text => (!rest.is_empty()).then(|| ArgValue::Text(rest.to_string())),
            ParamKind::Integer => rest
                .split_whitespace()
                .next()
                .and_then(|token| token.parse().ok())
                .map(ArgValue::Integer),
        };
        if let Some(value) = value {
            args.push(param.name, value);
        }
    }
    args
}

fn leading_username(rest: &str) -> Option<&str> {
    rest.split_whitespace()
        .next()
        .and_then(|token| token.strip_prefix('@'))
        .filter(|name| !name.is_empty())
}

fn text_mention(msg: &Message) -> Option<Actor> {
    msg.entities()?.iter().find_map(|entity| match &entity.kind {
        MessageEntityKind::TextMention { user } => Some(actor_of(user)),
        _ => None,
    })
}

fn human(user: &User) -> Option<&User> {
    (!user.is_bot).then_some(user)
}

async fn collect_hints(msg: &Message, rest: &str, directory: &UserDirectory) -> TargetHints {
    let named = match leading_username(rest) {
        Some(username) => directory.lookup(username).await,
        None => None,
    };
    TargetHints {
        text_mention: text_mention(msg),
        named,
        reply_to: msg
            .reply_to_message()
            .and_then(|reply| reply.from.as_ref())
            .and_then(human)
            .map(actor_of),
    }
}

async fn is_elevated(bot: &Bot, msg: &Message, user: &User, settings: &BotSettings) -> bool {
    if settings
        .core
        .elevated_users()
        .contains(&user.id.0.cast_signed())
    {
        return true;
    }
    match bot.get_chat_member(msg.chat.id, user.id).await {
        Ok(member) => member.kind.can_delete_messages(),
        Err(e) => {
            warn!(chat_id = msg.chat.id.0, "Failed to check member rights: {e}");
            false
        }
    }
}

/// Whether a parsed command reaches the dispatcher.
///
/// Groups share the `/` namespace with other bots, so an unknown command
/// there gets the "not implemented" reply only when it is addressed to this
/// bot with `/command@bot`. Known commands and private chats always route.
#[must_use]
pub const fn routes_to_dispatcher(known: bool, private: bool, addressed: bool) -> bool {
    known || private || addressed
}

/// Handle a text message that may carry a command.
///
/// # Errors
///
/// Currently infallible; the dispatcher reports its own failures.
pub async fn handle_message(
    bot: Bot,
    msg: Message,
    dispatcher: Arc<CommandDispatcher>,
    directory: Arc<UserDirectory>,
    settings: Arc<BotSettings>,
) -> Result<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    directory.remember_user(user).await;
    if let Some(author) = msg.reply_to_message().and_then(|m| m.from.as_ref()) {
        directory.remember_user(author).await;
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(parsed) = parse_command(
        text,
        &settings.core.command_prefix,
        &settings.telegram.bot_username(),
    ) else {
        return Ok(());
    };

    let private = msg.chat.is_private();
    let kind = CommandKind::from_name(&parsed.name);
    if !routes_to_dispatcher(kind.is_some(), private, parsed.addressed) {
        debug!(command = %parsed.name, "Ignoring unknown group command");
        return Ok(());
    }

    let origin = if private {
        Origin::Direct
    } else {
        let elevated = kind == Some(CommandKind::Purge)
            && is_elevated(&bot, &msg, user, &settings).await;
        Origin::Group { elevated }
    };

    let args = match kind {
        Some(kind) => {
            let hints = collect_hints(&msg, parsed.rest, &directory).await;
            build_args(kind, parsed.rest, &hints)
        }
        None => CommandArgs::new(),
    };

    let event = CommandEvent::new(actor_of(user), parsed.name, origin, ChannelId(msg.chat.id.0))
        .with_args(args)
        .with_message_id(msg.id.0);
    dispatcher.dispatch(event).await;
    Ok(())
}

/// Handle a pagination button press. The query is answered exactly once.
///
/// # Errors
///
/// Returns an error if the callback answer cannot be delivered.
pub async fn handle_page_callback(
    bot: Bot,
    q: CallbackQuery,
    dispatcher: Arc<CommandDispatcher>,
) -> Result<()> {
    let notice = match q.data.as_deref().and_then(parse_callback) {
        Some(PageCallback::Navigate { handle, direction }) => {
            let requester = UserId(q.from.id.0.cast_signed());
            dispatcher.navigate(handle, requester, direction).await
        }
        Some(PageCallback::Noop) => None,
        None => Some("This button is no longer supported.".to_string()),
    };

    let mut answer = bot.answer_callback_query(q.id.clone());
    if let Some(text) = notice {
        answer = answer.text(text);
    }
    answer.await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_command() {
        let parsed = parse_command("/hug @neko", "/", "ayumi_bot").expect("command");
        assert_eq!(parsed.name, "hug");
        assert_eq!(parsed.rest, "@neko");
        assert!(!parsed.addressed);
    }

    #[test]
    fn test_parse_addressed_command() {
        let parsed = parse_command("/Purge@Ayumi_Bot 10", "/", "ayumi_bot").expect("command");
        assert_eq!(parsed.name, "purge");
        assert!(parsed.addressed);
        assert_eq!(parsed.rest, "10");

        assert!(parse_command("/purge@other_bot 10", "/", "ayumi_bot").is_none());
    }

    #[test]
    fn test_parse_rejects_non_commands() {
        assert!(parse_command("hello there", "/", "ayumi_bot").is_none());
        assert!(parse_command("/", "/", "ayumi_bot").is_none());
        assert!(parse_command("/@ayumi_bot", "/", "ayumi_bot").is_none());
    }

    #[test]
    fn test_custom_prefix() {
        let parsed = parse_command("!support  the bot is down ", "!", "ayumi_bot").expect("command");
        assert_eq!(parsed.name, "support");
        assert_eq!(parsed.rest, "the bot is down");
        assert!(parse_command("/support hi", "!", "ayumi_bot").is_none());
    }

    #[test]
    fn test_build_args_by_param_kind() {
        let hints = TargetHints::default();

        let purge = build_args(CommandKind::Purge, "25 please", &hints);
        assert_eq!(purge.integer("count"), Some(25));

        let bad = build_args(CommandKind::Purge, "lots", &hints);
        assert!(bad.is_empty());

        let check = build_args(CommandKind::Check, "example.com", &hints);
        assert_eq!(check.text("url"), Some("example.com"));

        assert!(build_args(CommandKind::Help, "ignored", &hints).is_empty());
    }

    #[test]
    fn test_target_precedence() {
        let hints = TargetHints {
            text_mention: None,
            named: Some(Actor::new(2, "Named")),
            reply_to: Some(Actor::new(3, "Replied")),
        };
        let args = build_args(CommandKind::Hug, "@named", &hints);
        assert_eq!(args.user("target").map(|a| a.id), Some(UserId(2)));

        let reply_only = TargetHints {
            reply_to: Some(Actor::new(3, "Replied")),
            ..TargetHints::default()
        };
        let args = build_args(CommandKind::Kiss, "", &reply_only);
        assert_eq!(args.user("target").map(|a| a.id), Some(UserId(3)));

        assert!(build_args(CommandKind::Hug, "@ghost", &TargetHints::default()).is_empty());
    }

    #[test]
    fn test_unknown_group_commands_need_addressing() {
        // Known commands always route
        assert!(routes_to_dispatcher(true, false, false));
        // Unknown in a private chat gets the not-implemented reply
        assert!(routes_to_dispatcher(false, true, false));
        // Unknown in a group only when addressed to this bot
        assert!(routes_to_dispatcher(false, false, true));
        assert!(!routes_to_dispatcher(false, false, false));
    }

    #[test]
    fn test_leading_username() {
        assert_eq!(leading_username("@neko hi"), Some("neko"));
        assert_eq!(leading_username("neko"), None);
        assert_eq!(leading_username("@"), None);
    }
}
