//! Reply sink backed by the Telegram Bot API.

use crate::bot::resilient::retry_telegram_operation;
use crate::bot::views::page_keyboard;
use async_trait::async_trait;
use ayumi_core::event::{ChannelId, UserId};
use ayumi_core::reply::{MessageRef, Reply, ReplySink, SinkError};
use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId, ParseMode};
use teloxide::{ApiError, RequestError};
use tracing::debug;

/// Sends, edits and deletes messages through a [`Bot`].
#[derive(Clone)]
pub struct TelegramSink {
    bot: Bot,
}

impl TelegramSink {
    /// Wrap a bot handle.
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

/// Map a Bot API failure onto the sink error taxonomy.
#[must_use]
pub fn classify(error: &RequestError) -> SinkError {
    let RequestError::Api(api) = error else {
        return SinkError::Transport(error.to_string());
    };
    match api {
        ApiError::MessageToEditNotFound | ApiError::MessageToDeleteNotFound => SinkError::NotFound,
        ApiError::BotBlocked
        | ApiError::CantInitiateConversation
        | ApiError::CantTalkWithBots
        | ApiError::UserDeactivated => SinkError::Forbidden(api.to_string()),
        ApiError::MessageCantBeDeleted => SinkError::Permission(api.to_string()),
        ApiError::Unknown(text) if text.to_lowercase().contains("not enough rights") => {
            SinkError::Permission(text.clone())
        }
        _ => SinkError::Transport(api.to_string()),
    }
}

/// IDs of the `count` messages right before `anchor`, newest first.
#[must_use]
pub fn preceding_ids(anchor: i32, count: u32) -> Vec<MessageId> {
    (1..=count)
        .filter_map(|offset| i32::try_from(offset).ok())
        .filter_map(|offset| anchor.checked_sub(offset))
        .filter(|id| *id > 0)
        .map(MessageId)
        .collect()
}

#[async_trait]
impl ReplySink for TelegramSink {
    async fn send(&self, channel: ChannelId, reply: Reply) -> Result<MessageRef, SinkError> {
        let chat_id = ChatId(channel.0);
        let markup = page_keyboard(&reply);

        let message = retry_telegram_operation(|| {
            let mut request = self
                .bot
                .send_message(chat_id, reply.text.clone())
                .parse_mode(ParseMode::Html);
            if let Some(markup) = markup.clone() {
                request = request.reply_markup(markup);
            }
            async move { request.await }
        })
        .await
        .map_err(|e| classify(&e))?;

        Ok(MessageRef {
            channel,
            message_id: message.id.0,
        })
    }

    async fn edit(&self, message: &MessageRef, reply: Reply) -> Result<(), SinkError> {
        let chat_id = ChatId(message.channel.0);
        let message_id = MessageId(message.message_id);
        let markup = page_keyboard(&reply);

        // Editing without a markup drops the keyboard
        let result = retry_telegram_operation(|| {
            let mut request = self
                .bot
                .edit_message_text(chat_id, message_id, reply.text.clone())
                .parse_mode(ParseMode::Html);
            if let Some(markup) = markup.clone() {
                request = request.reply_markup(markup);
            }
            async move { request.await }
        })
        .await;

        match result {
            Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
            Err(e) => Err(classify(&e)),
        }
    }

    async fn send_direct(&self, user: UserId, text: String) -> Result<MessageRef, SinkError> {
        self.send(ChannelId(user.0), Reply::text(text)).await
    }

    async fn purge(
        &self,
        channel: ChannelId,
        before: Option<i32>,
        count: u32,
    ) -> Result<u32, SinkError> {
        let Some(anchor) = before else {
            return Err(SinkError::Transport(
                "bulk delete needs an anchor message".to_string(),
            ));
        };
        let ids = preceding_ids(anchor, count);
        if ids.is_empty() {
            return Ok(0);
        }

        let chat_id = ChatId(channel.0);
        let submitted = u32::try_from(ids.len()).unwrap_or(count);
        retry_telegram_operation(|| {
            let request = self.bot.delete_messages(chat_id, ids.clone());
            async move { request.await }
        })
        .await
        .map_err(|e| classify(&e))?;

        debug!(chat_id = channel.0, submitted, "Bulk delete accepted");
        Ok(submitted)
    }
}
