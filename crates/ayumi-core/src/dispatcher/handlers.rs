//! Command handlers.

use super::{CommandKind, Dispatcher};
use crate::config::{LEADERBOARD_SIZE, PURGE_MAX_COUNT};
use crate::cooldown::format_remaining;
use crate::event::{Actor, CommandEvent, Origin};
use crate::probe::ProbeOutcome;
use crate::reply::{escape, mention, Reply, SinkError};
use anyhow::Context;
use rand::seq::SliceRandom;
use std::fmt::Write as _;
use tracing::{debug, info};

const HUG_TEMPLATES: &[&str] = &[
    "Awww {user1} is hugging {user2} 🤗",
    "{user1} gives a warm hug to {user2}!",
];

const KISS_TEMPLATES: &[&str] = &[
    "{user1} kisses {user2} 💋",
    "{user1} blows a kiss to {user2} ❤️",
];

fn social_line(kind: CommandKind, actor: &Actor, target: &Actor) -> String {
    let templates = if kind == CommandKind::Kiss {
        KISS_TEMPLATES
    } else {
        HUG_TEMPLATES
    };
    let template = templates
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("{user1} → {user2}");
    template
        .replace("{user1}", &mention(actor))
        .replace("{user2}", &mention(target))
}

impl Dispatcher {
    pub(super) async fn handle_social(
        &self,
        kind: CommandKind,
        event: &CommandEvent,
    ) -> anyhow::Result<()> {
        let verb = kind.name();
        let target = event.args.user("target");
        let peers = &self.services.peers;

        // Membership before this event decides whether a DM is allowed
        let target_known = match target {
            Some(target) => peers.has(target.id).await,
            None => false,
        };

        peers.add(event.actor.id).await;
        if let (Some(target), Origin::Group { .. }) = (target, event.origin) {
            peers.add(target.id).await;
        }
        peers.persist().await.context("persisting known peers")?;

        let notice = format!("{} sent you a {verb}! ❤️", escape(&event.actor.name));

        if event.origin.is_direct() {
            let Some(target) = target else {
                return self
                    .reply(event.channel, format!("You tried to {verb} yourself! 🤗"))
                    .await;
            };
            let name = escape(&target.name);
            if !target_known {
                return self
                    .reply(event.channel, format!("❌ {name} is unknown to the bot."))
                    .await;
            }
            let text = match self.sink.send_direct(target.id, notice).await {
                Ok(_) => format!("✅ {verb} sent to {name} via DM!"),
                Err(e) => {
                    debug!(target_id = %target.id, "Direct message refused: {e}");
                    format!("❌ Could not DM {name}.")
                }
            };
            return self.reply(event.channel, text).await;
        }

        let Some(target) = target else {
            return self
                .reply(event.channel, "❌ You need to mention someone!")
                .await;
        };
        self.reply(event.channel, social_line(kind, &event.actor, target))
            .await?;

        if target_known {
            if let Err(e) = self.sink.send_direct(target.id, notice).await {
                info!(target_id = %target.id, "Could not DM target user: {e}");
            }
        }
        Ok(())
    }

    pub(super) async fn handle_support(&self, event: &CommandEvent) -> anyhow::Result<()> {
        let Some(message) = event.args.text("message") else {
            let usage = CommandKind::Support.usage(&self.command_prefix);
            return self
                .reply(
                    event.channel,
                    format!("✏️ Please describe your problem: <code>{}</code>", escape(&usage)),
                )
                .await;
        };

        let now = tokio::time::Instant::now().into_std();
        let admission = self
            .services
            .cooldowns
            .try_acquire(event.actor.id, "support", now)
            .await;
        if !admission.admitted {
            return self
                .reply(
                    event.channel,
                    format!(
                        "⏳ You can contact support again in {}.",
                        format_remaining(admission.remaining)
                    ),
                )
                .await;
        }

        match self.support_chat {
            Some(chat) => {
                let forwarded = format!(
                    "📩 Support request from {} (<code>{}</code>):\n{}",
                    mention(&event.actor),
                    event.actor.id,
                    escape(message)
                );
                self.sink
                    .send(chat, Reply::text(forwarded))
                    .await
                    .context("forwarding support request")?;
            }
            None => {
                info!(
                    user_id = %event.actor.id,
                    request = message,
                    "Support request (no support chat configured)"
                );
            }
        }

        self.reply(
            event.channel,
            "✅ Your message was sent to the support team. We will get back to you soon!",
        )
        .await
    }

    pub(super) async fn handle_help(&self, event: &CommandEvent) -> anyhow::Result<()> {
        let pages = self.help_pages();
        let handle = self
            .services
            .sessions
            .create(event.actor.id, event.channel, pages)
            .await
            .context("opening help session")?;
        debug!(session = %handle, "Help session opened");
        Ok(())
    }

    fn help_pages(&self) -> Vec<String> {
        let prefix = &self.command_prefix;
        let mut overview = String::from("<b>📖 Ayumi commands</b>\n\n");
        for kind in CommandKind::ALL {
            let _ = writeln!(
                overview,
                "<code>{}{}</code>: {}",
                escape(prefix),
                kind.name(),
                kind.description()
            );
        }
        let _ = write!(
            overview,
            "\nUse the buttons to see each command. This menu closes after {}s.",
            self.services.sessions.ttl().as_secs()
        );

        let mut pages = vec![overview];
        pages.extend(CommandKind::ALL.into_iter().map(|kind| {
            let mut page = format!(
                "<b>{}{}</b>\n{}\n\nUsage: <code>{}</code>",
                escape(prefix),
                kind.name(),
                kind.description(),
                escape(&kind.usage(prefix))
            );
            if let Some(window) = kind
                .cooldown_action()
                .and_then(|action| self.services.cooldowns.window(action))
            {
                let _ = write!(page, "\nCooldown: {}", format_remaining(window));
            }
            if kind == CommandKind::Purge {
                page.push_str("\nRequires permission to delete messages. Groups only.");
            }
            page
        }));
        pages
    }

    pub(super) async fn handle_check(&self, event: &CommandEvent) -> anyhow::Result<()> {
        let Some(url) = event.args.text("url") else {
            let usage = CommandKind::Check.usage(&self.command_prefix);
            return self
                .reply(event.channel, format!("✏️ Usage: <code>{}</code>", escape(&usage)))
                .await;
        };

        let result = self.services.probe.check(url).await;
        let target = escape(&result.target);
        let text = match result.outcome {
            ProbeOutcome::Reachable { status } => {
                format!("✅ <b>{target}</b> is reachable (HTTP {status}).")
            }
            ProbeOutcome::Unreachable { reason } => {
                format!("❌ <b>{target}</b> is unreachable: {}.", escape(&reason))
            }
        };
        self.reply(event.channel, text).await
    }

    pub(super) async fn handle_purge(&self, event: &CommandEvent) -> anyhow::Result<()> {
        if event.origin.is_direct() {
            return self
                .reply(event.channel, "❌ This command can only be used in groups.")
                .await;
        }
        if !event.origin.is_elevated() {
            debug!(user_id = %event.actor.id, "Purge refused: missing permission");
            return self
                .reply(
                    event.channel,
                    "❌ You need permission to delete messages to use this command.",
                )
                .await;
        }

        let count = match event.args.integer("count") {
            Some(count) if (1..=PURGE_MAX_COUNT).contains(&count) => count,
            _ => {
                return self
                    .reply(
                        event.channel,
                        format!("❌ Please provide a number between 1 and {PURGE_MAX_COUNT}."),
                    )
                    .await;
            }
        };
        let count = u32::try_from(count).context("purge count out of range")?;

        let submitted = match self.sink.purge(event.channel, event.message_id, count).await {
            Ok(submitted) => submitted,
            Err(SinkError::Permission(reason)) => {
                debug!(channel = %event.channel, "Purge rejected by platform: {reason}");
                return self
                    .reply(event.channel, "❌ I don't have permission to delete messages here.")
                    .await;
            }
            Err(e) => return Err(e).context("bulk delete"),
        };

        info!(channel = %event.channel, requested = count, submitted, "Purge submitted");
        self.reply(event.channel, format!("🧹 Cleared up to {submitted} message(s)."))
            .await
    }

    pub(super) async fn handle_leaderboard(&self, event: &CommandEvent) -> anyhow::Result<()> {
        let rows = self
            .services
            .stats
            .top(LEADERBOARD_SIZE)
            .await
            .context("loading leaderboard")?;

        if rows.is_empty() {
            return self
                .reply(event.channel, "🏆 No activity recorded yet. Be the first!")
                .await;
        }

        let mut text = String::from("<b>🏆 Leaderboard</b>\n");
        for (rank, row) in rows.iter().enumerate() {
            let _ = write!(
                text,
                "\n{}. {}: {} point(s), {} command(s)",
                rank + 1,
                escape(&row.name),
                row.points,
                row.commands
            );
        }
        self.reply(event.channel, text).await
    }
}
