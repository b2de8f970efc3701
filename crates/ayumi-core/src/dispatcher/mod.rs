//! Command dispatching
//!
//! [`Dispatcher::dispatch`] routes one [`CommandEvent`] to exactly one
//! handler. Handlers run in a guarded scope: returned errors and panics are
//! logged and turned into a generic failure reply, never propagated to the
//! event source.

mod command;
mod handlers;

pub use command::{CommandKind, ParamKind, ParamSpec};

use crate::config::{CoreSettings, COOLDOWN_MAX_ENTRIES};
use crate::cooldown::CooldownTracker;
use crate::event::{ChannelId, CommandEvent, UserId};
use crate::peers::KnownPeers;
use crate::probe::ProbeClient;
use crate::reply::{NavDirection, Reply, ReplySink};
use crate::session::{SessionError, SessionHandle, SessionManager};
use crate::stats::StatsLedger;
use crate::storage::KeyValueStore;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const FAILURE_TEXT: &str = "❌ Something went wrong while running this command. Please try again later.";

/// State containers shared by every handler.
pub struct Services {
    /// Per-user cooldowns.
    pub cooldowns: CooldownTracker,
    /// Live paginated sessions.
    pub sessions: Arc<SessionManager>,
    /// Reachability probes.
    pub probe: ProbeClient,
    /// Users allowed to receive direct messages.
    pub peers: Arc<KnownPeers>,
    /// Leaderboard points.
    pub stats: Arc<StatsLedger>,
}

impl Services {
    /// Build every component from the settings.
    #[must_use]
    pub fn new(
        sink: Arc<dyn ReplySink>,
        store: Arc<dyn KeyValueStore>,
        peers: KnownPeers,
        settings: &CoreSettings,
    ) -> Self {
        Self {
            cooldowns: CooldownTracker::new(
                [("support", settings.support_cooldown())],
                COOLDOWN_MAX_ENTRIES,
            ),
            sessions: SessionManager::new(sink, settings.session_ttl()),
            probe: ProbeClient::new(settings.probe_timeout()),
            peers: Arc::new(peers),
            stats: Arc::new(StatsLedger::new(store)),
        }
    }
}

/// How a dispatched event ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler ran to completion (including refusals and unknown commands).
    Handled,
    /// The handler failed; a generic failure reply was attempted.
    Failed,
}

/// Routes command events to their handlers.
pub struct Dispatcher {
    sink: Arc<dyn ReplySink>,
    services: Services,
    command_prefix: String,
    support_chat: Option<ChannelId>,
}

impl Dispatcher {
    /// Creates a dispatcher replying through `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn ReplySink>, services: Services, settings: &CoreSettings) -> Self {
        Self {
            sink,
            services,
            command_prefix: settings.command_prefix.clone(),
            support_chat: settings.support_chat_id.map(ChannelId),
        }
    }

    /// Shared components.
    #[must_use]
    pub const fn services(&self) -> &Services {
        &self.services
    }

    /// Prefix that marks commands.
    #[must_use]
    pub fn command_prefix(&self) -> &str {
        &self.command_prefix
    }

    /// Handle one command event.
    pub async fn dispatch(&self, event: CommandEvent) -> DispatchOutcome {
        let Some(kind) = CommandKind::from_name(&event.command) else {
            debug!(command = %event.command, user_id = %event.actor.id, "Unknown command");
            let text = format!(
                "❓ The command <code>{}</code> is not implemented.",
                crate::reply::escape(&event.command)
            );
            self.reply_best_effort(event.channel, Reply::text(text)).await;
            return DispatchOutcome::Handled;
        };

        info!(
            command = kind.name(),
            user_id = %event.actor.id,
            channel = %event.channel,
            direct = event.origin.is_direct(),
            "Handling command"
        );

        let guarded = AssertUnwindSafe(self.run(kind, &event)).catch_unwind().await;
        let failure = match guarded {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{e:#}")),
            Err(payload) => Some(format!("panic: {}", panic_message(payload.as_ref()))),
        };

        if let Some(reason) = failure {
            error!(
                command = kind.name(),
                user_id = %event.actor.id,
                channel = %event.channel,
                "Command failed: {reason}"
            );
            self.reply_best_effort(event.channel, Reply::text(FAILURE_TEXT)).await;
            return DispatchOutcome::Failed;
        }

        if let Err(e) = self.services.stats.record(&event.actor, kind.points()).await {
            warn!(user_id = %event.actor.id, "Failed to record stats: {e}");
        }
        DispatchOutcome::Handled
    }

    async fn run(&self, kind: CommandKind, event: &CommandEvent) -> anyhow::Result<()> {
        match kind {
            CommandKind::Hug | CommandKind::Kiss => self.handle_social(kind, event).await,
            CommandKind::Support => self.handle_support(event).await,
            CommandKind::Help => self.handle_help(event).await,
            CommandKind::Check => self.handle_check(event).await,
            CommandKind::Purge => self.handle_purge(event).await,
            CommandKind::Leaderboard => self.handle_leaderboard(event).await,
        }
    }

    /// Apply a page-navigation request to its session.
    ///
    /// Returns a short notice for the requester when the request was refused,
    /// `None` when it was applied (or was a no-op at an edge).
    pub async fn navigate(
        &self,
        handle: SessionHandle,
        requester: UserId,
        direction: NavDirection,
    ) -> Option<String> {
        match self.services.sessions.navigate(handle, requester, direction).await {
            Ok(_) => None,
            Err(SessionError::NotOwner) => {
                Some("Only the person who opened this menu can turn its pages.".to_string())
            }
            Err(SessionError::Expired) => {
                Some("This menu has expired. Run the command again.".to_string())
            }
            Err(e) => {
                warn!(session = %handle, "Navigation failed: {e}");
                Some("Could not update this menu right now.".to_string())
            }
        }
    }

    async fn reply(&self, channel: ChannelId, text: impl Into<String>) -> anyhow::Result<()> {
        self.sink.send(channel, Reply::text(text)).await?;
        Ok(())
    }

    async fn reply_best_effort(&self, channel: ChannelId, reply: Reply) {
        if let Err(e) = self.sink.send(channel, reply).await {
            warn!(channel = %channel, "Failed to deliver reply: {e}");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
