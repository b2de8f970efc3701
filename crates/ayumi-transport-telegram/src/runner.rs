use crate::alive::{bind_alive, serve_alive};
use crate::bot;
use crate::bot::directory::UserDirectory;
use crate::bot::sink::TelegramSink;
use crate::bot::views::{parse_callback, PageCallback};
use crate::config::BotSettings;
use anyhow::Context;
use ayumi_core::dispatcher::{CommandKind, Dispatcher as CommandDispatcher, Services};
use ayumi_core::peers::KnownPeers;
use ayumi_core::session::SessionHandle;
use ayumi_core::storage::{self, KeyValueStore};
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, CallbackQuery, UpdateKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Worker key: navigation is serialized per session, everything else per
/// sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistributionKey {
    /// Button presses on one paginated reply.
    Session(SessionHandle),
    /// Updates from one user.
    Sender(u64),
}

/// Pick the worker an update is queued on.
#[must_use]
pub fn distribution_key(update: &Update) -> Option<DistributionKey> {
    if let UpdateKind::CallbackQuery(q) = &update.kind {
        if let Some(PageCallback::Navigate { handle, .. }) =
            q.data.as_deref().and_then(parse_callback)
        {
            return Some(DistributionKey::Session(handle));
        }
    }
    update.from().map(|user| DistributionKey::Sender(user.id.0))
}

/// Run the Telegram transport runtime.
pub async fn run_bot(settings: Arc<BotSettings>) {
    let store = init_storage(&settings).await;
    let peers = init_peers(store.clone()).await;

    let bot = Bot::new(settings.telegram.token.clone());
    let sink = Arc::new(TelegramSink::new(bot.clone()));
    let services = Services::new(sink.clone(), store, peers, &settings.core);
    let dispatcher = Arc::new(CommandDispatcher::new(sink, services, &settings.core));
    let directory = Arc::new(UserDirectory::default());

    let shutdown = CancellationToken::new();
    spawn_alive(settings.telegram.port, shutdown.clone()).await;
    publish_commands(&bot, &settings).await;

    info!("Bot is running...");

    Dispatcher::builder(bot, setup_handler())
        .dependencies(dptree::deps![dispatcher, directory, settings])
        .distribution_function(distribution_key)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    shutdown.cancel();
    info!("Bot stopped.");
}

async fn init_storage(settings: &BotSettings) -> Arc<dyn KeyValueStore> {
    match storage::open_store(&settings.core).await {
        Ok(store) => {
            if store.check_connection().await.is_err() {
                error!("Storage connection check returned error.");
            }
            store
        }
        Err(e) => {
            error!("Failed to initialize storage: {}", e);
            std::process::exit(1);
        }
    }
}

async fn init_peers(store: Arc<dyn KeyValueStore>) -> KnownPeers {
    match load_peers(store).await {
        Ok(peers) => peers,
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

/// Load the known-peer registry persisted in `store`.
///
/// # Errors
///
/// Returns an error when stored peers exist but cannot be read. Starting
/// with an empty registry would overwrite them on the next persist.
pub async fn load_peers(store: Arc<dyn KeyValueStore>) -> anyhow::Result<KnownPeers> {
    KnownPeers::load(store)
        .await
        .context("Failed to load known peers")
}

async fn spawn_alive(port: u16, shutdown: CancellationToken) {
    match bind_alive(port).await {
        Ok(listener) => {
            tokio::spawn(async move {
                if let Err(e) = serve_alive(listener, shutdown).await {
                    error!("Alive endpoint stopped: {e:#}");
                }
            });
        }
        Err(e) => error!("Alive endpoint disabled: {e:#}"),
    }
}

async fn publish_commands(bot: &Bot, settings: &BotSettings) {
    // Telegram only offers `/` in its command menu
    if settings.core.command_prefix != "/" {
        return;
    }
    let commands: Vec<BotCommand> = CommandKind::ALL
        .into_iter()
        .map(|kind| BotCommand::new(kind.name(), kind.description()))
        .collect();
    match bot.set_my_commands(commands).await {
        Ok(_) => info!("✅ Command list published."),
        Err(e) => warn!("Failed to publish command list: {e}"),
    }
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_page_callback))
        .branch(
            Update::filter_message()
                .filter(|msg: Message| msg.text().is_some())
                .endpoint(handle_message),
        )
}

async fn handle_message(
    bot: Bot,
    msg: Message,
    dispatcher: Arc<CommandDispatcher>,
    directory: Arc<bot::directory::UserDirectory>,
    settings: Arc<BotSettings>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) =
        bot::handlers::handle_message(bot, msg, dispatcher, directory, settings).await
    {
        error!("Message handler error: {}", e);
    }
    respond(())
}

async fn handle_page_callback(
    bot: Bot,
    q: CallbackQuery,
    dispatcher: Arc<CommandDispatcher>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_page_callback(bot, q, dispatcher).await {
        error!("Page callback handler error: {}", e);
    }
    respond(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ayumi_core::event::UserId;
    use ayumi_core::peers::KNOWN_PEERS_KEY;
    use ayumi_core::storage::StorageError;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Store holding one peer list whose first read fails.
    struct ColdStartStore {
        value: Mutex<Option<Value>>,
        failed_once: AtomicBool,
        writes: AtomicUsize,
    }

    impl ColdStartStore {
        fn with_peers(value: Value) -> Self {
            Self {
                value: Mutex::new(Some(value)),
                failed_once: AtomicBool::new(false),
                writes: AtomicUsize::new(0),
            }
        }

        fn stored(&self) -> Option<Value> {
            self.value.lock().expect("store lock").clone()
        }
    }

    #[async_trait]
    impl KeyValueStore for ColdStartStore {
        async fn get(&self, _key: &str) -> Result<Option<Value>, StorageError> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                return Err(StorageError::Config("bucket unreachable".to_string()));
            }
            Ok(self.stored())
        }

        async fn put(&self, _key: &str, value: Value) -> Result<(), StorageError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            *self.value.lock().expect("store lock") = Some(value);
            Ok(())
        }

        async fn query(&self, _: &str, _: &str, _: usize) -> Result<Vec<Value>, StorageError> {
            Ok(Vec::new())
        }

        async fn check_connection(&self) -> Result<(), String> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_peer_load_failure_leaves_stored_peers_alone() {
        let store = Arc::new(ColdStartStore::with_peers(json!([1, 2, 3])));

        let result = load_peers(store.clone()).await;
        assert!(result.is_err(), "a failed read must not yield an empty registry");
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
        assert_eq!(store.stored(), Some(json!([1, 2, 3])));
    }

    #[tokio::test]
    async fn test_new_peer_is_merged_after_successful_load() {
        let store = Arc::new(ColdStartStore::with_peers(json!([1, 2, 3])));
        assert!(load_peers(store.clone()).await.is_err());

        let peers = load_peers(store.clone()).await.expect("second read succeeds");
        assert!(peers.add(UserId(4)).await);
        peers.persist().await.expect("persist");
        assert_eq!(store.stored(), Some(json!([1, 2, 3, 4])));
    }
}
