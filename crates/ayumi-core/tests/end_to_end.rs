//! End-to-end scenarios across the runtime components.

use async_trait::async_trait;
use ayumi_core::config::CoreSettings;
use ayumi_core::cooldown::CooldownTracker;
use ayumi_core::dispatcher::{Dispatcher, Services};
use ayumi_core::event::{Actor, ArgValue, ChannelId, CommandArgs, CommandEvent, Origin, UserId};
use ayumi_core::peers::KnownPeers;
use ayumi_core::probe::{ProbeClient, ProbeOutcome};
use ayumi_core::reply::{MessageRef, NavDirection, Reply, ReplySink, SinkError};
use ayumi_core::session::SessionManager;
use ayumi_core::storage::{FileStore, KeyValueStore};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Outbox {
    next_id: AtomicI32,
    messages: Mutex<Vec<(ChannelId, String)>>,
    directs: Mutex<Vec<UserId>>,
    edits: Mutex<Vec<Reply>>,
}

impl Outbox {
    fn last(&self) -> String {
        self.messages
            .lock()
            .map(|m| m.last().map(|(_, text)| text.clone()).unwrap_or_default())
            .unwrap_or_default()
    }

    fn direct_count(&self) -> usize {
        self.directs.lock().map(|d| d.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ReplySink for Outbox {
    async fn send(&self, channel: ChannelId, reply: Reply) -> Result<MessageRef, SinkError> {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((channel, reply.text));
        }
        Ok(MessageRef {
            channel,
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn edit(&self, _message: &MessageRef, reply: Reply) -> Result<(), SinkError> {
        if let Ok(mut edits) = self.edits.lock() {
            edits.push(reply);
        }
        Ok(())
    }

    async fn send_direct(&self, user: UserId, _text: String) -> Result<MessageRef, SinkError> {
        if let Ok(mut directs) = self.directs.lock() {
            directs.push(user);
        }
        Ok(MessageRef {
            channel: ChannelId(user.0),
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn purge(
        &self,
        _channel: ChannelId,
        _before: Option<i32>,
        count: u32,
    ) -> Result<u32, SinkError> {
        Ok(count)
    }
}

#[tokio::test]
async fn support_cooldown_admits_then_denies() {
    let tracker = CooldownTracker::new([("support", Duration::from_secs(900))], 1_000);
    let t0 = Instant::now();

    let first = tracker.try_acquire(UserId(42), "support", t0).await;
    assert!(first.admitted);
    assert_eq!(first.remaining, Duration::ZERO);

    let repeat = tracker
        .try_acquire(UserId(42), "support", t0 + Duration::from_secs(1))
        .await;
    assert!(!repeat.admitted);
    assert_eq!(repeat.remaining, Duration::from_secs(899));
}

#[tokio::test]
async fn twelve_page_help_stops_on_last_page() {
    let outbox = Arc::new(Outbox::default());
    let sessions = SessionManager::new(outbox.clone(), Duration::from_secs(120));
    let pages: Vec<String> = (1..=12).map(|i| format!("help page {i}")).collect();
    let owner = UserId(7);

    let handle = sessions
        .create(owner, ChannelId(-10), pages)
        .await
        .expect("session created");
    for _ in 0..20 {
        let nav = sessions
            .navigate(handle, owner, NavDirection::Next)
            .await
            .expect("next never errors for the owner");
        assert!(nav.index < 12);
    }

    assert_eq!(sessions.current_index(handle).await, Some(11));
    let edits = outbox.edits.lock().map(|e| e.clone()).unwrap_or_default();
    assert_eq!(edits.last().map(|r| r.text.as_str()), Some("help page 12"));
}

#[tokio::test]
async fn probe_against_closed_port_is_unreachable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let bound = Duration::from_secs(2);
    let probe = ProbeClient::new(bound);
    let started = Instant::now();
    let result = probe.check(&format!("http://{addr}")).await;

    assert!(started.elapsed() <= bound + Duration::from_millis(500));
    assert!(matches!(result.outcome, ProbeOutcome::Unreachable { .. }));
}

#[tokio::test]
async fn known_peers_gate_direct_messages_and_survive_restart() {
    let dir = std::env::temp_dir().join(format!("ayumi-e2e-{}", uuid::Uuid::new_v4()));
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&dir));
    let outbox = Arc::new(Outbox::default());
    let settings = CoreSettings::default();

    let peers = KnownPeers::load(store.clone()).await.expect("load");
    let services = Services::new(outbox.clone(), store.clone(), peers, &settings);
    let dispatcher = Dispatcher::new(outbox.clone(), services, &settings);

    let stranger = Actor::new(900, "Stranger");
    let hug = |actor: Actor, origin: Origin, channel: i64| {
        CommandEvent::new(actor, "hug", origin, ChannelId(channel)).with_args(
            CommandArgs::new().with("target", ArgValue::User(stranger.clone())),
        )
    };

    // Never seen: a direct hug is refused
    dispatcher
        .dispatch(hug(Actor::new(1, "Ayu"), Origin::Direct, 1))
        .await;
    assert!(outbox.last().contains("unknown to the bot"));
    assert_eq!(outbox.direct_count(), 0);

    // Seen in a group: now reachable
    dispatcher
        .dispatch(hug(Actor::new(2, "Rin"), Origin::Group { elevated: false }, -50))
        .await;
    dispatcher
        .dispatch(hug(Actor::new(1, "Ayu"), Origin::Direct, 1))
        .await;
    assert!(outbox.last().contains("via DM"));
    assert_eq!(outbox.direct_count(), 1);

    let reloaded = KnownPeers::load(store).await.expect("reload");
    assert_eq!(
        reloaded.snapshot().await,
        vec![UserId(1), UserId(2), UserId(900)]
    );
    let _ = tokio::fs::remove_dir_all(dir).await;
}
