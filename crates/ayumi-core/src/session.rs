//! Paginated interactive sessions
//!
//! Each session owns a multi-page reply. Only its owner may turn pages, and
//! the session expires a fixed time after creation: its controls are then
//! disabled and the handle is forgotten.
//!
//! The live map is guarded by one `RwLock`; every session additionally sits
//! behind its own FIFO `Mutex`, so navigation on one handle is applied in
//! arrival order while different handles proceed in parallel.

use crate::event::{ChannelId, UserId};
use crate::reply::{MessageRef, NavControl, NavDirection, Reply, ReplySink, SinkError};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque identifier of a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(Uuid);

impl SessionHandle {
    /// Generate a fresh handle.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_simple())
    }
}

impl FromStr for SessionHandle {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting navigation.
    Active,
    /// TTL elapsed or torn down; rejects everything.
    Expired,
}

/// Result of an accepted navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation {
    /// Page index after the navigation.
    pub index: usize,
    /// Total number of pages.
    pub page_count: usize,
    /// `false` when the request ran into an edge and changed nothing.
    pub moved: bool,
}

/// Errors returned by session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Unknown handle, or the session already expired.
    #[error("session expired")]
    Expired,
    /// Someone other than the owner tried to navigate.
    #[error("only the session owner may navigate")]
    NotOwner,
    /// A session needs at least one page.
    #[error("session has no pages")]
    Empty,
    /// The reply could not be sent or updated.
    #[error("reply update failed: {0}")]
    Sink(#[from] SinkError),
}

struct Session {
    owner: UserId,
    pages: Vec<String>,
    index: usize,
    created_at: Instant,
    message: MessageRef,
    state: SessionState,
    expiry: CancellationToken,
}

impl Session {
    fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Owns every live paginated session.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionHandle, Arc<Mutex<Session>>>>,
    sink: Arc<dyn ReplySink>,
    ttl: Duration,
}

impl SessionManager {
    /// Create a manager whose sessions live for `ttl` after creation.
    #[must_use]
    pub fn new(sink: Arc<dyn ReplySink>, ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            sink,
            ttl,
        })
    }

    /// Configured session lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Send the first page of `pages` to `channel` and start a session owned
    /// by `owner`.
    ///
    /// The expiry timer starts once the reply is delivered and is not renewed
    /// by navigation.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` without sending anything for an empty
    /// page list, or `SessionError::Sink` if the reply cannot be delivered.
    pub async fn create(
        self: &Arc<Self>,
        owner: UserId,
        channel: ChannelId,
        pages: Vec<String>,
    ) -> Result<SessionHandle, SessionError> {
        if pages.is_empty() {
            return Err(SessionError::Empty);
        }

        let handle = SessionHandle::new();
        let message = self
            .sink
            .send(channel, render_page(handle, &pages, 0, true))
            .await?;

        let expiry = CancellationToken::new();
        let session = Session {
            owner,
            pages,
            index: 0,
            created_at: Instant::now(),
            message,
            state: SessionState::Active,
            expiry: expiry.clone(),
        };

        self.sessions
            .write()
            .await
            .insert(handle, Arc::new(Mutex::new(session)));

        self.spawn_expiry(handle, expiry);
        info!(session = %handle, owner = %owner, ttl_secs = self.ttl.as_secs(), "Session created");
        Ok(handle)
    }

    fn spawn_expiry(self: &Arc<Self>, handle: SessionHandle, expiry: CancellationToken) {
        let manager: Weak<Self> = Arc::downgrade(self);
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(ttl) => {
                    if let Some(manager) = manager.upgrade() {
                        manager.expire(handle).await;
                    }
                }
                () = expiry.cancelled() => {}
            }
        });
    }

    /// Turn one page in `direction` on behalf of `requester`.
    ///
    /// Navigation past either edge is accepted as a no-op. On a move the
    /// reply is re-rendered first and the new index committed only once the
    /// edit succeeded.
    ///
    /// # Errors
    ///
    /// - `SessionError::Expired` for unknown or expired handles, including a
    ///   reply that was deleted in the meantime.
    /// - `SessionError::NotOwner` when `requester` does not own the session.
    /// - `SessionError::Sink` when the reply edit fails otherwise.
    pub async fn navigate(
        &self,
        handle: SessionHandle,
        requester: UserId,
        direction: NavDirection,
    ) -> Result<Navigation, SessionError> {
        let entry = self.lookup(handle).await.ok_or(SessionError::Expired)?;
        let mut session = entry.lock().await;

        if session.state == SessionState::Expired {
            return Err(SessionError::Expired);
        }
        if session.owner != requester {
            debug!(session = %handle, requester = %requester, "Navigation by non-owner rejected");
            return Err(SessionError::NotOwner);
        }

        let last = session.page_count() - 1;
        let target = match direction {
            NavDirection::Previous => session.index.saturating_sub(1),
            NavDirection::Next => (session.index + 1).min(last),
        };

        if target == session.index {
            return Ok(Navigation {
                index: session.index,
                page_count: session.page_count(),
                moved: false,
            });
        }

        let reply = render_page(handle, &session.pages, target, true);
        match self.sink.edit(&session.message, reply).await {
            Ok(()) => {}
            Err(SinkError::NotFound) => {
                session.state = SessionState::Expired;
                session.expiry.cancel();
                drop(session);
                self.sessions.write().await.remove(&handle);
                info!(session = %handle, "Session reply disappeared, session released");
                return Err(SessionError::Expired);
            }
            Err(e) => return Err(e.into()),
        }

        session.index = target;
        Ok(Navigation {
            index: target,
            page_count: session.page_count(),
            moved: true,
        })
    }

    /// Expire a session: forget the handle and disable its controls.
    ///
    /// Disabling is best effort; a reply that no longer exists is ignored.
    /// Returns `false` if the handle was not live.
    pub async fn expire(&self, handle: SessionHandle) -> bool {
        let Some(entry) = self.sessions.write().await.remove(&handle) else {
            return false;
        };

        let mut session = entry.lock().await;
        session.state = SessionState::Expired;
        session.expiry.cancel();

        let reply = render_page(handle, &session.pages, session.index, false);
        match self.sink.edit(&session.message, reply).await {
            Ok(()) => {}
            Err(SinkError::NotFound) => {
                debug!(session = %handle, "Expired session reply already gone");
            }
            Err(e) => {
                warn!(session = %handle, "Failed to disable session controls: {e}");
            }
        }

        info!(
            session = %handle,
            age_secs = session.created_at.elapsed().as_secs(),
            "Session expired"
        );
        true
    }

    /// Tear a session down after its reply was removed. No edit is attempted.
    ///
    /// Returns `false` if the handle was not live.
    pub async fn release(&self, handle: SessionHandle) -> bool {
        let Some(entry) = self.sessions.write().await.remove(&handle) else {
            return false;
        };
        let mut session = entry.lock().await;
        session.state = SessionState::Expired;
        session.expiry.cancel();
        true
    }

    /// State of a handle; unknown handles read as expired.
    pub async fn state(&self, handle: SessionHandle) -> SessionState {
        match self.lookup(handle).await {
            Some(entry) => entry.lock().await.state,
            None => SessionState::Expired,
        }
    }

    /// Current page index of a live session.
    pub async fn current_index(&self, handle: SessionHandle) -> Option<usize> {
        let entry = self.lookup(handle).await?;
        let session = entry.lock().await;
        (session.state == SessionState::Active).then_some(session.index)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn lookup(&self, handle: SessionHandle) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(&handle).cloned()
    }
}

/// Render page `index` with edge-aware controls.
///
/// With `interactive == false` the controls are dropped entirely, which is
/// how an expired session is shown.
#[must_use]
pub fn render_page(handle: SessionHandle, pages: &[String], index: usize, interactive: bool) -> Reply {
    let text = pages.get(index).cloned().unwrap_or_default();
    if !interactive {
        return Reply::text(text);
    }

    let last = pages.len().saturating_sub(1);
    Reply {
        text,
        controls: vec![
            NavControl {
                handle,
                direction: NavDirection::Previous,
                enabled: index > 0,
            },
            NavControl {
                handle,
                direction: NavDirection::Next,
                enabled: index < last,
            },
        ],
        indicator: Some(format!("{}/{}", index + 1, pages.len())),
    }
}
