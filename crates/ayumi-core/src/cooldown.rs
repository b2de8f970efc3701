//! Per-user cooldown enforcement
//!
//! Tracks the last admitted use of an action by each user and answers
//! admission queries. Admission and the timestamp update happen in a single
//! atomic compute step per `(user, action)` key, so concurrent calls by the
//! same user observe a consistent last-use value while different users never
//! contend.

use crate::event::UserId;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of an admission query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Whether the action may proceed.
    pub admitted: bool,
    /// Time until the next admission, rounded up to whole seconds.
    /// Zero when admitted.
    pub remaining: Duration,
}

impl Admission {
    const fn granted() -> Self {
        Self {
            admitted: true,
            remaining: Duration::ZERO,
        }
    }

    const fn denied(remaining: Duration) -> Self {
        Self {
            admitted: false,
            remaining,
        }
    }
}

/// Cooldown tracker keyed by `(user, action)`.
///
/// Entries live in a moka cache whose TTL equals the longest configured
/// window: an evicted entry would have admitted the next call anyway.
#[derive(Clone)]
pub struct CooldownTracker {
    entries: Cache<(UserId, String), Instant>,
    windows: Arc<HashMap<String, Duration>>,
    denied_count: Arc<AtomicU64>,
}

impl CooldownTracker {
    /// Creates a tracker with one fixed window per action.
    ///
    /// # Examples
    ///
    /// ```
    /// use ayumi_core::cooldown::CooldownTracker;
    /// use std::time::Duration;
    ///
    /// let tracker = CooldownTracker::new(
    ///     [("support", Duration::from_secs(15 * 60))],
    ///     10_000,
    /// );
    /// assert_eq!(tracker.window("support"), Some(Duration::from_secs(900)));
    /// ```
    #[must_use]
    pub fn new<I, S>(windows: I, max_capacity: u64) -> Self
    where
        I: IntoIterator<Item = (S, Duration)>,
        S: Into<String>,
    {
        let windows: HashMap<String, Duration> = windows
            .into_iter()
            .map(|(action, window)| (action.into(), window))
            .collect();

        let mut builder = Cache::builder().max_capacity(max_capacity);
        if let Some(longest) = windows.values().copied().max().filter(|w| !w.is_zero()) {
            builder = builder.time_to_live(longest);
        }

        Self {
            entries: builder.build(),
            windows: Arc::new(windows),
            denied_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Configured window of an action, if any.
    #[must_use]
    pub fn window(&self, action: &str) -> Option<Duration> {
        self.windows.get(action).copied()
    }

    /// Try to admit `actor` for `action` at instant `now`.
    ///
    /// Admitted when no previous use is recorded or the window has fully
    /// elapsed; the recorded use then becomes `now`. A denial leaves the
    /// record untouched. Actions without a window are always admitted.
    pub async fn try_acquire(&self, actor: UserId, action: &str, now: Instant) -> Admission {
        let Some(window) = self.window(action).filter(|w| !w.is_zero()) else {
            return Admission::granted();
        };

        let result = self
            .entries
            .entry((actor, action.to_string()))
            .and_compute_with(|current| {
                let op = match current {
                    Some(entry) if now.saturating_duration_since(*entry.value()) < window => {
                        Op::Nop
                    }
                    _ => Op::Put(now),
                };
                std::future::ready(op)
            })
            .await;

        match result {
            CompResult::Unchanged(entry) => {
                let elapsed = now.saturating_duration_since(*entry.value());
                let remaining = round_up_secs(window.saturating_sub(elapsed));
                let count = self.denied_count.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    user_id = %actor,
                    action,
                    remaining_secs = remaining.as_secs(),
                    denied_total = count,
                    tracked = self.entry_count(),
                    "Cooldown denied"
                );
                Admission::denied(remaining)
            }
            _ => Admission::granted(),
        }
    }

    /// Number of tracked entries.
    ///
    /// Useful for monitoring and health checks.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Total number of denied admissions since start.
    #[must_use]
    pub fn denied_count(&self) -> u64 {
        self.denied_count.load(Ordering::Relaxed)
    }
}

fn round_up_secs(duration: Duration) -> Duration {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    Duration::from_secs(secs)
}

/// Format a countdown as `mm:ss`, or `h:mm:ss` past one hour.
#[must_use]
pub fn format_remaining(remaining: Duration) -> String {
    let total = remaining.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}
