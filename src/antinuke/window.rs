use std::collections::VecDeque;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use super::ActionKind;

/// (guild_id, actor_id, kind)
type WindowKey = (u64, u64, ActionKind);

/// Per-actor, per-kind sliding windows of event timestamps.
///
/// Each key lives in its own `DashMap` shard entry, so concurrent events for
/// different actors only contend when they hash to the same shard, and the
/// per-key lock is held only for the in-memory append and prune.
#[derive(Debug, Default)]
pub struct ActorWindowStore {
    windows: DashMap<WindowKey, VecDeque<Instant>>,
}

impl ActorWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `now` and return how many events of this kind the actor has
    /// within the trailing `window`.
    pub fn record(
        &self,
        guild_id: u64,
        actor_id: u64,
        kind: ActionKind,
        now: Instant,
        window: Duration,
    ) -> usize {
        let mut entry = self
            .windows
            .entry((guild_id, actor_id, kind))
            .or_insert_with(|| VecDeque::with_capacity(8));
        entry.push_back(now);
        prune_older_than(&mut entry, window, now);
        entry.len()
    }

    /// Number of tracked (actor, kind) windows.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn len_for_guild(&self, guild_id: u64) -> usize {
        self.windows.iter().filter(|e| e.key().0 == guild_id).count()
    }

    /// Drop expired timestamps and forget windows that became empty.
    pub fn prune(&self, now: Instant, window: Duration) {
        self.windows.retain(|_, w| {
            prune_older_than(w, window, now);
            !w.is_empty()
        });
    }
}

/// Events may arrive out of order, so this filters the whole deque instead of
/// popping from the front; timestamps later than `now` are kept.
pub(crate) fn prune_older_than(q: &mut VecDeque<Instant>, window: Duration, now: Instant) {
    q.retain(|t| now.saturating_duration_since(*t) <= window);
}
