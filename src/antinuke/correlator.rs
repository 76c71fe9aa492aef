use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use moka::sync::Cache;
use tokio::time::Instant;

use super::ActionKind;

/// Cross-kind view of one actor's recent activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correlation {
    /// Every tracked action within the correlation window.
    pub total: usize,
    /// Distinct kinds among them.
    pub unique: usize,
}

/// Rolling history of all tracked actions per actor, regardless of kind.
/// Catches diversified attacks that stay under every per-kind limit.
#[derive(Debug, Default)]
pub struct MultiActionCorrelator {
    histories: DashMap<(u64, u64), VecDeque<(ActionKind, Instant)>>,
}

impl MultiActionCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `(kind, now)`, prune to `horizon`, and report totals.
    pub fn record(
        &self,
        guild_id: u64,
        actor_id: u64,
        kind: ActionKind,
        now: Instant,
        horizon: Duration,
    ) -> Correlation {
        let mut history = self.histories.entry((guild_id, actor_id)).or_default();
        history.push_back((kind, now));
        history.retain(|(_, t)| now.saturating_duration_since(*t) <= horizon);
        summarize(&history)
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    pub fn len_for_guild(&self, guild_id: u64) -> usize {
        self.histories.iter().filter(|e| e.key().0 == guild_id).count()
    }

    pub fn prune(&self, now: Instant, horizon: Duration) {
        self.histories.retain(|_, h| {
            h.retain(|(_, t)| now.saturating_duration_since(*t) <= horizon);
            !h.is_empty()
        });
    }
}

fn summarize(history: &VecDeque<(ActionKind, Instant)>) -> Correlation {
    let unique = history.iter().map(|(k, _)| *k).collect::<HashSet<_>>().len();
    Correlation {
        total: history.len(),
        unique,
    }
}

/// One below-threshold action kept for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspiciousEntry {
    pub kind: ActionKind,
    pub at: Instant,
    pub window_count: usize,
}

type ActorLog = Arc<Mutex<VecDeque<SuspiciousEntry>>>;

/// Coarse bookkeeping of actions that did not trigger anything. Feeds status
/// reporting only; never gates a decision.
#[derive(Debug)]
pub struct SuspiciousActivityLog {
    entries: Cache<(u64, u64), ActorLog>,
}

const SUSPICIOUS_LOG_CAPACITY: u64 = 10_000;

impl Default for SuspiciousActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

impl SuspiciousActivityLog {
    /// Size-capped only; age is handled by the caller-supplied retention so a
    /// policy change applies on the next record or prune.
    pub fn new() -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(SUSPICIOUS_LOG_CAPACITY)
                .build(),
        }
    }

    pub fn record(
        &self,
        guild_id: u64,
        actor_id: u64,
        entry: SuspiciousEntry,
        retention: Duration,
    ) {
        let log = self
            .entries
            .get_with((guild_id, actor_id), || Arc::new(Mutex::new(VecDeque::new())));
        let mut log = log.lock().unwrap_or_else(PoisonError::into_inner);
        log.push_back(entry);
        let now = entry.at;
        log.retain(|e| now.saturating_duration_since(e.at) <= retention);
    }

    pub fn entries(&self, guild_id: u64, actor_id: u64) -> Vec<SuspiciousEntry> {
        self.entries
            .get(&(guild_id, actor_id))
            .map(|log| {
                log.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .iter()
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total entries currently held for a guild.
    pub fn len_for_guild(&self, guild_id: u64) -> usize {
        self.entries
            .iter()
            .filter(|(k, _)| k.0 == guild_id)
            .map(|(_, log)| log.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    /// Drop entries older than `retention` and forget actors left with none.
    pub fn prune(&self, now: Instant, retention: Duration) {
        let mut emptied = Vec::new();
        for (key, log) in self.entries.iter() {
            let mut log = log.lock().unwrap_or_else(PoisonError::into_inner);
            log.retain(|e| now.saturating_duration_since(e.at) <= retention);
            if log.is_empty() {
                emptied.push(*key);
            }
        }
        for key in emptied {
            self.entries.invalidate(&key);
        }
        self.entries.run_pending_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Duration = Duration::from_secs(60);

    #[test]
    fn counts_total_and_distinct_kinds() {
        let c = MultiActionCorrelator::new();
        let t0 = Instant::now();
        c.record(1, 5, ActionKind::Ban, t0, H);
        c.record(1, 5, ActionKind::Ban, t0, H);
        let corr = c.record(1, 5, ActionKind::ChannelDelete, t0, H);
        assert_eq!(corr, Correlation { total: 3, unique: 2 });
    }

    #[test]
    fn history_outlives_single_window_but_not_horizon() {
        let c = MultiActionCorrelator::new();
        let t0 = Instant::now();
        c.record(1, 5, ActionKind::RoleCreate, t0, H);
        let corr = c.record(1, 5, ActionKind::Kick, t0 + Duration::from_secs(45), H);
        assert_eq!(corr.total, 2);
        let corr = c.record(1, 5, ActionKind::Kick, t0 + Duration::from_secs(61), H);
        assert_eq!(corr, Correlation { total: 2, unique: 1 });
    }

    #[test]
    fn prune_drops_empty_histories() {
        let c = MultiActionCorrelator::new();
        let t0 = Instant::now();
        c.record(1, 5, ActionKind::Ban, t0, H);
        c.record(2, 5, ActionKind::Ban, t0 + H, H);
        c.prune(t0 + H + Duration::from_secs(1), H);
        assert_eq!(c.len(), 1);
        assert_eq!(c.len_for_guild(1), 0);
    }

    #[test]
    fn suspicious_log_keeps_retention_only() {
        let log = SuspiciousActivityLog::new();
        let t0 = Instant::now();
        let retention = Duration::from_secs(90);
        for secs in [0, 30, 100] {
            log.record(
                1,
                9,
                SuspiciousEntry {
                    kind: ActionKind::InviteCreate,
                    at: t0 + Duration::from_secs(secs),
                    window_count: 1,
                },
                retention,
            );
        }
        let kept = log.entries(1, 9);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].at, t0 + Duration::from_secs(30));
        assert_eq!(log.len_for_guild(1), 2);
        assert_eq!(log.len_for_guild(2), 0);
    }

    #[test]
    fn suspicious_prune_follows_current_retention() {
        let log = SuspiciousActivityLog::new();
        let t0 = Instant::now();
        let entry = |secs| SuspiciousEntry {
            kind: ActionKind::Kick,
            at: t0 + Duration::from_secs(secs),
            window_count: 1,
        };
        log.record(1, 9, entry(0), Duration::from_secs(90));
        log.record(1, 7, entry(200), Duration::from_secs(90));

        // Dłuższa retencja po zmianie okna: nic nie znika.
        log.prune(t0 + Duration::from_secs(250), Duration::from_secs(300));
        assert_eq!(log.len_for_guild(1), 2);

        log.prune(t0 + Duration::from_secs(250), Duration::from_secs(90));
        assert!(log.entries(1, 9).is_empty());
        assert_eq!(log.entries(1, 7).len(), 1);
        assert_eq!(log.len_for_guild(1), 1);
    }
}
