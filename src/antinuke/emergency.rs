use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::time::Instant;

use super::Rule;
use super::api::{AlertNotification, Notifier, Severity};
use super::policy::{PolicyConfig, PolicyHandle};
use super::remediation::{LockdownReport, RemediationExecutor};

/// Per-guild emergency latch. Idle → Active → Idle, nothing else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmergencyState {
    pub active: bool,
    pub activated_at: Option<Instant>,
}

/// What the background response of one activation achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergencyResponse {
    pub actor_id: u64,
    pub rule: Rule,
    /// `None` when auto lockdown is switched off.
    pub lockdown: Option<LockdownReport>,
    pub alert_posted: bool,
}

#[derive(Debug, Default)]
struct Latch {
    state: EmergencyState,
    /// Bumped on every activation so a stale expiry timer cannot clear a newer one.
    generation: u64,
    response: Option<EmergencyResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Latch flipped; lockdown and alert run in the background.
    Activated,
    AlreadyActive,
    CoolingDown { remaining: Duration },
}

impl TriggerOutcome {
    pub fn activated(&self) -> bool {
        matches!(self, TriggerOutcome::Activated)
    }
}

pub struct EmergencyModeController {
    policy: PolicyHandle,
    executor: Arc<RemediationExecutor>,
    notifier: Arc<dyn Notifier>,
    latches: Arc<DashMap<u64, Latch>>,
}

impl EmergencyModeController {
    pub fn new(
        policy: PolicyHandle,
        executor: Arc<RemediationExecutor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            policy,
            executor,
            notifier,
            latches: Arc::new(DashMap::new()),
        }
    }

    pub fn state(&self, guild_id: u64) -> EmergencyState {
        self.latches
            .get(&guild_id)
            .map(|l| l.state)
            .unwrap_or_default()
    }

    pub fn is_active(&self, guild_id: u64) -> bool {
        self.state(guild_id).active
    }

    /// Outcome of the most recent activation's lockdown and alert, once finished.
    pub fn last_response(&self, guild_id: u64) -> Option<EmergencyResponse> {
        self.latches.get(&guild_id).and_then(|l| l.response.clone())
    }

    /// Activate emergency mode unless it is already active or cooling down.
    ///
    /// The Idle→Active check-and-set happens under the guild's shard lock, so
    /// concurrent triggers produce exactly one activation. Lockdown and alert
    /// are spawned and never delay the caller (punishment of the actor).
    pub async fn try_trigger(
        &self,
        guild_id: u64,
        actor_id: u64,
        rule: Rule,
        now: Instant,
    ) -> TriggerOutcome {
        let policy = self.policy.snapshot();
        let cooldown = policy.emergency_cooldown();

        let generation = {
            let mut latch = self.latches.entry(guild_id).or_default();
            if latch.state.active {
                tracing::info!(%guild_id, %actor_id, %rule, "emergency mode already active, trigger dropped");
                return TriggerOutcome::AlreadyActive;
            }
            if let Some(at) = latch.state.activated_at {
                let elapsed = now.saturating_duration_since(at);
                if elapsed < cooldown {
                    let remaining = cooldown - elapsed;
                    tracing::info!(%guild_id, %actor_id, %rule, ?remaining, "emergency mode cooling down, trigger dropped");
                    return TriggerOutcome::CoolingDown { remaining };
                }
            }
            latch.state = EmergencyState {
                active: true,
                activated_at: Some(now),
            };
            latch.generation += 1;
            latch.response = None;
            latch.generation
        };

        tracing::error!(%guild_id, %actor_id, %rule, "EMERGENCY MODE ACTIVATED");
        self.schedule_expiry(guild_id, generation, policy.emergency_duration());

        let executor = Arc::clone(&self.executor);
        let notifier = Arc::clone(&self.notifier);
        let latches = Arc::clone(&self.latches);
        tokio::spawn(async move {
            let response = respond(&policy, &executor, notifier.as_ref(), guild_id, actor_id, rule).await;
            if let Some(mut latch) = latches.get_mut(&guild_id) {
                if latch.generation == generation {
                    latch.response = Some(response);
                }
            }
        });

        TriggerOutcome::Activated
    }

    /// One deferred Active→Idle transition per activation. Not renewable:
    /// further triggers while active are dropped before reaching here.
    fn schedule_expiry(&self, guild_id: u64, generation: u64, after: Duration) {
        let latches = Arc::clone(&self.latches);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(mut latch) = latches.get_mut(&guild_id) {
                if latch.generation == generation && latch.state.active {
                    latch.state.active = false;
                    tracing::warn!(%guild_id, "emergency mode expired");
                }
            }
        });
    }
}

/// Lockdown (when enabled), then the critical alert carrying its result.
async fn respond(
    policy: &PolicyConfig,
    executor: &RemediationExecutor,
    notifier: &dyn Notifier,
    guild_id: u64,
    actor_id: u64,
    rule: Rule,
) -> EmergencyResponse {
    let lockdown = if policy.auto_lockdown_enabled {
        Some(executor.lockdown(guild_id).await)
    } else {
        None
    };

    let alert = AlertNotification {
        severity: Severity::Critical,
        guild_id,
        actor_id,
        rule,
        lockdown_performed: lockdown.is_some(),
        channels_locked: lockdown.as_ref().map_or(0, |l| l.channels_locked.len()),
        invites_revoked: lockdown.as_ref().map_or(0, |l| l.invites_revoked.len()),
        timestamp: Utc::now(),
    };
    let alert_posted = match policy.log_destination_id {
        Some(dest) => match notifier.alert(dest, &alert).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%guild_id, error = ?e, "emergency alert failed");
                false
            }
        },
        None => {
            tracing::warn!(
                %guild_id,
                alert = %serde_json::to_string(&alert).unwrap_or_default(),
                "no antinuke log destination, emergency alert not posted"
            );
            false
        }
    };

    EmergencyResponse {
        actor_id,
        rule,
        lockdown,
        alert_posted,
    }
}
