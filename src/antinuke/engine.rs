use std::sync::Arc;

use super::api::GuildApi;
use super::correlator::{MultiActionCorrelator, SuspiciousActivityLog, SuspiciousEntry};
use super::emergency::{EmergencyModeController, TriggerOutcome};
use super::policy::{PolicyConfig, PolicyHandle};
use super::window::ActorWindowStore;
use super::{ActionEvent, Rule};
use crate::error::AntinukeError;

/// A triggered decision against one actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub guild_id: u64,
    pub actor_id: u64,
    pub rule: Rule,
    /// Cross-kind total for `InstantSuspicious`, per-kind window length otherwise.
    pub count: usize,
    /// Set when this event also attempted to activate emergency mode.
    pub escalation: Option<TriggerOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Policy switched off; the event was ignored entirely.
    Disabled,
    /// Whitelisted actor or role; no bookkeeping happened.
    Exempt,
    /// Recorded, nothing tripped.
    Clear,
    Triggered(Trigger),
}

impl Verdict {
    pub fn is_triggered(&self) -> bool {
        matches!(self, Verdict::Triggered(_))
    }

    pub fn trigger(&self) -> Option<&Trigger> {
        match self {
            Verdict::Triggered(t) => Some(t),
            _ => None,
        }
    }
}

/// Consumes one event at a time and decides whether its actor is nuking.
pub struct DetectionEngine {
    policy: PolicyHandle,
    api: Arc<dyn GuildApi>,
    windows: Arc<ActorWindowStore>,
    correlator: Arc<MultiActionCorrelator>,
    suspicious: Arc<SuspiciousActivityLog>,
    emergency: Arc<EmergencyModeController>,
}

impl DetectionEngine {
    pub fn new(
        policy: PolicyHandle,
        api: Arc<dyn GuildApi>,
        windows: Arc<ActorWindowStore>,
        correlator: Arc<MultiActionCorrelator>,
        suspicious: Arc<SuspiciousActivityLog>,
        emergency: Arc<EmergencyModeController>,
    ) -> Self {
        Self {
            policy,
            api,
            windows,
            correlator,
            suspicious,
            emergency,
        }
    }

    pub async fn process(&self, event: &ActionEvent) -> Verdict {
        let policy = self.policy.snapshot();
        if !policy.enabled {
            return Verdict::Disabled;
        }
        if self.is_exempt(&policy, event).await {
            return Verdict::Exempt;
        }

        let ActionEvent {
            guild_id,
            actor_id,
            kind,
            timestamp: now,
        } = *event;

        // Bookkeeping is synchronous; no shard lock survives past these two calls.
        let count = self
            .windows
            .record(guild_id, actor_id, kind, now, policy.time_window());
        let corr = self
            .correlator
            .record(guild_id, actor_id, kind, now, policy.correlation_window());
        tracing::debug!(%guild_id, %actor_id, %kind, count, total = corr.total, unique = corr.unique, "antinuke event recorded");

        // Checked before the per-kind limit so a diversified attacker cannot hide
        // below every single-kind threshold; wins ties.
        if corr.total >= policy.instant_ban_action_threshold as usize
            || corr.unique >= policy.instant_ban_unique_kind_threshold as usize
        {
            let rule = Rule::InstantSuspicious;
            tracing::warn!(%guild_id, %actor_id, %rule, count = corr.total, unique = corr.unique, "antinuke triggered");
            let escalation = self
                .emergency
                .try_trigger(guild_id, actor_id, rule, now)
                .await;
            return Verdict::Triggered(Trigger {
                guild_id,
                actor_id,
                rule,
                count: corr.total,
                escalation: Some(escalation),
            });
        }

        let limit = policy.limit(kind);
        if count > limit as usize {
            let rule = Rule::Limit(kind);
            tracing::warn!(%guild_id, %actor_id, %rule, count, limit, "antinuke triggered");
            let escalation = if corr.total >= policy.emergency_activation_threshold as usize {
                Some(
                    self.emergency
                        .try_trigger(guild_id, actor_id, rule, now)
                        .await,
                )
            } else {
                None
            };
            return Verdict::Triggered(Trigger {
                guild_id,
                actor_id,
                rule,
                count,
                escalation,
            });
        }

        self.suspicious.record(
            guild_id,
            actor_id,
            SuspiciousEntry {
                kind,
                at: now,
                window_count: count,
            },
            policy.suspicious_retention(),
        );
        Verdict::Clear
    }

    async fn is_exempt(&self, policy: &PolicyConfig, event: &ActionEvent) -> bool {
        if policy.is_whitelisted_actor(event.actor_id) {
            tracing::info!(guild_id = event.guild_id, actor_id = event.actor_id, kind = %event.kind, "antinuke: whitelisted actor");
            return true;
        }
        if policy.whitelisted_role_ids.is_empty() {
            return false;
        }
        match self.api.member_roles(event.guild_id, event.actor_id).await {
            Ok(roles) => {
                let ids: Vec<u64> = roles.iter().map(|r| r.id).collect();
                let exempt = policy.has_whitelisted_role(&ids);
                if exempt {
                    tracing::info!(guild_id = event.guild_id, actor_id = event.actor_id, kind = %event.kind, "antinuke: whitelisted role");
                }
                exempt
            }
            Err(e) => {
                // Unknown membership is treated as not exempt.
                let err = AntinukeError::resolution(event.kind, format!("member roles: {e:#}"));
                tracing::warn!(guild_id = event.guild_id, actor_id = event.actor_id, error = %err, "antinuke whitelist check failed");
                false
            }
        }
    }
}
