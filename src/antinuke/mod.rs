use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

pub mod api;
pub mod correlator;
pub mod emergency;
pub mod engine;
pub mod policy;
pub mod remediation;
pub mod window;

#[cfg(test)]
pub(crate) mod mock;

use api::{GuildApi, Notifier};
use correlator::{MultiActionCorrelator, SuspiciousActivityLog};
use emergency::{EmergencyModeController, EmergencyResponse, EmergencyState};
use engine::{DetectionEngine, Verdict};
use policy::PolicyHandle;
use remediation::{PunishmentReport, RemediationExecutor};
use window::ActorWindowStore;

pub const SYSTEM_NAME: &str = "Tigris Antinuke System™";

/// Types of administrative actions monitored by the antinuke service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ChannelDelete,
    RoleDelete,
    Ban,
    Kick,
    ChannelCreate,
    RoleCreate,
    MemberUpdate,
    MessageDelete,
    WebhookCreate,
    InviteCreate,
    StickyNoteDelete,
}

impl ActionKind {
    pub const ALL: [ActionKind; 11] = [
        ActionKind::ChannelDelete,
        ActionKind::RoleDelete,
        ActionKind::Ban,
        ActionKind::Kick,
        ActionKind::ChannelCreate,
        ActionKind::RoleCreate,
        ActionKind::MemberUpdate,
        ActionKind::MessageDelete,
        ActionKind::WebhookCreate,
        ActionKind::InviteCreate,
        ActionKind::StickyNoteDelete,
    ];

    /// Events of this kind allowed per time window before the per-kind rule trips.
    pub fn default_limit(self) -> u32 {
        match self {
            ActionKind::ChannelDelete | ActionKind::RoleDelete | ActionKind::WebhookCreate => 2,
            ActionKind::Ban
            | ActionKind::Kick
            | ActionKind::ChannelCreate
            | ActionKind::RoleCreate
            | ActionKind::InviteCreate
            | ActionKind::StickyNoteDelete => 3,
            ActionKind::MemberUpdate => 5,
            ActionKind::MessageDelete => 10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::ChannelDelete => "channel_delete",
            ActionKind::RoleDelete => "role_delete",
            ActionKind::Ban => "ban",
            ActionKind::Kick => "kick",
            ActionKind::ChannelCreate => "channel_create",
            ActionKind::RoleCreate => "role_create",
            ActionKind::MemberUpdate => "member_update",
            ActionKind::MessageDelete => "message_delete",
            ActionKind::WebhookCreate => "webhook_create",
            ActionKind::InviteCreate => "invite_create",
            ActionKind::StickyNoteDelete => "sticky_note_delete",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rule produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Too many actions, or too many distinct kinds, across the correlation window.
    InstantSuspicious,
    /// Per-kind limit exceeded.
    Limit(ActionKind),
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::InstantSuspicious => f.write_str("instant_suspicious"),
            Rule::Limit(kind) => f.write_str(kind.as_str()),
        }
    }
}

/// One observed administrative action, already attributed to an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionEvent {
    pub guild_id: u64,
    pub actor_id: u64,
    pub kind: ActionKind,
    pub timestamp: Instant,
}

impl ActionEvent {
    pub fn new(guild_id: u64, actor_id: u64, kind: ActionKind, timestamp: Instant) -> Self {
        Self {
            guild_id,
            actor_id,
            kind,
            timestamp,
        }
    }

    pub fn now(guild_id: u64, actor_id: u64, kind: ActionKind) -> Self {
        Self::new(guild_id, actor_id, kind, Instant::now())
    }
}

/// What `handle` did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub verdict: Verdict,
    pub punishment: Option<PunishmentReport>,
}

/// Operator view of a guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub emergency: EmergencyState,
    /// Lockdown and alert result of the latest activation, once finished.
    pub last_response: Option<EmergencyResponse>,
    pub tracked_windows: usize,
    pub tracked_actors: usize,
    pub suspicious_entries: usize,
}

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Antinuke service: detection, emergency mode and remediation wired together.
pub struct Antinuke {
    policy: PolicyHandle,
    windows: Arc<ActorWindowStore>,
    correlator: Arc<MultiActionCorrelator>,
    suspicious: Arc<SuspiciousActivityLog>,
    emergency: Arc<EmergencyModeController>,
    executor: Arc<RemediationExecutor>,
    engine: DetectionEngine,
}

impl Antinuke {
    /// Must be called inside a Tokio runtime (spawns the prune task).
    pub fn new(
        policy: PolicyHandle,
        api: Arc<dyn GuildApi>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        let windows = Arc::new(ActorWindowStore::new());
        let correlator = Arc::new(MultiActionCorrelator::new());
        let suspicious = Arc::new(SuspiciousActivityLog::new());
        let executor = Arc::new(RemediationExecutor::new(
            policy.clone(),
            api.clone(),
            notifier.clone(),
        ));
        let emergency = Arc::new(EmergencyModeController::new(
            policy.clone(),
            executor.clone(),
            notifier,
        ));
        let engine = DetectionEngine::new(
            policy.clone(),
            api,
            windows.clone(),
            correlator.clone(),
            suspicious.clone(),
            emergency.clone(),
        );

        let this = Arc::new(Self {
            policy,
            windows,
            correlator,
            suspicious,
            emergency,
            executor,
            engine,
        });
        Self::spawn_prune_task(&this);
        this
    }

    fn spawn_prune_task(this: &Arc<Self>) {
        let weak = Arc::downgrade(this);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PRUNE_INTERVAL);
            loop {
                interval.tick().await;
                match weak.upgrade() {
                    Some(strong) => strong.prune_expired(Instant::now()),
                    None => break,
                }
            }
        });
    }

    pub fn prune_expired(&self, now: Instant) {
        let policy = self.policy.snapshot();
        self.windows.prune(now, policy.time_window());
        self.correlator.prune(now, policy.correlation_window());
        self.suspicious.prune(now, policy.suspicious_retention());
    }

    /// Detect, then punish when a rule trips. Never fails: actuator errors are
    /// logged and carried in the report.
    pub async fn handle(&self, event: ActionEvent) -> Outcome {
        let verdict = self.engine.process(&event).await;
        let punishment = match &verdict {
            Verdict::Triggered(t) => Some(
                self.executor
                    .punish(t.guild_id, t.actor_id, t.rule, t.count)
                    .await,
            ),
            _ => None,
        };
        Outcome {
            verdict,
            punishment,
        }
    }

    /// Detection only (includes the emergency-mode attempt), no punishment.
    pub async fn process(&self, event: ActionEvent) -> Verdict {
        self.engine.process(&event).await
    }

    pub fn status(&self, guild_id: u64) -> StatusSnapshot {
        StatusSnapshot {
            emergency: self.emergency.state(guild_id),
            last_response: self.emergency.last_response(guild_id),
            tracked_windows: self.windows.len_for_guild(guild_id),
            tracked_actors: self.correlator.len_for_guild(guild_id),
            suspicious_entries: self.suspicious.len_for_guild(guild_id),
        }
    }

    pub fn policy(&self) -> &PolicyHandle {
        &self.policy
    }

    pub fn emergency(&self) -> &EmergencyModeController {
        &self.emergency
    }

    pub fn executor(&self) -> &RemediationExecutor {
        &self.executor
    }

    pub fn windows(&self) -> &ActorWindowStore {
        &self.windows
    }

    pub fn correlator(&self) -> &MultiActionCorrelator {
        &self.correlator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::antinuke::mock::MockApi;
    use crate::antinuke::policy::{PolicyConfig, PunishmentKind};

    fn service(api: Arc<MockApi>, config: PolicyConfig) -> Arc<Antinuke> {
        Antinuke::new(PolicyHandle::new(config).unwrap(), api.clone(), api)
    }

    #[tokio::test]
    async fn disabled_policy_ignores_everything() {
        let api = Arc::new(MockApi::default());
        let an = service(
            api,
            PolicyConfig {
                enabled: false,
                ..Default::default()
            },
        );
        for _ in 0..20 {
            let out = an.handle(ActionEvent::now(1, 5, ActionKind::ChannelDelete)).await;
            assert_eq!(out.verdict, Verdict::Disabled);
        }
        assert!(an.windows().is_empty());
        assert!(an.correlator().is_empty());
    }

    #[tokio::test]
    async fn clear_events_land_in_suspicious_log() {
        let api = Arc::new(MockApi::default());
        let an = service(api, PolicyConfig::default());
        let out = an.handle(ActionEvent::now(1, 5, ActionKind::RoleCreate)).await;
        assert_eq!(out.verdict, Verdict::Clear);
        assert!(out.punishment.is_none());
        let status = an.status(1);
        assert_eq!(status.tracked_windows, 1);
        assert_eq!(status.tracked_actors, 1);
        assert_eq!(status.suspicious_entries, 1);
        assert!(!status.emergency.active);
    }

    #[tokio::test]
    async fn zero_limit_trips_on_first_event() {
        let api = Arc::new(MockApi::default());
        let mut config = PolicyConfig::default();
        config.limits.insert(ActionKind::WebhookCreate, 0);
        config.punishment = PunishmentKind::Kick;
        let an = service(api.clone(), config);
        let out = an.handle(ActionEvent::now(1, 5, ActionKind::WebhookCreate)).await;
        let t = out.verdict.trigger().unwrap();
        assert_eq!(t.rule, Rule::Limit(ActionKind::WebhookCreate));
        assert_eq!(t.count, 1);
        assert_eq!(api.kicks.lock().await.as_slice(), &[5]);
    }

    #[tokio::test]
    async fn whitelisted_role_resolution_failure_is_not_exempt() {
        let api = Arc::new(MockApi::default());
        *api.fail_member_lookup.lock().await = true;
        let mut config = PolicyConfig::default();
        config.whitelisted_role_ids.insert(99);
        let an = service(api, config);
        let out = an.handle(ActionEvent::now(1, 5, ActionKind::Ban)).await;
        assert_eq!(out.verdict, Verdict::Clear);
    }

    #[tokio::test]
    async fn prune_releases_idle_state() {
        let api = Arc::new(MockApi::default());
        let an = service(api, PolicyConfig::default());
        let t0 = Instant::now();
        an.handle(ActionEvent::new(1, 5, ActionKind::Ban, t0)).await;
        an.prune_expired(t0 + Duration::from_secs(120));
        assert!(an.windows().is_empty());
        assert!(an.correlator().is_empty());
    }

    #[tokio::test]
    async fn suspicious_retention_tracks_window_changes() {
        let api = Arc::new(MockApi::default());
        let an = service(api, PolicyConfig::default());
        let t0 = Instant::now();
        an.handle(ActionEvent::new(1, 5, ActionKind::RoleCreate, t0)).await;

        an.policy().set_time_window(Duration::from_secs(100)).unwrap();
        an.prune_expired(t0 + Duration::from_secs(200));
        assert_eq!(an.status(1).suspicious_entries, 1);

        an.policy().set_time_window(Duration::from_secs(30)).unwrap();
        an.prune_expired(t0 + Duration::from_secs(200));
        assert_eq!(an.status(1).suspicious_entries, 0);
    }

    #[test]
    fn rule_display_uses_kind_names() {
        assert_eq!(Rule::InstantSuspicious.to_string(), "instant_suspicious");
        assert_eq!(Rule::Limit(ActionKind::ChannelDelete).to_string(), "channel_delete");
    }
}
