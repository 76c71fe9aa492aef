use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ActionKind;
use crate::error::ConfigError;

/// What happens to an actor once a verdict triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PunishmentKind {
    #[default]
    Ban,
    Kick,
    StripDangerousRoles,
}

/// Operator-supplied thresholds and toggles. Read as an immutable snapshot per
/// event; changed only through [`PolicyHandle`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub enabled: bool,
    /// Per-kind overrides. Kinds missing here use [`ActionKind::default_limit`].
    pub limits: HashMap<ActionKind, u32>,
    pub time_window_ms: u64,
    pub punishment: PunishmentKind,
    pub whitelisted_actor_ids: HashSet<u64>,
    pub whitelisted_role_ids: HashSet<u64>,
    pub log_destination_id: Option<u64>,
    pub auto_lockdown_enabled: bool,
    pub instant_ban_action_threshold: u32,
    pub instant_ban_unique_kind_threshold: u32,
    pub emergency_activation_threshold: u32,
    pub emergency_cooldown_ms: u64,
    pub emergency_duration_ms: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limits: ActionKind::ALL
                .iter()
                .map(|k| (*k, k.default_limit()))
                .collect(),
            time_window_ms: 30_000,
            punishment: PunishmentKind::Ban,
            whitelisted_actor_ids: HashSet::new(),
            whitelisted_role_ids: HashSet::new(),
            log_destination_id: None,
            auto_lockdown_enabled: true,
            instant_ban_action_threshold: 8,
            instant_ban_unique_kind_threshold: 4,
            emergency_activation_threshold: 15,
            emergency_cooldown_ms: 5 * 60 * 1000,
            emergency_duration_ms: 10 * 60 * 1000,
        }
    }
}

impl PolicyConfig {
    pub fn limit(&self, kind: ActionKind) -> u32 {
        self.limits
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_limit())
    }

    pub fn time_window(&self) -> Duration {
        Duration::from_millis(self.time_window_ms)
    }

    /// Retention of the cross-kind history.
    pub fn correlation_window(&self) -> Duration {
        self.time_window() * 2
    }

    /// Retention of the monitoring-only suspicious activity log.
    pub fn suspicious_retention(&self) -> Duration {
        self.time_window() * 3
    }

    pub fn emergency_cooldown(&self) -> Duration {
        Duration::from_millis(self.emergency_cooldown_ms)
    }

    pub fn emergency_duration(&self) -> Duration {
        Duration::from_millis(self.emergency_duration_ms)
    }

    pub fn is_whitelisted_actor(&self, actor_id: u64) -> bool {
        self.whitelisted_actor_ids.contains(&actor_id)
    }

    pub fn has_whitelisted_role(&self, role_ids: &[u64]) -> bool {
        role_ids
            .iter()
            .any(|r| self.whitelisted_role_ids.contains(r))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.time_window_ms == 0 {
            return Err(ConfigError::ZeroTimeWindow);
        }
        if self.instant_ban_action_threshold == 0 {
            return Err(ConfigError::ZeroThreshold("instant_ban_action_threshold"));
        }
        if self.instant_ban_unique_kind_threshold == 0 {
            return Err(ConfigError::ZeroThreshold(
                "instant_ban_unique_kind_threshold",
            ));
        }
        if self.emergency_activation_threshold == 0 {
            return Err(ConfigError::ZeroThreshold("emergency_activation_threshold"));
        }
        if self.emergency_duration_ms == 0 {
            return Err(ConfigError::ZeroEmergencyDuration);
        }
        Ok(())
    }
}

/// Shared, injectable policy. Readers take a cheap `Arc` snapshot and never
/// hold the lock across I/O; the administration layer mutates through the
/// narrow setters below.
#[derive(Debug, Clone)]
pub struct PolicyHandle {
    inner: Arc<RwLock<Arc<PolicyConfig>>>,
}

impl PolicyHandle {
    pub fn new(config: PolicyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        })
    }

    pub fn snapshot(&self) -> Arc<PolicyConfig> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `change` to a copy of the current policy; the copy replaces the
    /// current one only if it validates.
    pub fn update(&self, change: impl FnOnce(&mut PolicyConfig)) -> Result<(), ConfigError> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = PolicyConfig::clone(&guard);
        change(&mut next);
        next.validate()?;
        *guard = Arc::new(next);
        Ok(())
    }

    pub fn replace(&self, config: PolicyConfig) -> Result<(), ConfigError> {
        self.update(|p| *p = config)?;
        tracing::info!("antinuke policy replaced");
        Ok(())
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<(), ConfigError> {
        self.update(|p| p.enabled = enabled)?;
        tracing::info!(enabled, "antinuke policy: enabled changed");
        Ok(())
    }

    pub fn set_limit(&self, kind: ActionKind, limit: u32) -> Result<(), ConfigError> {
        self.update(|p| {
            p.limits.insert(kind, limit);
        })?;
        tracing::info!(%kind, limit, "antinuke policy: limit changed");
        Ok(())
    }

    pub fn set_time_window(&self, window: Duration) -> Result<(), ConfigError> {
        let ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self.update(|p| p.time_window_ms = ms)?;
        tracing::info!(time_window_ms = ms, "antinuke policy: time window changed");
        Ok(())
    }

    pub fn set_punishment(&self, punishment: PunishmentKind) -> Result<(), ConfigError> {
        self.update(|p| p.punishment = punishment)?;
        tracing::info!(?punishment, "antinuke policy: punishment changed");
        Ok(())
    }

    pub fn whitelist_actor(&self, actor_id: u64) -> Result<(), ConfigError> {
        self.update(|p| {
            p.whitelisted_actor_ids.insert(actor_id);
        })?;
        tracing::info!(actor_id, "antinuke policy: actor whitelisted");
        Ok(())
    }

    pub fn unwhitelist_actor(&self, actor_id: u64) -> Result<(), ConfigError> {
        self.update(|p| {
            p.whitelisted_actor_ids.remove(&actor_id);
        })?;
        tracing::info!(actor_id, "antinuke policy: actor removed from whitelist");
        Ok(())
    }

    pub fn whitelist_role(&self, role_id: u64) -> Result<(), ConfigError> {
        self.update(|p| {
            p.whitelisted_role_ids.insert(role_id);
        })?;
        tracing::info!(role_id, "antinuke policy: role whitelisted");
        Ok(())
    }

    pub fn unwhitelist_role(&self, role_id: u64) -> Result<(), ConfigError> {
        self.update(|p| {
            p.whitelisted_role_ids.remove(&role_id);
        })?;
        tracing::info!(role_id, "antinuke policy: role removed from whitelist");
        Ok(())
    }

    pub fn set_log_destination(&self, channel_id: Option<u64>) -> Result<(), ConfigError> {
        self.update(|p| p.log_destination_id = channel_id)?;
        tracing::info!(?channel_id, "antinuke policy: log destination changed");
        Ok(())
    }

    pub fn set_auto_lockdown(&self, enabled: bool) -> Result<(), ConfigError> {
        self.update(|p| p.auto_lockdown_enabled = enabled)?;
        tracing::info!(enabled, "antinuke policy: auto lockdown changed");
        Ok(())
    }
}
