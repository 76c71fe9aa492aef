//! Boundary with the outside world: the guild actuator (membership lookup,
//! bans, kicks, role and channel edits, invites) and the alert notifier.
//! Production implementations live in `crate::discord::http`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serenity::all::Permissions;
use serenity::async_trait;

use super::Rule;
use super::policy::PunishmentKind;
use crate::permissions;

/// A role held by a member, as much of it as remediation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub id: u64,
    pub position: u16,
    pub permissions: Permissions,
}

/// What the bot itself is allowed to do in a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotAuthority {
    pub permissions: Permissions,
    /// Position of the bot's highest role; only roles strictly below it can be removed.
    pub top_role_position: u16,
}

impl BotAuthority {
    pub fn can(&self, required: Permissions) -> bool {
        permissions::has_authority(self.permissions, required)
    }

    pub fn outranks(&self, role: &RoleInfo) -> bool {
        role.position < self.top_role_position
    }
}

/// A text-capable channel with its current `@everyone` overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChannel {
    pub id: u64,
    pub everyone_allow: Permissions,
    pub everyone_deny: Permissions,
}

#[async_trait]
pub trait GuildApi: Send + Sync {
    /// Roles currently held by a member (membership resolution / whitelist check).
    async fn member_roles(&self, guild_id: u64, user_id: u64) -> Result<Vec<RoleInfo>>;
    async fn bot_authority(&self, guild_id: u64) -> Result<BotAuthority>;
    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<()>;
    async fn kick(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<()>;
    async fn remove_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: &str,
    ) -> Result<()>;
    async fn text_channels(&self, guild_id: u64) -> Result<Vec<TextChannel>>;
    async fn set_everyone_overwrite(
        &self,
        guild_id: u64,
        channel_id: u64,
        allow: Permissions,
        deny: Permissions,
    ) -> Result<()>;
    /// Codes of every active invite.
    async fn invites(&self, guild_id: u64) -> Result<Vec<String>>;
    async fn delete_invite(&self, code: &str, reason: &str) -> Result<()>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn alert(&self, channel_id: u64, alert: &AlertNotification) -> Result<()>;
    async fn audit(&self, channel_id: u64, record: &PunishmentRecord) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
}

/// Posted when emergency mode activates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertNotification {
    pub severity: Severity,
    pub guild_id: u64,
    pub actor_id: u64,
    pub rule: Rule,
    pub lockdown_performed: bool,
    pub channels_locked: usize,
    pub invites_revoked: usize,
    pub timestamp: DateTime<Utc>,
}

/// Audit trail of a single punishment, posted before the punishment runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PunishmentRecord {
    pub guild_id: u64,
    pub actor_id: u64,
    pub rule: Rule,
    pub count: usize,
    pub punishment: PunishmentKind,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum PunishAction {
    Ban,
    Kick,
    StripRoles { role_ids: Vec<u64> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PunishmentDirective {
    pub actor_id: u64,
    pub action: PunishAction,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LockdownDirective {
    pub channel_ids: Vec<u64>,
    pub invite_codes: Vec<String>,
}
