use std::sync::Arc;

use chrono::Utc;
use serenity::all::Permissions;

use super::api::{
    GuildApi, LockdownDirective, Notifier, PunishAction, PunishmentDirective, PunishmentRecord,
};
use super::policy::{PolicyHandle, PunishmentKind};
use super::{Rule, SYSTEM_NAME};
use crate::error::AntinukeError;
use crate::permissions::{self, LOCKDOWN_DENY};

/// Result of one `punish` call. Failures are per sub-step; a failed role
/// removal does not stop the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PunishmentReport {
    pub directive: Option<PunishmentDirective>,
    pub audit_posted: bool,
    /// Actuator calls that went through (ban/kick count as one).
    pub applied: usize,
    pub failures: Vec<AntinukeError>,
}

impl PunishmentReport {
    pub fn succeeded(&self) -> bool {
        self.directive.is_some() && self.failures.is_empty()
    }
}

/// Result of one lockdown pass. A partial lockdown is a valid outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockdownReport {
    pub directive: LockdownDirective,
    pub channels_locked: Vec<u64>,
    pub invites_revoked: Vec<String>,
    pub failures: Vec<AntinukeError>,
}

/// Performs punishments and lockdowns through the [`GuildApi`].
pub struct RemediationExecutor {
    policy: PolicyHandle,
    api: Arc<dyn GuildApi>,
    notifier: Arc<dyn Notifier>,
}

impl RemediationExecutor {
    pub fn new(policy: PolicyHandle, api: Arc<dyn GuildApi>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            policy,
            api,
            notifier,
        }
    }

    /// Post the audit record (best-effort) and apply the configured punishment.
    pub async fn punish(
        &self,
        guild_id: u64,
        actor_id: u64,
        rule: Rule,
        count: usize,
    ) -> PunishmentReport {
        let policy = self.policy.snapshot();
        let reason = punishment_reason(rule, count);
        let mut report = PunishmentReport {
            directive: None,
            audit_posted: false,
            applied: 0,
            failures: Vec::new(),
        };

        if let Some(dest) = policy.log_destination_id {
            let record = PunishmentRecord {
                guild_id,
                actor_id,
                rule,
                count,
                punishment: policy.punishment,
                reason: reason.clone(),
                timestamp: Utc::now(),
            };
            match self.notifier.audit(dest, &record).await {
                Ok(()) => report.audit_posted = true,
                Err(e) => {
                    let err = AntinukeError::actuator("post audit record", dest, &e);
                    tracing::warn!(%guild_id, %actor_id, error = %err, "antinuke audit log failed");
                    report.failures.push(err);
                }
            }
        }

        let (op, required) = match policy.punishment {
            PunishmentKind::Ban => ("ban", Permissions::BAN_MEMBERS),
            PunishmentKind::Kick => ("kick", Permissions::KICK_MEMBERS),
            PunishmentKind::StripDangerousRoles => ("strip roles", Permissions::MANAGE_ROLES),
        };

        let authority = match self.api.bot_authority(guild_id).await {
            Ok(a) => a,
            Err(e) => {
                let err = AntinukeError::actuator("resolve bot authority", guild_id, &e);
                tracing::warn!(%guild_id, %actor_id, error = %err, "antinuke punishment skipped");
                report.failures.push(err);
                return report;
            }
        };
        if !authority.can(required) {
            let err = AntinukeError::MissingAuthority {
                op,
                missing: required,
            };
            tracing::warn!(%guild_id, %actor_id, error = %err, "antinuke punishment skipped");
            report.failures.push(err);
            return report;
        }

        let action = match policy.punishment {
            PunishmentKind::Ban => PunishAction::Ban,
            PunishmentKind::Kick => PunishAction::Kick,
            PunishmentKind::StripDangerousRoles => {
                let roles = match self.api.member_roles(guild_id, actor_id).await {
                    Ok(r) => r,
                    Err(e) => {
                        let err = AntinukeError::actuator("resolve member roles", actor_id, &e);
                        tracing::warn!(%guild_id, %actor_id, error = %err, "antinuke strip skipped");
                        report.failures.push(err);
                        return report;
                    }
                };
                let role_ids = roles
                    .iter()
                    .filter(|r| permissions::is_dangerous(r.permissions) && authority.outranks(r))
                    .map(|r| r.id)
                    .collect();
                PunishAction::StripRoles { role_ids }
            }
        };

        let directive = PunishmentDirective {
            actor_id,
            action,
            reason,
        };
        self.execute(guild_id, &directive, &mut report).await;
        report.directive = Some(directive);
        report
    }

    async fn execute(
        &self,
        guild_id: u64,
        directive: &PunishmentDirective,
        report: &mut PunishmentReport,
    ) {
        let actor_id = directive.actor_id;
        match &directive.action {
            PunishAction::Ban => {
                match self.api.ban(guild_id, actor_id, &directive.reason).await {
                    Ok(()) => {
                        report.applied += 1;
                        tracing::warn!(%guild_id, %actor_id, "antinuke: actor banned");
                    }
                    Err(e) => {
                        let err = AntinukeError::actuator("ban", actor_id, &e);
                        tracing::warn!(%guild_id, %actor_id, error = %err, "antinuke ban failed");
                        report.failures.push(err);
                    }
                }
            }
            PunishAction::Kick => {
                match self.api.kick(guild_id, actor_id, &directive.reason).await {
                    Ok(()) => {
                        report.applied += 1;
                        tracing::warn!(%guild_id, %actor_id, "antinuke: actor kicked");
                    }
                    Err(e) => {
                        let err = AntinukeError::actuator("kick", actor_id, &e);
                        tracing::warn!(%guild_id, %actor_id, error = %err, "antinuke kick failed");
                        report.failures.push(err);
                    }
                }
            }
            PunishAction::StripRoles { role_ids } => {
                for &role_id in role_ids {
                    match self
                        .api
                        .remove_role(guild_id, actor_id, role_id, &directive.reason)
                        .await
                    {
                        Ok(()) => report.applied += 1,
                        Err(e) => {
                            let err = AntinukeError::actuator("remove role", role_id, &e);
                            tracing::warn!(%guild_id, %actor_id, %role_id, error = %err, "antinuke role removal failed");
                            report.failures.push(err);
                        }
                    }
                }
                tracing::warn!(
                    %guild_id,
                    %actor_id,
                    removed = report.applied,
                    total = role_ids.len(),
                    "antinuke: dangerous roles stripped"
                );
            }
        }
    }

    /// Deny send/react/thread-create to `@everyone` on every text channel and
    /// revoke every invite. Each channel and invite is best-effort.
    pub async fn lockdown(&self, guild_id: u64) -> LockdownReport {
        let mut report = LockdownReport::default();
        let reason = format!("[{SYSTEM_NAME}] Emergency lockdown");

        let channels = match self.api.text_channels(guild_id).await {
            Ok(c) => c,
            Err(e) => {
                let err = AntinukeError::actuator("list channels", guild_id, &e);
                tracing::warn!(%guild_id, error = %err, "lockdown: channel listing failed");
                report.failures.push(err);
                Vec::new()
            }
        };
        let invites = match self.api.invites(guild_id).await {
            Ok(i) => i,
            Err(e) => {
                let err = AntinukeError::actuator("list invites", guild_id, &e);
                tracing::warn!(%guild_id, error = %err, "lockdown: invite listing failed");
                report.failures.push(err);
                Vec::new()
            }
        };
        report.directive = LockdownDirective {
            channel_ids: channels.iter().map(|c| c.id).collect(),
            invite_codes: invites.clone(),
        };

        for ch in &channels {
            let (allow, deny) = permissions::lockdown_overwrite(ch.everyone_allow, ch.everyone_deny);
            match self
                .api
                .set_everyone_overwrite(guild_id, ch.id, allow, deny)
                .await
            {
                Ok(()) => report.channels_locked.push(ch.id),
                Err(e) => {
                    let err = AntinukeError::actuator("lock channel", ch.id, &e);
                    tracing::warn!(%guild_id, channel_id = ch.id, error = %err, "lockdown: channel skipped");
                    report.failures.push(err);
                }
            }
        }

        for code in &invites {
            match self.api.delete_invite(code, &reason).await {
                Ok(()) => report.invites_revoked.push(code.clone()),
                Err(e) => {
                    let err = AntinukeError::actuator("delete invite", code, &e);
                    tracing::warn!(%guild_id, invite = %code, error = %err, "lockdown: invite skipped");
                    report.failures.push(err);
                }
            }
        }

        if report.channels_locked.is_empty() && !channels.is_empty() {
            tracing::error!(%guild_id, channels = channels.len(), "lockdown locked no channels");
        } else {
            tracing::warn!(
                %guild_id,
                locked = report.channels_locked.len(),
                channels = channels.len(),
                revoked = report.invites_revoked.len(),
                invites = invites.len(),
                denied = ?LOCKDOWN_DENY,
                "lockdown finished"
            );
        }
        report
    }
}

pub fn punishment_reason(rule: Rule, count: usize) -> String {
    format!("[{SYSTEM_NAME}] Anti-nuke: rule {rule} tripped ({count} actions)")
}
