//! `GuildApi` / `Notifier` over the Discord REST API.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use serenity::all::{
    ChannelId, ChannelType, Colour, CreateEmbed, CreateEmbedFooter, CreateMessage, GuildId, Http,
    PermissionOverwrite, PermissionOverwriteType, Permissions, Role, RoleId, UserId,
};
use serenity::async_trait;

use crate::antinuke::SYSTEM_NAME;
use crate::antinuke::api::{
    AlertNotification, BotAuthority, GuildApi, Notifier, PunishmentRecord, RoleInfo, Severity,
    TextChannel,
};

pub struct SerenityApi {
    http: Arc<Http>,
}

impl SerenityApi {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn role_info(role: &Role) -> RoleInfo {
    RoleInfo {
        id: role.id.get(),
        position: role.position,
        permissions: role.permissions,
    }
}

#[async_trait]
impl GuildApi for SerenityApi {
    async fn member_roles(&self, guild_id: u64, user_id: u64) -> Result<Vec<RoleInfo>> {
        let gid = GuildId::new(guild_id);
        let member = gid.member(&self.http, UserId::new(user_id)).await?;
        let roles = gid.roles(&self.http).await?;
        Ok(member
            .roles
            .iter()
            .filter_map(|rid| roles.get(rid))
            .map(role_info)
            .collect())
    }

    async fn bot_authority(&self, guild_id: u64) -> Result<BotAuthority> {
        let gid = GuildId::new(guild_id);
        let me = self.http.get_current_user().await?;
        let member = gid.member(&self.http, me.id).await?;
        let roles = gid.roles(&self.http).await?;

        // @everyone ma id równe id gildii
        let mut permissions = roles
            .get(&RoleId::new(guild_id))
            .map(|r| r.permissions)
            .unwrap_or(Permissions::empty());
        let mut top_role_position = 0;
        for role in member.roles.iter().filter_map(|rid| roles.get(rid)) {
            permissions |= role.permissions;
            top_role_position = top_role_position.max(role.position);
        }
        Ok(BotAuthority {
            permissions,
            top_role_position,
        })
    }

    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<()> {
        GuildId::new(guild_id)
            .ban_with_reason(&self.http, UserId::new(user_id), 0, reason)
            .await?;
        Ok(())
    }

    async fn kick(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<()> {
        GuildId::new(guild_id)
            .kick_with_reason(&self.http, UserId::new(user_id), reason)
            .await?;
        Ok(())
    }

    async fn remove_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: &str,
    ) -> Result<()> {
        self.http
            .remove_member_role(
                GuildId::new(guild_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                Some(reason),
            )
            .await?;
        Ok(())
    }

    async fn text_channels(&self, guild_id: u64) -> Result<Vec<TextChannel>> {
        let everyone = RoleId::new(guild_id);
        let channels = GuildId::new(guild_id).channels(&self.http).await?;
        Ok(channels
            .into_values()
            .filter(|c| {
                matches!(
                    c.kind,
                    ChannelType::Text | ChannelType::News | ChannelType::Forum
                )
            })
            .map(|c| {
                let current = c
                    .permission_overwrites
                    .iter()
                    .find(|o| matches!(o.kind, PermissionOverwriteType::Role(id) if id == everyone));
                TextChannel {
                    id: c.id.get(),
                    everyone_allow: current.map(|o| o.allow).unwrap_or(Permissions::empty()),
                    everyone_deny: current.map(|o| o.deny).unwrap_or(Permissions::empty()),
                }
            })
            .collect())
    }

    async fn set_everyone_overwrite(
        &self,
        guild_id: u64,
        channel_id: u64,
        allow: Permissions,
        deny: Permissions,
    ) -> Result<()> {
        let overwrite = PermissionOverwrite {
            allow,
            deny,
            kind: PermissionOverwriteType::Role(RoleId::new(guild_id)),
        };
        ChannelId::new(channel_id)
            .create_permission(&self.http, overwrite)
            .await?;
        Ok(())
    }

    async fn invites(&self, guild_id: u64) -> Result<Vec<String>> {
        let invites = GuildId::new(guild_id).invites(&self.http).await?;
        Ok(invites.into_iter().map(|i| i.code).collect())
    }

    async fn delete_invite(&self, code: &str, reason: &str) -> Result<()> {
        self.http.delete_invite(code, Some(reason)).await?;
        Ok(())
    }
}

/// Posts alerts and audit records as embeds to the configured log channel.
pub struct SerenityNotifier {
    http: Arc<Http>,
}

impl SerenityNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    async fn post(&self, channel_id: u64, embed: CreateEmbed) -> Result<()> {
        ChannelId::new(channel_id)
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await
            .with_context(|| format!("send to channel {channel_id}"))?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for SerenityNotifier {
    async fn alert(&self, channel_id: u64, alert: &AlertNotification) -> Result<()> {
        self.post(channel_id, alert_embed(alert)).await
    }

    async fn audit(&self, channel_id: u64, record: &PunishmentRecord) -> Result<()> {
        self.post(channel_id, audit_embed(record)).await
    }
}

fn alert_embed(alert: &AlertNotification) -> CreateEmbed {
    let when = alert.timestamp.timestamp();
    let colour = match alert.severity {
        Severity::Critical => Colour::new(0xE74C3C), // czerwony – krytyczne
    };
    let lockdown = if alert.lockdown_performed {
        format!(
            "Tak – zablokowano kanałów: {}, usunięto zaproszeń: {}",
            alert.channels_locked, alert.invites_revoked
        )
    } else {
        "Nie".to_string()
    };
    CreateEmbed::new()
        .title("🚨 Antinuke – tryb awaryjny")
        .colour(colour)
        .description(format!("**Kiedy:** <t:{when}:F> • <t:{when}:R>"))
        .field("Poziom", format!("{:?}", alert.severity).to_uppercase(), true)
        .field(
            "Sprawca",
            format!("<@{}> (`{}`)", alert.actor_id, alert.actor_id),
            true,
        )
        .field("Reguła", format!("`{}`", alert.rule), true)
        .field("Lockdown", lockdown, false)
        .footer(CreateEmbedFooter::new(SYSTEM_NAME))
}

fn audit_embed(record: &PunishmentRecord) -> CreateEmbed {
    let when = record.timestamp.timestamp();
    CreateEmbed::new()
        .title("🛡️ Antinuke – kara")
        .colour(Colour::new(0xE67E22))
        .description(format!("**Kiedy:** <t:{when}:F> • <t:{when}:R>"))
        .field(
            "Sprawca",
            format!("<@{}> (`{}`)", record.actor_id, record.actor_id),
            true,
        )
        .field("Reguła", format!("`{}`", record.rule), true)
        .field("Akcji w oknie", record.count.to_string(), true)
        .field("Kara", format!("{:?}", record.punishment), true)
        .field("Powód", format!("```{}```", record.reason), false)
        .footer(CreateEmbedFooter::new(SYSTEM_NAME))
}
