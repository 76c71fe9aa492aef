#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, bail};
use serenity::all::Permissions;
use serenity::async_trait;
use tigris_antinuke::antinuke::Antinuke;
use tigris_antinuke::antinuke::api::{
    AlertNotification, BotAuthority, GuildApi, Notifier, PunishmentRecord, RoleInfo, TextChannel,
};
use tigris_antinuke::antinuke::emergency::EmergencyResponse;
use tigris_antinuke::antinuke::policy::{PolicyConfig, PolicyHandle};

pub const GUILD: u64 = 100;
pub const LOG_CHANNEL: u64 = 555;

/// Fake guild: records every call, fails the ids put into the `fail_*` sets.
#[derive(Default)]
pub struct FakeGuild {
    pub bot_top_role: u16,
    pub bot_permissions: Option<Permissions>,
    pub roles: Mutex<HashMap<u64, Vec<RoleInfo>>>,
    pub channels: Vec<u64>,
    pub fail_channels: HashSet<u64>,
    pub fail_roles: HashSet<u64>,
    /// Each channel overwrite edit takes this long (slow API, rate limits).
    pub overwrite_delay: Option<Duration>,
    pub invites: Mutex<Vec<String>>,
    pub locked: Mutex<Vec<u64>>,
    pub revoked: Mutex<Vec<String>>,
    pub bans: Mutex<Vec<u64>>,
    pub kicks: Mutex<Vec<u64>>,
    pub removed_roles: Mutex<Vec<u64>>,
    pub alerts: Mutex<Vec<AlertNotification>>,
    pub audits: Mutex<Vec<PunishmentRecord>>,
    pub channel_listings: Mutex<usize>,
}

impl FakeGuild {
    pub fn new() -> Self {
        Self {
            bot_top_role: 50,
            ..Default::default()
        }
    }

    pub fn with_channels(mut self, ids: &[u64]) -> Self {
        self.channels = ids.to_vec();
        self
    }

    pub fn bans(&self) -> Vec<u64> {
        self.bans.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }

    pub fn lockdowns(&self) -> usize {
        *self.channel_listings.lock().unwrap()
    }
}

#[async_trait]
impl GuildApi for FakeGuild {
    async fn member_roles(&self, _guild_id: u64, user_id: u64) -> Result<Vec<RoleInfo>> {
        Ok(self
            .roles
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn bot_authority(&self, _guild_id: u64) -> Result<BotAuthority> {
        Ok(BotAuthority {
            permissions: self.bot_permissions.unwrap_or(Permissions::ADMINISTRATOR),
            top_role_position: self.bot_top_role,
        })
    }

    async fn ban(&self, _guild_id: u64, user_id: u64, _reason: &str) -> Result<()> {
        self.bans.lock().unwrap().push(user_id);
        Ok(())
    }

    async fn kick(&self, _guild_id: u64, user_id: u64, _reason: &str) -> Result<()> {
        self.kicks.lock().unwrap().push(user_id);
        Ok(())
    }

    async fn remove_role(
        &self,
        _guild_id: u64,
        _user_id: u64,
        role_id: u64,
        _reason: &str,
    ) -> Result<()> {
        if self.fail_roles.contains(&role_id) {
            bail!("50013 missing permissions");
        }
        self.removed_roles.lock().unwrap().push(role_id);
        Ok(())
    }

    async fn text_channels(&self, _guild_id: u64) -> Result<Vec<TextChannel>> {
        *self.channel_listings.lock().unwrap() += 1;
        Ok(self
            .channels
            .iter()
            .map(|id| TextChannel {
                id: *id,
                everyone_allow: Permissions::SEND_MESSAGES,
                everyone_deny: Permissions::empty(),
            })
            .collect())
    }

    async fn set_everyone_overwrite(
        &self,
        _guild_id: u64,
        channel_id: u64,
        _allow: Permissions,
        _deny: Permissions,
    ) -> Result<()> {
        if let Some(delay) = self.overwrite_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_channels.contains(&channel_id) {
            bail!("50001 missing access");
        }
        self.locked.lock().unwrap().push(channel_id);
        Ok(())
    }

    async fn invites(&self, _guild_id: u64) -> Result<Vec<String>> {
        Ok(self.invites.lock().unwrap().clone())
    }

    async fn delete_invite(&self, code: &str, _reason: &str) -> Result<()> {
        self.revoked.lock().unwrap().push(code.to_string());
        Ok(())
    }
}

#[async_trait]
impl Notifier for FakeGuild {
    async fn alert(&self, _channel_id: u64, alert: &AlertNotification) -> Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    async fn audit(&self, _channel_id: u64, record: &PunishmentRecord) -> Result<()> {
        self.audits.lock().unwrap().push(record.clone());
        Ok(())
    }
}

pub fn policy() -> PolicyConfig {
    PolicyConfig {
        log_destination_id: Some(LOG_CHANNEL),
        ..Default::default()
    }
}

pub fn antinuke(guild: Arc<FakeGuild>, config: PolicyConfig) -> Arc<Antinuke> {
    Antinuke::new(PolicyHandle::new(config).unwrap(), guild.clone(), guild)
}

/// Wait for the background lockdown + alert of the latest activation.
pub async fn settled(an: &Antinuke, guild_id: u64) -> EmergencyResponse {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(r) = an.emergency().last_response(guild_id) {
                return r;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("emergency response did not finish")
}
