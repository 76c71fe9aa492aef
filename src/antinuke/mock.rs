use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail};
use serenity::all::Permissions;
use serenity::async_trait;
use tokio::sync::Mutex;

use super::api::{
    AlertNotification, BotAuthority, GuildApi, Notifier, PunishmentRecord, RoleInfo, TextChannel,
};

pub(crate) struct MockApi {
    pub bot_permissions: Mutex<Permissions>,
    pub bot_top_role: u16,
    pub member_roles: Mutex<HashMap<u64, Vec<RoleInfo>>>,
    pub fail_member_lookup: Mutex<bool>,
    pub fail_roles: Mutex<HashSet<u64>>,
    pub channels: Mutex<Vec<TextChannel>>,
    pub fail_channels: Mutex<HashSet<u64>>,
    pub overwrites: Mutex<HashMap<u64, (Permissions, Permissions)>>,
    pub invites: Mutex<Vec<String>>,
    pub bans: Mutex<Vec<(u64, String)>>,
    pub kicks: Mutex<Vec<u64>>,
    pub removed_roles: Mutex<Vec<u64>>,
    pub alerts: Mutex<Vec<AlertNotification>>,
    pub audits: Mutex<Vec<PunishmentRecord>>,
    pub fail_audit: Mutex<bool>,
    channel_listings: AtomicUsize,
}

impl Default for MockApi {
    fn default() -> Self {
        Self {
            bot_permissions: Mutex::new(Permissions::ADMINISTRATOR),
            bot_top_role: 10,
            member_roles: Mutex::new(HashMap::new()),
            fail_member_lookup: Mutex::new(false),
            fail_roles: Mutex::new(HashSet::new()),
            channels: Mutex::new(Vec::new()),
            fail_channels: Mutex::new(HashSet::new()),
            overwrites: Mutex::new(HashMap::new()),
            invites: Mutex::new(Vec::new()),
            bans: Mutex::new(Vec::new()),
            kicks: Mutex::new(Vec::new()),
            removed_roles: Mutex::new(Vec::new()),
            alerts: Mutex::new(Vec::new()),
            audits: Mutex::new(Vec::new()),
            fail_audit: Mutex::new(false),
            channel_listings: AtomicUsize::new(0),
        }
    }
}

impl MockApi {
    pub fn with_channels(ids: &[u64]) -> Self {
        let mut api = Self::default();
        *api.channels.get_mut() = ids
            .iter()
            .map(|id| TextChannel {
                id: *id,
                everyone_allow: Permissions::empty(),
                everyone_deny: Permissions::empty(),
            })
            .collect();
        api
    }

    /// Lockdown passes started (each lists channels exactly once).
    pub fn lockdowns(&self) -> usize {
        self.channel_listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GuildApi for MockApi {
    async fn member_roles(&self, _guild_id: u64, user_id: u64) -> Result<Vec<RoleInfo>> {
        if *self.fail_member_lookup.lock().await {
            bail!("member lookup unavailable");
        }
        Ok(self
            .member_roles
            .lock()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn bot_authority(&self, _guild_id: u64) -> Result<BotAuthority> {
        Ok(BotAuthority {
            permissions: *self.bot_permissions.lock().await,
            top_role_position: self.bot_top_role,
        })
    }

    async fn ban(&self, _guild_id: u64, user_id: u64, reason: &str) -> Result<()> {
        self.bans.lock().await.push((user_id, reason.to_string()));
        Ok(())
    }

    async fn kick(&self, _guild_id: u64, user_id: u64, _reason: &str) -> Result<()> {
        self.kicks.lock().await.push(user_id);
        Ok(())
    }

    async fn remove_role(
        &self,
        _guild_id: u64,
        _user_id: u64,
        role_id: u64,
        _reason: &str,
    ) -> Result<()> {
        if self.fail_roles.lock().await.contains(&role_id) {
            bail!("missing access");
        }
        self.removed_roles.lock().await.push(role_id);
        Ok(())
    }

    async fn text_channels(&self, _guild_id: u64) -> Result<Vec<TextChannel>> {
        self.channel_listings.fetch_add(1, Ordering::SeqCst);
        Ok(self.channels.lock().await.clone())
    }

    async fn set_everyone_overwrite(
        &self,
        _guild_id: u64,
        channel_id: u64,
        allow: Permissions,
        deny: Permissions,
    ) -> Result<()> {
        if self.fail_channels.lock().await.contains(&channel_id) {
            bail!("missing permissions");
        }
        self.overwrites
            .lock()
            .await
            .insert(channel_id, (allow, deny));
        Ok(())
    }

    async fn invites(&self, _guild_id: u64) -> Result<Vec<String>> {
        Ok(self.invites.lock().await.clone())
    }

    async fn delete_invite(&self, code: &str, _reason: &str) -> Result<()> {
        self.invites.lock().await.retain(|c| c != code);
        Ok(())
    }
}

#[async_trait]
impl Notifier for MockApi {
    async fn alert(&self, _channel_id: u64, alert: &AlertNotification) -> Result<()> {
        self.alerts.lock().await.push(alert.clone());
        Ok(())
    }

    async fn audit(&self, _channel_id: u64, record: &PunishmentRecord) -> Result<()> {
        if *self.fail_audit.lock().await {
            bail!("log channel gone");
        }
        self.audits.lock().await.push(record.clone());
        Ok(())
    }
}
