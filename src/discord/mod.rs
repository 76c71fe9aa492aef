// src/discord/mod.rs
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use futures_util::FutureExt;
use once_cell::sync::OnceCell;
use serenity::all::*;
use serenity::async_trait;

use crate::AppContext;
use crate::antinuke::{ActionEvent, ActionKind};

pub mod audit;
pub mod http;

pub struct Handler {
    pub app: Arc<AppContext>,
    /// Id bota (ustawiane w `ready`); jego własne akcje nie są liczone.
    bot_id: OnceCell<u64>,
}

impl Handler {
    pub fn new(app: Arc<AppContext>) -> Self {
        Self {
            app,
            bot_id: OnceCell::new(),
        }
    }

    /// Resolve the actor (audit log unless already known) and feed the engine.
    /// Runs detached so one slow or panicking event never blocks the gateway.
    fn dispatch(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        kind: ActionKind,
        target: Option<u64>,
        channel: Option<u64>,
        known_actor: Option<u64>,
    ) {
        let received_at = tokio::time::Instant::now();
        let app = self.app.clone();
        let http = ctx.http.clone();
        let bot_id = self.bot_id.get().copied();

        tokio::spawn(async move {
            let fut = async {
                let actor_id = match known_actor {
                    Some(a) => a,
                    None => match audit::resolve_actor(&http, guild_id, kind, target, channel).await {
                        Ok(Some(a)) => a,
                        Ok(None) => {
                            // Bez wpisu: zwykłe wyjście z serwera / autor sam usunął wiadomość.
                            if matches!(kind, ActionKind::Kick | ActionKind::MessageDelete) {
                                tracing::debug!(gid = %guild_id.get(), %kind, "no audit entry, not a moderation action");
                            } else {
                                tracing::warn!(gid = %guild_id.get(), %kind, "antinuke: no audit entry, event dropped");
                            }
                            return;
                        }
                        Err(e) => {
                            tracing::warn!(gid = %guild_id.get(), error = %e, "antinuke: event dropped");
                            return;
                        }
                    },
                };
                if Some(actor_id) == bot_id {
                    return;
                }
                let event = ActionEvent::new(guild_id.get(), actor_id, kind, received_at);
                app.antinuke.handle(event).await;
            };

            if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                tracing::error!(gid = %guild_id.get(), %kind, "antinuke handler panicked");
            }
        });
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!("Logged in as {}", ready.user.name);
        let _ = self.bot_id.set(ready.user.id.get());
    }

    async fn channel_create(&self, ctx: Context, channel: GuildChannel) {
        self.dispatch(&ctx, channel.guild_id, ActionKind::ChannelCreate, Some(channel.id.get()), None, None);
    }

    async fn channel_delete(
        &self,
        ctx: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        self.dispatch(&ctx, channel.guild_id, ActionKind::ChannelDelete, Some(channel.id.get()), None, None);
    }

    async fn guild_role_create(&self, ctx: Context, new: Role) {
        self.dispatch(&ctx, new.guild_id, ActionKind::RoleCreate, Some(new.id.get()), None, None);
    }

    async fn guild_role_delete(
        &self,
        ctx: Context,
        guild_id: GuildId,
        removed_role_id: RoleId,
        _removed_role_data_if_available: Option<Role>,
    ) {
        self.dispatch(&ctx, guild_id, ActionKind::RoleDelete, Some(removed_role_id.get()), None, None);
    }

    async fn guild_ban_addition(&self, ctx: Context, guild_id: GuildId, banned_user: User) {
        self.dispatch(&ctx, guild_id, ActionKind::Ban, Some(banned_user.id.get()), None, None);
    }

    async fn guild_member_removal(
        &self,
        ctx: Context,
        guild_id: GuildId,
        user: User,
        _member_data_if_available: Option<Member>,
    ) {
        self.dispatch(&ctx, guild_id, ActionKind::Kick, Some(user.id.get()), None, None);
    }

    async fn guild_member_update(
        &self,
        ctx: Context,
        _old_if_available: Option<Member>,
        _new: Option<Member>,
        event: GuildMemberUpdateEvent,
    ) {
        self.dispatch(&ctx, event.guild_id, ActionKind::MemberUpdate, Some(event.user.id.get()), None, None);
    }

    async fn message_delete(
        &self,
        ctx: Context,
        channel_id: ChannelId,
        _deleted_message_id: MessageId,
        guild_id: Option<GuildId>,
    ) {
        // Wpis audit logu wskazuje autora wiadomości, nie jej id: dopasowanie po kanale.
        if let Some(gid) = guild_id {
            self.dispatch(&ctx, gid, ActionKind::MessageDelete, None, Some(channel_id.get()), None);
        }
    }

    async fn webhook_update(&self, ctx: Context, guild_id: GuildId, belongs_to_channel_id: ChannelId) {
        let channel = Some(belongs_to_channel_id.get());
        self.dispatch(&ctx, guild_id, ActionKind::WebhookCreate, None, channel, None);
    }

    async fn invite_create(&self, ctx: Context, data: InviteCreateEvent) {
        let Some(gid) = data.guild_id else {
            return;
        };
        // Zaproszenie niesie autora wprost – audit log niepotrzebny.
        let inviter = data.inviter.as_ref().map(|u| u.id.get());
        self.dispatch(&ctx, gid, ActionKind::InviteCreate, None, None, inviter);
    }
}

fn intents_from_settings(names: &[String]) -> GatewayIntents {
    let mut i = GatewayIntents::empty();
    for n in names {
        match n.as_str() {
            "GUILDS" => i |= GatewayIntents::GUILDS,
            "GUILD_MEMBERS" => i |= GatewayIntents::GUILD_MEMBERS,
            "GUILD_MODERATION" => i |= GatewayIntents::GUILD_MODERATION,
            "GUILD_WEBHOOKS" => i |= GatewayIntents::GUILD_WEBHOOKS,
            "GUILD_INVITES" => i |= GatewayIntents::GUILD_INVITES,
            "GUILD_MESSAGES" => i |= GatewayIntents::GUILD_MESSAGES,
            other => tracing::warn!(intent = %other, "unknown gateway intent ignored"),
        }
    }
    i
}

pub async fn run_bot(ctx: Arc<AppContext>) -> Result<()> {
    let token = &ctx.settings.discord.token;
    if token.is_empty() {
        anyhow::bail!("Brak tokenu Discord (TSS_DISCORD__TOKEN). Uzupełnij w .env.");
    }

    let intents = intents_from_settings(&ctx.settings.discord.intents);
    let handler = Handler::new(ctx.clone());

    let mut client = serenity::Client::builder(token, intents)
        .event_handler(handler)
        .await?;

    tracing::info!("Discord client starting…");
    client.start().await?;
    Ok(())
}
