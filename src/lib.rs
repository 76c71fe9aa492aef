// src/lib.rs

pub mod antinuke;
pub mod config;
pub mod discord;
pub mod error;
pub mod logging;
pub mod permissions;

use anyhow::Result;
use std::sync::Arc;

use antinuke::Antinuke;
use antinuke::api::{GuildApi, Notifier};
use antinuke::policy::PolicyHandle;
use config::Settings;
use serenity::all::{GatewayIntents, Http};

/// Globalny kontekst aplikacji: konfiguracja i gotowy serwis antinuke.
#[derive(Clone)]
pub struct AppContext {
    pub settings: Settings,
    pub antinuke: Arc<Antinuke>,
}

impl AppContext {
    /// Bootstrap całej aplikacji:
    /// - logi
    /// - klient REST Discorda
    /// - polityka + serwis antinuke (z zadaniem sprzątającym)
    pub async fn bootstrap(settings: Settings) -> Result<Arc<Self>> {
        logging::init(&settings);

        let http = Arc::new(Http::new(&settings.discord.token));
        let api: Arc<dyn GuildApi> = Arc::new(discord::http::SerenityApi::new(http.clone()));
        let notifier: Arc<dyn Notifier> = Arc::new(discord::http::SerenityNotifier::new(http));

        Self::with_services(settings, api, notifier)
    }

    /// Kontekst z dowolnymi implementacjami API (testy, inne transporty).
    /// Wymaga runtime Tokio.
    pub fn with_services(
        settings: Settings,
        api: Arc<dyn GuildApi>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Arc<Self>> {
        let policy = PolicyHandle::new(settings.antinuke.clone())?;
        let antinuke = Antinuke::new(policy, api, notifier);
        tracing::info!(
            enabled = settings.antinuke.enabled,
            window_ms = settings.antinuke.time_window_ms,
            punishment = ?settings.antinuke.punishment,
            "antinuke ready"
        );
        Ok(Arc::new(Self { settings, antinuke }))
    }

    /// Środowisko: "production" | "development" | "custom".
    #[inline]
    pub fn env(&self) -> &str {
        &self.settings.env
    }
}

/// Intents wymagane przez monitorowane zdarzenia (kanały, role, bany,
/// członkowie, webhooki, zaproszenia, wiadomości).
pub fn default_gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MODERATION
        | GatewayIntents::GUILD_WEBHOOKS
        | GatewayIntents::GUILD_INVITES
        | GatewayIntents::GUILD_MESSAGES
}

/// Start klienta Discorda (Gateway).
pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    discord::run_bot(ctx).await
}
