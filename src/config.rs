use std::path::Path;

use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::antinuke::policy::PolicyConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub env: String,
    pub app: App,
    pub discord: Discord,
    pub logging: Logging,
    #[serde(default)]
    pub antinuke: PolicyConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct App {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Discord {
    pub token: String,
    pub app_id: Option<String>,
    pub intents: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logging {
    pub json: Option<bool>,
    pub level: Option<String>,
}

// Domyślne wartości; polityka antinuke ma własne (PolicyConfig::default).
#[derive(Deserialize, Serialize)]
struct Defaults {
    env: String,
    app: App,
    discord: Discord,
    logging: Logging,
}

fn defaults(env: &str) -> Defaults {
    Defaults {
        env: env.to_string(),
        app: App {
            name: "Tigrissystem Antinuke".into(),
        },
        discord: Discord {
            token: "".into(),
            app_id: None,
            intents: vec![
                "GUILDS".into(),
                "GUILD_MEMBERS".into(),
                "GUILD_MODERATION".into(),
                "GUILD_WEBHOOKS".into(),
                "GUILD_INVITES".into(),
                "GUILD_MESSAGES".into(),
            ],
        },
        logging: Logging {
            json: Some(false),
            level: Some("info".into()),
        },
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        // Które środowisko?
        let env = std::env::var("TSS_ENV").unwrap_or_else(|_| "development".to_string());

        // Załaduj .env.<env> i .env (jeśli są)
        let _ = dotenvy::from_filename(format!(".env.{}", env));
        let _ = dotenvy::dotenv();

        // Warstwy: domyślne -> plik TOML -> zmienne środowiskowe TSS_*
        let figment = Figment::from(Serialized::defaults(defaults(&env)))
            .merge(Toml::file(format!("config/{}.toml", env)))
            // TSS_ANTINUKE__TIME_WINDOW_MS => antinuke.time_window_ms itd.
            .merge(Env::prefixed("TSS_").split("__"));

        Self::finish(figment, env)
    }

    /// Defaults plus one explicit TOML file, no environment layer.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let env = "custom".to_string();
        let figment = Figment::from(Serialized::defaults(defaults(&env)))
            .merge(Toml::file(path.as_ref()));
        Self::finish(figment, env)
    }

    fn finish(figment: Figment, env: String) -> Result<Self> {
        let mut s: Settings = figment.extract()?;
        if s.env.is_empty() {
            s.env = env;
        }
        s.antinuke.validate()?;
        Ok(s)
    }
}
