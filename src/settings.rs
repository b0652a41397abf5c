use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
    pub allowed_origin: String,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Database {
    pub backend: DatabaseBackend,
    #[serde(default)]
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Auth {
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Stripe {
    pub api_url: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub currency: String,
    pub webhook_tolerance_secs: i64,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub database: Database,
    pub auth: Auth,
    pub stripe: Stripe,
}

impl Settings {
    /// Reads `path` (optional) and `WAGER__SECTION__KEY` environment overrides.
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let config = Self::defaults()?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("WAGER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        config.try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000_i64)?
            .set_default("server.allowed_origin", "http://localhost:3000")?
            .set_default("database.backend", "postgres")?
            .set_default("database.max_connections", 5_i64)?
            .set_default("auth.token_ttl_secs", 24 * 60 * 60_i64)?
            .set_default("stripe.api_url", "https://api.stripe.com")?
            .set_default("stripe.currency", "usd")?
            .set_default("stripe.webhook_tolerance_secs", 300_i64)?
            .set_default("stripe.timeout_secs", 30_i64)
    }
}
