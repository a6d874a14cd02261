use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use newsletter_tracking::token;
use serde::Deserialize;
use std::env;
use time::Duration;
use url::Url;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Deserialize, Clone)]
pub struct TrackingConfig {
    /// HMAC key signing every tracking token
    pub secret: String,
    pub token_ttl_days: i64,
    pub dedup_window_secs: i64,
    /// Public origin used when composing pixel and click URLs
    pub base_url: String,
    /// Where the click endpoint sends anyone it cannot track
    pub fallback_url: String,
}

// keeps the secret out of `{:?}` output
impl std::fmt::Debug for TrackingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingConfig")
            .field("secret", &"***")
            .field("token_ttl_days", &self.token_ttl_days)
            .field("dedup_window_secs", &self.dedup_window_secs)
            .field("base_url", &self.base_url)
            .field("fallback_url", &self.fallback_url)
            .finish()
    }
}

impl TrackingConfig {
    pub fn core(&self) -> newsletter_tracking::TrackingConfig {
        newsletter_tracking::TrackingConfig {
            secret: self.secret.to_owned(),
            token_ttl: Duration::days(self.token_ttl_days.clamp(1, token::MAX_TTL_DAYS)),
            dedup_window: Duration::seconds(self.dedup_window_secs),
            base_url: self.base_url.to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
    #[serde(default = "default_prune_cron")]
    pub prune_cron: String,
    #[serde(default = "default_snapshot_cron")]
    pub snapshot_cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            prune_cron: default_prune_cron(),
            snapshot_cron: default_snapshot_cron(),
        }
    }
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_prune_cron() -> String {
    "0 0 3 * * *".to_string()
}

fn default_snapshot_cron() -> String {
    "0 30 3 * * *".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file and environment variables
    ///
    /// Priority (highest to lowest):
    /// 1. Legacy variables (DATABASE_URL, TRACKING_SECRET)
    /// 2. Environment variables (NEWSLETTER__TRACKING__SECRET, etc.)
    /// 3. Config file specified by path
    /// 4. Hardcoded defaults
    pub fn load(config_path: Option<String>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        builder = builder
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("database.url", "sqlite:newsletter.db")?
            .set_default("database.max_connections", 5)?
            .set_default("tracking.token_ttl_days", 14)?
            .set_default("tracking.dedup_window_secs", 10)?
            .set_default("tracking.base_url", "http://localhost:3000")?
            .set_default("tracking.fallback_url", "http://localhost:3000/")?;

        let config_file_path = config_path
            .or_else(|| env::var("CONFIG_PATH").ok())
            .unwrap_or_else(|| "config/default.toml".to_string());

        if std::path::Path::new(&config_file_path).exists() {
            builder = builder.add_source(File::with_name(&config_file_path));
        }

        builder = builder.add_source(
            Environment::with_prefix("NEWSLETTER")
                .separator("__")
                .try_parsing(true),
        );

        if let Ok(database_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", database_url)?;
        }
        if let Ok(secret) = env::var("TRACKING_SECRET") {
            builder = builder.set_override("tracking.secret", secret)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tracking.secret.len() < 32 {
            return Err("Tracking secret must be at least 32 characters long".to_string());
        }
        if self.tracking.token_ttl_days < 1 {
            return Err("Tracking token_ttl_days must be at least 1".to_string());
        }
        if self.tracking.token_ttl_days > token::MAX_TTL_DAYS {
            return Err(format!(
                "Tracking token_ttl_days must be at most {}",
                token::MAX_TTL_DAYS
            ));
        }
        if self.tracking.dedup_window_secs < 0 {
            return Err("Tracking dedup_window_secs must not be negative".to_string());
        }
        for (name, value) in [
            ("base_url", &self.tracking.base_url),
            ("fallback_url", &self.tracking.fallback_url),
        ] {
            let url = Url::parse(value).map_err(|e| format!("Tracking {name} is invalid: {e}"))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(format!("Tracking {name} must use http or https"));
            }
        }
        if self.database.max_connections < 1 {
            return Err("Database max_connections must be at least 1".to_string());
        }
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }
        Ok(())
    }
}
