use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;
use url::Url;
use validator::Validate;

use crate::ocr::Backoff;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub scraper: ScraperConfig,
    pub ocr: OcrConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub timezone: String,
    pub daily_cron: String,
    pub weekly_cron: String,
    pub run_on_startup: bool,
    /// Upper bound in seconds for a single resolver run.
    pub resolve_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub server_url: String,
    pub engine: String,
    pub language: String,
    /// Total number of requests per recognition, the first one included.
    pub max_attempts: u32,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProviderConfig {
    #[validate(length(min = 1, message = "provider id must not be empty"))]
    pub id: String,
    #[validate(length(min = 1, message = "provider label must not be empty"))]
    pub label: String,
    #[validate(length(min = 1, message = "provider location must not be empty"))]
    pub location: String,
    #[serde(default = "default_active")]
    pub active: bool,
    pub resolver: Option<ResolverConfig>,
}

/// How the offers of a provider are obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolverConfig {
    Html {
        url: String,
        item_selector: String,
        name_selector: String,
        price_selector: String,
        day_selector: String,
    },
    OcrImage {
        page_url: String,
        image_selector: String,
    },
}

fn default_active() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "lunchbox=info".to_string(),
            directory: None,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9001,
        }
    }
}

impl SchedulerConfig {
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Message(format!("Unknown scheduler timezone '{}'", self.timezone)))
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout)
    }

    /// How long shutdown waits for running cycles: one resolver timeout plus time to store.
    pub fn shutdown_grace(&self) -> Duration {
        self.resolve_timeout().saturating_add(Duration::from_secs(30))
    }
}

impl OcrConfig {
    pub fn min_backoff(&self) -> Duration {
        Duration::from_millis(self.min_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Longest a single recognition may take: every attempt hitting its request timeout plus
    /// every backoff delay in between.
    pub fn worst_case(&self) -> Duration {
        let requests = Duration::from_secs(self.request_timeout).saturating_mul(self.max_attempts);
        let delays: Duration = Backoff::new(self.min_backoff(), self.max_backoff(), self.max_attempts).sum();
        requests.saturating_add(delays)
    }
}

impl ResolverConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolverConfig::Html { .. } => "html",
            ResolverConfig::OcrImage { .. } => "ocr_image",
        }
    }

    fn urls(&self) -> Vec<&str> {
        match self {
            ResolverConfig::Html { url, .. } => vec![url],
            ResolverConfig::OcrImage { page_url, .. } => vec![page_url],
        }
    }
}

impl AppConfig {
    /// Layers `config/default`, `config/{RUN_MODE}`, `config/local`, an optional explicit
    /// file and `LUNCHBOX__*` environment variables, in that order.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path));
        }

        let s = builder
            .add_source(Environment::with_prefix("LUNCHBOX").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let s = Config::builder().add_source(File::from(path)).build()?;
        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Database
        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Message("Database min_connections cannot exceed max_connections".into()));
        }

        // Scheduler
        if !is_valid_cron(&self.scheduler.daily_cron) {
            return Err(ConfigError::Message("Invalid cron expression in scheduler.daily_cron".into()));
        }

        if !is_valid_cron(&self.scheduler.weekly_cron) {
            return Err(ConfigError::Message("Invalid cron expression in scheduler.weekly_cron".into()));
        }

        self.scheduler.tz()?;

        if self.scheduler.resolve_timeout == 0 {
            return Err(ConfigError::Message("Scheduler resolve_timeout must be greater than 0".into()));
        }

        // Scraper
        if self.scraper.request_timeout == 0 {
            return Err(ConfigError::Message("Scraper request_timeout must be greater than 0".into()));
        }

        // OCR
        if Url::parse(&self.ocr.server_url).is_err() {
            return Err(ConfigError::Message("Invalid OCR server_url format".into()));
        }

        if self.ocr.max_attempts == 0 {
            return Err(ConfigError::Message("OCR max_attempts must be greater than 0".into()));
        }

        if self.ocr.min_backoff_ms > self.ocr.max_backoff_ms {
            return Err(ConfigError::Message("OCR min_backoff_ms cannot exceed max_backoff_ms".into()));
        }

        // an image menu fetches its page, then runs OCR, within one resolver timeout
        let image_menu = Duration::from_secs(self.scraper.request_timeout).saturating_add(self.ocr.worst_case());
        if image_menu > self.scheduler.resolve_timeout() {
            return Err(ConfigError::Message(format!(
                "OCR retries may take up to {}s, exceeding scheduler resolve_timeout of {}s",
                image_menu.as_secs(),
                self.scheduler.resolve_timeout
            )));
        }

        // Metrics
        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        // Providers
        let mut seen = HashSet::new();
        for provider in &self.providers {
            provider
                .validate()
                .map_err(|e| ConfigError::Message(format!("Provider '{}': {}", provider.id, e)))?;

            if !seen.insert(provider.id.as_str()) {
                return Err(ConfigError::Message(format!("Duplicate provider id '{}'", provider.id)));
            }

            if let Some(resolver) = &provider.resolver {
                for url in resolver.urls() {
                    if Url::parse(url).is_err() {
                        return Err(ConfigError::Message(format!(
                            "Provider '{}': invalid URL '{}'",
                            provider.id, url
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Accepts the six or seven field format (seconds first) understood by the job scheduler.
pub fn is_valid_cron(cron_expr: &str) -> bool {
    let parts: Vec<&str> = cron_expr.split_whitespace().collect();
    if parts.len() != 6 && parts.len() != 7 {
        return false;
    }

    // numbers, ranges, lists, steps, wildcards and day/month names
    parts.iter().all(|part| {
        part.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '-' | ',' | '/' | '?'))
    })
}
