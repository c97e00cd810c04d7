use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Timelike, Utc};

use crate::aggregator::Aggregator;
use crate::cache::TaskCache;
use crate::error::AppError;
use crate::identity::{DirectoryService, IdentityResolver, MessageSink, SlackClient};
use crate::monday::{MondayClient, WorkItemService};
use crate::scheduler::{parse_cron, parse_timezone};
use crate::summary::DailySummary;
use crate::types::{Config, JobId};

/// Environment variable that points at an alternate config file
pub const CONFIG_PATH_ENV: &str = "TASKPULSE_CONFIG";

/// Process-wide services, built once at startup and shared by the scheduler
/// and executor.
pub struct AppState {
    pub config: Config,
    pub cache: Arc<TaskCache>,
    pub resolver: Arc<IdentityResolver>,
    pub aggregator: Arc<Aggregator>,
    pub summary: DailySummary,
    pub last_scheduled_run: Mutex<HashMap<JobId, DateTime<Utc>>>,
}

impl AppState {
    /// Build the live monday.com and Slack clients from `config`.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let monday = Arc::new(MondayClient::new(&config.monday)?);
        let slack = Arc::new(
            SlackClient::new(&config.slack)
                .map_err(|e| AppError::ConfigurationError(e.to_string()))?,
        );
        Ok(Self::with_services(config, monday, slack.clone(), slack))
    }

    pub fn with_services(
        config: Config,
        work_items: Arc<dyn WorkItemService>,
        directory: Arc<dyn DirectoryService>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        let cache = Arc::new(TaskCache::new(&config.cache));

        let mut resolver = IdentityResolver::new(directory);
        if let Some(secs) = config.cache.negative_identity_ttl_secs {
            resolver = resolver.with_negative_ttl(Duration::from_secs(secs));
        }
        let resolver = Arc::new(resolver);

        let aggregator = Arc::new(Aggregator::new(work_items, cache.clone(), &config));
        let summary = DailySummary::new(aggregator.clone(), resolver.clone(), sink, cache.clone());

        Self {
            config,
            cache,
            resolver,
            aggregator,
            summary,
            last_scheduled_run: Mutex::new(HashMap::new()),
        }
    }

    /// Record which scheduled slot a job last ran for
    pub fn set_last_scheduled_run(&self, job: JobId, time: DateTime<Utc>) {
        if let Ok(mut guard) = self.last_scheduled_run.lock() {
            guard.insert(job, time);
        }
    }

    /// Get the slot a job last ran for
    pub fn get_last_scheduled_run(&self, job: JobId) -> Option<DateTime<Utc>> {
        self.last_scheduled_run
            .lock()
            .ok()
            .and_then(|guard| guard.get(&job).cloned())
    }
}

/// Get the config file path (~/.taskpulse/config.json unless overridden)
pub fn config_path() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let home = dirs::home_dir()
        .ok_or_else(|| AppError::ConfigurationError("Could not find home directory".into()))?;
    Ok(home.join(".taskpulse").join("config.json"))
}

/// Load configuration, apply environment overrides, validate.
pub fn load_config() -> Result<Config, AppError> {
    load_config_from(&config_path()?, |key| std::env::var(key).ok())
}

/// A missing file yields the defaults; a malformed one is an error.
pub fn load_config_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config, AppError> {
    let mut config = if path.exists() {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            AppError::ConfigurationError(format!("Failed to parse {}: {}", path.display(), e))
        })?
    } else {
        log::info!("No config file at {}, using defaults", path.display());
        Config::default()
    };

    apply_env_overrides(&mut config, env)?;
    validate_config(&config)?;
    Ok(config)
}

/// `MONDAY_API_KEY`, `SLACK_BOT_TOKEN` and `DAILY_SUMMARY_TIME`
/// take precedence over the file.
pub fn apply_env_overrides(
    config: &mut Config,
    env: impl Fn(&str) -> Option<String>,
) -> Result<(), AppError> {
    let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    if let Some(key) = env("MONDAY_API_KEY") {
        config.monday.api_key = Some(key);
    }
    if let Some(token) = env("SLACK_BOT_TOKEN") {
        config.slack.bot_token = Some(token);
    }
    if let Some(time) = env("DAILY_SUMMARY_TIME") {
        config.schedules.daily_summary.cron = summary_time_to_cron(&time)?;
    }
    Ok(())
}

/// `HH:MM` -> a daily five-field cron expression.
pub fn summary_time_to_cron(time: &str) -> Result<String, AppError> {
    let parsed = NaiveTime::parse_from_str(time.trim(), "%H:%M").map_err(|_| {
        AppError::ConfigurationError(format!("Expected HH:MM for summary time, got '{}'", time))
    })?;
    Ok(format!("{} {} * * *", parsed.minute(), parsed.hour()))
}

pub fn validate_config(config: &Config) -> Result<(), AppError> {
    parse_timezone(&config.timezone)?;
    for job in JobId::ALL {
        let entry = config.schedules.entry(job);
        parse_cron(&entry.cron)?;
        parse_timezone(&entry.timezone)?;
    }
    Ok(())
}
