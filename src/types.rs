use serde::{Deserialize, Serialize};

use crate::identity::SlackConfig;
use crate::monday::MondayConfig;

/// Configuration stored in ~/.taskpulse/config.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub monday: MondayConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub schedules: Schedules,
    /// IANA timezone that defines "today" for due-date bucketing.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

pub(crate) fn default_timezone() -> String {
    "America/Los_Angeles".to_string()
}

/// TTLs for the process-lifetime caches, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    #[serde(default = "default_board_items_ttl_secs")]
    pub board_items_ttl_secs: u64,
    #[serde(default = "default_preferences_ttl_secs")]
    pub preferences_ttl_secs: u64,
    #[serde(default = "default_task_ttl_secs")]
    pub task_ttl_secs: u64,
    /// Remember reverse identity misses for this long. Off when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_identity_ttl_secs: Option<u64>,
}

fn default_board_items_ttl_secs() -> u64 {
    300
}

fn default_preferences_ttl_secs() -> u64 {
    86_400
}

fn default_task_ttl_secs() -> u64 {
    600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            board_items_ttl_secs: default_board_items_ttl_secs(),
            preferences_ttl_secs: default_preferences_ttl_secs(),
            task_ttl_secs: default_task_ttl_secs(),
            negative_identity_ttl_secs: None,
        }
    }
}

/// Schedule configuration for background jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedules {
    #[serde(default = "ScheduleEntry::default_daily_summary")]
    pub daily_summary: ScheduleEntry,
    #[serde(default = "ScheduleEntry::default_cache_sweep")]
    pub cache_sweep: ScheduleEntry,
}

impl Default for Schedules {
    fn default() -> Self {
        Self {
            daily_summary: ScheduleEntry::default_daily_summary(),
            cache_sweep: ScheduleEntry::default_cache_sweep(),
        }
    }
}

impl Schedules {
    pub fn entry(&self, job: JobId) -> &ScheduleEntry {
        match job {
            JobId::DailySummary => &self.daily_summary,
            JobId::CacheSweep => &self.cache_sweep,
        }
    }
}

/// A single schedule entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub enabled: bool,
    pub cron: String,
    pub timezone: String,
}

impl ScheduleEntry {
    /// Default schedule for the daily summary: 9 AM every day
    pub fn default_daily_summary() -> Self {
        Self {
            enabled: true,
            cron: "0 9 * * *".to_string(),
            timezone: default_timezone(),
        }
    }

    /// Default schedule for the expired-entry sweep: every 30 minutes
    pub fn default_cache_sweep() -> Self {
        Self {
            enabled: true,
            cron: "*/30 * * * *".to_string(),
            timezone: default_timezone(),
        }
    }
}

impl Default for ScheduleEntry {
    fn default() -> Self {
        Self::default_daily_summary()
    }
}

/// Scheduled job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobId {
    DailySummary,
    CacheSweep,
}

impl JobId {
    pub const ALL: [JobId; 2] = [JobId::DailySummary, JobId::CacheSweep];
}

/// How a job execution was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionTrigger {
    Scheduled,
    Manual,
    Missed,
}

/// Per-user notification preferences, keyed by messaging user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    #[serde(default = "default_true")]
    pub notifications: bool,
    #[serde(default = "default_summary_time")]
    pub summary_time: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_true() -> bool {
    true
}

fn default_summary_time() -> String {
    "09:00".to_string()
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            notifications: true,
            summary_time: default_summary_time(),
            timezone: default_timezone(),
        }
    }
}
