//! Scheduler for cron-based job execution
//!
//! Manages scheduled jobs with support for:
//! - Cron expression parsing
//! - Timezone-aware scheduling
//! - Sleep/wake detection via time-jump polling
//! - Missed job handling (runs if within grace period)

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::state::AppState;
use crate::types::{ExecutionTrigger, JobId, ScheduleEntry};

/// Grace period for missed jobs (2 hours)
const MISSED_JOB_GRACE_PERIOD_SECS: i64 = 7200;

/// Time jump threshold to detect sleep/wake (5 minutes)
const TIME_JUMP_THRESHOLD_SECS: i64 = 300;

/// Poll interval for scheduler loop (1 minute)
const POLL_INTERVAL_SECS: u64 = 60;

/// Window around a scheduled minute in which the job still counts as due
const DUE_WINDOW_SECS: i64 = 120;

/// Message sent to trigger job execution
#[derive(Debug, Clone)]
pub struct SchedulerMessage {
    pub job: JobId,
    pub trigger: ExecutionTrigger,
}

/// Scheduler for managing job execution times
pub struct Scheduler {
    state: Arc<AppState>,
    sender: mpsc::Sender<SchedulerMessage>,
}

impl Scheduler {
    pub fn new(state: Arc<AppState>, sender: mpsc::Sender<SchedulerMessage>) -> Self {
        Self { state, sender }
    }

    /// Start the scheduler loop
    ///
    /// This runs indefinitely, checking for due jobs every minute.
    /// It also handles sleep/wake detection.
    pub async fn run(&self) {
        let mut last_check = Utc::now();

        loop {
            tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;

            let now = Utc::now();

            let time_jump = (now - last_check).num_seconds();
            if time_jump > TIME_JUMP_THRESHOLD_SECS {
                log::info!(
                    "Detected system wake (time jumped {} seconds), checking for missed jobs",
                    time_jump
                );
                self.check_missed_jobs(now).await;
            }

            self.check_and_run_due_jobs(now).await;

            last_check = now;
        }
    }

    async fn check_and_run_due_jobs(&self, now: DateTime<Utc>) {
        for job in JobId::ALL {
            let entry = self.state.config.schedules.entry(job);
            if !entry.enabled {
                continue;
            }
            let last_run = self.state.get_last_scheduled_run(job);
            match due_slot(entry, last_run, now) {
                Ok(Some(slot)) => {
                    self.trigger_job(job, ExecutionTrigger::Scheduled, slot)
                        .await
                }
                Ok(None) => {}
                Err(e) => log::warn!("Scheduler: skipping {:?}: {}", job, e),
            }
        }
    }

    /// Check for jobs that were missed during sleep
    async fn check_missed_jobs(&self, now: DateTime<Utc>) {
        for job in JobId::ALL {
            let entry = self.state.config.schedules.entry(job);
            if !entry.enabled {
                continue;
            }
            let last_run = self.state.get_last_scheduled_run(job);
            if let Ok(Some(slot)) = missed_slot(entry, last_run, now) {
                log::info!("Found missed {:?} job (scheduled {}), running now", job, slot);
                self.trigger_job(job, ExecutionTrigger::Missed, slot).await;
            }
        }
    }

    async fn trigger_job(&self, job: JobId, trigger: ExecutionTrigger, slot: DateTime<Utc>) {
        self.state.set_last_scheduled_run(job, slot);
        if self
            .sender
            .send(SchedulerMessage { job, trigger })
            .await
            .is_err()
        {
            log::error!("Failed to send scheduler message for {:?}", job);
        }
    }
}

/// Parse a cron expression
pub fn parse_cron(expr: &str) -> Result<Schedule, AppError> {
    // The cron crate expects 6 fields (with seconds), but we use 5-field format
    let full_expr = format!("0 {}", expr);

    full_expr.parse::<Schedule>().map_err(|e| {
        AppError::ConfigurationError(format!("Invalid cron expression '{}': {}", expr, e))
    })
}

pub fn parse_timezone(name: &str) -> Result<Tz, AppError> {
    name.parse()
        .map_err(|_| AppError::ConfigurationError(format!("Invalid timezone: {}", name)))
}

/// The scheduled slot `now` falls on, unless that slot already ran.
pub fn due_slot(
    entry: &ScheduleEntry,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, AppError> {
    let schedule = parse_cron(&entry.cron)?;
    let tz = parse_timezone(&entry.timezone)?;

    let now_local = now.with_timezone(&tz);
    let window_start = now_local - chrono::Duration::seconds(DUE_WINDOW_SECS);

    let Some(next) = schedule.after(&window_start).next() else {
        return Ok(None);
    };
    let slot = next.with_timezone(&Utc);

    if (now - slot).num_seconds().abs() >= DUE_WINDOW_SECS {
        return Ok(None);
    }
    if let Some(last) = last_run {
        if (last - slot).num_seconds().abs() < 60 {
            return Ok(None);
        }
    }
    Ok(Some(slot))
}

/// Latest slot inside the grace period that has not run yet.
///
/// One catch-up run covers every slot missed during the same sleep.
pub fn missed_slot(
    entry: &ScheduleEntry,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, AppError> {
    let schedule = parse_cron(&entry.cron)?;
    let tz = parse_timezone(&entry.timezone)?;

    let grace_start = now.with_timezone(&tz) - chrono::Duration::seconds(MISSED_JOB_GRACE_PERIOD_SECS);

    let latest = schedule
        .after(&grace_start)
        .map(|t| t.with_timezone(&Utc))
        .take_while(|t| *t <= now)
        .filter(|t| last_run.map_or(true, |last| last < *t))
        .last();

    Ok(latest)
}

/// Get the next scheduled time for a job
pub fn get_next_run_time(entry: &ScheduleEntry) -> Result<DateTime<Utc>, AppError> {
    let schedule = parse_cron(&entry.cron)?;
    let tz = parse_timezone(&entry.timezone)?;

    let next = schedule.upcoming(tz).next().ok_or_else(|| {
        AppError::ConfigurationError("No upcoming scheduled time".to_string())
    })?;

    Ok(next.with_timezone(&Utc))
}
