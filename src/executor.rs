//! Job execution engine
//!
//! - DailySummary: aggregate every active board and DM each owner a digest
//! - CacheSweep: drop expired cache entries nobody has touched

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::error::{AppError, UserFacingError};
use crate::scheduler::SchedulerMessage;
use crate::state::AppState;
use crate::summary::SummaryReport;
use crate::types::{ExecutionTrigger, JobId};

/// What a finished job produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Summary(SummaryReport),
    Swept(usize),
}

/// Executor manages job execution
pub struct Executor {
    state: Arc<AppState>,
}

impl Executor {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Start the executor loop
    ///
    /// Listens for job execution requests from the scheduler.
    pub async fn run(&self, mut receiver: mpsc::Receiver<SchedulerMessage>) {
        while let Some(msg) = receiver.recv().await {
            log::info!("Executing job {:?} (trigger: {:?})", msg.job, msg.trigger);

            if let Err(e) = self.execute_job(msg.job, msg.trigger).await {
                let facing = UserFacingError::from(&e);
                log::error!(
                    "Job {:?} failed ({:?}): {}. {}",
                    msg.job,
                    facing.error_type,
                    facing.message,
                    facing.recovery_suggestion
                );
            }
        }
    }

    pub async fn execute_job(
        &self,
        job: JobId,
        trigger: ExecutionTrigger,
    ) -> Result<JobOutcome, AppError> {
        let started = Instant::now();

        let outcome = match job {
            JobId::DailySummary => JobOutcome::Summary(self.state.summary.run().await?),
            JobId::CacheSweep => JobOutcome::Swept(self.state.cache.purge_expired()),
        };

        log::info!(
            "Job {:?} ({:?}) finished in {}ms: {:?}",
            job,
            trigger,
            started.elapsed().as_millis(),
            outcome
        );
        Ok(outcome)
    }
}
