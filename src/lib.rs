pub mod aggregator;
pub mod cache;
pub mod classifier;
pub mod error;
pub mod executor;
pub mod identity;
pub mod monday;
pub mod scheduler;
pub mod state;
pub mod summary;
pub mod types;

use std::sync::Arc;

use tokio::sync::mpsc;

use error::AppError;
use executor::Executor;
use scheduler::Scheduler;
use state::AppState;

/// Channel buffer size for scheduler messages
const SCHEDULER_CHANNEL_SIZE: usize = 32;

/// Run the scheduler and executor until the process is stopped.
pub async fn run(state: Arc<AppState>) -> Result<(), AppError> {
    let (scheduler_tx, scheduler_rx) = mpsc::channel(SCHEDULER_CHANNEL_SIZE);

    for job in types::JobId::ALL {
        let entry = state.config.schedules.entry(job);
        if !entry.enabled {
            log::info!("Scheduler: {:?} disabled", job);
            continue;
        }
        match scheduler::get_next_run_time(entry) {
            Ok(next) => log::info!("Scheduler: next {:?} run at {}", job, next),
            Err(e) => log::warn!("Scheduler: {:?} has no upcoming run: {}", job, e),
        }
    }

    let scheduler_state = state.clone();
    let scheduler = tokio::spawn(async move {
        Scheduler::new(scheduler_state, scheduler_tx).run().await;
    });

    let executor = Executor::new(state);
    executor.run(scheduler_rx).await;

    // The executor only returns once every sender is gone.
    scheduler.abort();
    Err(AppError::ConfigurationError(
        "Scheduler channel closed unexpectedly".to_string(),
    ))
}
