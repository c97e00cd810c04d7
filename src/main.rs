use std::sync::Arc;

use taskpulse_lib::executor::Executor;
use taskpulse_lib::state::{load_config, AppState};
use taskpulse_lib::types::{ExecutionTrigger, JobId};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let once = std::env::args().skip(1).any(|arg| arg == "--once");

    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load TaskPulse config: {e}"))?;
    let state = Arc::new(
        AppState::new(config).map_err(|e| anyhow::anyhow!("Failed to start TaskPulse: {e}"))?,
    );

    if once {
        let outcome = Executor::new(state)
            .execute_job(JobId::DailySummary, ExecutionTrigger::Manual)
            .await?;
        log::info!("Single run finished: {:?}", outcome);
        return Ok(());
    }

    log::info!("TaskPulse started");
    taskpulse_lib::run(state).await?;
    Ok(())
}
