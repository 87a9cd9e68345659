//! Background job scheduler.
//!
//! One job: a full bidirectional crawl of every category, Mondays at
//! 03:00, when the registry publishes its weekly update batch.

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::info;

use crate::api::AppState;

const WEEKLY_CRAWL_SCHEDULE: &str = "0 0 3 * * Mon";

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all scheduled
/// jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised
/// or started.
pub async fn build_scheduler(state: AppState) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(WEEKLY_CRAWL_SCHEDULE, move |_uuid, _lock| {
        let crawler = state.crawler.clone();
        Box::pin(async move {
            info!("scheduled weekly crawl starting");
            let stats = crawler.run_all_categories_both().await;
            info!(?stats, "scheduled weekly crawl finished");
        })
    })?;
    scheduler.add(job).await?;

    scheduler.start().await?;
    Ok(scheduler)
}
