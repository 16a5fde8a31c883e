use std::time::Duration;

use stagefs_core::{JobLink, StagingClient};
use tokio::time::Instant;

use crate::context::ActiveJobs;
use crate::error::EngineError;

const INITIAL_DELAY: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_secs(10);
const RESULTS_REL: &str = "results";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSettings {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            initial_delay: INITIAL_DELAY,
            interval: POLL_INTERVAL,
            timeout,
        }
    }
}

/// Waits for a server-side job to report SUCCESS.
///
/// The job is registered as active before the first poll and only removed
/// once it succeeds; on a poll error or a timeout it stays registered so
/// `stagefs jobs` can still show it.
pub struct JobPoller<'a> {
    client: &'a StagingClient,
    jobs: &'a ActiveJobs,
    settings: PollSettings,
}

impl<'a> JobPoller<'a> {
    pub fn new(client: &'a StagingClient, jobs: &'a ActiveJobs, settings: PollSettings) -> Self {
        Self {
            client,
            jobs,
            settings,
        }
    }

    /// Returns the job's "results" link, if it has one.
    pub async fn wait(&self, job_id: i64, message: &str) -> Result<Option<JobLink>, EngineError> {
        let deadline = Instant::now() + self.settings.timeout;
        self.jobs.register(job_id, message);

        // A job checked immediately after submission is almost never started.
        tokio::time::sleep(self.settings.initial_delay).await;

        while Instant::now() < deadline {
            let status = self.client.job_status(job_id).await?;
            if status.is_success() {
                if !message.is_empty() {
                    tracing::info!("{message}");
                }
                self.jobs.remove(job_id);
                return Ok(status.link(RESULTS_REL).cloned());
            }

            tracing::info!("Current job status: {}", status.status);
            tokio::time::sleep(self.settings.interval).await;
        }

        Err(EngineError::JobTimeout {
            job_id,
            timeout_secs: self.settings.timeout.as_secs(),
        })
    }
}
