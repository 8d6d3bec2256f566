use std::future::Future;
use tracing::debug;
use crate::error::{BqPipeError, Result};
use crate::warehouse::{JobMetadata, JobOutcome, Submission};

/// Waits on one asynchronous job and verifies it actually succeeded.
///
/// A job only counts as successful when the submission was accepted without an
/// embedded error result, the job completed rather than failed, and the
/// terminal metadata carries no embedded error result either. There is no
/// retry and no timeout: one submission, one wait.
pub struct JobRunner;

impl JobRunner {
    pub async fn run<F>(submission: F) -> Result<JobMetadata>
    where
        F: Future<Output = Result<Submission>>,
    {
        let Submission { job, metadata } = submission.await?;

        if let Some(error) = metadata.error_result() {
            debug!(job_id = job.id(), "Job rejected on submission");
            return Err(BqPipeError::Rejected(error.clone()));
        }

        debug!(job_id = job.id(), state = metadata.state().unwrap_or("UNKNOWN"), "Waiting for job");

        match job.await {
            JobOutcome::Complete(terminal) => {
                if let Some(error) = terminal.error_result() {
                    return Err(BqPipeError::Failed(error.clone()));
                }
                Ok(terminal)
            }
            JobOutcome::Error(message) => Err(BqPipeError::JobFailed(message)),
        }
    }
}
