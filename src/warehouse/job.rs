use std::future::{Future, IntoFuture};
use std::pin::Pin;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use crate::error::ErrorResult;

const STATE_DONE: &str = "DONE";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_result: Option<ErrorResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorResult>>,
}

/// A job resource as returned by the API. Only the fields the runner inspects
/// are typed; everything else (configuration, statistics, ...) rides along in
/// `extra` untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_reference: Option<JobReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobMetadata {
    pub fn with_state(state: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus {
                state: Some(state.into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn with_error_result(mut self, error: ErrorResult) -> Self {
        self.status.get_or_insert_with(JobStatus::default).error_result = Some(error);
        self
    }

    pub fn with_reference(mut self, reference: JobReference) -> Self {
        self.job_reference = Some(reference);
        self
    }

    pub fn state(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.state.as_deref())
    }

    pub fn is_done(&self) -> bool {
        self.state() == Some(STATE_DONE)
    }

    pub fn error_result(&self) -> Option<&ErrorResult> {
        self.status.as_ref().and_then(|s| s.error_result.as_ref())
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_reference.as_ref().map(|r| r.job_id.as_str())
    }
}

/// The single terminal event of a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Complete(JobMetadata),
    Error(String),
}

/// Handle to a running remote job. Resolves exactly once, to a [`JobOutcome`],
/// and is consumed by waiting on it.
#[derive(Debug)]
pub struct Job {
    id: String,
    outcome: oneshot::Receiver<JobOutcome>,
}

/// The producing half of a [`Job`]. Both `complete` and `fail` take `self`, so
/// a job can never be resolved twice.
#[derive(Debug)]
pub struct JobNotifier {
    id: String,
    sender: oneshot::Sender<JobOutcome>,
}

impl Job {
    pub fn pending(id: impl Into<String>) -> (Job, JobNotifier) {
        let id = id.into();
        let (sender, outcome) = oneshot::channel();

        (
            Job { id: id.clone(), outcome },
            JobNotifier { id, sender },
        )
    }

    pub fn completed(id: impl Into<String>, metadata: JobMetadata) -> Job {
        let (job, notifier) = Job::pending(id);
        notifier.complete(metadata);
        job
    }

    pub fn failed(id: impl Into<String>, message: impl Into<String>) -> Job {
        let (job, notifier) = Job::pending(id);
        notifier.fail(message);
        job
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl IntoFuture for Job {
    type Output = JobOutcome;
    type IntoFuture = Pin<Box<dyn Future<Output = JobOutcome> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        let Job { id, outcome } = self;

        Box::pin(async move {
            match outcome.await {
                Ok(outcome) => outcome,
                Err(_) => JobOutcome::Error(format!("Job {} was abandoned before completing", id)),
            }
        })
    }
}

impl JobNotifier {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn complete(self, metadata: JobMetadata) {
        let _ = self.sender.send(JobOutcome::Complete(metadata));
    }

    pub fn fail(self, message: impl Into<String>) {
        let _ = self.sender.send(JobOutcome::Error(message.into()));
    }

    /// True once nobody is waiting on the job any more.
    pub fn is_abandoned(&self) -> bool {
        self.sender.is_closed()
    }
}
