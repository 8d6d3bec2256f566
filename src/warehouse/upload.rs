use std::convert::Infallible;
use std::future::Future;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use crate::error::{check_response, http_error, BqPipeError, ErrorContext, Result};
use super::{JobMetadata, WriteChannel};

const UPLOAD_BASE: &str = "https://bigquery.googleapis.com/upload/bigquery/v2/projects";
const BOUNDARY: &str = "bqpipe_upload_boundary";

/// A load job whose data is sent as the media part of a multipart upload.
///
/// Chunks pass through a bounded queue into the request body, so `write`
/// waits whenever the upload falls behind. Dropping the channel without
/// calling `finish` aborts the request.
pub struct UploadChannel {
    sender: Option<mpsc::Sender<Bytes>>,
    task: Option<JoinHandle<Result<JobMetadata>>>,
}

/// Request body handed to the upload: the multipart head, every written
/// chunk, then the closing boundary.
pub(crate) type UploadBody = BoxStream<'static, std::result::Result<Bytes, Infallible>>;

impl UploadChannel {
    /// Starts the upload request in the background. `job` is the job resource
    /// sent as the metadata part.
    pub fn start(
        http: reqwest::Client,
        token: String,
        project_id: &str,
        job: Value,
        buffer: usize,
    ) -> Result<Self> {
        let url = format!("{}/{}/jobs?uploadType=multipart", UPLOAD_BASE, project_id);
        let (head, tail) = multipart_frame(&job)?;

        Ok(Self::spawn(head, tail, buffer, move |body| async move {
            let ctx = ErrorContext::new().with_operation("upload");
            let response = http
                .post(url)
                .bearer_auth(token)
                .header(CONTENT_TYPE, format!("multipart/related; boundary={}", BOUNDARY))
                .body(reqwest::Body::wrap_stream(body))
                .send()
                .await
                .map_err(|e| http_error(e, ctx.clone()))?;

            let response = check_response(response, ctx.clone()).await?;
            let job: JobMetadata = response.json().await.map_err(|e| http_error(e, ctx))?;
            Ok::<_, BqPipeError>(job)
        }))
    }

    /// Runs `upload` on its own task, feeding it a body that holds at most
    /// `buffer` written chunks ahead of what the upload has consumed.
    pub(crate) fn spawn<U, F>(head: Bytes, tail: Bytes, buffer: usize, upload: U) -> Self
    where
        U: FnOnce(UploadBody) -> F,
        F: Future<Output = Result<JobMetadata>> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel::<Bytes>(buffer.max(1));

        let chunks = stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|chunk| (chunk, receiver))
        });
        let body = stream::once(async move { head })
            .chain(chunks)
            .chain(stream::once(async move { tail }))
            .map(Ok::<Bytes, Infallible>)
            .boxed();

        Self {
            sender: Some(sender),
            task: Some(tokio::spawn(upload(body))),
        }
    }

    async fn join(&mut self) -> Result<JobMetadata> {
        let task = self
            .task
            .take()
            .ok_or_else(|| BqPipeError::transport("upload", "upload already finished"))?;

        task.await
            .map_err(|e| BqPipeError::transport("upload", e.to_string()))?
    }
}

#[async_trait]
impl WriteChannel for UploadChannel {
    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| BqPipeError::transport("upload", "upload already finished"))?;

        if sender.send(chunk).await.is_ok() {
            return Ok(());
        }

        // The request ended before the body did; surface its outcome.
        self.sender = None;
        match self.join().await {
            Err(e) => Err(e),
            Ok(_) => Err(BqPipeError::transport("upload", "upload closed before all data was sent")),
        }
    }

    async fn finish(mut self: Box<Self>) -> Result<JobMetadata> {
        self.sender = None;
        let job = self.join().await?;
        debug!(job_id = job.job_id().unwrap_or("-"), "Upload complete");
        Ok(job)
    }
}

impl Drop for UploadChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn multipart_frame(job: &Value) -> Result<(Bytes, Bytes)> {
    let metadata = serde_json::to_string(job).map_err(BqPipeError::Serialize)?;
    let head = format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: application/octet-stream\r\n\r\n",
        b = BOUNDARY,
        m = metadata
    );
    let tail = format!("\r\n--{}--\r\n", BOUNDARY);
    Ok((Bytes::from(head), Bytes::from(tail)))
}
