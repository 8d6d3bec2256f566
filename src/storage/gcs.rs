use std::sync::Arc;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::Url;
use tracing::debug;
use crate::auth::{GoogleAuth, STORAGE_READ_SCOPE};
use crate::error::{check_response, http_error, BqPipeError, ErrorContext, Result};
use crate::warehouse::ByteStream;
use super::{ObjectStore, StorageFile};

const GCS_API_BASE: &str = "https://storage.googleapis.com/storage/v1";

/// Cloud Storage client scoped to one bucket.
#[derive(Debug, Clone)]
pub struct GcsStore {
    bucket: String,
    http: reqwest::Client,
    auth: GoogleAuth,
}

impl GcsStore {
    pub async fn connect(bucket: impl Into<String>) -> Result<Self> {
        let auth = GoogleAuth::detect().await?;
        Ok(Self::new(bucket, reqwest::Client::new(), auth))
    }

    pub fn new(bucket: impl Into<String>, http: reqwest::Client, auth: GoogleAuth) -> Self {
        Self {
            bucket: bucket.into(),
            http,
            auth,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl ObjectStore for GcsStore {
    fn file(&self, name: &str) -> Arc<dyn StorageFile> {
        Arc::new(GcsFile {
            bucket: self.bucket.clone(),
            name: name.to_string(),
            http: self.http.clone(),
            auth: self.auth.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct GcsFile {
    bucket: String,
    name: String,
    http: reqwest::Client,
    auth: GoogleAuth,
}

fn media_url(bucket: &str, name: &str) -> Result<Url> {
    let mut url = Url::parse(GCS_API_BASE)
        .map_err(|e| BqPipeError::Config(format!("invalid storage endpoint: {}", e)))?;

    url.path_segments_mut()
        .map_err(|_| BqPipeError::Config("storage endpoint cannot be a base URL".into()))?
        .extend(&["b", bucket, "o", name]);
    url.query_pairs_mut().append_pair("alt", "media");

    Ok(url)
}

#[async_trait]
impl StorageFile for GcsFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.name)
    }

    async fn open_read(&self) -> Result<ByteStream> {
        let url = media_url(&self.bucket, &self.name)?;
        let token = self.auth.bearer_token(STORAGE_READ_SCOPE).await?;
        let ctx = ErrorContext::new().with_operation("read_object");

        debug!(uri = %self.uri(), "Opening object for reading");

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| http_error(e, ctx.clone()))?;

        let response = check_response(response, ctx.clone()).await?;

        Ok(response
            .bytes_stream()
            .map_err(move |e| http_error(e, ctx.clone()))
            .boxed())
    }
}
