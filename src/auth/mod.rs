use std::fmt;
use std::sync::Arc;
use gcp_auth::TokenProvider;
use crate::error::{BqPipeError, Result};

pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";
pub const STORAGE_READ_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_only";

/// Bearer tokens for the raw HTTP calls the BigQuery client does not cover
/// (media uploads and object downloads).
#[derive(Clone)]
pub struct GoogleAuth {
    provider: Arc<dyn TokenProvider>,
}

impl GoogleAuth {
    /// Picks up application default credentials the same way the BigQuery client does.
    pub async fn detect() -> Result<Self> {
        let provider = gcp_auth::provider()
            .await
            .map_err(|e| BqPipeError::Auth(e.to_string()))?;

        Ok(Self { provider })
    }

    pub fn from_provider(provider: Arc<dyn TokenProvider>) -> Self {
        Self { provider }
    }

    pub async fn bearer_token(&self, scope: &str) -> Result<String> {
        let token = self
            .provider
            .token(&[scope])
            .await
            .map_err(|e| BqPipeError::Auth(e.to_string()))?;

        Ok(token.as_str().to_string())
    }
}

impl fmt::Debug for GoogleAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleAuth").finish_non_exhaustive()
    }
}
