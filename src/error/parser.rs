use gcp_bigquery_client::error::BQError;
use serde::Deserialize;
use tracing::debug;
use super::BqPipeError;

/// Where a remote call was made, kept for diagnostics only. The surfaced error
/// message stays the remote service's own.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub operation: Option<String>,
    pub table: Option<String>,
    pub sql: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, op: impl Into<String>) -> Self {
        self.operation = Some(op.into());
        self
    }

    pub fn with_table(mut self, project: &str, dataset: &str, table: &str) -> Self {
        self.table = Some(format!("{}.{}.{}", project, dataset, table));
        self
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    fn operation_name(&self) -> String {
        self.operation.clone().unwrap_or_else(|| "unknown".to_string())
    }

    fn log(&self, message: &str) {
        debug!(
            operation = self.operation.as_deref().unwrap_or("unknown"),
            table = self.table.as_deref().unwrap_or("-"),
            sql = self.sql.as_deref().unwrap_or("-"),
            "Remote call failed: {}",
            message
        );
    }
}

pub fn transport_error(error: BQError, context: ErrorContext) -> BqPipeError {
    let message = match &error {
        BQError::ResponseError { error: resp } => resp.error.message.clone(),
        _ => error.to_string(),
    };

    context.log(&message);
    BqPipeError::transport(context.operation_name(), message)
}

pub fn is_not_found(error: &BQError) -> bool {
    matches!(error, BQError::ResponseError { error: resp } if resp.error.code == 404)
}

pub fn http_error(error: reqwest::Error, context: ErrorContext) -> BqPipeError {
    let message = error.to_string();
    context.log(&message);
    BqPipeError::transport(context.operation_name(), message)
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// Passes successful responses through; turns error statuses into a transport
/// error carrying the API's own message when the body has one.
pub async fn check_response(
    response: reqwest::Response,
    context: ErrorContext,
) -> Result<reqwest::Response, BqPipeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .map_err(|e| http_error(e, context.clone()))?;

    let message = extract_api_message(&body)
        .unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), body.trim()));

    context.log(&message);
    Err(BqPipeError::transport(context.operation_name(), message))
}

fn extract_api_message(body: &str) -> Option<String> {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_api_message() {
        let body = r#"{"error":{"code":404,"message":"Not found: Table p:d.t","errors":[]}}"#;
        assert_eq!(extract_api_message(body).as_deref(), Some("Not found: Table p:d.t"));
    }

    #[test]
    fn test_extract_api_message_non_json() {
        assert_eq!(extract_api_message("<html>bad gateway</html>"), None);
    }

    #[test]
    fn test_context_builder() {
        let ctx = ErrorContext::new()
            .with_operation("export")
            .with_table("p", "d", "t")
            .with_sql("SELECT 1");

        assert_eq!(ctx.operation_name(), "export");
        assert_eq!(ctx.table.as_deref(), Some("p.d.t"));
        assert_eq!(ctx.sql.as_deref(), Some("SELECT 1"));
        assert_eq!(ErrorContext::new().operation_name(), "unknown");
    }
}
