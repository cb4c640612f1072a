//! HTTP transport for the cloud management REST API

use crate::error::{ListError, ListResult};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// The request side the list engine depends on.
///
/// Retries, authentication and headers belong to implementations; the engine
/// only ever issues `post` for list endpoints and `get` for single entities.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, method: Method, url: &str, body: Option<&Value>) -> ListResult<Value>;

    async fn post(&self, url: &str, body: &Value) -> ListResult<Value> {
        self.request(Method::POST, url, Some(body)).await
    }

    async fn get(&self, url: &str) -> ListResult<Value> {
        self.request(Method::GET, url, None).await
    }
}

/// reqwest-backed [`Transport`]
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    token: Option<String>,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new() -> ListResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("cloudlist/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ListError::InvalidConfig(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            token: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: Method, url: &str, body: Option<&Value>) -> ListResult<Value> {
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method, url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ListError::transport(None, format!("failed to send request: {e}")))?;

        let status = response.status();
        let response_body = response.text().await.map_err(|e| {
            ListError::transport(Some(status.as_u16()), format!("failed to read body: {e}"))
        })?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&response_body));
            return Err(ListError::transport(Some(status.as_u16()), status.to_string()));
        }

        // Handle empty response
        if response_body.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&response_body).map_err(ListError::from)
    }
}
