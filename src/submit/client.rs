use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::FutureExt;
use futures_timer::Delay;
use serde_json::Value as JsonValue;

use super::multipart::MultipartForm;
use super::retry::RateLimitSignal;
use super::transport::{HttpRequest, HttpResponse, HttpTransport, Method, RequestBody};
use super::upload::UploadProgress;
use crate::config::FormflowConfig;
use crate::scope::ScopeToken;

pub const DEFAULT_ERROR_MESSAGE: &str = "An error occurred";
pub const FORM_SUBMISSION_FAILED: &str = "Form submission failed";
pub const TOO_MANY_REQUESTS: u16 = 429;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NetworkFailure {
    Transport(String),
    Timeout(Duration),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Network,
    Status,
    RateLimited,
    Aborted,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("Network error occurred")]
    Network { reason: NetworkFailure },
    #[error("{message}")]
    Status {
        status: u16,
        message: String,
        data: JsonValue,
        retry_after: Option<Duration>,
    },
    #[error("Request was cancelled")]
    Aborted,
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network { .. } | ApiError::Decode(_) => ErrorKind::Network,
            ApiError::Status { status, .. } if *status == TOO_MANY_REQUESTS => {
                ErrorKind::RateLimited
            }
            ApiError::Status { .. } => ErrorKind::Status,
            ApiError::Aborted => ErrorKind::Aborted,
        }
    }

    /// HTTP status, or 0 when no response arrived.
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Status { status, .. } => *status,
            ApiError::Network { .. } | ApiError::Aborted | ApiError::Decode(_) => 0,
        }
    }

    /// Cancellations come from teardown and are never shown to the user.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, ApiError::Aborted)
    }
}

impl RateLimitSignal for ApiError {
    fn is_rate_limited(&self) -> bool {
        self.kind() == ErrorKind::RateLimited
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::Status { retry_after, .. } => *retry_after,
            ApiError::Network { .. } | ApiError::Aborted | ApiError::Decode(_) => None,
        }
    }
}

/// Source of bearer tokens, keyed by the configured token name.
pub trait TokenStore: Send + Sync {
    fn token(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Default)]
pub struct InMemoryTokenStore {
    tokens: Arc<RwLock<BTreeMap<String, String>>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, token: impl Into<String>) {
        let mut tokens = match self.tokens.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tokens.insert(key.into(), token.into());
    }

    pub fn remove(&self, key: &str) {
        let mut tokens = match self.tokens.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tokens.remove(key);
    }
}

impl TokenStore for InMemoryTokenStore {
    fn token(&self, key: &str) -> Option<String> {
        let tokens = match self.tokens.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tokens.get(key).cloned()
    }
}

#[derive(Clone, Debug)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub with_auth: bool,
    /// Request resolves as [`ApiError::Aborted`] once this scope ends.
    pub signal: Option<ScopeToken>,
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            with_auth: true,
            signal: None,
            timeout: None,
        }
    }
}

impl RequestOptions {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_auth(mut self, value: bool) -> Self {
        self.with_auth = value;
        self
    }

    pub fn signal(mut self, scope: ScopeToken) -> Self {
        self.signal = Some(scope);
        self
    }

    pub fn timeout(mut self, value: Duration) -> Self {
        self.timeout = Some(value);
        self
    }
}

/// Generic request helper over an [`HttpTransport`].
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    timeout: Duration,
    token_key: String,
    transport: Arc<dyn HttpTransport>,
    tokens: Option<Arc<dyn TokenStore>>,
}

impl ApiClient {
    pub fn new(config: &FormflowConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            base_url: config.api.base_url.clone(),
            timeout: config.api.timeout(),
            token_key: config.auth.token_key.clone(),
            transport,
            tokens: None,
        }
    }

    pub fn with_token_store(mut self, tokens: Arc<dyn TokenStore>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    /// Sends a JSON request and returns the parsed body of a 2xx response.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        data: Option<JsonValue>,
        options: RequestOptions,
    ) -> Result<JsonValue, ApiError> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        merge_headers(&mut headers, &options.headers);
        self.attach_auth(&mut headers, options.with_auth);

        let request = HttpRequest {
            method,
            url: self.url(endpoint),
            headers,
            body: data.map(RequestBody::Json).unwrap_or_default(),
        };
        let response = self.dispatch(request, None, &options).await?;
        parse_response(response, DEFAULT_ERROR_MESSAGE)
    }

    pub async fn get(&self, endpoint: &str, options: RequestOptions) -> Result<JsonValue, ApiError> {
        self.request(Method::Get, endpoint, None, options).await
    }

    pub async fn post(
        &self,
        endpoint: &str,
        data: JsonValue,
        options: RequestOptions,
    ) -> Result<JsonValue, ApiError> {
        self.request(Method::Post, endpoint, Some(data), options)
            .await
    }

    pub async fn put(
        &self,
        endpoint: &str,
        data: JsonValue,
        options: RequestOptions,
    ) -> Result<JsonValue, ApiError> {
        self.request(Method::Put, endpoint, Some(data), options)
            .await
    }

    pub async fn patch(
        &self,
        endpoint: &str,
        data: JsonValue,
        options: RequestOptions,
    ) -> Result<JsonValue, ApiError> {
        self.request(Method::Patch, endpoint, Some(data), options)
            .await
    }

    pub async fn delete(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<JsonValue, ApiError> {
        self.request(Method::Delete, endpoint, None, options).await
    }

    /// POSTs a multipart body. Any caller-supplied content type is dropped so
    /// the transport can write its own boundary.
    pub async fn send_multipart(
        &self,
        endpoint: &str,
        form: MultipartForm,
        options: RequestOptions,
        progress: Option<UploadProgress>,
    ) -> Result<JsonValue, ApiError> {
        self.send_multipart_with_fallback(endpoint, form, options, progress, FORM_SUBMISSION_FAILED)
            .await
    }

    pub(crate) async fn send_multipart_with_fallback(
        &self,
        endpoint: &str,
        form: MultipartForm,
        options: RequestOptions,
        progress: Option<UploadProgress>,
        fallback_message: &'static str,
    ) -> Result<JsonValue, ApiError> {
        let mut headers = options
            .headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("content-type"))
            .cloned()
            .collect::<Vec<_>>();
        self.attach_auth(&mut headers, options.with_auth);

        let request = HttpRequest {
            method: Method::Post,
            url: self.url(endpoint),
            headers,
            body: RequestBody::Multipart(form),
        };
        let response = self.dispatch(request, progress, &options).await?;
        parse_response(response, fallback_message)
    }

    fn attach_auth(&self, headers: &mut Vec<(String, String)>, with_auth: bool) {
        if !with_auth {
            return;
        }
        let Some(token) = self
            .tokens
            .as_ref()
            .and_then(|tokens| tokens.token(&self.token_key))
        else {
            return;
        };
        merge_headers(
            headers,
            &[("Authorization".to_string(), format!("Bearer {token}"))],
        );
    }

    async fn dispatch(
        &self,
        request: HttpRequest,
        progress: Option<UploadProgress>,
        options: &RequestOptions,
    ) -> Result<HttpResponse, ApiError> {
        if options
            .signal
            .as_ref()
            .is_some_and(|scope| !scope.is_active())
        {
            return Err(ApiError::Aborted);
        }

        let timeout = options.timeout.unwrap_or(self.timeout);
        tracing::debug!(method = %request.method, url = %request.url, "sending request");

        let send = self.transport.send(request, progress).fuse();
        let deadline = Delay::new(timeout).fuse();
        let signal = options.signal.clone();
        let aborted = async move {
            match signal {
                Some(scope) => scope.ended().await,
                None => futures::future::pending::<()>().await,
            }
        }
        .fuse();
        futures::pin_mut!(send, deadline, aborted);

        futures::select! {
            response = send => response.map_err(|error| ApiError::Network {
                reason: NetworkFailure::Transport(error.to_string()),
            }),
            _ = deadline => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "request timed out");
                Err(ApiError::Network { reason: NetworkFailure::Timeout(timeout) })
            }
            _ = aborted => Err(ApiError::Aborted),
        }
    }
}

/// Later headers replace earlier ones with the same (case-insensitive) name.
fn merge_headers(headers: &mut Vec<(String, String)>, extra: &[(String, String)]) {
    for (name, value) in extra {
        headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        headers.push((name.clone(), value.clone()));
    }
}

fn parse_response(response: HttpResponse, fallback_message: &str) -> Result<JsonValue, ApiError> {
    let body = if response.body.is_empty() {
        Ok(JsonValue::Null)
    } else {
        serde_json::from_slice::<JsonValue>(&response.body)
    };

    if response.is_success() {
        return body.map_err(|error| ApiError::Decode(error.to_string()));
    }

    let data = body.unwrap_or(JsonValue::Null);
    let message = data
        .get("message")
        .and_then(JsonValue::as_str)
        .filter(|message| !message.is_empty())
        .unwrap_or(fallback_message)
        .to_string();
    let retry_after = response
        .header("Retry-After")
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    Err(ApiError::Status {
        status: response.status,
        message,
        data,
        retry_after,
    })
}
