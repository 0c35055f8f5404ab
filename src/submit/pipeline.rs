use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value as JsonValue;

use super::client::{ApiClient, ApiError, RequestOptions};
use super::multipart::MultipartForm;
use super::retry::{RetryPolicy, with_retry};
use super::upload::UploadProgress;
use crate::value::FormValues;

type Transform = Arc<dyn Fn(FormValues) -> FormValues + Send + Sync>;
type SuccessHook = Arc<dyn Fn(&JsonValue) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&ApiError) + Send + Sync>;

/// Delivers form values to an endpoint as JSON, or as multipart when any
/// value carries files.
#[derive(Clone)]
pub struct SubmissionPipeline {
    client: ApiClient,
    retry: RetryPolicy,
    transform: Option<Transform>,
    on_success: Option<SuccessHook>,
    on_error: Option<ErrorHook>,
    progress: Option<UploadProgress>,
}

impl SubmissionPipeline {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
            transform: None,
            on_success: None,
            on_error: None,
            progress: None,
        }
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn transform(
        mut self,
        transform: impl Fn(FormValues) -> FormValues + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn on_success(mut self, hook: impl Fn(&JsonValue) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&ApiError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Progress sink for multipart submissions.
    pub fn track_progress(mut self, progress: UploadProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub async fn submit_form(
        &self,
        endpoint: &str,
        values: FormValues,
        options: RequestOptions,
    ) -> Result<JsonValue, ApiError> {
        let values = match &self.transform {
            Some(transform) => transform(values),
            None => values,
        };
        let result = if values.has_files() {
            self.send_multipart(endpoint, &values, options).await
        } else {
            self.client.post(endpoint, values.to_json(), options).await
        };
        self.notify(result)
    }

    /// Always multipart, whether or not the values carry files.
    pub async fn submit_form_with_files(
        &self,
        endpoint: &str,
        values: FormValues,
        options: RequestOptions,
    ) -> Result<JsonValue, ApiError> {
        let result = self.send_multipart(endpoint, &values, options).await;
        self.notify(result)
    }

    /// [`SubmissionPipeline::submit_form`] retried on rate-limit responses.
    /// Hooks fire once per attempt.
    pub async fn submit_with_retry(
        &self,
        endpoint: &str,
        values: FormValues,
        options: RequestOptions,
    ) -> Result<JsonValue, ApiError> {
        with_retry(self.retry, || {
            self.submit_form(endpoint, values.clone(), options.clone())
        })
        .await
    }

    async fn send_multipart(
        &self,
        endpoint: &str,
        values: &FormValues,
        options: RequestOptions,
    ) -> Result<JsonValue, ApiError> {
        if let Some(progress) = &self.progress {
            progress.reset();
        }
        let result = self
            .client
            .send_multipart(
                endpoint,
                MultipartForm::from_values(values),
                options,
                self.progress.clone(),
            )
            .await;
        if let (Ok(_), Some(progress)) = (&result, &self.progress) {
            progress.complete();
        }
        result
    }

    fn notify(&self, result: Result<JsonValue, ApiError>) -> Result<JsonValue, ApiError> {
        match &result {
            Ok(response) => {
                if let Some(hook) = &self.on_success {
                    hook(response);
                }
            }
            Err(error) => {
                tracing::debug!(%error, kind = ?error.kind(), "form submission failed");
                if let Some(hook) = &self.on_error {
                    hook(error);
                }
            }
        }
        result
    }
}

#[derive(Default)]
struct TrackerState {
    in_flight: usize,
    error: Option<String>,
}

/// Submitting flag and last visible error for a submit button.
#[derive(Clone, Default)]
pub struct SubmissionTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl SubmissionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_submitting(&self) -> bool {
        lock(&self.state).in_flight > 0
    }

    pub fn submit_error(&self) -> Option<String> {
        lock(&self.state).error.clone()
    }

    pub fn clear_error(&self) {
        lock(&self.state).error = None;
    }

    /// Awaits `submission`. The flag is cleared on both outcomes; aborted
    /// requests leave no error behind.
    pub async fn submit<T, Fut>(&self, submission: Fut) -> Result<T, ApiError>
    where
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let in_flight = InFlight::enter(&self.state);
        let result = submission.await;
        drop(in_flight);
        if let Err(error) = &result {
            if error.is_user_visible() {
                lock(&self.state).error = Some(error.to_string());
            }
        }
        result
    }
}

// Counts one pending submission; dropping it, even mid-await, releases the count.
struct InFlight<'a> {
    state: &'a Mutex<TrackerState>,
}

impl<'a> InFlight<'a> {
    fn enter(state: &'a Mutex<TrackerState>) -> Self {
        let mut guard = lock(state);
        guard.in_flight += 1;
        guard.error = None;
        drop(guard);
        Self { state }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = lock(self.state);
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
