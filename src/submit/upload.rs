use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::client::{ApiClient, ApiError, RequestOptions};
use super::files::{FileConstraints, validate_files};
use super::multipart::MultipartForm;
use crate::value::FileRef;

/// Part name every uploaded file is sent under.
pub const UPLOAD_PART_NAME: &str = "files";
pub const UPLOAD_FAILED: &str = "Upload failed";

type ProgressListener = Arc<dyn Fn(u8) + Send + Sync>;

/// Shared upload percentage. Never moves backwards until [`UploadProgress::reset`].
#[derive(Clone, Default)]
pub struct UploadProgress {
    percent: Arc<AtomicU8>,
    listeners: Arc<Mutex<Vec<ProgressListener>>>,
}

impl UploadProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_change(&self, listener: impl Fn(u8) + Send + Sync + 'static) {
        lock(&self.listeners).push(Arc::new(listener));
    }

    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::SeqCst)
    }

    /// Records a bytes-sent event. Totals of zero carry no length and are ignored.
    pub fn report(&self, loaded: u64, total: u64) {
        if total == 0 {
            return;
        }
        let scaled = (u128::from(loaded) * 100 + u128::from(total) / 2) / u128::from(total);
        self.advance(scaled.min(100) as u8);
    }

    pub fn complete(&self) {
        self.advance(100);
    }

    pub fn reset(&self) {
        self.percent.store(0, Ordering::SeqCst);
    }

    fn advance(&self, next: u8) {
        let previous = self.percent.fetch_max(next, Ordering::SeqCst);
        if next <= previous {
            return;
        }
        let listeners = lock(&self.listeners).clone();
        for listener in listeners {
            listener(next);
        }
    }
}

impl std::fmt::Debug for UploadProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadProgress")
            .field("percent", &self.percent())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UploadStatus {
    Pending,
    Uploading,
    Complete,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct UploadTask {
    pub id: Uuid,
    pub file: FileRef,
    pub progress: u8,
    pub status: UploadStatus,
}

impl UploadTask {
    pub fn new(file: FileRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            file,
            progress: 0,
            status: UploadStatus::Pending,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, UploadStatus::Complete | UploadStatus::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UploadError {
    /// Constraint violations; nothing was sent.
    #[error("{}", .0.join(". "))]
    Rejected(Vec<String>),
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Default)]
struct UploaderState {
    uploading: bool,
    error: Option<String>,
    tasks: Vec<UploadTask>,
}

/// Validates and uploads a batch of files as one multipart request.
#[derive(Clone)]
pub struct FileUploader {
    client: ApiClient,
    constraints: FileConstraints,
    progress: UploadProgress,
    state: Arc<Mutex<UploaderState>>,
}

impl FileUploader {
    pub fn new(client: ApiClient, constraints: FileConstraints) -> Self {
        Self {
            client,
            constraints,
            progress: UploadProgress::new(),
            state: Arc::new(Mutex::new(UploaderState::default())),
        }
    }

    pub fn constraints(&self) -> &FileConstraints {
        &self.constraints
    }

    pub fn progress(&self) -> UploadProgress {
        self.progress.clone()
    }

    pub fn is_uploading(&self) -> bool {
        lock(&self.state).uploading
    }

    pub fn upload_error(&self) -> Option<String> {
        lock(&self.state).error.clone()
    }

    pub fn clear_error(&self) {
        lock(&self.state).error = None;
    }

    /// Per-file view of the last batch. In-flight tasks report the batch percentage.
    pub fn tasks(&self) -> Vec<UploadTask> {
        let percent = self.progress.percent();
        lock(&self.state)
            .tasks
            .iter()
            .cloned()
            .map(|mut task| {
                if task.status == UploadStatus::Uploading {
                    task.progress = percent;
                }
                task
            })
            .collect()
    }

    pub async fn upload(&self, files: &[FileRef], endpoint: &str) -> Result<JsonValue, UploadError> {
        self.upload_with(files, endpoint, RequestOptions::default())
            .await
    }

    pub async fn upload_with(
        &self,
        files: &[FileRef],
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<JsonValue, UploadError> {
        self.progress.reset();
        {
            let mut state = lock(&self.state);
            state.uploading = true;
            state.error = None;
            state.tasks.clear();
        }
        let mut active = ActiveUpload {
            state: &self.state,
            settled: false,
        };

        let violations = validate_files(files, &self.constraints);
        if !violations.is_empty() {
            let mut state = lock(&self.state);
            state.error = Some(violations.join(". "));
            state.uploading = false;
            active.settled = true;
            tracing::debug!(violations = violations.len(), "upload rejected before sending");
            return Err(UploadError::Rejected(violations));
        }

        let mut form = MultipartForm::new();
        for file in files {
            form.push_file(UPLOAD_PART_NAME, file.clone());
        }
        lock(&self.state).tasks = files
            .iter()
            .cloned()
            .map(|file| UploadTask {
                status: UploadStatus::Uploading,
                ..UploadTask::new(file)
            })
            .collect();

        let result = self
            .client
            .send_multipart_with_fallback(
                endpoint,
                form,
                options,
                Some(self.progress.clone()),
                UPLOAD_FAILED,
            )
            .await;

        if result.is_ok() {
            self.progress.complete();
        }
        active.settled = true;
        let mut state = lock(&self.state);
        state.uploading = false;
        match result {
            Ok(response) => {
                for task in &mut state.tasks {
                    task.progress = 100;
                    task.status = UploadStatus::Complete;
                }
                Ok(response)
            }
            Err(error) => {
                let message = error.to_string();
                for task in &mut state.tasks {
                    task.status = UploadStatus::Failed(message.clone());
                }
                if error.is_user_visible() {
                    state.error = Some(message);
                }
                Err(error.into())
            }
        }
    }
}

// Clears the uploading flag when an upload future is dropped before it settles.
struct ActiveUpload<'a> {
    state: &'a Mutex<UploaderState>,
    settled: bool,
}

impl Drop for ActiveUpload<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = lock(self.state);
        state.uploading = false;
        let message = ApiError::Aborted.to_string();
        for task in &mut state.tasks {
            if !task.is_finished() {
                task.status = UploadStatus::Failed(message.clone());
            }
        }
        tracing::debug!("upload dropped before settling");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
