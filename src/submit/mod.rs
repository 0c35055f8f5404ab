mod client;
mod files;
mod multipart;
mod pipeline;
#[cfg(feature = "http")]
mod reqwest_transport;
mod retry;
mod transport;
mod upload;


pub use client::{
    ApiClient, ApiError, DEFAULT_ERROR_MESSAGE, ErrorKind, FORM_SUBMISSION_FAILED,
    InMemoryTokenStore, NetworkFailure, RequestOptions, TOO_MANY_REQUESTS, TokenStore,
};
pub use files::{FileConstraints, validate_files};
pub use multipart::{MultipartForm, Part, PartBody};
pub use pipeline::{SubmissionPipeline, SubmissionTracker};
#[cfg(feature = "http")]
pub use reqwest_transport::ReqwestTransport;
pub use retry::{RateLimitSignal, RetryPolicy, with_retry};
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, RequestBody, TransportError,
    TransportFuture,
};
pub use upload::{
    FileUploader, UPLOAD_FAILED, UPLOAD_PART_NAME, UploadError, UploadProgress, UploadStatus,
    UploadTask,
};
