use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::multipart::{Form, Part};

use super::multipart::{MultipartForm, PartBody};
use super::transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, RequestBody, TransportError, TransportFuture,
};
use super::upload::UploadProgress;

const CHUNK_SIZE: usize = 64 * 1024;

/// [`HttpTransport`] backed by `reqwest`. Must be polled inside a Tokio runtime.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest, progress: Option<UploadProgress>) -> TransportFuture<'_> {
        Box::pin(async move {
            let method = match request.method {
                Method::Get => reqwest::Method::GET,
                Method::Post => reqwest::Method::POST,
                Method::Put => reqwest::Method::PUT,
                Method::Patch => reqwest::Method::PATCH,
                Method::Delete => reqwest::Method::DELETE,
            };
            let mut builder = self.client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder = match request.body {
                RequestBody::Empty => builder,
                RequestBody::Json(value) => builder.body(value.to_string()),
                RequestBody::Multipart(form) => builder.multipart(multipart_body(form, progress)?),
            };

            let response = builder.send().await.map_err(transport_error)?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_string(), value.to_string()))
                })
                .collect();
            let body = response.bytes().await.map_err(transport_error)?.to_vec();
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}

/// File parts are streamed in chunks so progress follows the bytes handed to the socket.
fn multipart_body(
    form: MultipartForm,
    progress: Option<UploadProgress>,
) -> Result<Form, TransportError> {
    let total = form
        .files()
        .map(|file| file.contents.len() as u64)
        .sum::<u64>();
    let loaded = Arc::new(AtomicU64::new(0));

    let mut body = Form::new();
    for part in form.parts() {
        match &part.body {
            PartBody::Text(text) => {
                body = body.text(part.name.clone(), text.clone());
            }
            PartBody::File(file) => {
                let chunks = file
                    .contents
                    .chunks(CHUNK_SIZE)
                    .map(<[u8]>::to_vec)
                    .collect::<Vec<_>>();
                let loaded = loaded.clone();
                let progress = progress.clone();
                let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
                    let sent = loaded.fetch_add(chunk.len() as u64, Ordering::SeqCst)
                        + chunk.len() as u64;
                    if let Some(progress) = &progress {
                        progress.report(sent, total);
                    }
                    Ok::<_, std::io::Error>(chunk)
                }));
                let file_part = Part::stream_with_length(
                    reqwest::Body::wrap_stream(stream),
                    file.contents.len() as u64,
                )
                .file_name(file.name.clone())
                .mime_str(&file.mime_type)
                .map_err(transport_error)?;
                body = body.part(part.name.clone(), file_part);
            }
        }
    }
    Ok(body)
}

fn transport_error(error: reqwest::Error) -> TransportError {
    TransportError(error.to_string())
}
