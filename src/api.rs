//! HTTP client for the analysis backend.
//!
//! Covers the three services the front end talks to: document ingest,
//! single-shot analysis (inference or full analysis) and streaming simplify.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::client::{ByteStream, ClientError, StreamTransport};
use crate::http::{add_extra_headers, authorize, backend_failure, build_http_client, error_from_response};
use crate::model::{AnalysisPayload, AnalysisRequest, AnalysisResult, IngestResponse, IngestedDocument, Task};
use crate::options::ClientOptions;

const EVENT_STREAM: &str = "text/event-stream";

/// Client for the analysis backend.
///
/// # Example
/// ```no_run
/// use plainclause::api::AnalysisClient;
/// use plainclause::model::Task;
/// use plainclause::options::ClientOptions;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = AnalysisClient::new(ClientOptions::from_env()?)?;
///     let result = client
///         .analyze("The tenant shall indemnify the landlord...", Task::Full, None)
///         .await?;
///     for risk in &result.risks {
///         println!("[{}] {}", risk.severity, risk.kind);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    http: reqwest::Client,
    options: ClientOptions,
}

impl AnalysisClient {
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        let http = build_http_client(&options)?;
        Ok(Self { http, options })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let req = authorize(self.http.post(url), &self.options.api_key);
        add_extra_headers(req, &self.options.extra_headers)
    }

    /// Like [`Self::post`], with the configured timeout as overall deadline.
    fn post_bounded(&self, url: &str) -> reqwest::RequestBuilder {
        let req = self.post(url);
        match self.options.timeout {
            Some(timeout) => req.timeout(timeout),
            None => req,
        }
    }

    async fn post_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Value, ClientError> {
        debug!("POST {}", url);
        let response = self
            .post_bounded(url)
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(error_from_response(status, &body));
        }

        let value: Value = serde_json::from_str(&body)?;
        match backend_failure(&value) {
            Some(err) => Err(err),
            None => Ok(value),
        }
    }

    /// Upload a document and return its extracted text.
    ///
    /// Documents over the configured limit are rejected before anything is
    /// sent.
    pub async fn ingest(&self, filename: &str, bytes: Vec<u8>) -> Result<IngestedDocument, ClientError> {
        let size = bytes.len() as u64;
        if size > self.options.max_upload_bytes {
            return Err(ClientError::FileTooLarge {
                size,
                limit: self.options.max_upload_bytes,
            });
        }

        let url = self.options.endpoints.ingest_url();
        info!("Uploading {} ({} bytes)", filename, size);

        let form = Form::new().part("file", Part::bytes(bytes).file_name(filename.to_string()));
        let response = self.post_bounded(&url).multipart(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(error_from_response(status, &body));
        }

        let ingest: IngestResponse = serde_json::from_str(&body)?;
        let document = IngestedDocument::from(ingest);
        debug!("Ingested {} chars in {} chunks", document.text.len(), document.chunk_count);
        Ok(document)
    }

    /// Upload a file from disk. The size is checked before the file is read.
    pub async fn ingest_path(&self, path: impl AsRef<Path>) -> Result<IngestedDocument, ClientError> {
        let path = path.as_ref();
        let size = tokio::fs::metadata(path).await?.len();
        if size > self.options.max_upload_bytes {
            return Err(ClientError::FileTooLarge {
                size,
                limit: self.options.max_upload_bytes,
            });
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let bytes = tokio::fs::read(path).await?;
        self.ingest(&filename, bytes).await
    }

    /// Run a single-shot analysis and normalize the answer.
    ///
    /// `full` and `risk` go to the full-analysis endpoint and carry risk
    /// findings; every other task goes to inference.
    pub async fn analyze(
        &self,
        text: &str,
        task: Task,
        language: Option<&str>,
    ) -> Result<AnalysisResult, ClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::Config("no text to analyze".to_string()));
        }

        let body = if task.uses_full_analysis() {
            let url = self.options.endpoints.full_analysis_url();
            self.post_json(&url, &json!({ "text": text })).await?
        } else {
            let url = self.options.endpoints.inference_url();
            let mut request = AnalysisRequest::new(text).with_task(task);
            request.language = language.map(str::to_string);
            self.post_json(&url, &request).await?
        };

        let payload: AnalysisPayload = serde_json::from_value(body)?;
        let result = payload.normalize(task);
        info!("Analysis ({}) complete with {} risks", task, result.risks.len());
        Ok(result)
    }
}

#[async_trait]
impl StreamTransport for AnalysisClient {
    async fn open_stream(&self, request: &AnalysisRequest) -> Result<ByteStream, ClientError> {
        let url = self.options.endpoints.stream_url();
        debug!("Opening stream {}", url);

        let response = self
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, EVENT_STREAM)
            .json(request)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!("Could not read {} error body: {}", status, e);
                    String::new()
                }
            };
            return Err(error_from_response(status, &body));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ClientError::from))
            .boxed())
    }
}
