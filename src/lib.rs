//! # plainclause - client for a legal document analysis backend
//!
//! Sends documents to a remote analysis service and renders what comes back:
//! a plain-language rewrite, an optional summary and a list of flagged risk
//! clauses that can be located in the original text.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Incremental Server-Sent Events decoding, robust to arbitrary chunking
//! - Cancellable streaming sessions with at most one active at a time
//! - Normalization of every response shape the backend produces
//! - Render model independent of any particular front end
//!
//! ## Architecture
//!
//! - **`sse`**: turns a byte stream into `(event, data)` frames
//! - **`session`**: owns one streaming request and dispatches token frames
//! - **`render`**: keeps the displayed output, summary, risks and source
//! - **`api`**: HTTP client for ingest, inference, full analysis and streaming
//!
//! ## Example
//! ```no_run
//! use std::sync::{Arc, Mutex};
//!
//! use plainclause::api::AnalysisClient;
//! use plainclause::model::{AnalysisRequest, Task};
//! use plainclause::options::ClientOptions;
//! use plainclause::render::ResultRenderer;
//! use plainclause::session::{StreamConfig, StreamSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(AnalysisClient::new(ClientOptions::from_env()?)?);
//!     let renderer = Arc::new(Mutex::new(ResultRenderer::new()));
//!
//!     let request = AnalysisRequest::new("The lessee waives all claims...").with_task(Task::Simplify);
//!     let mut session = StreamSession::start(client, request, StreamConfig::default(), renderer.clone());
//!     session.wait().await;
//!
//!     println!("{}", renderer.lock().unwrap().view().plain_language);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod http;
pub mod model;
pub mod options;
pub mod render;
pub mod session;
pub mod sse;

// Re-exports for convenience
pub use api::AnalysisClient;
pub use client::{ClientError, Notice, NoticeKind, StreamTransport};
pub use model::{AnalysisRequest, AnalysisResult, RiskFinding, Severity, StreamFrame, Task};
pub use render::{DocumentView, ResultRenderer};
pub use session::{SessionHandle, SessionOutcome, SessionState, StreamController, StreamSession};
