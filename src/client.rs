//! Core error taxonomy, user-facing notices and the streaming transport seam.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::model::AnalysisRequest;

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP 401: the credential is missing or was rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// HTTP 429.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Any other non-2xx status, with the server message or `HTTP <status>`.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// A 2xx body that reported failure (`ok: false` or an `error` field).
    #[error("Backend error: {0}")]
    Backend(String),

    /// An `error` event or a failure while reading the event stream.
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("File is {size} bytes, the upload limit is {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// User-facing notice for this error.
    ///
    /// Cancellation is not an error: a cancelled session ends with
    /// [`crate::session::SessionOutcome::Cancelled`] and raises no notice.
    pub fn notice(&self) -> Notice {
        match self {
            ClientError::Unauthorized(_) => {
                Notice::new(NoticeKind::Unauthorized, "Unauthorized (API key?)")
            }
            ClientError::RateLimited(_) => {
                Notice::new(NoticeKind::RateLimited, "Rate limited. Retry later.")
            }
            ClientError::Status { message, .. } => {
                Notice::new(NoticeKind::Failure, message.clone())
            }
            other => Notice::new(NoticeKind::Failure, other.to_string()),
        }
    }
}

/// Category of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    Success,
    Info,
    Unauthorized,
    RateLimited,
    Failure,
    ExcerptNotFound,
}

/// Presentation level of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NoticeLevel {
    Info,
    Success,
    Warn,
    Error,
}

/// A short, non-fatal message for the user (the page's toast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn level(&self) -> NoticeLevel {
        match self.kind {
            NoticeKind::Success => NoticeLevel::Success,
            NoticeKind::Info => NoticeLevel::Info,
            NoticeKind::ExcerptNotFound => NoticeLevel::Warn,
            NoticeKind::Unauthorized | NoticeKind::RateLimited | NoticeKind::Failure => {
                NoticeLevel::Error
            }
        }
    }
}

/// Raw response body of a streaming request.
pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

/// Transport able to open an event stream for an analysis request.
///
/// The HTTP implementation lives in [`crate::api::AnalysisClient`]; tests and
/// embedders can supply any other byte source.
///
/// # Example
/// ```rust,ignore
/// struct Canned(&'static str);
///
/// #[async_trait]
/// impl StreamTransport for Canned {
///     async fn open_stream(&self, _request: &AnalysisRequest) -> Result<ByteStream, ClientError> {
///         Ok(Box::pin(futures::stream::iter(vec![Ok(Bytes::from(self.0))])))
///     }
/// }
/// ```
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Issue the request and return its body once a 2xx status arrived.
    ///
    /// Non-2xx statuses must be reported as errors before any byte of the
    /// body is handed out.
    async fn open_stream(&self, request: &AnalysisRequest) -> Result<ByteStream, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_categories() {
        let notice = ClientError::Unauthorized("Missing API key".into())
            .notice();
        assert_eq!(notice.kind, NoticeKind::Unauthorized);
        assert_eq!(notice.level(), NoticeLevel::Error);

        let notice = ClientError::RateLimited(String::new()).notice();
        assert_eq!(notice.kind, NoticeKind::RateLimited);

        let notice = ClientError::Status {
            status: 500,
            message: "Full-analysis processing error".into(),
        }
        .notice();
        assert_eq!(notice.kind, NoticeKind::Failure);
        assert_eq!(notice.message, "Full-analysis processing error");
    }

    #[test]
    fn test_other_errors_show_their_message() {
        let notice = ClientError::Backend("model offline".into()).notice();
        assert_eq!(notice.kind, NoticeKind::Failure);
        assert_eq!(notice.message, "Backend error: model offline");

        let notice = ClientError::FileTooLarge { size: 30, limit: 20 }.notice();
        assert_eq!(notice.message, "File is 30 bytes, the upload limit is 20 bytes");
    }

    #[test]
    fn test_notice_levels() {
        assert_eq!(
            Notice::new(NoticeKind::ExcerptNotFound, "x").level(),
            NoticeLevel::Warn
        );
        assert_eq!(
            Notice::new(NoticeKind::Success, "x").level(),
            NoticeLevel::Success
        );
    }
}
