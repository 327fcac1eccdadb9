//! HTTP client utilities shared by every backend call.
//!
//! This module provides client construction, credential headers and the
//! mapping of failed responses onto [`ClientError`].

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::collections::HashMap;

use crate::client::ClientError;
use crate::options::{ClientOptions, SecretString};

/// Header the backend reads the credential from.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Build a configured HTTP client from client options.
///
/// This applies common configuration like timeouts and proxies. The
/// configured timeout bounds connecting and each read, never the whole
/// response, so a long-running event stream is not cut off while data keeps
/// arriving. Single-shot calls add their own overall deadline.
///
/// # Example
/// ```ignore
/// let client = build_http_client(&options)?;
/// ```
pub fn build_http_client(options: &ClientOptions) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder();

    if let Some(timeout) = options.timeout {
        builder = builder.connect_timeout(timeout).read_timeout(timeout);
    }

    if let Some(proxy_url) = &options.proxy {
        if let Ok(proxy) = reqwest::Proxy::all(proxy_url) {
            builder = builder.proxy(proxy);
        }
    }

    builder.build()
}

/// Add extra headers to a request if specified in the options.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

/// Attach the credential, both as `x-api-key` and as a bearer token.
///
/// Without a key the request is left untouched and still sent.
pub fn authorize(request: RequestBuilder, api_key: &Option<SecretString>) -> RequestBuilder {
    match api_key {
        Some(key) => request
            .header(API_KEY_HEADER, key.expose_secret())
            .bearer_auth(key.expose_secret()),
        None => request,
    }
}

/// Human-readable message of an error body.
///
/// Looks at `message`, then `error` (string or `{message}`), then the raw
/// text. Returns `None` when nothing usable is present.
pub fn extract_message(body: &str) -> Option<String> {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => message_from_value(&value),
        Err(_) => {
            let text = body.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
    }
}

fn message_from_value(value: &Value) -> Option<String> {
    let non_empty = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    non_empty(value.get("message"))
        .or_else(|| non_empty(value.get("error")))
        .or_else(|| non_empty(value.get("error").and_then(|e| e.get("message"))))
}

/// Map a non-2xx response onto the error taxonomy.
///
/// 401 and 429 have their own categories whatever the body says.
pub fn error_from_response(status: StatusCode, body: &str) -> ClientError {
    let message = extract_message(body).unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    match status {
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited(message),
        _ => ClientError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

/// Detect a 2xx body that nevertheless reports failure.
pub fn backend_failure(body: &Value) -> Option<ClientError> {
    let not_ok = body.get("ok").and_then(Value::as_bool) == Some(false);
    let has_error = match body.get("error") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(_) => true,
    };

    (not_ok || has_error).then(|| {
        ClientError::Backend(
            message_from_value(body).unwrap_or_else(|| "request failed".to_string()),
        )
    })
}
