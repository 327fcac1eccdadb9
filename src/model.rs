//! Data models for analysis requests, streamed frames and analysis results.
//!
//! The backend answers in several shapes depending on the endpoint and the
//! deployment (wrapped `{ok, result}` envelopes, flat full-analysis objects,
//! a legacy `{overview, plain_language, risks_detected}` object, plain string
//! results). All of them are deserialized into the private wire types below
//! and normalized into a single [`AnalysisResult`] before they reach the
//! renderer.

use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize};

use crate::client::ClientError;

/// Event name used when a frame carries no `event:` line.
pub const DEFAULT_EVENT: &str = "message";

/// One parsed `(event, data)` unit extracted from an event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    /// Event name, `"message"` unless the frame named one.
    pub event: String,
    /// Concatenated payload of every `data:` line of the frame.
    pub data: String,
}

impl StreamFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

/// Severity attached to a flagged clause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    /// Lower-case name, also used as the display class of the badge.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// Case-folding parse. Anything unrecognized is treated as medium.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "low" => Severity::Low,
            "high" => Severity::High,
            _ => Severity::Medium,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn deserialize_severity<'de, D>(deserializer: D) -> Result<Severity, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(Severity::parse).unwrap_or_default())
}

/// Missing and `null` strings both read as empty.
fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A single flagged clause returned by full analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFinding {
    #[serde(rename = "type", default, deserialize_with = "deserialize_text")]
    pub kind: String,

    #[serde(default, deserialize_with = "deserialize_severity")]
    pub severity: Severity,

    /// Literal excerpt of the source document. The risk detector names this
    /// field `excerpt`, the analysis endpoints `clause_excerpt`.
    #[serde(default, alias = "excerpt", deserialize_with = "deserialize_text")]
    pub clause_excerpt: String,

    #[serde(default, deserialize_with = "deserialize_text")]
    pub explanation: String,

    #[serde(default, deserialize_with = "deserialize_text")]
    pub suggested_action: String,
}

/// Canonical analysis result handed to the renderer.
///
/// Streamed sessions only ever assemble `plain_language`; risks arrive
/// exclusively through the single-shot path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub summary: Option<String>,
    pub plain_language: String,
    pub risks: Vec<RiskFinding>,
}

/// Analysis task selectable by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Simplify,
    Summarize,
    Translate,
    Full,
    Risk,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Simplify => "simplify",
            Task::Summarize => "summarize",
            Task::Translate => "translate",
            Task::Full => "full",
            Task::Risk => "risk",
        }
    }

    /// Whether the task is served by the full-analysis endpoint rather than
    /// single-shot inference.
    pub fn uses_full_analysis(&self) -> bool {
        matches!(self, Task::Full | Task::Risk)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simplify" => Ok(Task::Simplify),
            "summarize" => Ok(Task::Summarize),
            "translate" => Ok(Task::Translate),
            "full" => Ok(Task::Full),
            "risk" => Ok(Task::Risk),
            other => Err(ClientError::Config(format!("unknown task: {}", other))),
        }
    }
}

/// JSON body sent to the inference and streaming endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRequest {
    pub text: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl AnalysisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            task: None,
            language: None,
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.task = Some(task);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Text extracted from an uploaded document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestedDocument {
    pub text: String,
    /// Number of chunks the ingest service split the document into.
    pub chunk_count: usize,
}

impl IngestedDocument {
    /// Large documents come back in several chunks; those are better served
    /// by full analysis than by streaming.
    pub fn is_large(&self) -> bool {
        self.chunk_count > 1
    }
}

// --- Wire types ---

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct IngestChunk {
    #[serde(default, deserialize_with = "deserialize_text")]
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct IngestResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    chunks: Option<Vec<IngestChunk>>,
}

impl From<IngestResponse> for IngestedDocument {
    fn from(response: IngestResponse) -> Self {
        let chunks = response.chunks.unwrap_or_default();
        let chunk_count = chunks.len();
        let text = match response.text.filter(|t| !t.is_empty()) {
            Some(text) => text,
            None => chunks.into_iter().map(|c| c.text).join("\n"),
        };

        IngestedDocument { text, chunk_count }
    }
}

/// Rich result object. Field names differ between the full-analysis
/// endpoint (`simplified`, `summary`, `risk`) and the legacy inference shape
/// (`plain_language`, `overview`, `risks_detected`).
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RichResult {
    #[serde(default)]
    simplified: Option<String>,
    #[serde(default)]
    plain_language: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default, alias = "risks", alias = "risks_detected")]
    risk: Option<Vec<RiskFinding>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ResultPayload {
    Text(String),
    Rich(RichResult),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum AnalysisPayload {
    Wrapped {
        #[allow(dead_code)]
        #[serde(default)]
        ok: Option<bool>,
        result: ResultPayload,
    },
    Flat(RichResult),
}

impl AnalysisPayload {
    /// Collapse every accepted response shape into one [`AnalysisResult`].
    ///
    /// A bare string result is a summary for `summarize` and the plain
    /// language output for every other task.
    pub(crate) fn normalize(self, task: Task) -> AnalysisResult {
        let rich = match self {
            AnalysisPayload::Wrapped {
                result: ResultPayload::Text(text),
                ..
            } => {
                return if task == Task::Summarize {
                    AnalysisResult {
                        summary: Some(text),
                        ..Default::default()
                    }
                } else {
                    AnalysisResult {
                        plain_language: text.trim().to_string(),
                        ..Default::default()
                    }
                };
            }
            AnalysisPayload::Wrapped {
                result: ResultPayload::Rich(rich),
                ..
            } => rich,
            AnalysisPayload::Flat(rich) => rich,
        };

        AnalysisResult {
            summary: rich.summary.or(rich.overview).filter(|s| !s.is_empty()),
            plain_language: rich
                .simplified
                .or(rich.plain_language)
                .unwrap_or_default()
                .trim()
                .to_string(),
            risks: rich.risk.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> AnalysisPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_severity_defaults_and_case_folding() {
        let finding: RiskFinding = serde_json::from_value(json!({
            "type": "arbitration",
            "clause_excerpt": "binding arbitration",
        }))
        .unwrap();
        assert_eq!(finding.severity, Severity::Medium);

        let finding: RiskFinding =
            serde_json::from_value(json!({"type": "x", "severity": "HIGH"})).unwrap();
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.severity.as_str(), "high");

        let finding: RiskFinding =
            serde_json::from_value(json!({"type": "x", "severity": null})).unwrap();
        assert_eq!(finding.severity, Severity::Medium);

        assert_eq!(Severity::parse("critical"), Severity::Medium);
    }

    #[test]
    fn test_null_risk_fields_read_as_empty() {
        let result = payload(json!({
            "simplified": "s",
            "risk": [{
                "type": "arbitration",
                "severity": "high",
                "clause_excerpt": null,
                "explanation": null,
                "suggested_action": null,
            }, {
                "type": null,
                "severity": null,
                "excerpt": "binding arbitration",
                "explanation": "x",
            }]
        }))
        .normalize(Task::Full);

        assert_eq!(result.plain_language, "s");
        assert_eq!(result.risks.len(), 2);
        assert_eq!(result.risks[0].kind, "arbitration");
        assert_eq!(result.risks[0].severity, Severity::High);
        assert!(result.risks[0].clause_excerpt.is_empty());
        assert!(result.risks[0].explanation.is_empty());
        assert!(result.risks[0].suggested_action.is_empty());
        assert!(result.risks[1].kind.is_empty());
        assert_eq!(result.risks[1].severity, Severity::Medium);
        assert_eq!(result.risks[1].clause_excerpt, "binding arbitration");
    }

    #[test]
    fn test_risk_excerpt_alias() {
        let finding: RiskFinding = serde_json::from_value(json!({
            "type": "auto_renew",
            "excerpt": "automatic renewal",
            "severity": "medium",
        }))
        .unwrap();
        assert_eq!(finding.clause_excerpt, "automatic renewal");
        assert_eq!(finding.kind, "auto_renew");
    }

    #[test]
    fn test_task_parse() {
        assert_eq!("Full".parse::<Task>().unwrap(), Task::Full);
        assert!("explain".parse::<Task>().is_err());
        assert!(Task::Risk.uses_full_analysis());
        assert!(!Task::Translate.uses_full_analysis());
    }

    #[test]
    fn test_request_serialization_skips_missing_fields() {
        let body = serde_json::to_value(AnalysisRequest::new("hello")).unwrap();
        assert_eq!(body, json!({"text": "hello"}));

        let body = serde_json::to_value(
            AnalysisRequest::new("hello")
                .with_task(Task::Translate)
                .with_language("hi"),
        )
        .unwrap();
        assert_eq!(
            body,
            json!({"text": "hello", "task": "translate", "language": "hi"})
        );
    }

    #[test]
    fn test_ingest_prefers_text_over_chunks() {
        let response: IngestResponse = serde_json::from_value(json!({
            "text": "full text",
            "chunks": [{"text": "a"}, {"text": "b"}],
        }))
        .unwrap();
        let doc = IngestedDocument::from(response);
        assert_eq!(doc.text, "full text");
        assert_eq!(doc.chunk_count, 2);
        assert!(doc.is_large());
    }

    #[test]
    fn test_ingest_joins_chunks() {
        let response: IngestResponse = serde_json::from_value(json!({
            "chunks": [{"id": "c-0", "text": "first"}, {"id": "c-1", "text": "second"}],
        }))
        .unwrap();
        assert_eq!(IngestedDocument::from(response).text, "first\nsecond");

        let response: IngestResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(IngestedDocument::from(response), IngestedDocument::default());
    }

    #[test]
    fn test_normalize_string_result() {
        let result = payload(json!({"ok": true, "task": "summarize", "result": "short"}))
            .normalize(Task::Summarize);
        assert_eq!(result.summary.as_deref(), Some("short"));
        assert!(result.plain_language.is_empty());

        let result = payload(json!({"ok": true, "result": "  plain words \n"}))
            .normalize(Task::Simplify);
        assert_eq!(result.plain_language, "plain words");
        assert!(result.summary.is_none());
    }

    #[test]
    fn test_normalize_full_analysis_shapes() {
        let wrapped = payload(json!({
            "ok": true,
            "mode": "full-analysis",
            "result": {
                "simplified": " simple ",
                "summary": "sum",
                "risk": [{"type": "hidden_fees", "severity": "Medium"}],
            }
        }))
        .normalize(Task::Full);
        assert_eq!(wrapped.plain_language, "simple");
        assert_eq!(wrapped.summary.as_deref(), Some("sum"));
        assert_eq!(wrapped.risks.len(), 1);

        let flat = payload(json!({
            "simplified": "simple",
            "summary": "sum",
            "risk": [{"type": "hidden_fees"}],
        }))
        .normalize(Task::Risk);
        assert_eq!(flat, wrapped);
    }

    #[test]
    fn test_normalize_legacy_shape() {
        let result = payload(json!({
            "overview": "overview text",
            "plain_language": "plain",
            "risks_detected": [{"type": "indemnification", "severity": "high"}],
        }))
        .normalize(Task::Simplify);
        assert_eq!(result.summary.as_deref(), Some("overview text"));
        assert_eq!(result.plain_language, "plain");
        assert_eq!(result.risks[0].severity, Severity::High);
    }
}
