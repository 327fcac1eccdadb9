//! Result rendering.
//!
//! [`ResultRenderer`] maintains a [`DocumentView`]: the plain-language
//! output, the optional summary, the risk list, the source document display
//! and the notices raised along the way. Front ends draw the view; they never
//! mutate it directly.

use std::ops::Range;

use crate::client::{ClientError, Notice, NoticeKind};
use crate::model::{AnalysisResult, RiskFinding, Severity};
use crate::session::{SessionOutcome, TokenSink};

/// One piece of the source display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Highlight(String),
}

/// The source document as currently displayed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceDisplay {
    pub segments: Vec<Segment>,
    /// Index of the segment the view should scroll to.
    pub scroll_to: Option<usize>,
}

impl SourceDisplay {
    fn plain(text: &str) -> Self {
        Self {
            segments: vec![Segment::Text(text.to_string())],
            scroll_to: None,
        }
    }

    /// Text of every highlighted segment, in order.
    pub fn highlights(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Highlight(text) => Some(text.as_str()),
                Segment::Text(_) => None,
            })
            .collect()
    }

    /// The displayed text with segments joined back together.
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Text(text) | Segment::Highlight(text) => text.as_str(),
            })
            .collect()
    }
}

/// A risk finding prepared for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskItem {
    pub title: String,
    pub severity: Severity,
    /// Lower-cased severity, used as the badge label and display class.
    pub badge: String,
    pub explanation: String,
    pub suggested_action: Option<String>,
    pub excerpt: Option<String>,
}

impl From<&RiskFinding> for RiskItem {
    fn from(finding: &RiskFinding) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        RiskItem {
            title: non_empty(&finding.kind).unwrap_or_else(|| "Risk".to_string()),
            severity: finding.severity,
            badge: finding.severity.as_str().to_lowercase(),
            explanation: finding.explanation.clone(),
            suggested_action: non_empty(&finding.suggested_action),
            excerpt: non_empty(&finding.clause_excerpt),
        }
    }
}

/// Everything a front end needs to draw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentView {
    pub plain_language: String,
    pub summary: Option<String>,
    pub risks: Vec<RiskItem>,
    pub source: SourceDisplay,
    pub notices: Vec<Notice>,
}

/// Renders streamed tokens and full analysis results into a [`DocumentView`].
///
/// # Example
/// ```
/// use plainclause::render::ResultRenderer;
///
/// let mut renderer = ResultRenderer::new();
/// renderer.set_source("Payments are final. See refund policy for details.");
/// let found = renderer.locate_excerpt("refund policy", "Payments are final. See refund policy for details.");
/// assert_eq!(found, Some(24..37));
/// assert_eq!(renderer.view().source.highlights(), vec!["refund policy"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResultRenderer {
    view: DocumentView,
    /// Source text the current risk list was rendered against.
    risk_source: String,
}

impl ResultRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> &DocumentView {
        &self.view
    }

    /// Show `text` as the source document, without highlights.
    pub fn set_source(&mut self, text: &str) {
        self.view.source = SourceDisplay::plain(text);
    }

    /// Append a streamed token to the plain-language output.
    pub fn render_incremental_token(&mut self, text: &str) {
        self.view.plain_language.push_str(text);
    }

    /// Replace output, summary and risk list with `result`.
    ///
    /// Risk items locate their excerpt in `source_text` when activated.
    pub fn render_full_result(&mut self, result: &AnalysisResult, source_text: &str) {
        self.view.plain_language = result.plain_language.trim().to_string();
        self.view.summary = result.summary.clone().filter(|s| !s.is_empty());
        self.view.risks = result.risks.iter().map(RiskItem::from).collect();
        self.risk_source = source_text.to_string();
    }

    /// Click handler of a risk item: locate its excerpt in the source the
    /// list was rendered against. Items without an excerpt do nothing.
    pub fn activate_risk(&mut self, index: usize) -> Option<Range<usize>> {
        let excerpt = self.view.risks.get(index)?.excerpt.clone()?;
        let source = std::mem::take(&mut self.risk_source);
        let found = self.locate_excerpt(&excerpt, &source);
        self.risk_source = source;
        found
    }

    /// Highlight the first literal occurrence of `excerpt` in `source_text`.
    ///
    /// On success the source display becomes exactly three segments (before,
    /// match, after) and scrolls to the match. Otherwise an
    /// [`NoticeKind::ExcerptNotFound`] notice is raised and the display is
    /// left as it was. An empty excerpt is ignored.
    pub fn locate_excerpt(&mut self, excerpt: &str, source_text: &str) -> Option<Range<usize>> {
        if excerpt.is_empty() {
            return None;
        }

        let Some(start) = source_text.find(excerpt) else {
            self.notify(Notice::new(
                NoticeKind::ExcerptNotFound,
                "Excerpt not found in original",
            ));
            return None;
        };
        let end = start + excerpt.len();

        self.view.source = SourceDisplay {
            segments: vec![
                Segment::Text(source_text[..start].to_string()),
                Segment::Highlight(source_text[start..end].to_string()),
                Segment::Text(source_text[end..].to_string()),
            ],
            scroll_to: Some(1),
        };
        Some(start..end)
    }

    /// Highlight every case-insensitive occurrence of `query` in `source_text`.
    ///
    /// An empty query restores the plain source. Returns the number of matches.
    pub fn search(&mut self, query: &str, source_text: &str) -> usize {
        let needle: Vec<char> = query.chars().flat_map(char::to_lowercase).collect();
        if needle.is_empty() {
            self.set_source(source_text);
            return 0;
        }

        let mut segments = Vec::new();
        let mut plain_start = 0;
        let mut cursor = 0;
        let mut matches = 0;

        while cursor < source_text.len() {
            match match_len_ignore_case(&source_text[cursor..], &needle) {
                Some(len) if len > 0 => {
                    if plain_start < cursor {
                        segments.push(Segment::Text(source_text[plain_start..cursor].to_string()));
                    }
                    segments.push(Segment::Highlight(
                        source_text[cursor..cursor + len].to_string(),
                    ));
                    matches += 1;
                    cursor += len;
                    plain_start = cursor;
                }
                _ => {
                    cursor += source_text[cursor..]
                        .chars()
                        .next()
                        .map_or(1, char::len_utf8);
                }
            }
        }
        if plain_start < source_text.len() {
            segments.push(Segment::Text(source_text[plain_start..].to_string()));
        }

        self.view.source = SourceDisplay {
            segments,
            scroll_to: None,
        };
        matches
    }

    pub fn notify(&mut self, notice: Notice) {
        self.view.notices.push(notice);
    }

    /// Report a failed operation.
    pub fn report_error(&mut self, err: &ClientError) {
        self.notify(err.notice());
    }

    /// Hand pending notices to the front end.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.view.notices)
    }
}

/// Byte length of the prefix of `haystack` that equals `needle` (already
/// lower-cased) ignoring case, if there is one ending on a char boundary.
fn match_len_ignore_case(haystack: &str, needle: &[char]) -> Option<usize> {
    let mut matched = 0;
    for (offset, ch) in haystack.char_indices() {
        if matched == needle.len() {
            return Some(offset);
        }
        for lower in ch.to_lowercase() {
            if needle.get(matched) != Some(&lower) {
                return None;
            }
            matched += 1;
        }
    }
    (matched == needle.len()).then_some(haystack.len())
}

impl TokenSink for ResultRenderer {
    fn reset(&mut self) {
        self.view.plain_language.clear();
    }

    fn append_token(&mut self, text: &str) {
        self.render_incremental_token(text);
    }

    fn stream_error(&mut self, message: &str) {
        self.notify(Notice::new(NoticeKind::Failure, message));
    }

    fn finished(&mut self, outcome: &SessionOutcome) {
        match outcome {
            SessionOutcome::Completed => {
                self.notify(Notice::new(NoticeKind::Success, "Stream finished"))
            }
            SessionOutcome::Failed(err) => self.report_error(err),
            SessionOutcome::Cancelled => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "Fees are non-refundable; see refund policy for details.";

    fn result() -> AnalysisResult {
        AnalysisResult {
            summary: Some("Fees are final.".into()),
            plain_language: "  You can't get money back.\n".into(),
            risks: vec![
                RiskFinding {
                    kind: "hidden_fees".into(),
                    severity: Severity::High,
                    clause_excerpt: "refund policy".into(),
                    explanation: "Refunds are restricted.".into(),
                    suggested_action: "Ask for a refund window.".into(),
                },
                RiskFinding {
                    kind: String::new(),
                    severity: Severity::default(),
                    clause_excerpt: "arbitration".into(),
                    explanation: String::new(),
                    suggested_action: String::new(),
                },
                RiskFinding::default(),
            ],
        }
    }

    #[test]
    fn test_incremental_tokens_append_in_order() {
        let mut renderer = ResultRenderer::new();
        renderer.render_incremental_token("A");
        renderer.render_incremental_token("B");
        assert_eq!(renderer.view().plain_language, "AB");
    }

    #[test]
    fn test_full_render_replaces_previous_state() {
        let mut renderer = ResultRenderer::new();
        renderer.render_incremental_token("streamed");
        renderer.render_full_result(&result(), SOURCE);

        let view = renderer.view();
        assert_eq!(view.plain_language, "You can't get money back.");
        assert_eq!(view.summary.as_deref(), Some("Fees are final."));
        assert_eq!(view.risks.len(), 3);
        assert_eq!(view.risks[0].badge, "high");
        assert_eq!(view.risks[0].suggested_action.as_deref(), Some("Ask for a refund window."));
        assert_eq!(view.risks[1].title, "Risk");
        assert_eq!(view.risks[1].badge, "medium");
        assert!(view.risks[2].excerpt.is_none());

        renderer.render_full_result(&AnalysisResult::default(), SOURCE);
        let view = renderer.view();
        assert!(view.plain_language.is_empty());
        assert!(view.summary.is_none());
        assert!(view.risks.is_empty());
    }

    #[test]
    fn test_locate_excerpt_highlights_first_occurrence() {
        let mut renderer = ResultRenderer::new();
        let source = "... see refund policy for details, the refund policy applies";
        let range = renderer.locate_excerpt("refund policy", source).unwrap();
        assert_eq!(range, 8..21);
        assert_eq!(&source[range], "refund policy");

        let display = &renderer.view().source;
        assert_eq!(display.segments.len(), 3);
        assert_eq!(display.highlights(), vec!["refund policy"]);
        assert_eq!(display.segments[0], Segment::Text("... see ".into()));
        assert_eq!(display.scroll_to, Some(1));
        assert_eq!(display.text(), source);
    }

    #[test]
    fn test_locate_excerpt_not_found_leaves_display() {
        let mut renderer = ResultRenderer::new();
        renderer.set_source(SOURCE);
        let before = renderer.view().source.clone();

        assert!(renderer.locate_excerpt("nonexistent", SOURCE).is_none());
        assert_eq!(renderer.view().source, before);

        let notices = renderer.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::ExcerptNotFound);
        assert!(renderer.view().notices.is_empty());
    }

    #[test]
    fn test_locate_excerpt_is_literal() {
        let mut renderer = ResultRenderer::new();
        assert!(renderer.locate_excerpt("Refund Policy", SOURCE).is_none());
        assert!(renderer.locate_excerpt("", SOURCE).is_none());
        assert_eq!(renderer.view().notices.len(), 1);
    }

    #[test]
    fn test_activate_risk_uses_render_source() {
        let mut renderer = ResultRenderer::new();
        renderer.render_full_result(&result(), SOURCE);

        assert_eq!(renderer.activate_risk(0), Some(29..42));
        assert_eq!(renderer.view().source.highlights(), vec!["refund policy"]);

        assert!(renderer.activate_risk(1).is_none());
        assert_eq!(renderer.view().notices[0].kind, NoticeKind::ExcerptNotFound);
        assert_eq!(renderer.view().source.highlights(), vec!["refund policy"]);

        // No excerpt, no lookup.
        assert!(renderer.activate_risk(2).is_none());
        assert!(renderer.activate_risk(9).is_none());
        assert_eq!(renderer.view().notices.len(), 1);
    }

    #[test]
    fn test_search_highlights_all_case_insensitive() {
        let mut renderer = ResultRenderer::new();
        let source = "Fee, FEE and fee.";
        assert_eq!(renderer.search("fee", source), 3);

        let display = &renderer.view().source;
        assert_eq!(display.highlights(), vec!["Fee", "FEE", "fee"]);
        assert_eq!(display.text(), source);

        assert_eq!(renderer.search("", source), 0);
        assert_eq!(renderer.view().source.segments, vec![Segment::Text(source.into())]);
    }

    #[test]
    fn test_search_handles_multibyte_text() {
        let mut renderer = ResultRenderer::new();
        let source = "Ärger über ÄRGER";
        assert_eq!(renderer.search("ärger", source), 2);
        assert_eq!(renderer.view().source.highlights(), vec!["Ärger", "ÄRGER"]);
        assert_eq!(renderer.view().source.text(), source);
    }

    #[test]
    fn test_sink_notices() {
        let mut renderer = ResultRenderer::new();
        renderer.render_incremental_token("old");
        TokenSink::reset(&mut renderer);
        assert!(renderer.view().plain_language.is_empty());

        renderer.stream_error("model overloaded");
        renderer.finished(&SessionOutcome::Cancelled);
        renderer.finished(&SessionOutcome::Failed(ClientError::RateLimited("slow".into())));
        renderer.finished(&SessionOutcome::Completed);

        let kinds: Vec<NoticeKind> = renderer.take_notices().into_iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![NoticeKind::Failure, NoticeKind::RateLimited, NoticeKind::Success]
        );
    }
}
