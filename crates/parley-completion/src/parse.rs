// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model reply parsing.
//!
//! Models are asked to answer with `{"Stage": "...", "Response": [...]}` but
//! routinely wrap it in code fences, fall back to a `Stage: / Response:`
//! free-text layout, or nest a second fenced envelope inside the first part.
//! [`ReplyParser`] runs an ordered chain of [`ReplyStrategy`] implementations
//! and the first one that yields a decode wins. The last strategy treats the
//! whole reply as plain text, so only an empty reply fails to parse.

use std::str::FromStr;
use std::sync::LazyLock;

use parley_core::types::MediaKind;
use parley_core::ParleyError;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

/// Marker value that joins consecutive text parts into one outbound message.
pub const GROUP_MARKER: &str = "onemessage";

static LEGACY_STAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?im)^\s*"?stage"?\s*:\s*"?([^"\r\n]*?)"?\s*,?\s*$"#)
        .expect("stage pattern is valid")
});

/// Matches up to and including the array's opening bracket.
static LEGACY_RESPONSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"?response"?\s*:\s*\["#).expect("response pattern is valid")
});

/// One element of the `Response` array as the model wrote it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawPart {
    #[serde(default, rename = "type", alias = "Type")]
    pub kind: Option<String>,
    #[serde(default, alias = "Content")]
    pub content: Option<Value>,
    #[serde(default, rename = "Jenis", alias = "jenis", alias = "group")]
    pub group: Option<String>,
}

impl RawPart {
    fn text(content: &str) -> Self {
        Self {
            kind: Some("text".into()),
            content: Some(Value::String(content.to_string())),
            group: None,
        }
    }

    fn content_text(&self) -> Option<String> {
        match self.content.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    #[serde(default, rename = "Stage", alias = "stage")]
    stage: Option<String>,
    #[serde(rename = "Response", alias = "response")]
    response: Vec<RawPart>,
}

/// Output of a single strategy, before part validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub stage: Option<String>,
    pub parts: Vec<RawPart>,
}

/// A validated response part ready for grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPart {
    pub kind: MediaKind,
    pub content: String,
    pub grouped: bool,
}

/// The parsed model reply.
#[derive(Debug)]
pub struct CompletionReply {
    pub stage: Option<String>,
    pub parts: Vec<ReplyPart>,
    /// Parts that were dropped, as `InvalidResponsePart` errors.
    pub rejected: Vec<ParleyError>,
    /// Name of the strategy that produced this reply.
    pub strategy: &'static str,
}

/// A single way of reading a model reply.
pub trait ReplyStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `None` to hand the reply to the next strategy.
    fn try_parse(&self, raw: &str) -> Option<Decoded>;
}

/// Decodes the reply as a JSON envelope as-is.
pub struct DirectDecode;

/// Strips a surrounding code fence, then decodes.
pub struct FenceStrip;

/// Extracts `Stage:` and `Response: [...]` from free text.
pub struct LegacyFreeText;

/// Unwraps a fenced envelope carried inside the first part's content.
pub struct NestedEnvelope;

/// Treats the entire reply as one plain-text part.
pub struct PlainText {
    pub stage_label: String,
}

impl ReplyStrategy for DirectDecode {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn try_parse(&self, raw: &str) -> Option<Decoded> {
        decode_envelope(raw).filter(|d| !has_nested_envelope(d))
    }
}

impl ReplyStrategy for FenceStrip {
    fn name(&self) -> &'static str {
        "fence_strip"
    }

    fn try_parse(&self, raw: &str) -> Option<Decoded> {
        strip_fence(raw)
            .and_then(decode_envelope)
            .filter(|d| !has_nested_envelope(d))
    }
}

impl ReplyStrategy for LegacyFreeText {
    fn name(&self) -> &'static str {
        "legacy_free_text"
    }

    fn try_parse(&self, raw: &str) -> Option<Decoded> {
        extract_legacy(raw).filter(|d| !has_nested_envelope(d))
    }
}

impl ReplyStrategy for NestedEnvelope {
    fn name(&self) -> &'static str {
        "nested_envelope"
    }

    fn try_parse(&self, raw: &str) -> Option<Decoded> {
        let outer = decode_envelope(raw)
            .or_else(|| strip_fence(raw).and_then(decode_envelope))
            .or_else(|| extract_legacy(raw))?;

        let (first, rest) = outer.parts.split_first()?;
        let content = first.content_text()?;
        let inner_src = fenced_json(&content)?;

        let (stage, mut parts) = match decode_envelope(inner_src) {
            Some(inner) => (inner.stage.or(outer.stage), inner.parts),
            None => (
                outer.stage,
                serde_json::from_str::<Vec<RawPart>>(inner_src).ok()?,
            ),
        };
        parts.extend(rest.iter().cloned());
        Some(Decoded { stage, parts })
    }
}

impl ReplyStrategy for PlainText {
    fn name(&self) -> &'static str {
        "plain_text"
    }

    fn try_parse(&self, raw: &str) -> Option<Decoded> {
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }
        Some(Decoded {
            stage: Some(self.stage_label.clone()),
            parts: vec![RawPart::text(text)],
        })
    }
}

/// Ordered chain of reply strategies.
pub struct ReplyParser {
    strategies: Vec<Box<dyn ReplyStrategy>>,
}

impl ReplyParser {
    /// The standard chain, falling back to plain text under `first_stage_label`.
    pub fn new(first_stage_label: impl Into<String>) -> Self {
        Self::with_strategies(vec![
            Box::new(DirectDecode),
            Box::new(FenceStrip),
            Box::new(LegacyFreeText),
            Box::new(NestedEnvelope),
            Box::new(PlainText {
                stage_label: first_stage_label.into(),
            }),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ReplyStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn parse(&self, raw: &str) -> Result<CompletionReply, ParleyError> {
        for strategy in &self.strategies {
            let Some(decoded) = strategy.try_parse(raw) else {
                continue;
            };
            tracing::debug!(strategy = strategy.name(), parts = decoded.parts.len(), "reply decoded");
            return Ok(finish(decoded, strategy.name()));
        }
        Err(ParleyError::ResponseParseFailed {
            message: if raw.trim().is_empty() {
                "model returned an empty reply".into()
            } else {
                format!("no strategy could read reply of {} bytes", raw.len())
            },
        })
    }
}

fn finish(decoded: Decoded, strategy: &'static str) -> CompletionReply {
    let mut parts = Vec::with_capacity(decoded.parts.len());
    let mut rejected = Vec::new();
    for (index, raw) in decoded.parts.into_iter().enumerate() {
        match validate_part(index, raw) {
            Ok(part) => parts.push(part),
            Err(e) => rejected.push(e),
        }
    }
    CompletionReply {
        stage: decoded
            .stage
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        parts,
        rejected,
        strategy,
    }
}

fn validate_part(index: usize, raw: RawPart) -> Result<ReplyPart, ParleyError> {
    let content = raw
        .content_text()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ParleyError::InvalidResponsePart {
            index,
            reason: "missing content".into(),
        })?;

    let kind = match raw.kind.as_deref().map(str::trim) {
        None | Some("") => MediaKind::Text,
        Some(name) => MediaKind::from_str(&name.to_ascii_lowercase()).map_err(|_| {
            ParleyError::InvalidResponsePart {
                index,
                reason: format!("unknown part type `{name}`"),
            }
        })?,
    };

    let grouped = kind == MediaKind::Text
        && raw
            .group
            .as_deref()
            .is_some_and(|g| g.trim().eq_ignore_ascii_case(GROUP_MARKER));

    Ok(ReplyPart { kind, content, grouped })
}

fn decode_envelope(src: &str) -> Option<Decoded> {
    let env: Envelope = serde_json::from_str(src.trim()).ok()?;
    Some(Decoded {
        stage: env.stage,
        parts: env.response,
    })
}

/// Body of a ```-fenced block, or `None` when `src` is not fenced.
fn strip_fence(src: &str) -> Option<&str> {
    let body = src.trim().strip_prefix("```")?;
    // Drop the info string (`json`, `JSON`, ...) up to the first newline.
    let body = match body.find('\n') {
        Some(pos) => &body[pos + 1..],
        None => body.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    let body = body.trim_end();
    Some(body.strip_suffix("```").unwrap_or(body).trim())
}

fn fenced_json(content: &str) -> Option<&str> {
    strip_fence(content).filter(|body| body.starts_with('{') || body.starts_with('['))
}

fn has_nested_envelope(decoded: &Decoded) -> bool {
    decoded
        .parts
        .first()
        .and_then(RawPart::content_text)
        .is_some_and(|c| fenced_json(&c).is_some())
}

/// Decodes the JSON array at the start of `src`, ignoring whatever follows it.
fn leading_array(src: &str) -> Option<Vec<RawPart>> {
    serde_json::Deserializer::from_str(src)
        .into_iter::<Vec<RawPart>>()
        .next()?
        .ok()
}

fn extract_legacy(raw: &str) -> Option<Decoded> {
    let parts = LEGACY_RESPONSE
        .find_iter(raw)
        .find_map(|m| leading_array(&raw[m.end() - 1..]))?;
    let stage = LEGACY_STAGE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    Some(Decoded { stage, parts })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ReplyParser {
        ReplyParser::new("First Stage")
    }

    #[test]
    fn direct_envelope() {
        let raw = r#"{"Stage":"Greeting","Response":[{"type":"text","content":"Hello!"}]}"#;
        let reply = parser().parse(raw).unwrap();
        assert_eq!(reply.strategy, "direct");
        assert_eq!(reply.stage.as_deref(), Some("Greeting"));
        assert_eq!(reply.parts.len(), 1);
        assert_eq!(reply.parts[0].content, "Hello!");
        assert!(!reply.parts[0].grouped);
    }

    #[test]
    fn lowercase_keys_and_group_marker() {
        let raw = r#"{"stage":"Offer","response":[
            {"type":"text","content":"a","Jenis":"onemessage"},
            {"type":"text","content":"b","jenis":"OneMessage"},
            {"type":"image","content":"https://cdn/x.jpg","Jenis":"onemessage"}
        ]}"#;
        let reply = parser().parse(raw).unwrap();
        assert_eq!(reply.stage.as_deref(), Some("Offer"));
        assert!(reply.parts[0].grouped);
        assert!(reply.parts[1].grouped);
        // Only text parts take part in grouping.
        assert_eq!(reply.parts[2].kind, MediaKind::Image);
        assert!(!reply.parts[2].grouped);
    }

    #[test]
    fn fenced_envelope() {
        let raw = "```json\n{\"Stage\":\"Close\",\"Response\":[{\"type\":\"text\",\"content\":\"Bye\"}]}\n```";
        let reply = parser().parse(raw).unwrap();
        assert_eq!(reply.strategy, "fence_strip");
        assert_eq!(reply.stage.as_deref(), Some("Close"));
        assert_eq!(reply.parts[0].content, "Bye");
    }

    #[test]
    fn legacy_free_text() {
        let raw = "Stage: Foo\nResponse: [{\"type\":\"text\",\"content\":\"hi\"}]";
        let reply = parser().parse(raw).unwrap();
        assert_eq!(reply.strategy, "legacy_free_text");
        assert_eq!(reply.stage.as_deref(), Some("Foo"));
        assert_eq!(reply.parts.len(), 1);
        assert_eq!(reply.parts[0].kind, MediaKind::Text);
        assert_eq!(reply.parts[0].content, "hi");
    }

    #[test]
    fn legacy_with_preamble_and_quoted_stage() {
        let raw = "Sure, here you go.\n\"Stage\": \"Follow Up\",\n\"Response\": [{\"type\":\"text\",\"content\":\"ok\"}]\nThanks";
        let reply = parser().parse(raw).unwrap();
        assert_eq!(reply.stage.as_deref(), Some("Follow Up"));
        assert_eq!(reply.parts[0].content, "ok");
    }

    #[test]
    fn legacy_array_ends_at_its_own_bracket() {
        let raw = "Stage: Foo\nResponse: [{\"type\":\"text\",\"content\":\"see [1]\"}]\nNotes: sizes [S, M, L] in stock";
        let reply = parser().parse(raw).unwrap();
        assert_eq!(reply.strategy, "legacy_free_text");
        assert_eq!(reply.stage.as_deref(), Some("Foo"));
        assert_eq!(reply.parts.len(), 1);
        assert_eq!(reply.parts[0].content, "see [1]");
    }

    #[test]
    fn nested_fenced_envelope_is_unwrapped() {
        let inner = "```json\n{\"Stage\":\"Inner\",\"Response\":[{\"type\":\"text\",\"content\":\"real\"}]}\n```";
        let raw = serde_json::json!({
            "Stage": "Outer",
            "Response": [{"type": "text", "content": inner}]
        })
        .to_string();

        let reply = parser().parse(&raw).unwrap();
        assert_eq!(reply.strategy, "nested_envelope");
        assert_eq!(reply.stage.as_deref(), Some("Inner"));
        assert_eq!(reply.parts.len(), 1);
        assert_eq!(reply.parts[0].content, "real");
    }

    #[test]
    fn plain_text_fallback_uses_first_stage() {
        let reply = parser().parse("  Just a normal sentence.  ").unwrap();
        assert_eq!(reply.strategy, "plain_text");
        assert_eq!(reply.stage.as_deref(), Some("First Stage"));
        assert_eq!(reply.parts[0].content, "Just a normal sentence.");
    }

    #[test]
    fn empty_reply_fails() {
        let err = parser().parse(" \n ").unwrap_err();
        assert_eq!(err.kind(), "response_parse_failed");
    }

    #[test]
    fn chain_without_fallback_fails_on_prose() {
        let parser = ReplyParser::with_strategies(vec![Box::new(DirectDecode), Box::new(FenceStrip)]);
        assert!(parser.parse("no json here").is_err());
    }

    #[test]
    fn invalid_parts_are_rejected_individually() {
        let raw = r#"{"Stage":"S","Response":[
            {"type":"text"},
            {"type":"sticker","content":"x"},
            {"type":"text","content":"kept"}
        ]}"#;
        let reply = parser().parse(raw).unwrap();
        assert_eq!(reply.parts.len(), 1);
        assert_eq!(reply.parts[0].content, "kept");
        assert_eq!(reply.rejected.len(), 2);
        assert!(matches!(
            reply.rejected[0],
            ParleyError::InvalidResponsePart { index: 0, .. }
        ));
        assert!(matches!(
            reply.rejected[1],
            ParleyError::InvalidResponsePart { index: 1, .. }
        ));
    }

    #[test]
    fn missing_stage_is_none() {
        let raw = r#"{"Response":[{"type":"text","content":"x"}]}"#;
        let reply = parser().parse(raw).unwrap();
        assert!(reply.stage.is_none());
    }

    #[test]
    fn non_string_content_is_stringified() {
        let raw = r#"{"Stage":"S","Response":[{"type":"text","content":42}]}"#;
        let reply = parser().parse(raw).unwrap();
        assert_eq!(reply.parts[0].content, "42");
    }

    #[test]
    fn strip_fence_variants() {
        assert_eq!(strip_fence("```json\n{}\n```"), Some("{}"));
        assert_eq!(strip_fence("```\n[1]\n```"), Some("[1]"));
        assert_eq!(strip_fence("```json{}```"), Some("{}"));
        assert_eq!(strip_fence("{}"), None);
    }
}
