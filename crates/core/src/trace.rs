//! Trace data model shared by collectors, the receiver and consumers.
//!
//! A [`TraceRecord`] is a single finished span. A collection pass produces a
//! [`CollectionResult`]: the ordered spans gathered during that pass.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a span within a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    #[default]
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

/// Outcome code attached to a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCode {
    #[default]
    Unset,
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpanStatus {
    #[serde(default)]
    pub code: StatusCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SpanStatus {
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Error,
            message: Some(message.into()),
        }
    }
}

/// Typed attribute value. Untagged so plain JSON scalars map directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// A single finished span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    pub trace_id: String,
    pub span_id: String,
    /// Absent for root spans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub kind: SpanKind,
    #[serde(default)]
    pub start_time_unix_nano: u64,
    #[serde(default)]
    pub end_time_unix_nano: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub status: SpanStatus,
}

impl TraceRecord {
    pub fn new(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            parent_span_id: None,
            name: name.into(),
            kind: SpanKind::default(),
            start_time_unix_nano: 0,
            end_time_unix_nano: 0,
            attributes: BTreeMap::new(),
            status: SpanStatus::default(),
        }
    }

    pub fn with_parent(mut self, parent_span_id: impl Into<String>) -> Self {
        self.parent_span_id = Some(parent_span_id.into());
        self
    }

    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_times(mut self, start_unix_nano: u64, end_unix_nano: u64) -> Self {
        self.start_time_unix_nano = start_unix_nano;
        self.end_time_unix_nano = end_unix_nano;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_status(mut self, status: SpanStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.status.code == StatusCode::Error
    }

    /// Wall time covered by the span. Zero if the end precedes the start.
    pub fn duration(&self) -> Duration {
        Duration::from_nanos(
            self.end_time_unix_nano
                .saturating_sub(self.start_time_unix_nano),
        )
    }
}

/// The spans gathered by one collection pass, in collection order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionResult {
    /// Sequence number of the tick that triggered the pass.
    pub pass_id: u64,
    pub collected_at: DateTime<Utc>,
    pub records: Vec<TraceRecord>,
}

impl CollectionResult {
    pub fn new(pass_id: u64, collected_at: DateTime<Utc>, records: Vec<TraceRecord>) -> Self {
        Self {
            pass_id,
            collected_at,
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraceRecord> {
        self.records.iter()
    }

    /// Number of spans whose status is an error.
    pub fn error_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_error()).count()
    }

    pub fn into_records(self) -> Vec<TraceRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_span_uses_defaults() {
        let json = r#"{"traceId":"t1","spanId":"s1","name":"GET /"}"#;
        let span: TraceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(span.trace_id, "t1");
        assert!(span.is_root());
        assert_eq!(span.kind, SpanKind::Internal);
        assert_eq!(span.status.code, StatusCode::Unset);
        assert!(span.attributes.is_empty());
    }

    #[test]
    fn parse_span_with_typed_attributes() {
        let json = r#"{
            "traceId": "t1",
            "spanId": "s2",
            "parentSpanId": "s1",
            "name": "query",
            "kind": "client",
            "startTimeUnixNano": 1000,
            "endTimeUnixNano": 4000,
            "attributes": {"db.rows": 12, "db.cached": false, "db.system": "skdb", "ratio": 0.5},
            "status": {"code": "error", "message": "boom"}
        }"#;
        let span: TraceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(span.parent_span_id.as_deref(), Some("s1"));
        assert_eq!(span.kind, SpanKind::Client);
        assert_eq!(span.attributes["db.rows"], AttributeValue::Int(12));
        assert_eq!(span.attributes["db.cached"], AttributeValue::Bool(false));
        assert_eq!(span.attributes["db.system"], AttributeValue::from("skdb"));
        assert_eq!(span.attributes["ratio"], AttributeValue::Float(0.5));
        assert!(span.is_error());
        assert_eq!(span.duration(), Duration::from_nanos(3000));
    }

    #[test]
    fn duration_saturates_when_end_before_start() {
        let span = TraceRecord::new("t", "s", "n").with_times(500, 100);
        assert_eq!(span.duration(), Duration::ZERO);
    }

    #[test]
    fn root_span_omits_parent_when_serialized() {
        let span = TraceRecord::new("t", "s", "n");
        let json = serde_json::to_string(&span).unwrap();
        assert!(!json.contains("parentSpanId"));
        assert!(!json.contains("attributes"));
    }

    #[test]
    fn collection_result_counts_errors() {
        let result = CollectionResult::new(
            7,
            Utc::now(),
            vec![
                TraceRecord::new("t", "a", "ok").with_status(SpanStatus::ok()),
                TraceRecord::new("t", "b", "bad").with_status(SpanStatus::error("x")),
            ],
        );
        assert_eq!(result.len(), 2);
        assert!(!result.is_empty());
        assert_eq!(result.error_count(), 1);
        let names: Vec<_> = result.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["ok", "bad"]);
    }
}
