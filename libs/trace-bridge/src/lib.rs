//! Trace linkage carried in record headers.
//!
//! The upstream producer attaches B3-style ids plus a request id to every
//! record. [`extract`] turns them into a validated [`TraceLinkage`],
//! [`start_span`] re-establishes the remote parent and opens the child span
//! covering one record's processing.

use opentelemetry::trace::{
    Span, SpanContext, SpanId, SpanKind, Status, TraceContextExt, TraceFlags, TraceId, TraceState,
    Tracer,
};
use opentelemetry::{Context, KeyValue};
use sanction_api::{InboundRecord, RecordHeader, StageError};

pub const TRACE_ID_HEADER: &str = "X-B3-TraceId";
pub const SPAN_ID_HEADER: &str = "X-B3-SpanId";
pub const CORRELATION_ID_HEADER: &str = "requestId";

/// Name of the child span opened per record.
pub const PROCESSING_SPAN: &str = "sanction-check";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkageField {
    TraceId,
    SpanId,
    CorrelationId,
}

impl std::fmt::Display for LinkageField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkageField::TraceId => f.write_str("trace-id"),
            LinkageField::SpanId => f.write_str("span-id"),
            LinkageField::CorrelationId => f.write_str("correlation-id"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkageError {
    #[error("{0} header missing")]
    Missing(LinkageField),

    #[error("{field} header invalid: {reason}")]
    Invalid { field: LinkageField, reason: String },
}

impl LinkageError {
    pub fn field(&self) -> LinkageField {
        match self {
            LinkageError::Missing(field) | LinkageError::Invalid { field, .. } => *field,
        }
    }
}

impl From<LinkageError> for StageError {
    fn from(e: LinkageError) -> Self {
        StageError::validation(e.to_string())
    }
}

/// Fully validated (trace id, span id, correlation id) triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLinkage {
    trace_id: TraceId,
    span_id: SpanId,
    correlation_id: String,
}

impl TraceLinkage {
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Remote, sampled span context of the upstream producer.
    pub fn remote_span_context(&self) -> SpanContext {
        SpanContext::new(
            self.trace_id,
            self.span_id,
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        )
    }

    pub fn parent_context(&self) -> Context {
        Context::new().with_remote_span_context(self.remote_span_context())
    }
}

/// Scan `headers` for the linkage triple.
///
/// Stops as soon as all three are found. A present-but-invalid value fails
/// immediately; partial linkage is never returned.
pub fn extract(headers: &[RecordHeader]) -> Result<TraceLinkage, LinkageError> {
    let mut trace_id = None;
    let mut span_id = None;
    let mut correlation_id = None;

    for header in headers {
        match header.key.as_str() {
            TRACE_ID_HEADER => trace_id = Some(parse_trace_id(header)?),
            SPAN_ID_HEADER => span_id = Some(parse_span_id(header)?),
            CORRELATION_ID_HEADER => correlation_id = Some(parse_correlation_id(header)?),
            _ => continue,
        }
        if trace_id.is_some() && span_id.is_some() && correlation_id.is_some() {
            break;
        }
    }

    Ok(TraceLinkage {
        trace_id: trace_id.ok_or(LinkageError::Missing(LinkageField::TraceId))?,
        span_id: span_id.ok_or(LinkageError::Missing(LinkageField::SpanId))?,
        correlation_id: correlation_id.ok_or(LinkageError::Missing(LinkageField::CorrelationId))?,
    })
}

fn parse_trace_id(header: &RecordHeader) -> Result<TraceId, LinkageError> {
    let field = LinkageField::TraceId;
    let hex = hex_value(header, field, 32)?;
    let id = TraceId::from_hex(hex).map_err(|e| invalid(field, e.to_string()))?;
    if id == TraceId::INVALID {
        return Err(invalid(field, "all-zero id"));
    }
    Ok(id)
}

fn parse_span_id(header: &RecordHeader) -> Result<SpanId, LinkageError> {
    let field = LinkageField::SpanId;
    let hex = hex_value(header, field, 16)?;
    let id = SpanId::from_hex(hex).map_err(|e| invalid(field, e.to_string()))?;
    if id == SpanId::INVALID {
        return Err(invalid(field, "all-zero id"));
    }
    Ok(id)
}

fn parse_correlation_id(header: &RecordHeader) -> Result<String, LinkageError> {
    let field = LinkageField::CorrelationId;
    let value = utf8_value(header, field)?.trim();
    if value.is_empty() {
        return Err(invalid(field, "empty value"));
    }
    Ok(value.to_string())
}

fn hex_value(header: &RecordHeader, field: LinkageField, len: usize) -> Result<&str, LinkageError> {
    let value = utf8_value(header, field)?;
    if value.len() != len {
        return Err(invalid(field, format!("expected {len} hex chars, got {}", value.len())));
    }
    if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid(field, "not a hex string"));
    }
    Ok(value)
}

fn utf8_value(header: &RecordHeader, field: LinkageField) -> Result<&str, LinkageError> {
    let raw = header.value.as_deref().ok_or_else(|| invalid(field, "empty value"))?;
    std::str::from_utf8(raw).map_err(|_| invalid(field, "not UTF-8"))
}

fn invalid(field: LinkageField, reason: impl Into<String>) -> LinkageError {
    LinkageError::Invalid { field, reason: reason.into() }
}

// ═══════════════════════════════════════════════════════════════
//  Processing span
// ═══════════════════════════════════════════════════════════════

/// Child span of the upstream producer, covering one record.
///
/// Ended exactly once: by [`ProcessingSpan::finish`] or, if that never
/// runs, when the guard is dropped.
pub struct ProcessingSpan<S: Span> {
    span: Option<S>,
}

/// Start the per-record child span under the remote parent in `linkage`.
pub fn start_span<T: Tracer>(
    tracer: &T,
    linkage: &TraceLinkage,
    record: &InboundRecord,
) -> ProcessingSpan<T::Span> {
    let span = tracer
        .span_builder(PROCESSING_SPAN)
        .with_kind(SpanKind::Consumer)
        .with_attributes(vec![
            KeyValue::new("request.id", linkage.correlation_id.clone()),
            KeyValue::new("messaging.destination.name", record.topic.clone()),
            KeyValue::new("messaging.kafka.destination.partition", i64::from(record.partition)),
            KeyValue::new("messaging.kafka.message.offset", record.offset),
            KeyValue::new(
                "message",
                format!("sanction-service consuming message for traceID={}", linkage.trace_id),
            ),
        ])
        .start_with_context(tracer, &linkage.parent_context());
    ProcessingSpan { span: Some(span) }
}

impl<S: Span> ProcessingSpan<S> {
    pub fn span_context(&self) -> Option<&SpanContext> {
        self.span.as_ref().map(|s| s.span_context())
    }

    /// Record the outcome and end the span. `error` marks the span failed.
    pub fn finish(mut self, outcome: &'static str, error: Option<&str>) {
        if let Some(mut span) = self.span.take() {
            span.set_attribute(KeyValue::new("outcome", outcome));
            if let Some(msg) = error {
                span.set_status(Status::error(msg.to_string()));
            }
            span.end();
        }
    }
}

impl<S: Span> Drop for ProcessingSpan<S> {
    fn drop(&mut self) {
        if let Some(mut span) = self.span.take() {
            span.end();
        }
    }
}
