use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sanction_api::{ErrorReporter, InboundRecord, RecordHeader, StageError};
use serde::Serialize;

use crate::PipelineError;

/// Prefix of every reported message.
pub const REPORT_PREFIX: &str = "Processing error: ";

#[derive(Serialize)]
struct ErrorBody<'a> {
    msg: &'a str,
}

/// Record headers as HTTP headers.
///
/// Пропускаются: заголовки без значения, невалидные для HTTP имена/значения
/// и те, что описывают само тело запроса.
pub(crate) fn forwarded_headers(headers: &[RecordHeader]) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for h in headers {
        let Some(value) = &h.value else {
            tracing::debug!(header = %h.key, "header without value not forwarded");
            continue;
        };
        let name = match HeaderName::from_bytes(h.key.as_bytes()) {
            Ok(name) => name,
            Err(_) => {
                tracing::debug!(header = %h.key, "invalid HTTP header name not forwarded");
                continue;
            }
        };
        if name == reqwest::header::CONTENT_TYPE
            || name == reqwest::header::CONTENT_LENGTH
            || name == reqwest::header::HOST
        {
            tracing::debug!(header = %h.key, "body header not forwarded");
            continue;
        }
        match HeaderValue::from_bytes(value) {
            Ok(value) => {
                map.append(name, value);
            }
            Err(_) => tracing::debug!(header = %h.key, "invalid HTTP header value not forwarded"),
        }
    }
    map
}

// ═══════════════════════════════════════════════════════════════
//  HTTP reporter
// ═══════════════════════════════════════════════════════════════

/// POST `{"msg": ...}` with the record's headers; single attempt.
pub struct HttpErrorReporter {
    http: reqwest::Client,
    url: String,
}

impl HttpErrorReporter {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PipelineError::Http)?;
        Ok(Self { http, url: url.to_string() })
    }
}

impl ErrorReporter for HttpErrorReporter {
    fn report<'a>(
        &'a self,
        record: &'a InboundRecord,
        message: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + 'a>> {
        Box::pin(async move {
            let resp = self
                .http
                .post(&self.url)
                .headers(forwarded_headers(&record.headers))
                .json(&ErrorBody { msg: message })
                .send()
                .await
                .map_err(|e| StageError::transient(format!("error report to {}: {e}", self.url)))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(StageError::transient(format!(
                    "error report to {}: status {status}",
                    self.url
                )));
            }
            tracing::debug!(url = %self.url, %status, "error reported");
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  No-op reporter (no URL configured)
// ═══════════════════════════════════════════════════════════════

pub struct NoopReporter;

impl ErrorReporter for NoopReporter {
    fn report<'a>(
        &'a self,
        record: &'a InboundRecord,
        message: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                message,
                "error reporting disabled, message dropped"
            );
            Ok(())
        })
    }
}
