use std::sync::Arc;
use std::time::{Duration, Instant};

use codec_avro::WireCodec;
use opentelemetry::metrics::Meter;
use opentelemetry::trace::Tracer;
use codec_avro::CodecError;
use sanction_api::{
    now_ms, CheckStatus, DecisionPayload, ErrorKind, ErrorReporter, InboundRecord, OutboundRecord,
    PaymentPayload, RecordSink, RecordSource,
};
use screening::ReferenceList;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::KafkaConfig;
use crate::metrics::{Outcome, PipelineMetrics};
use crate::reporter::REPORT_PREFIX;
use crate::PipelineError;

/// Внешние стороны цикла.
pub struct PipelineIo {
    pub source: Arc<dyn RecordSource>,
    pub sink: Arc<dyn RecordSink>,
    pub reporter: Arc<dyn ErrorReporter>,
    pub codec: Arc<WireCodec>,
}

/// Counters returned when the loop stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub consumed: u64,
    pub produced: u64,
    pub reported: u64,
    pub delivery_failures: u64,
    pub committed: u64,
}

/// Повтор decode при временной недоступности schema registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeRetry {
    pub attempts: u32,
    pub backoff: Duration,
}

impl DecodeRetry {
    const MAX_BACKOFF: Duration = Duration::from_secs(5);
}

impl Default for DecodeRetry {
    fn default() -> Self {
        Self { attempts: 5, backoff: Duration::from_millis(200) }
    }
}

enum Decoded {
    Payment(PaymentPayload),
    Rejected(CodecError),
    /// Отмена во время ожидания повтора: запись не коммитится.
    Abandoned,
}

// ═══════════════════════════════════════════════════════════════
//  Pipeline: poll → extract → decode → screen → produce → commit
// ═══════════════════════════════════════════════════════════════

/// Один логический обработчик: записи идут строго последовательно,
/// offset коммитится только после produce или report.
pub struct Pipeline<T> {
    io: PipelineIo,
    references: ReferenceList,
    tracer: T,
    metrics: PipelineMetrics,
    decode_retry: DecodeRetry,
    output_topic: String,
    poll_timeout: Duration,
    flush_timeout: Duration,
}

impl<T> Pipeline<T>
where
    T: Tracer + Send + Sync,
    T::Span: Send + Sync,
{
    pub fn new(
        kafka: &KafkaConfig,
        io: PipelineIo,
        references: ReferenceList,
        tracer: T,
        meter: &Meter,
    ) -> Self {
        Self {
            io,
            references,
            tracer,
            metrics: PipelineMetrics::new(meter),
            decode_retry: DecodeRetry::default(),
            output_topic: kafka.output_topic.clone(),
            poll_timeout: kafka.poll_timeout(),
            flush_timeout: kafka.produce_timeout(),
        }
    }

    pub fn with_decode_retry(mut self, retry: DecodeRetry) -> Self {
        self.decode_retry = retry;
        self
    }

    /// Run until `token` is cancelled or a fatal error occurs.
    ///
    /// Отмена проверяется только перед poll'ом: запись, уже взятая в
    /// обработку, доводится до commit. Producer flush'ится на любом выходе.
    pub async fn run(&self, token: CancellationToken) -> Result<RunSummary, PipelineError> {
        tracing::info!(
            output = %self.output_topic,
            references = self.references.len(),
            "pipeline started"
        );
        let mut summary = RunSummary::default();
        let result = self.poll_loop(&token, &mut summary).await;

        if let Err(e) = self.io.sink.flush(self.flush_timeout).await {
            tracing::warn!(error = %e, "producer flush failed");
        }
        tracing::info!(
            consumed = summary.consumed,
            produced = summary.produced,
            reported = summary.reported,
            delivery_failures = summary.delivery_failures,
            committed = summary.committed,
            "pipeline stopped"
        );
        result.map(|()| summary)
    }

    async fn poll_loop(
        &self,
        token: &CancellationToken,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        loop {
            let polled = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(()),
                polled = self.io.source.poll(self.poll_timeout) => polled,
            };

            let record = match polled {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "poll failed, stopping");
                    return Err(PipelineError::Fatal { stage: "poll", source: e });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "poll failed");
                    continue;
                }
            };

            let span = tracing::info_span!(
                "record",
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                request_id = tracing::field::Empty,
            );
            self.handle(&record, token, summary).instrument(span).await?;
        }
    }

    async fn handle(
        &self,
        record: &InboundRecord,
        token: &CancellationToken,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        let started = Instant::now();
        summary.consumed += 1;

        // Ошибка или отмена до исхода: без commit, запись придёт снова.
        let Some(outcome) = self.process(record, token).await? else {
            tracing::info!("record abandoned on shutdown, not committed");
            return Ok(());
        };
        match outcome {
            Outcome::Passed | Outcome::Sanctioned => summary.produced += 1,
            Outcome::Rejected => summary.reported += 1,
            Outcome::DeliveryFailed => summary.delivery_failures += 1,
        }

        match self.io.source.commit(record).await {
            Ok(()) => summary.committed += 1,
            Err(e) if e.is_fatal() => {
                tracing::error!(error = %e, "commit failed, stopping");
                return Err(PipelineError::Fatal { stage: "commit", source: e });
            }
            Err(e) => tracing::warn!(error = %e, "commit failed"),
        }

        self.metrics.record(outcome, started.elapsed());
        tracing::debug!(%outcome, "record done");
        Ok(())
    }

    async fn process(
        &self,
        record: &InboundRecord,
        token: &CancellationToken,
    ) -> Result<Option<Outcome>, PipelineError> {
        let linkage = match trace_bridge::extract(&record.headers) {
            Ok(linkage) => linkage,
            Err(e) => {
                tracing::warn!(error = %e, "trace linkage rejected");
                self.report(record, &e.to_string()).await;
                return Ok(Some(Outcome::Rejected));
            }
        };
        tracing::Span::current().record("request_id", linkage.correlation_id());
        let span = trace_bridge::start_span(&self.tracer, &linkage, record);

        let payment = match self.decode(record, token).await {
            Ok(Decoded::Payment(payment)) => payment,
            Ok(Decoded::Rejected(e)) => {
                let error = e.to_string();
                tracing::warn!(%error, field = e.field_name(), "payment rejected");
                self.report(record, &error).await;
                span.finish(Outcome::Rejected.as_str(), Some(&error));
                return Ok(Some(Outcome::Rejected));
            }
            Ok(Decoded::Abandoned) => {
                span.finish("abandoned", None);
                return Ok(None);
            }
            Err(e) => {
                span.finish("failed", Some(&e.to_string()));
                return Err(e);
            }
        };

        let verdict = screening::screen(&payment, &self.references);
        tracing::info!(
            payment_id = %payment.request_id,
            total = %payment.total,
            check_failed = verdict.failed,
            "payment screened"
        );
        let outcome = if verdict.failed { Outcome::Sanctioned } else { Outcome::Passed };
        let decision = DecisionPayload {
            payment_id: payment.request_id,
            update_at: now_ms(),
            reason_failed: verdict.reason.map(str::to_string),
            status: CheckStatus::SanctionCheck,
            check_failed: verdict.failed,
        };

        let payload = match self.io.codec.encode(&self.output_topic, &decision).await {
            Ok(payload) => payload,
            Err(e) => {
                let error = e.to_string();
                tracing::error!(%error, "decision encode failed");
                span.finish(Outcome::DeliveryFailed.as_str(), Some(&error));
                return Ok(Some(Outcome::DeliveryFailed));
            }
        };

        let outbound = OutboundRecord {
            topic: self.output_topic.clone(),
            key: record.key.clone(),
            payload,
            headers: record.headers.clone(),
        };
        match self.io.sink.produce(outbound).await {
            Ok(delivery) => {
                tracing::debug!(
                    out_partition = delivery.partition,
                    out_offset = delivery.offset,
                    "decision delivered"
                );
                span.finish(outcome.as_str(), None);
                Ok(Some(outcome))
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(error = %e, "producer failed, stopping");
                span.finish("failed", Some(e.message()));
                Err(PipelineError::Fatal { stage: "produce", source: e })
            }
            Err(e) => {
                tracing::error!(error = %e, "decision delivery failed");
                span.finish(Outcome::DeliveryFailed.as_str(), Some(e.message()));
                Ok(Some(Outcome::DeliveryFailed))
            }
        }
    }

    /// Decode с повтором на transient ошибках registry.
    ///
    /// Format ошибки отклоняют запись сразу. Исчерпанные попытки
    /// останавливают цикл: пропустить декодируемую запись нельзя.
    async fn decode(
        &self,
        record: &InboundRecord,
        token: &CancellationToken,
    ) -> Result<Decoded, PipelineError> {
        let retry = self.decode_retry;
        let mut backoff = retry.backoff;
        let mut attempt = 1;
        loop {
            let e = match self.io.codec.decode(&record.topic, &record.payload).await {
                Ok(payment) => return Ok(Decoded::Payment(payment)),
                Err(e) if e.kind() != ErrorKind::Transient => return Ok(Decoded::Rejected(e)),
                Err(e) => e,
            };
            if attempt >= retry.attempts {
                tracing::error!(error = %e, attempts = attempt, "schema registry unavailable, stopping");
                return Err(PipelineError::Fatal { stage: "decode", source: e.into() });
            }
            tracing::warn!(error = %e, attempt, retry_in = ?backoff, "decode failed, retrying");
            tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(Decoded::Abandoned),
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(DecodeRetry::MAX_BACKOFF);
            attempt += 1;
        }
    }

    /// Best-effort: ошибка репортера только логируется.
    async fn report(&self, record: &InboundRecord, error: &str) {
        let message = format!("{REPORT_PREFIX}{error}");
        if let Err(e) = self.io.reporter.report(record, &message).await {
            tracing::warn!(error = %e, "error report failed");
        }
    }
}
