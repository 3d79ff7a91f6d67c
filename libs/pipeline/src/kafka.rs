use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rdkafka::config::{ClientConfig, RDKafkaLogLevel};
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{ClientContext, Offset, TopicPartitionList};

use sanction_api::{
    Delivery, ErrorKind, InboundRecord, OutboundRecord, RecordHeader, RecordSink, RecordSource,
    StageError,
};

use crate::config::KafkaConfig;
use crate::PipelineError;

// ═══════════════════════════════════════════════════════════════
//  Error classification
// ═══════════════════════════════════════════════════════════════

/// Fatal: клиент не создаётся, все брокеры недоступны, фатальная ошибка
/// librdkafka. Остальное: transient.
pub fn classify(e: &KafkaError) -> ErrorKind {
    match e {
        KafkaError::ClientCreation(_) | KafkaError::ClientConfig(..) => ErrorKind::Fatal,
        _ => match e.rdkafka_error_code() {
            Some(RDKafkaErrorCode::AllBrokersDown | RDKafkaErrorCode::Fatal) => ErrorKind::Fatal,
            _ => ErrorKind::Transient,
        },
    }
}

fn stage_error(op: &str, e: KafkaError) -> StageError {
    StageError::new(classify(&e), format!("{op}: {e}"))
}

// ═══════════════════════════════════════════════════════════════
//  Client context: librdkafka logs → tracing, fatal errors latched
// ═══════════════════════════════════════════════════════════════

/// Клоны делят один слот: producer прячет свой context за обёрткой
/// `FutureProducerContext`, поэтому sink держит собственный клон.
#[derive(Clone, Default)]
struct KafkaContext {
    fatal: Arc<Mutex<Option<String>>>,
}

impl KafkaContext {
    /// Забрать зафиксированную фатальную ошибку клиента (если была).
    fn take_fatal(&self) -> Option<String> {
        self.fatal.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl ClientContext for KafkaContext {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        match level {
            RDKafkaLogLevel::Emerg
            | RDKafkaLogLevel::Alert
            | RDKafkaLogLevel::Critical
            | RDKafkaLogLevel::Error => tracing::error!(facility = fac, "{log_message}"),
            RDKafkaLogLevel::Warning => tracing::warn!(facility = fac, "{log_message}"),
            RDKafkaLogLevel::Notice | RDKafkaLogLevel::Info => {
                tracing::info!(facility = fac, "{log_message}")
            }
            RDKafkaLogLevel::Debug => tracing::debug!(facility = fac, "{log_message}"),
        }
    }

    fn error(&self, error: KafkaError, reason: &str) {
        if classify(&error) == ErrorKind::Fatal {
            tracing::error!(error = %error, reason, "fatal kafka client error");
            if let Ok(mut slot) = self.fatal.lock() {
                slot.get_or_insert_with(|| format!("{error}: {reason}"));
            }
        } else {
            tracing::warn!(error = %error, reason, "kafka client error");
        }
    }
}

impl ConsumerContext for KafkaContext {}

fn client_config(cfg: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client.set("bootstrap.servers", &cfg.bootstrap_servers);
    for (key, value) in &cfg.properties {
        client.set(key, value);
    }
    client
}

// ═══════════════════════════════════════════════════════════════
//  Message conversion
// ═══════════════════════════════════════════════════════════════

pub(crate) fn inbound<M: Message>(msg: &M) -> InboundRecord {
    let headers = msg
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|h| RecordHeader {
                    key: h.key.to_string(),
                    value: h.value.map(<[u8]>::to_vec),
                })
                .collect()
        })
        .unwrap_or_default();

    InboundRecord {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        key: msg.key().map(<[u8]>::to_vec),
        payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        headers,
    }
}

pub(crate) fn owned_headers(headers: &[RecordHeader]) -> OwnedHeaders {
    headers
        .iter()
        .fold(OwnedHeaders::new_with_capacity(headers.len()), |acc, h| {
            acc.insert(Header { key: &h.key, value: h.value.as_deref() })
        })
}

// ═══════════════════════════════════════════════════════════════
//  KafkaSource: manual commits, no auto offset commit
// ═══════════════════════════════════════════════════════════════

pub struct KafkaSource {
    consumer: Arc<StreamConsumer<KafkaContext>>,
}

impl KafkaSource {
    pub fn new(cfg: &KafkaConfig) -> Result<Self, PipelineError> {
        let consumer: StreamConsumer<KafkaContext> = client_config(cfg)
            .set("group.id", &cfg.group_id)
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", cfg.session_timeout_ms.to_string())
            .set("auto.offset.reset", &cfg.auto_offset_reset)
            .create_with_context(KafkaContext::default())
            .map_err(|source| PipelineError::Client { role: "consumer", source })?;
        consumer
            .subscribe(&[cfg.input_topic.as_str()])
            .map_err(|source| PipelineError::Client { role: "consumer", source })?;

        tracing::info!(
            topic = %cfg.input_topic,
            group = %cfg.group_id,
            bootstrap = %cfg.bootstrap_servers,
            "kafka consumer subscribed"
        );
        Ok(Self { consumer: Arc::new(consumer) })
    }
}

impl RecordSource for KafkaSource {
    fn poll(
        &self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<InboundRecord>, StageError>> + Send + '_>> {
        Box::pin(async move {
            if let Some(fatal) = self.consumer.context().take_fatal() {
                return Err(StageError::fatal(fatal));
            }
            match tokio::time::timeout(timeout, self.consumer.recv()).await {
                Err(_) => Ok(None),
                Ok(Ok(msg)) => Ok(Some(inbound(&msg))),
                Ok(Err(e)) => Err(stage_error("poll", e)),
            }
        })
    }

    fn commit<'a>(
        &'a self,
        record: &'a InboundRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + 'a>> {
        Box::pin(async move {
            let mut tpl = TopicPartitionList::new();
            tpl.add_partition_offset(&record.topic, record.partition, Offset::Offset(record.offset + 1))
                .map_err(|e| stage_error("commit", e))?;
            let consumer = Arc::clone(&self.consumer);
            off_runtime("commit", move || consumer.commit(&tpl, CommitMode::Sync)).await
        })
    }
}

/// Блокирующий вызов librdkafka на blocking-пуле tokio.
/// Sync commit держит поток до ответа координатора.
async fn off_runtime<T, F>(stage: &'static str, call: F) -> Result<T, StageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, KafkaError> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| StageError::fatal(format!("{stage} task: {e}")))?
        .map_err(|e| stage_error(stage, e))
}

// ═══════════════════════════════════════════════════════════════
//  KafkaSink: produce and wait for the delivery report
// ═══════════════════════════════════════════════════════════════

pub struct KafkaSink {
    producer: FutureProducer<KafkaContext>,
    context: KafkaContext,
    timeout: Duration,
}

impl KafkaSink {
    pub fn new(cfg: &KafkaConfig) -> Result<Self, PipelineError> {
        let context = KafkaContext::default();
        let producer: FutureProducer<KafkaContext> = client_config(cfg)
            .set("message.timeout.ms", cfg.produce_timeout_ms.to_string())
            .create_with_context(context.clone())
            .map_err(|source| PipelineError::Client { role: "producer", source })?;
        tracing::info!(topic = %cfg.output_topic, "kafka producer created");
        Ok(Self { producer, context, timeout: cfg.produce_timeout() })
    }
}

impl RecordSink for KafkaSink {
    fn produce(
        &self,
        record: OutboundRecord,
    ) -> Pin<Box<dyn Future<Output = Result<Delivery, StageError>> + Send + '_>> {
        Box::pin(async move {
            if let Some(fatal) = self.context.take_fatal() {
                return Err(StageError::fatal(format!("produce: {fatal}")));
            }
            let mut future_record = FutureRecord::<[u8], [u8]>::to(&record.topic)
                .payload(record.payload.as_slice())
                .headers(owned_headers(&record.headers));
            if let Some(key) = &record.key {
                future_record = future_record.key(key.as_slice());
            }
            match self.producer.send(future_record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => Ok(Delivery { partition, offset }),
                Err((e, _)) => Err(stage_error("produce", e)),
            }
        })
    }

    fn flush(
        &self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>> {
        Box::pin(async move {
            self.producer
                .flush(Timeout::After(timeout))
                .map_err(|e| stage_error("flush", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::message::OwnedMessage;
    use rdkafka::Timestamp;

    #[test]
    fn classification() {
        assert_eq!(classify(&KafkaError::ClientCreation("boom".into())), ErrorKind::Fatal);
        assert_eq!(
            classify(&KafkaError::Global(RDKafkaErrorCode::AllBrokersDown)),
            ErrorKind::Fatal
        );
        assert_eq!(
            classify(&KafkaError::MessageConsumption(RDKafkaErrorCode::Fatal)),
            ErrorKind::Fatal
        );
        assert_eq!(
            classify(&KafkaError::MessageConsumption(RDKafkaErrorCode::BrokerTransportFailure)),
            ErrorKind::Transient
        );
        assert_eq!(
            classify(&KafkaError::ConsumerCommit(RDKafkaErrorCode::RebalanceInProgress)),
            ErrorKind::Transient
        );
    }

    #[test]
    fn producer_errors_classification() {
        assert_eq!(
            classify(&KafkaError::MessageProduction(RDKafkaErrorCode::Fatal)),
            ErrorKind::Fatal
        );
        assert_eq!(
            classify(&KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut)),
            ErrorKind::Transient
        );
        let e = stage_error("produce", KafkaError::MessageProduction(RDKafkaErrorCode::AllBrokersDown));
        assert!(e.is_fatal());
        assert!(e.message().starts_with("produce: "), "{e}");
    }

    #[tokio::test]
    async fn latched_fatal_error_fails_produce_before_send() {
        let cfg = KafkaConfig { bootstrap_servers: "127.0.0.1:1".into(), ..Default::default() };
        let sink = KafkaSink::new(&cfg).unwrap();
        sink.context.error(KafkaError::Global(RDKafkaErrorCode::Fatal), "idempotence violated");

        let record = OutboundRecord {
            topic: "update-payments".into(),
            key: None,
            payload: b"x".to_vec(),
            headers: Vec::new(),
        };
        let err = tokio::time::timeout(Duration::from_secs(1), sink.produce(record))
            .await
            .expect("produce must not wait for the broker")
            .unwrap_err();
        assert!(err.is_fatal(), "{err}");
        assert!(err.message().contains("idempotence violated"), "{err}");
    }

    #[tokio::test]
    async fn blocking_call_leaves_runtime_thread() {
        let runtime_thread = std::thread::current().id();
        let worker = off_runtime("commit", || Ok(std::thread::current().id())).await.unwrap();
        assert_ne!(worker, runtime_thread);

        let err = off_runtime::<(), _>("commit", || {
            Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::RebalanceInProgress))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.message().starts_with("commit: "), "{err}");
    }

    #[test]
    fn context_latches_first_fatal_error() {
        let ctx = KafkaContext::default();
        ctx.error(KafkaError::Global(RDKafkaErrorCode::BrokerTransportFailure), "flaky");
        assert!(ctx.take_fatal().is_none());

        ctx.error(KafkaError::Global(RDKafkaErrorCode::AllBrokersDown), "down");
        ctx.error(KafkaError::Global(RDKafkaErrorCode::Fatal), "later");
        let fatal = ctx.take_fatal().unwrap();
        assert!(fatal.ends_with("down"), "{fatal}");
        assert!(ctx.take_fatal().is_none());
    }

    #[test]
    fn message_to_inbound_record() {
        let headers = OwnedHeaders::new()
            .insert(Header { key: "X-B3-TraceId", value: Some("abc") })
            .insert(Header { key: "empty", value: None::<&[u8]> });
        let msg = OwnedMessage::new(
            Some(b"payload".to_vec()),
            Some(b"key-1".to_vec()),
            "payments".into(),
            Timestamp::NotAvailable,
            3,
            41,
            Some(headers),
        );
        let record = inbound(&msg);
        assert_eq!(record.topic, "payments");
        assert_eq!((record.partition, record.offset), (3, 41));
        assert_eq!(record.key.as_deref(), Some(&b"key-1"[..]));
        assert_eq!(record.payload, b"payload");
        assert_eq!(
            record.headers,
            vec![
                RecordHeader { key: "X-B3-TraceId".into(), value: Some(b"abc".to_vec()) },
                RecordHeader { key: "empty".into(), value: None },
            ]
        );
    }

    #[test]
    fn tombstone_has_empty_payload() {
        let msg = OwnedMessage::new(None, None, "payments".into(), Timestamp::NotAvailable, 0, 0, None);
        let record = inbound(&msg);
        assert!(record.payload.is_empty());
        assert!(record.headers.is_empty());
    }

    #[test]
    fn headers_survive_conversion_in_order() {
        let original = vec![
            RecordHeader::new("requestId", "REQ-1"),
            RecordHeader { key: "nullable".into(), value: None },
            RecordHeader::new("requestId", "dup"),
        ];
        let owned = owned_headers(&original);
        let back: Vec<RecordHeader> = owned
            .iter()
            .map(|h| RecordHeader { key: h.key.to_string(), value: h.value.map(<[u8]>::to_vec) })
            .collect();
        assert_eq!(back, original);
    }
}
