use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub mod error;
pub mod types;

pub use error::{ErrorKind, StageError};
pub use types::{
    CheckStatus, DecisionPayload, Delivery, InboundRecord, OutboundRecord, PaymentPayload,
    RecordHeader, ScaledAmount,
};

// ════════════════════════════════════════════════════════════════
//  Pipeline boundary traits
// ════════════════════════════════════════════════════════════════

/// Источник записей входного topic'а с ручным подтверждением offset'ов.
///
/// Реализации: Kafka consumer (pipeline crate), in-memory source в тестах.
pub trait RecordSource: Send + Sync {
    /// Дождаться следующей записи не дольше `timeout`.
    /// `Ok(None)` если за отведённое время записей не было.
    fn poll(
        &self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<InboundRecord>, StageError>> + Send + '_>>;

    /// Отметить запись обработанной (commit offset + 1 её partition'а).
    fn commit<'a>(
        &'a self,
        record: &'a InboundRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + 'a>>;
}

/// Получатель решений: публикует запись и ждёт подтверждения доставки.
pub trait RecordSink: Send + Sync {
    fn produce(
        &self,
        record: OutboundRecord,
    ) -> Pin<Box<dyn Future<Output = Result<Delivery, StageError>> + Send + '_>>;

    /// Дослать буферизованные записи (при graceful shutdown).
    fn flush(&self, timeout: Duration)
        -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>>;
}

/// Side-channel для записей, которые не удалось обработать.
///
/// Best-effort: вызывающий логирует ошибку и продолжает работу.
pub trait ErrorReporter: Send + Sync {
    fn report<'a>(
        &'a self,
        record: &'a InboundRecord,
        message: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + 'a>>;
}

/// Текущее Unix-время в миллисекундах.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
