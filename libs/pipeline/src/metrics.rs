use std::fmt;
use std::time::Duration;

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

/// Итог обработки одной записи.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Решение опубликовано, совпадений нет.
    Passed,
    /// Решение опубликовано, есть совпадение со списком.
    Sanctioned,
    /// Заголовки или payload отклонены, отправлено в error reporter.
    Rejected,
    /// Решение не закодировано или не доставлено.
    DeliveryFailed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Passed => "passed",
            Outcome::Sanctioned => "sanctioned",
            Outcome::Rejected => "rejected",
            Outcome::DeliveryFailed => "delivery_failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct PipelineMetrics {
    duration: Histogram<f64>,
    processed: Counter<u64>,
}

impl PipelineMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            duration: meter
                .f64_histogram("task.duration")
                .with_description("The duration of task execution.")
                .with_unit("s")
                .build(),
            processed: meter
                .u64_counter("records.processed")
                .with_description("Records taken from the input topic, by outcome.")
                .build(),
        }
    }

    pub fn record(&self, outcome: Outcome, elapsed: Duration) {
        let attrs = [KeyValue::new("outcome", outcome.as_str())];
        self.duration.record(elapsed.as_secs_f64(), &attrs);
        self.processed.add(1, &attrs);
    }
}
