pub mod config;
pub mod error;
pub mod kafka;
pub mod metrics;
pub mod reporter;
mod run;

pub use error::PipelineError;
pub use kafka::{KafkaSink, KafkaSource};
pub use metrics::Outcome;
pub use reporter::{HttpErrorReporter, NoopReporter, REPORT_PREFIX};
pub use run::{DecodeRetry, Pipeline, PipelineIo, RunSummary};
