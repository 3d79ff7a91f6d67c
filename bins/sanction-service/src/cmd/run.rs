use std::sync::Arc;

use codec_avro::{HttpSchemaRegistry, WireCodec};
use pipeline::{HttpErrorReporter, KafkaSink, KafkaSource, NoopReporter, Pipeline, PipelineError, PipelineIo};
use sanction_api::ErrorReporter;
use tokio_util::sync::CancellationToken;

use super::config::Effective;
use super::error::ServiceError;
use super::telemetry::Telemetry;

pub async fn run(eff: Effective) -> Result<(), ServiceError> {
    let cfg = &eff.pipeline;
    tracing::info!(
        service = %eff.service_name,
        brokers = %cfg.kafka.bootstrap_servers,
        group = %cfg.kafka.group_id,
        input = %cfg.kafka.input_topic,
        output = %cfg.kafka.output_topic,
        "sanction-service starting"
    );

    // --- Сигналы: ставим до подключения к брокеру ---
    let token = CancellationToken::new();
    let shutdown = shutdown_signal()?;
    let signal_token = token.clone();
    let signal_task = tokio::spawn(async move {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("shutting down...");
                signal_token.cancel();
            }
            _ = signal_token.cancelled() => {}
        }
    });

    // --- Reference list ---
    let references = cfg.screening.load()?;
    if references.is_empty() {
        tracing::warn!("reference list is empty, every payment will pass");
    } else {
        tracing::info!(entries = references.len(), "loaded reference list");
    }

    // --- Schema registry + codec ---
    let registry = HttpSchemaRegistry::new(&cfg.registry.url, cfg.registry.timeout())
        .map_err(PipelineError::from)?;
    let codec = Arc::new(WireCodec::new(Arc::new(registry), cfg.registry.auto_register));
    tracing::info!(url = %cfg.registry.url, auto_register = cfg.registry.auto_register, "schema registry");

    // --- Error reporter ---
    let reporter: Arc<dyn ErrorReporter> = match &cfg.reporter.url {
        Some(url) => {
            tracing::info!(%url, "error reports enabled");
            Arc::new(HttpErrorReporter::new(url, cfg.reporter.timeout())?)
        }
        None => {
            tracing::warn!("no error report URL, errors are only logged");
            Arc::new(NoopReporter)
        }
    };

    // --- Kafka ---
    let source = Arc::new(KafkaSource::new(&cfg.kafka)?);
    let sink = Arc::new(KafkaSink::new(&cfg.kafka)?);

    let telemetry = Telemetry::install(&eff.service_name);
    let worker = Pipeline::new(
        &cfg.kafka,
        PipelineIo { source, sink, reporter, codec },
        references,
        telemetry.tracer(),
        &telemetry.meter(),
    )
    .with_decode_retry(cfg.registry.decode_retry());

    let result = worker.run(token.clone()).await;

    token.cancel();
    let _ = signal_task.await;
    drop(worker);
    telemetry.shutdown();

    let summary = result?;
    tracing::info!(
        consumed = summary.consumed,
        committed = summary.committed,
        "shutdown complete"
    );
    Ok(())
}

/// Future, завершающийся по Ctrl+C или SIGTERM.
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send, std::io::Error> {
    #[cfg(unix)]
    let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    Ok(async move {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
    })
}
