use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use opentelemetry_sdk::Resource;
use tracing_subscriber::EnvFilter;

use super::config::LogFormat;

const INSTRUMENTATION: &str = "sanction-service";

pub fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

/// SDK providers с `service.name`; ставятся глобально на время работы.
///
/// Exporter'ов нет: spans и метрики живут внутри процесса, подключение
/// коллектора делается добавлением processor/reader в builder'ы.
pub struct Telemetry {
    tracer_provider: TracerProvider,
    meter_provider: SdkMeterProvider,
}

impl Telemetry {
    pub fn install(service_name: &str) -> Self {
        let resource = Resource::new([KeyValue::new("service.name", service_name.to_string())]);
        let tracer_provider = TracerProvider::builder().with_resource(resource.clone()).build();
        let meter_provider = SdkMeterProvider::builder().with_resource(resource).build();

        global::set_tracer_provider(tracer_provider.clone());
        global::set_meter_provider(meter_provider.clone());
        tracing::info!(service = service_name, "telemetry providers installed");
        Self { tracer_provider, meter_provider }
    }

    pub fn tracer(&self) -> Tracer {
        self.tracer_provider.tracer(INSTRUMENTATION)
    }

    pub fn meter(&self) -> opentelemetry::metrics::Meter {
        global::meter(INSTRUMENTATION)
    }

    pub fn shutdown(self) {
        if let Err(e) = self.tracer_provider.shutdown() {
            tracing::warn!(error = %e, "tracer provider shutdown");
        }
        if let Err(e) = self.meter_provider.shutdown() {
            tracing::warn!(error = %e, "meter provider shutdown");
        }
    }
}
