use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use pipeline::config::{KafkaConfig, PipelineConfig, RegistryConfig, ReporterConfig, ScreeningConfig};
use serde::Deserialize;

use super::error::ServiceError;

pub const DEFAULT_SERVICE_NAME: &str = "sanction-service";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service_name: Option<String>,
    pub log_format: Option<LogFormat>,
    pub kafka: KafkaConfig,
    pub registry: RegistryConfig,
    pub reporter: ReporterConfig,
    pub screening: ScreeningConfig,
}

pub fn load_config(path: &str) -> Result<Config, ServiceError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ServiceError::Config { context: "read", detail: format!("'{path}': {e}") })?;
    toml::from_str(&content)
        .map_err(|e| ServiceError::Config { context: "parse", detail: format!("'{path}': {e}") })
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug, Default)]
pub struct RunArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "config.toml", env = "SANCTION_CONFIG")]
    pub config: String,

    /// Kafka brokers, `host:port[,host:port]`
    #[arg(long, env = "KAFKA_BOOTSTRAP_SERVERS")]
    pub bootstrap_servers: Option<String>,

    /// Consumer group
    #[arg(long, env = "KAFKA_GROUP")]
    pub group: Option<String>,

    /// Входной topic с платежами
    #[arg(long, env = "KAFKA_TOPIC")]
    pub input_topic: Option<String>,

    /// Выходной topic для решений
    #[arg(long, env = "UPDATE_PAYMENT_TOPIC")]
    pub output_topic: Option<String>,

    /// Базовый URL schema registry
    #[arg(long, env = "SCHEMA_REGISTRY_URL")]
    pub registry_url: Option<String>,

    /// Endpoint для отчётов об ошибках (без него ошибки только в лог)
    #[arg(long, env = "ERROR_REPORT_URL")]
    pub error_report_url: Option<String>,

    /// Файл со списком имён для проверки, по одному в строке
    #[arg(long, env = "SCREENING_FILE")]
    pub screening_file: Option<PathBuf>,

    /// `service.name` для spans и метрик
    #[arg(long, env = "SERVICE_NAME")]
    pub service_name: Option<String>,

    #[arg(long, value_enum, env = "LOG_FORMAT")]
    pub log_format: Option<LogFormat>,
}

// ═══════════════════════════════════════════════════════════════
//  Effective: merged config
// ═══════════════════════════════════════════════════════════════

/// Итоговая конфигурация после мержа: defaults < config.toml < env/CLI
#[derive(Debug)]
pub struct Effective {
    pub service_name: String,
    pub log_format: LogFormat,
    pub pipeline: PipelineConfig,
}

impl Effective {
    pub fn new(args: &RunArgs) -> Result<Self, ServiceError> {
        // Отсутствующий файл допустим: всё может прийти из env.
        let cfg = match load_config(&args.config) {
            Ok(c) => c,
            Err(e) => {
                if Path::new(&args.config).exists() {
                    return Err(e);
                }
                Config::default()
            }
        };

        let mut pipeline = PipelineConfig {
            kafka: cfg.kafka,
            registry: cfg.registry,
            reporter: cfg.reporter,
            screening: cfg.screening,
        };
        override_with(&mut pipeline.kafka.bootstrap_servers, &args.bootstrap_servers);
        override_with(&mut pipeline.kafka.group_id, &args.group);
        override_with(&mut pipeline.kafka.input_topic, &args.input_topic);
        override_with(&mut pipeline.kafka.output_topic, &args.output_topic);
        override_with(&mut pipeline.registry.url, &args.registry_url);
        if args.error_report_url.is_some() {
            pipeline.reporter.url = args.error_report_url.clone();
        }
        if args.screening_file.is_some() {
            pipeline.screening.file = args.screening_file.clone();
        }
        pipeline.validate()?;

        let service_name = args
            .service_name
            .clone()
            .or(cfg.service_name)
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.into());
        if service_name.trim().is_empty() {
            return Err(ServiceError::Config { context: "validate", detail: "service_name is empty".into() });
        }

        Ok(Self {
            service_name,
            log_format: args.log_format.or(cfg.log_format).unwrap_or_default(),
            pipeline,
        })
    }
}

fn override_with(target: &mut String, value: &Option<String>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: &str = r#"
        service_name = "screening-eu"
        log_format = "json"

        [kafka]
        bootstrap_servers = "kafka-1:9092"
        group_id = "sanction"
        input_topic = "payments"
        output_topic = "update-payments"
        poll_timeout_ms = 250

        [kafka.properties]
        "security.protocol" = "SASL_SSL"

        [registry]
        url = "http://registry:8081"
        auto_register = false

        [reporter]
        url = "http://errors:8080/api/errors"

        [screening]
        entries = ["Mallory"]
    "#;

    fn args(path: &Path) -> RunArgs {
        RunArgs { config: path.to_string_lossy().into_owned(), ..Default::default() }
    }

    fn write(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn file_values_are_used() {
        let dir = tempfile::tempdir().unwrap();
        let eff = Effective::new(&args(&write(&dir, FILE))).unwrap();

        assert_eq!(eff.service_name, "screening-eu");
        assert_eq!(eff.log_format, LogFormat::Json);
        let k = &eff.pipeline.kafka;
        assert_eq!(k.bootstrap_servers, "kafka-1:9092");
        assert_eq!(k.poll_timeout_ms, 250);
        assert_eq!(k.session_timeout_ms, 6000);
        assert_eq!(k.properties["security.protocol"], "SASL_SSL");
        assert!(!eff.pipeline.registry.auto_register);
        assert_eq!(eff.pipeline.reporter.url.as_deref(), Some("http://errors:8080/api/errors"));
        assert_eq!(eff.pipeline.screening.entries, ["Mallory"]);
    }

    #[test]
    fn cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = args(&write(&dir, FILE));
        a.bootstrap_servers = Some("kafka-2:9092".into());
        a.input_topic = Some("payments-v2".into());
        a.registry_url = Some("https://registry.internal".into());
        a.service_name = Some("screening-us".into());
        a.log_format = Some(LogFormat::Text);

        let eff = Effective::new(&a).unwrap();
        assert_eq!(eff.pipeline.kafka.bootstrap_servers, "kafka-2:9092");
        assert_eq!(eff.pipeline.kafka.input_topic, "payments-v2");
        assert_eq!(eff.pipeline.kafka.group_id, "sanction");
        assert_eq!(eff.pipeline.registry.url, "https://registry.internal");
        assert_eq!(eff.service_name, "screening-us");
        assert_eq!(eff.log_format, LogFormat::Text);
    }

    #[test]
    fn missing_file_falls_back_to_args() {
        let dir = tempfile::tempdir().unwrap();
        let a = RunArgs {
            bootstrap_servers: Some("localhost:9092".into()),
            group: Some("sanction".into()),
            input_topic: Some("payments".into()),
            output_topic: Some("update-payments".into()),
            registry_url: Some("http://localhost:8081".into()),
            ..args(&dir.path().join("absent.toml"))
        };

        let eff = Effective::new(&a).unwrap();
        assert_eq!(eff.service_name, DEFAULT_SERVICE_NAME);
        assert_eq!(eff.log_format, LogFormat::Text);
        assert_eq!(eff.pipeline.kafka.auto_offset_reset, "latest");
        assert!(eff.pipeline.reporter.url.is_none());
    }

    #[test]
    fn missing_required_values_fail() {
        let dir = tempfile::tempdir().unwrap();
        let err = Effective::new(&args(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("kafka.bootstrap_servers"), "{err}");
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Effective::new(&args(&write(&dir, "[kafka\n"))).unwrap_err();
        assert!(matches!(err, ServiceError::Config { context: "parse", .. }), "{err}");
    }

    #[test]
    fn bad_report_url_from_env() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = args(&write(&dir, FILE));
        a.error_report_url = Some("errors:8080".into());
        assert!(Effective::new(&a).is_err());
    }
}
