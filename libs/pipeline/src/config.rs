use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::{DecodeRetry, PipelineError};

/// Значения `auto.offset.reset`, которые понимает librdkafka.
const OFFSET_RESETS: [&str; 7] = ["smallest", "earliest", "beginning", "largest", "latest", "end", "error"];

// ═══════════════════════════════════════════════════════════════
//  Pipeline Config
// ═══════════════════════════════════════════════════════════════

/// Полная конфигурация цикла. Собирается один раз при старте
/// (TOML + env/CLI в бинаре) и дальше передаётся явно.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub kafka: KafkaConfig,
    pub registry: RegistryConfig,
    pub reporter: ReporterConfig,
    pub screening: ScreeningConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let k = &self.kafka;
        for (name, value) in [
            ("kafka.bootstrap_servers", &k.bootstrap_servers),
            ("kafka.group_id", &k.group_id),
            ("kafka.input_topic", &k.input_topic),
            ("kafka.output_topic", &k.output_topic),
            ("registry.url", &self.registry.url),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::Config(format!("{name} is required")));
            }
        }
        if k.input_topic == k.output_topic {
            return Err(PipelineError::Config(format!(
                "input and output topic are both '{}'",
                k.input_topic
            )));
        }
        if !OFFSET_RESETS.contains(&k.auto_offset_reset.as_str()) {
            return Err(PipelineError::Config(format!(
                "kafka.auto_offset_reset '{}' is not one of {OFFSET_RESETS:?}",
                k.auto_offset_reset
            )));
        }
        if k.poll_timeout_ms == 0 || k.produce_timeout_ms == 0 {
            return Err(PipelineError::Config("kafka timeouts must be positive".into()));
        }
        if self.registry.retry_attempts == 0 {
            return Err(PipelineError::Config("registry.retry_attempts must be at least 1".into()));
        }
        check_url("registry.url", &self.registry.url)?;
        if let Some(url) = &self.reporter.url {
            check_url("reporter.url", url)?;
        }
        Ok(())
    }
}

fn check_url(name: &str, url: &str) -> Result<(), PipelineError> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| PipelineError::Config(format!("{name} '{url}' must be an http(s) URL")))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(PipelineError::Config(format!("{name} '{url}' has no host")));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
//  Kafka
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub group_id: String,
    /// Topic с платежами (Payment).
    pub input_topic: String,
    /// Topic для решений (UpdatePayment).
    pub output_topic: String,
    pub session_timeout_ms: u64,
    pub auto_offset_reset: String,
    pub poll_timeout_ms: u64,
    /// Дедлайн подтверждения доставки одного решения.
    pub produce_timeout_ms: u64,
    /// Дополнительные свойства librdkafka (security.protocol, sasl.*, ...).
    pub properties: BTreeMap<String, String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: String::new(),
            group_id: String::new(),
            input_topic: String::new(),
            output_topic: String::new(),
            session_timeout_ms: 6000,
            auto_offset_reset: "latest".into(),
            poll_timeout_ms: 100,
            produce_timeout_ms: 30_000,
            properties: BTreeMap::new(),
        }
    }
}

impl KafkaConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn produce_timeout(&self) -> Duration {
        Duration::from_millis(self.produce_timeout_ms)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Schema registry / error reporter / screening
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub url: String,
    pub timeout_ms: u64,
    /// Регистрировать встроенную схему решения под `<topic>-value`.
    pub auto_register: bool,
    /// Попыток decode при недоступном registry, после чего цикл останавливается.
    pub retry_attempts: u32,
    /// Первая пауза между попытками, дальше удваивается.
    pub retry_backoff_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let retry = DecodeRetry::default();
        Self {
            url: String::new(),
            timeout_ms: 10_000,
            auto_register: true,
            retry_attempts: retry.attempts,
            retry_backoff_ms: retry.backoff.as_millis() as u64,
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn decode_retry(&self) -> DecodeRetry {
        DecodeRetry {
            attempts: self.retry_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Без URL ошибки только логируются.
    pub url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self { url: None, timeout_ms: 5000 }
    }
}

impl ReporterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    pub entries: Vec<String>,
    pub file: Option<PathBuf>,
}

impl ScreeningConfig {
    pub fn load(&self) -> Result<screening::ReferenceList, PipelineError> {
        let mut list = match &self.file {
            Some(path) => screening::ReferenceList::from_file(path)?,
            None => screening::ReferenceList::default(),
        };
        list.extend(&self.entries);
        Ok(list)
    }
}
