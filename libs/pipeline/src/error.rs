use sanction_api::StageError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("config: {0}")]
    Config(String),

    #[error("kafka client ({role}): {source}")]
    Client {
        role: &'static str,
        #[source]
        source: rdkafka::error::KafkaError,
    },

    #[error("HTTP client: {0}")]
    Http(#[source] reqwest::Error),

    #[error("{0}")]
    ReferenceList(#[from] screening::ReferenceListError),

    #[error("schema registry: {0}")]
    Registry(#[from] codec_avro::RegistryError),

    #[error("fatal error during {stage}: {source}")]
    Fatal {
        stage: &'static str,
        #[source]
        source: StageError,
    },
}
