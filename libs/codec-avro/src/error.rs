use sanction_api::{ErrorKind, StageError};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("registry request {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("registry returned {status} for {url}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("registry response from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} is not registered")]
    NotFound(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Client(_) => ErrorKind::Config,
            RegistryError::Transport { .. } => ErrorKind::Transient,
            RegistryError::Status { status, .. } if *status >= 500 => ErrorKind::Transient,
            RegistryError::Status { .. } | RegistryError::Body { .. } | RegistryError::NotFound(_) => {
                ErrorKind::Format
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame of {0} bytes is shorter than the 5-byte header")]
    ShortFrame(usize),

    #[error("unexpected magic byte {0:#04x}")]
    MagicByte(u8),

    #[error("schema registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("schema {id} does not parse: {source}")]
    Schema {
        id: u32,
        #[source]
        source: apache_avro::Error,
    },

    #[error("avro decode: {0}")]
    Decode(#[source] apache_avro::Error),

    #[error("avro encode: {0}")]
    Encode(#[source] apache_avro::Error),

    #[error("{0} bytes left after the datum")]
    TrailingBytes(usize),

    #[error("writer schema is not a record")]
    NotRecord,

    #[error("field '{field}': {reason}")]
    Field { field: String, reason: String },
}

impl CodecError {
    pub(crate) fn field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CodecError::Field { field: field.into(), reason: reason.into() }
    }

    /// Имя поля, на котором сломалось декодирование (если известно).
    pub fn field_name(&self) -> Option<&str> {
        match self {
            CodecError::Field { field, .. } => Some(field),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CodecError::Registry(e) => e.kind(),
            _ => ErrorKind::Format,
        }
    }
}

impl From<CodecError> for StageError {
    fn from(e: CodecError) -> Self {
        StageError::new(e.kind(), e.to_string())
    }
}
