/// Category of a stage error. Lets the pipeline loop decide between
/// "log and keep polling", "report and commit" and "stop".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration: permanent, fail at startup.
    Config,
    /// Broker or HTTP I/O that may recover on its own.
    Transient,
    /// Unrecoverable transport failure: the loop must stop.
    Fatal,
    /// Payload could not be decoded/encoded: poison record.
    Format,
    /// Trace linkage headers missing or malformed: poison record.
    Validation,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Transient => f.write_str("transient"),
            ErrorKind::Fatal => f.write_str("fatal"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::Validation => f.write_str("validation"),
        }
    }
}

/// Error type crossing the `RecordSource` / `RecordSink` / `ErrorReporter`
/// boundary.
///
/// Carries an `ErrorKind` and a human-readable message. `From` impls assign
/// the kind automatically so adapters can use `?`.
#[derive(Clone)]
pub struct StageError {
    kind: ErrorKind,
    message: String,
}

impl StageError {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, msg)
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, msg)
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, msg)
    }

    pub fn format_err(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, msg)
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == ErrorKind::Fatal
    }

    /// Prepend context to the message, keeping the kind.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        Self { kind: self.kind, message: format!("{ctx}: {}", self.message) }
    }
}

impl std::fmt::Debug for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StageError {}

impl From<std::io::Error> for StageError {
    fn from(e: std::io::Error) -> Self { Self::transient(e.to_string()) }
}

impl From<serde_json::Error> for StageError {
    fn from(e: serde_json::Error) -> Self { Self::format_err(e.to_string()) }
}
