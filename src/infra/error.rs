use thiserror::Error;

/// Failures raised by the adapters: the Postgres pool, the media root on
/// disk, the tracing subscriber, and settings resolution.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("database: {message}")]
    Database { message: String },
    #[error("configuration: {message}")]
    Configuration { message: String },
    #[error("telemetry setup: {message}")]
    Telemetry { message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl InfraError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry {
            message: message.into(),
        }
    }
}
