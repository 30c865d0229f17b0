use thiserror::Error;

/// Library error type for resampler setup.
///
/// Draw, schedule and job paths never produce this; their failures are
/// carried as data (a missing image, an unset readiness flag).
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML/serde configuration error.
    #[error(transparent)]
    Config(#[from] serde_yaml::Error),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The background worker thread could not be started.
    #[error("failed to spawn resampling worker '{name}': {source}")]
    WorkerSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
