use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;
use crate::processing::resize::ResizeAlgorithm;

/// Tunables for a [`DeferredResampler`](crate::DeferredResampler).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct ResamplerConfig {
    /// Quiet period after the last resize before a resampling pass runs.
    #[serde(with = "humantime_serde")]
    pub debounce_delay: Duration,
    /// Upper bound on how long teardown waits for a running job.
    #[serde(with = "humantime_serde")]
    pub teardown_timeout: Duration,
    /// Algorithm handed to the resize engine.
    pub algorithm: ResizeAlgorithm,
    /// Name given to the background worker thread.
    pub worker_thread_name: String,
    /// Share one process-wide worker across all resamplers.
    pub shared_worker: bool,
}

impl ResamplerConfig {
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);
    pub const DEFAULT_THREAD_NAME: &'static str = "Image Resampling Thread";

    pub fn from_yaml_str(input: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(input)?)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, Error> {
        let raw = fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.teardown_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "teardown-timeout must be greater than zero".into(),
            ));
        }
        if self.worker_thread_name.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "worker-thread-name must not be blank".into(),
            ));
        }
        Ok(())
    }

    pub fn validated(self) -> Result<Self, Error> {
        self.validate()?;
        Ok(self)
    }
}

impl Default for ResamplerConfig {
    fn default() -> Self {
        Self {
            debounce_delay: Self::DEFAULT_DELAY,
            teardown_timeout: Self::DEFAULT_DELAY,
            algorithm: ResizeAlgorithm::default(),
            worker_thread_name: Self::DEFAULT_THREAD_NAME.to_string(),
            shared_worker: true,
        }
    }
}
