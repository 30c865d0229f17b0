pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod resampler;
pub mod platform {
    pub mod display;
    pub mod headless;
}
pub mod processing {
    pub mod layout;
    pub mod mask;
    pub mod resize;
}
pub mod tasks {
    pub(crate) mod job;
    pub mod debounce;
    pub mod pool;
}

pub use config::ResamplerConfig;
pub use error::Error;
pub use resampler::{DeferredResampler, DeferredResamplerBuilder};
