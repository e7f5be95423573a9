//! Configuration, filesystem layout and logging bootstrap for the top-up client.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, RealtimeSettings, RefreshSettings, DEFAULT_API_BASE_URL, DEFAULT_LOG_LEVEL,
    DEFAULT_WS_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use paths::Paths;
