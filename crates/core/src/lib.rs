//! Shared foundations for the ToyBox crates: errors, fatal-error reporting,
//! logging setup, the frame clock and configuration.

pub mod config;
mod error;
mod fatal;
mod logging;
mod timer;

pub use config::{AppConfig, PresentModePreference, RendererConfig, ValidationMode};
pub use error::{Error, Result};
pub use fatal::{FatalError, Location};
pub use logging::{DEFAULT_LOG_FILTER, init_logging, init_logging_with};
pub use timer::{MAX_FRAME_DELTA, Timer};
