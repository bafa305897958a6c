//! Errors raised outside the GPU abstraction: window, config and I/O.

use thiserror::Error;

use crate::fatal::FatalError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("window: {0}")]
    Window(String),

    /// The window system could not provide a Vulkan surface.
    #[error("surface: {0}")]
    Surface(String),

    #[error("config: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl Error {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
