//! Structured fatal errors.
//!
//! Setup failures (no usable GPU, no depth format, bad shader module) and
//! resource contract violations (unsupported texture format, mip generation
//! without linear filtering) cannot be recovered from. They all travel as a
//! single [`FatalError`] carrying the source location, the violated condition
//! and a human readable message.
//!
//! Use [`ensure_fatal!`](crate::ensure_fatal) to guard a condition and return
//! early, or [`fatal_error!`](crate::fatal_error) to build the error value
//! directly. Both report through `tracing` at construction.
//!
//! ```
//! use toybox_core::{FatalError, ensure_fatal};
//!
//! fn pick(formats: &[u32]) -> Result<u32, FatalError> {
//!     ensure_fatal!(!formats.is_empty(), "no format candidates");
//!     Ok(formats[0])
//! }
//!
//! let err = pick(&[]).unwrap_err();
//! assert!(err.condition().contains("formats.is_empty()"));
//! ```

use std::fmt;

/// Source position that raised a [`FatalError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub file: &'static str,
    pub line: u32,
}

impl Location {
    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// An unrecoverable failure with its context.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("fatal error at {location}: `{condition}` failed: {message}")]
pub struct FatalError {
    location: Location,
    condition: String,
    message: String,
}

impl FatalError {
    /// Creates a fatal error without reporting it.
    pub fn new(
        location: Location,
        condition: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            location,
            condition: condition.into(),
            message: message.into(),
        }
    }

    /// Creates a fatal error and forwards it to the failure log.
    ///
    /// This is what the macros call.
    pub fn reported(
        location: Location,
        condition: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let err = Self::new(location, condition, message);
        err.report();
        err
    }

    /// Emits the error on the `toybox::fatal` target.
    pub fn report(&self) {
        tracing::error!(
            target: "toybox::fatal",
            file = self.location.file,
            line = self.location.line,
            condition = %self.condition,
            "{}",
            self.message
        );
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn condition(&self) -> &str {
        &self.condition
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Builds a reported [`FatalError`] at the call site.
///
/// The first argument is the condition text, the rest is a format string.
#[macro_export]
macro_rules! fatal_error {
    ($condition:expr, $($arg:tt)+) => {
        $crate::FatalError::reported(
            $crate::Location::new(file!(), line!()),
            $condition,
            format!($($arg)+),
        )
    };
}

/// Returns early with a [`FatalError`] (converted via `Into`) when `cond` is false.
#[macro_export]
macro_rules! ensure_fatal {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::fatal_error!(stringify!($cond), $($arg)+).into());
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_positive(value: i32) -> Result<i32, FatalError> {
        ensure_fatal!(value > 0, "value must be positive, got {}", value);
        Ok(value)
    }

    #[test]
    fn test_ensure_fatal_passes() {
        assert_eq!(check_positive(3), Ok(3));
    }

    #[test]
    fn test_ensure_fatal_captures_context() {
        let err = check_positive(-2).unwrap_err();
        assert_eq!(err.condition(), "value > 0");
        assert_eq!(err.message(), "value must be positive, got -2");
        assert!(err.location().file.ends_with("fatal.rs"));
        assert!(err.location().line > 0);
    }

    #[test]
    fn test_fatal_error_macro() {
        let err = fatal_error!("depth format", "none of {} candidates supported", 3);
        assert_eq!(err.condition(), "depth format");
        assert_eq!(err.message(), "none of 3 candidates supported");
    }

    #[test]
    fn test_display_includes_location() {
        let err = FatalError::new(Location::new("swapchain.rs", 42), "extent > 0", "zero extent");
        let text = err.to_string();
        assert!(text.contains("swapchain.rs:42"));
        assert!(text.contains("`extent > 0`"));
        assert!(text.contains("zero extent"));
    }
}
