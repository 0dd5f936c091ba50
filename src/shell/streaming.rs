//! Live output streaming for command execution
//!
//! This module provides the callback mechanism for observing child-process
//! output while a step runs. The runner reads stdout and stderr line by
//! line; each line is delivered to a callback before the step finishes, so
//! a CLI can print build output as it happens.
//!
//! # Example
//!
//! ```
//! use conveyor::shell::{OutputCallback, OutputLine, StreamSource};
//!
//! struct LivePrinter;
//!
//! impl OutputCallback for LivePrinter {
//!     fn on_line(&self, line: &OutputLine) {
//!         match line.source {
//!             StreamSource::Stdout => println!("{}", line.text),
//!             StreamSource::Stderr => eprintln!("{}", line.text),
//!         }
//!     }
//! }
//! ```

/// Which stream a captured line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

/// A single line of child-process output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// Originating stream
    pub source: StreamSource,

    /// Line content without the trailing newline
    pub text: String,
}

impl OutputLine {
    /// A stdout line
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            source: StreamSource::Stdout,
            text: text.into(),
        }
    }

    /// A stderr line
    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            source: StreamSource::Stderr,
            text: text.into(),
        }
    }
}

/// Callback for processing output lines as they arrive
///
/// This trait is object-safe and can be used as `&dyn OutputCallback`.
pub trait OutputCallback: Send + Sync {
    /// Called for each line read from the child's stdout or stderr
    fn on_line(&self, line: &OutputLine);
}

/// No-op callback that discards every line
#[derive(Debug, Clone, Default)]
pub struct NoopCallback;

impl OutputCallback for NoopCallback {
    fn on_line(&self, _line: &OutputLine) {
        // Do nothing
    }
}

/// Boxed callback for dynamic dispatch
pub type BoxedCallback = Box<dyn OutputCallback>;
