//! Live terminal output for streaming step execution
//!
//! `LinePrinter` implements `OutputCallback` and prints each line of step
//! output as the child process produces it, with stderr lines dimmed so
//! diagnostics stand apart from regular output.

use std::io::{self, Write};

use console::style;

use crate::shell::{OutputCallback, OutputLine, StreamSource};

/// Callback that prints step output lines as they arrive
#[derive(Debug, Default)]
pub struct LinePrinter {
    prefix: Option<String>,
}

impl LinePrinter {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    /// Prefix every printed line, useful when output from several commands
    /// interleaves
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn flush_stdout(&self) {
        let _ = io::stdout().flush();
    }
}

impl OutputCallback for LinePrinter {
    fn on_line(&self, line: &OutputLine) {
        let text = match &self.prefix {
            Some(prefix) => format!("{} {}", style(prefix).dim(), line.text),
            None => line.text.clone(),
        };
        let text = fit_width(&text);
        match line.source {
            StreamSource::Stdout => println!("{}", text),
            StreamSource::Stderr => println!("{}", style(text).dim()),
        }
        self.flush_stdout();
    }
}

/// Trim a line to the terminal width (default 80 when not a terminal)
fn fit_width(text: &str) -> String {
    let width = term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80);
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}
