//! Bordered, coloured feedback panels on stderr.

use std::io::Write;

use owo_colors::{OwoColorize, Rgb};

use super::{FeedbackError, FeedbackOptions, FeedbackStyle, FeedbackSurface};

const ERROR_COLOR: Rgb = Rgb(239, 68, 68);
const WARNING_COLOR: Rgb = Rgb(234, 179, 8);
const MUTED_COLOR: Rgb = Rgb(107, 114, 128);

/// Renders each notice as a panel and writes it to stderr.
#[derive(Debug, Clone)]
pub struct TerminalFeedback {
    width: usize,
    color: bool,
}

impl Default for TerminalFeedback {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalFeedback {
    pub fn new() -> Self {
        Self {
            width: 60,
            color: true,
        }
    }

    /// Sets the panel width. Values below 10 are raised to 10.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width.max(10);
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    fn safe_truncate(s: &str, max_chars: usize) -> String {
        if s.chars().count() <= max_chars {
            s.to_string()
        } else {
            let truncated: String = s.chars().take(max_chars.saturating_sub(3)).collect();
            format!("{}...", truncated)
        }
    }

    fn paint(&self, text: &str, color: Rgb) -> String {
        if self.color {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    /// Renders the panel without writing it.
    pub fn render(&self, message: &str, options: &FeedbackOptions) -> String {
        let inner_width = self.width - 2;
        let (header, accent) = match options.style {
            FeedbackStyle::Persistent => ("Error", ERROR_COLOR),
            FeedbackStyle::Transient => ("Notice", WARNING_COLOR),
        };
        let border = "─".repeat(inner_width);
        let mut output = String::new();

        output.push_str(&format!("{}\n", self.paint(&border, accent)));
        let header = if self.color {
            header.color(accent).bold().to_string()
        } else {
            header.to_string()
        };
        output.push_str(&format!(" {header}\n"));
        output.push_str(&format!("{}\n", self.paint(&border, accent)));

        let body = Self::safe_truncate(message, inner_width - 1);
        output.push_str(&format!(" {body}\n"));

        if let Some(description) = &options.description {
            let description = Self::safe_truncate(description, inner_width - 1);
            output.push_str(&format!(" {}\n", self.paint(&description, MUTED_COLOR)));
        }

        output.push_str(&self.paint(&border, accent));
        output
    }
}

impl FeedbackSurface for TerminalFeedback {
    fn present(&self, message: &str, options: &FeedbackOptions) -> Result<(), FeedbackError> {
        let panel = self.render(message, options);
        let mut stderr = std::io::stderr().lock();
        writeln!(stderr, "{panel}")?;
        Ok(())
    }
}
