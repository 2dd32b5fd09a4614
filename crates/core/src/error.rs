use std::fmt;
use thiserror::Error;

use crate::frontmatter::FrontMatterError;

/// Source location information for error reporting
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SourceLocation {
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

impl SourceLocation {
    /// Create a new source location
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Named pipeline stages, in the order the orchestrator runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Building the pipeline from options.
    Configure,
    /// Front-matter extraction.
    FrontMatter,
    /// Shortcode expansion on the raw body.
    Shortcodes,
    /// Markdown parsing into mdast.
    Parse,
    /// A named pass over the markdown tree.
    MarkdownTransform(&'static str),
    /// mdast to HTML tree conversion.
    Convert,
    /// A named pass over the HTML tree.
    HtmlTransform(&'static str),
    /// HTML tree serialization.
    Serialize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Configure => f.write_str("configure"),
            Stage::FrontMatter => f.write_str("front matter"),
            Stage::Shortcodes => f.write_str("shortcodes"),
            Stage::Parse => f.write_str("parse"),
            Stage::MarkdownTransform(name) => write!(f, "markdown transform `{name}`"),
            Stage::Convert => f.write_str("convert"),
            Stage::HtmlTransform(name) => write!(f, "html transform `{name}`"),
            Stage::Serialize => f.write_str("serialize"),
        }
    }
}

/// The originating cause of a stage failure.
#[derive(Debug, Error)]
pub enum StageError {
    /// Front matter could not be delimited.
    #[error(transparent)]
    FrontMatter(#[from] FrontMatterError),
    /// markdown-rs rejected the input.
    #[error("parse error at {location}: {message}")]
    Parse {
        /// Error message
        message: String,
        /// Source location
        location: SourceLocation,
    },
    /// The syntax highlighter failed on a code block.
    #[error("highlight error in `{lang}` block: {message}")]
    Highlight {
        /// Language the block declared.
        lang: String,
        /// Error message
        message: String,
    },
    /// An option value could not be used.
    #[error("invalid option `{option}`: {message}")]
    InvalidOption {
        /// Option name.
        option: &'static str,
        /// Why it was rejected.
        message: String,
    },
    /// Internal logic error (unexpected state).
    #[error("internal error: {0}")]
    Internal(String),
}

impl StageError {
    /// Create a parse error with location
    pub fn parse_error(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::Parse {
            message: message.into(),
            location: SourceLocation::new(line, column),
        }
    }
}

/// The single error surfaced by the pipeline entry point.
///
/// No partial output accompanies it: a document either renders completely or
/// yields this error with the failing stage and its cause attached.
#[derive(Debug, Error)]
#[error("markdown processing failed during {stage}: {source}")]
pub struct MarkdownProcessingError {
    /// Stage that failed.
    pub stage: Stage,
    /// Originating cause.
    #[source]
    pub source: StageError,
}

impl MarkdownProcessingError {
    /// Wraps a stage failure.
    pub fn new(stage: Stage, source: impl Into<StageError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Something was skipped or left unexpanded.
    Error,
    /// Suspicious input that still rendered.
    Warning,
}

/// A non-fatal problem recorded while processing a document.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Human-readable message
    pub message: String,
    /// Where in the body the problem was found, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match &self.location {
            Some(location) => write!(f, "{severity} at {location}: {}", self.message),
            None => write!(f, "{severity}: {}", self.message),
        }
    }
}

/// Collection of non-fatal diagnostics gathered across stages.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a recovered error.
    pub fn error(&mut self, message: impl Into<String>, location: Option<SourceLocation>) {
        self.entries.push(Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            location,
        });
    }

    /// Record a warning.
    pub fn warning(&mut self, message: impl Into<String>, location: Option<SourceLocation>) {
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            location,
        });
    }

    /// Append all entries from another collection.
    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    /// Append entries whose locations are relative to a body starting after
    /// `lines` lines of the document, making them document-relative.
    pub fn extend_offset(&mut self, other: Diagnostics, lines: usize) {
        self.entries.extend(other.entries.into_iter().map(|mut entry| {
            if let Some(location) = entry.location.as_mut() {
                location.line += lines;
            }
            entry
        }));
    }

    /// Iterate recorded diagnostics in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of recorded diagnostics
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if any recovered errors were recorded
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
