//! Diagnostics for the defc pipeline
//!
//! Every stage (load, parse, resolve) reports [`Diagnostic`]s instead of
//! aborting; the processor accumulates them in discovery order and enforces
//! the error cap. Rendering produces rustc-style output with the offending
//! source line and a caret underline.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::frontend::ast::Span;

/// How severe a diagnostic is. Only `Error` counts toward the error cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A position in a resolved source file.
///
/// `file` is always the canonical path of a [`ResolvedFile`] from the current
/// run, so mapping entries can never point outside the resolved file set.
///
/// [`ResolvedFile`]: crate::frontend::loader::ResolvedFile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLoc {
    pub file: PathBuf,
    pub span: Span,
}

impl SourceLoc {
    pub fn new(file: impl Into<PathBuf>, span: Span) -> Self {
        Self {
            file: file.into(),
            span,
        }
    }
}

/// One recoverable-or-fatal message produced at any pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Present when the stage could attribute the problem to a source position
    pub loc: Option<SourceLoc>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            loc: None,
            notes: Vec::new(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            loc: None,
            notes: Vec::new(),
        }
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Note,
            message: message.into(),
            loc: None,
            notes: Vec::new(),
        }
    }

    pub fn with_loc(mut self, loc: SourceLoc) -> Self {
        self.loc = Some(loc);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// A syntax-stage error: lexer and parser know spans but not file paths.
///
/// The processor converts these into [`Diagnostic`]s attributed to the file
/// being parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Format a diagnostic with source context when the file's text is available.
///
/// Output shape:
///
/// ```text
/// error: unknown type 'Uesr'
///   --> shared/types.def:3:11
///    |
///  3 |     owner: Uesr
///    |            ^^^^
///    = note: declared entities are User, Group
/// ```
pub fn format_diagnostic(diag: &Diagnostic, source: Option<&str>) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}: {}\n", diag.severity, diag.message));

    if let Some(loc) = &diag.loc {
        match source {
            Some(source) => {
                let (line_num, col_num, line_text) = line_info(source, loc.span.start);
                out.push_str(&format!(
                    "  --> {}:{}:{}\n",
                    loc.file.display(),
                    line_num,
                    col_num
                ));

                let width = line_num.to_string().len();
                out.push_str(&format!("  {:>width$} |\n", ""));
                out.push_str(&format!("  {:>width$} | {}\n", line_num, line_text));

                let underline = loc
                    .span
                    .end
                    .saturating_sub(loc.span.start)
                    .clamp(1, line_text.len().saturating_sub(col_num - 1).max(1));
                out.push_str(&format!(
                    "  {:>width$} | {}{}\n",
                    "",
                    " ".repeat(col_num - 1),
                    "^".repeat(underline)
                ));
            }
            None => {
                out.push_str(&format!("  --> {}\n", loc.file.display()));
            }
        }
    }

    for note in &diag.notes {
        out.push_str(&format!("  = note: {}\n", note));
    }

    out
}

/// Get line number, column number, and line text for a byte offset
fn line_info(source: &str, offset: usize) -> (usize, usize, &str) {
    let offset = offset.min(source.len());
    let mut line_num = 1;
    let mut line_start = 0;

    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line_num += 1;
            line_start = i + 1;
        }
    }

    let line_end = source[line_start..]
        .find('\n')
        .map(|i| line_start + i)
        .unwrap_or(source.len());

    (line_num, offset - line_start + 1, &source[line_start..line_end])
}
