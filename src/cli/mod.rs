//! CLI module for defc
//!
//! ## Commands
//!
//! - `resolve <file>` - Parse and resolve an API file and store the
//!   resulting graph + mapping to a binary artifact
//! - `check <file>` - Run the pipeline and report diagnostics, write nothing
//! - `dump <file>` - Summarize a previously written artifact
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    /// Create a new CLI error with a message and exit code.
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// The Def API definition language compiler
#[derive(Parser, Debug)]
#[command(name = "defc")]
#[command(version = VERSION)]
#[command(about = "Compiler front end for the Def API definition language", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline flags shared by `resolve` and `check`.
#[derive(clap::Args, Debug)]
pub struct PipelineArgs {
    /// Source file to process
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Directory to search for includes (repeatable; order is precedence)
    #[arg(long = "search", value_name = "DIR")]
    pub search: Vec<PathBuf>,

    /// Maximum error diagnostics before aborting (0 = no cap)
    #[arg(long = "max-errors", value_name = "N", default_value_t = 10)]
    pub max_errors: usize,

    /// Maximum warnings retained in the report (0 = no cap)
    #[arg(long = "max-warnings", value_name = "N", default_value_t = 0)]
    pub max_warnings: usize,

    /// Report entities and aliases no command references
    #[arg(long = "warn-unreachable")]
    pub warn_unreachable: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse and resolve an API file and store it to a binary artifact
    Resolve {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Output artifact path (default: source file with .defb extension)
        #[arg(long = "out", short = 'o', value_name = "PATH")]
        out: Option<PathBuf>,
    },

    /// Run the pipeline and report diagnostics without writing an artifact
    Check {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Summarize a previously written artifact
    Dump {
        /// Artifact file to read
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Command::Resolve { pipeline, out } => commands::resolve_file(&pipeline, out),
        Command::Check { pipeline } => commands::check_file(&pipeline),
        Command::Dump { file } => commands::dump_artifact(&file),
    }
}

// ============================================================================
// Tests
// ============================================================================
