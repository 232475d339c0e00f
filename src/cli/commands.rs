//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::path::{Path, PathBuf};

use crate::artifact;
use crate::frontend::diagnostics::{self, Diagnostic, Severity};
use crate::processor::{Failure, Options, Processor};

use super::{CliError, CliResult, ExitCode, PipelineArgs};

/// Default artifact extension when `--out` is not given.
const ARTIFACT_EXT: &str = "defb";

fn options_from(args: &PipelineArgs) -> Options {
    Options {
        max_errors: args.max_errors,
        max_warnings: args.max_warnings,
        resolver: crate::semantic::ResolverOptions {
            warn_unreachable: args.warn_unreachable,
        },
    }
}

/// `defc resolve` - run the pipeline and persist the artifact.
pub fn resolve_file(args: &PipelineArgs, out: Option<PathBuf>) -> CliResult<ExitCode> {
    let mut processor = Processor::new(args.search.clone(), options_from(args));
    let (api, mapping) = processor
        .run(&args.file)
        .map_err(|failure| failure_to_cli(failure, &processor))?;

    // Success still reports the retained warnings and notes.
    let report = render_diagnostics(processor.diagnostics(), &processor);
    if !report.is_empty() {
        eprint!("{report}");
    }

    let dest = out.unwrap_or_else(|| args.file.with_extension(ARTIFACT_EXT));
    artifact::write(&dest, api, mapping)
        .map_err(|e| CliError::failure(Failure::Write(e).to_string()))?;

    println!("wrote {}", dest.display());
    Ok(ExitCode::SUCCESS)
}

/// `defc check` - run the pipeline, report diagnostics, write nothing.
pub fn check_file(args: &PipelineArgs) -> CliResult<ExitCode> {
    let mut processor = Processor::new(args.search.clone(), options_from(args));
    processor
        .run(&args.file)
        .map_err(|failure| failure_to_cli(failure, &processor))?;

    let report = render_diagnostics(processor.diagnostics(), &processor);
    if !report.is_empty() {
        eprint!("{report}");
    }

    println!("{}: ok", args.file.display());
    Ok(ExitCode::SUCCESS)
}

/// `defc dump` - summarize a written artifact.
pub fn dump_artifact(file: &Path) -> CliResult<ExitCode> {
    let artifact = artifact::read(file).map_err(|e| CliError::failure(e.to_string()))?;

    println!("artifact {} (version {})", file.display(), artifact.version);
    println!(
        "  {} entities, {} aliases, {} commands ({} nodes)",
        artifact.api.entities.len(),
        artifact.api.aliases.len(),
        artifact.api.commands.len(),
        artifact.api.node_count(),
    );
    println!(
        "  {} mapping entries across {} files:",
        artifact.mapping.len(),
        artifact.mapping.files().len()
    );
    for path in artifact.mapping.files() {
        println!("    {}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Failure reporting
// ============================================================================

/// Render every diagnostic with source context where available.
fn render_diagnostics(diags: &[Diagnostic], processor: &Processor) -> String {
    let mut out = String::new();
    for diag in diags {
        let source = diag
            .loc
            .as_ref()
            .and_then(|loc| processor.source(&loc.file));
        out.push_str(&diagnostics::format_diagnostic(diag, source));
    }
    out
}

/// Convert a terminal [`Failure`] into the user-facing CLI error.
fn failure_to_cli(failure: Failure, processor: &Processor) -> CliError {
    let mut message = render_diagnostics(failure.diagnostics(), processor);
    match &failure {
        Failure::Usage(msg) => message.push_str(&format!("error: {msg}\n")),
        Failure::DiagnosticLimit { diagnostics } => {
            let errors = diagnostics.iter().filter(|d| d.is_error()).count();
            message.push_str(&format!(
                "error limit reached after {errors} errors; aborting\n"
            ));
        }
        Failure::Load { diagnostics } => {
            let errors = diagnostics.iter().filter(|d| d.is_error()).count();
            let warnings = diagnostics
                .iter()
                .filter(|d| d.severity == Severity::Warning)
                .count();
            if warnings > 0 {
                message.push_str(&format!(
                    "aborting due to {errors} errors ({warnings} warnings)\n"
                ));
            } else {
                message.push_str(&format!("aborting due to {errors} errors\n"));
            }
        }
        Failure::Write(e) => message.push_str(&format!("error: failed to write artifact: {e}\n")),
    }
    // The trailing newline is supplied by the eprintln in run()
    CliError::failure(message.trim_end().to_string())
}
