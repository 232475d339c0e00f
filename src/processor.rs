//! Pipeline orchestration
//!
//! The [`Processor`] drives one run: load the entry file, parse it, resolve
//! and parse every include depth-first in source order, hand the assembled
//! forest to the resolver in one global pass, and gate the result on the
//! accumulated diagnostics.
//!
//! Every stage reports diagnostics instead of aborting; only the aggregate
//! converts into a terminal [`Failure`]. Error-severity diagnostics are
//! capped by [`Options::max_errors`]: hitting the cap ends the run with
//! exactly the capped prefix, so a pathological input cannot produce an
//! unbounded report. Warnings never count toward the cap and never block.
//!
//! The processor owns its loader cache and diagnostic sequence; both are
//! reset at the start of each run and handed off or dropped at the end, so
//! independent runs share no mutable state.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::artifact::ArtifactError;
use crate::frontend::diagnostics::{Diagnostic, Severity, SourceLoc, SyntaxError};
use crate::frontend::loader::{Loader, ResolvedFile, SearchLoader};
use crate::frontend::{lexer, parser};
use crate::semantic::{Api, Mapping, ParsedFile, Resolver, ResolverOptions, SemanticResolver};

/// Configuration for one run.
#[derive(Debug, Clone)]
pub struct Options {
    /// Maximum number of error diagnostics before the run aborts early.
    /// Zero (or any non-positive CLI value) means no cap.
    pub max_errors: usize,
    /// Maximum number of warnings retained in the report. Zero means no cap.
    /// Warnings beyond the cap are dropped; they never affect success.
    pub max_warnings: usize,
    /// Resolver tuning, passed through untouched.
    pub resolver: ResolverOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_errors: 10,
            max_warnings: 0,
            resolver: ResolverOptions::default(),
        }
    }
}

/// Terminal failure of a run.
#[derive(Debug, Error)]
pub enum Failure {
    /// Bad invocation; nothing was attempted.
    #[error("{0}")]
    Usage(String),

    /// The error cap was reached. Carries exactly the capped diagnostic
    /// prefix, in discovery order.
    #[error("too many errors; aborting")]
    DiagnosticLimit { diagnostics: Vec<Diagnostic> },

    /// Loading, parsing, or resolving produced error diagnostics without
    /// reaching the cap.
    #[error("compilation failed")]
    Load { diagnostics: Vec<Diagnostic> },

    /// The graph and mapping were ready but the artifact could not be
    /// persisted.
    #[error("failed to write artifact: {0}")]
    Write(#[from] ArtifactError),
}

impl Failure {
    /// The diagnostics attached to this failure, if any.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Failure::DiagnosticLimit { diagnostics } | Failure::Load { diagnostics } => {
                diagnostics
            }
            Failure::Usage(_) | Failure::Write(_) => &[],
        }
    }
}

/// Drives the load → parse → resolve pipeline for one entry file at a time.
///
/// The loader and resolver are swappable capability boundaries; the defaults
/// are [`SearchLoader`] and [`SemanticResolver`].
pub struct Processor {
    loader: Box<dyn Loader>,
    resolver: Box<dyn Resolver>,
    options: Options,
    /// Parsed files in dependency order (includes before their includers)
    forest: Vec<ParsedFile>,
    /// Source text by canonical path, for diagnostic rendering
    sources: HashMap<PathBuf, Arc<ResolvedFile>>,
    diagnostics: Vec<Diagnostic>,
    errors: usize,
    warnings: usize,
}

impl Processor {
    pub fn new(search_paths: Vec<PathBuf>, options: Options) -> Self {
        Self {
            loader: Box::new(SearchLoader::new(search_paths)),
            resolver: Box::new(SemanticResolver),
            options,
            forest: Vec::new(),
            sources: HashMap::new(),
            diagnostics: Vec::new(),
            errors: 0,
            warnings: 0,
        }
    }

    /// Substitute the include-resolution strategy.
    pub fn with_loader(mut self, loader: Box<dyn Loader>) -> Self {
        self.loader = loader;
        self
    }

    /// Substitute the semantic resolution strategy.
    pub fn with_resolver(mut self, resolver: Box<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Diagnostics accumulated by the last run. After a failed run these
    /// travel inside the [`Failure`] instead.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Source text of a file resolved during the last run.
    pub fn source(&self, path: &Path) -> Option<&str> {
        self.sources.get(path).map(|f| f.source.as_str())
    }

    /// Number of files actually read from disk during the last run.
    pub fn load_count(&self) -> usize {
        self.loader.load_count()
    }

    /// Run the full pipeline for `entry`.
    ///
    /// Succeeds only when zero error-severity diagnostics were produced;
    /// warnings are retained and do not block. On failure the accumulated
    /// diagnostics (up to the cap) travel with the [`Failure`].
    pub fn run(&mut self, entry: &Path) -> Result<(Api, Mapping), Failure> {
        self.forest.clear();
        self.sources.clear();
        self.diagnostics.clear();
        self.loader.reset();
        self.errors = 0;
        self.warnings = 0;

        if !entry.is_file() {
            return Err(Failure::Usage(format!(
                "entry file '{}' does not exist or is not a file",
                entry.display()
            )));
        }
        let entry_name = entry
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Failure::Usage(format!("invalid entry path '{}'", entry.display()))
            })?;
        let entry_dir = entry.parent().unwrap_or(Path::new(".")).to_path_buf();

        info!(entry = %entry.display(), "starting resolution run");

        // The entry file has no includer to attribute a load failure to, so
        // failing to load it ends the run immediately.
        let entry_file = match self.loader.resolve(&entry_name, &entry_dir) {
            Ok(file) => file,
            Err(e) => {
                return Err(Failure::Load {
                    diagnostics: vec![Diagnostic::error(e.to_string())],
                });
            }
        };

        self.process_file(entry_file)?;

        if self.errors > 0 {
            return Err(Failure::Load {
                diagnostics: std::mem::take(&mut self.diagnostics),
            });
        }

        // Resolution is global: cross-file references must see the whole
        // forest, so the resolver runs exactly once.
        debug!(files = self.forest.len(), "resolving forest");
        let resolution = self.resolver.resolve(&self.forest, &self.options.resolver);
        for diag in resolution.diagnostics {
            self.push(diag)?;
        }

        if self.errors > 0 {
            return Err(Failure::Load {
                diagnostics: std::mem::take(&mut self.diagnostics),
            });
        }

        info!(
            nodes = resolution.api.node_count(),
            files = self.forest.len(),
            warnings = self.warnings,
            "resolution succeeded"
        );
        Ok((resolution.api, resolution.mapping))
    }

    /// Parse one file, then recurse into its includes depth-first in source
    /// order. The file joins the forest after its includes (dependencies
    /// first), matching the order the resolver registers declarations in.
    fn process_file(&mut self, file: Arc<ResolvedFile>) -> Result<(), Failure> {
        debug!(path = %file.path.display(), "parsing");
        self.sources.insert(file.path.clone(), Arc::clone(&file));

        let document = match lexer::lex(&file.source) {
            Ok(tokens) => match parser::parse(&tokens) {
                Ok(document) => document,
                Err(errs) => {
                    self.push_syntax_errors(&file, errs)?;
                    // No AST for this file; its includes are unknowable.
                    self.loader.complete(&file.path);
                    return Ok(());
                }
            },
            Err(errs) => {
                self.push_syntax_errors(&file, errs)?;
                self.loader.complete(&file.path);
                return Ok(());
            }
        };

        let mut included_here: HashSet<PathBuf> = HashSet::new();
        for (include, span) in document.includes() {
            let loc = SourceLoc::new(file.path.clone(), span);
            match self.loader.resolve(&include.reference, file.dir()) {
                Ok(dep) => {
                    if !included_here.insert(dep.path.clone()) {
                        self.push(
                            Diagnostic::warning(format!(
                                "duplicate include of '{}'",
                                include.reference
                            ))
                            .with_loc(loc),
                        )?;
                        continue;
                    }
                    if self.sources.contains_key(&dep.path) {
                        // Already parsed via another includer.
                        continue;
                    }
                    self.process_file(dep)?;
                }
                Err(e) => {
                    self.push(Diagnostic::error(e.to_string()).with_loc(loc))?;
                }
            }
        }

        self.loader.complete(&file.path);
        self.forest.push(ParsedFile { file, document });
        Ok(())
    }

    fn push_syntax_errors(
        &mut self,
        file: &Arc<ResolvedFile>,
        errs: Vec<SyntaxError>,
    ) -> Result<(), Failure> {
        for err in errs {
            self.push(
                Diagnostic::error(err.message)
                    .with_loc(SourceLoc::new(file.path.clone(), err.span)),
            )?;
        }
        Ok(())
    }

    /// Record one diagnostic, enforcing the error cap.
    fn push(&mut self, diag: Diagnostic) -> Result<(), Failure> {
        match diag.severity {
            Severity::Error => {
                self.diagnostics.push(diag);
                self.errors += 1;
                if self.options.max_errors > 0 && self.errors >= self.options.max_errors {
                    return Err(Failure::DiagnosticLimit {
                        diagnostics: std::mem::take(&mut self.diagnostics),
                    });
                }
            }
            Severity::Warning => {
                if self.options.max_warnings == 0 || self.warnings < self.options.max_warnings {
                    self.warnings += 1;
                    self.diagnostics.push(diag);
                }
            }
            Severity::Note => self.diagnostics.push(diag),
        }
        Ok(())
    }
}
