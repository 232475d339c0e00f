//! Include resolution over an ordered search path
//!
//! The [`Loader`] capability turns a bare include reference into concrete
//! source bytes. The default [`SearchLoader`] probes the requesting file's
//! directory first, then each configured search root in order; the first
//! match wins, which makes precedence an explicit, testable property.
//!
//! Resolved files are memoized by canonical path so each physical file is
//! read exactly once per run regardless of include fan-in, and an
//! in-progress set detects include cycles instead of recursing forever.
//! The cache is owned by the loader instance, never shared across runs.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

/// A loaded source file. Identity is the canonical `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// The include reference as written in source (the entry file's name for
    /// the entry itself)
    pub reference: String,
    /// Canonical filesystem path
    pub path: PathBuf,
    /// Source text
    pub source: String,
}

impl ResolvedFile {
    /// Directory containing this file, used to resolve its own includes.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }
}

/// Errors produced by a [`Loader`].
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot find include '{reference}' (searched {})", format_roots(.searched))]
    NotFound {
        reference: String,
        searched: Vec<PathBuf>,
    },

    #[error("include cycle detected: '{reference}' resolves to '{}', which is still being processed", .path.display())]
    Cycle { reference: String, path: PathBuf },

    #[error("include reference '{reference}' must be a relative path without '..'")]
    InvalidReference { reference: String },

    #[error("cannot read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn format_roots(roots: &[PathBuf]) -> String {
    if roots.is_empty() {
        return "no directories".to_string();
    }
    roots
        .iter()
        .map(|r| format!("'{}'", r.display()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Capability boundary: resolve an include reference to source text.
///
/// The processor drives this through a trait object so tests and embedders
/// can substitute their own lookup strategy.
pub trait Loader {
    /// Resolve `reference` relative to the directory of the requesting file.
    ///
    /// Repeated requests that resolve to the same canonical path return the
    /// memoized [`ResolvedFile`] without re-reading the file.
    fn resolve(&mut self, reference: &str, from_dir: &Path) -> Result<Arc<ResolvedFile>, LoadError>;

    /// Mark a resolved file's includes as fully processed.
    ///
    /// Until this is called, a repeat request for the same canonical path is
    /// an include cycle.
    fn complete(&mut self, path: &Path);

    /// Drop all memoized state. The cache is scoped to one run; the
    /// processor resets it before each run so stale file contents from a
    /// previous run can never leak into the next.
    fn reset(&mut self);

    /// Number of files actually read from disk so far.
    fn load_count(&self) -> usize;
}

/// [`Loader`] over an ordered list of search roots.
pub struct SearchLoader {
    search: Vec<PathBuf>,
    /// Resolved files keyed by canonical path
    cache: HashMap<PathBuf, Arc<ResolvedFile>>,
    /// Canonical paths handed out but not yet completed (cycle detection)
    in_progress: HashSet<PathBuf>,
    loads: usize,
}

impl SearchLoader {
    pub fn new(search: Vec<PathBuf>) -> Self {
        Self {
            search,
            cache: HashMap::new(),
            in_progress: HashSet::new(),
            loads: 0,
        }
    }

    /// The configured search roots, in precedence order.
    pub fn search_roots(&self) -> &[PathBuf] {
        &self.search
    }

    /// Every file resolved so far, in no particular order.
    pub fn resolved(&self) -> impl Iterator<Item = &Arc<ResolvedFile>> {
        self.cache.values()
    }

    fn read(&mut self, reference: &str, path: &Path) -> Result<Arc<ResolvedFile>, LoadError> {
        let canonical = path.canonicalize().map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        if let Some(cached) = self.cache.get(&canonical) {
            if self.in_progress.contains(&canonical) {
                return Err(LoadError::Cycle {
                    reference: reference.to_string(),
                    path: canonical,
                });
            }
            debug!(path = %canonical.display(), "include cache hit");
            return Ok(Arc::clone(cached));
        }

        let source = fs::read_to_string(&canonical).map_err(|e| LoadError::Io {
            path: canonical.clone(),
            source: e,
        })?;
        self.loads += 1;
        debug!(path = %canonical.display(), loads = self.loads, "loaded source file");

        let file = Arc::new(ResolvedFile {
            reference: reference.to_string(),
            path: canonical.clone(),
            source,
        });
        self.cache.insert(canonical.clone(), Arc::clone(&file));
        self.in_progress.insert(canonical);
        Ok(file)
    }
}

impl Loader for SearchLoader {
    fn resolve(&mut self, reference: &str, from_dir: &Path) -> Result<Arc<ResolvedFile>, LoadError> {
        let relative = Path::new(reference);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(LoadError::InvalidReference {
                reference: reference.to_string(),
            });
        }

        // The requesting file's directory takes precedence, then configured
        // roots in configured order. First readable match wins.
        let mut searched = Vec::with_capacity(1 + self.search.len());
        searched.push(from_dir.to_path_buf());
        searched.extend(self.search.iter().cloned());

        for root in &searched {
            let candidate = root.join(relative);
            if candidate.is_file() {
                return self.read(reference, &candidate);
            }
        }

        Err(LoadError::NotFound {
            reference: reference.to_string(),
            searched,
        })
    }

    fn complete(&mut self, path: &Path) {
        self.in_progress.remove(path);
    }

    fn reset(&mut self) {
        self.cache.clear();
        self.in_progress.clear();
        self.loads = 0;
    }

    fn load_count(&self) -> usize {
        self.loads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn unique_temp_dir() -> PathBuf {
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let dir = std::env::temp_dir().join(format!("defc_loader_test_{}_{pid}_{id}", ts));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, "{contents}").unwrap();
        path
    }

    #[test]
    fn test_requesting_dir_wins_over_search_roots() {
        let local = unique_temp_dir();
        let root = unique_temp_dir();
        write_file(&local, "types.def", "entity Local {}");
        write_file(&root, "types.def", "entity FromRoot {}");

        let mut loader = SearchLoader::new(vec![root.clone()]);
        let file = loader.resolve("types.def", &local).unwrap();
        assert_eq!(file.source, "entity Local {}");

        std::fs::remove_dir_all(&local).unwrap();
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_first_configured_root_wins() {
        let from = unique_temp_dir();
        let first = unique_temp_dir();
        let second = unique_temp_dir();
        write_file(&first, "types.def", "entity First {}");
        write_file(&second, "types.def", "entity Second {}");

        let mut loader = SearchLoader::new(vec![first.clone(), second.clone()]);
        let file = loader.resolve("types.def", &from).unwrap();
        assert_eq!(file.source, "entity First {}");

        std::fs::remove_dir_all(&from).unwrap();
        std::fs::remove_dir_all(&first).unwrap();
        std::fs::remove_dir_all(&second).unwrap();
    }

    #[test]
    fn test_memoizes_by_canonical_path() {
        let dir = unique_temp_dir();
        write_file(&dir, "types.def", "entity E {}");

        let mut loader = SearchLoader::new(vec![dir.clone()]);
        let first = loader.resolve("types.def", &dir).unwrap();
        loader.complete(&first.path);
        let second = loader.resolve("types.def", &dir).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.load_count(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_not_found_names_searched_roots() {
        let from = unique_temp_dir();
        let root = unique_temp_dir();

        let mut loader = SearchLoader::new(vec![root.clone()]);
        let err = loader.resolve("missing.def", &from).unwrap_err();
        match err {
            LoadError::NotFound { reference, searched } => {
                assert_eq!(reference, "missing.def");
                assert_eq!(searched, vec![from.clone(), root.clone()]);
            }
            other => panic!("expected NotFound, got {:?}", other),
        }

        std::fs::remove_dir_all(&from).unwrap();
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_cycle_detected_until_completed() {
        let dir = unique_temp_dir();
        write_file(&dir, "a.def", "include \"a.def\"");

        let mut loader = SearchLoader::new(vec![]);
        let file = loader.resolve("a.def", &dir).unwrap();

        let err = loader.resolve("a.def", &dir).unwrap_err();
        assert!(matches!(err, LoadError::Cycle { .. }));

        loader.complete(&file.path);
        assert!(loader.resolve("a.def", &dir).is_ok());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_rejects_escaping_references() {
        let dir = unique_temp_dir();
        let mut loader = SearchLoader::new(vec![]);
        let err = loader.resolve("../secrets.def", &dir).unwrap_err();
        assert!(matches!(err, LoadError::InvalidReference { .. }));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_subdirectory_reference() {
        let root = unique_temp_dir();
        write_file(&root, "shared/types.def", "entity Shared {}");

        let from = unique_temp_dir();
        let mut loader = SearchLoader::new(vec![root.clone()]);
        let file = loader.resolve("shared/types.def", &from).unwrap();
        assert_eq!(file.reference, "shared/types.def");
        assert_eq!(file.source, "entity Shared {}");

        std::fs::remove_dir_all(&root).unwrap();
        std::fs::remove_dir_all(&from).unwrap();
    }
}
