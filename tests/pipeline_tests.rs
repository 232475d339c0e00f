//! End-to-end tests for the defc pipeline
//!
//! Each test builds a small on-disk project in a unique temp directory, runs
//! the processor through the public API, and checks the observable contract:
//! deterministic artifacts, search precedence, load deduplication, cycle
//! detection, the error cap, and artifact pairing.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use defc::artifact;
use defc::diagnostics::Severity;
use defc::processor::{Failure, Options, Processor};
use defc::semantic::TypeDesc;

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_temp_dir() -> PathBuf {
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let pid = std::process::id();
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let dir = std::env::temp_dir().join(format!("defc_pipeline_test_{}_{pid}_{id}", ts));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut f = fs::File::create(&path).unwrap();
    write!(f, "{contents}").unwrap();
    path
}

// ============================================================================
// Success scenarios
// ============================================================================

/// `a.def` includes `b.def`, found via the `libs` search path; `b.def`
/// defines an entity referenced by `a.def`.
#[test]
fn test_cross_file_include_via_search_path() {
    let dir = unique_temp_dir();
    let libs = dir.join("libs");
    let entry = write_file(
        &dir,
        "a.def",
        "include \"b.def\"\n\ncommand get_user(id: Int) -> User\n",
    );
    write_file(&libs, "b.def", "entity User {\n    name: String\n}\n");

    let mut processor = Processor::new(vec![libs], Options::default());
    let (api, mapping) = processor.run(&entry).unwrap();

    // One resolved cross-file reference
    let command = api.command_by_name("get_user").unwrap();
    assert_eq!(command.result, Some(TypeDesc::Entity(0)));
    assert_eq!(api.entities[0].name, "User");

    // Mapping contains entries for both files
    assert_eq!(mapping.files().len(), 2);
    let entity_loc = mapping.location_of(api.entities[0].id).unwrap();
    assert!(entity_loc.file.ends_with("b.def"));
    let command_loc = mapping.location_of(command.id).unwrap();
    assert!(command_loc.file.ends_with("a.def"));

    fs::remove_dir_all(&dir).unwrap();
}

/// Two runs over identical input produce byte-identical artifacts.
#[test]
fn test_determinism() {
    let dir = unique_temp_dir();
    let libs = dir.join("libs");
    let entry = write_file(
        &dir,
        "a.def",
        "include \"b.def\"\nalias Roster = List<User>\ncommand all() -> Roster\n",
    );
    write_file(&libs, "b.def", "entity User {\n    name: String\n    age: Int\n}\n");

    let out1 = dir.join("one.defb");
    let out2 = dir.join("two.defb");

    let mut processor = Processor::new(vec![libs.clone()], Options::default());
    let (api, mapping) = processor.run(&entry).unwrap();
    artifact::write(&out1, api, mapping).unwrap();

    let mut processor = Processor::new(vec![libs], Options::default());
    let (api, mapping) = processor.run(&entry).unwrap();
    artifact::write(&out2, api, mapping).unwrap();

    assert_eq!(fs::read(&out1).unwrap(), fs::read(&out2).unwrap());

    fs::remove_dir_all(&dir).unwrap();
}

/// With two search roots holding a same-named file, the first configured
/// root's file is the one loaded.
#[test]
fn test_search_precedence() {
    let dir = unique_temp_dir();
    let first = dir.join("first");
    let second = dir.join("second");
    let entry = write_file(&dir, "a.def", "include \"thing.def\"\n");
    write_file(&first, "thing.def", "entity Thing {\n    from_first: Bool\n}\n");
    write_file(&second, "thing.def", "entity Thing {\n    from_second: Bool\n}\n");

    let mut processor = Processor::new(vec![first, second], Options::default());
    let (api, _) = processor.run(&entry).unwrap();
    assert_eq!(api.entities[0].fields[0].name, "from_first");

    fs::remove_dir_all(&dir).unwrap();
}

/// A module included from two different files is loaded and parsed once.
#[test]
fn test_diamond_include_loads_once() {
    let dir = unique_temp_dir();
    let entry = write_file(
        &dir,
        "app.def",
        "include \"left.def\"\ninclude \"right.def\"\ncommand go(s: Shared) -> Shared\n",
    );
    write_file(&dir, "left.def", "include \"shared.def\"\nentity Left { s: Shared }\n");
    write_file(&dir, "right.def", "include \"shared.def\"\nentity Right { s: Shared }\n");
    write_file(&dir, "shared.def", "entity Shared { id: Int }\n");

    let mut processor = Processor::new(vec![], Options::default());
    let (api, _) = processor.run(&entry).unwrap();

    // Four distinct files, four loads, no matter the fan-in
    assert_eq!(processor.load_count(), 4);
    assert_eq!(api.entities.len(), 3);
    // No duplicate-include warnings for the diamond shape
    assert!(processor.diagnostics().is_empty());

    fs::remove_dir_all(&dir).unwrap();
}

/// Warnings are reported on success but never block it.
#[test]
fn test_warnings_do_not_block_success() {
    let dir = unique_temp_dir();
    let entry = write_file(&dir, "app.def", "entity Marker {}\ncommand mark() -> Marker\n");

    let mut processor = Processor::new(vec![], Options::default());
    let (api, _) = processor.run(&entry).unwrap();
    assert_eq!(api.entities.len(), 1);
    assert_eq!(processor.diagnostics().len(), 1);
    assert_eq!(processor.diagnostics()[0].severity, Severity::Warning);

    fs::remove_dir_all(&dir).unwrap();
}

// ============================================================================
// Failure scenarios
// ============================================================================

/// An include that cannot be found fails the run with a diagnostic naming
/// the reference and the searched roots; nothing is written.
#[test]
fn test_missing_include_failure() {
    let dir = unique_temp_dir();
    let libs = dir.join("libs");
    fs::create_dir_all(&libs).unwrap();
    let entry = write_file(&dir, "a.def", "include \"nope.def\"\n");
    let out = dir.join("a.defb");

    let mut processor = Processor::new(vec![libs.clone()], Options::default());
    match processor.run(&entry) {
        Err(Failure::Load { diagnostics }) => {
            assert_eq!(diagnostics.len(), 1);
            let message = &diagnostics[0].message;
            assert!(message.contains("nope.def"));
            assert!(message.contains(&libs.display().to_string()));
        }
        other => panic!("expected Load failure, got {:?}", other),
    }
    assert!(!out.exists());

    fs::remove_dir_all(&dir).unwrap();
}

/// File A includes B includes A: a cycle diagnostic, not a hang or overflow.
#[test]
fn test_include_cycle_failure() {
    let dir = unique_temp_dir();
    let entry = write_file(&dir, "a.def", "include \"b.def\"\nentity A { x: Int }\n");
    write_file(&dir, "b.def", "include \"a.def\"\nentity B { y: Int }\n");

    let mut processor = Processor::new(vec![], Options::default());
    match processor.run(&entry) {
        Err(Failure::Load { diagnostics }) => {
            assert!(diagnostics.iter().any(|d| d.message.contains("cycle")));
            // Attributed to the include site in b.def
            let cycle = diagnostics
                .iter()
                .find(|d| d.message.contains("cycle"))
                .unwrap();
            assert!(cycle.loc.as_ref().unwrap().file.ends_with("b.def"));
        }
        other => panic!("expected Load failure, got {:?}", other),
    }

    fs::remove_dir_all(&dir).unwrap();
}

/// maxErrors = 2 against a source producing 5 errors yields exactly 2.
#[test]
fn test_error_cap() {
    let dir = unique_temp_dir();
    let entry = write_file(
        &dir,
        "app.def",
        "entity E {\n    a: M1\n    b: M2\n    c: M3\n    d: M4\n    e: M5\n}\n",
    );

    let mut processor = Processor::new(
        vec![],
        Options {
            max_errors: 2,
            ..Options::default()
        },
    );
    match processor.run(&entry) {
        Err(Failure::DiagnosticLimit { diagnostics }) => {
            assert_eq!(diagnostics.iter().filter(|d| d.is_error()).count(), 2);
        }
        other => panic!("expected DiagnosticLimit, got {:?}", other),
    }

    fs::remove_dir_all(&dir).unwrap();
}

/// A missing entry path is a usage error, distinct from compile failures.
#[test]
fn test_usage_error() {
    let mut processor = Processor::new(vec![], Options::default());
    assert!(matches!(
        processor.run(Path::new("/no/such/entry.def")),
        Err(Failure::Usage(_))
    ));
}

// ============================================================================
// Artifact pairing
// ============================================================================

/// Reading a written artifact yields a graph whose every node has a mapping
/// entry, and no mapping entry points outside the resolved file set.
#[test]
fn test_artifact_pairing_invariants() {
    let dir = unique_temp_dir();
    let libs = dir.join("libs");
    let entry = write_file(
        &dir,
        "a.def",
        "include \"b.def\"\nalias Index = Map<String, User>\ncommand find(index: Index, name: String) -> User?\n",
    );
    write_file(&libs, "b.def", "entity User {\n    name: String\n    tags: List<String>\n}\n");
    let out = dir.join("a.defb");

    let mut processor = Processor::new(vec![libs.clone()], Options::default());
    let (api, mapping) = processor.run(&entry).unwrap();
    artifact::write(&out, api, mapping).unwrap();

    let artifact = artifact::read(&out).unwrap();

    // Every reachable node has a mapping entry
    for id in artifact.api.node_ids() {
        assert!(
            artifact.mapping.location_of(id).is_some(),
            "node {:?} has no mapping entry",
            id
        );
    }
    assert_eq!(artifact.mapping.len(), artifact.api.node_count());

    // Mapping entries never point outside the resolved file set
    let resolved: Vec<PathBuf> = vec![
        entry.canonicalize().unwrap(),
        libs.join("b.def").canonicalize().unwrap(),
    ];
    for file in artifact.mapping.files() {
        assert!(
            resolved.iter().any(|p| p == file),
            "mapping names unexpected file {}",
            file.display()
        );
    }

    fs::remove_dir_all(&dir).unwrap();
}

/// The mapping answers position queries in both directions after a round
/// trip through the artifact.
#[test]
fn test_mapping_queries_after_round_trip() {
    let dir = unique_temp_dir();
    let source = "entity User {\n    name: String\n}\ncommand get(id: Int) -> User\n";
    let entry = write_file(&dir, "app.def", source);
    let out = dir.join("app.defb");

    let mut processor = Processor::new(vec![], Options::default());
    let (api, mapping) = processor.run(&entry).unwrap();
    artifact::write(&out, api, mapping).unwrap();

    let artifact = artifact::read(&out).unwrap();
    let file = entry.canonicalize().unwrap();

    let entity = artifact.api.entity_by_name("User").unwrap();
    let field_offset = source.find("name:").unwrap();
    assert_eq!(
        artifact.mapping.node_at(&file, field_offset),
        Some(entity.fields[0].id)
    );

    let nodes: Vec<_> = artifact.mapping.nodes_in_file(&file).collect();
    assert_eq!(nodes.len(), artifact.api.node_count());

    fs::remove_dir_all(&dir).unwrap();
}
