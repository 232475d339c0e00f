//! Persistence of the resolved graph and its source mapping
//!
//! One run produces one self-contained artifact holding the [`Api`] and its
//! [`Mapping`] together, so a consumer can never observe a graph without its
//! matching mapping. The layout is a 4-byte magic prefix followed by one
//! bincode stream encoding the [`Artifact`] fields in fixed order: format
//! version, graph, mapping.
//!
//! Writes go to a temporary file in the destination directory and are moved
//! into place atomically, so a partially written destination never parses as
//! a valid artifact. The encoding is deterministic for identical content
//! within one tool version; readers reject unknown versions, foreign files,
//! and truncated streams.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::semantic::{Api, Mapping};

/// Magic bytes at the start of every artifact file.
pub const MAGIC: [u8; 4] = *b"DEFC";

/// Current artifact format version. Bump on any breaking change to the
/// persisted types.
pub const FORMAT_VERSION: u32 = 1;

/// The persisted output of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Always [`FORMAT_VERSION`] at write time
    pub version: u32,
    pub api: Api,
    pub mapping: Mapping,
}

/// Errors reading or writing an artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("cannot access '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{}' is not a defc artifact", .path.display())]
    BadMagic { path: PathBuf },

    #[error("unsupported artifact version {found} (this build reads version {FORMAT_VERSION})")]
    UnsupportedVersion { found: u32 },

    #[error("artifact is corrupt or truncated: {0}")]
    Corrupt(#[from] bincode::Error),
}

/// Encode the graph and mapping into a byte vector (magic included).
pub fn encode(api: &Api, mapping: &Mapping) -> Result<Vec<u8>, ArtifactError> {
    // A (u32, &Api, &Mapping) tuple encodes identically to the Artifact
    // struct: bincode writes fields in order with no names.
    let body = bincode::serialize(&(FORMAT_VERSION, api, mapping))?;
    let mut data = Vec::with_capacity(MAGIC.len() + body.len());
    data.extend_from_slice(&MAGIC);
    data.extend_from_slice(&body);
    Ok(data)
}

/// Write the artifact for one run to `dest`.
///
/// The graph and mapping are taken by value: the artifact is their terminal
/// form and nothing mutates them afterwards. The write is all-or-nothing
/// from a reader's point of view.
pub fn write(dest: &Path, api: Api, mapping: Mapping) -> Result<(), ArtifactError> {
    let data = encode(&api, &mapping)?;

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| ArtifactError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    // Stage next to the destination so the rename stays on one filesystem.
    let mut tmp = dest.as_os_str().to_owned();
    tmp.push(format!(".tmp.{}", process::id()));
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, &data).map_err(|e| ArtifactError::Io {
        path: tmp.clone(),
        source: e,
    })?;
    if let Err(e) = fs::rename(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        return Err(ArtifactError::Io {
            path: dest.to_path_buf(),
            source: e,
        });
    }

    info!(
        path = %dest.display(),
        bytes = data.len(),
        nodes = api.node_count(),
        "wrote artifact"
    );
    Ok(())
}

/// Read an artifact back. This is the contract downstream consumers use.
pub fn read(path: &Path) -> Result<Artifact, ArtifactError> {
    let data = fs::read(path).map_err(|e| ArtifactError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    if data.len() < MAGIC.len() || data[..MAGIC.len()] != MAGIC {
        return Err(ArtifactError::BadMagic {
            path: path.to_path_buf(),
        });
    }

    let body = &data[MAGIC.len()..];
    // The version is the first field of the stream; check it before trying
    // to decode types that may have changed shape between versions.
    let version: u32 = bincode::deserialize(&body[..body.len().min(4)])?;
    if version != FORMAT_VERSION {
        return Err(ArtifactError::UnsupportedVersion { found: version });
    }

    let artifact: Artifact = bincode::deserialize(body)?;
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::Span;
    use crate::frontend::diagnostics::SourceLoc;
    use crate::semantic::{Entity, Field, NodeId, Primitive, TypeDesc};
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn unique_temp_dir() -> PathBuf {
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let dir = std::env::temp_dir().join(format!("defc_artifact_test_{}_{pid}_{id}", ts));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sample() -> (Api, Mapping) {
        let api = Api {
            entities: vec![Entity {
                id: NodeId(0),
                name: "User".to_string(),
                fields: vec![Field {
                    id: NodeId(1),
                    name: "name".to_string(),
                    ty: TypeDesc::Primitive(Primitive::String),
                }],
            }],
            aliases: vec![],
            commands: vec![],
        };
        let mut mapping = Mapping::new();
        mapping.insert(NodeId(0), SourceLoc::new("a.def", Span::new(0, 30)));
        mapping.insert(NodeId(1), SourceLoc::new("a.def", Span::new(14, 26)));
        (api, mapping)
    }

    #[test]
    fn test_round_trip() {
        let dir = unique_temp_dir();
        let dest = dir.join("out.defb");
        let (api, mapping) = sample();

        write(&dest, api.clone(), mapping.clone()).unwrap();
        let artifact = read(&dest).unwrap();

        assert_eq!(artifact.version, FORMAT_VERSION);
        assert_eq!(artifact.api, api);
        assert_eq!(artifact.mapping, mapping);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let (api, mapping) = sample();
        let first = encode(&api, &mapping).unwrap();
        let second = encode(&api, &mapping).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = unique_temp_dir();
        let dest = dir.join("out.defb");
        let (api, mapping) = sample();
        write(&dest, api, mapping).unwrap();

        let names: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["out.defb".to_string()]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = unique_temp_dir();
        let path = dir.join("not_an_artifact.bin");
        std::fs::write(&path, b"hello world").unwrap();
        assert!(matches!(read(&path), Err(ArtifactError::BadMagic { .. })));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_rejects_truncated_stream() {
        let dir = unique_temp_dir();
        let dest = dir.join("out.defb");
        let (api, mapping) = sample();
        write(&dest, api, mapping).unwrap();

        let mut data = std::fs::read(&dest).unwrap();
        data.truncate(data.len() / 2);
        let truncated = dir.join("truncated.defb");
        std::fs::write(&truncated, &data).unwrap();

        assert!(matches!(read(&truncated), Err(ArtifactError::Corrupt(_))));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_rejects_unknown_version() {
        let dir = unique_temp_dir();
        let dest = dir.join("out.defb");
        let (api, mapping) = sample();
        write(&dest, api, mapping).unwrap();

        let mut data = std::fs::read(&dest).unwrap();
        // Bump the version field (first byte after the magic, little endian)
        data[MAGIC.len()] = 99;
        let bumped = dir.join("bumped.defb");
        std::fs::write(&bumped, &data).unwrap();

        match read(&bumped) {
            Err(ArtifactError::UnsupportedVersion { found }) => assert_eq!(found, 99),
            other => panic!("expected UnsupportedVersion, got {:?}", other),
        }

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_creates_missing_destination_directory() {
        let dir = unique_temp_dir();
        let dest = dir.join("build").join("out.defb");
        let (api, mapping) = sample();
        write(&dest, api, mapping).unwrap();
        assert!(read(&dest).is_ok());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
