//! The resolved semantic graph and its source mapping
//!
//! [`Api`] is the fully resolved output of a run: an arena of typed
//! declarations where every cross-reference is an index into the same graph,
//! so a successfully resolved graph cannot contain a dangling reference.
//!
//! [`Mapping`] associates every graph node with the source location that
//! produced it, in both directions. Both types derive `serde` traits and are
//! persisted together as one artifact (see [`crate::artifact`]).

pub mod resolver;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::frontend::diagnostics::SourceLoc;

pub use resolver::{ParsedFile, Resolution, Resolver, ResolverOptions, SemanticResolver};

/// Identifies one node in the [`Api`] graph.
///
/// Ids are dense and assigned in graph order, so [`Mapping`] entries sorted
/// by id are also in graph order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

// ============================================================================
// Types
// ============================================================================

/// Built-in scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Primitive {
    Bool,
    Int,
    Float,
    String,
    Bytes,
}

impl Primitive {
    pub fn from_name(name: &str) -> Option<Primitive> {
        match name {
            "Bool" => Some(Primitive::Bool),
            "Int" => Some(Primitive::Int),
            "Float" => Some(Primitive::Float),
            "String" => Some(Primitive::String),
            "Bytes" => Some(Primitive::Bytes),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Bool => "Bool",
            Primitive::Int => "Int",
            Primitive::Float => "Float",
            Primitive::String => "String",
            Primitive::Bytes => "Bytes",
        }
    }
}

/// A fully resolved type. Entity and alias references are indices into the
/// owning [`Api`]'s arenas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeDesc {
    Primitive(Primitive),
    /// Index into [`Api::entities`]
    Entity(u32),
    /// Index into [`Api::aliases`]
    Alias(u32),
    List(Box<TypeDesc>),
    Map(Box<TypeDesc>, Box<TypeDesc>),
    Optional(Box<TypeDesc>),
}

// ============================================================================
// Declarations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: NodeId,
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: NodeId,
    pub name: String,
    pub ty: TypeDesc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub id: NodeId,
    pub name: String,
    pub ty: TypeDesc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: NodeId,
    pub name: String,
    pub params: Vec<Param>,
    pub result: Option<TypeDesc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub id: NodeId,
    pub name: String,
    pub ty: TypeDesc,
}

// ============================================================================
// The graph
// ============================================================================

/// The fully resolved semantic graph.
///
/// Declarations appear in resolution order: file processing order, then
/// in-file order. All collections are plain vectors, so serialization is
/// deterministic for identical content.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Api {
    pub entities: Vec<Entity>,
    pub aliases: Vec<Alias>,
    pub commands: Vec<Command>,
}

impl Api {
    /// Every node id reachable from the graph root, in id order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::with_capacity(self.node_count());
        for entity in &self.entities {
            ids.push(entity.id);
            ids.extend(entity.fields.iter().map(|f| f.id));
        }
        for alias in &self.aliases {
            ids.push(alias.id);
        }
        for command in &self.commands {
            ids.push(command.id);
            ids.extend(command.params.iter().map(|p| p.id));
        }
        ids.sort();
        ids
    }

    pub fn node_count(&self) -> usize {
        self.entities.iter().map(|e| 1 + e.fields.len()).sum::<usize>()
            + self.aliases.len()
            + self
                .commands
                .iter()
                .map(|c| 1 + c.params.len())
                .sum::<usize>()
    }

    pub fn entity_by_name(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn alias_by_name(&self, name: &str) -> Option<&Alias> {
        self.aliases.iter().find(|a| a.name == name)
    }

    pub fn command_by_name(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.name == name)
    }
}

// ============================================================================
// Source mapping
// ============================================================================

/// One node-to-source association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub node: NodeId,
    pub loc: SourceLoc,
}

/// Bidirectional association between graph nodes and source locations.
///
/// Entries are kept sorted by node id. Every node reachable from the graph
/// root has exactly one entry, and entries only name files that were part of
/// the run's resolved file set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Mapping {
    entries: Vec<MappingEntry>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the location a node came from. Nodes are expected to arrive in
    /// id order; out-of-order inserts are re-sorted.
    pub fn insert(&mut self, node: NodeId, loc: SourceLoc) {
        let in_order = self.entries.last().is_none_or(|last| last.node < node);
        self.entries.push(MappingEntry { node, loc });
        if !in_order {
            self.entries.sort_by_key(|e| e.node);
        }
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Node → source direction.
    pub fn location_of(&self, node: NodeId) -> Option<&SourceLoc> {
        self.entries
            .binary_search_by_key(&node, |e| e.node)
            .ok()
            .map(|i| &self.entries[i].loc)
    }

    /// Source → node direction: all nodes produced by one file, in id order.
    pub fn nodes_in_file<'a>(&'a self, file: &'a Path) -> impl Iterator<Item = NodeId> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.loc.file == file)
            .map(|e| e.node)
    }

    /// Source → node direction: the innermost node whose span contains the
    /// given byte offset in the given file.
    pub fn node_at(&self, file: &Path, offset: usize) -> Option<NodeId> {
        self.entries
            .iter()
            .filter(|e| {
                e.loc.file == file && e.loc.span.start <= offset && offset < e.loc.span.end
            })
            .min_by_key(|e| e.loc.span.end - e.loc.span.start)
            .map(|e| e.node)
    }

    /// Every distinct file named by the mapping.
    pub fn files(&self) -> Vec<&Path> {
        let mut files: Vec<&Path> = self.entries.iter().map(|e| e.loc.file.as_path()).collect();
        files.sort();
        files.dedup();
        files
    }
}
