//! Abstract Syntax Tree definitions for the Def API language
//!
//! One [`Document`] is produced per source file. The processor assembles the
//! documents for the entry file and all transitive includes into a forest
//! before semantic resolution runs over the whole of it at once.

use serde::{Deserialize, Serialize};

/// Source location span (byte offsets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// A node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Identifier
pub type Ident = String;

/// A parsed source file: a sequence of top-level items
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub items: Vec<Spanned<Item>>,
}

impl Document {
    /// Include directives in source order, with the span of each directive.
    pub fn includes(&self) -> impl Iterator<Item = (&IncludeDirective, Span)> {
        self.items.iter().filter_map(|item| match &item.node {
            Item::Include(inc) => Some((inc, item.span)),
            _ => None,
        })
    }
}

/// Top-level items
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Include(IncludeDirective),
    Entity(EntityDecl),
    Alias(AliasDecl),
    Command(CommandDecl),
}

// ============================================================================
// Includes
// ============================================================================

/// `include "shared/types.def"` - requests another file's declarations
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeDirective {
    /// The reference as written in source, not yet resolved to a path
    pub reference: String,
}

// ============================================================================
// Declarations
// ============================================================================

/// `entity Name { field: Type ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDecl {
    pub name: Spanned<Ident>,
    pub fields: Vec<Spanned<FieldDecl>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: Spanned<Ident>,
    pub ty: Spanned<TypeExpr>,
}

/// `alias Name = Type`
#[derive(Debug, Clone, PartialEq)]
pub struct AliasDecl {
    pub name: Spanned<Ident>,
    pub ty: Spanned<TypeExpr>,
}

/// `command name(param: Type, ...) -> Type`
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDecl {
    pub name: Spanned<Ident>,
    pub params: Vec<Spanned<ParamDecl>>,
    /// Absent means the command produces no result
    pub result: Option<Spanned<TypeExpr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: Spanned<Ident>,
    pub ty: Spanned<TypeExpr>,
}

// ============================================================================
// Types
// ============================================================================

/// A type as written in source. Names are unresolved until the semantic pass.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// A primitive, entity, or alias name - distinguished during resolution
    Named(Ident),
    /// `List<T>`
    List(Box<Spanned<TypeExpr>>),
    /// `Map<K, V>`
    Map(Box<Spanned<TypeExpr>>, Box<Spanned<TypeExpr>>),
    /// `T?`
    Optional(Box<Spanned<TypeExpr>>),
}
