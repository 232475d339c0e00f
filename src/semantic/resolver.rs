//! Semantic resolution: AST forest → Api graph + source mapping
//!
//! Resolution is global, not per-file: cross-file references are legal in
//! either direction, so the whole forest is resolved in one pass once every
//! include has been parsed.
//!
//! Two passes:
//! 1. Register every top-level declaration across the forest, in file
//!    processing order then in-file order. Duplicate names are reported at
//!    the second declaration site.
//! 2. Resolve every type reference to a primitive, entity, or alias and
//!    assemble the arenas, assigning dense [`NodeId`]s and one mapping entry
//!    per node.
//!
//! When any error diagnostic is produced, the graph and mapping are withheld
//! (empty) so a partially resolved graph is never observable.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::frontend::ast::{
    AliasDecl, CommandDecl, Document, EntityDecl, Item, Span, Spanned, TypeExpr,
};
use crate::frontend::diagnostics::{Diagnostic, SourceLoc};
use crate::frontend::loader::ResolvedFile;
use crate::semantic::{
    Alias, Api, Command, Entity, Field, Mapping, NodeId, Param, Primitive, TypeDesc,
};

/// One parsed file ready for resolution.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub file: Arc<ResolvedFile>,
    pub document: Document,
}

/// Resolver tuning, passed through the processor opaquely.
#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    /// Report entities and aliases not reachable from any command as notes.
    pub warn_unreachable: bool,
}

/// Everything the resolver hands back: the graph, the mapping, and the
/// diagnostics discovered along the way.
#[derive(Debug)]
pub struct Resolution {
    pub api: Api,
    pub mapping: Mapping,
    pub diagnostics: Vec<Diagnostic>,
}

/// Capability boundary: turn an AST forest into a semantic graph.
pub trait Resolver {
    fn resolve(&self, forest: &[ParsedFile], options: &ResolverOptions) -> Resolution;
}

/// The default resolver.
#[derive(Debug, Default)]
pub struct SemanticResolver;

impl Resolver for SemanticResolver {
    fn resolve(&self, forest: &[ParsedFile], options: &ResolverOptions) -> Resolution {
        let mut ctx = Context::default();
        ctx.register(forest);
        ctx.build();
        ctx.check_alias_cycles();
        if options.warn_unreachable {
            ctx.note_unreachable();
        }

        let had_errors = ctx.diagnostics.iter().any(|d| d.is_error());
        debug!(
            entities = ctx.api.entities.len(),
            aliases = ctx.api.aliases.len(),
            commands = ctx.api.commands.len(),
            diagnostics = ctx.diagnostics.len(),
            "resolution finished"
        );
        if had_errors {
            // Partial graphs must never escape; the diagnostics carry the story.
            Resolution {
                api: Api::default(),
                mapping: Mapping::new(),
                diagnostics: ctx.diagnostics,
            }
        } else {
            Resolution {
                api: ctx.api,
                mapping: ctx.mapping,
                diagnostics: ctx.diagnostics,
            }
        }
    }
}

// ============================================================================
// Internals
// ============================================================================

/// A registered type name: entity or alias arena index.
#[derive(Clone, Copy)]
enum TypeSym {
    Entity(u32),
    Alias(u32),
}

/// A declaration captured during registration, with its origin.
struct Registered<'a, T> {
    decl: &'a T,
    item_span: Span,
    file: &'a Arc<ResolvedFile>,
}

#[derive(Default)]
struct Context<'a> {
    type_names: HashMap<String, (TypeSym, SourceLoc)>,
    command_names: HashMap<String, SourceLoc>,
    entities: Vec<Registered<'a, EntityDecl>>,
    aliases: Vec<Registered<'a, AliasDecl>>,
    commands: Vec<Registered<'a, CommandDecl>>,
    api: Api,
    mapping: Mapping,
    diagnostics: Vec<Diagnostic>,
    next_id: u32,
}

impl<'a> Context<'a> {
    fn next_node(&mut self, loc: SourceLoc) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.mapping.insert(id, loc);
        id
    }

    // ------------------------------------------------------------------
    // Pass 1: registration
    // ------------------------------------------------------------------

    fn register(&mut self, forest: &'a [ParsedFile]) {
        for parsed in forest {
            for item in &parsed.document.items {
                match &item.node {
                    Item::Include(_) => {}
                    Item::Entity(decl) => {
                        let index = self.entities.len() as u32;
                        if self.register_type_name(
                            &decl.name,
                            TypeSym::Entity(index),
                            &parsed.file,
                        ) {
                            self.entities.push(Registered {
                                decl,
                                item_span: item.span,
                                file: &parsed.file,
                            });
                        }
                    }
                    Item::Alias(decl) => {
                        let index = self.aliases.len() as u32;
                        if self.register_type_name(&decl.name, TypeSym::Alias(index), &parsed.file)
                        {
                            self.aliases.push(Registered {
                                decl,
                                item_span: item.span,
                                file: &parsed.file,
                            });
                        }
                    }
                    Item::Command(decl) => {
                        let loc = SourceLoc::new(parsed.file.path.clone(), decl.name.span);
                        if let Some(first) = self.command_names.get(&decl.name.node) {
                            self.diagnostics.push(
                                Diagnostic::error(format!(
                                    "duplicate declaration of command '{}'",
                                    decl.name.node
                                ))
                                .with_loc(loc)
                                .with_note(format!(
                                    "first declared in '{}'",
                                    first.file.display()
                                )),
                            );
                        } else {
                            self.command_names.insert(decl.name.node.clone(), loc);
                            self.commands.push(Registered {
                                decl,
                                item_span: item.span,
                                file: &parsed.file,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Returns true when the name was fresh and the declaration should be kept.
    fn register_type_name(
        &mut self,
        name: &Spanned<String>,
        sym: TypeSym,
        file: &Arc<ResolvedFile>,
    ) -> bool {
        let loc = SourceLoc::new(file.path.clone(), name.span);
        if Primitive::from_name(&name.node).is_some() {
            self.diagnostics.push(
                Diagnostic::error(format!(
                    "declaration '{}' conflicts with a built-in type",
                    name.node
                ))
                .with_loc(loc),
            );
            return false;
        }
        if let Some((_, first)) = self.type_names.get(&name.node) {
            self.diagnostics.push(
                Diagnostic::error(format!("duplicate declaration of '{}'", name.node))
                    .with_loc(loc)
                    .with_note(format!("first declared in '{}'", first.file.display())),
            );
            return false;
        }
        self.type_names.insert(name.node.clone(), (sym, loc));
        true
    }

    // ------------------------------------------------------------------
    // Pass 2: build the arenas
    // ------------------------------------------------------------------

    fn build(&mut self) {
        for i in 0..self.entities.len() {
            let (decl, item_span, file) = {
                let reg = &self.entities[i];
                (reg.decl, reg.item_span, Arc::clone(reg.file))
            };
            let id = self.next_node(SourceLoc::new(file.path.clone(), item_span));
            if decl.fields.is_empty() {
                self.diagnostics.push(
                    Diagnostic::warning(format!("entity '{}' has no fields", decl.name.node))
                        .with_loc(SourceLoc::new(file.path.clone(), decl.name.span)),
                );
            }
            let mut fields = Vec::with_capacity(decl.fields.len());
            let mut field_names: HashSet<&str> = HashSet::new();
            for field in &decl.fields {
                if !field_names.insert(&field.node.name.node) {
                    self.diagnostics.push(
                        Diagnostic::error(format!(
                            "duplicate field '{}' in entity '{}'",
                            field.node.name.node, decl.name.node
                        ))
                        .with_loc(SourceLoc::new(file.path.clone(), field.node.name.span)),
                    );
                    continue;
                }
                let field_id = self.next_node(SourceLoc::new(file.path.clone(), field.span));
                let ty = self.resolve_type(&field.node.ty, &file);
                fields.push(Field {
                    id: field_id,
                    name: field.node.name.node.clone(),
                    ty,
                });
            }
            self.api.entities.push(Entity {
                id,
                name: decl.name.node.clone(),
                fields,
            });
        }

        for i in 0..self.aliases.len() {
            let (decl, item_span, file) = {
                let reg = &self.aliases[i];
                (reg.decl, reg.item_span, Arc::clone(reg.file))
            };
            let id = self.next_node(SourceLoc::new(file.path.clone(), item_span));
            let ty = self.resolve_type(&decl.ty, &file);
            self.api.aliases.push(Alias {
                id,
                name: decl.name.node.clone(),
                ty,
            });
        }

        for i in 0..self.commands.len() {
            let (decl, item_span, file) = {
                let reg = &self.commands[i];
                (reg.decl, reg.item_span, Arc::clone(reg.file))
            };
            let id = self.next_node(SourceLoc::new(file.path.clone(), item_span));
            let mut params = Vec::with_capacity(decl.params.len());
            let mut param_names: HashSet<&str> = HashSet::new();
            for param in &decl.params {
                if !param_names.insert(&param.node.name.node) {
                    self.diagnostics.push(
                        Diagnostic::error(format!(
                            "duplicate parameter '{}' in command '{}'",
                            param.node.name.node, decl.name.node
                        ))
                        .with_loc(SourceLoc::new(file.path.clone(), param.node.name.span)),
                    );
                    continue;
                }
                let param_id = self.next_node(SourceLoc::new(file.path.clone(), param.span));
                let ty = self.resolve_type(&param.node.ty, &file);
                params.push(Param {
                    id: param_id,
                    name: param.node.name.node.clone(),
                    ty,
                });
            }
            let result = decl.result.as_ref().map(|ty| self.resolve_type(ty, &file));
            self.api.commands.push(Command {
                id,
                name: decl.name.node.clone(),
                params,
                result,
            });
        }
    }

    fn resolve_type(&mut self, ty: &Spanned<TypeExpr>, file: &Arc<ResolvedFile>) -> TypeDesc {
        match &ty.node {
            TypeExpr::Named(name) => {
                if let Some(prim) = Primitive::from_name(name) {
                    return TypeDesc::Primitive(prim);
                }
                match self.type_names.get(name) {
                    Some((TypeSym::Entity(i), _)) => TypeDesc::Entity(*i),
                    Some((TypeSym::Alias(i), _)) => TypeDesc::Alias(*i),
                    None => {
                        self.diagnostics.push(
                            Diagnostic::error(format!("unknown type '{}'", name))
                                .with_loc(SourceLoc::new(file.path.clone(), ty.span))
                                .with_note(
                                    "types are primitives, declared entities, or declared aliases",
                                ),
                        );
                        // Placeholder; a graph with errors is withheld from callers.
                        TypeDesc::Primitive(Primitive::Bool)
                    }
                }
            }
            TypeExpr::List(element) => {
                TypeDesc::List(Box::new(self.resolve_type(element, file)))
            }
            TypeExpr::Map(key, value) => TypeDesc::Map(
                Box::new(self.resolve_type(key, file)),
                Box::new(self.resolve_type(value, file)),
            ),
            TypeExpr::Optional(inner) => {
                TypeDesc::Optional(Box::new(self.resolve_type(inner, file)))
            }
        }
    }

    // ------------------------------------------------------------------
    // Post passes
    // ------------------------------------------------------------------

    /// Aliases may reference aliases; a reference chain that returns to its
    /// start would send any consumer expanding aliases into a loop.
    fn check_alias_cycles(&mut self) {
        const UNVISITED: u8 = 0;
        const VISITING: u8 = 1;
        const DONE: u8 = 2;

        fn alias_refs(ty: &TypeDesc, out: &mut Vec<u32>) {
            match ty {
                TypeDesc::Alias(i) => out.push(*i),
                TypeDesc::List(t) | TypeDesc::Optional(t) => alias_refs(t, out),
                TypeDesc::Map(k, v) => {
                    alias_refs(k, out);
                    alias_refs(v, out);
                }
                TypeDesc::Primitive(_) | TypeDesc::Entity(_) => {}
            }
        }

        fn visit(
            index: u32,
            state: &mut [u8],
            aliases: &[Alias],
            cycle_roots: &mut Vec<u32>,
        ) {
            match state[index as usize] {
                DONE => return,
                VISITING => {
                    cycle_roots.push(index);
                    return;
                }
                _ => {}
            }
            state[index as usize] = VISITING;
            let mut refs = Vec::new();
            alias_refs(&aliases[index as usize].ty, &mut refs);
            for next in refs {
                visit(next, state, aliases, cycle_roots);
            }
            state[index as usize] = DONE;
        }

        let mut state = vec![UNVISITED; self.api.aliases.len()];
        let mut cycle_roots = Vec::new();
        for index in 0..self.api.aliases.len() as u32 {
            visit(index, &mut state, &self.api.aliases, &mut cycle_roots);
        }

        cycle_roots.sort();
        cycle_roots.dedup();
        for index in cycle_roots {
            let alias = &self.api.aliases[index as usize];
            let loc = self.mapping.location_of(alias.id).cloned();
            let mut diag =
                Diagnostic::error(format!("alias cycle detected through '{}'", alias.name));
            if let Some(loc) = loc {
                diag = diag.with_loc(loc);
            }
            self.diagnostics.push(diag);
        }
    }

    /// Entities and aliases no command mentions, directly or transitively.
    fn note_unreachable(&mut self) {
        if self.api.commands.is_empty() {
            // Without commands everything would be unreachable; stay quiet.
            return;
        }

        let mut entity_seen = vec![false; self.api.entities.len()];
        let mut alias_seen = vec![false; self.api.aliases.len()];
        let mut work: Vec<TypeDesc> = Vec::new();

        for command in &self.api.commands {
            work.extend(command.params.iter().map(|p| p.ty.clone()));
            work.extend(command.result.iter().cloned());
        }

        while let Some(ty) = work.pop() {
            match ty {
                TypeDesc::Entity(i) => {
                    if !entity_seen[i as usize] {
                        entity_seen[i as usize] = true;
                        work.extend(
                            self.api.entities[i as usize].fields.iter().map(|f| f.ty.clone()),
                        );
                    }
                }
                TypeDesc::Alias(i) => {
                    if !alias_seen[i as usize] {
                        alias_seen[i as usize] = true;
                        work.push(self.api.aliases[i as usize].ty.clone());
                    }
                }
                TypeDesc::List(t) | TypeDesc::Optional(t) => work.push(*t),
                TypeDesc::Map(k, v) => {
                    work.push(*k);
                    work.push(*v);
                }
                TypeDesc::Primitive(_) => {}
            }
        }

        let mut notes = Vec::new();
        for (i, entity) in self.api.entities.iter().enumerate() {
            if !entity_seen[i] {
                let mut diag = Diagnostic::note(format!(
                    "entity '{}' is not referenced by any command",
                    entity.name
                ));
                if let Some(loc) = self.mapping.location_of(entity.id) {
                    diag = diag.with_loc(loc.clone());
                }
                notes.push(diag);
            }
        }
        for (i, alias) in self.api.aliases.iter().enumerate() {
            if !alias_seen[i] {
                let mut diag = Diagnostic::note(format!(
                    "alias '{}' is not referenced by any command",
                    alias.name
                ));
                if let Some(loc) = self.mapping.location_of(alias.id) {
                    diag = diag.with_loc(loc.clone());
                }
                notes.push(diag);
            }
        }
        self.diagnostics.extend(notes);
    }
}
