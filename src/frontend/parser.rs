//! Parser for the Def API language
//!
//! Single-pass recursive descent over the token stream. The parser recovers
//! at top-level keyword boundaries so one pass can report multiple issues.
//!
//! Grammar:
//!
//! ```text
//! document := item*
//! item     := include | entity | alias | command
//! include  := 'include' STRING
//! entity   := 'entity' IDENT '{' field* '}'
//! field    := IDENT ':' type
//! alias    := 'alias' IDENT '=' type
//! command  := 'command' IDENT '(' (param (',' param)*)? ')' ('->' type)?
//! param    := IDENT ':' type
//! type     := base '?'*
//! base     := 'List' '<' type '>' | 'Map' '<' type ',' type '>' | IDENT
//! ```

use crate::frontend::ast::{
    AliasDecl, CommandDecl, Document, EntityDecl, FieldDecl, IncludeDirective, Item, ParamDecl,
    Span, Spanned, TypeExpr,
};
use crate::frontend::diagnostics::SyntaxError;
use crate::frontend::lexer::{Token, TokenKind};

/// Parse a token stream into a [`Document`].
///
/// Returns the document, or every syntax error found in one pass.
pub fn parse(tokens: &[Token]) -> Result<Document, Vec<SyntaxError>> {
    Parser::new(tokens).parse()
}

/// Parser state.
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    errors: Vec<SyntaxError>,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<Document, Vec<SyntaxError>> {
        if self.tokens.is_empty() {
            return Ok(Document::default());
        }

        let mut items = Vec::new();

        while !self.is_at_end() {
            match self.item() {
                Ok(item) => items.push(item),
                Err(e) => {
                    self.errors.push(e);
                    self.synchronize();
                }
            }
        }

        if self.errors.is_empty() {
            Ok(Document { items })
        } else {
            Err(self.errors)
        }
    }

    // ========================================================================
    // Token cursor
    // ========================================================================

    fn is_at_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    fn current(&self) -> &Token {
        // The stream always ends with Eof, so pos is clamped to the last token.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> &Token {
        let token = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Span, SyntaxError> {
        if self.check(kind) {
            Ok(self.advance().span)
        } else {
            let found = self.current();
            Err(SyntaxError::new(
                format!("expected {}, found {}", kind.describe(), found.kind.describe()),
                found.span,
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<Spanned<String>, SyntaxError> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Spanned::new(name, token.span))
            }
            other => Err(SyntaxError::new(
                format!("expected identifier, found {}", other.describe()),
                token.span,
            )),
        }
    }

    /// Skip to the next top-level keyword after an error.
    fn synchronize(&mut self) {
        while !self.is_at_end() {
            match self.current().kind {
                TokenKind::Include | TokenKind::Entity | TokenKind::Alias | TokenKind::Command => {
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ========================================================================
    // Items
    // ========================================================================

    fn item(&mut self) -> Result<Spanned<Item>, SyntaxError> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Include => self.include(),
            TokenKind::Entity => self.entity(),
            TokenKind::Alias => self.alias(),
            TokenKind::Command => self.command(),
            other => Err(SyntaxError::new(
                format!(
                    "expected 'include', 'entity', 'alias' or 'command', found {}",
                    other.describe()
                ),
                token.span,
            )),
        }
    }

    fn include(&mut self) -> Result<Spanned<Item>, SyntaxError> {
        let start = self.expect(&TokenKind::Include)?;
        let token = self.current().clone();
        match token.kind {
            TokenKind::StringLit(reference) => {
                self.advance();
                if reference.is_empty() {
                    return Err(SyntaxError::new("include reference is empty", token.span));
                }
                Ok(Spanned::new(
                    Item::Include(IncludeDirective { reference }),
                    start.merge(token.span),
                ))
            }
            other => Err(SyntaxError::new(
                format!("expected string literal after 'include', found {}", other.describe()),
                token.span,
            )),
        }
    }

    fn entity(&mut self) -> Result<Spanned<Item>, SyntaxError> {
        let start = self.expect(&TokenKind::Entity)?;
        let name = self.expect_ident()?;
        self.expect(&TokenKind::LBrace)?;

        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let field_name = self.expect_ident()?;
            self.expect(&TokenKind::Colon)?;
            let ty = self.type_expr()?;
            let span = field_name.span.merge(ty.span);
            fields.push(Spanned::new(
                FieldDecl {
                    name: field_name,
                    ty,
                },
                span,
            ));
            // Fields are newline-separated in practice; a trailing comma is tolerated.
            self.eat(&TokenKind::Comma);
        }
        let end = self.expect(&TokenKind::RBrace)?;

        Ok(Spanned::new(
            Item::Entity(EntityDecl { name, fields }),
            start.merge(end),
        ))
    }

    fn alias(&mut self) -> Result<Spanned<Item>, SyntaxError> {
        let start = self.expect(&TokenKind::Alias)?;
        let name = self.expect_ident()?;
        self.expect(&TokenKind::Equals)?;
        let ty = self.type_expr()?;
        let span = start.merge(ty.span);
        Ok(Spanned::new(Item::Alias(AliasDecl { name, ty }), span))
    }

    fn command(&mut self) -> Result<Spanned<Item>, SyntaxError> {
        let start = self.expect(&TokenKind::Command)?;
        let name = self.expect_ident()?;
        self.expect(&TokenKind::LParen)?;

        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let param_name = self.expect_ident()?;
                self.expect(&TokenKind::Colon)?;
                let ty = self.type_expr()?;
                let span = param_name.span.merge(ty.span);
                params.push(Spanned::new(
                    ParamDecl {
                        name: param_name,
                        ty,
                    },
                    span,
                ));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let mut end = self.expect(&TokenKind::RParen)?;

        let result = if self.eat(&TokenKind::Arrow) {
            let ty = self.type_expr()?;
            end = ty.span;
            Some(ty)
        } else {
            None
        };

        Ok(Spanned::new(
            Item::Command(CommandDecl {
                name,
                params,
                result,
            }),
            start.merge(end),
        ))
    }

    // ========================================================================
    // Types
    // ========================================================================

    fn type_expr(&mut self) -> Result<Spanned<TypeExpr>, SyntaxError> {
        let mut ty = self.base_type()?;
        while self.check(&TokenKind::Question) {
            let q = self.advance().span;
            let span = ty.span.merge(q);
            ty = Spanned::new(TypeExpr::Optional(Box::new(ty)), span);
        }
        Ok(ty)
    }

    fn base_type(&mut self) -> Result<Spanned<TypeExpr>, SyntaxError> {
        let name = self.expect_ident()?;

        // `List` and `Map` are ordinary identifiers unless followed by `<`.
        match name.node.as_str() {
            "List" if self.check(&TokenKind::LAngle) => {
                self.advance();
                let element = self.type_expr()?;
                let end = self.expect(&TokenKind::RAngle)?;
                Ok(Spanned::new(
                    TypeExpr::List(Box::new(element)),
                    name.span.merge(end),
                ))
            }
            "Map" if self.check(&TokenKind::LAngle) => {
                self.advance();
                let key = self.type_expr()?;
                self.expect(&TokenKind::Comma)?;
                let value = self.type_expr()?;
                let end = self.expect(&TokenKind::RAngle)?;
                Ok(Spanned::new(
                    TypeExpr::Map(Box::new(key), Box::new(value)),
                    name.span.merge(end),
                ))
            }
            _ => {
                let span = name.span;
                Ok(Spanned::new(TypeExpr::Named(name.node), span))
            }
        }
    }
}
