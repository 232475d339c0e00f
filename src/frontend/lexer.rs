//! Lexer for the Def API language
//!
//! Handles tokenization of the `.def` surface:
//! - Keywords (`include`, `entity`, `alias`, `command`)
//! - Identifiers and string literals
//! - Punctuation (`{`, `}`, `(`, `)`, `<`, `>`, `:`, `,`, `=`, `?`, `->`)
//! - `//` line comments
//!
//! Whitespace is insignificant; there is no indentation handling.

use crate::frontend::ast::Span;
use crate::frontend::diagnostics::SyntaxError;

/// Token kinds for the `.def` surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    Include,
    Entity,
    Alias,
    Command,

    // Atoms
    Ident(String),
    StringLit(String),

    // Punctuation
    LBrace,
    RBrace,
    LParen,
    RParen,
    LAngle,
    RAngle,
    Colon,
    Comma,
    Equals,
    Question,
    Arrow,

    Eof,
}

impl TokenKind {
    /// Human-readable name used in "expected X, found Y" messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Include => "'include'".to_string(),
            TokenKind::Entity => "'entity'".to_string(),
            TokenKind::Alias => "'alias'".to_string(),
            TokenKind::Command => "'command'".to_string(),
            TokenKind::Ident(name) => format!("identifier '{}'", name),
            TokenKind::StringLit(_) => "string literal".to_string(),
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LAngle => "'<'".to_string(),
            TokenKind::RAngle => "'>'".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Equals => "'='".to_string(),
            TokenKind::Question => "'?'".to_string(),
            TokenKind::Arrow => "'->'".to_string(),
            TokenKind::Eof => "end of file".to_string(),
        }
    }
}

/// A token with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Tokenize a source string.
///
/// Returns the token stream (always terminated by `Eof`) or the list of
/// lexical errors. The lexer recovers from bad characters so one pass can
/// report every problem.
pub fn lex(source: &str) -> Result<Vec<Token>, Vec<SyntaxError>> {
    Lexer::new(source).tokenize()
}

/// Lexer state over one source file.
struct Lexer<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    tokens: Vec<Token>,
    errors: Vec<SyntaxError>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, Vec<SyntaxError>> {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                '/' => self.scan_comment_or_error(),
                '"' => self.scan_string(),
                c if c.is_ascii_alphabetic() || c == '_' => self.scan_ident(),
                _ => self.scan_punctuation(),
            }
        }

        self.tokens.push(Token::new(
            TokenKind::Eof,
            Span::new(self.current_pos, self.current_pos),
        ));

        if self.errors.is_empty() {
            Ok(self.tokens)
        } else {
            Err(self.errors)
        }
    }

    // ========================================================================
    // Core character handling
    // ========================================================================

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn advance(&mut self) -> Option<char> {
        if let Some((pos, c)) = self.chars.next() {
            self.current_pos = pos + c.len_utf8();
            Some(c)
        } else {
            None
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        self.tokens.push(Token::new(kind, Span::new(start, self.current_pos)));
    }

    // ========================================================================
    // Scanners
    // ========================================================================

    fn scan_comment_or_error(&mut self) {
        let start = self.current_pos;
        self.advance();
        if self.peek() == Some('/') {
            // Comment runs to end of line
            while let Some(c) = self.peek() {
                if c == '\n' {
                    break;
                }
                self.advance();
            }
        } else {
            self.errors.push(SyntaxError::new(
                "unexpected character '/'; comments start with '//'",
                Span::new(start, self.current_pos),
            ));
        }
    }

    fn scan_ident(&mut self) {
        let start = self.current_pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.source[start..self.current_pos];
        let kind = match text {
            "include" => TokenKind::Include,
            "entity" => TokenKind::Entity,
            "alias" => TokenKind::Alias,
            "command" => TokenKind::Command,
            _ => TokenKind::Ident(text.to_string()),
        };
        self.push(kind, start);
    }

    fn scan_string(&mut self) {
        let start = self.current_pos;
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.advance() {
                Some('"') => {
                    self.push(TokenKind::StringLit(value), start);
                    return;
                }
                Some('\\') => match self.advance() {
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some(other) => {
                        self.errors.push(SyntaxError::new(
                            format!("unknown escape sequence '\\{}'", other),
                            Span::new(self.current_pos - other.len_utf8() - 1, self.current_pos),
                        ));
                    }
                    None => break,
                },
                Some('\n') | None => break,
                Some(c) => value.push(c),
            }
        }
        self.errors.push(SyntaxError::new(
            "unterminated string literal",
            Span::new(start, self.current_pos),
        ));
    }

    fn scan_punctuation(&mut self) {
        let start = self.current_pos;
        let c = match self.advance() {
            Some(c) => c,
            None => return,
        };
        let kind = match c {
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '<' => TokenKind::LAngle,
            '>' => TokenKind::RAngle,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            '=' => TokenKind::Equals,
            '?' => TokenKind::Question,
            '-' if self.peek() == Some('>') => {
                self.advance();
                TokenKind::Arrow
            }
            other => {
                self.errors.push(SyntaxError::new(
                    format!("unexpected character '{}'", other),
                    Span::new(start, self.current_pos),
                ));
                return;
            }
        };
        self.push(kind, start);
    }
}
