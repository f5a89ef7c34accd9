//! A small WGSL scanner.
//!
//! Fusion never parses WGSL; it only needs identifiers with enough context to
//! rename symbols safely. Every byte of the source is kept in some token so
//! a rewrite can re-emit untouched text verbatim.

use std::collections::BTreeMap;
use std::fmt;

use lumen_core::{LumenError, LumenResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Number(String),
    Punct(char),
    Whitespace(String),
    Comment(String),
}

impl TokenKind {
    fn is_trivia(&self) -> bool {
        matches!(self, TokenKind::Whitespace(_) | TokenKind::Comment(_))
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Identifier(s)
            | TokenKind::Number(s)
            | TokenKind::Whitespace(s)
            | TokenKind::Comment(s) => f.write_str(s),
            TokenKind::Punct(c) => write!(f, "{}", c),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// Brace nesting depth at the start of the token.
    pub depth: usize,
}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    depth: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            depth: 0,
        }
    }

    pub fn tokenize(&mut self) -> LumenResult<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn next_token(&mut self) -> LumenResult<Option<Token>> {
        let start = self.pos;
        let line = self.line;
        let column = self.column;
        let depth = self.depth;

        let Some(ch) = self.peek() else {
            return Ok(None);
        };

        let kind = match ch {
            c if c.is_whitespace() => TokenKind::Whitespace(self.read_while(char::is_whitespace)),
            '/' if self.peek_next() == Some('/') => {
                TokenKind::Comment(self.read_while(|c| c != '\n'))
            }
            '/' if self.peek_next() == Some('*') => TokenKind::Comment(self.read_block_comment(line, column)?),
            c if c.is_ascii_digit() => {
                TokenKind::Number(self.read_while(|c| c.is_ascii_alphanumeric() || c == '.'))
            }
            c if c.is_alphabetic() || c == '_' => {
                TokenKind::Identifier(self.read_while(|c| c.is_alphanumeric() || c == '_'))
            }
            c => {
                self.advance();
                match c {
                    '{' => self.depth += 1,
                    '}' => {
                        self.depth = self.depth.checked_sub(1).ok_or_else(|| {
                            LumenError::InvalidArgument(format!(
                                "unbalanced '}}' at {}:{}",
                                line, column
                            ))
                        })?
                    }
                    _ => {}
                }
                TokenKind::Punct(c)
            }
        };

        Ok(Some(Token {
            kind,
            span: Span::new(start, self.pos, line, column),
            depth,
        }))
    }

    fn read_block_comment(&mut self, line: usize, column: usize) -> LumenResult<String> {
        let mut text = String::new();
        let mut nesting = 0usize;
        while let Some(c) = self.advance() {
            text.push(c);
            if c == '/' && self.peek() == Some('*') {
                text.push('*');
                self.advance();
                nesting += 1;
            } else if c == '*' && self.peek() == Some('/') {
                text.push('/');
                self.advance();
                nesting -= 1;
                if nesting == 0 {
                    return Ok(text);
                }
            }
        }
        Err(LumenError::InvalidArgument(format!(
            "unterminated block comment starting at {}:{}",
            line, column
        )))
    }

    fn read_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
        let mut result = String::new();
        while let Some(ch) = self.peek() {
            if predicate(ch) {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }
}

/// Kind of a top-level WGSL declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Function,
    Const,
    Var,
    Override,
    Struct,
    Alias,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub kind: DeclKind,
    pub name: String,
}

/// Names declared at module scope (`fn`, `const`, `var`, `override`, `struct`, `alias`).
pub fn top_level_declarations(tokens: &[Token]) -> Vec<Declaration> {
    let significant: Vec<&Token> = tokens.iter().filter(|t| !t.kind.is_trivia()).collect();
    let mut decls = Vec::new();
    let mut i = 0;
    while i < significant.len() {
        let token = significant[i];
        let kind = match &token.kind {
            TokenKind::Identifier(word) if token.depth == 0 => match word.as_str() {
                "fn" => Some(DeclKind::Function),
                "const" => Some(DeclKind::Const),
                "var" => Some(DeclKind::Var),
                "override" => Some(DeclKind::Override),
                "struct" => Some(DeclKind::Struct),
                "alias" => Some(DeclKind::Alias),
                _ => None,
            },
            _ => None,
        };
        i += 1;
        let Some(kind) = kind else { continue };

        // `var<uniform>` carries a template list before the name.
        if kind == DeclKind::Var && matches!(significant.get(i).map(|t| &t.kind), Some(TokenKind::Punct('<'))) {
            while i < significant.len() && significant[i].kind != TokenKind::Punct('>') {
                i += 1;
            }
            i += 1;
        }
        if let Some(TokenKind::Identifier(name)) = significant.get(i).map(|t| &t.kind) {
            decls.push(Declaration {
                kind,
                name: name.clone(),
            });
            i += 1;
        }
    }
    decls
}

/// Where a fragment of WGSL sits in the linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceScope {
    /// Top level: `const`, `var` and `override` declare module symbols.
    Module,
    /// Inside a function body: every declaration is a local.
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BraceKind {
    Block,
    Struct,
}

/// One `{ ... }` level and the names it declares.
#[derive(Debug)]
struct Frame {
    kind: BraceKind,
    locals: Vec<String>,
}

impl Frame {
    fn block(locals: Vec<String>) -> Self {
        Self {
            kind: BraceKind::Block,
            locals,
        }
    }
}

/// Re-emit `source` with identifiers renamed through `renames`.
///
/// Member accesses (`a.name`), attribute names (`@name`), struct members and
/// parameter names are left alone, as are comments. Function parameters and
/// `let`/`var`/`const` locals shadow `renames` until their block closes; a
/// local only takes effect after its declaration ends, so
/// `let x = x * 2.0;` still reads the outer `x` on the right-hand side.
pub fn rename_identifiers(
    source: &str,
    scope: SourceScope,
    renames: &BTreeMap<String, String>,
) -> LumenResult<String> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut out = String::with_capacity(source.len() + renames.len() * 8);
    let mut frames = match scope {
        SourceScope::Module => Vec::new(),
        SourceScope::Function => vec![Frame::block(Vec::new())],
    };
    let mut prev_significant: Option<&TokenKind> = None;
    let mut declaring = false;
    let mut template_depth = 0usize;
    let mut paren_depth = 0usize;
    // Parameters seen between `fn` and the opening brace of its body.
    let mut signature: Option<Vec<String>> = None;
    let mut struct_next = false;
    let mut pending_local: Option<String> = None;

    for (i, token) in tokens.iter().enumerate() {
        match &token.kind {
            TokenKind::Identifier(word)
                if matches!(word.as_str(), "var" | "const" | "override" | "let") =>
            {
                declaring = true;
                out.push_str(word);
            }
            TokenKind::Identifier(word) if word == "fn" => {
                signature = Some(Vec::new());
                out.push_str(word);
            }
            TokenKind::Identifier(word) if word == "struct" => {
                struct_next = true;
                out.push_str(word);
            }
            TokenKind::Identifier(name) => {
                let in_template = declaring && template_depth > 0;
                let declared = declaring && template_depth == 0;
                if declared {
                    declaring = false;
                }
                let after_accessor = matches!(prev_significant, Some(TokenKind::Punct('.' | '@')));
                let in_struct = frames.last().is_some_and(|f| f.kind == BraceKind::Struct);
                let is_label = !declared
                    && (paren_depth > 0 || in_struct)
                    && is_followed_by_single_colon(&tokens[i + 1..]);
                if is_label && paren_depth == 1 {
                    if let Some(params) = signature.as_mut() {
                        params.push(name.clone());
                    }
                }
                let local = declared && frames.iter().any(|f| f.kind == BraceKind::Block);
                if local {
                    pending_local = Some(name.clone());
                }
                let shadowed = frames.iter().any(|f| f.locals.contains(name));
                match renames.get(name) {
                    Some(renamed)
                        if !after_accessor && !is_label && !in_template && !local && !shadowed =>
                    {
                        out.push_str(renamed)
                    }
                    _ => out.push_str(name),
                }
            }
            TokenKind::Punct(c) => {
                match *c {
                    '<' if declaring => template_depth += 1,
                    '>' if declaring && template_depth > 0 => template_depth -= 1,
                    '(' => paren_depth += 1,
                    ')' => paren_depth = paren_depth.saturating_sub(1),
                    '{' => {
                        let frame = if std::mem::take(&mut struct_next) {
                            Frame {
                                kind: BraceKind::Struct,
                                locals: Vec::new(),
                            }
                        } else {
                            Frame::block(signature.take().unwrap_or_default())
                        };
                        frames.push(frame);
                    }
                    '}' => {
                        frames.pop();
                    }
                    ';' => {
                        if let (Some(name), Some(frame)) = (pending_local.take(), frames.last_mut()) {
                            frame.locals.push(name);
                        }
                    }
                    _ => {}
                }
                out.push(*c);
            }
            other => out.push_str(&other.to_string()),
        }
        if !token.kind.is_trivia() {
            prev_significant = Some(&token.kind);
        }
    }
    Ok(out)
}

fn is_followed_by_single_colon(rest: &[Token]) -> bool {
    let mut significant = rest.iter().filter(|t| !t.kind.is_trivia());
    matches!(significant.next().map(|t| &t.kind), Some(TokenKind::Punct(':')))
        && !matches!(significant.next().map(|t| &t.kind), Some(TokenKind::Punct(':')))
}
