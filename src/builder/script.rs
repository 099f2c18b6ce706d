//! The code dialect: a tiny statement language describing a control tree.
//!
//! ```text
//! // assignments target the preview root (a Panel)
//! Padding = 8;
//! Content = new StackLayout {
//!     Items = [new Label { Text = "Name" }, new TextBox()]
//! };
//!
//! // or a single expression that *is* the result
//! new Form { Title = "Main", Padding = 10, Content = new Label() };
//! ```
//!
//! Parsing yields a serializable `Program`; type names are only checked when
//! the program is evaluated against a type table.

use serde::{Deserialize, Serialize};

use super::compiler::Diagnostic;
use super::{MAX_DEPTH, nesting_too_deep};

/// Source position (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    New {
        ty: String,
        init: Vec<Init>,
        pos: Pos,
    },
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<Expr>),
}

/// `Name = value` inside an object initializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Init {
    pub name: String,
    pub value: Expr,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Assign(Init),
    Expr(Expr),
}

/// Compiled program: the unit handed from compiler to builder as bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Sym(char),
    Eof,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn pos(&self) -> Pos {
        Pos {
            line: self.line,
            column: self.column,
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    if ahead.peek() != Some(&'/') {
                        return;
                    }
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn next(&mut self) -> Result<(Token, Pos), Diagnostic> {
        self.skip_trivia();
        let pos = self.pos();
        let Some(&c) = self.chars.peek() else {
            return Ok((Token::Eof, pos));
        };

        if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&c) = self.chars.peek() {
                if !(c.is_alphanumeric() || c == '_' || c == '.') {
                    break;
                }
                ident.push(c);
                self.bump();
            }
            return Ok((Token::Ident(ident), pos));
        }

        if c.is_ascii_digit() || c == '-' {
            let mut digits = String::new();
            digits.push(c);
            self.bump();
            while let Some(&c) = self.chars.peek() {
                if !c.is_ascii_digit() {
                    break;
                }
                digits.push(c);
                self.bump();
            }
            return digits
                .parse()
                .map(|n| (Token::Int(n), pos))
                .map_err(|_| Diagnostic::new(pos, format!("invalid number `{digits}`")));
        }

        if c == '"' {
            self.bump();
            let mut text = String::new();
            loop {
                match self.bump() {
                    Some('"') => return Ok((Token::Str(text), pos)),
                    Some('\\') => match self.bump() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some(other) => text.push(other),
                        None => break,
                    },
                    Some('\n') | None => break,
                    Some(other) => text.push(other),
                }
            }
            return Err(Diagnostic::new(pos, "unterminated string"));
        }

        if "=;{}()[],".contains(c) {
            self.bump();
            return Ok((Token::Sym(c), pos));
        }

        Err(Diagnostic::new(pos, format!("unexpected character `{c}`")))
    }
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    pos: Pos,
    /// Open `new` and `[` levels
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Result<Self, Diagnostic> {
        let mut lexer = Lexer::new(source);
        let (current, pos) = lexer.next()?;
        Ok(Self {
            lexer,
            current,
            pos,
            depth: 0,
        })
    }

    fn advance(&mut self) -> Result<Token, Diagnostic> {
        let (next, pos) = self.lexer.next()?;
        self.pos = pos;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn expect(&mut self, sym: char) -> Result<(), Diagnostic> {
        if self.current == Token::Sym(sym) {
            self.advance()?;
            return Ok(());
        }
        Err(self.unexpected(&format!("`{sym}`")))
    }

    fn eat(&mut self, sym: char) -> Result<bool, Diagnostic> {
        if self.current == Token::Sym(sym) {
            self.advance()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn unexpected(&self, wanted: &str) -> Diagnostic {
        let found = match &self.current {
            Token::Ident(name) => format!("`{name}`"),
            Token::Str(_) => "a string".to_string(),
            Token::Int(n) => format!("`{n}`"),
            Token::Sym(c) => format!("`{c}`"),
            Token::Eof => "end of input".to_string(),
        };
        Diagnostic::new(self.pos, format!("expected {wanted}, found {found}"))
    }

    fn program(&mut self) -> Result<Program, Diagnostic> {
        let mut statements = Vec::new();
        while self.current != Token::Eof {
            if self.eat(';')? {
                continue;
            }
            statements.push(self.statement()?);
        }
        Ok(Program { statements })
    }

    fn statement(&mut self) -> Result<Statement, Diagnostic> {
        let statement = match &self.current {
            Token::Ident(name) if name != "new" => {
                let pos = self.pos;
                let name = name.clone();
                self.advance()?;
                self.expect('=')?;
                let value = self.expr()?;
                Statement::Assign(Init { name, value, pos })
            }
            _ => Statement::Expr(self.expr()?),
        };
        if self.current != Token::Eof {
            self.expect(';')?;
        }
        Ok(statement)
    }

    fn expr(&mut self) -> Result<Expr, Diagnostic> {
        let pos = self.pos;
        match self.advance()? {
            Token::Str(text) => Ok(Expr::Str(text)),
            Token::Int(n) => Ok(Expr::Int(n)),
            Token::Ident(word) if word == "true" => Ok(Expr::Bool(true)),
            Token::Ident(word) if word == "false" => Ok(Expr::Bool(false)),
            Token::Ident(word) if word == "new" => self.nested(pos, |p| p.new_expr(pos)),
            Token::Sym('[') => self.nested(pos, Self::list),
            other => {
                self.current = other;
                self.pos = pos;
                Err(self.unexpected("a value"))
            }
        }
    }

    fn nested(
        &mut self,
        pos: Pos,
        parse: impl FnOnce(&mut Self) -> Result<Expr, Diagnostic>,
    ) -> Result<Expr, Diagnostic> {
        if self.depth >= MAX_DEPTH {
            return Err(Diagnostic::new(pos, nesting_too_deep()));
        }
        self.depth += 1;
        let expr = parse(self);
        self.depth -= 1;
        expr
    }

    fn list(&mut self) -> Result<Expr, Diagnostic> {
        let mut items = Vec::new();
        while !self.eat(']')? {
            items.push(self.expr()?);
            if !self.eat(',')? {
                self.expect(']')?;
                break;
            }
        }
        Ok(Expr::List(items))
    }

    fn new_expr(&mut self, pos: Pos) -> Result<Expr, Diagnostic> {
        let ty = match self.advance()? {
            Token::Ident(ty) => ty,
            other => {
                self.current = other;
                return Err(self.unexpected("a type name"));
            }
        };

        if self.eat('(')? {
            self.expect(')')?;
        }

        let mut init = Vec::new();
        if self.eat('{')? {
            while !self.eat('}')? {
                let pos = self.pos;
                let name = match self.advance()? {
                    Token::Ident(name) => name,
                    other => {
                        self.current = other;
                        return Err(self.unexpected("a property name"));
                    }
                };
                self.expect('=')?;
                let value = self.expr()?;
                init.push(Init { name, value, pos });
                if !self.eat(',')? {
                    self.expect('}')?;
                    break;
                }
            }
        }

        Ok(Expr::New { ty, init, pos })
    }
}

/// Parse source text into a program.
pub fn parse(source: &str) -> Result<Program, Diagnostic> {
    Parser::new(source)?.program()
}
