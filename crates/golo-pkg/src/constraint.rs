//! Build constraints.
//!
//! Files can restrict the targets they build for with a header line:
//! ```text
//! //go:build linux && (amd64 || arm64) && !cgo
//! ```
//! The older form is still honored when no `//go:build` line is present.
//! Each `// +build` line is a space-separated list of alternatives, each a
//! comma-separated list of required tags; multiple lines must all hold:
//! ```text
//! // +build linux,amd64 darwin
//! ```

use logos::Logos;
use std::fmt;
use thiserror::Error;

/// Errors from parsing a constraint expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("unexpected end of build constraint")]
    UnexpectedEnd,

    #[error("unexpected token '{0}' in build constraint")]
    UnexpectedToken(String),

    #[error("invalid character '{0}' in build constraint")]
    InvalidChar(char),

    #[error("multiple //go:build lines")]
    Duplicate,
}

/// A parsed build constraint expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Tag(String),
    Not(Box<Constraint>),
    And(Box<Constraint>, Box<Constraint>),
    Or(Box<Constraint>, Box<Constraint>),
}

impl Constraint {
    /// Evaluate against a tag predicate.
    pub fn eval(&self, has_tag: &impl Fn(&str) -> bool) -> bool {
        match self {
            Self::Tag(tag) => has_tag(tag),
            Self::Not(inner) => !inner.eval(has_tag),
            Self::And(a, b) => a.eval(has_tag) && b.eval(has_tag),
            Self::Or(a, b) => a.eval(has_tag) || b.eval(has_tag),
        }
    }

    fn and(a: Self, b: Self) -> Self {
        Self::And(Box::new(a), Box::new(b))
    }

    fn or(a: Self, b: Self) -> Self {
        Self::Or(Box::new(a), Box::new(b))
    }

    /// Parse a `//go:build` expression (the text after the directive).
    pub fn parse(expr: &str) -> Result<Self, ConstraintError> {
        let tokens = tokenize(expr)?;
        let mut parser = ExprParser { tokens, pos: 0 };
        let constraint = parser.or_expr()?;
        match parser.peek() {
            None => Ok(constraint),
            Some(tok) => Err(ConstraintError::UnexpectedToken(tok.to_string())),
        }
    }

    /// Parse the arguments of one `// +build` line.
    ///
    /// Returns `None` for an empty line, which constrains nothing.
    pub fn parse_plus_build(line: &str) -> Result<Option<Self>, ConstraintError> {
        let mut alternatives = Vec::new();
        for option in line.split_whitespace() {
            let mut required = Vec::new();
            for term in option.split(',') {
                let (negated, tag) = match term.strip_prefix('!') {
                    Some(rest) => (true, rest),
                    None => (false, term),
                };
                if tag.is_empty() || !tag.chars().all(is_tag_char) {
                    return Err(ConstraintError::UnexpectedToken(term.to_string()));
                }
                let atom = Self::Tag(tag.to_string());
                required.push(if negated { Self::Not(Box::new(atom)) } else { atom });
            }
            if let Some(all) = required.into_iter().reduce(Self::and) {
                alternatives.push(all);
            }
        }
        Ok(alternatives.into_iter().reduce(Self::or))
    }

    /// Combine legacy lines: every line must hold.
    #[must_use]
    pub fn all(lines: Vec<Self>) -> Option<Self> {
        lines.into_iter().reduce(Self::and)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => write!(f, "{tag}"),
            Self::Not(inner) => write!(f, "!{inner}"),
            Self::And(a, b) => write!(f, "({a} && {b})"),
            Self::Or(a, b) => write!(f, "({a} || {b})"),
        }
    }
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

/// Tokens of a `//go:build` expression.
#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum ConstraintToken {
    #[token("!")]
    Not,

    #[token("&&")]
    And,

    #[token("||")]
    Or,

    #[token("(")]
    Open,

    #[token(")")]
    Close,

    #[regex(r"[\p{L}\p{N}_.]+", |lex| lex.slice().to_string())]
    Tag(String),
}

impl fmt::Display for ConstraintToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => write!(f, "{tag}"),
            Self::Not => write!(f, "!"),
            Self::And => write!(f, "&&"),
            Self::Or => write!(f, "||"),
            Self::Open => write!(f, "("),
            Self::Close => write!(f, ")"),
        }
    }
}

fn tokenize(expr: &str) -> Result<Vec<ConstraintToken>, ConstraintError> {
    let mut lexer = ConstraintToken::lexer(expr);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next() {
        match token {
            Ok(token) => tokens.push(token),
            Err(()) => {
                let bad = lexer.slice().chars().next().unwrap_or_default();
                return Err(ConstraintError::InvalidChar(bad));
            }
        }
    }
    Ok(tokens)
}

struct ExprParser {
    tokens: Vec<ConstraintToken>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&ConstraintToken> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<ConstraintToken> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn or_expr(&mut self) -> Result<Constraint, ConstraintError> {
        let mut lhs = self.and_expr()?;
        while self.peek() == Some(&ConstraintToken::Or) {
            self.pos += 1;
            let rhs = self.and_expr()?;
            lhs = Constraint::or(lhs, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Constraint, ConstraintError> {
        let mut lhs = self.unary()?;
        while self.peek() == Some(&ConstraintToken::And) {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Constraint::and(lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Constraint, ConstraintError> {
        match self.next() {
            Some(ConstraintToken::Not) => Ok(Constraint::Not(Box::new(self.unary()?))),
            Some(ConstraintToken::Open) => {
                let inner = self.or_expr()?;
                match self.next() {
                    Some(ConstraintToken::Close) => Ok(inner),
                    Some(tok) => Err(ConstraintError::UnexpectedToken(tok.to_string())),
                    None => Err(ConstraintError::UnexpectedEnd),
                }
            }
            Some(ConstraintToken::Tag(tag)) => Ok(Constraint::Tag(tag)),
            Some(tok) => Err(ConstraintError::UnexpectedToken(tok.to_string())),
            None => Err(ConstraintError::UnexpectedEnd),
        }
    }
}
