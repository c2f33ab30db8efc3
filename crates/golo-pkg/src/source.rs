//! Source file headers.
//!
//! Only the part of a file that matters for dependency discovery is read:
//! the leading build constraints, the `package` clause and the `import`
//! declarations that follow it. Parsing stops at the first token that is not
//! part of an import declaration.

use crate::constraint::{Constraint, ConstraintError};
use crate::package::is_valid_module_id;
use logos::Logos;
use thiserror::Error;

/// Errors from parsing a file header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("line {line}: expected {expected}")]
    Expected { line: usize, expected: &'static str },

    #[error("line {line}: invalid token")]
    InvalidToken { line: usize },

    #[error("line {line}: invalid import path {path:?}")]
    InvalidImportPath { line: usize, path: String },

    #[error("line {line}: {source}")]
    Constraint {
        line: usize,
        #[source]
        source: ConstraintError,
    },
}

/// Tokens that can appear in a file header.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
enum HeaderToken {
    #[token("package")]
    Package,

    #[token("import")]
    Import,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(";")]
    Semicolon,

    #[token(".")]
    Dot,

    #[regex(r"[\p{XID_Start}_][\p{XID_Continue}]*")]
    Ident,

    /// Interpreted string literal: "..."
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    String,

    /// Raw string literal: `...`
    #[regex(r"`[^`]*`")]
    RawString,
}

/// The dependency-relevant content of one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHeader {
    /// Declared package name.
    pub package: String,
    /// Import paths in declaration order (may repeat).
    pub imports: Vec<String>,
    /// Build constraint from the leading comments, if any.
    pub constraint: Option<Constraint>,
}

/// Parse the header of a source file.
pub fn parse_header(src: &str) -> Result<FileHeader, HeaderError> {
    let src = src.strip_prefix('\u{feff}').unwrap_or(src);
    let constraint = leading_constraint(src)?;
    let mut parser = HeaderParser::new(src);

    parser.expect(HeaderToken::Package, "'package'")?;
    let package = parser.ident("package name")?;
    parser.skip_semicolons();

    let mut imports = Vec::new();
    while parser.eat(HeaderToken::Import)? {
        if parser.eat(HeaderToken::LParen)? {
            loop {
                parser.skip_semicolons();
                if parser.eat(HeaderToken::RParen)? {
                    break;
                }
                imports.push(parser.import_spec()?);
            }
        } else {
            imports.push(parser.import_spec()?);
        }
        parser.skip_semicolons();
    }

    Ok(FileHeader {
        package,
        imports,
        constraint,
    })
}

struct HeaderParser<'src> {
    lexer: logos::Lexer<'src, HeaderToken>,
    src: &'src str,
    peeked: Option<Option<(HeaderToken, std::ops::Range<usize>)>>,
    offset: usize,
}

impl<'src> HeaderParser<'src> {
    fn new(src: &'src str) -> Self {
        Self {
            lexer: HeaderToken::lexer(src),
            src,
            peeked: None,
            offset: 0,
        }
    }

    /// Line of the pending token, or of the last consumed one at end of input.
    fn line(&self) -> usize {
        let offset = match &self.peeked {
            Some(Some((_, span))) => span.start,
            _ => self.offset,
        };
        line_of(self.src, offset)
    }

    fn peek(&mut self) -> Result<Option<HeaderToken>, HeaderError> {
        if self.peeked.is_none() {
            let next = match self.lexer.next() {
                None => None,
                Some(Ok(tok)) => Some((tok, self.lexer.span())),
                Some(Err(())) => {
                    let line = line_of(self.src, self.lexer.span().start);
                    return Err(HeaderError::InvalidToken { line });
                }
            };
            self.peeked = Some(next);
        }
        Ok(self.peeked.as_ref().and_then(|p| p.as_ref().map(|(tok, _)| *tok)))
    }

    fn bump(&mut self) -> Option<(HeaderToken, &'src str)> {
        let (tok, span) = self.peeked.take().flatten()?;
        let src = self.src;
        self.offset = span.start;
        Some((tok, &src[span]))
    }

    fn eat(&mut self, want: HeaderToken) -> Result<bool, HeaderError> {
        if self.peek()? == Some(want) {
            self.bump();
            return Ok(true);
        }
        Ok(false)
    }

    fn expect(&mut self, want: HeaderToken, expected: &'static str) -> Result<(), HeaderError> {
        if self.eat(want)? {
            Ok(())
        } else {
            Err(HeaderError::Expected {
                line: self.line(),
                expected,
            })
        }
    }

    fn ident(&mut self, expected: &'static str) -> Result<String, HeaderError> {
        if self.peek()? == Some(HeaderToken::Ident) {
            if let Some((_, text)) = self.bump() {
                return Ok(text.to_string());
            }
        }
        Err(HeaderError::Expected {
            line: self.line(),
            expected,
        })
    }

    fn skip_semicolons(&mut self) {
        // A lexing error here surfaces on the next real read.
        while let Ok(true) = self.eat(HeaderToken::Semicolon) {}
    }

    /// `[ "." | "_" | ident ] path`
    fn import_spec(&mut self) -> Result<String, HeaderError> {
        match self.peek()? {
            Some(HeaderToken::Dot | HeaderToken::Ident) => {
                self.bump();
            }
            _ => {}
        }
        match self.peek()? {
            Some(HeaderToken::String | HeaderToken::RawString) => {
                let (tok, text) = self.bump().ok_or(HeaderError::Expected {
                    line: self.line(),
                    expected: "import path",
                })?;
                let line = self.line();
                let path = match tok {
                    HeaderToken::RawString => Some(text[1..text.len() - 1].to_string()),
                    _ => unquote(text),
                };
                match path {
                    Some(path) if is_valid_import_path(&path) => Ok(path),
                    _ => Err(HeaderError::InvalidImportPath {
                        line,
                        path: text.to_string(),
                    }),
                }
            }
            _ => Err(HeaderError::Expected {
                line: self.line(),
                expected: "import path",
            }),
        }
    }
}

fn line_of(src: &str, offset: usize) -> usize {
    src[..offset.min(src.len())].matches('\n').count() + 1
}

/// Decode an interpreted string literal, quotes included.
fn unquote(lit: &str) -> Option<String> {
    let inner = lit.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                out.push(char::from(u8::from_str_radix(&hex, 16).ok()?));
            }
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

fn is_valid_import_path(path: &str) -> bool {
    is_valid_module_id(path)
}

/// Collect the build constraint from the comment lines preceding the
/// `package` clause.
///
/// `//go:build` is honored anywhere in those comments. `// +build` lines
/// only count when a blank line separates them from the package clause, so
/// they are not mistaken for part of the package documentation.
fn leading_constraint(src: &str) -> Result<Option<Constraint>, HeaderError> {
    let mut go_build = None;
    let mut plus_build = Vec::new();
    let mut last_blank = None;
    let mut in_block = false;

    for (idx, raw) in src.lines().enumerate() {
        let line = raw.trim();
        let line_no = idx + 1;

        if in_block {
            if line.contains("*/") {
                in_block = false;
            }
            continue;
        }
        if line.is_empty() {
            last_blank = Some(idx);
            continue;
        }
        if line.starts_with("/*") {
            in_block = !line.contains("*/");
            continue;
        }
        let Some(comment) = line.strip_prefix("//") else {
            break;
        };

        let wrap = |source: ConstraintError| HeaderError::Constraint {
            line: line_no,
            source,
        };
        if let Some(expr) = comment.strip_prefix("go:build") {
            if !expr.is_empty() && !expr.starts_with(char::is_whitespace) {
                continue;
            }
            if go_build.is_some() {
                return Err(wrap(ConstraintError::Duplicate));
            }
            go_build = Some(Constraint::parse(expr).map_err(wrap)?);
        } else if let Some(args) = comment.trim_start().strip_prefix("+build") {
            if !args.is_empty() && !args.starts_with(char::is_whitespace) {
                continue;
            }
            if let Some(c) = Constraint::parse_plus_build(args).map_err(wrap)? {
                plus_build.push((idx, c));
            }
        }
    }

    let plus_build = plus_build
        .into_iter()
        .filter(|(idx, _)| last_blank.is_some_and(|blank| *idx < blank))
        .map(|(_, c)| c)
        .collect();
    Ok(go_build.or_else(|| Constraint::all(plus_build)))
}
