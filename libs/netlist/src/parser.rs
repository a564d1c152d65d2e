//! SPICE-like netlist parser.

use std::borrow::Borrow;
use std::fmt::Display;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use arcstr::ArcStr;
use nom::bytes::complete::{take_till, take_while};
use thiserror::Error;

use crate::{Ast, Component, Elem, Instance, Mos, MosKind, Params, Subckt};

/// A substring of a file being parsed.
#[derive(Clone, Default, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct Substr(pub(crate) arcstr::Substr);

/// Parses SPICE-like netlists.
#[derive(Clone, Default, Eq, PartialEq, Debug)]
pub struct Parser {
    buffer: Vec<Token>,
    ast: Ast,
    state: ReaderState,
}

#[derive(Clone, Default, Eq, PartialEq, Debug)]
enum ReaderState {
    #[default]
    Top,
    Subckt(Subckt),
}

impl Parser {
    /// Parses the netlist file at the given path.
    pub fn parse_file(path: impl AsRef<Path>) -> Result<ParsedNetlist, ParserError> {
        let path = path.as_ref();
        tracing::debug!("reading netlist file: {:?}", path);
        let s: ArcStr = std::fs::read_to_string(path)
            .map_err(|err| ParserError::FailedToRead {
                path: path.into(),
                err,
            })?
            .into();
        let s = Substr(arcstr::Substr::full(s));
        let name = match path.file_stem() {
            Some(stem) => ArcStr::from(stem.to_string_lossy().into_owned()),
            None => arcstr::format!("{:?}", path),
        };
        let mut parser = Self::default();
        parser.parse_inner(s)?;
        Ok(ParsedNetlist {
            ast: parser.ast,
            root: Some(path.to_path_buf()),
            name,
        })
    }

    /// Parses the given netlist text.
    pub fn parse(data: impl Into<Substr>) -> Result<ParsedNetlist, ParserError> {
        let data = data.into();
        let mut parser = Self::default();
        parser.parse_inner(data)?;
        Ok(ParsedNetlist {
            ast: parser.ast,
            root: None,
            name: arcstr::literal!("netlist"),
        })
    }

    fn parse_inner(&mut self, data: Substr) -> Result<(), ParserError> {
        let mut tok = Tokenizer::new(data);
        while let Some(line) = self.parse_line(&mut tok)? {
            match (&mut self.state, line) {
                (ReaderState::Top, Line::SubcktDecl { name, ports }) => {
                    self.state = ReaderState::Subckt(Subckt {
                        name,
                        ports,
                        components: vec![],
                    });
                }
                (ReaderState::Top, Line::Component(c)) => {
                    self.ast.elems.push(Elem::Component(c));
                }
                (ReaderState::Subckt(subckt), Line::Component(c)) => {
                    subckt.components.push(c);
                }
                (ReaderState::Subckt(subckt), Line::EndSubckt) => {
                    let subckt = std::mem::take(subckt);
                    self.ast.elems.push(Elem::Subckt(subckt));
                    self.state = ReaderState::Top;
                }
                (_, line) => return Err(ParserError::UnexpectedLine(Box::new(line))),
            }
        }
        match self.state {
            ReaderState::Top => Ok(()),
            ReaderState::Subckt(_) => Err(ParserError::UnterminatedSubckt),
        }
    }

    fn parse_line(&mut self, tok: &mut Tokenizer) -> Result<Option<Line>, ParserError> {
        while let Some(token) = tok.get()? {
            if token == Token::LineEnd {
                if let Some(line) = self.parse_line_inner()? {
                    return Ok(Some(line));
                }
            } else {
                self.buffer.push(token);
            }
        }
        Ok(None)
    }

    fn parse_line_inner(&mut self) -> Result<Option<Line>, ParserError> {
        let first = match self.buffer.first() {
            Some(t) => t,
            None => return Ok(None),
        };
        let line = match first {
            Token::Directive(d) => {
                if d.eq_ignore_ascii_case(".subckt") {
                    if self.buffer.len() < 2 {
                        return Err(ParserError::InvalidLine {
                            line: std::mem::take(&mut self.buffer),
                            reason: ".subckt requires a name".to_string(),
                        });
                    }
                    let name = self.buffer[1].try_ident()?.clone();
                    let ports = self.buffer[2..]
                        .iter()
                        .map(|tok| tok.try_ident().cloned())
                        .collect::<Result<_, _>>()?;
                    Line::SubcktDecl { name, ports }
                } else if d.eq_ignore_ascii_case(".ends") {
                    Line::EndSubckt
                } else {
                    // Directives like .model, .global, or .end carry no
                    // placement-relevant information. Skip them.
                    tracing::debug!("ignoring directive: {}", d);
                    self.buffer.clear();
                    return Ok(None);
                }
            }
            Token::Ident(id) => {
                let kind = match id.chars().next() {
                    Some(c) => c.to_ascii_uppercase(),
                    None => return Err(ParserError::UnexpectedToken(first.clone())),
                };
                match kind {
                    'M' => Line::Component(Component::Mos(self.parse_mos()?)),
                    'X' => Line::Component(Component::Instance(self.parse_instance()?)),
                    kind => return Err(ParserError::UnexpectedComponentType(kind)),
                }
            }
            tok => return Err(ParserError::UnexpectedToken(tok.clone())),
        };
        self.buffer.clear();
        Ok(Some(line))
    }

    /// Parses a MOS device line:
    ///
    /// ```spice
    /// Mname drain gate source [body] model param1=value1 ...
    /// ```
    ///
    /// The body terminal is optional; the model token is located as the
    /// last token before the first `=`, or the last token of the line when
    /// no parameters are given.
    fn parse_mos(&mut self) -> Result<Mos, ParserError> {
        let model_idx = self.model_index();
        // name + 3 or 4 terminals, then the model.
        if !(4..=5).contains(&model_idx) {
            return Err(ParserError::InvalidLine {
                line: std::mem::take(&mut self.buffer),
                reason: "MOS device lines require 3 or 4 terminals followed by a model"
                    .to_string(),
            });
        }
        let model = self.buffer[model_idx].try_ident()?.clone();
        let kind = MosKind::from_model(&model)
            .ok_or_else(|| ParserError::UnknownMosModel(model.clone()))?;
        let params = self.parse_params(model_idx + 1)?;
        Ok(Mos {
            name: self.buffer[0].try_ident()?.clone(),
            d: self.buffer[1].try_ident()?.clone(),
            g: self.buffer[2].try_ident()?.clone(),
            s: self.buffer[3].try_ident()?.clone(),
            b: if model_idx == 5 {
                Some(self.buffer[4].try_ident()?.clone())
            } else {
                None
            },
            model,
            kind,
            params,
        })
    }

    /// Parses a subcircuit instance line:
    ///
    /// ```spice
    /// Xname port0 port1 port2 child param1=value1 ...
    /// ```
    fn parse_instance(&mut self) -> Result<Instance, ParserError> {
        let child_idx = self.model_index();
        if child_idx < 1 || child_idx >= self.buffer.len() {
            return Err(ParserError::InvalidLine {
                line: std::mem::take(&mut self.buffer),
                reason: "instance lines require ports followed by a child cell".to_string(),
            });
        }
        let child = self.buffer[child_idx].try_ident()?.clone();
        let ports = self.buffer[1..child_idx]
            .iter()
            .map(|x| x.try_ident().cloned())
            .collect::<Result<Vec<_>, _>>()?;
        let params = self.parse_params(child_idx + 1)?;
        Ok(Instance {
            name: self.buffer[0].try_ident()?.clone(),
            ports,
            child,
            params,
        })
    }

    /// The index of the model/child token: the token two positions before
    /// the first `=`, or the final token if the line has no parameters.
    fn model_index(&self) -> usize {
        self.buffer
            .iter()
            .position(|t| matches!(t, Token::Equals))
            .map(|p| p.saturating_sub(2))
            .unwrap_or(self.buffer.len() - 1)
    }

    fn parse_params(&mut self, start: usize) -> Result<Params, ParserError> {
        let mut params = Params::default();
        for i in (start..self.buffer.len()).step_by(3) {
            if i + 2 >= self.buffer.len() || !matches!(self.buffer[i + 1], Token::Equals) {
                return Err(ParserError::InvalidLine {
                    line: std::mem::take(&mut self.buffer),
                    reason: "parameters must be key=value pairs".to_string(),
                });
            }
            let k = self.buffer[i].try_ident()?.clone();
            let v = self.buffer[i + 2].try_ident()?.clone();
            params.insert(k, v);
        }
        Ok(params)
    }
}

/// A parsed netlist plus its provenance.
#[derive(Debug, Clone)]
pub struct ParsedNetlist {
    /// The parsed netlist contents.
    pub ast: Ast,
    /// The path of the parsed file, if parsed from a file.
    pub root: Option<PathBuf>,
    /// The netlist name (the file stem when parsed from a file).
    pub name: ArcStr,
}

/// A single logical line in a netlist.
///
/// A logical line spans multiple file lines when the later lines begin
/// with the `+` continuation character.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Line {
    /// A subcircuit declaration.
    SubcktDecl {
        /// The name of the subcircuit.
        name: Substr,
        /// The nodes exposed by the subcircuit.
        ports: Vec<Substr>,
    },
    /// A component instantiation.
    Component(Component),
    /// The end of a subcircuit.
    EndSubckt,
}

const LINE_CONTINUATION: char = '+';
const COMMENT_CHARS: [char; 2] = ['*', '$'];

#[inline]
fn is_newline(c: char) -> bool {
    c == '\n' || c == '\r'
}

#[inline]
fn is_space(c: char) -> bool {
    c == ' ' || c == '\t'
}

#[inline]
fn is_special(c: char) -> bool {
    c.is_whitespace() || c == '='
}

pub(crate) struct Tokenizer {
    data: Substr,
    rem: Substr,
    state: TokState,
}

/// A netlist token.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Token {
    /// A directive starting with a leading dot, e.g. `.subckt`.
    ///
    /// Case is preserved from the input file.
    Directive(Substr),
    /// An identifier.
    Ident(Substr),
    /// A line end indicator.
    LineEnd,
    /// An equal sign (`=`).
    Equals,
}

#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Debug)]
enum TokState {
    /// Initial state.
    #[default]
    Init,
    /// Parsing a line.
    Line,
}

/// An error arising from parsing a netlist.
#[derive(Debug, Error)]
pub enum ParserError {
    /// A tokenizer error.
    #[error("tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),
    /// Found a line in the wrong context.
    ///
    /// For example, a `.ends` line with no matching `.subckt` line.
    #[error("unexpected line: {0:?}")]
    UnexpectedLine(Box<Line>),
    /// A `.subckt` block with no terminating `.ends`.
    #[error("unterminated .subckt block")]
    UnterminatedSubckt,
    /// An unsupported component type prefix.
    #[error("unexpected component type: {0}")]
    UnexpectedComponentType(char),
    /// An unsupported or unexpected token.
    #[error("unexpected token: {0:?}")]
    UnexpectedToken(Token),
    /// A MOS model name that maps to neither NMOS nor PMOS.
    #[error("cannot infer device type from model name: {0}")]
    UnknownMosModel(Substr),
    /// A line that cannot be interpreted.
    #[error("invalid line `{line:?}`: {reason}")]
    InvalidLine {
        /// The tokens in the offending line.
        line: Vec<Token>,
        /// The reason the line is invalid.
        reason: String,
    },
    /// Error trying to read the given file.
    #[error("failed to read file at path `{path:?}`: {err:?}")]
    FailedToRead {
        /// The path we attempted to read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        err: std::io::Error,
    },
}

/// A tokenizer error.
#[derive(Debug, Error)]
pub struct TokenizerError {
    /// The byte offset in the input at which this error occurred.
    ofs: usize,
    message: ArcStr,
    token: Substr,
}

impl Tokenizer {
    pub(crate) fn new(data: impl Into<arcstr::Substr>) -> Self {
        let data = data.into();
        let rem = data.clone();
        Self {
            data: Substr(data),
            rem: Substr(rem),
            state: TokState::Init,
        }
    }

    pub(crate) fn get(&mut self) -> Result<Option<Token>, TokenizerError> {
        loop {
            self.take_ws();
            if self.rem.is_empty() {
                if self.state == TokState::Line {
                    // At EOF, but have not yet returned a final LineEnd token.
                    self.state = TokState::Init;
                    return Ok(Some(Token::LineEnd));
                } else {
                    return Ok(None);
                }
            }

            let c = match self.peek() {
                Some(c) => c,
                None => return Ok(None),
            };
            if c == '=' {
                self.take1();
                return Ok(Some(Token::Equals));
            }
            match self.state {
                TokState::Init => {
                    if COMMENT_CHARS.contains(&c) {
                        self.take_until_newline();
                    } else if c.is_whitespace() {
                        self.take1();
                    } else if c == LINE_CONTINUATION {
                        return Err(self.err("unexpected line continuation", c.to_string()));
                    } else {
                        self.state = TokState::Line;
                    }
                }
                TokState::Line => {
                    if is_newline(c) {
                        self.take1();
                        self.take_ws();
                        if self.peek().unwrap_or(LINE_CONTINUATION) != LINE_CONTINUATION {
                            self.state = TokState::Init;
                            return Ok(Some(Token::LineEnd));
                        }
                    } else if c == LINE_CONTINUATION {
                        self.take1();
                    } else if COMMENT_CHARS.contains(&c) {
                        self.take_until_newline();
                    } else if c == '.' {
                        let word = self.take_ident();
                        return Ok(Some(Token::Directive(word)));
                    } else {
                        let word = self.take_ident();
                        return Ok(Some(Token::Ident(word)));
                    }
                }
            }
        }
    }

    fn err(&self, message: impl Into<ArcStr>, token: impl Into<Substr>) -> TokenizerError {
        TokenizerError {
            ofs: self.data.len() - self.rem.len(),
            message: message.into(),
            token: token.into(),
        }
    }

    fn take1(&mut self) -> Option<char> {
        let c = self.rem.chars().next()?;
        self.rem = Substr(self.rem.substr(c.len_utf8()..));
        Some(c)
    }

    fn take_until_newline(&mut self) -> Substr {
        let (rest, comment) = take_till::<_, _, ()>(is_newline)(&**self.rem).unwrap();
        let comment = Substr(self.rem.substr_from(comment));
        self.rem = Substr(self.rem.substr_from(rest));
        comment
    }

    fn take_ident(&mut self) -> Substr {
        let (rest, value) = take_till::<_, _, ()>(is_special)(&**self.rem).unwrap();
        let value = Substr(self.rem.substr_from(value));
        self.rem = Substr(self.rem.substr_from(rest));
        value
    }

    fn take_ws(&mut self) {
        let (rest, _) = take_while::<_, _, ()>(is_space)(&**self.rem).unwrap();
        self.rem = Substr(self.rem.substr_from(rest));
    }

    fn peek(&self) -> Option<char> {
        self.rem.chars().next()
    }
}

pub(crate) struct Tokens {
    tok: Tokenizer,
}

impl Iterator for Tokens {
    type Item = Result<Token, TokenizerError>;
    fn next(&mut self) -> Option<Self::Item> {
        self.tok.get().transpose()
    }
}

impl IntoIterator for Tokenizer {
    type Item = Result<Token, TokenizerError>;
    type IntoIter = Tokens;
    fn into_iter(self) -> Self::IntoIter {
        Tokens { tok: self }
    }
}

impl Deref for Substr {
    type Target = arcstr::Substr;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Substr {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Display for Substr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for Substr {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<Substr> for arcstr::Substr {
    fn from(value: Substr) -> Self {
        value.0
    }
}

impl From<&str> for Substr {
    fn from(value: &str) -> Self {
        Self(arcstr::Substr::from(value))
    }
}

impl From<String> for Substr {
    fn from(value: String) -> Self {
        Self(arcstr::Substr::from(value))
    }
}

impl From<arcstr::Substr> for Substr {
    fn from(value: arcstr::Substr) -> Self {
        Self(value)
    }
}

impl From<ArcStr> for Substr {
    fn from(value: ArcStr) -> Self {
        Self(arcstr::Substr::full(value))
    }
}

impl Token {
    fn try_ident(&self) -> Result<&Substr, ParserError> {
        match self {
            Self::Ident(x) => Ok(x),
            _ => Err(ParserError::UnexpectedToken(self.clone())),
        }
    }
}

impl Display for TokenizerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (token {} at offset {})",
            self.message, self.token, self.ofs
        )
    }
}
