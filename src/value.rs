// addon-shell/src/value.rs

use serde::{Deserialize, Serialize};
use std::{
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
    path::PathBuf,
};

use crate::error::{ShellError, ShellResult};

/// One item as held by a parameter, or as typed by a user before a checker
/// coerced it (`Str`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Path(PathBuf),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self { Self::Str(s.into()) }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Path(_) => "path",
        }
    }

    pub fn as_bool(&self) -> Option<bool> { if let Self::Bool(b) = self { Some(*b) } else { None } }
    pub fn as_int(&self) -> Option<i64> { if let Self::Int(i) = self { Some(*i) } else { None } }

    /// Best-effort typing of a bare script token: boolean, integer, float,
    /// then string.
    pub fn infer(token: &str) -> Self {
        match token {
            "True" | "true" => return Self::Bool(true),
            "False" | "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(i) = token.parse::<i64>() { return Self::Int(i); }
        if let Ok(f) = token.parse::<f64>() { if f.is_finite() { return Self::Float(f); } }
        Self::Str(token.to_string())
    }

    /// Render as one script token, quoting when the tokenizer would otherwise
    /// split or unescape it.
    pub fn to_token(&self) -> String { quote_token(&self.to_string()) }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(x) => x.to_bits().hash(state),
            Self::Str(s) => s.hash(state),
            Self::Path(p) => p.hash(state),
        }
    }
}

impl From<&str> for Value { fn from(s: &str) -> Self { Self::Str(s.to_string()) } }
impl From<String> for Value { fn from(s: String) -> Self { Self::Str(s) } }
impl From<i64> for Value { fn from(i: i64) -> Self { Self::Int(i) } }
impl From<f64> for Value { fn from(x: f64) -> Self { Self::Float(x) } }
impl From<bool> for Value { fn from(b: bool) -> Self { Self::Bool(b) } }
impl From<PathBuf> for Value { fn from(p: PathBuf) -> Self { Self::Path(p) } }

/// What a parameter holds: a single item or an ordered sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Hash)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(Value),
    List(Vec<Value>),
}

impl ParamValue {
    pub fn is_list(&self) -> bool { matches!(self, Self::List(_)) }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self { Self::List(v) => Some(v), Self::Scalar(_) => None }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self { Self::Scalar(v) => Some(v), Self::List(_) => None }
    }

    /// Items in script order; a scalar is a one-item slice.
    pub fn items(&self) -> &[Value] {
        match self {
            Self::Scalar(v) => std::slice::from_ref(v),
            Self::List(v) => v,
        }
    }

    pub fn len(&self) -> usize { self.items().len() }
    pub fn is_empty(&self) -> bool { self.items().is_empty() }

    /// Structural hash used to decide whether a value changed while loaded.
    pub fn content_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.hash(&mut h);
        h.finish()
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{v}"),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Quote `raw` when bare it would be split, unescaped or read as a flag.
pub fn quote_token(raw: &str) -> String {
    let needs = raw.is_empty()
        || raw.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\' || c == '#')
        || (raw.starts_with('-') && raw.parse::<f64>().is_err());
    if !needs { return raw.to_string(); }
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// One script token. Quoted tokens are always literal values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub quoted: bool,
}

/// Split a script line on whitespace, honouring double quotes and backslash
/// escapes inside them.
pub fn tokenize(line: &str) -> ShellResult<Vec<String>> {
    Ok(tokenize_marked(line)?.into_iter().map(|t| t.text).collect())
}

/// Like [`tokenize`], keeping track of which tokens were quoted.
pub fn tokenize_marked(line: &str) -> ShellResult<Vec<Token>> {
    let mut tokens = vec![];
    let mut chars = line.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) { chars.next(); }
        let Some(&first) = chars.peek() else { break };
        if first == '"' {
            chars.next();
            let mut tok = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => { closed = true; break; }
                    '\\' => match chars.next() {
                        Some('n') => tok.push('\n'),
                        Some('t') => tok.push('\t'),
                        Some(other) => tok.push(other),
                        None => return Err(ShellError::invalid("dangling escape at end of line")),
                    },
                    other => tok.push(other),
                }
            }
            if !closed { return Err(ShellError::invalid(format!("unterminated quote in: {line}"))); }
            tokens.push(Token { text: tok, quoted: true });
        } else {
            let mut tok = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() { break; }
                tok.push(c);
                chars.next();
            }
            tokens.push(Token { text: tok, quoted: false });
        }
    }
    Ok(tokens)
}
