//! A small text template engine for syslog lines and routing keys.
//!
//! Templates use the familiar `{{ .Field }}` action syntax. Supported
//! actions:
//!
//! - `{{ .Name }}` substitutes a top-level field.
//! - `{{ .Labels.team }}` looks a key up in a map field; a missing key is an
//!   execution error.
//! - `{{ index .Labels "team" }}` looks a key up in a map field; a missing
//!   key renders as the empty string.
//!
//! Templates are parsed once into a list of segments and can then be
//! executed any number of times against different [`Fields`].
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use syslog_amqp::syslog::template::{Template, Value};
//!
//! let template = Template::parse("greeting", "hello {{ .Name }}").unwrap();
//! let mut fields = BTreeMap::new();
//! fields.insert("Name", Value::Text("world".to_string()));
//!
//! let rendered = template.render(&fields).unwrap();
//! assert_eq!(&rendered[..], b"hello world");
//! ```

use bytes::{Bytes, BytesMut};
use std::borrow::Cow;
use std::collections::BTreeMap;
use thiserror::Error;

/// A value a template action can resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Map(BTreeMap<String, String>),
}

/// Named fields a template is executed against.
pub type Fields = BTreeMap<&'static str, Value>;

/// Errors raised while compiling a template source string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template {template}: unclosed action starting at byte {offset}")]
    Unterminated { template: String, offset: usize },

    #[error("template {template}: empty action at byte {offset}")]
    EmptyAction { template: String, offset: usize },

    #[error("template {template}: function {function:?} not defined")]
    UnknownFunction { template: String, function: String },

    #[error("template {template}: malformed action {action:?}: {reason}")]
    Malformed {
        template: String,
        action: String,
        reason: &'static str,
    },
}

/// Errors raised while executing a compiled template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("template {template}: can't evaluate field {field}")]
    MissingField { template: String, field: String },

    #[error("template {template}: field {field} is not a map")]
    NotAMap { template: String, field: String },

    #[error("template {template}: map {field} has no entry for key {key:?}")]
    MissingKey {
        template: String,
        field: String,
        key: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Vec<String>),
    Index { path: Vec<String>, key: String },
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Path(Vec<String>),
    Str(String),
    Ident(String),
}

/// A compiled, immutable template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Compiles `source` into a template identified by `name` in errors.
    pub fn parse(name: &str, source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }

            let body_start = start + 2;
            let end = rest[body_start..]
                .find("}}")
                .ok_or_else(|| TemplateError::Unterminated {
                    template: name.to_string(),
                    offset: offset + start,
                })?;

            let body = rest[body_start..body_start + end].trim();
            if body.is_empty() {
                return Err(TemplateError::EmptyAction {
                    template: name.to_string(),
                    offset: offset + start,
                });
            }
            segments.push(parse_action(name, body)?);

            let consumed = body_start + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            segments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Executes the template, appending the output to `out`.
    ///
    /// On error `out` may hold a partial rendering.
    pub fn execute(&self, fields: &Fields, out: &mut BytesMut) -> Result<(), RenderError> {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.extend_from_slice(text.as_bytes()),
                Segment::Field(path) => {
                    let text = self.resolve_path(path, fields)?;
                    out.extend_from_slice(text.as_bytes());
                }
                Segment::Index { path, key } => {
                    let text = self.resolve_index(path, key, fields)?;
                    out.extend_from_slice(text.as_bytes());
                }
            }
        }
        Ok(())
    }

    /// Executes the template into a fresh buffer.
    pub fn render(&self, fields: &Fields) -> Result<Bytes, RenderError> {
        let mut buf = BytesMut::with_capacity(128);
        self.execute(fields, &mut buf)?;
        Ok(buf.freeze())
    }

    fn lookup<'f>(&self, field: &str, fields: &'f Fields) -> Result<&'f Value, RenderError> {
        fields.get(field).ok_or_else(|| RenderError::MissingField {
            template: self.name.clone(),
            field: field.to_string(),
        })
    }

    fn resolve_path<'f>(
        &self,
        path: &[String],
        fields: &'f Fields,
    ) -> Result<Cow<'f, str>, RenderError> {
        let value = self.lookup(&path[0], fields)?;
        match (value, &path[1..]) {
            (Value::Text(text), []) => Ok(Cow::Borrowed(text)),
            (Value::Map(map), []) => Ok(Cow::Owned(format_map(map))),
            (Value::Map(map), [key]) => {
                map.get(key)
                    .map(|v| Cow::Borrowed(v.as_str()))
                    .ok_or_else(|| RenderError::MissingKey {
                        template: self.name.clone(),
                        field: path[0].clone(),
                        key: key.clone(),
                    })
            }
            (Value::Map(_), _) => Err(RenderError::NotAMap {
                template: self.name.clone(),
                field: path[..2].join("."),
            }),
            (Value::Text(_), _) => Err(RenderError::NotAMap {
                template: self.name.clone(),
                field: path[0].clone(),
            }),
        }
    }

    fn resolve_index<'f>(
        &self,
        path: &[String],
        key: &str,
        fields: &'f Fields,
    ) -> Result<Cow<'f, str>, RenderError> {
        if path.len() != 1 {
            return Err(RenderError::NotAMap {
                template: self.name.clone(),
                field: path.join("."),
            });
        }
        match self.lookup(&path[0], fields)? {
            Value::Map(map) => Ok(map
                .get(key)
                .map(|v| Cow::Borrowed(v.as_str()))
                .unwrap_or(Cow::Borrowed(""))),
            Value::Text(_) => Err(RenderError::NotAMap {
                template: self.name.clone(),
                field: path[0].clone(),
            }),
        }
    }
}

fn format_map(map: &BTreeMap<String, String>) -> String {
    let entries: Vec<String> = map.iter().map(|(k, v)| format!("{}:{}", k, v)).collect();
    format!("map[{}]", entries.join(" "))
}

fn parse_action(template: &str, body: &str) -> Result<Segment, TemplateError> {
    let malformed = |reason: &'static str| TemplateError::Malformed {
        template: template.to_string(),
        action: body.to_string(),
        reason,
    };

    let tokens = tokenize(body).map_err(malformed)?;
    match tokens.as_slice() {
        [Token::Path(path)] => Ok(Segment::Field(path.clone())),
        [Token::Ident(function), args @ ..] if function == "index" => match args {
            [Token::Path(path), Token::Str(key)] => Ok(Segment::Index {
                path: path.clone(),
                key: key.clone(),
            }),
            _ => Err(malformed("index expects a field and a quoted key")),
        },
        [Token::Ident(function), ..] => Err(TemplateError::UnknownFunction {
            template: template.to_string(),
            function: function.clone(),
        }),
        _ => Err(malformed("expected a field reference")),
    }
}

fn tokenize(body: &str) -> Result<Vec<Token>, &'static str> {
    let mut tokens = Vec::new();
    let mut chars = body.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '"' {
            chars.next();
            let mut literal = String::new();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some((_, 'n')) => literal.push('\n'),
                        Some((_, 't')) => literal.push('\t'),
                        Some((_, escaped @ ('"' | '\\'))) => literal.push(escaped),
                        _ => return Err("invalid escape in string literal"),
                    },
                    other => literal.push(other),
                }
            }
            if !closed {
                return Err("unterminated string literal");
            }
            tokens.push(Token::Str(literal));
            continue;
        }

        let mut end = body.len();
        while let Some(&(i, c)) = chars.peek() {
            if c.is_whitespace() || c == '"' {
                end = i;
                break;
            }
            chars.next();
        }
        let word = &body[start..end];

        if let Some(path) = word.strip_prefix('.') {
            let segments: Vec<String> = path.split('.').map(str::to_string).collect();
            if segments.iter().any(|s| !is_identifier(s)) {
                return Err("invalid field path");
            }
            tokens.push(Token::Path(segments));
        } else if is_identifier(word) {
            tokens.push(Token::Ident(word.to_string()));
        } else {
            return Err("unexpected token");
        }
    }

    Ok(tokens)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}
