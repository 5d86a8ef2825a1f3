//! Output file name templates.
//!
//! A pattern is literal text with `{{ .Field }}` actions, for example
//! `{{ .KeyID }}.pem` or `jwks-{{ .Index }}.pem`. The leading dot and the
//! whitespace inside the braces are optional.

use crate::keys::Jwk;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_PATTERN: &str = "{{ .KeyID }}.pem";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("unterminated action starting at byte {0}")]
    Unterminated(usize),
    #[error("unknown field '{0}' (expected KeyID, Index, Alg or KeyType)")]
    UnknownField(String),
    #[error("{field} value '{value}' cannot be used in a file name")]
    UnsafeValue { field: Field, value: String },
    #[error("literal text '{0}' would leave the output directory")]
    UnsafeLiteral(String),
    #[error("'{0}' is not a plain file name")]
    UnsafeName(String),
    #[error("pattern produced an empty file name")]
    EmptyName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    KeyId,
    Index,
    Alg,
    KeyType,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "KeyID" => Some(Field::KeyId),
            "Index" => Some(Field::Index),
            "Alg" => Some(Field::Alg),
            "KeyType" => Some(Field::KeyType),
            _ => None,
        }
    }

    fn value(self, jwk: &Jwk) -> String {
        match self {
            Field::KeyId => jwk.kid().to_string(),
            Field::Index => jwk.index().to_string(),
            Field::Alg => jwk.alg().to_string(),
            Field::KeyType => jwk.kty().to_string(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::KeyId => "KeyID",
            Field::Index => "Index",
            Field::Alg => "Alg",
            Field::KeyType => "KeyType",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn parse(source: &str) -> Result<Self, PatternError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(literal(&rest[..start])?);
            }
            let action = &rest[start + 2..];
            let end = action
                .find("}}")
                .ok_or(PatternError::Unterminated(offset + start))?;

            let name = action[..end].trim();
            let name = name.strip_prefix('.').unwrap_or(name).trim();
            let field = Field::from_name(name)
                .ok_or_else(|| PatternError::UnknownField(name.to_string()))?;
            segments.push(Segment::Field(field));

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(literal(rest)?);
        }

        Ok(Pattern {
            source: source.to_string(),
            segments,
        })
    }

    /// Renders the file name for `jwk`. The result is always a single path
    /// component, so it stays inside the output directory.
    pub fn render(&self, jwk: &Jwk) -> Result<String, PatternError> {
        let mut name = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => name.push_str(text),
                Segment::Field(field) => {
                    let value = field.value(jwk);
                    if !is_safe_component(&value) {
                        return Err(PatternError::UnsafeValue {
                            field: *field,
                            value,
                        });
                    }
                    name.push_str(&value);
                }
            }
        }

        if name.is_empty() {
            return Err(PatternError::EmptyName);
        }
        if !is_safe_component(&name) {
            return Err(PatternError::UnsafeName(name));
        }
        Ok(name)
    }
}

fn literal(text: &str) -> Result<Segment, PatternError> {
    if text.contains(['/', '\\', '\0']) {
        return Err(PatternError::UnsafeLiteral(text.to_string()));
    }
    Ok(Segment::Literal(text.to_string()))
}

fn is_safe_component(value: &str) -> bool {
    value != "." && value != ".." && !value.contains(['/', '\\', '\0'])
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::parse(s)
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern {
            source: DEFAULT_PATTERN.to_string(),
            segments: vec![
                Segment::Field(Field::KeyId),
                Segment::Literal(".pem".to_string()),
            ],
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
