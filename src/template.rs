//! Placeholder templates for chart URLs, local paths and sidecar documents.
//!
//! Templates use `{field}` placeholders; `{{` and `}}` produce literal braces.
//! Each template kind accepts a fixed set of fields and is checked when the
//! catalog is loaded, so rendering never fails.

use std::fmt;

use serde::{Deserialize, Deserializer};

use crate::error::ChartError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Stamp,
    Minute,
    File,
    Epoch,
    Time,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "stamp" => Some(Field::Stamp),
            "minute" => Some(Field::Minute),
            "file" => Some(Field::File),
            "epoch" => Some(Field::Epoch),
            "time" => Some(Field::Time),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Field::Stamp => "stamp",
            Field::Minute => "minute",
            Field::File => "file",
            Field::Epoch => "epoch",
            Field::Time => "time",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Template {
    raw: String,
    segments: Vec<Segment>,
}

impl Template {
    fn parse(kind: &'static str, raw: &str, allowed: &[Field]) -> Result<Self, ChartError> {
        let invalid = |reason: String| ChartError::InvalidTemplate {
            kind,
            template: raw.to_string(),
            reason,
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => name.push(ch),
                            None => return Err(invalid("unterminated placeholder".to_string())),
                        }
                    }
                    let field = Field::from_name(name.trim())
                        .filter(|field| allowed.contains(field))
                        .ok_or_else(|| {
                            let names = allowed
                                .iter()
                                .map(|field| format!("{{{}}}", field.name()))
                                .collect::<Vec<_>>()
                                .join(", ");
                            invalid(format!("unknown placeholder {{{name}}}, expected one of {names}"))
                        })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                '}' => return Err(invalid("unmatched closing brace".to_string())),
                ch => literal.push(ch),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    fn uses(&self, field: Field) -> bool {
        self.segments
            .iter()
            .any(|segment| *segment == Segment::Field(field))
    }

    fn render(&self, value: impl Fn(Field) -> String) -> String {
        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => out.push_str(&value(*field)),
            }
        }
        out
    }
}

/// Remote chart location, rendered from the formatted slot and the minute index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate(Template);

impl UrlTemplate {
    pub fn parse(raw: &str) -> Result<Self, ChartError> {
        Template::parse("url", raw, &[Field::Stamp, Field::Minute]).map(Self)
    }

    pub fn render(&self, stamp: &str, minute_index: i64) -> String {
        self.0.render(|field| match field {
            Field::Minute => minute_index.to_string(),
            _ => stamp.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0.raw
    }
}

/// Local file name pattern; the `{stamp}` field keeps each slot distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate(Template);

impl PathTemplate {
    pub fn parse(raw: &str) -> Result<Self, ChartError> {
        let template = Template::parse("path", raw, &[Field::Stamp])?;
        if !template.uses(Field::Stamp) {
            return Err(ChartError::InvalidTemplate {
                kind: "path",
                template: raw.to_string(),
                reason: "path must contain {stamp}".to_string(),
            });
        }
        Ok(Self(template))
    }

    pub fn render(&self, stamp: &str) -> String {
        self.0.render(|_| stamp.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0.raw
    }
}

/// Georeferencing document written next to every downloaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarTemplate(Template);

impl SidecarTemplate {
    pub fn parse(raw: &str) -> Result<Self, ChartError> {
        Template::parse("sidecar", raw, &[Field::File, Field::Epoch, Field::Time]).map(Self)
    }

    pub fn render(&self, file: &str, epoch: i64, time: &str) -> String {
        self.0.render(|field| match field {
            Field::Epoch => epoch.to_string(),
            Field::Time => time.to_string(),
            _ => file.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0.raw
    }
}

macro_rules! impl_template_serde {
    ($($ty:ty),*) => {
        $(
            impl<'de> Deserialize<'de> for $ty {
                fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                    let raw = String::deserialize(deserializer)?;
                    <$ty>::parse(&raw).map_err(serde::de::Error::custom)
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

impl_template_serde!(UrlTemplate, PathTemplate, SidecarTemplate);
