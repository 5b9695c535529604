//! Path templates.
//!
//! Templates are literal text with `{{ ... }}` actions:
//!
//! - `{{ .BuildName }}` or `{{BuildName}}` - field of the render data
//! - ``{{ user `name` }}`` or `{{ user "name" }}` - user variable, empty if unset
//! - `{{ timestamp }}` - UNIX seconds
//! - `{{ isotime }}` - RFC 3339 UTC time
//! - `{{ uuid }}` - random UUID
//! - `{{ pwd }}` - current working directory
//!
//! Parsing happens once at configuration time; rendering happens per
//! artifact.

use crate::error::{Error, Result};
use chrono::{SecondsFormat, Utc};
use std::collections::HashMap;

/// Source of field values for [`Template::render`].
pub trait TemplateFields {
    /// Value of the named field, or `None` if the field does not exist.
    fn field(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field(String),
    User(String),
    Timestamp,
    IsoTime,
    Uuid,
    Pwd,
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template string.
    ///
    /// # Errors
    ///
    /// Returns a template error for unclosed or empty actions, malformed
    /// field names and unknown functions.
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| Error::template(format!("unclosed action in {:?}", source)))?;
            segments.push(parse_action(after[..end].trim())?);
            rest = &after[end + 2..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The original template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of the fields the template references, in order of use.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Check that every referenced field is in `allowed`.
    pub fn validate_fields(&self, allowed: &[&str]) -> Result<()> {
        match self.fields().find(|f| !allowed.contains(f)) {
            Some(unknown) => Err(Error::template(format!(
                "unknown field {:?} (available: {})",
                unknown,
                allowed.join(", ")
            ))),
            None => Ok(()),
        }
    }

    /// Render the template.
    ///
    /// # Errors
    ///
    /// Returns a template error if a field is missing from `fields`, or an
    /// I/O error if `pwd` cannot read the working directory.
    pub fn render(
        &self,
        fields: &dyn TemplateFields,
        user_vars: &HashMap<String, String>,
    ) -> Result<String> {
        let now = Utc::now();
        let mut out = String::with_capacity(self.source.len());

        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(name) => {
                    let value = fields.field(name).ok_or_else(|| {
                        Error::template(format!("can't evaluate field {}", name))
                    })?;
                    out.push_str(&value);
                }
                Segment::User(name) => {
                    if let Some(value) = user_vars.get(name) {
                        out.push_str(value);
                    }
                }
                Segment::Timestamp => out.push_str(&now.timestamp().to_string()),
                Segment::IsoTime => {
                    out.push_str(&now.to_rfc3339_opts(SecondsFormat::Secs, true))
                }
                Segment::Uuid => out.push_str(&uuid::Uuid::new_v4().to_string()),
                Segment::Pwd => {
                    let cwd = std::env::current_dir()?;
                    out.push_str(&cwd.display().to_string());
                }
            }
        }

        Ok(out)
    }
}

fn parse_action(action: &str) -> Result<Segment> {
    if action.is_empty() {
        return Err(Error::template("empty action"));
    }

    if let Some(name) = action.strip_prefix('.') {
        if !is_identifier(name) {
            return Err(Error::template(format!("bad field name {:?}", name)));
        }
        return Ok(Segment::Field(name.to_string()));
    }

    let (head, arg) = match action.split_once(char::is_whitespace) {
        Some((head, arg)) => (head, arg.trim()),
        None => (action, ""),
    };

    let no_args = |segment: Segment| {
        if arg.is_empty() {
            Ok(segment)
        } else {
            Err(Error::template(format!("{} takes no arguments", head)))
        }
    };

    match head {
        "user" => parse_quoted(arg)
            .map(|name| Segment::User(name.to_string()))
            .ok_or_else(|| Error::template("user expects a quoted variable name")),
        "timestamp" => no_args(Segment::Timestamp),
        "isotime" => no_args(Segment::IsoTime),
        "uuid" => no_args(Segment::Uuid),
        "pwd" => no_args(Segment::Pwd),
        name if arg.is_empty()
            && is_identifier(name)
            && name.starts_with(|c: char| c.is_ascii_uppercase()) =>
        {
            Ok(Segment::Field(name.to_string()))
        }
        other => Err(Error::template(format!("function {:?} not defined", other))),
    }
}

fn parse_quoted(arg: &str) -> Option<&str> {
    ['`', '"']
        .iter()
        .find_map(|&q| arg.strip_prefix(q).and_then(|a| a.strip_suffix(q)))
        .filter(|name| !name.is_empty())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}
