// coverme/src/utils/template.rs
//! Name patterns such as `db/app-{yyyy}-{mm}-{dd}-{env[HOST]}`.
//!
//! Placeholders:
//!
//! | token        | value                                  |
//! |--------------|----------------------------------------|
//! | `yyyy`       | year, unpadded                         |
//! | `mm` `dd`    | month and day, two digits              |
//! | `HH` `MM` `SS` | hour, minute, second, two digits     |
//! | `micros`/`US`| microseconds, unpadded                 |
//! | `tags`       | the source's `tags` value              |
//! | `env[NAME]`  | variable from the startup environment  |
//!
//! `{{` and `}}` produce literal braces.

use chrono::{Datelike, Timelike};
use regex::Regex;
use std::sync::LazyLock;

use crate::errors::TemplateError;
use crate::utils::context::RunContext;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{|\}\}|\{([^{}]*)\}|[{}]").expect("token regex is valid"));

static ENV_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^env\[([^\[\]]+)\]$").expect("env regex is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Micros,
    Tags,
    Env(String),
}

impl Field {
    fn parse(key: &str) -> Option<Self> {
        let field = match key {
            "yyyy" => Field::Year,
            "mm" => Field::Month,
            "dd" => Field::Day,
            "HH" => Field::Hour,
            "MM" => Field::Minute,
            "SS" => Field::Second,
            "micros" | "US" => Field::Micros,
            "tags" => Field::Tags,
            _ => return ENV_KEY.captures(key).map(|c| Field::Env(c[1].to_string())),
        };
        Some(field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// A parsed name pattern. Parsing rejects unknown placeholders, so a
/// `NameTemplate` can only fail to render on a missing environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    pattern: String,
    segments: Vec<Segment>,
}

impl NameTemplate {
    pub fn parse(pattern: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut last = 0;

        for caps in TOKEN.captures_iter(pattern) {
            let whole = caps.get(0).expect("group 0 always matches");
            literal.push_str(&pattern[last..whole.start()]);
            last = whole.end();

            match (whole.as_str(), caps.get(1)) {
                ("{{", _) => literal.push('{'),
                ("}}", _) => literal.push('}'),
                (_, Some(key)) => {
                    let field = Field::parse(key.as_str()).ok_or_else(|| {
                        TemplateError::UnknownPlaceholder {
                            pattern: pattern.to_string(),
                            key: key.as_str().to_string(),
                        }
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                (brace, None) => {
                    return Err(TemplateError::Syntax {
                        pattern: pattern.to_string(),
                        brace: brace.chars().next().unwrap_or('{'),
                        position: whole.start(),
                    });
                }
            }
        }
        literal.push_str(&pattern[last..]);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Expands the pattern against the context's current time.
    ///
    /// Every call reads the clock again; cache the result when the same name
    /// is needed in more than one place.
    pub fn render(&self, ctx: &RunContext, tags: &str) -> Result<String, TemplateError> {
        let now = ctx.now();
        let mut out = String::with_capacity(self.pattern.len() + 16);

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(Field::Year) => out.push_str(&now.year().to_string()),
                Segment::Field(Field::Month) => out.push_str(&format!("{:02}", now.month())),
                Segment::Field(Field::Day) => out.push_str(&format!("{:02}", now.day())),
                Segment::Field(Field::Hour) => out.push_str(&format!("{:02}", now.hour())),
                Segment::Field(Field::Minute) => out.push_str(&format!("{:02}", now.minute())),
                Segment::Field(Field::Second) => out.push_str(&format!("{:02}", now.second())),
                Segment::Field(Field::Micros) => {
                    out.push_str(&(now.nanosecond() % 1_000_000_000 / 1_000).to_string())
                }
                Segment::Field(Field::Tags) => out.push_str(tags),
                Segment::Field(Field::Env(key)) => {
                    let value = ctx
                        .env_var(key)
                        .ok_or_else(|| TemplateError::MissingEnv(key.clone()))?;
                    out.push_str(value);
                }
            }
        }

        Ok(out)
    }
}

/// Parses and renders a single pattern.
pub fn expand(pattern: &str, ctx: &RunContext, tags: &str) -> Result<String, TemplateError> {
    NameTemplate::parse(pattern)?.render(ctx, tags)
}

/// Parses and renders every pattern in order.
pub fn expand_all<S: AsRef<str>>(
    patterns: &[S],
    ctx: &RunContext,
    tags: &str,
) -> Result<Vec<String>, TemplateError> {
    patterns
        .iter()
        .map(|p| expand(p.as_ref(), ctx, tags))
        .collect()
}
