//! Step body templates.
//!
//! Bodies use `{{.Name}}` placeholders that are substituted from the
//! session's variables. Nothing else is allowed between braces. A field with
//! no variable renders as empty text; the rest of the body is kept.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::flow::Step;
use crate::error::TemplateError;

static FIELD_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*$").expect("field action regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed body template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after_open = &rest[open + 2..];
            let close = after_open
                .find("}}")
                .ok_or(TemplateError::Unterminated { offset: offset + open })?;

            let action = &after_open[..close];
            let caps = FIELD_ACTION
                .captures(action)
                .ok_or_else(|| TemplateError::UnsupportedAction {
                    action: action.trim().to_string(),
                })?;
            segments.push(Segment::Field(caps[1].to_string()));

            let consumed = open + 2 + close + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Substitute `variables`. Fields with no value are left empty and
    /// their names returned alongside the text.
    pub fn execute(&self, variables: &HashMap<String, String>) -> (String, Vec<String>) {
        let mut out = String::new();
        let mut missing = Vec::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => match variables.get(name) {
                    Some(value) => out.push_str(value),
                    None => missing.push(name.clone()),
                },
            }
        }
        (out, missing)
    }
}

/// Render a step's body against `variables`.
///
/// Never fails: an empty body renders as `""`, a malformed template is
/// logged and renders as `""`, and missing fields are logged and left empty,
/// so the tutorial keeps going.
pub fn render(step: &Step, variables: &HashMap<String, String>) -> String {
    if step.body.is_empty() {
        return String::new();
    }

    let template = match Template::parse(&step.body) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse message template");
            return String::new();
        }
    };

    let (body, missing) = template.execute(variables);
    for name in &missing {
        tracing::warn!(variable = %name, "No value for template variable");
    }
    body
}
