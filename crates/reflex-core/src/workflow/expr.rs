//! Reference expressions: `{{<dotted.path>}}` tokens inside definition values.
//!
//! A string is tokenized into a [`Template`] of literal text and reference
//! segments; each reference path is parsed once into a [`Reference`]:
//!
//! | Path                              | Reference                  |
//! |-----------------------------------|----------------------------|
//! | `workflow.inputs.<name>`          | `WorkflowInput`            |
//! | `steps.<id>.output`               | `StepOutput`               |
//! | `steps.<id>.outputs.<name>`       | `StepNamedOutput`          |
//! | `steps.<id>.success`              | `StepSuccess`              |
//! | `steps.<id>.error`                | `StepError`                |
//! | `env.<name>`                      | `Env`                      |
//!
//! Anything else (unknown roots, extra nesting, empty segments) parses to
//! `Reference::Unknown` rather than failing.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref REFERENCE_REGEX: Regex = Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").unwrap();
}

/// A parsed reference path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    WorkflowInput(String),
    StepOutput(String),
    StepNamedOutput { step: String, name: String },
    StepSuccess(String),
    StepError(String),
    Env(String),
    /// Unknown root or malformed path, kept verbatim
    Unknown(String),
}

impl Reference {
    /// Parse a dotted path (the text between the braces, already trimmed).
    pub fn parse(path: &str) -> Self {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.trim().is_empty()) {
            return Reference::Unknown(path.to_string());
        }

        match segments.as_slice() {
            ["workflow", "inputs", name] => Reference::WorkflowInput(name.to_string()),
            ["steps", id, "output"] => Reference::StepOutput(id.to_string()),
            ["steps", id, "outputs", name] => Reference::StepNamedOutput {
                step: id.to_string(),
                name: name.to_string(),
            },
            ["steps", id, "success"] => Reference::StepSuccess(id.to_string()),
            ["steps", id, "error"] => Reference::StepError(id.to_string()),
            ["env", name] => Reference::Env(name.to_string()),
            _ => Reference::Unknown(path.to_string()),
        }
    }

    /// The step id this reference reads from, if any.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            Reference::StepOutput(id)
            | Reference::StepSuccess(id)
            | Reference::StepError(id) => Some(id),
            Reference::StepNamedOutput { step, .. } => Some(step),
            _ => None,
        }
    }
}

/// One `{{...}}` occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    /// Full source text including braces
    pub raw: String,
    /// Trimmed path between the braces
    pub path: String,
    pub reference: Reference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Reference(Expr),
}

/// A tokenized string value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(text: &str) -> Self {
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in REFERENCE_REGEX.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > last {
                segments.push(Segment::Literal(text[last..whole.start()].to_string()));
            }
            let path = caps.get(1).map(|m| m.as_str()).unwrap_or("").trim().to_string();
            segments.push(Segment::Reference(Expr {
                raw: whole.as_str().to_string(),
                reference: Reference::parse(&path),
                path,
            }));
            last = whole.end();
        }

        if last < text.len() {
            segments.push(Segment::Literal(text[last..].to_string()));
        }

        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The expression, when the whole string (ignoring surrounding
    /// whitespace) is exactly one reference.
    pub fn single_reference(&self) -> Option<&Expr> {
        let mut found = None;
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) if text.trim().is_empty() => {}
                Segment::Literal(_) => return None,
                Segment::Reference(expr) => {
                    if found.is_some() {
                        return None;
                    }
                    found = Some(expr);
                }
            }
        }
        found
    }

    pub fn has_references(&self) -> bool {
        self.references().next().is_some()
    }

    pub fn references(&self) -> impl Iterator<Item = &Expr> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Reference(expr) => Some(expr),
            Segment::Literal(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference_roots() {
        assert_eq!(
            Reference::parse("workflow.inputs.topic"),
            Reference::WorkflowInput("topic".into())
        );
        assert_eq!(
            Reference::parse("steps.a.output"),
            Reference::StepOutput("a".into())
        );
        assert_eq!(
            Reference::parse("steps.a.outputs.links"),
            Reference::StepNamedOutput {
                step: "a".into(),
                name: "links".into()
            }
        );
        assert_eq!(
            Reference::parse("steps.fetch-data.success"),
            Reference::StepSuccess("fetch-data".into())
        );
        assert_eq!(Reference::parse("steps.a.error"), Reference::StepError("a".into()));
        assert_eq!(Reference::parse("env.HOME"), Reference::Env("HOME".into()));
    }

    #[test]
    fn test_parse_reference_malformed() {
        for path in [
            "",
            "workflow.inputs",
            "workflow.inputs.topic.nested",
            "steps.a",
            "steps.a.outputs",
            "steps..output",
            "env",
            "vars.x",
        ] {
            assert_eq!(Reference::parse(path), Reference::Unknown(path.into()), "{}", path);
        }
    }

    #[test]
    fn test_template_single_reference() {
        let t = Template::parse("  {{ workflow.inputs.n }} ");
        let expr = t.single_reference().unwrap();
        assert_eq!(expr.path, "workflow.inputs.n");
        assert_eq!(expr.raw, "{{ workflow.inputs.n }}");

        assert!(Template::parse("x {{workflow.inputs.n}}").single_reference().is_none());
        assert!(Template::parse("{{a.b}}{{c.d}}").single_reference().is_none());
        assert!(Template::parse("plain").single_reference().is_none());
    }

    #[test]
    fn test_template_segments() {
        let t = Template::parse("do {{workflow.inputs.topic}} now {{env.USER}}");
        assert_eq!(t.segments().len(), 4);
        assert_eq!(t.segments()[0], Segment::Literal("do ".into()));
        assert_eq!(t.segments()[2], Segment::Literal(" now ".into()));
        let refs: Vec<_> = t.references().map(|e| e.reference.clone()).collect();
        assert_eq!(
            refs,
            vec![
                Reference::WorkflowInput("topic".into()),
                Reference::Env("USER".into())
            ]
        );
    }

    #[test]
    fn test_unclosed_braces_are_literal() {
        let t = Template::parse("{{workflow.inputs.topic");
        assert!(!t.has_references());
    }

    #[test]
    fn test_step_id() {
        assert_eq!(Reference::parse("steps.a.outputs.x").step_id(), Some("a"));
        assert_eq!(Reference::parse("env.X").step_id(), None);
    }
}
