//! Subject/body templates with `{placeholder}` substitution.
//!
//! Known placeholders are `{job_title}`, `{company}`, `{location}` and `{url}`.
//! `{{` and `}}` produce literal braces. Anything else is an error.

use crate::core::error::{AppError, Result};
use crate::core::models::Posting;

pub const PLACEHOLDERS: [&str; 4] = ["job_title", "company", "location", "url"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    subject: String,
    body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

impl MessageTemplate {
    /// Builds a template without checking its placeholders.
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Builds a template, rejecting unknown or malformed placeholders up front.
    pub fn parse(subject: &str, body: &str) -> Result<Self> {
        let sample = [
            ("job_title", ""),
            ("company", ""),
            ("location", ""),
            ("url", ""),
        ];
        render_str(subject, &sample).map_err(|e| prefix_error("subject", e))?;
        render_str(body, &sample).map_err(|e| prefix_error("body", e))?;
        Ok(Self::new(subject, body))
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn render(&self, posting: &Posting) -> Result<RenderedMessage> {
        let values = [
            ("job_title", posting.title.as_str()),
            ("company", posting.organization.as_str()),
            ("location", posting.location.as_str()),
            ("url", posting.url.as_str()),
        ];
        Ok(RenderedMessage {
            subject: render_str(&self.subject, &values).map_err(|e| prefix_error("subject", e))?,
            body: render_str(&self.body, &values).map_err(|e| prefix_error("body", e))?,
        })
    }
}

fn prefix_error(part: &str, err: AppError) -> AppError {
    match err {
        AppError::Template(msg) => AppError::Template(format!("{}: {}", part, msg)),
        other => other,
    }
}

fn render_str(template: &str, values: &[(&str, &str)]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for n in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    name.push(n);
                }
                if !closed {
                    return Err(AppError::Template(format!(
                        "unclosed placeholder '{{{}'",
                        name
                    )));
                }
                let key = name.trim();
                match values.iter().find(|(k, _)| *k == key) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        return Err(AppError::Template(format!(
                            "unknown placeholder '{{{}}}' (expected one of: {})",
                            key,
                            PLACEHOLDERS.join(", ")
                        )))
                    }
                }
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(AppError::Template(
                    "single '}' encountered; use '}}' for a literal brace".to_string(),
                ))
            }
            other => out.push(other),
        }
    }

    Ok(out)
}
