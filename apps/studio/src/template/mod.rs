//! Template collaborator — renders structured resume data to preview markup.
//!
//! The pagination estimator measures this markup when the editor is not in
//! edit mode, so rendering only has to be stable, not pretty.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::editor::document::{escape_text, Fragment};
use crate::editor::sanitizer;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("resume is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("template render failed: {0}")]
    Render(String),
}

// ────────────────────────────────────────────────────────────────────────────
// Resume data
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeData {
    pub name: String,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub contact: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub sections: Vec<ResumeSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeSection {
    pub title: String,
    #[serde(default)]
    pub entries: Vec<ResumeEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeEntry {
    pub heading: String,
    #[serde(default)]
    pub subheading: Option<String>,
    #[serde(default)]
    pub dates: Option<String>,
    #[serde(default)]
    pub bullets: Vec<String>,
    /// Free-form rich text from the editor, already sanitized.
    #[serde(default)]
    pub body: Option<String>,
}

impl ResumeData {
    /// All visible text, one line per block. Used for the coarse height estimate.
    pub fn plain_text(&self) -> String {
        let contact = self.contact.join(" | ");
        let mut lines: Vec<&str> = vec![self.name.as_str()];
        lines.extend(self.headline.as_deref());
        if !contact.is_empty() {
            lines.push(&contact);
        }
        lines.extend(self.summary.as_deref());
        for section in &self.sections {
            lines.push(&section.title);
            for entry in &section.entries {
                lines.push(&entry.heading);
                lines.extend(entry.subheading.as_deref());
                lines.extend(entry.dates.as_deref());
                lines.extend(entry.bullets.iter().map(String::as_str));
                lines.extend(entry.body.as_deref());
            }
        }
        lines.join("\n")
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Renderers
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(&self, data: &ResumeData) -> Result<String, TemplateError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    #[default]
    Classic,
    /// Single-column, no summary block, inline dates.
    Compact,
}

impl TemplateKind {
    pub fn renderer(self) -> Arc<dyn TemplateRenderer> {
        match self {
            TemplateKind::Classic => Arc::new(ClassicTemplate),
            TemplateKind::Compact => Arc::new(CompactTemplate),
        }
    }
}

pub struct ClassicTemplate;

#[async_trait]
impl TemplateRenderer for ClassicTemplate {
    async fn render(&self, data: &ResumeData) -> Result<String, TemplateError> {
        require_name(data)?;
        let mut out = String::new();

        out.push_str("<header><h1>");
        escape_text(&data.name, &mut out);
        out.push_str("</h1>");
        if let Some(headline) = &data.headline {
            out.push_str("<p>");
            escape_text(headline, &mut out);
            out.push_str("</p>");
        }
        if !data.contact.is_empty() {
            out.push_str("<div class=\"contact\">");
            escape_text(&data.contact.join(" | "), &mut out);
            out.push_str("</div>");
        }
        out.push_str("</header>");

        if let Some(summary) = &data.summary {
            out.push_str("<section><h2>Summary</h2><p>");
            escape_text(summary, &mut out);
            out.push_str("</p></section>");
        }

        for section in &data.sections {
            out.push_str("<section><h2>");
            escape_text(&section.title, &mut out);
            out.push_str("</h2>");
            for entry in &section.entries {
                out.push_str("<div class=\"entry\"><h3>");
                escape_text(&entry.heading, &mut out);
                out.push_str("</h3>");
                if entry.subheading.is_some() || entry.dates.is_some() {
                    out.push_str("<div class=\"meta\">");
                    let meta: Vec<&str> = entry
                        .subheading
                        .iter()
                        .chain(entry.dates.iter())
                        .map(String::as_str)
                        .collect();
                    escape_text(&meta.join(" · "), &mut out);
                    out.push_str("</div>");
                }
                push_bullets(&entry.bullets, &mut out);
                push_body(entry.body.as_deref(), &mut out)?;
                out.push_str("</div>");
            }
            out.push_str("</section>");
        }
        Ok(out)
    }
}

pub struct CompactTemplate;

#[async_trait]
impl TemplateRenderer for CompactTemplate {
    async fn render(&self, data: &ResumeData) -> Result<String, TemplateError> {
        require_name(data)?;
        let mut out = String::new();

        out.push_str("<h2>");
        escape_text(&data.name, &mut out);
        out.push_str("</h2>");
        if !data.contact.is_empty() {
            out.push_str("<small>");
            escape_text(&data.contact.join(" · "), &mut out);
            out.push_str("</small>");
        }
        for section in &data.sections {
            out.push_str("<h3>");
            escape_text(&section.title, &mut out);
            out.push_str("</h3>");
            for entry in &section.entries {
                out.push_str("<div><b>");
                escape_text(&entry.heading, &mut out);
                out.push_str("</b>");
                if let Some(dates) = &entry.dates {
                    out.push(' ');
                    escape_text(dates, &mut out);
                }
                out.push_str("</div>");
                push_bullets(&entry.bullets, &mut out);
                push_body(entry.body.as_deref(), &mut out)?;
            }
        }
        Ok(out)
    }
}

fn require_name(data: &ResumeData) -> Result<(), TemplateError> {
    if data.name.trim().is_empty() {
        return Err(TemplateError::MissingField("name"));
    }
    Ok(())
}

fn push_bullets(bullets: &[String], out: &mut String) {
    if bullets.is_empty() {
        return;
    }
    out.push_str("<ul>");
    for bullet in bullets {
        out.push_str("<li>");
        escape_text(bullet, out);
        out.push_str("</li>");
    }
    out.push_str("</ul>");
}

fn push_body(body: Option<&str>, out: &mut String) -> Result<(), TemplateError> {
    let Some(body) = body else {
        return Ok(());
    };
    let mut fragment =
        Fragment::parse(body).map_err(|err| TemplateError::Render(err.to_string()))?;
    sanitizer::clean_fragment(&mut fragment);
    out.push_str("<div class=\"body\">");
    out.push_str(&fragment.to_html());
    out.push_str("</div>");
    Ok(())
}
