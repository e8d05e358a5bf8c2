//! PDF export — wraps sanitized content in a printable A4 document and hands
//! it to the remote rendering service.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::editor::document::escape_text;
use crate::editor::metrics::PageLayout;

pub mod handlers;

const RENDER_TIMEOUT: Duration = Duration::from_secs(90);
/// A4 width at 96 dpi.
const PAGE_WIDTH_PX: f32 = 794.0;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("render service error (status {status}): {message}")]
    Service { status: u16, message: String },

    #[error("render service returned an empty document")]
    EmptyArtifact,
}

/// A complete HTML document around `body`, styled like the editing surface.
pub fn wrap_document(body: &str, title: &str, layout: &PageLayout) -> String {
    let padding = (PAGE_WIDTH_PX - layout.content_width_px) / 2.0;
    let mut escaped_title = String::new();
    escape_text(title, &mut escaped_title);
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{escaped_title}</title>\
         <style>@page {{ size: A4; margin: 0 }} \
         body {{ margin: 0; font-family: {font}; font-size: {size}px; line-height: {line}; }} \
         .page {{ width: {PAGE_WIDTH_PX}px; padding: {padding}px; box-sizing: border-box; }}\
         </style></head><body><main class=\"page\">{body}</main></body></html>",
        font = layout.font.css_family(),
        size = layout.font_size_px,
        line = layout.line_height,
    )
}

#[derive(Serialize)]
struct RenderRequest<'a> {
    html: &'a str,
    format: &'a str,
}

#[derive(Clone)]
pub struct RenderClient {
    client: Client,
    url: String,
}

impl RenderClient {
    pub fn new(url: String) -> Result<Self, ExportError> {
        Ok(Self {
            client: Client::builder().timeout(RENDER_TIMEOUT).build()?,
            url,
        })
    }

    /// Posts the document and returns the PDF bytes.
    pub async fn render_pdf(&self, document: &str) -> Result<Bytes, ExportError> {
        let response = self
            .client
            .post(&self.url)
            .json(&RenderRequest {
                html: document,
                format: "A4",
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExportError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let pdf = response.bytes().await?;
        if pdf.is_empty() {
            return Err(ExportError::EmptyArtifact);
        }
        debug!(bytes = pdf.len(), "document rendered");
        Ok(pdf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::metrics::{default_page_layout, FontFamily};

    #[test]
    fn test_wrap_document_embeds_body_and_escapes_title() {
        let layout = default_page_layout(FontFamily::EbGaramond);
        let doc = wrap_document("<p>Jane</p>", "Jane <CV>", &layout);
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("<title>Jane &lt;CV&gt;</title>"));
        assert!(doc.contains("<main class=\"page\"><p>Jane</p></main>"));
        assert!(doc.contains("'EB Garamond', serif"));
        assert!(doc.contains("padding: 48px"));
    }
}
