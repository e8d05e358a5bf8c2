//! Pagination Estimator — how many fixed-height pages the content occupies.
//!
//! Height comes from an injected [`Measure`] implementation. In edit mode the
//! live fragment is measured directly; otherwise the structured resume is
//! rendered through the template collaborator and the result measured off the
//! actor, with a generation counter so a result that arrives after a newer
//! measurement was started is dropped.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::editor::document::{strip_trailing_breaks, Fragment};
use crate::template::{ResumeData, TemplateRenderer};

/// A4 at 96 dpi.
pub const DEFAULT_PAGE_HEIGHT_PX: f32 = 1123.0;

/// Content height measurement, in CSS pixels.
pub trait Measure: Send + Sync {
    fn measure(&self, fragment: &Fragment) -> f32;

    /// Rough height of plain text, for when markup cannot be rendered.
    fn coarse_height(&self, text: &str) -> f32;
}

/// `max(1, ceil(height / page_height))`. Degenerate inputs give one page.
pub fn page_count_for_height(height: f32, page_height: f32) -> u32 {
    if !height.is_finite() || height <= 0.0 || page_height <= 0.0 {
        return 1;
    }
    ((height / page_height).ceil() as u32).max(1)
}

/// Identifies one asynchronous template measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementTicket {
    generation: u64,
}

pub struct PaginationEstimator {
    measurer: Arc<dyn Measure>,
    page_height: f32,
    page_count: u32,
    last_height: f32,
    generation: u64,
}

impl PaginationEstimator {
    pub fn new(measurer: Arc<dyn Measure>, page_height: f32) -> Self {
        Self {
            measurer,
            page_height,
            page_count: 1,
            last_height: 0.0,
            generation: 0,
        }
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn last_height(&self) -> f32 {
        self.last_height
    }

    pub fn measurer(&self) -> Arc<dyn Measure> {
        Arc::clone(&self.measurer)
    }

    /// Measures the live fragment with trailing line breaks removed.
    ///
    /// Returns the new page count only if it changed. Any template measurement
    /// still in flight becomes stale.
    pub fn estimate(&mut self, fragment: &Fragment) -> Option<u32> {
        self.generation += 1;
        let mut measured = Fragment::new(fragment.children.clone());
        strip_trailing_breaks(&mut measured.children);
        let height = self.measurer.measure(&measured);
        self.apply_height(height)
    }

    pub fn begin_template_measurement(&mut self) -> MeasurementTicket {
        self.generation += 1;
        MeasurementTicket {
            generation: self.generation,
        }
    }

    /// Applies a finished template measurement unless a newer one has started.
    pub fn apply_template_measurement(
        &mut self,
        ticket: MeasurementTicket,
        height: f32,
    ) -> Option<u32> {
        if ticket.generation != self.generation {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding stale template measurement"
            );
            return None;
        }
        self.apply_height(height)
    }

    /// Y offsets of the page-break overlay lines.
    pub fn page_breaks(&self) -> Vec<f32> {
        (1..self.page_count)
            .map(|page| page as f32 * self.page_height)
            .collect()
    }

    fn apply_height(&mut self, height: f32) -> Option<u32> {
        self.last_height = height;
        let count = page_count_for_height(height, self.page_height);
        if count == self.page_count {
            return None;
        }
        debug!(from = self.page_count, to = count, height, "page count changed");
        self.page_count = count;
        Some(count)
    }
}

/// Renders the resume through the template and measures the markup.
///
/// Layout runs on the blocking pool. A render failure falls back to the
/// coarse plain-text estimate; it never propagates.
pub async fn measure_template(
    renderer: Arc<dyn TemplateRenderer>,
    data: ResumeData,
    measurer: Arc<dyn Measure>,
) -> f32 {
    let html = match renderer.render(&data).await {
        Ok(html) => html,
        Err(err) => {
            warn!(error = %err, "template render failed, using coarse height");
            return measurer.coarse_height(&data.plain_text());
        }
    };

    let layout = Arc::clone(&measurer);
    let measured =
        tokio::task::spawn_blocking(move || Fragment::parse(&html).map(|f| layout.measure(&f)))
            .await;

    match measured {
        Ok(Ok(height)) => height,
        Ok(Err(err)) => {
            warn!(error = %err, "rendered template is not valid markup, using coarse height");
            measurer.coarse_height(&data.plain_text())
        }
        Err(err) => {
            warn!(error = %err, "template measurement task failed, using coarse height");
            measurer.coarse_height(&data.plain_text())
        }
    }
}
