//! Deterministic text metrics — measures rendered fragment height without a
//! browser layout pass.
//!
//! Character widths are static em tables (ASCII 0x20..=0x7E, index = code - 32).
//! Inter is the reference table; the other resume fonts are expressed as a
//! width scale over it. Non-ASCII characters fall back to the average width.
//!
//! Layout model: greedy word wrap at the content width, block elements open a
//! new line, `<br>` ends the current line (or adds an empty one), headings scale
//! the font, and images/rules contribute fixed heights.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::editor::document::{Element, Fragment, Node};
use crate::editor::pagination::Measure;

// ────────────────────────────────────────────────────────────────────────────
// Fonts
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontFamily {
    Inter,
    EbGaramond,
    Lato,
    /// Condensed display face.
    Oswald,
    ComputerModern,
}

impl FontFamily {
    /// CSS `font-family` stack for the exported document.
    pub fn css_family(self) -> &'static str {
        match self {
            FontFamily::Inter => "'Inter', sans-serif",
            FontFamily::EbGaramond => "'EB Garamond', serif",
            FontFamily::Lato => "'Lato', sans-serif",
            FontFamily::Oswald => "'Oswald', sans-serif",
            FontFamily::ComputerModern => "'CMU Serif', serif",
        }
    }

    /// Width relative to Inter.
    fn width_scale(self) -> f32 {
        match self {
            FontFamily::Inter => 1.0,
            FontFamily::EbGaramond => 0.85,
            FontFamily::Lato => 1.05,
            FontFamily::Oswald => 0.68,
            FontFamily::ComputerModern => 0.90,
        }
    }
}

impl FromStr for FontFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "inter" => Ok(FontFamily::Inter),
            "eb_garamond" | "garamond" => Ok(FontFamily::EbGaramond),
            "lato" => Ok(FontFamily::Lato),
            "oswald" => Ok(FontFamily::Oswald),
            "computer_modern" | "cm" => Ok(FontFamily::ComputerModern),
            other => Err(format!("unknown font family '{other}'")),
        }
    }
}

#[rustfmt::skip]
static INTER_WIDTHS: [f32; 95] = [
    // sp    !     "     #     $     %     &     '     (     )     *     +     ,     -     .     /
    0.25, 0.30, 0.38, 0.56, 0.56, 0.89, 0.67, 0.22, 0.33, 0.33, 0.39, 0.59, 0.28, 0.33, 0.28, 0.31,
    // 0-9
    0.56, 0.56, 0.56, 0.56, 0.56, 0.56, 0.56, 0.56, 0.56, 0.56,
    // :     ;     <     =     >     ?     @
    0.28, 0.28, 0.59, 0.59, 0.59, 0.50, 1.02,
    // A-M
    0.67, 0.61, 0.61, 0.67, 0.56, 0.50, 0.67, 0.67, 0.25, 0.39, 0.61, 0.53, 0.78,
    // N-Z
    0.67, 0.72, 0.56, 0.72, 0.61, 0.50, 0.56, 0.67, 0.67, 0.89, 0.61, 0.61, 0.56,
    // [     \     ]     ^     _     `
    0.28, 0.31, 0.28, 0.47, 0.56, 0.34,
    // a-m
    0.56, 0.56, 0.50, 0.56, 0.56, 0.31, 0.56, 0.56, 0.22, 0.22, 0.53, 0.22, 0.83,
    // n-z
    0.56, 0.56, 0.56, 0.56, 0.33, 0.44, 0.39, 0.56, 0.50, 0.72, 0.50, 0.50, 0.44,
    // {     |     }     ~
    0.33, 0.26, 0.33, 0.59,
];
const INTER_AVERAGE_WIDTH: f32 = 0.52;

/// Character widths for one font family, in em.
#[derive(Debug, Clone, Copy)]
pub struct FontMetrics {
    scale: f32,
}

impl FontMetrics {
    pub fn for_family(family: FontFamily) -> Self {
        Self {
            scale: family.width_scale(),
        }
    }

    pub fn char_width(&self, c: char) -> f32 {
        let code = c as usize;
        let base = if (32..=126).contains(&code) {
            INTER_WIDTHS[code - 32]
        } else {
            INTER_AVERAGE_WIDTH
        };
        base * self.scale
    }

    pub fn measure_str(&self, s: &str) -> f32 {
        s.chars().map(|c| self.char_width(c)).sum()
    }

    pub fn space_width(&self) -> f32 {
        self.char_width(' ')
    }

    pub fn average_char_width(&self) -> f32 {
        INTER_AVERAGE_WIDTH * self.scale
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Page layout
// ────────────────────────────────────────────────────────────────────────────

/// Styling of the measurement container. Mirrors the visible editing surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    pub font: FontFamily,
    pub font_size_px: f32,
    /// Line height as a multiple of the font size.
    pub line_height: f32,
    /// A4 width at 96 dpi (794px) minus horizontal padding.
    pub content_width_px: f32,
    /// Space after paragraphs, headings and lists.
    pub block_gap_px: f32,
    pub rule_height_px: f32,
    pub default_image_height_px: f32,
}

pub fn default_page_layout(font: FontFamily) -> PageLayout {
    PageLayout {
        font,
        font_size_px: 14.0,
        line_height: 1.5,
        content_width_px: 698.0,
        block_gap_px: 6.0,
        rule_height_px: 17.0,
        default_image_height_px: 96.0,
    }
}

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "figure", "footer",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "li", "main", "nav", "ol", "p", "pre",
    "section", "table", "tbody", "thead", "tr", "ul",
];

const SPACED_BLOCK_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6", "ol", "p", "ul"];

const SKIPPED_TAGS: &[&str] = &["head", "script", "style", "template", "title"];

fn font_scale(tag: &str) -> f32 {
    match tag {
        "h1" => 2.0,
        "h2" => 1.5,
        "h3" => 1.17,
        "h5" | "small" | "sub" | "sup" => 0.83,
        "h6" => 0.67,
        _ => 1.0,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Measurer
// ────────────────────────────────────────────────────────────────────────────

/// Browser-free implementation of [`Measure`].
#[derive(Debug, Clone)]
pub struct TextMetricsMeasurer {
    layout: PageLayout,
    metrics: FontMetrics,
}

impl TextMetricsMeasurer {
    pub fn new(layout: PageLayout) -> Self {
        let metrics = FontMetrics::for_family(layout.font);
        Self { layout, metrics }
    }

    fn line_px(&self, scale: f32) -> f32 {
        self.layout.font_size_px * scale * self.layout.line_height
    }
}

impl Measure for TextMetricsMeasurer {
    fn measure(&self, fragment: &Fragment) -> f32 {
        let mut flow = Flow::new(self);
        for node in &fragment.children {
            flow.node(node, 1.0);
        }
        flow.finish()
    }

    fn coarse_height(&self, text: &str) -> f32 {
        let char_px = self.metrics.average_char_width() * self.layout.font_size_px;
        let chars_per_line = (self.layout.content_width_px / char_px).max(1.0);
        let lines: f32 = text
            .lines()
            .map(|line| (line.chars().count() as f32 / chars_per_line).ceil().max(1.0))
            .sum();
        lines * self.line_px(1.0)
    }
}

struct Line {
    width: f32,
    height: f32,
}

/// Running layout state for one measurement.
struct Flow<'a> {
    measurer: &'a TextMetricsMeasurer,
    height: f32,
    line: Option<Line>,
    pending_space: bool,
}

impl<'a> Flow<'a> {
    fn new(measurer: &'a TextMetricsMeasurer) -> Self {
        Self {
            measurer,
            height: 0.0,
            line: None,
            pending_space: false,
        }
    }

    fn finish(mut self) -> f32 {
        self.commit();
        self.height
    }

    fn node(&mut self, node: &Node, scale: f32) {
        match node {
            Node::Text(text) => self.text(text, scale),
            Node::Element(el) => self.element(el, scale),
            Node::Marker(_) => {}
        }
    }

    fn element(&mut self, el: &Element, scale: f32) {
        let tag = el.tag.as_str();
        if SKIPPED_TAGS.contains(&tag) {
            return;
        }
        match tag {
            "br" => self.line_break(scale),
            "img" => {
                let height = px_attr(el, "height").unwrap_or(self.measurer.layout.default_image_height_px);
                self.commit();
                self.height += height;
            }
            "hr" => {
                self.commit();
                self.height += self.measurer.layout.rule_height_px;
            }
            "svg" => {
                // Inline icon box; its drawing commands have no text.
                let font_px = self.measurer.layout.font_size_px * scale;
                let width = px_attr(el, "width").unwrap_or(font_px);
                self.inline_box(width, scale);
            }
            _ => {
                let scale = scale * font_scale(tag);
                let is_block = BLOCK_TAGS.contains(&tag);
                if is_block {
                    self.commit();
                }
                for child in &el.children {
                    self.node(child, scale);
                }
                if is_block {
                    self.commit();
                    if SPACED_BLOCK_TAGS.contains(&tag) {
                        self.height += self.measurer.layout.block_gap_px;
                    }
                }
            }
        }
    }

    fn text(&mut self, text: &str, scale: f32) {
        if text.starts_with(char::is_whitespace) {
            self.pending_space = true;
        }
        for (i, word) in text.split_whitespace().enumerate() {
            if i > 0 {
                self.pending_space = true;
            }
            let width = self.measurer.metrics.measure_str(word) * self.measurer.layout.font_size_px * scale;
            self.inline_box(width, scale);
        }
        if text.ends_with(char::is_whitespace) {
            self.pending_space = true;
        }
    }

    /// Places an unbreakable box of `width` px on the current line, wrapping if needed.
    fn inline_box(&mut self, width: f32, scale: f32) {
        let line_px = self.measurer.line_px(scale);
        let space = self.measurer.metrics.space_width() * self.measurer.layout.font_size_px * scale;
        let max_width = self.measurer.layout.content_width_px;
        let pending_space = std::mem::take(&mut self.pending_space);

        match self.line.as_mut() {
            None => {
                self.line = Some(Line {
                    width,
                    height: line_px,
                })
            }
            Some(line) => {
                let gap = if pending_space && line.width > 0.0 { space } else { 0.0 };
                if line.width > 0.0 && line.width + gap + width > max_width {
                    self.height += line.height;
                    self.line = Some(Line {
                        width,
                        height: line_px,
                    });
                } else {
                    line.width += gap + width;
                    line.height = line.height.max(line_px);
                }
            }
        }
    }

    /// `<br>`: closes the open line, or emits an empty one.
    fn line_break(&mut self, scale: f32) {
        match self.line.take() {
            Some(line) => self.height += line.height,
            None => self.height += self.measurer.line_px(scale),
        }
        self.pending_space = false;
    }

    fn commit(&mut self) {
        if let Some(line) = self.line.take() {
            self.height += line.height;
        }
        self.pending_space = false;
    }
}

fn px_attr(el: &Element, name: &str) -> Option<f32> {
    el.attr(name)?
        .trim()
        .trim_end_matches("px")
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}
