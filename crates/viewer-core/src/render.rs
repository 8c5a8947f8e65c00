use image::imageops::{self, FilterType};
use pdf_engine::RgbaImage;
use std::sync::Arc;

/// One raster page scaled for display. The source stays at scale 1.0; the
/// target size already includes the zoom factor.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub page_index: usize,
    pub source: Arc<RgbaImage>,
    pub width: u32,
    pub height: u32,
}

impl PageLayout {
    pub(crate) fn new(page_index: usize, source: Arc<RgbaImage>, zoom: f32) -> Self {
        let width = scaled(source.width(), zoom);
        let height = scaled(source.height(), zoom);
        Self { page_index, source, width, height }
    }

    /// Resizes the source to the target size with a Lanczos filter.
    pub fn rasterize(&self) -> RgbaImage {
        if self.width == self.source.width() && self.height == self.source.height() {
            return (*self.source).clone();
        }

        imageops::resize(self.source.as_ref(), self.width, self.height, FilterType::Lanczos3)
    }
}

fn scaled(extent: u32, zoom: f32) -> u32 {
    ((extent as f32 * zoom) as u32).max(1)
}

/// What the presentation surface should draw next.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderInstruction {
    /// No document is loaded.
    Placeholder,
    Html { html: String, font_family: String, font_size: u8 },
    Page(PageLayout),
    /// Continuous layout is stale; every page must be laid out again.
    RebuildAll(Vec<PageLayout>),
    /// Continuous layout on screen is still current.
    Unchanged,
}
