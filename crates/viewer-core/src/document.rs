use doc_model::DocumentKind;
use epub_engine::ExtractedResources;
use pdf_engine::RgbaImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
pub(crate) enum Pages {
    /// Pages rasterized once at scale 1.0.
    Raster(Vec<Arc<RgbaImage>>),
    Reflowable { chapters: Vec<String>, resources: ExtractedResources },
}

/// A loaded document. Replaced wholesale on the next open; owns any resources
/// unpacked for it.
#[derive(Debug)]
pub struct Document {
    path: PathBuf,
    title: String,
    pages: Pages,
}

impl Document {
    /// Titles come from the file name for both kinds.
    pub(crate) fn new(path: &Path, pages: Pages) -> Self {
        let title = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self { path: path.to_path_buf(), title, pages }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn kind(&self) -> DocumentKind {
        match self.pages {
            Pages::Raster(_) => DocumentKind::Raster,
            Pages::Reflowable { .. } => DocumentKind::Reflowable,
        }
    }

    pub fn page_count(&self) -> usize {
        match &self.pages {
            Pages::Raster(pages) => pages.len(),
            Pages::Reflowable { chapters, .. } => chapters.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.page_count() == 0
    }

    /// Directory holding unpacked book assets, for reflowable documents.
    pub fn resource_dir(&self) -> Option<&Path> {
        match &self.pages {
            Pages::Raster(_) => None,
            Pages::Reflowable { resources, .. } => Some(resources.path()),
        }
    }

    /// Native size of a raster page in pixels, equal to its size in points.
    pub fn page_dimensions(&self, index: usize) -> Option<(u32, u32)> {
        match &self.pages {
            Pages::Raster(pages) => pages.get(index).map(|page| page.dimensions()),
            Pages::Reflowable { .. } => None,
        }
    }

    pub(crate) fn pages(&self) -> &Pages {
        &self.pages
    }

    /// Drops the document, deleting unpacked assets right away.
    pub(crate) fn release(self) -> std::io::Result<()> {
        match self.pages {
            Pages::Raster(_) => Ok(()),
            Pages::Reflowable { resources, .. } => resources.release(),
        }
    }
}
