mod raster;

use image::{ImageBuffer, Rgba};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// US Letter, used when a page carries no readable MediaBox.
const FALLBACK_PAGE_SIZE: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page_index: 0, scale: 1.0 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("document is encrypted and needs a password")]
    PasswordRequired,
    #[error("incorrect password")]
    IncorrectPassword,
    #[error("backend error: {0}")]
    Backend(String),
}

pub trait PdfEngine {
    /// Opens a document. Encrypted documents fail with `PasswordRequired` until a
    /// passphrase is supplied, and with `IncorrectPassword` when it does not match.
    fn open(
        &mut self,
        path: &Path,
        passphrase: Option<&str>,
    ) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError>;
    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;
}

#[derive(Debug, Clone, Copy)]
struct PageRecord {
    id: ObjectId,
    size: PageSize,
}

#[derive(Debug)]
struct DocumentRecord {
    doc: Document,
    pages: Vec<PageRecord>,
}

#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(bytes: &[u8], passphrase: Option<&str>) -> Result<Document, PdfEngineError> {
        let doc = match passphrase {
            None => Document::load_mem(bytes)?,
            Some(passphrase) => {
                Document::load_mem_with_password(bytes, passphrase).map_err(|err| match err {
                    lopdf::Error::InvalidPassword | lopdf::Error::Decryption(_) => {
                        PdfEngineError::IncorrectPassword
                    }
                    other => other.into(),
                })?
            }
        };

        // Documents with an empty user password are decrypted while loading.
        if doc.is_encrypted() {
            return Err(PdfEngineError::PasswordRequired);
        }

        Ok(doc)
    }

    fn parse_pages(doc: &Document) -> Result<Vec<PageRecord>, PdfEngineError> {
        let page_ids = doc.get_pages();
        let mut pages = Vec::with_capacity(page_ids.len());

        for (_, id) in page_ids {
            let dict = doc.get_dictionary(id)?;
            let size = media_box(doc, dict).unwrap_or(FALLBACK_PAGE_SIZE);
            pages.push(PageRecord { id, size });
        }

        if pages.is_empty() {
            return Err(PdfEngineError::Backend("document has no pages".to_owned()));
        }

        Ok(pages)
    }

    fn open_bytes(
        &mut self,
        bytes: &[u8],
        passphrase: Option<&str>,
    ) -> Result<DocumentHandle, PdfEngineError> {
        let doc = Self::load(bytes, passphrase)?;
        let pages = Self::parse_pages(&doc)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        self.docs.insert(handle, DocumentRecord { doc, pages });

        Ok(handle)
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, PdfEngineError> {
        self.docs.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }

    fn page(&self, handle: DocumentHandle, page_index: u32) -> Result<PageRecord, PdfEngineError> {
        let record = self.record(handle)?;
        record.pages.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: record.pages.len() as u32,
        })
    }
}

/// Reads the MediaBox of a page, following `Parent` links for inherited boxes.
fn media_box<'a>(doc: &'a Document, page: &'a Dictionary) -> Option<PageSize> {
    let mut current = page;

    // Page trees are shallow; the bound only guards against reference cycles.
    for _ in 0..32 {
        if let Some(size) = current.get(b"MediaBox").ok().and_then(|obj| rect_size(doc, obj)) {
            return Some(size);
        }

        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }

    None
}

fn rect_size<'a>(doc: &'a Document, obj: &'a Object) -> Option<PageSize> {
    let obj = match obj {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let array = obj.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }

    let x0 = array[0].as_float().ok()?;
    let y0 = array[1].as_float().ok()?;
    let x1 = array[2].as_float().ok()?;
    let y1 = array[3].as_float().ok()?;

    Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
}

fn effective_scale(scale: f32) -> f32 {
    if scale > 0.0 && scale.is_finite() {
        scale
    } else {
        1.0
    }
}

impl PdfEngine for LopdfEngine {
    fn open(
        &mut self,
        path: &Path,
        passphrase: Option<&str>,
    ) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = fs::read(path)?;
        self.open_bytes(&bytes, passphrase)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.record(handle)?.pages.len() as u32)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        Ok(self.page(handle, page_index)?.size)
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError> {
        let page = self.page(handle, request.page_index)?;
        let doc = &self.record(handle)?.doc;

        Ok(raster::render_page(doc, page.id, page.size, effective_scale(request.scale)))
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

#[cfg(feature = "pdfium")]
pub mod pdfium_backend {
    use super::*;
    use pdfium_render::prelude::*;

    /// Rasterizes through a system pdfium library while page geometry and
    /// passphrase checks stay on the lopdf path.
    pub struct PdfiumEngine {
        pdfium: Pdfium,
        inner: LopdfEngine,
        sources: HashMap<DocumentHandle, (Vec<u8>, Option<String>)>,
    }

    impl PdfiumEngine {
        pub fn from_system_library() -> Result<Self, PdfEngineError> {
            let bindings = Pdfium::bind_to_system_library().map_err(|err| {
                PdfEngineError::Backend(format!("failed to bind pdfium system library: {err}"))
            })?;

            Ok(Self {
                pdfium: Pdfium::new(bindings),
                inner: LopdfEngine::default(),
                sources: HashMap::new(),
            })
        }
    }

    impl PdfEngine for PdfiumEngine {
        fn open(
            &mut self,
            path: &Path,
            passphrase: Option<&str>,
        ) -> Result<DocumentHandle, PdfEngineError> {
            let bytes = fs::read(path)?;
            let handle = self.inner.open_bytes(&bytes, passphrase)?;
            self.sources.insert(handle, (bytes, passphrase.map(ToOwned::to_owned)));
            Ok(handle)
        }

        fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
            self.inner.page_count(handle)
        }

        fn page_size(
            &self,
            handle: DocumentHandle,
            page_index: u32,
        ) -> Result<PageSize, PdfEngineError> {
            self.inner.page_size(handle, page_index)
        }

        fn render_page(
            &self,
            handle: DocumentHandle,
            request: RenderRequest,
        ) -> Result<RgbaImage, PdfEngineError> {
            let size = self.inner.page_size(handle, request.page_index)?;
            let (bytes, passphrase) =
                self.sources.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))?;
            let backend = |err: PdfiumError| PdfEngineError::Backend(err.to_string());

            let document =
                self.pdfium.load_pdf_from_byte_slice(bytes, passphrase.as_deref()).map_err(backend)?;
            let page = document.pages().get(request.page_index as u16).map_err(backend)?;
            let (width, height) = raster::canvas_size(size, effective_scale(request.scale));
            let config = PdfRenderConfig::new()
                .set_target_width(width as i32)
                .set_target_height(height as i32);

            Ok(page.render_with_config(&config).map_err(backend)?.as_image().to_rgba8())
        }

        fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
            self.sources.remove(&handle);
            self.inner.close(handle)
        }
    }
}

/// Engine picked at startup: pdfium when built with the `pdfium` feature and a
/// system library binds, lopdf otherwise.
pub enum SystemEngine {
    Lopdf(LopdfEngine),
    #[cfg(feature = "pdfium")]
    Pdfium(pdfium_backend::PdfiumEngine),
}

impl SystemEngine {
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Lopdf(_) => "lopdf",
            #[cfg(feature = "pdfium")]
            Self::Pdfium(_) => "pdfium",
        }
    }

    fn engine(&self) -> &dyn PdfEngine {
        match self {
            Self::Lopdf(engine) => engine,
            #[cfg(feature = "pdfium")]
            Self::Pdfium(engine) => engine,
        }
    }

    fn engine_mut(&mut self) -> &mut dyn PdfEngine {
        match self {
            Self::Lopdf(engine) => engine,
            #[cfg(feature = "pdfium")]
            Self::Pdfium(engine) => engine,
        }
    }
}

impl PdfEngine for SystemEngine {
    fn open(
        &mut self,
        path: &Path,
        passphrase: Option<&str>,
    ) -> Result<DocumentHandle, PdfEngineError> {
        self.engine_mut().open(path, passphrase)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        self.engine().page_count(handle)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        self.engine().page_size(handle, page_index)
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError> {
        self.engine().render_page(handle, request)
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.engine_mut().close(handle)
    }
}

#[cfg(feature = "pdfium")]
pub fn default_engine() -> SystemEngine {
    let engine = match pdfium_backend::PdfiumEngine::from_system_library() {
        Ok(engine) => SystemEngine::Pdfium(engine),
        Err(err) => {
            tracing::warn!(%err, "pdfium unavailable, rendering images only");
            SystemEngine::Lopdf(LopdfEngine::new())
        }
    };
    info!(backend = engine.backend_name(), "PDF engine ready");
    engine
}

#[cfg(not(feature = "pdfium"))]
pub fn default_engine() -> SystemEngine {
    let engine = SystemEngine::Lopdf(LopdfEngine::new());
    info!(backend = engine.backend_name(), "PDF engine ready");
    engine
}
