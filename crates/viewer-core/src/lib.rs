//! Viewer state for one open document: which page is shown, how large, in
//! which layout, and what the presentation surface should draw next.

mod document;
mod error;
mod events;
mod render;
mod state;

pub use document::Document;
pub use error::{EngineError, ViewerError};
pub use events::{Navigation, NoPrompt, PassphrasePrompt, ScrollEdge, ViewerEvent};
pub use render::{PageLayout, RenderInstruction};
pub use state::{
    clamp_font_size, clamp_zoom, ViewState, FONT_SIZE_MAX, FONT_SIZE_MIN, ZOOM_DEFAULT, ZOOM_MAX,
    ZOOM_MIN, ZOOM_PERCENT_MAX, ZOOM_PERCENT_MIN, ZOOM_STEP,
};

use doc_model::{DocumentKind, LayoutMode, Settings};
use document::Pages;
use epub_engine::{EpubEngine, ZipEpubEngine};
use fereader_i18n::{FluentArgs, I18n};
use pdf_engine::{
    DocumentHandle, PdfEngine, PdfEngineError, RenderRequest, RgbaImage, SystemEngine,
};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ViewerController<P: PdfEngine = SystemEngine, E: EpubEngine = ZipEpubEngine> {
    pdf: P,
    epub: E,
    document: Option<Document>,
    view: ViewState,
    settings: Settings,
    subscribers: Vec<Sender<ViewerEvent>>,
}

impl ViewerController<SystemEngine, ZipEpubEngine> {
    pub fn with_default_engines(settings: Settings) -> Self {
        Self::new(pdf_engine::default_engine(), epub_engine::default_engine(), settings)
    }
}

impl<P: PdfEngine, E: EpubEngine> ViewerController<P, E> {
    pub fn new(pdf: P, epub: E, settings: Settings) -> Self {
        let settings = settings.normalized();
        let view = ViewState::reset(settings.font_size);
        Self { pdf, epub, document: None, view, settings, subscribers: Vec::new() }
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn kind(&self) -> Option<DocumentKind> {
        self.document.as_ref().map(Document::kind)
    }

    pub fn page_count(&self) -> usize {
        self.document.as_ref().map_or(0, Document::page_count)
    }

    pub fn current_page(&self) -> usize {
        self.view.page_index
    }

    /// Registers an observer. Receivers that hang up are dropped on the next event.
    pub fn subscribe(&mut self) -> Receiver<ViewerEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: ViewerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Loads `path`, replacing the current document. The previous document is
    /// released first, so a failed open leaves nothing loaded.
    pub fn open(
        &mut self,
        path: &Path,
        prompt: &mut dyn PassphrasePrompt,
    ) -> Result<&Document, ViewerError> {
        self.close();

        let loaded = match DocumentKind::from_path(path) {
            Some(DocumentKind::Raster) => self.load_raster(path, prompt),
            Some(DocumentKind::Reflowable) => self.load_reflowable(path),
            None => Err(ViewerError::UnsupportedFormat(path.display().to_string())),
        };

        let document = match loaded {
            Ok(document) => document,
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to open document");
                return Err(err);
            }
        };

        info!(
            path = %path.display(),
            kind = document.kind().as_str(),
            pages = document.page_count(),
            "opened document"
        );
        self.view = ViewState::reset(self.settings.font_size);
        self.emit(ViewerEvent::DocumentOpened {
            path: path.to_path_buf(),
            kind: document.kind(),
            page_count: document.page_count(),
        });

        Ok(&*self.document.insert(document))
    }

    fn load_raster(
        &mut self,
        path: &Path,
        prompt: &mut dyn PassphrasePrompt,
    ) -> Result<Document, ViewerError> {
        let handle = match self.pdf.open(path, None) {
            Ok(handle) => handle,
            Err(PdfEngineError::PasswordRequired) => {
                debug!(path = %path.display(), "document is encrypted, asking for passphrase");
                let passphrase = prompt
                    .request_passphrase(path)
                    .filter(|passphrase| !passphrase.is_empty())
                    .ok_or(ViewerError::AuthCancelled)?;
                self.pdf.open(path, Some(&passphrase))?
            }
            Err(err) => return Err(err.into()),
        };

        let pages = self.render_all_pages(handle);
        if let Err(err) = self.pdf.close(handle) {
            warn!(%err, "failed to close engine handle");
        }

        Ok(Document::new(path, Pages::Raster(pages?)))
    }

    fn render_all_pages(
        &self,
        handle: DocumentHandle,
    ) -> Result<Vec<Arc<RgbaImage>>, PdfEngineError> {
        let page_count = self.pdf.page_count(handle)?;

        (0..page_count)
            .map(|page_index| {
                let request = RenderRequest { page_index, scale: 1.0 };
                self.pdf.render_page(handle, request).map(Arc::new)
            })
            .collect()
    }

    fn load_reflowable(&mut self, path: &Path) -> Result<Document, ViewerError> {
        let book = self.epub.open(path)?;
        let chapters = book.chapters.into_iter().map(|chapter| chapter.html).collect();

        Ok(Document::new(path, Pages::Reflowable { chapters, resources: book.resources }))
    }

    /// Drops the current document and deletes anything unpacked for it.
    pub fn close(&mut self) {
        self.view = ViewState::reset(self.settings.font_size);

        let Some(document) = self.document.take() else {
            return;
        };

        info!(path = %document.path().display(), "closing document");
        if let Err(err) = document.release() {
            warn!(%err, "failed to remove extracted resources");
        }
        self.emit(ViewerEvent::DocumentClosed);
    }

    /// Moves to a page, clamped into the document. Returns the resulting index.
    pub fn navigate(&mut self, target: Navigation) -> usize {
        let page_count = self.page_count();
        if page_count == 0 {
            return self.view.page_index;
        }

        let last = page_count - 1;
        let index = match target {
            Navigation::Absolute(index) => index.min(last),
            Navigation::Relative(delta) => {
                let current = i64::try_from(self.view.page_index).unwrap_or(i64::MAX);
                let target = current.saturating_add(delta).max(0);
                usize::try_from(target).map_or(last, |target| target.min(last))
            }
        };

        if index != self.view.page_index {
            debug!(from = self.view.page_index, to = index, "page changed");
            self.view.page_index = index;
            self.emit(ViewerEvent::PageChanged(index));
        }

        index
    }

    pub fn next_page(&mut self) -> usize {
        self.navigate(Navigation::Relative(1))
    }

    pub fn previous_page(&mut self) -> usize {
        self.navigate(Navigation::Relative(-1))
    }

    /// Sets the raster zoom factor, clamped into range. In continuous layout
    /// every call marks the layout stale, even when the value is unchanged.
    pub fn set_zoom(&mut self, zoom: f32) {
        if self.kind() != Some(DocumentKind::Raster) {
            return;
        }

        let Some(zoom) = clamp_zoom(zoom) else {
            debug!("ignoring NaN zoom");
            return;
        };

        let changed = zoom != self.view.zoom;
        self.view.zoom = zoom;
        if self.view.layout == LayoutMode::Continuous {
            self.view.dirty = true;
        }

        if changed {
            debug!(zoom, "zoom changed");
            let percent = self.zoom_percent();
            self.emit(ViewerEvent::ZoomChanged { percent });
        }
    }

    /// Sets the reflowable font size in points, clamped into range.
    pub fn set_font_size(&mut self, size: i32) {
        if self.kind() != Some(DocumentKind::Reflowable) {
            return;
        }

        let size = clamp_font_size(i64::from(size));
        if size == self.view.font_size {
            return;
        }

        debug!(size, "font size changed");
        self.view.font_size = size;
        let percent = self.zoom_percent();
        self.emit(ViewerEvent::ZoomChanged { percent });
    }

    pub fn zoom_in(&mut self) {
        match self.kind() {
            Some(DocumentKind::Raster) => self.set_zoom(self.view.zoom + ZOOM_STEP),
            Some(DocumentKind::Reflowable) => self.set_font_size(i32::from(self.view.font_size) + 1),
            None => {}
        }
    }

    pub fn zoom_out(&mut self) {
        match self.kind() {
            Some(DocumentKind::Raster) => self.set_zoom(self.view.zoom - ZOOM_STEP),
            Some(DocumentKind::Reflowable) => self.set_font_size(i32::from(self.view.font_size) - 1),
            None => {}
        }
    }

    fn base_font_size(&self) -> u8 {
        clamp_font_size(i64::from(self.settings.font_size))
    }

    /// Magnification shown in the zoom box: raster zoom, or the reflowable font
    /// relative to the configured base size.
    pub fn zoom_percent(&self) -> u32 {
        match self.kind() {
            Some(DocumentKind::Raster) => (self.view.zoom * 100.0).round() as u32,
            Some(DocumentKind::Reflowable) => {
                let ratio = f32::from(self.view.font_size) / f32::from(self.base_font_size());
                (ratio * 100.0).round() as u32
            }
            None => 100,
        }
    }

    pub fn set_zoom_percent(&mut self, percent: u32) {
        let percent = percent.clamp(ZOOM_PERCENT_MIN, ZOOM_PERCENT_MAX) as f32;

        match self.kind() {
            Some(DocumentKind::Raster) => self.set_zoom(percent / 100.0),
            Some(DocumentKind::Reflowable) => {
                let size = (f32::from(self.base_font_size()) * percent / 100.0).round();
                self.set_font_size(size as i32);
            }
            None => {}
        }
    }

    /// Switches between one page and all pages stacked. Raster documents only.
    pub fn set_layout_mode(&mut self, layout: LayoutMode) {
        if self.kind() != Some(DocumentKind::Raster) {
            return;
        }

        if layout == LayoutMode::Continuous {
            self.view.dirty = true;
        }

        if layout != self.view.layout {
            debug!(?layout, "layout changed");
            self.view.layout = layout;
            self.emit(ViewerEvent::LayoutChanged(layout));
        }
    }

    /// Turns the page when a single raster page is scrolled past its edge.
    pub fn on_scroll_edge(&mut self, edge: ScrollEdge) -> usize {
        let single_raster = self.kind() == Some(DocumentKind::Raster)
            && self.view.layout == LayoutMode::Single;
        if !single_raster {
            return self.view.page_index;
        }

        match edge {
            ScrollEdge::RequestPrev => self.previous_page(),
            ScrollEdge::RequestNext => self.next_page(),
        }
    }

    /// Decides what to draw for the current state. A continuous layout is
    /// handed out in full only when stale, which clears the dirty flag.
    pub fn render_request(&mut self) -> RenderInstruction {
        let Some(document) = &self.document else {
            return RenderInstruction::Placeholder;
        };

        let index = self.view.page_index;
        match document.pages() {
            Pages::Reflowable { chapters, .. } => match chapters.get(index) {
                Some(html) => RenderInstruction::Html {
                    html: html.clone(),
                    font_family: self.settings.font_family.clone(),
                    font_size: self.view.font_size,
                },
                None => RenderInstruction::Placeholder,
            },
            Pages::Raster(pages) => match self.view.layout {
                LayoutMode::Single => pages
                    .get(index)
                    .map(|source| {
                        RenderInstruction::Page(PageLayout::new(
                            index,
                            Arc::clone(source),
                            self.view.zoom,
                        ))
                    })
                    .unwrap_or(RenderInstruction::Placeholder),
                LayoutMode::Continuous if self.view.dirty => {
                    let layouts = pages
                        .iter()
                        .enumerate()
                        .map(|(page_index, source)| {
                            PageLayout::new(page_index, Arc::clone(source), self.view.zoom)
                        })
                        .collect();
                    self.view.dirty = false;
                    RenderInstruction::RebuildAll(layouts)
                }
                LayoutMode::Continuous => RenderInstruction::Unchanged,
            },
        }
    }

    /// Installs new settings. The reflowable font size restarts from the new base.
    pub fn apply_settings(&mut self, settings: Settings) {
        self.settings = settings.normalized();
        self.view.font_size = self.base_font_size();
        info!(
            theme = %self.settings.theme,
            language = %self.settings.language,
            font_size = self.settings.font_size,
            "settings applied"
        );
        self.emit(ViewerEvent::SettingsChanged);
    }

    pub fn status_line(&self, i18n: &I18n) -> String {
        let Some(document) = &self.document else {
            return i18n.tr("no-document");
        };

        let mut args = FluentArgs::new();
        args.set("title", document.title().to_owned());
        args.set("current", self.view.page_index + 1);
        args.set("total", document.page_count());
        i18n.tr_args("status-page", &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::Language;
    use epub_engine::{Chapter, EpubBook, EpubError, ExtractedResources};
    use pdf_engine::PageSize;
    use std::path::PathBuf;

    #[derive(Default)]
    struct FakePdf {
        pages: Vec<(u32, u32)>,
        password: Option<String>,
        fail: bool,
        open_handles: usize,
        next_handle: u64,
    }

    impl FakePdf {
        fn with_pages(count: usize) -> Self {
            Self { pages: vec![(60, 80); count], ..Self::default() }
        }

        fn encrypted(count: usize, password: &str) -> Self {
            Self { password: Some(password.to_owned()), ..Self::with_pages(count) }
        }

        fn page(&self, page_index: u32) -> Result<(u32, u32), PdfEngineError> {
            self.pages.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
                page: page_index,
                page_count: self.pages.len() as u32,
            })
        }
    }

    impl PdfEngine for FakePdf {
        fn open(
            &mut self,
            _path: &Path,
            passphrase: Option<&str>,
        ) -> Result<DocumentHandle, PdfEngineError> {
            if self.fail {
                return Err(PdfEngineError::Backend("corrupt file".to_owned()));
            }

            match (&self.password, passphrase) {
                (Some(_), None) => return Err(PdfEngineError::PasswordRequired),
                (Some(expected), Some(given)) if expected != given => {
                    return Err(PdfEngineError::IncorrectPassword)
                }
                _ => {}
            }

            self.open_handles += 1;
            self.next_handle += 1;
            Ok(DocumentHandle::from_raw(self.next_handle))
        }

        fn page_count(&self, _handle: DocumentHandle) -> Result<u32, PdfEngineError> {
            Ok(self.pages.len() as u32)
        }

        fn page_size(
            &self,
            _handle: DocumentHandle,
            page_index: u32,
        ) -> Result<PageSize, PdfEngineError> {
            let (width, height) = self.page(page_index)?;
            Ok(PageSize { width_pt: width as f32, height_pt: height as f32 })
        }

        fn render_page(
            &self,
            _handle: DocumentHandle,
            request: RenderRequest,
        ) -> Result<RgbaImage, PdfEngineError> {
            let (width, height) = self.page(request.page_index)?;
            Ok(RgbaImage::new(width, height))
        }

        fn close(&mut self, _handle: DocumentHandle) -> Result<(), PdfEngineError> {
            self.open_handles -= 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeEpub {
        chapters: Vec<String>,
        fail: bool,
    }

    impl FakeEpub {
        fn with_chapters(chapters: &[&str]) -> Self {
            Self { chapters: chapters.iter().map(|html| (*html).to_owned()).collect(), fail: false }
        }
    }

    impl EpubEngine for FakeEpub {
        fn open(&mut self, _path: &Path) -> Result<EpubBook, EpubError> {
            if self.fail {
                return Err(EpubError::MissingRootfile);
            }

            let resources = ExtractedResources::create()?;
            let chapters = self
                .chapters
                .iter()
                .enumerate()
                .map(|(i, html)| Chapter { href: format!("ch{i}.xhtml"), html: html.clone() })
                .collect();
            Ok(EpubBook { title: Some("Fake".to_owned()), chapters, resources })
        }
    }

    fn controller(pdf: FakePdf, epub: FakeEpub) -> ViewerController<FakePdf, FakeEpub> {
        ViewerController::new(pdf, epub, Settings::default())
    }

    fn open_ok(viewer: &mut ViewerController<FakePdf, FakeEpub>, path: &str) {
        viewer.open(&PathBuf::from(path), &mut NoPrompt).expect("document should open");
    }

    #[test]
    fn navigation_clamps_into_ten_pages() {
        let mut viewer = controller(FakePdf::with_pages(10), FakeEpub::default());
        open_ok(&mut viewer, "book.pdf");

        assert_eq!(viewer.current_page(), 0);
        assert_eq!(viewer.navigate(Navigation::Relative(5)), 5);
        assert_eq!(viewer.navigate(Navigation::Relative(10)), 9);
        assert_eq!(viewer.navigate(Navigation::Relative(-100)), 0);
        assert_eq!(viewer.navigate(Navigation::Absolute(7)), 7);
        assert_eq!(viewer.navigate(Navigation::Absolute(42)), 9);
        assert_eq!(viewer.next_page(), 9);
        assert_eq!(viewer.navigate(Navigation::Relative(i64::MIN)), 0);
        assert_eq!(viewer.previous_page(), 0);
    }

    #[test]
    fn navigation_without_document_is_noop() {
        let mut viewer = controller(FakePdf::default(), FakeEpub::default());
        let events = viewer.subscribe();

        assert_eq!(viewer.navigate(Navigation::Relative(3)), 0);
        assert_eq!(viewer.navigate(Navigation::Absolute(3)), 0);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn empty_raster_document_ignores_navigation() {
        let mut viewer = controller(FakePdf::with_pages(0), FakeEpub::default());
        open_ok(&mut viewer, "empty.pdf");

        assert_eq!(viewer.next_page(), 0);
        assert_eq!(viewer.render_request(), RenderInstruction::Placeholder);
    }

    #[test]
    fn zoom_is_clamped_and_nan_ignored() {
        let mut viewer = controller(FakePdf::with_pages(2), FakeEpub::default());
        open_ok(&mut viewer, "book.pdf");

        viewer.set_zoom(10.0);
        assert_eq!(viewer.view().zoom(), ZOOM_MAX);
        viewer.set_zoom(0.01);
        assert_eq!(viewer.view().zoom(), ZOOM_MIN);
        viewer.set_zoom(f32::INFINITY);
        assert_eq!(viewer.view().zoom(), ZOOM_MAX);
        viewer.set_zoom(f32::NAN);
        assert_eq!(viewer.view().zoom(), ZOOM_MAX);
    }

    #[test]
    fn zoom_steps_and_percent() {
        let mut viewer = controller(FakePdf::with_pages(1), FakeEpub::default());
        assert_eq!(viewer.zoom_percent(), 100);
        open_ok(&mut viewer, "book.pdf");

        viewer.zoom_in();
        assert_eq!(viewer.zoom_percent(), 115);
        viewer.zoom_out();
        viewer.zoom_out();
        assert_eq!(viewer.zoom_percent(), 85);

        viewer.set_zoom_percent(1000);
        assert_eq!(viewer.view().zoom(), ZOOM_MAX);
        viewer.set_zoom_percent(150);
        assert_eq!(viewer.zoom_percent(), 150);
        viewer.set_zoom_percent(0);
        assert_eq!(viewer.zoom_percent(), 50);
    }

    #[test]
    fn font_size_only_applies_to_reflowable_documents() {
        let mut viewer = controller(FakePdf::with_pages(3), FakeEpub::with_chapters(&["<p>a</p>"]));
        open_ok(&mut viewer, "book.pdf");
        viewer.set_layout_mode(LayoutMode::Continuous);
        let before = *viewer.view();

        viewer.set_font_size(30);
        assert_eq!(*viewer.view(), before);

        open_ok(&mut viewer, "book.epub");
        viewer.set_font_size(30);
        assert_eq!(viewer.view().font_size(), 30);
        viewer.set_font_size(1000);
        assert_eq!(viewer.view().font_size(), FONT_SIZE_MAX);
        viewer.set_font_size(-5);
        assert_eq!(viewer.view().font_size(), FONT_SIZE_MIN);
    }

    #[test]
    fn reflowable_zoom_moves_font_relative_to_base() {
        let mut viewer = controller(FakePdf::default(), FakeEpub::with_chapters(&["<p>a</p>"]));
        open_ok(&mut viewer, "book.epub");
        assert_eq!(viewer.view().font_size(), 12);

        viewer.zoom_in();
        assert_eq!(viewer.view().font_size(), 13);
        assert_eq!(viewer.zoom_percent(), 108);

        viewer.set_zoom_percent(200);
        assert_eq!(viewer.view().font_size(), 24);
        assert_eq!(viewer.zoom_percent(), 200);

        viewer.set_zoom(2.0);
        assert_eq!(viewer.view().zoom(), ZOOM_DEFAULT);
    }

    #[test]
    fn layout_mode_is_ignored_for_reflowable_documents() {
        let mut viewer = controller(FakePdf::default(), FakeEpub::with_chapters(&["<p>a</p>"]));
        open_ok(&mut viewer, "book.epub");

        viewer.set_layout_mode(LayoutMode::Continuous);
        assert_eq!(viewer.view().layout(), LayoutMode::Single);
    }

    #[test]
    fn dirty_flag_lifecycle_in_continuous_layout() {
        let mut viewer = controller(FakePdf::with_pages(3), FakeEpub::default());
        open_ok(&mut viewer, "book.pdf");
        assert!(viewer.view().is_dirty());

        viewer.set_layout_mode(LayoutMode::Continuous);
        let RenderInstruction::RebuildAll(layouts) = viewer.render_request() else {
            panic!("stale continuous layout should be rebuilt");
        };
        assert_eq!(layouts.len(), 3);
        assert!(!viewer.view().is_dirty());
        assert_eq!(viewer.render_request(), RenderInstruction::Unchanged);

        viewer.next_page();
        assert_eq!(viewer.render_request(), RenderInstruction::Unchanged);

        viewer.set_zoom(1.5);
        assert!(viewer.view().is_dirty());
        let RenderInstruction::RebuildAll(layouts) = viewer.render_request() else {
            panic!("zoom change should rebuild");
        };
        assert_eq!((layouts[0].width, layouts[0].height), (90, 120));

        viewer.set_zoom(1.5);
        assert!(viewer.view().is_dirty(), "every continuous zoom call marks the layout stale");
    }

    #[test]
    fn single_layout_zoom_does_not_mark_dirty() {
        let mut viewer = controller(FakePdf::with_pages(2), FakeEpub::default());
        open_ok(&mut viewer, "book.pdf");
        viewer.set_layout_mode(LayoutMode::Continuous);
        viewer.render_request();
        viewer.set_layout_mode(LayoutMode::Single);

        viewer.set_zoom(2.0);
        assert!(!viewer.view().is_dirty());

        let RenderInstruction::Page(layout) = viewer.render_request() else {
            panic!("single layout renders one page");
        };
        assert_eq!(layout.page_index, 0);
        assert_eq!((layout.width, layout.height), (120, 160));
    }

    #[test]
    fn render_request_for_each_state() {
        let mut viewer = controller(FakePdf::default(), FakeEpub::with_chapters(&["<p>one</p>"]));
        assert_eq!(viewer.render_request(), RenderInstruction::Placeholder);

        open_ok(&mut viewer, "book.epub");
        assert_eq!(
            viewer.render_request(),
            RenderInstruction::Html {
                html: "<p>one</p>".to_owned(),
                font_family: "Segoe UI".to_owned(),
                font_size: 12,
            }
        );
    }

    #[test]
    fn scroll_edges_turn_pages_only_in_single_raster_layout() {
        let mut viewer = controller(FakePdf::with_pages(4), FakeEpub::default());
        open_ok(&mut viewer, "book.pdf");

        assert_eq!(viewer.on_scroll_edge(ScrollEdge::RequestNext), 1);
        assert_eq!(viewer.on_scroll_edge(ScrollEdge::RequestPrev), 0);
        assert_eq!(viewer.on_scroll_edge(ScrollEdge::RequestPrev), 0);

        viewer.set_layout_mode(LayoutMode::Continuous);
        assert_eq!(viewer.on_scroll_edge(ScrollEdge::RequestNext), 0);
    }

    #[test]
    fn open_resets_view_state() {
        let mut viewer = controller(FakePdf::with_pages(10), FakeEpub::default());
        open_ok(&mut viewer, "a.pdf");
        viewer.navigate(Navigation::Absolute(5));
        viewer.set_zoom(2.0);
        viewer.set_layout_mode(LayoutMode::Continuous);
        viewer.render_request();

        open_ok(&mut viewer, "b.pdf");

        assert_eq!(*viewer.view(), ViewState::reset(12));
        assert_eq!(viewer.document().map(Document::title), Some("b.pdf"));
        assert_eq!(viewer.pdf.open_handles, 0, "engine handles are closed after loading");
    }

    #[test]
    fn wrong_passphrase_fails_and_leaves_no_document() {
        let mut viewer = controller(FakePdf::encrypted(2, "secret"), FakeEpub::default());
        let mut prompt = |_: &Path| Some("guess".to_owned());

        let err = viewer.open(&PathBuf::from("locked.pdf"), &mut prompt).expect_err("bad password");

        assert!(matches!(err, ViewerError::AuthFailed));
        assert!(viewer.document().is_none());
    }

    #[test]
    fn cancelled_or_empty_passphrase_is_cancellation() {
        let mut viewer = controller(FakePdf::encrypted(2, "secret"), FakeEpub::default());
        let path = PathBuf::from("locked.pdf");

        let err = viewer.open(&path, &mut NoPrompt).expect_err("cancelled");
        assert!(matches!(err, ViewerError::AuthCancelled));

        let mut empty = |_: &Path| Some(String::new());
        let err = viewer.open(&path, &mut empty).expect_err("empty passphrase");
        assert!(matches!(err, ViewerError::AuthCancelled));
        assert!(viewer.document().is_none());
    }

    #[test]
    fn correct_passphrase_opens_after_single_prompt() {
        let mut viewer = controller(FakePdf::encrypted(2, "secret"), FakeEpub::default());
        let mut asked = 0;
        let mut prompt = |_: &Path| {
            asked += 1;
            Some("secret".to_owned())
        };

        let document =
            viewer.open(&PathBuf::from("locked.pdf"), &mut prompt).expect("should open");
        assert_eq!(document.page_count(), 2);
        assert_eq!(asked, 1);
    }

    #[test]
    fn unsupported_extension_is_rejected_and_clears_document() {
        let mut viewer = controller(FakePdf::with_pages(1), FakeEpub::default());
        open_ok(&mut viewer, "a.pdf");

        let err = viewer.open(&PathBuf::from("notes.txt"), &mut NoPrompt).expect_err("txt");

        assert!(matches!(err, ViewerError::UnsupportedFormat(_)));
        assert!(viewer.document().is_none());
        assert_eq!(viewer.render_request(), RenderInstruction::Placeholder);
    }

    #[test]
    fn engine_failure_is_typed() {
        let mut viewer = controller(
            FakePdf { fail: true, ..FakePdf::default() },
            FakeEpub { fail: true, ..FakeEpub::default() },
        );

        let err = viewer.open(&PathBuf::from("a.pdf"), &mut NoPrompt).expect_err("pdf fails");
        assert!(matches!(err, ViewerError::Engine(EngineError::Pdf(_))));

        let err = viewer.open(&PathBuf::from("a.epub"), &mut NoPrompt).expect_err("epub fails");
        assert!(matches!(err, ViewerError::Engine(EngineError::Epub(_))));
    }

    #[test]
    fn replacing_or_failing_releases_extracted_resources() {
        let mut viewer = controller(FakePdf::with_pages(1), FakeEpub::with_chapters(&["<p/>"]));
        open_ok(&mut viewer, "one.epub");
        let first = viewer.document().and_then(Document::resource_dir).map(Path::to_path_buf);
        let first = first.expect("reflowable document has resources");
        assert!(first.exists());

        open_ok(&mut viewer, "two.epub");
        assert!(!first.exists());
        let second = viewer.document().and_then(Document::resource_dir).map(Path::to_path_buf);
        let second = second.expect("reflowable document has resources");

        viewer.epub.fail = true;
        assert!(viewer.open(&PathBuf::from("three.epub"), &mut NoPrompt).is_err());
        assert!(!second.exists());
    }

    #[test]
    fn subscribers_see_state_changes() {
        let mut viewer = controller(FakePdf::with_pages(3), FakeEpub::default());
        let events = viewer.subscribe();
        let dropped = viewer.subscribe();
        drop(dropped);

        open_ok(&mut viewer, "a.pdf");
        viewer.next_page();
        viewer.next_page();
        viewer.next_page();
        viewer.set_zoom(2.0);
        viewer.set_layout_mode(LayoutMode::Continuous);
        viewer.close();

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                ViewerEvent::DocumentOpened {
                    path: PathBuf::from("a.pdf"),
                    kind: DocumentKind::Raster,
                    page_count: 3,
                },
                ViewerEvent::PageChanged(1),
                ViewerEvent::PageChanged(2),
                ViewerEvent::ZoomChanged { percent: 200 },
                ViewerEvent::LayoutChanged(LayoutMode::Continuous),
                ViewerEvent::DocumentClosed,
            ]
        );
        assert_eq!(viewer.subscribers.len(), 1);
    }

    #[test]
    fn applying_settings_resets_reflowable_font() {
        let mut viewer = controller(FakePdf::default(), FakeEpub::with_chapters(&["<p/>"]));
        open_ok(&mut viewer, "a.epub");
        viewer.set_font_size(30);

        let settings = Settings { font_size: 48, ..Settings::default() };
        viewer.apply_settings(settings);

        assert_eq!(viewer.settings().font_size, 48);
        assert_eq!(viewer.view().font_size(), FONT_SIZE_MAX);
        assert_eq!(viewer.zoom_percent(), 100);
    }

    #[test]
    fn status_line_reports_page_position() {
        let i18n = I18n::new(Language::En).expect("strings should load");
        let mut viewer = controller(FakePdf::with_pages(10), FakeEpub::default());
        assert_eq!(viewer.status_line(&i18n), i18n.tr("no-document"));

        open_ok(&mut viewer, "dir/book.pdf");
        viewer.navigate(Navigation::Absolute(2));
        assert_eq!(viewer.status_line(&i18n), "book.pdf  |  Page 3 / 10");
    }

    #[test]
    fn default_engines_paint_converted_images() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let png = temp.path().join("black.png");
        let pdf = temp.path().join("black.pdf");
        RgbaImage::from_pixel(40, 40, image::Rgba([0, 0, 0, 255])).save(&png).expect("save png");
        fereader_convert::images_to_pdf(&[&png], &pdf, None).expect("conversion should succeed");

        let mut viewer = ViewerController::with_default_engines(Settings::default());
        viewer.open(&pdf, &mut NoPrompt).expect("document should open");

        let RenderInstruction::Page(layout) = viewer.render_request() else {
            panic!("single layout should render one page");
        };
        let page = layout.rasterize();
        assert_eq!(page.dimensions(), (40, 40));
        assert_eq!(page.get_pixel(20, 20), &image::Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn default_engines_unlock_converted_encrypted_pdf() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let text = temp.path().join("notes.txt");
        let pdf = temp.path().join("notes.pdf");
        std::fs::write(&text, "locked").expect("write text");
        fereader_convert::text_to_pdf(&text, &pdf, Some("pw")).expect("conversion should succeed");

        let mut viewer = ViewerController::with_default_engines(Settings::default());
        let err = viewer
            .open(&pdf, &mut |_: &Path| Some("nope".to_owned()))
            .expect_err("wrong passphrase should fail");
        assert!(matches!(err, ViewerError::AuthFailed));

        viewer.open(&pdf, &mut |_: &Path| Some("pw".to_owned())).expect("passphrase should unlock");
        assert_eq!(viewer.page_count(), 1);
    }
}
