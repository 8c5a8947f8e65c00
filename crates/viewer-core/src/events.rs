use doc_model::{DocumentKind, LayoutMode};
use std::path::{Path, PathBuf};

/// Notifications sent to subscribers after the controller state changes.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    DocumentOpened { path: PathBuf, kind: DocumentKind, page_count: usize },
    DocumentClosed,
    PageChanged(usize),
    ZoomChanged { percent: u32 },
    LayoutChanged(LayoutMode),
    SettingsChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Relative(i64),
    Absolute(usize),
}

/// Scrolling past the top or bottom of a single raster page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollEdge {
    RequestPrev,
    RequestNext,
}

/// Asks the user for the passphrase of an encrypted document.
pub trait PassphrasePrompt {
    /// `None` means the user cancelled.
    fn request_passphrase(&mut self, path: &Path) -> Option<String>;
}

impl<F> PassphrasePrompt for F
where
    F: FnMut(&Path) -> Option<String>,
{
    fn request_passphrase(&mut self, path: &Path) -> Option<String> {
        self(path)
    }
}

/// Prompt for non-interactive callers; always cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

impl PassphrasePrompt for NoPrompt {
    fn request_passphrase(&mut self, _path: &Path) -> Option<String> {
        None
    }
}
