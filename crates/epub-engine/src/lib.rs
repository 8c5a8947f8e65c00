//! EPUB engine: unpacks a book into a private directory and yields its spine
//! documents as HTML with resource links resolved to the unpacked files.

pub mod links;
pub mod package;

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use zip::ZipArchive;

pub const EMPTY_BOOK_HTML: &str = "<h3>No readable content found.</h3>";

const TEMP_PREFIX: &str = "fereader_epub_";

#[derive(Debug, thiserror::Error)]
pub enum EpubError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("missing archive entry `{0}`")]
    MissingEntry(String),
    #[error("container.xml lists no rootfile")]
    MissingRootfile,
    #[error("failed to rewrite chapter links: {0}")]
    Rewrite(String),
}

/// Directory holding the unpacked assets of one book. Deleted on drop.
#[derive(Debug)]
pub struct ExtractedResources {
    dir: TempDir,
}

impl ExtractedResources {
    pub fn create() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix(TEMP_PREFIX).tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Removes the directory now, reporting failures instead of ignoring them
    /// like `Drop` does.
    pub fn release(self) -> io::Result<()> {
        self.dir.close()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// Archive path of the spine document.
    pub href: String,
    pub html: String,
}

#[derive(Debug)]
pub struct EpubBook {
    pub title: Option<String>,
    pub chapters: Vec<Chapter>,
    pub resources: ExtractedResources,
}

pub trait EpubEngine {
    fn open(&mut self, path: &Path) -> Result<EpubBook, EpubError>;
}

#[derive(Debug, Default)]
pub struct ZipEpubEngine;

impl ZipEpubEngine {
    pub fn new() -> Self {
        Self
    }

    fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<String, EpubError> {
        let mut entry = match archive.by_name(name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(EpubError::MissingEntry(name.to_owned()))
            }
            Err(err) => return Err(err.into()),
        };

        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn extract_all(archive: &mut ZipArchive<File>, root: &Path) -> Result<usize, EpubError> {
        let mut written = 0;

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            let Some(relative) = entry.enclosed_name() else {
                warn!(name = entry.name(), "skipping archive entry outside the book root");
                continue;
            };
            let target: PathBuf = root.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
            written += 1;
        }

        Ok(written)
    }
}

impl EpubEngine for ZipEpubEngine {
    fn open(&mut self, path: &Path) -> Result<EpubBook, EpubError> {
        let mut archive = ZipArchive::new(File::open(path)?)?;

        let container = Self::read_entry(&mut archive, package::container_path())?;
        let opf_path = package::parse_container(&container)?;
        let opf = Self::read_entry(&mut archive, &opf_path)?;
        let package = package::parse_opf(&opf, &opf_path)?;

        let resources = ExtractedResources::create()?;
        let written = Self::extract_all(&mut archive, resources.path())?;
        debug!(path = %path.display(), written, dir = %resources.path().display(), "unpacked book");

        let mut chapters = Vec::new();
        for href in package.spine_documents() {
            let local =
                href.split('/').fold(resources.path().to_path_buf(), |acc, part| acc.join(part));
            let bytes = match fs::read(&local) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(%href, %err, "spine document missing from archive");
                    continue;
                }
            };

            let html = String::from_utf8_lossy(&bytes);
            let html = links::rewrite_links(&html, &href, resources.path())?;
            chapters.push(Chapter { href, html });
        }

        if chapters.is_empty() {
            chapters.push(Chapter { href: String::new(), html: EMPTY_BOOK_HTML.to_owned() });
        }

        Ok(EpubBook { title: package.title, chapters, resources })
    }
}

pub fn default_engine() -> ZipEpubEngine {
    ZipEpubEngine::new()
}
