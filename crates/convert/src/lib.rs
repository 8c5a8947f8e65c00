//! Conversion of plain text and images into PDF or EPUB files.

mod epub;
mod pdf;
mod text;

pub use epub::text_to_epub;
pub use pdf::{images_to_pdf, text_to_pdf};

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("no input files given")]
    NoInput,
    #[error("no output file given")]
    NoOutput,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("failed to read image {path}: {source}")]
    Image { path: PathBuf, source: image::ImageError },
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

fn check_output(output: &Path) -> Result<(), ConvertError> {
    if output.as_os_str().is_empty() {
        return Err(ConvertError::NoOutput);
    }

    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    Ok(())
}
