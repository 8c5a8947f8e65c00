use epub_engine::EpubError;
use pdf_engine::PdfEngineError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Pdf(#[from] PdfEngineError),
    #[error(transparent)]
    Epub(#[from] EpubError),
}

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),
    #[error("password entry was cancelled")]
    AuthCancelled,
    #[error("incorrect password")]
    AuthFailed,
    #[error("failed to load document: {0}")]
    Engine(#[from] EngineError),
}

impl From<PdfEngineError> for ViewerError {
    fn from(value: PdfEngineError) -> Self {
        match value {
            PdfEngineError::IncorrectPassword => Self::AuthFailed,
            other => Self::Engine(EngineError::Pdf(other)),
        }
    }
}

impl From<EpubError> for ViewerError {
    fn from(value: EpubError) -> Self {
        Self::Engine(EngineError::Epub(value))
    }
}
