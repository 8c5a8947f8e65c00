use anyhow::{Context, Result};
use doc_model::Settings;
use fereader_i18n::{FluentArgs, I18n};
use std::path::Path;
use storage::Storage;
use tracing::info;
use viewer_core::{Document, PageLayout, ViewerController, ViewerError};

/// One run of the viewer: settings loaded from disk, a controller and the UI
/// strings for the configured language. `shutdown` writes settings back.
pub struct Session {
    storage: Storage,
    viewer: ViewerController,
    i18n: I18n,
    continuous: Vec<PageLayout>,
}

impl Session {
    pub fn init(config_dir: Option<&Path>) -> Result<Self> {
        let storage = match config_dir {
            Some(dir) => Storage::with_root(dir),
            None => Storage::from_default_project()?,
        };
        let settings = storage
            .load_or_create()
            .with_context(|| format!("failed to load settings from {}", storage.root().display()))?;
        let i18n = I18n::new(settings.language)?;
        info!(
            config = %storage.root().display(),
            language = %settings.language,
            theme = %settings.theme,
            "session started"
        );
        let viewer = ViewerController::with_default_engines(settings);

        Ok(Self { storage, viewer, i18n, continuous: Vec::new() })
    }

    pub fn viewer(&self) -> &ViewerController {
        &self.viewer
    }

    pub fn viewer_mut(&mut self) -> &mut ViewerController {
        &mut self.viewer
    }

    pub fn settings(&self) -> &Settings {
        self.viewer.settings()
    }

    pub fn apply_settings(&mut self, settings: Settings) {
        self.i18n.set_language(settings.language);
        self.viewer.apply_settings(settings);
    }

    /// Opens a document. An encrypted PDF uses `password` when given and
    /// otherwise asks on the terminal.
    pub fn open(&mut self, file: &Path, password: Option<String>) -> Result<&Document> {
        ensure_file_exists(file)?;

        self.continuous.clear();

        let i18n = &self.i18n;
        let mut password = password;
        let mut prompt = |_: &Path| {
            password.take().or_else(|| {
                rpassword::prompt_password(format!("{} ", i18n.tr("password-prompt"))).ok()
            })
        };

        match self.viewer.open(file, &mut prompt) {
            Ok(document) => Ok(document),
            Err(err) => Err(localize_open_error(i18n, err))
                .with_context(|| format!("failed to open {}", file.display())),
        }
    }

    /// Remembers the pages of a continuous rebuild and hands them back while
    /// the viewer reports the layout as unchanged.
    pub fn continuous_layout(&mut self, rebuilt: Option<Vec<PageLayout>>) -> &[PageLayout] {
        if let Some(layouts) = rebuilt {
            self.continuous = layouts;
        }

        &self.continuous
    }

    pub fn status(&self) -> String {
        let mut args = FluentArgs::new();
        args.set("percent", self.viewer.zoom_percent());
        let zoom = self.i18n.tr_args("zoom-label", &args);

        format!("{}  |  {zoom}", self.viewer.status_line(&self.i18n))
    }

    pub fn shutdown(mut self) -> Result<()> {
        self.viewer.close();
        self.storage.save_settings(self.viewer.settings()).context("failed to save settings")?;
        info!(config = %self.storage.root().display(), "session closed, settings saved");
        Ok(())
    }
}

/// Open failures the reader can act on are reported in the UI language.
fn localize_open_error(i18n: &I18n, err: ViewerError) -> anyhow::Error {
    let key = match &err {
        ViewerError::AuthCancelled => "password-cancelled",
        ViewerError::AuthFailed => "password-incorrect",
        ViewerError::UnsupportedFormat(_) => "unsupported-file",
        ViewerError::Engine(_) => return err.into(),
    };

    anyhow::anyhow!(i18n.tr(key))
}

pub fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
