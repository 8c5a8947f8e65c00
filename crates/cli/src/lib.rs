mod output;
mod session;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use doc_model::{DocumentKind, Language, LayoutMode, Rgb, Settings, Theme};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use viewer_core::{Navigation, RenderInstruction, ViewerEvent};

pub use session::Session;

#[derive(Debug, Parser)]
#[command(name = "fereader")]
#[command(about = "FeReader PDF and EPUB viewer")]
pub struct Cli {
    /// Directory holding settings.json.
    #[arg(long, global = true, env = "FEREADER_CONFIG_DIR", value_name = "DIR")]
    config_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable document metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        password: Option<String>,
    },
    /// Render PDF pages to a PNG file.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, conflicts_with = "percent")]
        zoom: Option<f32>,
        #[arg(long)]
        percent: Option<u32>,
        #[arg(long, value_enum, default_value_t = Mode::Single)]
        mode: Mode,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print one EPUB chapter as styled HTML.
    Chapter {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, allow_negative_numbers = true)]
        font_size: Option<i32>,
    },
    /// Read a document with line commands on stdin.
    Read {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        password: Option<String>,
    },
    /// Convert text or images into PDF or EPUB.
    Convert {
        #[arg(value_enum)]
        kind: ConvertKind,
        #[arg(long)]
        output: PathBuf,
        /// Encrypt PDF output with AES-128 using this password.
        #[arg(long)]
        password: Option<String>,
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Show or change persisted settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// One page.
    Single,
    /// Every page stacked vertically.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ConvertKind {
    TextPdf,
    TextEpub,
    ImagesPdf,
}

#[derive(Debug, Subcommand)]
enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        theme: Option<Theme>,
        #[arg(long)]
        font_family: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        font_size: Option<i64>,
        #[arg(long)]
        language: Option<Language>,
    },
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    kind: &'static str,
    title: String,
    page_count: usize,
    first_page_size_pt: Option<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    let config_dir = cli.config_dir.as_deref();

    match cli.command {
        Commands::Info { file, password } => run_info(config_dir, &file, password),
        Commands::Render { file, page, zoom, percent, mode, password, output } => {
            let options = RenderOptions { page, zoom, percent, mode, output };
            run_render(config_dir, &file, password, options)
        }
        Commands::Chapter { file, page, font_size } => {
            run_chapter(config_dir, &file, page, font_size)
        }
        Commands::Read { file, password } => {
            let stdin = io::stdin();
            let stdout = io::stdout();
            run_read(config_dir, &file, password, stdin.lock(), stdout.lock())
        }
        Commands::Convert { kind, output, password, inputs } => {
            run_convert(kind, &inputs, &output, password.as_deref())
        }
        Commands::Settings { action } => run_settings(config_dir, action),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn page_index(page: usize) -> Result<usize> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    Ok(page - 1)
}

fn run_info(config_dir: Option<&Path>, file: &Path, password: Option<String>) -> Result<()> {
    let mut session = Session::init(config_dir)?;
    let document = session.open(file, password)?;

    let first_page_size_pt = document
        .page_dimensions(0)
        .map(|(width, height)| PageSizeOutput { width: width as f32, height: height as f32 });
    let payload = InfoOutput {
        path: file.display().to_string(),
        kind: document.kind().as_str(),
        title: document.title().to_owned(),
        page_count: document.page_count(),
        first_page_size_pt,
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    session.shutdown()
}

struct RenderOptions {
    page: usize,
    zoom: Option<f32>,
    percent: Option<u32>,
    mode: Mode,
    output: Option<PathBuf>,
}

fn run_render(
    config_dir: Option<&Path>,
    file: &Path,
    password: Option<String>,
    options: RenderOptions,
) -> Result<()> {
    let index = page_index(options.page)?;
    let mut session = Session::init(config_dir)?;
    let kind = session.open(file, password)?.kind();
    if kind != DocumentKind::Raster {
        anyhow::bail!("render only supports PDF documents; use `chapter` for EPUB");
    }

    let viewer = session.viewer_mut();
    viewer.navigate(Navigation::Absolute(index));
    if let Some(percent) = options.percent {
        viewer.set_zoom_percent(percent);
    } else if let Some(zoom) = options.zoom {
        viewer.set_zoom(zoom);
    }
    if options.mode == Mode::All {
        viewer.set_layout_mode(LayoutMode::Continuous);
    }

    let default_name = match options.mode {
        Mode::Single => format!("page-{}", viewer.current_page() + 1),
        Mode::All => "all".to_owned(),
    };
    let output = options.output.unwrap_or_else(|| default_render_output(file, &default_name));

    let background = session.settings().theme.palette().background;
    write_render(&mut session, background, &output)?;
    println!("{}", output.display());

    session.shutdown()
}

fn write_render(session: &mut Session, background: Rgb, path: &Path) -> Result<()> {
    let instruction = session.viewer_mut().render_request();
    let image = match instruction {
        RenderInstruction::Page(layout) => layout.rasterize(),
        RenderInstruction::RebuildAll(layouts) => {
            output::stack_pages(session.continuous_layout(Some(layouts)), background)
        }
        RenderInstruction::Unchanged => {
            let layouts = session.continuous_layout(None);
            if layouts.is_empty() {
                anyhow::bail!("nothing to render");
            }
            output::stack_pages(layouts, background)
        }
        RenderInstruction::Html { .. } => {
            anyhow::bail!("reflowable documents cannot be rendered to an image")
        }
        RenderInstruction::Placeholder => anyhow::bail!("nothing to render"),
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    image
        .save(path)
        .with_context(|| format!("failed to write image to {}", path.display()))
}

fn run_chapter(
    config_dir: Option<&Path>,
    file: &Path,
    page: usize,
    font_size: Option<i32>,
) -> Result<()> {
    let index = page_index(page)?;
    let mut session = Session::init(config_dir)?;
    let kind = session.open(file, None)?.kind();
    if kind != DocumentKind::Reflowable {
        anyhow::bail!("chapter only supports EPUB documents; use `render` for PDF");
    }

    let viewer = session.viewer_mut();
    viewer.navigate(Navigation::Absolute(index));
    if let Some(size) = font_size {
        viewer.set_font_size(size);
    }

    let palette = session.settings().theme.palette();
    if let RenderInstruction::Html { html, font_family, font_size } =
        session.viewer_mut().render_request()
    {
        println!("{}", output::styled_html(&html, &font_family, font_size, &palette));
    }

    session.shutdown()
}

fn run_read<R: BufRead, W: Write>(
    config_dir: Option<&Path>,
    file: &Path,
    password: Option<String>,
    input: R,
    mut out: W,
) -> Result<()> {
    let mut session = Session::init(config_dir)?;
    session.open(file, password)?;
    let events = session.viewer_mut().subscribe();
    writeln!(out, "{}", session.status())?;

    for line in input.lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let argument = words.next();

        let viewer = session.viewer_mut();
        match (command, argument) {
            ("q", _) | ("quit", _) => break,
            ("n", _) => {
                viewer.next_page();
            }
            ("p", _) => {
                viewer.previous_page();
            }
            ("g", Some(page)) => match page.parse::<usize>() {
                Ok(page) => {
                    viewer.navigate(Navigation::Absolute(page.saturating_sub(1)));
                }
                Err(_) => writeln!(out, "invalid page: {page}")?,
            },
            ("+", _) => viewer.zoom_in(),
            ("-", _) => viewer.zoom_out(),
            ("z", Some(percent)) => match percent.trim_end_matches('%').parse::<u32>() {
                Ok(percent) => viewer.set_zoom_percent(percent),
                Err(_) => writeln!(out, "invalid zoom: {percent}")?,
            },
            ("single", _) => viewer.set_layout_mode(LayoutMode::Single),
            ("all", _) => viewer.set_layout_mode(LayoutMode::Continuous),
            ("render", Some(path)) => {
                let path = PathBuf::from(path);
                match render_current(&mut session, &path) {
                    Ok(()) => writeln!(out, "{}", path.display())?,
                    Err(err) => writeln!(out, "{err:#}")?,
                }
            }
            ("status", _) => writeln!(out, "{}", session.status())?,
            _ => {
                writeln!(out, "commands: n, p, g N, +, -, z P, single, all, render PATH, status, q")?
            }
        }

        // Drain everything so one command prints at most one status line.
        let changed = events.try_iter().filter(changes_status).count() > 0;
        if changed {
            writeln!(out, "{}", session.status())?;
        }
    }

    session.shutdown()
}

fn changes_status(event: &ViewerEvent) -> bool {
    matches!(
        event,
        ViewerEvent::PageChanged(_) | ViewerEvent::ZoomChanged { .. } | ViewerEvent::LayoutChanged(_)
    )
}

/// Writes what the viewer would draw now: a PNG for PDF pages, HTML for
/// EPUB chapters.
fn render_current(session: &mut Session, path: &Path) -> Result<()> {
    let palette = session.settings().theme.palette();

    if session.viewer().document().map(|document| document.kind())
        == Some(DocumentKind::Reflowable)
    {
        if let RenderInstruction::Html { html, font_family, font_size } =
            session.viewer_mut().render_request()
        {
            let styled = output::styled_html(&html, &font_family, font_size, &palette);
            fs::write(path, styled)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        return Ok(());
    }

    write_render(session, palette.background, path)
}

fn run_convert(
    kind: ConvertKind,
    inputs: &[PathBuf],
    output: &Path,
    password: Option<&str>,
) -> Result<()> {
    for input in inputs {
        session::ensure_file_exists(input)?;
    }

    match kind {
        ConvertKind::TextPdf => fereader_convert::text_to_pdf(&inputs[0], output, password),
        ConvertKind::TextEpub => {
            if password.is_some() {
                anyhow::bail!("--password only applies to PDF output");
            }
            fereader_convert::text_to_epub(&inputs[0], output)
        }
        ConvertKind::ImagesPdf => fereader_convert::images_to_pdf(inputs, output, password),
    }
    .context("conversion failed")?;

    println!("{}", output.display());
    Ok(())
}

fn run_settings(config_dir: Option<&Path>, action: SettingsAction) -> Result<()> {
    let mut session = Session::init(config_dir)?;

    if let SettingsAction::Set { theme, font_family, font_size, language } = action {
        let current = session.settings().clone();
        let updated = Settings {
            theme: theme.unwrap_or(current.theme),
            font_family: font_family.unwrap_or(current.font_family),
            font_size: font_size.map(Settings::clamp_font_size).unwrap_or(current.font_size),
            language: language.unwrap_or(current.language),
        };
        session.apply_settings(updated);
    }

    let json = serde_json::to_string_pretty(session.settings())?;
    println!("{json}");

    session.shutdown()
}

fn default_render_output(file: &Path, suffix: &str) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("render");

    file.with_file_name(format!("{stem}-{suffix}.png"))
}
