//! pdf-overlay
//!
//! Command-line driver for overlay-core: render a page preview, export the
//! annotations of one or more session files, inspect page geometry.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use overlay_core::geometry::document_geometries;
use overlay_core::{
    export_annotated_pages, parse_page_list, CancellationToken, EditSession, ExportOptions,
    PageOverlay, PageRenderer, RenderedPage, SessionFile,
};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pdf-overlay")]
#[command(version, about = "Place text on PDF pages from pixel-space annotations")]
struct Args {
    /// TOML file with export options
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory with .ttf/.otf files (overrides config and environment)
    #[arg(long, global = true)]
    fonts_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Draw the annotations of one or more session files onto a PDF
    Export {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Session JSON; repeat for several pages, applied in order
        #[arg(short, long = "session", required = true)]
        sessions: Vec<PathBuf>,

        /// Keep finished pages if the export is interrupted
        #[arg(long)]
        allow_partial: bool,
    },

    /// Rasterize a page and optionally start an empty session for it
    Render {
        #[arg(short, long)]
        input: PathBuf,

        /// 1-based page number
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,

        #[arg(short, long, default_value_t = 1.0)]
        zoom: f64,

        /// PNG destination
        #[arg(short, long)]
        output: PathBuf,

        /// Write a session file anchored to this preview
        #[arg(long)]
        session_out: Option<PathBuf>,
    },

    /// Print page geometry as JSON
    Inspect {
        #[arg(short, long)]
        input: PathBuf,

        /// 1-based pages, e.g. "1-3, 5"; all pages when omitted
        #[arg(long)]
        pages: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = load_options(args.config.as_deref(), args.fonts_dir)?;

    match args.command {
        Command::Export {
            input,
            output,
            sessions,
            allow_partial,
        } => {
            let options = ExportOptions {
                allow_partial: allow_partial || options.allow_partial,
                ..options
            };
            export(&input, &output, &sessions, &options)
        }
        Command::Render {
            input,
            page,
            zoom,
            output,
            session_out,
        } => render(&input, page - 1, zoom, &output, session_out.as_deref(), &options),
        Command::Inspect { input, pages } => inspect(&input, pages.as_deref()),
    }
}

fn load_options(config: Option<&Path>, fonts_dir: Option<PathBuf>) -> anyhow::Result<ExportOptions> {
    let options = match config {
        Some(path) => ExportOptions::from_file(path)
            .with_context(|| format!("Failed to load options from {}", path.display()))?,
        None => ExportOptions::default(),
    };
    let mut options = options.with_env_overrides();
    if fonts_dir.is_some() {
        options.fonts_dir = fonts_dir;
    }
    tracing::debug!(?options, "Export options");
    Ok(options)
}

fn export(
    input: &Path,
    output: &Path,
    sessions: &[PathBuf],
    options: &ExportOptions,
) -> anyhow::Result<()> {
    let overlays = sessions
        .iter()
        .map(|path| {
            SessionFile::load(path)
                .map(SessionFile::into_overlay)
                .with_context(|| format!("Failed to read session {}", path.display()))
        })
        .collect::<anyhow::Result<Vec<PageOverlay>>>()?;

    let report = export_annotated_pages(input, output, &overlays, options, &CancellationToken::new())
        .with_context(|| format!("Failed to export {} to {}", input.display(), output.display()))?;

    for skipped in &report.skipped {
        tracing::warn!(
            "Page {} annotation {} skipped: {}",
            skipped.page_index + 1,
            skipped.index,
            skipped.reason
        );
    }
    for fallback in &report.font_fallbacks {
        tracing::info!(
            "Page {} annotation {}: '{}' drawn with {}",
            fallback.page_index + 1,
            fallback.index,
            fallback.requested,
            fallback.substituted
        );
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(feature = "pdfium")]
fn render_preview(
    input: &Path,
    page_index: u32,
    zoom: f64,
    options: &ExportOptions,
) -> anyhow::Result<RenderedPage> {
    let rasterizer = overlay_core::PdfiumRasterizer::bind()?;
    Ok(PageRenderer::new(rasterizer, options.dpi_scale).render_page(input, page_index, zoom)?)
}

#[cfg(not(feature = "pdfium"))]
fn render_preview(
    input: &Path,
    page_index: u32,
    zoom: f64,
    options: &ExportOptions,
) -> anyhow::Result<RenderedPage> {
    tracing::info!("Built without PDFium, rendering a blank page of the right size");
    Ok(PageRenderer::blank(options.dpi_scale).render_page(input, page_index, zoom)?)
}

fn render(
    input: &Path,
    page_index: u32,
    zoom: f64,
    output: &Path,
    session_out: Option<&Path>,
    options: &ExportOptions,
) -> anyhow::Result<()> {
    let page = render_preview(input, page_index, zoom, options)
        .with_context(|| format!("Failed to render page {} of {}", page_index + 1, input.display()))?;

    page.image
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    tracing::info!(
        "Rendered {}x{} preview to {}",
        page.pixel_width,
        page.pixel_height,
        output.display()
    );

    if let Some(path) = session_out {
        EditSession::for_rendered_page(page_index, &page)
            .to_session_file()
            .save(path)
            .with_context(|| format!("Failed to write session {}", path.display()))?;
    }
    Ok(())
}

fn inspect(input: &Path, pages: Option<&str>) -> anyhow::Result<()> {
    let bytes = std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let geometries = document_geometries(&bytes)?;

    let selected: Vec<u32> = match pages {
        Some(list) => parse_page_list(list)?,
        None => (0..geometries.len() as u32).collect(),
    };
    if let Some(missing) = selected.iter().find(|i| **i as usize >= geometries.len()) {
        bail!(
            "Page {} requested but {} has {} page(s)",
            missing + 1,
            input.display(),
            geometries.len()
        );
    }

    let listing: Vec<_> = selected
        .iter()
        .map(|i| {
            let g = &geometries[*i as usize];
            json!({
                "page": i + 1,
                "rect": [g.x0, g.y0, g.x0 + g.width_points, g.y0 + g.height_points],
                "width_points": g.width_points,
                "height_points": g.height_points,
                "rotation": g.rotation,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}
