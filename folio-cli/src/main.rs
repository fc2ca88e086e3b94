use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use folio_core::{
    resolve_link, CoordinateTransform, DocumentBackend, DocumentProvider, DocumentSearcher,
    EventQueue, LinkDestination, PageOffset, PageRenderer, Point, Quad, Rect, RenderImage,
    SearchHit, SearchOptions, SearchSummary, ViewerConfig,
};
use folio_render::PdfiumRenderFactory;
use serde::Serialize;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

const HIT_COLOR: [u8; 3] = [255, 200, 0];
const CURRENT_HIT_COLOR: [u8; 3] = [255, 235, 0];

#[derive(Debug, Parser)]
#[command(
    name = "folio",
    version,
    about = "Render, search and select text in PDF documents"
)]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Zoom factor, overrides the configured value
    #[arg(short = 'z', long, global = true)]
    zoom: Option<f32>,

    /// Device pixel ratio, overrides the configured value
    #[arg(long, global = true)]
    dpr: Option<f32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render a page to a PNG file
    Render {
        file: PathBuf,
        /// Page to render (0-based)
        #[arg(short = 'p', long, default_value_t = 0)]
        page: usize,
        /// Invert page colors
        #[arg(long)]
        invert: bool,
        /// Paint every hit of this query onto the page
        #[arg(long)]
        highlight: Option<String>,
        #[arg(short = 'o', long)]
        output: PathBuf,
    },
    /// Search the whole document
    Search {
        file: PathBuf,
        query: String,
        #[arg(long)]
        whole_words: bool,
        #[arg(long)]
        case_sensitive: bool,
        /// List hits in document order instead of starting at the reference page
        #[arg(long)]
        from_start: bool,
        /// Reference page (0-based)
        #[arg(short = 'p', long, default_value_t = 0)]
        page: usize,
        #[arg(long)]
        json: bool,
    },
    /// Extract the text between two screen points on a page
    Select {
        file: PathBuf,
        #[arg(short = 'p', long)]
        page: usize,
        /// Start point in device pixels, `x,y`
        #[arg(long, value_parser = parse_point)]
        from: Point,
        /// End point in device pixels, `x,y`
        #[arg(long, value_parser = parse_point)]
        to: Point,
        #[arg(long, value_enum, default_value_t = SelectMode::Chars)]
        mode: SelectMode,
        /// Keep line breaks in the extracted text
        #[arg(long)]
        keep_newlines: bool,
    },
    /// List the links of a page and where they lead
    Links {
        file: PathBuf,
        #[arg(short = 'p', long, default_value_t = 0)]
        page: usize,
    },
    /// Print the document outline
    Outline { file: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SelectMode {
    Chars,
    Words,
    Line,
}

#[derive(Debug, Serialize)]
struct SearchReport {
    summary: Option<SearchSummary>,
    hits: Vec<SearchHit>,
}

#[derive(Debug, Serialize)]
struct SelectionReport {
    text: String,
    rects: Vec<Rect>,
    anchor: Option<Point>,
}

#[derive(Debug, Serialize)]
struct LinkReport {
    rect: Rect,
    uri: String,
    destination: LinkDestination,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ViewerConfig::project_dirs()
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let mut config = match &args.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::load_default()?,
    };
    if let Some(zoom) = args.zoom {
        config.zoom = zoom;
    }
    if let Some(dpr) = args.dpr {
        config.device_pixel_ratio = dpr;
    }
    debug!(?config, "effective configuration");

    let provider = PdfiumRenderFactory::new(config.pdfium_library_path.as_deref())?;

    match args.command {
        Command::Render {
            file,
            page,
            invert,
            highlight,
            output,
        } => {
            let backend = open_document(&provider, &file).await?;
            render(&backend, &config, page, invert, highlight.as_deref(), &output)
        }
        Command::Search {
            file,
            query,
            whole_words,
            case_sensitive,
            from_start,
            page,
            json,
        } => {
            let backend = open_document(&provider, &file).await?;
            let options = SearchOptions {
                from_start: from_start || config.search.from_start,
                whole_words: whole_words || config.search.whole_words,
                case_sensitive: case_sensitive || config.search.case_sensitive,
            };
            search(backend, &config, &query, options, page, json)
        }
        Command::Select {
            file,
            page,
            from,
            to,
            mode,
            keep_newlines,
        } => {
            let backend = open_document(&provider, &file).await?;
            let keep_newlines = keep_newlines || config.include_newlines_in_copied_text;
            select(backend.as_ref(), &config, page, from, to, mode, keep_newlines)
        }
        Command::Links { file, page } => {
            let backend = open_document(&provider, &file).await?;
            links(backend.as_ref(), &config, page)
        }
        Command::Outline { file } => {
            let backend = open_document(&provider, &file).await?;
            for item in backend.outline()? {
                println!(
                    "{}{} ({})",
                    "  ".repeat(item.depth),
                    item.title,
                    item.page_index + 1
                );
            }
            Ok(())
        }
    }
}

async fn open_document(
    provider: &dyn DocumentProvider,
    path: &Path,
) -> Result<Arc<dyn DocumentBackend>> {
    provider
        .open(path)
        .await
        .with_context(|| format!("failed to open {:?}", path))
}

fn render(
    backend: &Arc<dyn DocumentBackend>,
    config: &ViewerConfig,
    page_number: usize,
    invert: bool,
    highlight: Option<&str>,
    output: &Path,
) -> Result<()> {
    let mut page = PageRenderer::new(
        backend.as_ref(),
        page_number,
        config.zoom,
        config.device_pixel_ratio,
    )?;
    page.set_invert_color(invert || config.invert_colors);
    let mut image = page.render_page()?.clone();

    if let Some(query) = highlight {
        let offset = page.ensure_page_offset()?;
        let mut searcher = DocumentSearcher::new(Arc::clone(backend), EventQueue::new())
            .with_max_hits(config.max_hits_per_page);
        let options = SearchOptions {
            from_start: true,
            ..config.search
        };
        searcher.search(query, options, page_number);
        let current = searcher.current_hit();
        for hit in searcher.hits_on_page(page_number) {
            let (color, alpha) = if Some(*hit) == current {
                (CURRENT_HIT_COLOR, 0.35)
            } else {
                (HIT_COLOR, 0.2)
            };
            if let Some(rect) = hit_to_pixel_rect(&hit.quad, offset, page.transform(), &image) {
                fill_rect(&mut image, rect, color, alpha);
            }
        }
        info!(query, hits = searcher.hit_count(), "painted search hits");
    }

    save_png(&image, output)?;
    info!(path = %output.display(), "wrote page image");
    Ok(())
}

fn search(
    backend: Arc<dyn DocumentBackend>,
    config: &ViewerConfig,
    query: &str,
    options: SearchOptions,
    reference_page: usize,
    json: bool,
) -> Result<()> {
    let events = EventQueue::new();
    let mut searcher =
        DocumentSearcher::new(backend, events.clone()).with_max_hits(config.max_hits_per_page);
    searcher.search(query, options, reference_page);
    for event in events.drain() {
        debug!(?event, "search event");
    }

    if json {
        let report = SearchReport {
            summary: searcher.summary(),
            hits: searcher.hits().to_vec(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if searcher.hit_count() == 0 {
        println!("no matches for {query:?}");
        return Ok(());
    }
    for (idx, hit) in searcher.hits().iter().enumerate() {
        let bounds = hit.quad.bounds();
        println!(
            "{:>4}  page {:<4} x={:.1} y={:.1} w={:.1} h={:.1}",
            idx + 1,
            hit.page + 1,
            bounds.x0,
            bounds.y0,
            bounds.width(),
            bounds.height()
        );
    }
    Ok(())
}

fn select(
    backend: &dyn DocumentBackend,
    config: &ViewerConfig,
    page_number: usize,
    from: Point,
    to: Point,
    mode: SelectMode,
    keep_newlines: bool,
) -> Result<()> {
    let mut page = PageRenderer::new(backend, page_number, config.zoom, config.device_pixel_ratio)?;
    if page.is_render_only() {
        return Err(anyhow!("page {} has no text layer", page_number + 1));
    }
    page.ensure_page_offset()?;

    let (start, end) = match mode {
        SelectMode::Chars => (from, to),
        SelectMode::Words => page.positions_for_word_selection(from, to),
        SelectMode::Line => page.positions_for_line_selection(from),
    };
    page.generate_selection_rects(start, end);

    let report = SelectionReport {
        text: page.selected_text(keep_newlines),
        rects: page
            .buffered_selection_rects()
            .iter()
            .map(Quad::bounds)
            .collect(),
        anchor: page.selection_anchor(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn links(backend: &dyn DocumentBackend, config: &ViewerConfig, page_number: usize) -> Result<()> {
    let mut page = PageRenderer::new(backend, page_number, config.zoom, config.device_pixel_ratio)?;
    if page.is_render_only() {
        return Err(anyhow!("page {} has no text layer", page_number + 1));
    }
    page.ensure_page_offset()?;

    let reports: Vec<LinkReport> = page
        .links()
        .iter()
        .map(|link| LinkReport {
            rect: link.rect,
            uri: link.uri.clone(),
            destination: resolve_link(backend, &link.uri),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "folio.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    // stdout carries command output
    let console_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

fn parse_point(raw: &str) -> Result<Point, String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, got {raw:?}"))?;
    let x: f32 = x.trim().parse().map_err(|err| format!("invalid x: {err}"))?;
    let y: f32 = y.trim().parse().map_err(|err| format!("invalid y: {err}"))?;
    Ok(Point::new(x, y))
}

fn save_png(image: &RenderImage, output: &Path) -> Result<()> {
    let buffer = image::RgbaImage::from_raw(image.width, image.height, image.pixels.clone())
        .ok_or_else(|| anyhow!("rendered image has an inconsistent pixel buffer"))?;
    buffer
        .save_with_format(output, image::ImageFormat::Png)
        .with_context(|| format!("failed to write {:?}", output))
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PixelRect {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

/// Maps a backend-native hit quad onto the pixels of the rendered page.
fn hit_to_pixel_rect(
    quad: &Quad,
    offset: PageOffset,
    transform: CoordinateTransform,
    image: &RenderImage,
) -> Option<PixelRect> {
    let local = quad.translate(-(offset.x as f32), -(offset.y as f32));
    let rect = transform.quad_to_screen(&local).bounds();

    let max_x = image.width as f32;
    let max_y = image.height as f32;
    let x0 = rect.x0.floor().clamp(0.0, max_x) as u32;
    let y0 = rect.y0.floor().clamp(0.0, max_y) as u32;
    let x1 = rect.x1.ceil().clamp(0.0, max_x) as u32;
    let y1 = rect.y1.ceil().clamp(0.0, max_y) as u32;

    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(PixelRect { x0, y0, x1, y1 })
}

fn fill_rect(image: &mut RenderImage, rect: PixelRect, color: [u8; 3], alpha: f32) {
    let width = image.width as usize;
    let x1 = rect.x1.min(image.width);
    let y1 = rect.y1.min(image.height);
    let x0 = rect.x0.min(x1);
    let y0 = rect.y0.min(y1);

    for y in y0..y1 {
        let row_start = (y as usize) * width * 4;
        for x in x0..x1 {
            let idx = row_start + (x as usize) * 4;
            blend_pixel(&mut image.pixels[idx..idx + 4], color, alpha);
        }
    }
}

fn blend_pixel(pixel: &mut [u8], color: [u8; 3], alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    let inv = 1.0 - alpha;
    for (channel, target) in pixel.iter_mut().zip(color) {
        *channel = ((*channel as f32 * inv) + (target as f32 * alpha))
            .round()
            .clamp(0.0, 255.0) as u8;
    }
}
