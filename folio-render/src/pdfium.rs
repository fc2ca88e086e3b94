use std::convert::TryFrom;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use folio_core::{
    document_id_for_path, format_internal_uri, parse_internal_uri, BackendError, DocumentBackend,
    DocumentInfo, DocumentMetadata, DocumentProvider, Link, LinkTarget, Matrix, OutlineItem,
    Pixmap, RasterPage, Rect, StructuredText, TextChar, TextLayer,
};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::{flip_to_top_left, render_image_from_rgba};

pub struct PdfiumRenderFactory {
    pdfium: Arc<Pdfium>,
}

impl PdfiumRenderFactory {
    pub fn new(library_path: Option<&Path>) -> Result<Self> {
        let pdfium = match library_path.and_then(bind_pdfium_at) {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumRenderFactory {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let shared = SharedDocument::open(Arc::clone(&self.pdfium), absolute.clone())?;
        let info = shared.with_document(|document| Ok(build_document_info(document, &absolute)))?;
        info!(path = %absolute.display(), pages = info.page_count, "opened document");
        Ok(Arc::new(PdfiumDocument {
            info,
            shared: Arc::new(shared),
            outline_cache: Mutex::new(None),
        }))
    }
}

struct SharedDocument {
    document: Mutex<PdfDocument<'static>>,
    path: PathBuf,
    _bindings: Arc<Pdfium>,
}

impl SharedDocument {
    fn open(pdfium: Arc<Pdfium>, path: PathBuf) -> Result<Self> {
        let document = pdfium
            .load_pdf_from_file(&path, None)
            .with_context(|| format!("failed to open {:?}", path))?;
        // SAFETY: the document borrows the bindings owned by `pdfium`, which is stored in
        // `_bindings`. Fields drop in declaration order, so `document` is dropped before
        // that `Arc<Pdfium>` is released and the borrow never outlives the bindings.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(Self {
            document: Mutex::new(document),
            path,
            _bindings: pdfium,
        })
    }

    fn with_document<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PdfDocument<'static>) -> Result<R>,
    {
        let guard = self.document.lock();
        f(&guard)
    }

    fn with_page<R, F>(&self, index: usize, f: F) -> Result<R>
    where
        F: FnOnce(&PdfPage<'_>) -> Result<R>,
    {
        self.with_document(|document| {
            let page_index: PdfPageIndex = index
                .try_into()
                .map_err(|_| anyhow!("page {} is out of supported range", index))?;
            let page = document
                .pages()
                .get(page_index)
                .with_context(|| format!("page {} out of range", index))?;
            f(&page)
        })
    }
}

struct PdfiumDocument {
    info: DocumentInfo,
    shared: Arc<SharedDocument>,
    outline_cache: Mutex<Option<Vec<OutlineItem>>>,
}

impl PdfiumDocument {
    fn check_page(&self, page: usize) -> Result<()> {
        if page >= self.info.page_count {
            return Err(BackendError::PageOutOfRange {
                page,
                page_count: self.info.page_count,
            }
            .into());
        }
        Ok(())
    }
}

impl DocumentBackend for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    #[instrument(skip(self))]
    fn load_page(&self, page: usize) -> Result<Box<dyn RasterPage>> {
        self.check_page(page)?;
        let bounds = self
            .shared
            .with_page(page, |pdf_page| {
                Ok(Rect::new(0.0, 0.0, pdf_page.width().value, pdf_page.height().value))
            })?;
        Ok(Box::new(PdfiumPage {
            shared: Arc::clone(&self.shared),
            index: page,
            bounds,
        }))
    }

    #[instrument(skip(self))]
    fn load_text_page(&self, page: usize) -> Result<Box<dyn TextLayer>> {
        self.check_page(page)?;
        let text = self.shared.with_page(page, |pdf_page| {
            let page_height = pdf_page.height().value;
            let text = pdf_page
                .text()
                .map_err(|err| {
                    debug!(?err, page, "pdfium text extraction failed");
                    BackendError::NoTextLayer { page }
                })?;
            let glyphs: Vec<TextChar> = text
                .chars()
                .iter()
                .filter_map(|ch| {
                    let c = ch.unicode_char()?;
                    let bounds = match ch.tight_bounds() {
                        Ok(b) => flip_to_top_left(
                            b.left().value,
                            b.top().value,
                            b.right().value,
                            b.bottom().value,
                            page_height,
                        ),
                        Err(err) => {
                            // Boxless glyphs are placed after the previous glyph on the line,
                            // or dropped when they open it.
                            debug!(?err, page, glyph = %c.escape_debug(), "glyph has no bounds");
                            Rect::default()
                        }
                    };
                    Some(TextChar::new(c, bounds))
                })
                .collect();
            Ok(StructuredText::from_glyphs(glyphs))
        })?;
        debug!(page, lines = text.lines().len(), "loaded text layer");
        Ok(Box::new(text))
    }

    fn resolve_link_uri(&self, uri: &str) -> Option<LinkTarget> {
        parse_internal_uri(uri)
    }

    fn outline(&self) -> Result<Vec<OutlineItem>> {
        {
            let cache = self.outline_cache.lock();
            if let Some(cached) = cache.as_ref() {
                return Ok(cached.clone());
            }
        }

        let outline = self.shared.with_document(|document| {
            let mut outline = Vec::new();
            if let Some(root) = document.bookmarks().root() {
                collect_outline(root, 0, &mut outline);
            }
            Ok(outline)
        })?;

        *self.outline_cache.lock() = Some(outline.clone());
        Ok(outline)
    }
}

struct PdfiumPage {
    shared: Arc<SharedDocument>,
    index: usize,
    bounds: Rect,
}

impl RasterPage for PdfiumPage {
    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn links(&self) -> Result<Vec<Link>> {
        let page_height = self.bounds.height();
        self.shared.with_page(self.index, |page| {
            let mut links = Vec::new();
            for link in page.links().iter() {
                let rect = match link.rect() {
                    Ok(rect) => rect,
                    Err(err) => {
                        warn!(
                            ?err,
                            page = self.index,
                            path = %self.shared.path.display(),
                            "failed to resolve link rectangle"
                        );
                        continue;
                    }
                };
                let Some(uri) = link_uri(&link) else {
                    continue;
                };
                let rect = flip_to_top_left(
                    rect.left().value,
                    rect.top().value,
                    rect.right().value,
                    rect.bottom().value,
                    page_height,
                );
                if !rect.is_empty() {
                    links.push(Link::new(rect, uri));
                }
            }
            Ok(links)
        })
    }

    /// Pdfium renders the crop box at the bitmap origin, so the reported offset is zero.
    #[instrument(skip(self), fields(page = self.index))]
    fn run_display_list(&self, matrix: Matrix) -> Result<Pixmap> {
        self.shared.with_page(self.index, |page| {
            let config = PdfRenderConfig::new().scale_page_by_factor(matrix.factor());
            let bitmap = page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {}", self.index))?;
            Ok(Pixmap {
                x: 0,
                y: 0,
                image: render_image_from_rgba(bitmap.as_image().to_rgba8()),
            })
        })
    }
}

fn link_uri(link: &PdfLink<'_>) -> Option<String> {
    if let Some(action) = link.action() {
        match action.action_type() {
            PdfActionType::GoToDestinationInSameDocument => {
                if let Some(local) = action.as_local_destination_action() {
                    if let Ok(destination) = local.destination() {
                        if let Ok(page_index) = destination.page_index() {
                            return Some(internal_uri(page_index as usize));
                        }
                    }
                }
            }
            PdfActionType::Uri => {
                if let Some(uri_action) = action.as_uri_action() {
                    if let Ok(uri) = uri_action.uri() {
                        if !uri.is_empty() {
                            return Some(uri);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    let destination = link.destination()?;
    destination
        .page_index()
        .ok()
        .map(|page_index| internal_uri(page_index as usize))
}

fn internal_uri(page: usize) -> String {
    format_internal_uri(LinkTarget {
        page,
        y_offset: 0.0,
    })
}

fn collect_outline(mut bookmark: PdfBookmark<'_>, depth: usize, out: &mut Vec<OutlineItem>) {
    loop {
        let target = bookmark
            .destination()
            .and_then(|destination| destination.page_index().ok());
        if let (Some(title), Some(page_index)) = (bookmark.title(), target) {
            out.push(OutlineItem {
                title,
                page_index: page_index as usize,
                depth,
            });
        }

        if let Some(child) = bookmark.first_child() {
            collect_outline(child, depth + 1, out);
        }

        match bookmark.next_sibling() {
            Some(next) => bookmark = next,
            None => break,
        }
    }
}

fn build_document_info(document: &PdfDocument<'_>, path: &Path) -> DocumentInfo {
    let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
    let metadata = document.metadata();
    let tag = |kind| metadata.get(kind).map(|t| t.value().to_owned());

    DocumentInfo {
        id: document_id_for_path(path),
        path: path.to_path_buf(),
        page_count,
        metadata: DocumentMetadata {
            title: tag(PdfDocumentMetadataTagType::Title),
            author: tag(PdfDocumentMetadataTagType::Author),
        },
    }
}

fn bind_pdfium_at(path: &Path) -> Option<Pdfium> {
    match Pdfium::bind_to_library(path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!(
                "failed to load Pdfium from configured path {}: {}",
                path.display(),
                err
            );
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set pdfium_library_path or install it ({})",
                errors.join(", ")
            ))
        }
    }
}
