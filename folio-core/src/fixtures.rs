//! In-memory backend used by the unit tests: strings laid out as monospaced glyph boxes,
//! rasterized into deterministic pixmaps.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use crate::backend::{DocumentBackend, Pixmap, RasterPage};
use crate::error::BackendError;
use crate::geometry::{Matrix, Rect};
use crate::link::{parse_internal_uri, Link, LinkTarget};
use crate::text::{StructuredText, TextChar, TextLayer, TextLine};
use crate::{DocumentInfo, DocumentMetadata, OutlineItem, RenderImage};

pub const MARGIN: f32 = 12.0;
pub const CHAR_WIDTH: f32 = 6.0;
pub const GLYPH_HEIGHT: f32 = 10.0;
pub const LINE_HEIGHT: f32 = 14.0;
pub const PAGE_WIDTH: f32 = 240.0;
pub const PAGE_HEIGHT: f32 = 160.0;

pub fn layout_text(lines: &[&str]) -> StructuredText {
    layout_text_at(lines, 0.0, 0.0)
}

/// Lays out `lines` with the first glyph at `MARGIN + origin`.
pub fn layout_text_at(lines: &[&str], origin_x: f32, origin_y: f32) -> StructuredText {
    let lines = lines
        .iter()
        .enumerate()
        .map(|(row, line)| {
            let chars = line
                .chars()
                .enumerate()
                .map(|(column, c)| {
                    TextChar::new(
                        c,
                        Rect::from_xywh(
                            origin_x + MARGIN + column as f32 * CHAR_WIDTH,
                            origin_y + MARGIN + row as f32 * LINE_HEIGHT,
                            CHAR_WIDTH,
                            GLYPH_HEIGHT,
                        ),
                    )
                })
                .collect();
            TextLine::new(chars)
        })
        .collect();
    StructuredText::from_lines(lines)
}

/// Glyph centre of `line`/`column` in image-relative document space.
pub fn glyph_center(line: usize, column: usize) -> crate::Point {
    crate::Point::new(
        MARGIN + column as f32 * CHAR_WIDTH + CHAR_WIDTH / 2.0,
        MARGIN + line as f32 * LINE_HEIGHT + GLYPH_HEIGHT / 2.0,
    )
}

#[derive(Debug, Clone, Default)]
struct FakePageSpec {
    lines: Vec<String>,
    links: Vec<Link>,
    origin: (f32, f32),
    render_only: bool,
}

impl FakePageSpec {
    fn text(&self) -> StructuredText {
        let lines: Vec<&str> = self.lines.iter().map(String::as_str).collect();
        layout_text_at(&lines, self.origin.0, self.origin.1)
    }
}

pub struct FakeDocument {
    pub info: DocumentInfo,
    pages: Vec<FakePageSpec>,
    pub render_calls: Arc<AtomicUsize>,
    pub text_loads: Arc<AtomicUsize>,
}

impl FakeDocument {
    pub fn new(pages: Vec<Vec<&str>>) -> Self {
        let pages: Vec<FakePageSpec> = pages
            .into_iter()
            .map(|lines| FakePageSpec {
                lines: lines.into_iter().map(str::to_owned).collect(),
                ..FakePageSpec::default()
            })
            .collect();
        Self {
            info: DocumentInfo {
                id: Uuid::nil(),
                path: PathBuf::from("/tmp/fake.pdf"),
                page_count: pages.len(),
                metadata: DocumentMetadata::default(),
            },
            pages,
            render_calls: Arc::new(AtomicUsize::new(0)),
            text_loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Links are given in image-relative document space.
    pub fn with_links(mut self, page: usize, links: Vec<Link>) -> Self {
        self.pages[page].links = links;
        self
    }

    /// Moves the crop box of `page` to `(x, y)` in backend-native space.
    pub fn with_origin(mut self, page: usize, x: f32, y: f32) -> Self {
        self.pages[page].origin = (x, y);
        self
    }

    pub fn render_only(mut self, page: usize) -> Self {
        self.pages[page].render_only = true;
        self
    }

    pub fn renders(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }

    pub fn text_page_loads(&self) -> usize {
        self.text_loads.load(Ordering::SeqCst)
    }

    fn spec(&self, page: usize) -> Result<&FakePageSpec> {
        self.pages.get(page).ok_or_else(|| {
            BackendError::PageOutOfRange {
                page,
                page_count: self.pages.len(),
            }
            .into()
        })
    }
}

impl DocumentBackend for FakeDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn load_page(&self, page: usize) -> Result<Box<dyn RasterPage>> {
        let spec = self.spec(page)?;
        let (ox, oy) = spec.origin;
        Ok(Box::new(FakePage {
            bounds: Rect::new(ox, oy, ox + PAGE_WIDTH, oy + PAGE_HEIGHT),
            glyphs: spec.text().symbol_bounds(),
            links: spec
                .links
                .iter()
                .map(|link| Link::new(link.rect.translate(ox, oy), link.uri.clone()))
                .collect(),
            render_calls: Arc::clone(&self.render_calls),
        }))
    }

    fn load_text_page(&self, page: usize) -> Result<Box<dyn TextLayer>> {
        let spec = self.spec(page)?;
        self.text_loads.fetch_add(1, Ordering::SeqCst);
        if spec.render_only {
            return Err(BackendError::NoTextLayer { page }.into());
        }
        Ok(Box::new(spec.text()))
    }

    fn resolve_link_uri(&self, uri: &str) -> Option<LinkTarget> {
        parse_internal_uri(uri)
    }

    fn outline(&self) -> Result<Vec<OutlineItem>> {
        Ok((0..self.pages.len())
            .map(|page_index| OutlineItem {
                title: format!("Page {}", page_index + 1),
                page_index,
                depth: 0,
            })
            .collect())
    }
}

struct FakePage {
    bounds: Rect,
    glyphs: Vec<Rect>,
    links: Vec<Link>,
    render_calls: Arc<AtomicUsize>,
}

impl RasterPage for FakePage {
    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn links(&self) -> Result<Vec<Link>> {
        Ok(self.links.clone())
    }

    /// White page with black glyph boxes; origin mirrors the crop box position.
    fn run_display_list(&self, matrix: Matrix) -> Result<Pixmap> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        let scaled = self.bounds.transform(matrix);
        let width = scaled.width().round() as u32;
        let height = scaled.height().round() as u32;
        let mut image = RenderImage::blank(width, height);

        for glyph in &self.glyphs {
            let device = glyph
                .translate(-self.bounds.x0, -self.bounds.y0)
                .transform(matrix);
            let x0 = device.x0.max(0.0) as u32;
            let y0 = device.y0.max(0.0) as u32;
            let x1 = (device.x1.max(0.0) as u32).min(width);
            let y1 = (device.y1.max(0.0) as u32).min(height);
            for y in y0..y1 {
                for x in x0..x1 {
                    let idx = (y as usize * width as usize + x as usize) * 4;
                    image.pixels[idx..idx + 3].copy_from_slice(&[0, 0, 0]);
                }
            }
        }

        Ok(Pixmap {
            x: scaled.x0.round() as i32,
            y: scaled.y0.round() as i32,
            image,
        })
    }
}
