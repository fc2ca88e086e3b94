use anyhow::Result;

use crate::geometry::{Matrix, Rect};
use crate::link::{is_external_uri, Link, LinkTarget};
use crate::text::TextLayer;
use crate::{DocumentInfo, OutlineItem, RenderImage};

/// A rasterized page together with the device-pixel origin the rasterizer used.
///
/// Some documents place their crop box away from the origin; the rasterizer then
/// reports a non-zero `x`/`y` which the page renderer turns into a page offset.
#[derive(Debug, Clone)]
pub struct Pixmap {
    pub x: i32,
    pub y: i32,
    pub image: RenderImage,
}

pub trait RasterPage: Send {
    fn bounds(&self) -> Rect;

    fn links(&self) -> Result<Vec<Link>>;

    fn run_display_list(&self, matrix: Matrix) -> Result<Pixmap>;
}

pub trait DocumentBackend: Send + Sync {
    fn info(&self) -> &DocumentInfo;

    fn page_count(&self) -> usize {
        self.info().page_count
    }

    fn load_page(&self, page: usize) -> Result<Box<dyn RasterPage>>;

    fn load_text_page(&self, page: usize) -> Result<Box<dyn TextLayer>>;

    fn resolve_link_uri(&self, uri: &str) -> Option<LinkTarget>;

    fn link_is_external(&self, uri: &str) -> bool {
        is_external_uri(uri)
    }

    fn outline(&self) -> Result<Vec<OutlineItem>>;
}
