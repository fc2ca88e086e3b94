use anyhow::{anyhow, Result};
use tracing::{debug, instrument, warn};

use crate::backend::{DocumentBackend, RasterPage};
use crate::geometry::{Point, Quad, Rect};
use crate::link::Link;
use crate::selection::{selection_anchor, TextSelector};
use crate::transform::CoordinateTransform;
use crate::RenderImage;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageOffset {
    pub x: i32,
    pub y: i32,
}

pub struct PageRenderer {
    page_number: usize,
    page: Box<dyn RasterPage>,
    selector: Option<TextSelector>,
    transform: CoordinateTransform,
    offset: Option<PageOffset>,
    symbol_bounds: Vec<Rect>,
    links: Vec<Link>,
    invert_color: bool,
    image: Option<RenderImage>,
    image_stale: bool,
    selection: Option<(Point, Point)>,
    selection_quads: Vec<Quad>,
    screen_rects: Vec<Quad>,
    screen_rects_transform: Option<CoordinateTransform>,
}

impl PageRenderer {
    #[instrument(skip(backend))]
    pub fn new(
        backend: &dyn DocumentBackend,
        page_number: usize,
        zoom: f32,
        dpr: f32,
    ) -> Result<Self> {
        let page = backend.load_page(page_number)?;
        let selector = match backend.load_text_page(page_number) {
            Ok(layer) => Some(TextSelector::new(layer)),
            Err(err) => {
                warn!(?err, page_number, "no text layer, page is render-only");
                None
            }
        };
        Ok(Self::from_parts(page_number, page, selector, zoom, dpr))
    }

    pub fn render_only(
        backend: &dyn DocumentBackend,
        page_number: usize,
        zoom: f32,
        dpr: f32,
    ) -> Result<Self> {
        let page = backend.load_page(page_number)?;
        Ok(Self::from_parts(page_number, page, None, zoom, dpr))
    }

    fn from_parts(
        page_number: usize,
        page: Box<dyn RasterPage>,
        selector: Option<TextSelector>,
        zoom: f32,
        dpr: f32,
    ) -> Self {
        let (symbol_bounds, links) = match &selector {
            Some(selector) => {
                let links = page.links().unwrap_or_else(|err| {
                    warn!(?err, page_number, "failed to load links");
                    Vec::new()
                });
                (selector.symbol_bounds(), links)
            }
            None => (Vec::new(), Vec::new()),
        };

        Self {
            page_number,
            page,
            selector,
            transform: CoordinateTransform::new(zoom, dpr),
            offset: None,
            symbol_bounds,
            links,
            invert_color: false,
            image: None,
            image_stale: true,
            selection: None,
            selection_quads: Vec::new(),
            screen_rects: Vec::new(),
            screen_rects_transform: None,
        }
    }

    pub fn page_number(&self) -> usize {
        self.page_number
    }

    pub fn is_render_only(&self) -> bool {
        self.selector.is_none()
    }

    pub fn transform(&self) -> CoordinateTransform {
        self.transform
    }

    pub fn zoom(&self) -> f32 {
        self.transform.zoom()
    }

    pub fn dpr(&self) -> f32 {
        self.transform.dpr()
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.set_transform(self.transform.with_zoom(zoom));
    }

    pub fn set_device_pixel_ratio(&mut self, dpr: f32) {
        self.set_transform(self.transform.with_dpr(dpr));
    }

    fn set_transform(&mut self, transform: CoordinateTransform) {
        if transform == self.transform {
            return;
        }
        self.transform = transform;
        self.image_stale = true;
        self.screen_rects_transform = None;
    }

    pub fn invert_color(&self) -> bool {
        self.invert_color
    }

    pub fn set_invert_color(&mut self, invert: bool) {
        if self.invert_color == invert {
            return;
        }
        self.invert_color = invert;
        self.image_stale = true;
    }

    pub fn width(&self) -> f32 {
        self.transform.device_size(&self.page.bounds()).0 as f32 / self.transform.dpr()
    }

    pub fn height(&self) -> f32 {
        self.transform.device_size(&self.page.bounds()).1 as f32 / self.transform.dpr()
    }

    pub fn x_offset(&self) -> i32 {
        self.offset.unwrap_or_default().x
    }

    pub fn y_offset(&self) -> i32 {
        self.offset.unwrap_or_default().y
    }

    pub fn page_offset(&self) -> Option<PageOffset> {
        self.offset
    }

    #[instrument(skip(self), fields(page = self.page_number))]
    pub fn render_page(&mut self) -> Result<&RenderImage> {
        if self.image_stale || self.image.is_none() {
            let image = self.rasterize()?;
            self.image = Some(image);
            self.image_stale = false;
        } else {
            debug!("reusing cached page image");
        }
        self.image
            .as_ref()
            .ok_or_else(|| anyhow!("page {} has no rendered image", self.page_number))
    }

    pub fn ensure_page_offset(&mut self) -> Result<PageOffset> {
        if self.offset.is_none() && !self.is_render_only() {
            self.render_page()?;
        }
        Ok(self.offset.unwrap_or_default())
    }

    fn rasterize(&mut self) -> Result<RenderImage> {
        let matrix = self.transform.matrix();
        let pixmap = self.page.run_display_list(matrix)?;

        if self.offset.is_none() && !self.is_render_only() {
            let scale = matrix.factor();
            let offset = PageOffset {
                x: (pixmap.x as f32 / scale).round() as i32,
                y: (pixmap.y as f32 / scale).round() as i32,
            };
            self.apply_offset(offset);
        }

        let mut image = pixmap.image;
        if self.invert_color {
            image.invert();
        }
        debug!(width = image.width, height = image.height, "rasterized page");
        Ok(image)
    }

    /// Moves every cached geometry from backend-native into image-relative space.
    /// Runs at most once per page handle.
    fn apply_offset(&mut self, offset: PageOffset) {
        debug_assert!(self.offset.is_none(), "page offset discovered twice");
        self.offset = Some(offset);
        if offset == PageOffset::default() {
            return;
        }
        debug!(?offset, page = self.page_number, "discovered page offset");

        let (dx, dy) = (-(offset.x as f32), -(offset.y as f32));
        for rect in &mut self.symbol_bounds {
            *rect = rect.translate(dx, dy);
        }
        for link in &mut self.links {
            link.rect = link.rect.translate(dx, dy);
        }
        if let Some(selector) = self.selector.as_mut() {
            selector.set_page_offset(offset);
        }
        if let Some((start, end)) = self.selection {
            self.refresh_selection_quads(start, end);
        }
    }

    fn to_document(&self, screen: Point) -> Point {
        self.transform.to_document(screen)
    }

    fn to_screen(&self, document: Point) -> Point {
        self.transform.to_screen(document)
    }

    fn text_selector(&self) -> Option<&TextSelector> {
        debug_assert!(
            self.selector.is_some(),
            "point query on render-only page {}",
            self.page_number
        );
        self.selector.as_ref()
    }

    pub fn point_is_above_text(&self, screen: Point) -> bool {
        if self.text_selector().is_none() {
            return false;
        }
        let point = self.to_document(screen);
        self.symbol_bounds.iter().any(|rect| rect.contains(point))
    }

    pub fn point_is_above_link(&self, screen: Point) -> bool {
        self.link_at_point(screen).is_some()
    }

    pub fn link_at_point(&self, screen: Point) -> Option<&Link> {
        self.text_selector()?;
        let point = self.to_document(screen);
        self.links.iter().find(|link| link.rect.contains(point))
    }

    pub fn link_uri_at_point(&self, screen: Point) -> Option<&str> {
        self.link_at_point(screen).map(|link| link.uri.as_str())
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn symbol_bounds(&self) -> &[Rect] {
        &self.symbol_bounds
    }

    pub fn generate_selection_rects(&mut self, start: Point, end: Point) {
        if self.text_selector().is_none() {
            return;
        }
        let anchors = (self.to_document(start), self.to_document(end));
        self.selection = Some(anchors);
        self.refresh_selection_quads(anchors.0, anchors.1);
    }

    fn refresh_selection_quads(&mut self, start: Point, end: Point) {
        if let Some(selector) = self.selector.as_ref() {
            self.selection_quads = selector.generate_selection_rects(start, end);
        }
        self.screen_rects_transform = None;
    }

    pub fn buffered_selection_rects(&mut self) -> &[Quad] {
        if self.screen_rects_transform != Some(self.transform) {
            self.screen_rects = self
                .selection_quads
                .iter()
                .map(|quad| self.transform.quad_to_screen(quad))
                .collect();
            self.screen_rects_transform = Some(self.transform);
        }
        &self.screen_rects
    }

    pub fn clear_buffered_selection_rects(&mut self) {
        self.selection = None;
        self.selection_quads.clear();
        self.screen_rects.clear();
        self.screen_rects_transform = None;
    }

    pub fn has_selection(&self) -> bool {
        self.selection.is_some()
    }

    pub fn selection_contains(&self, screen: Point) -> bool {
        let point = self.to_document(screen);
        self.selection_quads.iter().any(|quad| quad.contains(point))
    }

    pub fn selection_anchor(&self) -> Option<Point> {
        let rects: Vec<Rect> = self
            .selection_quads
            .iter()
            .map(|quad| {
                self.transform
                    .screen_to_logical(&self.transform.quad_to_screen(quad).bounds())
            })
            .collect();
        selection_anchor(&rects)
    }

    pub fn positions_for_word_selection(&self, start: Point, end: Point) -> (Point, Point) {
        let Some(selector) = self.text_selector() else {
            return (start, end);
        };
        let (a, b) =
            selector.positions_for_word_selection(self.to_document(start), self.to_document(end));
        (self.to_screen(a), self.to_screen(b))
    }

    pub fn positions_for_line_selection(&self, point: Point) -> (Point, Point) {
        let Some(selector) = self.text_selector() else {
            return (point, point);
        };
        let (a, b) = selector.positions_for_line_selection(self.to_document(point));
        (self.to_screen(a), self.to_screen(b))
    }

    pub fn text_from_selection(&self, start: Point, end: Point) -> String {
        match self.text_selector() {
            Some(selector) => {
                selector.text_from_selection(self.to_document(start), self.to_document(end))
            }
            None => String::new(),
        }
    }

    pub fn selected_text(&self, include_newlines: bool) -> String {
        let (Some(selector), Some((start, end))) = (self.selector.as_ref(), self.selection) else {
            return String::new();
        };
        let text = selector.text_from_selection(start, end);
        if include_newlines {
            text
        } else {
            text.replace(['\n', '\r'], "")
        }
    }
}
