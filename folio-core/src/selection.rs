use crate::geometry::{Point, Quad, Rect};
use crate::page::PageOffset;
use crate::text::{SnapMode, TextLayer};

const SAME_LINE_TOLERANCE: f32 = 0.75;

pub struct TextSelector {
    layer: Box<dyn TextLayer>,
    offset: PageOffset,
}

impl TextSelector {
    pub fn new(layer: Box<dyn TextLayer>) -> Self {
        Self {
            layer,
            offset: PageOffset::default(),
        }
    }

    pub fn layer(&self) -> &dyn TextLayer {
        self.layer.as_ref()
    }

    pub fn set_page_offset(&mut self, offset: PageOffset) {
        self.offset = offset;
    }

    pub fn page_offset(&self) -> PageOffset {
        self.offset
    }

    fn to_native(&self, point: Point) -> Point {
        point.translate(self.offset.x as f32, self.offset.y as f32)
    }

    fn to_image(&self, point: Point) -> Point {
        point.translate(-(self.offset.x as f32), -(self.offset.y as f32))
    }

    pub fn symbol_bounds(&self) -> Vec<Rect> {
        self.layer
            .symbol_bounds()
            .into_iter()
            .map(|rect| rect.translate(-(self.offset.x as f32), -(self.offset.y as f32)))
            .collect()
    }

    pub fn generate_selection_rects(&self, start: Point, end: Point) -> Vec<Quad> {
        self.layer
            .highlight_selection(self.to_native(start), self.to_native(end))
            .into_iter()
            .map(|quad| quad.map(|p| self.to_image(p)))
            .collect()
    }

    pub fn positions_for_word_selection(&self, start: Point, end: Point) -> (Point, Point) {
        self.snap(start, end, SnapMode::Words)
    }

    pub fn positions_for_line_selection(&self, point: Point) -> (Point, Point) {
        self.snap(point, point, SnapMode::Lines)
    }

    pub fn text_from_selection(&self, start: Point, end: Point) -> String {
        self.layer
            .copy_selection(self.to_native(start), self.to_native(end), false)
    }

    fn snap(&self, start: Point, end: Point, mode: SnapMode) -> (Point, Point) {
        let snap = self
            .layer
            .snap_selection(self.to_native(start), self.to_native(end), mode);
        (self.to_image(snap.a), self.to_image(snap.b))
    }
}

pub fn selection_anchor(rects: &[Rect]) -> Option<Point> {
    let bounds = rects.iter().copied().reduce(|acc, rect| acc.union(&rect))?;
    Some(Point::new((bounds.x0 + bounds.x1) / 2.0, bounds.y1))
}

/// Rects of neighbouring lines often overlap a little; only a large vertical overlap
/// means they are on the same line.
pub fn rects_on_same_line(a: &Rect, b: &Rect) -> bool {
    let shorter = if a.height() <= b.height() { a } else { b };
    let overlap = a.y1.min(b.y1) - a.y0.max(b.y0);
    overlap >= shorter.height() * SAME_LINE_TOLERANCE
}
