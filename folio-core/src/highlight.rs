use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::geometry::{Point, Quad, Rect};
use crate::selection::rects_on_same_line;
use crate::transform::CoordinateTransform;

pub type HighlightId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_hex(hex: &str, alpha: u8) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
        Some(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?, alpha))
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::new(255, 235, 59, 96)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: HighlightId,
    pub page: usize,
    pub color: Rgba,
    pub rects: Vec<Rect>,
}

impl Highlight {
    pub fn contains(&self, point: Point) -> bool {
        self.rects.iter().any(|rect| rect.contains(point))
    }

    fn conflicts_with(&self, page: usize, rects: &[Rect]) -> bool {
        self.page == page
            && self.rects.iter().any(|existing| {
                rects
                    .iter()
                    .any(|new| existing.intersects(new) && rects_on_same_line(existing, new))
            })
    }
}

#[derive(Debug, Clone, Default)]
pub struct HighlightSet {
    highlights: Vec<Highlight>,
}

impl HighlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.highlights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.highlights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Highlight> {
        self.highlights.iter()
    }

    pub fn create_from_selection(
        &mut self,
        page: usize,
        color: Rgba,
        screen_rects: &[Quad],
        transform: CoordinateTransform,
    ) -> Option<HighlightId> {
        let rects: Vec<Rect> = screen_rects
            .iter()
            .map(|quad| transform.quad_to_document(quad).bounds())
            .filter(|rect| !rect.is_empty())
            .collect();
        if rects.is_empty() {
            return None;
        }

        let before = self.highlights.len();
        self.highlights
            .retain(|existing| !existing.conflicts_with(page, &rects));
        let replaced = before - self.highlights.len();

        let id = Uuid::new_v4();
        debug!(%id, page, replaced, "created highlight");
        self.highlights.push(Highlight {
            id,
            page,
            color,
            rects,
        });
        Some(id)
    }

    pub fn remove(&mut self, id: HighlightId) -> Option<Highlight> {
        let idx = self.highlights.iter().position(|h| h.id == id)?;
        Some(self.highlights.remove(idx))
    }

    pub fn change_color(&mut self, id: HighlightId, color: Rgba) -> bool {
        match self.highlights.iter_mut().find(|h| h.id == id) {
            Some(highlight) => {
                highlight.color = color;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: HighlightId) -> Option<&Highlight> {
        self.highlights.iter().find(|h| h.id == id)
    }

    pub fn on_page(&self, page: usize) -> impl Iterator<Item = &Highlight> + '_ {
        self.highlights.iter().filter(move |h| h.page == page)
    }

    pub fn highlight_at_point(
        &self,
        page: usize,
        screen: Point,
        transform: CoordinateTransform,
    ) -> Option<&Highlight> {
        let point = transform.to_document(screen);
        self.highlights
            .iter()
            .rev()
            .find(|h| h.page == page && h.contains(point))
    }

    pub fn screen_rects(&self, id: HighlightId, transform: CoordinateTransform) -> Vec<Rect> {
        self.get(id)
            .map(|h| h.rects.iter().map(|r| transform.rect_to_screen(r)).collect())
            .unwrap_or_default()
    }

    /// Left-middle of the first rect and right-middle of the last one, in document
    /// space. Feeding both into a text selector re-extracts the highlighted text.
    pub fn text_anchor_points(&self, id: HighlightId) -> Option<(Point, Point)> {
        let highlight = self.get(id)?;
        let first = highlight.rects.first()?;
        let last = highlight.rects.last()?;
        Some((
            Point::new(first.x0, first.center().y),
            Point::new(last.x1, last.center().y),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{layout_text, CHAR_WIDTH, GLYPH_HEIGHT, LINE_HEIGHT, MARGIN};
    use crate::selection::TextSelector;

    fn line_quad(line: usize, from: usize, to: usize) -> Quad {
        Rect::new(
            MARGIN + from as f32 * CHAR_WIDTH,
            MARGIN + line as f32 * LINE_HEIGHT,
            MARGIN + to as f32 * CHAR_WIDTH,
            MARGIN + line as f32 * LINE_HEIGHT + GLYPH_HEIGHT,
        )
        .to_quad()
    }

    fn on_screen(transform: CoordinateTransform, quads: &[Quad]) -> Vec<Quad> {
        quads.iter().map(|q| transform.quad_to_screen(q)).collect()
    }

    #[test]
    fn hex_colors_parse() {
        assert_eq!(Rgba::from_hex("#ff8000", 128), Some(Rgba::new(255, 128, 0, 128)));
        assert_eq!(Rgba::from_hex("00ff00", 255).map(|c| c.to_hex()), Some("#00ff00".into()));
        assert_eq!(Rgba::from_hex("#fff", 255), None);
        assert_eq!(Rgba::from_hex("#gg0000", 255), None);
    }

    #[test]
    fn highlights_are_zoom_independent() {
        let mut set = HighlightSet::new();
        let captured = CoordinateTransform::new(2.0, 1.0);
        let id = set
            .create_from_selection(0, Rgba::default(), &on_screen(captured, &[line_quad(0, 0, 5)]), captured)
            .unwrap();

        assert_eq!(set.get(id).unwrap().rects[0], line_quad(0, 0, 5).bounds());

        let later = CoordinateTransform::new(1.0, 2.0);
        let rects = set.screen_rects(id, later);
        assert_eq!(rects[0].x1, (MARGIN + 5.0 * CHAR_WIDTH) * 2.0);

        let inside = later.to_screen(Point::new(MARGIN + CHAR_WIDTH, MARGIN + 2.0));
        assert_eq!(set.highlight_at_point(0, inside, later).map(|h| h.id), Some(id));
        assert!(set.highlight_at_point(1, inside, later).is_none());
    }

    #[test]
    fn same_line_overlap_replaces_existing() {
        let mut set = HighlightSet::new();
        let transform = CoordinateTransform::default();
        let first = set
            .create_from_selection(0, Rgba::default(), &[line_quad(0, 0, 5)], transform)
            .unwrap();
        let other_line = set
            .create_from_selection(0, Rgba::default(), &[line_quad(1, 0, 5)], transform)
            .unwrap();
        let other_page = set
            .create_from_selection(1, Rgba::default(), &[line_quad(0, 0, 5)], transform)
            .unwrap();

        let replacement = set
            .create_from_selection(0, Rgba::default(), &[line_quad(0, 3, 9)], transform)
            .unwrap();

        assert!(set.get(first).is_none());
        assert!(set.get(other_line).is_some());
        assert!(set.get(other_page).is_some());
        assert!(set.get(replacement).is_some());
        assert_eq!(set.on_page(0).count(), 2);
    }

    #[test]
    fn empty_selection_creates_nothing() {
        let mut set = HighlightSet::new();
        assert_eq!(
            set.create_from_selection(0, Rgba::default(), &[], CoordinateTransform::default()),
            None
        );
        assert!(set.is_empty());
    }

    #[test]
    fn color_change_and_removal() {
        let mut set = HighlightSet::new();
        let id = set
            .create_from_selection(2, Rgba::default(), &[line_quad(0, 0, 3)], CoordinateTransform::default())
            .unwrap();
        let blue = Rgba::new(0, 0, 255, 80);
        assert!(set.change_color(id, blue));
        assert_eq!(set.get(id).unwrap().color, blue);

        assert_eq!(set.remove(id).map(|h| h.page), Some(2));
        assert!(!set.change_color(id, blue));
        assert!(set.screen_rects(id, CoordinateTransform::default()).is_empty());
    }

    #[test]
    fn anchors_re_extract_highlighted_text() {
        let selector = TextSelector::new(Box::new(layout_text(&["keep this phrase", "and more"])));
        let mut set = HighlightSet::new();
        let id = set
            .create_from_selection(
                0,
                Rgba::default(),
                &[line_quad(0, 5, 16), line_quad(1, 0, 3)],
                CoordinateTransform::default(),
            )
            .unwrap();

        let (a, b) = set.text_anchor_points(id).unwrap();
        assert_eq!(a, Point::new(MARGIN + 5.0 * CHAR_WIDTH, MARGIN + GLYPH_HEIGHT / 2.0));
        assert_eq!(selector.text_from_selection(a, b), "this phrase\nand");
    }
}
