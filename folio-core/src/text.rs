use crate::geometry::{fuzzy_eq, Point, Quad, Rect};

const LINE_GROUPING_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapMode {
    Chars,
    Words,
    Lines,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Snap {
    pub a: Point,
    pub b: Point,
    pub quad: Quad,
}

pub trait TextLayer: Send {
    fn symbol_bounds(&self) -> Vec<Rect>;

    fn search(&self, needle: &str, max_hits: usize) -> Vec<Quad>;

    fn snap_selection(&self, a: Point, b: Point, mode: SnapMode) -> Snap;

    fn highlight_selection(&self, a: Point, b: Point) -> Vec<Quad>;

    fn copy_selection(&self, a: Point, b: Point, crlf: bool) -> String;

    /// True when `quad` already spans a whole word.
    ///
    /// The default re-snaps the quad's midline to word boundaries and compares widths.
    /// Backends with real token boundaries should override it.
    fn is_whole_word(&self, quad: &Quad) -> bool {
        let (begin, end) = quad.midline();
        let snapped = self.snap_selection(begin, end, SnapMode::Words);
        fuzzy_eq(snapped.quad.width(), quad.width())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextChar {
    pub c: char,
    pub quad: Quad,
}

impl TextChar {
    pub fn new(c: char, bounds: Rect) -> Self {
        Self {
            c,
            quad: bounds.to_quad(),
        }
    }

    fn center(&self) -> Point {
        self.quad.bounds().center()
    }

    fn left_middle(&self) -> Point {
        Point::new(self.quad.ul.x, (self.quad.ul.y + self.quad.ll.y) / 2.0)
    }

    fn right_middle(&self) -> Point {
        Point::new(self.quad.ur.x, (self.quad.ur.y + self.quad.lr.y) / 2.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    chars: Vec<TextChar>,
    bbox: Rect,
}

impl TextLine {
    pub fn new(chars: Vec<TextChar>) -> Self {
        let bbox = chars
            .iter()
            .map(|ch| ch.quad.bounds())
            .reduce(|acc, rect| acc.union(&rect))
            .unwrap_or_default();
        Self { chars, bbox }
    }

    pub fn chars(&self) -> &[TextChar] {
        &self.chars
    }

    pub fn bbox(&self) -> Rect {
        self.bbox
    }

    pub fn text(&self) -> String {
        self.chars.iter().map(|ch| ch.c).collect()
    }

    fn segment_quad(&self, start: usize, end: usize) -> Option<Quad> {
        if start >= end {
            return None;
        }
        let first = self.chars.get(start)?;
        let last = self.chars.get(end - 1)?;
        Some(Quad {
            ul: first.quad.ul,
            ll: first.quad.ll,
            ur: last.quad.ur,
            lr: last.quad.lr,
        })
    }
}

/// Caret position between glyphs: `index` ranges over `0..=line.len()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Position {
    line: usize,
    index: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredText {
    lines: Vec<TextLine>,
}

impl StructuredText {
    pub fn from_lines(lines: Vec<TextLine>) -> Self {
        Self {
            lines: lines
                .into_iter()
                .filter(|line| !line.chars.is_empty())
                .collect(),
        }
    }

    /// Groups glyphs, given in content-stream order, into lines.
    ///
    /// A glyph starts a new line when its vertical centre leaves the current line band
    /// or when it jumps back to the left of the line's last glyph. `\r` and `\n` glyphs
    /// only terminate the current line. Glyphs with empty boxes (typically generated
    /// spaces) are placed right after the previous glyph.
    pub fn from_glyphs(glyphs: impl IntoIterator<Item = TextChar>) -> Self {
        let mut lines = Vec::new();
        let mut current: Vec<TextChar> = Vec::new();

        for mut glyph in glyphs {
            if glyph.c == '\n' || glyph.c == '\r' {
                if !current.is_empty() {
                    lines.push(TextLine::new(std::mem::take(&mut current)));
                }
                continue;
            }

            if glyph.quad.is_empty() {
                let Some(previous) = current.last() else {
                    continue;
                };
                let anchor = previous.quad.bounds();
                glyph.quad = Rect::new(anchor.x1, anchor.y0, anchor.x1, anchor.y1).to_quad();
                current.push(glyph);
                continue;
            }

            if let Some(previous) = current.last() {
                if starts_new_line(previous, &glyph) {
                    lines.push(TextLine::new(std::mem::take(&mut current)));
                }
            }
            current.push(glyph);
        }

        if !current.is_empty() {
            lines.push(TextLine::new(current));
        }

        Self::from_lines(lines)
    }

    pub fn lines(&self) -> &[TextLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(TextLine::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn closest_position(&self, point: Point) -> Option<Position> {
        let (line_idx, line) = self
            .lines
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.bbox
                    .distance_to(point)
                    .total_cmp(&b.bbox.distance_to(point))
            })?;

        let index = line
            .chars
            .iter()
            .position(|ch| point.x < ch.center().x)
            .unwrap_or(line.chars.len());

        Some(Position {
            line: line_idx,
            index,
        })
    }

    fn ordered_positions(&self, a: Point, b: Point) -> Option<(Position, Position)> {
        let start = self.closest_position(a)?;
        let end = self.closest_position(b)?;
        Some(if start <= end {
            (start, end)
        } else {
            (end, start)
        })
    }

    fn line_range(&self, line: usize, start: Position, end: Position) -> (usize, usize) {
        let len = self.lines[line].chars.len();
        let from = if line == start.line { start.index } else { 0 };
        let to = if line == end.line { end.index } else { len };
        (from.min(len), to.min(len))
    }

    fn extend_to_words(&self, start: &mut Position, end: &mut Position) {
        let chars = &self.lines[start.line].chars;
        while start.index > 0 && is_word_char(chars[start.index - 1].c) {
            start.index -= 1;
        }
        let chars = &self.lines[end.line].chars;
        while end.index < chars.len() && is_word_char(chars[end.index].c) {
            end.index += 1;
        }
    }

    fn point_at(&self, position: Position, leading: bool) -> Point {
        let line = &self.lines[position.line];
        if leading {
            if let Some(ch) = line.chars.get(position.index) {
                return ch.left_middle();
            }
        } else if position.index > 0 {
            if let Some(ch) = line.chars.get(position.index - 1) {
                return ch.right_middle();
            }
        }
        match (leading, line.chars.first(), line.chars.last()) {
            (true, _, Some(last)) => last.right_middle(),
            (false, Some(first), _) => first.left_middle(),
            _ => line.bbox.center(),
        }
    }

    fn range_quads(&self, start: Position, end: Position) -> Vec<Quad> {
        (start.line..=end.line)
            .filter_map(|line| {
                let (from, to) = self.line_range(line, start, end);
                self.lines[line].segment_quad(from, to)
            })
            .collect()
    }

    fn haystack(&self) -> Vec<(char, Option<Position>)> {
        let mut haystack = Vec::new();
        for (line_idx, line) in self.lines.iter().enumerate() {
            if line_idx > 0 {
                haystack.push(('\n', None));
            }
            for (index, ch) in line.chars.iter().enumerate() {
                haystack.push((
                    ch.c,
                    Some(Position {
                        line: line_idx,
                        index,
                    }),
                ));
            }
        }
        haystack
    }

    fn match_quads(&self, matched: &[(char, Option<Position>)]) -> Vec<Quad> {
        let positions: Vec<Position> = matched.iter().filter_map(|(_, pos)| *pos).collect();
        let mut quads = Vec::new();
        let mut run_start = 0;
        for idx in 1..=positions.len() {
            let run_ends = idx == positions.len() || positions[idx].line != positions[run_start].line;
            if run_ends {
                let first = positions[run_start];
                let last = positions[idx - 1];
                if let Some(quad) = self.lines[first.line].segment_quad(first.index, last.index + 1)
                {
                    quads.push(quad);
                }
                run_start = idx;
            }
        }
        quads
    }
}

impl TextLayer for StructuredText {
    fn symbol_bounds(&self) -> Vec<Rect> {
        self.lines
            .iter()
            .flat_map(|line| line.chars.iter().map(|ch| ch.quad.bounds()))
            .collect()
    }

    fn search(&self, needle: &str, max_hits: usize) -> Vec<Quad> {
        let pattern = compile_needle(needle);
        if pattern.is_empty() || max_hits == 0 {
            return Vec::new();
        }

        let haystack = self.haystack();
        let mut hits = Vec::new();
        let mut start = 0;
        while start < haystack.len() {
            match match_at(&haystack, start, &pattern) {
                Some(end) => {
                    for quad in self.match_quads(&haystack[start..end]) {
                        if hits.len() == max_hits {
                            return hits;
                        }
                        hits.push(quad);
                    }
                    start = end.max(start + 1);
                }
                None => start += 1,
            }
        }
        hits
    }

    fn snap_selection(&self, a: Point, b: Point, mode: SnapMode) -> Snap {
        let Some((mut start, mut end)) = self.ordered_positions(a, b) else {
            return Snap {
                a,
                b,
                quad: Quad::default(),
            };
        };

        match mode {
            SnapMode::Chars => {}
            SnapMode::Words => self.extend_to_words(&mut start, &mut end),
            SnapMode::Lines => {
                start.index = 0;
                end.index = self.lines[end.line].chars.len();
            }
        }

        let quads = self.range_quads(start, end);
        let quad = match quads.as_slice() {
            [] => {
                let at = self.point_at(start, true);
                Rect::new(at.x, at.y, at.x, at.y).to_quad()
            }
            [single] => *single,
            many => many
                .iter()
                .map(Quad::bounds)
                .reduce(|acc, rect| acc.union(&rect))
                .unwrap_or_default()
                .to_quad(),
        };

        Snap {
            a: self.point_at(start, true),
            b: if start == end {
                self.point_at(end, true)
            } else {
                self.point_at(end, false)
            },
            quad,
        }
    }

    fn highlight_selection(&self, a: Point, b: Point) -> Vec<Quad> {
        match self.ordered_positions(a, b) {
            Some((start, end)) => self.range_quads(start, end),
            None => Vec::new(),
        }
    }

    fn copy_selection(&self, a: Point, b: Point, crlf: bool) -> String {
        let Some((start, end)) = self.ordered_positions(a, b) else {
            return String::new();
        };
        let newline = if crlf { "\r\n" } else { "\n" };
        let mut text = String::new();
        for line in start.line..=end.line {
            if line > start.line {
                text.push_str(newline);
            }
            let (from, to) = self.line_range(line, start, end);
            text.extend(self.lines[line].chars[from..to].iter().map(|ch| ch.c));
        }
        text
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '\'' || c == '-'
}

fn starts_new_line(previous: &TextChar, glyph: &TextChar) -> bool {
    let prev = previous.quad.bounds();
    let next = glyph.quad.bounds();
    let height = (prev.height() + next.height()) / 2.0;
    let vertical_jump = (prev.center().y - next.center().y).abs() > height * LINE_GROUPING_THRESHOLD;
    let backwards_jump = next.x1 < prev.x0 - height;
    vertical_jump || backwards_jump
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum NeedleItem {
    Char(char),
    Space,
}

fn compile_needle(needle: &str) -> Vec<NeedleItem> {
    let mut pattern = Vec::new();
    for c in needle.trim().chars() {
        if c.is_whitespace() {
            if pattern.last() != Some(&NeedleItem::Space) {
                pattern.push(NeedleItem::Space);
            }
        } else {
            pattern.push(NeedleItem::Char(fold_case(c)));
        }
    }
    pattern
}

fn match_at(
    haystack: &[(char, Option<Position>)],
    start: usize,
    pattern: &[NeedleItem],
) -> Option<usize> {
    let mut cursor = start;
    for item in pattern {
        match item {
            NeedleItem::Char(expected) => {
                let (c, _) = haystack.get(cursor)?;
                if fold_case(*c) != *expected {
                    return None;
                }
                cursor += 1;
            }
            NeedleItem::Space => {
                if !haystack.get(cursor)?.0.is_whitespace() {
                    return None;
                }
                while haystack
                    .get(cursor)
                    .is_some_and(|(c, _)| c.is_whitespace())
                {
                    cursor += 1;
                }
            }
        }
    }
    Some(cursor)
}

fn fold_case(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{layout_text, CHAR_WIDTH, LINE_HEIGHT, MARGIN};

    fn center_of(text: &StructuredText, line: usize, index: usize) -> Point {
        text.lines()[line].chars()[index].quad.bounds().center()
    }

    #[test]
    fn search_is_case_insensitive_and_non_overlapping() {
        let text = layout_text(&["Cat cAT catcat"]);
        let hits = text.search("cat", 100);
        assert_eq!(hits.len(), 4);
        assert_eq!(hits[0].ul.x, MARGIN);
        assert_eq!(hits[1].ul.x, MARGIN + 4.0 * CHAR_WIDTH);
    }

    #[test]
    fn search_respects_hit_cap() {
        let text = layout_text(&["aaaa aaaa aaaa"]);
        assert_eq!(text.search("a", 5).len(), 5);
        assert!(text.search("a", 0).is_empty());
        assert!(text.search("   ", 10).is_empty());
    }

    #[test]
    fn search_spanning_lines_yields_quad_per_line() {
        let text = layout_text(&["the quick", "brown fox"]);
        let hits = text.search("quick  brown", 10);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].ul.y < hits[1].ul.y);
    }

    #[test]
    fn word_snap_extends_partial_word() {
        let text = layout_text(&["concatenate cat"]);
        let inner = center_of(&text, 0, 4);
        let snap = text.snap_selection(inner, inner, SnapMode::Words);
        assert_eq!(snap.quad.width(), 11.0 * CHAR_WIDTH);
        assert_eq!(text.copy_selection(snap.a, snap.b, false), "concatenate");
    }

    #[test]
    fn whole_word_predicate_uses_word_boundaries() {
        let text = layout_text(&["concatenate cat"]);
        let hits = text.search("cat", 10);
        assert_eq!(hits.len(), 2);
        assert!(!text.is_whole_word(&hits[0]));
        assert!(text.is_whole_word(&hits[1]));
    }

    #[test]
    fn punctuation_bounds_words() {
        let text = layout_text(&["the cat, sat on (cat) mat's"]);
        let hits = text.search("cat", 10);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| text.is_whole_word(hit)));

        let inside = center_of(&text, 0, 17);
        let snap = text.snap_selection(inside, inside, SnapMode::Words);
        assert_eq!(text.copy_selection(snap.a, snap.b, false), "cat");

        let apostrophe = center_of(&text, 0, 23);
        let snap = text.snap_selection(apostrophe, apostrophe, SnapMode::Words);
        assert_eq!(text.copy_selection(snap.a, snap.b, false), "mat's");
    }

    #[test]
    fn line_snap_covers_whole_line() {
        let text = layout_text(&["first line here", "second"]);
        let point = center_of(&text, 0, 7);
        let snap = text.snap_selection(point, point, SnapMode::Lines);
        assert_eq!(text.copy_selection(snap.a, snap.b, false), "first line here");
    }

    #[test]
    fn copy_selection_joins_lines() {
        let text = layout_text(&["alpha beta", "gamma"]);
        let start = text.lines()[0].chars()[6].quad.ul;
        let end = text.lines()[1].chars()[4].quad.lr;
        assert_eq!(text.copy_selection(start, end, false), "beta\ngamma");
        assert_eq!(text.copy_selection(end, start, true), "beta\r\ngamma");
    }

    #[test]
    fn highlight_selection_returns_quad_per_line() {
        let text = layout_text(&["alpha beta", "gamma delta", "omega"]);
        let start = center_of(&text, 0, 2);
        let end = center_of(&text, 2, 2);
        let quads = text.highlight_selection(start, end);
        assert_eq!(quads.len(), 3);
        assert_eq!(quads[1].width(), 11.0 * CHAR_WIDTH);
    }

    #[test]
    fn snapped_points_are_stable_when_resnapped() {
        let text = layout_text(&["stable points only"]);
        let first = text.snap_selection(center_of(&text, 0, 8), center_of(&text, 0, 12), SnapMode::Words);
        let second = text.snap_selection(first.a, first.b, SnapMode::Chars);
        assert_eq!(first.quad, second.quad);
    }

    #[test]
    fn glyph_grouping_splits_lines() {
        let glyphs = "ab\ncd".chars().enumerate().map(|(i, c)| {
            let line = if i < 3 { 0.0 } else { 1.0 };
            let column = if i < 3 { i as f32 } else { (i - 3) as f32 };
            TextChar::new(
                c,
                Rect::from_xywh(column * CHAR_WIDTH, line * LINE_HEIGHT, CHAR_WIDTH, 10.0),
            )
        });
        let text = StructuredText::from_glyphs(glyphs);
        assert_eq!(text.lines().len(), 2);
        assert_eq!(text.text(), "ab\ncd");
    }

    #[test]
    fn boxless_glyphs_follow_previous_glyph() {
        let glyph = |c, column: f32| {
            TextChar::new(c, Rect::from_xywh(column * CHAR_WIDTH, 0.0, CHAR_WIDTH, 10.0))
        };
        let text = StructuredText::from_glyphs([
            TextChar::new('x', Rect::default()),
            glyph('a', 0.0),
            TextChar::new(' ', Rect::default()),
            glyph('b', 2.0),
        ]);
        assert_eq!(text.text(), "a b");
        assert_eq!(text.lines()[0].chars()[1].quad.ul.x, CHAR_WIDTH);
    }

    #[test]
    fn empty_layer_answers_with_nothing() {
        let text = StructuredText::default();
        assert!(text.search("x", 10).is_empty());
        assert!(text.highlight_selection(Point::new(0.0, 0.0), Point::new(5.0, 5.0)).is_empty());
        assert_eq!(text.copy_selection(Point::default(), Point::default(), false), "");
    }
}
