use serde::{Deserialize, Serialize};

const FUZZY_EPSILON: f32 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn translate(self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn transform(self, matrix: Matrix) -> Self {
        Self::new(self.x * matrix.a, self.y * matrix.d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn is_empty(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }

    pub fn center(&self) -> Point {
        Point::new((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x0 && point.x <= self.x1 && point.y >= self.y0 && point.y <= self.y1
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.intersection(other).is_empty()
    }

    pub fn intersection(&self, other: &Rect) -> Rect {
        Rect::new(
            self.x0.max(other.x0),
            self.y0.max(other.y0),
            self.x1.min(other.x1),
            self.y1.min(other.y1),
        )
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(
            self.x0.min(other.x0),
            self.y0.min(other.y0),
            self.x1.max(other.x1),
            self.y1.max(other.y1),
        )
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(self.x0 + dx, self.y0 + dy, self.x1 + dx, self.y1 + dy)
    }

    pub fn transform(&self, matrix: Matrix) -> Rect {
        self.to_quad().transform(matrix).bounds()
    }

    pub fn distance_to(&self, point: Point) -> f32 {
        let dx = (self.x0 - point.x).max(0.0).max(point.x - self.x1);
        let dy = (self.y0 - point.y).max(0.0).max(point.y - self.y1);
        (dx * dx + dy * dy).sqrt()
    }

    pub fn to_quad(&self) -> Quad {
        Quad {
            ul: Point::new(self.x0, self.y0),
            ur: Point::new(self.x1, self.y0),
            ll: Point::new(self.x0, self.y1),
            lr: Point::new(self.x1, self.y1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Quad {
    pub ul: Point,
    pub ur: Point,
    pub ll: Point,
    pub lr: Point,
}

impl Quad {
    pub fn is_empty(&self) -> bool {
        self.bounds().is_empty()
    }

    pub fn transform(&self, matrix: Matrix) -> Quad {
        self.map(|p| p.transform(matrix))
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Quad {
        self.map(|p| p.translate(dx, dy))
    }

    pub fn map(&self, f: impl Fn(Point) -> Point) -> Quad {
        Quad {
            ul: f(self.ul),
            ur: f(self.ur),
            ll: f(self.ll),
            lr: f(self.lr),
        }
    }

    pub fn bounds(&self) -> Rect {
        let xs = [self.ul.x, self.ur.x, self.ll.x, self.lr.x];
        let ys = [self.ul.y, self.ur.y, self.ll.y, self.lr.y];
        Rect::new(
            xs.iter().copied().fold(f32::INFINITY, f32::min),
            ys.iter().copied().fold(f32::INFINITY, f32::min),
            xs.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            ys.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        )
    }

    pub fn width(&self) -> f32 {
        self.ur.x - self.ul.x
    }

    pub fn midline(&self) -> (Point, Point) {
        let y = self.ul.y + (self.ll.y - self.ul.y) / 2.0;
        (Point::new(self.ul.x, y), Point::new(self.ur.x, y))
    }

    /// Point containment that also works for rotated quads: the point must lie on the
    /// inner side of all four edges.
    pub fn contains(&self, point: Point) -> bool {
        let edges = [
            (self.ul, self.ur),
            (self.ur, self.lr),
            (self.lr, self.ll),
            (self.ll, self.ul),
        ];
        let mut sign = 0.0f32;
        for (a, b) in edges {
            let cross = (b.x - a.x) * (point.y - a.y) - (b.y - a.y) * (point.x - a.x);
            if cross == 0.0 {
                continue;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        true
    }
}

impl From<Rect> for Quad {
    fn from(rect: Rect) -> Self {
        rect.to_quad()
    }
}

/// Uniform scale matrix. Only `Matrix::scale` constructs one, so `a == d` always holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub d: f32,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix { a: 1.0, d: 1.0 };

    pub fn scale(factor: f32) -> Self {
        Self {
            a: factor,
            d: factor,
        }
    }

    pub fn factor(&self) -> f32 {
        self.a
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

pub fn fuzzy_eq(a: f32, b: f32) -> bool {
    if a == b {
        return true;
    }
    let diff = (a - b).abs();
    let scale = a.abs().min(b.abs()).max(1.0);
    diff <= FUZZY_EPSILON * scale
}
