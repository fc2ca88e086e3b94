use tracing::warn;

use crate::geometry::{Matrix, Point, Quad, Rect};

const FALLBACK_FACTOR: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    zoom: f32,
    dpr: f32,
}

impl Default for CoordinateTransform {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            dpr: 1.0,
        }
    }
}

impl CoordinateTransform {
    pub fn new(zoom: f32, dpr: f32) -> Self {
        Self {
            zoom: sanitize_factor("zoom", zoom),
            dpr: sanitize_factor("device pixel ratio", dpr),
        }
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn dpr(&self) -> f32 {
        self.dpr
    }

    pub fn with_zoom(self, zoom: f32) -> Self {
        Self::new(zoom, self.dpr)
    }

    pub fn with_dpr(self, dpr: f32) -> Self {
        Self::new(self.zoom, dpr)
    }

    pub fn scale(&self) -> f32 {
        self.zoom * self.dpr
    }

    pub fn matrix(&self) -> Matrix {
        Matrix::scale(self.scale())
    }

    pub fn to_document(&self, screen: Point) -> Point {
        let scale = self.scale();
        Point::new(screen.x / scale, screen.y / scale)
    }

    pub fn to_screen(&self, document: Point) -> Point {
        document.transform(self.matrix())
    }

    pub fn quad_to_screen(&self, quad: &Quad) -> Quad {
        quad.transform(self.matrix())
    }

    pub fn quad_to_document(&self, quad: &Quad) -> Quad {
        quad.map(|p| self.to_document(p))
    }

    pub fn rect_to_screen(&self, rect: &Rect) -> Rect {
        rect.transform(self.matrix())
    }

    pub fn rect_to_document(&self, rect: &Rect) -> Rect {
        let top_left = self.to_document(Point::new(rect.x0, rect.y0));
        let bottom_right = self.to_document(Point::new(rect.x1, rect.y1));
        Rect::new(top_left.x, top_left.y, bottom_right.x, bottom_right.y)
    }

    pub fn screen_to_logical(&self, rect: &Rect) -> Rect {
        Rect::new(
            rect.x0 / self.dpr,
            rect.y0 / self.dpr,
            rect.x1 / self.dpr,
            rect.y1 / self.dpr,
        )
    }

    pub fn logical_size(&self, bounds: &Rect) -> (f32, f32) {
        let scaled = self.rect_to_screen(bounds);
        (scaled.width() / self.dpr, scaled.height() / self.dpr)
    }

    pub fn device_size(&self, bounds: &Rect) -> (u32, u32) {
        let scaled = self.rect_to_screen(bounds);
        (
            scaled.width().round().max(0.0) as u32,
            scaled.height().round().max(0.0) as u32,
        )
    }
}

pub fn rescale_point(point: Point, old_zoom: f32, new_zoom: f32) -> Point {
    if old_zoom <= 0.0 {
        return point;
    }
    let factor = new_zoom / old_zoom;
    Point::new(point.x * factor, point.y * factor)
}

fn sanitize_factor(name: &str, value: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        warn!(value, "invalid {name}, falling back to {FALLBACK_FACTOR}");
        FALLBACK_FACTOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point, b: Point) {
        let tolerance = 1e-6 * a.x.abs().max(a.y.abs()).max(1.0);
        assert!(
            (a.x - b.x).abs() <= tolerance && (a.y - b.y).abs() <= tolerance,
            "{a:?} != {b:?}"
        );
    }

    #[test]
    fn round_trip_across_zoom_and_dpr() {
        let points = [
            Point::new(0.0, 0.0),
            Point::new(17.5, 903.25),
            Point::new(1234.0, 4.0),
        ];
        for zoom in [0.25f32, 0.5, 1.0, 1.3, 2.0, 4.0] {
            for dpr in [1.0f32, 1.25, 1.5, 2.0, 3.0] {
                let transform = CoordinateTransform::new(zoom, dpr);
                for point in points {
                    assert_close(transform.to_screen(transform.to_document(point)), point);
                }
            }
        }
    }

    #[test]
    fn document_point_scales_by_zoom_times_dpr() {
        let transform = CoordinateTransform::new(2.0, 1.5);
        assert_eq!(transform.scale(), 3.0);
        assert_eq!(
            transform.to_document(Point::new(30.0, 60.0)),
            Point::new(10.0, 20.0)
        );
        assert_eq!(transform.matrix().a, transform.matrix().d);
    }

    #[test]
    fn quad_to_screen_transforms_every_corner() {
        let transform = CoordinateTransform::new(2.0, 1.0);
        let quad = Quad {
            ul: Point::new(0.0, 5.0),
            ur: Point::new(5.0, 0.0),
            ll: Point::new(5.0, 10.0),
            lr: Point::new(10.0, 5.0),
        };
        let screen = transform.quad_to_screen(&quad);
        assert_eq!(screen.ul, Point::new(0.0, 10.0));
        assert_eq!(screen.lr, Point::new(20.0, 10.0));
        assert_eq!(transform.quad_to_document(&screen), quad);
    }

    #[test]
    fn rect_to_document_undoes_rect_to_screen() {
        let transform = CoordinateTransform::new(1.5, 2.0);
        let rect = Rect::new(10.0, 20.0, 40.0, 26.0);
        let screen = transform.rect_to_screen(&rect);
        assert_eq!(screen, Rect::new(30.0, 60.0, 120.0, 78.0));
        assert_eq!(transform.rect_to_document(&screen), rect);
    }

    #[test]
    fn logical_size_removes_dpr() {
        let transform = CoordinateTransform::new(1.5, 2.0);
        let (w, h) = transform.logical_size(&Rect::new(0.0, 0.0, 100.0, 200.0));
        assert_eq!((w, h), (150.0, 300.0));
        assert_eq!(
            transform.device_size(&Rect::new(0.0, 0.0, 100.0, 200.0)),
            (300, 600)
        );
    }

    #[test]
    fn invalid_factors_fall_back() {
        let transform = CoordinateTransform::new(0.0, f32::NAN);
        assert_eq!(transform.zoom(), FALLBACK_FACTOR);
        assert_eq!(transform.dpr(), FALLBACK_FACTOR);
        assert_eq!(CoordinateTransform::new(-2.0, f32::INFINITY).scale(), 1.0);
    }

    #[test]
    fn tiny_positive_factors_are_kept() {
        let transform = CoordinateTransform::new(0.005, 0.5);
        assert_eq!(transform.zoom(), 0.005);
        assert_eq!(transform.dpr(), 0.5);
        assert_eq!(transform.device_size(&Rect::new(0.0, 0.0, 400.0, 400.0)), (1, 1));
    }

    #[test]
    fn rescale_point_follows_zoom_ratio() {
        let point = rescale_point(Point::new(10.0, 20.0), 1.0, 2.5);
        assert_eq!(point, Point::new(25.0, 50.0));
    }
}
