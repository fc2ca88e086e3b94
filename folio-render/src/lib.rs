use folio_core::{Rect, RenderImage};
use image::RgbaImage;

#[cfg(feature = "pdf")]
mod pdfium;

#[cfg(feature = "pdf")]
pub use pdfium::PdfiumRenderFactory;

pub fn flip_to_top_left(left: f32, top: f32, right: f32, bottom: f32, page_height: f32) -> Rect {
    Rect::new(
        left.min(right),
        page_height - top.max(bottom),
        left.max(right),
        page_height - top.min(bottom),
    )
}

pub fn render_image_from_rgba(image: RgbaImage) -> RenderImage {
    let (width, height) = image.dimensions();
    RenderImage {
        width,
        height,
        pixels: image.into_raw(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flips_pdf_rect_to_top_left_origin() {
        let rect = flip_to_top_left(72.0, 700.0, 144.0, 688.0, 792.0);
        assert_eq!(rect, Rect::new(72.0, 92.0, 144.0, 104.0));
    }

    #[test]
    fn flipping_tolerates_swapped_edges() {
        let rect = flip_to_top_left(144.0, 688.0, 72.0, 700.0, 792.0);
        assert_eq!(rect, Rect::new(72.0, 92.0, 144.0, 104.0));
    }

    #[test]
    fn rgba_image_keeps_dimensions() {
        let image = RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 4]));
        let rendered = render_image_from_rgba(image);
        assert_eq!((rendered.width, rendered.height), (3, 2));
        assert_eq!(rendered.pixels.len(), 24);
        assert_eq!(&rendered.pixels[..4], &[1, 2, 3, 4]);
    }
}
