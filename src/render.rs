use crate::shape::{Color, Genome, Shape, ShapeKind};
use image::{Rgba, RgbaImage};

/// Renders `genome` onto a freshly allocated `width` x `height` canvas.
pub fn render(genome: &Genome, width: u32, height: u32, background: Color) -> RgbaImage {
    let mut canvas = RgbaImage::new(width, height);
    render_into(genome, &mut canvas, background);
    canvas
}

/// Renders `genome` over whatever `canvas` held before, without allocating.
///
/// The canvas is first flooded with `background` (alpha forced opaque), then
/// each shape is blended in genome order.
pub fn render_into(genome: &Genome, canvas: &mut RgbaImage, background: Color) {
    let fill = Rgba([background.r, background.g, background.b, u8::MAX]);
    for pixel in canvas.pixels_mut() {
        *pixel = fill;
    }

    for shape in genome {
        draw_shape(canvas, shape);
    }
}

fn draw_shape(canvas: &mut RgbaImage, shape: &Shape) {
    if shape.is_degenerate() {
        return;
    }

    let (width, height) = canvas.dimensions();
    let (cx, cy, size) = (shape.x as i64, shape.y as i64, shape.size as i64);

    // Bounding box, half-open, clamped to the canvas.
    let min_x = (cx - size).max(0);
    let min_y = (cy - size).max(0);
    let max_x = (cx + size).min(width as i64);
    let max_y = (cy + size).min(height as i64);
    if min_x >= max_x || min_y >= max_y {
        return;
    }

    let size_sq = size.unsigned_abs().pow(2);
    let alpha = shape.color.a as u32;
    let inv_alpha = u8::MAX as u32 - alpha;
    let src = [
        shape.color.r as u32 * alpha,
        shape.color.g as u32 * alpha,
        shape.color.b as u32 * alpha,
    ];

    let stride = width as usize * 4;
    let pixels: &mut [u8] = canvas;
    for y in min_y..max_y {
        let dy_sq = (y - cy).unsigned_abs().pow(2);
        let row = y as usize * stride;

        for x in min_x..max_x {
            if shape.kind == ShapeKind::Circle {
                let dx_sq = (x - cx).unsigned_abs().pow(2);
                if dx_sq + dy_sq > size_sq {
                    continue;
                }
            }

            let offset = row + x as usize * 4;
            let pixel = &mut pixels[offset..offset + 4];
            for c in 0..3 {
                pixel[c] = ((src[c] + pixel[c] as u32 * inv_alpha) / 255) as u8;
            }
            pixel[3] = u8::MAX;
        }
    }
}

/// Mean R/G/B over every pixel of `image`, as an opaque color.
pub fn average_color(image: &RgbaImage) -> Color {
    let count = image.width() as u64 * image.height() as u64;
    if count == 0 {
        return Color::opaque(0, 0, 0);
    }

    let mut sums = [0u64; 3];
    for pixel in image.pixels() {
        for c in 0..3 {
            sums[c] += pixel.0[c] as u64;
        }
    }

    Color::opaque(
        (sums[0] / count) as u8,
        (sums[1] / count) as u8,
        (sums[2] / count) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn shape(kind: ShapeKind, x: i32, y: i32, size: i32, color: Color) -> Shape {
        Shape {
            kind,
            x,
            y,
            size,
            color,
        }
    }

    #[test]
    fn empty_genome_is_opaque_background() {
        let canvas = render(&Genome::new(), 4, 3, Color::new(10, 20, 30, 0));
        assert!(canvas.pixels().all(|p| *p == Rgba([10, 20, 30, 255])));
    }

    #[test]
    fn render_into_overwrites_previous_contents() {
        let genome = Genome::from(vec![shape(
            ShapeKind::Rectangle,
            5,
            5,
            3,
            Color::new(200, 0, 0, 255),
        )]);
        let mut canvas = RgbaImage::from_pixel(10, 10, Rgba([1, 2, 3, 4]));
        render_into(&genome, &mut canvas, Color::opaque(0, 0, 0));
        assert_eq!(canvas, render(&genome, 10, 10, Color::opaque(0, 0, 0)));
    }

    #[test]
    fn opaque_rectangle_covers_half_open_box() {
        let genome = Genome::from(vec![shape(
            ShapeKind::Rectangle,
            5,
            5,
            2,
            Color::new(255, 255, 255, 255),
        )]);
        let canvas = render(&genome, 10, 10, Color::opaque(0, 0, 0));
        for (x, y, pixel) in canvas.enumerate_pixels() {
            let inside = (3..7).contains(&x) && (3..7).contains(&y);
            let expected = if inside { 255 } else { 0 };
            assert_eq!(pixel.0, [expected, expected, expected, 255], "({}, {})", x, y);
        }
    }

    #[test]
    fn circle_skips_box_corners() {
        let genome = Genome::from(vec![shape(
            ShapeKind::Circle,
            10,
            10,
            5,
            Color::new(255, 0, 0, 255),
        )]);
        let canvas = render(&genome, 20, 20, Color::opaque(0, 0, 0));
        assert_eq!(canvas.get_pixel(10, 10).0, [255, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(5, 10).0, [255, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(5, 5).0, [0, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(14, 14).0, [0, 0, 0, 255]);
    }

    #[test]
    fn blend_divides_after_weighted_sum() {
        // (200 * 100 + 50 * 155) / 255 = 27750 / 255 = 108
        let genome = Genome::from(vec![shape(
            ShapeKind::Rectangle,
            1,
            1,
            1,
            Color::new(200, 200, 200, 100),
        )]);
        let canvas = render(&genome, 2, 2, Color::opaque(50, 50, 50));
        assert_eq!(canvas.get_pixel(0, 0).0, [108, 108, 108, 255]);
    }

    #[test]
    fn shape_outside_canvas_changes_nothing() {
        let background = Color::opaque(40, 80, 120);
        let outside = Genome::from(vec![
            shape(ShapeKind::Circle, -20, -20, 5, Color::new(255, 0, 0, 255)),
            shape(ShapeKind::Circle, 50, 5, 5, Color::new(255, 0, 0, 255)),
        ]);
        assert_eq!(
            render(&outside, 30, 30, background),
            render(&Genome::new(), 30, 30, background)
        );
    }

    #[test]
    fn degenerate_and_huge_sizes_are_safe() {
        let background = Color::opaque(0, 0, 0);
        let genome = Genome::from(vec![
            shape(ShapeKind::Circle, 5, 5, 0, Color::new(255, 0, 0, 255)),
            shape(ShapeKind::Rectangle, 5, 5, -3, Color::new(255, 0, 0, 255)),
        ]);
        assert_eq!(
            render(&genome, 10, 10, background),
            render(&Genome::new(), 10, 10, background)
        );

        let huge = Genome::from(vec![shape(
            ShapeKind::Circle,
            i32::MAX,
            i32::MIN,
            i32::MAX,
            Color::new(255, 255, 255, 255),
        )]);
        render(&huge, 10, 10, background);
    }

    #[test]
    fn overlap_order_matters() {
        let red = shape(ShapeKind::Rectangle, 5, 5, 4, Color::new(255, 0, 0, 128));
        let blue = shape(ShapeKind::Circle, 6, 6, 4, Color::new(0, 0, 255, 128));
        let background = Color::opaque(255, 255, 255);
        let forward = render(&Genome::from(vec![red, blue]), 12, 12, background);
        let backward = render(&Genome::from(vec![blue, red]), 12, 12, background);
        assert_ne!(forward, backward);
    }

    #[test]
    fn average_of_solid_image_is_that_color() {
        let image = RgbaImage::from_pixel(7, 5, Rgba([12, 34, 56, 78]));
        assert_eq!(average_color(&image), Color::opaque(12, 34, 56));
        assert_eq!(average_color(&RgbaImage::new(0, 0)), Color::opaque(0, 0, 0));
    }

    fn arb_shape() -> impl Strategy<Value = Shape> {
        (
            any::<bool>(),
            -10i32..40,
            -10i32..40,
            -2i32..25,
            any::<[u8; 4]>(),
        )
            .prop_map(|(circle, x, y, size, [r, g, b, a])| Shape {
                kind: if circle {
                    ShapeKind::Circle
                } else {
                    ShapeKind::Rectangle
                },
                x,
                y,
                size,
                color: Color::new(r, g, b, a),
            })
    }

    proptest! {
        #[test]
        fn rendering_is_deterministic(shapes in prop::collection::vec(arb_shape(), 0..12)) {
            let genome = Genome::from(shapes);
            let background = Color::opaque(90, 90, 90);
            let first = render(&genome, 32, 24, background);
            let mut second = RgbaImage::new(32, 24);
            render_into(&genome, &mut second, background);
            prop_assert_eq!(first.as_raw(), second.as_raw());
            prop_assert!(first.pixels().all(|p| p.0[3] == 255));
        }
    }
}
