//! CPU compositor for message bubbles.
//!
//! A [`Canvas`] holds premultiplied BGRA pixels. Shapes are anti-aliased with a signed distance to
//! a rounded rectangle; text arrives as coverage masks from a [`GlyphRasterizer`].
//!
//! [`GlyphRasterizer`]: crate::text::GlyphRasterizer

use crate::text::GlyphMask;
use shared::overlay::Color;

/// Channel order of a destination surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOrder {
    Bgra,
    Rgba,
}

/// Axis-aligned rectangle in fractional pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectF {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RectF {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn inset(&self, by: f32) -> Self {
        Self::new(self.x + by, self.y + by, self.width - 2.0 * by, self.height - 2.0 * by)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<[u8; 4]>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, pixels: vec![[0; 4]; width as usize * height as usize] }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn clear(&mut self) {
        self.pixels.fill([0; 4]);
    }

    /// Premultiplied BGRA at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Rows of premultiplied BGRA, top-down, tightly packed.
    pub fn as_bytes(&self) -> &[u8] {
        self.pixels.as_flattened()
    }

    /// Source-over of `color` scaled by `coverage`.
    pub fn blend(&mut self, x: u32, y: u32, color: Color, coverage: f32) {
        if x >= self.width || y >= self.height {
            return;
        }
        let a = color.a as f32 / 255.0 * coverage.clamp(0.0, 1.0);
        if a <= 0.0 {
            return;
        }
        let src = [color.b as f32 * a, color.g as f32 * a, color.r as f32 * a, 255.0 * a];
        let px = &mut self.pixels[(y * self.width + x) as usize];
        for (d, s) in px.iter_mut().zip(src) {
            *d = (s + *d as f32 * (1.0 - a)).round().min(255.0) as u8;
        }
    }

    pub fn fill_rounded_rect(&mut self, rect: RectF, radius: f32, color: Color) {
        self.shade(rect, 1.0, |x, y| (0.5 - rounded_rect_distance(rect, radius, x, y)).clamp(0.0, 1.0), color);
    }

    /// Strokes a band of `width` pixels lying just inside the outline of `rect`.
    pub fn stroke_rounded_rect(&mut self, rect: RectF, radius: f32, width: f32, color: Color) {
        let half = width / 2.0;
        self.shade(rect, 1.0, |x, y| {
            let d = rounded_rect_distance(rect, radius, x, y);
            (0.5 + half - (d + half).abs()).clamp(0.0, 1.0)
        }, color);
    }

    /// Soft halo of `spread` pixels outside the outline of `rect`, fading outwards.
    pub fn glow_rounded_rect(&mut self, rect: RectF, radius: f32, spread: f32, color: Color) {
        if spread <= 0.0 {
            return;
        }
        self.shade(rect, spread + 1.0, |x, y| {
            let d = rounded_rect_distance(rect, radius, x, y);
            if d <= 0.0 { 0.0 } else { (1.0 - d / spread).clamp(0.0, 1.0) }
        }, color);
    }

    /// Paints `mask` with its top-left corner at `(x, y)`.
    pub fn draw_mask(&mut self, x: i32, y: i32, mask: &GlyphMask, color: Color) {
        for my in 0..mask.height {
            for mx in 0..mask.width {
                let coverage = mask.coverage(mx, my);
                if coverage == 0 {
                    continue;
                }
                let (px, py) = (x + mx as i32, y + my as i32);
                if px < 0 || py < 0 {
                    continue;
                }
                self.blend(px as u32, py as u32, color, coverage as f32 / 255.0);
            }
        }
    }

    /// Source-over of this canvas onto a surface of `dst_width` x `dst_height` pixels whose rows
    /// are `dst_pitch` bytes apart, with this canvas's top-left at `(x, y)`. Parts outside the
    /// surface are clipped.
    pub fn composite_onto(
        &self,
        dst: &mut [u8],
        dst_pitch: usize,
        dst_width: u32,
        dst_height: u32,
        x: i32,
        y: i32,
        order: PixelOrder,
    ) {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + self.width as i32).min(dst_width as i32);
        let y1 = (y + self.height as i32).min(dst_height as i32);
        for dy in y0..y1 {
            let row = dy as usize * dst_pitch;
            for dx in x0..x1 {
                let [b, g, r, a] = self.pixel((dx - x) as u32, (dy - y) as u32);
                if a == 0 {
                    continue;
                }
                let offset = row + dx as usize * 4;
                let Some(d) = dst.get_mut(offset..offset + 4) else {
                    continue;
                };
                let src = match order {
                    PixelOrder::Bgra => [b, g, r, a],
                    PixelOrder::Rgba => [r, g, b, a],
                };
                let inv = 255 - a as u32;
                for (dc, sc) in d.iter_mut().zip(src) {
                    *dc = (sc as u32 + (*dc as u32 * inv + 127) / 255).min(255) as u8;
                }
            }
        }
    }

    fn shade(&mut self, rect: RectF, grow: f32, coverage: impl Fn(f32, f32) -> f32, color: Color) {
        let left = (rect.x - grow).floor().max(0.0) as u32;
        let top = (rect.y - grow).floor().max(0.0) as u32;
        let right = ((rect.x + rect.width + grow).ceil().max(0.0) as u32).min(self.width);
        let bottom = ((rect.y + rect.height + grow).ceil().max(0.0) as u32).min(self.height);
        for y in top..bottom {
            for x in left..right {
                let c = coverage(x as f32 + 0.5, y as f32 + 0.5);
                if c > 0.0 {
                    self.blend(x, y, color, c);
                }
            }
        }
    }
}

/// Signed distance from `(px, py)` to the outline of a rounded rectangle; negative inside.
fn rounded_rect_distance(rect: RectF, radius: f32, px: f32, py: f32) -> f32 {
    let hw = rect.width / 2.0;
    let hh = rect.height / 2.0;
    let r = radius.clamp(0.0, hw.min(hh).max(0.0));
    let qx = (px - (rect.x + hw)).abs() - (hw - r);
    let qy = (py - (rect.y + hh)).abs() - (hh - r);
    let outside = qx.max(0.0).hypot(qy.max(0.0));
    outside + qx.max(qy).min(0.0) - r
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Color = Color::rgb(255, 255, 255);

    #[test]
    fn fill_covers_center_and_spares_corners() {
        let mut c = Canvas::new(40, 20);
        c.fill_rounded_rect(RectF::new(0.0, 0.0, 40.0, 20.0), 8.0, Color::rgb(10, 20, 30));
        assert_eq!(c.pixel(20, 10), [30, 20, 10, 255]);
        assert_eq!(c.pixel(0, 0), [0, 0, 0, 0]);
        assert_eq!(c.pixel(39, 19), [0, 0, 0, 0]);
        assert_eq!(c.pixel(20, 0)[3], 255);
    }

    #[test]
    fn translucent_fill_is_premultiplied() {
        let mut c = Canvas::new(4, 4);
        c.fill_rounded_rect(RectF::new(0.0, 0.0, 4.0, 4.0), 0.0, Color::rgba(200, 100, 0, 128));
        let [b, g, r, a] = c.pixel(1, 1);
        assert_eq!(a, 128);
        assert_eq!((b, g, r), (0, 50, 100));
    }

    #[test]
    fn stroke_leaves_interior_empty() {
        let mut c = Canvas::new(30, 30);
        c.stroke_rounded_rect(RectF::new(0.0, 0.0, 30.0, 30.0), 4.0, 2.0, WHITE);
        assert_eq!(c.pixel(15, 0)[3], 255);
        assert_eq!(c.pixel(15, 1)[3], 255);
        assert_eq!(c.pixel(15, 15)[3], 0);
    }

    #[test]
    fn glow_is_outside_only() {
        let mut c = Canvas::new(30, 30);
        c.glow_rounded_rect(RectF::new(5.0, 5.0, 20.0, 20.0), 3.0, 4.0, WHITE);
        assert_eq!(c.pixel(15, 15)[3], 0);
        assert!(c.pixel(15, 3)[3] > 0);
        assert!(c.pixel(15, 3)[3] > c.pixel(15, 1)[3]);
    }

    #[test]
    fn mask_is_clipped_to_canvas() {
        let mut c = Canvas::new(4, 4);
        let mask = GlyphMask::new(3, 3, vec![255; 9]);
        c.draw_mask(-1, 2, &mask, WHITE);
        assert_eq!(c.pixel(0, 2), [255, 255, 255, 255]);
        assert_eq!(c.pixel(1, 3), [255, 255, 255, 255]);
        assert_eq!(c.pixel(2, 2), [0, 0, 0, 0]);
    }

    #[test]
    fn composite_blends_and_swaps_channels() {
        let mut sprite = Canvas::new(2, 1);
        sprite.blend(0, 0, Color::rgb(255, 0, 0), 1.0);
        sprite.blend(1, 0, Color::rgba(0, 0, 255, 128), 1.0);

        // 3x1 opaque grey destination, RGBA order.
        let mut dst = vec![100u8, 100, 100, 255, 100, 100, 100, 255, 100, 100, 100, 255];
        sprite.composite_onto(&mut dst, 12, 3, 1, 1, 0, PixelOrder::Rgba);
        assert_eq!(&dst[0..4], &[100, 100, 100, 255]);
        assert_eq!(&dst[4..8], &[255, 0, 0, 255]);
        assert_eq!(&dst[8..12], &[50, 50, 178, 255]);
    }

    #[test]
    fn composite_clips_negative_origin() {
        let mut sprite = Canvas::new(2, 2);
        sprite.fill_rounded_rect(RectF::new(0.0, 0.0, 2.0, 2.0), 0.0, WHITE);
        let mut dst = vec![0u8; 2 * 2 * 4];
        sprite.composite_onto(&mut dst, 8, 2, 2, -1, -1, PixelOrder::Bgra);
        assert_eq!(&dst[0..4], &[255, 255, 255, 255]);
        assert_eq!(&dst[4..16], &[0; 12]);
    }
}
