//! Draws the visible messages of one frame into positioned bubble sprites.

use crate::board::VisibleMessage;
use crate::canvas::{Canvas, RectF};
use crate::layout::{self, Size};
use crate::text::{GlyphMask, GlyphRasterizer};
use shared::geometry::Rect;
use shared::overlay::{MessagePriority, OverlaySettings};
use std::collections::HashMap;

const PADDING_X: u32 = 25;
const PADDING_Y: u32 = 18;
const CORNER_RADIUS: f32 = 15.0;
const GLOW_SPREAD: f32 = 3.0;
const BORDER_WIDTH: f32 = 2.0;
const SHADOW_OFFSET: i32 = 2;

/// One bubble ready to be composited at `rect` (frame coordinates).
#[derive(Debug, Clone)]
pub struct Sprite {
    pub rect: Rect,
    pub canvas: Canvas,
}

/// Owns the rasterizer and a per-message cache of rasterized text.
pub struct Painter<R> {
    rasterizer: R,
    glyphs: HashMap<u64, GlyphMask>,
}

impl<R: GlyphRasterizer> Painter<R> {
    pub fn new(rasterizer: R) -> Self {
        Self { rasterizer, glyphs: HashMap::new() }
    }

    /// Number of cached text masks.
    pub fn cached(&self) -> usize {
        self.glyphs.len()
    }

    /// Paints `visible` for a frame of `viewport` pixels. Messages are stacked by anchor in the
    /// order given; text masks of messages no longer visible are dropped from the cache.
    pub fn paint(&mut self, visible: &[VisibleMessage], settings: &OverlaySettings, viewport: Size) -> Vec<Sprite> {
        self.glyphs.retain(|id, _| visible.iter().any(|v| v.id == *id));
        if viewport.is_empty() || visible.is_empty() {
            return Vec::new();
        }

        let margin = GLOW_SPREAD.ceil() as u32;
        let mut items = Vec::with_capacity(visible.len());
        for v in visible {
            let rasterizer = &mut self.rasterizer;
            let mask = self.glyphs.entry(v.id).or_insert_with(|| rasterizer.rasterize(&v.text));
            let size = Size::new(
                mask.width + 2 * (PADDING_X + margin),
                mask.height + 2 * (PADDING_Y + margin),
            );
            items.push((v.anchor, size));
        }

        let rects = layout::place(viewport, &items);
        let palette = settings.theme.palette();
        let opacity = settings.transparency();

        visible
            .iter()
            .zip(rects)
            .map(|(v, rect)| {
                let mut canvas = Canvas::new(rect.width() as u32, rect.height() as u32);
                let bubble = RectF::new(0.0, 0.0, rect.width() as f32, rect.height() as f32).inset(margin as f32);
                let border_color = v.accent.unwrap_or(palette.border);
                let border_width = if v.priority == MessagePriority::Critical {
                    BORDER_WIDTH * 2.0
                } else {
                    BORDER_WIDTH
                };

                canvas.glow_rounded_rect(bubble, CORNER_RADIUS, GLOW_SPREAD, palette.glow.faded(v.alpha * opacity));
                canvas.fill_rounded_rect(bubble, CORNER_RADIUS, palette.background.faded(v.alpha * opacity));
                canvas.stroke_rounded_rect(bubble, CORNER_RADIUS, border_width, border_color.faded(v.alpha));

                if let Some(mask) = self.glyphs.get(&v.id) {
                    let tx = (margin + PADDING_X) as i32;
                    let ty = (margin + PADDING_Y) as i32;
                    canvas.draw_mask(tx + SHADOW_OFFSET, ty + SHADOW_OFFSET, mask, palette.shadow.faded(v.alpha));
                    canvas.draw_mask(tx, ty, mask, palette.text.faded(v.alpha));
                }
                Sprite { rect, canvas }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::BlockGlyphs;
    use shared::overlay::{MessageAnchor, MessageCategory, Theme};

    struct Counting {
        calls: usize,
    }

    impl GlyphRasterizer for Counting {
        fn rasterize(&mut self, text: &str) -> GlyphMask {
            self.calls += 1;
            BlockGlyphs.rasterize(text)
        }
    }

    fn visible(id: u64, text: &str, alpha: f32) -> VisibleMessage {
        VisibleMessage {
            id,
            text: text.into(),
            anchor: MessageAnchor::Auto,
            accent: None,
            priority: MessagePriority::Normal,
            alpha,
        }
    }

    #[test]
    fn bubble_size_wraps_text() {
        let mut painter = Painter::new(BlockGlyphs);
        let sprites = painter.paint(&[visible(1, "hello", 1.0)], &OverlaySettings::default(), Size::new(1280, 720));
        assert_eq!(sprites.len(), 1);
        let r = sprites[0].rect;
        // 5 cells of 8 px, plus padding and glow margin on both sides.
        assert_eq!(r.width(), 40 + 2 * (25 + 3));
        assert_eq!(r.height(), 16 + 2 * (18 + 3));
        assert_eq!(r.right, 1280 - 20);
        assert_eq!(r.top, 20);
    }

    #[test]
    fn text_is_rasterized_once_per_message() {
        let mut painter = Painter::new(Counting { calls: 0 });
        let settings = OverlaySettings::default();
        let view = Size::new(800, 600);
        painter.paint(&[visible(1, "a", 1.0)], &settings, view);
        painter.paint(&[visible(1, "a", 0.5), visible(2, "b", 1.0)], &settings, view);
        assert_eq!(painter.rasterizer.calls, 2);
        painter.paint(&[visible(2, "b", 1.0)], &settings, view);
        assert_eq!(painter.cached(), 1);
    }

    #[test]
    fn fading_message_is_fainter() {
        let mut painter = Painter::new(BlockGlyphs);
        let mut settings = OverlaySettings::default();
        settings.theme = Theme::Slippi;
        let view = Size::new(800, 600);
        let full = painter.paint(&[visible(1, "x", 1.0)], &settings, view);
        let half = painter.paint(&[visible(1, "x", 0.5)], &settings, view);
        let (cx, cy) = (full[0].canvas.width() / 2, full[0].canvas.height() / 2);
        assert!(half[0].canvas.pixel(cx, cy)[3] < full[0].canvas.pixel(cx, cy)[3]);
    }

    #[test]
    fn category_accent_colors_the_border() {
        let mut painter = Painter::new(BlockGlyphs);
        let mut msg = visible(1, "combo", 1.0);
        msg.accent = MessageCategory::Combo.accent();
        let sprites = painter.paint(&[msg], &OverlaySettings::default(), Size::new(800, 600));
        let canvas = &sprites[0].canvas;
        // Middle of the top border row, just inside the glow margin.
        let [b, g, r, a] = canvas.pixel(canvas.width() / 2, 3);
        assert_eq!(a, 255);
        assert_eq!((r, g, b), (245, 146, 27));
    }

    #[test]
    fn nothing_to_paint_in_empty_viewport() {
        let mut painter = Painter::new(BlockGlyphs);
        assert!(painter.paint(&[visible(1, "x", 1.0)], &OverlaySettings::default(), Size::new(0, 0)).is_empty());
    }
}
