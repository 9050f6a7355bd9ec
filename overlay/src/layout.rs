//! Screen placement of message bubbles. Every anchor keeps its own stack, in arrival order.

use shared::geometry::Rect;
use shared::overlay::MessageAnchor;

/// Distance between a stack and the edges of the frame.
pub const SCREEN_MARGIN: i32 = 20;

/// Vertical gap between two bubbles of the same stack.
pub const STACK_SPACING: i32 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Clone, Copy)]
enum Column {
    Left,
    Center,
    Right,
}

#[derive(Clone, Copy)]
enum Row {
    Top,
    Middle,
    Bottom,
}

fn split(anchor: MessageAnchor) -> (Column, Row) {
    match anchor.resolve() {
        MessageAnchor::TopLeft => (Column::Left, Row::Top),
        MessageAnchor::TopCenter => (Column::Center, Row::Top),
        MessageAnchor::MiddleLeft => (Column::Left, Row::Middle),
        MessageAnchor::MiddleCenter => (Column::Center, Row::Middle),
        MessageAnchor::MiddleRight => (Column::Right, Row::Middle),
        MessageAnchor::BottomLeft => (Column::Left, Row::Bottom),
        MessageAnchor::BottomCenter => (Column::Center, Row::Bottom),
        MessageAnchor::BottomRight => (Column::Right, Row::Bottom),
        MessageAnchor::TopRight | MessageAnchor::Auto => (Column::Right, Row::Top),
    }
}

fn x_for(column: Column, viewport: Size, width: i32) -> i32 {
    let vw = viewport.width as i32;
    match column {
        Column::Left => SCREEN_MARGIN,
        Column::Center => (vw - width) / 2,
        Column::Right => vw - SCREEN_MARGIN - width,
    }
}

/// Places `items` in a frame of `viewport` pixels. The result is parallel to `items`.
///
/// Top stacks grow downwards, bottom stacks upwards (the first item nearest the edge), and middle
/// stacks are centered as a group.
pub fn place(viewport: Size, items: &[(MessageAnchor, Size)]) -> Vec<Rect> {
    let mut out = vec![Rect::default(); items.len()];
    for anchor in [
        MessageAnchor::TopLeft,
        MessageAnchor::TopCenter,
        MessageAnchor::TopRight,
        MessageAnchor::MiddleLeft,
        MessageAnchor::MiddleCenter,
        MessageAnchor::MiddleRight,
        MessageAnchor::BottomLeft,
        MessageAnchor::BottomCenter,
        MessageAnchor::BottomRight,
    ] {
        let members: Vec<usize> = (0..items.len()).filter(|&i| items[i].0.resolve() == anchor).collect();
        if members.is_empty() {
            continue;
        }
        let (column, row) = split(anchor);
        let total: i32 = members.iter().map(|&i| items[i].1.height as i32).sum::<i32>()
            + STACK_SPACING * (members.len() as i32 - 1);

        let vh = viewport.height as i32;
        let mut y = match row {
            Row::Top => SCREEN_MARGIN,
            Row::Middle => (vh - total) / 2,
            Row::Bottom => vh - SCREEN_MARGIN,
        };
        for &i in &members {
            let (w, h) = (items[i].1.width as i32, items[i].1.height as i32);
            let x = x_for(column, viewport, w);
            out[i] = match row {
                Row::Bottom => {
                    y -= h;
                    let r = Rect::from_xywh(x, y, w, h);
                    y -= STACK_SPACING;
                    r
                }
                Row::Top | Row::Middle => {
                    let r = Rect::from_xywh(x, y, w, h);
                    y += h + STACK_SPACING;
                    r
                }
            };
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEW: Size = Size::new(1280, 720);

    #[test]
    fn auto_stacks_top_right() {
        let rects = place(
            VIEW,
            &[(MessageAnchor::Auto, Size::new(200, 50)), (MessageAnchor::TopRight, Size::new(100, 40))],
        );
        assert_eq!(rects[0], Rect::from_xywh(1280 - 20 - 200, 20, 200, 50));
        assert_eq!(rects[1], Rect::from_xywh(1280 - 20 - 100, 20 + 50 + 10, 100, 40));
    }

    #[test]
    fn bottom_stacks_grow_upwards() {
        let rects = place(
            VIEW,
            &[
                (MessageAnchor::BottomLeft, Size::new(300, 60)),
                (MessageAnchor::BottomLeft, Size::new(300, 60)),
            ],
        );
        assert_eq!(rects[0], Rect::from_xywh(20, 720 - 20 - 60, 300, 60));
        assert_eq!(rects[1].bottom, rects[0].top - STACK_SPACING);
    }

    #[test]
    fn middle_center_is_centered_as_group() {
        let rects = place(
            VIEW,
            &[
                (MessageAnchor::MiddleCenter, Size::new(400, 100)),
                (MessageAnchor::MiddleCenter, Size::new(200, 100)),
            ],
        );
        assert_eq!(rects[0].top, (720 - 210) / 2);
        assert_eq!(rects[0].left, (1280 - 400) / 2);
        assert_eq!(rects[1].left, (1280 - 200) / 2);
        assert_eq!(rects[1].bottom, (720 - 210) / 2 + 210);
    }

    #[test]
    fn stacks_are_independent() {
        let rects = place(
            VIEW,
            &[
                (MessageAnchor::TopLeft, Size::new(100, 30)),
                (MessageAnchor::TopRight, Size::new(100, 30)),
                (MessageAnchor::TopLeft, Size::new(100, 30)),
            ],
        );
        assert_eq!(rects[0].top, 20);
        assert_eq!(rects[1].top, 20);
        assert_eq!(rects[2].top, 60);
    }
}
