/// Screen or client rectangle in pixels, edges exclusive on the right/bottom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub const fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { left: x, top: y, right: x + width, bottom: y + height }
    }

    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub const fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions() {
        let r = Rect::from_xywh(10, 20, 300, 200);
        assert_eq!(r, Rect::new(10, 20, 310, 220));
        assert_eq!((r.width(), r.height()), (300, 200));
        assert!(!r.is_empty());
        assert!(Rect::new(5, 5, 5, 50).is_empty());
        assert!(Rect::default().is_empty());
    }
}
