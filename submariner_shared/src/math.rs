//! Math types.
//!
//! World geometry uses integer units so that player positions, tiles, and
//! colliders compare exactly.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle anchored at its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let (x, y) = (i64::from(x), i64::from(y));
        let (left, top) = (i64::from(self.x), i64::from(self.y));
        x >= left && y >= top && x < left + i64::from(self.w) && y < top + i64::from(self.h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_contains_is_half_open() {
        let r = Rect::new(0, 0, 10, 5);
        assert!(r.contains(0, 0));
        assert!(r.contains(9, 4));
        assert!(!r.contains(10, 4));
        assert!(!r.contains(9, 5));
        assert!(!r.contains(-1, 0));
    }

    #[test]
    fn rect_at_the_edge_of_i32_does_not_overflow() {
        let r = Rect::new(i32::MAX - 1, i32::MAX - 1, 10, 10);
        assert!(r.contains(i32::MAX, i32::MAX));
        assert!(!r.contains(0, 0));
    }

    #[test]
    fn zero_rect_contains_nothing() {
        assert!(!Rect::default().contains(0, 0));
    }
}
