/// Pixel rectangle with a bottom-left origin.
///
/// `top` is normally greater than `bottom`. A rectangle with `top < bottom`
/// describes the same area read upside down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Rect {
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Rectangle anchored at the origin.
    pub const fn from_extent(width: u32, height: u32) -> Self {
        Self::new(0, height, width, 0)
    }

    pub const fn width(&self) -> u32 {
        self.right.abs_diff(self.left)
    }

    pub const fn height(&self) -> u32 {
        self.top.abs_diff(self.bottom)
    }

    pub const fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub const fn is_flipped(&self) -> bool {
        self.top < self.bottom
    }

    pub const fn scale(&self, factor: u32) -> Self {
        Self::new(
            self.left * factor,
            self.top * factor,
            self.right * factor,
            self.bottom * factor,
        )
    }

    /// Lowest row covered, regardless of orientation.
    pub const fn min_y(&self) -> u32 {
        if self.is_flipped() {
            self.top
        } else {
            self.bottom
        }
    }

    pub fn flip_vertically(&mut self) {
        core::mem::swap(&mut self.top, &mut self.bottom);
    }

    /// Overlap of two upright rectangles; empty when they are disjoint.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let left = self.left.max(other.left);
        let bottom = self.bottom.max(other.bottom);
        Rect::new(
            left,
            self.top.min(other.top).max(bottom),
            self.right.min(other.right).max(left),
            bottom,
        )
    }
}
