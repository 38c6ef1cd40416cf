//! Rectangle sets
//!
//! [`Region`] is the small region algebra behind surface damage and the
//! client-created region objects. It stores disjoint rectangles, so iterating
//! a region never visits the same pixel twice.
//!
//! # Example
//!
//! ```
//! use tessera::region::{Rectangle, Region};
//!
//! let mut region = Region::new();
//! region.union(Rectangle::new(0, 0, 100, 100));
//! region.subtract(Rectangle::new(0, 0, 50, 100));
//!
//! assert_eq!(region.rects(), &[Rectangle::new(50, 0, 50, 100)]);
//! assert_eq!(region.area(), 5000);
//! ```

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in surface-local pixel coordinates
///
/// Width and height keep the signed wire representation; a non-positive
/// extent is simply an empty rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rectangle {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Creates a rectangle from its top-left and bottom-right (exclusive) corners
    ///
    /// Inverted corners give an empty rectangle; spans wider than `i32::MAX`
    /// are clamped.
    pub fn from_corners(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        if x2 <= x1 || y2 <= y1 {
            return Self::new(x1, y1, 0, 0);
        }
        let span = |lo: i32, hi: i32| (i64::from(hi) - i64::from(lo)).min(i64::from(i32::MAX)) as i32;
        Self::new(x1, y1, span(x1, x2), span(y1, y2))
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn area(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.width as u64 * self.height as u64
        }
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        !self.is_empty()
            && x >= self.x as f64
            && y >= self.y as f64
            && x < self.right() as f64
            && y < self.bottom() as f64
    }

    pub fn intersection(&self, other: &Rectangle) -> Option<Rectangle> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        let rect = Rectangle::from_corners(x1, y1, x2, y2);
        (!rect.is_empty()).then_some(rect)
    }

    /// Parts of `self` not covered by `other`: at most four rectangles
    /// (a band above, a band below, and the left/right pieces in between).
    pub fn difference(&self, other: &Rectangle) -> Vec<Rectangle> {
        if self.is_empty() {
            return Vec::new();
        }
        let Some(cut) = self.intersection(other) else {
            return vec![*self];
        };

        let pieces = [
            Rectangle::from_corners(self.x, self.y, self.right(), cut.y),
            Rectangle::from_corners(self.x, cut.bottom(), self.right(), self.bottom()),
            Rectangle::from_corners(self.x, cut.y, cut.x, cut.bottom()),
            Rectangle::from_corners(cut.right(), cut.y, self.right(), cut.bottom()),
        ];
        pieces.into_iter().filter(|r| !r.is_empty()).collect()
    }
}

/// A set of pixels represented as disjoint rectangles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    rects: Vec<Rectangle>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Rectangle) -> Self {
        let mut region = Self::new();
        region.union(rect);
        region
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn rects(&self) -> &[Rectangle] {
        &self.rects
    }

    /// Adds `rect`; only the parts not already covered are stored
    pub fn union(&mut self, rect: Rectangle) {
        if rect.is_empty() {
            return;
        }
        let mut fresh = vec![rect];
        for existing in &self.rects {
            fresh = fresh.iter().flat_map(|piece| piece.difference(existing)).collect();
            if fresh.is_empty() {
                return;
            }
        }
        self.rects.extend(fresh);
    }

    /// Removes `rect` from the region
    pub fn subtract(&mut self, rect: Rectangle) {
        if rect.is_empty() || self.rects.is_empty() {
            return;
        }
        self.rects = self
            .rects
            .iter()
            .flat_map(|existing| existing.difference(&rect))
            .collect();
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.rects.iter().any(|r| r.contains_point(x, y))
    }

    pub fn area(&self) -> u64 {
        self.rects.iter().map(Rectangle::area).sum()
    }

    /// Smallest rectangle covering the whole region
    pub fn extents(&self) -> Option<Rectangle> {
        let first = self.rects.first()?;
        let (mut x1, mut y1, mut x2, mut y2) = (first.x, first.y, first.right(), first.bottom());
        for r in &self.rects[1..] {
            x1 = x1.min(r.x);
            y1 = y1.min(r.y);
            x2 = x2.max(r.right());
            y2 = y2.max(r.bottom());
        }
        Some(Rectangle::from_corners(x1, y1, x2, y2))
    }
}
