// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Simple data types
//!
//! Positions and rectangles are in font design units (`f32`). A scale factor
//! may be applied at the very end of positioning (see [`crate::Font`]); all
//! shaping arithmetic before that point happens in design space.

/// 2D point or vector in font design units
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    /// Zero
    pub const ZERO: Position = Position { x: 0.0, y: 0.0 };

    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Position { x, y }
    }
}

impl std::ops::Add for Position {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Position::new(self.x + other.x, self.y + other.y)
    }
}

impl std::ops::AddAssign for Position {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl std::ops::Sub for Position {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Position::new(self.x - other.x, self.y - other.y)
    }
}

impl std::ops::Mul<f32> for Position {
    type Output = Self;

    #[inline]
    fn mul(self, scale: f32) -> Self {
        Position::new(self.x * scale, self.y * scale)
    }
}

impl std::ops::MulAssign<f32> for Position {
    #[inline]
    fn mul_assign(&mut self, scale: f32) {
        self.x *= scale;
        self.y *= scale;
    }
}

/// Axis-aligned rectangle: bottom-left and top-right corners
///
/// Glyph bounding boxes use the font's y-up convention: `bl.y` is the lowest
/// point of the outline, `tr.y` the highest.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub bl: Position,
    pub tr: Position,
}

impl Rect {
    #[inline]
    pub fn new(bl: Position, tr: Position) -> Self {
        Rect { bl, tr }
    }

    /// The smallest rectangle containing both `self` and `other`
    pub fn widen(self, other: Rect) -> Rect {
        Rect {
            bl: Position::new(self.bl.x.min(other.bl.x), self.bl.y.min(other.bl.y)),
            tr: Position::new(self.tr.x.max(other.tr.x), self.tr.y.max(other.tr.y)),
        }
    }

    /// True if the interiors intersect
    pub fn intersects(&self, other: &Rect) -> bool {
        self.bl.x < other.tr.x
            && other.bl.x < self.tr.x
            && self.bl.y < other.tr.y
            && other.bl.y < self.tr.y
    }

    pub fn width(&self) -> f32 {
        self.tr.x - self.bl.x
    }

    pub fn height(&self) -> f32 {
        self.tr.y - self.bl.y
    }
}

impl std::ops::Add<Position> for Rect {
    type Output = Self;

    #[inline]
    fn add(self, offset: Position) -> Self {
        Rect::new(self.bl + offset, self.tr + offset)
    }
}

impl std::ops::Mul<f32> for Rect {
    type Output = Self;

    #[inline]
    fn mul(self, scale: f32) -> Self {
        Rect::new(self.bl * scale, self.tr * scale)
    }
}

/// A type-safe wrapper for glyph ID.
#[repr(transparent)]
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Default, Debug)]
pub struct GlyphId(pub u16);

impl From<GlyphId> for ttf_parser::GlyphId {
    fn from(id: GlyphId) -> Self {
        ttf_parser::GlyphId(id.0)
    }
}

/// Reading direction of a text run
///
/// Graphite shaping is per-script: the caller resolves bidi runs and passes
/// the reading direction of each run. When [`Direction::Rtl`] is combined
/// with a bidi-enabled shape call, the font's own bidi pass reverses and
/// mirrors slots.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub enum Direction {
    /// Left-to-Right (default)
    #[default]
    Ltr,
    /// Right-to-Left
    Rtl,
}

impl Direction {
    #[inline]
    pub fn is_rtl(self) -> bool {
        self == Direction::Rtl
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rect_widen() {
        let a = Rect::new(Position::new(0.0, 0.0), Position::new(10.0, 5.0));
        let b = Rect::new(Position::new(-2.0, 1.0), Position::new(4.0, 9.0));
        let w = a.widen(b);
        assert_eq!(w.bl, Position::new(-2.0, 0.0));
        assert_eq!(w.tr, Position::new(10.0, 9.0));
    }

    #[test]
    fn rect_intersects() {
        let a = Rect::new(Position::new(0.0, 0.0), Position::new(10.0, 10.0));
        let b = Rect::new(Position::new(9.0, 9.0), Position::new(12.0, 12.0));
        let c = Rect::new(Position::new(10.0, 0.0), Position::new(12.0, 10.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}
