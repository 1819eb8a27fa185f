// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Collision avoidance: mark shifting and cluster kerning
//!
//! The shift collider resolves an offending glyph along one of four axes
//! (horizontal, vertical and the two diagonals, giving eight shift
//! directions), picking the axis whose legal shift has the lowest cost.
//! The kern collider measures the overlap between a cluster and the glyphs
//! following it in banded slices of the vertical range and widens the
//! cluster's advance by the worst slice.

use crate::data::{Position, Rect};
use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CollisionFlags: u16 {
        /// This glyph is movable to fix collisions
        const FIX      = 0x0001;
        /// Ignore this glyph entirely
        const IGNORE   = 0x0002;
        /// Start of a collision scope
        const START    = 0x0004;
        /// End of a collision scope
        const END      = 0x0008;
        /// Fix by kerning rather than shifting
        const KERN     = 0x0010;
        /// Currently in collision
        const ISCOL    = 0x0020;
        /// Collision state has been computed
        const KNOWN    = 0x0040;
        /// Treated as white space by the kern collider
        const ISSPACE  = 0x0080;
        /// Locked against refinement during phase 2
        const TEMPLOCK = 0x0100;
    }
}

/// Per-slot collision state, allocated only for collision-using fonts
#[derive(Clone, Debug, Default)]
pub struct SlotCollision {
    flags: u16,
    limit: Rect,
    shift: Position,
    offset: Position,
    margin: i16,
    margin_wt: i16,
    excl_glyph: u16,
    excl_offset: Position,
    seq_class: u16,
    seq_prox_class: u16,
    seq_order: u16,
    seq_above_xoff: i16,
    seq_above_wt: i16,
    seq_below_xlim: i16,
    seq_below_wt: i16,
    seq_valign_ht: i16,
    seq_valign_wt: i16,
}

impl SlotCollision {
    /// Seed state from the glyph's collision attributes
    ///
    /// `attr` reads glyph attribute `a_collision + n`; the flags word is at
    /// `+0` and the limit rectangle at `+1..=4`.
    pub(crate) fn init(attr: impl Fn(u16) -> i16, is_space: bool) -> SlotCollision {
        let mut flags = attr(0) as u16;
        if is_space {
            flags |= CollisionFlags::ISSPACE.bits();
        }
        SlotCollision {
            flags,
            limit: Rect::new(
                Position::new(f32::from(attr(1)), f32::from(attr(2))),
                Position::new(f32::from(attr(3)), f32::from(attr(4))),
            ),
            ..Default::default()
        }
    }

    pub fn flags(&self) -> CollisionFlags {
        CollisionFlags::from_bits_retain(self.flags)
    }

    pub(crate) fn flags_raw(&self) -> u16 {
        self.flags
    }

    pub(crate) fn set_flags_raw(&mut self, flags: u16) {
        self.flags = flags;
    }

    pub(crate) fn clear_known(&mut self) {
        self.flags &= !CollisionFlags::KNOWN.bits();
    }

    pub fn ignore(&self) -> bool {
        self.flags().intersects(CollisionFlags::IGNORE)
    }

    pub fn limit(&self) -> Rect {
        self.limit
    }

    pub(crate) fn set_limit(&mut self, limit: Rect) {
        self.limit = limit;
    }

    /// Shift accumulated by the current collision pass
    pub fn shift(&self) -> Position {
        self.shift
    }

    pub(crate) fn set_shift(&mut self, shift: Position) {
        self.shift = shift;
    }

    /// Shift committed by previous collision passes
    pub fn offset(&self) -> Position {
        self.offset
    }

    pub(crate) fn set_offset(&mut self, offset: Position) {
        self.offset = offset;
    }

    pub fn margin(&self) -> i16 {
        self.margin
    }

    pub(crate) fn set_margin(&mut self, margin: i16) {
        self.margin = margin;
    }

    pub fn margin_wt(&self) -> i16 {
        self.margin_wt
    }

    pub(crate) fn set_margin_wt(&mut self, wt: i16) {
        self.margin_wt = wt;
    }

    pub(crate) fn excl_glyph(&self) -> u16 {
        self.excl_glyph
    }

    pub(crate) fn set_excl_glyph(&mut self, gid: u16) {
        self.excl_glyph = gid;
    }

    pub(crate) fn excl_offset(&self) -> Position {
        self.excl_offset
    }

    pub(crate) fn set_excl_offset(&mut self, off: Position) {
        self.excl_offset = off;
    }

    pub(crate) fn seq_class(&self) -> u16 {
        self.seq_class
    }

    pub(crate) fn set_seq_class(&mut self, v: u16) {
        self.seq_class = v;
    }

    pub(crate) fn seq_prox_class(&self) -> u16 {
        self.seq_prox_class
    }

    pub(crate) fn set_seq_prox_class(&mut self, v: u16) {
        self.seq_prox_class = v;
    }

    pub(crate) fn seq_order(&self) -> u16 {
        self.seq_order
    }

    pub(crate) fn set_seq_order(&mut self, v: u16) {
        self.seq_order = v;
    }

    pub(crate) fn seq_above_xoff(&self) -> i16 {
        self.seq_above_xoff
    }

    pub(crate) fn set_seq_above_xoff(&mut self, v: i16) {
        self.seq_above_xoff = v;
    }

    pub(crate) fn seq_above_wt(&self) -> i16 {
        self.seq_above_wt
    }

    pub(crate) fn set_seq_above_wt(&mut self, v: i16) {
        self.seq_above_wt = v;
    }

    pub(crate) fn seq_below_xlim(&self) -> i16 {
        self.seq_below_xlim
    }

    pub(crate) fn set_seq_below_xlim(&mut self, v: i16) {
        self.seq_below_xlim = v;
    }

    pub(crate) fn seq_below_wt(&self) -> i16 {
        self.seq_below_wt
    }

    pub(crate) fn set_seq_below_wt(&mut self, v: i16) {
        self.seq_below_wt = v;
    }

    pub(crate) fn seq_valign_ht(&self) -> i16 {
        self.seq_valign_ht
    }

    pub(crate) fn set_seq_valign_ht(&mut self, v: i16) {
        self.seq_valign_ht = v;
    }

    pub(crate) fn seq_valign_wt(&self) -> i16 {
        self.seq_valign_wt
    }

    pub(crate) fn set_seq_valign_wt(&mut self, v: i16) {
        self.seq_valign_wt = v;
    }
}

/// The four shift axes; diagonals move both coordinates together
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axis {
    X,
    Y,
    /// shift `(v, v)`
    Diag,
    /// shift `(v, -v)`
    AntiDiag,
}

const AXES: [Axis; 4] = [Axis::X, Axis::Y, Axis::Diag, Axis::AntiDiag];

impl Axis {
    fn vector(self, v: f32) -> Position {
        match self {
            Axis::X => Position::new(v, 0.0),
            Axis::Y => Position::new(0.0, v),
            Axis::Diag => Position::new(v, v),
            Axis::AntiDiag => Position::new(v, -v),
        }
    }
}

/// Merge a new forbidden interval into a sorted, disjoint interval list
fn add_interval(list: &mut Vec<(f32, f32)>, lo: f32, hi: f32) {
    if lo >= hi {
        return;
    }
    list.push((lo, hi));
}

/// True if `v` lies inside any interval
fn excluded(list: &[(f32, f32)], v: f32) -> bool {
    list.iter().any(|&(lo, hi)| v > lo && v < hi)
}

/// Forbidden interval of the 1-D overlap of `[b0, b1]` moving against the
/// fixed `[n0, n1]`: shifts in the open interval keep the ranges overlapping.
fn overlap_interval(b0: f32, b1: f32, n0: f32, n1: f32) -> (f32, f32) {
    (n0 - b1, n1 - b0)
}

/// Resolves one slot's shift against its neighborhood
pub(crate) struct ShiftCollider {
    /// Target bbox at its unshifted position
    target_box: Rect,
    /// Legal shift range per direction, from the slot's collision limit
    limit: Rect,
    margin: f32,
    margin_wt: f32,
    curr_shift: Position,
    exclusions: [Vec<(f32, f32)>; 4],
}

impl ShiftCollider {
    /// `target_box` is the glyph bbox translated to the slot's origin,
    /// without the shift currently being solved.
    pub(crate) fn new(
        target_box: Rect,
        limit: Rect,
        margin: f32,
        margin_wt: f32,
        curr_shift: Position,
    ) -> Self {
        ShiftCollider {
            target_box,
            limit,
            margin,
            margin_wt,
            curr_shift,
            exclusions: Default::default(),
        }
    }

    /// Record a neighbor's box; returns true if it overlaps the target at
    /// the current shift.
    pub(crate) fn merge_box(&mut self, nbor: Rect) -> bool {
        let b = self.target_box;
        let n = Rect::new(
            Position::new(nbor.bl.x - self.margin, nbor.bl.y - self.margin),
            Position::new(nbor.tr.x + self.margin, nbor.tr.y + self.margin),
        );
        let (fx0, fx1) = overlap_interval(b.bl.x, b.tr.x, n.bl.x, n.tr.x);
        let (fy0, fy1) = overlap_interval(b.bl.y, b.tr.y, n.bl.y, n.tr.y);

        // x axis: y coordinates are fixed, so exclusion applies only while
        // the boxes overlap vertically at the *current* y shift.
        if self.curr_shift.y > fy0 && self.curr_shift.y < fy1 {
            add_interval(&mut self.exclusions[0], fx0, fx1);
        }
        if self.curr_shift.x > fx0 && self.curr_shift.x < fx1 {
            add_interval(&mut self.exclusions[1], fy0, fy1);
        }
        // diagonal (v, v): both overlaps must persist
        add_interval(&mut self.exclusions[2], fx0.max(fy0), fx1.min(fy1));
        // anti-diagonal (v, -v): y interval flips sign
        add_interval(&mut self.exclusions[3], fx0.max(-fy1), fx1.min(-fy0));

        (self.target_box + self.curr_shift).intersects(&nbor)
    }

    fn axis_limit(&self, axis: Axis) -> (f32, f32) {
        let l = self.limit;
        match axis {
            Axis::X => (l.bl.x, l.tr.x),
            Axis::Y => (l.bl.y, l.tr.y),
            Axis::Diag => (l.bl.x.max(l.bl.y), l.tr.x.min(l.tr.y)),
            Axis::AntiDiag => (l.bl.x.max(-l.tr.y), l.tr.x.min(-l.bl.y)),
        }
    }

    /// Pick the lowest-cost legal shift
    ///
    /// Returns `None` when every axis is fully blocked; the caller marks the
    /// slot as still colliding.
    pub(crate) fn resolve(&self) -> Option<Position> {
        let mut best: Option<(f32, Position)> = None;
        for (i, axis) in AXES.iter().enumerate() {
            let (lo, hi) = self.axis_limit(*axis);
            if lo > hi {
                continue;
            }
            let list = &self.exclusions[i];
            let mut candidates: Vec<f32> = vec![0.0f32.clamp(lo, hi)];
            for &(a, b) in list.iter() {
                candidates.push(a);
                candidates.push(b);
            }
            for v in candidates {
                if v < lo || v > hi || excluded(list, v) {
                    continue;
                }
                let shift = axis.vector(v);
                let mut cost = shift.x * shift.x + shift.y * shift.y;
                // Penalize margin-grazing solutions: a candidate sitting on
                // an exclusion edge pays the margin weight.
                if list
                    .iter()
                    .any(|&(a, b)| (v - a).abs() < f32::EPSILON || (v - b).abs() < f32::EPSILON)
                {
                    cost += self.margin * self.margin_wt;
                }
                match best {
                    Some((c, p))
                        if c < cost
                            || (c == cost
                                && p.x * p.x + p.y * p.y <= shift.x * shift.x + shift.y * shift.y) => {}
                    _ => best = Some((cost, shift)),
                }
            }
        }
        best.map(|(_, p)| p)
    }
}

/// Number of vertical bands used when measuring kern overlap
const NUM_SLICES: usize = 8;

/// Measures the advance widening needed to separate a cluster from the
/// glyphs following it
pub(crate) struct KernCollider {
    /// Extreme trailing-edge x of the target cluster, per band
    edges: [f32; NUM_SLICES],
    y_min: f32,
    slice_height: f32,
    margin: f32,
    rtl: bool,
    needed: f32,
}

impl KernCollider {
    pub(crate) fn new(y_min: f32, y_max: f32, margin: f32, rtl: bool) -> Self {
        let span = (y_max - y_min).max(1.0);
        KernCollider {
            edges: [if rtl { f32::INFINITY } else { f32::NEG_INFINITY }; NUM_SLICES],
            y_min,
            slice_height: span / NUM_SLICES as f32,
            margin,
            rtl,
            needed: 0.0,
        }
    }

    fn slice_range(&self, b: &Rect) -> std::ops::Range<usize> {
        let lo = ((b.bl.y - self.y_min) / self.slice_height).floor() as i64;
        let hi = ((b.tr.y - self.y_min) / self.slice_height).ceil() as i64;
        lo.clamp(0, NUM_SLICES as i64) as usize..hi.clamp(0, NUM_SLICES as i64) as usize
    }

    /// Add a box belonging to the target cluster
    pub(crate) fn add_target(&mut self, b: Rect) {
        for s in self.slice_range(&b) {
            self.edges[s] = if self.rtl {
                self.edges[s].min(b.bl.x)
            } else {
                self.edges[s].max(b.tr.x)
            };
        }
    }

    /// Measure a following glyph; `extra_space` is advance contributed by
    /// intervening space glyphs.
    pub(crate) fn merge_box(&mut self, b: Rect, extra_space: f32) -> bool {
        let mut collides = false;
        for s in self.slice_range(&b) {
            let edge = self.edges[s];
            if !edge.is_finite() {
                continue;
            }
            let need = if self.rtl {
                (b.tr.x - extra_space) + self.margin - edge
            } else {
                edge + self.margin - (b.bl.x + extra_space)
            };
            if need > 0.0 {
                collides = true;
                self.needed = self.needed.max(need);
            }
        }
        collides
    }

    /// The advance adjustment separating the cluster from what follows
    pub(crate) fn resolve(&self) -> Position {
        Position::new(self.needed, 0.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn boxed(x0: f32, y0: f32, x1: f32, y1: f32) -> Rect {
        Rect::new(Position::new(x0, y0), Position::new(x1, y1))
    }

    #[test]
    fn shift_resolves_vertical_stack() {
        // Two same-sized marks at the same spot: the mover must clear a
        // 10×10 box; the cheapest escape is one axis of length 10.
        let limit = boxed(-100.0, -100.0, 100.0, 100.0);
        let mut coll = ShiftCollider::new(
            boxed(0.0, 0.0, 10.0, 10.0),
            limit,
            0.0,
            0.0,
            Position::ZERO,
        );
        let hit = coll.merge_box(boxed(0.0, 0.0, 10.0, 10.0));
        assert!(hit);
        let shift = coll.resolve().expect("solvable");
        let moved = boxed(0.0, 0.0, 10.0, 10.0) + shift;
        assert!(!moved.intersects(&boxed(0.0, 0.0, 10.0, 10.0)));
        assert!(shift.x.abs().max(shift.y.abs()) <= 10.0 + 1e-3);
    }

    #[test]
    fn shift_respects_limit() {
        // Only downward shifts allowed.
        let limit = boxed(0.0, -50.0, 0.0, 0.0);
        let mut coll = ShiftCollider::new(
            boxed(0.0, 0.0, 10.0, 10.0),
            limit,
            0.0,
            0.0,
            Position::ZERO,
        );
        coll.merge_box(boxed(-1.0, 0.0, 11.0, 10.0));
        let shift = coll.resolve().expect("solvable");
        assert_eq!(shift.x, 0.0);
        assert!(shift.y <= -10.0);
    }

    #[test]
    fn no_collision_means_zero_shift() {
        let limit = boxed(-100.0, -100.0, 100.0, 100.0);
        let mut coll = ShiftCollider::new(
            boxed(0.0, 0.0, 10.0, 10.0),
            limit,
            0.0,
            0.0,
            Position::ZERO,
        );
        let hit = coll.merge_box(boxed(20.0, 0.0, 30.0, 10.0));
        assert!(!hit);
        assert_eq!(coll.resolve(), Some(Position::ZERO));
    }

    #[test]
    fn kern_measures_overlap() {
        let mut coll = KernCollider::new(0.0, 80.0, 2.0, false);
        coll.add_target(boxed(0.0, 0.0, 50.0, 80.0));
        // following glyph overlaps the cluster by 10
        let hit = coll.merge_box(boxed(40.0, 0.0, 90.0, 80.0), 0.0);
        assert!(hit);
        let mv = coll.resolve();
        assert_eq!(mv.x, 50.0 + 2.0 - 40.0);
    }

    #[test]
    fn kern_ignores_clear_bands() {
        let mut coll = KernCollider::new(0.0, 80.0, 0.0, false);
        // target occupies only the lower half
        coll.add_target(boxed(0.0, 0.0, 50.0, 40.0));
        // follower occupies only the upper half: no kern required
        let hit = coll.merge_box(boxed(30.0, 41.0, 60.0, 80.0), 0.0);
        assert!(!hit);
        assert_eq!(coll.resolve().x, 0.0);
    }
}
