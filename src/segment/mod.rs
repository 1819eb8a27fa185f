// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! The segment: one shaped run of text
//!
//! A segment owns the slot buffer, per-character info, the feature vectors
//! referenced by characters, and (for collision-aware fonts) per-slot
//! collision state. Passes borrow it mutably in sequence; nothing here is
//! shared between threads.

use crate::collision::SlotCollision;
use crate::conv::{to_u32, to_usize};
use crate::data::Position;
use crate::face::features::FeatureVal;
use crate::face::Face;
use crate::silf::Silf;
use crate::text::TextSource;
use bitflags::bitflags;

pub(crate) mod attrs;
mod buffer;
mod charinfo;
mod slot;

pub use buffer::SlotBuffer;
pub use charinfo::CharInfo;
pub use slot::Slot;
pub(crate) use slot::{SlotFlags, NUM_JUST_PARAMS};

/// A segment may grow to at most this multiple of its character count
pub(crate) const MAX_SEG_GROWTH_FACTOR: usize = 64;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub(crate) struct SegFlags: u8 {
        const INIT_COLLISIONS = 1;
        const HAS_COLLISIONS  = 2;
    }
}

/// One shaped run of text from one font
#[derive(Debug)]
pub struct Segment {
    slots: SlotBuffer,
    charinfo: Vec<CharInfo>,
    /// Feature vectors referenced by char-infos
    feats: Vec<FeatureVal>,
    /// Keyed by `Slot::index`; empty unless the font uses collisions
    collisions: Vec<SlotCollision>,
    advance: Position,
    /// bit 0: requested direction is RTL; bit 2: suppress mirroring of
    /// glyphs with an encoded mirror pair; bit 6: buffer currently reversed
    dir: u8,
    flags: SegFlags,
    /// A set bit means the corresponding pass may be skipped
    pass_bits: u32,
    /// Next stable slot index to assign
    next_index: u32,
}

impl Segment {
    pub(crate) fn new(num_chars: usize, silf: &Silf, dir: u8) -> Self {
        Segment {
            slots: SlotBuffer::new(),
            charinfo: vec![CharInfo::default(); num_chars],
            feats: vec![],
            collisions: vec![],
            advance: Position::ZERO,
            dir,
            flags: if silf.flags() & 0x20 != 0 {
                SegFlags::HAS_COLLISIONS
            } else {
                SegFlags::empty()
            },
            pass_bits: if silf.a_pass_bits() != 0 { !0 } else { 0 },
            next_index: 0,
        }
    }

    /// Decode the input and append one slot per character
    pub(crate) fn read_text(
        &mut self,
        face: &Face,
        silf: &Silf,
        feats: FeatureVal,
        text: &TextSource,
    ) {
        let fid = self.add_features(feats);
        for (id, (offset, usv)) in text.decode().into_iter().enumerate() {
            let mut gid = face.gid_for_char(usv);
            if gid == 0 {
                gid = silf.find_pseudo(usv);
            }
            self.append_slot(face, silf, id, usv, gid, fid, offset);
        }
    }

    fn append_slot(
        &mut self,
        face: &Face,
        silf: &Silf,
        id: usize,
        usv: u32,
        gid: u16,
        fid: u16,
        offset: usize,
    ) {
        let c = &mut self.charinfo[id];
        c.unicode = usv;
        c.base = offset as u32;
        c.feature_index = fid;
        c.break_weight = face.glyph_attr(gid, u16::from(silf.a_break()));

        let mut slot = Slot::new(silf.num_user());
        slot.original = id as u32;
        slot.before = id as i32;
        slot.after = id as i32;
        slot.index = self.next_index;
        self.next_index += 1;
        let ix = self.slots.push(slot);
        self.set_slot_glyph(face, silf, ix, gid);
    }

    /// Replace the glyph of a slot, refreshing its derived state
    pub(crate) fn set_slot_glyph(&mut self, face: &Face, silf: &Silf, ix: usize, gid: u16) {
        let num_glyphs = face.glyphs().num_glyphs();
        let (real, advance, pass_attr) = match face.glyphs().glyph(gid) {
            Some(g) => {
                let mut real = g.attr(u16::from(silf.a_pseudo())) as u16;
                if real > num_glyphs {
                    real = 0;
                }
                let adv_glyph = if real != 0 {
                    face.glyphs().glyph(real).unwrap_or(g)
                } else {
                    g
                };
                (real, adv_glyph.advance().x, g.attr(u16::from(silf.a_pass_bits())))
            }
            None => (0, 0.0, 0),
        };
        let slot = self.slots.get_mut(ix);
        slot.glyph_id = gid;
        slot.bidi_class = -1;
        slot.real_glyph_id = real;
        slot.advance = Position::new(advance, 0.0);
        if silf.a_pass_bits() != 0 && face.glyphs().check(gid) {
            let mut bits = pass_attr as u16 as u32;
            if silf.num_passes() > 16 {
                let hi = face.glyph_attr(gid, u16::from(silf.a_pass_bits()) + 1);
                bits |= (hi as u16 as u32) << 16;
            }
            self.merge_pass_bits(bits);
        }
    }

    pub(crate) fn merge_pass_bits(&mut self, bits: u32) {
        self.pass_bits &= bits;
    }

    pub(crate) fn pass_bits(&self) -> u32 {
        self.pass_bits
    }

    pub(crate) fn slots(&self) -> &SlotBuffer {
        &self.slots
    }

    pub(crate) fn slots_mut(&mut self) -> &mut SlotBuffer {
        &mut self.slots
    }

    /// Assign a stable index for a newly created slot
    pub(crate) fn take_index(&mut self) -> u32 {
        let i = self.next_index;
        self.next_index += 1;
        i
    }

    pub(crate) fn can_grow(&self) -> bool {
        self.slots.len() < self.charinfo.len() * MAX_SEG_GROWTH_FACTOR
    }

    /// Number of slots after shaping
    pub fn n_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, i: usize) -> Option<&Slot> {
        (i < self.slots.len()).then(|| self.slots.get(i))
    }

    /// Slots in buffer order
    pub fn iter_slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    /// Index of the slot `i` is attached to, if any
    pub fn slot_attached_to(&self, i: usize) -> Option<usize> {
        (i < self.slots.len())
            .then(|| self.slots.parent_ix(i))
            .flatten()
    }

    /// Total advance of the shaped segment
    pub fn advance(&self) -> Position {
        self.advance
    }

    /// Query a slot attribute by its numeric code
    ///
    /// The codes are those compiled into rule programs; unknown codes read
    /// as zero.
    pub fn slot_attr(&self, face: &Face, i: usize, code: u8, subindex: u8) -> i32 {
        let Some(silf) = face.silf(0) else {
            return 0;
        };
        match self.slot(i) {
            Some(slot) => attrs::get(self, face, silf, slot, code, subindex),
            None => 0,
        }
    }

    pub fn n_char_info(&self) -> usize {
        self.charinfo.len()
    }

    pub fn char_info(&self, i: usize) -> Option<&CharInfo> {
        self.charinfo.get(i)
    }

    pub(crate) fn charinfo_mut(&mut self, i: usize) -> Option<&mut CharInfo> {
        self.charinfo.get_mut(i)
    }

    pub(crate) fn dir(&self) -> u8 {
        self.dir
    }

    /// Current buffer order: true when slots run right-to-left
    pub(crate) fn currdir(&self) -> bool {
        ((self.dir >> 6) ^ self.dir) & 1 != 0
    }

    pub(crate) fn flags(&self) -> SegFlags {
        self.flags
    }

    pub(crate) fn add_features(&mut self, feats: FeatureVal) -> u16 {
        self.feats.push(feats);
        (self.feats.len() - 1) as u16
    }

    pub(crate) fn get_feature(&self, face: &Face, fid: u16, findex: u8) -> u32 {
        let Some(fref) = face.feature_map().feature_ref(findex) else {
            return 0;
        };
        self.feats
            .get(usize::from(fid))
            .map(|f| fref.value(f))
            .unwrap_or(0)
    }

    pub(crate) fn set_feature(&mut self, face: &Face, fid: u16, findex: u8, val: u32) {
        let Some(fref) = face.feature_map().feature_ref(findex) else {
            return;
        };
        let val = val.min(fref.max_val());
        if let Some(feats) = self.feats.get_mut(usize::from(fid)) {
            fref.apply(val, feats);
        }
    }

    pub(crate) fn is_whitespace(cid: u32) -> bool {
        matches!(cid,
            0x0009..=0x000D
            | 0x0020
            | 0x0085
            | 0x00A0
            | 0x1680
            | 0x180E
            | 0x2000..=0x200A
            | 0x2028
            | 0x2029
            | 0x202F
            | 0x205F
            | 0x3000)
    }

    // ---- collisions ----

    pub(crate) fn has_collision_info(&self) -> bool {
        self.flags.contains(SegFlags::HAS_COLLISIONS) && !self.collisions.is_empty()
    }

    /// Seed collision state for any slot not yet covered
    ///
    /// Entries persist across passes so committed offsets accumulate; only
    /// indices created since the last call are initialized.
    pub(crate) fn ensure_collisions(&mut self, face: &Face, silf: &Silf) {
        if !self.flags.contains(SegFlags::HAS_COLLISIONS) {
            return;
        }
        let a_col = u16::from(silf.a_collision());
        let seeded = self.collisions.len();
        let max_index = self
            .slots
            .iter()
            .map(|s| to_usize(s.index))
            .max()
            .unwrap_or(0);
        if max_index >= self.collisions.len() {
            self.collisions
                .resize(max_index + 1, SlotCollision::default());
        }
        for ix in 0..self.slots.end() {
            let s = self.slots.get(ix);
            let sindex = to_usize(s.index);
            if sindex < seeded {
                continue;
            }
            let gid = s.gid();
            let is_space = self
                .charinfo
                .get(to_usize(s.original))
                .map(|c| Self::is_whitespace(c.unicode))
                .unwrap_or(false);
            self.collisions[sindex] =
                SlotCollision::init(|n| face.glyph_attr(gid, a_col + n), is_space);
        }
    }

    pub(crate) fn collision_info(&self, slot_ix: usize) -> Option<&SlotCollision> {
        self.collision_info_by_index(self.slots.get(slot_ix).index)
    }

    pub(crate) fn collision_info_mut(&mut self, slot_ix: usize) -> Option<&mut SlotCollision> {
        self.collision_info_by_index_mut(self.slots.get(slot_ix).index)
    }

    pub(crate) fn collision_info_by_index(&self, index: u32) -> Option<&SlotCollision> {
        self.collisions.get(to_usize(index))
    }

    pub(crate) fn collision_info_by_index_mut(&mut self, index: u32) -> Option<&mut SlotCollision> {
        self.collisions.get_mut(to_usize(index))
    }

    fn collision_shift_of(&self, slot_ix: usize) -> Position {
        self.collision_info(slot_ix)
            .map(|c| c.offset())
            .unwrap_or(Position::ZERO)
    }

    // ---- ordering ----

    /// Reverse the slots, keeping diacritics after their bases
    pub(crate) fn reverse_slots(&mut self, face: &Face, silf: &Silf) {
        self.dir ^= 64;
        if self.slots.is_empty() {
            return;
        }
        let a_bidi = u16::from(silf.a_bidi());
        for ix in 0..self.slots.end() {
            let gid = self.slots.get(ix).gid();
            if self.slots.get(ix).bidi_class == -1 {
                let cls = face.glyph_attr(gid, a_bidi) as i8;
                self.slots.get_mut(ix).bidi_class = cls;
            }
        }
        self.slots.reverse();
    }

    /// Substitute mirror-pair glyphs, per the font's mirror attribute
    pub(crate) fn do_mirror(&mut self, face: &Face, silf: &Silf, a_mirror: u8) {
        let a_mirror = u16::from(a_mirror);
        for ix in 0..self.slots.end() {
            let gid = self.slots.get(ix).gid();
            let g = face.glyph_attr(gid, a_mirror) as u16;
            if g != 0 && (self.dir & 4 == 0 || face.glyph_attr(gid, a_mirror + 1) == 0) {
                self.set_slot_glyph(face, silf, ix, g);
            }
        }
    }

    // ---- positioning ----

    /// Resolve one slot's position relative to its cluster base
    ///
    /// The base slot's `position` doubles as scratch during this phase:
    /// `x` accumulates the cluster's left sidebearing, `y` its right.
    fn update_cluster_metric(
        &mut self,
        slot_ix: usize,
        is_final: bool,
        depth: u32,
    ) -> Position {
        if depth == 0 {
            return Position::ZERO;
        }
        let s = self.slots.get(slot_ix);
        let (s_shift, s_just, s_advance, s_attach, s_with) =
            (s.shift, s.just, s.advance, s.attach, s.with);
        let parent = self.slots.parent_ix(slot_ix);

        let mut shift = Position::new(s_shift.x + s_just, s_shift.y);
        if is_final {
            shift += self.collision_shift_of(slot_ix);
        }
        let slot_adv = s_advance.x + s_just;
        let mut pos = shift;

        let base_ix = self.slots.base_ix(slot_ix);
        match parent {
            None => {
                let base = self.slots.get_mut(slot_ix);
                base.position.x = base.position.x.min(0.0);
                pos = Position::ZERO;
                shift = Position::ZERO;
            }
            Some(p) => {
                let base_pos = self.update_cluster_metric(p, is_final, depth - 1);
                pos = pos + base_pos + s_attach - s_with;
                self.slots.get_mut(slot_ix).position = pos;
                if s_advance.x >= 0.5 {
                    let base = self.slots.get_mut(base_ix);
                    base.position.x = base.position.x.min(pos.x);
                }
            }
        }
        if s_advance.x >= 0.5 {
            let base = self.slots.get_mut(base_ix);
            base.position.y = base.position.y.max(pos.x - shift.x + slot_adv);
        }
        pos
    }

    /// Assign an origin to every slot in `[first, last)`
    ///
    /// Returns the total advance of the range. Cluster bases are laid out in
    /// visual order; attached slots ride on their base.
    pub(crate) fn position_slots(
        &mut self,
        face: &Face,
        silf: &Silf,
        font_scale: Option<f32>,
        first: usize,
        last: usize,
        is_rtl: bool,
        is_final: bool,
    ) -> Position {
        if self.slots.is_empty() {
            return Position::ZERO;
        }
        let reorder = self.currdir() != is_rtl;
        let (mut first, mut last) = (first, last);
        if reorder {
            self.reverse_slots(face, silf);
            let n = self.slots.end();
            (first, last) = (n - last, n - first);
        }

        for ix in first..last {
            self.slots.get_mut(ix).position = Position::ZERO;
        }
        for ix in first..last {
            self.update_cluster_metric(ix, is_final, 100);
        }

        let mut offset = Position::ZERO;
        if is_rtl {
            // For the first visual cluster ensure initial x positions are
            // never negative.
            let mut clsb = 0.0f32;
            for ix in (first..last).rev() {
                let s = self.slots.get(ix);
                if s.is_base() {
                    clsb = s.position.x;
                }
                if -s.position.x > offset.x {
                    offset.x = -s.position.x;
                }
                if s.is_cluster_head() {
                    break;
                }
            }
            offset.x += clsb;

            for ix in (first..last).rev() {
                if !self.slots.get(ix).is_base() {
                    continue;
                }
                let shifts = self.collision_shift_of(ix);
                let s = self.slots.get(ix);
                let (clsb, crsb, shift) = (s.position.x, s.position.y, s.shift);
                offset.x += -clsb;
                self.slots.get_mut(ix).position = offset + shifts - shift;
                offset.x += crsb + shifts.x - shift.x;
            }
        } else {
            for ix in first..last {
                let s = self.slots.get(ix);
                if -s.position.x > offset.x {
                    offset.x = -s.position.x;
                }
                if s.is_cluster_head() {
                    break;
                }
            }

            for ix in first..last {
                if !self.slots.get(ix).is_base() {
                    continue;
                }
                let shifts = self.collision_shift_of(ix);
                let s = self.slots.get(ix);
                let (clsb, crsb, shift) = (s.position.x, s.position.y, s.shift);
                offset.x += -clsb;
                self.slots.get_mut(ix).position = offset + shifts + shift;
                offset.x += crsb + shifts.x;
            }
        }

        // Attached slots ride on their base.
        for ix in first..last {
            if self.slots.get(ix).is_base() {
                continue;
            }
            let base_x = self.slots.get(self.slots.base_ix(ix)).position.x;
            self.slots.get_mut(ix).position.x += base_x;
        }

        if let Some(scale) = font_scale {
            if scale != 1.0 {
                for ix in first..last {
                    self.slots.get_mut(ix).position *= scale;
                }
                offset *= scale;
            }
        }

        if reorder {
            self.reverse_slots(face, silf);
        }
        offset
    }

    /// Position of a slot relative to its cluster base, attachment applied
    fn cluster_relative_pos(&self, ix: usize, depth: u32) -> Position {
        if depth == 0 {
            return Position::ZERO;
        }
        match self.slots.parent_ix(ix) {
            None => Position::ZERO,
            Some(p) => {
                let s = self.slots.get(ix);
                self.cluster_relative_pos(p, depth - 1) + s.attach - s.with
                    + Position::new(s.shift.x + s.just, s.shift.y)
            }
        }
    }

    /// A glyph metric measured over the whole cluster of `base_ix`
    pub(crate) fn cluster_metric(
        &self,
        face: &Face,
        base_ix: usize,
        metric: crate::face::glyphs::Metric,
    ) -> i32 {
        use crate::face::glyphs::Metric;

        let head = self.slots.cluster_head(base_ix);
        let end = self.slots.cluster_end(head);
        let mut bbox: Option<crate::data::Rect> = None;
        let mut adv = 0.0f32;
        for ix in head..end {
            let pos = self.cluster_relative_pos(ix, 100);
            let s = self.slots.get(ix);
            if let Some(g) = face.glyphs().glyph(s.glyph()) {
                let b = *g.bbox() + pos;
                bbox = Some(match bbox {
                    Some(x) => x.widen(b),
                    None => b,
                });
            }
            if s.advance.x >= 0.5 {
                adv = adv.max(pos.x + s.advance.x + s.just);
            }
        }
        let bbox = bbox.unwrap_or_default();
        let v = match metric {
            Metric::Lsb | Metric::BbLeft => bbox.bl.x,
            Metric::Rsb => adv - bbox.tr.x,
            Metric::BbTop => bbox.tr.y,
            Metric::BbBottom => bbox.bl.y,
            Metric::BbRight => bbox.tr.x,
            Metric::BbHeight => bbox.height(),
            Metric::BbWidth => bbox.width(),
            Metric::AdvWidth => adv,
            Metric::AdvHeight => self.slots.get(base_ix).advance.y,
            Metric::Ascent | Metric::Descent => {
                return face.glyph_metric(self.slots.get(base_ix).glyph(), metric)
            }
        };
        v as i32
    }

    /// Fill char-info `before`/`after` slot associations
    pub(crate) fn associate_chars(&mut self) {
        for c in &mut self.charinfo {
            c.before = -1;
            c.after = -1;
        }
        let num_chars = self.charinfo.len() as i32;
        for ix in 0..self.slots.end() {
            let (before, after) = {
                let s = self.slots.get(ix);
                (s.before, s.after)
            };
            if before >= 0 {
                for j in before..=after.min(num_chars - 1) {
                    let c = &mut self.charinfo[j as usize];
                    if c.before == -1 || (ix as i32) < c.before {
                        c.before = ix as i32;
                    }
                    if c.after < ix as i32 {
                        c.after = ix as i32;
                    }
                }
            }
            self.slots.get_mut(ix).index = to_u32(ix);
        }
        // Characters with no slot take their associations from neighbours.
        for ix in 0..self.slots.end() {
            let (s_after, s_before, s_index) = {
                let s = self.slots.get(ix);
                (s.after, s.before, s.index as i32)
            };
            let mut a = s_after + 1;
            while a < num_chars && self.charinfo[a as usize].after < 0 {
                self.charinfo[a as usize].after = s_index;
                a += 1;
            }
            self.slots.get_mut(ix).after = a - 1;

            let mut b = s_before - 1;
            while b >= 0 && self.charinfo[b as usize].before < 0 {
                self.charinfo[b as usize].before = s_index;
                b -= 1;
            }
            self.slots.get_mut(ix).before = b + 1;
        }
    }

    /// Final positioning and char association after all passes have run
    pub(crate) fn finalise(&mut self, face: &Face, silf: &Silf, font_scale: Option<f32>) {
        if self.slots.is_empty() {
            return;
        }
        let end = self.slots.end();
        self.advance =
            self.position_slots(face, silf, font_scale, 0, end, silf.dir() & 1 != 0, true);
        self.associate_chars();
        if self.currdir() != (self.dir & 1 != 0) {
            self.reverse_slots(face, silf);
        }
    }
}
