// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! The slot: one mutable glyph record in a segment
//!
//! Slots reference their attachment parent by a *signed offset* into the
//! containing [`super::SlotBuffer`], never by pointer; the buffer fixes
//! offsets up across insertions and deletions so the link stays valid.

use crate::data::Position;
use bitflags::bitflags;
use smallvec::SmallVec;

/// Values per justification level: stretch, shrink, step, weight, width
pub(crate) const NUM_JUST_PARAMS: usize = 5;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub(crate) struct SlotFlags: u8 {
        const DELETED      = 0x01;
        /// Set on slots created by the `insert` opcode; such slots do not
        /// permit an insertion point before themselves.
        const INSERTED     = 0x02;
        const COPIED       = 0x04;
        const POSITIONED   = 0x08;
        /// First slot of a cluster
        const CLUSTER_HEAD = 0x10;
        const LAST         = 0x20;
        const HAS_CHILDREN = 0x40;
    }
}

/// Sparse per-slot attribute store
///
/// User attributes stay inline while small; justification data is allocated
/// only when a justification level is first written.
#[derive(Clone, Debug, Default)]
pub(crate) struct SlotAttrStore {
    pub(crate) user: SmallVec<[i16; 3]>,
    /// `num_levels × NUM_JUST_PARAMS` once allocated, else empty
    pub(crate) justs: Vec<i16>,
}

/// One glyph record
#[derive(Clone, Debug)]
pub struct Slot {
    /// Offset (in buffer positions) to the slot this one is attached to;
    /// zero means this slot is a base.
    pub(crate) parent_offset: i32,
    /// Absolute position of the glyph (design units)
    pub(crate) position: Position,
    /// `.shift` slot attribute
    pub(crate) shift: Position,
    /// `.advance` slot attribute
    pub(crate) advance: Position,
    /// Attachment point on this slot
    pub(crate) attach: Position,
    /// Attachment point position on the parent
    pub(crate) with: Position,
    /// Justification-inserted space
    pub(crate) just: f32,
    /// Char-info index that originated this slot
    pub(crate) original: u32,
    /// Char-info index of the before association (-1 transiently)
    pub(crate) before: i32,
    /// Char-info index of the after association
    pub(crate) after: i32,
    /// Stable index assigned at creation; keys the collision array
    pub(crate) index: u32,
    pub(crate) glyph_id: u16,
    /// Rendered glyph (pseudo-glyph mapping applied); 0 = use `glyph_id`
    pub(crate) real_glyph_id: u16,
    pub(crate) att_level: u8,
    pub(crate) bidi_level: u8,
    /// -1 until assigned from the font's bidi attribute
    pub(crate) bidi_class: i8,
    pub(crate) flags: SlotFlags,
    pub(crate) attrs: SlotAttrStore,
}

impl Slot {
    pub(crate) fn new(num_attrs: usize) -> Self {
        Slot {
            parent_offset: 0,
            position: Position::ZERO,
            shift: Position::ZERO,
            advance: Position::ZERO,
            attach: Position::ZERO,
            with: Position::ZERO,
            just: 0.0,
            original: 0,
            before: 0,
            after: 0,
            index: 0,
            glyph_id: 0,
            real_glyph_id: 0,
            att_level: 0,
            bidi_level: 0,
            bidi_class: -1,
            flags: SlotFlags::CLUSTER_HEAD,
            attrs: SlotAttrStore {
                user: smallvec::smallvec![0; num_attrs],
                justs: vec![],
            },
        }
    }

    /// The terminator slot at the end of every buffer
    pub(crate) fn sentinel() -> Self {
        let mut s = Slot::new(0);
        s.glyph_id = 0xFFFF;
        s.real_glyph_id = 0xFFFF;
        s.index = u32::MAX;
        s.flags = SlotFlags::DELETED | SlotFlags::CLUSTER_HEAD | SlotFlags::LAST;
        s
    }

    /// Glyph id after substitution
    #[inline]
    pub fn gid(&self) -> u16 {
        self.glyph_id
    }

    /// Glyph id for rendering (pseudo-glyph map applied)
    #[inline]
    pub fn glyph(&self) -> u16 {
        if self.real_glyph_id != 0 {
            self.real_glyph_id
        } else {
            self.glyph_id
        }
    }

    #[inline]
    pub fn origin(&self) -> Position {
        self.position
    }

    #[inline]
    pub fn advance(&self) -> f32 {
        self.advance.x
    }

    #[inline]
    pub fn advance_pos(&self) -> Position {
        self.advance
    }

    /// Char-info index of the first character this slot represents
    #[inline]
    pub fn before(&self) -> i32 {
        self.before
    }

    /// Char-info index of the last character this slot represents
    #[inline]
    pub fn after(&self) -> i32 {
        self.after
    }

    /// Char-info index this slot originated from
    #[inline]
    pub fn original(&self) -> u32 {
        self.original
    }

    #[inline]
    pub fn is_base(&self) -> bool {
        self.parent_offset == 0
    }

    #[inline]
    pub(crate) fn is_parent(&self) -> bool {
        self.flags.contains(SlotFlags::HAS_CHILDREN)
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.flags.contains(SlotFlags::DELETED)
    }

    /// True if the text cursor may be placed before this slot
    #[inline]
    pub fn can_insert_before(&self) -> bool {
        !self.flags.contains(SlotFlags::INSERTED)
    }

    #[inline]
    pub(crate) fn is_cluster_head(&self) -> bool {
        self.flags.contains(SlotFlags::CLUSTER_HEAD)
    }

    #[inline]
    pub(crate) fn is_copied(&self) -> bool {
        self.flags.contains(SlotFlags::COPIED)
    }

    pub fn bidi_level(&self) -> u8 {
        self.bidi_level
    }

    pub(crate) fn set_flag(&mut self, flag: SlotFlags, state: bool) {
        self.flags.set(flag, state);
    }

    /// User-defined attribute `i`, zero when out of range
    pub fn user_attr(&self, i: usize) -> i16 {
        self.attrs.user.get(i).copied().unwrap_or(0)
    }

    pub(crate) fn set_user_attr(&mut self, i: usize, value: i16) {
        if i < self.attrs.user.len() {
            self.attrs.user[i] = value;
        }
    }

    pub(crate) fn has_justify(&self) -> bool {
        !self.attrs.justs.is_empty()
    }

    pub(crate) fn just_data(&self, level: usize, subindex: usize) -> i16 {
        self.attrs
            .justs
            .get(level * NUM_JUST_PARAMS + subindex)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn set_just_data(&mut self, level: usize, subindex: usize, value: i16) {
        let i = level * NUM_JUST_PARAMS + subindex;
        if i < self.attrs.justs.len() {
            self.attrs.justs[i] = value;
        }
    }

    /// Copy another slot's content, keeping our own place in the buffer
    ///
    /// `parent_offset` and cluster flags describe buffer structure and are
    /// not copied.
    pub(crate) fn copy_content_from(&mut self, other: &Slot) {
        let parent_offset = self.parent_offset;
        let index = self.index;
        let structure = self.flags & (SlotFlags::CLUSTER_HEAD | SlotFlags::HAS_CHILDREN);
        *self = other.clone();
        self.parent_offset = parent_offset;
        self.index = index;
        self.flags.remove(SlotFlags::CLUSTER_HEAD | SlotFlags::HAS_CHILDREN);
        self.flags |= structure;
    }
}
