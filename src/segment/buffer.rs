// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! The slot buffer: an ordered sequence of slots plus a trailing sentinel
//!
//! Positions in the buffer are plain indices; they are the handle type used
//! across every mutation point, since the underlying `Vec` may reallocate.
//! Insertions and removals renumber attachment offsets so that for every
//! non-base slot, `index + parent_offset` still names its parent.

use super::slot::{Slot, SlotFlags};

/// Bidi class of zero-width marks which stay with their base on reversal
const BIDI_MARK: i8 = 0x10;

#[derive(Debug)]
pub struct SlotBuffer {
    /// Live slots followed by one sentinel
    slots: Vec<Slot>,
}

impl Default for SlotBuffer {
    fn default() -> Self {
        SlotBuffer {
            slots: vec![Slot::sentinel()],
        }
    }
}

impl SlotBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of live slots
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len() - 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the sentinel; the usual loop bound
    #[inline]
    pub(crate) fn end(&self) -> usize {
        self.slots.len() - 1
    }

    #[inline]
    pub(crate) fn get(&self, ix: usize) -> &Slot {
        &self.slots[ix]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, ix: usize) -> &mut Slot {
        &mut self.slots[ix]
    }

    /// Live slots in buffer order
    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots[..self.len()].iter()
    }

    pub(crate) fn reserve(&mut self, extra: usize) {
        self.slots.reserve(extra);
    }

    pub(crate) fn push(&mut self, slot: Slot) -> usize {
        let pos = self.end();
        self.slots.insert(pos, slot);
        pos
    }

    /// Insert before `pos`, renumbering attachment offsets
    pub(crate) fn insert(&mut self, pos: usize, slot: Slot) {
        debug_assert!(pos <= self.end());
        self.slots.insert(pos, slot);
        for i in 0..self.slots.len() {
            if i == pos {
                continue;
            }
            let off = self.slots[i].parent_offset;
            if off == 0 {
                continue;
            }
            let old_i = if i > pos { i - 1 } else { i } as i64;
            let old_parent = old_i + i64::from(off);
            let new_parent = old_parent + i64::from(old_parent >= pos as i64);
            self.slots[i].parent_offset = (new_parent - i as i64) as i32;
        }
    }

    /// Remove the slot at `pos`, renumbering attachment offsets
    ///
    /// The slot must already be detached (no parent, no children).
    pub(crate) fn remove(&mut self, pos: usize) -> Slot {
        debug_assert!(pos < self.end());
        debug_assert!(self.slots[pos].is_base());
        let removed = self.slots.remove(pos);
        for i in 0..self.slots.len() {
            let off = self.slots[i].parent_offset;
            if off == 0 {
                continue;
            }
            let old_i = i + usize::from(i >= pos);
            let old_parent = old_i as i64 + i64::from(off);
            debug_assert!(old_parent != pos as i64);
            let new_parent = old_parent - i64::from(old_parent > pos as i64);
            self.slots[i].parent_offset = (new_parent - i as i64) as i32;
        }
        removed
    }

    /// Index of the slot `ix` is attached to
    #[inline]
    pub(crate) fn parent_ix(&self, ix: usize) -> Option<usize> {
        let off = self.slots[ix].parent_offset;
        (off != 0).then(|| (ix as i64 + i64::from(off)) as usize)
    }

    /// Root of the attachment chain starting at `ix`
    pub(crate) fn base_ix(&self, ix: usize) -> usize {
        let mut i = ix;
        let mut depth = 0;
        while let Some(p) = self.parent_ix(i) {
            i = p;
            depth += 1;
            if depth > 100 {
                break;
            }
        }
        i
    }

    pub(crate) fn has_base(&self, ix: usize, base: usize) -> bool {
        let mut i = ix;
        let mut depth = 0;
        while let Some(p) = self.parent_ix(i) {
            if p == base {
                return true;
            }
            i = p;
            depth += 1;
            if depth > 100 {
                break;
            }
        }
        false
    }

    /// First slot of the cluster containing `ix`
    pub(crate) fn cluster_head(&self, ix: usize) -> usize {
        let mut i = ix;
        while i > 0 && !self.slots[i].is_cluster_head() {
            i -= 1;
        }
        i
    }

    /// One-past-the-last slot of the cluster starting at `head`
    pub(crate) fn cluster_end(&self, head: usize) -> usize {
        let mut i = head + 1;
        let end = self.end();
        while i < end && !self.slots[i].is_cluster_head() {
            i += 1;
        }
        i
    }

    /// Slots of `parent`'s cluster directly attached to `parent`
    pub(crate) fn children(&self, parent: usize) -> impl Iterator<Item = usize> + '_ {
        let head = self.cluster_head(parent);
        let end = self.cluster_end(head);
        (head..end).filter(move |&i| self.parent_ix(i) == Some(parent))
    }

    /// Attach `child` to `parent`, merging the clusters between them
    pub(crate) fn add_child(&mut self, parent: usize, child: usize) -> bool {
        if parent == child || self.parent_ix(child) == Some(parent) {
            return false;
        }
        self.slots[child].parent_offset = parent as i32 - child as i32;
        self.slots[parent].set_flag(SlotFlags::HAS_CHILDREN, true);
        let (lo, hi) = (parent.min(child), parent.max(child));
        for i in lo + 1..=hi {
            self.slots[i].set_flag(SlotFlags::CLUSTER_HEAD, false);
        }
        true
    }

    /// Detach `child` from `parent`, restoring cluster heads
    pub(crate) fn remove_child(&mut self, parent: usize, child: usize) -> bool {
        if parent == child || !self.slots[parent].is_parent() || self.parent_ix(child) != Some(parent)
        {
            return false;
        }
        if self.slots[child].parent_offset > 0 && self.slots[child].is_cluster_head() {
            let (lo, hi) = (parent.min(child), parent.max(child));
            for i in lo + 1..=hi {
                if self.base_ix(i) != child {
                    self.slots[i].set_flag(SlotFlags::CLUSTER_HEAD, true);
                    break;
                }
            }
        }
        self.slots[child].parent_offset = 0;
        self.slots[child].set_flag(SlotFlags::CLUSTER_HEAD, true);
        // A parent that is not itself a cluster head sits mid-chain and
        // keeps its children flag even with no direct child left.
        let still_parent =
            self.children(parent).next().is_some() || !self.slots[parent].is_cluster_head();
        self.slots[parent].set_flag(SlotFlags::HAS_CHILDREN, still_parent);
        true
    }

    /// Reverse the slot order, keeping runs of bidi marks after their base
    pub(crate) fn reverse(&mut self) {
        let n = self.len();
        if n < 2 {
            return;
        }

        // Partition into blocks of one non-mark slot plus its trailing
        // marks; a leading mark run forms its own block.
        let mut blocks: Vec<std::ops::Range<usize>> = vec![];
        let mut start = 0;
        let mut i = 0;
        while i < n && self.slots[i].bidi_class == BIDI_MARK {
            i += 1;
        }
        if i > 0 {
            blocks.push(0..i);
            start = i;
        }
        while start < n {
            let mut e = start + 1;
            while e < n && self.slots[e].bidi_class == BIDI_MARK {
                e += 1;
            }
            blocks.push(start..e);
            start = e;
        }

        // old index per new position
        let mut order = Vec::with_capacity(n);
        for block in blocks.iter().rev() {
            order.extend(block.clone());
        }
        debug_assert_eq!(order.len(), n);
        let mut new_of_old = vec![0usize; n];
        for (new, &old) in order.iter().enumerate() {
            new_of_old[old] = new;
        }

        let sentinel = self.slots.pop().expect("sentinel");
        let mut out = Vec::with_capacity(n + 1);
        for &old in &order {
            out.push(std::mem::replace(&mut self.slots[old], Slot::sentinel()));
        }
        // Remap attachment offsets through the permutation.
        for (new, &old) in order.iter().enumerate() {
            let off = out[new].parent_offset;
            if off != 0 {
                let old_parent = (old as i64 + i64::from(off)) as usize;
                out[new].parent_offset = new_of_old[old_parent] as i32 - new as i32;
            }
        }
        out.push(sentinel);
        self.slots = out;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn buffer(n: usize) -> SlotBuffer {
        let mut b = SlotBuffer::new();
        for i in 0..n {
            let mut s = Slot::new(0);
            s.glyph_id = i as u16;
            s.index = i as u32;
            b.push(s);
        }
        b
    }

    #[test]
    fn sentinel_invariant() {
        let b = buffer(3);
        assert_eq!(b.len(), 3);
        assert_eq!(b.end(), 3);
        let s = b.get(3);
        assert_eq!(s.gid(), 0xFFFF);
        assert!(s.is_deleted());
    }

    #[test]
    fn attach_merges_cluster() {
        let mut b = buffer(4);
        assert!(b.add_child(1, 2));
        assert!(b.get(1).is_parent());
        assert_eq!(b.parent_ix(2), Some(1));
        assert!(!b.get(2).is_cluster_head());
        assert_eq!(b.cluster_end(1), 3);
        assert_eq!(b.children(1).collect::<Vec<_>>(), vec![2]);

        assert!(b.remove_child(1, 2));
        assert!(b.get(2).is_cluster_head());
        assert!(!b.get(1).is_parent());
        assert!(b.get(2).is_base());
    }

    #[test]
    fn mid_chain_parent_keeps_children_flag() {
        // base 1 ← mark 2 ← mark 3: detaching 3 leaves 2 mid-chain
        let mut b = buffer(4);
        assert!(b.add_child(1, 2));
        assert!(b.add_child(2, 3));
        assert!(b.remove_child(2, 3));
        assert!(b.get(3).is_base());
        assert!(!b.get(2).is_cluster_head());
        assert!(b.get(2).is_parent());
        // a cluster-head parent losing its last child does clear the flag
        assert!(b.remove_child(1, 2));
        assert!(!b.get(1).is_parent());
    }

    #[test]
    fn insert_fixes_parent_offsets() {
        let mut b = buffer(4);
        b.add_child(1, 3);
        assert_eq!(b.get(3).parent_offset, -2);
        b.insert(2, Slot::new(0));
        // child moved 3 → 4, parent still at 1
        assert_eq!(b.parent_ix(4), Some(1));
        assert_eq!(b.get(4).parent_offset, -3);
    }

    #[test]
    fn remove_fixes_parent_offsets() {
        let mut b = buffer(5);
        b.add_child(1, 3);
        b.remove(2);
        // child moved 3 → 2, parent still at 1
        assert_eq!(b.parent_ix(2), Some(1));
    }

    #[test]
    fn reverse_twice_is_identity() {
        let mut b = buffer(5);
        b.get_mut(2).bidi_class = BIDI_MARK;
        b.add_child(1, 2);
        let before: Vec<u16> = b.iter().map(|s| s.gid()).collect();
        b.reverse();
        let reversed: Vec<u16> = b.iter().map(|s| s.gid()).collect();
        // mark stays after its base
        assert_eq!(reversed, vec![4, 3, 1, 2, 0]);
        // attachment survives the permutation
        let pos1 = reversed.iter().position(|&g| g == 1).unwrap();
        let pos2 = reversed.iter().position(|&g| g == 2).unwrap();
        assert_eq!(b.parent_ix(pos2), Some(pos1));
        b.reverse();
        let after: Vec<u16> = b.iter().map(|s| s.gid()).collect();
        assert_eq!(before, after);
        assert_eq!(b.parent_ix(2), Some(1));
    }
}
