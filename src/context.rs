// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Per-shape scratch state shared by the FSM and rule programs
//!
//! The context holds the rule input map (pre-context plus matched window),
//! the high-water mark guarding against non-progressing passes, and the
//! arena of slot copies made so rule programs can still read context
//! positions whose buffer slots were replaced or deleted.

use crate::segment::{Segment, Slot};

/// Maximum slots one rule window may cover, pre-context included
pub(crate) const MAX_SLOTS: usize = 64;

/// One entry of the rule input map
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MapSlot {
    /// Index into the segment's slot buffer
    Live(usize),
    /// Index into the context's copies arena
    Copy(usize),
}

#[derive(Debug)]
pub(crate) struct ShapingContext {
    pub(crate) map: Vec<MapSlot>,
    /// Preserved pre-mutation slot content; cleared after each rule
    pub(crate) copies: Vec<Slot>,
    /// bit 0: pass direction is RTL
    pub(crate) dir: u8,
    /// Remaining slot-insertion budget for this shape
    max_size: i32,
    precontext: usize,
    highwater: Option<usize>,
    highpassed: bool,
}

impl ShapingContext {
    pub(crate) fn new(dir: u8, max_size: usize) -> Self {
        ShapingContext {
            map: Vec::with_capacity(MAX_SLOTS),
            copies: vec![],
            dir,
            max_size: max_size as i32,
            precontext: 0,
            highwater: None,
            highpassed: false,
        }
    }

    /// Rewind `slot` by up to `max_pre_context` positions and clear the map
    ///
    /// Records how many back-steps were actually achieved; this is the
    /// length of the pre-context available to the FSM.
    pub(crate) fn reset(&mut self, slot: &mut usize, max_pre_context: usize) {
        let mut pre = 0;
        while pre != max_pre_context && *slot != 0 {
            *slot -= 1;
            pre += 1;
        }
        self.precontext = pre;
        self.map.clear();
        self.copies.clear();
    }

    #[inline]
    pub(crate) fn push_slot(&mut self, slot: MapSlot) {
        self.map.push(slot);
    }

    /// Map position of the rule anchor
    #[inline]
    pub(crate) fn context(&self) -> usize {
        self.precontext
    }

    pub(crate) fn highwater(&self) -> Option<usize> {
        self.highwater
    }

    pub(crate) fn set_highwater(&mut self, s: Option<usize>) {
        self.highwater = s;
        self.highpassed = false;
    }

    pub(crate) fn highpassed(&self) -> bool {
        self.highpassed
    }

    pub(crate) fn set_highpassed(&mut self, v: bool) {
        self.highpassed = v;
    }

    /// Decrement and return the remaining insertion budget
    pub(crate) fn dec_max(&mut self) -> i32 {
        self.max_size -= 1;
        self.max_size
    }

    /// Release slot copies made while applying the last rule
    pub(crate) fn collect_garbage(&mut self) {
        self.copies.clear();
    }

    /// Read a map entry's slot, wherever it lives
    pub(crate) fn resolve<'a>(&'a self, seg: &'a Segment, entry: MapSlot) -> &'a Slot {
        match entry {
            MapSlot::Live(ix) => seg.slots().get(ix),
            MapSlot::Copy(ix) => &self.copies[ix],
        }
    }

    /// Renumber map entries and the high-water mark after an insertion
    pub(crate) fn note_insert(&mut self, pos: usize) {
        for entry in &mut self.map {
            if let MapSlot::Live(ix) = entry {
                if *ix >= pos {
                    *ix += 1;
                }
            }
        }
        if let Some(hw) = &mut self.highwater {
            if *hw >= pos {
                *hw += 1;
            }
        }
    }

    /// Renumber map entries and the high-water mark after a removal
    ///
    /// Entries naming the removed position must have been repointed to a
    /// copy beforehand.
    pub(crate) fn note_remove(&mut self, pos: usize) {
        for entry in &mut self.map {
            if let MapSlot::Live(ix) = entry {
                debug_assert!(*ix != pos);
                if *ix > pos {
                    *ix -= 1;
                }
            }
        }
        if let Some(hw) = &mut self.highwater {
            if *hw > pos {
                *hw -= 1;
            }
        }
    }
}
