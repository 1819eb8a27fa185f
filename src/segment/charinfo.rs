// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Per-character info retained through shaping

/// Information about one input character
///
/// `before` and `after` are slot indices after shaping: the nearest slots a
/// cursor before (after) this character may be associated with.
#[derive(Clone, Debug, Default)]
pub struct CharInfo {
    pub(crate) unicode: u32,
    /// Offset of this character in the original input, in code units
    pub(crate) base: u32,
    pub(crate) before: i32,
    pub(crate) after: i32,
    pub(crate) break_weight: i16,
    /// Index into the segment's feature-value list
    pub(crate) feature_index: u16,
    pub(crate) flags: u8,
}

impl CharInfo {
    /// The Unicode scalar value
    pub fn unicode(&self) -> u32 {
        self.unicode
    }

    /// Offset in the original input, in code units of the input encoding
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Slot index for cursor placement before this character
    pub fn before(&self) -> i32 {
        self.before
    }

    /// Slot index for cursor placement after this character
    pub fn after(&self) -> i32 {
        self.after
    }

    pub fn break_weight(&self) -> i16 {
        self.break_weight
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }
}
