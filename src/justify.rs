// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Justification: distributing a target width across stretchable slots
//!
//! Levels run from the highest down to zero; level 0 writes directly into
//! each slot's `just` width, the others into per-slot justification data
//! consumed by the font's own justification passes. Rounding error is
//! carried across slots and redistributed until it falls below one unit or
//! no stretchable weight remains.

use crate::face::{Face, Font};
use crate::segment::{attrs, Segment, Slot};
use crate::silf::Silf;
use bitflags::bitflags;

bitflags! {
    /// Caller flags for [`Segment::justify`]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct JustFlags: u8 {
        /// The range does not start a line; keep leading geometry
        const START_INLINE = 1;
        /// The range does not end a line; keep trailing invisibles
        const END_INLINE = 2;
    }
}

/// Per-level running totals over the stretch range
#[derive(Clone, Copy, Debug, Default)]
struct JustifyTotal {
    num_glyphs: u32,
    stretch: i64,
    shrink: i64,
    step: i64,
    weight: i64,
}

impl JustifyTotal {
    fn accumulate(&mut self, face: &Face, silf: &Silf, slot: &Slot, level: usize) {
        self.num_glyphs += 1;
        self.stretch += i64::from(attrs::get_justify(face, silf, slot, level, 0));
        self.shrink += i64::from(attrs::get_justify(face, silf, slot, level, 1));
        self.step += i64::from(attrs::get_justify(face, silf, slot, level, 2));
        self.weight += i64::from(attrs::get_justify(face, silf, slot, level, 3));
    }
}

impl Segment {
    /// Stretch or shrink `[first, last]` to reach `width`
    ///
    /// `first`/`last` default to the whole segment. Returns the achieved
    /// advance of the range (scaled by `font`), or `width` unchanged when
    /// the face defines no way to justify.
    pub fn justify(
        &mut self,
        face: &Face,
        font: Option<&Font>,
        width: f32,
        flags: JustFlags,
        first: Option<usize>,
        last: Option<usize>,
    ) -> f32 {
        let Some(silf) = face.silf(0) else {
            return width;
        };
        if self.slots().is_empty() {
            return width;
        }
        let scale = font.map(|f| f.scale()).unwrap_or(1.0);
        if width < 0.0 && silf.flags() == 0 {
            return width;
        }

        let mut first = first.unwrap_or(0).min(self.slots().end() - 1);
        let mut last = last
            .unwrap_or(self.slots().end())
            .clamp(first + 1, self.slots().end())
            - 1;

        let reordered = (self.dir() & 1 != 0) != (silf.dir() & 1 != 0)
            && usize::from(silf.bidi_pass()) != silf.num_passes();
        if reordered {
            self.reverse_slots(face, silf);
            let n = self.slots().end() - 1;
            (first, last) = (n - last, n - first);
        }
        first = self.slots().base_ix(first);
        last = self.slots().base_ix(last);
        if last < first {
            std::mem::swap(&mut first, &mut last);
        }

        let base_x = self.slots().get(first).origin().x / scale;
        let width = width / scale;

        if !flags.contains(JustFlags::END_INLINE) {
            // Trim trailing invisible glyphs off the stretch range.
            while last > first {
                let bbox = face
                    .glyphs()
                    .glyph(self.slots().get(last).glyph())
                    .map(|g| *g.bbox())
                    .unwrap_or_default();
                if bbox.bl.x != 0.0 || bbox.bl.y != 0.0 || bbox.tr.x != 0.0 || bbox.tr.y == 0.0 {
                    break;
                }
                last -= 1;
            }
        }

        let bases: Vec<usize> = (first..=last)
            .filter(|&i| self.slots().get(i).is_base())
            .collect();

        let mut num_levels = silf.num_just_levels();
        if num_levels == 0 {
            // No levels in the font: make whitespace stretchable, or every
            // slot when there is no whitespace at all.
            let mut space_count = 0;
            for &s in &bases {
                let before = self.slots().get(s).before();
                let is_space = self
                    .char_info(before.max(0) as usize)
                    .map(|c| Segment::is_whitespace(c.unicode()))
                    .unwrap_or(false);
                if is_space {
                    attrs::set_justify(self, face, silf, s, 0, 3, 1);
                    attrs::set_justify(self, face, silf, s, 0, 2, 1);
                    attrs::set_justify(self, face, silf, s, 0, 0, -1);
                    space_count += 1;
                }
            }
            if space_count == 0 {
                for &s in &bases {
                    attrs::set_justify(self, face, silf, s, 0, 3, 1);
                    attrs::set_justify(self, face, silf, s, 0, 2, 1);
                    attrs::set_justify(self, face, silf, s, 0, 0, -1);
                }
            }
            num_levels = 1;
        }

        let mut stats = vec![JustifyTotal::default(); num_levels];
        let mut curr_width = 0.0f32;
        for &s in &bases {
            let slot = self.slots().get(s);
            let w = slot.origin().x / scale + slot.advance() - base_x;
            if w > curr_width {
                curr_width = w;
            }
            for (j, stat) in stats.iter_mut().enumerate() {
                stat.accumulate(face, silf, slot, j);
            }
            self.slots_mut().get_mut(s).just = 0.0;
        }

        let top = if width < 0.0 { 0 } else { num_levels };
        for i in (0..top).rev() {
            let mut t_weight = stats[i].weight;
            if t_weight == 0 {
                continue;
            }
            loop {
                let mut error = 0.0f32;
                let diff = width - curr_width;
                let diffpw = diff / t_weight as f32;
                t_weight = 0;
                for &s in &bases {
                    let slot = self.slots().get(s);
                    let w = attrs::get_justify(face, silf, slot, i, 3);
                    let mut pref = diffpw * w as f32 + error;
                    let mut step = attrs::get_justify(face, silf, slot, i, 2);
                    if step == 0 {
                        step = 1; // handle lazy font developers
                    }
                    if pref > 0.0 {
                        let mut max = f32::from(attrs::get_justify(face, silf, slot, i, 0) as u16);
                        if i == 0 {
                            max -= slot.just;
                        }
                        if pref > max {
                            pref = max;
                        } else {
                            t_weight += i64::from(w);
                        }
                    } else {
                        let mut max = f32::from(attrs::get_justify(face, silf, slot, i, 1) as u16);
                        if i == 0 {
                            max += slot.just;
                        }
                        if -pref > max {
                            pref = -max;
                        } else {
                            t_weight += i64::from(w);
                        }
                    }
                    let actual = (pref / step as f32) as i32 * step;
                    if actual != 0 {
                        error += diffpw * w as f32 - actual as f32;
                        if i == 0 {
                            self.slots_mut().get_mut(s).just += actual as f32;
                        } else {
                            attrs::set_justify(self, face, silf, s, i, 4, actual as i16);
                        }
                    }
                }
                curr_width += diff - error;
                if !(i == 0 && error.abs() as i32 > 0 && t_weight != 0) {
                    break;
                }
            }
        }

        let mut pos_first = first;
        let mut pos_last_excl = last + 1;
        if silf.flags() & 1 != 0 && self.can_grow() {
            self.add_line_end(face, silf, pos_last_excl);
            pos_last_excl += 1;
            self.add_line_end(face, silf, pos_first);
            pos_last_excl += 1;
        }

        if silf.justification_pass() != silf.position_pass()
            && (width >= 0.0 || silf.flags() & 1 != 0)
        {
            if let Err(e) = silf.run_graphite(
                face,
                self,
                silf.justification_pass(),
                silf.position_pass(),
                false,
            ) {
                log::warn!("justification passes failed: {}", e);
            }
            pos_first = pos_first.min(self.slots().end());
            pos_last_excl = pos_last_excl.min(self.slots().end());
        }

        let rv = self
            .position_slots(
                face,
                silf,
                font.map(|f| f.scale()),
                pos_first,
                pos_last_excl,
                self.dir() & 1 != 0,
                true,
            )
            .x;

        if reordered {
            self.reverse_slots(face, silf);
        }
        rv
    }

    /// Insert a line-end glyph before `pos`
    fn add_line_end(&mut self, face: &Face, silf: &Silf, pos: usize) {
        let gid = silf.end_line_glyph();
        let mut slot = Slot::new(silf.num_user());
        slot.index = self.take_index();
        let end = self.slots().end();
        if pos < end {
            slot.before = self.slots().get(pos).before();
            slot.after = if pos > 0 {
                self.slots().get(pos - 1).after()
            } else {
                self.slots().get(pos).before()
            };
        } else if end > 0 {
            let prev = self.slots().get(end - 1);
            slot.before = prev.after();
            slot.after = prev.after();
        }
        self.slots_mut().insert(pos, slot);
        self.set_slot_glyph(face, silf, pos, gid);
    }
}
