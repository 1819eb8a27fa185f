// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Slot attribute codes and their get/set dispatch
//!
//! The numbering is fixed by the bytecode format: compiled rule programs
//! address attributes by these values. Unknown codes read as zero and
//! ignore writes.

use crate::context::{MapSlot, ShapingContext};
use crate::conv::to_usize;
use crate::data::{Position, Rect};
use crate::face::Face;
use crate::segment::{Segment, Slot, SlotFlags, NUM_JUST_PARAMS};
use crate::silf::Silf;

pub(crate) mod codes {
    pub const ADV_X: u8 = 0;
    pub const ADV_Y: u8 = 1;
    pub const ATT_TO: u8 = 2;
    pub const ATT_X: u8 = 3;
    pub const ATT_Y: u8 = 4;
    pub const ATT_GPT: u8 = 5;
    pub const ATT_X_OFF: u8 = 6;
    pub const ATT_Y_OFF: u8 = 7;
    pub const ATT_WITH_X: u8 = 8;
    pub const ATT_WITH_Y: u8 = 9;
    pub const ATT_WITH_GPT: u8 = 10;
    pub const ATT_WITH_X_OFF: u8 = 11;
    pub const ATT_WITH_Y_OFF: u8 = 12;
    pub const ATT_LEVEL: u8 = 13;
    pub const BREAK: u8 = 14;
    pub const COMP_REF: u8 = 15;
    pub const DIR: u8 = 16;
    pub const INSERT: u8 = 17;
    pub const POS_X: u8 = 18;
    pub const POS_Y: u8 = 19;
    pub const SHIFT_X: u8 = 20;
    pub const SHIFT_Y: u8 = 21;
    pub const USER_DEFN_V1: u8 = 22;
    pub const MEASURE_SOL: u8 = 23;
    pub const MEASURE_EOL: u8 = 24;
    pub const J_STRETCH: u8 = 25;
    pub const J_WIDTH: u8 = 29;
    pub const SEG_SPLIT: u8 = J_STRETCH + 29;
    pub const USER_DEFN: u8 = 55;
    pub const BIDI_LEVEL: u8 = 56;
    pub const COL_FLAGS: u8 = 57;
    pub const COL_LIMIT_BL_X: u8 = 58;
    pub const COL_LIMIT_BL_Y: u8 = 59;
    pub const COL_LIMIT_TR_X: u8 = 60;
    pub const COL_LIMIT_TR_Y: u8 = 61;
    pub const COL_SHIFT_X: u8 = 62;
    pub const COL_SHIFT_Y: u8 = 63;
    pub const COL_MARGIN: u8 = 64;
    pub const COL_MARGIN_WT: u8 = 65;
    pub const COL_EXCL_GLYPH: u8 = 66;
    pub const COL_EXCL_OFF_X: u8 = 67;
    pub const COL_EXCL_OFF_Y: u8 = 68;
    pub const SEQ_CLASS: u8 = 69;
    pub const SEQ_PROX_CLASS: u8 = 70;
    pub const SEQ_ORDER: u8 = 71;
    pub const SEQ_ABOVE_XOFF: u8 = 72;
    pub const SEQ_ABOVE_WT: u8 = 73;
    pub const SEQ_BELOW_XLIM: u8 = 74;
    pub const SEQ_BELOW_WT: u8 = 75;
    pub const SEQ_VALIGN_HT: u8 = 76;
    pub const SEQ_VALIGN_WT: u8 = 77;
}

use codes::*;

/// Is `code` in the justification-data range (levels × 5 values)?
fn justify_code(code: u8) -> Option<(usize, usize)> {
    if (J_STRETCH..J_STRETCH + 20).contains(&code) && code != J_WIDTH {
        let i = usize::from(code - J_STRETCH);
        Some((i / NUM_JUST_PARAMS, i % NUM_JUST_PARAMS))
    } else {
        None
    }
}

/// Read a justification value, falling back to the font's glyph attributes
/// while the slot has no private justify data.
pub(crate) fn get_justify(
    face: &Face,
    silf: &Silf,
    slot: &Slot,
    level: usize,
    subindex: usize,
) -> i32 {
    if level != 0 && level >= silf.num_just_levels() {
        return 0;
    }
    if slot.has_justify() {
        return i32::from(slot.just_data(level, subindex));
    }
    if level >= silf.num_just_levels() {
        return 0;
    }
    let j = &silf.just_attrs()[level];
    let attr = match subindex {
        0 => j.stretch,
        1 => j.shrink,
        2 => j.step,
        3 => j.weight,
        _ => return 0,
    };
    i32::from(face.glyph_attr(slot.gid(), u16::from(attr)))
}

/// Write a justification value, materializing the slot's justify data from
/// the font's attributes on first use.
pub(crate) fn set_justify(
    seg: &mut Segment,
    face: &Face,
    silf: &Silf,
    slot_ix: usize,
    level: usize,
    subindex: usize,
    value: i16,
) {
    if level != 0 && level >= silf.num_just_levels() {
        return;
    }
    let num_levels = silf.num_just_levels().max(1);
    if !seg.slots().get(slot_ix).has_justify() {
        let gid = seg.slots().get(slot_ix).gid();
        let mut justs = vec![0i16; num_levels * NUM_JUST_PARAMS];
        for (i, j) in silf.just_attrs().iter().enumerate() {
            let v = &mut justs[i * NUM_JUST_PARAMS..];
            v[0] = face.glyph_attr(gid, u16::from(j.stretch));
            v[1] = face.glyph_attr(gid, u16::from(j.shrink));
            v[2] = face.glyph_attr(gid, u16::from(j.step));
            v[3] = face.glyph_attr(gid, u16::from(j.weight));
        }
        seg.slots_mut().get_mut(slot_ix).attrs.justs = justs;
    }
    seg.slots_mut()
        .get_mut(slot_ix)
        .set_just_data(level, subindex, value);
}

/// Read slot attribute `code` from `slot`
pub(crate) fn get(
    seg: &Segment,
    face: &Face,
    silf: &Silf,
    slot: &Slot,
    code: u8,
    subindex: u8,
) -> i32 {
    if let Some((level, sub)) = justify_code(code) {
        return get_justify(face, silf, slot, level, sub);
    }
    let coll = |f: &dyn Fn(&crate::collision::SlotCollision) -> i32| -> i32 {
        seg.collision_info_by_index(slot.index).map(f).unwrap_or(0)
    };
    match code {
        ADV_X => slot.advance.x as i32,
        ADV_Y => slot.advance.y as i32,
        ATT_TO => i32::from(slot.parent_offset != 0),
        ATT_X => slot.attach.x as i32,
        ATT_Y => slot.attach.y as i32,
        ATT_GPT | ATT_X_OFF | ATT_Y_OFF => 0,
        ATT_WITH_X => slot.with.x as i32,
        ATT_WITH_Y => slot.with.y as i32,
        ATT_WITH_GPT | ATT_WITH_X_OFF | ATT_WITH_Y_OFF => 0,
        ATT_LEVEL => i32::from(slot.att_level),
        BREAK => seg
            .char_info(to_usize(slot.original))
            .map(|c| i32::from(c.break_weight()))
            .unwrap_or(0),
        COMP_REF => 0,
        DIR => i32::from(seg.dir() & 1),
        INSERT => i32::from(slot.can_insert_before()),
        POS_X => slot.position.x as i32,
        POS_Y => slot.position.y as i32,
        SHIFT_X => slot.shift.x as i32,
        SHIFT_Y => slot.shift.y as i32,
        MEASURE_SOL | MEASURE_EOL => -1,
        J_WIDTH => slot.just as i32,
        USER_DEFN_V1 => i32::from(slot.user_attr(0)),
        USER_DEFN => i32::from(slot.user_attr(usize::from(subindex))),
        SEG_SPLIT => seg
            .char_info(to_usize(slot.original))
            .map(|c| i32::from(c.flags() & 3))
            .unwrap_or(0),
        BIDI_LEVEL => i32::from(slot.bidi_level),
        COL_FLAGS => coll(&|c| i32::from(c.flags_raw())),
        COL_LIMIT_BL_X => coll(&|c| c.limit().bl.x as i32),
        COL_LIMIT_BL_Y => coll(&|c| c.limit().bl.y as i32),
        COL_LIMIT_TR_X => coll(&|c| c.limit().tr.x as i32),
        COL_LIMIT_TR_Y => coll(&|c| c.limit().tr.y as i32),
        COL_SHIFT_X => coll(&|c| c.offset().x as i32),
        COL_SHIFT_Y => coll(&|c| c.offset().y as i32),
        COL_MARGIN => coll(&|c| i32::from(c.margin())),
        COL_MARGIN_WT => coll(&|c| i32::from(c.margin_wt())),
        COL_EXCL_GLYPH => coll(&|c| i32::from(c.excl_glyph())),
        COL_EXCL_OFF_X => coll(&|c| c.excl_offset().x as i32),
        COL_EXCL_OFF_Y => coll(&|c| c.excl_offset().y as i32),
        SEQ_CLASS => coll(&|c| i32::from(c.seq_class())),
        SEQ_PROX_CLASS => coll(&|c| i32::from(c.seq_prox_class())),
        SEQ_ORDER => coll(&|c| i32::from(c.seq_order())),
        SEQ_ABOVE_XOFF => coll(&|c| i32::from(c.seq_above_xoff())),
        SEQ_ABOVE_WT => coll(&|c| i32::from(c.seq_above_wt())),
        SEQ_BELOW_XLIM => coll(&|c| i32::from(c.seq_below_xlim())),
        SEQ_BELOW_WT => coll(&|c| i32::from(c.seq_below_wt())),
        SEQ_VALIGN_HT => coll(&|c| i32::from(c.seq_valign_ht())),
        SEQ_VALIGN_WT => coll(&|c| i32::from(c.seq_valign_wt())),
        _ => 0,
    }
}

/// Write slot attribute `code` on the buffer slot at `slot_ix`
pub(crate) fn set(
    seg: &mut Segment,
    face: &Face,
    silf: &Silf,
    ctxt: &ShapingContext,
    slot_ix: usize,
    code: u8,
    subindex: u8,
    value: i16,
) {
    let (code, subindex) = if code == USER_DEFN_V1 {
        if silf.num_user() == 0 {
            return;
        }
        (USER_DEFN, 0)
    } else {
        (code, subindex)
    };
    if let Some((level, sub)) = justify_code(code) {
        return set_justify(seg, face, silf, slot_ix, level, sub, value);
    }

    macro_rules! coll_set {
        (|$c:ident| $body:expr) => {{
            let index = seg.slots().get(slot_ix).index;
            if let Some($c) = seg.collision_info_by_index_mut(index) {
                $body;
                $c.clear_known();
            }
        }};
    }

    match code {
        ADV_X => seg.slots_mut().get_mut(slot_ix).advance.x = f32::from(value),
        ADV_Y => seg.slots_mut().get_mut(slot_ix).advance.y = f32::from(value),
        ATT_TO => set_attach(seg, ctxt, slot_ix, value, subindex),
        ATT_X => seg.slots_mut().get_mut(slot_ix).attach.x = f32::from(value),
        ATT_Y => seg.slots_mut().get_mut(slot_ix).attach.y = f32::from(value),
        ATT_WITH_X => seg.slots_mut().get_mut(slot_ix).with.x = f32::from(value),
        ATT_WITH_Y => seg.slots_mut().get_mut(slot_ix).with.y = f32::from(value),
        ATT_LEVEL => seg.slots_mut().get_mut(slot_ix).att_level = value as u8,
        BREAK => {
            let original = to_usize(seg.slots().get(slot_ix).original);
            if let Some(c) = seg.charinfo_mut(original) {
                c.break_weight = value;
            }
        }
        INSERT => {
            let s = seg.slots_mut().get_mut(slot_ix);
            s.set_flag(SlotFlags::INSERTED, value == 0);
        }
        SHIFT_X => seg.slots_mut().get_mut(slot_ix).shift.x = f32::from(value),
        SHIFT_Y => seg.slots_mut().get_mut(slot_ix).shift.y = f32::from(value),
        J_WIDTH => seg.slots_mut().get_mut(slot_ix).just = f32::from(value),
        SEG_SPLIT => {
            let original = to_usize(seg.slots().get(slot_ix).original);
            if let Some(c) = seg.charinfo_mut(original) {
                c.flags |= (value & 3) as u8;
            }
        }
        USER_DEFN => seg
            .slots_mut()
            .get_mut(slot_ix)
            .set_user_attr(usize::from(subindex), value),
        COL_FLAGS => coll_set!(|c| c.set_flags_raw(value as u16)),
        COL_LIMIT_BL_X => coll_set!(|c| {
            let l = c.limit();
            c.set_limit(Rect::new(Position::new(f32::from(value), l.bl.y), l.tr))
        }),
        COL_LIMIT_BL_Y => coll_set!(|c| {
            let l = c.limit();
            c.set_limit(Rect::new(Position::new(l.bl.x, f32::from(value)), l.tr))
        }),
        COL_LIMIT_TR_X => coll_set!(|c| {
            let l = c.limit();
            c.set_limit(Rect::new(l.bl, Position::new(f32::from(value), l.tr.y)))
        }),
        COL_LIMIT_TR_Y => coll_set!(|c| {
            let l = c.limit();
            c.set_limit(Rect::new(l.bl, Position::new(l.tr.x, f32::from(value))))
        }),
        COL_MARGIN => coll_set!(|c| c.set_margin(value)),
        COL_MARGIN_WT => coll_set!(|c| c.set_margin_wt(value)),
        COL_EXCL_GLYPH => coll_set!(|c| c.set_excl_glyph(value as u16)),
        COL_EXCL_OFF_X => coll_set!(|c| {
            let o = c.excl_offset();
            c.set_excl_offset(Position::new(f32::from(value), o.y))
        }),
        COL_EXCL_OFF_Y => coll_set!(|c| {
            let o = c.excl_offset();
            c.set_excl_offset(Position::new(o.x, f32::from(value)))
        }),
        SEQ_CLASS => coll_set!(|c| c.set_seq_class(value as u16)),
        SEQ_PROX_CLASS => coll_set!(|c| c.set_seq_prox_class(value as u16)),
        SEQ_ORDER => coll_set!(|c| c.set_seq_order(value as u16)),
        SEQ_ABOVE_XOFF => coll_set!(|c| c.set_seq_above_xoff(value)),
        SEQ_ABOVE_WT => coll_set!(|c| c.set_seq_above_wt(value)),
        SEQ_BELOW_XLIM => coll_set!(|c| c.set_seq_below_xlim(value)),
        SEQ_BELOW_WT => coll_set!(|c| c.set_seq_below_wt(value)),
        SEQ_VALIGN_HT => coll_set!(|c| c.set_seq_valign_ht(value)),
        SEQ_VALIGN_WT => coll_set!(|c| c.set_seq_valign_wt(value)),
        // POS_X, POS_Y, DIR, COMP_REF, MEASURE_*, the GPT and OFF variants:
        // not writable from rule programs.
        _ => {}
    }
}

/// Attach `slot_ix` to the slot at map position `value`
fn set_attach(seg: &mut Segment, ctxt: &ShapingContext, slot_ix: usize, value: i16, subindex: u8) {
    let idx = value as u16 as usize;
    let Some(&MapSlot::Live(other)) = ctxt.map.get(idx) else {
        return;
    };
    if other == slot_ix || Some(other) == seg.slots().parent_ix(slot_ix) {
        return;
    }
    if let Some(parent) = seg.slots().parent_ix(slot_ix) {
        seg.slots_mut().remove_child(parent, slot_ix);
    }
    // Refuse attachment cycles and over-deep chains.
    let mut count = 0;
    let mut found = false;
    let mut p = Some(other);
    while let Some(i) = p {
        count += 1;
        if i == slot_ix {
            found = true;
        }
        if count >= 100 {
            break;
        }
        p = seg.slots().parent_ix(i);
    }
    if count < 100 && !found && seg.slots_mut().add_child(other, slot_ix) {
        if (ctxt.dir != 0) ^ (idx > usize::from(subindex)) {
            let adv = seg.slots().get(slot_ix).advance();
            seg.slots_mut().get_mut(slot_ix).with = Position::new(adv, 0.0);
        } else {
            let adv = seg.slots().get(other).advance();
            seg.slots_mut().get_mut(slot_ix).attach = Position::new(adv, 0.0);
        }
    }
}
