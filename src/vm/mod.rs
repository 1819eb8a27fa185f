// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! The rule virtual machine
//!
//! A stack machine evaluating one constraint or action program against a
//! window of slots. The cursor walks the rule input map; the output slot
//! tracks the corresponding buffer position. Errors never unwind: the
//! machine records a status and stops, and the enclosing pass aborts the
//! shape.

pub(crate) mod code;

pub use code::CodeStatus;
pub(crate) use code::{Code, CodeLimits, Instr};

use crate::context::{MapSlot, ShapingContext};
use crate::conv::to_usize;
use crate::face::glyphs::Metric;
use crate::face::Face;
use crate::segment::{attrs, Segment, Slot, SlotFlags};
use crate::silf::Silf;

/// Stack capacity in 32-bit entries
const STACK_MAX: usize = 1024;

/// Why a program stopped
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MachineStatus {
    #[default]
    Finished,
    StackUnderflow,
    StackNotEmpty,
    StackOverflow,
    SlotOffsetOutBounds,
    DiedEarly,
}

impl std::fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MachineStatus::Finished => "finished",
            MachineStatus::StackUnderflow => "stack underflow",
            MachineStatus::StackNotEmpty => "stack not empty",
            MachineStatus::StackOverflow => "stack overflow",
            MachineStatus::SlotOffsetOutBounds => "slot offset out of bounds",
            MachineStatus::DiedEarly => "died early",
        })
    }
}

pub(crate) struct Machine {
    stack: Vec<i32>,
    status: MachineStatus,
}

impl Machine {
    pub(crate) fn new() -> Self {
        Machine {
            stack: Vec::with_capacity(STACK_MAX),
            status: MachineStatus::Finished,
        }
    }

    pub(crate) fn status(&self) -> MachineStatus {
        self.status
    }

    pub(crate) fn reset_status(&mut self) {
        self.status = MachineStatus::Finished;
    }

    fn push(&mut self, v: i32) {
        if self.stack.len() >= STACK_MAX {
            self.status = MachineStatus::StackOverflow;
        } else {
            self.stack.push(v);
        }
    }

    fn pop(&mut self) -> i32 {
        match self.stack.pop() {
            Some(v) => v,
            None => {
                self.status = MachineStatus::StackUnderflow;
                0
            }
        }
    }

    /// Execute `prog`
    ///
    /// `map_pos` is the cursor into the context map and `os` the buffer
    /// index of the current output slot; both are advanced in place.
    /// Returns the program's single result value (0 on error).
    pub(crate) fn run(
        &mut self,
        face: &Face,
        silf: &Silf,
        seg: &mut Segment,
        ctxt: &mut ShapingContext,
        prog: &Code,
        map_pos: &mut usize,
        os: &mut usize,
    ) -> i32 {
        self.stack.clear();
        self.status = MachineStatus::Finished;
        // map position of the rule anchor at entry
        let isb = ctxt.context();
        let mut positioned = false;

        let mut ip = 0;
        let instrs = prog.instrs();
        while ip < instrs.len() && self.status == MachineStatus::Finished {
            let instr = &instrs[ip];
            ip += 1;
            match instr {
                Instr::PushByte(v) => self.push(i32::from(*v)),
                Instr::PushByteU(v) => self.push(i32::from(*v)),
                Instr::PushShort(v) => self.push(i32::from(*v)),
                Instr::PushShortU(v) => self.push(i32::from(*v)),
                Instr::PushLong(v) => self.push(*v),

                Instr::Add => self.binop(|a, b| a.wrapping_add(b)),
                Instr::Sub => self.binop(|a, b| a.wrapping_sub(b)),
                Instr::Mul => self.binop(|a, b| a.wrapping_mul(b)),
                Instr::Div => {
                    let b = self.pop();
                    let a = self.pop();
                    if b == 0 || (a == i32::MIN && b == -1) {
                        self.status = MachineStatus::DiedEarly;
                    } else {
                        self.push(a / b);
                    }
                }
                Instr::Min => self.binop(|a, b| a.min(b)),
                Instr::Max => self.binop(|a, b| a.max(b)),
                Instr::Neg => {
                    let v = self.pop();
                    self.push(v.wrapping_neg());
                }
                Instr::Trunc8 => {
                    let v = self.pop();
                    self.push(v & 0xFF);
                }
                Instr::Trunc16 => {
                    let v = self.pop();
                    self.push(v & 0xFFFF);
                }
                Instr::Cond => {
                    let f = self.pop();
                    let t = self.pop();
                    let test = self.pop();
                    self.push(if test != 0 { t } else { f });
                }

                Instr::And => self.binop(|a, b| i32::from(a != 0 && b != 0)),
                Instr::Or => self.binop(|a, b| i32::from(a != 0 || b != 0)),
                Instr::Not => {
                    let v = self.pop();
                    self.push(i32::from(v == 0));
                }
                Instr::Equal => self.binop(|a, b| i32::from(a == b)),
                Instr::NotEq => self.binop(|a, b| i32::from(a != b)),
                Instr::Less => self.binop(|a, b| i32::from(a < b)),
                Instr::Gtr => self.binop(|a, b| i32::from(a > b)),
                Instr::LessEq => self.binop(|a, b| i32::from(a <= b)),
                Instr::GtrEq => self.binop(|a, b| i32::from(a >= b)),
                Instr::BitOr => self.binop(|a, b| a | b),
                Instr::BitAnd => self.binop(|a, b| a & b),
                Instr::BitNot => {
                    let v = self.pop();
                    self.push(!v);
                }
                Instr::BitSet => {
                    let mask = self.pop();
                    let flag = self.pop();
                    let v = self.pop();
                    self.push(if flag != 0 { v | mask } else { v & !mask });
                }

                Instr::Next | Instr::CopyNext => {
                    if *map_pos >= ctxt.map.len() {
                        self.status = MachineStatus::SlotOffsetOutBounds;
                        continue;
                    }
                    if matches!(instr, Instr::CopyNext) && *os < seg.slots().end() {
                        let s = seg.slots_mut().get_mut(*os);
                        s.set_flag(SlotFlags::COPIED, false);
                        s.set_flag(SlotFlags::DELETED, false);
                    }
                    if ctxt.highwater() == Some(*os) {
                        ctxt.set_highpassed(true);
                    }
                    *map_pos += 1;
                    if *os < seg.slots().end() {
                        *os += 1;
                    }
                }

                Instr::PutGlyph(class) => {
                    if *os < seg.slots().end() {
                        let gid = silf.get_class_glyph(*class, 0);
                        seg.set_slot_glyph(face, silf, *os, gid);
                    }
                }
                Instr::PutSubs {
                    slot,
                    class_in,
                    class_out,
                } => {
                    if *os < seg.slots().end() {
                        if let Some(entry) = slotat(ctxt, *map_pos, *slot) {
                            let gid = ctxt.resolve(seg, entry).gid();
                            let index = silf.find_class_index(*class_in, gid);
                            let out = silf.get_class_glyph(*class_out, index);
                            seg.set_slot_glyph(face, silf, *os, out);
                        }
                    }
                }
                Instr::PutCopy(r) => {
                    if *os < seg.slots().end() {
                        if let Some(entry) = slotat(ctxt, *map_pos, *r) {
                            if entry != MapSlot::Live(*os) {
                                let content = ctxt.resolve(seg, entry).clone();
                                seg.slots_mut().get_mut(*os).copy_content_from(&content);
                            }
                            let s = seg.slots_mut().get_mut(*os);
                            s.set_flag(SlotFlags::COPIED, false);
                            s.set_flag(SlotFlags::DELETED, false);
                        }
                    }
                }

                Instr::Insert => {
                    if ctxt.dec_max() <= 0 || !seg.can_grow() {
                        self.status = MachineStatus::DiedEarly;
                        continue;
                    }
                    let at = *os;
                    let end = seg.slots().end();
                    let (before, after, original) = if at < end {
                        let next = seg.slots().get(at);
                        if at > 0 {
                            let prev = seg.slots().get(at - 1);
                            (prev.after, next.before, next.original)
                        } else {
                            (next.before, next.before, next.original)
                        }
                    } else if end > 0 {
                        let last = seg.slots().get(end - 1);
                        (last.before, last.after, last.original)
                    } else {
                        (0, 0, 0)
                    };
                    let mut slot = Slot::new(silf.num_user());
                    slot.before = before;
                    slot.after = after;
                    slot.original = original;
                    slot.index = seg.take_index();
                    slot.set_flag(SlotFlags::INSERTED, true);
                    seg.slots_mut().insert(at, slot);
                    ctxt.note_insert(at);
                }

                Instr::Delete => {
                    let at = *os;
                    if at >= seg.slots().end() || seg.slots().get(at).is_deleted() {
                        self.status = MachineStatus::DiedEarly;
                        continue;
                    }
                    seg.slots_mut().get_mut(at).set_flag(SlotFlags::DELETED, true);
                    // Detach from the cluster graph before removal.
                    if let Some(parent) = seg.slots().parent_ix(at) {
                        seg.slots_mut().remove_child(parent, at);
                    }
                    let children: Vec<usize> = seg.slots().children(at).collect();
                    for c in children {
                        seg.slots_mut().remove_child(at, c);
                    }
                    if seg.slots().get(at).is_cluster_head() {
                        let next = at + 1;
                        if next < seg.slots().end() {
                            seg.slots_mut()
                                .get_mut(next)
                                .set_flag(SlotFlags::CLUSTER_HEAD, true);
                        }
                    }
                    // Any map entry still naming this position reads a copy
                    // from now on.
                    for i in 0..ctxt.map.len() {
                        if ctxt.map[i] == MapSlot::Live(at) {
                            let mut copy = seg.slots().get(at).clone();
                            copy.parent_offset = 0;
                            copy.set_flag(SlotFlags::COPIED, true);
                            ctxt.copies.push(copy);
                            ctxt.map[i] = MapSlot::Copy(ctxt.copies.len() - 1);
                        }
                    }
                    seg.slots_mut().remove(at);
                    ctxt.note_remove(at);
                    *os = at.saturating_sub(1);
                }

                Instr::Assoc(refs) => {
                    let mut min = -1i32;
                    let mut max = -1i32;
                    for r in refs {
                        if let Some(entry) = slotat(ctxt, *map_pos, *r) {
                            let s = ctxt.resolve(seg, entry);
                            if min == -1 || s.before() < min {
                                min = s.before();
                            }
                            if s.after() > max {
                                max = s.after();
                            }
                        }
                    }
                    if min != -1 && *os < seg.slots().end() {
                        let s = seg.slots_mut().get_mut(*os);
                        s.before = min;
                        s.after = max;
                    }
                }

                Instr::CntxtItem { offset, skip } => {
                    if *map_pos as i64 - isb as i64 != i64::from(*offset) {
                        ip += usize::from(*skip);
                        self.push(1);
                    }
                }

                Instr::AttrSet(code) => {
                    let val = self.pop();
                    if *os < seg.slots().end() {
                        attrs::set(seg, face, silf, ctxt, *os, *code, 0, val as i16);
                    }
                }
                Instr::AttrAdd(code) | Instr::AttrSub(code) => {
                    let val = self.pop();
                    if *os >= seg.slots().end() {
                        continue;
                    }
                    if matches!(*code, attrs::codes::POS_X | attrs::codes::POS_Y) && !positioned {
                        position_map_range(face, silf, seg, ctxt);
                        positioned = true;
                    }
                    let res = attrs::get(seg, face, silf, seg.slots().get(*os), *code, 0);
                    let new = if matches!(instr, Instr::AttrAdd(_)) {
                        res.wrapping_add(val)
                    } else {
                        res.wrapping_sub(val)
                    };
                    attrs::set(seg, face, silf, ctxt, *os, *code, 0, new as i16);
                }
                Instr::AttrSetSlot(code) => {
                    let offset = if *code == attrs::codes::ATT_TO {
                        *map_pos as i32
                    } else {
                        0
                    };
                    let val = self.pop().wrapping_add(offset);
                    if *os < seg.slots().end() {
                        attrs::set(seg, face, silf, ctxt, *os, *code, offset as u8, val as i16);
                    }
                }
                Instr::IAttrSetSlot(code, idx) => {
                    let offset = if *code == attrs::codes::ATT_TO {
                        *map_pos as i32
                    } else {
                        0
                    };
                    let val = self.pop().wrapping_add(offset);
                    if *os < seg.slots().end() {
                        attrs::set(seg, face, silf, ctxt, *os, *code, *idx, val as i16);
                    }
                }
                Instr::IAttrSet(code, idx) => {
                    let val = self.pop();
                    if *os < seg.slots().end() {
                        attrs::set(seg, face, silf, ctxt, *os, *code, *idx, val as i16);
                    }
                }
                Instr::IAttrAdd(code, idx) | Instr::IAttrSub(code, idx) => {
                    let val = self.pop();
                    if *os >= seg.slots().end() {
                        continue;
                    }
                    if matches!(*code, attrs::codes::POS_X | attrs::codes::POS_Y) && !positioned {
                        position_map_range(face, silf, seg, ctxt);
                        positioned = true;
                    }
                    let res = attrs::get(seg, face, silf, seg.slots().get(*os), *code, *idx);
                    let new = if matches!(instr, Instr::IAttrAdd(..)) {
                        res.wrapping_add(val)
                    } else {
                        res.wrapping_sub(val)
                    };
                    attrs::set(seg, face, silf, ctxt, *os, *code, *idx, new as i16);
                }

                Instr::PushSlotAttr(code, r) => {
                    if matches!(*code, attrs::codes::POS_X | attrs::codes::POS_Y) && !positioned {
                        position_map_range(face, silf, seg, ctxt);
                        positioned = true;
                    }
                    if let Some(entry) = slotat(ctxt, *map_pos, *r) {
                        let v = attrs::get(seg, face, silf, ctxt.resolve(seg, entry), *code, 0);
                        self.push(v);
                    }
                }
                Instr::PushGlyphAttr(attr, r) => {
                    if let Some(entry) = slotat(ctxt, *map_pos, *r) {
                        let gid = ctxt.resolve(seg, entry).gid();
                        self.push(i32::from(face.glyph_attr(gid, *attr)));
                    }
                }
                Instr::PushGlyphMetric(metric, r, level) => {
                    if let Some(entry) = slotat(ctxt, *map_pos, *r) {
                        let v = glyph_metric(face, seg, ctxt, entry, *metric, *level);
                        self.push(v);
                    }
                }
                Instr::PushFeat(feat, r) => {
                    if let Some(entry) = slotat(ctxt, *map_pos, *r) {
                        let original = ctxt.resolve(seg, entry).original();
                        let fid = seg
                            .char_info(to_usize(original))
                            .map(|c| c.feature_index)
                            .unwrap_or(0);
                        self.push(seg.get_feature(face, fid, *feat) as i32);
                    }
                }
                Instr::PushAttToGlyphAttr(attr, r) => {
                    if let Some(entry) = slotat(ctxt, *map_pos, *r) {
                        let gid = match entry {
                            MapSlot::Live(ix) => {
                                let p = seg.slots().parent_ix(ix).unwrap_or(ix);
                                seg.slots().get(p).gid()
                            }
                            MapSlot::Copy(_) => ctxt.resolve(seg, entry).gid(),
                        };
                        self.push(i32::from(face.glyph_attr(gid, *attr)));
                    }
                }
                Instr::PushAttToGlyphMetric(metric, r, level) => {
                    if let Some(entry) = slotat(ctxt, *map_pos, *r) {
                        let entry = match entry {
                            MapSlot::Live(ix) => {
                                MapSlot::Live(seg.slots().parent_ix(ix).unwrap_or(ix))
                            }
                            copy => copy,
                        };
                        let v = glyph_metric(face, seg, ctxt, entry, *metric, *level);
                        self.push(v);
                    }
                }
                Instr::PushISlotAttr(code, r, idx) => {
                    if let Some(entry) = slotat(ctxt, *map_pos, *r) {
                        let v = attrs::get(seg, face, silf, ctxt.resolve(seg, entry), *code, *idx);
                        self.push(v);
                    }
                }
                Instr::PushProcState => self.push(1),
                Instr::PushVersion => self.push(0x0003_0000),

                Instr::SetFeat(feat, r) => {
                    let val = self.pop();
                    if let Some(entry) = slotat(ctxt, *map_pos, *r) {
                        let original = ctxt.resolve(seg, entry).original();
                        let fid = seg
                            .char_info(to_usize(original))
                            .map(|c| c.feature_index)
                            .unwrap_or(0);
                        seg.set_feature(face, fid, *feat, val as u32);
                    }
                }

                Instr::TempCopy => {
                    if *os < seg.slots().end() && *map_pos < ctxt.map.len() {
                        let mut copy = seg.slots().get(*os).clone();
                        copy.parent_offset = 0;
                        copy.set_flag(SlotFlags::COPIED, true);
                        ctxt.copies.push(copy);
                        ctxt.map[*map_pos] = MapSlot::Copy(ctxt.copies.len() - 1);
                    }
                }

                Instr::PopRet => break,
                Instr::RetZero => {
                    self.push(0);
                    break;
                }
                Instr::RetTrue => {
                    self.push(1);
                    break;
                }
            }
        }

        let ret = if self.stack.len() == 1 {
            self.stack.pop().unwrap()
        } else {
            0
        };
        if self.status == MachineStatus::Finished && !self.stack.is_empty() {
            self.status = MachineStatus::StackNotEmpty;
        }
        ret
    }

    fn binop(&mut self, f: impl Fn(i32, i32) -> i32) {
        let b = self.pop();
        let a = self.pop();
        self.push(f(a, b));
    }
}

/// Map entry at `map_pos + r`, when in range
fn slotat(ctxt: &ShapingContext, map_pos: usize, r: i8) -> Option<MapSlot> {
    let i = map_pos as i64 + i64::from(r);
    if i >= 0 && (i as usize) < ctxt.map.len() {
        Some(ctxt.map[i as usize])
    } else {
        None
    }
}

/// Position the slots covered by the rule input map
fn position_map_range(face: &Face, silf: &Silf, seg: &mut Segment, ctxt: &ShapingContext) {
    let mut live = ctxt.map.iter().filter_map(|e| match e {
        MapSlot::Live(i) => Some(*i),
        MapSlot::Copy(_) => None,
    });
    if let Some(first) = live.next() {
        let last = live.last().unwrap_or(first + 1).max(first + 1);
        let rtl = seg.currdir();
        seg.position_slots(face, silf, None, first, last, rtl, true);
    }
}

/// Glyph metric for a map entry, honoring the attachment level
fn glyph_metric(
    face: &Face,
    seg: &Segment,
    ctxt: &ShapingContext,
    entry: MapSlot,
    metric: u8,
    attr_level: u8,
) -> i32 {
    let Some(metric) = Metric::from_u8(metric) else {
        return 0;
    };
    match entry {
        MapSlot::Live(ix) if attr_level > 0 => {
            seg.cluster_metric(face, seg.slots().base_ix(ix), metric)
        }
        _ => face.glyph_metric(ctxt.resolve(seg, entry).glyph(), metric),
    }
}
