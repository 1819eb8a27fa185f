// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Bytecode loader and verifier
//!
//! On-disk programs are byte streams of opcodes and inline operands. The
//! loader decodes them once into [`Instr`] values with their operands in
//! place, validating as it goes: operand counts against the program end,
//! slot references against the rule window, class and attribute numbers
//! against the font, and the placement rules for constraint programs. A
//! `temp_copy` is planted before the first content mutation of each window
//! position in an action program, so later references to that position read
//! its pre-rule content.

use smallvec::SmallVec;

/// Outcome of loading one program
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CodeStatus {
    #[default]
    Loaded,
    InvalidOpcode,
    UnimplementedOpcode,
    OutOfRangeData,
    JumpPastEnd,
    ArgumentsExhausted,
    MissingReturn,
    NestedContextItem,
}

impl std::fmt::Display for CodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CodeStatus::Loaded => "loaded",
            CodeStatus::InvalidOpcode => "invalid opcode",
            CodeStatus::UnimplementedOpcode => "unimplemented opcode used",
            CodeStatus::OutOfRangeData => "data argument out of range",
            CodeStatus::JumpPastEnd => "jump past end",
            CodeStatus::ArgumentsExhausted => "arguments exhausted",
            CodeStatus::MissingReturn => "missing return",
            CodeStatus::NestedContextItem => "nested context item",
        })
    }
}

/// One decoded instruction; operands are embedded
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Instr {
    PushByte(i8),
    PushByteU(u8),
    PushShort(i16),
    PushShortU(u16),
    PushLong(i32),
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    Neg,
    Trunc8,
    Trunc16,
    Cond,
    And,
    Or,
    Not,
    Equal,
    NotEq,
    Less,
    Gtr,
    LessEq,
    GtrEq,
    Next,
    CopyNext,
    PutGlyph(u16),
    PutSubs {
        slot: i8,
        class_in: u16,
        class_out: u16,
    },
    PutCopy(i8),
    Insert,
    Delete,
    Assoc(SmallVec<[i8; 4]>),
    /// Skip `skip` decoded instructions unless the cursor sits at `offset`
    CntxtItem {
        offset: i8,
        skip: u16,
    },
    AttrSet(u8),
    AttrAdd(u8),
    AttrSub(u8),
    AttrSetSlot(u8),
    IAttrSetSlot(u8, u8),
    PushSlotAttr(u8, i8),
    PushGlyphAttr(u16, i8),
    PushGlyphMetric(u8, i8, u8),
    PushFeat(u8, i8),
    PushAttToGlyphAttr(u16, i8),
    PushAttToGlyphMetric(u8, i8, u8),
    PushISlotAttr(u8, i8, u8),
    PopRet,
    RetZero,
    RetTrue,
    IAttrSet(u8, u8),
    IAttrAdd(u8, u8),
    IAttrSub(u8, u8),
    PushProcState,
    PushVersion,
    BitOr,
    BitAnd,
    BitNot,
    BitSet,
    SetFeat(u8, i8),
    /// Loader-inserted: preserve the cursor slot's content in the map
    TempCopy,
}

/// Opcode numbering fixed by the font format
mod op {
    pub const NOP: u8 = 0;
    pub const PUSH_BYTE: u8 = 1;
    pub const PUSH_BYTEU: u8 = 2;
    pub const PUSH_SHORT: u8 = 3;
    pub const PUSH_SHORTU: u8 = 4;
    pub const PUSH_LONG: u8 = 5;
    pub const ADD: u8 = 6;
    pub const SUB: u8 = 7;
    pub const MUL: u8 = 8;
    pub const DIV: u8 = 9;
    pub const MIN: u8 = 10;
    pub const MAX: u8 = 11;
    pub const NEG: u8 = 12;
    pub const TRUNC8: u8 = 13;
    pub const TRUNC16: u8 = 14;
    pub const COND: u8 = 15;
    pub const AND: u8 = 16;
    pub const OR: u8 = 17;
    pub const NOT: u8 = 18;
    pub const EQUAL: u8 = 19;
    pub const NOT_EQ: u8 = 20;
    pub const LESS: u8 = 21;
    pub const GTR: u8 = 22;
    pub const LESS_EQ: u8 = 23;
    pub const GTR_EQ: u8 = 24;
    pub const NEXT: u8 = 25;
    pub const NEXT_N: u8 = 26;
    pub const COPY_NEXT: u8 = 27;
    pub const PUT_GLYPH_8BIT_OBS: u8 = 28;
    pub const PUT_SUBS_8BIT_OBS: u8 = 29;
    pub const PUT_COPY: u8 = 30;
    pub const INSERT: u8 = 31;
    pub const DELETE: u8 = 32;
    pub const ASSOC: u8 = 33;
    pub const CNTXT_ITEM: u8 = 34;
    pub const ATTR_SET: u8 = 35;
    pub const ATTR_ADD: u8 = 36;
    pub const ATTR_SUB: u8 = 37;
    pub const ATTR_SET_SLOT: u8 = 38;
    pub const IATTR_SET_SLOT: u8 = 39;
    pub const PUSH_SLOT_ATTR: u8 = 40;
    pub const PUSH_GLYPH_ATTR_OBS: u8 = 41;
    pub const PUSH_GLYPH_METRIC: u8 = 42;
    pub const PUSH_FEAT: u8 = 43;
    pub const PUSH_ATT_TO_GATTR_OBS: u8 = 44;
    pub const PUSH_ATT_TO_GLYPH_METRIC: u8 = 45;
    pub const PUSH_ISLOT_ATTR: u8 = 46;
    pub const PUSH_IGLYPH_ATTR: u8 = 47;
    pub const POP_RET: u8 = 48;
    pub const RET_ZERO: u8 = 49;
    pub const RET_TRUE: u8 = 50;
    pub const IATTR_SET: u8 = 51;
    pub const IATTR_ADD: u8 = 52;
    pub const IATTR_SUB: u8 = 53;
    pub const PUSH_PROC_STATE: u8 = 54;
    pub const PUSH_VERSION: u8 = 55;
    pub const PUT_SUBS: u8 = 56;
    pub const PUT_SUBS2: u8 = 57;
    pub const PUT_SUBS3: u8 = 58;
    pub const PUT_GLYPH: u8 = 59;
    pub const PUSH_GLYPH_ATTR: u8 = 60;
    pub const PUSH_ATT_TO_GLYPH_ATTR: u8 = 61;
    pub const BITOR: u8 = 62;
    pub const BITAND: u8 = 63;
    pub const BITNOT: u8 = 64;
    pub const BITSET: u8 = 65;
    pub const SET_FEAT: u8 = 66;
    pub const MAX_OPCODE: u8 = 67;
}

/// Limits the loader checks operands against
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct CodeLimits {
    pub num_classes: u16,
    pub num_attrs: u16,
    pub num_feats: u16,
}

/// A loaded, verified program
#[derive(Debug, Default)]
pub(crate) struct Code {
    instrs: Vec<Instr>,
    status: CodeStatus,
    constraint: bool,
    /// No opcode mutates the slot stream
    immutable: bool,
    /// Program contains `delete`
    deletes: bool,
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    status: CodeStatus,
}

impl<'a> Decoder<'a> {
    fn byte(&mut self) -> u8 {
        match self.data.get(self.pos) {
            Some(&b) => {
                self.pos += 1;
                b
            }
            None => {
                if self.status == CodeStatus::Loaded {
                    self.status = CodeStatus::ArgumentsExhausted;
                }
                0
            }
        }
    }

    fn i8(&mut self) -> i8 {
        self.byte() as i8
    }

    fn u16(&mut self) -> u16 {
        u16::from_be_bytes([self.byte(), self.byte()])
    }

    fn i32(&mut self) -> i32 {
        i32::from_be_bytes([self.byte(), self.byte(), self.byte(), self.byte()])
    }
}

impl Code {
    /// Decode and verify one program
    ///
    /// `pre_context` and `rule_length` bound the rule window; slot
    /// references must stay inside `[-pre_context, rule_length]`.
    pub(crate) fn load(
        constraint: bool,
        data: &[u8],
        pre_context: u8,
        rule_length: u16,
        limits: CodeLimits,
    ) -> Code {
        let mut code = Code {
            constraint,
            immutable: true,
            ..Default::default()
        };
        if data.is_empty() {
            return code;
        }

        let mut d = Decoder {
            data,
            pos: 0,
            status: CodeStatus::Loaded,
        };
        // current slot offset relative to the rule anchor
        let mut cursor: i32 = 0;
        // window positions whose content has already been preserved
        let mut copied = [false; 256];
        // pending context item: (byte position where the block ends,
        // instruction index of the CntxtItem to patch)
        let mut ctxt_block: Option<(usize, usize)> = None;
        let mut last_was_return = false;

        let check_ref = |cursor: i32, r: i8, status: &mut CodeStatus| {
            let target = cursor + i32::from(r);
            if target < -i32::from(pre_context) || target > i32::from(rule_length) {
                *status = CodeStatus::OutOfRangeData;
            }
        };
        let check_class = |c: u16, status: &mut CodeStatus| {
            if limits.num_classes != 0 && c >= limits.num_classes {
                *status = CodeStatus::OutOfRangeData;
            }
        };

        while d.pos < data.len() && d.status == CodeStatus::Loaded {
            if let Some((end, at)) = ctxt_block {
                match d.pos.cmp(&end) {
                    std::cmp::Ordering::Equal => {
                        let skip = (code.instrs.len() - at - 1) as u16;
                        if let Instr::CntxtItem { skip: s, .. } = &mut code.instrs[at] {
                            *s = skip;
                        }
                        ctxt_block = None;
                    }
                    std::cmp::Ordering::Greater => {
                        // an instruction straddled the block end
                        d.status = CodeStatus::JumpPastEnd;
                        break;
                    }
                    std::cmp::Ordering::Less => {}
                }
            }

            let opcode = d.byte();
            last_was_return = matches!(opcode, op::POP_RET | op::RET_ZERO | op::RET_TRUE);
            let instr = match opcode {
                op::NOP => continue,
                op::PUSH_BYTE => Instr::PushByte(d.i8()),
                op::PUSH_BYTEU => Instr::PushByteU(d.byte()),
                op::PUSH_SHORT => Instr::PushShort(d.u16() as i16),
                op::PUSH_SHORTU => Instr::PushShortU(d.u16()),
                op::PUSH_LONG => Instr::PushLong(d.i32()),
                op::ADD => Instr::Add,
                op::SUB => Instr::Sub,
                op::MUL => Instr::Mul,
                op::DIV => Instr::Div,
                op::MIN => Instr::Min,
                op::MAX => Instr::Max,
                op::NEG => Instr::Neg,
                op::TRUNC8 => Instr::Trunc8,
                op::TRUNC16 => Instr::Trunc16,
                op::COND => Instr::Cond,
                op::AND => Instr::And,
                op::OR => Instr::Or,
                op::NOT => Instr::Not,
                op::EQUAL => Instr::Equal,
                op::NOT_EQ => Instr::NotEq,
                op::LESS => Instr::Less,
                op::GTR => Instr::Gtr,
                op::LESS_EQ => Instr::LessEq,
                op::GTR_EQ => Instr::GtrEq,
                op::NEXT | op::COPY_NEXT => {
                    cursor += 1;
                    if cursor > i32::from(rule_length) {
                        d.status = CodeStatus::OutOfRangeData;
                    }
                    if opcode == op::NEXT {
                        Instr::Next
                    } else {
                        code.immutable = false;
                        Instr::CopyNext
                    }
                }
                op::PUT_GLYPH_8BIT_OBS => {
                    let c = u16::from(d.byte());
                    check_class(c, &mut d.status);
                    code.note_mutation(&mut copied, cursor);
                    Instr::PutGlyph(c)
                }
                op::PUT_SUBS_8BIT_OBS => {
                    let slot = d.i8();
                    let class_in = u16::from(d.byte());
                    let class_out = u16::from(d.byte());
                    check_ref(cursor, slot, &mut d.status);
                    check_class(class_in, &mut d.status);
                    check_class(class_out, &mut d.status);
                    code.note_mutation(&mut copied, cursor);
                    Instr::PutSubs {
                        slot,
                        class_in,
                        class_out,
                    }
                }
                op::PUT_COPY => {
                    let slot = d.i8();
                    check_ref(cursor, slot, &mut d.status);
                    code.note_mutation(&mut copied, cursor);
                    Instr::PutCopy(slot)
                }
                op::INSERT => {
                    code.immutable = false;
                    Instr::Insert
                }
                op::DELETE => {
                    code.deletes = true;
                    code.note_mutation(&mut copied, cursor);
                    Instr::Delete
                }
                op::ASSOC => {
                    let n = d.byte();
                    let mut refs = SmallVec::new();
                    for _ in 0..n {
                        let r = d.i8();
                        check_ref(cursor, r, &mut d.status);
                        refs.push(r);
                    }
                    code.immutable = false;
                    Instr::Assoc(refs)
                }
                op::CNTXT_ITEM => {
                    if ctxt_block.is_some() {
                        d.status = CodeStatus::NestedContextItem;
                        break;
                    }
                    let offset = d.i8();
                    let len = usize::from(d.byte());
                    if d.pos + len > data.len() {
                        d.status = CodeStatus::JumpPastEnd;
                        break;
                    }
                    ctxt_block = Some((d.pos + len, code.instrs.len()));
                    Instr::CntxtItem { offset, skip: 0 }
                }
                op::ATTR_SET => {
                    code.immutable = false;
                    Instr::AttrSet(d.byte())
                }
                op::ATTR_ADD => {
                    code.immutable = false;
                    Instr::AttrAdd(d.byte())
                }
                op::ATTR_SUB => {
                    code.immutable = false;
                    Instr::AttrSub(d.byte())
                }
                op::ATTR_SET_SLOT => {
                    code.immutable = false;
                    Instr::AttrSetSlot(d.byte())
                }
                op::IATTR_SET_SLOT => {
                    code.immutable = false;
                    Instr::IAttrSetSlot(d.byte(), d.byte())
                }
                op::PUSH_SLOT_ATTR => {
                    let a = d.byte();
                    let r = d.i8();
                    check_ref(cursor, r, &mut d.status);
                    Instr::PushSlotAttr(a, r)
                }
                op::PUSH_GLYPH_ATTR_OBS => {
                    let a = u16::from(d.byte());
                    let r = d.i8();
                    check_ref(cursor, r, &mut d.status);
                    Instr::PushGlyphAttr(a, r)
                }
                op::PUSH_GLYPH_METRIC => {
                    let m = d.byte();
                    let r = d.i8();
                    let l = d.byte();
                    check_ref(cursor, r, &mut d.status);
                    Instr::PushGlyphMetric(m, r, l)
                }
                op::PUSH_FEAT => {
                    let f = d.byte();
                    let r = d.i8();
                    check_ref(cursor, r, &mut d.status);
                    if limits.num_feats != 0 && u16::from(f) >= limits.num_feats {
                        d.status = CodeStatus::OutOfRangeData;
                    }
                    Instr::PushFeat(f, r)
                }
                op::PUSH_ATT_TO_GATTR_OBS => {
                    let a = u16::from(d.byte());
                    let r = d.i8();
                    check_ref(cursor, r, &mut d.status);
                    Instr::PushAttToGlyphAttr(a, r)
                }
                op::PUSH_ATT_TO_GLYPH_METRIC => {
                    let m = d.byte();
                    let r = d.i8();
                    let l = d.byte();
                    check_ref(cursor, r, &mut d.status);
                    Instr::PushAttToGlyphMetric(m, r, l)
                }
                op::PUSH_ISLOT_ATTR => {
                    let a = d.byte();
                    let r = d.i8();
                    let i = d.byte();
                    check_ref(cursor, r, &mut d.status);
                    Instr::PushISlotAttr(a, r, i)
                }
                op::POP_RET => Instr::PopRet,
                op::RET_ZERO => Instr::RetZero,
                op::RET_TRUE => Instr::RetTrue,
                op::IATTR_SET => {
                    code.immutable = false;
                    Instr::IAttrSet(d.byte(), d.byte())
                }
                op::IATTR_ADD => {
                    code.immutable = false;
                    Instr::IAttrAdd(d.byte(), d.byte())
                }
                op::IATTR_SUB => {
                    code.immutable = false;
                    Instr::IAttrSub(d.byte(), d.byte())
                }
                op::PUSH_PROC_STATE => {
                    d.byte();
                    Instr::PushProcState
                }
                op::PUSH_VERSION => Instr::PushVersion,
                op::PUT_SUBS => {
                    let slot = d.i8();
                    let class_in = d.u16();
                    let class_out = d.u16();
                    check_ref(cursor, slot, &mut d.status);
                    check_class(class_in, &mut d.status);
                    check_class(class_out, &mut d.status);
                    code.note_mutation(&mut copied, cursor);
                    Instr::PutSubs {
                        slot,
                        class_in,
                        class_out,
                    }
                }
                op::PUT_GLYPH => {
                    let c = d.u16();
                    check_class(c, &mut d.status);
                    code.note_mutation(&mut copied, cursor);
                    Instr::PutGlyph(c)
                }
                op::PUSH_GLYPH_ATTR => {
                    let a = d.u16();
                    let r = d.i8();
                    check_ref(cursor, r, &mut d.status);
                    if limits.num_attrs != 0 && a >= limits.num_attrs {
                        d.status = CodeStatus::OutOfRangeData;
                    }
                    Instr::PushGlyphAttr(a, r)
                }
                op::PUSH_ATT_TO_GLYPH_ATTR => {
                    let a = d.u16();
                    let r = d.i8();
                    check_ref(cursor, r, &mut d.status);
                    Instr::PushAttToGlyphAttr(a, r)
                }
                op::BITOR => Instr::BitOr,
                op::BITAND => Instr::BitAnd,
                op::BITNOT => Instr::BitNot,
                op::BITSET => Instr::BitSet,
                op::SET_FEAT => {
                    code.immutable = false;
                    Instr::SetFeat(d.byte(), d.i8())
                }
                op::NEXT_N | op::PUSH_IGLYPH_ATTR | op::PUT_SUBS2 | op::PUT_SUBS3 => {
                    d.status = CodeStatus::UnimplementedOpcode;
                    break;
                }
                _ => {
                    d.status = CodeStatus::InvalidOpcode;
                    break;
                }
            };

            // A context item is only meaningful inside a constraint.
            if !constraint && matches!(instr, Instr::CntxtItem { .. }) {
                d.status = CodeStatus::InvalidOpcode;
                break;
            }
            code.instrs.push(instr);
        }

        if d.status == CodeStatus::Loaded {
            if let Some((end, at)) = ctxt_block {
                if d.pos == end {
                    let skip = (code.instrs.len() - at - 1) as u16;
                    if let Instr::CntxtItem { skip: s, .. } = &mut code.instrs[at] {
                        *s = skip;
                    }
                } else {
                    d.status = CodeStatus::JumpPastEnd;
                }
            }
        }
        if d.status == CodeStatus::Loaded && !last_was_return {
            d.status = CodeStatus::MissingReturn;
        }
        code.status = d.status;
        if code.status != CodeStatus::Loaded {
            code.instrs.clear();
        }
        code
    }

    /// In an action, plant a `temp_copy` before the first mutation of each
    /// window position.
    fn note_mutation(&mut self, copied: &mut [bool; 256], cursor: i32) {
        self.immutable = false;
        if self.constraint {
            return;
        }
        let key = (cursor.clamp(0, 255)) as usize & 0xFF;
        if !copied[key] {
            copied[key] = true;
            self.instrs.push(Instr::TempCopy);
        }
    }

    pub(crate) fn status(&self) -> CodeStatus {
        self.status
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub(crate) fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    /// True when the program cannot mutate segment state
    pub(crate) fn immutable(&self) -> bool {
        self.immutable
    }

    pub(crate) fn deletes(&self) -> bool {
        self.deletes
    }
}

#[cfg(test)]
mod test {
    use super::op::*;
    use super::*;

    fn load_action(prog: &[u8]) -> Code {
        Code::load(false, prog, 0, 2, CodeLimits::default())
    }

    #[test]
    fn empty_program_loads() {
        let c = load_action(&[]);
        assert_eq!(c.status(), CodeStatus::Loaded);
        assert!(c.is_empty());
    }

    #[test]
    fn arithmetic_decodes() {
        let c = load_action(&[PUSH_BYTE, 41, PUSH_BYTE, 1, ADD, POP_RET]);
        assert_eq!(c.status(), CodeStatus::Loaded);
        assert_eq!(
            c.instrs(),
            &[
                Instr::PushByte(41),
                Instr::PushByte(1),
                Instr::Add,
                Instr::PopRet
            ]
        );
        assert!(c.immutable());
    }

    #[test]
    fn missing_return_is_flagged() {
        let c = load_action(&[PUSH_BYTE, 1]);
        assert_eq!(c.status(), CodeStatus::MissingReturn);
    }

    #[test]
    fn truncated_operand_is_flagged() {
        let c = load_action(&[PUSH_LONG, 0, 0]);
        assert_eq!(c.status(), CodeStatus::ArgumentsExhausted);
    }

    #[test]
    fn invalid_opcode_is_flagged() {
        let c = load_action(&[0x7F, POP_RET]);
        assert_eq!(c.status(), CodeStatus::InvalidOpcode);
    }

    #[test]
    fn unimplemented_opcode_is_flagged() {
        let c = load_action(&[NEXT_N, 2, POP_RET]);
        assert_eq!(c.status(), CodeStatus::UnimplementedOpcode);
    }

    #[test]
    fn temp_copy_precedes_mutation() {
        let c = load_action(&[PUT_GLYPH, 0, 0, RET_ZERO]);
        assert_eq!(c.status(), CodeStatus::Loaded);
        assert_eq!(
            c.instrs(),
            &[Instr::TempCopy, Instr::PutGlyph(0), Instr::RetZero]
        );
        assert!(!c.immutable());
    }

    #[test]
    fn temp_copy_inserted_once_per_position() {
        let c = load_action(&[PUT_GLYPH, 0, 0, PUT_GLYPH, 0, 1, NEXT, PUT_GLYPH, 0, 2, RET_ZERO]);
        assert_eq!(c.status(), CodeStatus::Loaded);
        let copies = c
            .instrs()
            .iter()
            .filter(|i| matches!(i, Instr::TempCopy))
            .count();
        assert_eq!(copies, 2);
    }

    #[test]
    fn context_item_skip_is_instruction_count() {
        // cntxt_item at offset 1 guarding [push 5, push 6, add]
        let c = Code::load(
            true,
            &[
                CNTXT_ITEM, 1, 5, PUSH_BYTE, 5, PUSH_BYTE, 6, ADD, POP_RET,
            ],
            1,
            2,
            CodeLimits::default(),
        );
        assert_eq!(c.status(), CodeStatus::Loaded);
        assert_eq!(
            c.instrs()[0],
            Instr::CntxtItem {
                offset: 1,
                skip: 3
            }
        );
    }

    #[test]
    fn context_item_past_end_is_flagged() {
        let c = Code::load(true, &[CNTXT_ITEM, 0, 200, RET_TRUE], 0, 1, CodeLimits::default());
        assert_eq!(c.status(), CodeStatus::JumpPastEnd);
    }

    #[test]
    fn context_item_rejected_in_action() {
        let c = load_action(&[CNTXT_ITEM, 0, 1, RET_TRUE, RET_ZERO]);
        assert_eq!(c.status(), CodeStatus::InvalidOpcode);
    }

    #[test]
    fn slot_ref_outside_window_is_flagged() {
        // reference -3 with a pre-context of 1
        let c = Code::load(
            false,
            &[PUSH_SLOT_ATTR, 0, 0xFD, POP_RET],
            1,
            2,
            CodeLimits::default(),
        );
        assert_eq!(c.status(), CodeStatus::OutOfRangeData);
    }

    #[test]
    fn class_bound_is_checked() {
        let c = Code::load(
            false,
            &[PUT_GLYPH, 0, 9, RET_ZERO],
            0,
            1,
            CodeLimits {
                num_classes: 4,
                ..Default::default()
            },
        );
        assert_eq!(c.status(), CodeStatus::OutOfRangeData);
    }

    #[test]
    fn mutating_constraint_is_not_immutable() {
        let c = Code::load(true, &[DELETE, RET_TRUE], 0, 1, CodeLimits::default());
        assert_eq!(c.status(), CodeStatus::Loaded);
        assert!(!c.immutable());
        assert!(c.deletes());
    }
}
