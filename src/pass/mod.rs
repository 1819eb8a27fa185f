// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! One shaping pass: FSM tables, rules, and the matching loop
//!
//! A pass walks the slot stream left to right, running its finite-state
//! machine at each position to collect candidate rules, testing their
//! constraints in sort order, and applying the first that passes. The
//! high-water mark plus a per-pass loop budget bound re-processing after a
//! rule rewinds the stream. Collision-enabled passes additionally run the
//! shift/kern resolvers once the rules have settled.

pub(crate) mod rules;

use crate::bytes::ByteReader;
use crate::collision::{CollisionFlags, KernCollider, ShiftCollider};
use crate::context::{MapSlot, ShapingContext, MAX_SLOTS};
use crate::data::{Position, Rect};
use crate::error::{CodeRegion, Error};
use crate::face::Face;
use crate::silf::Silf;
use crate::segment::Segment;
use crate::vm::{Code, CodeLimits, CodeStatus, Machine, MachineStatus};
use rules::{Rule, RuleCandidates, RuleEntry, MAX_RULES};
use ttf_parser::Tag;

const SILF: Tag = Tag::from_bytes(b"Silf");

/// Kern collision mode: break at the first space glyph
const KERN_IN_WORD: u8 = 2;

/// Category a pass belongs to, from its position in the pass list
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum PassType {
    Linebreak,
    Substitute,
    Positioning,
    Justification,
}

/// Font-wide values the pass loader needs before the Silf is complete
#[derive(Clone, Copy, Debug)]
pub(crate) struct PassLoadInfo {
    pub a_collision: u8,
    pub silf_flags: u8,
    pub num_classes: u16,
    pub num_attrs: u16,
    pub num_feats: u16,
}

#[derive(Debug, Default)]
pub(crate) struct Pass {
    /// Glyph id → FSM column, `0xFFFF` for glyphs outside every class
    columns: Vec<u16>,
    rules: Vec<Rule>,
    /// Sorted candidate list per success state
    success_rules: Vec<Vec<RuleEntry>>,
    start_states: Vec<u16>,
    /// `num_transition × num_columns`
    transitions: Vec<u16>,
    pass_constraint: Option<Code>,
    num_states: u16,
    num_transition: u16,
    success_start: u16,
    num_columns: u16,
    min_pre_ctxt: u8,
    max_pre_ctxt: u8,
    num_coll_runs: u8,
    kern_colls: u8,
    max_loop: u8,
    col_threshold: u8,
    reverse_dir: bool,
}

impl Pass {
    pub(crate) fn reverse_dir(&self) -> bool {
        self.reverse_dir
    }

    pub(crate) fn collision_loops(&self) -> u8 {
        self.num_coll_runs
    }

    /// Parse one pass payload
    ///
    /// `data` is the whole Silf subtable; the pass occupies
    /// `[pass_start, pass_end)` and its code offsets are relative to the
    /// subtable start.
    pub(crate) fn read(
        data: &[u8],
        pass_start: usize,
        pass_end: usize,
        pass_ix: u8,
        pt: PassType,
        info: &PassLoadInfo,
    ) -> Result<Pass, Error> {
        let mut pass = Pass::default();
        if pass_end - pass_start < 40 || pass_end > data.len() {
            return Err(Error::BadPassLength { pass: pass_ix });
        }
        let mut r = ByteReader::new(SILF, &data[..pass_end]);
        r.seek(pass_start)?;

        let flags = r.read_u8()?;
        if flags & 0x1F != 0
            && (pt < PassType::Positioning || info.a_collision == 0 || info.silf_flags & 0x20 == 0)
        {
            return Err(Error::BadCollisionPass { pass: pass_ix });
        }
        pass.num_coll_runs = flags & 0x7;
        pass.kern_colls = (flags >> 3) & 0x3;
        pass.reverse_dir = (flags >> 5) & 0x1 != 0;
        pass.max_loop = r.read_u8()?.max(1);
        r.skip(2)?; // maxContext, maxBackup
        let num_rules = usize::from(r.read_u16()?);
        if num_rules == 0 && pass.num_coll_runs == 0 {
            return Err(Error::EmptyPass { pass: pass_ix });
        }
        r.skip(2)?; // fsmOffset
        let to_local = |off: u32| -> Result<usize, Error> {
            let off = off as usize;
            if off < pass_start || off > pass_end {
                Err(Error::BadPassLength { pass: pass_ix })
            } else {
                Ok(off)
            }
        };
        let pc_off = to_local(r.read_u32()?)?;
        let rc_off = to_local(r.read_u32()?)?;
        let a_off = to_local(r.read_u32()?)?;
        r.skip(4)?;
        pass.num_states = r.read_u16()?;
        pass.num_transition = r.read_u16()?;
        let num_success = usize::from(r.read_u16()?);
        pass.num_columns = r.read_u16()?;
        let num_ranges = usize::from(r.read_u16()?);
        r.skip(6)?; // searchRange, entrySelector, rangeShift
        debug_assert_eq!(r.pos() - pass_start, 40);

        if pass.num_transition > pass.num_states
            || num_success > usize::from(pass.num_states)
            || num_success + usize::from(pass.num_transition) < usize::from(pass.num_states)
        {
            return Err(Error::BadStateCount { pass: pass_ix });
        }
        if num_rules != 0 && num_ranges == 0 {
            return Err(Error::NoRanges { pass: pass_ix });
        }
        if pass.num_columns > 0x7FFF {
            return Err(Error::BadColumnCount { pass: pass_ix });
        }
        pass.success_start = pass.num_states - num_success as u16;

        // Glyph ranges; the last range's end glyph bounds the column table.
        if r.pos() + num_ranges * 6 > pass_end {
            return Err(Error::BadPassLength { pass: pass_ix });
        }
        let num_glyphs = if num_ranges != 0 {
            usize::from(r.peek_u16_at(r.pos() + num_ranges * 6 - 4)?) + 1
        } else {
            0
        };
        let ranges_pos = r.pos();
        r.skip(num_ranges * 6)?;

        // Rule-map end offsets, one per success state plus a terminator.
        let o_rule_map_pos = r.pos();
        r.skip((num_success + 1) * 2)?;
        let num_entries = usize::from(r.peek_u16_at(o_rule_map_pos + num_success * 2)?);
        let rule_map_pos = r.pos();
        r.skip(num_entries * 2)?;

        pass.min_pre_ctxt = r.read_u8()?;
        pass.max_pre_ctxt = r.read_u8()?;
        if pass.min_pre_ctxt > pass.max_pre_ctxt {
            return Err(Error::BadCtxtBounds { pass: pass_ix });
        }
        let start_states_pos = r.pos();
        let num_starts = usize::from(pass.max_pre_ctxt - pass.min_pre_ctxt) + 1;
        r.skip(num_starts * 2)?;
        let sort_keys_pos = r.pos();
        r.skip(num_rules * 2)?;
        let precontext_pos = r.pos();
        r.skip(num_rules)?;

        pass.col_threshold = match r.read_u8()? {
            0 => 10,
            t => t,
        };
        let pass_constraint_len = usize::from(r.read_u16()?);
        let o_constraint_pos = r.pos();
        r.skip((num_rules + 1) * 2)?;
        let o_actions_pos = r.pos();
        r.skip((num_rules + 1) * 2)?;
        let states_pos = r.pos();
        let num_transitions_entries = usize::from(pass.num_transition) * usize::from(pass.num_columns);
        r.skip(num_transitions_entries * 2)?;
        r.skip(1)?; // separator

        if r.pos() != pc_off {
            return Err(Error::BadCodeOffset {
                pass: pass_ix,
                region: CodeRegion::PassConstraint,
            });
        }
        r.skip(pass_constraint_len)?;
        if r.pos() != rc_off {
            return Err(Error::BadCodeOffset {
                pass: pass_ix,
                region: CodeRegion::RuleConstraint,
            });
        }
        let rc_total = usize::from(r.peek_u16_at(o_constraint_pos + num_rules * 2)?);
        r.skip(rc_total)?;
        if r.pos() != a_off {
            return Err(Error::BadCodeOffset {
                pass: pass_ix,
                region: CodeRegion::Action,
            });
        }
        let ac_total = usize::from(r.peek_u16_at(o_actions_pos + num_rules * 2)?);
        r.skip(ac_total)?;
        if r.pos() > pass_end {
            return Err(Error::BadPassLength { pass: pass_ix });
        }

        let limits = CodeLimits {
            num_classes: info.num_classes,
            num_attrs: info.num_attrs,
            num_feats: info.num_feats,
        };

        // Pass-level constraint program.
        if pass_constraint_len != 0 {
            let prog = Code::load(true, &data[pc_off..pc_off + pass_constraint_len], 0, 1, limits);
            if prog.status() != CodeStatus::Loaded {
                return Err(Error::Bytecode {
                    pass: pass_ix,
                    rule: None,
                    region: CodeRegion::PassConstraint,
                    status: prog.status(),
                });
            }
            pass.pass_constraint = Some(prog);
        }

        if num_rules != 0 {
            pass.read_rules(
                &r,
                RuleTablePositions {
                    num_rules,
                    sort_keys: sort_keys_pos,
                    precontext: precontext_pos,
                    o_constraint: o_constraint_pos,
                    o_actions: o_actions_pos,
                    rc_data: rc_off,
                    ac_data: a_off,
                    rc_total,
                    ac_total,
                },
                data,
                limits,
                pass_ix,
            )?;
            pass.read_states(
                &r,
                start_states_pos,
                num_starts,
                states_pos,
                num_transitions_entries,
                o_rule_map_pos,
                rule_map_pos,
                num_success,
                num_entries,
                pass_ix,
            )?;
        }
        pass.columns.resize(num_glyphs, 0xFFFF);
        if num_rules != 0 {
            pass.fill_columns(&r, ranges_pos, num_ranges, pass_ix)?;
        }
        log::trace!(
            "pass {}: {} rules, {} states, {} columns",
            pass_ix,
            pass.rules.len(),
            pass.num_states,
            pass.num_columns
        );
        Ok(pass)
    }

    fn fill_columns(
        &mut self,
        r: &ByteReader,
        ranges_pos: usize,
        num_ranges: usize,
        pass_ix: u8,
    ) -> Result<(), Error> {
        let mut pos = ranges_pos;
        for _ in 0..num_ranges {
            let first = usize::from(r.peek_u16_at(pos)?);
            let last = usize::from(r.peek_u16_at(pos + 2)?);
            let col = r.peek_u16_at(pos + 4)?;
            pos += 6;
            if first > last || last >= self.columns.len() || col >= self.num_columns {
                return Err(Error::BadRange { pass: pass_ix });
            }
            for c in &mut self.columns[first..=last] {
                // A glyph must only belong to one column at a time.
                if *c != 0xFFFF {
                    return Err(Error::BadRange { pass: pass_ix });
                }
                *c = col;
            }
        }
        Ok(())
    }

    fn read_rules(
        &mut self,
        r: &ByteReader,
        t: RuleTablePositions,
        data: &[u8],
        limits: CodeLimits,
        pass_ix: u8,
    ) -> Result<(), Error> {
        self.rules.reserve(t.num_rules);
        let mut ac_end = t.ac_total;
        let mut rc_end = t.rc_total;
        let mut specs = vec![(0u8, 0u16, 0usize, 0usize, 0usize, 0usize); t.num_rules];
        for i in (0..t.num_rules).rev() {
            let pre_context = data[t.precontext + i];
            let sort = r.peek_u16_at(t.sort_keys + i * 2)?;
            if sort > 63
                || u16::from(pre_context) >= sort
                || pre_context > self.max_pre_ctxt
                || pre_context < self.min_pre_ctxt
            {
                return Err(Error::BadRuleBounds {
                    pass: pass_ix,
                    rule: i as u16,
                });
            }
            let ac_begin = usize::from(r.peek_u16_at(t.o_actions + i * 2)?);
            let rc_off = usize::from(r.peek_u16_at(t.o_constraint + i * 2)?);
            let rc_begin = if rc_off != 0 { rc_off } else { rc_end };
            if ac_begin > ac_end || ac_end > t.ac_total || rc_begin > rc_end || rc_end > t.rc_total
            {
                return Err(Error::BadRuleBounds {
                    pass: pass_ix,
                    rule: i as u16,
                });
            }
            specs[i] = (pre_context, sort, ac_begin, ac_end, rc_begin, rc_end);
            ac_end = ac_begin;
            rc_end = rc_begin;
        }

        for (i, (pre_context, sort, ac_begin, ac_end, rc_begin, rc_end)) in
            specs.into_iter().enumerate()
        {
            let action = Code::load(
                false,
                &data[t.ac_data + ac_begin..t.ac_data + ac_end],
                pre_context,
                sort,
                limits,
            );
            let constraint = Code::load(
                true,
                &data[t.rc_data + rc_begin..t.rc_data + rc_end],
                pre_context,
                sort,
                limits,
            );
            if action.status() != CodeStatus::Loaded {
                return Err(Error::Bytecode {
                    pass: pass_ix,
                    rule: Some(i as u16),
                    region: CodeRegion::Action,
                    status: action.status(),
                });
            }
            if constraint.status() != CodeStatus::Loaded {
                return Err(Error::Bytecode {
                    pass: pass_ix,
                    rule: Some(i as u16),
                    region: CodeRegion::RuleConstraint,
                    status: constraint.status(),
                });
            }
            if !constraint.immutable() {
                return Err(Error::MutableConstraint {
                    pass: pass_ix,
                    rule: i as u16,
                });
            }
            self.rules.push(Rule {
                constraint,
                action,
                sort,
                pre_context,
            });
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn read_states(
        &mut self,
        r: &ByteReader,
        start_states_pos: usize,
        num_starts: usize,
        states_pos: usize,
        num_transition_entries: usize,
        o_rule_map_pos: usize,
        rule_map_pos: usize,
        num_success: usize,
        num_entries: usize,
        pass_ix: u8,
    ) -> Result<(), Error> {
        self.start_states.reserve(num_starts);
        for i in 0..num_starts {
            let s = r.peek_u16_at(start_states_pos + i * 2)?;
            if s >= self.num_states {
                return Err(Error::BadState { pass: pass_ix, state: s });
            }
            self.start_states.push(s);
        }

        self.transitions.reserve(num_transition_entries);
        for i in 0..num_transition_entries {
            let s = r.peek_u16_at(states_pos + i * 2)?;
            if s >= self.num_states {
                return Err(Error::BadState { pass: pass_ix, state: s });
            }
            self.transitions.push(s);
        }

        let mut rule_map = Vec::with_capacity(num_entries);
        for i in 0..num_entries {
            let rn = r.peek_u16_at(rule_map_pos + i * 2)?;
            if usize::from(rn) >= self.rules.len() {
                return Err(Error::BadRuleNum { pass: pass_ix });
            }
            rule_map.push(RuleEntry {
                sort: self.rules[usize::from(rn)].sort,
                index: rn,
            });
        }

        self.success_rules.reserve(num_success);
        for i in 0..num_success {
            let begin = usize::from(r.peek_u16_at(o_rule_map_pos + i * 2)?);
            let end = usize::from(r.peek_u16_at(o_rule_map_pos + (i + 1) * 2)?);
            if begin > end || end > num_entries {
                return Err(Error::BadRuleMapping { pass: pass_ix });
            }
            let mut entries: Vec<RuleEntry> = rule_map[begin..end.min(begin + MAX_RULES)].to_vec();
            entries.sort_by(|a, b| {
                if a.precedes(b) {
                    std::cmp::Ordering::Less
                } else if b.precedes(a) {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            });
            self.success_rules.push(entries);
        }
        Ok(())
    }

    // ---- execution ----

    /// Run this pass over the whole segment
    pub(crate) fn run(
        &self,
        face: &Face,
        silf: &Silf,
        seg: &mut Segment,
        ctxt: &mut ShapingContext,
        m: &mut Machine,
        reverse: bool,
        pass_ix: u8,
    ) -> Result<(), Error> {
        if seg.slots().is_empty() {
            return Ok(());
        }
        if !self.test_pass_constraint(face, silf, seg, ctxt, m) {
            if m.status() != MachineStatus::Finished {
                return Err(Error::Vm {
                    pass: pass_ix,
                    status: m.status(),
                });
            }
            return Ok(());
        }
        if reverse {
            seg.reverse_slots(face, silf);
        }

        if !self.rules.is_empty() {
            let reserve_len = seg.slots().len() * 10;
            seg.slots_mut().reserve(reserve_len);
            let mut slot = 0usize;
            ctxt.set_highwater(Some(1.min(seg.slots().end())));
            let mut lc = self.max_loop;
            loop {
                self.find_and_apply_rule(face, silf, seg, ctxt, m, &mut slot);
                if m.status() != MachineStatus::Finished {
                    return Err(Error::Vm {
                        pass: pass_ix,
                        status: m.status(),
                    });
                }
                let end = seg.slots().end();
                if slot < end {
                    let mut trip =
                        Some(slot) == ctxt.highwater() || ctxt.highpassed();
                    if !trip {
                        lc -= 1;
                        trip = lc == 0;
                    }
                    if trip {
                        if lc == 0 {
                            slot = ctxt.highwater().unwrap_or(end);
                        }
                        lc = self.max_loop;
                        if slot < seg.slots().end() {
                            ctxt.set_highwater(Some(slot + 1));
                        }
                    }
                }
                if slot >= seg.slots().end() {
                    break;
                }
            }
        }

        let collisions = self.num_coll_runs != 0 || self.kern_colls != 0;
        if !collisions || !seg.flags().contains(crate::segment::SegFlags::HAS_COLLISIONS) {
            return Ok(());
        }
        seg.ensure_collisions(face, silf);
        if !seg.has_collision_info() {
            return Ok(());
        }
        let is_rtl = ctxt.dir & 1 != 0;
        if self.num_coll_runs != 0 {
            let end = seg.slots().end();
            seg.position_slots(face, silf, None, 0, end, is_rtl, true);
            self.collision_shift(face, seg);
        }
        if self.kern_colls != 0 && !self.collision_kern(face, seg, is_rtl) {
            return Err(Error::Vm {
                pass: pass_ix,
                status: MachineStatus::DiedEarly,
            });
        }
        collision_finish(seg);
        Ok(())
    }

    fn test_pass_constraint(
        &self,
        face: &Face,
        silf: &Silf,
        seg: &mut Segment,
        ctxt: &mut ShapingContext,
        m: &mut Machine,
    ) -> bool {
        let Some(prog) = &self.pass_constraint else {
            return true;
        };
        let mut slot = 0usize;
        ctxt.reset(&mut slot, 0);
        ctxt.push_slot(MapSlot::Live(0));
        let mut map_pos = 0usize;
        let mut os = 0usize;
        let ret = m.run(face, silf, seg, ctxt, prog, &mut map_pos, &mut os);
        let ok = ret != 0 && m.status() == MachineStatus::Finished;
        log::trace!("pass constraint: {}", ok);
        ok
    }

    /// Match the FSM at `slot`, accumulating candidate rules
    ///
    /// Returns false only when the pre-context configuration is unusable.
    fn run_fsm(
        &self,
        seg: &Segment,
        ctxt: &mut ShapingContext,
        mut slot: usize,
        candidates: &mut RuleCandidates,
    ) -> bool {
        ctxt.reset(&mut slot, usize::from(self.max_pre_ctxt));
        if self.max_pre_ctxt < self.min_pre_ctxt
            || ctxt.context() < usize::from(self.min_pre_ctxt)
        {
            return false;
        }
        let mut state = self.start_states[usize::from(self.max_pre_ctxt) - ctxt.context()];
        let mut free_slots = MAX_SLOTS;
        let end = seg.slots().end();
        loop {
            ctxt.push_slot(MapSlot::Live(slot));
            let gid = seg.slots().get(slot).gid();
            if usize::from(gid) >= self.columns.len() || self.columns[usize::from(gid)] == 0xFFFF {
                return free_slots != 0;
            }
            free_slots -= 1;
            if free_slots == 0 {
                return false;
            }
            if state >= self.num_transition {
                return true;
            }
            let col = usize::from(self.columns[usize::from(gid)]);
            state = self.transitions[usize::from(state) * usize::from(self.num_columns) + col];
            if state >= self.success_start {
                candidates
                    .accumulate(&self.success_rules[usize::from(state - self.success_start)]);
            }
            slot += 1;
            if state == 0 || slot >= end {
                break;
            }
        }
        ctxt.push_slot(MapSlot::Live(slot));
        true
    }

    /// One step of the matching loop: try to fire a rule at `slot`
    fn find_and_apply_rule(
        &self,
        face: &Face,
        silf: &Silf,
        seg: &mut Segment,
        ctxt: &mut ShapingContext,
        m: &mut Machine,
        slot: &mut usize,
    ) {
        let mut candidates = RuleCandidates::new();
        if self.run_fsm(seg, ctxt, *slot, &mut candidates) {
            let mut winner = None;
            for entry in candidates.iter() {
                let rule = &self.rules[usize::from(entry.index)];
                if self.test_constraint(face, silf, seg, ctxt, m, rule) {
                    winner = Some(entry.index);
                    break;
                }
                if m.status() != MachineStatus::Finished {
                    return;
                }
            }
            if let Some(index) = winner {
                let rule = &self.rules[usize::from(index)];
                log::trace!("rule {} fired at slot {}", index, *slot);
                let adv = self.do_action(face, silf, seg, ctxt, m, rule, slot);
                if m.status() != MachineStatus::Finished {
                    return;
                }
                if rule.action.deletes() {
                    ctxt.collect_garbage();
                }
                adjust_slot(adv, slot, seg, ctxt);
                return;
            }
        }
        *slot += 1;
    }

    fn test_constraint(
        &self,
        face: &Face,
        silf: &Silf,
        seg: &mut Segment,
        ctxt: &mut ShapingContext,
        m: &mut Machine,
        rule: &Rule,
    ) -> bool {
        let curr_context = ctxt.context() as i64;
        let sort = i64::from(rule.sort);
        let pre = i64::from(rule.pre_context);
        if sort + curr_context - pre > ctxt.map.len() as i64 || curr_context - pre < 0 {
            return false;
        }
        let map_start = (curr_context - pre) as usize;
        if map_start + usize::from(rule.sort) > ctxt.map.len() {
            return false;
        }
        if rule.constraint.is_empty() {
            return true;
        }
        for n in 0..usize::from(rule.sort) {
            let mut map_pos = map_start + n;
            let MapSlot::Live(mut os) = ctxt.map[map_pos] else {
                continue;
            };
            let ret = m.run(face, silf, seg, ctxt, &rule.constraint, &mut map_pos, &mut os);
            if ret == 0 || m.status() != MachineStatus::Finished {
                return false;
            }
        }
        true
    }

    /// Run a rule's action; returns the cursor adjustment it requests
    fn do_action(
        &self,
        face: &Face,
        silf: &Silf,
        seg: &mut Segment,
        ctxt: &mut ShapingContext,
        m: &mut Machine,
        rule: &Rule,
        slot: &mut usize,
    ) -> i32 {
        if rule.action.is_empty() {
            return 0;
        }
        let mut map_pos = ctxt.context();
        let Some(&MapSlot::Live(mut os)) = ctxt.map.get(map_pos) else {
            return 0;
        };
        ctxt.set_highpassed(false);
        let ret = m.run(face, silf, seg, ctxt, &rule.action, &mut map_pos, &mut os);
        if m.status() != MachineStatus::Finished {
            *slot = seg.slots().end();
            ctxt.set_highwater(None);
            return 0;
        }
        *slot = os;
        ret
    }

    // ---- collision phases ----

    /// Phases 1 and 2: shift collision-fixable glyphs until stable
    fn collision_shift(&self, face: &Face, seg: &mut Segment) {
        let mut start = 0usize;
        let mut moved = false;

        while start < seg.slots().end() {
            // phase 1: position shiftable glyphs, ignoring kernable glyphs
            let mut has_collisions = false;
            let mut end = seg.slots().end();
            for s in start..seg.slots().end() {
                let Some(c) = seg.collision_info(s) else {
                    continue;
                };
                let flags = c.flags();
                if flags & (CollisionFlags::FIX | CollisionFlags::KERN) == CollisionFlags::FIX {
                    self.resolve_collisions(
                        face,
                        seg,
                        s,
                        start,
                        false,
                        &mut moved,
                        &mut has_collisions,
                    );
                }
                if s != start
                    && seg
                        .collision_info(s)
                        .map(|c| c.flags().contains(CollisionFlags::END))
                        .unwrap_or(false)
                {
                    end = s + 1;
                    break;
                }
            }

            // phase 2: loop until happy
            for _ in 0..self.num_coll_runs.saturating_sub(1) {
                if !has_collisions && !moved {
                    continue;
                }
                // phase 2a: iterate backwards over glyphs still colliding
                if has_collisions {
                    has_collisions = false;
                    for s in (start..end.min(seg.slots().end())).rev() {
                        let Some(c) = seg.collision_info(s) else {
                            continue;
                        };
                        let want = CollisionFlags::FIX | CollisionFlags::ISCOL;
                        let mask =
                            CollisionFlags::FIX | CollisionFlags::KERN | CollisionFlags::ISCOL;
                        if c.flags() & mask == want {
                            self.resolve_collisions(
                                face,
                                seg,
                                s,
                                end.min(seg.slots().end()).saturating_sub(1),
                                true,
                                &mut moved,
                                &mut has_collisions,
                            );
                            if let Some(c) = seg.collision_info_mut(s) {
                                let f = c.flags_raw() | CollisionFlags::TEMPLOCK.bits();
                                c.set_flags_raw(f);
                            }
                        }
                    }
                }
                // phase 2b: forward refinement over all fixable glyphs
                if moved {
                    moved = false;
                    for s in start..end.min(seg.slots().end()) {
                        let Some(c) = seg.collision_info(s) else {
                            continue;
                        };
                        let mask = CollisionFlags::FIX
                            | CollisionFlags::TEMPLOCK
                            | CollisionFlags::KERN;
                        if c.flags() & mask == CollisionFlags::FIX {
                            self.resolve_collisions(
                                face,
                                seg,
                                s,
                                start,
                                false,
                                &mut moved,
                                &mut has_collisions,
                            );
                        } else if c.flags().contains(CollisionFlags::TEMPLOCK) {
                            if let Some(c) = seg.collision_info_mut(s) {
                                let f = c.flags_raw() & !CollisionFlags::TEMPLOCK.bits();
                                c.set_flags_raw(f);
                            }
                        }
                    }
                }
            }

            if end >= seg.slots().end() {
                break;
            }
            // Find the next collision scope.
            let mut next_start = seg.slots().end();
            for s in end.saturating_sub(1)..seg.slots().end() {
                if seg
                    .collision_info(s)
                    .map(|c| c.flags().contains(CollisionFlags::START))
                    .unwrap_or(false)
                {
                    next_start = s;
                    break;
                }
            }
            start = next_start;
        }
    }

    /// Fix collisions for one slot against its neighborhood
    #[allow(clippy::too_many_arguments)]
    fn resolve_collisions(
        &self,
        face: &Face,
        seg: &mut Segment,
        slot_fix: usize,
        start: usize,
        is_rev: bool,
        moved: &mut bool,
        has_col: &mut bool,
    ) {
        let Some(cfix) = seg.collision_info(slot_fix) else {
            return;
        };
        let (limit, margin, margin_wt, old_shift) = (
            cfix.limit(),
            f32::from(cfix.margin()),
            f32::from(cfix.margin_wt()),
            cfix.shift(),
        );
        let fix_slot = seg.slots().get(slot_fix);
        let fix_box = glyph_box(face, fix_slot.glyph()) + fix_slot.origin();
        let mut coll = ShiftCollider::new(fix_box, limit, margin, margin_wt, old_shift);

        let base = seg.slots().base_ix(slot_fix);
        let mut collides = false;
        let end = seg.slots().end();
        let mut nbor = start as i64;
        let last = if is_rev { -1 } else { end as i64 };
        while nbor != last {
            let n = nbor as usize;
            let Some(cnbor) = seg.collision_info(n) else {
                nbor += if is_rev { -1 } else { 1 };
                continue;
            };
            let nflags = cnbor.flags();
            let same_cluster = seg.slots().has_base(n, base);
            let merge_ok = n != slot_fix
                && !cnbor.ignore()
                && (n == base || same_cluster || !in_kern_cluster(seg, n))
                && (!is_rev
                    || !nflags.contains(CollisionFlags::FIX)
                    || (nflags.contains(CollisionFlags::KERN) && !same_cluster)
                    || nflags.contains(CollisionFlags::ISCOL));
            if merge_ok {
                let ns = seg.slots().get(n);
                let nbox = glyph_box(face, ns.glyph()) + ns.origin() + cnbor.shift();
                collides |= coll.merge_box(nbox);
            }
            if n != start
                && nflags.contains(if is_rev {
                    CollisionFlags::START
                } else {
                    CollisionFlags::END
                })
            {
                break;
            }
            nbor += if is_rev { -1 } else { 1 };
        }

        let mut is_col = false;
        if collides || old_shift.x != 0.0 || old_shift.y != 0.0 {
            match coll.resolve() {
                Some(shift) => {
                    let dx = shift.x - old_shift.x;
                    let dy = shift.y - old_shift.y;
                    let threshold = f32::from(self.col_threshold);
                    if dx * dx + dy * dy >= threshold * threshold {
                        *moved = true;
                    }
                    if let Some(c) = seg.collision_info_mut(slot_fix) {
                        c.set_shift(shift);
                    }
                }
                None => is_col = true,
            }
        }

        if let Some(c) = seg.collision_info_mut(slot_fix) {
            let mut f = c.flags_raw() | CollisionFlags::KNOWN.bits();
            if is_col {
                f |= CollisionFlags::ISCOL.bits();
            } else {
                f &= !CollisionFlags::ISCOL.bits();
            }
            c.set_flags_raw(f);
        }
        *has_col |= is_col;
    }

    /// Phase 3: kern clusters apart
    fn collision_kern(&self, face: &Face, seg: &mut Segment, is_rtl: bool) -> bool {
        let mut y_min = f32::MAX;
        let mut y_max = f32::MIN;
        for s in 0..seg.slots().end() {
            let gid = seg.slots().get(s).gid();
            if !face.glyphs().check(gid) {
                return false;
            }
            let Some(c) = seg.collision_info(s) else {
                continue;
            };
            let flags = c.flags();
            let shift_y = c.shift().y;
            let bbox = glyph_box(face, seg.slots().get(s).glyph());
            let y = seg.slots().get(s).origin().y + shift_y;
            if !flags.contains(CollisionFlags::ISSPACE) {
                y_max = (y + bbox.tr.y).max(y_max);
                y_min = (y + bbox.bl.y).min(y_min);
            }
            if flags.contains(CollisionFlags::KERN | CollisionFlags::FIX) {
                self.resolve_kern(face, seg, s, is_rtl, &mut y_min, &mut y_max);
            }
        }
        true
    }

    fn resolve_kern(
        &self,
        face: &Face,
        seg: &mut Segment,
        slot_fix: usize,
        is_rtl: bool,
        y_min: &mut f32,
        y_max: &mut f32,
    ) -> f32 {
        let base = seg.slots().base_ix(slot_fix);
        if base != slot_fix {
            if let Some(c) = seg.collision_info_mut(base) {
                let f = c.flags_raw()
                    | CollisionFlags::KERN.bits()
                    | CollisionFlags::FIX.bits();
                c.set_flags_raw(f);
            }
            return 0.0;
        }
        let Some(cfix) = seg.collision_info(base) else {
            return 0.0;
        };
        let margin = f32::from(cfix.margin());
        let shift = cfix.shift();
        let mut seen_end = cfix.flags().contains(CollisionFlags::END);

        let bbb = glyph_box(face, seg.slots().get(slot_fix).glyph());
        let by = seg.slots().get(slot_fix).origin().y + shift.y;
        *y_max = (by + bbb.tr.y).max(*y_max);
        *y_min = (by + bbb.bl.y).min(*y_min);

        let mut coll: Option<KernCollider> = None;
        let mut collides = false;
        let mut curr_space = 0.0f32;
        let mut space_count = 0u32;
        for n in slot_fix + 1..seg.slots().end() {
            if seg.slots().has_base(n, base) {
                continue;
            }
            let gid = seg.slots().get(n).gid();
            if !face.glyphs().check(gid) {
                return 0.0;
            }
            let Some(cnbor) = seg.collision_info(n) else {
                continue;
            };
            let nflags = cnbor.flags();
            let nshift = cnbor.shift();
            let bb = glyph_box(face, seg.slots().get(n).glyph());
            if (bb.bl.y == 0.0 && bb.tr.y == 0.0) || nflags.contains(CollisionFlags::ISSPACE) {
                if self.kern_colls == KERN_IN_WORD {
                    break;
                }
                curr_space += seg.slots().get(n).advance();
                space_count += 1;
            } else {
                space_count = 0;
                if !cnbor.ignore() {
                    seen_end = true;
                    let c = coll.get_or_insert_with(|| {
                        let mut k = KernCollider::new(*y_min, *y_max, margin, is_rtl);
                        // Seed with the whole target cluster.
                        for t in 0..seg.slots().end() {
                            if t == base || seg.slots().has_base(t, base) {
                                let ts = seg.slots().get(t);
                                k.add_target(glyph_box(face, ts.glyph()) + ts.origin() + shift);
                            }
                        }
                        k
                    });
                    let ns = seg.slots().get(n);
                    collides |= c.merge_box(glyph_box(face, ns.glyph()) + ns.origin() + nshift, curr_space);
                }
            }
            if nflags.contains(CollisionFlags::END) {
                if seen_end && space_count < 2 {
                    break;
                }
                seen_end = true;
            }
        }

        if collides {
            let mv = coll.map(|c| c.resolve()).unwrap_or(Position::ZERO);
            let old = seg
                .collision_info(slot_fix)
                .map(|c| c.shift())
                .unwrap_or(Position::ZERO);
            {
                let s = seg.slots_mut().get_mut(slot_fix);
                s.advance.x += mv.x - old.x;
                s.advance.y += mv.y - old.y;
            }
            if let Some(c) = seg.collision_info_mut(slot_fix) {
                c.set_shift(mv);
            }
            return mv.x;
        }
        0.0
    }
}

/// Positions the pass loader needs to find the rule tables
struct RuleTablePositions {
    num_rules: usize,
    sort_keys: usize,
    precontext: usize,
    o_constraint: usize,
    o_actions: usize,
    rc_data: usize,
    ac_data: usize,
    rc_total: usize,
    ac_total: usize,
}

/// Can this slot be kerned, or is it attached to something that can?
fn in_kern_cluster(seg: &Segment, ix: usize) -> bool {
    let mut i = Some(ix);
    let mut depth = 0;
    while let Some(s) = i {
        if seg
            .collision_info(s)
            .map(|c| c.flags().contains(CollisionFlags::KERN))
            .unwrap_or(false)
        {
            return true;
        }
        i = seg.slots().parent_ix(s);
        depth += 1;
        if depth > 100 {
            break;
        }
    }
    false
}

/// Fold each slot's pending shift into its committed offset
fn collision_finish(seg: &mut Segment) {
    for ix in 0..seg.slots().end() {
        if let Some(c) = seg.collision_info_mut(ix) {
            let shift = c.shift();
            if shift.x != 0.0 || shift.y != 0.0 {
                c.set_offset(shift + c.offset());
                c.set_shift(Position::ZERO);
            }
        }
    }
}

/// Move the cursor by `delta` logical positions, maintaining the
/// high-water discipline
fn adjust_slot(delta: i32, slot: &mut usize, seg: &Segment, ctxt: &mut ShapingContext) {
    if delta < 0 {
        let mut d = delta;
        while d < 0 && *slot > 0 {
            *slot -= 1;
            if ctxt.highpassed() && ctxt.highwater() == Some(*slot) {
                ctxt.set_highpassed(false);
            }
            d += 1;
        }
    } else {
        let mut d = delta;
        while d > 0 && *slot < seg.slots().end() {
            if ctxt.highwater() == Some(*slot) {
                ctxt.set_highpassed(true);
            }
            *slot += 1;
            d -= 1;
        }
    }
}

fn glyph_box(face: &Face, glyph: u16) -> Rect {
    face.glyphs()
        .glyph(glyph)
        .map(|g| *g.bbox())
        .unwrap_or_default()
}
