// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Synthetic Graphite font assembly for the integration tests
//!
//! Builds the minimal table set a [`graphite_shaper::Face`] needs (the
//! standard metric tables plus `Silf`/`Glat`/`Gloc`) entirely in memory,
//! with full control over passes, rules and bytecode.

use graphite_shaper::TableProvider;
use std::collections::HashMap;
use ttf_parser::Tag;

pub const UPEM: u16 = 1000;

/// Owned tables keyed by tag
#[derive(Default)]
pub struct Tables {
    map: HashMap<Tag, Vec<u8>>,
}

pub struct TablesRef<'a>(pub &'a Tables);

impl<'a> TableProvider<'a> for TablesRef<'a> {
    fn table(&self, tag: Tag) -> Option<&'a [u8]> {
        self.0.map.get(&tag).map(|v| v.as_slice())
    }
}

/// One test glyph: advance, bbox, sparse Glat attributes
#[derive(Clone, Debug, Default)]
pub struct GlyphSpec {
    pub advance: u16,
    /// `(x_min, y_min, x_max, y_max)`; all-zero means no outline
    pub bbox: (i16, i16, i16, i16),
    pub attrs: Vec<(u16, i16)>,
}

#[derive(Clone, Debug, Default)]
pub struct RuleSpec {
    pub sort: u16,
    pub pre_context: u8,
    pub constraint: Vec<u8>,
    pub action: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct PassSpec {
    pub flags: u8,
    pub max_loop: u8,
    pub num_states: u16,
    pub num_transition: u16,
    pub num_success: u16,
    pub num_columns: u16,
    /// `(first gid, last gid, column)`
    pub ranges: Vec<(u16, u16, u16)>,
    pub min_pre: u8,
    pub max_pre: u8,
    pub start_states: Vec<u16>,
    /// `num_transition` rows of `num_columns` target states
    pub transitions: Vec<Vec<u16>>,
    /// Rule indices per success state
    pub success_rule_lists: Vec<Vec<u16>>,
    pub rules: Vec<RuleSpec>,
    pub pass_constraint: Vec<u8>,
}

impl Default for PassSpec {
    fn default() -> Self {
        PassSpec {
            flags: 0,
            max_loop: 5,
            num_states: 0,
            num_transition: 0,
            num_success: 0,
            num_columns: 0,
            ranges: vec![],
            min_pre: 0,
            max_pre: 0,
            start_states: vec![0],
            transitions: vec![],
            success_rule_lists: vec![],
            rules: vec![],
            pass_constraint: vec![],
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SilfSpec {
    pub s_pass: u8,
    pub p_pass: u8,
    pub j_pass: u8,
    /// 0xFF = no bidi pass
    pub b_pass: u8,
    pub flags: u8,
    /// 0 = LTR, 1 = RTL
    pub dir: u8,
    pub a_pseudo: u8,
    pub a_break: u8,
    pub a_bidi: u8,
    pub a_mirror: u8,
    pub a_pass_bits: u8,
    pub num_user: u8,
    pub a_collision: u8,
    /// `[stretch, shrink, step, weight]` attribute ids per level
    pub justs: Vec<[u8; 4]>,
    pub pseudos: Vec<(u32, u16)>,
    /// Linear classes: glyph lists addressed by index
    pub linear_classes: Vec<Vec<u16>>,
    /// Lookup classes: sorted `(glyph, index)` pairs
    pub lookup_classes: Vec<Vec<(u16, u16)>>,
    pub passes: Vec<PassSpec>,
}

impl SilfSpec {
    pub fn plain() -> Self {
        SilfSpec {
            b_pass: 0xFF,
            ..Default::default()
        }
    }
}

pub struct FontBuilder {
    pub glyphs: Vec<GlyphSpec>,
    pub cmap: Vec<(u32, u16)>,
    pub num_attrs: u16,
    pub silf: SilfSpec,
    pub feat: Option<Vec<u8>>,
    pub sill: Option<Vec<u8>>,
}

fn be16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn be16i(out: &mut Vec<u8>, v: i16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn be32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

impl FontBuilder {
    pub fn new(glyphs: Vec<GlyphSpec>) -> Self {
        FontBuilder {
            glyphs,
            cmap: vec![],
            num_attrs: 16,
            silf: SilfSpec::plain(),
            feat: None,
            sill: None,
        }
    }

    pub fn build(&self) -> Tables {
        let mut tables = Tables::default();
        let n = self.glyphs.len() as u16;

        tables.map.insert(Tag::from_bytes(b"head"), self.head());
        tables.map.insert(Tag::from_bytes(b"maxp"), self.maxp(n));
        tables.map.insert(Tag::from_bytes(b"hhea"), self.hhea(n));
        tables.map.insert(Tag::from_bytes(b"hmtx"), self.hmtx());
        let (loca, glyf) = self.glyf();
        tables.map.insert(Tag::from_bytes(b"loca"), loca);
        tables.map.insert(Tag::from_bytes(b"glyf"), glyf);
        tables.map.insert(Tag::from_bytes(b"cmap"), self.cmap_table());
        let (gloc, glat) = self.glat();
        tables.map.insert(Tag::from_bytes(b"Gloc"), gloc);
        tables.map.insert(Tag::from_bytes(b"Glat"), glat);
        tables.map.insert(Tag::from_bytes(b"Silf"), self.silf_table());
        if let Some(feat) = &self.feat {
            tables.map.insert(Tag::from_bytes(b"Feat"), feat.clone());
        }
        if let Some(sill) = &self.sill {
            tables.map.insert(Tag::from_bytes(b"Sill"), sill.clone());
        }
        tables
    }

    fn head(&self) -> Vec<u8> {
        let mut out = vec![];
        be32(&mut out, 0x0001_0000);
        be32(&mut out, 0);
        be32(&mut out, 0);
        be32(&mut out, 0x5F0F_3CF5);
        be16(&mut out, 0); // flags
        be16(&mut out, UPEM);
        out.extend_from_slice(&[0; 16]); // created, modified
        be16i(&mut out, 0); // xMin
        be16i(&mut out, -200);
        be16i(&mut out, 1000);
        be16i(&mut out, 800);
        be16(&mut out, 0); // macStyle
        be16(&mut out, 8); // lowestRecPPEM
        be16i(&mut out, 2); // fontDirectionHint
        be16i(&mut out, 0); // indexToLocFormat: short
        be16i(&mut out, 0); // glyphDataFormat
        out
    }

    fn maxp(&self, n: u16) -> Vec<u8> {
        let mut out = vec![];
        be32(&mut out, 0x0000_5000);
        be16(&mut out, n);
        out
    }

    fn hhea(&self, n: u16) -> Vec<u8> {
        let mut out = vec![];
        be32(&mut out, 0x0001_0000);
        be16i(&mut out, 800); // ascender
        be16i(&mut out, -200); // descender
        be16i(&mut out, 0); // lineGap
        be16(&mut out, 1000);
        be16i(&mut out, 0);
        be16i(&mut out, 0);
        be16i(&mut out, 1000);
        be16i(&mut out, 1);
        be16i(&mut out, 0);
        be16i(&mut out, 0);
        out.extend_from_slice(&[0; 8]); // reserved
        be16i(&mut out, 0); // metricDataFormat
        be16(&mut out, n); // numberOfHMetrics
        out
    }

    fn hmtx(&self) -> Vec<u8> {
        let mut out = vec![];
        for g in &self.glyphs {
            be16(&mut out, g.advance);
            be16i(&mut out, 0);
        }
        out
    }

    /// Rectangle outlines carrying the declared bounding boxes
    fn glyf(&self) -> (Vec<u8>, Vec<u8>) {
        let mut glyf = vec![];
        let mut loca = vec![];
        be16(&mut loca, 0);
        for g in &self.glyphs {
            let (x0, y0, x1, y1) = g.bbox;
            if (x0, y0, x1, y1) != (0, 0, 0, 0) {
                be16i(&mut glyf, 1); // one contour
                be16i(&mut glyf, x0);
                be16i(&mut glyf, y0);
                be16i(&mut glyf, x1);
                be16i(&mut glyf, y1);
                be16(&mut glyf, 3); // endPt of contour
                be16(&mut glyf, 0); // no instructions
                glyf.extend_from_slice(&[0x01; 4]); // on-curve, long coords
                for dx in [x0, x1 - x0, 0, -(x1 - x0)] {
                    be16i(&mut glyf, dx);
                }
                for dy in [y0, 0, y1 - y0, 0] {
                    be16i(&mut glyf, dy);
                }
            }
            be16(&mut loca, (glyf.len() / 2) as u16);
        }
        (loca, glyf)
    }

    /// cmap with a single format-12 unicode subtable
    fn cmap_table(&self) -> Vec<u8> {
        let mut sub = vec![];
        be16(&mut sub, 12);
        be16(&mut sub, 0);
        be32(&mut sub, 16 + self.cmap.len() as u32 * 12);
        be32(&mut sub, 0); // language
        be32(&mut sub, self.cmap.len() as u32);
        let mut sorted = self.cmap.clone();
        sorted.sort_unstable();
        for (usv, gid) in sorted {
            be32(&mut sub, usv);
            be32(&mut sub, usv);
            be32(&mut sub, u32::from(gid));
        }

        let mut out = vec![];
        be16(&mut out, 0);
        be16(&mut out, 1);
        be16(&mut out, 3); // platform: windows
        be16(&mut out, 10); // encoding: full unicode
        be32(&mut out, 12);
        out.extend_from_slice(&sub);
        out
    }

    fn glat(&self) -> (Vec<u8>, Vec<u8>) {
        let mut glat = vec![];
        be32(&mut glat, 0x0001_0000);
        let mut offsets = vec![glat.len() as u16];
        for g in &self.glyphs {
            let mut attrs = g.attrs.clone();
            attrs.sort_unstable_by_key(|a| a.0);
            // one run per attribute keeps the writer simple
            for (id, val) in attrs {
                glat.push(id as u8);
                glat.push(1);
                be16i(&mut glat, val);
            }
            offsets.push(glat.len() as u16);
        }

        let mut gloc = vec![];
        be32(&mut gloc, 0x0001_0000);
        be16(&mut gloc, 0); // short offsets
        be16(&mut gloc, self.num_attrs);
        for off in offsets {
            be16(&mut gloc, off);
        }
        (gloc, glat)
    }

    fn silf_table(&self) -> Vec<u8> {
        let sub = self.silf_subtable();
        let mut out = vec![];
        be32(&mut out, 0x0003_0000);
        be32(&mut out, 0); // compilerVersion
        be16(&mut out, 1); // one subtable
        be16(&mut out, 0);
        be32(&mut out, 16); // offset of subtable 0
        out.extend_from_slice(&sub);
        out
    }

    fn silf_subtable(&self) -> Vec<u8> {
        let s = &self.silf;
        let num_passes = s.passes.len() as u8;
        let mut out = vec![];
        be32(&mut out, 0); // ruleVersion
        be16(&mut out, 0); // passOffset
        be16(&mut out, 0); // pseudosOffset
        be16(&mut out, self.glyphs.len() as u16 - 1); // maxGlyph
        be16(&mut out, 0); // extraAscent
        be16(&mut out, 0); // extraDescent
        out.push(num_passes);
        out.push(s.s_pass);
        out.push(s.p_pass);
        out.push(s.j_pass);
        out.push(s.b_pass);
        out.push(s.flags);
        out.push(0); // maxPreContext
        out.push(0); // maxPostContext
        out.push(s.a_pseudo);
        out.push(s.a_break);
        out.push(s.a_bidi);
        out.push(s.a_mirror);
        out.push(s.a_pass_bits);
        out.push(s.justs.len() as u8);
        for j in &s.justs {
            out.extend_from_slice(j);
            out.extend_from_slice(&[0; 4]);
        }
        be16(&mut out, 0); // aLig
        out.push(s.num_user);
        out.push(0); // iMaxComp
        out.push(s.dir + 1);
        out.push(s.a_collision);
        out.extend_from_slice(&[0; 3]);
        out.push(0); // no critical features
        out.push(0); // reserved
        out.push(0); // no script tags
        be16(&mut out, 0); // lbGID

        // Pass offset table: patched once the payloads are laid out.
        let o_passes = out.len();
        for _ in 0..=num_passes {
            be32(&mut out, 0);
        }

        be16(&mut out, s.pseudos.len() as u16);
        out.extend_from_slice(&[0; 6]); // search fields
        for (uid, gid) in &s.pseudos {
            be32(&mut out, *uid);
            be16(&mut out, *gid);
        }

        out.extend_from_slice(&self.class_map());

        let mut offsets = vec![out.len() as u32];
        for p in &s.passes {
            out.extend_from_slice(&Self::pass_payload(p, out.len()));
            offsets.push(out.len() as u32);
        }
        if s.passes.is_empty() {
            out.push(0); // keep passes_start inside the subtable
        }
        for (i, off) in offsets.iter().enumerate() {
            out[o_passes + i * 4..o_passes + i * 4 + 4].copy_from_slice(&off.to_be_bytes());
        }
        out
    }

    fn class_map(&self) -> Vec<u8> {
        let s = &self.silf;
        let n_linear = s.linear_classes.len();
        let n_class = n_linear + s.lookup_classes.len();
        let mut data = vec![];
        let mut offsets = vec![];
        for c in &s.linear_classes {
            offsets.push(data.len() as u16);
            for g in c {
                be16(&mut data, *g);
            }
        }
        for c in &s.lookup_classes {
            offsets.push(data.len() as u16);
            let num = c.len() as u16;
            let mut search = 1u16;
            let mut selector = 0u16;
            while search * 2 <= num {
                search *= 2;
                selector += 1;
            }
            be16(&mut data, num);
            be16(&mut data, search);
            be16(&mut data, selector);
            be16(&mut data, num - search);
            let mut sorted = c.clone();
            sorted.sort_unstable();
            for (g, i) in sorted {
                be16(&mut data, g);
                be16(&mut data, i);
            }
        }
        offsets.push(data.len() as u16);

        let cls_off = 4 + 2 * (n_class as u16 + 1);
        let mut out = vec![];
        be16(&mut out, n_class as u16);
        be16(&mut out, n_linear as u16);
        for off in offsets {
            be16(&mut out, cls_off + off);
        }
        out.extend_from_slice(&data);
        out
    }

    /// Serialize one pass at absolute offset `base` within the subtable
    fn pass_payload(p: &PassSpec, base: usize) -> Vec<u8> {
        let num_rules = p.rules.len();

        // Rule map from the per-state lists.
        let mut rule_map = vec![];
        let mut rule_map_ends = vec![];
        for list in &p.success_rule_lists {
            for r in list {
                rule_map.push(*r);
            }
        }
        let mut acc = 0u16;
        rule_map_ends.push(0u16);
        for list in &p.success_rule_lists {
            acc += list.len() as u16;
            rule_map_ends.push(acc);
        }
        // one entry per success state plus terminator
        assert_eq!(p.success_rule_lists.len(), usize::from(p.num_success));

        // Code blobs. A leading pad byte keeps every real constraint at a
        // nonzero offset, since offset zero means "no constraint".
        let any_constraint = p.rules.iter().any(|r| !r.constraint.is_empty());
        let mut rc_blob: Vec<u8> = if any_constraint { vec![0] } else { vec![] };
        let mut o_constraint = vec![];
        for r in &p.rules {
            if r.constraint.is_empty() {
                o_constraint.push(0u16);
            } else {
                o_constraint.push(rc_blob.len() as u16);
                rc_blob.extend_from_slice(&r.constraint);
            }
        }
        o_constraint.push(rc_blob.len() as u16);

        let mut ac_blob: Vec<u8> = vec![];
        let mut o_actions = vec![];
        for r in &p.rules {
            o_actions.push(ac_blob.len() as u16);
            ac_blob.extend_from_slice(&r.action);
        }
        o_actions.push(ac_blob.len() as u16);

        // Fixed-size region between the header and the code blobs.
        let num_starts = usize::from(p.max_pre - p.min_pre) + 1;
        let mid_len = p.ranges.len() * 6
            + (usize::from(p.num_success) + 1) * 2
            + rule_map.len() * 2
            + 2
            + num_starts * 2
            + num_rules * 2
            + num_rules
            + 1
            + 2
            + (num_rules + 1) * 2 * 2
            + usize::from(p.num_transition) * usize::from(p.num_columns) * 2
            + 1;
        let pc_off = (base + 40 + mid_len) as u32;
        let rc_off = pc_off + p.pass_constraint.len() as u32;
        let a_off = rc_off + rc_blob.len() as u32;

        let mut out = vec![];
        out.push(p.flags);
        out.push(p.max_loop);
        out.push(0); // maxContext
        out.push(0); // maxBackup
        be16(&mut out, num_rules as u16);
        be16(&mut out, 0); // fsmOffset
        be32(&mut out, pc_off);
        be32(&mut out, rc_off);
        be32(&mut out, a_off);
        be32(&mut out, 0);
        be16(&mut out, p.num_states);
        be16(&mut out, p.num_transition);
        be16(&mut out, p.num_success);
        be16(&mut out, p.num_columns);
        be16(&mut out, p.ranges.len() as u16);
        be16(&mut out, 0); // searchRange
        be16(&mut out, 0); // entrySelector
        be16(&mut out, 0); // rangeShift
        assert_eq!(out.len(), 40);

        for (first, last, col) in &p.ranges {
            be16(&mut out, *first);
            be16(&mut out, *last);
            be16(&mut out, *col);
        }
        for e in &rule_map_ends {
            be16(&mut out, *e);
        }
        for r in &rule_map {
            be16(&mut out, *r);
        }
        out.push(p.min_pre);
        out.push(p.max_pre);
        for st in &p.start_states {
            be16(&mut out, *st);
        }
        assert_eq!(p.start_states.len(), num_starts);
        for r in &p.rules {
            be16(&mut out, r.sort);
        }
        for r in &p.rules {
            out.push(r.pre_context);
        }
        out.push(10); // colThreshold
        be16(&mut out, p.pass_constraint.len() as u16);
        for o in &o_constraint {
            be16(&mut out, *o);
        }
        for o in &o_actions {
            be16(&mut out, *o);
        }
        for row in &p.transitions {
            assert_eq!(row.len(), usize::from(p.num_columns));
            for t in row {
                be16(&mut out, *t);
            }
        }
        assert_eq!(p.transitions.len(), usize::from(p.num_transition));
        out.push(0); // separator
        assert_eq!(base + out.len(), pc_off as usize);
        out.extend_from_slice(&p.pass_constraint);
        out.extend_from_slice(&rc_blob);
        out.extend_from_slice(&ac_blob);
        out
    }
}

/// A `Feat` v2 table where every feature has settings 0 and 1
pub fn feat_v2(tags: &[u32]) -> Vec<u8> {
    let mut out = vec![];
    be32(&mut out, 0x0002_0000);
    be16(&mut out, tags.len() as u16);
    out.extend_from_slice(&[0; 6]);
    let settings_base = 12 + tags.len() * 16;
    for (i, tag) in tags.iter().enumerate() {
        be32(&mut out, *tag);
        be16(&mut out, 2); // numSettings
        be16(&mut out, 0);
        be32(&mut out, (settings_base + i * 8) as u32);
        be16(&mut out, 0); // flags
        be16(&mut out, 0x100 + i as u16); // uiName
    }
    for _ in tags {
        for (value, label) in [(0i16, 10u16), (1, 11)] {
            be16i(&mut out, value);
            be16(&mut out, label);
        }
    }
    out
}

/// Opcode numbers used to assemble test programs
pub mod op {
    pub const PUSH_BYTE: u8 = 1;
    pub const ADD: u8 = 6;
    pub const SUB: u8 = 7;
    pub const COND: u8 = 15;
    pub const EQUAL: u8 = 19;
    pub const NEXT: u8 = 25;
    pub const DELETE: u8 = 32;
    pub const POP_RET: u8 = 48;
    pub const RET_ZERO: u8 = 49;
    pub const RET_TRUE: u8 = 50;
    pub const PUT_GLYPH: u8 = 59;
}
