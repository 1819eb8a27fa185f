// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! The `Silf` shaping program: pass list and per-face shaping metadata
//!
//! One subtable holds everything a script's shaping needs: the ordered
//! passes with their category boundaries, the glyph attribute indices the
//! engine reads (break weight, bidi class, mirror pair, pass bits,
//! collision attributes), the pseudo-glyph map, the class map, and the
//! justification level descriptors. [`Silf::run_graphite`] drives the
//! passes over a segment, inserting the bidi reversal step where the font
//! asks for it.

mod classes;

use crate::bytes::ByteReader;
use crate::context::ShapingContext;
use crate::error::Error;
use crate::face::Face;
use crate::pass::{Pass, PassLoadInfo, PassType};
use crate::segment::{Segment, MAX_SEG_GROWTH_FACTOR};
use crate::vm::Machine;
use classes::ClassMap;
use ttf_parser::Tag;

const SILF: Tag = Tag::from_bytes(b"Silf");

/// Glyph attribute indices for one justification level
#[derive(Clone, Copy, Debug)]
pub(crate) struct JustInfo {
    pub stretch: u8,
    pub shrink: u8,
    pub step: u8,
    pub weight: u8,
}

/// One shaping program, parsed from a `Silf` subtable
#[derive(Debug, Default)]
pub struct Silf {
    passes: Vec<Pass>,
    /// `(codepoint, glyph)` pairs in table order
    pseudos: Vec<(u32, u16)>,
    classes: ClassMap,
    justs: Vec<JustInfo>,
    s_pass: u8,
    p_pass: u8,
    j_pass: u8,
    b_pass: u8,
    flags: u8,
    dir: u8,
    a_pseudo: u8,
    a_break: u8,
    a_bidi: u8,
    a_mirror: u8,
    a_pass_bits: u8,
    a_user: u8,
    i_max_comp: u8,
    a_collision: u8,
    a_lig: u16,
    g_end_line: u16,
}

impl Silf {
    /// Parse one subtable
    pub(crate) fn read(
        data: &[u8],
        version: u32,
        subtable: u16,
        num_glyphs: u16,
        num_attrs: u16,
        num_feats: u16,
    ) -> Result<Silf, Error> {
        let mut silf = Silf::default();
        if version >= 0x0006_0000 {
            return Err(Error::BadVersion { tag: SILF, version });
        }
        let mut r = ByteReader::new(SILF, data);
        if version >= 0x0003_0000 {
            r.skip(4)?; // ruleVersion
            r.skip(4)?; // passOffset, pseudosOffset
        }
        let max_glyph = r.read_u16()?;
        r.skip(4)?; // extraAscent, extraDescent
        let num_passes = usize::from(r.read_u8()?);
        silf.s_pass = r.read_u8()?;
        silf.p_pass = r.read_u8()?;
        silf.j_pass = r.read_u8()?;
        silf.b_pass = r.read_u8()?;
        silf.flags = r.read_u8()?;
        r.skip(2)?; // maxPreContext, maxPostContext
        silf.a_pseudo = r.read_u8()?;
        silf.a_break = r.read_u8()?;
        silf.a_bidi = r.read_u8()?;
        silf.a_mirror = r.read_u8()?;
        silf.a_pass_bits = r.read_u8()?;

        if max_glyph >= num_glyphs {
            return Err(Error::BadSilfHeader { subtable });
        }
        let num_justs = usize::from(r.read_u8()?);
        if r.pos() + num_justs * 8 >= data.len() {
            return Err(Error::BadJustLevels { subtable });
        }
        for _ in 0..num_justs {
            let j = r.take(8)?;
            silf.justs.push(JustInfo {
                stretch: j[0],
                shrink: j[1],
                step: j[2],
                weight: j[3],
            });
        }

        silf.a_lig = r.read_u16()?;
        silf.a_user = r.read_u8()?;
        silf.i_max_comp = r.read_u8()?;
        silf.dir = r.read_u8()?.wrapping_sub(1);
        silf.a_collision = r.read_u8()?;
        r.skip(3)?;
        let num_crit = usize::from(r.read_u8()?);
        r.skip(num_crit * 2)?; // critical features
        r.skip(1)?; // reserved
        let num_script_tags = usize::from(r.read_u8()?);
        r.skip(num_script_tags * 4)?;
        silf.g_end_line = r.read_u16()?;

        let o_passes = r.pos();
        let passes_start = r.read_u32()? as usize;

        let na = usize::from(num_attrs);
        if usize::from(silf.a_pseudo) >= na
            || usize::from(silf.a_break) >= na
            || usize::from(silf.a_bidi) >= na
            || usize::from(silf.a_mirror) >= na
            || (silf.a_collision != 0 && usize::from(silf.a_collision) + 5 >= na)
        {
            return Err(Error::BadAttrIndex { subtable });
        }
        if num_passes > 128
            || passes_start >= data.len()
            || silf.p_pass < silf.s_pass
            || usize::from(silf.p_pass) > num_passes
            || usize::from(silf.s_pass) > num_passes
            || silf.j_pass < silf.p_pass
            || usize::from(silf.j_pass) > num_passes
            || (silf.b_pass != 0xFF
                && (silf.b_pass < silf.j_pass || usize::from(silf.b_pass) > num_passes))
            || silf.a_lig > 127
        {
            return Err(Error::BadPassBounds { subtable });
        }
        r.skip(num_passes * 4)?;

        let num_pseudo = usize::from(r.read_u16()?);
        r.skip(6)?; // search fields
        if r.pos() + num_pseudo * 6 >= passes_start {
            return Err(Error::BadPseudoMap { subtable });
        }
        for _ in 0..num_pseudo {
            let uid = r.read_u32()?;
            let gid = r.read_u16()?;
            silf.pseudos.push((uid, gid));
        }

        silf.classes = ClassMap::read(&data[r.pos()..passes_start], version)?;

        let info = PassLoadInfo {
            a_collision: silf.a_collision,
            silf_flags: silf.flags,
            num_classes: silf.classes.num_classes(),
            num_attrs,
            num_feats,
        };
        let pr = ByteReader::new(SILF, data);
        for i in 0..num_passes {
            let pass_start = pr.peek_u32_at(o_passes + i * 4)? as usize;
            let pass_end = pr.peek_u32_at(o_passes + (i + 1) * 4)? as usize;
            if pass_start > pass_end || pass_start < passes_start || pass_end > data.len() {
                return Err(Error::BadPassLength { pass: i as u8 });
            }
            let pt = if i >= usize::from(silf.j_pass) {
                PassType::Justification
            } else if i >= usize::from(silf.p_pass) {
                PassType::Positioning
            } else if i >= usize::from(silf.s_pass) {
                PassType::Substitute
            } else {
                PassType::Linebreak
            };
            silf.passes
                .push(Pass::read(data, pass_start, pass_end, i as u8, pt, &info)?);
        }
        log::debug!(
            "Silf subtable {}: {} passes (s {}, p {}, j {}, bidi {:#x})",
            subtable,
            num_passes,
            silf.s_pass,
            silf.p_pass,
            silf.j_pass,
            silf.b_pass
        );
        Ok(silf)
    }

    pub(crate) fn num_passes(&self) -> usize {
        self.passes.len()
    }

    pub(crate) fn position_pass(&self) -> u8 {
        self.p_pass
    }

    pub(crate) fn justification_pass(&self) -> u8 {
        self.j_pass
    }

    pub(crate) fn bidi_pass(&self) -> u8 {
        self.b_pass
    }

    pub(crate) fn flags(&self) -> u8 {
        self.flags
    }

    /// bit 0: this script reads right-to-left
    pub(crate) fn dir(&self) -> u8 {
        self.dir
    }

    /// Number of user-defined attributes per slot
    pub(crate) fn num_user(&self) -> usize {
        usize::from(self.a_user)
    }

    pub(crate) fn a_pseudo(&self) -> u8 {
        self.a_pseudo
    }

    pub(crate) fn a_break(&self) -> u8 {
        self.a_break
    }

    pub(crate) fn a_bidi(&self) -> u8 {
        self.a_bidi
    }

    pub(crate) fn a_mirror(&self) -> u8 {
        self.a_mirror
    }

    pub(crate) fn a_pass_bits(&self) -> u8 {
        self.a_pass_bits
    }

    pub(crate) fn a_collision(&self) -> u8 {
        self.a_collision
    }

    pub(crate) fn num_just_levels(&self) -> usize {
        self.justs.len()
    }

    pub(crate) fn just_attrs(&self) -> &[JustInfo] {
        &self.justs
    }

    pub(crate) fn end_line_glyph(&self) -> u16 {
        self.g_end_line
    }

    /// Fallback glyph for a codepoint the cmap does not cover
    pub(crate) fn find_pseudo(&self, uid: u32) -> u16 {
        self.pseudos
            .iter()
            .find(|p| p.0 == uid)
            .map(|p| p.1)
            .unwrap_or(0)
    }

    pub(crate) fn find_class_index(&self, cid: u16, gid: u16) -> u16 {
        self.classes.find_index(cid, gid)
    }

    pub(crate) fn get_class_glyph(&self, cid: u16, index: u16) -> u16 {
        self.classes.get_glyph(cid, index)
    }

    /// Run passes `[first_pass, last_pass)` over the segment
    ///
    /// `last_pass == 0` means the whole list. When `do_bidi` is set and the
    /// font declares a bidi pass position, the reversal/mirroring step is
    /// inserted there; it is a step, not a stored pass.
    pub(crate) fn run_graphite(
        &self,
        face: &Face,
        seg: &mut Segment,
        first_pass: u8,
        last_pass: u8,
        do_bidi: bool,
    ) -> Result<(), Error> {
        let max_size = seg.n_slots() * MAX_SEG_GROWTH_FACTOR;
        let mut ctxt = ShapingContext::new(self.dir, max_size);
        let mut machine = Machine::new();
        let mut lbidi = self.b_pass;
        let mut last_pass = last_pass;

        if last_pass == 0 {
            if first_pass == last_pass && lbidi == 0xFF {
                return Ok(());
            }
            last_pass = self.passes.len() as u8;
        }
        if (first_pass < lbidi || (do_bidi && first_pass == lbidi))
            && (last_pass >= lbidi || (do_bidi && last_pass + 1 == lbidi))
        {
            last_pass += 1;
        } else {
            lbidi = 0xFF;
        }

        let mut i = first_pass;
        while i < last_pass {
            if i == lbidi {
                // The inserted bidi step: reverse to the script direction
                // and mirror what the font asks to mirror.
                if seg.currdir() != (self.dir & 1 != 0) {
                    seg.reverse_slots(face, self);
                }
                if self.a_mirror != 0 && seg.dir() & 3 == 3 {
                    seg.do_mirror(face, self, self.a_mirror);
                }
                lbidi = last_pass;
                last_pass -= 1;
                continue;
            }

            let Some(pass) = self.passes.get(usize::from(i)) else {
                break;
            };
            let reverse =
                lbidi == 0xFF && seg.currdir() != ((self.dir & 1 != 0) ^ pass.reverse_dir());
            let skippable = i < 32 && seg.pass_bits() & (1 << i) != 0;
            if !skippable || pass.collision_loops() != 0 {
                machine.reset_status();
                pass.run(face, self, seg, &mut ctxt, &mut machine, reverse, i)?;
            }
            if seg.n_slots() > max_size {
                return Err(Error::SegmentGrowth);
            }
            i += 1;
        }
        Ok(())
    }
}
