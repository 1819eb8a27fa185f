// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Error types
//!
//! The taxonomy is flat: one variant per failing code path, each carrying
//! enough context (table tag, pass index, rule index) to identify the
//! offending structure in the font. Load failures mean no [`crate::Face`] is
//! constructed; shaping failures mean the segment is discarded.

use crate::vm::{CodeStatus, MachineStatus};
use thiserror::Error;
use ttf_parser::Tag;

/// Which of a pass's three bytecode regions failed a bounds check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodeRegion {
    PassConstraint,
    RuleConstraint,
    Action,
}

impl std::fmt::Display for CodeRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CodeRegion::PassConstraint => "pass constraint",
            CodeRegion::RuleConstraint => "rule constraint",
            CodeRegion::Action => "action",
        })
    }
}

/// Any failure while loading a face or shaping a segment
#[derive(Clone, Copy, Debug, PartialEq, Error)]
pub enum Error {
    #[error("required table {0} is missing")]
    MissingTable(Tag),

    #[error("table {tag} truncated: read of {need} bytes at offset {at} passes the end")]
    Truncated { tag: Tag, at: usize, need: usize },

    #[error("unsupported version {version:#010x} of table {tag}")]
    BadVersion { tag: Tag, version: u32 },

    #[error("font defines no glyphs")]
    NoGlyphs,

    #[error("Feat table entry {feat}: settings range out of bounds")]
    BadFeatureSettings { feat: u16 },

    #[error("Sill table language entry {lang}: settings range out of bounds")]
    BadLangSettings { lang: u16 },

    #[error("Silf subtable {subtable}: malformed header")]
    BadSilfHeader { subtable: u16 },

    #[error("Silf subtable {subtable}: pass category boundaries are inconsistent")]
    BadPassBounds { subtable: u16 },

    #[error("Silf subtable {subtable}: glyph attribute index out of range")]
    BadAttrIndex { subtable: u16 },

    #[error("Silf subtable {subtable}: justification level array out of bounds")]
    BadJustLevels { subtable: u16 },

    #[error("Silf subtable {subtable}: pseudo-glyph map out of bounds")]
    BadPseudoMap { subtable: u16 },

    #[error("class map: class offsets misaligned or out of bounds")]
    BadClassOffsets,

    #[error("class map: more linear classes than classes")]
    TooManyLinear,

    #[error("class map: lookup class {class} has invalid search header")]
    BadClassLookup { class: u16 },

    #[error("pass {pass}: payload too short")]
    BadPassLength { pass: u8 },

    #[error("pass {pass}: has neither rules nor collision runs")]
    EmptyPass { pass: u8 },

    #[error("pass {pass}: collision flags on a non-positioning pass")]
    BadCollisionPass { pass: u8 },

    #[error("pass {pass}: state counts are inconsistent")]
    BadStateCount { pass: u8 },

    #[error("pass {pass}: rules but no glyph ranges")]
    NoRanges { pass: u8 },

    #[error("pass {pass}: too many FSM columns")]
    BadColumnCount { pass: u8 },

    #[error("pass {pass}: {region} code offset out of bounds")]
    BadCodeOffset { pass: u8, region: CodeRegion },

    #[error("pass {pass}: glyph range table is invalid")]
    BadRange { pass: u8 },

    #[error("pass {pass}: pre-context bounds are invalid")]
    BadCtxtBounds { pass: u8 },

    #[error("pass {pass}: rule {rule} has invalid sort key or pre-context")]
    BadRuleBounds { pass: u8, rule: u16 },

    #[error("pass {pass}: rule map references rule past the rule table")]
    BadRuleNum { pass: u8 },

    #[error("pass {pass}: state {state} out of range")]
    BadState { pass: u8, state: u16 },

    #[error("pass {pass}: success state has invalid rule mapping")]
    BadRuleMapping { pass: u8 },

    #[error("pass {pass}, rule {rule:?}: {region} program failed to load: {status}")]
    Bytecode {
        pass: u8,
        rule: Option<u16>,
        region: CodeRegion,
        status: CodeStatus,
    },

    #[error("pass {pass}, rule {rule}: constraint program mutates the slot stream")]
    MutableConstraint { pass: u8, rule: u16 },

    #[error("pass {pass}: rule program stopped: {status}")]
    Vm { pass: u8, status: MachineStatus },

    #[error("segment grew past its growth limit")]
    SegmentGrowth,
}
