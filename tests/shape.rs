// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! End-to-end shaping over synthetic Graphite fonts

mod common;

use common::{op, FontBuilder, GlyphSpec, PassSpec, RuleSpec, SilfSpec};
use graphite_shaper::{
    CodeStatus, Direction, Error, Face, JustFlags, Rect, ShapeOptions,
};

fn glyph(advance: u16, bbox: (i16, i16, i16, i16)) -> GlyphSpec {
    GlyphSpec {
        advance,
        bbox,
        attrs: vec![],
    }
}

fn shape_options(direction: Direction, bidi: bool) -> ShapeOptions {
    ShapeOptions {
        direction,
        bidi,
        ..Default::default()
    }
}

#[test]
fn empty_input_yields_empty_segment() {
    let builder = FontBuilder::new(vec![glyph(0, (0, 0, 0, 0)), glyph(500, (50, 0, 450, 700))]);
    let tables = builder.build();
    let face = Face::new(&common::TablesRef(&tables)).unwrap();
    let seg = face
        .shape(None, "", &shape_options(Direction::Ltr, false))
        .unwrap();
    assert_eq!(seg.n_slots(), 0);
    assert_eq!(seg.n_char_info(), 0);
    assert_eq!(seg.advance().x, 0.0);
}

#[test]
fn pseudo_glyph_mapping() {
    let mut builder = FontBuilder::new(vec![
        glyph(0, (0, 0, 0, 0)),
        glyph(500, (50, 0, 450, 700)),
        glyph(500, (50, 0, 450, 700)),
        glyph(600, (0, 0, 0, 0)),
    ]);
    builder.cmap = vec![('a' as u32, 1), ('b' as u32, 2)];
    builder.silf.pseudos = vec![(0x00A0, 3)];
    let tables = builder.build();
    let face = Face::new(&common::TablesRef(&tables)).unwrap();

    let seg = face
        .shape(None, "\u{00A0}", &shape_options(Direction::Ltr, false))
        .unwrap();
    assert_eq!(seg.n_slots(), 1);
    let slot = seg.slot(0).unwrap();
    assert_eq!(slot.gid(), 3);
    assert_eq!(slot.before(), 0);
    assert_eq!(slot.after(), 0);
    assert_eq!(seg.advance().x, 600.0);
    assert_eq!(seg.char_info(0).unwrap().unicode(), 0x00A0);
}

/// Font with one substitution pass joining gid1 + gid2 into gid4
fn ligature_font(action: Vec<u8>, constraint: Vec<u8>) -> FontBuilder {
    let mut builder = FontBuilder::new(vec![
        glyph(0, (0, 0, 0, 0)),
        glyph(400, (20, 0, 380, 700)),
        glyph(300, (20, 0, 280, 500)),
        glyph(350, (20, 0, 330, 500)),
        glyph(650, (20, 0, 630, 700)),
    ]);
    builder.cmap = vec![('a' as u32, 1), ('b' as u32, 2), ('c' as u32, 3)];
    builder.silf = SilfSpec {
        b_pass: 0xFF,
        s_pass: 0,
        p_pass: 1,
        j_pass: 1,
        linear_classes: vec![vec![4]],
        passes: vec![PassSpec {
            num_states: 4,
            num_transition: 2,
            num_success: 2,
            num_columns: 2,
            ranges: vec![(1, 1, 0), (2, 2, 1)],
            transitions: vec![vec![1, 0], vec![0, 3]],
            success_rule_lists: vec![vec![], vec![0]],
            rules: vec![RuleSpec {
                sort: 2,
                pre_context: 0,
                constraint,
                action,
            }],
            ..Default::default()
        }],
        ..SilfSpec::plain()
    };
    builder
}

#[test]
fn ligature_substitution() {
    // constraint: 21 + 21 == 42, exercising the arithmetic opcodes
    let constraint = vec![
        op::PUSH_BYTE,
        21,
        op::PUSH_BYTE,
        21,
        op::ADD,
        op::PUSH_BYTE,
        42,
        op::EQUAL,
        op::POP_RET,
    ];
    let action = vec![
        op::PUT_GLYPH,
        0,
        0, // class 0
        op::NEXT,
        op::DELETE,
        op::PUSH_BYTE,
        1,
        op::POP_RET,
    ];
    let tables = ligature_font(action, constraint).build();
    let face = Face::new(&common::TablesRef(&tables)).unwrap();

    let seg = face
        .shape(None, "ab", &shape_options(Direction::Ltr, false))
        .unwrap();
    assert_eq!(seg.n_slots(), 1, "two glyphs must fuse into one");
    let slot = seg.slot(0).unwrap();
    assert_eq!(slot.gid(), 4);
    assert_eq!(slot.before(), 0);
    assert_eq!(slot.after(), 1);
    assert_eq!(seg.advance().x, 650.0);

    // both characters associate to the single slot
    for i in 0..2 {
        assert!(seg.char_info(i).unwrap().after() >= 0);
    }

    // a failing constraint leaves the input untouched
    let seg = face
        .shape(None, "ba", &shape_options(Direction::Ltr, false))
        .unwrap();
    assert_eq!(seg.n_slots(), 2);
    assert_eq!(seg.advance().x, 700.0);
}

#[test]
fn invalid_action_bytecode_fails_load() {
    let tables = ligature_font(vec![0x7F], vec![]).build();
    match Face::new(&common::TablesRef(&tables)) {
        Err(Error::Bytecode { status, .. }) => assert_eq!(status, CodeStatus::InvalidOpcode),
        other => panic!("expected bytecode error, got {:?}", other.err()),
    }
}

#[test]
fn missing_return_fails_load() {
    let tables = ligature_font(vec![op::PUSH_BYTE, 1], vec![]).build();
    match Face::new(&common::TablesRef(&tables)) {
        Err(Error::Bytecode { status, .. }) => assert_eq!(status, CodeStatus::MissingReturn),
        other => panic!("expected bytecode error, got {:?}", other.err()),
    }
}

#[test]
fn justification_expand() {
    let mut builder = FontBuilder::new(vec![
        glyph(0, (0, 0, 0, 0)),
        GlyphSpec {
            advance: 40,
            bbox: (0, 0, 40, 100),
            attrs: vec![(8, 1000), (11, 1)],
        },
        GlyphSpec {
            advance: 30,
            bbox: (0, 0, 30, 100),
            attrs: vec![(8, 1000), (11, 2)],
        },
        GlyphSpec {
            advance: 30,
            bbox: (0, 0, 30, 100),
            attrs: vec![(8, 1000), (11, 1)],
        },
    ]);
    builder.cmap = vec![('x' as u32, 1), ('y' as u32, 2), ('z' as u32, 3)];
    // one justification level: stretch attr 8, shrink 9, step 10, weight 11
    builder.silf.justs = vec![[8, 9, 10, 11]];
    let tables = builder.build();
    let face = Face::new(&common::TablesRef(&tables)).unwrap();

    let mut seg = face
        .shape(None, "xyz", &shape_options(Direction::Ltr, false))
        .unwrap();
    assert_eq!(seg.advance().x, 100.0);

    let achieved = seg.justify(&face, None, 140.0, JustFlags::empty(), None, None);
    assert!(
        (achieved - 140.0).abs() <= 1.0,
        "achieved {achieved}, wanted 140"
    );
    // weights 1:2:1 split the extra 40 units as 10/20/10
    let origins: Vec<f32> = seg.iter_slots().map(|s| s.origin().x).collect();
    assert_eq!(origins, vec![0.0, 50.0, 100.0]);
}

#[test]
fn bidi_reversal() {
    let mut builder = FontBuilder::new(vec![
        glyph(0, (0, 0, 0, 0)),
        glyph(500, (50, 0, 450, 700)),
        glyph(500, (50, 0, 450, 700)),
    ]);
    builder.cmap = vec![('A' as u32, 1), ('B' as u32, 2)];
    builder.silf.b_pass = 0; // bidi step at pass position 0
    let tables = builder.build();
    let face = Face::new(&common::TablesRef(&tables)).unwrap();

    let seg = face
        .shape(None, "AB", &shape_options(Direction::Rtl, true))
        .unwrap();
    assert_eq!(seg.n_slots(), 2);
    let a = seg.iter_slots().find(|s| s.gid() == 1).unwrap();
    let b = seg.iter_slots().find(|s| s.gid() == 2).unwrap();
    assert!(
        b.origin().x < a.origin().x,
        "B must be left of A in visual order (B at {}, A at {})",
        b.origin().x,
        a.origin().x
    );

    // Without the bidi step the order stays LTR.
    let seg = face
        .shape(None, "AB", &shape_options(Direction::Ltr, false))
        .unwrap();
    let a = seg.iter_slots().find(|s| s.gid() == 1).unwrap();
    let b = seg.iter_slots().find(|s| s.gid() == 2).unwrap();
    assert!(a.origin().x < b.origin().x);
}

#[test]
fn collision_shift_separates_marks() {
    const COLL_FIX: i16 = 1;
    let mark_attrs = vec![(8, COLL_FIX), (9, 0), (10, 0), (11, 0), (12, 900)];
    let mut builder = FontBuilder::new(vec![
        glyph(0, (0, 0, 0, 0)),
        glyph(600, (50, 0, 550, 700)),
        GlyphSpec {
            advance: 0,
            bbox: (0, 700, 200, 900),
            attrs: mark_attrs.clone(),
        },
        GlyphSpec {
            advance: 0,
            bbox: (0, 700, 200, 900),
            attrs: mark_attrs,
        },
    ]);
    builder.cmap = vec![('b' as u32, 1), ('m' as u32, 2), ('n' as u32, 3)];
    builder.silf.flags = 0x20; // face uses collision attributes
    builder.silf.a_collision = 8;
    builder.silf.s_pass = 0;
    builder.silf.p_pass = 0;
    builder.silf.j_pass = 1;
    builder.silf.passes = vec![PassSpec {
        flags: 1, // one collision run
        ..Default::default()
    }];
    let tables = builder.build();
    let face = Face::new(&common::TablesRef(&tables)).unwrap();

    let seg = face
        .shape(None, "bmn", &shape_options(Direction::Ltr, false))
        .unwrap();
    assert_eq!(seg.n_slots(), 3);

    let boxes: Vec<Rect> = seg
        .iter_slots()
        .filter(|s| s.gid() >= 2)
        .map(|s| {
            let g = face.glyphs().glyph(s.glyph()).unwrap();
            *g.bbox() + s.origin()
        })
        .collect();
    assert_eq!(boxes.len(), 2);
    assert!(
        !boxes[0].intersects(&boxes[1]),
        "marks must not overlap after the collision pass: {:?}",
        boxes
    );
}

#[test]
fn feature_enumeration() {
    let kdot = u32::from_be_bytes(*b"kdot");
    let wtri = u32::from_be_bytes(*b"wtri");
    let mut builder = FontBuilder::new(vec![glyph(0, (0, 0, 0, 0)), glyph(500, (0, 0, 1, 1))]);
    builder.feat = Some(common::feat_v2(&[kdot, wtri]));
    let tables = builder.build();
    let face = Face::new(&common::TablesRef(&tables)).unwrap();

    let fmap = face.feature_map();
    assert_eq!(fmap.num_feats(), 2);
    for tag in [kdot, wtri] {
        let fref = fmap.find_feature(tag).unwrap();
        assert_eq!(fref.max_val(), 1);
        assert_eq!(fref.value(fmap.default_features()), 0);
    }
}
