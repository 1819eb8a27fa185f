// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! The face: all read-only state derived from one font
//!
//! A [`Face`] is built from a [`TableProvider`]: anything that hands out
//! raw table slices by tag, such as [`ttf_parser::RawFace`]. After a
//! successful load the face is immutable and may be shared across threads;
//! each shape call builds its own [`Segment`].

pub(crate) mod features;
pub(crate) mod glyphs;

use crate::data::{Direction, Position, Rect};
use crate::error::Error;
use crate::segment::Segment;
use crate::silf::Silf;
use crate::text::TextSource;
use features::{FeatureMap, FeatureVal, Sill};
use glyphs::{GlyphCache, Metric};
use ttf_parser::Tag;

const SILF: Tag = Tag::from_bytes(b"Silf");
const GLAT: Tag = Tag::from_bytes(b"Glat");
const GLOC: Tag = Tag::from_bytes(b"Gloc");
const FEAT: Tag = Tag::from_bytes(b"Feat");
const SILL: Tag = Tag::from_bytes(b"Sill");

/// Source of raw font tables keyed by tag
///
/// Font file I/O is outside this crate: callers parse the sfnt wrapper (or
/// synthesize tables) and expose the slices.
pub trait TableProvider<'a> {
    fn table(&self, tag: Tag) -> Option<&'a [u8]>;
}

impl<'a> TableProvider<'a> for ttf_parser::RawFace<'a> {
    fn table(&self, tag: Tag) -> Option<&'a [u8]> {
        ttf_parser::RawFace::table(self, tag)
    }
}

/// Scaling applied when reporting final positions
///
/// All shaping happens in design units; a font scales positions at the
/// very end of [`Face::shape`] and [`Segment::justify`](crate::Segment).
#[derive(Clone, Copy, Debug)]
pub struct Font {
    scale: f32,
}

impl Font {
    pub fn new(scale: f32) -> Self {
        Font { scale }
    }

    /// Scale from pixels-per-em for a face with the given units-per-em
    pub fn from_ppem(ppem: f32, face: &Face) -> Self {
        Font {
            scale: ppem / f32::from(face.units_per_em()),
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }
}

/// Everything a shape call needs besides the text
#[derive(Clone, Debug, Default)]
pub struct ShapeOptions {
    /// Script tag selecting the shaping program
    pub script: u32,
    /// Language tag selecting `Sill` feature defaults; 0 = default
    pub lang: u32,
    /// Explicit feature values; `None` uses the language's defaults
    pub features: Option<FeatureVal>,
    pub direction: Direction,
    /// Run the font's bidi pass (reversal and mirroring)
    pub bidi: bool,
}

/// A loaded Graphite face
pub struct Face<'a> {
    glyphs: GlyphCache,
    feature_map: FeatureMap,
    sill: Sill,
    silfs: Vec<Silf>,
    cmap: Option<ttf_parser::cmap::Subtable<'a>>,
    units_per_em: u16,
    ascent: i16,
    descent: i16,
}

impl<'a> Face<'a> {
    /// Load a face from raw tables
    ///
    /// Requires `Silf`, `Glat`, `Gloc` plus the standard metric tables;
    /// `Feat` and `Sill` are optional.
    pub fn new(provider: &impl TableProvider<'a>) -> Result<Face<'a>, Error> {
        let table = |tag: Tag| provider.table(tag).ok_or(Error::MissingTable(tag));

        let head_tag = Tag::from_bytes(b"head");
        let head = ttf_parser::head::Table::parse(table(head_tag)?)
            .ok_or(Error::MissingTable(head_tag))?;
        let maxp_tag = Tag::from_bytes(b"maxp");
        let maxp = ttf_parser::maxp::Table::parse(table(maxp_tag)?)
            .ok_or(Error::MissingTable(maxp_tag))?;
        let num_glyphs = maxp.number_of_glyphs;
        let hhea_tag = Tag::from_bytes(b"hhea");
        let hhea = ttf_parser::hhea::Table::parse(table(hhea_tag)?)
            .ok_or(Error::MissingTable(hhea_tag))?;
        let hmtx_tag = Tag::from_bytes(b"hmtx");
        let hmtx =
            ttf_parser::hmtx::Table::parse(hhea.number_of_metrics, num_glyphs, table(hmtx_tag)?)
                .ok_or(Error::MissingTable(hmtx_tag))?;

        // glyf is optional; faces without it report empty bounding boxes.
        let glyf = provider
            .table(Tag::from_bytes(b"loca"))
            .and_then(|loca_data| {
                let loca = ttf_parser::loca::Table::parse(
                    num_glyphs,
                    head.index_to_location_format,
                    loca_data,
                )?;
                ttf_parser::glyf::Table::parse(loca, provider.table(Tag::from_bytes(b"glyf"))?)
            });

        let glyphs = GlyphCache::read(
            num_glyphs.get(),
            table(GLOC)?,
            table(GLAT)?,
            |gid| {
                hmtx.advance(ttf_parser::GlyphId(gid))
                    .map(f32::from)
                    .unwrap_or(0.0)
            },
            |gid| {
                struct Sink;
                impl ttf_parser::OutlineBuilder for Sink {
                    fn move_to(&mut self, _: f32, _: f32) {}
                    fn line_to(&mut self, _: f32, _: f32) {}
                    fn quad_to(&mut self, _: f32, _: f32, _: f32, _: f32) {}
                    fn curve_to(&mut self, _: f32, _: f32, _: f32, _: f32, _: f32, _: f32) {}
                    fn close(&mut self) {}
                }
                glyf.as_ref()
                    .and_then(|t| t.outline(ttf_parser::GlyphId(gid), &mut Sink))
                    .map(|b| {
                        Rect::new(
                            Position::new(f32::from(b.x_min), f32::from(b.y_min)),
                            Position::new(f32::from(b.x_max), f32::from(b.y_max)),
                        )
                    })
                    .unwrap_or_default()
            },
        )?;

        let feature_map = FeatureMap::read(provider.table(FEAT))?;
        let sill = Sill::read(provider.table(SILL), &feature_map)?;

        let silf_data = table(SILF)?;
        let mut r = crate::bytes::ByteReader::new(SILF, silf_data);
        let version = r.read_u32()?;
        if !(0x0001_0000..0x0006_0000).contains(&version) {
            return Err(Error::BadVersion { tag: SILF, version });
        }
        if version >= 0x0003_0000 {
            r.skip(4)?; // compilerVersion
        }
        let num_sub = r.read_u16()?;
        r.skip(2)?;
        let mut silfs = Vec::with_capacity(usize::from(num_sub));
        for i in 0..num_sub {
            let offset = r.read_u32()? as usize;
            if offset >= silf_data.len() {
                return Err(Error::BadSilfHeader { subtable: i });
            }
            silfs.push(Silf::read(
                &silf_data[offset..],
                version,
                i,
                num_glyphs.get(),
                glyphs.num_attrs(),
                feature_map.num_feats(),
            )?);
        }

        let cmap = provider.table(Tag::from_bytes(b"cmap")).and_then(|data| {
            let table = ttf_parser::cmap::Table::parse(data)?;
            let mut best = None;
            for sub in table.subtables {
                if sub.is_unicode() {
                    best = Some(sub);
                }
            }
            best
        });

        log::debug!(
            "face loaded: {} glyphs, {} features, {} Silf subtables",
            num_glyphs.get(),
            feature_map.num_feats(),
            silfs.len()
        );
        Ok(Face {
            glyphs,
            feature_map,
            sill,
            silfs,
            cmap,
            units_per_em: head.units_per_em,
            ascent: hhea.ascender,
            descent: hhea.descender,
        })
    }

    pub fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    pub fn glyphs(&self) -> &GlyphCache {
        &self.glyphs
    }

    pub fn feature_map(&self) -> &FeatureMap {
        &self.feature_map
    }

    pub fn sill(&self) -> &Sill {
        &self.sill
    }

    /// The shaping program for `script`
    ///
    /// Graphite fonts carry one program per face in practice; the script
    /// tag participates in feature selection rather than program choice.
    pub(crate) fn silf(&self, _script: u32) -> Option<&Silf> {
        self.silfs.first()
    }

    /// A feature-value vector for `lang`, ready for caller overrides
    pub fn features_for_lang(&self, lang: u32) -> FeatureVal {
        self.sill.clone_features(&self.feature_map, lang)
    }

    /// Glyph attribute, zero for unknown glyphs or attributes
    pub(crate) fn glyph_attr(&self, gid: u16, attr: u16) -> i16 {
        self.glyphs.attr(gid, attr)
    }

    pub(crate) fn glyph_metric(&self, gid: u16, metric: Metric) -> i32 {
        match metric {
            Metric::Ascent => i32::from(self.ascent),
            Metric::Descent => i32::from(self.descent),
            _ => self
                .glyphs
                .glyph(gid)
                .map(|g| g.metric(metric))
                .unwrap_or(0),
        }
    }

    /// Standard cmap lookup; 0 for unmapped codepoints
    pub(crate) fn gid_for_char(&self, usv: u32) -> u16 {
        self.cmap
            .as_ref()
            .and_then(|c| c.glyph_index(usv))
            .map(|g| g.0)
            .unwrap_or(0)
    }

    /// Shape a run of text into a positioned segment
    pub fn shape<'t>(
        &self,
        font: Option<&Font>,
        text: impl Into<TextSource<'t>>,
        opts: &ShapeOptions,
    ) -> Result<Segment, Error> {
        let silf = self.silf(opts.script).ok_or(Error::MissingTable(SILF))?;
        let text = text.into();
        let n_chars = text.char_count();

        let feats = match &opts.features {
            Some(f) => f.clone(),
            None => self.features_for_lang(opts.lang),
        };
        let dir = u8::from(opts.direction.is_rtl()) | if opts.bidi { 2 } else { 0 };
        let mut seg = Segment::new(n_chars, silf, dir);
        seg.read_text(self, silf, feats, &text);
        silf.run_graphite(self, &mut seg, 0, silf.num_passes() as u8, opts.bidi)?;
        seg.finalise(self, silf, font.map(|f| f.scale()));
        Ok(seg)
    }
}
