// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Per-glyph data: metrics and sparse `Glat` attributes
//!
//! `Gloc` maps each glyph id to a byte range of `Glat`; the range holds runs
//! of 16-bit attribute values. Attribute ids absent from the font read as
//! zero without occupying storage. The cache is fully materialized at face
//! load so a [`crate::Face`] can be shared across threads without locks.

use crate::bytes::ByteReader;
use crate::data::{Position, Rect};
use crate::error::Error;
use ttf_parser::Tag;

const GLAT: Tag = Tag::from_bytes(b"Glat");
const GLOC: Tag = Tag::from_bytes(b"Gloc");

/// Glyph metrics queryable from rule bytecode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metric {
    Lsb = 0,
    Rsb,
    BbTop,
    BbBottom,
    BbLeft,
    BbRight,
    BbHeight,
    BbWidth,
    AdvWidth,
    AdvHeight,
    Ascent,
    Descent,
}

impl Metric {
    pub(crate) fn from_u8(v: u8) -> Option<Metric> {
        use Metric::*;
        Some(match v {
            0 => Lsb,
            1 => Rsb,
            2 => BbTop,
            3 => BbBottom,
            4 => BbLeft,
            5 => BbRight,
            6 => BbHeight,
            7 => BbWidth,
            8 => AdvWidth,
            9 => AdvHeight,
            10 => Ascent,
            11 => Descent,
            _ => return None,
        })
    }
}

/// Static data for one glyph
#[derive(Clone, Debug, Default)]
pub struct GlyphFace {
    bbox: Rect,
    advance: Position,
    /// Sorted `(attribute id, value)` pairs
    attrs: Box<[(u16, i16)]>,
}

impl GlyphFace {
    pub fn bbox(&self) -> &Rect {
        &self.bbox
    }

    pub fn advance(&self) -> Position {
        self.advance
    }

    /// Value of attribute `id`, zero if the font does not define it
    pub fn attr(&self, id: u16) -> i16 {
        match self.attrs.binary_search_by_key(&id, |a| a.0) {
            Ok(i) => self.attrs[i].1,
            Err(_) => 0,
        }
    }

    pub fn metric(&self, metric: Metric) -> i32 {
        let v = match metric {
            Metric::Lsb => self.bbox.bl.x,
            Metric::Rsb => self.advance.x - self.bbox.tr.x,
            Metric::BbTop => self.bbox.tr.y,
            Metric::BbBottom => self.bbox.bl.y,
            Metric::BbLeft => self.bbox.bl.x,
            Metric::BbRight => self.bbox.tr.x,
            Metric::BbHeight => self.bbox.tr.y - self.bbox.bl.y,
            Metric::BbWidth => self.bbox.tr.x - self.bbox.bl.x,
            Metric::AdvWidth => self.advance.x,
            Metric::AdvHeight => self.advance.y,
            // Face-wide metrics are answered by the caller.
            Metric::Ascent | Metric::Descent => 0.0,
        };
        v as i32
    }
}

/// All glyphs of a face, preloaded
#[derive(Debug, Default)]
pub struct GlyphCache {
    glyphs: Vec<GlyphFace>,
    num_attrs: u16,
}

impl GlyphCache {
    /// Build the cache from `Glat`/`Gloc` plus standard metrics
    ///
    /// `advance` and `bbox` supply per-glyph metrics from `hmtx` and `glyf`.
    pub(crate) fn read(
        num_glyphs: u16,
        gloc: &[u8],
        glat: &[u8],
        advance: impl Fn(u16) -> f32,
        bbox: impl Fn(u16) -> Rect,
    ) -> Result<GlyphCache, Error> {
        if num_glyphs == 0 {
            return Err(Error::NoGlyphs);
        }
        let mut r = ByteReader::new(GLOC, gloc);
        let version = r.read_u32()?;
        if version != 0x0001_0000 {
            return Err(Error::BadVersion {
                tag: GLOC,
                version,
            });
        }
        let flags = r.read_u16()?;
        let num_attrs = r.read_u16()?;
        let long_format = flags & 1 != 0;

        let mut offsets = Vec::with_capacity(usize::from(num_glyphs) + 1);
        for _ in 0..=num_glyphs {
            let off = if long_format {
                r.read_u32()? as usize
            } else {
                usize::from(r.read_u16()?)
            };
            if off > glat.len() {
                return Err(Error::Truncated {
                    tag: GLAT,
                    at: off,
                    need: 0,
                });
            }
            offsets.push(off);
        }

        let mut gr = ByteReader::new(GLAT, glat);
        let glat_version = gr.read_u32()?;
        if !(0x0001_0000..0x0003_0000).contains(&glat_version) {
            return Err(Error::BadVersion {
                tag: GLAT,
                version: glat_version,
            });
        }
        let wide_runs = glat_version >= 0x0002_0000;

        let mut glyphs = Vec::with_capacity(usize::from(num_glyphs));
        for gid in 0..num_glyphs {
            let (start, end) = (offsets[usize::from(gid)], offsets[usize::from(gid) + 1]);
            if start > end {
                return Err(Error::Truncated {
                    tag: GLAT,
                    at: start,
                    need: 0,
                });
            }
            let attrs = read_attr_runs(&mut gr, start, end, wide_runs, num_attrs)?;
            glyphs.push(GlyphFace {
                bbox: bbox(gid),
                advance: Position::new(advance(gid), 0.0),
                attrs,
            });
        }
        log::debug!(
            "Glat: {} glyphs with {} attribute slots",
            glyphs.len(),
            num_attrs
        );
        Ok(GlyphCache { glyphs, num_attrs })
    }

    pub fn num_glyphs(&self) -> u16 {
        self.glyphs.len() as u16
    }

    /// Number of attribute ids declared by the font, fixed at load
    pub fn num_attrs(&self) -> u16 {
        self.num_attrs
    }

    /// `None` for a glyph id outside `[0, num_glyphs)`
    pub fn glyph(&self, gid: u16) -> Option<&GlyphFace> {
        self.glyphs.get(usize::from(gid))
    }

    pub fn check(&self, gid: u16) -> bool {
        usize::from(gid) < self.glyphs.len()
    }

    /// Attribute lookup tolerating invalid glyph ids
    pub fn attr(&self, gid: u16, attr_id: u16) -> i16 {
        self.glyph(gid).map(|g| g.attr(attr_id)).unwrap_or(0)
    }
}

fn read_attr_runs(
    r: &mut ByteReader,
    start: usize,
    end: usize,
    wide: bool,
    num_attrs: u16,
) -> Result<Box<[(u16, i16)]>, Error> {
    let mut attrs = vec![];
    r.seek(start)?;
    while r.pos() < end {
        let (first, num) = if wide {
            (r.read_u16()?, r.read_u16()?)
        } else {
            (u16::from(r.read_u8()?), u16::from(r.read_u8()?))
        };
        for i in 0..num {
            let val = r.read_i16()?;
            let id = first + i;
            if id < num_attrs {
                attrs.push((id, val));
            }
        }
    }
    attrs.sort_unstable_by_key(|a| a.0);
    attrs.dedup_by_key(|a| a.0);
    Ok(attrs.into_boxed_slice())
}

#[cfg(test)]
mod test {
    use super::*;

    fn gloc(offsets: &[u16], num_attrs: u16) -> Vec<u8> {
        let mut out = vec![];
        out.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // short format
        out.extend_from_slice(&num_attrs.to_be_bytes());
        for off in offsets {
            out.extend_from_slice(&off.to_be_bytes());
        }
        out
    }

    #[test]
    fn sparse_attrs() {
        // Two glyphs: glyph 0 with attrs {2: 7, 3: -1}, glyph 1 with none.
        let mut glat = vec![];
        glat.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        glat.extend_from_slice(&[2, 2]); // first attr 2, two values
        glat.extend_from_slice(&7i16.to_be_bytes());
        glat.extend_from_slice(&(-1i16).to_be_bytes());
        let gloc = gloc(&[4, 10, 10], 8);

        let cache = GlyphCache::read(
            2,
            &gloc,
            &glat,
            |_| 100.0,
            |_| Rect::default(),
        )
        .unwrap();
        assert_eq!(cache.num_attrs(), 8);
        assert_eq!(cache.attr(0, 2), 7);
        assert_eq!(cache.attr(0, 3), -1);
        assert_eq!(cache.attr(0, 4), 0);
        assert_eq!(cache.attr(1, 2), 0);
        // out-of-range glyph reads as absent
        assert!(cache.glyph(2).is_none());
        assert_eq!(cache.attr(9, 2), 0);
    }

    #[test]
    fn metrics() {
        let g = GlyphFace {
            bbox: Rect::new(Position::new(10.0, -20.0), Position::new(90.0, 70.0)),
            advance: Position::new(100.0, 0.0),
            attrs: Box::default(),
        };
        assert_eq!(g.metric(Metric::Lsb), 10);
        assert_eq!(g.metric(Metric::Rsb), 10);
        assert_eq!(g.metric(Metric::BbHeight), 90);
        assert_eq!(g.metric(Metric::AdvWidth), 100);
    }
}
