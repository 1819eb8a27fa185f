// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Feature catalogue (`Feat`) and per-language defaults (`Sill`)
//!
//! Each feature owns a bit-range inside a packed vector of 32-bit chunks
//! ([`FeatureVal`]). The `Feat` table declares the features; the `Sill`
//! table overrides their defaults per language, additionally injecting the
//! language tag itself as feature id 1.

use crate::bytes::ByteReader;
use crate::error::Error;
use smallvec::{smallvec, SmallVec};
use std::sync::atomic::{AtomicU64, Ordering};
use ttf_parser::Tag;

const FEAT: Tag = Tag::from_bytes(b"Feat");
const SILL: Tag = Tag::from_bytes(b"Sill");

/// Size of one feature record used for the header bounds check
const FEATURE_SIZE: usize = 16;
const FEATURE_SETTING_SIZE: usize = 4;

/// Bits per packed chunk
const CHUNK_BITS: u16 = 32;

static NEXT_MAP_ID: AtomicU64 = AtomicU64::new(1);

/// Smallest all-ones mask covering `val`
fn mask_over_val(mut val: u32) -> u32 {
    val |= val >> 1;
    val |= val >> 2;
    val |= val >> 4;
    val |= val >> 8;
    val |= val >> 16;
    val
}

/// One enumerated setting of a feature
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureSetting {
    value: i16,
    label: u16,
}

impl FeatureSetting {
    /// Name-table id of this setting's UI label
    pub fn label(&self) -> u16 {
        self.label
    }

    pub fn value(&self) -> i16 {
        self.value
    }
}

/// A packed vector of feature values
///
/// One bit-range per feature, allocated across 32-bit chunks by the
/// [`FeatureMap`] which created this value. Applying values through a
/// [`FeatureRef`] of a *different* map fails silently, as the bit layout
/// would not match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeatureVal {
    chunks: SmallVec<[u32; 2]>,
    /// Identity of the owning map; 0 until first bound
    map_id: u64,
}

impl FeatureVal {
    fn new(num_chunks: usize, map_id: u64) -> Self {
        FeatureVal {
            chunks: smallvec![0; num_chunks],
            map_id,
        }
    }
}

/// One feature: tag, UI name, and its bit-range in a [`FeatureVal`]
#[derive(Clone, Debug)]
pub struct FeatureRef {
    settings: Box<[FeatureSetting]>,
    mask: u32,
    max_val: u32,
    id: u32,
    name_id: u16,
    flags: u16,
    bits: u8,
    index: u8,
    map_id: u64,
}

impl FeatureRef {
    /// Allocate the next bit-range at `bits_offset`, never straddling a
    /// chunk boundary.
    fn new(
        bits_offset: &mut u16,
        max_val: u32,
        id: u32,
        name_id: u16,
        flags: u16,
        settings: Box<[FeatureSetting]>,
        map_id: u64,
    ) -> Self {
        let mask = mask_over_val(max_val);
        let need_bits = mask.count_ones() as u16;
        let index = (*bits_offset + need_bits) / CHUNK_BITS;
        if index > *bits_offset / CHUNK_BITS {
            *bits_offset = index * CHUNK_BITS;
        }
        let bits = (*bits_offset % CHUNK_BITS) as u8;
        *bits_offset += need_bits;
        FeatureRef {
            settings,
            mask: mask << bits,
            max_val,
            id,
            name_id,
            flags,
            bits,
            index: index as u8,
            map_id,
        }
    }

    /// The feature's 32-bit tag
    pub fn tag(&self) -> u32 {
        self.id
    }

    /// Name-table id of the feature's UI label
    pub fn name_id(&self) -> u16 {
        self.name_id
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Largest permitted value
    pub fn max_val(&self) -> u32 {
        self.max_val
    }

    pub fn num_settings(&self) -> u16 {
        self.settings.len() as u16
    }

    pub fn setting(&self, index: u16) -> Option<&FeatureSetting> {
        self.settings.get(index as usize)
    }

    /// Write `val` into this feature's bit-range of `dest`
    ///
    /// Fails (returning `false`) if `val` exceeds [`Self::max_val`] or if
    /// `dest` belongs to a different feature map.
    pub fn apply(&self, val: u32, dest: &mut FeatureVal) -> bool {
        if val > self.max_val {
            return false;
        }
        if dest.map_id == 0 {
            dest.map_id = self.map_id;
        } else if dest.map_id != self.map_id {
            return false;
        }
        let index = self.index as usize;
        if index >= dest.chunks.len() {
            dest.chunks.resize(index + 1, 0);
        }
        dest.chunks[index] &= !self.mask;
        dest.chunks[index] |= val << self.bits;
        true
    }

    /// Read this feature's value out of `feats`
    ///
    /// Returns 0 for a vector from a different map or one too short.
    pub fn value(&self, feats: &FeatureVal) -> u32 {
        let index = self.index as usize;
        if index < feats.chunks.len() && feats.map_id == self.map_id {
            (feats.chunks[index] & self.mask) >> self.bits
        } else {
            0
        }
    }
}

fn read_settings(
    r: &mut ByteReader,
    offset: usize,
    num: usize,
) -> Result<(Box<[FeatureSetting]>, u32), Error> {
    let mut settings = Vec::with_capacity(num);
    let mut max_val = 0u32;
    let mut sr = *r;
    sr.seek(offset)?;
    for _ in 0..num {
        let value = sr.read_i16()?;
        let label = sr.read_u16()?;
        max_val = max_val.max(value as u16 as u32);
        settings.push(FeatureSetting { value, label });
    }
    Ok((settings.into_boxed_slice(), max_val))
}

/// The face's feature catalogue, read from `Feat`
#[derive(Debug, Default)]
pub struct FeatureMap {
    feats: Vec<FeatureRef>,
    /// `(tag, index into feats)`, sorted by tag
    by_tag: Vec<(u32, u16)>,
    default_features: FeatureVal,
    map_id: u64,
}

impl FeatureMap {
    /// Parse the `Feat` table; an absent table yields an empty catalogue
    pub(crate) fn read(data: Option<&[u8]>) -> Result<FeatureMap, Error> {
        let map_id = NEXT_MAP_ID.fetch_add(1, Ordering::Relaxed);
        let mut map = FeatureMap {
            map_id,
            default_features: FeatureVal::new(1, map_id),
            ..Default::default()
        };
        let data = match data {
            Some(d) => d,
            None => return Ok(map),
        };

        let mut r = ByteReader::new(FEAT, data);
        let version = r.read_u32()?;
        let num_feats = r.read_u16()?;
        r.skip(2)?;
        r.skip(4)?;
        if num_feats == 0 {
            return Ok(map);
        }
        if version < 0x0001_0000 {
            return Err(Error::BadVersion { tag: FEAT, version });
        }
        if r.pos() + usize::from(num_feats) * FEATURE_SIZE > r.len() {
            return Err(Error::Truncated {
                tag: FEAT,
                at: r.pos(),
                need: usize::from(num_feats) * FEATURE_SIZE,
            });
        }

        let mut def_vals = Vec::with_capacity(usize::from(num_feats));
        let mut bits = 0u16;
        for i in 0..num_feats {
            let label = if version < 0x0002_0000 {
                u32::from(r.read_u16()?)
            } else {
                r.read_u32()?
            };
            let num_settings = r.read_u16()?;
            if version >= 0x0002_0000 {
                r.skip(2)?;
            }
            let settings_offset = r.read_u32()? as usize;
            let flags = r.read_u16()?;
            let ui_name = r.read_u16()?;

            if settings_offset > data.len()
                || settings_offset + usize::from(num_settings) * FEATURE_SETTING_SIZE > data.len()
            {
                return Err(Error::BadFeatureSettings { feat: i });
            }

            let (settings, max_val, default) = if num_settings != 0 {
                let (settings, max_val) =
                    read_settings(&mut r, settings_offset, usize::from(num_settings))?;
                let default = settings[0].value as u16 as u32;
                (settings, max_val, default)
            } else {
                (Box::default(), 0xffff_ffff, 0)
            };
            def_vals.push(default);
            map.feats.push(FeatureRef::new(
                &mut bits, max_val, label, ui_name, flags, settings, map_id,
            ));
        }

        let mut defaults = FeatureVal::new(usize::from(bits / CHUNK_BITS) + 1, map_id);
        for (fref, def) in map.feats.iter().zip(def_vals) {
            fref.apply(def, &mut defaults);
        }
        map.default_features = defaults;
        map.by_tag = map
            .feats
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id, i as u16))
            .collect();
        map.by_tag.sort_unstable();
        log::debug!("Feat: {} features loaded", map.feats.len());
        Ok(map)
    }

    pub fn num_feats(&self) -> u16 {
        self.feats.len() as u16
    }

    pub fn feature_ref(&self, index: u8) -> Option<&FeatureRef> {
        self.feats.get(usize::from(index))
    }

    /// Look a feature up by its 32-bit tag
    pub fn find_feature(&self, tag: u32) -> Option<&FeatureRef> {
        let i = self.by_tag.binary_search_by_key(&tag, |e| e.0).ok()?;
        self.feats.get(usize::from(self.by_tag[i].1))
    }

    /// The default value vector, with every feature at its declared default
    pub fn default_features(&self) -> &FeatureVal {
        &self.default_features
    }
}

/// Per-language feature overrides, read from `Sill`
#[derive(Debug, Default)]
pub struct Sill {
    /// `(lang tag, fully-populated value vector)` in table order
    langs: Vec<(u32, FeatureVal)>,
}

impl Sill {
    pub(crate) fn read(data: Option<&[u8]>, fmap: &FeatureMap) -> Result<Sill, Error> {
        let mut sill = Sill::default();
        let data = match data {
            Some(d) => d,
            None => return Ok(sill),
        };
        let mut r = ByteReader::new(SILL, data);
        let version = r.read_u32()?;
        if version != 0x0001_0000 {
            return Err(Error::BadVersion { tag: SILL, version });
        }
        let num_langs = r.read_u16()?;
        if fmap.num_feats() == 0 {
            return Ok(sill);
        }
        r.skip(6)?;

        for i in 0..num_langs {
            let langid = r.read_u32()?;
            let num_settings = r.read_u16()?;
            let offset = r.read_u16()? as usize;
            if num_settings > 0 && offset + 8 * usize::from(num_settings) > data.len() {
                return Err(Error::BadLangSettings { lang: i });
            }

            let mut feats = fmap.default_features().clone();
            let mut sr = r;
            sr.seek(offset)?;
            for _ in 0..num_settings {
                let name = sr.read_u32()?;
                let val = sr.read_u16()?;
                sr.skip(2)?;
                if let Some(fref) = fmap.find_feature(name) {
                    fref.apply(u32::from(val), &mut feats);
                }
            }
            // The language tag itself is always feature id 1.
            if let Some(fref) = fmap.find_feature(1) {
                fref.apply(langid, &mut feats);
            }
            sill.langs.push((langid, feats));
        }
        Ok(sill)
    }

    pub fn num_languages(&self) -> u16 {
        self.langs.len() as u16
    }

    pub fn lang_tag(&self, index: u16) -> Option<u32> {
        self.langs.get(usize::from(index)).map(|l| l.0)
    }

    /// A copy of the value vector for `lang`, or of the defaults
    ///
    /// `lang == 0` always selects the defaults.
    pub fn clone_features(&self, fmap: &FeatureMap, lang: u32) -> FeatureVal {
        if lang != 0 {
            for (l, feats) in &self.langs {
                if *l == lang {
                    return feats.clone();
                }
            }
        }
        fmap.default_features().clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Feat v2 with `n` features, each with two settings (values 0 and 1)
    fn feat_table(tags: &[u32]) -> Vec<u8> {
        let mut out = vec![];
        out.extend_from_slice(&0x0002_0000u32.to_be_bytes());
        out.extend_from_slice(&(tags.len() as u16).to_be_bytes());
        out.extend_from_slice(&[0; 6]);
        let settings_base = 12 + tags.len() * 16;
        for (i, tag) in tags.iter().enumerate() {
            out.extend_from_slice(&tag.to_be_bytes());
            out.extend_from_slice(&2u16.to_be_bytes()); // numSettings
            out.extend_from_slice(&0u16.to_be_bytes());
            out.extend_from_slice(&((settings_base + i * 8) as u32).to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes()); // flags
            out.extend_from_slice(&(0x100 + i as u16).to_be_bytes()); // uiName
        }
        for _ in tags {
            for (value, label) in [(0i16, 10u16), (1, 11)] {
                out.extend_from_slice(&value.to_be_bytes());
                out.extend_from_slice(&label.to_be_bytes());
            }
        }
        out
    }

    #[test]
    fn feature_enumeration() {
        let kdot = u32::from_be_bytes(*b"kdot");
        let wtri = u32::from_be_bytes(*b"wtri");
        let map = FeatureMap::read(Some(&feat_table(&[kdot, wtri]))).unwrap();
        assert_eq!(map.num_feats(), 2);
        for tag in [kdot, wtri] {
            let fref = map.find_feature(tag).unwrap();
            assert_eq!(fref.max_val(), 1);
            assert_eq!(fref.value(map.default_features()), 0);
        }
    }

    #[test]
    fn bit_offsets_are_monotonic() {
        let tags: Vec<u32> = (1..=40).collect();
        let map = FeatureMap::read(Some(&feat_table(&tags))).unwrap();
        let mut last = (0u8, 0u8);
        for i in 0..map.num_feats() {
            let f = map.feature_ref(i as u8).unwrap();
            assert!((f.index, f.bits) >= last, "offsets must not decrease");
            last = (f.index, f.bits);
        }
        // 40 single-bit features span two chunks
        assert!(map.default_features().chunks.len() >= 2);
    }

    #[test]
    fn apply_and_read_back() {
        let map = FeatureMap::read(Some(&feat_table(&[100, 200]))).unwrap();
        let mut val = map.default_features().clone();
        let f = map.find_feature(200).unwrap();
        assert!(f.apply(1, &mut val));
        assert_eq!(f.value(&val), 1);
        // over max is rejected
        assert!(!f.apply(2, &mut val));
        assert_eq!(f.value(&val), 1);
    }

    #[test]
    fn foreign_map_is_rejected() {
        let a = FeatureMap::read(Some(&feat_table(&[100]))).unwrap();
        let b = FeatureMap::read(Some(&feat_table(&[100]))).unwrap();
        let mut val = a.default_features().clone();
        assert!(!b.find_feature(100).unwrap().apply(1, &mut val));
    }

    #[test]
    fn sill_injects_language_tag() {
        // Feature tag 1 is the language feature; give it a wide range.
        let mut feat = vec![];
        feat.extend_from_slice(&0x0002_0000u32.to_be_bytes());
        feat.extend_from_slice(&1u16.to_be_bytes());
        feat.extend_from_slice(&[0; 6]);
        feat.extend_from_slice(&1u32.to_be_bytes()); // tag 1
        feat.extend_from_slice(&0u16.to_be_bytes()); // no settings: maxVal = u32::MAX
        feat.extend_from_slice(&0u16.to_be_bytes());
        feat.extend_from_slice(&0u32.to_be_bytes());
        feat.extend_from_slice(&0u16.to_be_bytes());
        feat.extend_from_slice(&0u16.to_be_bytes());
        let map = FeatureMap::read(Some(&feat)).unwrap();

        let lang = u32::from_be_bytes(*b"MYR ");
        let mut sill = vec![];
        sill.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        sill.extend_from_slice(&1u16.to_be_bytes());
        sill.extend_from_slice(&[0; 6]);
        sill.extend_from_slice(&lang.to_be_bytes());
        sill.extend_from_slice(&0u16.to_be_bytes()); // no settings
        sill.extend_from_slice(&0u16.to_be_bytes());
        let sill = Sill::read(Some(&sill), &map).unwrap();

        let feats = sill.clone_features(&map, lang);
        assert_eq!(map.find_feature(1).unwrap().value(&feats), lang);
        // Unknown language falls back to the defaults.
        let feats = sill.clone_features(&map, 0xDEAD_BEEF);
        assert_eq!(map.find_feature(1).unwrap().value(&feats), 0);
    }
}
