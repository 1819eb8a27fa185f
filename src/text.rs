// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Input text in any of the three Unicode encoding forms
//!
//! Decoding is self-recovering: malformed sequences yield U+FFFD and
//! decoding continues at the next code unit, so a segment always covers the
//! whole input.

const REPLACEMENT: u32 = 0xFFFD;

/// A run of text to shape
#[derive(Clone, Copy, Debug)]
pub enum TextSource<'a> {
    Utf8(&'a str),
    Utf16(&'a [u16]),
    Utf32(&'a [u32]),
}

impl<'a> From<&'a str> for TextSource<'a> {
    fn from(text: &'a str) -> Self {
        TextSource::Utf8(text)
    }
}

impl<'a> TextSource<'a> {
    /// Number of characters after decoding
    pub fn char_count(&self) -> usize {
        match self {
            TextSource::Utf8(s) => s.chars().count(),
            TextSource::Utf16(units) => char::decode_utf16(units.iter().copied()).count(),
            TextSource::Utf32(units) => units.len(),
        }
    }

    /// `(code unit offset, scalar value)` pairs
    pub(crate) fn decode(&self) -> Vec<(usize, u32)> {
        match self {
            TextSource::Utf8(s) => s.char_indices().map(|(i, c)| (i, c as u32)).collect(),
            TextSource::Utf16(units) => {
                let mut out = Vec::with_capacity(units.len());
                let mut offset = 0;
                for r in char::decode_utf16(units.iter().copied()) {
                    match r {
                        Ok(c) => {
                            out.push((offset, c as u32));
                            offset += c.len_utf16();
                        }
                        Err(_) => {
                            out.push((offset, REPLACEMENT));
                            offset += 1;
                        }
                    }
                }
                out
            }
            TextSource::Utf32(units) => units
                .iter()
                .enumerate()
                .map(|(i, &u)| (i, if char::from_u32(u).is_some() { u } else { REPLACEMENT }))
                .collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn utf16_surrogate_recovery() {
        // lone high surrogate between two BMP chars
        let units = [0x0041u16, 0xD800, 0x0042];
        let decoded = TextSource::Utf16(&units).decode();
        assert_eq!(decoded, vec![(0, 0x41), (1, REPLACEMENT), (2, 0x42)]);
    }

    #[test]
    fn utf8_offsets_are_bytes() {
        let decoded = TextSource::Utf8("a\u{0915}b").decode();
        assert_eq!(decoded, vec![(0, 0x61), (1, 0x0915), (4, 0x62)]);
    }
}
