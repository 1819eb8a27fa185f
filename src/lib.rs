// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Shaping engine for Graphite (`Silf`) smart fonts
//!
//! Graphite fonts carry their shaping logic as data: finite-state machines
//! selecting rules, rule constraint and action programs in a stack-machine
//! bytecode, collision-avoidance parameters, and justification tables. This
//! crate loads those tables from a font and runs them, turning a sequence
//! of Unicode codepoints into a positioned sequence of glyphs.
//!
//! ```no_run
//! use graphite_shaper::{Face, ShapeOptions};
//!
//! # fn demo(data: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let raw = ttf_parser::RawFace::parse(data, 0)?;
//! let face = Face::new(&raw)?;
//! let seg = face.shape(None, "text to shape", &ShapeOptions::default())?;
//! for slot in seg.iter_slots() {
//!     println!("glyph {} at {:?}", slot.glyph(), slot.origin());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! One segment covers one run of text in one script and direction; script
//! itemization, line breaking and paragraph-level bidi are the caller's
//! concern.

mod bytes;
mod collision;
mod context;
mod conv;
mod data;
mod error;
mod face;
mod justify;
mod pass;
mod segment;
mod silf;
mod text;
mod vm;

pub use collision::{CollisionFlags, SlotCollision};
pub use data::{Direction, GlyphId, Position, Rect};
pub use error::{CodeRegion, Error};
pub use face::features::{FeatureMap, FeatureRef, FeatureSetting, FeatureVal, Sill};
pub use face::glyphs::{GlyphCache, GlyphFace, Metric};
pub use face::{Face, Font, ShapeOptions, TableProvider};
pub use justify::JustFlags;
pub use segment::{CharInfo, Segment, Slot, SlotBuffer};
pub use silf::Silf;
pub use text::TextSource;
pub use vm::{CodeStatus, MachineStatus};
