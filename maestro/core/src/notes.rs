//! Structural content parsing
//!
//! The generated content is expected to be one JSON record per line. Two
//! shapes are recognized:
//!
//! - a *selection* record, `{"bank": "<key>"}`, naming the instrument bank
//! - a *note* record, `{"t": .., "n": .., "v": .., "d": .., "i": ..}`
//!
//! Anything else is skipped without complaint; a generative source is noisy
//! and a stray prose line must not cost the notes around it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::{self, CatalogKey};

/// Instrument used when a note omits `i` or names one outside the bank
pub const DEFAULT_INSTRUMENT: u8 = 0;

/// One note of a composition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Start time in milliseconds
    pub t: u64,
    /// MIDI note number
    pub n: u32,
    /// Velocity
    pub v: u32,
    /// Duration in milliseconds
    pub d: u64,
    /// Instrument index within the bank
    pub i: u8,
}

impl NoteEvent {
    /// Time at which the note stops sounding
    #[must_use]
    pub fn end_ms(&self) -> u64 {
        self.t.saturating_add(self.d)
    }
}

/// Result of parsing one execution's accumulated content
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedComposition {
    /// Valid note records, in input order
    pub notes: Vec<NoteEvent>,
    /// First valid selection record, if one was considered
    pub selected_catalog: Option<CatalogKey>,
}

/// Parse accumulated content into notes and an optional bank selection
///
/// `pinned` is the bank already fixed for the session. When it is set,
/// selection records are ignored; otherwise the first valid one is taken and
/// used to validate the notes that follow it.
#[must_use]
pub fn parse_composition(content: &str, pinned: Option<CatalogKey>) -> ParsedComposition {
    let mut parsed = ParsedComposition::default();
    let mut bank = catalog::resolve(pinned);

    for line in content.lines() {
        let line = line.trim();
        if !(line.starts_with('{') && line.ends_with('}')) {
            continue;
        }
        let Ok(Value::Object(record)) = serde_json::from_str::<Value>(line) else {
            continue;
        };

        if let Some(selection) = record.get("bank") {
            if pinned.is_none() && parsed.selected_catalog.is_none() {
                if let Some(key) = selection.as_str().and_then(CatalogKey::parse) {
                    parsed.selected_catalog = Some(key);
                    bank = key.bank();
                }
            }
            continue;
        }

        if let Some(note) = note_from_record(&record, |i| bank.contains(i)) {
            parsed.notes.push(note);
        }
    }

    parsed
}

/// Build a note from a decoded record; `None` unless t, n, v and d are usable
fn note_from_record(record: &Map<String, Value>, valid_instrument: impl Fn(u64) -> bool) -> Option<NoteEvent> {
    let field = |name: &str| record.get(name).and_then(as_count);

    let t = field("t")?;
    let n = u32::try_from(field("n")?).ok()?;
    let v = u32::try_from(field("v")?).ok()?;
    let d = field("d")?;

    let i = field("i")
        .filter(|&i| valid_instrument(i))
        .and_then(|i| u8::try_from(i).ok())
        .unwrap_or(DEFAULT_INSTRUMENT);

    Some(NoteEvent { t, n, v, d, i })
}

/// Non-negative integer, accepting integral floats such as `500.0`
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn as_count(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    // Saturating cast; fractional milliseconds are dropped
    (f.is_finite() && f >= 0.0).then(|| f as u64)
}

/// End of the last sounding note, 0 for an empty sequence
#[must_use]
pub fn end_time_ms(notes: &[NoteEvent]) -> u64 {
    notes.iter().map(NoteEvent::end_ms).max().unwrap_or(0)
}
