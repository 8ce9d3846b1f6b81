//! Instrument Catalog
//!
//! Fixed instrument banks a composition can be written against. Each bank
//! has exactly eight instruments, addressed by the `i` field of a note event.
//!
//! A request may pin a bank or leave the choice to the model ("auto"). The
//! lookup never fails: [`resolve`] substitutes [`CatalogKey::DEFAULT`] for a
//! missing selection.

use serde::{Deserialize, Serialize};

/// Number of instruments in every bank
pub const INSTRUMENTS_PER_BANK: usize = 8;

/// Identifier of an instrument bank
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKey {
    /// Modern synthesizers
    Electronic,
    /// Piano-centred acoustic set
    Acoustic,
    /// Cinematic orchestra
    Orchestral,
    /// Chiptune
    Retro,
}

impl CatalogKey {
    /// Bank used when nothing was selected
    pub const DEFAULT: Self = Self::Electronic;

    /// Every bank, in listing order
    pub const ALL: [Self; 4] = [
        Self::Electronic,
        Self::Acoustic,
        Self::Orchestral,
        Self::Retro,
    ];

    /// Parse a client- or model-supplied key
    ///
    /// Case and surrounding whitespace are ignored. `"auto"`, the empty string
    /// and unknown names all mean "no selection".
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "electronic" => Some(Self::Electronic),
            "acoustic" => Some(Self::Acoustic),
            "orchestral" => Some(Self::Orchestral),
            "retro" => Some(Self::Retro),
            _ => None,
        }
    }

    /// Wire name of the key
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Electronic => "electronic",
            Self::Acoustic => "acoustic",
            Self::Orchestral => "orchestral",
            Self::Retro => "retro",
        }
    }

    /// The bank this key names
    #[must_use]
    pub fn bank(self) -> &'static InstrumentBank {
        match self {
            Self::Electronic => &ELECTRONIC,
            Self::Acoustic => &ACOUSTIC,
            Self::Orchestral => &ORCHESTRAL,
            Self::Retro => &RETRO,
        }
    }
}

impl std::fmt::Display for CatalogKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One playable instrument
#[derive(Debug, PartialEq, Eq)]
pub struct Instrument {
    /// Short identifier, e.g. `synth_bass`
    pub name: &'static str,
    /// Recommended MIDI pitch range, inclusive
    pub range: (u8, u8),
    /// Human description
    pub description: &'static str,
}

/// A named set of eight instruments
#[derive(Debug, PartialEq, Eq)]
pub struct InstrumentBank {
    /// Key of this bank
    pub key: CatalogKey,
    /// Display name
    pub name: &'static str,
    /// Style description
    pub description: &'static str,
    /// Instruments, indexed by note `i`
    pub instruments: [Instrument; INSTRUMENTS_PER_BANK],
}

impl InstrumentBank {
    /// Whether `id` addresses an instrument of this bank
    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        usize::try_from(id).is_ok_and(|id| id < self.instruments.len())
    }

    /// Full instrument list, one `- <id>: <name> (range lo-hi) - <desc>` per line
    #[must_use]
    pub fn instrument_list(&self) -> String {
        self.instruments
            .iter()
            .enumerate()
            .map(|(id, inst)| {
                format!(
                    "- {id}: {} (range {}-{}) - {}",
                    inst.name, inst.range.0, inst.range.1, inst.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Compact `0=name, 1=name, ...` form
    #[must_use]
    pub fn instrument_summary(&self) -> String {
        self.instruments
            .iter()
            .enumerate()
            .map(|(id, inst)| format!("{id}={}", inst.name))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

const fn inst(name: &'static str, lo: u8, hi: u8, description: &'static str) -> Instrument {
    Instrument {
        name,
        range: (lo, hi),
        description,
    }
}

static ELECTRONIC: InstrumentBank = InstrumentBank {
    key: CatalogKey::Electronic,
    name: "Electronic",
    description: "Modern synthesizers and electronic sounds",
    instruments: [
        inst("saw_lead", 48, 96, "cutting sawtooth lead synth"),
        inst("synth_bass", 24, 60, "punchy electronic bass"),
        inst("synth_strings", 48, 84, "lush synthetic string pad"),
        inst("square_lead", 60, 96, "retro square wave melody"),
        inst("polysynth", 48, 84, "warm polyphonic synth pad"),
        inst("dist_guitar", 48, 84, "distorted power guitar"),
        inst("rock_organ", 36, 84, "gritty rock organ"),
        inst("drums", 36, 72, "electronic drum kit"),
    ],
};

static ACOUSTIC: InstrumentBank = InstrumentBank {
    key: CatalogKey::Acoustic,
    name: "Acoustic/Piano",
    description: "Natural acoustic instruments centered around piano",
    instruments: [
        inst("grand_piano", 21, 108, "concert grand piano"),
        inst("acoustic_bass", 24, 60, "upright acoustic bass"),
        inst("strings", 48, 84, "orchestral string ensemble"),
        inst("flute", 60, 96, "concert flute melody"),
        inst("choir", 48, 84, "vocal choir pad"),
        inst("acoustic_guitar", 40, 84, "nylon string guitar"),
        inst("vibraphone", 53, 89, "jazz vibraphone"),
        inst("drums", 36, 72, "acoustic drum kit"),
    ],
};

static ORCHESTRAL: InstrumentBank = InstrumentBank {
    key: CatalogKey::Orchestral,
    name: "Orchestral/Cinematic",
    description: "Epic orchestral instruments for cinematic compositions",
    instruments: [
        inst("piano", 21, 108, "grand piano"),
        inst("contrabass", 24, 60, "orchestral contrabass"),
        inst("strings", 36, 96, "full string orchestra"),
        inst("brass", 36, 84, "brass section"),
        inst("choir", 48, 84, "epic choir"),
        inst("harp", 24, 103, "concert harp"),
        inst("woodwinds", 48, 96, "woodwind ensemble"),
        inst("timpani", 36, 72, "orchestral percussion"),
    ],
};

static RETRO: InstrumentBank = InstrumentBank {
    key: CatalogKey::Retro,
    name: "Retro/8-bit",
    description: "Chiptune and retro video game sounds",
    instruments: [
        inst("pulse_lead", 36, 96, "classic pulse wave lead"),
        inst("triangle_bass", 24, 60, "triangle wave bass"),
        inst("noise_pad", 48, 84, "filtered noise texture"),
        inst("square_lead", 60, 96, "bright square melody"),
        inst("arp_synth", 48, 84, "arpeggio synth"),
        inst("chip_pluck", 48, 84, "short chip pluck"),
        inst("fm_bells", 48, 96, "FM synthesis bells"),
        inst("drums", 36, 72, "8-bit drum samples"),
    ],
};

/// Resolve an optional selection to a bank, substituting the default
#[must_use]
pub fn resolve(key: Option<CatalogKey>) -> &'static InstrumentBank {
    key.unwrap_or(CatalogKey::DEFAULT).bank()
}

/// One row of the bank listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    /// Key, or `"auto"`
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Description
    pub desc: &'static str,
}

/// Bank listing with the default key
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CatalogListing {
    /// `auto` first, then every bank
    pub banks: Vec<CatalogEntry>,
    /// Key used when nothing is selected
    pub default: CatalogKey,
}

/// Every selectable bank, led by the `auto` pseudo-entry
#[must_use]
pub fn listing() -> CatalogListing {
    let mut banks = vec![CatalogEntry {
        id: "auto",
        name: "Auto (LLM picks)",
        desc: "Let the AI choose the best bank for your prompt",
    }];
    banks.extend(CatalogKey::ALL.iter().map(|key| {
        let bank = key.bank();
        CatalogEntry {
            id: key.as_str(),
            name: bank.name,
            desc: bank.description,
        }
    }));

    CatalogListing {
        banks,
        default: CatalogKey::DEFAULT,
    }
}
