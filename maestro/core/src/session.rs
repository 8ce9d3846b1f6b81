//! Session State
//!
//! Per-connection composition state. A session remembers what was composed
//! so a later request can add to it instead of starting over.
//!
//! # Ownership
//!
//! The session is owned by the connection's [`Conductor`](crate::Conductor)
//! and mutated only from its control loop. A running execution never touches
//! it; its parsed result is applied once the execution has been joined.

use crate::catalog::CatalogKey;
use crate::notes::{self, NoteEvent, ParsedComposition};

/// How a compose request relates to the session's composition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositionMode {
    /// Replace the composition
    Fresh,
    /// Append to the composition
    Refine,
}

impl CompositionMode {
    /// Label for log fields
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Refine => "refine",
        }
    }
}

/// Composition state of one connection
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionSession {
    notes: Vec<NoteEvent>,
    original_prompt: Option<String>,
    catalog: Option<CatalogKey>,
}

impl ConnectionSession {
    /// Create an empty session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notes composed so far
    #[must_use]
    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    /// Prompt of the composition being refined
    #[must_use]
    pub fn original_prompt(&self) -> Option<&str> {
        self.original_prompt.as_deref()
    }

    /// Bank fixed for the composition, if any
    #[must_use]
    pub fn catalog(&self) -> Option<CatalogKey> {
        self.catalog
    }

    /// Whether a refine request can append to something
    #[must_use]
    pub fn can_refine(&self) -> bool {
        !self.notes.is_empty() && self.original_prompt.is_some()
    }

    /// End time of the composition in milliseconds
    #[must_use]
    pub fn end_time_ms(&self) -> u64 {
        notes::end_time_ms(&self.notes)
    }

    /// Start a new composition, dropping the previous one
    ///
    /// `catalog` is the pinned bank, or `None` to let the model choose.
    pub fn begin_fresh(&mut self, prompt: impl Into<String>, catalog: Option<CatalogKey>) {
        self.original_prompt = Some(prompt.into());
        self.notes.clear();
        self.catalog = catalog;
    }

    /// Apply the parsed output of a finished execution
    pub fn apply(&mut self, mode: CompositionMode, parsed: ParsedComposition) {
        match mode {
            CompositionMode::Fresh => self.notes = parsed.notes,
            CompositionMode::Refine => self.notes.extend(parsed.notes),
        }
        if self.catalog.is_none() {
            self.catalog = parsed.selected_catalog;
        }
    }

    /// Forget everything
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
