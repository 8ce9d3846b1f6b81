//! Re-inlining of provider-native reasoning deltas
//!
//! Some providers report reasoning in a separate field instead of inline
//! `<think>` markers. Wrapping it back into markers keeps a single splitting
//! path for every provider.

use crate::streaming::{THINK_CLOSE, THINK_OPEN};

/// Tracks whether a synthesized `<think>` span is open
#[derive(Debug, Default)]
pub struct InlineReasoning {
    open: bool,
}

impl InlineReasoning {
    /// Create a new tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one delta into a single inline fragment
    pub fn merge(&mut self, reasoning: Option<&str>, content: Option<&str>) -> String {
        let mut out = String::new();

        if let Some(reasoning) = reasoning.filter(|r| !r.is_empty()) {
            if !self.open {
                out.push_str(THINK_OPEN);
                self.open = true;
            }
            out.push_str(reasoning);
        }

        if let Some(content) = content.filter(|c| !c.is_empty()) {
            if self.open {
                out.push_str(THINK_CLOSE);
                self.open = false;
            }
            out.push_str(content);
        }

        out
    }

    /// Close a dangling span at end of stream
    pub fn finish(&mut self) -> Option<&'static str> {
        if self.open {
            self.open = false;
            Some(THINK_CLOSE)
        } else {
            None
        }
    }
}
