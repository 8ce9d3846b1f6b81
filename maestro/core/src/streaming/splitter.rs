//! Thinking/Content Tag Splitter
//!
//! Incremental classifier for upstream text that interleaves reasoning
//! ("thinking") spans with normal output using inline `<think>` / `</think>`
//! markers. Fragments arrive with arbitrary boundaries, so a marker may be
//! split across two or more fragments.

/// Opening marker of a thinking span
pub const THINK_OPEN: &str = "<think>";
/// Closing marker of a thinking span
pub const THINK_CLOSE: &str = "</think>";

/// Which sub-stream a span of text belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    /// Out-of-band reasoning text
    Thinking,
    /// Normal output text
    Content,
}

/// A delimiter-resolved span of text
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// Sub-stream of this span
    pub kind: SegmentKind,
    /// The text (never empty)
    pub text: String,
}

impl Segment {
    fn new(kind: SegmentKind, text: String) -> Self {
        Self { kind, text }
    }
}

/// Stateful splitter over a stream of fragments
///
/// Single-use: one instance per generation. `pending` only ever holds a
/// possible prefix of the delimiter currently being searched for, so after
/// every [`feed`](Self::feed) it is strictly shorter than that delimiter.
#[derive(Debug)]
pub struct TagSplitter {
    open: String,
    close: String,
    in_thinking: bool,
    pending: String,
}

impl Default for TagSplitter {
    fn default() -> Self {
        Self::new(THINK_OPEN, THINK_CLOSE)
    }
}

impl TagSplitter {
    /// Create a splitter for a custom delimiter pair
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
            in_thinking: false,
            pending: String::new(),
        }
    }

    /// Whether the splitter is currently inside a thinking span
    #[must_use]
    pub fn in_thinking(&self) -> bool {
        self.in_thinking
    }

    /// Bytes held back because they may start a delimiter
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Consume one fragment and return every span that can be classified
    pub fn feed(&mut self, fragment: &str) -> Vec<Segment> {
        let mut out = Vec::new();
        self.pending.push_str(fragment);

        loop {
            let (delimiter, kind) = if self.in_thinking {
                (self.close.as_str(), SegmentKind::Thinking)
            } else {
                (self.open.as_str(), SegmentKind::Content)
            };

            if let Some(pos) = self.pending.find(delimiter) {
                let before: String = self.pending.drain(..pos).collect();
                self.pending.drain(..delimiter.len());
                if !before.is_empty() {
                    out.push(Segment::new(kind, before));
                }
                self.in_thinking = !self.in_thinking;
                continue;
            }

            let keep = partial_delimiter_len(&self.pending, delimiter);
            let ready = self.pending.len() - keep;
            if ready > 0 {
                let text: String = self.pending.drain(..ready).collect();
                out.push(Segment::new(kind, text));
            }
            break;
        }

        out
    }

    /// Emit whatever is still buffered under the current classification
    ///
    /// Called once at end of stream. An unclosed thinking span stays
    /// classified as thinking.
    pub fn flush(&mut self) -> Vec<Segment> {
        let kind = if self.in_thinking {
            SegmentKind::Thinking
        } else {
            SegmentKind::Content
        };
        let rest = std::mem::take(&mut self.pending);
        self.in_thinking = false;

        if rest.is_empty() {
            Vec::new()
        } else {
            vec![Segment::new(kind, rest)]
        }
    }
}

/// Length of the longest suffix of `buf` that is a strict prefix of `delimiter`
fn partial_delimiter_len(buf: &str, delimiter: &str) -> usize {
    let max = delimiter.len().saturating_sub(1).min(buf.len());
    (1..=max)
        .rev()
        .find(|&k| delimiter.is_char_boundary(k) && buf.ends_with(&delimiter[..k]))
        .unwrap_or(0)
}
