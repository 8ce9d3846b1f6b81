//! Streaming Infrastructure
//!
//! Upstream generators interleave two sub-streams in one text stream: reasoning
//! wrapped in `<think>` ... `</think>` and the actual output. This module turns
//! raw fragments into classified segments without losing or duplicating bytes,
//! however the fragments happen to be chunked.
//!
//! ```text
//!   "A<th"  "ink>B</think>C"
//!      │          │
//!      ▼          ▼
//!  ┌─────────────────────┐
//!  │     TagSplitter     │  pending: possible delimiter prefix
//!  └──────────┬──────────┘
//!             ▼
//!  Content("A") Thinking("B") Content("C")
//! ```

mod splitter;

pub use splitter::{Segment, SegmentKind, TagSplitter, THINK_CLOSE, THINK_OPEN};

// Re-export StreamingToken from backend for convenience
pub use crate::backend::StreamingToken;
