//! Line framing for streamed response bodies

/// Accumulates body bytes and yields complete lines
///
/// Splits on bytes so multi-byte characters spanning chunks are decoded whole.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a body chunk
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete line, trimmed
    ///
    /// Once the body has ended (`at_end`), an unterminated remainder counts
    /// as a final line.
    pub(crate) fn next_line(&mut self, at_end: bool) -> Option<String> {
        let line: Vec<u8> = match self.buf.iter().position(|&b| b == b'\n') {
            Some(pos) => self.buf.drain(..=pos).collect(),
            None if at_end && !self.buf.is_empty() => std::mem::take(&mut self.buf),
            None => return None,
        };
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_across_chunks() {
        let mut lines = LineBuffer::new();
        lines.push(b"{\"a\":");
        assert_eq!(lines.next_line(false), None);
        lines.push(b"1}\r\n{\"b\"");
        assert_eq!(lines.next_line(false).as_deref(), Some("{\"a\":1}"));
        assert_eq!(lines.next_line(false), None);
    }

    #[test]
    fn test_multibyte_split_between_chunks() {
        let mut lines = LineBuffer::new();
        let text = "♪ note\n".as_bytes();
        lines.push(&text[..2]);
        lines.push(&text[2..]);
        assert_eq!(lines.next_line(false).as_deref(), Some("♪ note"));
    }

    #[test]
    fn test_unterminated_tail_released_at_end() {
        let mut lines = LineBuffer::new();
        lines.push(b"data: x\ndata: [DONE]");
        assert_eq!(lines.next_line(false).as_deref(), Some("data: x"));
        assert_eq!(lines.next_line(false), None);
        assert_eq!(lines.next_line(true).as_deref(), Some("data: [DONE]"));
        assert_eq!(lines.next_line(true), None);
    }
}
