use tracing::debug;

/// Incremental NDJSON line splitter.
///
/// Bytes are pushed as they arrive from the transport; only complete lines
/// are returned. A partial trailing line stays buffered until the next chunk
/// or until `finish` is called at end of stream.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    /// Appends a chunk and returns every line it completes, in order.
    ///
    /// Line terminators (`\n` or `\r\n`) are stripped and blank lines skipped.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(line) = decode_line(&self.buf[start..end]) {
                lines.push(line);
            }
            start = end + 1;
        }
        self.buf.drain(..start);
        lines
    }

    /// Flushes an unterminated final line, if any.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        decode_line(&rest)
    }

    /// Number of buffered bytes not yet forming a complete line.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

/// Lines that are not valid UTF-8 are dropped.
fn decode_line(bytes: &[u8]) -> Option<String> {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            debug!(error = %e, len = bytes.len(), "skipping NDJSON line with invalid UTF-8");
            return None;
        }
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_partial_chunk_boundaries() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push_chunk(b"{\"event\":\"stream_").is_empty());
        assert_eq!(decoder.pending_len(), 17);
        let lines = decoder.push_chunk(b"open\"}\n{\"event\":");
        assert_eq!(lines, vec!["{\"event\":\"stream_open\"}".to_string()]);
        let lines = decoder.push_chunk(b"\"complete\"}\n");
        assert_eq!(lines, vec!["{\"event\":\"complete\"}".to_string()]);
        assert_eq!(decoder.pending_len(), 0);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn splits_many_lines_in_one_chunk_and_skips_blanks() {
        let mut decoder = LineDecoder::default();
        let lines = decoder.push_chunk(b"a\r\n\n  \nb\nc");
        assert_eq!(lines, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(decoder.finish(), Some("c".to_string()));
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn multibyte_text_split_across_chunks_survives() {
        let text = "{\"message\":\"검증 실패\"}\n".as_bytes();
        let (head, tail) = text.split_at(14);
        let mut decoder = LineDecoder::default();
        assert!(decoder.push_chunk(head).is_empty());
        let lines = decoder.push_chunk(tail);
        assert_eq!(lines, vec!["{\"message\":\"검증 실패\"}".to_string()]);
    }

    #[test]
    fn invalid_utf8_line_is_dropped_not_repaired() {
        let mut decoder = LineDecoder::default();
        let lines = decoder.push_chunk(b"{\"stage\":\"stage03_\xff\"}\nok\n{\"x\":\"\xfe");
        assert_eq!(lines, vec!["ok".to_string()]);
        assert_eq!(decoder.finish(), None);
    }
}
