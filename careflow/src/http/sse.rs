//! Line framing for `text/event-stream` response bodies.

/// Payload of one `data:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseData {
    /// A JSON payload.
    Data(String),
    /// The `[DONE]` terminator.
    Done,
}

/// Splits a chunked byte stream into SSE `data:` payloads.
///
/// Chunks may end mid-line or mid-character; incomplete lines are kept
/// until the next push.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    /// Appends a chunk and returns the payloads of every completed line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseData> {
        self.pending.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            if let Some(data) = parse_line(&String::from_utf8_lossy(&line)) {
                out.push(data);
            }
        }
        out
    }

    /// Returns true if a partial line is buffered.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Flushes a final line that arrived without a trailing newline.
    pub fn finish(&mut self) -> Option<SseData> {
        let line = std::mem::take(&mut self.pending);
        parse_line(&String::from_utf8_lossy(&line))
    }
}

/// Parses a single line. Comments, blank lines and non-data fields yield `None`.
pub fn parse_line(line: &str) -> Option<SseData> {
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?.trim_start();

    match data {
        "" => None,
        "[DONE]" => Some(SseData::Done),
        payload => Some(SseData::Data(payload.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("data: {\"a\":1}\n"), Some(SseData::Data("{\"a\":1}".into())));
        assert_eq!(parse_line("data:[DONE]\r\n"), Some(SseData::Done));
        assert_eq!(parse_line(": keep-alive"), None);
        assert_eq!(parse_line("event: message"), None);
        assert_eq!(parse_line("data: "), None);
        assert_eq!(parse_line(""), None);
    }

    #[test]
    fn test_buffer_joins_split_lines() {
        let mut buffer = SseLineBuffer::default();

        assert!(buffer.push(b"data: {\"x\"").is_empty());
        assert!(buffer.has_pending());

        let out = buffer.push(b":1}\n\ndata: [DONE]\n");
        assert_eq!(out, vec![SseData::Data("{\"x\":1}".into()), SseData::Done]);
        assert!(!buffer.has_pending());
    }

    #[test]
    fn test_buffer_keeps_multibyte_characters_intact() {
        let line = "data: café\n".as_bytes();
        let split = line.len() - 2;
        let mut buffer = SseLineBuffer::default();

        assert!(buffer.push(&line[..split]).is_empty());
        assert_eq!(buffer.push(&line[split..]), vec![SseData::Data("café".into())]);
    }

    #[test]
    fn test_finish_flushes_unterminated_last_line() {
        let mut buffer = SseLineBuffer::default();

        assert_eq!(
            buffer.push(b"data: {\"a\":1}\ndata: {\"b\":2}"),
            vec![SseData::Data("{\"a\":1}".into())]
        );
        assert_eq!(buffer.finish(), Some(SseData::Data("{\"b\":2}".into())));
        assert!(!buffer.has_pending());
        assert_eq!(buffer.finish(), None);
    }
}
