//! Incremental codecs for the streaming paths: an SSE parser, a
//! framing-autodetecting upstream decoder, and the frame writers used on the
//! client-facing side.

use bytes::Bytes;
use serde::Serialize;

/// One parsed server-sent event: the optional `event:` name and the joined
/// `data:` payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE parser. Feed arbitrary byte chunks; complete events come
/// out as blank lines are seen. Only the trailing unterminated line is
/// buffered between pushes; multi-line `data:` fields join with `\n` as they
/// arrive.
#[derive(Debug, Default)]
pub struct SseParser {
    partial: String,
    event: Option<String>,
    data: String,
    has_data: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        match std::str::from_utf8(chunk) {
            Ok(text) => self.push_str(text),
            Err(_) => Vec::new(),
        }
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<SseEvent> {
        let mut events = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.find('\n') {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];
            if self.partial.is_empty() {
                self.consume_line(trim_cr(head), &mut events);
            } else {
                self.partial.push_str(head);
                let line = std::mem::take(&mut self.partial);
                self.consume_line(trim_cr(&line), &mut events);
            }
        }
        self.partial.push_str(rest);

        events
    }

    /// Drain whatever is buffered at end of stream.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.consume_line(trim_cr(&line), &mut events);
        }
        self.flush_event(&mut events);
        events
    }

    fn consume_line(&mut self, line: &str, events: &mut Vec<SseEvent>) {
        if line.is_empty() {
            self.flush_event(events);
            return;
        }

        // Per the SSE grammar a line is `field[: value]`; lines without a
        // colon are a bare field name, and an empty field name (a leading
        // colon) marks a comment.
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = (!value.is_empty()).then(|| value.to_string()),
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            _ => {}
        }
    }

    fn flush_event(&mut self, events: &mut Vec<SseEvent>) {
        if self.event.is_none() && !self.has_data {
            return;
        }
        events.push(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data),
        });
        self.has_data = false;
    }
}

fn trim_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

/// Upstream stream decoder. The first non-whitespace byte picks one of two
/// framings: SSE, or bare JSON — where a balanced-object scanner yields each
/// top-level object and treats array brackets, commas, and newlines as
/// inter-element noise. That one mode covers NDJSON, the JSON-array replies
/// Gemini sends when a proxy strips `alt=sse`, and pretty-printed bodies.
/// Output is the raw JSON payload of each event.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    mode: Option<DecoderMode>,
    sse: SseParser,
    scanner: JsonScanner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderMode {
    Sse,
    Json,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &Bytes) -> Vec<String> {
        let Ok(text) = std::str::from_utf8(chunk) else {
            return Vec::new();
        };

        let text = match self.mode {
            Some(_) => text,
            None => {
                // Undecided until the first non-whitespace byte arrives.
                let trimmed = text.trim_start();
                let Some(first) = trimmed.chars().next() else {
                    return Vec::new();
                };
                self.mode = Some(match first {
                    '[' | '{' => DecoderMode::Json,
                    _ => DecoderMode::Sse,
                });
                trimmed
            }
        };

        match self.mode {
            Some(DecoderMode::Sse) => data_payloads(self.sse.push_str(text)),
            Some(DecoderMode::Json) => self.scanner.push(text),
            None => Vec::new(),
        }
    }

    pub fn finish(&mut self) -> Vec<String> {
        match self.mode {
            // The scanner emits each object at its closing brace; anything
            // left at EOF is an incomplete element and is dropped.
            Some(DecoderMode::Sse) => data_payloads(self.sse.finish()),
            Some(DecoderMode::Json) | None => Vec::new(),
        }
    }
}

fn data_payloads(events: Vec<SseEvent>) -> Vec<String> {
    events
        .into_iter()
        .filter(|event| !event.data.is_empty())
        .map(|event| event.data)
        .collect()
}

/// Streams out every balanced top-level `{…}` in the input, tracking string
/// and escape state so braces inside literals don't count.
#[derive(Debug, Default)]
struct JsonScanner {
    element: String,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl JsonScanner {
    fn push(&mut self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        for ch in text.chars() {
            if self.depth == 0 {
                if ch == '{' {
                    self.element.push(ch);
                    self.depth = 1;
                }
                continue;
            }

            self.element.push(ch);
            if self.in_string {
                match ch {
                    '\\' if !self.escaped => self.escaped = true,
                    '"' if !self.escaped => self.in_string = false,
                    _ => self.escaped = false,
                }
                continue;
            }
            match ch {
                '"' => self.in_string = true,
                '{' => self.depth += 1,
                '}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        out.push(std::mem::take(&mut self.element));
                    }
                }
                _ => {}
            }
        }
        out
    }
}

/// `data: <json>\n\n` frame.
pub fn data_frame<T: Serialize>(value: &T) -> Option<Bytes> {
    let payload = serde_json::to_vec(value).ok()?;
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend_from_slice(b"data: ");
    out.extend_from_slice(&payload);
    out.extend_from_slice(b"\n\n");
    Some(Bytes::from(out))
}

/// `event: <name>\ndata: <json>\n\n` frame.
pub fn named_frame<T: Serialize>(name: &str, value: &T) -> Option<Bytes> {
    let payload = serde_json::to_vec(value).ok()?;
    let mut out = Vec::with_capacity(payload.len() + name.len() + 16);
    out.extend_from_slice(b"event: ");
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b"\ndata: ");
    out.extend_from_slice(&payload);
    out.extend_from_slice(b"\n\n");
    Some(Bytes::from(out))
}

/// The `data: [DONE]` terminator used by the OpenAI-shaped streams.
pub fn done_frame() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

/// True when a `data:` payload is the `[DONE]` sentinel.
pub fn is_done_payload(data: &str) -> bool {
    data.trim() == "[DONE]"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parser_joins_multi_line_data_and_keeps_event_names() {
        let mut parser = SseParser::new();
        let events =
            parser.push_str("event: message_start\ndata: {\"a\":\ndata: 1}\n\ndata: second\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event.as_deref(), Some("message_start"));
        assert_eq!(events[0].data, "{\"a\":\n1}");
        assert_eq!(events[1].event, None);
        assert_eq!(events[1].data, "second");
    }

    #[test]
    fn parser_handles_split_chunks_and_crlf() {
        let mut parser = SseParser::new();
        assert!(parser.push_str("data: par").is_empty());
        let events = parser.push_str("tial\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "partial");
    }

    #[test]
    fn parser_skips_comments_and_unknown_fields() {
        let mut parser = SseParser::new();
        let events = parser.push_str(": keep-alive\nretry: 500\n\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn parser_accepts_bare_field_names() {
        let mut parser = SseParser::new();
        let events = parser.push_str("data\ndata: y\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "\ny");
    }

    #[test]
    fn parser_finish_drains_an_unterminated_event() {
        let mut parser = SseParser::new();
        assert!(parser.push_str("data: tail").is_empty());
        let events = parser.finish();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "tail");
    }

    #[test]
    fn decoder_detects_sse_framing() {
        let mut decoder = StreamDecoder::new();
        let out = decoder.push(&Bytes::from_static(b"data: {\"x\":1}\n\ndata: [DONE]\n\n"));
        assert_eq!(out, vec!["{\"x\":1}".to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn decoder_scans_json_array_framing() {
        let mut decoder = StreamDecoder::new();
        let mut out = decoder.push(&Bytes::from_static(b"[{\"a\": \"}\"},\n {\"b\""));
        out.extend(decoder.push(&Bytes::from_static(b": 2}]")));
        assert_eq!(out, vec!["{\"a\": \"}\"}".to_string(), "{\"b\": 2}".to_string()]);
    }

    #[test]
    fn decoder_scans_ndjson_and_pretty_printed_objects() {
        let mut decoder = StreamDecoder::new();
        let mut out = decoder.push(&Bytes::from_static(b"{\"a\":1}\n{\n  \"b\": 2\n}"));
        out.extend(decoder.finish());
        assert_eq!(out, vec!["{\"a\":1}".to_string(), "{\n  \"b\": 2\n}".to_string()]);
    }

    #[test]
    fn decoder_drops_incomplete_trailing_elements() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.push(&Bytes::from_static(b"[{\"a\": ")).is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn escaped_quotes_and_backslashes_do_not_confuse_the_scanner() {
        let mut decoder = StreamDecoder::new();
        let out = decoder.push(&Bytes::from_static(b"{\"a\": \"\\\"}\\\\\"}"));
        assert_eq!(out, vec!["{\"a\": \"\\\"}\\\\\"}".to_string()]);
    }

    #[test]
    fn frames_are_terminated_by_blank_lines() {
        let frame = named_frame("ping", &serde_json::json!({"type": "ping"})).unwrap();
        assert_eq!(&frame[..], b"event: ping\ndata: {\"type\":\"ping\"}\n\n");
        assert!(is_done_payload(" [DONE] "));
    }
}
