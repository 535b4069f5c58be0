//! Incremental decoder for `text/event-stream` bytes.
//!
//! Chunks arrive with arbitrary boundaries: a chunk may end in the middle of
//! a UTF-8 sequence, a field name, or a `\r\n` terminator. The parser buffers
//! the undecoded tail and carries it into the next call, so no split ever
//! loses data.

use memchr::{memchr, memchr2};

use crate::event::Event;

/// How response lines are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// The full SSE field grammar: `id:`, `event:`, `data:`, `retry:`,
    /// comments, blank-line event termination.
    #[default]
    Standard,
    /// Every non-empty, non-comment line is one event whose payload is the
    /// literal line. For providers that emit raw JSON lines without the
    /// `field:` prefix convention.
    DataOnly,
}

/// Incremental SSE parser for one connection attempt.
///
/// Feed raw chunks with [`push`](Parser::push); call
/// [`finish`](Parser::finish) once the transport completes to flush an event
/// the server never terminated. Malformed lines are dropped, never an error.
#[derive(Debug, Default)]
pub struct Parser {
    mode: ParseMode,
    pending_line: Vec<u8>,
    last_was_cr: bool,
    data_lines: Vec<String>,
    event: Option<String>,
    id: Option<String>,
    retry: Option<u64>,
    has_fields: bool,
}

impl Parser {
    pub fn new(mode: ParseMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Consume one chunk and return every event it completed, in byte order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Event> {
        let mut events = Vec::new();
        let mut rest = chunk;
        while !rest.is_empty() {
            if self.last_was_cr {
                self.last_was_cr = false;
                // Second half of a \r\n terminator split across chunks.
                if rest[0] == b'\n' {
                    rest = &rest[1..];
                    continue;
                }
            }
            match memchr2(b'\n', b'\r', rest) {
                Some(pos) => {
                    self.pending_line.extend_from_slice(&rest[..pos]);
                    self.last_was_cr = rest[pos] == b'\r';
                    rest = &rest[pos + 1..];
                    self.complete_line(&mut events);
                }
                None => {
                    self.pending_line.extend_from_slice(rest);
                    break;
                }
            }
        }
        events
    }

    /// Flush the in-progress event after the byte stream has ended. Some
    /// providers close the connection right after the final payload line
    /// without a terminating blank line.
    pub fn finish(&mut self) -> Option<Event> {
        if !self.pending_line.is_empty() {
            let mut events = Vec::new();
            self.complete_line(&mut events);
            if let Some(event) = events.pop() {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn complete_line(&mut self, events: &mut Vec<Event>) {
        let line = std::mem::take(&mut self.pending_line);
        if line.is_empty() {
            if self.mode == ParseMode::Standard {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
            }
            return;
        }
        if line[0] == b':' {
            return; // comment
        }
        match self.mode {
            ParseMode::DataOnly => {
                events.push(Event::new(String::from_utf8_lossy(&line).into_owned()));
            }
            ParseMode::Standard => self.apply_field(&line),
        }
    }

    fn apply_field(&mut self, line: &[u8]) {
        let (name, value) = match memchr(b':', line) {
            Some(pos) => {
                let mut value = &line[pos + 1..];
                // At most one leading space after the colon is stripped.
                if value.first() == Some(&b' ') {
                    value = &value[1..];
                }
                (&line[..pos], value)
            }
            // A bare field name carries an empty value.
            None => (line, &[][..]),
        };
        let value = String::from_utf8_lossy(value);
        match name {
            b"data" => {
                self.data_lines.push(value.into_owned());
                self.has_fields = true;
            }
            b"event" => {
                self.event = Some(value.into_owned());
                self.has_fields = true;
            }
            b"id" => {
                // Ids containing NUL are rejected per the SSE grammar.
                if !value.contains('\0') {
                    self.id = Some(value.into_owned());
                    self.has_fields = true;
                }
            }
            b"retry" => {
                if let Ok(millis) = value.parse::<u64>() {
                    self.retry = Some(millis);
                    self.has_fields = true;
                }
            }
            _ => {} // unknown fields are ignored
        }
    }

    fn dispatch(&mut self) -> Option<Event> {
        if !self.has_fields {
            return None;
        }
        self.has_fields = false;
        let data = std::mem::take(&mut self.data_lines).join("\n");
        Some(Event {
            // The id buffer persists across events; event/data/retry reset.
            id: self.id.clone(),
            event: self.event.take(),
            data,
            retry: self.retry.take(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &[u8]) -> Vec<Event> {
        let mut parser = Parser::new(ParseMode::Standard);
        let mut events = parser.push(input);
        if let Some(event) = parser.finish() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_blank_line_terminates_event() {
        let events = parse_all(b"event: ping\ndata: 1\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("ping"));
        assert_eq!(events[0].data, "1");
    }

    #[test]
    fn test_multiline_data_joins_with_newline() {
        let events = parse_all(b"data: a\ndata: b\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "a\nb");
    }

    #[test]
    fn test_id_persists_across_events() {
        let events = parse_all(b"id: 5\ndata: x\n\ndata: y\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id.as_deref(), Some("5"));
        assert_eq!(events[1].id.as_deref(), Some("5"));
        assert_eq!(events[1].data, "y");
    }

    #[test]
    fn test_comments_and_unknown_fields_ignored() {
        let events = parse_all(b": keepalive\nfoo: bar\ndata: x\n\n");
        assert_eq!(events, vec![Event::new("x")]);
    }

    #[test]
    fn test_invalid_retry_ignored() {
        let events = parse_all(b"retry: soon\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].retry, None);

        let events = parse_all(b"retry: 1500\ndata: x\n\n");
        assert_eq!(events[0].retry, Some(1500));
    }

    #[test]
    fn test_field_without_colon_has_empty_value() {
        let events = parse_all(b"data\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "");
    }

    #[test]
    fn test_blank_lines_without_fields_produce_nothing() {
        assert!(parse_all(b"\n\n\n").is_empty());
        assert!(parse_all(b": comment only\n\n").is_empty());
    }

    #[test]
    fn test_mixed_line_endings() {
        let events = parse_all(b"data: a\r\n\r\n");
        assert_eq!(events, vec![Event::new("a")]);

        let events = parse_all(b"data: b\r\r");
        assert_eq!(events, vec![Event::new("b")]);
    }

    #[test]
    fn test_terminator_split_across_chunks() {
        let mut parser = Parser::new(ParseMode::Standard);
        assert!(parser.push(b"data: a\r").is_empty());
        let events = parser.push(b"\n\r\ndata: b\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "a");
        assert_eq!(events[1].data, "b");
    }

    #[test]
    fn test_utf8_sequence_split_across_chunks() {
        // Euro sign is three bytes: E2 82 AC.
        let euro = "€".as_bytes();
        let mut parser = Parser::new(ParseMode::Standard);

        let mut first = b"data: price ".to_vec();
        first.extend_from_slice(&euro[..2]);
        assert!(parser.push(&first).is_empty());

        let mut second = euro[2..].to_vec();
        second.extend_from_slice(b"100\n\n");
        let events = parser.push(&second);
        assert_eq!(events, vec![Event::new("price €100")]);
    }

    #[test]
    fn test_chunk_boundaries_do_not_change_output() {
        let input = "event: ping\r\nid: 7\r\ndata: caf\u{e9}\ndata: two\n\nretry: 1500\ndata: second\r\rdata: third\n\n"
            .as_bytes();
        let expected = parse_all(input);
        assert_eq!(expected.len(), 3);
        assert_eq!(expected[0].data, "caf\u{e9}\ntwo");
        assert_eq!(expected[1].retry, Some(1500));

        for split in 1..input.len() {
            let mut parser = Parser::new(ParseMode::Standard);
            let mut events = parser.push(&input[..split]);
            events.extend(parser.push(&input[split..]));
            if let Some(event) = parser.finish() {
                events.push(event);
            }
            assert_eq!(events, expected, "split at byte {split}");
        }
    }

    #[test]
    fn test_stream_ending_without_final_blank_line() {
        let mut parser = Parser::new(ParseMode::Standard);
        let events = parser.push(b"data: first\n\ndata: [DONE]");
        assert_eq!(events, vec![Event::new("first")]);

        let last = parser.finish().expect("trailing event must flush");
        assert!(last.is_done());
        assert!(parser.finish().is_none());
    }

    #[test]
    fn test_data_only_mode_emits_one_event_per_line() {
        let mut parser = Parser::new(ParseMode::DataOnly);
        let events = parser.push(b"{\"token\":\"a\"}\n: ping\n\n{\"token\":\"b\"}\n{\"tok");
        assert_eq!(
            events,
            vec![Event::new("{\"token\":\"a\"}"), Event::new("{\"token\":\"b\"}")]
        );

        let events = parser.push(b"en\":\"c\"}\n");
        assert_eq!(events, vec![Event::new("{\"token\":\"c\"}")]);
    }

    #[test]
    fn test_data_only_mode_flushes_trailing_line() {
        let mut parser = Parser::new(ParseMode::DataOnly);
        assert!(parser.push(b"{\"done\":true}").is_empty());
        assert_eq!(parser.finish(), Some(Event::new("{\"done\":true}")));
    }
}
