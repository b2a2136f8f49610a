//! Server-Sent Events parser with line buffering.
//!
//! SSE lines can span multiple TCP packets, so bytes are buffered until
//! complete lines are available. The MCP SSE transport cares about two
//! event types: `endpoint` (names the POST URL during the handshake) and
//! `message` (carries a JSON-RPC frame).

use std::fmt;

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    /// The event type (from "event:" line)
    pub event: Option<String>,
    /// The event data (from "data:" lines)
    pub data: String,
    /// The event ID (from "id:" line)
    pub id: Option<String>,
}

impl SseEvent {
    /// Whether this event has the given type.
    pub fn is(&self, event_type: &str) -> bool {
        self.event.as_deref() == Some(event_type)
    }
}

/// SSE parser that handles line buffering across packets.
#[derive(Default)]
pub struct SseParser {
    /// Buffer for incomplete lines
    buffer: String,
    /// Current event being built
    current_event: Option<String>,
    current_data: Vec<String>,
    current_id: Option<String>,
}

impl SseParser {
    /// Create a new SSE parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the parser and return any complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        self.parse_buffer()
    }

    /// Parse the buffer for complete events.
    fn parse_buffer(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();

        loop {
            let newline_pos = match self.buffer.find('\n') {
                Some(pos) => pos,
                None => break, // No complete line yet
            };

            let line = self.buffer[..newline_pos].to_string();
            self.buffer = self.buffer[newline_pos + 1..].to_string();

            // Strip carriage return for \r\n line endings
            let line = line.trim_end_matches('\r');

            // Empty line signals end of event
            if line.is_empty() {
                if let Some(event) = self.finalize_event() {
                    events.push(event);
                }
                continue;
            }

            if let Some((field, value)) = Self::parse_field(line) {
                match field {
                    "event" => self.current_event = Some(value.to_string()),
                    "data" => self.current_data.push(value.to_string()),
                    "id" => self.current_id = Some(value.to_string()),
                    _ => {} // Ignore unknown fields
                }
            }
        }

        events
    }

    /// Parse a single SSE field line.
    fn parse_field(line: &str) -> Option<(&str, &str)> {
        // Lines starting with : are comments
        if line.starts_with(':') {
            return None;
        }

        if let Some(colon_pos) = line.find(':') {
            let field = &line[..colon_pos];
            let mut value = &line[colon_pos + 1..];

            // Remove leading space from value if present
            if value.starts_with(' ') {
                value = &value[1..];
            }

            Some((field, value))
        } else {
            // Field with no value
            Some((line, ""))
        }
    }

    /// Finalize the current event and reset state.
    fn finalize_event(&mut self) -> Option<SseEvent> {
        if self.current_data.is_empty() {
            self.current_event = None;
            self.current_id = None;
            return None;
        }

        let event = SseEvent {
            event: self.current_event.take(),
            data: self.current_data.join("\n"),
            id: self.current_id.take(),
        };

        self.current_data.clear();
        Some(event)
    }
}

impl fmt::Debug for SseParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseParser")
            .field("buffer_len", &self.buffer.len())
            .field("current_data_lines", &self.current_data.len())
            .finish()
    }
}
