use crate::bits;
use crate::event_trace::{DecodedEvent, Error, EventId, EventTraceSchema};
use crate::types::Decoded;
use byteordered::ByteOrdered;
use std::fmt::Write as _;
use std::io::{self, Read};
use tracing::{debug, trace, warn};

/// Decodes buffers of back-to-back event trace records.
///
/// Construction validates the schema; decoding never fails; a trailing partial
/// record (a buffer observed mid-write) is left unconsumed.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct EventTraceDecoder {
    schema: EventTraceSchema,
    record_size: usize,
}

impl EventTraceDecoder {
    pub fn new(schema: EventTraceSchema) -> Self {
        let record_size = schema.record_size();
        debug!(record_size, "Created event trace decoder");
        Self {
            schema,
            record_size,
        }
    }

    /// Load and validate a JSON schema document
    pub fn from_slice(document: &[u8]) -> Result<Self, Error> {
        Ok(Self::new(EventTraceSchema::from_slice(document)?))
    }

    pub fn schema(&self) -> &EventTraceSchema {
        &self.schema
    }

    /// Size in bytes of one event record
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Split a combined word into its event ID (upper bits) and payload
    /// (lower bits)
    pub fn split_word(&self, combined: u64) -> (EventId, u64) {
        let payload_bits = self.schema.payload_bits as usize;
        let event_id = EventId((combined >> payload_bits) as u16);
        let payload = combined & bits::field_mask(payload_bits);
        (event_id, payload)
    }

    pub fn decode(&self, buf: &[u8]) -> Decoded<DecodedEvent> {
        let count = buf.len() / self.record_size;
        let mut items = Vec::with_capacity(count);
        for (index, record) in buf.chunks_exact(self.record_size).enumerate() {
            match self.decode_record(record) {
                Ok(ev) => {
                    trace!(index, event_id = %ev.event_id, name = %ev.name, "Decoded event");
                    items.push(ev);
                }
                Err(e) => {
                    warn!(index, "Failed to read event record ({})", e.kind());
                    break;
                }
            }
        }
        let consumed = items.len() * self.record_size;
        if consumed < buf.len() {
            trace!(
                remaining = buf.len() - consumed,
                "Ignoring trailing partial record"
            );
        }
        Decoded { items, consumed }
    }

    /// Decode a single record. `record` must hold at least
    /// [`record_size`](Self::record_size) bytes.
    pub fn decode_record(&self, record: &[u8]) -> Result<DecodedEvent, io::Error> {
        let mut r = ByteOrdered::le(record);
        let timestamp = r.read_u64()?;
        let mut word = [0_u8; 8];
        r.read_exact(&mut word[..self.schema.word_size()])?;
        let combined = u64::from_le_bytes(word);
        let (event_id, payload) = self.split_word(combined);
        Ok(self.decode_event(timestamp, event_id, payload))
    }

    /// Resolve an event against the schema and render its arguments
    pub fn decode_event(&self, timestamp: u64, event_id: EventId, payload: u64) -> DecodedEvent {
        let Some(info) = self.schema.event(event_id) else {
            return DecodedEvent::unknown(timestamp, event_id, payload);
        };
        let args = info
            .args
            .iter()
            .map(|arg| {
                let value = self
                    .schema
                    .format_argument(payload, arg)
                    .unwrap_or_else(|e| format!("ERROR: {e}"));
                (arg.name.clone(), value)
            })
            .collect();
        DecodedEvent {
            timestamp,
            event_id,
            name: info.name.clone(),
            description: info.description.clone(),
            categories: info.categories.clone(),
            raw_payload: payload,
            args,
        }
    }

    /// Render a buffer as a text table, one row per event
    pub fn render(&self, buf: &[u8]) -> String {
        if buf.is_empty() {
            return "No event trace data available\n".to_owned();
        }
        let events = self.decode(buf);
        let mut out = String::new();
        let _ = writeln!(out, "{}", DecodedEvent::header_row());
        for ev in events.iter() {
            let _ = writeln!(out, "{ev}");
        }
        out
    }

    /// Decode a buffer into a structured tree carrying the same fields as the
    /// rendered rows
    pub fn decode_tree(&self, buf: &[u8]) -> serde_json::Value {
        let events = self.decode(buf);
        serde_json::json!({
            "event_count": events.len(),
            "buffer_size": buf.len(),
            "events": events
                .iter()
                .map(|ev| serde_json::json!({
                    "timestamp": ev.timestamp,
                    "event_id": u16::from(ev.event_id),
                    "name": ev.name,
                    "category": ev.category_string(),
                    "payload": ev.raw_payload,
                    "args": ev.args,
                }))
                .collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn decoder() -> EventTraceDecoder {
        let schema = EventTraceSchema::from_value(json!({
            "categories": [{"name": "frame", "id": 2}],
            "arg_sets": {"frame": [
                {"name": "ctx", "width": 4},
                {"name": "addr", "width": 32, "format": "08x"}
            ]},
            "events": {"20": {"name": "FRAME_START", "categories": ["frame"], "args_name": "frame"}}
        }))
        .unwrap();
        EventTraceDecoder::new(schema)
    }

    fn record(timestamp: u64, event_id: u16, payload: u64) -> Vec<u8> {
        let combined = (u64::from(event_id) << 48) | payload;
        timestamp
            .to_le_bytes()
            .into_iter()
            .chain(combined.to_le_bytes())
            .collect()
    }

    #[test]
    fn combined_word_split() {
        let d = decoder();
        let combined = (0x0014_u64 << 48) | 0x0000_0009_4ee0_000f;
        assert_eq!(combined, 0x0014_0009_4ee0_000f);
        assert_eq!(d.split_word(combined), (EventId(0x0014), 0x0000_0009_4ee0_000f));
    }

    #[test]
    fn decode_known_event() {
        let d = decoder();
        assert_eq!(d.record_size(), 16);
        let buf = record(77, 20, 0x0009_4ee0_000f);
        let events = d.decode(&buf);
        assert_eq!(events.consumed, 16);
        assert_eq!(events.len(), 1);
        let ev = &events[0];
        assert_eq!(ev.timestamp, 77);
        assert_eq!(ev.name, "FRAME_START");
        assert_eq!(ev.categories, vec!["frame".to_owned()]);
        assert_eq!(ev.args["ctx"], "15");
        assert_eq!(ev.args["addr"], "0x94ee0000");
    }

    #[test]
    fn argument_errors_are_local() {
        let d = decoder();
        let mut info = d.schema().event(EventId(20)).unwrap().clone();
        info.args[0].bit_width = 0;
        let mut schema = d.schema().clone();
        schema.events.insert(EventId(20), info);
        let d = EventTraceDecoder::new(schema);
        let ev = d.decode_event(1, EventId(20), 0x1234_5678_9);
        assert_eq!(ev.args["ctx"], "ERROR: Invalid argument width: 0");
        assert_eq!(ev.args["addr"], "0x12345678");
    }

    #[test]
    fn render_and_tree() {
        let d = decoder();
        assert_eq!(d.render(&[]), "No event trace data available\n");

        let buf = record(77, 20, 0xF);
        let text = d.render(&buf);
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("Timestamp"));
        assert!(lines.next().unwrap().starts_with("77 "));
        assert_eq!(lines.next(), None);

        let tree = d.decode_tree(&buf);
        assert_eq!(
            tree,
            json!({
                "event_count": 1,
                "buffer_size": 16,
                "events": [{
                    "timestamp": 77,
                    "event_id": 20,
                    "name": "FRAME_START",
                    "category": "frame",
                    "payload": 15,
                    "args": {"addr": "0x00000000", "ctx": "15"}
                }]
            })
        );
    }
}
