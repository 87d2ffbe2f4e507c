use crate::event_trace::{EventId, EventTraceSchema};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// A single decoded event trace record
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize)]
pub struct DecodedEvent {
    pub timestamp: u64,
    pub event_id: EventId,
    pub name: String,
    #[serde(skip)]
    pub description: String,
    #[serde(rename = "category", serialize_with = "serialize_categories")]
    pub categories: Vec<String>,
    #[serde(rename = "payload")]
    pub raw_payload: u64,
    /// Argument name to rendered value
    pub args: BTreeMap<String, String>,
}

impl DecodedEvent {
    pub const NAME_WIDTH: usize = 25;
    pub const CATEGORY_WIDTH: usize = 25;
    pub const ARGS_WIDTH: usize = 30;
    pub const TIMESTAMP_WIDTH: usize = 20;

    pub(crate) fn unknown(timestamp: u64, event_id: EventId, raw_payload: u64) -> Self {
        Self {
            timestamp,
            event_id,
            name: EventTraceSchema::UNKNOWN.to_owned(),
            description: format!("Unknown event ID: {event_id}"),
            categories: vec![EventTraceSchema::UNKNOWN.to_owned()],
            raw_payload,
            args: Default::default(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.name == EventTraceSchema::UNKNOWN
    }

    /// Categories joined with `|`
    pub fn category_string(&self) -> String {
        self.categories.join("|")
    }

    /// Arguments as `name=value` pairs joined with `, `
    pub fn args_string(&self) -> String {
        self.args
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Column titles matching the [`Display`](fmt::Display) row layout
    pub fn header_row() -> String {
        format!(
            "{:<tw$} {:<nw$} {:<cw$} {:<aw$}",
            "Timestamp",
            "Event",
            "Category",
            "Arguments",
            tw = Self::TIMESTAMP_WIDTH,
            nw = Self::NAME_WIDTH,
            cw = Self::CATEGORY_WIDTH,
            aw = Self::ARGS_WIDTH,
        )
    }
}

impl fmt::Display for DecodedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.name.is_empty() {
            EventTraceSchema::UNKNOWN
        } else {
            &self.name
        };
        let mut categories = self.category_string();
        if categories.is_empty() {
            categories = EventTraceSchema::UNKNOWN.to_owned();
        }
        write!(
            f,
            "{:<tw$} {:<nw$} {:<cw$} {:<aw$}",
            self.timestamp,
            name,
            categories,
            self.args_string(),
            tw = Self::TIMESTAMP_WIDTH,
            nw = Self::NAME_WIDTH,
            cw = Self::CATEGORY_WIDTH,
            aw = Self::ARGS_WIDTH,
        )
    }
}

fn serialize_categories<S: Serializer>(categories: &[String], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&categories.join("|"))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn event() -> DecodedEvent {
        DecodedEvent {
            timestamp: 1234,
            event_id: EventId(0x14),
            name: "FRAME_START".to_owned(),
            description: "start of a frame".to_owned(),
            categories: vec!["dma".to_owned(), "sched".to_owned()],
            raw_payload: 0x94ee0000f,
            args: [("ctx", "3"), ("addr", "0x0f")]
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
        }
    }

    #[test]
    fn text_row() {
        let row = event().to_string();
        assert_eq!(
            row,
            format!(
                "{:<20} {:<25} {:<25} {:<30}",
                1234, "FRAME_START", "dma|sched", "addr=0x0f, ctx=3"
            )
        );

        let unknown = DecodedEvent::unknown(5, EventId(99), 0).to_string();
        assert!(unknown.starts_with("5                    UNKNOWN"));
        assert!(unknown.contains(" UNKNOWN                   "));
    }

    #[test]
    fn structured_tree_matches_row_fields() {
        let value = serde_json::to_value(event()).unwrap();
        assert_eq!(
            value,
            json!({
                "timestamp": 1234,
                "event_id": 20,
                "name": "FRAME_START",
                "category": "dma|sched",
                "payload": 0x94ee0000f_u64,
                "args": {"addr": "0x0f", "ctx": "3"}
            })
        );
    }

    #[test]
    fn unknown_event() {
        let ev = DecodedEvent::unknown(5, EventId(99), 0xAB);
        assert!(ev.is_unknown());
        assert_eq!(ev.description, "Unknown event ID: 99");
        assert_eq!(ev.categories, vec!["UNKNOWN".to_owned()]);
        assert!(ev.args.is_empty());
    }
}
