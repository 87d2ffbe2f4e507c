use crate::bits;
use crate::event_trace::{ArgumentError, Error, EventId};
use crate::types::{CodeTable, FormatSpec, FormatVersion};
use derive_more::Display;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use tracing::{debug, trace, warn};

/// A single bit-positioned field within an event payload
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Argument {
    pub name: String,
    pub bit_width: u32,
    /// Starting bit position in the payload, assigned left to right
    pub start: u32,
    pub format: FormatSpec,
    /// Name of the lookup table used to render the value, if any
    pub lookup: Option<String>,
    pub signed: bool,
    pub description: String,
}

impl Argument {
    /// Extract this argument's bits from an event payload, sign extended if
    /// the argument is signed
    pub fn extract(&self, payload: u64) -> Result<u64, ArgumentError> {
        if self.bit_width == 0 || self.bit_width > 64 {
            return Err(ArgumentError::Width(self.bit_width));
        }
        if self.start.saturating_add(self.bit_width) > 64 {
            return Err(ArgumentError::Range(self.start, self.bit_width));
        }
        let value = bits::extract(
            &payload.to_le_bytes(),
            0,
            self.start as usize,
            self.bit_width as usize,
        );
        Ok(if self.signed {
            bits::sign_extend(value, self.bit_width as usize)
        } else {
            value
        })
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Category {
    pub name: String,
    pub id: u32,
    pub description: String,
}

impl Category {
    /// Categories are tracked in a `u32` mask
    pub const MAX_ID: u32 = 31;

    pub fn mask(&self) -> u32 {
        1 << self.id
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct EventInfo {
    pub id: EventId,
    pub name: String,
    pub description: String,
    pub categories: Vec<String>,
    pub category_mask: u32,
    /// The argument template this event's arguments were resolved from
    pub args_name: Option<String>,
    pub args: Vec<Argument>,
    pub kind: EventKind,
    /// The matching `_DONE` event of a `_START` event, and vice versa
    pub pair: Option<EventId>,
}

/// Role of an event within a `<STUB>_START` / `<STUB>_DONE` pair, from its name
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Display)]
pub enum EventKind {
    #[display(fmt = "start")]
    Start,
    #[display(fmt = "done")]
    Done,
    #[default]
    #[display(fmt = "null")]
    Other,
}

impl EventKind {
    pub const START_SUFFIX: &'static str = "_START";
    pub const DONE_SUFFIX: &'static str = "_DONE";

    /// Classify an event name, returning the kind and the pairing stub
    pub fn from_name(name: &str) -> (Self, Option<&str>) {
        if let Some(stub) = name.strip_suffix(Self::START_SUFFIX) {
            (EventKind::Start, Some(stub))
        } else if let Some(stub) = name.strip_suffix(Self::DONE_SUFFIX) {
            (EventKind::Done, Some(stub))
        } else {
            (EventKind::Other, None)
        }
    }
}

/// A validated event trace schema.
///
/// Only constructed from a complete document; any malformed section fails the
/// whole load.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct EventTraceSchema {
    pub event_id_bits: u32,
    pub payload_bits: u32,
    pub version: FormatVersion,
    pub lookups: BTreeMap<String, CodeTable>,
    pub categories: BTreeMap<String, Category>,
    pub arg_sets: BTreeMap<String, Vec<Argument>>,
    pub events: BTreeMap<EventId, EventInfo>,
}

impl EventTraceSchema {
    pub const DEFAULT_EVENT_ID_BITS: u32 = 16;
    pub const DEFAULT_PAYLOAD_BITS: u32 = 48;
    pub const TIMESTAMP_BITS: u32 = 64;
    pub const UNKNOWN: &'static str = "UNKNOWN";

    pub fn from_slice(document: &[u8]) -> Result<Self, Error> {
        let raw: RawDocument = serde_json::from_slice(document)?;
        Self::from_raw(raw)
    }

    pub fn from_value(document: serde_json::Value) -> Result<Self, Error> {
        let raw: RawDocument = serde_json::from_value(document)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawDocument) -> Result<Self, Error> {
        let (event_id_bits, payload_bits) = parse_data_format(raw.data_format.as_ref())?;
        let version = raw
            .version
            .map(|v| FormatVersion::new(v.major.unwrap_or(0), v.minor.unwrap_or(0)))
            .unwrap_or_default();
        debug!(%version, event_id_bits, payload_bits, "Found event trace data format");

        let lookups = parse_lookups(raw.lookups)?;
        let categories = parse_categories(raw.categories)?;
        let arg_sets = parse_arg_sets(raw.arg_sets, payload_bits)?;
        for (set_name, arg) in arg_sets
            .iter()
            .flat_map(|(set_name, args)| args.iter().map(move |a| (set_name, a)))
        {
            if let Some(lookup) = &arg.lookup {
                if !lookups.contains_key(lookup) {
                    warn!(
                        arg_set = %set_name,
                        argument = %arg.name,
                        "Argument references unknown lookup table '{lookup}'"
                    );
                }
            }
        }
        let events = parse_events(raw.events, event_id_bits, &categories, &arg_sets)?;
        debug!(
            lookups = lookups.len(),
            categories = categories.len(),
            arg_sets = arg_sets.len(),
            events = events.len(),
            "Loaded event trace schema"
        );

        Ok(Self {
            event_id_bits,
            payload_bits,
            version,
            lookups,
            categories,
            arg_sets,
            events,
        })
    }

    /// (event ID bits, payload bits)
    pub fn data_format(&self) -> (u32, u32) {
        (self.event_id_bits, self.payload_bits)
    }

    /// Size in bytes of the combined event-id/payload word
    pub fn word_size(&self) -> usize {
        ((self.event_id_bits + self.payload_bits) / 8) as usize
    }

    /// Size in bytes of one event record
    pub fn record_size(&self) -> usize {
        (Self::TIMESTAMP_BITS / 8) as usize + self.word_size()
    }

    pub fn event(&self, id: EventId) -> Option<&EventInfo> {
        self.events.get(&id)
    }

    pub fn event_name(&self, id: EventId) -> &str {
        self.event(id).map(|e| e.name.as_str()).unwrap_or(Self::UNKNOWN)
    }

    pub fn event_categories(&self, id: EventId) -> Vec<String> {
        self.event(id)
            .map(|e| e.categories.clone())
            .unwrap_or_else(|| vec![Self::UNKNOWN.to_owned()])
    }

    /// Compare the document version against the version reported by the
    /// firmware, warning on mismatch. Decoding still proceeds either way.
    pub fn check_version(&self, device: FormatVersion) -> bool {
        if self.version != device {
            warn!(
                schema_version = %self.version,
                device_version = %device,
                "Event trace version mismatch"
            );
            false
        } else {
            true
        }
    }

    /// Render an argument of an event payload: lookup substitution when the
    /// argument references a table, the formatted number otherwise
    pub fn format_argument(&self, payload: u64, arg: &Argument) -> Result<String, ArgumentError> {
        let value = arg.extract(payload)?;
        let Some(lookup) = &arg.lookup else {
            return Ok(arg.format.render(value, arg.signed)?);
        };
        // Lookup codes are 32 bits wide
        let code = u64::from(value as u32);
        if let Some(name) = self.lookups.get(lookup).and_then(|t| t.name(code)) {
            return Ok(name.to_owned());
        }
        Ok(format!(
            "{} [lookup:{lookup}]",
            arg.format.render(value, arg.signed)?
        ))
    }
}

impl FromStr for EventTraceSchema {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(s.as_bytes())
    }
}

fn parse_data_format(df: Option<&RawDataFormat>) -> Result<(u32, u32), Error> {
    let event_id_bits = match df.and_then(|d| d.event_bits) {
        None => EventTraceSchema::DEFAULT_EVENT_ID_BITS,
        Some(0) => return Err(Error::ZeroEventBits),
        Some(b) => b,
    };
    let payload_bits = match df.and_then(|d| d.payload_bits) {
        None => EventTraceSchema::DEFAULT_PAYLOAD_BITS,
        Some(0) => return Err(Error::ZeroPayloadBits),
        Some(b) => b,
    };
    if event_id_bits > EventId::BITS {
        return Err(Error::EventBitsTooWide(event_id_bits));
    }
    let combined = event_id_bits.saturating_add(payload_bits);
    if combined > 64 || combined % 8 != 0 {
        return Err(Error::CombinedWordLayout(event_id_bits, payload_bits));
    }
    Ok((event_id_bits, payload_bits))
}

fn parse_lookups(
    raw: BTreeMap<String, BTreeMap<String, String>>,
) -> Result<BTreeMap<String, CodeTable>, Error> {
    raw.into_iter()
        .map(|(name, entries)| {
            let mut table = CodeTable::new(name.clone());
            for (code, display) in entries {
                let parsed: u32 = code
                    .trim()
                    .parse()
                    .map_err(|_| Error::LookupCode(name.clone(), code.clone()))?;
                table.insert(parsed.into(), display);
            }
            Ok((name, table))
        })
        .collect()
}

fn parse_categories(raw: Vec<RawCategory>) -> Result<BTreeMap<String, Category>, Error> {
    let mut categories: BTreeMap<String, Category> = BTreeMap::new();
    let mut forced_ids = BTreeSet::new();
    let mut unassigned = BTreeMap::new();

    // Explicit IDs first, then fill the gaps in name order
    for c in raw {
        let name = c.name.ok_or(Error::CategoryMissingName)?;
        if categories.contains_key(&name) || unassigned.contains_key(&name) {
            return Err(Error::DuplicateCategoryName(name));
        }
        let description = c.description.unwrap_or_default();
        match c.id {
            Some(id) => {
                if id > Category::MAX_ID {
                    return Err(Error::CategoryIdRange(name, id));
                }
                if !forced_ids.insert(id) {
                    return Err(Error::DuplicateCategoryId(id, name));
                }
                categories.insert(
                    name.clone(),
                    Category {
                        name,
                        id,
                        description,
                    },
                );
            }
            None => {
                unassigned.insert(name, description);
            }
        }
    }

    let mut next_id = 0;
    for (name, description) in unassigned {
        while forced_ids.contains(&next_id) {
            next_id += 1;
        }
        if next_id > Category::MAX_ID {
            return Err(Error::CategoryIdRange(name, next_id));
        }
        forced_ids.insert(next_id);
        categories.insert(
            name.clone(),
            Category {
                name,
                id: next_id,
                description,
            },
        );
    }

    Ok(categories)
}

fn parse_arg_sets(
    raw: BTreeMap<String, Vec<RawArgument>>,
    payload_bits: u32,
) -> Result<BTreeMap<String, Vec<Argument>>, Error> {
    raw.into_iter()
        .map(|(set_name, list)| {
            let args = parse_argument_list(&set_name, list, payload_bits)?;
            Ok((set_name, args))
        })
        .collect()
}

fn parse_argument_list(
    set_name: &str,
    list: Vec<RawArgument>,
    payload_bits: u32,
) -> Result<Vec<Argument>, Error> {
    let mut args = Vec::with_capacity(list.len());
    let mut start = 0_u32;
    for raw in list {
        let name = raw
            .name
            .ok_or_else(|| Error::ArgumentMissingField(set_name.to_owned(), "name"))?;
        let bit_width = raw
            .width
            .ok_or_else(|| Error::ArgumentMissingField(set_name.to_owned(), "width"))?;
        if bit_width == 0 {
            return Err(Error::ZeroWidthArgument(name));
        }
        let end = start.saturating_add(bit_width);
        if end > payload_bits {
            return Err(Error::ArgumentExceedsPayload(
                name,
                set_name.to_owned(),
                payload_bits,
            ));
        }
        args.push(Argument {
            name,
            bit_width,
            start,
            format: FormatSpec(raw.format.unwrap_or_default()),
            lookup: raw.lookup.filter(|l| !l.is_empty()),
            signed: raw.signed.unwrap_or(false),
            description: raw.description.unwrap_or_default(),
        });
        start = end;
    }
    Ok(args)
}

fn parse_events(
    raw: BTreeMap<String, RawEvent>,
    event_id_bits: u32,
    categories: &BTreeMap<String, Category>,
    arg_sets: &BTreeMap<String, Vec<Argument>>,
) -> Result<BTreeMap<EventId, EventInfo>, Error> {
    let mut events = BTreeMap::new();
    let mut names = BTreeSet::new();

    for (key, ev) in raw {
        let id_val: u64 = key
            .trim()
            .parse()
            .map_err(|_| Error::EventIdKey(key.clone()))?;
        if id_val > bits::field_mask(event_id_bits as usize) {
            return Err(Error::EventIdRange(id_val, event_id_bits));
        }
        let id = EventId(id_val as u16);
        let name = ev.name.ok_or(Error::EventMissingName(id))?;
        if !names.insert(name.clone()) {
            return Err(Error::DuplicateEventName(name));
        }

        let mut category_mask = 0;
        let event_categories = ev.categories.unwrap_or_default();
        for cat in event_categories.iter() {
            let info = categories
                .get(cat)
                .ok_or_else(|| Error::UnknownCategory(name.clone(), cat.clone()))?;
            category_mask |= info.mask();
        }

        let args_name = ev.args_name.filter(|a| !a.is_empty());
        let args = match &args_name {
            Some(a) => arg_sets
                .get(a)
                .cloned()
                .ok_or_else(|| Error::UnknownArgSet(name.clone(), a.clone()))?,
            None => Vec::new(),
        };

        let info = EventInfo {
            id,
            name,
            description: ev.description.unwrap_or_default(),
            categories: event_categories,
            category_mask,
            args_name,
            args,
            kind: EventKind::Other,
            pair: None,
        };
        if let Some(prev) = events.insert(id, info) {
            return Err(Error::DuplicateEventId(id, prev.name));
        }
    }

    link_event_pairs(&mut events);
    Ok(events)
}

/// Mark `_START`/`_DONE` events and cross-link the pairs sharing a stub
fn link_event_pairs(events: &mut BTreeMap<EventId, EventInfo>) {
    // stub -> (start, done)
    let mut pairs: BTreeMap<String, (Option<EventId>, Option<EventId>)> = BTreeMap::new();
    for (id, ev) in events.iter_mut() {
        let (kind, stub) = EventKind::from_name(&ev.name);
        ev.kind = kind;
        if let Some(stub) = stub {
            let entry = pairs.entry(stub.to_owned()).or_default();
            match kind {
                EventKind::Start => entry.0 = Some(*id),
                EventKind::Done => entry.1 = Some(*id),
                EventKind::Other => (),
            }
        }
    }

    for (stub, ids) in pairs {
        if let (Some(start), Some(done)) = ids {
            trace!(%stub, %start, %done, "Linked event pair");
            if let Some(ev) = events.get_mut(&start) {
                ev.pair = Some(done);
            }
            if let Some(ev) = events.get_mut(&done) {
                ev.pair = Some(start);
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    data_format: Option<RawDataFormat>,
    version: Option<RawVersion>,
    #[serde(default)]
    lookups: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    categories: Vec<RawCategory>,
    #[serde(default)]
    arg_sets: BTreeMap<String, Vec<RawArgument>>,
    #[serde(default)]
    events: BTreeMap<String, RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawDataFormat {
    event_bits: Option<u32>,
    payload_bits: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawVersion {
    major: Option<u16>,
    minor: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct RawCategory {
    name: Option<String>,
    id: Option<u32>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawArgument {
    name: Option<String>,
    width: Option<u32>,
    format: Option<String>,
    lookup: Option<String>,
    signed: Option<bool>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    name: Option<String>,
    description: Option<String>,
    categories: Option<Vec<String>>,
    args_name: Option<String>,
}
