use crate::bits;
use crate::firmware_log::{ColumnLayout, Error, FirmwareLogSchema, LogRow, Structure};
use crate::types::{Decoded, MessageString};
use derive_more::Display;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use tracing::{debug, trace};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub enum Generation {
    /// Back-to-back log messages
    #[display(fmt = "contiguous")]
    Contiguous,
    /// Log messages wrapped in magic-byte ring entry framing
    #[display(fmt = "framed")]
    Framed,
}

/// Decodes firmware log buffers, either contiguous or ring-entry framed
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum FirmwareLogDecoder {
    Contiguous(ContiguousDecoder),
    Framed(FramedDecoder),
}

impl FirmwareLogDecoder {
    /// Build a decoder for whichever generation the schema describes: framed
    /// when it declares the ring entry header and footer, contiguous when it
    /// declares neither
    pub fn new(schema: FirmwareLogSchema) -> Result<Self, Error> {
        if schema.is_framed()? {
            Self::framed(schema)
        } else {
            Self::contiguous(schema)
        }
    }

    /// Load and validate a JSON schema document
    pub fn from_slice(document: &[u8]) -> Result<Self, Error> {
        Self::new(FirmwareLogSchema::from_slice(document)?)
    }

    pub fn contiguous(schema: FirmwareLogSchema) -> Result<Self, Error> {
        let parser = MessageParser::new(schema)?;
        debug!(header_size = parser.header_size, "Created contiguous firmware log decoder");
        Ok(FirmwareLogDecoder::Contiguous(ContiguousDecoder { parser }))
    }

    pub fn framed(schema: FirmwareLogSchema) -> Result<Self, Error> {
        let entry_header_size = schema.entry_header()?.size();
        let entry_footer_size = schema.entry_footer()?.size();
        if entry_header_size == 0 {
            return Err(Error::EmptyStructure(FirmwareLogSchema::ENTRY_HEADER));
        }
        if entry_footer_size == 0 {
            return Err(Error::EmptyStructure(FirmwareLogSchema::ENTRY_FOOTER));
        }
        let parser = MessageParser::new(schema)?;
        debug!(
            header_size = parser.header_size,
            entry_header_size,
            entry_footer_size,
            "Created framed firmware log decoder"
        );
        Ok(FirmwareLogDecoder::Framed(FramedDecoder {
            parser,
            entry_header_size,
            entry_footer_size,
            scan_step: FramedDecoder::DEFAULT_SCAN_STEP,
        }))
    }

    /// Override how far a framed decoder advances past a candidate entry
    /// whose footer magic does not match. Has no effect on a contiguous
    /// decoder.
    pub fn with_scan_step(mut self, step: NonZeroUsize) -> Self {
        if let FirmwareLogDecoder::Framed(d) = &mut self {
            d.scan_step = step;
        }
        self
    }

    pub fn generation(&self) -> Generation {
        match self {
            FirmwareLogDecoder::Contiguous(_) => Generation::Contiguous,
            FirmwareLogDecoder::Framed(_) => Generation::Framed,
        }
    }

    fn parser(&self) -> &MessageParser {
        match self {
            FirmwareLogDecoder::Contiguous(d) => &d.parser,
            FirmwareLogDecoder::Framed(d) => &d.parser,
        }
    }

    pub fn schema(&self) -> &FirmwareLogSchema {
        &self.parser().schema
    }

    /// Size in bytes of the log message header
    pub fn header_size(&self) -> usize {
        self.parser().header_size
    }

    /// Size in bytes of the ring entry header, when framed
    pub fn entry_header_size(&self) -> Option<usize> {
        match self {
            FirmwareLogDecoder::Contiguous(_) => None,
            FirmwareLogDecoder::Framed(d) => Some(d.entry_header_size),
        }
    }

    /// Size in bytes of the ring entry footer, when framed
    pub fn entry_footer_size(&self) -> Option<usize> {
        match self {
            FirmwareLogDecoder::Contiguous(_) => None,
            FirmwareLogDecoder::Framed(d) => Some(d.entry_footer_size),
        }
    }

    /// Index of a message header field within [`LogRow::fields`]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.parser().field_indices.get(name).copied()
    }

    pub fn decode(&self, buf: &[u8]) -> Decoded<LogRow> {
        match self {
            FirmwareLogDecoder::Contiguous(d) => d.decode(buf),
            FirmwareLogDecoder::Framed(d) => d.decode(buf),
        }
    }

    pub fn header_row(&self) -> String {
        self.parser().columns.header_row()
    }

    pub fn format_row(&self, row: &LogRow) -> String {
        self.parser().columns.format_row(row)
    }

    /// Render a buffer as a report: a header row, then one row per entry
    pub fn render(&self, buf: &[u8]) -> String {
        if buf.is_empty() {
            return "No firmware log data available\n".to_owned();
        }
        let rows = self.decode(buf);
        let mut out = self.header_row();
        for row in rows.iter() {
            out.push_str(&self.format_row(row));
        }
        out
    }
}

/// Log messages written back to back with no framing
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ContiguousDecoder {
    parser: MessageParser,
}

impl ContiguousDecoder {
    pub fn decode(&self, buf: &[u8]) -> Decoded<LogRow> {
        let header_size = self.parser.header_size;
        let mut items = Vec::new();
        let mut offset = 0_usize;
        while fits(offset, header_size, buf.len()) {
            let row = self.parser.parse_entry(buf, offset);
            let size = self.parser.entry_size(&row);
            trace!(offset, size, "Decoded log entry");
            items.push(row);
            offset = offset.saturating_add(size);
        }
        Decoded {
            items,
            consumed: offset.min(buf.len()),
        }
    }
}

/// Log messages wrapped in ring entries, each starting with
/// [`MAGIC_HEADER`](Self::MAGIC_HEADER) and ending with
/// [`MAGIC_FOOTER`](Self::MAGIC_FOOTER).
///
/// The buffer may start anywhere in the ring. The header magic is searched
/// for one byte at a time. Candidate entries that fail footer verification
/// are skipped by the scan step rather than their decoded size, so every
/// iteration makes progress.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct FramedDecoder {
    parser: MessageParser,
    entry_header_size: usize,
    entry_footer_size: usize,
    scan_step: NonZeroUsize,
}

impl FramedDecoder {
    pub const MAGIC_HEADER: u8 = 0xCA;
    pub const MAGIC_FOOTER: u8 = 0xBA;
    pub const DEFAULT_SCAN_STEP: NonZeroUsize = match NonZeroUsize::new(4) {
        Some(s) => s,
        None => unreachable!(),
    };

    pub fn scan_step(&self) -> usize {
        self.scan_step.get()
    }

    pub fn decode(&self, buf: &[u8]) -> Decoded<LogRow> {
        let step = self.scan_step.get();
        let min_entry_size =
            self.entry_header_size + self.parser.header_size + self.entry_footer_size;
        let mut items = Vec::new();
        let mut offset = 0_usize;

        while fits(offset, min_entry_size, buf.len()) {
            if buf[offset] != Self::MAGIC_HEADER {
                offset += 1;
                continue;
            }

            let row = self
                .parser
                .parse_entry(buf, offset + self.entry_header_size);
            let payload_size = self.parser.entry_size(&row);
            let full_entry_size = self
                .entry_header_size
                .saturating_add(payload_size)
                .saturating_add(self.entry_footer_size);

            if !fits(offset, full_entry_size, buf.len()) {
                trace!(offset, full_entry_size, "Partial trailing entry");
                break;
            }

            if buf[offset + full_entry_size - 1] != Self::MAGIC_FOOTER {
                trace!(offset, full_entry_size, "Footer magic mismatch, resynchronizing");
                offset += step;
                continue;
            }

            trace!(offset, full_entry_size, "Decoded ring entry");
            items.push(row);
            offset += full_entry_size;
        }

        Decoded {
            items,
            consumed: offset.min(buf.len()),
        }
    }
}

/// Whether `len` bytes starting at `offset` lie within a buffer of `buf_len`
fn fits(offset: usize, len: usize, buf_len: usize) -> bool {
    offset.checked_add(len).map_or(false, |end| end <= buf_len)
}

/// Message header interpretation shared by both generations
#[derive(Clone, Eq, PartialEq, Debug)]
struct MessageParser {
    schema: FirmwareLogSchema,
    header: Structure,
    header_size: usize,
    field_indices: BTreeMap<String, usize>,
    format_index: usize,
    argc_index: usize,
    columns: ColumnLayout,
}

impl MessageParser {
    /// Each argument of a standard format message is a 32-bit word
    const ARG_SIZE: usize = 4;
    /// Standard format arguments are padded to 8 bytes
    const ARG_ALIGNMENT: usize = 8;

    fn new(schema: FirmwareLogSchema) -> Result<Self, Error> {
        let header = schema.message_header()?.clone();
        let header_size = header.size();
        let field_indices: BTreeMap<String, usize> = header
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        let format_index = *field_indices
            .get("format")
            .ok_or(Error::MissingField(FirmwareLogSchema::MESSAGE_HEADER, "format"))?;
        let argc_index = *field_indices
            .get("argc")
            .ok_or(Error::MissingField(FirmwareLogSchema::MESSAGE_HEADER, "argc"))?;
        let columns = ColumnLayout::new(&header);
        Ok(Self {
            schema,
            header,
            header_size,
            field_indices,
            format_index,
            argc_index,
            columns,
        })
    }

    /// Parse the message header at `offset` and the message string after it.
    /// The caller guarantees the header lies within `buf`.
    fn parse_entry(&self, buf: &[u8], offset: usize) -> LogRow {
        let mut fields = Vec::with_capacity(self.header.fields.len());
        let mut values = Vec::with_capacity(self.header.fields.len());
        for (bit_offset, field) in self.header.bit_offsets() {
            let value = bits::extract(buf, offset, bit_offset, field.bit_width);
            let mut text = value.to_string();
            if let Some(e) = field
                .enumeration
                .as_ref()
                .and_then(|e| self.schema.enumeration(e))
            {
                text.push(':');
                // Enumerator codes are 32 bits wide
                text.push_str(e.name(u64::from(value as u32)).unwrap_or("<unknown>"));
            }
            fields.push(text);
            values.push(value);
        }
        let msg = buf.get(offset + self.header_size..).unwrap_or(&[]);
        LogRow {
            fields,
            values,
            message: MessageString::from_raw(msg).into(),
        }
    }

    /// Total size of an entry (header included) from its `format` and `argc`
    fn entry_size(&self, row: &LogRow) -> usize {
        let format = row.values[self.format_index];
        let argc = usize::try_from(row.values[self.argc_index]).unwrap_or(usize::MAX);
        let payload = if format == 0 {
            let args = argc.saturating_mul(Self::ARG_SIZE);
            args.saturating_add(Self::ARG_ALIGNMENT - 1) / Self::ARG_ALIGNMENT
                * Self::ARG_ALIGNMENT
        } else {
            // Concise format arguments are byte packed
            argc
        };
        self.header_size.saturating_add(payload)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> FirmwareLogSchema {
        FirmwareLogSchema::from_value(json!({
            "enumerations": {"log_level": {"enumerators": {"ERR": 1, "INF": 3}}},
            "structures": {
                "ipu_log_message_header": {"fields": [
                    {"name": "timestamp", "type": "uint64_t"},
                    {"name": "format", "type": "uint32_t", "width": 1},
                    {"name": "reserved", "type": "uint32_t", "width": 7},
                    {"name": "level", "type": "uint32_t", "width": 3, "enumeration": "log_level"},
                    {"name": "argc", "type": "uint32_t", "width": 5},
                    {"name": "line", "type": "uint16_t"},
                    {"name": "module", "type": "uint32_t"}
                ]}
            }
        }))
        .unwrap()
    }

    fn row(format: u64, argc: u64) -> LogRow {
        LogRow {
            fields: Vec::new(),
            values: vec![0, format, 0, 0, argc, 0, 0],
            message: String::new(),
        }
    }

    #[test]
    fn entry_sizing() {
        let d = FirmwareLogDecoder::new(schema()).unwrap();
        assert_eq!(d.generation(), Generation::Contiguous);
        assert_eq!(d.header_size(), 16);
        let p = d.parser();
        assert_eq!(p.entry_size(&row(0, 3)), 16 + 16);
        assert_eq!(p.entry_size(&row(0, 2)), 16 + 8);
        assert_eq!(p.entry_size(&row(0, 0)), 16);
        assert_eq!(p.entry_size(&row(1, 5)), 16 + 5);
        assert_eq!(p.entry_size(&row(1, u64::MAX)), usize::MAX);
    }

    #[test]
    fn missing_sizing_fields() {
        let schema = FirmwareLogSchema::from_value(json!({
            "structures": {"ipu_log_message_header": {"fields": [
                {"name": "timestamp", "type": "uint64_t"},
                {"name": "format", "type": "uint8_t"}
            ]}}
        }))
        .unwrap();
        assert!(matches!(
            FirmwareLogDecoder::new(schema),
            Err(Error::MissingField(_, "argc"))
        ));
        assert!(matches!(
            FirmwareLogDecoder::new(FirmwareLogSchema::default()),
            Err(Error::MissingStructure(FirmwareLogSchema::MESSAGE_HEADER))
        ));
    }

    #[test]
    fn enumeration_fields() {
        let d = FirmwareLogDecoder::new(schema()).unwrap();
        let level = d.field_index("level").unwrap();
        let mut buf = [0_u8; 16];
        // level occupies bits 8..11 of the second word
        buf[9] = 0x3;
        let row = d.parser().parse_entry(&buf, 0);
        assert_eq!(row.fields[level], "3:INF");
        buf[9] = 0x2;
        let row = d.parser().parse_entry(&buf, 0);
        assert_eq!(row.fields[level], "2:<unknown>");
        assert_eq!(row.message, "");
    }

    #[test]
    fn enumeration_codes_are_32_bits() {
        let mut s = schema();
        let header = s
            .structures
            .get_mut(FirmwareLogSchema::MESSAGE_HEADER)
            .unwrap();
        // Widen `module` to 64 bits and give it the level enumeration
        let module = header.field_index("module").unwrap();
        header.fields[module].bit_width = 64;
        header.fields[module].enumeration = Some("log_level".to_owned());
        let d = FirmwareLogDecoder::new(s).unwrap();

        let mut buf = [0_u8; 20];
        buf[12..20].copy_from_slice(&0x1_0000_0003_u64.to_le_bytes());
        let row = d.parser().parse_entry(&buf, 0);
        assert_eq!(row.values[module], 0x1_0000_0003);
        assert_eq!(row.fields[module], "4294967299:INF");
    }

    #[test]
    fn framing_requires_non_empty_structures() {
        let mut s = schema();
        s.structures.insert(
            FirmwareLogSchema::ENTRY_HEADER.to_owned(),
            Structure {
                name: FirmwareLogSchema::ENTRY_HEADER.to_owned(),
                fields: Vec::new(),
            },
        );
        let footer = s.structures[FirmwareLogSchema::MESSAGE_HEADER].clone();
        s.structures
            .insert(FirmwareLogSchema::ENTRY_FOOTER.to_owned(), footer);
        assert!(matches!(
            FirmwareLogDecoder::new(s),
            Err(Error::EmptyStructure(FirmwareLogSchema::ENTRY_HEADER))
        ));
        assert!(matches!(
            FirmwareLogDecoder::framed(schema()),
            Err(Error::MissingStructure(FirmwareLogSchema::ENTRY_HEADER))
        ));
    }
}
