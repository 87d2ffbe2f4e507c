use crate::firmware_log::Structure;
use std::fmt::Write as _;

/// One decoded firmware log entry
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct LogRow {
    /// Rendered message header fields, in declaration order
    pub fields: Vec<String>,
    /// Raw message header field values, parallel to `fields`
    pub values: Vec<u64>,
    pub message: String,
}

/// Header fields shown in a report, and their titles
pub const COLUMN_TITLES: &[(&str, &str)] = &[
    ("timestamp", "Timestamp"),
    ("level", "Log-Level"),
    ("appn", "App Number "),
    ("line", "Line Number"),
    ("module", "Module ID"),
];

/// Padding added to a column title to get the column width
pub const COLUMN_PADDING: usize = 4;

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
struct Column {
    field_index: usize,
    title: &'static str,
    width: usize,
}

/// Fixed-width report layout for the displayed message header fields
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct ColumnLayout {
    columns: Vec<Column>,
}

impl ColumnLayout {
    pub fn new(message_header: &Structure) -> Self {
        let columns = message_header
            .fields
            .iter()
            .enumerate()
            .filter_map(|(field_index, f)| {
                COLUMN_TITLES
                    .iter()
                    .find(|(name, _)| *name == f.name)
                    .map(|(_, title)| Column {
                        field_index,
                        title: *title,
                        width: title.len() + COLUMN_PADDING,
                    })
            })
            .collect();
        Self { columns }
    }

    pub fn header_row(&self) -> String {
        let mut out = String::new();
        for c in self.columns.iter() {
            let _ = write!(out, "{:<width$}", c.title, width = c.width);
        }
        out.push_str("Message\n");
        out
    }

    pub fn format_row(&self, row: &LogRow) -> String {
        let mut out = String::new();
        for c in self.columns.iter() {
            let text = row.fields.get(c.field_index).map(String::as_str).unwrap_or("");
            // Always at least one space between columns
            let _ = write!(out, "{:<width$} ", text, width = c.width - 1);
        }
        out.push_str(&row.message);
        out.push('\n');
        out
    }
}
