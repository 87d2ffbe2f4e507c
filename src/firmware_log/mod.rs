//! Variable-size firmware log messages.
//!
//! Every message starts with a bit-packed header described by the
//! `ipu_log_message_header` structure, whose `format` and `argc` fields size
//! the rest of the message. Schemas that also declare the
//! `ipu_log_ring_entry_header` and `ipu_log_ring_entry_footer` structures
//! describe ring buffer entries framed by magic bytes.

pub use decoder::{ContiguousDecoder, FirmwareLogDecoder, FramedDecoder, Generation};
pub use error::Error;
pub use row::{ColumnLayout, LogRow, COLUMN_PADDING, COLUMN_TITLES};
pub use schema::{Field, FirmwareLogSchema, Structure};

pub mod decoder;
pub mod error;
pub mod row;
pub mod schema;
