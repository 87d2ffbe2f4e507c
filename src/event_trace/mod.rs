//! Fixed-size event trace records.
//!
//! Each record is a 64-bit timestamp followed by a combined word carrying the
//! event ID in its upper bits and the payload in its lower bits.

use derive_more::{Binary, Display, From, Into, LowerHex, UpperHex};
use serde::Serialize;

pub use decoder::EventTraceDecoder;
pub use error::{ArgumentError, Error};
pub use event::DecodedEvent;
pub use schema::{Argument, Category, EventInfo, EventKind, EventTraceSchema};

pub mod decoder;
pub mod error;
pub mod event;
pub mod schema;

#[derive(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Debug,
    From,
    Into,
    Display,
    Binary,
    LowerHex,
    UpperHex,
    Serialize,
)]
#[display(fmt = "{_0}")]
pub struct EventId(pub u16);

impl EventId {
    pub const BITS: u32 = u16::BITS;
}
