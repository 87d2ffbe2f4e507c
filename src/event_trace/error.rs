use crate::event_trace::EventId;
use crate::types::FormatError;
use thiserror::Error;

/// Errors raised while loading an event trace schema
#[derive(Debug, Error)]
pub enum Error {
    #[error("Event bits must be greater than 0")]
    ZeroEventBits,

    #[error("Payload bits must be greater than 0")]
    ZeroPayloadBits,

    #[error("Event bits ({0}) exceed the {} bits of an event ID", EventId::BITS)]
    EventBitsTooWide(u32),

    #[error(
        "Event bits ({0}) plus payload bits ({1}) must be a whole number of bytes no wider than 64 bits"
    )]
    CombinedWordLayout(u32, u32),

    #[error("Lookup table '{0}' has non-numeric code '{1}'")]
    LookupCode(String, String),

    #[error("Category missing required 'name' field")]
    CategoryMissingName,

    #[error("Duplicate category name: {0}")]
    DuplicateCategoryName(String),

    #[error("Duplicate category ID {0} for category {1}")]
    DuplicateCategoryId(u32, String),

    #[error("Category '{0}' has ID {1}, which does not fit in the 32-bit category mask")]
    CategoryIdRange(String, u32),

    #[error("Argument in arg_set '{0}' missing '{1}' field")]
    ArgumentMissingField(String, &'static str),

    #[error("Argument '{0}' width cannot be zero")]
    ZeroWidthArgument(String),

    #[error("Argument '{0}' in arg_set '{1}' exceeds payload bits ({2})")]
    ArgumentExceedsPayload(String, String, u32),

    #[error("Event key '{0}' is not a decimal event ID")]
    EventIdKey(String),

    #[error("Event ID {0} does not fit in {1} event bits")]
    EventIdRange(u64, u32),

    #[error("Event {0} missing required 'name' field")]
    EventMissingName(EventId),

    #[error("Duplicate event ID {0} for event {1}")]
    DuplicateEventId(EventId, String),

    #[error("Duplicate event name: {0}")]
    DuplicateEventName(String),

    #[error("Event '{0}' references unknown category: {1}")]
    UnknownCategory(String, String),

    #[error("Event '{0}' references unknown arg_set: {1}")]
    UnknownArgSet(String, String),

    #[error("Invalid event trace schema document")]
    Json(#[from] serde_json::Error),
}

/// Errors local to rendering a single event argument. These never abort a
/// decode, the argument's value becomes `ERROR: <message>` instead.
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum ArgumentError {
    #[error("Invalid argument width: {0}")]
    Width(u32),

    #[error("Argument extends beyond payload: start={0}, width={1}")]
    Range(u32, u32),

    #[error(transparent)]
    Format(#[from] FormatError),
}
