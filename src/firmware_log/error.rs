use thiserror::Error;

/// Errors raised while loading a firmware log schema or building a decoder
/// from it
#[derive(Debug, Error)]
pub enum Error {
    #[error("Config missing {0} structure")]
    MissingStructure(&'static str),

    #[error("Structure '{0}' has a field with no name")]
    FieldMissingName(String),

    #[error("Unknown type '{2}' for field '{1}' in structure '{0}'")]
    UnknownType(String, String, String),

    #[error("Field '{1}' in structure '{0}' is {2} bits wide (maximum is 64)")]
    FieldTooWide(String, String, usize),

    #[error("Field '{1}' in structure '{0}' references unknown enumeration: {2}")]
    UnknownEnumeration(String, String, String),

    #[error("Structure {0} is missing required '{1}' field")]
    MissingField(&'static str, &'static str),

    #[error("Structure {0} must be at least one byte to hold its magic byte")]
    EmptyStructure(&'static str),

    #[error("Config declares {0} without {1}")]
    IncompleteFraming(&'static str, &'static str),

    #[error("Invalid firmware log schema document")]
    Json(#[from] serde_json::Error),
}
