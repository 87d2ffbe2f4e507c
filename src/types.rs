//! Types common to both the event trace and firmware log schemas

use derive_more::{Deref, Display, From, Into};
use enum_iterator::Sequence;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;
use thiserror::Error;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Display)]
#[display(fmt = "{major}.{minor}")]
pub struct FormatVersion {
    pub major: u16,
    pub minor: u16,
}

impl FormatVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

/// A named table mapping integer codes to symbolic names, and back
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct CodeTable {
    pub name: String,
    by_code: BTreeMap<u64, String>,
    by_name: BTreeMap<String, u64>,
}

impl CodeTable {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            by_code: Default::default(),
            by_name: Default::default(),
        }
    }

    pub fn insert<S: Into<String>>(&mut self, code: u64, name: S) {
        let name = name.into();
        self.by_name.insert(name.clone(), code);
        self.by_code.insert(code, name);
    }

    pub fn name(&self, code: u64) -> Option<&str> {
        self.by_code.get(&code).map(String::as_str)
    }

    pub fn code(&self, name: &str) -> Option<u64> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> {
        self.by_code.iter().map(|(c, n)| (*c, n.as_str()))
    }
}

/// Everything decoded from one buffer.
///
/// `consumed` is the number of leading bytes the decoder accounted for, never
/// more than the buffer length. Callers tracking an absolute stream offset
/// across polls advance it by this amount.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Decoded<T> {
    pub items: Vec<T>,
    pub consumed: usize,
}

impl<T> Decoded<T> {
    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T> std::ops::Deref for Decoded<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl<T> IntoIterator for Decoded<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum FormatError {
    #[error("Invalid width in format specifier '{0}'")]
    Width(String),

    #[error(
        "Format specifier '{0}' requests a width of {1} digits (maximum is {})",
        FormatSpec::MAX_WIDTH
    )]
    WidthTooLarge(String, usize),
}

/// A value format specifier, e.g. `"d"`, `"x"` or `"08x"`.
///
/// Anything containing an `x` renders as `0x`-prefixed lowercase hexadecimal,
/// zero padded to the width given by its digits. Everything else is decimal.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Display, From, Into, Deref)]
#[display(fmt = "{_0}")]
pub struct FormatSpec(pub(crate) String);

impl FormatSpec {
    pub const MAX_WIDTH: usize = 64;

    pub fn is_hex(&self) -> bool {
        self.0.contains('x')
    }

    /// Render `value`. Signed values are expected to be sign extended already.
    pub fn render(&self, value: u64, signed: bool) -> Result<String, FormatError> {
        if !self.is_hex() {
            return Ok(if signed {
                (value as i64).to_string()
            } else {
                value.to_string()
            });
        }

        let digits: String = self.0.chars().filter(char::is_ascii_digit).collect();
        let mut out = String::with_capacity(18);
        if digits.is_empty() {
            let _ = write!(out, "0x{value:x}");
        } else {
            let width: usize = digits
                .parse()
                .map_err(|_| FormatError::Width(self.0.clone()))?;
            if width > Self::MAX_WIDTH {
                return Err(FormatError::WidthTooLarge(self.0.clone(), width));
            }
            let _ = write!(out, "0x{value:0width$x}");
        }
        Ok(out)
    }
}

/// Scalar C types a firmware log field may be declared with when it has no
/// explicit bit width
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Sequence)]
pub enum ScalarType {
    #[display(fmt = "uint8_t")]
    U8,
    #[display(fmt = "int8_t")]
    I8,
    #[display(fmt = "char")]
    Char,
    #[display(fmt = "bool")]
    Bool,
    #[display(fmt = "uint16_t")]
    U16,
    #[display(fmt = "int16_t")]
    I16,
    #[display(fmt = "uint32_t")]
    U32,
    #[display(fmt = "int32_t")]
    I32,
    #[display(fmt = "uint64_t")]
    U64,
    #[display(fmt = "int64_t")]
    I64,
}

impl ScalarType {
    pub fn bit_width(self) -> usize {
        use ScalarType::*;
        match self {
            U8 | I8 | Char | Bool => 8,
            U16 | I16 => 16,
            U32 | I32 => 32,
            U64 | I64 => 64,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, thiserror::Error)]
#[error("Unknown type '{0}'")]
pub struct ParseScalarTypeError(pub String);

impl FromStr for ScalarType {
    type Err = ParseScalarTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        enum_iterator::all::<ScalarType>()
            .find(|t| t.to_string() == s.trim())
            .ok_or_else(|| ParseScalarTypeError(s.to_owned()))
    }
}

/// A message string read from raw firmware memory: everything up to the
/// first NULL, lossy converted to UTF8, without trailing newlines
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Into, Display)]
#[display(fmt = "{_0}")]
pub struct MessageString(pub(crate) String);

impl MessageString {
    pub(crate) fn from_raw(s: &[u8]) -> Self {
        let end = s.iter().position(|b| *b == 0).unwrap_or(s.len());
        let s = String::from_utf8_lossy(&s[..end]);
        Self(s.trim_end_matches('\n').to_string())
    }
}

impl AsRef<str> for MessageString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for MessageString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
