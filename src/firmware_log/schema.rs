use crate::bits;
use crate::firmware_log::Error;
use crate::types::{CodeTable, FormatSpec, ScalarType};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

/// One field of a firmware log structure
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Field {
    pub name: String,
    pub type_name: String,
    /// Effective width: the declared width, or the width of `type_name` when
    /// none was declared
    pub bit_width: usize,
    pub format: FormatSpec,
    pub enumeration: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Structure {
    pub name: String,
    pub fields: Vec<Field>,
}

impl Structure {
    pub fn bit_size(&self) -> usize {
        self.fields.iter().map(|f| f.bit_width).sum()
    }

    /// Size in whole bytes
    pub fn size(&self) -> usize {
        bits::bytes_for_bits(self.bit_size())
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Fields paired with their bit offset from the start of the structure
    pub fn bit_offsets(&self) -> impl Iterator<Item = (usize, &Field)> {
        self.fields.iter().scan(0, |offset, f| {
            let start = *offset;
            *offset += f.bit_width;
            Some((start, f))
        })
    }
}

/// A validated firmware log schema
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct FirmwareLogSchema {
    pub enumerations: BTreeMap<String, CodeTable>,
    pub structures: BTreeMap<String, Structure>,
}

impl FirmwareLogSchema {
    pub const MESSAGE_HEADER: &'static str = "ipu_log_message_header";
    pub const ENTRY_HEADER: &'static str = "ipu_log_ring_entry_header";
    pub const ENTRY_FOOTER: &'static str = "ipu_log_ring_entry_footer";

    pub fn from_slice(document: &[u8]) -> Result<Self, Error> {
        let raw: RawDocument = serde_json::from_slice(document)?;
        Self::from_raw(raw)
    }

    pub fn from_value(document: serde_json::Value) -> Result<Self, Error> {
        let raw: RawDocument = serde_json::from_value(document)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawDocument) -> Result<Self, Error> {
        let enumerations: BTreeMap<String, CodeTable> = raw
            .enumerations
            .into_iter()
            .map(|(name, e)| {
                let mut table = CodeTable::new(name.clone());
                for (enumerator, value) in e.enumerators.unwrap_or_default() {
                    table.insert(value, enumerator);
                }
                (name, table)
            })
            .collect();

        let mut structures = BTreeMap::new();
        for (name, s) in raw.structures {
            let fields = s
                .fields
                .unwrap_or_default()
                .into_iter()
                .map(|f| parse_field(&name, f, &enumerations))
                .collect::<Result<Vec<_>, _>>()?;
            let structure = Structure {
                name: name.clone(),
                fields,
            };
            debug!(
                structure = %name,
                fields = structure.fields.len(),
                size = structure.size(),
                "Found structure"
            );
            structures.insert(name, structure);
        }

        Ok(Self {
            enumerations,
            structures,
        })
    }

    /// Look up a structure the decoder requires
    pub fn structure(&self, name: &'static str) -> Result<&Structure, Error> {
        self.structures
            .get(name)
            .ok_or(Error::MissingStructure(name))
    }

    pub fn message_header(&self) -> Result<&Structure, Error> {
        self.structure(Self::MESSAGE_HEADER)
    }

    pub fn entry_header(&self) -> Result<&Structure, Error> {
        self.structure(Self::ENTRY_HEADER)
    }

    pub fn entry_footer(&self) -> Result<&Structure, Error> {
        self.structure(Self::ENTRY_FOOTER)
    }

    /// Whether the schema describes magic-framed ring entries
    pub fn is_framed(&self) -> Result<bool, Error> {
        let header = self.structures.contains_key(Self::ENTRY_HEADER);
        let footer = self.structures.contains_key(Self::ENTRY_FOOTER);
        match (header, footer) {
            (true, true) => Ok(true),
            (false, false) => Ok(false),
            (true, false) => Err(Error::IncompleteFraming(
                Self::ENTRY_HEADER,
                Self::ENTRY_FOOTER,
            )),
            (false, true) => Err(Error::IncompleteFraming(
                Self::ENTRY_FOOTER,
                Self::ENTRY_HEADER,
            )),
        }
    }

    pub fn enumeration(&self, name: &str) -> Option<&CodeTable> {
        self.enumerations.get(name)
    }
}

impl FromStr for FirmwareLogSchema {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(s.as_bytes())
    }
}

fn parse_field(
    structure: &str,
    raw: RawField,
    enumerations: &BTreeMap<String, CodeTable>,
) -> Result<Field, Error> {
    let name = raw
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::FieldMissingName(structure.to_owned()))?;
    let type_name = raw.r#type.unwrap_or_default();
    let bit_width = match raw.width {
        Some(w) if w > 0 => w,
        _ => ScalarType::from_str(&type_name)
            .map_err(|_| Error::UnknownType(structure.to_owned(), name.clone(), type_name.clone()))?
            .bit_width(),
    };
    if bit_width > bits::BITS_PER_U64 {
        return Err(Error::FieldTooWide(structure.to_owned(), name, bit_width));
    }
    let enumeration = raw.enumeration.filter(|e| !e.is_empty());
    if let Some(e) = &enumeration {
        if !enumerations.contains_key(e) {
            return Err(Error::UnknownEnumeration(
                structure.to_owned(),
                name,
                e.clone(),
            ));
        }
    }
    Ok(Field {
        name,
        type_name,
        bit_width,
        format: FormatSpec(raw.format.unwrap_or_default()),
        enumeration,
    })
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    enumerations: BTreeMap<String, RawEnumeration>,
    #[serde(default)]
    structures: BTreeMap<String, RawStructure>,
}

#[derive(Debug, Deserialize)]
struct RawEnumeration {
    enumerators: Option<BTreeMap<String, u64>>,
}

#[derive(Debug, Deserialize)]
struct RawStructure {
    fields: Option<Vec<RawField>>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    name: Option<String>,
    r#type: Option<String>,
    width: Option<usize>,
    format: Option<String>,
    enumeration: Option<String>,
}
