//! Partition type codes and offset-write references.
//!
//! Both serialize as the plain strings used in gadget descriptions
//! (`"83"`, `"DA,21686148-6449-6E6F-744E-656564454649"`, `"mbr+92"`).

use crate::model::Schema;
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scheme-tagged partition type of a volume structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PartitionType {
    /// The literal `mbr`: the boot sector area, not a partition.
    Mbr,
    /// Two hex digit MBR partition type, e.g. `83`.
    MbrCode(u8),
    /// GPT partition type GUID, stored uppercase.
    Guid(String),
    /// `<code>,<guid>`, usable with either schema.
    Hybrid { code: u8, guid: String },
}

impl PartitionType {
    pub fn is_mbr(&self) -> bool {
        matches!(self, PartitionType::Mbr)
    }

    /// Whether this type can be used on a volume with the given schema.
    pub fn is_compatible_with(&self, schema: Schema) -> bool {
        match self {
            PartitionType::Mbr | PartitionType::Hybrid { .. } => true,
            PartitionType::MbrCode(_) => schema == Schema::Mbr,
            PartitionType::Guid(_) => schema == Schema::Gpt,
        }
    }
}

fn parse_mbr_code(s: &str) -> Option<u8> {
    if s.len() != 2 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(s, 16).ok()
}

fn parse_guid(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    if bytes.len() != 36 {
        return None;
    }
    let well_formed = bytes.iter().enumerate().all(|(i, b)| match i {
        8 | 13 | 18 | 23 => *b == b'-',
        _ => b.is_ascii_hexdigit(),
    });
    well_formed.then(|| s.to_ascii_uppercase())
}

impl FromStr for PartitionType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || SchemaError::InvalidPartitionType(s.to_owned());

        if trimmed.eq_ignore_ascii_case("mbr") {
            return Ok(PartitionType::Mbr);
        }
        if let Some((code, guid)) = trimmed.split_once(',') {
            // `mbr,<code>` tags a plain MBR code with its schema
            if code.trim().eq_ignore_ascii_case("mbr") {
                return parse_mbr_code(guid.trim())
                    .map(PartitionType::MbrCode)
                    .ok_or_else(invalid);
            }
            let code = parse_mbr_code(code.trim()).ok_or_else(invalid)?;
            let guid = parse_guid(guid.trim()).ok_or_else(invalid)?;
            return Ok(PartitionType::Hybrid { code, guid });
        }
        if let Some(code) = parse_mbr_code(trimmed) {
            return Ok(PartitionType::MbrCode(code));
        }
        parse_guid(trimmed)
            .map(PartitionType::Guid)
            .ok_or_else(invalid)
    }
}

impl TryFrom<String> for PartitionType {
    type Error = SchemaError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PartitionType> for String {
    fn from(t: PartitionType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for PartitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionType::Mbr => f.write_str("mbr"),
            PartitionType::MbrCode(code) => write!(f, "{code:02X}"),
            PartitionType::Guid(guid) => f.write_str(guid),
            PartitionType::Hybrid { code, guid } => write!(f, "{code:02X},{guid}"),
        }
    }
}

/// Offset-write reference: an absolute byte offset, or a byte delta from the
/// start of a named structure in the same volume (`<name>+<delta>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRelativeOffset", into = "String")]
pub struct RelativeOffset {
    pub relative_to: Option<String>,
    pub offset: u64,
}

impl RelativeOffset {
    pub fn absolute(offset: u64) -> Self {
        Self {
            relative_to: None,
            offset,
        }
    }

    pub fn relative(relative_to: impl Into<String>, offset: u64) -> Self {
        Self {
            relative_to: Some(relative_to.into()),
            offset,
        }
    }
}

impl FromStr for RelativeOffset {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SchemaError::InvalidRelativeOffset(s.to_owned());
        let trimmed = s.trim();

        match trimmed.split_once('+') {
            Some((name, delta)) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(invalid());
                }
                let offset = delta.trim().parse::<u64>().map_err(|_| invalid())?;
                Ok(Self::relative(name, offset))
            }
            None => trimmed
                .parse::<u64>()
                .map(Self::absolute)
                .map_err(|_| invalid()),
        }
    }
}

impl fmt::Display for RelativeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relative_to {
            Some(name) => write!(f, "{name}+{}", self.offset),
            None => write!(f, "{}", self.offset),
        }
    }
}

impl From<RelativeOffset> for String {
    fn from(o: RelativeOffset) -> Self {
        o.to_string()
    }
}

/// Offset-write values may be written as a bare integer or as a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawRelativeOffset {
    Absolute(u64),
    Text(String),
}

impl TryFrom<RawRelativeOffset> for RelativeOffset {
    type Error = SchemaError;

    fn try_from(raw: RawRelativeOffset) -> Result<Self, Self::Error> {
        match raw {
            RawRelativeOffset::Absolute(offset) => Ok(Self::absolute(offset)),
            RawRelativeOffset::Text(s) => s.parse(),
        }
    }
}
