use dicom::core::Tag;
use serde::de::{Error, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Identifier of a stored dataset.
///
/// Generated by the store at ingest time and used verbatim as the file name inside the
/// storage root. Only UUIDs are accepted when parsing, so a client-supplied identifier
/// can never address anything but a direct child of the storage root.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct FileId(Uuid);

impl FileId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for FileId {
	fn default() -> Self {
		Self::new()
	}
}

impl Display for FileId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0.hyphenated())
	}
}

impl FromStr for FileId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::try_parse(s).map(Self)
	}
}

/// A (group, element) pair addressing a single attribute of a dataset.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagCoordinate {
	pub group: u16,
	pub element: u16,
}

impl TagCoordinate {
	pub const fn new(group: u16, element: u16) -> Self {
		Self { group, element }
	}
}

impl From<TagCoordinate> for Tag {
	fn from(coordinate: TagCoordinate) -> Self {
		Self(coordinate.group, coordinate.element)
	}
}

impl From<Tag> for TagCoordinate {
	fn from(tag: Tag) -> Self {
		Self::new(tag.group(), tag.element())
	}
}

impl Display for TagCoordinate {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "({:04X},{:04X})", self.group, self.element)
	}
}

/// A 16-bit unsigned integer written as 1 to 4 hexadecimal digits, e.g. `0010` or `7fe0`.
///
/// Signs, `0x` prefixes and surrounding whitespace are rejected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HexU16(pub u16);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseHexU16Error {
	#[error("expected 1 to 4 hexadecimal digits, got `{0}`")]
	InvalidDigits(String),
}

impl FromStr for HexU16 {
	type Err = ParseHexU16Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() || s.len() > 4 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
			return Err(ParseHexU16Error::InvalidDigits(s.to_owned()));
		}
		u16::from_str_radix(s, 16)
			.map(Self)
			.map_err(|_| ParseHexU16Error::InvalidDigits(s.to_owned()))
	}
}

struct HexU16Visitor;

impl Visitor<'_> for HexU16Visitor {
	type Value = HexU16;

	fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
		write!(formatter, "a hexadecimal 16-bit value such as `0010`")
	}

	fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
	where
		E: Error,
	{
		v.parse().map_err(E::custom)
	}
}

impl<'de> Deserialize<'de> for HexU16 {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		deserializer.deserialize_str(HexU16Visitor)
	}
}
