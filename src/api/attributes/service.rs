use crate::types::{FileId, HexU16, TagCoordinate};
use async_trait::async_trait;
use axum::extract::rejection::PathRejection;
use axum::extract::{FromRequestParts, Path, Query};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dicom::core::dictionary::DataDictionary;
use dicom::core::{DicomValue, PrimitiveValue, VR};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::mem::InMemElement;
use dicom_json::DicomJson;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Resolves single attributes of stored datasets.
#[async_trait]
pub trait AttributeService: Send + Sync {
	async fn attribute(&self, request: AttributeRequest) -> Result<Attribute, AttributeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRequest {
	/// The identifier as supplied by the client. It is not validated yet.
	pub file: String,
	pub coordinate: TagCoordinate,
}

/// Query parameters of an attribute request, e.g. `?tagGroup=0010&tagElement=0010`.
#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinateParameters {
	pub tag_group: HexU16,
	pub tag_element: HexU16,
}

impl From<CoordinateParameters> for TagCoordinate {
	fn from(params: CoordinateParameters) -> Self {
		Self::new(params.tag_group.0, params.tag_element.0)
	}
}

impl<S> FromRequestParts<S> for AttributeRequest
where
	S: Send + Sync,
{
	type Rejection = Response;

	async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
		let Path(file): Path<String> = Path::from_request_parts(parts, state)
			.await
			.map_err(PathRejection::into_response)?;

		let Query(params): Query<CoordinateParameters> = Query::from_request_parts(parts, state)
			.await
			.map_err(|rejection| {
				(
					StatusCode::BAD_REQUEST,
					format!(
						"Expected valid tagGroup and tagElement query parameters: {}",
						rejection.body_text()
					),
				)
					.into_response()
			})?;

		Ok(Self {
			file,
			coordinate: TagCoordinate::from(params),
		})
	}
}

/// A single attribute of a dataset.
///
/// Binary values (OB, OW, UN, ...) and encapsulated pixel data are not inlined, their `value`
/// is empty. Sequence items are encoded as DICOM JSON objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
	pub tag: TagCoordinate,
	/// Keyword of the attribute in the standard data dictionary.
	/// `None` for tags not in the standard dictionary.
	pub name: Option<String>,
	pub vr: String,
	/// Value length in bytes. `None` if the length is undefined.
	pub length: Option<u32>,
	pub value: Vec<serde_json::Value>,
}

impl TryFrom<&InMemElement> for Attribute {
	type Error = serde_json::Error;

	fn try_from(element: &InMemElement) -> Result<Self, Self::Error> {
		let header = element.header();

		let value = match element.value() {
			DicomValue::Primitive(value) => primitive_values(header.vr, value),
			DicomValue::Sequence(sequence) => sequence
				.items()
				.iter()
				.map(|item| serde_json::to_value(DicomJson::from(item.clone())))
				.collect::<Result<_, _>>()?,
			DicomValue::PixelSequence(_) => Vec::new(),
		};

		Ok(Self {
			tag: TagCoordinate::from(header.tag),
			name: StandardDataDictionary
				.by_tag(header.tag)
				.map(|entry| entry.alias.to_owned()),
			vr: String::from(header.vr.to_string()),
			length: header.len.get(),
			value,
		})
	}
}

fn primitive_values(vr: VR, value: &PrimitiveValue) -> Vec<serde_json::Value> {
	use serde_json::Value as Json;

	if matches!(
		vr,
		VR::OB | VR::OD | VR::OF | VR::OL | VR::OV | VR::OW | VR::UN
	) {
		return Vec::new();
	}

	match value {
		PrimitiveValue::Empty | PrimitiveValue::U8(_) => Vec::new(),
		PrimitiveValue::I16(values) => values.iter().copied().map(Json::from).collect(),
		PrimitiveValue::U16(values) => values.iter().copied().map(Json::from).collect(),
		PrimitiveValue::I32(values) => values.iter().copied().map(Json::from).collect(),
		PrimitiveValue::U32(values) => values.iter().copied().map(Json::from).collect(),
		PrimitiveValue::I64(values) => values.iter().copied().map(Json::from).collect(),
		PrimitiveValue::U64(values) => values.iter().copied().map(Json::from).collect(),
		PrimitiveValue::F32(values) => values.iter().copied().map(Json::from).collect(),
		PrimitiveValue::F64(values) => values.iter().copied().map(Json::from).collect(),
		PrimitiveValue::Tags(values) => values
			.iter()
			.map(|tag| Json::from(format!("{:04X}{:04X}", tag.group(), tag.element())))
			.collect(),
		_ => value
			.to_multi_str()
			.iter()
			.map(|s| Json::from(s.trim_end_matches([' ', '\0'])))
			.collect(),
	}
}

#[derive(Debug, Error)]
pub enum AttributeError {
	#[error("File ID {file} does not exist")]
	UnknownIdentifier { file: String },
	#[error("The element {coordinate} could not be found")]
	AttributeNotFound { coordinate: TagCoordinate },
	#[error("Stored dataset {file_id} is not a valid DICOM dataset: {source}")]
	CorruptStoredDataset {
		file_id: FileId,
		source: dicom::object::ReadError,
	},
	#[error("Failed to read stored dataset: {0}")]
	StorageReadFailed(#[from] std::io::Error),
	#[error("Reading the stored dataset took longer than {}ms", .timeout.as_millis())]
	Timeout { timeout: Duration },
	#[error("Failed to encode attribute: {0}")]
	Encoding(#[from] serde_json::Error),
	#[error(transparent)]
	Backend { source: anyhow::Error },
}

impl AttributeError {
	pub const fn status(&self) -> StatusCode {
		match self {
			Self::UnknownIdentifier { .. } => StatusCode::BAD_REQUEST,
			Self::AttributeNotFound { .. } => StatusCode::NOT_FOUND,
			Self::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
			Self::CorruptStoredDataset { .. }
			| Self::StorageReadFailed(_)
			| Self::Encoding(_)
			| Self::Backend { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::Uri;
	use dicom::core::value::DataSetSequence;
	use dicom::core::{DataElement, Length};
	use dicom::dictionary_std::tags;
	use dicom::object::InMemDicomObject;
	use serde_json::json;

	#[test]
	fn parse_coordinate_params() {
		let uri = Uri::from_static("http://test?tagGroup=0010&tagElement=0010");
		let Query(params) = Query::<CoordinateParameters>::try_from_uri(&uri).unwrap();
		assert_eq!(
			TagCoordinate::from(params),
			TagCoordinate::new(0x0010, 0x0010)
		);

		let uri = Uri::from_static("http://test?tagElement=0010&tagGroup=7fe0");
		let Query(params) = Query::<CoordinateParameters>::try_from_uri(&uri).unwrap();
		assert_eq!(
			TagCoordinate::from(params),
			TagCoordinate::new(0x7FE0, 0x0010)
		);
	}

	#[test]
	fn reject_malformed_coordinate_params() {
		for uri in [
			"http://test?tagGroup=0010",
			"http://test?tagElement=0010",
			"http://test?tagGroup=XYZ&tagElement=0010",
			"http://test?tagGroup=0010&tagElement=10000",
			"http://test?tagGroup=-1&tagElement=0010",
		] {
			let uri: Uri = uri.parse().unwrap();
			assert!(
				Query::<CoordinateParameters>::try_from_uri(&uri).is_err(),
				"{uri} should be rejected"
			);
		}
	}

	#[test]
	fn attribute_from_string_element() {
		let element =
			DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from("DOE^JOHN"));
		let attribute = Attribute::try_from(&element).unwrap();

		assert_eq!(
			serde_json::to_value(&attribute).unwrap(),
			json!({
				"tag": { "group": 0x0010, "element": 0x0010 },
				"name": "PatientName",
				"vr": "PN",
				"length": 8,
				"value": ["DOE^JOHN"],
			})
		);
	}

	#[test]
	fn attribute_from_multi_valued_elements() {
		let element = DataElement::new(
			tags::IMAGE_TYPE,
			VR::CS,
			PrimitiveValue::Strs(
				vec![String::from("ORIGINAL"), String::from("PRIMARY")].into(),
			),
		);
		let attribute = Attribute::try_from(&element).unwrap();
		assert_eq!(attribute.value, vec![json!("ORIGINAL"), json!("PRIMARY")]);

		let element = DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(512_u16));
		let attribute = Attribute::try_from(&element).unwrap();
		assert_eq!(attribute.vr, "US");
		assert_eq!(attribute.value, vec![json!(512)]);
	}

	#[test]
	fn attribute_omits_binary_values() {
		let element = DataElement::new(
			tags::PIXEL_DATA,
			VR::OB,
			PrimitiveValue::U8(vec![1, 2, 3, 4].into()),
		);
		let attribute = Attribute::try_from(&element).unwrap();
		assert_eq!(attribute.name.as_deref(), Some("PixelData"));
		assert_eq!(attribute.length, Some(4));
		assert!(attribute.value.is_empty());
	}

	#[test]
	fn attribute_from_private_element() {
		let element = DataElement::new(
			dicom::core::Tag(0x0009, 0x1010),
			VR::LO,
			PrimitiveValue::from("ACME"),
		);
		let attribute = Attribute::try_from(&element).unwrap();
		assert_eq!(attribute.name, None);
		assert_eq!(attribute.value, vec![json!("ACME")]);
	}

	#[test]
	fn attribute_from_sequence() {
		let item = InMemDicomObject::from_element_iter([DataElement::new(
			tags::REFERENCED_SOP_INSTANCE_UID,
			VR::UI,
			PrimitiveValue::from("1.2.3"),
		)]);
		let element = DataElement::new(
			tags::REFERENCED_SOP_SEQUENCE,
			VR::SQ,
			DicomValue::Sequence(DataSetSequence::new(vec![item], Length::UNDEFINED)),
		);
		let attribute = Attribute::try_from(&element).unwrap();

		assert_eq!(attribute.vr, "SQ");
		assert_eq!(
			attribute.value,
			vec![json!({ "00081155": { "vr": "UI", "Value": ["1.2.3"] } })]
		);
	}

	#[test]
	fn error_status() {
		assert_eq!(
			AttributeError::UnknownIdentifier {
				file: String::from("nonexistent-id")
			}
			.status(),
			StatusCode::BAD_REQUEST
		);
		assert_eq!(
			AttributeError::AttributeNotFound {
				coordinate: TagCoordinate::new(0x0009, 0x0009)
			}
			.status(),
			StatusCode::NOT_FOUND
		);
	}
}
