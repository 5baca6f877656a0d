//! Parsing and element lookup shared by the ingest and query paths.

use crate::types::TagCoordinate;
use dicom::core::{PrimitiveValue, Tag, VR};
use dicom::dictionary_std::tags;
use dicom::object::mem::InMemElement;
use dicom::object::{DefaultDicomObject, FileDicomObject, ReadError};

const PREAMBLE_LENGTH: usize = 128;
const MAGIC_CODE: &[u8; 4] = b"DICM";

/// Parses a complete DICOM file from memory.
///
/// The 128-byte preamble is optional. The `DICM` magic code, the file meta group and a data set
/// decodable with the announced transfer syntax are required.
pub fn parse(bytes: &[u8]) -> Result<DefaultDicomObject, ReadError> {
	let stream = match bytes.get(PREAMBLE_LENGTH..PREAMBLE_LENGTH + MAGIC_CODE.len()) {
		Some(magic) if magic == MAGIC_CODE => &bytes[PREAMBLE_LENGTH..],
		_ => bytes,
	};
	FileDicomObject::from_reader(stream)
}

/// Looks up the element at `coordinate`, including the file meta group (0002,xxxx).
pub fn find_element(object: &DefaultDicomObject, coordinate: TagCoordinate) -> Option<InMemElement> {
	let tag = Tag::from(coordinate);
	if tag.group() == 0x0002 {
		return meta_element(object, tag);
	}
	object.get(tag).cloned()
}

fn meta_element(object: &DefaultDicomObject, tag: Tag) -> Option<InMemElement> {
	let meta = object.meta();
	let (vr, value) = match tag {
		tags::FILE_META_INFORMATION_GROUP_LENGTH => (
			VR::UL,
			PrimitiveValue::from(meta.information_group_length),
		),
		tags::MEDIA_STORAGE_SOP_CLASS_UID => (
			VR::UI,
			PrimitiveValue::from(meta.media_storage_sop_class_uid()),
		),
		tags::MEDIA_STORAGE_SOP_INSTANCE_UID => (
			VR::UI,
			PrimitiveValue::from(meta.media_storage_sop_instance_uid()),
		),
		tags::TRANSFER_SYNTAX_UID => (VR::UI, PrimitiveValue::from(meta.transfer_syntax())),
		tags::IMPLEMENTATION_CLASS_UID => (
			VR::UI,
			PrimitiveValue::from(meta.implementation_class_uid.trim_end_matches('\0')),
		),
		tags::IMPLEMENTATION_VERSION_NAME => (
			VR::SH,
			PrimitiveValue::from(meta.implementation_version_name.as_deref()?.trim_end()),
		),
		tags::SOURCE_APPLICATION_ENTITY_TITLE => (
			VR::AE,
			PrimitiveValue::from(meta.source_application_entity_title.as_deref()?.trim_end()),
		),
		_ => return None,
	};
	Some(InMemElement::new(tag, vr, value))
}
