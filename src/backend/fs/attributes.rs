use crate::api::attributes::{Attribute, AttributeError, AttributeRequest, AttributeService};
use crate::backend::fs::DatasetStore;
use crate::dataset;
use crate::types::{FileId, TagCoordinate};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Answers attribute queries by re-reading and re-parsing the stored dataset on every request.
pub struct FileSystemAttributeService {
	store: Arc<DatasetStore>,
	timeout: Duration,
}

impl FileSystemAttributeService {
	pub const fn new(store: Arc<DatasetStore>, timeout: Duration) -> Self {
		Self { store, timeout }
	}

	async fn lookup(
		&self,
		file_id: FileId,
		coordinate: TagCoordinate,
	) -> Result<Attribute, AttributeError> {
		let bytes = match self.store.read(file_id).await {
			Ok(bytes) => bytes,
			Err(err) if err.kind() == io::ErrorKind::NotFound => {
				return Err(AttributeError::UnknownIdentifier {
					file: file_id.to_string(),
				});
			}
			Err(err) => return Err(AttributeError::StorageReadFailed(err)),
		};
		trace!(%file_id, size = bytes.len(), "Read stored dataset");

		// The timeout only abandons the task, parsing itself can't be interrupted.
		tokio::task::spawn_blocking(move || -> Result<Attribute, AttributeError> {
			let object = dataset::parse(&bytes)
				.map_err(|source| AttributeError::CorruptStoredDataset { file_id, source })?;
			let element = dataset::find_element(&object, coordinate)
				.ok_or(AttributeError::AttributeNotFound { coordinate })?;
			Ok(Attribute::try_from(&element)?)
		})
		.await
		.map_err(|err| AttributeError::Backend { source: err.into() })?
	}
}

#[async_trait]
impl AttributeService for FileSystemAttributeService {
	async fn attribute(&self, request: AttributeRequest) -> Result<Attribute, AttributeError> {
		let Ok(file_id) = request.file.parse::<FileId>() else {
			return Err(AttributeError::UnknownIdentifier { file: request.file });
		};

		tokio::time::timeout(self.timeout, self.lookup(file_id, request.coordinate))
			.await
			.map_err(|_| AttributeError::Timeout {
				timeout: self.timeout,
			})?
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dataset::tests::sample_dataset;
	use axum::http::StatusCode;
	use serde_json::json;
	use std::path::Path;

	async fn store_with(root: &Path, bytes: &[u8]) -> (Arc<DatasetStore>, FileId) {
		let store = Arc::new(DatasetStore::new(root));
		let file_id = store.write(bytes).await.unwrap();
		(store, file_id)
	}

	fn request(file: impl ToString, group: u16, element: u16) -> AttributeRequest {
		AttributeRequest {
			file: file.to_string(),
			coordinate: TagCoordinate::new(group, element),
		}
	}

	#[tokio::test]
	async fn query_patient_name() {
		let dir = tempfile::tempdir().unwrap();
		let (store, file_id) = store_with(dir.path(), &sample_dataset("DOE^JOHN")).await;
		let service = FileSystemAttributeService::new(store, Duration::from_secs(10));

		let attribute = service
			.attribute(request(file_id, 0x0010, 0x0010))
			.await
			.unwrap();
		assert_eq!(attribute.tag, TagCoordinate::new(0x0010, 0x0010));
		assert_eq!(attribute.vr, "PN");
		assert_eq!(attribute.name.as_deref(), Some("PatientName"));
		assert_eq!(attribute.value, vec![json!("DOE^JOHN")]);
	}

	#[tokio::test]
	async fn repeated_queries_are_identical() {
		let dir = tempfile::tempdir().unwrap();
		let dataset = sample_dataset("DOE^JOHN");
		let (store, file_id) = store_with(dir.path(), &dataset).await;
		let service = FileSystemAttributeService::new(Arc::clone(&store), Duration::from_secs(10));

		let first = service.attribute(request(file_id, 0x0028, 0x0010)).await.unwrap();
		let second = service.attribute(request(file_id, 0x0028, 0x0010)).await.unwrap();
		assert_eq!(first, second);
		assert_eq!(first.value, vec![json!(512)]);
		assert_eq!(store.read(file_id).await.unwrap(), dataset);
	}

	#[tokio::test]
	async fn query_meta_group() {
		let dir = tempfile::tempdir().unwrap();
		let (store, file_id) = store_with(dir.path(), &sample_dataset("DOE^JOHN")).await;
		let service = FileSystemAttributeService::new(store, Duration::from_secs(10));

		let attribute = service
			.attribute(request(file_id, 0x0002, 0x0003))
			.await
			.unwrap();
		assert_eq!(attribute.vr, "UI");
		assert_eq!(
			attribute.value,
			vec![json!(crate::dataset::tests::SOP_INSTANCE_UID)]
		);
	}

	#[tokio::test]
	async fn missing_attribute() {
		let dir = tempfile::tempdir().unwrap();
		let (store, file_id) = store_with(dir.path(), &sample_dataset("DOE^JOHN")).await;
		let service = FileSystemAttributeService::new(store, Duration::from_secs(10));

		let err = service
			.attribute(request(file_id, 0x0009, 0x0009))
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			AttributeError::AttributeNotFound { coordinate } if coordinate == TagCoordinate::new(0x0009, 0x0009)
		));
	}

	#[tokio::test]
	async fn unknown_identifier() {
		let dir = tempfile::tempdir().unwrap();
		let store = Arc::new(DatasetStore::new(dir.path()));
		let service = FileSystemAttributeService::new(store, Duration::from_secs(10));

		let err = service
			.attribute(request("nonexistent-id", 0x0010, 0x0010))
			.await
			.unwrap_err();
		assert!(matches!(err, AttributeError::UnknownIdentifier { .. }));

		let err = service
			.attribute(request(FileId::new(), 0x0010, 0x0010))
			.await
			.unwrap_err();
		assert!(matches!(err, AttributeError::UnknownIdentifier { .. }));
	}

	#[tokio::test]
	async fn corrupt_stored_dataset() {
		let dir = tempfile::tempdir().unwrap();
		let (store, file_id) = store_with(dir.path(), b"no longer a dataset").await;
		let service = FileSystemAttributeService::new(store, Duration::from_secs(10));

		let err = service
			.attribute(request(file_id, 0x0010, 0x0010))
			.await
			.unwrap_err();
		assert!(matches!(err, AttributeError::CorruptStoredDataset { .. }));
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn query_timeout() {
		let dir = tempfile::tempdir().unwrap();
		let store = Arc::new(DatasetStore::new(dir.path()));
		store.prepare().await.unwrap();

		// Reading a FIFO blocks until a writer opens it, so the lookup can't complete
		let file_id = FileId::new();
		let fifo = store.path_of(file_id);
		let status = std::process::Command::new("mkfifo")
			.arg(&fifo)
			.status()
			.unwrap();
		assert!(status.success());

		let service = FileSystemAttributeService::new(store, Duration::ZERO);
		let err = service
			.attribute(request(file_id, 0x0010, 0x0010))
			.await
			.unwrap_err();
		assert!(matches!(err, AttributeError::Timeout { .. }));
		assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

		// Unblock the abandoned read so the blocking pool can shut down
		drop(
			std::fs::OpenOptions::new()
				.write(true)
				.open(&fifo)
				.unwrap(),
		);
	}
}
