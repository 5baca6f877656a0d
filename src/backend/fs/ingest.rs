use crate::api::upload::{IngestError, IngestRequest, IngestResponse, IngestService, IngestSource};
use crate::backend::fs::DatasetStore;
use crate::dataset;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

pub struct FileSystemIngestService {
	store: Arc<DatasetStore>,
	allow_local_paths: bool,
}

impl FileSystemIngestService {
	pub const fn new(store: Arc<DatasetStore>, allow_local_paths: bool) -> Self {
		Self {
			store,
			allow_local_paths,
		}
	}

	async fn read_source(&self, source: IngestSource) -> Result<Bytes, IngestError> {
		match source {
			IngestSource::Payload(bytes) => Ok(bytes),
			IngestSource::LocalPath(_) if !self.allow_local_paths => {
				Err(IngestError::LocalPathsDisabled)
			}
			IngestSource::LocalPath(path) => match fs::read(&path).await {
				Ok(bytes) => Ok(Bytes::from(bytes)),
				Err(source) => Err(IngestError::SourceUnavailable { path, source }),
			},
		}
	}

	/// Parses the dataset on the blocking thread pool.
	async fn validate(bytes: Bytes) -> Result<(), IngestError> {
		let sop_instance_uid = tokio::task::spawn_blocking(move || {
			dataset::parse(&bytes)
				.map(|object| object.meta().media_storage_sop_instance_uid().to_owned())
		})
		.await
		.map_err(|err| IngestError::Backend { source: err.into() })?
		.map_err(|source| IngestError::InvalidDataset { source })?;

		debug!(sop_instance_uid, "Validated dataset");
		Ok(())
	}
}

#[async_trait]
impl IngestService for FileSystemIngestService {
	async fn ingest(&self, request: IngestRequest) -> Result<IngestResponse, IngestError> {
		if request.sources.is_empty() {
			return Err(IngestError::EmptyRequest);
		}

		let mut datasets = Vec::with_capacity(request.sources.len());
		for source in request.sources {
			let bytes = self.read_source(source).await?;
			Self::validate(bytes.clone()).await?;
			datasets.push(bytes);
		}

		let file_ids = self.store.write_all(&datasets).await?;
		for (file_id, bytes) in file_ids.iter().zip(&datasets) {
			info!(%file_id, size = bytes.len(), "Stored dataset");
		}

		Ok(IngestResponse { file_ids })
	}
}
