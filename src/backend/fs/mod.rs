//! This module contains the filesystem backend.
//! Datasets are kept in a flat directory, one read-only file per dataset named by its [`FileId`].
//! Files are assembled in a staging directory below the storage root and linked into place
//! once complete, so a file name in the storage root always refers to a complete dataset.

pub mod attributes;
pub mod ingest;

use crate::types::FileId;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{trace, warn};

pub use attributes::FileSystemAttributeService;
pub use ingest::FileSystemIngestService;

const STAGING_DIR: &str = ".staging";

#[derive(Debug)]
pub struct DatasetStore {
	root: PathBuf,
}

impl DatasetStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn path_of(&self, file_id: FileId) -> PathBuf {
		self.root.join(file_id.to_string())
	}

	fn staging_path_of(&self, file_id: FileId) -> PathBuf {
		self.root.join(STAGING_DIR).join(file_id.to_string())
	}

	/// Creates the storage root and its staging directory if they do not exist yet.
	pub async fn prepare(&self) -> io::Result<()> {
		fs::create_dir_all(self.root.join(STAGING_DIR)).await
	}

	pub async fn read(&self, file_id: FileId) -> io::Result<Vec<u8>> {
		fs::read(self.path_of(file_id)).await
	}

	/// Stores `bytes` under a new identifier.
	///
	/// The file becomes visible under its identifier only after it has been completely written,
	/// flushed and made read-only. On failure nothing is left behind.
	pub async fn write(&self, bytes: &[u8]) -> io::Result<FileId> {
		let file_id = FileId::new();
		self.write_as(file_id, bytes).await?;
		Ok(file_id)
	}

	/// Stores every dataset under a new identifier, or none of them.
	/// The identifiers are returned in the order of `datasets`.
	pub async fn write_all<B: AsRef<[u8]>>(&self, datasets: &[B]) -> io::Result<Vec<FileId>> {
		let file_ids: Vec<FileId> = datasets.iter().map(|_| FileId::new()).collect();
		self.write_all_as(&file_ids, datasets).await?;
		Ok(file_ids)
	}

	async fn write_all_as<B: AsRef<[u8]>>(
		&self,
		file_ids: &[FileId],
		datasets: &[B],
	) -> io::Result<()> {
		for (index, (&file_id, bytes)) in file_ids.iter().zip(datasets).enumerate() {
			if let Err(err) = self.write_as(file_id, bytes.as_ref()).await {
				for &written in &file_ids[..index] {
					self.discard(written).await;
				}
				return Err(err);
			}
		}
		Ok(())
	}

	async fn write_as(&self, file_id: FileId, bytes: &[u8]) -> io::Result<()> {
		self.prepare().await?;

		let staging_path = self.staging_path_of(file_id);
		let target_path = self.path_of(file_id);

		if let Err(err) = Self::stage(&staging_path, bytes).await {
			Self::remove_quietly(&staging_path).await;
			return Err(err);
		}

		// Unlike rename, hard_link fails instead of replacing an existing file.
		let linked = fs::hard_link(&staging_path, &target_path).await;
		Self::remove_quietly(&staging_path).await;
		linked?;

		trace!(%file_id, path = %target_path.display(), "Committed dataset");
		Ok(())
	}

	async fn stage(path: &Path, bytes: &[u8]) -> io::Result<()> {
		let mut file = fs::OpenOptions::new()
			.write(true)
			.create_new(true)
			.open(path)
			.await?;
		file.write_all(bytes).await?;
		file.sync_all().await?;

		let mut permissions = file.metadata().await?.permissions();
		permissions.set_readonly(true);
		file.set_permissions(permissions).await
	}

	/// Removes a dataset whose identifier was never handed out.
	async fn discard(&self, file_id: FileId) {
		Self::remove_quietly(&self.path_of(file_id)).await;
	}

	async fn remove_quietly(path: &Path) {
		if let Err(err) = fs::remove_file(path).await {
			if err.kind() != io::ErrorKind::NotFound {
				warn!("Failed to remove {}: {err}", path.display());
			}
		}
	}
}
