use crate::types::FileId;
use crate::utils::multipart::DicomMultipart;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::rejection::LengthLimitError;
use axum::extract::{FromRequest, Json, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, warn};

/// Validates datasets and stores them under freshly generated identifiers.
#[async_trait]
pub trait IngestService: Send + Sync {
	/// Either every source of the request is stored or none is.
	/// The returned identifiers are in the order of [`IngestRequest::sources`].
	async fn ingest(&self, request: IngestRequest) -> Result<IngestResponse, IngestError>;
}

pub struct IngestRequest {
	pub sources: Vec<IngestSource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestSource {
	/// The dataset itself, as received in the request body.
	Payload(Bytes),
	/// A file on the server that contains the dataset.
	LocalPath(PathBuf),
}

#[derive(Debug)]
pub struct IngestResponse {
	pub file_ids: Vec<FileId>,
}

#[derive(Debug, Error)]
pub enum IngestError {
	#[error("Failed to read {}: {source}", .path.display())]
	SourceUnavailable {
		path: PathBuf,
		source: std::io::Error,
	},
	#[error("A valid DICOM dataset is expected: {source}")]
	InvalidDataset { source: dicom::object::ReadError },
	#[error("Failed to store dataset: {0}")]
	StorageWriteFailed(#[from] std::io::Error),
	#[error("Ingesting files from the server's file system is disabled")]
	LocalPathsDisabled,
	#[error("The request does not contain a dataset")]
	EmptyRequest,
	#[error("The file exceeds the configured upload size limit")]
	UploadLimitExceeded,
	#[error(transparent)]
	Stream(multer::Error),
	#[error(transparent)]
	Backend { source: anyhow::Error },
}

impl IngestError {
	pub const fn status(&self) -> StatusCode {
		match self {
			Self::SourceUnavailable { .. } | Self::InvalidDataset { .. } | Self::EmptyRequest => {
				StatusCode::BAD_REQUEST
			}
			Self::LocalPathsDisabled => StatusCode::FORBIDDEN,
			Self::UploadLimitExceeded => StatusCode::PAYLOAD_TOO_LARGE,
			Self::StorageWriteFailed(_) | Self::Stream(_) | Self::Backend { .. } => {
				StatusCode::INTERNAL_SERVER_ERROR
			}
		}
	}
}

impl From<multer::Error> for IngestError {
	fn from(err: multer::Error) -> Self {
		if let multer::Error::StreamReadFailed(stream_error) = &err {
			let is_limit_exceeded = stream_error
				.downcast_ref::<axum::Error>()
				.and_then(std::error::Error::source)
				.and_then(|err| err.downcast_ref::<LengthLimitError>())
				.is_some();

			if is_limit_exceeded {
				warn!("Upload limit exceeded.");
				return Self::UploadLimitExceeded;
			}
		}
		error!("Failed to read multipart stream: {err:?}");
		Self::Stream(err)
	}
}

/// Body of an `application/json` upload.
#[derive(Debug, Deserialize, Serialize)]
pub struct FileUploadRequest {
	pub file: PathBuf,
}

/// Body of a successful upload, one per stored dataset.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct FileUploadResponse {
	#[serde(rename = "fileID")]
	pub file_id: String,
}

/// The shape of an upload request, determined by its `Content-Type`.
pub enum UploadPayload {
	/// `application/dicom`: the body is a single dataset.
	Dicom(Bytes),
	/// `multipart/related; type="application/dicom"`: one dataset per part.
	Multipart(Vec<Bytes>),
	/// `application/json`: the body names a file on the server.
	LocalFile(FileUploadRequest),
}

impl UploadPayload {
	pub fn into_request(self) -> IngestRequest {
		let sources = match self {
			Self::Dicom(bytes) => vec![IngestSource::Payload(bytes)],
			Self::Multipart(parts) => parts.into_iter().map(IngestSource::Payload).collect(),
			Self::LocalFile(FileUploadRequest { file }) => vec![IngestSource::LocalPath(file)],
		};
		IngestRequest { sources }
	}

	pub const fn is_multipart(&self) -> bool {
		matches!(self, Self::Multipart(_))
	}
}

#[derive(Debug, Error)]
pub enum UploadRejection {
	#[error("Content-Type missing")]
	MissingContentType,
	#[error("Content-Type `{0}` is not supported, expected application/dicom, multipart/related or application/json")]
	UnsupportedContentType(String),
	#[error("Invalid `boundary` for `multipart/related` request")]
	InvalidBoundary,
	#[error(transparent)]
	Ingest(#[from] IngestError),
}

impl IntoResponse for UploadRejection {
	fn into_response(self) -> Response {
		let status = match &self {
			Self::MissingContentType | Self::UnsupportedContentType(_) => {
				StatusCode::UNSUPPORTED_MEDIA_TYPE
			}
			Self::InvalidBoundary => StatusCode::BAD_REQUEST,
			Self::Ingest(err) => err.status(),
		};
		(status, self.to_string()).into_response()
	}
}

impl<S> FromRequest<S> for UploadPayload
where
	S: Send + Sync,
{
	type Rejection = Response;

	async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
		let content_type = request
			.headers()
			.get(CONTENT_TYPE)
			.map(HeaderValue::to_str)
			.and_then(Result::ok)
			.map(str::to_owned)
			.ok_or_else(|| UploadRejection::MissingContentType.into_response())?;

		let Ok(mime) = content_type.parse::<mime::Mime>() else {
			return Err(UploadRejection::UnsupportedContentType(content_type).into_response());
		};

		match mime.essence_str().to_ascii_lowercase().as_str() {
			"application/dicom" => {
				let bytes = Bytes::from_request(request, state)
					.await
					.map_err(IntoResponse::into_response)?;
				Ok(Self::Dicom(bytes))
			}
			"multipart/related" => {
				let multipart = DicomMultipart::from_request(request, state)
					.await
					.map_err(|_| UploadRejection::InvalidBoundary.into_response())?;
				let parts = multipart
					.collect_parts()
					.await
					.map_err(|err| UploadRejection::from(IngestError::from(err)).into_response())?;
				Ok(Self::Multipart(parts))
			}
			"application/json" => {
				let Json(body) = Json::<FileUploadRequest>::from_request(request, state)
					.await
					.map_err(|rejection| {
						(StatusCode::BAD_REQUEST, rejection.body_text()).into_response()
					})?;
				Ok(Self::LocalFile(body))
			}
			_ => Err(UploadRejection::UnsupportedContentType(content_type).into_response()),
		}
	}
}
