use crate::api::upload::{FileUploadResponse, IngestResponse, UploadPayload};
use crate::backend::ServiceProvider;
use crate::AppState;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use tracing::{error, info, instrument, warn};

/// HTTP Router for uploading datasets
pub fn routes() -> Router<AppState> {
	Router::new().route("/upload", post(upload))
}

#[instrument(skip_all)]
async fn upload(provider: ServiceProvider, payload: UploadPayload) -> impl IntoResponse {
	let multipart = payload.is_multipart();

	match provider.ingest.ingest(payload.into_request()).await {
		Ok(IngestResponse { file_ids }) => {
			info!(count = file_ids.len(), "Stored datasets");
			let mut responses: Vec<FileUploadResponse> = file_ids
				.iter()
				.map(|file_id| FileUploadResponse {
					file_id: file_id.to_string(),
				})
				.collect();

			if multipart || responses.len() != 1 {
				Json(responses).into_response()
			} else {
				Json(responses.remove(0)).into_response()
			}
		}
		Err(err) => {
			let status = err.status();
			if status.is_server_error() {
				error!("{err}");
			} else {
				warn!("{err}");
			}
			(status, err.to_string()).into_response()
		}
	}
}
