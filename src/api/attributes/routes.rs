use crate::api::attributes::AttributeRequest;
use crate::backend::ServiceProvider;
use crate::AppState;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tracing::{error, instrument, warn};

/// HTTP Router for querying stored datasets
#[rustfmt::skip]
pub fn routes() -> Router<AppState> {
	Router::new()
		.route("/file/{file}/attributes", get(attributes))
		.route("/file/{file}/png", get(png))
}

#[instrument(skip_all, fields(file = %request.file, tag = %request.coordinate))]
async fn attributes(provider: ServiceProvider, request: AttributeRequest) -> impl IntoResponse {
	let Some(service) = provider.attributes else {
		return (
			StatusCode::SERVICE_UNAVAILABLE,
			"Attribute endpoint is disabled",
		)
			.into_response();
	};

	match service.attribute(request).await {
		Ok(attribute) => Json(attribute).into_response(),
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

async fn png() -> impl IntoResponse {
	StatusCode::NOT_IMPLEMENTED
}
