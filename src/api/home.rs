use crate::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

pub fn routes() -> Router<AppState> {
	Router::new().route("/", get(index))
}

async fn index(State(state): State<AppState>) -> impl IntoResponse {
	let mut banner = format!(
		"This server is running dicom-depot (v{})",
		env!("CARGO_PKG_VERSION")
	);
	if !state.config.storage.attributes {
		banner.push_str(" with the attribute endpoint disabled");
	}
	banner
}
