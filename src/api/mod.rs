use crate::AppState;
use axum::Router;

pub mod attributes;
mod home;
pub mod upload;

pub fn routes(base_path: &str) -> Router<AppState> {
	let router = Router::new()
		.merge(home::routes())
		.merge(upload::routes())
		.merge(attributes::routes());

	// axum no longer supports nesting at the root
	match base_path {
		"/" | "" => router,
		base_path => Router::new().nest(base_path, router),
	}
}
