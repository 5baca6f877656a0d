use crate::api::attributes::AttributeService;
use crate::api::upload::IngestService;
use crate::AppState;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

pub mod fs;

pub struct ServiceProvider {
	pub ingest: Box<dyn IngestService>,
	/// `None` if the attribute endpoint is disabled.
	pub attributes: Option<Box<dyn AttributeService>>,
}

impl<S> FromRequestParts<S> for ServiceProvider
where
	AppState: FromRef<S>,
	S: Send + Sync,
{
	type Rejection = Infallible;

	async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
		use crate::backend::fs::{FileSystemAttributeService, FileSystemIngestService};

		let state = AppState::from_ref(state);
		let storage = &state.config.storage;

		let ingest = Box::new(FileSystemIngestService::new(
			Arc::clone(&state.store),
			storage.allow_local_paths,
		));

		let attributes: Option<Box<dyn AttributeService>> = if storage.attributes {
			Some(Box::new(FileSystemAttributeService::new(
				Arc::clone(&state.store),
				Duration::from_millis(storage.query_timeout),
			)))
		} else {
			None
		};

		Ok(Self { ingest, attributes })
	}
}
