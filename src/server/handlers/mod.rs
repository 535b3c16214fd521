use axum::{Router, routing::any};
use std::sync::Arc;

use crate::error::ServiceError;
use crate::server::AppState;
use crate::shim::Shim;

mod dispatch;

/// One axum route per pattern of the shim's route table, served both at the
/// root and under `/api`. Method checks happen in the shim.
pub fn routes(shim: &Shim) -> Router<Arc<AppState>> {
    let mut api = Router::new();
    for pattern in shim.routes().patterns() {
        api = api.route(&format!("/{pattern}"), any(dispatch::dispatch));
    }

    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .fallback(not_found)
}

async fn not_found(method: axum::http::Method, uri: axum::http::Uri) -> ServiceError {
    ServiceError::UnknownEndpoint {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}
