pub mod handlers;

use axum::Router;
use std::sync::Arc;

use crate::config::Settings;
use crate::error::Result as AppResult;
use crate::service::MockService;
use crate::shim::{RouteTable, Shim};
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub config: Settings,
    pub shim: Arc<Shim>,
}

/// Builds store, service and shim from `config`.
pub fn build_shim(config: &Settings) -> AppResult<Arc<Shim>> {
    let store = Arc::new(Store::from_config(&config.storage, config.catalog()));
    let service = Arc::new(MockService::from_settings(config, store)?);
    let routes = RouteTable::standard()?;
    Ok(Arc::new(Shim::new(service, routes, &config.shim)?))
}

pub async fn create_app(config: Settings) -> AppResult<Router> {
    let shim = build_shim(&config)?;
    // Touch the slot once so a fresh data dir holds the default document.
    let doc = shim.service().store().load().await;
    tracing::info!(
        "Store ready: {} subscriptions, {} payments, {} questions",
        doc.subscriptions.len(),
        doc.payments.len(),
        doc.questions.len()
    );

    let app_state = AppState { config, shim };
    Ok(with_layers(handlers::routes(&app_state.shim).with_state(Arc::new(app_state))))
}

fn with_layers(app: Router) -> Router {
    use axum::http::{Method, header};
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    // Mini-app pages are served from another origin.
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(Any);
    app.layer(cors).layer(TraceLayer::new_for_http())
}
