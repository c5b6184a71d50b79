pub mod api;
pub mod config;
pub mod handlers;
pub mod services;

use crate::config::ServerConfig;
use crate::services::analyzer::AnalyzerBridge;
use crate::services::stager::Stager;
use axum::{Router, extract::DefaultBodyLimit, routing::post};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

#[derive(Clone)]
pub struct AppState {
    pub stager: Arc<Stager>,
    pub analyzer: Arc<AnalyzerBridge>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn from_config(config: ServerConfig) -> Self {
        let stager = Arc::new(Stager::new(&config.upload_dir, config.max_upload_bytes));
        let analyzer = Arc::new(AnalyzerBridge::new(
            config.analyzer_program.clone(),
            config.analyzer_args.clone(),
            std::time::Duration::from_secs(config.analyzer_timeout_secs),
        ));
        Self {
            stager,
            analyzer,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    // The stager enforces the real ceiling; the transport limit only needs to
    // pass the body through with room for multipart framing.
    let body_limit = (state.config.max_upload_bytes as usize) * 2;

    let mut app = Router::new()
        .route("/api/analyze", post(handlers::analyze::analyze_image))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    // In production the prebuilt frontend bundle is served on every other
    // path, with index.html as the SPA fallback.
    if state.config.serve_static {
        let static_dir = std::path::Path::new(&state.config.static_dir);
        let spa = ServeDir::new(static_dir)
            .not_found_service(ServeFile::new(static_dir.join("index.html")));
        app = app.fallback_service(spa);
    }

    app
}
