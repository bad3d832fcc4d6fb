use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use super::{batch, handlers, middleware::metrics_middleware, selection, torrents, view, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let ui_dir = state.config().server.ui_dir.clone();

    // API routes
    let api_routes = Router::new()
        // Health, config, engine
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/status", get(handlers::get_status))
        .route("/refresh", post(handlers::refresh))
        .route("/categories", get(handlers::list_categories))
        // Derived view
        .route("/torrents", get(torrents::list_torrents))
        .route("/torrents/{hash}", get(torrents::get_torrent))
        .route("/view", get(view::get_view).put(view::set_view))
        // Selection
        .route(
            "/selection",
            get(selection::get_selection).delete(selection::clear),
        )
        .route("/selection/toggle/{hash}", post(selection::toggle))
        .route("/selection/all", post(selection::select_all))
        // Batches
        .route("/batch", get(batch::current))
        .route("/batch/pause", post(batch::pause))
        .route("/batch/resume", post(batch::resume))
        .route("/batch/delete", post(batch::delete))
        .route("/batch/category", post(batch::set_category))
        // Live updates
        .route("/ws", get(ws::ws_handler));

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state);

    // Serve the UI bundle with SPA fallback
    let router = match ui_dir {
        Some(dir) => {
            let index_path = dir.join("index.html");
            router.fallback_service(ServeDir::new(&dir).fallback(ServeFile::new(index_path)))
        }
        None => router,
    };

    router
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
