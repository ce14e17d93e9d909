pub mod archetype;
pub mod compose;
pub mod config;
pub mod generation;
mod routes;
pub mod state;

use axum::{extract::Request, routing::get, Router, ServiceExt};
use routes::lookbook::{check_run, lookbook_routes};

use state::AppState;
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use tower::{Layer, ServiceBuilder};
use tower_http::cors::{Any, CorsLayer};
use tower_http::{
    normalize_path::NormalizePathLayer, trace::TraceLayer,
    validate_request::ValidateRequestHeaderLayer,
};

pub fn app(app_state: AppState) -> Router {
    let config = app_state.config().clone();

    let auth_routes = Router::new()
        .nest("/lookbook", lookbook_routes())
        .layer(ValidateRequestHeaderLayer::basic(
            &config.username,
            &config.password,
        ));

    // Status polling stays open so a browser page can watch a run without
    // credentials. Payloads are stripped, only lifecycle states leak.
    let preview_route = Router::new()
        .route("/preview/:id", get(check_run))
        .layer(
            CorsLayer::new()
                .allow_headers(Any)
                .allow_origin(Any)
                .allow_methods(Any),
        );

    let app = Router::new()
        .merge(auth_routes)
        .merge(preview_route)
        .route("/health_check", get(routes::health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(Arc::new(app_state));

    #[cfg(debug_assertions)]
    let app = app.layer(
        CorsLayer::new()
            .allow_headers(Any)
            .allow_origin(Any)
            .allow_methods(Any),
    );

    app
}

pub async fn run(app_state: AppState) -> anyhow::Result<()> {
    let config = app_state.config().clone();

    let app = NormalizePathLayer::trim_trailing_slash().layer(app(app_state));

    let addr = SocketAddr::from_str(format!("{}:{}", &config.host, &config.port).as_str())?;

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(signal_shutdown())
        .await?;

    Ok(())
}

async fn signal_shutdown() {
    tokio::signal::ctrl_c()
        .await
        .expect("expect tokio signal ctrl-c");
    tracing::info!("signal shutdown");
}
