//src/main.rs

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;

mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod middleware;
mod models;
mod services;

use crate::config::{AppState, Settings};
use crate::docs::ApiDoc;
use crate::middleware::auth::auth_guard;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .compact()
        .init();

    let settings = Settings::from_env()?;
    let app_state = AppState::new(settings).await?;

    // Roda as migrações do SQLx na inicialização
    sqlx::migrate!().run(&app_state.db_pool).await?;
    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    if let Some((email, password)) = app_state.settings.bootstrap_staff.clone() {
        app_state.auth_service.ensure_bootstrap_staff(&email, &password).await?;
    }

    let app = build_router(app_state.clone());

    let listener = TcpListener::bind(&app_state.settings.bind_addr).await?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(app_state: AppState) -> Router {
    // Rotas de autenticação (públicas)
    let auth_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login));

    // Rotas de usuário (protegidas pelo middleware)
    let user_routes = Router::new()
        .route("/me", get(handlers::auth::get_me))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // Vitrine
    let store_public_routes = Router::new()
        .route("/home", get(handlers::catalog::home))
        .route("/products", get(handlers::catalog::list_products))
        .route("/category/{slug}", get(handlers::catalog::products_by_category))
        .route("/tag/{slug}", get(handlers::catalog::products_by_tag))
        .route("/product/{slug}", get(handlers::catalog::product_detail))
        .route("/categories", get(handlers::catalog::category_tree));

    // Staff e conferentes; o papel é checado em cada handler
    let store_protected_routes = Router::new()
        .route("/admin/categories", post(handlers::catalog::create_category))
        .route("/admin/tags", post(handlers::catalog::create_tag))
        .route("/admin/products", post(handlers::catalog::create_product))
        .route("/admin/products/{id}/prices", post(handlers::catalog::create_price))
        .route("/onebyone-search-images", get(handlers::image_search::worklist))
        .route(
            "/onebyone-search-images/{product_id}",
            get(handlers::image_search::search_page).post(handlers::image_search::search),
        )
        .route(
            "/onebyone-search-images/{product_id}/webcam",
            post(handlers::image_search::upload_webcam_image),
        )
        .route("/save-selected-images", post(handlers::image_search::save_selected_images))
        .route(
            "/auto-search-images",
            get(handlers::image_search::bulk_settings).post(handlers::image_search::run_bulk),
        )
        .route("/worker/products", get(handlers::audit::list_products))
        .route(
            "/worker/product/{product_id}/audit",
            get(handlers::audit::audit_page).post(handlers::audit::submit_audit),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    let settings = app_state.settings.clone();

    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api/auth", auth_routes)
        .nest("/api/users", user_routes)
        .nest("/api/store", store_public_routes.merge(store_protected_routes))
        .nest_service(&settings.media_url, ServeDir::new(&settings.media_root))
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
