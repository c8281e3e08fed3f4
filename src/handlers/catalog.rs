// src/handlers/catalog.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::permissions::{PermCatalogAdmin, RequirePermission},
    models::catalog::{
        Category, CategoryNode, CreateCategoryPayload, CreatePricePayload, CreateProductPayload,
        CreateTagPayload, HomePage, PageQuery, Price, Product, ProductDetail, ProductListPage,
        ProductListQuery, Tag,
    },
};

// ---
// Vitrine (pública)
// ---

#[utoipa::path(
    get,
    path = "/api/store/home",
    tag = "Loja",
    responses((status = 200, description = "Destaques e categorias", body = HomePage))
)]
pub async fn home(State(app_state): State<AppState>) -> Result<Json<HomePage>, AppError> {
    Ok(Json(app_state.catalog_service.home().await?))
}

#[utoipa::path(
    get,
    path = "/api/store/products",
    tag = "Loja",
    params(ProductListQuery),
    responses(
        (status = 200, description = "Produtos ativos, 12 por página", body = ProductListPage),
        (status = 404, description = "Categoria ou tag não encontrada")
    )
)]
pub async fn list_products(
    State(app_state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<ProductListPage>, AppError> {
    Ok(Json(app_state.catalog_service.product_list(query).await?))
}

#[utoipa::path(
    get,
    path = "/api/store/category/{slug}",
    tag = "Loja",
    params(("slug" = String, Path, description = "Slug da categoria"), PageQuery),
    responses(
        (status = 200, description = "Produtos da categoria", body = ProductListPage),
        (status = 404, description = "Categoria não encontrada")
    )
)]
pub async fn products_by_category(
    State(app_state): State<AppState>,
    Path(slug): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ProductListPage>, AppError> {
    let query = ProductListQuery {
        category: Some(slug),
        tag: None,
        page: page.page,
    };
    Ok(Json(app_state.catalog_service.product_list(query).await?))
}

#[utoipa::path(
    get,
    path = "/api/store/tag/{slug}",
    tag = "Loja",
    params(("slug" = String, Path, description = "Slug da tag"), PageQuery),
    responses(
        (status = 200, description = "Produtos com a tag", body = ProductListPage),
        (status = 404, description = "Tag não encontrada")
    )
)]
pub async fn products_by_tag(
    State(app_state): State<AppState>,
    Path(slug): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ProductListPage>, AppError> {
    let query = ProductListQuery {
        category: None,
        tag: Some(slug),
        page: page.page,
    };
    Ok(Json(app_state.catalog_service.product_list(query).await?))
}

#[utoipa::path(
    get,
    path = "/api/store/product/{slug}",
    tag = "Loja",
    params(("slug" = String, Path, description = "Slug do produto")),
    responses(
        (status = 200, description = "Detalhe do produto", body = ProductDetail),
        (status = 404, description = "Produto não encontrado")
    )
)]
pub async fn product_detail(
    State(app_state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ProductDetail>, AppError> {
    Ok(Json(app_state.catalog_service.product_detail(&slug).await?))
}

#[utoipa::path(
    get,
    path = "/api/store/categories",
    tag = "Loja",
    responses((status = 200, description = "Categorias raiz com filhas", body = Vec<CategoryNode>))
)]
pub async fn category_tree(State(app_state): State<AppState>) -> Result<Json<Vec<CategoryNode>>, AppError> {
    Ok(Json(app_state.catalog_service.category_tree().await?))
}

// ---
// Cadastro (staff)
// ---

#[utoipa::path(
    post,
    path = "/api/store/admin/categories",
    tag = "Loja (admin)",
    request_body = CreateCategoryPayload,
    responses(
        (status = 201, description = "Categoria criada", body = Category),
        (status = 400, description = "Dados inválidos"),
        (status = 409, description = "Nome já existe")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_category(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermCatalogAdmin>,
    Json(payload): Json<CreateCategoryPayload>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    let category = app_state.catalog_service.create_category(payload).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

#[utoipa::path(
    post,
    path = "/api/store/admin/tags",
    tag = "Loja (admin)",
    request_body = CreateTagPayload,
    responses(
        (status = 201, description = "Tag criada", body = Tag),
        (status = 409, description = "Nome já existe")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_tag(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermCatalogAdmin>,
    Json(payload): Json<CreateTagPayload>,
) -> Result<(StatusCode, Json<Tag>), AppError> {
    let tag = app_state.catalog_service.create_tag(payload).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

#[utoipa::path(
    post,
    path = "/api/store/admin/products",
    tag = "Loja (admin)",
    request_body = CreateProductPayload,
    responses(
        (status = 201, description = "Produto criado", body = Product),
        (status = 404, description = "Categoria não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_product(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermCatalogAdmin>,
    Json(payload): Json<CreateProductPayload>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let product = app_state.catalog_service.create_product(payload).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

#[utoipa::path(
    post,
    path = "/api/store/admin/products/{id}/prices",
    tag = "Loja (admin)",
    params(("id" = Uuid, Path, description = "ID do produto")),
    request_body = CreatePricePayload,
    responses(
        (status = 201, description = "Preço criado", body = Price),
        (status = 404, description = "Produto não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_price(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermCatalogAdmin>,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<CreatePricePayload>,
) -> Result<(StatusCode, Json<Price>), AppError> {
    let price = app_state.catalog_service.create_price(product_id, payload).await?;
    Ok((StatusCode::CREATED, Json(price)))
}
