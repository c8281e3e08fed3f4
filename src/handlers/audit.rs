// src/handlers/audit.rs

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        permissions::{PermAudit, RequirePermission},
    },
    models::audit::{AuditForm, AuditListPage, AuditListQuery, AuditPage, AuditSubmission, UploadedPhoto},
};

#[utoipa::path(
    get,
    path = "/api/store/worker/products",
    tag = "Conferência",
    params(AuditListQuery),
    responses((status = 200, description = "Produtos e estado da conferência", body = AuditListPage)),
    security(("api_jwt" = []))
)]
pub async fn list_products(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermAudit>,
    Query(query): Query<AuditListQuery>,
) -> Result<Json<AuditListPage>, AppError> {
    Ok(Json(app_state.audit_service.list(query).await?))
}

#[utoipa::path(
    get,
    path = "/api/store/worker/product/{product_id}/audit",
    tag = "Conferência",
    params(("product_id" = Uuid, Path, description = "ID do produto")),
    responses(
        (status = 200, description = "Estado da conferência", body = AuditPage),
        (status = 404, description = "Produto não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn audit_page(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermAudit>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<AuditPage>, AppError> {
    Ok(Json(app_state.audit_service.page(product_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/store/worker/product/{product_id}/audit",
    tag = "Conferência",
    params(("product_id" = Uuid, Path, description = "ID do produto")),
    request_body(content = AuditForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Conferência registrada", body = AuditPage),
        (status = 400, description = "Quantidade ou foto inválida"),
        (status = 404, description = "Produto não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn submit_audit(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    _guard: RequirePermission<PermAudit>,
    Path(product_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<AuditPage>, AppError> {
    let mut submission = AuditSubmission::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("quantity_recorded") => {
                submission.quantity_recorded = Some(field.text().await.map_err(multipart_error)?);
            }
            Some("photo_taken_upload") => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                // Navegadores mandam o campo vazio quando nenhum arquivo é escolhido
                if !bytes.is_empty() {
                    submission.photo = Some(UploadedPhoto {
                        file_name,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    let page = app_state.audit_service.submit(product_id, user.id, submission).await?;
    Ok(Json(page))
}

fn multipart_error(e: MultipartError) -> AppError {
    AppError::field("form", "multipart", format!("Formulário inválido: {}", e.body_text()))
}
