// src/handlers/image_search.rs

use axum::{
    extract::{rejection::PathRejection, FromRequest, Path, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::permissions::{PermImageSearch, RequirePermission},
    models::image_search::{
        BulkReport, BulkRequest, BulkSettingsForm, SearchPage, SearchPageQuery, SearchRequest,
        SelectionAction, SelectionOutcome, WebcamUploadPayload, WebcamUploadResponse,
        WorklistPage, WorklistQuery, WorklistScope,
    },
    services::image_search::parse_selection_form,
};

const WORKLIST_PATH: &str = "/api/store/onebyone-search-images";

// ---
// Um a um
// ---

#[utoipa::path(
    get,
    path = "/api/store/onebyone-search-images",
    tag = "Busca de imagens",
    params(WorklistQuery),
    responses((status = 200, description = "Worklist de produtos", body = WorklistPage)),
    security(("api_jwt" = []))
)]
pub async fn worklist(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermImageSearch>,
    Query(query): Query<WorklistQuery>,
) -> Result<Json<WorklistPage>, AppError> {
    Ok(Json(app_state.image_search_service.worklist(query).await?))
}

#[utoipa::path(
    get,
    path = "/api/store/onebyone-search-images/{product_id}",
    tag = "Busca de imagens",
    params(("product_id" = Uuid, Path, description = "ID do produto"), SearchPageQuery),
    responses(
        (status = 200, description = "Página de busca (idle)", body = SearchPage),
        (status = 404, description = "Produto não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn search_page(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermImageSearch>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<SearchPageQuery>,
) -> Result<Json<SearchPage>, AppError> {
    let page = app_state
        .image_search_service
        .search_page(product_id, query.scope(), query.saved, query.failed)
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    post,
    path = "/api/store/onebyone-search-images/{product_id}",
    tag = "Busca de imagens",
    params(("product_id" = Uuid, Path, description = "ID do produto")),
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Candidatos (falha do provedor vem em provider_error)", body = SearchPage),
        (status = 400, description = "Parâmetros inválidos"),
        (status = 404, description = "Produto não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn search(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermImageSearch>,
    Path(product_id): Path<Uuid>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchPage>, AppError> {
    Ok(Json(app_state.image_search_service.search(product_id, request).await?))
}

#[utoipa::path(
    post,
    path = "/api/store/save-selected-images",
    tag = "Busca de imagens",
    request_body(
        content = String,
        content_type = "application/x-www-form-urlencoded",
        description = "selected_images=<produto>,<url> (repetido), is_main_<produto>=<url>, next_product_id, skip_product, action, category, below, q"
    ),
    responses(
        (status = 200, description = "Seleção salva", body = SelectionOutcome),
        (status = 303, description = "Redireciona para o próximo produto"),
        (status = 400, description = "Formulário inválido"),
        (status = 404, description = "Produto não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn save_selected_images(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermImageSearch>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let form = parse_selection_form(&pairs)?;
    let scope = form.scope.clone();
    let outcome = app_state.image_search_service.commit_selection(form).await?;

    Ok(match outcome.action {
        SelectionAction::Save => Json(outcome).into_response(),
        SelectionAction::SaveAndNext | SelectionAction::Skip => {
            Redirect::to(&next_location(&outcome, &scope)?).into_response()
        }
    })
}

#[derive(Serialize)]
struct NextPageParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    saved: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    below: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    q: Option<&'a str>,
}

/// Destino do "salvar e próximo" / "pular"; sem próximo, volta para a worklist.
/// Os filtros da worklist seguem na query string.
fn next_location(outcome: &SelectionOutcome, scope: &WorklistScope) -> Result<String, AppError> {
    let counts = outcome.next_product_id.is_some() && outcome.action == SelectionAction::SaveAndNext;
    let params = NextPageParams {
        saved: counts.then_some(outcome.images_added),
        failed: counts.then_some(outcome.errors.len()),
        category: scope.category.as_deref().filter(|c| !c.is_empty()),
        below: scope.below,
        q: scope.q.as_deref().filter(|q| !q.is_empty()),
    };
    let query = serde_urlencoded::to_string(&params)
        .map_err(|e| AppError::InternalServerError(anyhow::anyhow!(e)))?;

    let path = match outcome.next_product_id {
        Some(next) => format!("{}/{}", WORKLIST_PATH, next),
        None => WORKLIST_PATH.to_string(),
    };
    Ok(if query.is_empty() { path } else { format!("{}?{}", path, query) })
}

/// `Form` que responde no formato `{success: false, error}` quando o corpo é rejeitado
/// (campo ausente, corpo que não é formulário, captura acima do limite).
pub struct WebcamForm(pub WebcamUploadPayload);

impl<S> FromRequest<S> for WebcamForm
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Form::<WebcamUploadPayload>::from_request(req, state).await {
            Ok(Form(payload)) => Ok(Self(payload)),
            Err(rejection) => Err(webcam_failure(rejection.status(), rejection.body_text())),
        }
    }
}

fn webcam_failure(status: StatusCode, error: String) -> Response {
    (
        status,
        Json(WebcamUploadResponse {
            success: false,
            image_url: None,
            error: Some(error),
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/api/store/onebyone-search-images/{product_id}/webcam",
    tag = "Busca de imagens",
    params(("product_id" = Uuid, Path, description = "ID do produto")),
    request_body(content = WebcamUploadPayload, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Imagem anexada", body = WebcamUploadResponse),
        (status = 400, description = "Imagem inválida", body = WebcamUploadResponse),
        (status = 404, description = "Produto não encontrado", body = WebcamUploadResponse),
        (status = 413, description = "Captura acima do limite", body = WebcamUploadResponse),
        (status = 422, description = "Formulário sem image_data", body = WebcamUploadResponse)
    ),
    security(("api_jwt" = []))
)]
pub async fn upload_webcam_image(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermImageSearch>,
    product_id: Result<Path<Uuid>, PathRejection>,
    WebcamForm(payload): WebcamForm,
) -> Response {
    let product_id = match product_id {
        Ok(Path(id)) => id,
        Err(rejection) => return webcam_failure(rejection.status(), rejection.body_text()),
    };

    match app_state
        .image_search_service
        .upload_webcam(product_id, &payload.image_data)
        .await
    {
        Ok(image_url) => Json(WebcamUploadResponse {
            success: true,
            image_url: Some(image_url),
            error: None,
        })
        .into_response(),
        Err(e) => {
            let status = e.status_code();
            if status.is_server_error() {
                tracing::error!(%product_id, "falha no upload da webcam: {}", e);
            }
            webcam_failure(status, e.to_string())
        }
    }
}

// ---
// Lote
// ---

#[utoipa::path(
    get,
    path = "/api/store/auto-search-images",
    tag = "Busca de imagens",
    responses((status = 200, description = "Padrões e opções do lote", body = BulkSettingsForm)),
    security(("api_jwt" = []))
)]
pub async fn bulk_settings(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermImageSearch>,
) -> Json<BulkSettingsForm> {
    Json(app_state.image_search_service.bulk_settings())
}

#[utoipa::path(
    post,
    path = "/api/store/auto-search-images",
    tag = "Busca de imagens",
    request_body = BulkRequest,
    responses(
        (status = 200, description = "Relatório do lote", body = BulkReport),
        (status = 400, description = "Parâmetros inválidos")
    ),
    security(("api_jwt" = []))
)]
pub async fn run_bulk(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermImageSearch>,
    Json(request): Json<BulkRequest>,
) -> Result<Json<BulkReport>, AppError> {
    Ok(Json(app_state.image_search_service.run_bulk(request).await?))
}
