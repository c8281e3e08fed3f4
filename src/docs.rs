// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Auth ---
        handlers::auth::register,
        handlers::auth::login,

        // --- Users ---
        handlers::auth::get_me,

        // --- Loja ---
        handlers::catalog::home,
        handlers::catalog::list_products,
        handlers::catalog::products_by_category,
        handlers::catalog::products_by_tag,
        handlers::catalog::product_detail,
        handlers::catalog::category_tree,

        // --- Loja (admin) ---
        handlers::catalog::create_category,
        handlers::catalog::create_tag,
        handlers::catalog::create_product,
        handlers::catalog::create_price,

        // --- Busca de imagens ---
        handlers::image_search::worklist,
        handlers::image_search::search_page,
        handlers::image_search::search,
        handlers::image_search::save_selected_images,
        handlers::image_search::upload_webcam_image,
        handlers::image_search::bulk_settings,
        handlers::image_search::run_bulk,

        // --- Conferência ---
        handlers::audit::list_products,
        handlers::audit::audit_page,
        handlers::audit::submit_audit,
    ),
    components(
        schemas(
            // --- Auth ---
            models::auth::UserRole,
            models::auth::User,
            models::auth::RegisterUserPayload,
            models::auth::LoginUserPayload,
            models::auth::AuthResponse,

            // --- Catálogo ---
            models::catalog::ImageKind,
            models::catalog::Image,
            models::catalog::ImageView,
            models::catalog::Category,
            models::catalog::CategoryNode,
            models::catalog::Tag,
            models::catalog::PriceType,
            models::catalog::Price,
            models::catalog::PriceView,
            models::catalog::Product,
            models::catalog::ProductSummary,
            models::catalog::ProductCard,
            models::catalog::ProductDetail,
            models::catalog::HomePage,
            models::catalog::ProductListPage,
            models::catalog::CreateCategoryPayload,
            models::catalog::CreateTagPayload,
            models::catalog::CreateProductPayload,
            models::catalog::CreatePricePayload,

            // --- Busca de imagens ---
            models::image_search::ImageSize,
            models::image_search::ImageType,
            models::image_search::ImageColorType,
            models::image_search::FileType,
            models::image_search::SafeSearch,
            models::image_search::SearchFilters,
            models::image_search::WorklistScope,
            models::image_search::WorklistPage,
            models::image_search::Candidate,
            models::image_search::SearchState,
            models::image_search::SearchPage,
            models::image_search::SearchRequest,
            models::image_search::SelectionAction,
            models::image_search::ImageCommitError,
            models::image_search::ProductCommit,
            models::image_search::SelectionOutcome,
            models::image_search::BulkRequest,
            models::image_search::BulkItemError,
            models::image_search::BulkReport,
            models::image_search::BulkSettingsForm,
            models::image_search::WebcamUploadPayload,
            models::image_search::WebcamUploadResponse,

            // --- Conferência ---
            models::audit::AuditStatus,
            models::audit::AuditStatusFilter,
            models::audit::ProductAudit,
            models::audit::AuditListEntry,
            models::audit::AuditListPage,
            models::audit::AuditPage,
            models::audit::AuditForm,
        )
    ),
    tags(
        (name = "Auth", description = "Autenticação e Registro"),
        (name = "Users", description = "Dados do Usuário"),
        (name = "Loja", description = "Vitrine: produtos, categorias e tags"),
        (name = "Loja (admin)", description = "Cadastro de catálogo (staff)"),
        (name = "Busca de imagens", description = "Busca um a um, webcam e lote (staff)"),
        (name = "Conferência", description = "Contagem e foto de conferência (worker/staff)")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
