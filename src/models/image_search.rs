// src/models/image_search.rs

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::models::catalog::{ImageView, ProductSummary};

// ---
// 1. Filtros da busca (Google Custom Search)
// ---

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImageSize {
    Any,
    Huge,
    Icon,
    #[default]
    Large,
    Medium,
    Small,
    Xlarge,
    Xxlarge,
}

impl ImageSize {
    pub const ALL: [ImageSize; 8] = [
        ImageSize::Any,
        ImageSize::Huge,
        ImageSize::Icon,
        ImageSize::Large,
        ImageSize::Medium,
        ImageSize::Small,
        ImageSize::Xlarge,
        ImageSize::Xxlarge,
    ];

    /// A API espera o tamanho em maiúsculas.
    pub fn param_value(self) -> Option<&'static str> {
        match self {
            ImageSize::Any => None,
            ImageSize::Huge => Some("HUGE"),
            ImageSize::Icon => Some("ICON"),
            ImageSize::Large => Some("LARGE"),
            ImageSize::Medium => Some("MEDIUM"),
            ImageSize::Small => Some("SMALL"),
            ImageSize::Xlarge => Some("XLARGE"),
            ImageSize::Xxlarge => Some("XXLARGE"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Any,
    Clipart,
    Face,
    Lineart,
    Stock,
    #[default]
    Photo,
    Animated,
}

impl ImageType {
    pub const ALL: [ImageType; 7] = [
        ImageType::Any,
        ImageType::Clipart,
        ImageType::Face,
        ImageType::Lineart,
        ImageType::Stock,
        ImageType::Photo,
        ImageType::Animated,
    ];

    pub fn param_value(self) -> Option<&'static str> {
        match self {
            ImageType::Any => None,
            ImageType::Clipart => Some("clipart"),
            ImageType::Face => Some("face"),
            ImageType::Lineart => Some("lineart"),
            ImageType::Stock => Some("stock"),
            ImageType::Photo => Some("photo"),
            ImageType::Animated => Some("animated"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImageColorType {
    #[default]
    Any,
    Color,
    Gray,
    Mono,
}

impl ImageColorType {
    pub const ALL: [ImageColorType; 4] = [
        ImageColorType::Any,
        ImageColorType::Color,
        ImageColorType::Gray,
        ImageColorType::Mono,
    ];

    pub fn param_value(self) -> Option<&'static str> {
        match self {
            ImageColorType::Any => None,
            ImageColorType::Color => Some("color"),
            ImageColorType::Gray => Some("gray"),
            ImageColorType::Mono => Some("mono"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Any,
    Bmp,
    Gif,
    #[default]
    Jpg,
    Png,
    Svg,
    Webp,
}

impl FileType {
    pub const ALL: [FileType; 7] = [
        FileType::Any,
        FileType::Bmp,
        FileType::Gif,
        FileType::Jpg,
        FileType::Png,
        FileType::Svg,
        FileType::Webp,
    ];

    pub fn param_value(self) -> Option<&'static str> {
        match self {
            FileType::Any => None,
            FileType::Bmp => Some("bmp"),
            FileType::Gif => Some("gif"),
            FileType::Jpg => Some("jpg"),
            FileType::Png => Some("png"),
            FileType::Svg => Some("svg"),
            FileType::Webp => Some("webp"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SafeSearch {
    Off,
    #[default]
    Active,
    High,
    Medium,
}

impl SafeSearch {
    pub const ALL: [SafeSearch; 4] = [
        SafeSearch::Off,
        SafeSearch::Active,
        SafeSearch::High,
        SafeSearch::Medium,
    ];

    // "off" é o padrão da API, não precisa ser enviado
    pub fn param_value(self) -> Option<&'static str> {
        match self {
            SafeSearch::Off => None,
            SafeSearch::Active => Some("active"),
            SafeSearch::High => Some("high"),
            SafeSearch::Medium => Some("medium"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SearchFilters {
    #[serde(default)]
    pub img_size: ImageSize,
    #[serde(default)]
    pub img_type: ImageType,
    #[serde(default)]
    pub img_color_type: ImageColorType,
    #[serde(default)]
    pub file_type: FileType,
    #[serde(default)]
    pub safe_search: SafeSearch,
}

impl SearchFilters {
    /// Parâmetros extras da query; filtros "any"/"off" ficam de fora.
    pub fn query_params(&self) -> Vec<(&'static str, &'static str)> {
        [
            ("imgSize", self.img_size.param_value()),
            ("imgType", self.img_type.param_value()),
            ("imgColorType", self.img_color_type.param_value()),
            ("fileType", self.file_type.param_value()),
            ("safe", self.safe_search.param_value()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect()
    }
}

// ---
// 2. Worklist (um a um)
// ---

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorklistFilter {
    pub category_slug: Option<String>,
    /// Só produtos com menos imagens que isso.
    pub below: Option<i64>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: i64,
}

/// Filtros da worklist que acompanham o usuário de produto em produto
/// (query string, campos ocultos do formulário e redirects).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WorklistScope {
    /// Slug da categoria.
    pub category: Option<String>,
    pub below: Option<i64>,
    pub q: Option<String>,
}

impl WorklistScope {
    /// A worklist inteira (sem paginação) sob estes filtros.
    pub fn filter(&self) -> WorklistFilter {
        WorklistFilter {
            category_slug: trimmed(self.category.as_deref()),
            below: self.below,
            search: trimmed(self.q.as_deref()),
            limit: None,
            offset: 0,
        }
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct WorklistQuery {
    /// Slug da categoria.
    pub category: Option<String>,
    pub below: Option<i64>,
    pub q: Option<String>,
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WorklistPage {
    pub page: u32,
    pub per_page: u32,
    pub products: Vec<ProductSummary>,
}

// ---
// 3. Página de busca de um produto (Idle -> Searched)
// ---

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct Candidate {
    pub url: String,
    /// Já existe uma imagem deste produto baixada desta URL.
    pub already_attached: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SearchState {
    Idle,
    Searched {
        query: String,
        candidates: Vec<Candidate>,
        provider_error: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SearchPage {
    pub product: ProductSummary,
    pub default_query: String,
    pub next_product_id: Option<Uuid>,
    pub attached_images: Vec<ImageView>,
    /// Filtros usados para calcular `next_product_id`; o frontend devolve como campos ocultos.
    pub scope: WorklistScope,
    pub state: SearchState,
    pub messages: Vec<String>,
}

/// Contadores deixados pelo redirect de "salvar e próximo".
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct SearchPageQuery {
    pub saved: Option<u32>,
    pub failed: Option<u32>,
    /// Slug da categoria da worklist.
    pub category: Option<String>,
    pub below: Option<i64>,
    pub q: Option<String>,
}

impl SearchPageQuery {
    pub fn scope(&self) -> WorklistScope {
        WorklistScope {
            category: self.category.clone(),
            below: self.below,
            q: self.q.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SearchRequest {
    /// Sobrescreve a query derivada do produto.
    pub query: Option<String>,
    pub num_results: Option<u32>,
    #[serde(flatten)]
    pub filters: SearchFilters,
    #[serde(flatten)]
    pub scope: WorklistScope,
}

// ---
// 4. Commit da seleção
// ---

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SelectionAction {
    Save,
    SaveAndNext,
    Skip,
}

/// Seleção de um produto: URLs marcadas (ordem do formulário) e a escolhida como principal.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSelection {
    pub product_id: Uuid,
    pub urls: Vec<String>,
    pub main_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionForm {
    pub selections: Vec<ProductSelection>,
    pub next_product_id: Option<Uuid>,
    pub action: SelectionAction,
    pub scope: WorklistScope,
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct ImageCommitError {
    pub product_id: Uuid,
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductCommit {
    pub product_id: Uuid,
    pub product_name: String,
    pub images_added: u32,
    pub main_image_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SelectionOutcome {
    pub action: SelectionAction,
    pub products: Vec<ProductCommit>,
    pub images_added: u32,
    pub errors: Vec<ImageCommitError>,
    pub messages: Vec<String>,
    pub next_product_id: Option<Uuid>,
}

// ---
// 5. Busca em lote
// ---

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BulkRequest {
    pub num_results: Option<u32>,
    pub category: Option<String>,
    #[serde(flatten)]
    pub filters: SearchFilters,
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct BulkItemError {
    pub product_id: Uuid,
    pub product_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema, PartialEq)]
pub struct BulkReport {
    pub products_processed_count: u32,
    pub products_skipped_count: u32,
    pub products_failed_count: u32,
    pub total_images_added: u32,
    pub errors: Vec<BulkItemError>,
}

/// Formulário de configuração do lote (valores padrão + opções).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BulkSettingsForm {
    pub num_results: u32,
    pub num_results_min: u32,
    pub num_results_max: u32,
    pub defaults: SearchFilters,
    pub img_size_options: Vec<ImageSize>,
    pub img_type_options: Vec<ImageType>,
    pub img_color_type_options: Vec<ImageColorType>,
    pub file_type_options: Vec<FileType>,
    pub safe_search_options: Vec<SafeSearch>,
}

// ---
// 6. Webcam
// ---

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WebcamUploadPayload {
    /// data:image/png;base64,....
    pub image_data: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebcamUploadResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
