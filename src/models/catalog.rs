// src/models/catalog.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

// --- 1. Imagens ---
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "image_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Product,
    Category,
    Audit,
    Barcode,
    Qrcode,
    Preview,
    Packaging,
    Logo,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Image {
    pub id: Uuid,
    pub name: Option<String>,
    /// Caminho relativo à raiz de mídia (ex: "images/widget-42_1_20260101_120000_ab12cd.jpg")
    pub file_path: String,
    pub alt_text: Option<String>,
    pub description: Option<String>,
    pub kind: ImageKind,
    #[schema(example = "1024x768")]
    pub resolution: Option<String>,
    pub size_kb: Option<i32>,
    #[schema(example = "jpeg")]
    pub format: Option<String>,
    #[schema(example = "google")]
    pub source_provider: Option<String>,
    pub source_query: Option<String>,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// O que é gravado ao anexar uma imagem nova.
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub name: Option<String>,
    pub file_path: String,
    pub alt_text: Option<String>,
    pub description: Option<String>,
    pub kind: ImageKind,
    pub resolution: Option<String>,
    pub size_kb: Option<i32>,
    pub format: Option<String>,
    pub source_provider: Option<String>,
    pub source_query: Option<String>,
    pub source_url: Option<String>,
}

/// Imagem pronta para o frontend (com URL pública).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ImageView {
    pub id: Uuid,
    pub url: String,
    pub alt_text: Option<String>,
    pub is_main: bool,
    pub source_url: Option<String>,
}

// --- 2. Categorias ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub image_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Categoria raiz com um nível de filhas (o que a navegação exibe).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<Category>,
}

// --- 3. Tags ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- 4. Preços ---
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default, ToSchema)]
#[sqlx(type_name = "price_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    Selling,
    Purchase,
    #[default]
    Regular,
    Discount,
    Wholesale,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Price {
    pub id: Uuid,
    pub product_id: Uuid,
    pub price_type: PriceType,
    #[schema(example = "19.90")]
    pub amount: Decimal,
    #[schema(example = "USD")]
    pub currency: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Preço atual = o preço ativo mais recente (created_at); empate -> maior id.
pub fn current_price(prices: &[Price]) -> Option<&Price> {
    prices
        .iter()
        .filter(|p| p.is_active)
        .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PriceView {
    pub amount: Decimal,
    pub currency: String,
}

// --- 5. Produtos ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    #[schema(example = "ART-0042")]
    pub article_number: Option<String>,
    pub short_description: Option<String>,
    pub description: Option<String>,
    pub category_id: Uuid,
    pub main_image_id: Option<Uuid>,
    pub is_featured: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Visão enxuta usada pelos fluxos de imagem (worklist, busca, lote).
#[derive(Debug, Clone, Serialize, FromRow, ToSchema, PartialEq)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub article_number: Option<String>,
    pub category_name: Option<String>,
    pub main_image_id: Option<Uuid>,
    pub image_count: i64,
}

/// Linha de listagem da vitrine (card).
#[derive(Debug, Clone, FromRow)]
pub struct ProductCardRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub short_description: Option<String>,
    pub display_image_path: Option<String>,
    pub price_amount: Option<Decimal>,
    pub price_currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductCard {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub short_description: Option<String>,
    pub image_url: Option<String>,
    pub current_price: Option<PriceView>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductDetail {
    pub product: Product,
    pub category: Category,
    pub tags: Vec<Tag>,
    pub images: Vec<ImageView>,
    pub main_image: Option<ImageView>,
    pub current_price: Option<Price>,
    pub related_products: Vec<ProductCard>,
}

/// Imagem principal exibida: a explícita, senão a primeira anexada.
pub fn display_image<'a>(main_image_id: Option<Uuid>, images: &'a [Image]) -> Option<&'a Image> {
    main_image_id
        .and_then(|id| images.iter().find(|img| img.id == id))
        .or_else(|| images.first())
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HomePage {
    pub page_title: String,
    pub featured_products: Vec<ProductCard>,
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductListPage {
    pub page_title: String,
    pub category: Option<Category>,
    pub tag: Option<Tag>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub products: Vec<ProductCard>,
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ProductListQuery {
    /// Slug da categoria
    pub category: Option<String>,
    /// Slug da tag
    pub tag: Option<String>,
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct PageQuery {
    pub page: Option<u32>,
}

// --- 6. Cadastro (staff) ---
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCategoryPayload {
    #[validate(length(min = 1, max = 100, message = "O nome deve ter entre 1 e 100 caracteres."))]
    #[schema(example = "Ferramentas")]
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTagPayload {
    #[validate(length(min = 1, max = 50, message = "O nome deve ter entre 1 e 50 caracteres."))]
    pub name: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProductPayload {
    #[validate(length(min = 1, max = 200, message = "O nome deve ter entre 1 e 200 caracteres."))]
    #[schema(example = "Widget-42")]
    pub name: String,
    #[validate(length(max = 50))]
    pub article_number: Option<String>,
    #[validate(length(max = 255))]
    pub short_description: Option<String>,
    pub description: Option<String>,
    pub category_id: Uuid,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePricePayload {
    #[serde(default)]
    pub price_type: PriceType,
    #[schema(example = "19.90")]
    pub amount: Decimal,
    #[validate(length(equal = 3, message = "A moeda deve ter 3 letras."))]
    pub currency: Option<String>,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn price(id: u128, secs: i64, active: bool, amount: i64) -> Price {
        let at = Utc.timestamp_opt(secs, 0).unwrap();
        Price {
            id: Uuid::from_u128(id),
            product_id: Uuid::from_u128(99),
            price_type: PriceType::Regular,
            amount: Decimal::new(amount, 2),
            currency: "USD".into(),
            description: None,
            is_active: active,
            created_at: at,
            updated_at: at,
        }
    }

    fn image(id: u128) -> Image {
        let at = Utc.timestamp_opt(0, 0).unwrap();
        Image {
            id: Uuid::from_u128(id),
            name: None,
            file_path: format!("images/{id}.jpg"),
            alt_text: None,
            description: None,
            kind: ImageKind::Product,
            resolution: None,
            size_kb: None,
            format: None,
            source_provider: None,
            source_query: None,
            source_url: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn current_price_is_latest_active() {
        let prices = vec![
            price(1, 100, true, 1000),
            price(2, 300, false, 500),
            price(3, 200, true, 2000),
        ];
        assert_eq!(current_price(&prices).unwrap().id, Uuid::from_u128(3));
    }

    #[test]
    fn current_price_tie_breaks_on_id() {
        let prices = vec![price(7, 100, true, 1000), price(9, 100, true, 900)];
        assert_eq!(current_price(&prices).unwrap().id, Uuid::from_u128(9));
        assert!(current_price(&[price(1, 1, false, 1)]).is_none());
    }

    #[test]
    fn display_image_prefers_explicit_main() {
        let images = vec![image(1), image(2)];
        assert_eq!(display_image(Some(Uuid::from_u128(2)), &images).unwrap().id, Uuid::from_u128(2));
        assert_eq!(display_image(None, &images).unwrap().id, Uuid::from_u128(1));
        assert!(display_image(None, &[]).is_none());
    }
}
