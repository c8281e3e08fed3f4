// src/services/catalog_service.rs

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{
        db_utils::{page_offset, unique_slug, SlugTable},
        error::AppError,
    },
    db::CatalogRepository,
    models::catalog::{
        current_price, display_image, Category, CategoryNode, CreateCategoryPayload,
        CreatePricePayload, CreateProductPayload, CreateTagPayload, HomePage, ImageView, Price,
        PriceView, Product, ProductCard, ProductCardRow, ProductDetail, ProductListPage,
        ProductListQuery, Tag,
    },
    services::media::MediaStorage,
};

pub const PRODUCTS_PER_PAGE: u32 = 12;
const HOME_FEATURED: i64 = 8;
const HOME_CATEGORIES: i64 = 6;
const RELATED_PRODUCTS: i64 = 4;

#[derive(Clone)]
pub struct CatalogService {
    repo: CatalogRepository,
    pool: PgPool,
    media: MediaStorage,
}

impl CatalogService {
    pub fn new(repo: CatalogRepository, pool: PgPool, media: MediaStorage) -> Self {
        Self { repo, pool, media }
    }

    // ---
    // Vitrine
    // ---

    pub async fn home(&self) -> Result<HomePage, AppError> {
        let featured = self.repo.featured_cards(&self.pool, HOME_FEATURED).await?;
        let categories = self.repo.list_categories(&self.pool, Some(HOME_CATEGORIES)).await?;

        Ok(HomePage {
            page_title: "Home".to_string(),
            featured_products: featured.into_iter().map(|row| self.card(row)).collect(),
            categories,
        })
    }

    /// Lista paginada; slug desconhecido de categoria ou tag vira 404.
    pub async fn product_list(&self, query: ProductListQuery) -> Result<ProductListPage, AppError> {
        let category = match query.category.as_deref().filter(|s| !s.is_empty()) {
            Some(slug) => Some(
                self.repo
                    .find_category_by_slug(&self.pool, slug)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Categoria não encontrada.".into()))?,
            ),
            None => None,
        };
        let tag = match query.tag.as_deref().filter(|s| !s.is_empty()) {
            Some(slug) => Some(
                self.repo
                    .find_tag_by_slug(&self.pool, slug)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Tag não encontrada.".into()))?,
            ),
            None => None,
        };

        let category_id = category.as_ref().map(|c| c.id);
        let tag_id = tag.as_ref().map(|t| t.id);
        let (page, offset) = page_offset(query.page, PRODUCTS_PER_PAGE);

        let total = self.repo.count_cards(&self.pool, category_id, tag_id).await?;
        let rows = self
            .repo
            .list_cards(&self.pool, category_id, tag_id, i64::from(PRODUCTS_PER_PAGE), offset)
            .await?;
        let categories = self.repo.list_categories(&self.pool, None).await?;

        Ok(ProductListPage {
            page_title: page_title(category.as_ref(), tag.as_ref()),
            category,
            tag,
            page,
            per_page: PRODUCTS_PER_PAGE,
            total,
            products: rows.into_iter().map(|row| self.card(row)).collect(),
            categories,
        })
    }

    pub async fn product_detail(&self, slug: &str) -> Result<ProductDetail, AppError> {
        let product = self
            .repo
            .find_active_product_by_slug(&self.pool, slug)
            .await?
            .ok_or_else(|| AppError::NotFound("Produto não encontrado.".into()))?;

        let category = self
            .repo
            .find_category(&self.pool, product.category_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Categoria não encontrada.".into()))?;
        let tags = self.repo.product_tags(&self.pool, product.id).await?;
        let images = self.repo.images_of(&self.pool, product.id).await?;
        let prices = self.repo.product_prices(&self.pool, product.id).await?;
        let related = self
            .repo
            .related_cards(&self.pool, product.category_id, product.id, RELATED_PRODUCTS)
            .await?;

        let main_id = display_image(product.main_image_id, &images).map(|img| img.id);
        let views: Vec<ImageView> = images
            .iter()
            .map(|img| ImageView {
                id: img.id,
                url: self.media.url_for(&img.file_path),
                alt_text: img.alt_text.clone(),
                is_main: main_id == Some(img.id),
                source_url: img.source_url.clone(),
            })
            .collect();
        let main_image = views.iter().find(|v| v.is_main).cloned();

        Ok(ProductDetail {
            current_price: current_price(&prices).cloned(),
            product,
            category,
            tags,
            images: views,
            main_image,
            related_products: related.into_iter().map(|row| self.card(row)).collect(),
        })
    }

    pub async fn category_tree(&self) -> Result<Vec<CategoryNode>, AppError> {
        let categories = self.repo.list_categories(&self.pool, None).await?;
        Ok(build_category_tree(categories))
    }

    fn card(&self, row: ProductCardRow) -> ProductCard {
        ProductCard {
            id: row.id,
            name: row.name,
            slug: row.slug,
            short_description: row.short_description,
            image_url: row.display_image_path.as_deref().map(|p| self.media.url_for(p)),
            current_price: row
                .price_amount
                .zip(row.price_currency)
                .map(|(amount, currency)| PriceView { amount, currency }),
        }
    }

    // ---
    // Cadastro (staff)
    // ---

    pub async fn create_category(&self, payload: CreateCategoryPayload) -> Result<Category, AppError> {
        payload.validate()?;
        let name = payload.name.trim();
        let id = Uuid::new_v4();

        let mut tx = self.pool.begin().await?;
        if let Some(parent_id) = payload.parent_id {
            self.repo
                .find_category(&mut *tx, parent_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Categoria pai não encontrada.".into()))?;
        }
        let slug = unique_slug(&mut tx, SlugTable::Categories, name, id).await?;
        let category = self
            .repo
            .create_category(&mut *tx, id, name, &slug, payload.description.as_deref(), payload.parent_id)
            .await?;
        tx.commit().await?;

        tracing::info!(category_id = %category.id, slug = %category.slug, "categoria criada");
        Ok(category)
    }

    pub async fn create_tag(&self, payload: CreateTagPayload) -> Result<Tag, AppError> {
        payload.validate()?;
        let name = payload.name.trim();
        let id = Uuid::new_v4();

        let mut tx = self.pool.begin().await?;
        let slug = unique_slug(&mut tx, SlugTable::Tags, name, id).await?;
        let tag = self.repo.create_tag(&mut *tx, id, name, &slug).await?;
        tx.commit().await?;

        Ok(tag)
    }

    pub async fn create_product(&self, payload: CreateProductPayload) -> Result<Product, AppError> {
        payload.validate()?;
        let name = payload.name.trim();
        let id = Uuid::new_v4();

        let mut tx = self.pool.begin().await?;
        self.repo
            .find_category(&mut *tx, payload.category_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Categoria não encontrada.".into()))?;

        let slug = unique_slug(&mut tx, SlugTable::Products, name, id).await?;
        let product = self
            .repo
            .create_product(
                &mut *tx,
                id,
                name,
                &slug,
                payload.article_number.as_deref(),
                payload.short_description.as_deref(),
                payload.description.as_deref(),
                payload.category_id,
                payload.is_featured,
                payload.is_active,
            )
            .await?;

        if !payload.tag_ids.is_empty() {
            self.repo.add_product_tags(&mut *tx, product.id, &payload.tag_ids).await?;
        }
        tx.commit().await?;

        tracing::info!(product_id = %product.id, slug = %product.slug, "produto criado");
        Ok(product)
    }

    pub async fn create_price(&self, product_id: Uuid, payload: CreatePricePayload) -> Result<Price, AppError> {
        payload.validate()?;
        if payload.amount < Decimal::ZERO {
            return Err(AppError::field("amount", "min", "O valor não pode ser negativo."));
        }
        let currency = payload
            .currency
            .as_deref()
            .map(str::to_ascii_uppercase)
            .unwrap_or_else(|| "USD".to_string());

        self.repo
            .create_price(
                &self.pool,
                product_id,
                payload.price_type,
                payload.amount.round_dp(2),
                &currency,
                payload.description.as_deref(),
                payload.is_active,
            )
            .await
    }
}

fn page_title(category: Option<&Category>, tag: Option<&Tag>) -> String {
    match (category, tag) {
        (Some(category), _) => format!("Products in {}", category.name),
        (None, Some(tag)) => format!("Products tagged with {}", tag.name),
        (None, None) => "All Products".to_string(),
    }
}

/// Raízes em ordem de nome, cada uma com suas filhas diretas.
fn build_category_tree(categories: Vec<Category>) -> Vec<CategoryNode> {
    let (roots, children): (Vec<_>, Vec<_>) =
        categories.into_iter().partition(|c| c.parent_id.is_none());

    roots
        .into_iter()
        .map(|root| CategoryNode {
            children: children
                .iter()
                .filter(|c| c.parent_id == Some(root.id))
                .cloned()
                .collect(),
            category: root,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn category(id: u128, name: &str, parent: Option<u128>) -> Category {
        let now = Utc::now();
        Category {
            id: Uuid::from_u128(id),
            name: name.into(),
            slug: crate::common::db_utils::slugify(name),
            description: None,
            parent_id: parent.map(Uuid::from_u128),
            image_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn tree_nests_direct_children_only() {
        let tree = build_category_tree(vec![
            category(1, "Ferramentas", None),
            category(2, "Jardim", None),
            category(3, "Martelos", Some(1)),
            category(4, "Cabos", Some(3)),
        ]);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].category.name, "Ferramentas");
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].name, "Martelos");
        assert!(tree[1].children.is_empty());
    }

    #[test]
    fn titles_follow_the_active_filter() {
        let tools = category(1, "Tools", None);
        let now = Utc::now();
        let sale = Tag {
            id: Uuid::from_u128(9),
            name: "Sale".into(),
            slug: "sale".into(),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(page_title(None, None), "All Products");
        assert_eq!(page_title(Some(&tools), None), "Products in Tools");
        assert_eq!(page_title(None, Some(&sale)), "Products tagged with Sale");
    }
}
