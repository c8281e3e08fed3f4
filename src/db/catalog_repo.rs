// src/db/catalog_repo.rs

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::image_repo::insert_image,
    models::{
        catalog::{
            Category, Image, NewImage, Price, PriceType, Product, ProductCardRow, ProductSummary, Tag,
        },
        image_search::WorklistFilter,
    },
};

/// O que fazer com `products.main_image_id` ao anexar uma imagem nova.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainImagePolicy {
    Keep,
    Set,
    /// Só vira principal se o produto ainda não tiver uma.
    SetIfEmpty,
}

/// Operações de catálogo usadas pelos fluxos de imagem.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_product(&self, product_id: Uuid) -> Result<Option<ProductSummary>, AppError>;

    /// Worklist em ordem (name, id).
    async fn list_worklist(&self, filter: &WorklistFilter) -> Result<Vec<ProductSummary>, AppError>;

    /// Primeiro produto da worklist com (name, id) maior que o atual.
    async fn next_in_worklist(
        &self,
        current: &ProductSummary,
        filter: &WorklistFilter,
    ) -> Result<Option<Uuid>, AppError>;

    /// Imagens anexadas, na ordem de anexação.
    async fn product_images(&self, product_id: Uuid) -> Result<Vec<Image>, AppError>;

    /// Cria a Image e o vínculo com o produto numa única transação.
    async fn attach_new_image(
        &self,
        product_id: Uuid,
        image: NewImage,
        policy: MainImagePolicy,
    ) -> Result<Image, AppError>;

    async fn set_main_image(&self, product_id: Uuid, image_id: Uuid) -> Result<(), AppError>;
}

const SUMMARY_SELECT: &str = r#"
    SELECT
        p.id, p.name, p.slug, p.article_number,
        c.name AS category_name,
        p.main_image_id,
        (SELECT COUNT(*) FROM product_images pi WHERE pi.product_id = p.id) AS image_count
    FROM products p
    LEFT JOIN categories c ON c.id = p.category_id
"#;

const WORKLIST_WHERE: &str = r#"
    WHERE p.is_active
      AND ($1::text IS NULL OR c.slug = $1)
      AND ($2::bigint IS NULL OR (SELECT COUNT(*) FROM product_images pi WHERE pi.product_id = p.id) < $2)
      AND ($3::text IS NULL OR p.name ILIKE '%' || $3 || '%')
"#;

// Imagem exibida = principal explícita, senão a primeira anexada.
// Preço atual = ativo mais recente; empate -> maior id.
const CARD_SELECT: &str = r#"
    SELECT
        p.id, p.name, p.slug, p.short_description,
        COALESCE(mi.file_path, fi.file_path) AS display_image_path,
        pr.amount AS price_amount,
        pr.currency AS price_currency
    FROM products p
    LEFT JOIN images mi ON mi.id = p.main_image_id
    LEFT JOIN LATERAL (
        SELECT i.file_path
        FROM product_images pi
        JOIN images i ON i.id = pi.image_id
        WHERE pi.product_id = p.id
        ORDER BY pi.position
        LIMIT 1
    ) fi ON TRUE
    LEFT JOIN LATERAL (
        SELECT amount, currency
        FROM prices
        WHERE product_id = p.id AND is_active
        ORDER BY created_at DESC, id DESC
        LIMIT 1
    ) pr ON TRUE
"#;

const IMAGE_COLUMNS: &str = r#"
    i.id, i.name, i.file_path, i.alt_text, i.description, i.kind, i.resolution, i.size_kb,
    i.format, i.source_provider, i.source_query, i.source_url, i.created_at, i.updated_at
"#;

const PRODUCT_COLUMNS: &str = r#"
    id, name, slug, article_number, short_description, description, category_id,
    main_image_id, is_featured, is_active, created_at, updated_at
"#;

fn map_unique_violation(e: sqlx::Error, what: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return AppError::Conflict(format!("{} já existe.", what));
        }
        if db_err.is_foreign_key_violation() {
            return AppError::NotFound(format!("Referência inválida ao criar {}.", what));
        }
    }
    e.into()
}

#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ---
    // Vitrine (leitura)
    // ---

    pub async fn featured_cards<'e, E>(&self, executor: E, limit: i64) -> Result<Vec<ProductCardRow>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "{} WHERE p.is_active AND p.is_featured ORDER BY p.name, p.id LIMIT $1",
            CARD_SELECT
        );
        let cards = sqlx::query_as::<_, ProductCardRow>(&sql)
            .bind(limit)
            .fetch_all(executor)
            .await?;
        Ok(cards)
    }

    /// Cards ativos, opcionalmente filtrados por categoria e/ou tag.
    pub async fn list_cards<'e, E>(
        &self,
        executor: E,
        category_id: Option<Uuid>,
        tag_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ProductCardRow>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"{}
            WHERE p.is_active
              AND ($1::uuid IS NULL OR p.category_id = $1)
              AND ($2::uuid IS NULL OR EXISTS (
                    SELECT 1 FROM product_tags pt WHERE pt.product_id = p.id AND pt.tag_id = $2))
            ORDER BY p.name, p.id
            LIMIT $3 OFFSET $4"#,
            CARD_SELECT
        );
        let cards = sqlx::query_as::<_, ProductCardRow>(&sql)
            .bind(category_id)
            .bind(tag_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await?;
        Ok(cards)
    }

    pub async fn count_cards<'e, E>(
        &self,
        executor: E,
        category_id: Option<Uuid>,
        tag_id: Option<Uuid>,
    ) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM products p
            WHERE p.is_active
              AND ($1::uuid IS NULL OR p.category_id = $1)
              AND ($2::uuid IS NULL OR EXISTS (
                    SELECT 1 FROM product_tags pt WHERE pt.product_id = p.id AND pt.tag_id = $2))
            "#,
        )
        .bind(category_id)
        .bind(tag_id)
        .fetch_one(executor)
        .await?;
        Ok(total)
    }

    pub async fn related_cards<'e, E>(
        &self,
        executor: E,
        category_id: Uuid,
        exclude_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ProductCardRow>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "{} WHERE p.is_active AND p.category_id = $1 AND p.id <> $2 ORDER BY p.name, p.id LIMIT $3",
            CARD_SELECT
        );
        let cards = sqlx::query_as::<_, ProductCardRow>(&sql)
            .bind(category_id)
            .bind(exclude_id)
            .bind(limit)
            .fetch_all(executor)
            .await?;
        Ok(cards)
    }

    pub async fn find_active_product_by_slug<'e, E>(
        &self,
        executor: E,
        slug: &str,
    ) -> Result<Option<Product>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {} FROM products WHERE slug = $1 AND is_active",
            PRODUCT_COLUMNS
        );
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(slug)
            .fetch_optional(executor)
            .await?;
        Ok(product)
    }

    pub async fn list_categories<'e, E>(&self, executor: E, limit: Option<i64>) -> Result<Vec<Category>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT * FROM categories ORDER BY name ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(executor)
        .await?;
        Ok(categories)
    }

    pub async fn find_category<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Category>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(category)
    }

    pub async fn find_category_by_slug<'e, E>(&self, executor: E, slug: &str) -> Result<Option<Category>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE slug = $1")
            .bind(slug)
            .fetch_optional(executor)
            .await?;
        Ok(category)
    }

    pub async fn find_tag_by_slug<'e, E>(&self, executor: E, slug: &str) -> Result<Option<Tag>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let tag = sqlx::query_as::<_, Tag>("SELECT * FROM tags WHERE slug = $1")
            .bind(slug)
            .fetch_optional(executor)
            .await?;
        Ok(tag)
    }

    pub async fn product_tags<'e, E>(&self, executor: E, product_id: Uuid) -> Result<Vec<Tag>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let tags = sqlx::query_as::<_, Tag>(
            r#"
            SELECT t.* FROM tags t
            JOIN product_tags pt ON pt.tag_id = t.id
            WHERE pt.product_id = $1
            ORDER BY t.name
            "#,
        )
        .bind(product_id)
        .fetch_all(executor)
        .await?;
        Ok(tags)
    }

    pub async fn product_prices<'e, E>(&self, executor: E, product_id: Uuid) -> Result<Vec<Price>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let prices = sqlx::query_as::<_, Price>(
            "SELECT * FROM prices WHERE product_id = $1 ORDER BY created_at, id",
        )
        .bind(product_id)
        .fetch_all(executor)
        .await?;
        Ok(prices)
    }

    pub async fn images_of<'e, E>(&self, executor: E, product_id: Uuid) -> Result<Vec<Image>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            SELECT {}
            FROM product_images pi
            JOIN images i ON i.id = pi.image_id
            WHERE pi.product_id = $1
            ORDER BY pi.position
            "#,
            IMAGE_COLUMNS
        );
        let images = sqlx::query_as::<_, Image>(&sql)
            .bind(product_id)
            .fetch_all(executor)
            .await?;
        Ok(images)
    }

    // ---
    // Cadastro (staff)
    // ---

    pub async fn create_category<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        name: &str,
        slug: &str,
        description: Option<&str>,
        parent_id: Option<Uuid>,
    ) -> Result<Category, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (id, name, slug, description, parent_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(slug)
        .bind(description)
        .bind(parent_id)
        .fetch_one(executor)
        .await
        .map_err(|e| map_unique_violation(e, "Categoria"))
    }

    pub async fn create_tag<'e, E>(&self, executor: E, id: Uuid, name: &str, slug: &str) -> Result<Tag, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Tag>(
            "INSERT INTO tags (id, name, slug) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(id)
        .bind(name)
        .bind(slug)
        .fetch_one(executor)
        .await
        .map_err(|e| map_unique_violation(e, "Tag"))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_product<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        name: &str,
        slug: &str,
        article_number: Option<&str>,
        short_description: Option<&str>,
        description: Option<&str>,
        category_id: Uuid,
        is_featured: bool,
        is_active: bool,
    ) -> Result<Product, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            INSERT INTO products (
                id, name, slug, article_number, short_description, description,
                category_id, is_featured, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .bind(name)
            .bind(slug)
            .bind(article_number)
            .bind(short_description)
            .bind(description)
            .bind(category_id)
            .bind(is_featured)
            .bind(is_active)
            .fetch_one(executor)
            .await
            .map_err(|e| map_unique_violation(e, "Produto"))
    }

    pub async fn add_product_tags<'e, E>(&self, executor: E, product_id: Uuid, tag_ids: &[Uuid]) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO product_tags (product_id, tag_id)
            SELECT $1, UNNEST($2::uuid[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(product_id)
        .bind(tag_ids)
        .execute(executor)
        .await
        .map_err(|e| map_unique_violation(e, "Tag do produto"))?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_price<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
        price_type: PriceType,
        amount: Decimal,
        currency: &str,
        description: Option<&str>,
        is_active: bool,
    ) -> Result<Price, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Price>(
            r#"
            INSERT INTO prices (product_id, price_type, amount, currency, description, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(product_id)
        .bind(price_type)
        .bind(amount)
        .bind(currency)
        .bind(description)
        .bind(is_active)
        .fetch_one(executor)
        .await
        .map_err(|e| map_unique_violation(e, "Preço"))
    }
}

#[async_trait]
impl CatalogStore for CatalogRepository {
    async fn find_product(&self, product_id: Uuid) -> Result<Option<ProductSummary>, AppError> {
        let sql = format!("{} WHERE p.id = $1", SUMMARY_SELECT);
        let product = sqlx::query_as::<_, ProductSummary>(&sql)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    async fn list_worklist(&self, filter: &WorklistFilter) -> Result<Vec<ProductSummary>, AppError> {
        let sql = format!(
            "{} {} ORDER BY p.name, p.id LIMIT $4 OFFSET $5",
            SUMMARY_SELECT, WORKLIST_WHERE
        );
        let products = sqlx::query_as::<_, ProductSummary>(&sql)
            .bind(filter.category_slug.as_deref())
            .bind(filter.below)
            .bind(filter.search.as_deref())
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    async fn next_in_worklist(
        &self,
        current: &ProductSummary,
        filter: &WorklistFilter,
    ) -> Result<Option<Uuid>, AppError> {
        let sql = format!(
            "SELECT p.id FROM products p LEFT JOIN categories c ON c.id = p.category_id {} \
             AND (p.name, p.id) > ($4, $5) ORDER BY p.name, p.id LIMIT 1",
            WORKLIST_WHERE
        );
        let next: Option<Uuid> = sqlx::query_scalar(&sql)
            .bind(filter.category_slug.as_deref())
            .bind(filter.below)
            .bind(filter.search.as_deref())
            .bind(&current.name)
            .bind(current.id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(next)
    }

    async fn product_images(&self, product_id: Uuid) -> Result<Vec<Image>, AppError> {
        self.images_of(&self.pool, product_id).await
    }

    async fn attach_new_image(
        &self,
        product_id: Uuid,
        image: NewImage,
        policy: MainImagePolicy,
    ) -> Result<Image, AppError> {
        let mut tx = self.pool.begin().await?;

        let stored = insert_image(&mut *tx, &image).await?;

        sqlx::query("INSERT INTO product_images (product_id, image_id) VALUES ($1, $2)")
            .bind(product_id)
            .bind(stored.id)
            .execute(&mut *tx)
            .await?;

        let main_update = match policy {
            MainImagePolicy::Keep => None,
            MainImagePolicy::Set => Some(
                "UPDATE products SET main_image_id = $2, updated_at = NOW() WHERE id = $1",
            ),
            MainImagePolicy::SetIfEmpty => Some(
                "UPDATE products SET main_image_id = $2, updated_at = NOW() \
                 WHERE id = $1 AND main_image_id IS NULL",
            ),
        };
        if let Some(sql) = main_update {
            sqlx::query(sql)
                .bind(product_id)
                .bind(stored.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn set_main_image(&self, product_id: Uuid, image_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE products SET main_image_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(product_id)
            .bind(image_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Produto não encontrado.".into()));
        }
        Ok(())
    }
}

// Precisam de um Postgres de verdade: `DATABASE_URL=... cargo test -- --ignored`.
#[cfg(test)]
mod pg_tests {
    use super::*;
    use crate::common::db_utils::{slugify, unique_slug, SlugTable};
    use crate::models::catalog::ImageKind;

    async fn seed_category(pool: &PgPool, name: &str, slug: &str) -> Uuid {
        let repo = CatalogRepository::new(pool.clone());
        repo.create_category(pool, Uuid::new_v4(), name, slug, None, None)
            .await
            .unwrap()
            .id
    }

    async fn seed_product(pool: &PgPool, id: Uuid, name: &str, category_id: Uuid) {
        let repo = CatalogRepository::new(pool.clone());
        let slug = format!("{}-{}", slugify(name), id.simple());
        repo.create_product(pool, id, name, &slug, None, None, None, category_id, false, true)
            .await
            .unwrap();
    }

    fn new_image(url: &str) -> NewImage {
        NewImage {
            name: None,
            file_path: format!("products/{}.jpg", Uuid::new_v4().simple()),
            alt_text: None,
            description: None,
            kind: ImageKind::Product,
            resolution: Some("10x10".into()),
            size_kb: Some(1),
            format: Some("jpeg".into()),
            source_provider: Some("google".into()),
            source_query: Some("martelo".into()),
            source_url: Some(url.into()),
        }
    }

    #[sqlx::test]
    #[ignore = "precisa de DATABASE_URL"]
    async fn current_price_breaks_created_at_ties_by_greatest_id(pool: PgPool) {
        let category = seed_category(&pool, "Ferramentas", "ferramentas").await;
        let product = Uuid::from_u128(10);
        seed_product(&pool, product, "Martelo", category).await;

        let low_id = Uuid::from_u128(0x100);
        let high_id = Uuid::from_u128(0x200);
        for (id, amount) in [(high_id, Decimal::new(2000, 2)), (low_id, Decimal::new(1000, 2))] {
            sqlx::query(
                "INSERT INTO prices (id, product_id, amount, created_at) \
                 VALUES ($1, $2, $3, '2025-01-01T00:00:00Z')",
            )
            .bind(id)
            .bind(product)
            .bind(amount)
            .execute(&pool)
            .await
            .unwrap();
        }

        let repo = CatalogRepository::new(pool.clone());
        let cards = repo.list_cards(&pool, None, None, 12, 0).await.unwrap();

        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].price_amount, Some(Decimal::new(2000, 2)));
    }

    #[sqlx::test]
    #[ignore = "precisa de DATABASE_URL"]
    async fn next_in_worklist_walks_name_then_id_with_filters(pool: PgPool) {
        let category = seed_category(&pool, "Ferramentas", "ferramentas").await;
        let a1 = Uuid::from_u128(1);
        let a2 = Uuid::from_u128(2);
        let b = Uuid::from_u128(3);
        let c = Uuid::from_u128(4);
        seed_product(&pool, a2, "Alicate", category).await;
        seed_product(&pool, a1, "Alicate", category).await;
        seed_product(&pool, b, "Broca", category).await;
        seed_product(&pool, c, "Chave", category).await;

        let repo = CatalogRepository::new(pool.clone());
        repo.attach_new_image(b, new_image("https://x.com/b.jpg"), MainImagePolicy::SetIfEmpty)
            .await
            .unwrap();

        let all = WorklistFilter::default();
        let first = repo.find_product(a1).await.unwrap().unwrap();
        assert_eq!(repo.next_in_worklist(&first, &all).await.unwrap(), Some(a2));

        let second = repo.find_product(a2).await.unwrap().unwrap();
        assert_eq!(repo.next_in_worklist(&second, &all).await.unwrap(), Some(b));

        let without_images = WorklistFilter {
            below: Some(1),
            ..Default::default()
        };
        assert_eq!(repo.next_in_worklist(&second, &without_images).await.unwrap(), Some(c));

        let last = repo.find_product(c).await.unwrap().unwrap();
        assert_eq!(repo.next_in_worklist(&last, &all).await.unwrap(), None);
    }

    #[sqlx::test]
    #[ignore = "precisa de DATABASE_URL"]
    async fn attach_keeps_main_image_when_one_is_set(pool: PgPool) {
        let category = seed_category(&pool, "Ferramentas", "ferramentas").await;
        let product = Uuid::from_u128(7);
        seed_product(&pool, product, "Serrote", category).await;

        let repo = CatalogRepository::new(pool.clone());
        let first = repo
            .attach_new_image(product, new_image("https://x.com/1.jpg"), MainImagePolicy::SetIfEmpty)
            .await
            .unwrap();
        repo.attach_new_image(product, new_image("https://x.com/2.jpg"), MainImagePolicy::SetIfEmpty)
            .await
            .unwrap();

        let summary = repo.find_product(product).await.unwrap().unwrap();
        assert_eq!(summary.main_image_id, Some(first.id));
        assert_eq!(summary.image_count, 2);

        let images = repo.product_images(product).await.unwrap();
        assert_eq!(images[0].id, first.id);
    }

    #[sqlx::test]
    #[ignore = "precisa de DATABASE_URL"]
    async fn unique_slug_appends_counter_until_free(pool: PgPool) {
        seed_category(&pool, "Ferramentas", "ferramentas").await;
        seed_category(&pool, "Ferramentas Elétricas", "ferramentas-1").await;

        let mut conn = pool.acquire().await.unwrap();
        let slug = unique_slug(&mut conn, SlugTable::Categories, "ferramentas", Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(slug, "ferramentas-2");

        let fresh = unique_slug(&mut conn, SlugTable::Categories, "Jardinagem", Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(fresh, "jardinagem");
    }
}
