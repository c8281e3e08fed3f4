// src/db/audit_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::image_repo::insert_image,
    models::{
        audit::{AuditListFilter, AuditOverviewRow, AuditProduct, AuditStatusFilter, StoredAudit},
        catalog::NewImage,
    },
};

/// Dados de um envio do formulário de conferência.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditWrite {
    pub product_id: Uuid,
    pub quantity_recorded: i32,
    /// Foto nova; `None` mantém a foto já registrada.
    pub new_photo: Option<NewImage>,
    pub audited_by: Uuid,
    pub completed_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn find_product(&self, product_id: Uuid) -> Result<Option<AuditProduct>, AppError>;

    async fn find_audit(&self, product_id: Uuid) -> Result<Option<StoredAudit>, AppError>;

    /// Upsert por produto: nunca existe uma segunda linha.
    async fn save_audit(&self, write: AuditWrite) -> Result<StoredAudit, AppError>;

    async fn list_audits(&self, filter: &AuditListFilter) -> Result<Vec<AuditOverviewRow>, AppError>;
}

const STORED_AUDIT_SELECT: &str = r#"
    SELECT
        a.id, a.product_id, a.quantity_recorded, a.photo_image_id,
        i.file_path AS photo_file_path,
        a.completed_at, a.last_audited_by
    FROM product_audits a
    LEFT JOIN images i ON i.id = a.photo_image_id
"#;

#[derive(Clone)]
pub struct AuditRepository {
    pool: PgPool,
}

impl AuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for AuditRepository {
    async fn find_product(&self, product_id: Uuid) -> Result<Option<AuditProduct>, AppError> {
        let product = sqlx::query_as::<_, AuditProduct>(
            "SELECT id, name, slug, article_number FROM products WHERE id = $1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    async fn find_audit(&self, product_id: Uuid) -> Result<Option<StoredAudit>, AppError> {
        let sql = format!("{} WHERE a.product_id = $1", STORED_AUDIT_SELECT);
        let audit = sqlx::query_as::<_, StoredAudit>(&sql)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(audit)
    }

    async fn save_audit(&self, write: AuditWrite) -> Result<StoredAudit, AppError> {
        let mut tx = self.pool.begin().await?;

        let photo_id = match &write.new_photo {
            Some(photo) => Some(insert_image(&mut *tx, photo).await?.id),
            None => None,
        };

        // A foto anterior continua em `images`; só a referência muda.
        let audit_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO product_audits (product_id, quantity_recorded, photo_image_id, completed_at, last_audited_by)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (product_id) DO UPDATE SET
                quantity_recorded = EXCLUDED.quantity_recorded,
                photo_image_id = COALESCE(EXCLUDED.photo_image_id, product_audits.photo_image_id),
                completed_at = EXCLUDED.completed_at,
                last_audited_by = EXCLUDED.last_audited_by,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(write.product_id)
        .bind(write.quantity_recorded)
        .bind(photo_id)
        .bind(write.completed_at)
        .bind(write.audited_by)
        .fetch_one(&mut *tx)
        .await?;

        let sql = format!("{} WHERE a.id = $1", STORED_AUDIT_SELECT);
        let stored = sqlx::query_as::<_, StoredAudit>(&sql)
            .bind(audit_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn list_audits(&self, filter: &AuditListFilter) -> Result<Vec<AuditOverviewRow>, AppError> {
        let status = filter.status.map(|s| match s {
            AuditStatusFilter::Pending => "pending",
            AuditStatusFilter::Completed => "completed",
        });

        let rows = sqlx::query_as::<_, AuditOverviewRow>(
            r#"
            SELECT
                p.id AS product_id, p.name, p.slug, p.article_number,
                a.quantity_recorded, a.photo_image_id,
                i.file_path AS photo_file_path,
                a.completed_at, a.last_audited_by
            FROM products p
            LEFT JOIN product_audits a ON a.product_id = p.id
            LEFT JOIN images i ON i.id = a.photo_image_id
            WHERE p.is_active
              AND ($1::text IS NULL
                   OR ($1 = 'pending' AND a.completed_at IS NULL)
                   OR ($1 = 'completed' AND a.completed_at IS NOT NULL))
              AND ($2::text IS NULL OR p.name ILIKE '%' || $2 || '%')
            ORDER BY p.name, p.id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(status)
        .bind(filter.search.as_deref())
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
