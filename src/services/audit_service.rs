// src/services/audit_service.rs

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    common::{db_utils::page_offset, error::AppError},
    db::{AuditStore, AuditWrite},
    models::{
        audit::{
            AuditListEntry, AuditListFilter, AuditListPage, AuditListQuery, AuditPage,
            AuditProduct, AuditSubmission, ProductAudit, StoredAudit,
        },
        catalog::{ImageKind, NewImage},
    },
    services::media::{extension_hint, MediaStorage},
};

pub const AUDIT_PER_PAGE: u32 = 25;

#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn AuditStore>,
    media: MediaStorage,
}

impl AuditService {
    pub fn new(store: Arc<dyn AuditStore>, media: MediaStorage) -> Self {
        Self { store, media }
    }

    /// Lista do conferente: produtos sem conferência aparecem como `Pending`.
    pub async fn list(&self, query: AuditListQuery) -> Result<AuditListPage, AppError> {
        let (page, offset) = page_offset(query.page, AUDIT_PER_PAGE);
        let filter = AuditListFilter {
            status: query.status,
            search: query.q.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()),
            limit: i64::from(AUDIT_PER_PAGE),
            offset,
        };

        let rows = self.store.list_audits(&filter).await?;
        let products = rows
            .into_iter()
            .map(|row| {
                let audit = match row.stored() {
                    Some(stored) => self.view(&stored),
                    None => ProductAudit::pending(row.product_id),
                };
                AuditListEntry {
                    product_id: row.product_id,
                    name: row.name,
                    slug: row.slug,
                    article_number: row.article_number,
                    audit,
                }
            })
            .collect();

        Ok(AuditListPage {
            page,
            per_page: AUDIT_PER_PAGE,
            products,
        })
    }

    pub async fn page(&self, product_id: Uuid) -> Result<AuditPage, AppError> {
        let product = self.require_product(product_id).await?;
        let stored = self.store.find_audit(product_id).await?;
        Ok(self.build_page(product, stored.as_ref()))
    }

    /// Valida e grava a conferência. Reenvio sobrescreve a mesma linha.
    pub async fn submit(
        &self,
        product_id: Uuid,
        audited_by: Uuid,
        submission: AuditSubmission,
    ) -> Result<AuditPage, AppError> {
        let product = self.require_product(product_id).await?;
        let existing = self.store.find_audit(product_id).await?;

        let quantity = parse_quantity(submission.quantity_recorded.as_deref())?;
        let has_photo = existing.as_ref().is_some_and(|a| a.photo_image_id.is_some());
        if submission.photo.is_none() && !has_photo {
            return Err(AppError::field(
                "photo_taken_upload",
                "required",
                "A foto é obrigatória na primeira conferência.",
            ));
        }

        let new_photo = match submission.photo {
            Some(photo) => {
                let hint = photo.file_name.as_deref().and_then(|name| extension_hint(name, None));
                let stored = self
                    .media
                    .store_image_bytes(photo.bytes, &format!("audit_{}", product.slug), hint.as_deref())
                    .await?;
                Some(NewImage {
                    name: Some(format!("Conferência {}", product.name)),
                    file_path: stored.file_path,
                    alt_text: Some(product.name.clone()),
                    description: None,
                    kind: ImageKind::Audit,
                    resolution: Some(stored.resolution),
                    size_kb: Some(stored.size_kb),
                    format: Some(stored.format),
                    source_provider: None,
                    source_query: None,
                    source_url: None,
                })
            }
            None => None,
        };
        let written_file = new_photo.as_ref().map(|p| p.file_path.clone());

        let write = AuditWrite {
            product_id,
            quantity_recorded: quantity,
            new_photo,
            audited_by,
            completed_at: Utc::now(),
        };

        let saved = match self.store.save_audit(write).await {
            Ok(saved) => saved,
            Err(e) => {
                if let Some(path) = written_file {
                    self.media.remove(&path).await;
                }
                return Err(e);
            }
        };

        tracing::info!(%product_id, %audited_by, quantity, "conferência registrada");
        Ok(self.build_page(product, Some(&saved)))
    }

    fn build_page(&self, product: AuditProduct, stored: Option<&StoredAudit>) -> AuditPage {
        let audit = match stored {
            Some(stored) => self.view(stored),
            None => ProductAudit::pending(product.id),
        };
        AuditPage {
            product_id: product.id,
            name: product.name,
            article_number: product.article_number,
            photo_required: audit.photo_image_id.is_none(),
            audit,
        }
    }

    fn view(&self, stored: &StoredAudit) -> ProductAudit {
        let photo_url = stored.photo_file_path.as_deref().map(|p| self.media.url_for(p));
        ProductAudit::from_stored(stored, photo_url)
    }

    async fn require_product(&self, product_id: Uuid) -> Result<AuditProduct, AppError> {
        self.store
            .find_product(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Produto não encontrado.".into()))
    }
}

fn parse_quantity(raw: Option<&str>) -> Result<i32, AppError> {
    let raw = raw.map(str::trim).filter(|v| !v.is_empty()).ok_or_else(|| {
        AppError::field("quantity_recorded", "required", "A quantidade é obrigatória.")
    })?;
    let quantity: i32 = raw.parse().map_err(|_| {
        AppError::field("quantity_recorded", "invalid", "Informe um número inteiro.")
    })?;
    if quantity < 0 {
        return Err(AppError::field(
            "quantity_recorded",
            "min",
            "A quantidade não pode ser negativa.",
        ));
    }
    Ok(quantity)
}
