// src/models/audit.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Estado da conferência de um produto.
/// Sem linha no banco = `Pending`; toda linha gravada é `Completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuditStatus {
    Pending,
    Completed { at: DateTime<Utc>, by: Uuid },
}

impl AuditStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, AuditStatus::Completed { .. })
    }
}

/// Linha de `product_audits` + caminho da foto (LEFT JOIN images).
#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct StoredAudit {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity_recorded: i32,
    pub photo_image_id: Option<Uuid>,
    pub photo_file_path: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub last_audited_by: Uuid,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductAudit {
    pub product_id: Uuid,
    pub quantity_recorded: Option<i32>,
    pub photo_image_id: Option<Uuid>,
    pub photo_url: Option<String>,
    pub is_completed: bool,
    pub status: AuditStatus,
}

impl ProductAudit {
    /// Placeholder sintético para produtos ainda não conferidos.
    pub fn pending(product_id: Uuid) -> Self {
        Self {
            product_id,
            quantity_recorded: None,
            photo_image_id: None,
            photo_url: None,
            is_completed: false,
            status: AuditStatus::Pending,
        }
    }

    pub fn from_stored(stored: &StoredAudit, photo_url: Option<String>) -> Self {
        let status = AuditStatus::Completed {
            at: stored.completed_at,
            by: stored.last_audited_by,
        };
        Self {
            product_id: stored.product_id,
            quantity_recorded: Some(stored.quantity_recorded),
            photo_image_id: stored.photo_image_id,
            photo_url,
            is_completed: status.is_completed(),
            status,
        }
    }
}

#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct AuditProduct {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub article_number: Option<String>,
}

/// Linha da lista do conferente (produto LEFT JOIN conferência).
#[derive(Debug, Clone, FromRow)]
pub struct AuditOverviewRow {
    pub product_id: Uuid,
    pub name: String,
    pub slug: String,
    pub article_number: Option<String>,
    pub quantity_recorded: Option<i32>,
    pub photo_image_id: Option<Uuid>,
    pub photo_file_path: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_audited_by: Option<Uuid>,
}

impl AuditOverviewRow {
    pub fn stored(&self) -> Option<StoredAudit> {
        match (self.completed_at, self.last_audited_by, self.quantity_recorded) {
            (Some(completed_at), Some(by), Some(quantity)) => Some(StoredAudit {
                id: Uuid::nil(),
                product_id: self.product_id,
                quantity_recorded: quantity,
                photo_image_id: self.photo_image_id,
                photo_file_path: self.photo_file_path.clone(),
                completed_at,
                last_audited_by: by,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatusFilter {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct AuditListQuery {
    pub status: Option<AuditStatusFilter>,
    pub q: Option<String>,
    pub page: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AuditListFilter {
    pub status: Option<AuditStatusFilter>,
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditListEntry {
    pub product_id: Uuid,
    pub name: String,
    pub slug: String,
    pub article_number: Option<String>,
    pub audit: ProductAudit,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditListPage {
    pub page: u32,
    pub per_page: u32,
    pub products: Vec<AuditListEntry>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditPage {
    pub product_id: Uuid,
    pub name: String,
    pub article_number: Option<String>,
    pub audit: ProductAudit,
    /// Foto obrigatória no envio (ainda não existe foto de conferência).
    pub photo_required: bool,
}

/// Envio do formulário já extraído do multipart.
#[derive(Debug, Clone, Default)]
pub struct AuditSubmission {
    /// Texto cru do campo; validado no serviço.
    pub quantity_recorded: Option<String>,
    pub photo: Option<UploadedPhoto>,
}

#[derive(Debug, Clone)]
pub struct UploadedPhoto {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// Documentação do formulário multipart.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct AuditForm {
    #[schema(example = 12)]
    pub quantity_recorded: i32,
    #[schema(value_type = Option<String>, format = Binary)]
    pub photo_taken_upload: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_placeholder_is_not_completed() {
        let audit = ProductAudit::pending(Uuid::from_u128(1));
        assert!(!audit.is_completed);
        assert_eq!(audit.status, AuditStatus::Pending);
        let json = serde_json::to_value(&audit).unwrap();
        assert_eq!(json["status"]["state"], "pending");
    }

    #[test]
    fn overview_row_without_audit_has_no_stored_state() {
        let row = AuditOverviewRow {
            product_id: Uuid::from_u128(1),
            name: "Widget".into(),
            slug: "widget".into(),
            article_number: None,
            quantity_recorded: None,
            photo_image_id: None,
            photo_file_path: None,
            completed_at: None,
            last_audited_by: None,
        };
        assert!(row.stored().is_none());
    }
}
