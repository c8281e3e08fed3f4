// src/common/db_utils.rs

use sqlx::PgConnection;
use uuid::Uuid;

use crate::common::error::AppError;

// ---
// Helper de Slugs: nomes -> URLs
// ---

/// Tabelas que possuem coluna `slug` única.
#[derive(Debug, Clone, Copy)]
pub enum SlugTable {
    Categories,
    Tags,
    Products,
}

impl SlugTable {
    fn as_str(self) -> &'static str {
        match self {
            SlugTable::Categories => "categories",
            SlugTable::Tags => "tags",
            SlugTable::Products => "products",
        }
    }
}

/// "Café & Chá 500g" -> "caf-ch-500g"
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_matches('-').to_string()
}

/// Slug base: se o nome não gerar nada, usa o começo do UUID.
pub fn base_slug(name: &str, id: Uuid) -> String {
    let slug = slugify(name);
    if slug.is_empty() {
        id.simple().to_string()[..8].to_string()
    } else {
        slug
    }
}

/// Gera um slug único para a tabela, acrescentando "-1", "-2", ... enquanto existir.
pub(crate) async fn unique_slug(
    conn: &mut PgConnection,
    table: SlugTable,
    name: &str,
    id: Uuid,
) -> Result<String, AppError> {
    let base = base_slug(name, id);
    // A tabela vem de um enum fechado, nunca do usuário.
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE slug = $1 AND id <> $2)",
        table.as_str()
    );

    let mut candidate = base.clone();
    let mut suffix = 1;
    loop {
        let taken: bool = sqlx::query_scalar(&sql)
            .bind(&candidate)
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;

        if !taken {
            return Ok(candidate);
        }
        candidate = format!("{}-{}", base, suffix);
        suffix += 1;
    }
}

// ---
// Paginação simples (página começa em 1)
// ---
pub fn page_offset(page: Option<u32>, per_page: u32) -> (u32, i64) {
    let page = page.unwrap_or(1).max(1);
    (page, i64::from(page - 1) * i64::from(per_page))
}
