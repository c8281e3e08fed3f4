// src/db/image_repo.rs

use sqlx::{Executor, Postgres};

use crate::{
    common::error::AppError,
    models::catalog::{Image, NewImage},
};

/// Insere uma linha em `images`. Chamado dentro da transação de quem anexa a imagem
/// (produto ou conferência).
pub(crate) async fn insert_image<'e, E>(executor: E, image: &NewImage) -> Result<Image, AppError>
where
    E: Executor<'e, Database = Postgres>,
{
    let image = sqlx::query_as::<_, Image>(
        r#"
        INSERT INTO images (
            name, file_path, alt_text, description, kind, resolution, size_kb,
            format, source_provider, source_query, source_url
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(&image.name)
    .bind(&image.file_path)
    .bind(&image.alt_text)
    .bind(&image.description)
    .bind(image.kind)
    .bind(&image.resolution)
    .bind(image.size_kb)
    .bind(&image.format)
    .bind(&image.source_provider)
    .bind(&image.source_query)
    .bind(&image.source_url)
    .fetch_one(executor)
    .await?;
    Ok(image)
}
