// src/services/media.rs

use std::{io::Cursor, path::PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, GenericImageView, ImageFormat};
use uuid::Uuid;

use crate::common::error::AppError;

/// Subpasta (relativa à raiz de mídia) onde ficam as imagens de produto.
pub const IMAGES_DIR: &str = "images";

const MAX_WIDTH: u32 = 1920;
const MAX_HEIGHT: u32 = 1080;
const JPEG_QUALITY: u8 = 85;

/// Resultado da ingestão: arquivo gravado + metadados derivados.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    /// Relativo à raiz de mídia, ex: "images/widget-42_1_20260101120000_a1b2c3.jpg"
    pub file_path: String,
    pub resolution: String,
    pub size_kb: i32,
    pub format: String,
}

/// Imagem já validada e (se preciso) redimensionada, ainda não gravada.
#[derive(Debug)]
struct PreparedImage {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
    format: &'static str,
    extension: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
    base_url: String,
}

impl MediaStorage {
    pub fn new(root: PathBuf, base_url: String) -> Self {
        Self { root, base_url }
    }

    pub async fn ensure_root(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(self.root.join(IMAGES_DIR)).await
    }

    /// URL pública de um caminho relativo.
    pub fn url_for(&self, file_path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            file_path.trim_start_matches('/')
        )
    }

    /// Grava bytes crus em `images/<file_name>` e devolve o caminho relativo.
    pub async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<String, AppError> {
        let relative = format!("{}/{}", IMAGES_DIR, file_name);
        let absolute = self.root.join(&relative);

        if let Some(parent) = absolute.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::ImageStoreFailure(format!("não foi possível criar {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(&absolute, bytes).await.map_err(|e| {
            AppError::ImageStoreFailure(format!("não foi possível gravar {}: {}", relative, e))
        })?;

        Ok(relative)
    }

    /// Remove um arquivo gravado (usado quando a escrita no banco falha depois).
    pub async fn remove(&self, file_path: &str) {
        if let Err(e) = tokio::fs::remove_file(self.root.join(file_path)).await {
            tracing::warn!(file_path, "falha ao remover arquivo órfão: {}", e);
        }
    }

    /// Valida, redimensiona se passar de 1920x1080 e grava a imagem.
    /// `stem` vira o prefixo do nome do arquivo; `extension_hint` é usado
    /// só quando o formato detectado não tem extensão conhecida.
    pub async fn store_image_bytes(
        &self,
        bytes: Vec<u8>,
        stem: &str,
        extension_hint: Option<&str>,
    ) -> Result<StoredFile, AppError> {
        let prepared = tokio::task::spawn_blocking(move || prepare_image(bytes))
            .await
            .map_err(|e| AppError::InternalServerError(anyhow::anyhow!(e)))??;

        let extension = prepared
            .extension
            .or_else(|| extension_hint.and_then(normalize_extension))
            .unwrap_or("jpg");

        let file_name = unique_file_name(stem, extension);
        let file_path = self.save(&file_name, &prepared.bytes).await?;

        Ok(StoredFile {
            file_path,
            resolution: format!("{}x{}", prepared.width, prepared.height),
            size_kb: i32::try_from(prepared.bytes.len().div_ceil(1024)).unwrap_or(i32::MAX),
            format: prepared.format.to_string(),
        })
    }
}

fn prepare_image(bytes: Vec<u8>) -> Result<PreparedImage, AppError> {
    if bytes.is_empty() {
        return Err(AppError::InvalidImage("arquivo vazio".into()));
    }

    let detected = image::guess_format(&bytes)
        .map_err(|e| AppError::InvalidImage(format!("formato não reconhecido: {}", e)))?;
    let img = image::load_from_memory(&bytes)
        .map_err(|e| AppError::InvalidImage(format!("não foi possível decodificar: {}", e)))?;

    let (width, height) = img.dimensions();
    if width <= MAX_WIDTH && height <= MAX_HEIGHT {
        return Ok(PreparedImage {
            bytes,
            width,
            height,
            format: format_name(detected),
            extension: format_extension(detected),
        });
    }

    let resized = img.resize(MAX_WIDTH, MAX_HEIGHT, FilterType::Lanczos3);
    let (width, height) = resized.dimensions();
    let mut cursor = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
    resized
        .to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| AppError::ImageStoreFailure(format!("falha ao recomprimir: {}", e)))?;

    Ok(PreparedImage {
        bytes: cursor.into_inner(),
        width,
        height,
        format: "jpeg",
        extension: Some("jpg"),
    })
}

fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Ico => "ico",
        ImageFormat::Tiff => "tiff",
        _ => "unknown",
    }
}

fn format_extension(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("png"),
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::Gif => Some("gif"),
        ImageFormat::WebP => Some("webp"),
        ImageFormat::Bmp => Some("bmp"),
        _ => None,
    }
}

fn normalize_extension(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "png" => Some("png"),
        "jpg" | "jpeg" => Some("jpg"),
        "gif" => Some("gif"),
        "webp" => Some("webp"),
        "bmp" => Some("bmp"),
        _ => None,
    }
}

/// Extensão sugerida pela URL (sem query string) ou, na falta, pelo Content-Type.
pub fn extension_hint(url: &str, content_type: Option<&str>) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let from_url = path
        .rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .and_then(|(_, ext)| normalize_extension(ext));

    from_url
        .or_else(|| {
            content_type
                .and_then(|ct| ct.split(';').next())
                .and_then(|mime| mime.trim().strip_prefix("image/"))
                .and_then(normalize_extension)
        })
        .map(str::to_string)
}

/// `{stem}_{AAAAMMDDHHMMSS}_{6 hex}.{ext}`
pub fn unique_file_name(stem: &str, extension: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}.{}",
        stem,
        Utc::now().format("%Y%m%d%H%M%S"),
        &random[..6],
        extension
    )
}

/// Decodifica `data:image/<fmt>;base64,<payload>`.
/// Retorna os bytes e o subtipo declarado (ex: "png").
pub fn decode_data_url(data_url: &str) -> Result<(Vec<u8>, String), AppError> {
    let invalid = |msg: &str| AppError::InvalidImage(msg.to_string());

    let rest = data_url
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| invalid("esperado um data URL"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| invalid("data URL sem conteúdo"))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| invalid("data URL deve estar em base64"))?;
    let subtype = mime
        .strip_prefix("image/")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid("data URL não é uma imagem"))?;

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::InvalidImage(format!("base64 inválido: {}", e)))?;
    if bytes.is_empty() {
        return Err(invalid("imagem vazia"));
    }

    Ok((bytes, subtype.to_ascii_lowercase()))
}
