// src/config.rs

use std::{env, path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

use crate::{
    db::{AuditRepository, CatalogRepository, UserRepository},
    services::{
        audit_service::AuditService,
        auth::AuthService,
        catalog_service::CatalogService,
        image_provider::{GoogleImageProvider, HttpImageFetcher},
        image_search::ImageSearchService,
        media::MediaStorage,
    },
};

pub const DEFAULT_PROVIDER_ENDPOINT: &str = "https://customsearch.googleapis.com/customsearch/v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} deve ser definida")]
    Missing(&'static str),

    #[error("valor inválido para {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Opções da busca de imagens (provedor externo + fluxo em lote).
#[derive(Debug, Clone)]
pub struct ImageSearchConfig {
    pub api_key: Option<String>,
    pub cse_id: Option<String>,
    pub endpoint: String,
    /// Quantidade alvo de imagens por produto.
    pub target_count: u32,
    pub provider_timeout: Duration,
    pub download_timeout: Duration,
    /// Placeholders: {name}, {article}, {category}
    pub query_template: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub media_root: PathBuf,
    pub media_url: String,
    pub max_upload_bytes: usize,
    pub image_search: ImageSearchConfig,
    pub bootstrap_staff: Option<(String, String)>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Lê as configurações de qualquer fonte chave -> valor (env, testes).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let image_search = ImageSearchConfig {
            api_key: get("GOOGLE_API_KEY"),
            cse_id: get("GOOGLE_CSE_ID"),
            endpoint: get("IMAGE_PROVIDER_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_PROVIDER_ENDPOINT.to_string()),
            target_count: parse_or("IMAGE_SEARCH_TARGET_COUNT", get("IMAGE_SEARCH_TARGET_COUNT"), 3)?,
            provider_timeout: Duration::from_secs(parse_or(
                "IMAGE_PROVIDER_TIMEOUT_SECS",
                get("IMAGE_PROVIDER_TIMEOUT_SECS"),
                10,
            )?),
            download_timeout: Duration::from_secs(parse_or(
                "IMAGE_DOWNLOAD_TIMEOUT_SECS",
                get("IMAGE_DOWNLOAD_TIMEOUT_SECS"),
                15,
            )?),
            query_template: get("IMAGE_SEARCH_QUERY_TEMPLATE")
                .unwrap_or_else(|| "{name} {category}".to_string()),
        };

        if image_search.target_count == 0 {
            return Err(ConfigError::Invalid {
                key: "IMAGE_SEARCH_TARGET_COUNT",
                value: "0".into(),
            });
        }

        let bootstrap_staff = match (get("BOOTSTRAP_STAFF_EMAIL"), get("BOOTSTRAP_STAFF_PASSWORD")) {
            (Some(email), Some(password)) => Some((email, password)),
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", get("DB_MAX_CONNECTIONS"), 5)?,
            media_root: PathBuf::from(get("MEDIA_ROOT").unwrap_or_else(|| "./media".to_string())),
            media_url: get("MEDIA_URL").unwrap_or_else(|| "/media".to_string()),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", get("MAX_UPLOAD_BYTES"), 10 * 1024 * 1024)?,
            image_search,
            bootstrap_staff,
        })
    }
}

fn parse_or<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub settings: Arc<Settings>,
    pub auth_service: AuthService,
    pub catalog_service: CatalogService,
    pub image_search_service: ImageSearchService,
    pub audit_service: AuditService,
}

impl AppState {
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(settings.db_max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&settings.database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        let media = MediaStorage::new(settings.media_root.clone(), settings.media_url.clone());
        media.ensure_root().await?;

        // --- Monta o gráfico de dependências ---
        let user_repo = UserRepository::new(db_pool.clone());
        let catalog_repo = CatalogRepository::new(db_pool.clone());
        let audit_repo = AuditRepository::new(db_pool.clone());

        let provider = GoogleImageProvider::new(&settings.image_search)?;
        let fetcher = HttpImageFetcher::new(settings.image_search.download_timeout)?;

        let auth_service = AuthService::new(user_repo, settings.jwt_secret.clone(), db_pool.clone());
        let catalog_service = CatalogService::new(catalog_repo.clone(), db_pool.clone(), media.clone());
        let image_search_service = ImageSearchService::new(
            Arc::new(catalog_repo),
            Arc::new(provider),
            Arc::new(fetcher),
            media.clone(),
            settings.image_search.clone(),
        );
        let audit_service = AuditService::new(Arc::new(audit_repo), media);

        Ok(Self {
            db_pool,
            settings: Arc::new(settings),
            auth_service,
            catalog_service,
            image_search_service,
            audit_service,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_applied() {
        let settings = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/store"),
            ("JWT_SECRET", "segredo"),
        ]))
        .unwrap();

        assert_eq!(settings.bind_addr, "0.0.0.0:3000");
        assert_eq!(settings.image_search.target_count, 3);
        assert_eq!(settings.image_search.provider_timeout, Duration::from_secs(10));
        assert_eq!(settings.image_search.query_template, "{name} {category}");
        assert_eq!(settings.image_search.endpoint, DEFAULT_PROVIDER_ENDPOINT);
        assert!(settings.image_search.api_key.is_none());
        assert!(settings.bootstrap_staff.is_none());
    }

    #[test]
    fn required_keys_are_reported() {
        let err = Settings::from_lookup(lookup(&[("JWT_SECRET", "x")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/store"),
            ("JWT_SECRET", "x"),
            ("IMAGE_PROVIDER_TIMEOUT_SECS", "dez"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "IMAGE_PROVIDER_TIMEOUT_SECS", .. }));

        let zero = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/store"),
            ("JWT_SECRET", "x"),
            ("IMAGE_SEARCH_TARGET_COUNT", "0"),
        ]));
        assert!(zero.is_err());
    }

    #[test]
    fn overrides_are_read() {
        let settings = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/store"),
            ("JWT_SECRET", "x"),
            ("IMAGE_SEARCH_TARGET_COUNT", "5"),
            ("IMAGE_SEARCH_QUERY_TEMPLATE", "{article} {name}"),
            ("BOOTSTRAP_STAFF_EMAIL", "staff@loja.com"),
            ("BOOTSTRAP_STAFF_PASSWORD", "senha123"),
        ]))
        .unwrap();
        assert_eq!(settings.image_search.target_count, 5);
        assert_eq!(settings.image_search.query_template, "{article} {name}");
        assert_eq!(
            settings.bootstrap_staff,
            Some(("staff@loja.com".to_string(), "senha123".to_string()))
        );
    }
}
