// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

use crate::services::image_provider::ProviderError;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("{0}")]
    NotFound(String),

    #[error("Provedor de imagens indisponível: {0}")]
    ProviderUnavailable(String),

    #[error("Cota do provedor de imagens excedida")]
    ProviderQuotaExceeded,

    #[error("Falha ao armazenar imagem: {0}")]
    ImageStoreFailure(String),

    #[error("Imagem inválida: {0}")]
    InvalidImage(String),

    #[error("E-mail já existe")]
    EmailAlreadyExists,

    #[error("{0}")]
    Conflict(String),

    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Token inválido")]
    InvalidToken,

    #[error("Permissão '{0}' necessária")]
    Forbidden(&'static str),

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor: {0}")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de Bcrypt: {0}")]
    BcryptError(#[from] bcrypt::BcryptError),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl AppError {
    /// Erro de validação de um único campo, no mesmo formato do `validator`.
    pub fn field(field: &'static str, code: &'static str, message: impl Into<String>) -> Self {
        let message: String = message.into();
        let mut err = ValidationError::new(code);
        err.message = Some(message.into());
        let mut errors = ValidationErrors::new();
        errors.add(field, err);
        AppError::ValidationError(errors)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::ProviderQuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::EmailAlreadyExists | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidCredentials | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::QuotaExceeded => AppError::ProviderQuotaExceeded,
            ProviderError::Unavailable(msg) => AppError::ProviderUnavailable(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_message = match self {
            // Retorna todos os detalhes da validação, campo a campo.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string())
                        })
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                }));
                return (status, body).into_response();
            }
            AppError::NotFound(msg) => msg,
            AppError::InvalidImage(msg) => format!("Imagem inválida: {}", msg),
            AppError::ProviderUnavailable(msg) => {
                tracing::warn!("Provedor de imagens indisponível: {}", msg);
                "O provedor de imagens está indisponível no momento.".to_string()
            }
            AppError::ProviderQuotaExceeded => {
                "Cota do provedor de imagens excedida. Tente novamente mais tarde.".to_string()
            }
            AppError::EmailAlreadyExists => "Este e-mail já está em uso.".to_string(),
            AppError::Conflict(msg) => msg,
            AppError::InvalidCredentials => "E-mail ou senha inválidos.".to_string(),
            AppError::InvalidToken => {
                "Token de autenticação inválido ou ausente.".to_string()
            }
            AppError::Forbidden(perm) => {
                format!("Você precisa da permissão '{}' para realizar esta ação.", perm)
            }

            // Todos os outros erros viram 500. O `tracing` loga a mensagem detalhada.
            ref e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                "Ocorreu um erro inesperado.".to_string()
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_map_to_taxonomy() {
        let quota: AppError = ProviderError::QuotaExceeded.into();
        assert_eq!(quota.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let down: AppError = ProviderError::Unavailable("timeout".into()).into();
        assert_eq!(down.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn field_error_is_reported_under_its_field() {
        let err = AppError::field("quantity_recorded", "required", "A quantidade é obrigatória.");
        match &err {
            AppError::ValidationError(errors) => {
                let fields = errors.field_errors();
                assert!(fields.contains_key("quantity_recorded"));
            }
            other => panic!("variante inesperada: {other:?}"),
        }
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_is_404() {
        let resp = AppError::NotFound("Produto não encontrado.".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
