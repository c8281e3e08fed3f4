// src/services/auth.rs

use bcrypt::{hash, verify};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::UserRepository,
    models::auth::{Claims, User, UserRole},
};

#[derive(Clone)]
pub struct AuthService {
    user_repo: UserRepository,
    jwt_secret: String,
    pool: PgPool,
}

impl AuthService {
    pub fn new(user_repo: UserRepository, jwt_secret: String, pool: PgPool) -> Self {
        Self { user_repo, jwt_secret, pool }
    }

    /// Registro público: sempre cria um cliente (`customer`).
    pub async fn register_user(&self, email: &str, password: &str) -> Result<String, AppError> {
        let hashed_password = hash_password(password).await?;

        let new_user = self
            .user_repo
            .create_user(&self.pool, email, &hashed_password, UserRole::Customer)
            .await?;

        self.create_token(new_user.id)
    }

    pub async fn login_user(&self, email: &str, password: &str) -> Result<String, AppError> {
        let user = self
            .user_repo
            .find_by_email(email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let password_clone = password.to_owned();
        let password_hash_clone = user.password_hash.clone();

        // Executa a verificação em um thread separado
        let is_password_valid =
            tokio::task::spawn_blocking(move || verify(&password_clone, &password_hash_clone))
                .await
                .map_err(|e| anyhow::anyhow!("Falha na task de verificação de senha: {}", e))??;

        if !is_password_valid {
            return Err(AppError::InvalidCredentials);
        }

        self.create_token(user.id)
    }

    pub async fn validate_token(&self, token: &str) -> Result<User, AppError> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_ref()),
            &Validation::default(),
        )
        .map_err(|_| AppError::InvalidToken)?;

        // Usuário removido depois da emissão do token
        self.user_repo
            .find_by_id(token_data.claims.sub)
            .await?
            .ok_or(AppError::InvalidToken)
    }

    /// Cria (ou promove) a conta staff configurada em BOOTSTRAP_STAFF_*.
    pub async fn ensure_bootstrap_staff(&self, email: &str, password: &str) -> Result<(), AppError> {
        if let Some(existing) = self.user_repo.find_by_email(email).await? {
            if existing.role != UserRole::Staff {
                self.user_repo.set_role(&self.pool, existing.id, UserRole::Staff).await?;
                tracing::info!(email, "conta promovida a staff");
            }
            return Ok(());
        }

        let hashed_password = hash_password(password).await?;
        self.user_repo
            .create_user(&self.pool, email, &hashed_password, UserRole::Staff)
            .await?;
        tracing::info!(email, "conta staff de bootstrap criada");
        Ok(())
    }

    fn create_token(&self, user_id: Uuid) -> Result<String, AppError> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::days(7);

        let claims = Claims {
            sub: user_id,
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )?)
    }
}

// bcrypt é caro; roda fora do runtime async
async fn hash_password(password: &str) -> Result<String, AppError> {
    let password_clone = password.to_owned();
    let hashed = tokio::task::spawn_blocking(move || hash(&password_clone, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| anyhow::anyhow!("Falha na task de hashing: {}", e))??;
    Ok(hashed)
}
