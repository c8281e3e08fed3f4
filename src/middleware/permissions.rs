// src/middleware/permissions.rs

use axum::{extract::FromRequestParts, http::request::Parts};
use std::marker::PhantomData;

use crate::{
    common::error::AppError,
    models::auth::{User, UserRole},
};

/// 1. O Trait que define o que é uma Permissão
pub trait PermissionDef: Send + Sync + 'static {
    fn slug() -> &'static str;
    fn allows(role: UserRole) -> bool;
}

/// 2. O Extractor (Guardião). Depende do `auth_guard` ter rodado antes.
pub struct RequirePermission<T>(pub PhantomData<T>);

impl<T, S> FromRequestParts<S> for RequirePermission<T>
where
    T: PermissionDef,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts.extensions.get::<User>().ok_or(AppError::InvalidToken)?;

        if !T::allows(user.role) {
            tracing::debug!(user_id = %user.id, perm = T::slug(), "acesso negado");
            return Err(AppError::Forbidden(T::slug()));
        }

        Ok(RequirePermission(PhantomData))
    }
}

// ---
// DEFINIÇÃO DAS PERMISSÕES (TIPOS)
// ---

pub struct PermImageSearch;
impl PermissionDef for PermImageSearch {
    fn slug() -> &'static str { "store:image_search" }
    fn allows(role: UserRole) -> bool { role == UserRole::Staff }
}

pub struct PermCatalogAdmin;
impl PermissionDef for PermCatalogAdmin {
    fn slug() -> &'static str { "store:catalog_admin" }
    fn allows(role: UserRole) -> bool { role == UserRole::Staff }
}

pub struct PermAudit;
impl PermissionDef for PermAudit {
    fn slug() -> &'static str { "store:audit" }
    fn allows(role: UserRole) -> bool { matches!(role, UserRole::Worker | UserRole::Staff) }
}
