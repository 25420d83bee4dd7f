//! Extractors that make the authenticated identity explicit in handler
//! signatures instead of being fished out of extensions ad hoc.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::AppError;

/// The verified identity behind the request, set by
/// [`super::auth::require_identity`].
#[derive(Debug, Clone, Copy)]
pub struct User {
    pub id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for User
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .extensions
            .get::<Uuid>()
            .copied()
            .ok_or(AppError::Unauthorized)?;
        Ok(User { id: user_id })
    }
}
