use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

use crate::errors::ServiceError;

/// The caller's identity, as asserted by the external identity layer in
/// front of this service. This core treats both fields as opaque
/// pass-through values.
#[derive(Debug, Clone)]
pub struct IdentityUser {
    pub user_id: String,
    pub email: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for IdentityUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ServiceError::Unauthorized("missing x-user-id header".to_string()))?
            .to_string();

        let email = parts
            .headers
            .get("x-user-email")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self { user_id, email })
    }
}
