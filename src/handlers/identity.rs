use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::utils::error::AppError;

/// Header carrying the caller's identity, set by the upstream identity provider.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Opaque identity of the user making the request.
#[derive(Debug, Clone)]
pub struct ActingUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::AuthError(format!("Missing {USER_ID_HEADER} header")))?;
        Ok(ActingUser(identity.to_string()))
    }
}
