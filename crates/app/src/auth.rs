use axum::{extract::FromRequestParts, http::request::Parts};
use progress_core::model::UserId;

use crate::error::ApiError;

/// Header carrying the authenticated user id, set by the upstream auth proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The user a request acts on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or(ApiError::Unauthorized)?;
        let user_id = value
            .to_str()
            .map_err(|_| ApiError::Unauthorized)?
            .parse::<UserId>()
            .map_err(|_| ApiError::Unauthorized)?;
        Ok(Self(user_id))
    }
}
