use crate::error::ApiError;
use axum::{extract::Request, middleware::Next, response::Response};

pub const USER_ID_HEADER: &str = "X-User-Id";

/// Identity of the authenticated caller, set by [`require_user`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

/// Rejects requests without a usable `X-User-Id` header and stores the
/// caller's id in request extensions for handlers.
pub async fn require_user(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let user_id = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::Unauthorized)?;

    tracing::debug!(%user_id, "user identified");
    request.extensions_mut().insert(UserId(user_id));

    Ok(next.run(request).await)
}
