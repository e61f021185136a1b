use axum::{extract::Request, middleware::Next, response::Response};

use crate::error::AppError;
use crate::middleware::auth::AuthUser;

/// Middleware: requires an authenticated user carrying the admin claim.
/// Layer it inside `authenticate`.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    let user = req
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;

    if !user.is_admin {
        tracing::debug!(user_id = %user.id, path = %req.uri().path(), "admin route refused");
        return Err(AppError::Forbidden("Requires admin role".into()));
    }

    Ok(next.run(req).await)
}
