use crate::api::error::ApiError;
use crate::api::AppState;
use crate::auth::{extract_bearer_token, Authenticator, Identity};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};
use std::sync::Arc;
use tracing::debug;


/// Resolve the request's bearer token into an identity
pub fn authenticate_headers(
    headers: &HeaderMap,
    authenticator: &dyn Authenticator,
) -> Result<Identity, ApiError> {
    let token = extract_bearer_token(headers)
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    Ok(authenticator.authenticate(&token)?)
}

/// Auth middleware: every request must carry a valid bearer token.
///
/// The resolved [`Identity`] is attached to the request and reaches handlers
/// through the `Extension<Identity>` extractor.
pub async fn require_identity(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    match authenticate_headers(req.headers(), state.authenticator.as_ref()) {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(e) => {
            debug!(path = %req.uri().path(), error = ?e, "Rejected unauthenticated request");
            e.into_response()
        }
    }
}

/// Admin middleware: runs after [`require_identity`], rejects non-admins with 403
pub async fn require_admin(
    Extension(identity): Extension<Identity>,
    req: Request,
    next: Next,
) -> Response {
    if !identity.is_admin() {
        return ApiError::Forbidden("Forbidden: admin only".to_string()).into_response();
    }
    next.run(req).await
}
