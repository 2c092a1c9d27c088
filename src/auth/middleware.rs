use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::auth::Claims;
use crate::error::{ApiError, ErrorCode};
use crate::services::audit_logger::AuditEvent;
use crate::AppState;

/// JWT Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok());

    let token = match auth_header.and_then(|v| v.strip_prefix("Bearer ")) {
        Some(token) if !token.trim().is_empty() => token.trim(),
        _ => {
            return ApiError::with_code(
                ErrorCode::TokenMissing,
                "Missing or invalid Authorization header",
            )
            .into_response();
        }
    };

    match state.jwt_service.decode_token(token) {
        Ok(claims) => {
            state
                .catalog
                .upsert_user(claims.sub, &claims.username, claims.role.as_str());
            debug!(user_id = claims.sub, role = %claims.role, "Request authenticated");
            // Add claims to request extensions for use in handlers
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Role-based authorization middleware for admin access
pub async fn require_admin_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    request: Request<Body>,
    next: Next,
) -> Response {
    if user.0.is_admin() {
        return next.run(request).await;
    }

    warn!(
        user_id = user.0.sub,
        path = %request.uri().path(),
        "Non-admin user attempted admin access"
    );
    state.audit_logger.log_async(AuditEvent::UnauthorizedAccess {
        user_id: user.0.sub,
        endpoint: request.uri().path().to_string(),
    });
    ApiError::with_code(ErrorCode::InsufficientPermissions, "Admin access required")
        .into_response()
}

/// Extractor for authenticated user claims
#[derive(Clone)]
pub struct AuthenticatedUser(pub Claims);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<Claims>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("No authentication found".to_string()))?;

        Ok(AuthenticatedUser(claims))
    }
}
