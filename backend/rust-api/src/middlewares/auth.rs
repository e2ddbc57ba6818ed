use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use mongodb::bson::{doc, oid::ObjectId};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::account::{Admin, CurrentAccount, User};
use crate::services::{token_service::TokenService, AppState};

/// Extract the bearer token: `accessToken` cookie first, then the
/// Authorization header.
fn extract_token(jar: &CookieJar, request: &Request) -> Option<String> {
    if let Some(cookie) = jar.get("accessToken") {
        return Some(cookie.value().to_string());
    }

    request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.to_string())
}

/// Resolves the caller's identity and attaches it to request extensions.
/// Role enforcement is layered separately so public and admin-only routes
/// share this step.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(&jar, &request)
        .ok_or_else(|| ApiError::Unauthorized("Unauthorized request".to_string()))?;

    let tokens = TokenService::new(&state.config, state.mongo.clone());
    let claims = tokens.verify_access(&token)?;

    let account_id = ObjectId::parse_str(&claims.sub)
        .map_err(|_| ApiError::Unauthorized("Invalid access token".to_string()))?;

    // Users first, admins second
    let account = {
        let users = state.mongo.collection::<User>("users");
        match users.find_one(doc! { "_id": account_id }).await? {
            Some(user) => CurrentAccount {
                id: account_id,
                name: user.name,
                email: user.email,
                role: user.role,
                token_id: claims.token_id.clone(),
            },
            None => {
                let admins = state.mongo.collection::<Admin>("admins");
                let admin = admins
                    .find_one(doc! { "_id": account_id })
                    .await?
                    .ok_or_else(|| ApiError::Unauthorized("Invalid access token".to_string()))?;
                CurrentAccount {
                    id: account_id,
                    name: admin.name,
                    email: admin.email,
                    role: admin.role,
                    token_id: claims.token_id.clone(),
                }
            }
        }
    };

    tracing::debug!(
        account_id = %account.id.to_hex(),
        role = account.role.as_str(),
        "Authenticated request"
    );

    request.extensions_mut().insert(account);

    Ok(next.run(request).await)
}

/// Runs after `auth_middleware`; rejects non-admin callers.
pub async fn admin_guard_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    match request.extensions().get::<CurrentAccount>() {
        Some(account) if account.is_admin() => Ok(next.run(request).await),
        Some(account) => {
            tracing::warn!(
                account_id = %account.id.to_hex(),
                "Access denied: admin role required"
            );
            Err(ApiError::Forbidden(
                "Access denied. Admin privileges required".to_string(),
            ))
        }
        None => Err(ApiError::Unauthorized(
            "Authentication required".to_string(),
        )),
    }
}
