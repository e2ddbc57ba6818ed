use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::ApiError,
    extractors::AppJson,
    models::account::{
        AdminLoginRequest, AdminSignupRequest, CurrentAccount, LoginRequest, RefreshRequest,
        RefreshResponse, SignupRequest, UpdateProfileRequest,
    },
    services::{auth_service::AuthService, token_service::TokenService, AppState},
};

/// Both tokens ride as httpOnly cookies alongside the JSON body, so browser
/// clients need no token handling of their own.
fn session_cookies(state: &AppState, jar: CookieJar, access: &str, refresh: &str) -> CookieJar {
    let access_cookie = Cookie::build(("accessToken", access.to_string()))
        .path("/")
        .http_only(true)
        .secure(state.config.cookie.secure)
        .same_site(state.config.cookie.parse_same_site())
        .max_age(time::Duration::seconds(state.config.access_token_ttl_seconds))
        .build();

    let refresh_cookie = Cookie::build(("refreshToken", refresh.to_string()))
        .path("/")
        .http_only(true)
        .secure(state.config.cookie.secure)
        .same_site(state.config.cookie.parse_same_site())
        .max_age(time::Duration::seconds(
            state.config.refresh_token_ttl_seconds,
        ))
        .build();

    jar.add(access_cookie).add(refresh_cookie)
}

fn clear_session_cookies(state: &AppState, jar: CookieJar) -> CookieJar {
    let expire = |name: &'static str| {
        Cookie::build((name, ""))
            .path("/")
            .http_only(true)
            .secure(state.config.cookie.secure)
            .same_site(state.config.cookie.parse_same_site())
            .max_age(time::Duration::ZERO)
            .build()
    };
    jar.add(expire("accessToken")).add(expire("refreshToken"))
}

/// POST /api/v1/users/signup - Register a new user
pub async fn signup(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let service = AuthService::new(&state.config, state.mongo.clone());
    let profile = service.signup(req).await?;

    Ok((StatusCode::CREATED, Json(profile)))
}

/// POST /api/v1/users/login - Login with email and password
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let service = AuthService::new(&state.config, state.mongo.clone());
    let response = service.login(req).await?;

    let jar = session_cookies(&state, jar, &response.access_token, &response.refresh_token);
    Ok((StatusCode::OK, jar, Json(response)))
}

/// POST /api/v1/users/refresh-token - Rotate the refresh token
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // Cookie first, request body as a fallback for non-browser clients
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshRequest>(&body)
            .ok()
            .and_then(|req| req.refresh_token)
    };
    let refresh = jar
        .get("refreshToken")
        .map(|c| c.value().to_string())
        .or(from_body)
        .ok_or_else(|| ApiError::Unauthorized("Missing refresh token".to_string()))?;

    let tokens = TokenService::new(&state.config, state.mongo.clone());
    let (pair, _subject) = tokens.refresh(&refresh).await?;

    let jar = session_cookies(&state, jar, &pair.access_token, &pair.refresh_token);
    Ok((
        StatusCode::OK,
        jar,
        Json(RefreshResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }),
    ))
}

/// POST /api/v1/users/logout - Revoke the session and clear cookies
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<CurrentAccount>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let service = AuthService::new(&state.config, state.mongo.clone());
    service.logout(&account.id, account.role).await?;

    let jar = clear_session_cookies(&state, jar);
    Ok((
        StatusCode::OK,
        jar,
        Json(serde_json::json!({ "message": "Logged out successfully" })),
    ))
}

/// GET /api/v1/users/profile - Current user's profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<CurrentAccount>,
) -> Result<impl IntoResponse, ApiError> {
    let service = AuthService::new(&state.config, state.mongo.clone());
    let profile = service.get_user_profile(&account.id).await?;
    Ok(Json(profile))
}

/// PUT /api/v1/users/profile - Update the current user's profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(account): Extension<CurrentAccount>,
    AppJson(req): AppJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let service = AuthService::new(&state.config, state.mongo.clone());
    let profile = service.update_profile(&account.id, req).await?;
    Ok(Json(profile))
}

/// GET /api/v1/users - List all users (admin only)
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let service = AuthService::new(&state.config, state.mongo.clone());
    let users = service.list_users().await?;
    Ok(Json(users))
}

/// POST /api/v1/admin/signup - Register an admin (requires secret key)
pub async fn admin_signup(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<AdminSignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let service = AuthService::new(&state.config, state.mongo.clone());
    let profile = service.admin_signup(req).await?;

    Ok((StatusCode::CREATED, Json(profile)))
}

/// POST /api/v1/admin/login - Admin login (requires secret key)
pub async fn admin_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(req): AppJson<AdminLoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let service = AuthService::new(&state.config, state.mongo.clone());
    let response = service.admin_login(req).await?;

    let jar = session_cookies(&state, jar, &response.access_token, &response.refresh_token);
    Ok((StatusCode::OK, jar, Json(response)))
}
