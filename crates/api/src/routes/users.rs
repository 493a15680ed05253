//! Account and user-administration route handlers.
//!
//! Login, registration and refresh return the token pair in the body and
//! also set it as `HttpOnly` cookies, so browser clients never have to
//! store tokens in script-accessible storage.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
};
use chrono::Duration;
use electomart_core::UserId;
use electomart_core::domain::PageRequest;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::instrument;

use crate::db::UserRepository;
use crate::error::{AppError, Result};
use crate::middleware::{ACCESS_COOKIE, REFRESH_COOKIE, RequireAdmin, RequireAuth, cookie_value};
use crate::models::user::{UpdateProfile, UpdateRole, User, UserPage, UserQuery};
use crate::routes::extract::{ApiJson, ApiPath, ApiQuery};
use crate::routes::products::not_found;
use crate::services::AuthService;
use crate::services::auth::{AuthSession, RESET_TOKEN_TTL_MINUTES, validate_name};
use crate::state::AppState;

/// Body of `POST /api/users/register`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Body of `POST /api/users/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST /api/users/refresh` and `/logout`; the cookie is used when
/// the body carries no token.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Body of `PUT /api/users/me/password`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Body of `POST /api/users/forgot-password`.
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Body of `POST /api/users/reset-password`.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

/// A bare acknowledgement.
#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

// =============================================================================
// Cookies
// =============================================================================

fn auth_cookie(state: &AppState, name: &str, value: &str, max_age: Duration) -> String {
    let secure = if state.config().secure_cookies() {
        "; Secure"
    } else {
        ""
    };
    format!(
        "{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{secure}",
        max_age.num_seconds().max(0)
    )
}

/// `Set-Cookie` headers for both tokens.
type CookieHeaders = AppendHeaders<[(HeaderName, String); 2]>;

fn session_cookies(state: &AppState, session: &AuthSession) -> CookieHeaders {
    let tokens = state.tokens();
    AppendHeaders([
        (
            SET_COOKIE,
            auth_cookie(state, ACCESS_COOKIE, &session.access_token, tokens.access_ttl()),
        ),
        (
            SET_COOKIE,
            auth_cookie(state, REFRESH_COOKIE, &session.refresh_token, tokens.refresh_ttl()),
        ),
    ])
}

fn cleared_cookies(state: &AppState) -> CookieHeaders {
    AppendHeaders([
        (SET_COOKIE, auth_cookie(state, ACCESS_COOKIE, "", Duration::zero())),
        (SET_COOKIE, auth_cookie(state, REFRESH_COOKIE, "", Duration::zero())),
    ])
}

/// Parse an optional JSON body; an empty body yields the default.
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("Invalid JSON body: {e}")))
}

/// Refresh token from the body, falling back to the cookie.
fn presented_refresh_token(headers: &HeaderMap, body: &Bytes) -> Result<Option<String>> {
    let request: RefreshRequest = optional_json(body)?;
    Ok(request
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| cookie_value(headers, REFRESH_COOKIE).map(str::to_owned)))
}

// =============================================================================
// Authentication
// =============================================================================

/// `POST /api/users/register`
#[instrument(skip(state, body), fields(email = %body.email))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let session = AuthService::new(state.pool(), state.tokens())
        .register(&body.name, &body.email, &body.password)
        .await?;

    tracing::info!(user_id = %session.user.id, "User registered");
    Ok((
        StatusCode::CREATED,
        session_cookies(&state, &session),
        Json(session),
    ))
}

/// `POST /api/users/login`
#[instrument(skip(state, body), fields(email = %body.email))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse> {
    let session = AuthService::new(state.pool(), state.tokens())
        .login(&body.email, &body.password)
        .await?;

    tracing::info!(user_id = %session.user.id, "User logged in");
    Ok((session_cookies(&state, &session), Json(session)))
}

/// `POST /api/users/refresh`
#[instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let token = presented_refresh_token(&headers, &body)?
        .ok_or_else(|| AppError::Unauthorized("Refresh token required".to_string()))?;

    let session = AuthService::new(state.pool(), state.tokens())
        .refresh(&token)
        .await?;
    Ok((session_cookies(&state, &session), Json(session)))
}

/// `POST /api/users/logout`
///
/// Revokes the presented refresh token and clears the cookies. Succeeds
/// even without a token so clients can always reset their state.
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse> {
    if let Some(token) = presented_refresh_token(&headers, &body)? {
        AuthService::new(state.pool(), state.tokens())
            .logout(&token)
            .await?;
    }
    Ok((
        cleared_cookies(&state),
        Json(Message {
            message: "Logged out",
        }),
    ))
}

/// `POST /api/users/forgot-password`
///
/// Always answers 200 so the endpoint cannot be used to probe for accounts.
#[instrument(skip(state, body))]
pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ForgotPasswordRequest>,
) -> Result<Json<Message>> {
    let reset = AuthService::new(state.pool(), state.tokens())
        .request_password_reset(&body.email)
        .await?;

    if let Some((user, token)) = reset {
        let reset_url = format!("{}/reset-password?token={token}", state.config().client_url);
        let state = state.clone();
        tokio::spawn(async move {
            let Some(email) = state.email() else {
                tracing::warn!(user_id = %user.id, "Password reset requested but email is not configured");
                return;
            };
            if let Err(e) = email
                .send_password_reset(user.email.as_str(), &user.name, &reset_url, RESET_TOKEN_TTL_MINUTES)
                .await
            {
                tracing::warn!(user_id = %user.id, error = %e, "Password reset email failed");
            }
        });
    }

    Ok(Json(Message {
        message: "If an account exists for that email, a reset link has been sent",
    }))
}

/// `POST /api/users/reset-password`
#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ResetPasswordRequest>,
) -> Result<Json<Message>> {
    AuthService::new(state.pool(), state.tokens())
        .reset_password(body.token.trim(), &body.password)
        .await?;

    tracing::info!("Password reset");
    Ok(Json(Message {
        message: "Password has been reset, please log in",
    }))
}

// =============================================================================
// Profile
// =============================================================================

/// `GET /api/users/me`
#[instrument(skip(state, auth), fields(user_id = %auth.0.sub))]
pub async fn me(State(state): State<AppState>, auth: RequireAuth) -> Result<Json<User>> {
    let user = AuthService::new(state.pool(), state.tokens())
        .get_user(auth.0.sub)
        .await?;
    Ok(Json(user))
}

/// `PUT /api/users/me`
#[instrument(skip(state, auth, body), fields(user_id = %auth.0.sub))]
pub async fn update_me(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiJson(mut body): ApiJson<UpdateProfile>,
) -> Result<Json<User>> {
    if let Some(name) = body.name.as_deref() {
        body.name = Some(validate_name(name)?.to_owned());
    }
    let user = UserRepository::new(state.pool())
        .update_profile(auth.0.sub, &body)
        .await
        .map_err(not_found("User not found"))?;
    Ok(Json(user))
}

/// `PUT /api/users/me/password`
#[instrument(skip(state, auth, body), fields(user_id = %auth.0.sub))]
pub async fn change_password(
    State(state): State<AppState>,
    auth: RequireAuth,
    ApiJson(body): ApiJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse> {
    AuthService::new(state.pool(), state.tokens())
        .change_password(auth.0.sub, &body.current_password, &body.new_password)
        .await?;

    tracing::info!("Password changed");
    Ok((
        cleared_cookies(&state),
        Json(Message {
            message: "Password changed, please log in again",
        }),
    ))
}

// =============================================================================
// Administration
// =============================================================================

/// `GET /api/users` (admin)
#[instrument(skip(state, _admin))]
pub async fn index(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> Result<Json<UserPage>> {
    let page = PageRequest::new(query.page, query.limit);
    let (users, total) = UserRepository::new(state.pool()).list(page).await?;

    Ok(Json(UserPage {
        users,
        page: page.page(),
        pages: page.pages(total),
        total,
    }))
}

/// `GET /api/users/{id}` (admin)
#[instrument(skip(state, _admin))]
pub async fn show(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<User>> {
    let user = UserRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(user))
}

/// `PUT /api/users/{id}/role` (admin)
///
/// Admins cannot change their own role, so the last admin cannot lock
/// everyone out by accident.
#[instrument(skip(state, admin), fields(admin_id = %admin.0.sub))]
pub async fn update_role(
    State(state): State<AppState>,
    admin: RequireAdmin,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(body): ApiJson<UpdateRole>,
) -> Result<Json<User>> {
    if id == admin.0.sub {
        return Err(AppError::BadRequest(
            "You cannot change your own role".to_string(),
        ));
    }
    let user = UserRepository::new(state.pool())
        .set_role(id, body.role)
        .await
        .map_err(not_found("User not found"))?;

    tracing::info!(user_id = %id, role = %user.role, "User role changed");
    Ok(Json(user))
}

/// `DELETE /api/users/{id}` (admin)
#[instrument(skip(state, admin), fields(admin_id = %admin.0.sub))]
pub async fn destroy(
    State(state): State<AppState>,
    admin: RequireAdmin,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<Message>> {
    if id == admin.0.sub {
        return Err(AppError::BadRequest(
            "You cannot delete your own account".to_string(),
        ));
    }
    UserRepository::new(state.pool())
        .delete(id)
        .await
        .map_err(not_found("User not found"))?;

    tracing::info!(user_id = %id, "User deleted");
    Ok(Json(Message {
        message: "User deleted",
    }))
}
