//! Account handlers: login, self-registration and the current user.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::dtos::auth::{AuthResponse, LoginRequest, RegisterRequest};
use crate::middleware::AuthUser;
use crate::models::{NewUser, Role, User};
use crate::utils::{hash_password, verify_password, Password, ValidatedJson};
use crate::AppState;

fn issue_token(state: &AppState, user: &User) -> Result<AuthResponse, AppError> {
    let token = state.jwt.generate_access_token(user).map_err(|e| {
        tracing::error!(error = %e, user_id = %user.id, "Failed to sign access token");
        AppError::InternalError(e)
    })?;

    Ok(AuthResponse {
        user: user.sanitized(),
        token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt.expiry_seconds(),
    })
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let invalid = || AppError::Unauthorized(anyhow::anyhow!("Invalid username or password"));

    let user = state
        .db
        .get_user_by_username(req.username.trim())
        .await?
        .ok_or_else(invalid)?;

    if !user.is_active {
        tracing::warn!(user_id = %user.id, "Login attempt on inactive account");
        return Err(invalid());
    }

    verify_password(&Password::new(req.password), &user.password_hash).map_err(|_| {
        tracing::warn!(user_id = %user.id, "Login failed: wrong password");
        invalid()
    })?;

    let response = issue_token(&state, &user)?;
    tracing::info!(user_id = %user.id, role = %user.role, "User logged in");

    Ok(Json(response))
}

/// POST /api/auth/register
///
/// Self-registration always creates a customer account.
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let password_hash = hash_password(&Password::new(req.password)).map_err(|e| {
        tracing::error!(error = %e, "Password hashing failed");
        AppError::InternalError(e)
    })?;

    let user = state
        .db
        .create_user(&NewUser {
            username: req.username.trim().to_string(),
            email: req.email,
            password_hash,
            role: Role::Customer,
            business_id: None,
        })
        .await?;

    let response = issue_token(&state, &user)?;
    tracing::info!(user_id = %user.id, "Customer registered");

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .db
        .get_user(claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    Ok(Json(user.sanitized()))
}
