use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    utils::{Claims, error_codes, error_to_api_response, generate_token, success_to_api_response},
};

use super::model::{
    AuthResponse, IdentityResponse, LoginRequest, RefreshTokenResponse, RegisterRequest, User,
};

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    if !is_valid_email(&req.email) {
        return (
            StatusCode::OK,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "A valid email address is required".to_string(),
            ),
        );
    }

    if req.password.len() < 6 || req.password.len() > 24 {
        return (
            StatusCode::OK,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "Password must be between 6 and 24 characters".to_string(),
            ),
        );
    }

    if req.display_name.trim().is_empty() {
        return (
            StatusCode::OK,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "Display name must not be empty".to_string(),
            ),
        );
    }

    match User::create(&state.pool, req).await {
        Ok(user) => match generate_token(&user.email, &user.display_name, &state.config) {
            Ok(token) => (
                StatusCode::OK,
                success_to_api_response(AuthResponse {
                    email: user.email,
                    display_name: user.display_name,
                    token,
                }),
            ),
            Err(_) => (
                StatusCode::OK,
                error_to_api_response(
                    error_codes::INTERNAL_ERROR,
                    "Failed to generate token".to_string(),
                ),
            ),
        },
        Err(e) => {
            if e.to_string().contains("unique constraint") {
                (
                    StatusCode::OK,
                    error_to_api_response(
                        error_codes::USER_EXISTS,
                        "An account with this email already exists".to_string(),
                    ),
                )
            } else {
                tracing::error!("Failed to create user: {}", e);
                (
                    StatusCode::OK,
                    error_to_api_response(
                        error_codes::INTERNAL_ERROR,
                        "Failed to create account".to_string(),
                    ),
                )
            }
        }
    }
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let user = match User::find_by_email(&state.pool, &req.email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (
                StatusCode::OK,
                error_to_api_response(
                    error_codes::NOT_FOUND,
                    "No account found for this email".to_string(),
                ),
            );
        }
        Err(e) => {
            tracing::error!("Failed to look up user: {}", e);
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, "Database error".to_string()),
            );
        }
    };

    match user.verify_login(&req.password) {
        Ok(true) => (),
        Ok(false) => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::AUTH_FAILED, "Invalid password".to_string()),
            );
        }
        Err(_) => {
            return (
                StatusCode::OK,
                error_to_api_response(
                    error_codes::INTERNAL_ERROR,
                    "Failed to verify password".to_string(),
                ),
            );
        }
    }

    match generate_token(&user.email, &user.display_name, &state.config) {
        Ok(token) => (
            StatusCode::OK,
            success_to_api_response(AuthResponse {
                email: user.email,
                display_name: user.display_name,
                token,
            }),
        ),
        Err(_) => (
            StatusCode::OK,
            error_to_api_response(
                error_codes::INTERNAL_ERROR,
                "Failed to generate token".to_string(),
            ),
        ),
    }
}

/// Returns the identity carried by the verified token.
#[axum::debug_handler]
pub async fn me(Extension(claims): Extension<Claims>) -> impl IntoResponse {
    (
        StatusCode::OK,
        success_to_api_response(IdentityResponse {
            email: claims.sub,
            display_name: claims.name,
        }),
    )
}

#[axum::debug_handler]
pub async fn refresh_token(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match generate_token(&claims.sub, &claims.name, &state.config) {
        Ok(token) => (
            StatusCode::OK,
            success_to_api_response(RefreshTokenResponse { token }),
        ),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            error_to_api_response(
                error_codes::INTERNAL_ERROR,
                "Failed to refresh token".to_string(),
            ),
        ),
    }
}
