use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use moodboard_auth::Principal;
use moodboard_types::api::{AuthResponse, LoginRequest, RegisterRequest};

use crate::AppState;
use crate::error::ApiResult;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let (session, user) = state
        .board
        .register(&req.email, &req.handle, &req.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user_id: user.id,
            handle: user.handle,
            token: session.token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let (session, user) = state.board.sign_in(&req.handle, &req.password).await?;
    info!("User logged in: {}", user.handle);

    Ok(Json(AuthResponse {
        user_id: user.id,
        handle: user.handle,
        token: session.token,
    }))
}

/// Ends every session of the caller, including the one making the request.
pub async fn logout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<StatusCode> {
    state.board.sign_out(&principal.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
