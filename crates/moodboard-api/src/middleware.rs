use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::AppState;
use crate::error::ApiError;

/// Verify the bearer token and attach the caller's
/// [`Principal`](moodboard_auth::Principal) to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(ApiError::Unauthorized)?;
    let principal = state.board.authenticate(bearer.token()).await?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
