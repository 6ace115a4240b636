use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;

use moodboard_auth::Principal;
use moodboard_types::api::{PostView, UserSummary};
use moodboard_types::models::Emotion;

use crate::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct UserSearch {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct EmotionSearch {
    /// Emoji or name, e.g. `😊` or `happy`.
    pub emotion: String,
}

pub async fn users(
    State(state): State<AppState>,
    Query(query): Query<UserSearch>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    Ok(Json(state.board.search_users(&query.q).await?))
}

pub async fn posts(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<EmotionSearch>,
) -> ApiResult<Json<Vec<PostView>>> {
    let emotion: Emotion = query
        .emotion
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    let posts = state
        .board
        .search_posts_by_emotion(emotion, &principal.id)
        .await?;
    Ok(Json(posts))
}
