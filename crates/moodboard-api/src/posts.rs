use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use moodboard_auth::Principal;
use moodboard_types::api::{
    AddCommentRequest, CreatePostRequest, FeedPage, LikeState, PostDetail, ToggleLikeRequest,
};

use crate::AppState;
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    /// Id of the last post on the previous page.
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

pub async fn get_feed(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Json<FeedPage>> {
    let page = state
        .board
        .get_feed_page(&principal.id, query.cursor.as_deref(), query.limit)
        .await?;
    Ok(Json(page))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreatePostRequest>,
) -> ApiResult<impl IntoResponse> {
    let post = state
        .board
        .create_post(&principal.id, &req.content, req.emotion)
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(post_id): Path<String>,
) -> ApiResult<Json<PostDetail>> {
    Ok(Json(state.board.get_post(&post_id, &principal.id).await?))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(post_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.board.delete_post(&post_id, &principal.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_like(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(post_id): Path<String>,
    Json(req): Json<ToggleLikeRequest>,
) -> ApiResult<Json<LikeState>> {
    let like = state
        .board
        .toggle_like(&post_id, &principal.id, req.currently_liked)
        .await?;
    Ok(Json(like))
}

pub async fn add_comment(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(post_id): Path<String>,
    Json(req): Json<AddCommentRequest>,
) -> ApiResult<impl IntoResponse> {
    let comment = state
        .board
        .add_comment(&post_id, &principal.id, &req.content)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
