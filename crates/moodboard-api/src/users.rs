use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::Deserialize;

use moodboard_auth::Principal;
use moodboard_core::{AvatarUpload, ProfileUpdate};
use moodboard_types::api::{
    PostView, ProfileView, RelationshipState, RelationshipView, RespondFriendRequest,
    UpdateProfileRequest, UserSummary,
};
use moodboard_types::models::FriendRequest;

use crate::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct PostsQuery {
    pub limit: Option<usize>,
}

pub async fn get_me(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<ProfileView>> {
    Ok(Json(state.board.get_profile(&principal.id).await?))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<ProfileView>> {
    Ok(Json(state.board.get_profile(&user_id).await?))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<ProfileView>> {
    let avatar = match req.avatar {
        Some(encoded) => {
            let content_type = req
                .avatar_content_type
                .ok_or_else(|| ApiError::BadRequest("avatar_content_type is required".into()))?;
            let bytes = B64
                .decode(encoded)
                .map_err(|_| ApiError::BadRequest("avatar is not valid base64".into()))?;
            Some(AvatarUpload {
                bytes,
                content_type,
            })
        }
        None => None,
    };

    let profile = state
        .board
        .update_profile(
            &principal.id,
            ProfileUpdate {
                handle: req.handle,
                bio: req.bio,
                avatar,
            },
        )
        .await?;
    Ok(Json(profile))
}

pub async fn list_posts(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<String>,
    Query(query): Query<PostsQuery>,
) -> ApiResult<Json<Vec<PostView>>> {
    let posts = state
        .board
        .list_user_posts(&user_id, &principal.id, query.limit)
        .await?;
    Ok(Json(posts))
}

pub async fn list_friends(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    Ok(Json(state.board.list_friends(&user_id).await?))
}

pub async fn relationship(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<RelationshipView>> {
    let rel = state
        .board
        .get_relationship_state(&principal.id, &user_id)
        .await?;
    Ok(Json(RelationshipView {
        user_id,
        state: rel,
    }))
}

pub async fn send_friend_request(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<FriendRequest>> {
    let request = state
        .board
        .send_friend_request(&principal.id, &user_id)
        .await?;
    Ok(Json(request))
}

pub async fn cancel_friend_request(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<String>,
) -> ApiResult<StatusCode> {
    if state
        .board
        .cancel_pending_request(&principal.id, &user_id)
        .await?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(moodboard_core::Error::NotFound("pending friend request".into()).into())
    }
}

/// The caller answers as the receiver; the sender comes from the request.
pub async fn respond_friend_request(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(request_id): Path<String>,
    Json(req): Json<RespondFriendRequest>,
) -> ApiResult<Json<RelationshipView>> {
    let request = state.board.get_friend_request(&request_id).await?;
    let rel: RelationshipState = state
        .board
        .respond_to_friend_request(&request_id, req.accept, &principal.id, &request.sender_id)
        .await?;
    Ok(Json(RelationshipView {
        user_id: request.sender_id,
        state: rel,
    }))
}
