use axum::extract::{Path, State};
use serde::Serialize;

use super::{
    Actor, AppState, PageParams,
    error::{ApiError, ApiResult},
    extract::{QueryParams, parse_id},
    videos::visible_video,
};
use crate::envelope::ApiResponse;
use crate::models::{Like, LikeTarget};
use crate::queries::{LikedVideo, LikedVideos};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeState {
    is_liked: bool,
}

async fn toggle(state: AppState, actor: Actor, target: LikeTarget) -> ApiResult<ApiResponse<LikeState>> {
    let kind = target.kind();
    let liker = actor.id().clone();
    let outcome = state
        .blocking(move |store| {
            if let LikeTarget::Video(video) = &target {
                visible_video(store, video, &liker)?;
            } else if !store.exists(target.collection(), target.id())? {
                return Err(ApiError::NotFound(target.kind()));
            }
            Ok(store.toggle(Like::new(target, liker))?)
        })
        .await?;

    let is_liked = outcome.is_added();
    let message = if is_liked {
        format!("Liked {kind}")
    } else {
        format!("Removed like from {kind}")
    };
    Ok(ApiResponse::ok(LikeState { is_liked }, message))
}

pub async fn toggle_video(
    State(state): State<AppState>,
    actor: Actor,
    Path(video_id): Path<String>,
) -> ApiResult<ApiResponse<LikeState>> {
    let target = LikeTarget::Video(parse_id(&video_id)?);
    toggle(state, actor, target).await
}

pub async fn toggle_comment(
    State(state): State<AppState>,
    actor: Actor,
    Path(comment_id): Path<String>,
) -> ApiResult<ApiResponse<LikeState>> {
    let target = LikeTarget::Comment(parse_id(&comment_id)?);
    toggle(state, actor, target).await
}

pub async fn toggle_tweet(
    State(state): State<AppState>,
    actor: Actor,
    Path(tweet_id): Path<String>,
) -> ApiResult<ApiResponse<LikeState>> {
    let target = LikeTarget::Tweet(parse_id(&tweet_id)?);
    toggle(state, actor, target).await
}

/// Videos the actor liked.
pub async fn liked_videos(
    State(state): State<AppState>,
    actor: Actor,
    QueryParams(params): QueryParams<PageParams>,
) -> ApiResult<ApiResponse<Vec<LikedVideo>>> {
    let query = LikedVideos::new()
        .liked_by(actor.id().clone())
        .seen_by(actor.id().clone());
    let page = params.page();
    let videos = state
        .blocking(move |store| Ok(query.fetch(store, page)?))
        .await?;
    Ok(ApiResponse::ok(videos, "Liked videos fetched successfully"))
}
