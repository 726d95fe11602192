//! The actor's own channel: statistics, uploads and the likes they received.

use axum::extract::State;

use super::{
    Actor, AppState, PageParams,
    error::ApiResult,
    extract::QueryParams,
};
use crate::envelope::ApiResponse;
use crate::queries::{self, ChannelStats, LikedVideo, LikedVideos, VideoCard, VideoListing};

pub async fn stats(
    State(state): State<AppState>,
    actor: Actor,
) -> ApiResult<ApiResponse<ChannelStats>> {
    let channel = actor.id().clone();
    let stats = state
        .blocking(move |store| Ok(queries::channel_stats(store, &channel)?))
        .await?;
    Ok(ApiResponse::ok(stats, "Channel stats fetched successfully"))
}

/// Every upload of the actor, published or not.
pub async fn videos(
    State(state): State<AppState>,
    actor: Actor,
    QueryParams(params): QueryParams<PageParams>,
) -> ApiResult<ApiResponse<Vec<VideoCard>>> {
    let listing = VideoListing {
        owner: Some(actor.id().clone()),
        include_unpublished: true,
        ..VideoListing::default()
    };
    let page = params.page();
    let videos = state
        .blocking(move |store| Ok(listing.fetch(store, page)?))
        .await?;
    Ok(ApiResponse::ok(videos, "Channel videos fetched successfully"))
}

/// The actor's videos that received likes, with their like counts.
pub async fn liked_videos(
    State(state): State<AppState>,
    actor: Actor,
    QueryParams(params): QueryParams<PageParams>,
) -> ApiResult<ApiResponse<Vec<LikedVideo>>> {
    let query = LikedVideos::new()
        .owned_by(actor.id().clone())
        .seen_by(actor.id().clone());
    let page = params.page();
    let videos = state
        .blocking(move |store| Ok(query.fetch(store, page)?))
        .await?;
    Ok(ApiResponse::ok(videos, "Liked channel videos fetched successfully"))
}
