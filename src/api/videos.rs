use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::{
    Actor, AppState,
    error::{ApiError, ApiResult},
    extract::{JsonBody, QueryParams, optional, parse_id, required},
};
use crate::envelope::ApiResponse;
use crate::models::{Collection, Comment, DocId, User, Video};
use crate::pipeline::{Filter, SortOrder};
use crate::queries::{self, Page, VideoCard, VideoDetails, VideoListing, VideoSort};
use crate::store::DocumentStore;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    user_id: Option<String>,
    query: Option<String>,
    sort_by: Option<String>,
    sort_type: Option<String>,
    page: Option<usize>,
    limit: Option<usize>,
}

pub async fn list(
    State(state): State<AppState>,
    actor: Actor,
    QueryParams(params): QueryParams<ListParams>,
) -> ApiResult<ApiResponse<Vec<VideoCard>>> {
    let owner = optional(params.user_id).map(|raw| parse_id(&raw)).transpose()?;
    let sort = match optional(params.sort_by) {
        Some(raw) => VideoSort::parse(&raw)
            .ok_or_else(|| ApiError::InvalidParameter(format!("cannot sort videos by `{raw}`")))?,
        None => VideoSort::default(),
    };
    let order = match optional(params.sort_type).as_deref() {
        None | Some("desc") => SortOrder::Desc,
        Some("asc") => SortOrder::Asc,
        Some(other) => {
            return Err(ApiError::InvalidParameter(format!(
                "sortType must be `asc` or `desc`, got `{other}`"
            )));
        }
    };

    let listing = VideoListing {
        include_unpublished: owner.as_ref() == Some(actor.id()),
        owner,
        search: optional(params.query),
        sort,
        order,
    };
    let page = Page::new(params.page, params.limit);
    let videos = state
        .blocking(move |store| Ok(listing.fetch(store, page)?))
        .await?;
    Ok(ApiResponse::ok(videos, "Videos fetched successfully"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    title: Option<String>,
    description: Option<String>,
    video_file: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
}

pub async fn publish(
    State(state): State<AppState>,
    actor: Actor,
    JsonBody(body): JsonBody<PublishRequest>,
) -> ApiResult<ApiResponse<Video>> {
    let title = required(body.title, "title")?;
    let description = required(body.description, "description")?;
    let video_file = required(body.video_file, "videoFile")?;
    let thumbnail = required(body.thumbnail, "thumbnail")?;

    let video = Video::new(
        actor.id().clone(),
        &title,
        &description,
        &video_file,
        &thumbnail,
        body.duration.unwrap_or(0.0),
    );
    let video = state
        .blocking(move |store| {
            store.insert(&video)?;
            Ok(video)
        })
        .await?;

    info!(video = %video.id, owner = %video.owner, "video published");
    Ok(ApiResponse::created(video, "Video uploaded successfully"))
}

/// Loads a video the actor may see. Unpublished videos are only visible to
/// their owner.
pub(super) fn visible_video(store: &DocumentStore, id: &DocId, viewer: &DocId) -> ApiResult<Video> {
    store
        .get::<Video>(id)?
        .filter(|video| video.is_published || &video.owner == viewer)
        .ok_or(ApiError::NotFound("video"))
}

/// Counts a view and records the video in the viewer's watch history.
pub async fn get_one(
    State(state): State<AppState>,
    actor: Actor,
    Path(video_id): Path<String>,
) -> ApiResult<ApiResponse<VideoDetails>> {
    let id = parse_id(&video_id)?;
    let viewer = actor.id().clone();

    let details = state
        .blocking(move |store| {
            visible_video(store, &id, &viewer)?;
            store.update(&id, |video: &mut Video| video.views += 1)?;
            store.update(&viewer, |user: &mut User| user.record_watch(&id))?;
            queries::video_details(store, &id, &viewer)?.ok_or(ApiError::NotFound("video"))
        })
        .await?;
    Ok(ApiResponse::ok(details, "Video fetched successfully"))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    title: Option<String>,
    description: Option<String>,
    thumbnail: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    actor: Actor,
    Path(video_id): Path<String>,
    JsonBody(body): JsonBody<UpdateRequest>,
) -> ApiResult<ApiResponse<Video>> {
    let id = parse_id(&video_id)?;
    let title = optional(body.title);
    let description = optional(body.description);
    let thumbnail = optional(body.thumbnail);
    if title.is_none() && description.is_none() && thumbnail.is_none() {
        return Err(ApiError::MissingParameter("title, description or thumbnail"));
    }

    let video = state
        .blocking(move |store| {
            let video = store.get::<Video>(&id)?.ok_or(ApiError::NotFound("video"))?;
            actor.ensure_owns(&video.owner, "Only the owner can edit this video")?;
            store
                .update(&id, |video: &mut Video| {
                    if let Some(title) = title {
                        video.title = title;
                    }
                    if let Some(description) = description {
                        video.description = description;
                    }
                    if let Some(thumbnail) = thumbnail {
                        video.thumbnail = thumbnail;
                    }
                })?
                .ok_or(ApiError::NotFound("video"))
        })
        .await?;
    Ok(ApiResponse::ok(video, "Video updated successfully"))
}

/// Deletes the video together with its comments and every like pointing at
/// it or at one of its comments.
pub async fn remove(
    State(state): State<AppState>,
    actor: Actor,
    Path(video_id): Path<String>,
) -> ApiResult<ApiResponse<Value>> {
    let id = parse_id(&video_id)?;

    state
        .blocking(move |store| {
            let video = store.get::<Video>(&id)?.ok_or(ApiError::NotFound("video"))?;
            actor.ensure_owns(&video.owner, "Only the owner can delete this video")?;

            let comments: Vec<Value> = store
                .find::<Comment>(Filter::eq("video", &id))?
                .into_iter()
                .map(|comment| comment.id.into())
                .collect();
            store.delete_many(
                Collection::Likes,
                &Filter::In("target.comment".into(), comments),
            )?;
            store.delete_many(Collection::Comments, &Filter::eq("video", &id))?;
            store.delete_many(Collection::Likes, &Filter::eq("target.video", &id))?;
            store.delete::<Video>(&id)?;
            Ok(())
        })
        .await?;

    info!(video = %video_id, "video deleted");
    Ok(ApiResponse::ok(json!({}), "Video deleted successfully"))
}

pub async fn toggle_publish(
    State(state): State<AppState>,
    actor: Actor,
    Path(video_id): Path<String>,
) -> ApiResult<ApiResponse<Value>> {
    let id = parse_id(&video_id)?;
    let video = state
        .blocking(move |store| {
            let video = store.get::<Video>(&id)?.ok_or(ApiError::NotFound("video"))?;
            actor.ensure_owns(&video.owner, "Only the owner can publish this video")?;
            store
                .update(&id, |video: &mut Video| video.is_published = !video.is_published)?
                .ok_or(ApiError::NotFound("video"))
        })
        .await?;

    Ok(ApiResponse::ok(
        json!({ "isPublished": video.is_published }),
        "Video publish status toggled successfully",
    ))
}
