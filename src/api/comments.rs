use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    Actor, AppState, PageParams,
    error::{ApiError, ApiResult},
    extract::{JsonBody, QueryParams, parse_id, required},
    videos::visible_video,
};
use crate::envelope::ApiResponse;
use crate::models::{Collection, Comment};
use crate::pipeline::Filter;
use crate::queries::{self, CommentView};

pub async fn list(
    State(state): State<AppState>,
    actor: Actor,
    Path(video_id): Path<String>,
    QueryParams(params): QueryParams<PageParams>,
) -> ApiResult<ApiResponse<Vec<CommentView>>> {
    let video = parse_id(&video_id)?;
    let page = params.page();
    let comments = state
        .blocking(move |store| {
            visible_video(store, &video, actor.id())?;
            Ok(queries::video_comments(store, &video, page)?)
        })
        .await?;
    Ok(ApiResponse::ok(comments, "Comments fetched successfully"))
}

#[derive(Debug, Deserialize)]
pub struct ContentRequest {
    content: Option<String>,
}

pub async fn add(
    State(state): State<AppState>,
    actor: Actor,
    Path(video_id): Path<String>,
    JsonBody(body): JsonBody<ContentRequest>,
) -> ApiResult<ApiResponse<Comment>> {
    let video = parse_id(&video_id)?;
    let content = required(body.content, "content")?;
    let comment = Comment::new(video, actor.id().clone(), &content);

    let comment = state
        .blocking(move |store| {
            visible_video(store, &comment.video, &comment.owner)?;
            store.insert(&comment)?;
            Ok(comment)
        })
        .await?;
    Ok(ApiResponse::created(comment, "Comment added successfully"))
}

pub async fn update(
    State(state): State<AppState>,
    actor: Actor,
    Path(comment_id): Path<String>,
    JsonBody(body): JsonBody<ContentRequest>,
) -> ApiResult<ApiResponse<Comment>> {
    let id = parse_id(&comment_id)?;
    let content = required(body.content, "content")?;

    let comment = state
        .blocking(move |store| {
            let comment = store.get::<Comment>(&id)?.ok_or(ApiError::NotFound("comment"))?;
            actor.ensure_owns(&comment.owner, "Only the author can edit this comment")?;
            store
                .update(&id, |comment: &mut Comment| comment.content = content)?
                .ok_or(ApiError::NotFound("comment"))
        })
        .await?;
    Ok(ApiResponse::ok(comment, "Comment updated successfully"))
}

pub async fn remove(
    State(state): State<AppState>,
    actor: Actor,
    Path(comment_id): Path<String>,
) -> ApiResult<ApiResponse<Value>> {
    let id = parse_id(&comment_id)?;
    state
        .blocking(move |store| {
            let comment = store.get::<Comment>(&id)?.ok_or(ApiError::NotFound("comment"))?;
            actor.ensure_owns(&comment.owner, "Only the author can delete this comment")?;
            store.delete::<Comment>(&id)?;
            store.delete_many(Collection::Likes, &Filter::eq("target.comment", &id))?;
            Ok(())
        })
        .await?;
    Ok(ApiResponse::ok(json!({}), "Comment deleted successfully"))
}
