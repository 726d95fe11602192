use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    Actor, AppState, PageParams,
    error::{ApiError, ApiResult},
    extract::{JsonBody, QueryParams, optional, parse_id, required},
    videos::visible_video,
};
use crate::envelope::ApiResponse;
use crate::models::{Collection, DocId, Playlist};
use crate::queries::{self, PlaylistSummary, PlaylistWithVideos};
use crate::store::DocumentStore;

#[derive(Debug, Deserialize)]
pub struct PlaylistRequest {
    name: Option<String>,
    description: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    actor: Actor,
    JsonBody(body): JsonBody<PlaylistRequest>,
) -> ApiResult<ApiResponse<Playlist>> {
    let name = required(body.name, "name")?;
    let description = optional(body.description).unwrap_or_default();
    let playlist = Playlist::new(actor.id().clone(), &name, &description);

    let playlist = state
        .blocking(move |store| {
            store.insert(&playlist)?;
            Ok(playlist)
        })
        .await?;
    Ok(ApiResponse::created(playlist, "Playlist created successfully"))
}

pub async fn for_user(
    State(state): State<AppState>,
    _actor: Actor,
    Path(user_id): Path<String>,
    QueryParams(params): QueryParams<PageParams>,
) -> ApiResult<ApiResponse<Vec<PlaylistSummary>>> {
    let owner = parse_id(&user_id)?;
    let page = params.page();
    let playlists = state
        .blocking(move |store| {
            if !store.exists(Collection::Users, &owner)? {
                return Err(ApiError::NotFound("user"));
            }
            Ok(queries::user_playlists(store, &owner, page)?)
        })
        .await?;
    Ok(ApiResponse::ok(playlists, "Playlists fetched successfully"))
}

pub async fn get_one(
    State(state): State<AppState>,
    actor: Actor,
    Path(playlist_id): Path<String>,
) -> ApiResult<ApiResponse<PlaylistWithVideos>> {
    let id = parse_id(&playlist_id)?;
    let playlist = state
        .blocking(move |store| {
            queries::playlist_with_videos(store, &id, actor.id())?
                .ok_or(ApiError::NotFound("playlist"))
        })
        .await?;
    Ok(ApiResponse::ok(playlist, "Playlist fetched successfully"))
}

/// Loads the playlist and checks the actor owns it.
fn owned_playlist(store: &DocumentStore, actor: &Actor, id: &DocId) -> ApiResult<Playlist> {
    let playlist = store.get::<Playlist>(id)?.ok_or(ApiError::NotFound("playlist"))?;
    actor.ensure_owns(&playlist.owner, "Only the owner can modify this playlist")?;
    Ok(playlist)
}

pub async fn update(
    State(state): State<AppState>,
    actor: Actor,
    Path(playlist_id): Path<String>,
    JsonBody(body): JsonBody<PlaylistRequest>,
) -> ApiResult<ApiResponse<Playlist>> {
    let id = parse_id(&playlist_id)?;
    let name = optional(body.name);
    let description = optional(body.description);
    if name.is_none() && description.is_none() {
        return Err(ApiError::MissingParameter("name or description"));
    }

    let playlist = state
        .blocking(move |store| {
            owned_playlist(store, &actor, &id)?;
            store
                .update(&id, |playlist: &mut Playlist| {
                    if let Some(name) = name {
                        playlist.name = name;
                    }
                    if let Some(description) = description {
                        playlist.description = description;
                    }
                })?
                .ok_or(ApiError::NotFound("playlist"))
        })
        .await?;
    Ok(ApiResponse::ok(playlist, "Playlist updated successfully"))
}

pub async fn remove(
    State(state): State<AppState>,
    actor: Actor,
    Path(playlist_id): Path<String>,
) -> ApiResult<ApiResponse<Value>> {
    let id = parse_id(&playlist_id)?;
    state
        .blocking(move |store| {
            owned_playlist(store, &actor, &id)?;
            store.delete::<Playlist>(&id)?;
            Ok(())
        })
        .await?;
    Ok(ApiResponse::ok(json!({}), "Playlist deleted successfully"))
}

pub async fn add_video(
    State(state): State<AppState>,
    actor: Actor,
    Path((video_id, playlist_id)): Path<(String, String)>,
) -> ApiResult<ApiResponse<Playlist>> {
    let video = parse_id(&video_id)?;
    let id = parse_id(&playlist_id)?;
    let playlist = state
        .blocking(move |store| {
            owned_playlist(store, &actor, &id)?;
            visible_video(store, &video, actor.id())?;
            store
                .update(&id, |playlist: &mut Playlist| {
                    playlist.add_video(&video);
                })?
                .ok_or(ApiError::NotFound("playlist"))
        })
        .await?;
    Ok(ApiResponse::ok(playlist, "Video added to playlist"))
}

pub async fn remove_video(
    State(state): State<AppState>,
    actor: Actor,
    Path((video_id, playlist_id)): Path<(String, String)>,
) -> ApiResult<ApiResponse<Playlist>> {
    let video = parse_id(&video_id)?;
    let id = parse_id(&playlist_id)?;
    let playlist = state
        .blocking(move |store| {
            owned_playlist(store, &actor, &id)?;
            store
                .update(&id, |playlist: &mut Playlist| {
                    playlist.remove_video(&video);
                })?
                .ok_or(ApiError::NotFound("playlist"))
        })
        .await?;
    Ok(ApiResponse::ok(playlist, "Video removed from playlist"))
}
