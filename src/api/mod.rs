//! HTTP surface of the backend, mounted under `/api/v1`.
//!
//! Handlers are thin: they parse ids and bodies, check ownership and hand the
//! actual work to the store or to [`crate::queries`] on the blocking pool.

mod auth;
mod comments;
mod dashboard;
mod error;
mod extract;
mod likes;
mod playlists;
mod subscriptions;
mod tweets;
mod users;
mod videos;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, patch, post},
};
use serde::Deserialize;
use serde_json::json;
use tokio::task;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::envelope::ApiResponse;
use crate::queries::Page;
use crate::security::TokenSigner;
use crate::store::DocumentStore;

pub use auth::{ACCESS_TOKEN_COOKIE, Actor};
pub use error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    store: Arc<DocumentStore>,
    tokens: Arc<TokenSigner>,
}

impl AppState {
    pub fn new(store: DocumentStore, tokens: TokenSigner) -> Self {
        Self {
            store: Arc::new(store),
            tokens: Arc::new(tokens),
        }
    }

    /// Runs `work` against the store on the blocking pool.
    async fn blocking<F, T>(&self, work: F) -> ApiResult<T>
    where
        F: FnOnce(&DocumentStore) -> ApiResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        task::spawn_blocking(move || work(&store))
            .await
            .map_err(|err| ApiError::internal(format!("task join error: {err}")))?
    }
}

/// `page` and `limit` query parameters shared by list endpoints.
#[derive(Debug, Default, Deserialize)]
struct PageParams {
    page: Option<usize>,
    limit: Option<usize>,
}

impl PageParams {
    fn page(&self) -> Page {
        Page::new(self.page, self.limit)
    }
}

/// Any origin when `origin` is unset, otherwise exactly that origin with
/// credentials allowed so the token cookie is sent along.
pub fn cors_layer(origin: Option<&str>) -> Result<CorsLayer> {
    let Some(origin) = origin else {
        return Ok(CorsLayer::permissive());
    };
    let origin: HeaderValue = origin
        .parse()
        .with_context(|| format!("parsing CORS origin {origin}"))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    let api = Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/users/register", post(users::register))
        .route("/users/login", post(users::login))
        .route("/users/current-user", get(users::current_user))
        .route("/users/update-account", patch(users::update_account))
        .route("/users/avatar", patch(users::update_avatar))
        .route("/users/cover-image", patch(users::update_cover_image))
        .route("/users/change-password", post(users::change_password))
        .route("/users/c/{username}", get(users::channel_profile))
        .route("/users/history", get(users::watch_history))
        .route("/videos", get(videos::list).post(videos::publish))
        .route(
            "/videos/{videoId}",
            get(videos::get_one).patch(videos::update).delete(videos::remove),
        )
        .route("/videos/toggle/publish/{videoId}", patch(videos::toggle_publish))
        .route(
            "/comments/{videoId}",
            get(comments::list).post(comments::add),
        )
        .route(
            "/comments/c/{commentId}",
            patch(comments::update).delete(comments::remove),
        )
        .route("/likes/toggle/v/{videoId}", post(likes::toggle_video))
        .route("/likes/toggle/c/{commentId}", post(likes::toggle_comment))
        .route("/likes/toggle/t/{tweetId}", post(likes::toggle_tweet))
        .route("/likes/videos", get(likes::liked_videos))
        .route(
            "/subscriptions/c/{channelId}",
            get(subscriptions::subscribers).post(subscriptions::toggle),
        )
        .route(
            "/subscriptions/u/{subscriberId}",
            get(subscriptions::subscribed_channels),
        )
        .route("/playlist", post(playlists::create))
        .route("/playlist/user/{userId}", get(playlists::for_user))
        .route(
            "/playlist/{playlistId}",
            get(playlists::get_one)
                .patch(playlists::update)
                .delete(playlists::remove),
        )
        .route("/playlist/add/{videoId}/{playlistId}", patch(playlists::add_video))
        .route(
            "/playlist/remove/{videoId}/{playlistId}",
            patch(playlists::remove_video),
        )
        .route("/tweets", post(tweets::create))
        .route("/tweets/user/{userId}", get(tweets::for_user))
        .route(
            "/tweets/{tweetId}",
            patch(tweets::update).delete(tweets::remove),
        )
        .route("/dashboard/stats", get(dashboard::stats))
        .route("/dashboard/videos", get(dashboard::videos))
        .route("/dashboard/liked-videos", get(dashboard::liked_videos));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthcheck() -> ApiResponse<serde_json::Value> {
    ApiResponse::ok(json!({ "status": "OK" }), "Service is healthy")
}
