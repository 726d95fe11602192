use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    ACCESS_TOKEN_COOKIE, Actor, AppState,
    error::{ApiError, ApiResult},
    extract::{JsonBody, optional, required},
};
use crate::envelope::ApiResponse;
use crate::models::{User, UserProfile};
use crate::pipeline::Filter;
use crate::queries::{self, ChannelProfile, VideoCard};
use crate::security::{hash_password, verify_password};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    username: Option<String>,
    email: Option<String>,
    full_name: Option<String>,
    password: Option<String>,
    avatar: Option<String>,
    cover_image: Option<String>,
}

pub async fn register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RegisterRequest>,
) -> ApiResult<ApiResponse<UserProfile>> {
    let username = required(body.username, "username")?;
    let email = required(body.email, "email")?;
    let full_name = required(body.full_name, "fullName")?;
    let password = required(body.password, "password")?;
    let avatar = required(body.avatar, "avatar")?;
    let cover_image = optional(body.cover_image);

    let user = state
        .blocking(move |store| {
            let taken = store
                .find::<User>(Filter::eq("username", username.to_lowercase()))?
                .into_iter()
                .chain(store.find::<User>(Filter::eq("email", email.to_lowercase()))?)
                .next()
                .is_some();
            if taken {
                return Err(ApiError::Conflict(
                    "User with email or username already exists".into(),
                ));
            }

            let hash = hash_password(&password)?;
            let user = User::new(
                &username,
                &email,
                &full_name,
                &avatar,
                cover_image.as_deref(),
                hash,
            );
            store.insert(&user)?;
            Ok(user)
        })
        .await?;

    info!(user = %user.id, username = %user.username, "registered user");
    Ok(ApiResponse::created(
        user.into(),
        "User registered successfully",
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    user: UserProfile,
    access_token: String,
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let filter = match (optional(body.username), optional(body.email)) {
        (Some(username), _) => Filter::eq("username", username.to_lowercase()),
        (None, Some(email)) => Filter::eq("email", email.to_lowercase()),
        (None, None) => return Err(ApiError::MissingParameter("username or email")),
    };
    let password = required(body.password, "password")?;

    let user = state
        .blocking(move |store| {
            let user = store
                .find_one::<User>(filter)?
                .ok_or(ApiError::NotFound("user"))?;
            if !verify_password(&password, &user.password) {
                return Err(ApiError::Unauthorized("Invalid user credentials".into()));
            }
            Ok(user)
        })
        .await?;

    let access_token = state.tokens.issue(&user.id)?;
    let cookie = Cookie::build((ACCESS_TOKEN_COOKIE, access_token.clone()))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .path("/");
    info!(user = %user.id, "user logged in");

    Ok((
        CookieJar::new().add(cookie),
        ApiResponse::ok(
            LoginResponse {
                user: user.into(),
                access_token,
            },
            "User logged in successfully",
        ),
    ))
}

pub async fn current_user(actor: Actor) -> ApiResponse<UserProfile> {
    ApiResponse::ok(actor.0.into(), "Current user fetched successfully")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    full_name: Option<String>,
    email: Option<String>,
}

pub async fn update_account(
    State(state): State<AppState>,
    actor: Actor,
    JsonBody(body): JsonBody<UpdateAccountRequest>,
) -> ApiResult<ApiResponse<UserProfile>> {
    let full_name = required(body.full_name, "fullName")?;
    let email = required(body.email, "email")?.to_lowercase();
    let id = actor.id().clone();

    let user = state
        .blocking(move |store| {
            let taken = store
                .find::<User>(Filter::eq("email", email.as_str()))?
                .iter()
                .any(|other| other.id != id);
            if taken {
                return Err(ApiError::Conflict("Email is already in use".into()));
            }
            store
                .update(&id, |user: &mut User| {
                    user.full_name = full_name;
                    user.email = email;
                })?
                .ok_or(ApiError::NotFound("user"))
        })
        .await?;

    Ok(ApiResponse::ok(user.into(), "Account details updated successfully"))
}

#[derive(Debug, Deserialize)]
pub struct AvatarRequest {
    avatar: Option<String>,
}

pub async fn update_avatar(
    State(state): State<AppState>,
    actor: Actor,
    JsonBody(body): JsonBody<AvatarRequest>,
) -> ApiResult<ApiResponse<UserProfile>> {
    let avatar = required(body.avatar, "avatar")?;
    let user = update_self(&state, &actor, move |user| user.avatar = avatar).await?;
    Ok(ApiResponse::ok(user.into(), "Avatar updated successfully"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverImageRequest {
    cover_image: Option<String>,
}

pub async fn update_cover_image(
    State(state): State<AppState>,
    actor: Actor,
    JsonBody(body): JsonBody<CoverImageRequest>,
) -> ApiResult<ApiResponse<UserProfile>> {
    let cover_image = required(body.cover_image, "coverImage")?;
    let user = update_self(&state, &actor, move |user| user.cover_image = cover_image).await?;
    Ok(ApiResponse::ok(user.into(), "Cover image updated successfully"))
}

async fn update_self<F>(state: &AppState, actor: &Actor, change: F) -> ApiResult<User>
where
    F: FnOnce(&mut User) + Send + 'static,
{
    let id = actor.id().clone();
    state
        .blocking(move |store| store.update(&id, change)?.ok_or(ApiError::NotFound("user")))
        .await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    old_password: Option<String>,
    new_password: Option<String>,
}

pub async fn change_password(
    State(state): State<AppState>,
    actor: Actor,
    JsonBody(body): JsonBody<ChangePasswordRequest>,
) -> ApiResult<ApiResponse<serde_json::Value>> {
    let old_password = required(body.old_password, "oldPassword")?;
    let new_password = required(body.new_password, "newPassword")?;
    if !verify_password(&old_password, &actor.0.password) {
        return Err(ApiError::InvalidParameter("Invalid old password".into()));
    }

    let hash = state
        .blocking(move |_| Ok(hash_password(&new_password)?))
        .await?;
    update_self(&state, &actor, move |user| user.password = hash).await?;
    info!(user = %actor.id(), "password changed");
    Ok(ApiResponse::ok(serde_json::json!({}), "Password changed successfully"))
}

pub async fn channel_profile(
    State(state): State<AppState>,
    actor: Actor,
    Path(username): Path<String>,
) -> ApiResult<ApiResponse<ChannelProfile>> {
    let username = required(Some(username), "username")?;
    let viewer = actor.id().clone();
    let profile = state
        .blocking(move |store| {
            queries::channel_profile(store, &username, Some(&viewer))?
                .ok_or(ApiError::NotFound("channel"))
        })
        .await?;
    Ok(ApiResponse::ok(profile, "User channel fetched successfully"))
}

pub async fn watch_history(
    State(state): State<AppState>,
    actor: Actor,
) -> ApiResult<ApiResponse<Vec<VideoCard>>> {
    let id = actor.id().clone();
    let history = state
        .blocking(move |store| Ok(queries::watch_history(store, &id)?))
        .await?;
    Ok(ApiResponse::ok(history, "Watch history fetched successfully"))
}
