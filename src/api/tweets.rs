use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    Actor, AppState, PageParams,
    error::{ApiError, ApiResult},
    extract::{JsonBody, QueryParams, parse_id, required},
};
use crate::envelope::ApiResponse;
use crate::models::{Collection, Tweet};
use crate::pipeline::Filter;
use crate::queries::{self, TweetView};

#[derive(Debug, Deserialize)]
pub struct TweetRequest {
    content: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    actor: Actor,
    JsonBody(body): JsonBody<TweetRequest>,
) -> ApiResult<ApiResponse<Tweet>> {
    let content = required(body.content, "content")?;
    let tweet = Tweet::new(actor.id().clone(), &content);
    let tweet = state
        .blocking(move |store| {
            store.insert(&tweet)?;
            Ok(tweet)
        })
        .await?;
    Ok(ApiResponse::created(tweet, "Tweet created successfully"))
}

pub async fn for_user(
    State(state): State<AppState>,
    _actor: Actor,
    Path(user_id): Path<String>,
    QueryParams(params): QueryParams<PageParams>,
) -> ApiResult<ApiResponse<Vec<TweetView>>> {
    let owner = parse_id(&user_id)?;
    let page = params.page();
    let tweets = state
        .blocking(move |store| {
            if !store.exists(Collection::Users, &owner)? {
                return Err(ApiError::NotFound("user"));
            }
            Ok(queries::user_tweets(store, &owner, page)?)
        })
        .await?;
    Ok(ApiResponse::ok(tweets, "Tweets fetched successfully"))
}

pub async fn update(
    State(state): State<AppState>,
    actor: Actor,
    Path(tweet_id): Path<String>,
    JsonBody(body): JsonBody<TweetRequest>,
) -> ApiResult<ApiResponse<Tweet>> {
    let id = parse_id(&tweet_id)?;
    let content = required(body.content, "content")?;
    let tweet = state
        .blocking(move |store| {
            let tweet = store.get::<Tweet>(&id)?.ok_or(ApiError::NotFound("tweet"))?;
            actor.ensure_owns(&tweet.owner, "Only the author can edit this tweet")?;
            store
                .update(&id, |tweet: &mut Tweet| tweet.content = content)?
                .ok_or(ApiError::NotFound("tweet"))
        })
        .await?;
    Ok(ApiResponse::ok(tweet, "Tweet updated successfully"))
}

pub async fn remove(
    State(state): State<AppState>,
    actor: Actor,
    Path(tweet_id): Path<String>,
) -> ApiResult<ApiResponse<Value>> {
    let id = parse_id(&tweet_id)?;
    state
        .blocking(move |store| {
            let tweet = store.get::<Tweet>(&id)?.ok_or(ApiError::NotFound("tweet"))?;
            actor.ensure_owns(&tweet.owner, "Only the author can delete this tweet")?;
            store.delete::<Tweet>(&id)?;
            store.delete_many(Collection::Likes, &Filter::eq("target.tweet", &id))?;
            Ok(())
        })
        .await?;
    Ok(ApiResponse::ok(json!({}), "Tweet deleted successfully"))
}
