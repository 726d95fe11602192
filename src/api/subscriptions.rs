use axum::extract::{Path, State};
use serde::Serialize;
use tracing::debug;

use super::{
    Actor, AppState, PageParams,
    error::{ApiError, ApiResult},
    extract::{QueryParams, parse_id},
};
use crate::envelope::ApiResponse;
use crate::models::{Collection, Subscription};
use crate::queries::{self, ChannelSubscriber, SubscribedChannel};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionState {
    is_subscribed: bool,
}

pub async fn toggle(
    State(state): State<AppState>,
    actor: Actor,
    Path(channel_id): Path<String>,
) -> ApiResult<ApiResponse<SubscriptionState>> {
    let channel = parse_id(&channel_id)?;
    if actor.id() == &channel {
        return Err(ApiError::InvalidParameter(
            "You cannot subscribe to your own channel".into(),
        ));
    }

    let subscriber = actor.id().clone();
    let outcome = state
        .blocking(move |store| {
            if !store.exists(Collection::Users, &channel)? {
                return Err(ApiError::NotFound("channel"));
            }
            Ok(store.toggle(Subscription::new(subscriber, channel))?)
        })
        .await?;

    let is_subscribed = outcome.is_added();
    debug!(channel = %channel_id, is_subscribed, "subscription toggled");
    let message = if is_subscribed {
        "Subscribed successfully"
    } else {
        "Unsubscribed successfully"
    };
    Ok(ApiResponse::ok(SubscriptionState { is_subscribed }, message))
}

/// Subscribers of the channel named in the path.
pub async fn subscribers(
    State(state): State<AppState>,
    _actor: Actor,
    Path(channel_id): Path<String>,
    QueryParams(params): QueryParams<PageParams>,
) -> ApiResult<ApiResponse<Vec<ChannelSubscriber>>> {
    let channel = parse_id(&channel_id)?;
    let page = params.page();
    let list = state
        .blocking(move |store| {
            if !store.exists(Collection::Users, &channel)? {
                return Err(ApiError::NotFound("channel"));
            }
            Ok(queries::channel_subscribers(store, &channel, page)?)
        })
        .await?;
    Ok(ApiResponse::ok(list, "Subscribers fetched successfully"))
}

pub async fn subscribed_channels(
    State(state): State<AppState>,
    _actor: Actor,
    Path(subscriber_id): Path<String>,
    QueryParams(params): QueryParams<PageParams>,
) -> ApiResult<ApiResponse<Vec<SubscribedChannel>>> {
    let subscriber = parse_id(&subscriber_id)?;
    let page = params.page();
    let list = state
        .blocking(move |store| {
            if !store.exists(Collection::Users, &subscriber)? {
                return Err(ApiError::NotFound("user"));
            }
            Ok(queries::subscribed_channels(store, &subscriber, page)?)
        })
        .await?;
    Ok(ApiResponse::ok(list, "Subscribed channels fetched successfully"))
}
