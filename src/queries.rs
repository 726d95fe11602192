//! Read models composed from aggregation pipelines.
//!
//! Each function here builds a [`Pipeline`], runs it through
//! [`DocumentStore::aggregate`] and decodes the result into a typed view.
//! Joined users are always projected down to their public fields.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::models::{
    Collection, DocId, OWNER_FIELDS, PROFILE_FIELDS, Playlist, Tweet, Video, timestamp,
};
use crate::pipeline::{Accumulator, Expr, Filter, Pipeline, SortOrder};
use crate::store::DocumentStore;

pub const DEFAULT_PAGE_LIMIT: usize = 10;
pub const MAX_PAGE_LIMIT: usize = 100;

/// One page of a list. Pages start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Page {
    /// Missing values fall back to the defaults; out of range values are
    /// clamped.
    pub fn new(page: Option<usize>, limit: Option<usize>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
        }
    }

    fn apply(self, pipeline: Pipeline) -> Pipeline {
        pipeline
            .skip((self.page - 1).saturating_mul(self.limit))
            .limit(self.limit)
    }
}

/// The part of a user other documents may embed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    #[serde(rename = "_id")]
    pub id: DocId,
    pub username: String,
    pub full_name: String,
    pub avatar: String,
}

/// Joins the user referenced by `field` and replaces the id with the user's
/// public fields, or `null` when the user no longer exists.
fn embed_user(pipeline: Pipeline, field: &str) -> Pipeline {
    pipeline
        .lookup_with(
            Collection::Users,
            field,
            "_id",
            field,
            Pipeline::new().project(OWNER_FIELDS),
        )
        .add_fields(vec![(field, Expr::First(field.to_string()))])
}

/// Published videos, plus the unpublished ones uploaded by `viewer`.
pub fn visible_to(viewer: Option<&DocId>) -> Filter {
    let published = Filter::eq("isPublished", true);
    match viewer {
        Some(viewer) => Filter::or(vec![published, Filter::eq("owner", viewer)]),
        None => published,
    }
}

fn decode<T: DeserializeOwned>(docs: Vec<Value>) -> Result<Vec<T>> {
    docs.into_iter()
        .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
        .collect()
}

fn decode_first<T: DeserializeOwned>(docs: Vec<Value>) -> Result<Option<T>> {
    docs.into_iter()
        .next()
        .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
        .transpose()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub total_subscribers: u64,
    pub total_videos: u64,
    pub total_views: u64,
    pub total_likes: u64,
}

fn number_at(docs: &[Value], field: &str) -> u64 {
    docs.first()
        .and_then(|doc| doc.get(field))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// Subscriber count, published video count, total views of published videos
/// and how many of the channel's videos received at least one like.
pub fn channel_stats(store: &DocumentStore, channel: &DocId) -> Result<ChannelStats> {
    let subscribers = store.aggregate(
        Collection::Subscriptions,
        &Pipeline::new()
            .matching(Filter::eq("channel", channel))
            .count("subscribers"),
    )?;

    let videos = store.aggregate(
        Collection::Videos,
        &Pipeline::new()
            .matching(Filter::and(vec![
                Filter::eq("owner", channel),
                Filter::eq("isPublished", true),
            ]))
            .group(
                None,
                vec![
                    ("videos", Accumulator::Count),
                    ("views", Accumulator::Sum("views".into())),
                ],
            ),
    )?;

    let likes = store.aggregate(
        Collection::Likes,
        &LikedVideos::new()
            .owned_by(channel.clone())
            .seen_by(channel.clone())
            .pipeline()
            .group(None, vec![("likes", Accumulator::Count)]),
    )?;

    Ok(ChannelStats {
        total_subscribers: number_at(&subscribers, "subscribers"),
        total_videos: number_at(&videos, "videos"),
        total_views: number_at(&videos, "views"),
        total_likes: number_at(&likes, "likes"),
    })
}

/// A video together with how many of the considered likes point at it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikedVideo {
    #[serde(rename = "_id")]
    pub video_id: DocId,
    pub likes: u64,
    pub video: Video,
}

/// Videos that received likes, most recently uploaded first. Likes on
/// comments and tweets never show up here.
#[derive(Debug, Clone, Default)]
pub struct LikedVideos {
    liked_by: Option<DocId>,
    owner: Option<DocId>,
    viewer: Option<DocId>,
}

impl LikedVideos {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only likes given by `user`.
    pub fn liked_by(mut self, user: DocId) -> Self {
        self.liked_by = Some(user);
        self
    }

    /// Only videos uploaded by `channel`.
    pub fn owned_by(mut self, channel: DocId) -> Self {
        self.owner = Some(channel);
        self
    }

    /// Keeps `viewer`'s own unpublished videos. Without a viewer only
    /// published videos are listed.
    pub fn seen_by(mut self, viewer: DocId) -> Self {
        self.viewer = Some(viewer);
        self
    }

    pub fn pipeline(&self) -> Pipeline {
        let mut pipeline = Pipeline::new();
        if let Some(user) = &self.liked_by {
            pipeline = pipeline.matching(Filter::eq("likedBy", user));
        }
        pipeline = pipeline
            .group(Some("target.video"), vec![("likes", Accumulator::Count)])
            .matching(Filter::ne("_id", Value::Null))
            .lookup_with(
                Collection::Videos,
                "_id",
                "_id",
                "video",
                Pipeline::new().matching(visible_to(self.viewer.as_ref())),
            )
            .unwind("video");
        if let Some(owner) = &self.owner {
            pipeline = pipeline.matching(Filter::eq("video.owner", owner));
        }
        pipeline.sort(&[("video.createdAt", SortOrder::Desc), ("_id", SortOrder::Desc)])
    }

    pub fn fetch(&self, store: &DocumentStore, page: Page) -> Result<Vec<LikedVideo>> {
        decode(store.aggregate(Collection::Likes, &page.apply(self.pipeline()))?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSubscriber {
    #[serde(rename = "_id")]
    pub id: DocId,
    pub subscriber: PublicUser,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedChannel {
    #[serde(rename = "_id")]
    pub id: DocId,
    pub channel: PublicUser,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

fn subscription_list(scope: &str, scoped_to: &DocId, joined: &str, page: Page) -> Pipeline {
    let pipeline = Pipeline::new().matching(Filter::eq(scope, scoped_to));
    let pipeline = embed_user(pipeline, joined)
        .matching(Filter::ne(joined, Value::Null))
        .project(&[joined, "createdAt"])
        .newest_first("createdAt");
    page.apply(pipeline)
}

/// Users subscribed to `channel`, newest subscription first.
pub fn channel_subscribers(
    store: &DocumentStore,
    channel: &DocId,
    page: Page,
) -> Result<Vec<ChannelSubscriber>> {
    decode(store.aggregate(
        Collection::Subscriptions,
        &subscription_list("channel", channel, "subscriber", page),
    )?)
}

/// Channels `subscriber` follows, newest subscription first.
pub fn subscribed_channels(
    store: &DocumentStore,
    subscriber: &DocId,
    page: Page,
) -> Result<Vec<SubscribedChannel>> {
    decode(store.aggregate(
        Collection::Subscriptions,
        &subscription_list("subscriber", subscriber, "channel", page),
    )?)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistWithVideos {
    #[serde(rename = "_id")]
    pub id: DocId,
    pub name: String,
    pub description: String,
    pub owner: DocId,
    /// In playlist order. Videos deleted since they were added, and videos
    /// hidden from the viewer, are skipped.
    pub videos: Vec<Video>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

pub fn playlist_with_videos(
    store: &DocumentStore,
    playlist: &DocId,
    viewer: &DocId,
) -> Result<Option<PlaylistWithVideos>> {
    decode_first(store.aggregate(
        Collection::Playlists,
        &Pipeline::new()
            .matching(Filter::eq("_id", playlist))
            .lookup_with(
                Collection::Videos,
                "videos",
                "_id",
                "videos",
                Pipeline::new().matching(visible_to(Some(viewer))),
            ),
    )?)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProfile {
    #[serde(rename = "_id")]
    pub id: DocId,
    pub username: String,
    pub full_name: String,
    pub avatar: String,
    #[serde(default)]
    pub cover_image: String,
    pub email: String,
    pub subscribers_count: u64,
    pub subscribed_to_count: u64,
    pub is_subscribed: bool,
}

/// Public channel page for `username` as seen by `viewer`.
pub fn channel_profile(
    store: &DocumentStore,
    username: &str,
    viewer: Option<&DocId>,
) -> Result<Option<ChannelProfile>> {
    let is_subscribed = match viewer {
        Some(viewer) => Expr::Contains {
            path: "subscribers.subscriber".into(),
            value: viewer.into(),
        },
        None => Expr::Literal(Value::Bool(false)),
    };

    let mut fields = PROFILE_FIELDS.to_vec();
    fields.extend(["subscribersCount", "subscribedToCount", "isSubscribed"]);

    let pipeline = Pipeline::new()
        .matching(Filter::eq("username", username.trim().to_lowercase()))
        .lookup(Collection::Subscriptions, "_id", "channel", "subscribers")
        .lookup(Collection::Subscriptions, "_id", "subscriber", "subscribedTo")
        .add_fields(vec![
            ("subscribersCount", Expr::Size("subscribers".into())),
            ("subscribedToCount", Expr::Size("subscribedTo".into())),
            ("isSubscribed", is_subscribed),
        ])
        .project(&fields);

    decode_first(store.aggregate(Collection::Users, &pipeline)?)
}

/// A video with its uploader's public fields in place of the owner id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoCard {
    #[serde(rename = "_id")]
    pub id: DocId,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub views: u64,
    pub is_published: bool,
    pub owner: Option<PublicUser>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// The user's watch history, most recently watched first. Videos unpublished
/// since they were watched drop out unless the user uploaded them.
pub fn watch_history(store: &DocumentStore, user: &DocId) -> Result<Vec<VideoCard>> {
    let docs = store.aggregate(
        Collection::Users,
        &Pipeline::new()
            .matching(Filter::eq("_id", user))
            .lookup_with(
                Collection::Videos,
                "watchHistory",
                "_id",
                "watchHistory",
                embed_user(Pipeline::new().matching(visible_to(Some(user))), "owner"),
            )
            .project(&["watchHistory"]),
    )?;

    match docs.into_iter().next() {
        Some(Value::Object(mut doc)) => match doc.remove("watchHistory") {
            Some(Value::Array(videos)) => decode(videos),
            _ => Ok(Vec::new()),
        },
        _ => Ok(Vec::new()),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetails {
    #[serde(flatten)]
    pub video: VideoCard,
    pub likes_count: u64,
    pub is_liked: bool,
}

/// A single video with its like count and whether `viewer` liked it.
pub fn video_details(
    store: &DocumentStore,
    video: &DocId,
    viewer: &DocId,
) -> Result<Option<VideoDetails>> {
    let pipeline = Pipeline::new()
        .matching(Filter::eq("_id", video))
        .lookup(Collection::Likes, "_id", "target.video", "likes")
        .add_fields(vec![
            ("likesCount", Expr::Size("likes".into())),
            (
                "isLiked",
                Expr::Contains {
                    path: "likes.likedBy".into(),
                    value: viewer.into(),
                },
            ),
        ])
        .unset(&["likes"]);
    decode_first(store.aggregate(Collection::Videos, &embed_user(pipeline, "owner"))?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoSort {
    #[default]
    CreatedAt,
    Views,
    Duration,
    Title,
}

impl VideoSort {
    /// Accepts the field names clients send in `sortBy`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "createdAt" => Some(VideoSort::CreatedAt),
            "views" => Some(VideoSort::Views),
            "duration" => Some(VideoSort::Duration),
            "title" => Some(VideoSort::Title),
            _ => None,
        }
    }

    fn field(self) -> &'static str {
        match self {
            VideoSort::CreatedAt => "createdAt",
            VideoSort::Views => "views",
            VideoSort::Duration => "duration",
            VideoSort::Title => "title",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VideoListing {
    pub owner: Option<DocId>,
    /// Case-insensitive title search.
    pub search: Option<String>,
    pub include_unpublished: bool,
    pub sort: VideoSort,
    pub order: SortOrder,
}

impl Default for VideoListing {
    fn default() -> Self {
        Self {
            owner: None,
            search: None,
            include_unpublished: false,
            sort: VideoSort::default(),
            order: SortOrder::Desc,
        }
    }
}

impl VideoListing {
    pub fn fetch(&self, store: &DocumentStore, page: Page) -> Result<Vec<VideoCard>> {
        let mut filters = Vec::new();
        if !self.include_unpublished {
            filters.push(Filter::eq("isPublished", true));
        }
        if let Some(owner) = &self.owner {
            filters.push(Filter::eq("owner", owner));
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            filters.push(Filter::contains("title", search));
        }

        let pipeline = Pipeline::new()
            .matching(Filter::and(filters))
            .sort(&[(self.sort.field(), self.order), ("_id", SortOrder::Desc)]);
        let pipeline = embed_user(page.apply(pipeline), "owner");

        decode(store.aggregate(Collection::Videos, &pipeline)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(rename = "_id")]
    pub id: DocId,
    pub content: String,
    pub video: DocId,
    pub owner: Option<PublicUser>,
    pub likes_count: u64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// Joins likes pointing at this document as `target.<kind>` and keeps only
/// their number.
fn count_likes(pipeline: Pipeline, kind: &str) -> Pipeline {
    let foreign = format!("target.{kind}");
    pipeline
        .lookup(Collection::Likes, "_id", &foreign, "likes")
        .add_fields(vec![("likesCount", Expr::Size("likes".into()))])
        .unset(&["likes"])
}

pub fn video_comments(store: &DocumentStore, video: &DocId, page: Page) -> Result<Vec<CommentView>> {
    let pipeline = Pipeline::new()
        .matching(Filter::eq("video", video))
        .newest_first("createdAt");
    let pipeline = count_likes(embed_user(page.apply(pipeline), "owner"), "comment");
    decode(store.aggregate(Collection::Comments, &pipeline)?)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSummary {
    #[serde(flatten)]
    pub playlist: Playlist,
    pub total_videos: u64,
}

pub fn user_playlists(store: &DocumentStore, owner: &DocId, page: Page) -> Result<Vec<PlaylistSummary>> {
    let pipeline = Pipeline::new()
        .matching(Filter::eq("owner", owner))
        .add_fields(vec![("totalVideos", Expr::Size("videos".into()))])
        .newest_first("createdAt");
    decode(store.aggregate(Collection::Playlists, &page.apply(pipeline))?)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetView {
    #[serde(flatten)]
    pub tweet: Tweet,
    pub likes_count: u64,
}

pub fn user_tweets(store: &DocumentStore, owner: &DocId, page: Page) -> Result<Vec<TweetView>> {
    let pipeline = Pipeline::new()
        .matching(Filter::eq("owner", owner))
        .newest_first("createdAt");
    let pipeline = count_likes(page.apply(pipeline), "tweet");
    decode(store.aggregate(Collection::Tweets, &pipeline)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Comment, Like, LikeTarget, Subscription, User};
    use chrono::Duration;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, DocumentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(dir.path().join("vidshare.db")).unwrap();
        (dir, store)
    }

    fn user(store: &DocumentStore, name: &str) -> User {
        let user = User::new(name, &format!("{name}@example.com"), name, "a.png", None, "hash".into());
        store.insert(&user).unwrap();
        user
    }

    fn upload(store: &DocumentStore, owner: &User, title: &str, views: u64) -> Video {
        let mut video = Video::new(owner.id.clone(), title, "", "v.mp4", "t.jpg", 30.0);
        video.views = views;
        store.insert(&video).unwrap();
        video
    }

    fn like(store: &DocumentStore, target: LikeTarget, by: &User) {
        store.insert(&Like::new(target, by.id.clone())).unwrap();
    }

    #[test]
    fn page_clamps_inputs() {
        assert_eq!(Page::new(None, None), Page::default());
        assert_eq!(Page::new(Some(0), Some(0)), Page { page: 1, limit: 1 });
        assert_eq!(Page::new(Some(3), Some(500)).limit, MAX_PAGE_LIMIT);
    }

    #[test]
    fn liked_videos_ignore_comment_and_tweet_likes() {
        let (_dir, store) = open_store();
        let ana = user(&store, "ana");
        let bo = user(&store, "bo");
        let clip = upload(&store, &ana, "clip", 0);
        let comment = Comment::new(clip.id.clone(), bo.id.clone(), "nice");
        store.insert(&comment).unwrap();
        let tweet = Tweet::new(ana.id.clone(), "hello");
        store.insert(&tweet).unwrap();

        like(&store, LikeTarget::Video(clip.id.clone()), &bo);
        like(&store, LikeTarget::Comment(comment.id.clone()), &bo);
        like(&store, LikeTarget::Tweet(tweet.id.clone()), &bo);

        let liked = LikedVideos::new()
            .liked_by(bo.id.clone())
            .fetch(&store, Page::default())
            .unwrap();
        assert_eq!(liked.len(), 1);
        assert_eq!(liked[0].video.id, clip.id);
        assert_eq!(liked[0].likes, 1);
    }

    #[test]
    fn liked_videos_sorted_by_upload_time() {
        let (_dir, store) = open_store();
        let ana = user(&store, "ana");
        let bo = user(&store, "bo");
        let mut ids = Vec::new();
        for (n, title) in ["old", "mid", "new"].into_iter().enumerate() {
            let mut video = Video::new(ana.id.clone(), title, "", "v.mp4", "t.jpg", 1.0);
            video.created_at = video.created_at - Duration::hours(10 - n as i64);
            store.insert(&video).unwrap();
            ids.push(video.id);
        }
        // Liked in an order unrelated to upload order.
        for id in [&ids[1], &ids[2], &ids[0]] {
            like(&store, LikeTarget::Video(id.clone()), &bo);
        }

        let liked = LikedVideos::new()
            .liked_by(bo.id.clone())
            .fetch(&store, Page::default())
            .unwrap();
        let titles: Vec<&str> = liked.iter().map(|l| l.video.title.as_str()).collect();
        assert_eq!(titles, ["new", "mid", "old"]);
    }

    #[test]
    fn channel_stats_sum_views_and_count_liked_videos() {
        let (_dir, store) = open_store();
        let ana = user(&store, "ana");
        let bo = user(&store, "bo");
        let cy = user(&store, "cy");
        let a = upload(&store, &ana, "a", 3);
        upload(&store, &ana, "b", 5);
        upload(&store, &ana, "c", 0);
        let other = upload(&store, &bo, "other", 100);

        like(&store, LikeTarget::Video(a.id.clone()), &bo);
        like(&store, LikeTarget::Video(a.id.clone()), &cy);
        like(&store, LikeTarget::Video(other.id.clone()), &cy);
        store
            .insert(&Subscription::new(bo.id.clone(), ana.id.clone()))
            .unwrap();

        // One liked video, liked twice.
        let stats = channel_stats(&store, &ana.id).unwrap();
        assert_eq!(
            stats,
            ChannelStats {
                total_subscribers: 1,
                total_videos: 3,
                total_views: 8,
                total_likes: 1,
            }
        );

        let b = store
            .find_one::<Video>(Filter::eq("title", "b"))
            .unwrap()
            .unwrap();
        like(&store, LikeTarget::Video(b.id), &cy);
        assert_eq!(channel_stats(&store, &ana.id).unwrap().total_likes, 2);
    }

    #[test]
    fn channel_stats_default_to_zero() {
        let (_dir, store) = open_store();
        let ana = user(&store, "ana");
        assert_eq!(channel_stats(&store, &ana.id).unwrap(), ChannelStats::default());
    }

    #[test]
    fn unpublished_videos_do_not_count_towards_stats() {
        let (_dir, store) = open_store();
        let ana = user(&store, "ana");
        let hidden = upload(&store, &ana, "hidden", 7);
        store
            .update(&hidden.id, |v: &mut Video| v.is_published = false)
            .unwrap();
        upload(&store, &ana, "shown", 2);

        let stats = channel_stats(&store, &ana.id).unwrap();
        assert_eq!(stats.total_videos, 1);
        assert_eq!(stats.total_views, 2);
    }

    #[test]
    fn subscriber_and_subscription_counts_are_independent() {
        let (_dir, store) = open_store();
        let ana = user(&store, "ana");
        let bo = user(&store, "bo");
        let cy = user(&store, "cy");
        store.insert(&Subscription::new(bo.id.clone(), ana.id.clone())).unwrap();
        store.insert(&Subscription::new(cy.id.clone(), ana.id.clone())).unwrap();
        store.insert(&Subscription::new(ana.id.clone(), cy.id.clone())).unwrap();

        let profile = channel_profile(&store, "ANA", Some(&bo.id)).unwrap().unwrap();
        assert_eq!(profile.subscribers_count, 2);
        assert_eq!(profile.subscribed_to_count, 1);
        assert!(profile.is_subscribed);

        let as_cy = channel_profile(&store, "bo", Some(&cy.id)).unwrap().unwrap();
        assert_eq!(as_cy.subscribers_count, 0);
        assert_eq!(as_cy.subscribed_to_count, 1);
        assert!(!as_cy.is_subscribed);

        assert!(channel_profile(&store, "nobody", None).unwrap().is_none());
    }

    #[test]
    fn subscription_lists_embed_public_user_fields() {
        let (_dir, store) = open_store();
        let ana = user(&store, "ana");
        let bo = user(&store, "bo");
        let cy = user(&store, "cy");
        store.insert(&Subscription::new(bo.id.clone(), ana.id.clone())).unwrap();
        store.insert(&Subscription::new(cy.id.clone(), ana.id.clone())).unwrap();

        let subscribers = channel_subscribers(&store, &ana.id, Page::default()).unwrap();
        let names: Vec<&str> = subscribers.iter().map(|s| s.subscriber.username.as_str()).collect();
        assert_eq!(names, ["cy", "bo"]);

        let raw = store
            .aggregate(
                Collection::Subscriptions,
                &subscription_list("channel", &ana.id, "subscriber", Page::default()),
            )
            .unwrap();
        assert!(raw[0]["subscriber"].get("password").is_none());

        let following = subscribed_channels(&store, &bo.id, Page::default()).unwrap();
        assert_eq!(following.len(), 1);
        assert_eq!(following[0].channel.id, ana.id);
    }

    #[test]
    fn playlist_keeps_insertion_order() {
        let (_dir, store) = open_store();
        let ana = user(&store, "ana");
        let first = upload(&store, &ana, "first", 0);
        let second = upload(&store, &ana, "second", 0);
        let mut playlist = Playlist::new(ana.id.clone(), "mix", "");
        playlist.add_video(&second.id);
        playlist.add_video(&first.id);
        playlist.add_video(&second.id);
        store.insert(&playlist).unwrap();

        let loaded = playlist_with_videos(&store, &playlist.id, &ana.id).unwrap().unwrap();
        let titles: Vec<&str> = loaded.videos.iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, ["second", "first"]);

        let summaries = user_playlists(&store, &ana.id, Page::default()).unwrap();
        assert_eq!(summaries[0].total_videos, 2);
    }

    #[test]
    fn watch_history_follows_history_order_with_owner() {
        let (_dir, store) = open_store();
        let ana = user(&store, "ana");
        let viewer = user(&store, "viewer");
        let a = upload(&store, &ana, "a", 0);
        let b = upload(&store, &ana, "b", 0);
        store
            .update(&viewer.id, |u: &mut User| {
                u.record_watch(&b.id);
                u.record_watch(&a.id);
            })
            .unwrap();

        let history = watch_history(&store, &viewer.id).unwrap();
        let titles: Vec<&str> = history.iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, ["a", "b"]);
        assert_eq!(history[0].owner.as_ref().unwrap().username, "ana");
        assert!(watch_history(&store, &DocId::generate()).unwrap().is_empty());
    }

    #[test]
    fn video_listing_sorts_newest_first_and_searches() {
        let (_dir, store) = open_store();
        let ana = user(&store, "ana");
        for title in ["t1 rust", "t2", "t3 Rust"] {
            upload(&store, &ana, title, 0);
        }

        let all = VideoListing {
            owner: Some(ana.id.clone()),
            ..VideoListing::default()
        }
        .fetch(&store, Page::default())
        .unwrap();
        let titles: Vec<&str> = all.iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, ["t3 Rust", "t2", "t1 rust"]);

        let found = VideoListing {
            search: Some("RUST".into()),
            sort: VideoSort::Title,
            order: SortOrder::Asc,
            ..VideoListing::default()
        }
        .fetch(&store, Page::new(Some(1), Some(1)))
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "t1 rust");
    }

    #[test]
    fn video_details_report_viewer_like() {
        let (_dir, store) = open_store();
        let ana = user(&store, "ana");
        let bo = user(&store, "bo");
        let clip = upload(&store, &ana, "clip", 4);
        like(&store, LikeTarget::Video(clip.id.clone()), &bo);

        let seen_by_bo = video_details(&store, &clip.id, &bo.id).unwrap().unwrap();
        assert_eq!(seen_by_bo.likes_count, 1);
        assert!(seen_by_bo.is_liked);
        assert_eq!(seen_by_bo.video.owner.as_ref().unwrap().username, "ana");

        let seen_by_ana = video_details(&store, &clip.id, &ana.id).unwrap().unwrap();
        assert!(!seen_by_ana.is_liked);
        assert!(video_details(&store, &DocId::generate(), &ana.id).unwrap().is_none());
    }

    #[test]
    fn comments_and_tweets_carry_like_counts() {
        let (_dir, store) = open_store();
        let ana = user(&store, "ana");
        let bo = user(&store, "bo");
        let clip = upload(&store, &ana, "clip", 0);
        let comment = Comment::new(clip.id.clone(), bo.id.clone(), "first!");
        store.insert(&comment).unwrap();
        let tweet = Tweet::new(ana.id.clone(), "new upload");
        store.insert(&tweet).unwrap();
        like(&store, LikeTarget::Comment(comment.id.clone()), &ana);
        like(&store, LikeTarget::Tweet(tweet.id.clone()), &bo);
        like(&store, LikeTarget::Tweet(tweet.id.clone()), &ana);

        let comments = video_comments(&store, &clip.id, Page::default()).unwrap();
        assert_eq!(comments[0].likes_count, 1);
        assert_eq!(comments[0].owner.as_ref().unwrap().username, "bo");

        let tweets = user_tweets(&store, &ana.id, Page::default()).unwrap();
        assert_eq!(tweets[0].likes_count, 2);
        assert_eq!(tweets[0].tweet.content, "new upload");
    }

    #[test]
    fn unpublished_videos_hidden_from_other_viewers_in_joins() {
        let (_dir, store) = open_store();
        let ana = user(&store, "ana");
        let bo = user(&store, "bo");
        let shown = upload(&store, &ana, "shown", 0);
        let secret = upload(&store, &ana, "secret", 0);

        let mut playlist = Playlist::new(bo.id.clone(), "mix", "");
        playlist.add_video(&secret.id);
        playlist.add_video(&shown.id);
        store.insert(&playlist).unwrap();
        like(&store, LikeTarget::Video(secret.id.clone()), &bo);
        like(&store, LikeTarget::Video(secret.id.clone()), &ana);
        for viewer in [&ana, &bo] {
            store
                .update(&viewer.id, |u: &mut User| {
                    u.record_watch(&shown.id);
                    u.record_watch(&secret.id);
                })
                .unwrap();
        }
        store
            .update(&secret.id, |v: &mut Video| v.is_published = false)
            .unwrap();

        let as_bo = playlist_with_videos(&store, &playlist.id, &bo.id).unwrap().unwrap();
        let titles: Vec<&str> = as_bo.videos.iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, ["shown"]);
        let as_ana = playlist_with_videos(&store, &playlist.id, &ana.id).unwrap().unwrap();
        assert_eq!(as_ana.videos.len(), 2);

        let liked_by_bo = LikedVideos::new()
            .liked_by(bo.id.clone())
            .seen_by(bo.id.clone())
            .fetch(&store, Page::default())
            .unwrap();
        assert!(liked_by_bo.is_empty());
        let liked_by_ana = LikedVideos::new()
            .liked_by(ana.id.clone())
            .seen_by(ana.id.clone())
            .fetch(&store, Page::default())
            .unwrap();
        assert_eq!(liked_by_ana.len(), 1);
        assert_eq!(channel_stats(&store, &ana.id).unwrap().total_likes, 1);

        let history: Vec<String> = watch_history(&store, &bo.id)
            .unwrap()
            .into_iter()
            .map(|v| v.title)
            .collect();
        assert_eq!(history, ["shown"]);
        assert_eq!(watch_history(&store, &ana.id).unwrap().len(), 2);
    }
}
