//! Documents persisted by the vidshare store.
//!
//! Every struct here is serialized as a JSON object with camelCase keys and an
//! `_id` field, which is the shape the aggregation pipelines in
//! [`crate::pipeline`] operate on. Field names referenced by pipelines are
//! therefore part of the contract: renaming a field means updating the
//! queries in [`crate::queries`] too.

use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, SubsecRound, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Logical collections of the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    Videos,
    Comments,
    Likes,
    Subscriptions,
    Playlists,
    Tweets,
}

impl Collection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Videos => "videos",
            Collection::Comments => "comments",
            Collection::Likes => "likes",
            Collection::Subscriptions => "subscriptions",
            Collection::Playlists => "playlists",
            Collection::Tweets => "tweets",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document identifier using the ObjectId layout: 4 bytes of unix seconds,
/// 5 random bytes chosen once per process and a 3 byte counter, hex encoded.
///
/// Ids minted by one process sort in creation order, which the list queries
/// rely on as a tie-break when two documents share a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

#[derive(Debug, thiserror::Error)]
#[error("`{0}` is not a valid document id")]
pub struct InvalidId(pub String);

impl DocId {
    pub fn generate() -> Self {
        static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let process = PROCESS_UNIQUE.get_or_init(|| {
            let mut bytes = [0u8; 5];
            OsRng.fill_bytes(&mut bytes);
            bytes
        });
        let seconds = Utc::now().timestamp() as u32;
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(process);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes.iter().map(|byte| format!("{byte:02x}")).collect())
    }

    /// Accepts 24 hex characters (any case) and normalizes to lowercase.
    pub fn parse(raw: &str) -> Result<Self, InvalidId> {
        let trimmed = raw.trim();
        if trimmed.len() == 24 && trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(trimmed.to_ascii_lowercase()))
        } else {
            Err(InvalidId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&DocId> for Value {
    fn from(id: &DocId) -> Self {
        Value::String(id.0.clone())
    }
}

impl From<DocId> for Value {
    fn from(id: DocId) -> Self {
        Value::String(id.0)
    }
}

/// Current time truncated to the precision timestamps are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// RFC 3339 timestamps with a fixed microsecond width so that comparing the
/// stored strings gives the same answer as comparing the instants.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(at: &DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Implemented by every struct stored in a collection.
pub trait Document: Serialize + DeserializeOwned + Send + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> &DocId;

    /// Called by the store before writing an updated document.
    fn touch(&mut self, at: DateTime<Utc>);

    /// Key that must be unique within the collection. Only relation
    /// documents (likes, subscriptions) have one.
    fn relation_key(&self) -> Option<String> {
        None
    }
}

/// Documents that link two other documents and may exist at most once per
/// pair. The store toggles them on [`Relation::key`].
pub trait Relation: Document {
    fn key(&self) -> String;
}

macro_rules! impl_document {
    ($ty:ty, $collection:expr) => {
        impl Document for $ty {
            const COLLECTION: Collection = $collection;

            fn id(&self) -> &DocId {
                &self.id
            }

            fn touch(&mut self, at: DateTime<Utc>) {
                self.updated_at = at;
            }
        }
    };
}

/// Fields of a user that may be joined into other documents.
pub const OWNER_FIELDS: &[&str] = &["username", "fullName", "avatar"];

/// Fields of a user that make up the public channel profile.
pub const PROFILE_FIELDS: &[&str] = &["username", "fullName", "avatar", "coverImage", "email"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: DocId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    #[serde(default)]
    pub cover_image: String,
    /// argon2 PHC string.
    pub password: String,
    /// Most recently watched first, without duplicates.
    #[serde(default)]
    pub watch_history: Vec<DocId>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl_document!(User, Collection::Users);

impl User {
    pub fn new(
        username: &str,
        email: &str,
        full_name: &str,
        avatar: &str,
        cover_image: Option<&str>,
        password_hash: String,
    ) -> Self {
        let at = now();
        Self {
            id: DocId::generate(),
            username: username.trim().to_lowercase(),
            email: email.trim().to_lowercase(),
            full_name: full_name.trim().to_string(),
            avatar: avatar.trim().to_string(),
            cover_image: cover_image.map(str::trim).unwrap_or_default().to_string(),
            password: password_hash,
            watch_history: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }

    pub fn record_watch(&mut self, video: &DocId) {
        self.watch_history.retain(|id| id != video);
        self.watch_history.insert(0, video.clone());
    }
}

/// A user without credentials, as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: DocId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: String,
    pub watch_history: Vec<DocId>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            avatar: user.avatar,
            cover_image: user.cover_image,
            watch_history: user.watch_history,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    #[serde(rename = "_id")]
    pub id: DocId,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    /// Seconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub views: u64,
    #[serde(default = "default_published")]
    pub is_published: bool,
    pub owner: DocId,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

fn default_published() -> bool {
    true
}

impl_document!(Video, Collection::Videos);

impl Video {
    pub fn new(
        owner: DocId,
        title: &str,
        description: &str,
        video_file: &str,
        thumbnail: &str,
        duration: f64,
    ) -> Self {
        let at = now();
        Self {
            id: DocId::generate(),
            video_file: video_file.to_string(),
            thumbnail: thumbnail.to_string(),
            title: title.trim().to_string(),
            description: description.trim().to_string(),
            duration: duration.max(0.0),
            views: 0,
            is_published: true,
            owner,
            created_at: at,
            updated_at: at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: DocId,
    pub content: String,
    pub video: DocId,
    pub owner: DocId,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl_document!(Comment, Collection::Comments);

impl Comment {
    pub fn new(video: DocId, owner: DocId, content: &str) -> Self {
        let at = now();
        Self {
            id: DocId::generate(),
            content: content.trim().to_string(),
            video,
            owner,
            created_at: at,
            updated_at: at,
        }
    }
}

/// What a like points at. Serialized externally tagged, e.g.
/// `{"video": "<id>"}`, so grouping on `target.video` yields `null` for
/// comment and tweet likes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeTarget {
    Video(DocId),
    Comment(DocId),
    Tweet(DocId),
}

impl LikeTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            LikeTarget::Video(_) => "video",
            LikeTarget::Comment(_) => "comment",
            LikeTarget::Tweet(_) => "tweet",
        }
    }

    pub fn id(&self) -> &DocId {
        match self {
            LikeTarget::Video(id) | LikeTarget::Comment(id) | LikeTarget::Tweet(id) => id,
        }
    }

    /// Collection the target lives in.
    pub fn collection(&self) -> Collection {
        match self {
            LikeTarget::Video(_) => Collection::Videos,
            LikeTarget::Comment(_) => Collection::Comments,
            LikeTarget::Tweet(_) => Collection::Tweets,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    #[serde(rename = "_id")]
    pub id: DocId,
    pub target: LikeTarget,
    pub liked_by: DocId,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Document for Like {
    const COLLECTION: Collection = Collection::Likes;

    fn id(&self) -> &DocId {
        &self.id
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    fn relation_key(&self) -> Option<String> {
        Some(self.key())
    }
}

impl Relation for Like {
    fn key(&self) -> String {
        format!("{}:{}:{}", self.target.kind(), self.target.id(), self.liked_by)
    }
}

impl Like {
    pub fn new(target: LikeTarget, liked_by: DocId) -> Self {
        let at = now();
        Self {
            id: DocId::generate(),
            target,
            liked_by,
            created_at: at,
            updated_at: at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(rename = "_id")]
    pub id: DocId,
    pub subscriber: DocId,
    pub channel: DocId,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Document for Subscription {
    const COLLECTION: Collection = Collection::Subscriptions;

    fn id(&self) -> &DocId {
        &self.id
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    fn relation_key(&self) -> Option<String> {
        Some(self.key())
    }
}

impl Relation for Subscription {
    fn key(&self) -> String {
        format!("{}>{}", self.subscriber, self.channel)
    }
}

impl Subscription {
    pub fn new(subscriber: DocId, channel: DocId) -> Self {
        let at = now();
        Self {
            id: DocId::generate(),
            subscriber,
            channel,
            created_at: at,
            updated_at: at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    #[serde(rename = "_id")]
    pub id: DocId,
    pub name: String,
    pub description: String,
    pub owner: DocId,
    #[serde(default)]
    pub videos: Vec<DocId>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl_document!(Playlist, Collection::Playlists);

impl Playlist {
    pub fn new(owner: DocId, name: &str, description: &str) -> Self {
        let at = now();
        Self {
            id: DocId::generate(),
            name: name.trim().to_string(),
            description: description.trim().to_string(),
            owner,
            videos: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }

    /// Appends `video` unless it is already present. Returns whether the
    /// playlist changed.
    pub fn add_video(&mut self, video: &DocId) -> bool {
        if self.videos.contains(video) {
            return false;
        }
        self.videos.push(video.clone());
        true
    }

    pub fn remove_video(&mut self, video: &DocId) -> bool {
        let before = self.videos.len();
        self.videos.retain(|id| id != video);
        self.videos.len() != before
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tweet {
    #[serde(rename = "_id")]
    pub id: DocId,
    pub content: String,
    pub owner: DocId,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl_document!(Tweet, Collection::Tweets);

impl Tweet {
    pub fn new(owner: DocId, content: &str) -> Self {
        let at = now();
        Self {
            id: DocId::generate(),
            content: content.trim().to_string(),
            owner,
            created_at: at,
            updated_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn generated_ids_parse_and_increase() {
        let first = DocId::generate();
        let second = DocId::generate();
        assert_eq!(DocId::parse(first.as_str()).unwrap(), first);
        assert!(second > first);
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        assert!(DocId::parse("").is_err());
        assert!(DocId::parse("not-an-id").is_err());
        assert!(DocId::parse("zzzzzzzzzzzzzzzzzzzzzzzz").is_err());
        let id = DocId::parse("65A1B2C3D4E5F60718293A4B").unwrap();
        assert_eq!(id.as_str(), "65a1b2c3d4e5f60718293a4b");
    }

    #[test]
    fn like_target_is_externally_tagged() {
        let video = DocId::generate();
        let like = Like::new(LikeTarget::Video(video.clone()), DocId::generate());
        let value = serde_json::to_value(&like).unwrap();
        assert_eq!(value["target"]["video"], Value::from(&video));
        assert!(value["target"].get("comment").is_none());
    }

    #[test]
    fn relation_keys_distinguish_target_kinds() {
        let target = DocId::generate();
        let user = DocId::generate();
        let on_video = Like::new(LikeTarget::Video(target.clone()), user.clone());
        let on_tweet = Like::new(LikeTarget::Tweet(target), user);
        assert_ne!(on_video.relation_key(), on_tweet.relation_key());
    }

    #[test]
    fn timestamps_have_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let fractional = whole + chrono::Duration::milliseconds(500);
        let a = timestamp::format(&whole);
        let b = timestamp::format(&fractional);
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }

    #[test]
    fn playlist_ignores_duplicate_videos() {
        let mut playlist = Playlist::new(DocId::generate(), "mix", "late night");
        let video = DocId::generate();
        assert!(playlist.add_video(&video));
        assert!(!playlist.add_video(&video));
        assert_eq!(playlist.videos, vec![video.clone()]);
        assert!(playlist.remove_video(&video));
        assert!(!playlist.remove_video(&video));
    }

    #[test]
    fn watch_history_moves_rewatched_video_to_front() {
        let mut user = User::new("Ana", "ana@example.com", "Ana", "a.png", None, "hash".into());
        let first = DocId::generate();
        let second = DocId::generate();
        user.record_watch(&first);
        user.record_watch(&second);
        user.record_watch(&first);
        assert_eq!(user.watch_history, vec![first, second]);
        assert_eq!(user.username, "ana");
    }
}
