//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Post, Reply, Role, Session, User, Vote, VoteKind, VoteTarget};

/// Data persistence contract for users, posts, replies and votes.
///
/// Each write is a single autocommitting statement. Implementations report
/// unique-constraint violations as [`crate::AppError::Conflict`] and every
/// other storage failure as [`crate::AppError::Persistence`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlogRepo: Send + Sync {
    // User Operations
    async fn create_user(&self, user: &User) -> Result<()>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn set_user_role(&self, id: Uuid, role: Role) -> Result<()>;

    // Post Operations
    async fn create_post(&self, post: &Post) -> Result<()>;
    async fn get_post(&self, id: Uuid) -> Result<Option<Post>>;
    /// Newest first.
    async fn list_posts(&self) -> Result<Vec<Post>>;
    /// Oldest first; used for slug resolution.
    async fn list_posts_oldest_first(&self) -> Result<Vec<Post>>;
    /// Newest first.
    async fn list_posts_by_author(&self, author_id: Uuid) -> Result<Vec<Post>>;
    async fn random_posts(&self, limit: i64) -> Result<Vec<Post>>;
    /// Removes the post and, by cascade, its replies and votes.
    /// Returns false when no row matched.
    async fn delete_post(&self, id: Uuid) -> Result<bool>;

    // Reply Operations
    async fn create_reply(&self, reply: &Reply) -> Result<()>;
    async fn get_reply(&self, id: Uuid) -> Result<Option<Reply>>;
    /// Ascending creation time, ties in insertion order.
    async fn list_replies_for_post(&self, post_id: Uuid) -> Result<Vec<Reply>>;
    async fn count_replies_for_post(&self, post_id: Uuid) -> Result<i64>;
    /// Newest first, each paired with the title of the post it belongs to.
    async fn list_replies_by_author(&self, author_id: Uuid) -> Result<Vec<(Reply, String)>>;

    // Vote Operations
    async fn find_vote(&self, user_id: Uuid, target: VoteTarget) -> Result<Option<Vote>>;
    async fn insert_vote(&self, vote: &Vote) -> Result<()>;
    async fn update_vote_kind(&self, id: Uuid, kind: VoteKind) -> Result<()>;
    async fn delete_vote(&self, id: Uuid) -> Result<()>;
    async fn list_votes(&self, target: VoteTarget) -> Result<Vec<Vote>>;
    /// Votes on every reply of one post, in one round trip.
    async fn list_reply_votes_for_post(&self, post_id: Uuid) -> Result<Vec<Vote>>;
    /// Number of `up` votes cast on the user's posts and replies.
    async fn count_upvotes_received(&self, user_id: Uuid) -> Result<i64>;
}

/// Credential and session contract.
#[cfg_attr(test, mockall::automock)]
pub trait AuthProvider: Send + Sync {
    /// Produces a salted hash suitable for [`User::password_hash`].
    fn hash_password(&self, password: &str) -> Result<String>;

    /// Constant-time check of `password` against a stored hash.
    ///
    /// With `stored == None` (unknown user) a decoy hash is verified instead,
    /// so both failure paths cost the same; the result is then always false.
    fn verify_password<'a>(&self, password: &str, stored: Option<&'a str>) -> bool;

    /// Serializes and signs a session into an opaque cookie value.
    fn issue_session(&self, session: &Session) -> Result<String>;

    /// Returns the session if the token is authentic and unexpired.
    fn read_session(&self, token: &str) -> Option<Session>;
}
