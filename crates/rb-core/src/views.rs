//! Read models assembled by [`crate::BlogService`] for the presentation layer.

use serde::Serialize;

use crate::models::{Post, PublicUser, Reply};
use crate::thread::ReplyNode;
use crate::votes::VoteSummary;

/// A post with everything needed to render its page.
#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub slug: String,
    pub votes: VoteSummary,
    pub reply_count: usize,
    pub replies: Vec<ReplyNode>,
    /// Viewer is the author or an admin.
    pub can_delete: bool,
}

/// A post as shown in lists and on profiles.
#[derive(Debug, Clone, Serialize)]
pub struct PostSummary {
    #[serde(flatten)]
    pub post: Post,
    pub slug: String,
    pub votes: VoteSummary,
    pub reply_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileReply {
    #[serde(flatten)]
    pub reply: Reply,
    pub post_title: String,
    pub post_slug: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub user: PublicUser,
    pub posts: Vec<PostSummary>,
    pub replies: Vec<ProfileReply>,
    /// Upvotes received across the user's posts and replies.
    pub total_likes: i64,
    pub is_own_profile: bool,
}
