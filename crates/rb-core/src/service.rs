//! # BlogService
//!
//! Runs every user-facing action: auth gate, input rules, one repo write,
//! then recomputation of scores and threads from the stored rows.

use std::sync::Arc;

use chrono::Utc;
use tokio::task;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{require_owner_or_admin, require_session, validate_registration};
use crate::error::{AppError, Result};
use crate::models::{Post, PublicUser, Reply, Role, Session, User, Vote, VoteKind, VoteTarget};
use crate::slug::slugify;
use crate::thread::{assemble, count};
use crate::traits::{AuthProvider, BlogRepo};
use crate::views::{PostSummary, PostView, ProfileReply, UserProfile};
use crate::votes::{aggregate, toggle, VoteChange, VoteSummary};

/// Widest column the schema has for a title.
pub const MAX_TITLE_LEN: usize = 500;
pub const DEFAULT_FEATURED: i64 = 3;
pub const MAX_FEATURED: i64 = 20;

#[derive(Clone)]
pub struct BlogService {
    repo: Arc<dyn BlogRepo>,
    auth: Arc<dyn AuthProvider>,
}

impl BlogService {
    pub fn new(repo: Arc<dyn BlogRepo>, auth: Arc<dyn AuthProvider>) -> Self {
        Self { repo, auth }
    }

    // ── Accounts ────────────────────────────────────────────────────────────

    pub async fn register(&self, username: &str, password: &str) -> Result<PublicUser> {
        validate_registration(username, password)?;

        if self.repo.get_user_by_username(username).await?.is_some() {
            return Err(AppError::Conflict(format!("username '{username}' is already taken")));
        }

        let user = User {
            id: Uuid::now_v7(),
            username: username.to_string(),
            password_hash: self.hash_password(password).await?,
            role: Role::Member,
            created_at: Utc::now(),
        };
        // A concurrent registration of the same name surfaces here as Conflict.
        self.repo.create_user(&user).await?;

        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(user.into())
    }

    /// Checks credentials and returns the session plus its signed cookie value.
    pub async fn login(&self, username: &str, password: &str) -> Result<(Session, String)> {
        if username.is_empty() || password.is_empty() {
            return Err(AppError::validation("username and password are required"));
        }

        let user = self.repo.get_user_by_username(username).await?;
        let verified = self
            .verify_password(password, user.as_ref().map(|u| u.password_hash.clone()))
            .await?;

        let user = match user {
            Some(user) if verified => user,
            _ => {
                debug!("rejected login attempt");
                return Err(AppError::InvalidCredentials);
            }
        };

        let session = Session::from(&user);
        let token = self.auth.issue_session(&session)?;
        info!(user_id = %user.id, "user logged in");
        Ok((session, token))
    }

    /// Nothing to revoke server-side; the caller drops the cookie.
    pub fn logout(&self, session: Option<&Session>) {
        if let Some(session) = session {
            info!(user_id = %session.user_id, "user logged out");
        }
    }

    /// Decodes a cookie value. Forged or expired tokens read as no session.
    pub fn read_session(&self, token: &str) -> Option<Session> {
        self.auth.read_session(token)
    }

    pub async fn current_user(&self, session: Option<&Session>) -> Result<Option<PublicUser>> {
        let Some(session) = session else {
            return Ok(None);
        };
        Ok(self.repo.get_user(session.user_id).await?.map(PublicUser::from))
    }

    /// Creates the admin account, or promotes it if the name is already registered.
    pub async fn ensure_admin(&self, username: &str, password: &str) -> Result<PublicUser> {
        validate_registration(username, password)?;

        if let Some(mut user) = self.repo.get_user_by_username(username).await? {
            if user.role != Role::Admin {
                self.repo.set_user_role(user.id, Role::Admin).await?;
                user.role = Role::Admin;
                warn!(username = %user.username, "existing account promoted to admin");
            }
            return Ok(user.into());
        }

        let user = User {
            id: Uuid::now_v7(),
            username: username.to_string(),
            password_hash: self.hash_password(password).await?,
            role: Role::Admin,
            created_at: Utc::now(),
        };
        self.repo.create_user(&user).await?;
        info!(username = %user.username, "admin account created");
        Ok(user.into())
    }

    // ── Posts ───────────────────────────────────────────────────────────────

    pub async fn create_post(&self, session: Option<&Session>, title: &str, content: &str) -> Result<Post> {
        let session = require_session(session)?;

        let title = title.trim();
        let content = content.trim();
        if title.is_empty() || content.is_empty() {
            return Err(AppError::validation("title and content are required"));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(AppError::validation(format!(
                "title must be at most {MAX_TITLE_LEN} characters"
            )));
        }

        let now = Utc::now();
        let post = Post {
            id: Uuid::now_v7(),
            title: title.to_string(),
            content: content.to_string(),
            author_id: session.user_id,
            author_name: session.username.clone(),
            created_at: now,
            updated_at: now,
        };
        self.repo.create_post(&post).await?;

        info!(post_id = %post.id, author_id = %session.user_id, "post created");
        Ok(post)
    }

    pub async fn delete_post(&self, session: Option<&Session>, post_id: Uuid) -> Result<()> {
        let session = require_session(session)?;

        let post = self
            .repo
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("post", post_id))?;

        if !require_owner_or_admin(post.author_id, session) {
            warn!(post_id = %post_id, user_id = %session.user_id, "delete refused");
            return Err(AppError::AuthorizationDenied(
                "only the author or an admin may delete this post".into(),
            ));
        }

        if !self.repo.delete_post(post_id).await? {
            return Err(AppError::not_found("post", post_id));
        }
        info!(post_id = %post_id, user_id = %session.user_id, "post deleted");
        Ok(())
    }

    pub async fn list_posts(&self, session: Option<&Session>) -> Result<Vec<PostView>> {
        let posts = self.repo.list_posts().await?;
        let mut views = Vec::with_capacity(posts.len());
        for post in posts {
            views.push(self.post_view(post, session).await?);
        }
        Ok(views)
    }

    /// A random handful of posts for the landing page.
    pub async fn featured_posts(&self, limit: i64, session: Option<&Session>) -> Result<Vec<PostSummary>> {
        let posts = self.repo.random_posts(limit.clamp(1, MAX_FEATURED)).await?;
        let viewer = session.map(|s| s.user_id);
        let mut summaries = Vec::with_capacity(posts.len());
        for post in posts {
            summaries.push(self.post_summary(post, viewer).await?);
        }
        Ok(summaries)
    }

    /// Oldest post whose title slugifies to `slug`.
    pub async fn get_post_by_slug(&self, slug: &str, session: Option<&Session>) -> Result<PostView> {
        let post = self
            .repo
            .list_posts_oldest_first()
            .await?
            .into_iter()
            .find(|p| slugify(&p.title) == slug)
            .ok_or_else(|| AppError::not_found("post", slug))?;
        self.post_view(post, session).await
    }

    // ── Replies ─────────────────────────────────────────────────────────────

    pub async fn create_reply(
        &self,
        session: Option<&Session>,
        post_id: Uuid,
        text: &str,
        parent_id: Option<Uuid>,
    ) -> Result<Reply> {
        let session = require_session(session)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::validation("reply must not be empty"));
        }

        if self.repo.get_post(post_id).await?.is_none() {
            return Err(AppError::not_found("post", post_id));
        }
        if let Some(parent_id) = parent_id {
            let parent = self
                .repo
                .get_reply(parent_id)
                .await?
                .ok_or_else(|| AppError::not_found("reply", parent_id))?;
            if parent.post_id != post_id {
                return Err(AppError::validation("parent reply belongs to a different post"));
            }
        }

        let reply = Reply {
            id: Uuid::now_v7(),
            text: text.to_string(),
            post_id,
            author_id: session.user_id,
            author_name: session.username.clone(),
            parent_id,
            created_at: Utc::now(),
        };
        self.repo.create_reply(&reply).await?;

        info!(reply_id = %reply.id, post_id = %post_id, "reply created");
        Ok(reply)
    }

    // ── Votes ───────────────────────────────────────────────────────────────

    pub async fn vote_post(&self, session: Option<&Session>, post_id: Uuid, kind: &str) -> Result<VoteSummary> {
        self.vote(session, VoteTarget::Post(post_id), kind).await
    }

    pub async fn vote_reply(&self, session: Option<&Session>, reply_id: Uuid, kind: &str) -> Result<VoteSummary> {
        self.vote(session, VoteTarget::Reply(reply_id), kind).await
    }

    /// Toggles the viewer's vote on `target` and returns the fresh tally.
    async fn vote(&self, session: Option<&Session>, target: VoteTarget, kind: &str) -> Result<VoteSummary> {
        let session = require_session(session)?;
        let requested: VoteKind = kind.parse()?;

        match target {
            VoteTarget::Post(id) => {
                if self.repo.get_post(id).await?.is_none() {
                    return Err(AppError::not_found("post", id));
                }
            }
            VoteTarget::Reply(id) => {
                if self.repo.get_reply(id).await?.is_none() {
                    return Err(AppError::not_found("reply", id));
                }
            }
        }

        match self.repo.find_vote(session.user_id, target).await? {
            Some(existing) => match toggle(Some(existing.kind), requested) {
                VoteChange::Remove => self.repo.delete_vote(existing.id).await?,
                VoteChange::Switch(kind) => self.repo.update_vote_kind(existing.id, kind).await?,
                VoteChange::Create(kind) => self.insert_vote(session, target, kind).await?,
            },
            None => self.insert_vote(session, target, requested).await?,
        }

        let votes = self.repo.list_votes(target).await?;
        Ok(aggregate(&votes, Some(session.user_id)))
    }

    async fn insert_vote(&self, session: &Session, target: VoteTarget, kind: VoteKind) -> Result<()> {
        let vote = Vote {
            id: Uuid::now_v7(),
            kind,
            user_id: session.user_id,
            target,
        };
        match self.repo.insert_vote(&vote).await {
            Ok(()) => Ok(()),
            // Another request for the same (user, target) won the insert race.
            Err(AppError::Conflict(reason)) => {
                debug!(user_id = %session.user_id, ?target, %reason, "duplicate vote ignored");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // ── Profiles ────────────────────────────────────────────────────────────

    pub async fn get_user_profile(&self, username: &str, session: Option<&Session>) -> Result<UserProfile> {
        let user = self
            .repo
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| AppError::not_found("user", username))?;
        let viewer = session.map(|s| s.user_id);

        let mut posts = Vec::new();
        for post in self.repo.list_posts_by_author(user.id).await? {
            posts.push(self.post_summary(post, viewer).await?);
        }

        let replies = self
            .repo
            .list_replies_by_author(user.id)
            .await?
            .into_iter()
            .map(|(reply, post_title)| ProfileReply {
                post_slug: slugify(&post_title),
                post_title,
                reply,
            })
            .collect();

        let total_likes = self.repo.count_upvotes_received(user.id).await?;

        Ok(UserProfile {
            is_own_profile: viewer == Some(user.id),
            user: user.into(),
            posts,
            replies,
            total_likes,
        })
    }

    // ── Password work ───────────────────────────────────────────────────────

    // Key derivation is CPU-bound and must not stall the async workers.

    async fn hash_password(&self, password: &str) -> Result<String> {
        let auth = Arc::clone(&self.auth);
        let password = password.to_owned();
        task::spawn_blocking(move || auth.hash_password(&password))
            .await
            .map_err(blocking_failed)?
    }

    async fn verify_password(&self, password: &str, stored: Option<String>) -> Result<bool> {
        let auth = Arc::clone(&self.auth);
        let password = password.to_owned();
        task::spawn_blocking(move || auth.verify_password(&password, stored.as_deref()))
            .await
            .map_err(blocking_failed)
    }

    // ── Assembly helpers ────────────────────────────────────────────────────

    async fn post_view(&self, post: Post, session: Option<&Session>) -> Result<PostView> {
        let viewer = session.map(|s| s.user_id);

        let votes = self.repo.list_votes(VoteTarget::Post(post.id)).await?;
        let replies = self.repo.list_replies_for_post(post.id).await?;
        let reply_votes = self.repo.list_reply_votes_for_post(post.id).await?;

        let replies = assemble(replies, &reply_votes, viewer);
        Ok(PostView {
            slug: slugify(&post.title),
            votes: aggregate(&votes, viewer),
            reply_count: count(&replies),
            replies,
            can_delete: session.is_some_and(|s| require_owner_or_admin(post.author_id, s)),
            post,
        })
    }

    async fn post_summary(&self, post: Post, viewer: Option<Uuid>) -> Result<PostSummary> {
        let votes = self.repo.list_votes(VoteTarget::Post(post.id)).await?;
        let reply_count = self.repo.count_replies_for_post(post.id).await?;
        let reply_count = usize::try_from(reply_count)
            .map_err(|_| AppError::Internal(format!("negative reply count for post {}", post.id)))?;
        Ok(PostSummary {
            slug: slugify(&post.title),
            votes: aggregate(&votes, viewer),
            reply_count,
            post,
        })
    }
}

fn blocking_failed(e: task::JoinError) -> AppError {
    error!(error = %e, "password task did not complete");
    AppError::Internal("password check failed".into())
}
