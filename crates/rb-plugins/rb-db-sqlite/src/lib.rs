//! # rb-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `rb-core` domain models.

use std::str::FromStr;

use async_trait::async_trait;
use rb_core::error::{AppError, Result};
use rb_core::models::{Post, Reply, Role, User, Vote, VoteKind, VoteTarget};
use rb_core::traits::BlogRepo;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Decode, Row, Type};
use uuid::Uuid;

const POST_SELECT: &str = "SELECT p.id, p.title, p.content, p.author_id, u.username AS author_name, \
     p.created_at, p.updated_at FROM posts p JOIN users u ON u.id = p.author_id";

const REPLY_SELECT: &str = "SELECT r.id, r.text, r.post_id, r.author_id, u.username AS author_name, \
     r.parent_id, r.created_at FROM replies r JOIN users u ON u.id = r.author_id";

const VOTE_SELECT: &str = "SELECT v.id, v.kind, v.user_id, v.post_id, v.reply_id FROM votes v";

pub struct SqliteBlogRepo {
    pool: SqlitePool,
}

impl SqliteBlogRepo {
    /// Opens (creating if missing) the database and applies the schema.
    pub async fn new(url: &str) -> Result<Self> {
        Self::connect(url, 5).await
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db_err)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to an in-memory database is a separate database,
        // so keep exactly one and never let it be recycled.
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<std::time::Duration>)
                .max_lifetime(None::<std::time::Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await.map_err(db_err)?;

        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            tracing::error!(error = %e, "schema migration failed");
            AppError::Persistence("schema migration failed".into())
        })?;

        tracing::info!(url, "sqlite database ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Maps driver errors onto the domain error without leaking SQL details.
fn db_err(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            tracing::debug!(detail = %db.message(), "unique constraint rejected write");
            return AppError::Conflict("record already exists".into());
        }
    }
    tracing::error!(error = %e, "database operation failed");
    AppError::Persistence("database operation failed".into())
}

fn col<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T>
where
    T: Decode<'r, Sqlite> + Type<Sqlite>,
{
    row.try_get(name).map_err(db_err)
}

fn corrupt(what: &str) -> AppError {
    tracing::error!(what, "unexpected value in database row");
    AppError::Persistence("database operation failed".into())
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let role: String = col(row, "role")?;
    Ok(User {
        id: col(row, "id")?,
        username: col(row, "username")?,
        password_hash: col(row, "password_hash")?,
        role: Role::from_str(&role).map_err(|_| corrupt("users.role"))?,
        created_at: col(row, "created_at")?,
    })
}

fn post_from_row(row: &SqliteRow) -> Result<Post> {
    Ok(Post {
        id: col(row, "id")?,
        title: col(row, "title")?,
        content: col(row, "content")?,
        author_id: col(row, "author_id")?,
        author_name: col(row, "author_name")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn reply_from_row(row: &SqliteRow) -> Result<Reply> {
    Ok(Reply {
        id: col(row, "id")?,
        text: col(row, "text")?,
        post_id: col(row, "post_id")?,
        author_id: col(row, "author_id")?,
        author_name: col(row, "author_name")?,
        parent_id: col(row, "parent_id")?,
        created_at: col(row, "created_at")?,
    })
}

fn vote_from_row(row: &SqliteRow) -> Result<Vote> {
    let kind: String = col(row, "kind")?;
    let post_id: Option<Uuid> = col(row, "post_id")?;
    let reply_id: Option<Uuid> = col(row, "reply_id")?;
    let target = match (post_id, reply_id) {
        (Some(id), None) => VoteTarget::Post(id),
        (None, Some(id)) => VoteTarget::Reply(id),
        _ => return Err(corrupt("votes target")),
    };
    Ok(Vote {
        id: col(row, "id")?,
        kind: VoteKind::from_str(&kind).map_err(|_| corrupt("votes.kind"))?,
        user_id: col(row, "user_id")?,
        target,
    })
}

fn collect<T>(rows: Vec<SqliteRow>, map: fn(&SqliteRow) -> Result<T>) -> Result<Vec<T>> {
    rows.iter().map(map).collect()
}

#[async_trait]
impl BlogRepo for SqliteBlogRepo {
    async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query("INSERT INTO users (id, username, password_hash, role, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> Result<()> {
        sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn create_post(&self, post: &Post) -> Result<()> {
        sqlx::query("INSERT INTO posts (id, title, content, author_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)")
            .bind(post.id)
            .bind(&post.title)
            .bind(&post.content)
            .bind(post.author_id)
            .bind(post.created_at)
            .bind(post.updated_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>> {
        sqlx::query(&format!("{POST_SELECT} WHERE p.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(post_from_row)
            .transpose()
    }

    async fn list_posts(&self) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!("{POST_SELECT} ORDER BY p.created_at DESC, p.rowid DESC"))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        collect(rows, post_from_row)
    }

    async fn list_posts_oldest_first(&self) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!("{POST_SELECT} ORDER BY p.created_at ASC, p.rowid ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        collect(rows, post_from_row)
    }

    async fn list_posts_by_author(&self, author_id: Uuid) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "{POST_SELECT} WHERE p.author_id = ? ORDER BY p.created_at DESC, p.rowid DESC"
        ))
        .bind(author_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        collect(rows, post_from_row)
    }

    async fn random_posts(&self, limit: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!("{POST_SELECT} ORDER BY RANDOM() LIMIT ?"))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        collect(rows, post_from_row)
    }

    /// Replies and votes go with it through `ON DELETE CASCADE`.
    async fn delete_post(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_reply(&self, reply: &Reply) -> Result<()> {
        sqlx::query("INSERT INTO replies (id, text, post_id, author_id, parent_id, created_at) VALUES (?, ?, ?, ?, ?, ?)")
            .bind(reply.id)
            .bind(&reply.text)
            .bind(reply.post_id)
            .bind(reply.author_id)
            .bind(reply.parent_id)
            .bind(reply.created_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_reply(&self, id: Uuid) -> Result<Option<Reply>> {
        sqlx::query(&format!("{REPLY_SELECT} WHERE r.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(reply_from_row)
            .transpose()
    }

    async fn list_replies_for_post(&self, post_id: Uuid) -> Result<Vec<Reply>> {
        let rows = sqlx::query(&format!(
            "{REPLY_SELECT} WHERE r.post_id = ? ORDER BY r.created_at ASC, r.rowid ASC"
        ))
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        collect(rows, reply_from_row)
    }

    async fn count_replies_for_post(&self, post_id: Uuid) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM replies WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn list_replies_by_author(&self, author_id: Uuid) -> Result<Vec<(Reply, String)>> {
        let rows = sqlx::query(
            "SELECT r.id, r.text, r.post_id, r.author_id, u.username AS author_name, r.parent_id, \
             r.created_at, p.title AS post_title FROM replies r \
             JOIN users u ON u.id = r.author_id JOIN posts p ON p.id = r.post_id \
             WHERE r.author_id = ? ORDER BY r.created_at DESC, r.rowid DESC",
        )
        .bind(author_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| -> Result<(Reply, String)> { Ok((reply_from_row(row)?, col(row, "post_title")?)) })
            .collect()
    }

    async fn find_vote(&self, user_id: Uuid, target: VoteTarget) -> Result<Option<Vote>> {
        let sql = match target {
            VoteTarget::Post(_) => format!("{VOTE_SELECT} WHERE v.user_id = ? AND v.post_id = ?"),
            VoteTarget::Reply(_) => format!("{VOTE_SELECT} WHERE v.user_id = ? AND v.reply_id = ?"),
        };
        let target_id = match target {
            VoteTarget::Post(id) | VoteTarget::Reply(id) => id,
        };
        sqlx::query(&sql)
            .bind(user_id)
            .bind(target_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(vote_from_row)
            .transpose()
    }

    async fn insert_vote(&self, vote: &Vote) -> Result<()> {
        sqlx::query("INSERT INTO votes (id, kind, user_id, post_id, reply_id) VALUES (?, ?, ?, ?, ?)")
            .bind(vote.id)
            .bind(vote.kind.as_str())
            .bind(vote.user_id)
            .bind(vote.target.post_id())
            .bind(vote.target.reply_id())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn update_vote_kind(&self, id: Uuid, kind: VoteKind) -> Result<()> {
        sqlx::query("UPDATE votes SET kind = ? WHERE id = ?")
            .bind(kind.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_vote(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM votes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_votes(&self, target: VoteTarget) -> Result<Vec<Vote>> {
        let (sql, id) = match target {
            VoteTarget::Post(id) => (format!("{VOTE_SELECT} WHERE v.post_id = ?"), id),
            VoteTarget::Reply(id) => (format!("{VOTE_SELECT} WHERE v.reply_id = ?"), id),
        };
        let rows = sqlx::query(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        collect(rows, vote_from_row)
    }

    async fn list_reply_votes_for_post(&self, post_id: Uuid) -> Result<Vec<Vote>> {
        let rows = sqlx::query(&format!(
            "{VOTE_SELECT} JOIN replies r ON r.id = v.reply_id WHERE r.post_id = ?"
        ))
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        collect(rows, vote_from_row)
    }

    async fn count_upvotes_received(&self, user_id: Uuid) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT \
               (SELECT COUNT(*) FROM votes v JOIN posts p ON p.id = v.post_id \
                  WHERE p.author_id = ? AND v.kind = 'up') + \
               (SELECT COUNT(*) FROM votes v JOIN replies r ON r.id = v.reply_id \
                  WHERE r.author_id = ? AND v.kind = 'up')",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    async fn repo() -> SqliteBlogRepo {
        SqliteBlogRepo::new("sqlite::memory:").await.unwrap()
    }

    async fn user(repo: &SqliteBlogRepo, name: &str) -> User {
        let user = User {
            id: Uuid::now_v7(),
            username: name.into(),
            password_hash: "$argon2id$placeholder".into(),
            role: Role::Member,
            created_at: Utc::now(),
        };
        repo.create_user(&user).await.unwrap();
        user
    }

    async fn post(repo: &SqliteBlogRepo, author: &User, title: &str) -> Post {
        let now = Utc::now();
        let post = Post {
            id: Uuid::now_v7(),
            title: title.into(),
            content: "body".into(),
            author_id: author.id,
            author_name: String::new(),
            created_at: now,
            updated_at: now,
        };
        repo.create_post(&post).await.unwrap();
        post
    }

    async fn reply(repo: &SqliteBlogRepo, post: &Post, author: &User, parent: Option<Uuid>) -> Reply {
        let reply = Reply {
            id: Uuid::now_v7(),
            text: "a reply".into(),
            post_id: post.id,
            author_id: author.id,
            author_name: String::new(),
            parent_id: parent,
            created_at: Utc::now(),
        };
        repo.create_reply(&reply).await.unwrap();
        reply
    }

    #[tokio::test]
    async fn test_user_roundtrip_and_duplicate_username() {
        let repo = repo().await;
        let alice = user(&repo, "alice").await;

        let loaded = repo.get_user_by_username("alice").await.unwrap().unwrap();
        assert_eq!(loaded.id, alice.id);
        assert_eq!(loaded.role, Role::Member);
        assert!(repo.get_user_by_username("Alice").await.unwrap().is_none());

        let twin = User { id: Uuid::now_v7(), ..alice.clone() };
        let err = repo.create_user(&twin).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        repo.set_user_role(alice.id, Role::Admin).await.unwrap();
        assert_eq!(repo.get_user(alice.id).await.unwrap().unwrap().role, Role::Admin);
    }

    #[tokio::test]
    async fn test_post_join_fills_author_name() {
        let repo = repo().await;
        let alice = user(&repo, "alice").await;
        let p = post(&repo, &alice, "Hello").await;

        let loaded = repo.get_post(p.id).await.unwrap().unwrap();
        assert_eq!(loaded.author_name, "alice");
        assert_eq!(loaded.title, "Hello");
    }

    #[tokio::test]
    async fn test_post_ordering() {
        let repo = repo().await;
        let alice = user(&repo, "alice").await;
        let first = post(&repo, &alice, "first").await;
        let second = post(&repo, &alice, "second").await;

        let newest: Vec<Uuid> = repo.list_posts().await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(newest, vec![second.id, first.id]);
        let oldest: Vec<Uuid> = repo.list_posts_oldest_first().await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(oldest, vec![first.id, second.id]);
        assert_eq!(repo.random_posts(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replies_keep_insertion_order_on_equal_timestamps() {
        let repo = repo().await;
        let alice = user(&repo, "alice").await;
        let p = post(&repo, &alice, "thread").await;

        let at = Utc::now() - Duration::minutes(5);
        let mut ids = Vec::new();
        for text in ["one", "two", "three"] {
            let r = Reply {
                id: Uuid::now_v7(),
                text: text.into(),
                post_id: p.id,
                author_id: alice.id,
                author_name: String::new(),
                parent_id: None,
                created_at: at,
            };
            repo.create_reply(&r).await.unwrap();
            ids.push(r.id);
        }

        let loaded: Vec<Uuid> = repo.list_replies_for_post(p.id).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(loaded, ids);
        assert_eq!(repo.count_replies_for_post(p.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_one_vote_per_user_and_target() {
        let repo = repo().await;
        let alice = user(&repo, "alice").await;
        let bob = user(&repo, "bob").await;
        let p = post(&repo, &alice, "votes").await;

        let vote = Vote { id: Uuid::now_v7(), kind: VoteKind::Up, user_id: bob.id, target: VoteTarget::Post(p.id) };
        repo.insert_vote(&vote).await.unwrap();

        let again = Vote { id: Uuid::now_v7(), ..vote.clone() };
        assert!(matches!(repo.insert_vote(&again).await, Err(AppError::Conflict(_))));

        repo.update_vote_kind(vote.id, VoteKind::Down).await.unwrap();
        let found = repo.find_vote(bob.id, VoteTarget::Post(p.id)).await.unwrap().unwrap();
        assert_eq!(found.kind, VoteKind::Down);
        assert!(repo.find_vote(alice.id, VoteTarget::Post(p.id)).await.unwrap().is_none());

        repo.delete_vote(vote.id).await.unwrap();
        assert!(repo.list_votes(VoteTarget::Post(p.id)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_post_cascades() {
        let repo = repo().await;
        let alice = user(&repo, "alice").await;
        let bob = user(&repo, "bob").await;
        let p = post(&repo, &alice, "doomed").await;
        let root = reply(&repo, &p, &bob, None).await;
        let child = reply(&repo, &p, &alice, Some(root.id)).await;
        repo.insert_vote(&Vote { id: Uuid::now_v7(), kind: VoteKind::Up, user_id: bob.id, target: VoteTarget::Post(p.id) })
            .await
            .unwrap();
        repo.insert_vote(&Vote { id: Uuid::now_v7(), kind: VoteKind::Down, user_id: alice.id, target: VoteTarget::Reply(child.id) })
            .await
            .unwrap();

        assert!(repo.delete_post(p.id).await.unwrap());
        assert!(!repo.delete_post(p.id).await.unwrap());

        assert!(repo.get_reply(root.id).await.unwrap().is_none());
        assert!(repo.get_reply(child.id).await.unwrap().is_none());
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM votes")
            .fetch_one(repo.pool())
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_profile_queries() {
        let repo = repo().await;
        let alice = user(&repo, "alice").await;
        let bob = user(&repo, "bob").await;
        let carol = user(&repo, "carol").await;
        let p = post(&repo, &alice, "Alice writes").await;
        let r = reply(&repo, &p, &alice, None).await;

        for (voter, kind, target) in [
            (&bob, VoteKind::Up, VoteTarget::Post(p.id)),
            (&carol, VoteKind::Down, VoteTarget::Post(p.id)),
            (&bob, VoteKind::Up, VoteTarget::Reply(r.id)),
            (&carol, VoteKind::Up, VoteTarget::Reply(r.id)),
        ] {
            repo.insert_vote(&Vote { id: Uuid::now_v7(), kind, user_id: voter.id, target }).await.unwrap();
        }

        assert_eq!(repo.count_upvotes_received(alice.id).await.unwrap(), 3);
        assert_eq!(repo.count_upvotes_received(bob.id).await.unwrap(), 0);
        assert_eq!(repo.list_reply_votes_for_post(p.id).await.unwrap().len(), 2);

        let replies = repo.list_replies_by_author(alice.id).await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].1, "Alice writes");
        assert_eq!(replies[0].0.author_name, "alice");
        assert_eq!(repo.list_posts_by_author(bob.id).await.unwrap().len(), 0);
    }
}
