//! SQLite-backed [`ForumStore`] implementation.
//!
//! Reads the tables created by [`migrate`](crate::migrate). Timestamps are
//! stored as unix seconds; negative upvote counts are read as zero.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::models::{AccessScope, BusinessUnit, DocumentRef, ForumSnapshot, Post, Reply, Thread};
use crate::store::{ForumStore, RecordDetail};

/// SQLite implementation of [`ForumStore`].
pub struct SqliteForumStore {
    pool: SqlitePool,
}

impl SqliteForumStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn details_for(
        &self,
        base: &str,
        ids: &[i64],
    ) -> Result<Vec<(i64, RecordDetail)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(base);
        qb.push(" IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<(i64, RecordDetail)> {
                Ok((
                    row.try_get("id")?,
                    RecordDetail {
                        body: row.try_get("body")?,
                        author_name: row.try_get("author_name")?,
                        thread_name: row.try_get("thread_name")?,
                        business_unit_name: row.try_get("business_unit_name")?,
                    },
                ))
            })
            .collect()
    }
}

fn timestamp(row: &SqliteRow) -> Result<DateTime<Utc>> {
    let ts: i64 = row.try_get("created_at")?;
    DateTime::from_timestamp(ts, 0).with_context(|| format!("timestamp out of range: {}", ts))
}

fn upvotes(row: &SqliteRow) -> Result<u32> {
    let raw: i64 = row.try_get("upvotes")?;
    Ok(u32::try_from(raw.max(0)).unwrap_or(u32::MAX))
}

const POST_DETAILS: &str = r#"
    SELECT p.id AS id, p.body AS body, u.display_name AS author_name,
           t.name AS thread_name, b.name AS business_unit_name
    FROM posts p
    LEFT JOIN users u ON u.id = p.author_id
    LEFT JOIN threads t ON t.id = p.thread_id
    LEFT JOIN business_units b ON b.id = COALESCE(p.business_unit_id, t.business_unit_id)
    WHERE p.id"#;

const REPLY_DETAILS: &str = r#"
    SELECT r.id AS id, r.body AS body, u.display_name AS author_name,
           t.name AS thread_name, b.name AS business_unit_name
    FROM replies r
    LEFT JOIN users u ON u.id = r.author_id
    LEFT JOIN posts p ON p.id = r.post_id
    LEFT JOIN threads t ON t.id = p.thread_id
    LEFT JOIN business_units b ON b.id = COALESCE(p.business_unit_id, t.business_unit_id)
    WHERE r.id"#;

#[async_trait]
impl ForumStore for SqliteForumStore {
    async fn load_snapshot(&self) -> Result<ForumSnapshot> {
        let business_units = sqlx::query("SELECT id, name FROM business_units ORDER BY id")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> Result<BusinessUnit> {
                Ok(BusinessUnit {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let threads = sqlx::query("SELECT id, name, business_unit_id FROM threads ORDER BY id")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| -> Result<Thread> {
                Ok(Thread {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    business_unit_id: row.try_get("business_unit_id")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let posts = sqlx::query(
            r#"
            SELECT id, title, body, author_id, thread_id, business_unit_id, upvotes, created_at
            FROM posts ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| -> Result<Post> {
            Ok(Post {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                body: row.try_get("body")?,
                author_id: row.try_get("author_id")?,
                thread_id: row.try_get("thread_id")?,
                business_unit_id: row.try_get("business_unit_id")?,
                upvotes: upvotes(row)?,
                created_at: timestamp(row)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

        let replies = sqlx::query(
            "SELECT id, post_id, body, author_id, upvotes, created_at FROM replies ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| -> Result<Reply> {
            Ok(Reply {
                id: row.try_get("id")?,
                post_id: row.try_get("post_id")?,
                body: row.try_get("body")?,
                author_id: row.try_get("author_id")?,
                upvotes: upvotes(row)?,
                created_at: timestamp(row)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

        Ok(ForumSnapshot {
            posts,
            replies,
            threads,
            business_units,
        })
    }

    async fn access_scope(&self, user_id: i64) -> Result<AccessScope> {
        let threads: Vec<i64> =
            sqlx::query_scalar("SELECT thread_id FROM thread_members WHERE user_id = ?")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(AccessScope::new(threads))
    }

    async fn record_details(
        &self,
        refs: &[DocumentRef],
    ) -> Result<HashMap<DocumentRef, RecordDetail>> {
        let mut post_ids = Vec::new();
        let mut reply_ids = Vec::new();
        for r in refs {
            match r {
                DocumentRef::Post(id) => post_ids.push(*id),
                DocumentRef::Reply(id) => reply_ids.push(*id),
            }
        }

        let mut details = HashMap::with_capacity(refs.len());
        for (id, detail) in self.details_for(POST_DETAILS, &post_ids).await? {
            details.insert(DocumentRef::Post(id), detail);
        }
        for (id, detail) in self.details_for(REPLY_DETAILS, &reply_ids).await? {
            details.insert(DocumentRef::Reply(id), detail);
        }
        Ok(details)
    }
}
