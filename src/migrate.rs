use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the forum schema in the configured database. Idempotent.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS business_units (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS threads (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            business_unit_id INTEGER REFERENCES business_units(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            display_name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // created_at columns hold unix seconds.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            author_id INTEGER REFERENCES users(id),
            thread_id INTEGER REFERENCES threads(id),
            business_unit_id INTEGER REFERENCES business_units(id),
            upvotes INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // No foreign key on post_id: replies outlive deleted posts.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS replies (
            id INTEGER PRIMARY KEY,
            post_id INTEGER NOT NULL,
            body TEXT NOT NULL,
            author_id INTEGER REFERENCES users(id),
            upvotes INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS thread_members (
            user_id INTEGER NOT NULL REFERENCES users(id),
            thread_id INTEGER NOT NULL REFERENCES threads(id),
            PRIMARY KEY (user_id, thread_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_replies_post_id ON replies(post_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_thread_id ON posts(thread_id)")
        .execute(pool)
        .await?;

    Ok(())
}
