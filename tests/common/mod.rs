#![allow(dead_code)]

use std::path::Path;

use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use forum_search::{db, migrate};

/// Open a database at `path`, create the schema and insert the fixture rows.
pub async fn seeded_pool(path: &Path) -> SqlitePool {
    let pool = db::connect_path(path).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    seed(&pool).await;
    pool
}

/// Fixture forum:
///
/// - thread 10 "Wildlife" (Parks): posts 1-3, reply 25 under post 3
/// - thread 20 "Budget" (Finance): post 4
/// - reply 26 whose parent post does not exist
/// - user 7 reads thread 10; user 8 reads 10 and 20; user 99 reads nothing
pub async fn seed(pool: &SqlitePool) {
    let now = Utc::now();
    let days = |d: i64| (now - Duration::days(d)).timestamp();

    for (id, name) in [(1, "Parks"), (2, "Finance")] {
        sqlx::query("INSERT INTO business_units (id, name) VALUES (?, ?)")
            .bind(id)
            .bind(name)
            .execute(pool)
            .await
            .unwrap();
    }
    for (id, name, unit) in [(10, "Wildlife", 1), (20, "Budget", 2)] {
        sqlx::query("INSERT INTO threads (id, name, business_unit_id) VALUES (?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(unit)
            .execute(pool)
            .await
            .unwrap();
    }
    for (id, name) in [(7, "Dana"), (8, "Lee"), (99, "Guest")] {
        sqlx::query("INSERT INTO users (id, display_name) VALUES (?, ?)")
            .bind(id)
            .bind(name)
            .execute(pool)
            .await
            .unwrap();
    }

    let posts: [(i64, &str, &str, i64, i64, Option<i64>, i64, i64); 4] = [
        (
            1,
            "NestJS performance tips",
            "Use response caching and avoid blocking the event loop.",
            7,
            10,
            None,
            3,
            days(10),
        ),
        (2, "React state management", "Redux versus context.", 8, 10, Some(1), 3, days(10)),
        (
            3,
            "Winter range maps",
            "Where is the winter range for elk this year?",
            7,
            10,
            Some(1),
            5,
            days(0),
        ),
        (
            4,
            "Budget caching policy",
            "Quarterly budget for the CDN cache.",
            8,
            20,
            Some(2),
            1,
            days(1),
        ),
    ];
    for (id, title, body, author, thread, unit, upvotes, created) in posts {
        sqlx::query(
            "INSERT INTO posts (id, title, body, author_id, thread_id, business_unit_id, upvotes, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(title)
        .bind(body)
        .bind(author)
        .bind(thread)
        .bind(unit)
        .bind(upvotes)
        .bind(created)
        .execute(pool)
        .await
        .unwrap();
    }

    let replies: [(i64, i64, &str, Option<i64>, i64, i64); 2] = [
        (25, 3, "The winter range moved north after the fires.", Some(8), 25, days(300)),
        (26, 999, "Orphan reply about caching.", None, 0, days(2)),
    ];
    for (id, post, body, author, upvotes, created) in replies {
        sqlx::query(
            "INSERT INTO replies (id, post_id, body, author_id, upvotes, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(post)
        .bind(body)
        .bind(author)
        .bind(upvotes)
        .bind(created)
        .execute(pool)
        .await
        .unwrap();
    }

    for (user, thread) in [(7, 10), (8, 10), (8, 20)] {
        sqlx::query("INSERT INTO thread_members (user_id, thread_id) VALUES (?, ?)")
            .bind(user)
            .bind(thread)
            .execute(pool)
            .await
            .unwrap();
    }
}
