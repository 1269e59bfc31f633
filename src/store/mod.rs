//! Storage collaborator for the search engine.
//!
//! The engine never owns forum data. It reads a full [`ForumSnapshot`] to
//! build each index generation, asks for a caller's [`AccessScope`] before
//! augmentation, and fetches [`RecordDetail`] for shortlisted documents only.
//!
//! Implementations must be `Send + Sync` to be shared across request tasks.

pub mod memory;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{AccessScope, DocumentRef, ForumSnapshot};

/// Full record data used to enrich a cited source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordDetail {
    pub body: String,
    pub author_name: Option<String>,
    pub thread_name: Option<String>,
    pub business_unit_name: Option<String>,
}

/// Abstract forum storage.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`load_snapshot`](ForumStore::load_snapshot) | Every post, reply, thread and business unit |
/// | [`access_scope`](ForumStore::access_scope) | Threads a user may read |
/// | [`record_details`](ForumStore::record_details) | Detail rows for exactly the requested records |
#[async_trait]
pub trait ForumStore: Send + Sync {
    async fn load_snapshot(&self) -> Result<ForumSnapshot>;

    /// Thread ids `user_id` is a member of. Unknown users get an empty scope.
    async fn access_scope(&self, user_id: i64) -> Result<AccessScope>;

    /// Details for `refs`. Records that no longer exist are absent from the map.
    async fn record_details(
        &self,
        refs: &[DocumentRef],
    ) -> Result<HashMap<DocumentRef, RecordDetail>>;
}
