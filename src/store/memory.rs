//! In-memory [`ForumStore`] for tests and embedded use.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::models::{AccessScope, BusinessUnit, DocumentRef, ForumSnapshot, Post, Reply, Thread};

use super::{ForumStore, RecordDetail};

#[derive(Default)]
struct Inner {
    snapshot: ForumSnapshot,
    users: HashMap<i64, String>,
    members: HashMap<i64, HashSet<i64>>,
}

/// Forum data held in process memory.
#[derive(Default)]
pub struct InMemoryForumStore {
    inner: RwLock<Inner>,
}

impl InMemoryForumStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: ForumSnapshot) -> Self {
        Self {
            inner: RwLock::new(Inner {
                snapshot,
                ..Default::default()
            }),
        }
    }

    pub fn add_user(&self, id: i64, display_name: impl Into<String>) {
        self.inner.write().users.insert(id, display_name.into());
    }

    pub fn add_member(&self, user_id: i64, thread_id: i64) {
        self.inner
            .write()
            .members
            .entry(user_id)
            .or_default()
            .insert(thread_id);
    }

    pub fn add_business_unit(&self, unit: BusinessUnit) {
        self.inner.write().snapshot.business_units.push(unit);
    }

    pub fn add_thread(&self, thread: Thread) {
        self.inner.write().snapshot.threads.push(thread);
    }

    pub fn add_post(&self, post: Post) {
        self.inner.write().snapshot.posts.push(post);
    }

    pub fn add_reply(&self, reply: Reply) {
        self.inner.write().snapshot.replies.push(reply);
    }
}

impl Inner {
    fn thread(&self, id: Option<i64>) -> Option<&Thread> {
        id.and_then(|id| self.snapshot.threads.iter().find(|t| t.id == id))
    }

    fn unit_name(&self, id: Option<i64>) -> Option<String> {
        id.and_then(|id| self.snapshot.business_units.iter().find(|b| b.id == id))
            .map(|b| b.name.clone())
    }

    fn post_detail(&self, post: &Post, body: String, author_id: Option<i64>) -> RecordDetail {
        let thread = self.thread(post.thread_id);
        let unit = post
            .business_unit_id
            .or_else(|| thread.and_then(|t| t.business_unit_id));
        RecordDetail {
            body,
            author_name: author_id.and_then(|a| self.users.get(&a).cloned()),
            thread_name: thread.map(|t| t.name.clone()),
            business_unit_name: self.unit_name(unit),
        }
    }

    fn detail(&self, r: DocumentRef) -> Option<RecordDetail> {
        let posts = &self.snapshot.posts;
        match r {
            DocumentRef::Post(id) => {
                let post = posts.iter().find(|p| p.id == id)?;
                Some(self.post_detail(post, post.body.clone(), post.author_id))
            }
            DocumentRef::Reply(id) => {
                let reply = self.snapshot.replies.iter().find(|x| x.id == id)?;
                match posts.iter().find(|p| p.id == reply.post_id) {
                    Some(parent) => {
                        Some(self.post_detail(parent, reply.body.clone(), reply.author_id))
                    }
                    None => Some(RecordDetail {
                        body: reply.body.clone(),
                        author_name: reply.author_id.and_then(|a| self.users.get(&a).cloned()),
                        ..Default::default()
                    }),
                }
            }
        }
    }
}

#[async_trait]
impl ForumStore for InMemoryForumStore {
    async fn load_snapshot(&self) -> Result<ForumSnapshot> {
        Ok(self.inner.read().snapshot.clone())
    }

    async fn access_scope(&self, user_id: i64) -> Result<AccessScope> {
        let inner = self.inner.read();
        Ok(inner
            .members
            .get(&user_id)
            .map(|threads| AccessScope::new(threads.iter().copied()))
            .unwrap_or_default())
    }

    async fn record_details(
        &self,
        refs: &[DocumentRef],
    ) -> Result<HashMap<DocumentRef, RecordDetail>> {
        let inner = self.inner.read();
        Ok(refs
            .iter()
            .filter_map(|r| inner.detail(*r).map(|d| (*r, d)))
            .collect())
    }
}
