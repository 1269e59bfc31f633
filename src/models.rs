//! Core data models used throughout the search engine.
//!
//! Two families of types live here:
//!
//! - **Source records** ([`Post`], [`Reply`], [`Thread`], [`BusinessUnit`])
//!   as read from the forum's storage layer. The engine never mutates them.
//! - **Search documents** ([`SearchDocument`]), the uniform projection of
//!   posts and replies that the index and the ranking engine operate on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A top-level forum post.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub author_id: Option<i64>,
    pub thread_id: Option<i64>,
    pub business_unit_id: Option<i64>,
    pub upvotes: u32,
    pub created_at: DateTime<Utc>,
}

/// A reply to a [`Post`].
///
/// Replies carry no thread or business unit of their own; both are
/// inherited from the parent post when the corpus is built.
#[derive(Debug, Clone)]
pub struct Reply {
    pub id: i64,
    pub post_id: i64,
    pub body: String,
    pub author_id: Option<i64>,
    pub upvotes: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Thread {
    pub id: i64,
    pub name: String,
    pub business_unit_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct BusinessUnit {
    pub id: i64,
    pub name: String,
}

/// Read-only view of the forum content needed to build one index generation.
#[derive(Debug, Clone, Default)]
pub struct ForumSnapshot {
    pub posts: Vec<Post>,
    pub replies: Vec<Reply>,
    pub threads: Vec<Thread>,
    pub business_units: Vec<BusinessUnit>,
}

/// Which kind of source record a document was projected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Post,
    Reply,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Post => "post",
            DocumentKind::Reply => "reply",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(DocumentKind::Post),
            "reply" => Ok(DocumentKind::Reply),
            other => Err(format!("unknown document type: '{}'. Use post or reply.", other)),
        }
    }
}

/// Source-specific part of a [`SearchDocument`].
///
/// Only posts have a title, so the title lives on the `Post` variant and
/// there is no way to read one off a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOrigin {
    Post { post_id: i64, title: String },
    Reply { reply_id: i64, post_id: i64 },
}

/// Identifies the source record behind a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentRef {
    Post(i64),
    Reply(i64),
}

/// The unit of indexing and ranking.
#[derive(Debug, Clone)]
pub struct SearchDocument {
    /// Stable id, `post_{id}` or `reply_{id}`.
    pub id: String,
    pub origin: DocumentOrigin,
    pub business_unit_id: Option<i64>,
    pub thread_id: Option<i64>,
    /// Title and body for posts, body alone for replies. The only field the
    /// tokenizer sees.
    pub text: String,
    pub popularity_score: u32,
    pub created_at: DateTime<Utc>,
}

impl SearchDocument {
    pub fn kind(&self) -> DocumentKind {
        match self.origin {
            DocumentOrigin::Post { .. } => DocumentKind::Post,
            DocumentOrigin::Reply { .. } => DocumentKind::Reply,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match &self.origin {
            DocumentOrigin::Post { title, .. } => Some(title),
            DocumentOrigin::Reply { .. } => None,
        }
    }

    /// The post this document belongs to: itself for posts, the parent for replies.
    pub fn post_id(&self) -> i64 {
        match self.origin {
            DocumentOrigin::Post { post_id, .. } => post_id,
            DocumentOrigin::Reply { post_id, .. } => post_id,
        }
    }

    pub fn source_ref(&self) -> DocumentRef {
        match self.origin {
            DocumentOrigin::Post { post_id, .. } => DocumentRef::Post(post_id),
            DocumentOrigin::Reply { reply_id, .. } => DocumentRef::Reply(reply_id),
        }
    }

    /// Relative link used in citations.
    pub fn url(&self) -> String {
        match self.origin {
            DocumentOrigin::Post { post_id, .. } => format!("/posts/{}", post_id),
            DocumentOrigin::Reply { reply_id, post_id } => {
                format!("/posts/{}#reply-{}", post_id, reply_id)
            }
        }
    }
}

pub fn post_document_id(post_id: i64) -> String {
    format!("post_{}", post_id)
}

pub fn reply_document_id(reply_id: i64) -> String {
    format!("reply_{}", reply_id)
}

/// The set of thread ids a caller may read.
///
/// Supplied by the authorization layer and treated as authoritative. The
/// engine only ever narrows results to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessScope {
    threads: HashSet<i64>,
}

impl AccessScope {
    pub fn new(threads: impl IntoIterator<Item = i64>) -> Self {
        Self {
            threads: threads.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// `false` for documents without a thread.
    pub fn permits(&self, thread_id: Option<i64>) -> bool {
        thread_id.is_some_and(|t| self.threads.contains(&t))
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }
}
