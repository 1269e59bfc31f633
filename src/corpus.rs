//! Corpus construction.
//!
//! Projects a [`ForumSnapshot`] into the flat array of [`SearchDocument`]s
//! that the inverted index is built over, together with the small
//! thread/business-unit name tables used to decorate results.
//!
//! The corpus is rebuilt wholesale from a fresh snapshot; there is no
//! incremental patching.

use std::collections::HashMap;

use crate::models::{
    post_document_id, reply_document_id, DocumentOrigin, ForumSnapshot, Post, SearchDocument,
};

/// Display names for threads and business units.
#[derive(Debug, Clone, Default)]
pub struct NameLookup {
    threads: HashMap<i64, String>,
    business_units: HashMap<i64, String>,
}

impl NameLookup {
    pub fn thread_name(&self, id: Option<i64>) -> Option<&str> {
        id.and_then(|id| self.threads.get(&id)).map(String::as_str)
    }

    pub fn business_unit_name(&self, id: Option<i64>) -> Option<&str> {
        id.and_then(|id| self.business_units.get(&id))
            .map(String::as_str)
    }
}

/// The documents of one index generation, addressed by position.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    documents: Vec<SearchDocument>,
    names: NameLookup,
}

impl Corpus {
    pub fn documents(&self) -> &[SearchDocument] {
        &self.documents
    }

    pub fn get(&self, position: usize) -> Option<&SearchDocument> {
        self.documents.get(position)
    }

    pub fn names(&self) -> &NameLookup {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Build the corpus from a snapshot: every post, then every reply.
///
/// A post without its own business unit takes its thread's. A reply inherits
/// thread and business unit from its parent post; if the parent is missing
/// from the snapshot the reply is still indexed, with both left empty.
pub fn build_corpus(snapshot: &ForumSnapshot) -> Corpus {
    let thread_units: HashMap<i64, Option<i64>> = snapshot
        .threads
        .iter()
        .map(|t| (t.id, t.business_unit_id))
        .collect();

    let names = NameLookup {
        threads: snapshot
            .threads
            .iter()
            .map(|t| (t.id, t.name.clone()))
            .collect(),
        business_units: snapshot
            .business_units
            .iter()
            .map(|b| (b.id, b.name.clone()))
            .collect(),
    };

    let mut documents = Vec::with_capacity(snapshot.posts.len() + snapshot.replies.len());

    for post in &snapshot.posts {
        let business_unit_id = post.business_unit_id.or_else(|| {
            post.thread_id
                .and_then(|t| thread_units.get(&t).copied().flatten())
        });
        documents.push(SearchDocument {
            id: post_document_id(post.id),
            origin: DocumentOrigin::Post {
                post_id: post.id,
                title: post.title.clone(),
            },
            business_unit_id,
            thread_id: post.thread_id,
            text: format!("{} {}", post.title, post.body),
            popularity_score: post.upvotes,
            created_at: post.created_at,
        });
    }

    // Indexed by post id for parent resolution; business units were already
    // resolved above, so take them from the emitted documents.
    let parents: HashMap<i64, (&Post, Option<i64>)> = snapshot
        .posts
        .iter()
        .zip(documents.iter())
        .map(|(p, d)| (p.id, (p, d.business_unit_id)))
        .collect();

    for reply in &snapshot.replies {
        let (thread_id, business_unit_id) = match parents.get(&reply.post_id) {
            Some((post, unit)) => (post.thread_id, *unit),
            None => {
                tracing::debug!(
                    reply_id = reply.id,
                    post_id = reply.post_id,
                    "reply parent not found; indexing without thread"
                );
                (None, None)
            }
        };
        documents.push(SearchDocument {
            id: reply_document_id(reply.id),
            origin: DocumentOrigin::Reply {
                reply_id: reply.id,
                post_id: reply.post_id,
            },
            business_unit_id,
            thread_id,
            text: reply.body.clone(),
            popularity_score: reply.upvotes,
            created_at: reply.created_at,
        });
    }

    Corpus { documents, names }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BusinessUnit, DocumentKind, Reply, Thread};
    use chrono::{TimeZone, Utc};

    fn snapshot() -> ForumSnapshot {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ForumSnapshot {
            posts: vec![
                Post {
                    id: 1,
                    title: "Winter range".to_string(),
                    body: "Where do the elk go?".to_string(),
                    author_id: Some(7),
                    thread_id: Some(10),
                    business_unit_id: Some(100),
                    upvotes: 5,
                    created_at: ts,
                },
                Post {
                    id: 2,
                    title: "Orphan unit".to_string(),
                    body: "No unit on the post itself".to_string(),
                    author_id: None,
                    thread_id: Some(11),
                    business_unit_id: None,
                    upvotes: 0,
                    created_at: ts,
                },
            ],
            replies: vec![
                Reply {
                    id: 9,
                    post_id: 1,
                    body: "Down in the valley".to_string(),
                    author_id: Some(8),
                    upvotes: 25,
                    created_at: ts,
                },
                Reply {
                    id: 10,
                    post_id: 999,
                    body: "Parent was deleted".to_string(),
                    author_id: None,
                    upvotes: 1,
                    created_at: ts,
                },
            ],
            threads: vec![
                Thread {
                    id: 10,
                    name: "Wildlife".to_string(),
                    business_unit_id: Some(100),
                },
                Thread {
                    id: 11,
                    name: "Misc".to_string(),
                    business_unit_id: Some(101),
                },
            ],
            business_units: vec![BusinessUnit {
                id: 100,
                name: "Parks".to_string(),
            }],
        }
    }

    #[test]
    fn test_posts_then_replies() {
        let corpus = build_corpus(&snapshot());
        let ids: Vec<&str> = corpus.documents().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["post_1", "post_2", "reply_9", "reply_10"]);
    }

    #[test]
    fn test_post_text_is_title_and_body() {
        let corpus = build_corpus(&snapshot());
        let post = corpus.get(0).unwrap();
        assert_eq!(post.kind(), DocumentKind::Post);
        assert_eq!(post.text, "Winter range Where do the elk go?");
        assert_eq!(post.title(), Some("Winter range"));
    }

    #[test]
    fn test_post_falls_back_to_thread_business_unit() {
        let corpus = build_corpus(&snapshot());
        assert_eq!(corpus.get(1).unwrap().business_unit_id, Some(101));
    }

    #[test]
    fn test_reply_inherits_from_parent_but_keeps_own_popularity() {
        let corpus = build_corpus(&snapshot());
        let reply = corpus.get(2).unwrap();
        assert_eq!(reply.thread_id, Some(10));
        assert_eq!(reply.business_unit_id, Some(100));
        assert_eq!(reply.popularity_score, 25);
        assert_eq!(reply.text, "Down in the valley");
        assert_eq!(reply.title(), None);
    }

    #[test]
    fn test_orphan_reply_is_indexed_without_thread() {
        let corpus = build_corpus(&snapshot());
        let orphan = corpus.get(3).unwrap();
        assert_eq!(orphan.id, "reply_10");
        assert_eq!(orphan.thread_id, None);
        assert_eq!(orphan.business_unit_id, None);
    }

    #[test]
    fn test_name_lookup() {
        let corpus = build_corpus(&snapshot());
        let names = corpus.names();
        assert_eq!(names.thread_name(Some(10)), Some("Wildlife"));
        assert_eq!(names.business_unit_name(Some(100)), Some("Parks"));
        assert_eq!(names.business_unit_name(Some(101)), None);
        assert_eq!(names.thread_name(None), None);
    }
}
