//! Core data structure for the notepad engine.
//!
//! A note is a short header plus body text, with the hashtags found in the
//! body, a pin flag and exactly one status (active, archived or in the basket).
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{contains_ignore_case, extract_hashtags, extract_urls, NoteId, NoteStatus};

/// Represents a single note in our system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier for the note
    pub id: NoteId,
    /// Note header, may be empty
    pub header: String,
    /// Note body
    pub body: String,
    /// Lowercased hashtags found in the body
    #[serde(default)]
    pub hashtags: BTreeSet<String>,
    /// Pinned notes are listed above all others
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub status: NoteStatus,
    /// When the note was created
    pub created_at: DateTime<Utc>,
    /// Last modification of header or body
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Creates an empty, active, unpinned note
    pub fn new(id: NoteId, now: DateTime<Utc>) -> Self {
        Note {
            id,
            header: String::new(),
            body: String::new(),
            hashtags: BTreeSet::new(),
            is_pinned: false,
            status: NoteStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == NoteStatus::Active
    }

    pub fn is_archived(&self) -> bool {
        self.status == NoteStatus::Archived
    }

    /// True while the note sits in the basket.
    pub fn is_deleted(&self) -> bool {
        self.status == NoteStatus::Basket
    }

    /// Replaces the body and re-derives the hashtag set from it.
    pub(crate) fn set_body(&mut self, body: String) {
        self.hashtags = extract_hashtags(&body);
        self.body = body;
    }

    /// Whether header or body contains `query`, ignoring case.
    pub fn matches_text(&self, query: &str) -> bool {
        contains_ignore_case(&self.header, query) || contains_ignore_case(&self.body, query)
    }

    /// `tag` must already be normalized.
    pub fn has_hashtag(&self, tag: &str) -> bool {
        self.hashtags.contains(tag)
    }

    /// Links in the body, for the link-preview collaborator.
    pub fn links(&self) -> Vec<String> {
        extract_urls(&self.body)
    }
}
