//! Link previews for URLs found in note bodies.
//!
//! Fetching is left to the host through [`LinkPreviewFetcher`]; results are
//! cached by URL and never feed back into the note store.
use std::{collections::HashMap, future::Future};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{Note, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPreview {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

/// Describes a URL, typically by fetching its Open Graph tags.
pub trait LinkPreviewFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<LinkPreview>> + Send;
}

/// Previews already fetched, keyed by URL.
#[derive(Debug, Default)]
pub struct LinkPreviewCache {
    entries: HashMap<String, LinkPreview>,
}

impl LinkPreviewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<&LinkPreview> {
        self.entries.get(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Previews for every link in the note body, in order of appearance.
    ///
    /// Missing entries are fetched one after another; a failed fetch is
    /// logged and that link is left out, to be tried again next time.
    pub async fn previews_for<F: LinkPreviewFetcher>(
        &mut self,
        fetcher: &F,
        note: &Note,
    ) -> Vec<LinkPreview> {
        let mut previews = Vec::new();
        for url in note.links() {
            if let Some(cached) = self.entries.get(&url) {
                debug!("Link preview cache hit for {}", url);
                previews.push(cached.clone());
                continue;
            }

            match fetcher.fetch(&url).await {
                Ok(preview) => {
                    self.entries.insert(url, preview.clone());
                    previews.push(preview);
                }
                Err(e) => warn!("No preview for {} in note {}: {}", url, note.id, e),
            }
        }
        previews
    }
}
