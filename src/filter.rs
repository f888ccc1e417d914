//! Derivation of the visible note list from the store and the search inputs.
//!
//! Nothing here mutates notes. The filter keeps only the inputs (search text
//! and an optional hashtag) and the derivation is a pure function of those
//! and the active-note ordering.
use std::ops::Range;

use log::{debug, trace};

use crate::{match_spans, normalize_hashtag, Note, NoteId};

/// Current search text and hashtag restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    search_text: String,
    /// Normalized; `None` means no hashtag restriction
    hashtag: Option<String>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    pub fn hashtag(&self) -> Option<&str> {
        self.hashtag.as_deref()
    }

    pub fn set_search_text(&mut self, text: impl Into<String>) {
        self.search_text = text.into();
        debug!("Search text set to '{}'", self.search_text);
    }

    pub fn clear_search(&mut self) {
        self.search_text.clear();
    }

    /// Restricts to one hashtag. Blank input clears the restriction.
    pub fn set_hashtag(&mut self, tag: &str) {
        self.hashtag = normalize_hashtag(tag);
        debug!("Hashtag filter set to {:?}", self.hashtag);
    }

    /// Tapping the active hashtag clears it; any other selects it.
    pub fn toggle_hashtag(&mut self, tag: &str) {
        let tag = normalize_hashtag(tag);
        if tag.is_some() && tag == self.hashtag {
            self.hashtag = None;
        } else {
            self.hashtag = tag;
        }
        debug!("Hashtag filter toggled to {:?}", self.hashtag);
    }

    pub fn clear_hashtag(&mut self) {
        self.hashtag = None;
    }

    /// True when the filter lets every active note through.
    pub fn is_identity(&self) -> bool {
        self.search_text.is_empty() && self.hashtag.is_none()
    }

    /// Applies this filter to notes already in list order.
    pub fn apply<'a>(&self, notes: impl IntoIterator<Item = &'a Note>) -> VisibleNotes<'a> {
        visible_notes(notes, &self.search_text, self.hashtag.as_deref())
    }

    /// Where the current search text occurs in a note, for highlighting.
    pub fn highlights(&self, note: &Note) -> NoteHighlights {
        NoteHighlights {
            header: match_spans(&note.header, &self.search_text),
            body: match_spans(&note.body, &self.search_text),
        }
    }
}

/// Byte ranges of search matches inside a note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteHighlights {
    pub header: Vec<Range<usize>>,
    pub body: Vec<Range<usize>>,
}

/// The visible list split into the two display sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleNotes<'a> {
    pub pinned: Vec<&'a Note>,
    pub unpinned: Vec<&'a Note>,
}

impl<'a> VisibleNotes<'a> {
    /// Pinned section followed by the unpinned one.
    pub fn iter(&self) -> impl Iterator<Item = &'a Note> + '_ {
        self.pinned.iter().chain(self.unpinned.iter()).copied()
    }

    pub fn ids(&self) -> Vec<NoteId> {
        self.iter().map(|note| note.id).collect()
    }

    pub fn len(&self) -> usize {
        self.pinned.len() + self.unpinned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Filters `notes` (already pinned-first, most recent first) by hashtag and
/// then by case-insensitive text, keeping the incoming order, and splits the
/// result into pinned and unpinned sections.
///
/// `hashtag` must be normalized (see [`normalize_hashtag`]).
pub fn visible_notes<'a>(
    notes: impl IntoIterator<Item = &'a Note>,
    search_text: &str,
    hashtag: Option<&str>,
) -> VisibleNotes<'a> {
    let mut visible = VisibleNotes::default();

    for note in notes {
        if let Some(tag) = hashtag {
            if !note.has_hashtag(tag) {
                continue;
            }
        }
        if !search_text.is_empty() && !note.matches_text(search_text) {
            continue;
        }
        trace!("Note {} is visible", note.id);
        if note.is_pinned {
            visible.pinned.push(note);
        } else {
            visible.unpinned.push(note);
        }
    }

    debug!(
        "{} pinned and {} other notes visible",
        visible.pinned.len(),
        visible.unpinned.len()
    );
    visible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoteStatus;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn notes() -> Vec<Note> {
        let base = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let make = |id: u64, header: &str, body: &str, pinned: bool, minutes: i64| {
            let mut note = Note::new(NoteId(id), base);
            note.header = header.to_string();
            note.set_body(body.to_string());
            note.is_pinned = pinned;
            note.status = NoteStatus::Active;
            note.updated_at = base + Duration::minutes(minutes);
            note
        };
        // Already in list order.
        vec![
            make(3, "Trip", "pack bags #travel", true, 1),
            make(2, "Todo", "call mom #work #home", false, 5),
            make(1, "Shopping", "milk #grocery #home", false, 2),
        ]
    }

    #[test]
    fn identity_filter_returns_input_order() {
        let notes = notes();
        let visible = visible_notes(&notes, "", None);
        assert_eq!(visible.ids(), vec![NoteId(3), NoteId(2), NoteId(1)]);
        assert_eq!(visible.pinned.len(), 1);
        assert_eq!(visible.unpinned.len(), 2);
    }

    #[test]
    fn hashtag_filter_keeps_order() {
        let notes = notes();
        let visible = visible_notes(&notes, "", Some("home"));
        assert_eq!(visible.ids(), vec![NoteId(2), NoteId(1)]);
    }

    #[test]
    fn unknown_hashtag_gives_empty_list() {
        let notes = notes();
        assert!(visible_notes(&notes, "", Some("nowhere")).is_empty());
    }

    #[test]
    fn search_is_case_insensitive_on_header_and_body() {
        let notes = notes();
        assert_eq!(visible_notes(&notes, "MILK", None).ids(), vec![NoteId(1)]);
        assert_eq!(visible_notes(&notes, "trip", None).ids(), vec![NoteId(3)]);
    }

    #[test]
    fn search_and_hashtag_compose() {
        let notes = notes();
        assert_eq!(
            visible_notes(&notes, "call", Some("home")).ids(),
            vec![NoteId(2)]
        );
        assert!(visible_notes(&notes, "milk", Some("work")).is_empty());
    }

    #[test]
    fn toggling_the_same_hashtag_clears_it() {
        let mut filter = SearchFilter::new();
        filter.toggle_hashtag("#Home");
        assert_eq!(filter.hashtag(), Some("home"));
        filter.toggle_hashtag("home");
        assert_eq!(filter.hashtag(), None);
        filter.toggle_hashtag("work");
        filter.toggle_hashtag("home");
        assert_eq!(filter.hashtag(), Some("home"));
    }

    #[test]
    fn identity_check_tracks_inputs() {
        let mut filter = SearchFilter::new();
        assert!(filter.is_identity());
        filter.set_search_text("x");
        assert!(!filter.is_identity());
        filter.clear_search();
        filter.set_hashtag("  ");
        assert!(filter.is_identity());
    }

    #[test]
    fn filter_applies_its_own_inputs() {
        let notes = notes();
        let mut filter = SearchFilter::new();
        filter.set_hashtag("#HOME");
        filter.set_search_text("mil");
        assert_eq!(filter.apply(&notes).ids(), vec![NoteId(1)]);
    }

    #[test]
    fn highlights_mark_search_matches() {
        let notes = notes();
        let mut filter = SearchFilter::new();
        filter.set_search_text("o");
        let marks = filter.highlights(&notes[1]);
        assert_eq!(marks.header, vec![1..2, 3..4]);
        assert_eq!(marks.body, vec![6..7, 11..12, 17..18]);
    }
}
