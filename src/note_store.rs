use std::{
    cmp::Ordering,
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use log::{debug, error, info, trace, warn};

use crate::{Clock, Note, NoteError, NoteId, NoteStatus, Reminder, Result};

/// What a mutation actually touched, so callers can persist and prune.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreChanges {
    /// Notes whose record changed and must be written again
    pub updated: Vec<NoteId>,
    /// Notes that no longer exist at all
    pub purged: Vec<NoteId>,
    /// Reminders removed as a side effect
    pub reminders_removed: Vec<NoteId>,
}

impl StoreChanges {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.purged.is_empty() && self.reminders_removed.is_empty()
    }

    /// Ids that left the active list because of this change.
    pub(crate) fn left_active<'a>(&'a self, store: &'a NoteStore) -> impl Iterator<Item = NoteId> + 'a {
        self.updated
            .iter()
            .copied()
            .filter(move |id| !store.is_active(*id))
            .chain(self.purged.iter().copied())
    }
}

/// Single source of truth for notes and their reminders.
pub struct NoteStore {
    /// All notes regardless of status, indexed by ID
    notes: HashMap<NoteId, Note>,

    /// At most one reminder per note, indexed by the owning note
    reminders: HashMap<NoteId, Reminder>,

    /// Next ID to hand out; always past every ID ever seen
    next_id: u64,

    clock: Arc<dyn Clock>,
}

/// List order: pinned first, then most recently updated, then newest ID.
fn list_order(a: &Note, b: &Note) -> Ordering {
    b.is_pinned
        .cmp(&a.is_pinned)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| b.id.cmp(&a.id))
}

fn dedup(ids: impl IntoIterator<Item = NoteId>) -> BTreeSet<NoteId> {
    ids.into_iter().collect()
}

impl NoteStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            notes: HashMap::new(),
            reminders: HashMap::new(),
            next_id: 1,
            clock,
        }
    }

    /// Seeds the store with persisted records.
    ///
    /// `next_id` is the high-water mark saved by an earlier run; the next ID
    /// handed out is past both it and every loaded note, so IDs of purged
    /// notes are not reused.
    ///
    /// Reminders whose note is missing or in the basket are dropped and
    /// reported back so the caller can remove them from storage too.
    pub fn load(
        &mut self,
        notes: impl IntoIterator<Item = Note>,
        reminders: impl IntoIterator<Item = Reminder>,
        next_id: Option<NoteId>,
    ) -> Vec<NoteId> {
        self.notes.clear();
        self.reminders.clear();
        if let Some(mark) = next_id {
            self.next_id = self.next_id.max(mark.0);
        }

        for note in notes {
            self.next_id = self.next_id.max(note.id.0 + 1);
            self.notes.insert(note.id, note);
        }

        let mut orphaned = Vec::new();
        for reminder in reminders {
            match self.notes.get(&reminder.note_id) {
                Some(note) if !note.is_deleted() => {
                    self.reminders.insert(reminder.note_id, reminder);
                }
                _ => {
                    warn!(
                        "Dropping reminder for missing or deleted note {}",
                        reminder.note_id
                    );
                    orphaned.push(reminder.note_id);
                }
            }
        }

        info!(
            "Loaded {} notes and {} reminders into store",
            self.notes.len(),
            self.reminders.len()
        );
        orphaned
    }

    /// The ID the next created note will get.
    pub fn next_id(&self) -> NoteId {
        NoteId(self.next_id)
    }

    /// Creates an empty active note and returns its ID
    pub fn create_note(&mut self) -> NoteId {
        let id = NoteId(self.next_id);
        self.next_id += 1;
        self.notes.insert(id, Note::new(id, self.clock.now()));
        info!("Created note {}", id);
        id
    }

    /// Updates header and/or body of a note that is not in the basket.
    ///
    /// Hashtags are re-derived from the body and `updated_at` is stamped.
    pub fn update_note(
        &mut self,
        id: NoteId,
        header: Option<String>,
        body: Option<String>,
    ) -> Result<()> {
        let now = self.clock.now();
        let note = match self.notes.get_mut(&id) {
            Some(note) if !note.is_deleted() => note,
            _ => {
                error!("Cannot update note {}: Note not found", id);
                return Err(NoteError::NoteNotFound { id });
            }
        };

        if let Some(header) = header {
            note.header = header;
        }
        let body = body.unwrap_or_else(|| std::mem::take(&mut note.body));
        note.set_body(body);
        note.updated_at = now;

        debug!("Note {} now carries hashtags {:?}", id, note.hashtags);
        info!("Note {} updated", id);
        Ok(())
    }

    /// Sets the pin flag. Unknown IDs are ignored; repeating is harmless.
    pub fn set_pinned(&mut self, ids: impl IntoIterator<Item = NoteId>, pinned: bool) -> StoreChanges {
        let mut changes = StoreChanges::default();
        for id in dedup(ids) {
            match self.notes.get_mut(&id) {
                Some(note) if note.is_pinned != pinned => {
                    note.is_pinned = pinned;
                    changes.updated.push(id);
                }
                Some(_) => trace!("Note {} already has pinned={}", id, pinned),
                None => debug!("Ignoring pin of unknown note {}", id),
            }
        }
        info!("Set pinned={} on {} notes", pinned, changes.updated.len());
        changes
    }

    /// Moves notes to the basket and drops their reminders.
    pub fn soft_delete(&mut self, ids: impl IntoIterator<Item = NoteId>) -> StoreChanges {
        let mut changes = StoreChanges::default();
        for id in dedup(ids) {
            match self.notes.get_mut(&id) {
                Some(note) if !note.is_deleted() => {
                    note.status = NoteStatus::Basket;
                    changes.updated.push(id);
                    if self.reminders.remove(&id).is_some() {
                        debug!("Removed reminder of deleted note {}", id);
                        changes.reminders_removed.push(id);
                    }
                }
                Some(_) => trace!("Note {} already in basket", id),
                None => debug!("Ignoring delete of unknown note {}", id),
            }
        }
        info!("Moved {} notes to the basket", changes.updated.len());
        changes
    }

    /// Moves active notes to the archive. Reminders are kept.
    pub fn archive(&mut self, ids: impl IntoIterator<Item = NoteId>) -> StoreChanges {
        self.move_status(ids, NoteStatus::Archived, |note| note.is_active())
    }

    /// Brings archived or deleted notes back to the active list.
    pub fn restore(&mut self, ids: impl IntoIterator<Item = NoteId>) -> StoreChanges {
        self.move_status(ids, NoteStatus::Active, |note| !note.is_active())
    }

    fn move_status(
        &mut self,
        ids: impl IntoIterator<Item = NoteId>,
        target: NoteStatus,
        allowed: impl Fn(&Note) -> bool,
    ) -> StoreChanges {
        let mut changes = StoreChanges::default();
        for id in dedup(ids) {
            match self.notes.get_mut(&id) {
                Some(note) if allowed(note) => {
                    note.status = target;
                    changes.updated.push(id);
                }
                Some(note) => trace!("Note {} stays {:?}", id, note.status),
                None => debug!("Ignoring move of unknown note {}", id),
            }
        }
        info!("Moved {} notes to {:?}", changes.updated.len(), target);
        changes
    }

    /// Permanently removes notes that are in the basket.
    pub fn purge(&mut self, ids: impl IntoIterator<Item = NoteId>) -> StoreChanges {
        let mut changes = StoreChanges::default();
        for id in dedup(ids) {
            match self.notes.get(&id) {
                Some(note) if note.is_deleted() => {
                    self.notes.remove(&id);
                    changes.purged.push(id);
                    if self.reminders.remove(&id).is_some() {
                        changes.reminders_removed.push(id);
                    }
                }
                Some(_) => warn!("Refusing to purge note {} outside the basket", id),
                None => debug!("Ignoring purge of unknown note {}", id),
            }
        }
        info!("Purged {} notes", changes.purged.len());
        changes
    }

    /// Purges everything currently in the basket.
    pub fn empty_basket(&mut self) -> StoreChanges {
        let ids: Vec<NoteId> = self.list_basket().map(|note| note.id).collect();
        self.purge(ids)
    }

    fn list_with(&self, status: NoteStatus) -> std::vec::IntoIter<&Note> {
        let mut notes: Vec<&Note> = self.notes.values().filter(|n| n.status == status).collect();
        notes.sort_by(|a, b| list_order(a, b));
        notes.into_iter()
    }

    /// Active notes, pinned first and most recently updated first within
    /// each group. Call again to restart.
    pub fn list_active(&self) -> impl Iterator<Item = &Note> + Clone {
        self.list_with(NoteStatus::Active)
    }

    pub fn list_archived(&self) -> impl Iterator<Item = &Note> + Clone {
        self.list_with(NoteStatus::Archived)
    }

    pub fn list_basket(&self) -> impl Iterator<Item = &Note> + Clone {
        self.list_with(NoteStatus::Basket)
    }

    /// Sorted union of hashtags over active notes.
    pub fn hashtags(&self) -> BTreeSet<String> {
        self.notes
            .values()
            .filter(|note| note.is_active())
            .flat_map(|note| note.hashtags.iter().cloned())
            .collect()
    }

    pub fn get(&self, id: NoteId) -> Option<&Note> {
        self.notes.get(&id)
    }

    pub fn is_active(&self, id: NoteId) -> bool {
        self.notes.get(&id).is_some_and(Note::is_active)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn reminder(&self, id: NoteId) -> Option<&Reminder> {
        self.reminders.get(&id)
    }

    pub fn reminders(&self) -> impl Iterator<Item = &Reminder> {
        self.reminders.values()
    }

    /// Inserts or replaces the reminder of a note that is not in the basket.
    pub fn upsert_reminder(&mut self, reminder: Reminder) -> Result<()> {
        let id = reminder.note_id;
        match self.notes.get(&id) {
            Some(note) if !note.is_deleted() => {
                let replaced = self.reminders.insert(id, reminder).is_some();
                info!(
                    "{} reminder for note {}",
                    if replaced { "Updated" } else { "Created" },
                    id
                );
                Ok(())
            }
            _ => {
                error!("Cannot attach reminder: note {} not found", id);
                Err(NoteError::NoteNotFound { id })
            }
        }
    }

    /// Removes the reminder of a note, if any.
    pub fn remove_reminder(&mut self, id: NoteId) -> Option<Reminder> {
        let removed = self.reminders.remove(&id);
        if removed.is_some() {
            info!("Removed reminder for note {}", id);
        }
        removed
    }

    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}
