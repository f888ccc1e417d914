//! The observable facade a UI (or a headless test) drives.
//!
//! `NotesEngine` owns the note store, the search filter and the selection
//! controller, and keeps the cross-component invariants in one place: after
//! any store mutation, selected IDs that left the active list are dropped
//! before anyone can observe the new state, every change is submitted to the
//! persistence sink, and subscribers hear about it.
use std::{collections::BTreeSet, sync::Arc};

use chrono::{NaiveDate, NaiveTime};
use log::{debug, info, warn};

use crate::{
    Clock, Config, InlineWriter, Note, NoteHighlights, NoteId, NoteStore, PendingReminder,
    PersistOp, PersistenceFailure, PersistenceProvider, PersistenceSink, Reminder, ReminderDraft,
    RepeatPolicy, Result, SearchFilter, Snapshot, SelectionController, SelectionMode, StoreChanges,
    TapOutcome, VisibleNotes,
};

/// Handle returned by [`NotesEngine::subscribe`].
pub type SubscriptionId = u64;

/// What changed, as told to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Notes were created, edited or changed status
    NotesChanged(Vec<NoteId>),
    /// Notes were permanently removed
    NotesPurged(Vec<NoteId>),
    /// Search text or hashtag filter changed
    FilterChanged,
    SelectionChanged {
        mode: SelectionMode,
        selected: Vec<NoteId>,
    },
    /// A reminder was created, updated or removed
    ReminderChanged(NoteId),
    /// The external store refused a write; in-memory state is unchanged
    PersistenceFailed(PersistenceFailure),
}

type Subscriber = Box<dyn FnMut(&EngineEvent) + Send>;

/// Notes, search filter and selection behind one set of actions.
pub struct NotesEngine {
    store: NoteStore,
    filter: SearchFilter,
    selection: SelectionController,
    config: Config,
    sink: Option<Box<dyn PersistenceSink>>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: SubscriptionId,
    failures: Vec<PersistenceFailure>,
}

impl NotesEngine {
    /// An empty engine with no persistence.
    pub fn new(config: Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: NoteStore::new(clock),
            selection: SelectionController::new(&config),
            filter: SearchFilter::new(),
            config,
            sink: None,
            subscribers: Vec::new(),
            next_subscription: 1,
            failures: Vec::new(),
        }
    }

    /// Loads everything from `provider` and keeps writing back to it inline.
    pub fn open<P>(config: Config, clock: Arc<dyn Clock>, provider: P) -> Result<Self>
    where
        P: PersistenceProvider + 'static,
    {
        let snapshot = provider.load_all()?;
        let mut engine = Self::new(config, clock);
        engine.set_sink(Box::new(InlineWriter::new(provider)));
        engine.load(snapshot);
        Ok(engine)
    }

    /// Routes future writes to `sink`.
    pub fn set_sink(&mut self, sink: Box<dyn PersistenceSink>) {
        self.sink = Some(sink);
    }

    /// Seeds the store with records loaded elsewhere (e.g. before handing
    /// writes to a [`crate::PersistenceWorker`]).
    ///
    /// Orphaned reminders are dropped and their removal is submitted to the
    /// current sink.
    pub fn load(&mut self, snapshot: Snapshot) {
        let orphaned = self
            .store
            .load(snapshot.notes, snapshot.reminders, snapshot.next_id);
        for id in orphaned {
            self.submit(PersistOp::RemoveReminder(id));
        }
        self.selection.prune(&self.store);
        self.collect_failures();
    }

    /// The configuration the engine was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read-only view of the underlying store.
    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    // Observation

    /// Registers `callback` for every [`EngineEvent`] from now on.
    ///
    /// # Returns
    ///
    /// The ID to pass to [`NotesEngine::unsubscribe`].
    pub fn subscribe(&mut self, callback: impl FnMut(&EngineEvent) + Send + 'static) -> SubscriptionId {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        debug!("Subscriber {} registered", id);
        id
    }

    /// Removes a subscriber. Returns `false` if `id` was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        before != self.subscribers.len()
    }

    fn emit(&mut self, event: EngineEvent) {
        for (_, callback) in self.subscribers.iter_mut() {
            callback(&event);
        }
    }

    fn emit_selection_if_changed(&mut self, epoch_before: u64) {
        if self.selection.epoch() != epoch_before {
            let event = EngineEvent::SelectionChanged {
                mode: self.selection.mode(),
                selected: self.selection.selected().iter().copied().collect(),
            };
            self.emit(event);
        }
    }

    /// The filtered list, split into pinned and other notes.
    pub fn visible_notes(&self) -> VisibleNotes<'_> {
        self.filter.apply(self.store.list_active())
    }

    /// Active notes, pinned first, then most recently updated.
    pub fn list_active(&self) -> impl Iterator<Item = &Note> + Clone {
        self.store.list_active()
    }

    /// Archived notes in list order.
    pub fn list_archived(&self) -> impl Iterator<Item = &Note> + Clone {
        self.store.list_archived()
    }

    /// Notes in the basket in list order.
    pub fn list_basket(&self) -> impl Iterator<Item = &Note> + Clone {
        self.store.list_basket()
    }

    /// Looks up a note in any status.
    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.store.get(id)
    }

    /// The reminder attached to a note, if any.
    pub fn reminder(&self, id: NoteId) -> Option<&Reminder> {
        self.store.reminder(id)
    }

    /// Every hashtag used by an active note, sorted.
    pub fn hashtags(&self) -> BTreeSet<String> {
        self.store.hashtags()
    }

    /// Current search text; empty when not searching.
    pub fn search_text(&self) -> &str {
        self.filter.search_text()
    }

    /// Current normalized hashtag restriction.
    pub fn current_hashtag(&self) -> Option<&str> {
        self.filter.hashtag()
    }

    /// IDs currently selected.
    pub fn selection(&self) -> &BTreeSet<NoteId> {
        self.selection.selected()
    }

    /// Browsing when nothing is selected, Selecting otherwise.
    pub fn selection_mode(&self) -> SelectionMode {
        self.selection.mode()
    }

    /// Search matches inside a note, for marking them in the list.
    pub fn highlights(&self, id: NoteId) -> Option<NoteHighlights> {
        self.store.get(id).map(|note| self.filter.highlights(note))
    }

    // Persistence plumbing

    fn submit(&mut self, op: PersistOp) {
        if let Some(sink) = self.sink.as_mut() {
            sink.submit(op);
        }
    }

    fn collect_failures(&mut self) {
        let failures = match self.sink.as_mut() {
            Some(sink) => sink.drain_failures(),
            None => return,
        };
        for failure in failures {
            warn!(
                "Keeping in-memory change to note {} despite persistence failure: {}",
                failure.op.note_id(),
                failure.message
            );
            self.failures.push(failure.clone());
            self.emit(EngineEvent::PersistenceFailed(failure));
        }
    }

    /// Picks up failures reported asynchronously and returns every failure
    /// not handed out before.
    pub fn drain_persistence_failures(&mut self) -> Vec<PersistenceFailure> {
        self.collect_failures();
        std::mem::take(&mut self.failures)
    }

    fn save_note(&mut self, id: NoteId) {
        if let Some(note) = self.store.get(id).cloned() {
            self.submit(PersistOp::SaveNote(note));
        }
    }

    /// Prunes the selection, persists and notifies after a store mutation.
    fn after_store_change(&mut self, changes: StoreChanges, epoch_before: u64) -> usize {
        let affected = changes.updated.len() + changes.purged.len();
        let left: Vec<NoteId> = changes.left_active(&self.store).collect();
        if !left.is_empty() {
            let dropped = self.selection.prune(&self.store);
            if !dropped.is_empty() {
                debug!("Dropped {:?} from selection", dropped);
            }
        }

        for id in &changes.updated {
            self.save_note(*id);
        }
        if !changes.purged.is_empty() {
            // Purged records vanish from storage; keep their IDs retired.
            self.submit(PersistOp::SaveNextId(self.store.next_id()));
        }
        for id in &changes.purged {
            self.submit(PersistOp::RemoveNote(*id));
        }
        for id in &changes.reminders_removed {
            self.submit(PersistOp::RemoveReminder(*id));
        }

        if !changes.updated.is_empty() {
            self.emit(EngineEvent::NotesChanged(changes.updated.clone()));
        }
        if !changes.purged.is_empty() {
            self.emit(EngineEvent::NotesPurged(changes.purged.clone()));
        }
        for id in &changes.reminders_removed {
            self.emit(EngineEvent::ReminderChanged(*id));
        }
        self.emit_selection_if_changed(epoch_before);
        self.collect_failures();
        affected
    }

    // Note actions

    /// Creates an empty active note, persists it and returns its ID.
    pub fn create_note(&mut self) -> NoteId {
        let id = self.store.create_note();
        self.save_note(id);
        self.emit(EngineEvent::NotesChanged(vec![id]));
        self.collect_failures();
        id
    }

    /// Fails with `NoteNotFound` for unknown or deleted notes, leaving state as is.
    pub fn update_note(&mut self, id: NoteId, header: Option<String>, body: Option<String>) -> Result<()> {
        self.store.update_note(id, header, body)?;
        self.save_note(id);
        self.emit(EngineEvent::NotesChanged(vec![id]));
        self.collect_failures();
        Ok(())
    }

    /// Pins or unpins notes.
    ///
    /// # Arguments
    ///
    /// * `ids` - Notes to change; unknown IDs are ignored
    /// * `pinned` - The flag to set
    ///
    /// # Returns
    ///
    /// How many notes actually changed. Repeating the call returns 0.
    pub fn set_pinned(&mut self, ids: impl IntoIterator<Item = NoteId>, pinned: bool) -> usize {
        let epoch = self.selection.epoch();
        let changes = self.store.set_pinned(ids, pinned);
        self.after_store_change(changes, epoch)
    }

    /// Moves notes to the basket, dropping their reminders and their place in
    /// the selection. Returns how many notes moved.
    pub fn soft_delete(&mut self, ids: impl IntoIterator<Item = NoteId>) -> usize {
        let epoch = self.selection.epoch();
        let changes = self.store.soft_delete(ids);
        self.after_store_change(changes, epoch)
    }

    /// Archives active notes; reminders are kept. Returns how many moved.
    pub fn archive(&mut self, ids: impl IntoIterator<Item = NoteId>) -> usize {
        let epoch = self.selection.epoch();
        let changes = self.store.archive(ids);
        self.after_store_change(changes, epoch)
    }

    /// Brings archived or basket notes back to the active list.
    pub fn restore(&mut self, ids: impl IntoIterator<Item = NoteId>) -> usize {
        let epoch = self.selection.epoch();
        let changes = self.store.restore(ids);
        self.after_store_change(changes, epoch)
    }

    /// Permanently removes basket notes. Notes elsewhere are left alone.
    ///
    /// # Returns
    ///
    /// How many notes were removed.
    pub fn purge(&mut self, ids: impl IntoIterator<Item = NoteId>) -> usize {
        let epoch = self.selection.epoch();
        let changes = self.store.purge(ids);
        self.after_store_change(changes, epoch)
    }

    /// Purges every note in the basket.
    pub fn empty_basket(&mut self) -> usize {
        let epoch = self.selection.epoch();
        let changes = self.store.empty_basket();
        info!("Emptied basket of {} notes", changes.purged.len());
        self.after_store_change(changes, epoch)
    }

    // Filter actions

    /// Restricts the visible list to notes containing `text`, ignoring case.
    pub fn set_search_text(&mut self, text: impl Into<String>) {
        self.filter.set_search_text(text);
        self.emit(EngineEvent::FilterChanged);
    }

    /// Drops the search text.
    pub fn clear_search(&mut self) {
        self.filter.clear_search();
        self.emit(EngineEvent::FilterChanged);
    }

    /// Restricts the visible list to one hashtag (`"#Work"` and `"work"` are the same).
    pub fn set_hashtag(&mut self, tag: &str) {
        self.filter.set_hashtag(tag);
        self.emit(EngineEvent::FilterChanged);
    }

    /// Selects `tag`, or clears it when it is already the active one.
    pub fn toggle_hashtag(&mut self, tag: &str) {
        self.filter.toggle_hashtag(tag);
        self.emit(EngineEvent::FilterChanged);
    }

    /// Drops the hashtag restriction.
    pub fn clear_hashtag(&mut self) {
        self.filter.clear_hashtag();
        self.emit(EngineEvent::FilterChanged);
    }

    // Selection actions

    /// Starts a selection with `id`, or toggles it while already selecting.
    ///
    /// # Returns
    ///
    /// `false` when `id` is not an active note.
    pub fn long_press(&mut self, id: NoteId) -> bool {
        let epoch = self.selection.epoch();
        let changed = self.selection.long_press(&self.store, id);
        self.emit_selection_if_changed(epoch);
        changed
    }

    /// Opens the note while browsing; toggles it while selecting.
    pub fn tap(&mut self, id: NoteId) -> TapOutcome {
        let epoch = self.selection.epoch();
        let outcome = self.selection.tap(&self.store, id);
        self.emit_selection_if_changed(epoch);
        outcome
    }

    /// Adds or removes a note from the selection in either mode.
    pub fn toggle_selection(&mut self, id: NoteId) -> bool {
        self.long_press(id)
    }

    /// Empties the selection and returns to browsing.
    pub fn clear_selection(&mut self) {
        let epoch = self.selection.epoch();
        self.selection.clear();
        self.emit_selection_if_changed(epoch);
    }

    /// Pins the selection (or unpins it when all are pinned), then clears it.
    pub fn pin_selected(&mut self) -> usize {
        let epoch = self.selection.epoch();
        let changes = self.selection.pin_selected(&mut self.store);
        self.after_store_change(changes, epoch)
    }

    /// Archives the selection, then clears it.
    pub fn archive_selected(&mut self) -> usize {
        let epoch = self.selection.epoch();
        let changes = self.selection.archive_selected(&mut self.store);
        self.after_store_change(changes, epoch)
    }

    /// Moves the selection to the basket, then clears it.
    pub fn delete_selected(&mut self) -> usize {
        let epoch = self.selection.epoch();
        let changes = self.selection.delete_selected(&mut self.store);
        self.after_store_change(changes, epoch)
    }

    // Reminder actions

    /// Prefilled reminder values for the single selected note.
    ///
    /// Returns `None` unless exactly one note is selected.
    pub fn open_reminder_editor(&self) -> Option<ReminderDraft> {
        self.selection.open_reminder_editor(&self.store)
    }

    /// Validates a reminder for the single selected note and ties it to the
    /// current selection; nothing is stored until [`NotesEngine::complete_reminder_save`].
    pub fn begin_reminder_save(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        repeat: RepeatPolicy,
    ) -> Result<PendingReminder> {
        self.selection
            .begin_reminder_save(&self.store, date, time, repeat)
    }

    /// Applies a save begun earlier; stale ones fail with `StaleCompletion`.
    pub fn complete_reminder_save(&mut self, pending: PendingReminder) -> Result<()> {
        let reminder = pending.reminder.clone();
        self.selection
            .complete_reminder_save(&mut self.store, pending)?;
        self.reminder_saved(reminder);
        Ok(())
    }

    /// Upserts the reminder of the single selected note.
    ///
    /// # Returns
    ///
    /// The stored reminder, or `Validation` when the selection is not exactly
    /// one note or the instant is in the past while past reminders are
    /// rejected. A failed save changes nothing.
    pub fn save_reminder(
        &mut self,
        date: NaiveDate,
        time: NaiveTime,
        repeat: RepeatPolicy,
    ) -> Result<Reminder> {
        let reminder = self
            .selection
            .save_reminder(&mut self.store, date, time, repeat)?;
        self.reminder_saved(reminder.clone());
        Ok(reminder)
    }

    fn reminder_saved(&mut self, reminder: Reminder) {
        let id = reminder.note_id;
        self.submit(PersistOp::SaveReminder(reminder));
        self.emit(EngineEvent::ReminderChanged(id));
        self.collect_failures();
    }

    /// Removes the single selected note's reminder, if it has one.
    pub fn delete_reminder(&mut self) -> Option<Reminder> {
        let removed = self.selection.delete_reminder(&mut self.store)?;
        let id = removed.note_id;
        self.submit(PersistOp::RemoveReminder(id));
        self.emit(EngineEvent::ReminderChanged(id));
        self.collect_failures();
        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ManualClock, MemoryStorage, NoteError};
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2030, 6, 1, 9, 0, 0).unwrap(),
        ))
    }

    fn recorder(engine: &mut NotesEngine) -> Arc<Mutex<Vec<EngineEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        engine.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        events
    }

    #[test]
    fn deleting_a_selected_note_notifies_selection_change() {
        let mut engine = NotesEngine::new(Config::default(), clock());
        let a = engine.create_note();
        let b = engine.create_note();
        engine.long_press(a);
        engine.tap(b);

        let events = recorder(&mut engine);
        engine.soft_delete([a]);

        let events = events.lock().unwrap();
        assert!(events.contains(&EngineEvent::NotesChanged(vec![a])));
        assert!(events.contains(&EngineEvent::SelectionChanged {
            mode: SelectionMode::Selecting,
            selected: vec![b],
        }));
    }

    #[test]
    fn unsubscribed_callbacks_stay_quiet() {
        let mut engine = NotesEngine::new(Config::default(), clock());
        let events = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&events);
        let id = engine.subscribe(move |_| *counter.lock().unwrap() += 1);

        engine.create_note();
        assert!(engine.unsubscribe(id));
        assert!(!engine.unsubscribe(id));
        engine.create_note();
        assert_eq!(*events.lock().unwrap(), 1);
    }

    #[test]
    fn mutations_are_written_through() {
        let storage = Arc::new(MemoryStorage::new());
        let mut engine =
            NotesEngine::open(Config::default(), clock(), Arc::clone(&storage)).unwrap();

        let a = engine.create_note();
        engine
            .update_note(a, Some("Todo".into()), Some("call #work".into()))
            .unwrap();
        engine.long_press(a);
        engine
            .save_reminder(
                NaiveDate::from_ymd_opt(2030, 6, 2).unwrap(),
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                RepeatPolicy::None,
            )
            .unwrap();
        assert_eq!(storage.note(a).unwrap().header, "Todo");
        assert!(storage.reminder(a).is_some());

        engine.soft_delete([a]);
        assert!(storage.note(a).unwrap().is_deleted());
        assert!(storage.reminder(a).is_none());

        engine.purge([a]);
        assert!(storage.note(a).is_none());
    }

    #[test]
    fn persistence_failures_do_not_roll_back() {
        let storage = Arc::new(MemoryStorage::new());
        let mut engine =
            NotesEngine::open(Config::default(), clock(), Arc::clone(&storage)).unwrap();
        let events = recorder(&mut engine);

        storage.set_failing(true);
        let a = engine.create_note();
        assert!(engine.note(a).is_some());
        assert!(storage.note(a).is_none());

        let failures = engine.drain_persistence_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].op.note_id(), a);
        assert!(engine.drain_persistence_failures().is_empty());
        assert!(events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, EngineEvent::PersistenceFailed(_))));
    }

    #[test]
    fn reopening_restores_state_and_ids_move_on() {
        let storage = Arc::new(MemoryStorage::new());
        let first = {
            let mut engine =
                NotesEngine::open(Config::default(), clock(), Arc::clone(&storage)).unwrap();
            let a = engine.create_note();
            engine.update_note(a, None, Some("#kept".into())).unwrap();
            engine.set_pinned([a], true);
            a
        };

        let mut engine =
            NotesEngine::open(Config::default(), clock(), Arc::clone(&storage)).unwrap();
        assert!(engine.note(first).unwrap().is_pinned);
        assert_eq!(engine.hashtags().into_iter().collect::<Vec<_>>(), vec!["kept"]);
        assert!(engine.create_note() > first);
    }

    #[test]
    fn purged_ids_stay_retired_after_reopen() {
        let storage = Arc::new(MemoryStorage::new());
        let purged = {
            let mut engine =
                NotesEngine::open(Config::default(), clock(), Arc::clone(&storage)).unwrap();
            engine.create_note();
            let b = engine.create_note();
            engine.soft_delete([b]);
            assert_eq!(engine.purge([b]), 1);
            b
        };
        assert!(storage.note(purged).is_none());

        let mut engine =
            NotesEngine::open(Config::default(), clock(), Arc::clone(&storage)).unwrap();
        let fresh = engine.create_note();
        assert_ne!(fresh, purged);
        assert!(fresh > purged);
    }

    #[test]
    fn orphaned_reminders_are_removed_on_open() {
        let base = Utc.with_ymd_and_hms(2030, 6, 1, 9, 0, 0).unwrap();
        let mut deleted = Note::new(NoteId(1), base);
        deleted.status = crate::NoteStatus::Basket;
        let storage = Arc::new(MemoryStorage::with_snapshot(crate::Snapshot {
            notes: vec![deleted],
            reminders: vec![Reminder {
                note_id: NoteId(1),
                date: base.date_naive(),
                time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                repeat: RepeatPolicy::None,
            }],
            next_id: None,
        }));

        let engine = NotesEngine::open(Config::default(), clock(), Arc::clone(&storage)).unwrap();
        assert!(engine.reminder(NoteId(1)).is_none());
        assert!(storage.reminder(NoteId(1)).is_none());
    }

    #[test]
    fn stale_reminder_save_through_engine() {
        let mut engine = NotesEngine::new(Config::default(), clock());
        let a = engine.create_note();
        engine.long_press(a);
        let pending = engine
            .begin_reminder_save(
                NaiveDate::from_ymd_opt(2030, 6, 5).unwrap(),
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                RepeatPolicy::Monthly,
            )
            .unwrap();
        engine.clear_selection();

        assert!(matches!(
            engine.complete_reminder_save(pending),
            Err(NoteError::StaleCompletion { .. })
        ));
        assert!(engine.reminder(a).is_none());
    }

    #[test]
    fn highlights_follow_search_text() {
        let mut engine = NotesEngine::new(Config::default(), clock());
        let a = engine.create_note();
        engine
            .update_note(a, Some("Milk run".into()), Some("buy milk".into()))
            .unwrap();
        engine.set_search_text("milk");

        let marks = engine.highlights(a).unwrap();
        assert_eq!(marks.header, vec![0..4]);
        assert_eq!(marks.body, vec![4..8]);
        assert!(engine.highlights(NoteId(404)).is_none());
    }
}
