//! Multi-select state of the note list and the reminder actions gated on it.
//!
//! The controller is either browsing (nothing selected) or selecting (one or
//! more active notes selected). Reminder editing needs exactly one selected
//! note. Every selection change bumps an epoch so that a reminder save which
//! completes after the selection moved on can be recognised and dropped.
use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use log::{debug, error, warn};

use crate::{
    Config, NoteError, NoteId, NoteStore, Reminder, ReminderDraft, RepeatPolicy, Result,
    SelectionMode, StoreChanges, TapOutcome,
};

/// A validated reminder waiting to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReminder {
    pub reminder: Reminder,
    /// Selection epoch captured when the save started
    pub epoch: u64,
}

pub struct SelectionController {
    selected: BTreeSet<NoteId>,
    epoch: u64,
    reject_past_reminders: bool,
    default_repeat: RepeatPolicy,
}

impl SelectionController {
    pub fn new(config: &Config) -> Self {
        Self {
            selected: BTreeSet::new(),
            epoch: 0,
            reject_past_reminders: config.reject_past_reminders,
            default_repeat: config.default_repeat,
        }
    }

    pub fn mode(&self) -> SelectionMode {
        if self.selected.is_empty() {
            SelectionMode::Browsing
        } else {
            SelectionMode::Selecting
        }
    }

    pub fn selected(&self) -> &BTreeSet<NoteId> {
        &self.selected
    }

    pub fn is_selected(&self, id: NoteId) -> bool {
        self.selected.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Bumped on every selection change.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The selected note when exactly one is selected.
    pub fn single_selected(&self) -> Option<NoteId> {
        match self.selected.len() {
            1 => self.selected.iter().next().copied(),
            _ => None,
        }
    }

    fn changed(&mut self) {
        self.epoch += 1;
        debug!(
            "Selection is now {:?} (epoch {})",
            self.selected, self.epoch
        );
    }

    fn toggle(&mut self, id: NoteId) {
        if !self.selected.remove(&id) {
            self.selected.insert(id);
        }
        self.changed();
    }

    /// Long-press starts selecting with this note; while selecting it
    /// toggles like a tap. Notes that are not active are ignored.
    pub fn long_press(&mut self, store: &NoteStore, id: NoteId) -> bool {
        if !store.is_active(id) {
            debug!("Ignoring long-press on inactive note {}", id);
            return false;
        }
        self.toggle(id);
        true
    }

    /// While browsing a tap opens the note; while selecting it toggles it.
    pub fn tap(&mut self, store: &NoteStore, id: NoteId) -> TapOutcome {
        match self.mode() {
            SelectionMode::Browsing => TapOutcome::Open(id),
            SelectionMode::Selecting => {
                if store.is_active(id) {
                    self.toggle(id);
                } else {
                    debug!("Ignoring tap on inactive note {}", id);
                }
                TapOutcome::SelectionChanged
            }
        }
    }

    /// Back to browsing.
    pub fn clear(&mut self) {
        if !self.selected.is_empty() {
            self.selected.clear();
            self.changed();
        }
    }

    /// Drops selected IDs that are no longer active. Returns what was dropped.
    pub fn prune(&mut self, store: &NoteStore) -> Vec<NoteId> {
        let stale: Vec<NoteId> = self
            .selected
            .iter()
            .copied()
            .filter(|id| !store.is_active(*id))
            .collect();
        if !stale.is_empty() {
            for id in &stale {
                self.selected.remove(id);
            }
            self.changed();
        }
        stale
    }

    /// Pins every selected note, or unpins them all when all are pinned
    /// already, then clears the selection.
    pub fn pin_selected(&mut self, store: &mut NoteStore) -> StoreChanges {
        let all_pinned = self
            .selected
            .iter()
            .all(|id| store.get(*id).is_some_and(|note| note.is_pinned));
        let changes = store.set_pinned(self.selected.iter().copied(), !all_pinned);
        self.clear();
        changes
    }

    pub fn archive_selected(&mut self, store: &mut NoteStore) -> StoreChanges {
        let changes = store.archive(self.selected.iter().copied());
        self.clear();
        changes
    }

    pub fn delete_selected(&mut self, store: &mut NoteStore) -> StoreChanges {
        let changes = store.soft_delete(self.selected.iter().copied());
        self.clear();
        changes
    }

    /// Editor values for the single selected note: its reminder if it has
    /// one, otherwise the top of the next hour. `None` unless exactly one
    /// note is selected.
    pub fn open_reminder_editor(&self, store: &NoteStore) -> Option<ReminderDraft> {
        let note_id = self.single_selected()?;
        if let Some(existing) = store.reminder(note_id) {
            return Some(ReminderDraft {
                note_id,
                date: existing.date,
                time: existing.time,
                repeat: existing.repeat,
                existing: true,
            });
        }

        let next_hour = store.now() + Duration::hours(1);
        Some(ReminderDraft {
            note_id,
            date: next_hour.date_naive(),
            time: NaiveTime::from_hms_opt(next_hour.hour(), 0, 0).unwrap_or(NaiveTime::MIN),
            repeat: self.default_repeat,
            existing: false,
        })
    }

    /// Validates a reminder for the single selected note without applying it.
    pub fn begin_reminder_save(
        &self,
        store: &NoteStore,
        date: NaiveDate,
        time: NaiveTime,
        repeat: RepeatPolicy,
    ) -> Result<PendingReminder> {
        let Some(note_id) = self.single_selected() else {
            let message = format!(
                "A reminder needs exactly one selected note, {} selected",
                self.selected.len()
            );
            warn!("{}", message);
            return Err(NoteError::validation(message));
        };

        let reminder = Reminder {
            note_id,
            date,
            time,
            repeat,
        };
        let now: DateTime<Utc> = store.now();
        if self.reject_past_reminders && reminder.scheduled_at() < now {
            let message = format!(
                "Reminder time {} is before now ({})",
                reminder.scheduled_at().to_rfc3339(),
                now.to_rfc3339()
            );
            warn!("{}", message);
            return Err(NoteError::validation(message));
        }

        Ok(PendingReminder {
            reminder,
            epoch: self.epoch,
        })
    }

    /// Applies a pending save unless the selection changed since it began.
    pub fn complete_reminder_save(
        &self,
        store: &mut NoteStore,
        pending: PendingReminder,
    ) -> Result<()> {
        if pending.epoch != self.epoch {
            let note_id = pending.reminder.note_id;
            warn!(
                "Discarding reminder save for note {}: epoch {} superseded by {}",
                note_id, pending.epoch, self.epoch
            );
            return Err(NoteError::StaleCompletion { note_id });
        }
        store.upsert_reminder(pending.reminder)
    }

    /// Validates and applies in one step.
    pub fn save_reminder(
        &self,
        store: &mut NoteStore,
        date: NaiveDate,
        time: NaiveTime,
        repeat: RepeatPolicy,
    ) -> Result<Reminder> {
        let pending = self.begin_reminder_save(store, date, time, repeat)?;
        let reminder = pending.reminder.clone();
        self.complete_reminder_save(store, pending)?;
        Ok(reminder)
    }

    /// Removes the reminder of the single selected note, if there is one.
    pub fn delete_reminder(&self, store: &mut NoteStore) -> Option<Reminder> {
        match self.single_selected() {
            Some(id) => store.remove_reminder(id),
            None => {
                error!(
                    "Cannot delete reminder with {} notes selected",
                    self.selected.len()
                );
                None
            }
        }
    }
}

impl Default for SelectionController {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}
