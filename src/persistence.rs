//! Interfaces to the external store.
//!
//! The engine never reads back from storage after startup: it submits a
//! [`PersistOp`] after each mutation and keeps its in-memory state as the
//! authority. Failed writes come back as [`PersistenceFailure`]s.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use log::{debug, trace, warn};

use crate::{Note, NoteError, NoteId, Reminder, Result};

/// One write for the external store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOp {
    SaveNote(Note),
    RemoveNote(NoteId),
    SaveReminder(Reminder),
    RemoveReminder(NoteId),
    /// Records the next ID to hand out, so purged IDs survive a restart
    SaveNextId(NoteId),
}

impl PersistOp {
    /// The note this write concerns.
    pub fn note_id(&self) -> NoteId {
        match self {
            PersistOp::SaveNote(note) => note.id,
            PersistOp::SaveReminder(reminder) => reminder.note_id,
            PersistOp::RemoveNote(id)
            | PersistOp::RemoveReminder(id)
            | PersistOp::SaveNextId(id) => *id,
        }
    }
}

/// Everything the store hands over at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub notes: Vec<Note>,
    pub reminders: Vec<Reminder>,
    /// Last saved ID high-water mark, if any was ever written
    pub next_id: Option<NoteId>,
}

/// A write that the external store refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceFailure {
    pub op: PersistOp,
    pub message: String,
}

/// The external store.
pub trait PersistenceProvider: Send + Sync {
    /// Reads every stored note and reminder. Called once at startup.
    fn load_all(&self) -> Result<Snapshot>;

    /// Applies one write. Errors are reported to the engine, never retried.
    fn apply(&self, op: &PersistOp) -> Result<()>;
}

impl<P: PersistenceProvider + ?Sized> PersistenceProvider for Arc<P> {
    fn load_all(&self) -> Result<Snapshot> {
        (**self).load_all()
    }

    fn apply(&self, op: &PersistOp) -> Result<()> {
        (**self).apply(op)
    }
}

/// Where the engine sends its writes.
pub trait PersistenceSink: Send {
    /// Hands over a write. Must not block on the store.
    fn submit(&mut self, op: PersistOp);

    /// Failures reported since the last call.
    fn drain_failures(&mut self) -> Vec<PersistenceFailure>;
}

/// Applies each write on the caller's thread and queues failures.
pub struct InlineWriter<P> {
    provider: P,
    failures: Vec<PersistenceFailure>,
}

impl<P: PersistenceProvider> InlineWriter<P> {
    /// Wraps `provider`; every submitted write is applied immediately.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            failures: Vec::new(),
        }
    }

    /// The wrapped store.
    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: PersistenceProvider> PersistenceSink for InlineWriter<P> {
    fn submit(&mut self, op: PersistOp) {
        trace!("Applying {:?} inline", op);
        if let Err(e) = self.provider.apply(&op) {
            warn!("Failed to persist change to note {}: {}", op.note_id(), e);
            self.failures.push(PersistenceFailure {
                op,
                message: e.to_string(),
            });
        }
    }

    fn drain_failures(&mut self) -> Vec<PersistenceFailure> {
        std::mem::take(&mut self.failures)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    notes: HashMap<NoteId, Note>,
    reminders: HashMap<NoteId, Reminder>,
    next_id: Option<NoteId>,
    failing: bool,
    applied: usize,
}

/// An in-process store. Can be switched into a failing mode.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    /// An empty store that accepts every write.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with `snapshot`, as if an earlier run had saved it.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let storage = Self::new();
        if let Ok(mut state) = storage.state.lock() {
            state.notes = snapshot.notes.into_iter().map(|n| (n.id, n)).collect();
            state.reminders = snapshot
                .reminders
                .into_iter()
                .map(|r| (r.note_id, r))
                .collect();
            state.next_id = snapshot.next_id;
        }
        storage
    }

    /// While failing, every write is refused.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.failing = failing;
        }
    }

    /// The stored copy of a note.
    pub fn note(&self, id: NoteId) -> Option<Note> {
        self.state.lock().ok()?.notes.get(&id).cloned()
    }

    /// The stored copy of a reminder.
    pub fn reminder(&self, id: NoteId) -> Option<Reminder> {
        self.state.lock().ok()?.reminders.get(&id).cloned()
    }

    /// Number of writes accepted so far.
    pub fn applied(&self) -> usize {
        self.state.lock().map(|state| state.applied).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| NoteError::persistence("memory storage lock poisoned"))
    }
}

impl PersistenceProvider for MemoryStorage {
    fn load_all(&self) -> Result<Snapshot> {
        let state = self.lock()?;
        let mut notes: Vec<Note> = state.notes.values().cloned().collect();
        notes.sort_by_key(|note| note.id);
        let mut reminders: Vec<Reminder> = state.reminders.values().cloned().collect();
        reminders.sort_by_key(|reminder| reminder.note_id);
        Ok(Snapshot {
            notes,
            reminders,
            next_id: state.next_id,
        })
    }

    fn apply(&self, op: &PersistOp) -> Result<()> {
        let mut state = self.lock()?;
        if state.failing {
            return Err(NoteError::persistence(format!(
                "memory storage refused write for note {}",
                op.note_id()
            )));
        }

        match op {
            PersistOp::SaveNote(note) => {
                state.notes.insert(note.id, note.clone());
            }
            PersistOp::RemoveNote(id) => {
                state.notes.remove(id);
            }
            PersistOp::SaveReminder(reminder) => {
                state.reminders.insert(reminder.note_id, reminder.clone());
            }
            PersistOp::RemoveReminder(id) => {
                state.reminders.remove(id);
            }
            PersistOp::SaveNextId(id) => {
                state.next_id = Some(*id);
            }
        }
        state.applied += 1;
        debug!("Memory storage applied write for note {}", op.note_id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn note(id: u64) -> Note {
        Note::new(NoteId(id), Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn memory_storage_tracks_writes() {
        let storage = MemoryStorage::new();
        storage.apply(&PersistOp::SaveNote(note(1))).unwrap();
        storage.apply(&PersistOp::SaveNote(note(2))).unwrap();
        storage.apply(&PersistOp::RemoveNote(NoteId(1))).unwrap();

        let snapshot = storage.load_all().unwrap();
        assert_eq!(snapshot.notes, vec![note(2)]);
        assert_eq!(storage.applied(), 3);
    }

    #[test]
    fn inline_writer_queues_failures_once() {
        let storage = Arc::new(MemoryStorage::new());
        let mut writer = InlineWriter::new(Arc::clone(&storage));

        writer.submit(PersistOp::SaveNote(note(1)));
        assert!(writer.drain_failures().is_empty());

        storage.set_failing(true);
        writer.submit(PersistOp::RemoveNote(NoteId(1)));
        let failures = writer.drain_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].op, PersistOp::RemoveNote(NoteId(1)));
        assert!(writer.drain_failures().is_empty());

        // The refused removal left the record in place.
        assert!(storage.note(NoteId(1)).is_some());
    }

    #[test]
    fn op_reports_its_note() {
        assert_eq!(PersistOp::SaveNote(note(4)).note_id(), NoteId(4));
        assert_eq!(PersistOp::RemoveReminder(NoteId(9)).note_id(), NoteId(9));
    }

    #[test]
    fn memory_storage_keeps_the_id_mark() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.load_all().unwrap().next_id, None);

        storage.apply(&PersistOp::SaveNextId(NoteId(5))).unwrap();
        storage.apply(&PersistOp::SaveNextId(NoteId(8))).unwrap();
        assert_eq!(storage.load_all().unwrap().next_id, Some(NoteId(8)));
    }
}
