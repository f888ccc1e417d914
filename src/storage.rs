use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, error, info, trace, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::{
    Note, NoteError, NoteId, PersistOp, PersistenceProvider, Reminder, Result, Snapshot,
};

/// Keeps one JSON file per note and per reminder under a data directory.
///
/// Layout: `<data_dir>/notes/<id>.json`, `<data_dir>/reminders/<id>.json`
/// and the ID high-water mark in `<data_dir>/meta.json`.
pub struct JsonStorage {
    notes_dir: PathBuf,
    reminders_dir: PathBuf,
    meta_path: PathBuf,
}

/// Contents of `meta.json`.
#[derive(Debug, Serialize, Deserialize)]
struct StorageMeta {
    next_id: NoteId,
}

impl JsonStorage {
    /// Creates the storage, making sure both record directories exist.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let storage = Self {
            notes_dir: data_dir.join("notes"),
            reminders_dir: data_dir.join("reminders"),
            meta_path: data_dir.join("meta.json"),
        };

        for dir in [&storage.notes_dir, &storage.reminders_dir] {
            if !dir.exists() {
                debug!("Directory does not exist, creating: {}", dir.display());
                fs::create_dir_all(dir).map_err(|e| {
                    error!("Failed to create directory {}: {}", dir.display(), e);
                    NoteError::DirectoryError { path: dir.clone() }
                })?;
            }
        }

        info!("JSON storage ready at {}", data_dir.display());
        Ok(storage)
    }

    fn note_path(&self, id: NoteId) -> PathBuf {
        self.notes_dir.join(format!("{}.json", id))
    }

    fn reminder_path(&self, id: NoteId) -> PathBuf {
        self.reminders_dir.join(format!("{}.json", id))
    }

    /// Writes through a temporary file in the same directory and renames it
    /// over the target, so a crash never leaves a half-written record.
    fn write_atomic<T: Serialize>(&self, path: &Path, record: &T) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp_file = NamedTempFile::new_in(dir).map_err(|e| {
            error!("Failed to create temporary file in {}: {}", dir.display(), e);
            NoteError::Io(e)
        })?;

        trace!("Serializing record for {}", path.display());
        let json = serde_json::to_string_pretty(record).map_err(|e| {
            error!("Failed to serialize record: {}", e);
            NoteError::Serialization(e)
        })?;

        temp_file.write_all(json.as_bytes())?;
        temp_file.flush()?;

        temp_file.persist(path).map_err(|e| {
            error!("Failed to persist file {}: {}", path.display(), e.error);
            NoteError::Io(e.error)
        })?;

        debug!("Wrote {}", path.display());
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path).map_err(|e| {
                error!("Failed to delete {}: {}", path.display(), e);
                NoteError::Io(e)
            })?;
            debug!("Deleted {}", path.display());
        } else {
            debug!("Nothing to delete at {}", path.display());
        }
        Ok(())
    }

    /// Loads every record in `dir`; unreadable files are skipped with a warning.
    fn load_dir<T: DeserializeOwned>(dir: &Path) -> Vec<T> {
        let mut records = Vec::new();
        let mut load_errors = 0;

        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !(path.is_file() && path.extension().is_some_and(|ext| ext == "json")) {
                continue;
            }

            match load_record(path) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("Failed to load record from {}: {}", path.display(), e);
                    load_errors += 1;
                }
            }
        }

        if load_errors > 0 {
            error!(
                "Encountered {} errors while loading {}",
                load_errors,
                dir.display()
            );
        }
        records
    }
}

/// Reads and parses one JSON record.
fn load_record<T: DeserializeOwned>(path: &Path) -> Result<T> {
    trace!("Loading record from file: {}", path.display());
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

impl PersistenceProvider for JsonStorage {
    fn load_all(&self) -> Result<Snapshot> {
        let mut notes: Vec<Note> = Self::load_dir(&self.notes_dir);
        notes.sort_by_key(|note| note.id);
        let mut reminders: Vec<Reminder> = Self::load_dir(&self.reminders_dir);
        reminders.sort_by_key(|reminder| reminder.note_id);

        info!(
            "Loaded {} notes and {} reminders from disk",
            notes.len(),
            reminders.len()
        );
        let next_id = if self.meta_path.exists() {
            match load_record::<StorageMeta>(&self.meta_path) {
                Ok(meta) => Some(meta.next_id),
                Err(e) => {
                    warn!(
                        "Ignoring unreadable {}: {}",
                        self.meta_path.display(),
                        e
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(Snapshot {
            notes,
            reminders,
            next_id,
        })
    }

    fn apply(&self, op: &PersistOp) -> Result<()> {
        match op {
            PersistOp::SaveNote(note) => self.write_atomic(&self.note_path(note.id), note),
            PersistOp::RemoveNote(id) => self.remove_file(&self.note_path(*id)),
            PersistOp::SaveReminder(reminder) => {
                self.write_atomic(&self.reminder_path(reminder.note_id), reminder)
            }
            PersistOp::RemoveReminder(id) => self.remove_file(&self.reminder_path(*id)),
            PersistOp::SaveNextId(next_id) => self.write_atomic(
                &self.meta_path,
                &StorageMeta { next_id: *next_id },
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RepeatPolicy;
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn note(id: u64, body: &str) -> Note {
        let mut note = Note::new(NoteId(id), Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
        note.set_body(body.to_string());
        note
    }

    fn reminder(id: u64) -> Reminder {
        Reminder {
            note_id: NoteId(id),
            date: NaiveDate::from_ymd_opt(2030, 3, 3).unwrap(),
            time: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            repeat: RepeatPolicy::Daily,
        }
    }

    #[test]
    fn records_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::open(dir.path()).unwrap();
        storage.apply(&PersistOp::SaveNote(note(2, "b #two"))).unwrap();
        storage.apply(&PersistOp::SaveNote(note(1, "a"))).unwrap();
        storage.apply(&PersistOp::SaveReminder(reminder(2))).unwrap();

        let reopened = JsonStorage::open(dir.path()).unwrap();
        let snapshot = reopened.load_all().unwrap();
        assert_eq!(snapshot.notes, vec![note(1, "a"), note(2, "b #two")]);
        assert_eq!(snapshot.reminders, vec![reminder(2)]);
    }

    #[test]
    fn saving_again_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::open(dir.path()).unwrap();
        storage.apply(&PersistOp::SaveNote(note(1, "old"))).unwrap();
        storage.apply(&PersistOp::SaveNote(note(1, "new"))).unwrap();

        let snapshot = storage.load_all().unwrap();
        assert_eq!(snapshot.notes.len(), 1);
        assert_eq!(snapshot.notes[0].body, "new");
    }

    #[test]
    fn removals_delete_files_and_tolerate_missing_ones() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::open(dir.path()).unwrap();
        storage.apply(&PersistOp::SaveNote(note(1, "a"))).unwrap();
        storage.apply(&PersistOp::SaveReminder(reminder(1))).unwrap();

        storage.apply(&PersistOp::RemoveReminder(NoteId(1))).unwrap();
        storage.apply(&PersistOp::RemoveNote(NoteId(1))).unwrap();
        storage.apply(&PersistOp::RemoveNote(NoteId(1))).unwrap();

        assert_eq!(storage.load_all().unwrap(), Snapshot::default());
    }

    #[test]
    fn id_mark_is_written_to_meta_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::open(dir.path()).unwrap();
        assert_eq!(storage.load_all().unwrap().next_id, None);

        storage.apply(&PersistOp::SaveNextId(NoteId(4))).unwrap();
        assert!(dir.path().join("meta.json").is_file());

        let reopened = JsonStorage::open(dir.path()).unwrap();
        assert_eq!(reopened.load_all().unwrap().next_id, Some(NoteId(4)));

        fs::write(dir.path().join("meta.json"), "nonsense").unwrap();
        assert_eq!(reopened.load_all().unwrap().next_id, None);
    }

    #[test]
    fn corrupt_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::open(dir.path()).unwrap();
        storage.apply(&PersistOp::SaveNote(note(1, "fine"))).unwrap();
        fs::write(dir.path().join("notes").join("2.json"), "{ broken").unwrap();
        fs::write(dir.path().join("notes").join("readme.txt"), "ignored").unwrap();

        let snapshot = storage.load_all().unwrap();
        assert_eq!(snapshot.notes, vec![note(1, "fine")]);
    }
}
