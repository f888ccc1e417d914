//! CLI module for the notepad engine
//!
//! This module maps command-line commands onto engine actions. Each run
//! loads the engine, performs one command and lets the caller flush writes.
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime};
use log::{debug, info};

use crate::{
    visible_notes, Commands, Config, Note, NoteError, NoteId, NotesEngine, RepeatPolicy, Result,
};

/// CLI Application handler - processes CLI commands against the engine
pub struct App {
    /// The engine backing every command
    engine: NotesEngine,

    /// Where `config --reset` writes by default
    config_path: PathBuf,

    /// Whether to display verbose output
    verbose: bool,
}

/// Which list a `list` command shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListSource {
    Active,
    Archived,
    Basket,
}

impl App {
    /// Create a new CLI application around a loaded engine
    pub fn new(engine: NotesEngine, config_path: PathBuf, verbose: bool) -> Self {
        Self {
            engine,
            config_path,
            verbose,
        }
    }

    pub fn engine(&self) -> &NotesEngine {
        &self.engine
    }

    pub fn into_engine(self) -> NotesEngine {
        self.engine
    }

    /// Run the CLI application with the given command
    pub fn run(&mut self, command: Commands) -> Result<()> {
        debug!("Running command {:?}", command);
        match command {
            Commands::Create { header, body } => self.create_note(header, body)?,

            Commands::Edit { id, header, body } => self.edit_note(id, header, body)?,

            Commands::List {
                search,
                hashtag,
                archived,
                basket,
                json,
            } => {
                let source = if archived {
                    ListSource::Archived
                } else if basket {
                    ListSource::Basket
                } else {
                    ListSource::Active
                };
                self.list_notes(source, search, hashtag, json)?
            }

            Commands::Pin { ids } => {
                let count = self.engine.set_pinned(ids, true);
                println!("Pinned {} note{}", count, plural(count));
            }

            Commands::Unpin { ids } => {
                let count = self.engine.set_pinned(ids, false);
                println!("Unpinned {} note{}", count, plural(count));
            }

            Commands::Archive { ids } => {
                let count = self.engine.archive(ids);
                println!("Archived {} note{}", count, plural(count));
            }

            Commands::Restore { ids } => {
                let count = self.engine.restore(ids);
                println!("Restored {} note{}", count, plural(count));
            }

            Commands::Delete { ids } => {
                let count = self.engine.soft_delete(ids);
                println!("Moved {} note{} to the basket", count, plural(count));
            }

            Commands::Purge { ids } => {
                let count = self.engine.purge(ids);
                println!("Permanently removed {} note{}", count, plural(count));
            }

            Commands::EmptyBasket => {
                let count = self.engine.empty_basket();
                println!("Emptied basket ({} note{})", count, plural(count));
            }

            Commands::Remind {
                id,
                date,
                time,
                repeat,
            } => self.set_reminder(id, date, time, repeat)?,

            Commands::Unremind { id } => self.remove_reminder(id)?,

            Commands::Tags => self.list_hashtags(),

            Commands::Config {
                show,
                reset,
                output,
            } => self.handle_config(show, reset, output)?,
        }

        Ok(())
    }

    fn create_note(&mut self, header: String, body: String) -> Result<()> {
        let id = self.engine.create_note();
        if !header.is_empty() || !body.is_empty() {
            self.engine.update_note(id, Some(header), Some(body))?;
        }
        println!("Note created with ID: {}", id);
        Ok(())
    }

    fn edit_note(&mut self, id: NoteId, header: Option<String>, body: Option<String>) -> Result<()> {
        if header.is_none() && body.is_none() {
            return Err(NoteError::validation(
                "Nothing to change: pass --header and/or --body",
            ));
        }
        self.engine.update_note(id, header, body)?;
        println!("Note {} updated successfully", id);
        Ok(())
    }

    /// Selects exactly `id`, the way a long-press on one card does.
    fn select_only(&mut self, id: NoteId) -> Result<()> {
        self.engine.clear_selection();
        if !self.engine.long_press(id) {
            return Err(NoteError::NoteNotFound { id });
        }
        Ok(())
    }

    fn set_reminder(
        &mut self,
        id: NoteId,
        date: NaiveDate,
        time: NaiveTime,
        repeat: RepeatPolicy,
    ) -> Result<()> {
        self.select_only(id)?;
        let result = self.engine.save_reminder(date, time, repeat);
        self.engine.clear_selection();
        let reminder = result?;
        println!(
            "Reminder for note {} set to {} {} ({:?})",
            id,
            reminder.date,
            reminder.time.format("%H:%M"),
            reminder.repeat
        );
        Ok(())
    }

    fn remove_reminder(&mut self, id: NoteId) -> Result<()> {
        self.select_only(id)?;
        let removed = self.engine.delete_reminder();
        self.engine.clear_selection();
        match removed {
            Some(_) => println!("Reminder for note {} removed", id),
            None => println!("Note {} has no reminder", id),
        }
        Ok(())
    }

    /// List notes from the requested source, applying search and hashtag filters
    fn list_notes(
        &mut self,
        source: ListSource,
        search: Option<String>,
        hashtag: Option<String>,
        json: bool,
    ) -> Result<()> {
        if let Some(text) = search {
            self.engine.set_search_text(text);
        }
        if let Some(tag) = hashtag {
            self.engine.set_hashtag(&tag);
        }

        let (pinned, others) = self.collect_listing(source);

        if json {
            let notes: Vec<&Note> = pinned.iter().chain(others.iter()).copied().collect();
            println!("{}", serde_json::to_string_pretty(&notes)?);
            return Ok(());
        }

        if pinned.is_empty() && others.is_empty() {
            println!("No notes found matching the criteria.");
            return Ok(());
        }

        if !pinned.is_empty() {
            println!("{}", console::style("Pinned").dim());
            self.display_notes_text(&pinned);
        }
        if !others.is_empty() {
            if !pinned.is_empty() {
                println!("{}", console::style("Other").dim());
            }
            self.display_notes_text(&others);
        }

        let total = pinned.len() + others.len();
        println!("\nFound {} note{}", total, plural(total));
        Ok(())
    }

    /// Notes of `source` that pass the engine's current search and hashtag
    /// filter, as (pinned, other). Archived and basket listings are flat.
    fn collect_listing(&self, source: ListSource) -> (Vec<&Note>, Vec<&Note>) {
        let search = self.engine.search_text();
        let hashtag = self.engine.current_hashtag();
        match source {
            ListSource::Active => {
                let visible = self.engine.visible_notes();
                (visible.pinned, visible.unpinned)
            }
            ListSource::Archived => (
                Vec::new(),
                visible_notes(self.engine.list_archived(), search, hashtag)
                    .iter()
                    .collect(),
            ),
            ListSource::Basket => (
                Vec::new(),
                visible_notes(self.engine.list_basket(), search, hashtag)
                    .iter()
                    .collect(),
            ),
        }
    }

    /// Display notes in text format
    fn display_notes_text(&self, notes: &[&Note]) {
        for note in notes {
            let updated_at = note.updated_at.format("%Y-%m-%d %H:%M");
            println!("ID: {} | Updated: {}", note.id, updated_at);

            let header = if note.header.is_empty() {
                "(no header)"
            } else {
                note.header.as_str()
            };
            println!("  {}", console::style(header).bold());

            let preview = content_preview(&note.body, 80);
            if !preview.is_empty() {
                println!("  {}", preview);
            }

            if !note.hashtags.is_empty() {
                let tags = note
                    .hashtags
                    .iter()
                    .map(|tag| format!("#{}", tag))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("  {}", console::style(tags).cyan());
            }

            if let Some(reminder) = self.engine.reminder(note.id) {
                println!(
                    "  {} {} {} ({:?})",
                    console::style("Reminder:").yellow(),
                    reminder.date,
                    reminder.time.format("%H:%M"),
                    reminder.repeat
                );
            }

            if self.verbose {
                println!("  Created: {}", note.created_at.to_rfc3339());
            }
        }
    }

    fn list_hashtags(&self) {
        let tags = self.engine.hashtags();
        if tags.is_empty() {
            println!("No hashtags in use.");
            return;
        }
        for tag in tags {
            println!("#{}", tag);
        }
    }

    fn handle_config(&self, show: bool, reset: bool, output: Option<PathBuf>) -> Result<()> {
        if reset {
            let path = output.unwrap_or_else(|| self.config_path.clone());
            Config::default().save(&path)?;
            info!("Configuration reset at {}", path.display());
            println!("Configuration reset to defaults at {}", path.display());
        }

        if show || !reset {
            println!("{}", serde_json::to_string_pretty(self.engine.config())?);
            println!("(config file: {})", display_path(&self.config_path));
        }
        Ok(())
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

fn display_path(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not created yet)", path.display())
    }
}

/// First non-empty line of the body, cut at `max_chars` characters.
fn content_preview(content: &str, max_chars: usize) -> String {
    let first_line = content
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim();

    if first_line.chars().count() <= max_chars {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ManualClock, MemoryStorage};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn app() -> (Arc<MemoryStorage>, App) {
        let storage = Arc::new(MemoryStorage::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2030, 6, 1, 9, 0, 0).unwrap(),
        ));
        let engine = NotesEngine::open(Config::default(), clock, Arc::clone(&storage)).unwrap();
        (storage, App::new(engine, PathBuf::from("unused.json"), false))
    }

    #[test]
    fn create_then_edit_through_commands() {
        let (storage, mut app) = app();
        app.run(Commands::Create {
            header: "Shopping".into(),
            body: "milk #grocery".into(),
        })
        .unwrap();
        let id = NoteId(1);
        assert_eq!(storage.note(id).unwrap().header, "Shopping");

        app.run(Commands::Edit {
            id,
            header: None,
            body: Some("bread #bakery".into()),
        })
        .unwrap();
        assert!(app.engine().note(id).unwrap().has_hashtag("bakery"));

        let nothing = app.run(Commands::Edit {
            id,
            header: None,
            body: None,
        });
        assert!(matches!(nothing, Err(NoteError::Validation { .. })));
    }

    #[test]
    fn remind_leaves_no_selection_behind() {
        let (storage, mut app) = app();
        app.run(Commands::Create {
            header: "Call".into(),
            body: String::new(),
        })
        .unwrap();

        app.run(Commands::Remind {
            id: NoteId(1),
            date: NaiveDate::from_ymd_opt(2030, 6, 2).unwrap(),
            time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            repeat: RepeatPolicy::Daily,
        })
        .unwrap();
        assert!(storage.reminder(NoteId(1)).is_some());
        assert!(app.engine().selection().is_empty());

        let past = app.run(Commands::Remind {
            id: NoteId(1),
            date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            repeat: RepeatPolicy::None,
        });
        assert!(matches!(past, Err(NoteError::Validation { .. })));
        assert!(app.engine().selection().is_empty());

        app.run(Commands::Unremind { id: NoteId(1) }).unwrap();
        assert!(storage.reminder(NoteId(1)).is_none());
    }

    #[test]
    fn remind_on_missing_note_is_not_found() {
        let (_, mut app) = app();
        let result = app.run(Commands::Remind {
            id: NoteId(42),
            date: NaiveDate::from_ymd_opt(2030, 6, 2).unwrap(),
            time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            repeat: RepeatPolicy::None,
        });
        assert!(matches!(result, Err(NoteError::NoteNotFound { .. })));
    }

    #[test]
    fn bulk_commands_move_notes_between_lists() {
        let (_, mut app) = app();
        for _ in 0..3 {
            app.run(Commands::Create {
                header: String::new(),
                body: String::new(),
            })
            .unwrap();
        }

        app.run(Commands::Archive { ids: vec![NoteId(1)] }).unwrap();
        app.run(Commands::Delete {
            ids: vec![NoteId(2), NoteId(3)],
        })
        .unwrap();
        assert_eq!(app.engine().list_archived().count(), 1);
        assert_eq!(app.engine().list_basket().count(), 2);

        app.run(Commands::Restore { ids: vec![NoteId(2)] }).unwrap();
        app.run(Commands::EmptyBasket).unwrap();
        assert_eq!(app.engine().list_basket().count(), 0);
        assert_eq!(app.engine().list_active().count(), 1);
    }

    #[test]
    fn archive_and_basket_listings_honour_filters() {
        let (_, mut app) = app();
        for (header, body) in [
            ("Shopping", "milk #grocery"),
            ("Bakery", "bread #grocery"),
            ("Todo", "call #work"),
        ] {
            app.run(Commands::Create {
                header: header.into(),
                body: body.into(),
            })
            .unwrap();
        }
        app.run(Commands::Archive {
            ids: vec![NoteId(1), NoteId(2)],
        })
        .unwrap();
        app.run(Commands::Delete {
            ids: vec![NoteId(3)],
        })
        .unwrap();

        app.engine.set_search_text("MILK");
        let (pinned, archived) = app.collect_listing(ListSource::Archived);
        assert!(pinned.is_empty());
        assert_eq!(archived.iter().map(|n| n.id).collect::<Vec<_>>(), vec![NoteId(1)]);

        app.engine.clear_search();
        app.engine.set_hashtag("grocery");
        let (_, basket) = app.collect_listing(ListSource::Basket);
        assert!(basket.is_empty());
        let (_, archived) = app.collect_listing(ListSource::Archived);
        assert_eq!(archived.len(), 2);

        app.run(Commands::List {
            search: Some("bread".into()),
            hashtag: None,
            archived: true,
            basket: false,
            json: true,
        })
        .unwrap();
        let (_, archived) = app.collect_listing(ListSource::Archived);
        assert_eq!(archived.iter().map(|n| n.id).collect::<Vec<_>>(), vec![NoteId(2)]);
    }

    #[test]
    fn preview_cuts_on_characters() {
        assert_eq!(content_preview("\n\n  hello world  \nmore", 80), "hello world");
        assert_eq!(content_preview("привет мир", 6), "привет...");
        assert_eq!(content_preview("", 10), "");
    }
}
