//! Shared value types for the notepad engine.
//!
//! This module contains the small types passed between the store, the
//! filter, the selection controller and the command-line driver.
use std::{fmt, num::ParseIntError, path::PathBuf, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::NoteError;

/// A specialized Result type for notepad operations.
pub type Result<T> = std::result::Result<T, NoteError>;

/// Opaque note identifier. Allocated once and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub u64);

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(NoteId)
    }
}

/// Where a note currently lives. A note is in exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteStatus {
    #[default]
    Active,
    Archived,
    /// Soft-deleted, waiting in the basket until restored or purged.
    Basket,
}

/// How often a reminder fires again after its first occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RepeatPolicy {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

/// A scheduled date/time attached to exactly one note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// The owning note; also the reminder's identity
    pub note_id: NoteId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub repeat: RepeatPolicy,
}

impl Reminder {
    /// The first instant the reminder fires, with date and time read as UTC.
    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.date.and_time(self.time).and_utc()
    }
}

/// Values shown in the reminder editor for the single selected note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderDraft {
    pub note_id: NoteId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub repeat: RepeatPolicy,
    /// Whether a reminder already exists, so the editor can offer deletion
    pub existing: bool,
}

/// Multi-select state of the note list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    Browsing,
    Selecting,
}

/// What a tap on a note card resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapOutcome {
    /// Browsing: the host should open the note detail.
    Open(NoteId),
    /// Selecting: the selection was toggled.
    SelectionChanged,
}

/// Available subcommands for the notepad driver
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new note
    Create {
        /// Header of the note
        #[clap(short = 'H', long, default_value = "")]
        header: String,

        /// Body of the note; #hashtags are picked up from it
        #[clap(short, long, default_value = "")]
        body: String,
    },

    /// Edit the header and/or body of a note
    Edit {
        /// ID of the note to edit
        id: NoteId,

        /// New header
        #[clap(short = 'H', long)]
        header: Option<String>,

        /// New body
        #[clap(short, long)]
        body: Option<String>,
    },

    /// List notes, pinned first
    List {
        /// Case-insensitive text to look for in header or body
        #[clap(short, long)]
        search: Option<String>,

        /// Only show notes carrying this hashtag
        #[clap(short = 't', long)]
        hashtag: Option<String>,

        /// Show the archive instead of active notes
        #[clap(long, conflicts_with = "basket")]
        archived: bool,

        /// Show the basket instead of active notes
        #[clap(long)]
        basket: bool,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Pin notes to the top of the list
    Pin { ids: Vec<NoteId> },

    /// Unpin notes
    Unpin { ids: Vec<NoteId> },

    /// Move notes to the archive
    Archive { ids: Vec<NoteId> },

    /// Bring archived or deleted notes back to the active list
    Restore { ids: Vec<NoteId> },

    /// Move notes to the basket
    Delete { ids: Vec<NoteId> },

    /// Permanently remove notes from the basket
    Purge { ids: Vec<NoteId> },

    /// Permanently remove everything in the basket
    EmptyBasket,

    /// Set the reminder of a note
    Remind {
        /// ID of the note
        id: NoteId,

        /// Date, YYYY-MM-DD
        #[clap(short, long)]
        date: NaiveDate,

        /// Time, HH:MM
        #[clap(short = 'T', long, value_parser = parse_time)]
        time: NaiveTime,

        /// Repeat policy
        #[clap(short, long, value_enum, default_value_t = RepeatPolicy::None)]
        repeat: RepeatPolicy,
    },

    /// Remove the reminder of a note
    Unremind { id: NoteId },

    /// List hashtags used by active notes
    Tags,

    /// Show or reset the configuration
    Config {
        /// Show current configuration
        #[clap(short = 'S', long)]
        show: bool,

        /// Reset configuration to defaults
        #[clap(short, long)]
        reset: bool,

        /// Write the configuration to this path instead of the default one
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_time(value: &str) -> std::result::Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
}
