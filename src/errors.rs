//! Error types for the notepad engine.
//!
//! This module defines custom error types that categorize the failures
//! that can occur while managing notes, reminders and their storage.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::NoteId;

/// The main error type for the notepad engine.
#[derive(Error, Debug)]
pub enum NoteError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An operation required an existing, non-deleted note.
    #[error("Note not found: {id}")]
    NoteNotFound { id: NoteId },

    /// Input was rejected before any state was touched.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// The external store could not apply a write. In-memory state is kept.
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// The link-preview collaborator could not describe a link.
    #[error("Link preview failed for {url}: {message}")]
    LinkPreview { url: String, message: String },

    /// A reminder save finished after the selection it was made for changed.
    #[error("Reminder save for note {note_id} was superseded by a selection change")]
    StaleCompletion { note_id: NoteId },
}

impl NoteError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        NoteError::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn persistence(message: impl Into<String>) -> Self {
        NoteError::Persistence {
            message: message.into(),
        }
    }
}
