//! Purpose: Define the JSON bodies exchanged by the notes HTTP API.
//! Exports: Response shapes and the fixed message strings.
//! Role: Shared by the axum server and `NotesClient` so both sides agree on one contract.
//! Invariants: Missing notes answer with `{"message": NOTE_NOT_FOUND}` and status 200.
//! Invariants: Field names are stable; additions must be optional.

use serde::{Deserialize, Serialize};

use crate::core::error::ErrorKind;
use crate::core::note::{Note, NoteId};

pub const WELCOME_MESSAGE: &str = "Welcome to the Notes App API";
pub const NOTE_NOT_FOUND: &str = "Note not found";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn welcome() -> Self {
        Self::new(WELCOME_MESSAGE)
    }

    pub fn not_found() -> Self {
        Self::new(NOTE_NOT_FOUND)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeletedBody {
    pub message: String,
    pub deleted_note: Note,
}

impl DeletedBody {
    pub fn new(note: Note) -> Self {
        Self {
            message: deleted_message(&note.id),
            deleted_note: note,
        }
    }
}

pub fn deleted_message(id: &NoteId) -> String {
    format!("Note with id {id} has been deleted")
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

pub fn parse_error_kind(kind: &str) -> ErrorKind {
    match kind {
        "Usage" => ErrorKind::Usage,
        "NotFound" => ErrorKind::NotFound,
        "Busy" => ErrorKind::Busy,
        "Permission" => ErrorKind::Permission,
        "Corrupt" => ErrorKind::Corrupt,
        "Io" => ErrorKind::Io,
        _ => ErrorKind::Internal,
    }
}
