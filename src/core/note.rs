//! Purpose: Define the note entity and its identifier.
//! Exports: `Note`, `NoteId`, `NewNote`.
//! Role: Shared wire/storage model for the API, stores, and client.
//! Invariants: `NoteId::Seq` serializes as a JSON number, `NoteId::Object` as a string.
//! Invariants: Notes are immutable once stored.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NoteId {
    Seq(u64),
    Object(String),
}

impl NoteId {
    pub fn as_seq(&self) -> Option<u64> {
        match self {
            NoteId::Seq(seq) => Some(*seq),
            NoteId::Object(_) => None,
        }
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteId::Seq(seq) => write!(f, "{seq}"),
            NoteId::Object(oid) => f.write_str(oid),
        }
    }
}

impl FromStr for NoteId {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("note id must not be empty"));
        }
        if let Ok(seq) = trimmed.parse::<u64>() {
            return Ok(NoteId::Seq(seq));
        }
        Ok(NoteId::Object(trimmed.to_string()))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub text: String,
}

/// Request body for creating a note.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewNote {
    pub text: String,
}

impl NewNote {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::{Note, NoteId};
    use serde_json::json;

    #[test]
    fn seq_ids_serialize_as_numbers() {
        let note = Note {
            id: NoteId::Seq(7),
            text: "gears".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&note).expect("encode"),
            json!({"id": 7, "text": "gears"})
        );
    }

    #[test]
    fn object_ids_serialize_as_strings() {
        let note = Note {
            id: NoteId::Object("65a1f0c2e4b0a1b2c3d4e5f6".to_string()),
            text: "springs".to_string(),
        };
        let value = serde_json::to_value(&note).expect("encode");
        assert_eq!(value["id"], "65a1f0c2e4b0a1b2c3d4e5f6");
        let decoded: Note = serde_json::from_value(value).expect("decode");
        assert_eq!(decoded, note);
    }

    #[test]
    fn path_segments_parse_numeric_first() {
        assert_eq!("42".parse::<NoteId>().expect("seq"), NoteId::Seq(42));
        assert_eq!(
            "abc123".parse::<NoteId>().expect("oid"),
            NoteId::Object("abc123".to_string())
        );
        assert!("  ".parse::<NoteId>().is_err());
    }
}
