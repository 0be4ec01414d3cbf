// Process-local note list with integer ids (`max + 1`).
use std::sync::{PoisonError, RwLock};

use crate::core::error::Error;
use crate::core::note::{NewNote, Note, NoteId};
use crate::core::store::NoteStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    notes: RwLock<Vec<Note>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes(notes: Vec<Note>) -> Self {
        Self {
            notes: RwLock::new(notes),
        }
    }

    /// The two notes the demo backend starts with.
    pub fn seeded() -> Self {
        Self::with_notes(vec![
            Note {
                id: NoteId::Seq(1),
                text: "First note from the backend!".to_string(),
            },
            Note {
                id: NoteId::Seq(2),
                text: "Learn how to connect a frontend.".to_string(),
            },
        ])
    }
}

impl NoteStore for MemoryStore {
    fn list(&self) -> Result<Vec<Note>, Error> {
        let notes = self.notes.read().unwrap_or_else(PoisonError::into_inner);
        Ok(notes.clone())
    }

    fn get(&self, id: &NoteId) -> Result<Option<Note>, Error> {
        let notes = self.notes.read().unwrap_or_else(PoisonError::into_inner);
        Ok(notes.iter().find(|note| &note.id == id).cloned())
    }

    fn insert(&self, note: NewNote) -> Result<Note, Error> {
        let mut notes = self.notes.write().unwrap_or_else(PoisonError::into_inner);
        let next = notes
            .iter()
            .filter_map(|note| note.id.as_seq())
            .max()
            .unwrap_or(0)
            + 1;
        let stored = Note {
            id: NoteId::Seq(next),
            text: note.text,
        };
        notes.push(stored.clone());
        Ok(stored)
    }

    fn delete(&self, id: &NoteId) -> Result<Option<Note>, Error> {
        let mut notes = self.notes.write().unwrap_or_else(PoisonError::into_inner);
        let Some(index) = notes.iter().position(|note| &note.id == id) else {
            return Ok(None);
        };
        Ok(Some(notes.remove(index)))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::core::note::{NewNote, NoteId};
    use crate::core::store::NoteStore;

    #[test]
    fn ids_continue_from_the_largest() {
        let store = MemoryStore::seeded();
        let created = store.insert(NewNote::new("third")).expect("insert");
        assert_eq!(created.id, NoteId::Seq(3));

        store.delete(&NoteId::Seq(1)).expect("delete");
        let created = store.insert(NewNote::new("fourth")).expect("insert");
        assert_eq!(created.id, NoteId::Seq(4));
    }

    #[test]
    fn empty_store_starts_at_one() {
        let store = MemoryStore::new();
        let created = store.insert(NewNote::new("first")).expect("insert");
        assert_eq!(created.id, NoteId::Seq(1));
        assert_eq!(store.get(&NoteId::Seq(1)).expect("get"), Some(created));
    }

    #[test]
    fn delete_returns_removed_note_once() {
        let store = MemoryStore::seeded();
        let removed = store.delete(&NoteId::Seq(2)).expect("delete");
        assert_eq!(
            removed.map(|note| note.text),
            Some("Learn how to connect a frontend.".to_string())
        );
        assert_eq!(store.delete(&NoteId::Seq(2)).expect("delete"), None);
        assert_eq!(store.list().expect("list").len(), 1);
    }
}
