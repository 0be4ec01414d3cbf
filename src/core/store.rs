//! Purpose: Define the storage seam behind the notes API.
//! Exports: `NoteStore`, `open_store`.
//! Role: Handlers and CLI commands talk to storage only through this trait.
//! Invariants: Absent ids are `Ok(None)`, never an error.
//! Invariants: Implementations are shareable across threads (`Send + Sync`).

use std::sync::Arc;

use crate::core::collection::CollectionStore;
use crate::core::connection::ConnectionString;
use crate::core::error::Error;
use crate::core::memory::MemoryStore;
use crate::core::note::{NewNote, Note, NoteId};

pub trait NoteStore: Send + Sync {
    /// All notes, oldest first.
    fn list(&self) -> Result<Vec<Note>, Error>;

    fn get(&self, id: &NoteId) -> Result<Option<Note>, Error>;

    /// Stores a new note and returns it with its assigned id.
    fn insert(&self, note: NewNote) -> Result<Note, Error>;

    /// Removes a note, returning what was removed.
    fn delete(&self, id: &NoteId) -> Result<Option<Note>, Error>;

    fn describe(&self) -> String;
}

pub fn open_store(connection: &ConnectionString) -> Result<Arc<dyn NoteStore>, Error> {
    match connection {
        ConnectionString::Memory => Ok(Arc::new(MemoryStore::new())),
        ConnectionString::Collection { dir, collection } => {
            Ok(Arc::new(CollectionStore::open(dir, collection)?))
        }
    }
}
