//! Purpose: Define the public Rust API boundary for notekeep.
//! Exports: Note model, store trait and backends, connection strings, errors, HTTP client.
//! Role: The binary and integration tests import from here rather than from `core`.
//! Invariants: Additive-only; internal helpers stay in `core`.

mod client;
pub mod wire;

pub use crate::core::collection::CollectionStore;
pub use crate::core::connection::{
    ConnectionString, DB_URL_ENV, DEFAULT_COLLECTION, default_db_dir, resolve_connection,
};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::memory::MemoryStore;
pub use crate::core::note::{NewNote, Note, NoteId};
pub use crate::core::store::{NoteStore, open_store};
pub use client::NotesClient;
