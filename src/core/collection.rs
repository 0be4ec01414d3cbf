// File-backed JSON document collection with advisory locking and atomic rewrites.
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use libc::{EACCES, EPERM};
use serde::{Deserialize, Serialize};

use crate::core::connection::validate_collection_name;
use crate::core::error::{Error, ErrorKind};
use crate::core::note::{NewNote, Note, NoteId};
use crate::core::object_id::{is_object_id, next_object_id};
use crate::core::store::NoteStore;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Document {
    #[serde(rename = "_id")]
    id: String,
    text: String,
}

impl From<Document> for Note {
    fn from(doc: Document) -> Self {
        Note {
            id: NoteId::Object(doc.id),
            text: doc.text,
        }
    }
}

#[derive(Debug)]
pub struct CollectionStore {
    name: String,
    data_path: PathBuf,
    lock_path: PathBuf,
}

impl CollectionStore {
    pub fn open(dir: impl AsRef<Path>, collection: &str) -> Result<Self, Error> {
        validate_collection_name(collection)?;
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|err| {
            Error::new(map_io_error_kind(&err))
                .with_message("failed to create store directory")
                .with_path(dir)
                .with_source(err)
        })?;

        let store = Self {
            name: collection.to_string(),
            data_path: dir.join(format!("{collection}.json")),
            lock_path: dir.join(format!("{collection}.lock")),
        };

        // Surface an unreadable or corrupt collection at open time rather than on first request.
        let count = {
            let _lock = store.lock_shared()?;
            store.read_documents()?.len()
        };
        tracing::debug!(
            path = %store.data_path.display(),
            documents = count,
            "opened collection"
        );
        Ok(store)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    fn lock_shared(&self) -> Result<CollectionLock, Error> {
        let file = self.open_lock_file()?;
        file.lock_shared().map_err(|err| {
            Error::new(lock_error_kind(&err))
                .with_path(&self.lock_path)
                .with_source(err)
        })?;
        Ok(CollectionLock { file })
    }

    fn lock_exclusive(&self) -> Result<CollectionLock, Error> {
        let file = self.open_lock_file()?;
        file.lock_exclusive().map_err(|err| {
            Error::new(lock_error_kind(&err))
                .with_path(&self.lock_path)
                .with_source(err)
        })?;
        Ok(CollectionLock { file })
    }

    fn open_lock_file(&self) -> Result<File, Error> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.lock_path)
            .map_err(|err| {
                Error::new(map_io_error_kind(&err))
                    .with_message("failed to open collection lock")
                    .with_path(&self.lock_path)
                    .with_source(err)
            })
    }

    // Callers must hold a lock.
    fn read_documents(&self) -> Result<Vec<Document>, Error> {
        let bytes = match fs::read(&self.data_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(Error::new(map_io_error_kind(&err))
                    .with_message("failed to read collection")
                    .with_path(&self.data_path)
                    .with_source(err));
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        let documents: Vec<Document> = serde_json::from_slice(&bytes).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("collection is not a JSON array of documents")
                .with_path(&self.data_path)
                .with_source(err)
        })?;
        let mut seen = HashSet::with_capacity(documents.len());
        for doc in &documents {
            if !is_object_id(&doc.id) {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message(format!("document has an invalid _id: {:?}", doc.id))
                    .with_path(&self.data_path));
            }
            if !seen.insert(doc.id.as_str()) {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message(format!("duplicate document _id: {}", doc.id))
                    .with_path(&self.data_path));
            }
        }
        Ok(documents)
    }

    // Callers must hold the exclusive lock.
    fn write_documents(&self, documents: &[Document]) -> Result<(), Error> {
        let encoded = serde_json::to_vec_pretty(documents).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode collection")
                .with_source(err)
        })?;
        let tmp_path = self.data_path.with_extension("json.tmp");
        let io_err = |err: io::Error, path: &Path| {
            Error::new(map_io_error_kind(&err))
                .with_message("failed to write collection")
                .with_path(path)
                .with_source(err)
        };

        let mut file = File::create(&tmp_path).map_err(|err| io_err(err, &tmp_path))?;
        file.write_all(&encoded)
            .and_then(|()| file.write_all(b"\n"))
            .and_then(|()| file.sync_all())
            .map_err(|err| io_err(err, &tmp_path))?;
        drop(file);
        fs::rename(&tmp_path, &self.data_path).map_err(|err| io_err(err, &self.data_path))
    }
}

impl NoteStore for CollectionStore {
    fn list(&self) -> Result<Vec<Note>, Error> {
        let _lock = self.lock_shared()?;
        let documents = self.read_documents()?;
        Ok(documents.into_iter().map(Note::from).collect())
    }

    fn get(&self, id: &NoteId) -> Result<Option<Note>, Error> {
        let NoteId::Object(oid) = id else {
            return Ok(None);
        };
        let _lock = self.lock_shared()?;
        let documents = self.read_documents()?;
        Ok(documents
            .into_iter()
            .find(|doc| &doc.id == oid)
            .map(Note::from))
    }

    fn insert(&self, note: NewNote) -> Result<Note, Error> {
        let _lock = self.lock_exclusive()?;
        let mut documents = self.read_documents()?;
        let mut oid = next_object_id()?;
        while documents.iter().any(|doc| doc.id == oid) {
            oid = next_object_id()?;
        }
        let document = Document {
            id: oid,
            text: note.text,
        };
        documents.push(document.clone());
        self.write_documents(&documents)?;
        tracing::debug!(collection = %self.name, id = %document.id, "inserted document");
        Ok(document.into())
    }

    fn delete(&self, id: &NoteId) -> Result<Option<Note>, Error> {
        let NoteId::Object(oid) = id else {
            return Ok(None);
        };
        let _lock = self.lock_exclusive()?;
        let mut documents = self.read_documents()?;
        let Some(index) = documents.iter().position(|doc| &doc.id == oid) else {
            return Ok(None);
        };
        let removed = documents.remove(index);
        self.write_documents(&documents)?;
        tracing::debug!(collection = %self.name, id = %removed.id, "deleted document");
        Ok(Some(removed.into()))
    }

    fn describe(&self) -> String {
        format!("collection {} at {}", self.name, self.data_path.display())
    }
}

struct CollectionLock {
    file: File,
}

impl Drop for CollectionLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn lock_error_kind(err: &io::Error) -> ErrorKind {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM {
        return ErrorKind::Permission;
    }
    match err.kind() {
        io::ErrorKind::WouldBlock => ErrorKind::Busy,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}

fn map_io_error_kind(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}
