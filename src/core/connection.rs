//! Purpose: Parse and resolve store connection strings.
//! Exports: `ConnectionString`, `resolve_connection`, `default_db_dir`, `DB_URL_ENV`.
//! Role: Single source for `--db` / `NOTEKEEP_DB_URL` / default-location semantics.
//! Invariants: Precedence is explicit flag, then environment, then `~/.notekeep/db`.
//! Invariants: Collection names are non-empty and limited to `[A-Za-z0-9_-]`.

use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use crate::core::error::{Error, ErrorKind};

pub const DB_URL_ENV: &str = "NOTEKEEP_DB_URL";
pub const DEFAULT_COLLECTION: &str = "notes";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConnectionString {
    Memory,
    Collection { dir: PathBuf, collection: String },
}

impl ConnectionString {
    pub fn collection(dir: impl Into<PathBuf>) -> Self {
        Self::Collection {
            dir: dir.into(),
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, Error> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("connection string is empty")
                .with_hint("Use memory:, file:///path/to/dir, or a directory path."));
        }
        if matches!(trimmed, "memory" | "memory:" | "memory://") {
            return Ok(Self::Memory);
        }
        if !looks_like_url(trimmed) {
            return Ok(Self::collection(trimmed));
        }

        let url = Url::parse(trimmed).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid connection string: {trimmed}"))
                .with_source(err)
        })?;
        match url.scheme() {
            "memory" => Ok(Self::Memory),
            "file" => {
                let dir = url.to_file_path().map_err(|_| {
                    Error::new(ErrorKind::Usage)
                        .with_message("file connection strings need an absolute local path")
                        .with_hint("Use file:///absolute/dir or pass the directory path directly.")
                })?;
                let collection = url
                    .query_pairs()
                    .find(|(key, _)| key == "collection")
                    .map(|(_, value)| value.into_owned())
                    .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());
                validate_collection_name(&collection)?;
                Ok(Self::Collection { dir, collection })
            }
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unsupported connection scheme: {other}"))
                .with_hint("Supported: memory:, file:///path/to/dir, or a directory path.")),
        }
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionString::Memory => f.write_str("memory:"),
            ConnectionString::Collection { dir, collection } => {
                write!(f, "{} (collection: {collection})", dir.display())
            }
        }
    }
}

pub fn default_db_dir() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".notekeep").join("db")
}

/// Picks the connection string by precedence: flag, environment value, default dir.
pub fn resolve_connection(
    flag: Option<&str>,
    env_value: Option<&str>,
    default_dir: &Path,
) -> Result<ConnectionString, Error> {
    if let Some(value) = flag {
        return ConnectionString::parse(value);
    }
    match env_value {
        Some(value) if !value.trim().is_empty() => ConnectionString::parse(value).map_err(|err| {
            let message = err.message().unwrap_or("invalid connection string").to_string();
            err.with_message(format!("{DB_URL_ENV}: {message}"))
        }),
        _ => Ok(ConnectionString::collection(default_dir)),
    }
}

pub fn validate_collection_name(name: &str) -> Result<(), Error> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid collection name: {name:?}"))
            .with_hint("Collection names use letters, digits, '_' and '-'."))
    }
}

fn looks_like_url(input: &str) -> bool {
    let Some((scheme, _)) = input.split_once(':') else {
        return false;
    };
    scheme.len() > 1
        && scheme
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::{ConnectionString, DEFAULT_COLLECTION, resolve_connection};
    use crate::core::error::ErrorKind;
    use std::path::{Path, PathBuf};

    #[test]
    fn memory_forms_are_accepted() {
        for input in ["memory", "memory:", "memory://", " memory: "] {
            assert_eq!(
                ConnectionString::parse(input).expect("memory"),
                ConnectionString::Memory
            );
        }
    }

    #[test]
    fn file_url_with_collection_query() {
        let parsed =
            ConnectionString::parse("file:///var/lib/notekeep?collection=drafts").expect("file");
        assert_eq!(
            parsed,
            ConnectionString::Collection {
                dir: PathBuf::from("/var/lib/notekeep"),
                collection: "drafts".to_string(),
            }
        );
    }

    #[test]
    fn bare_paths_use_default_collection() {
        let parsed = ConnectionString::parse("./data").expect("path");
        assert_eq!(
            parsed,
            ConnectionString::Collection {
                dir: PathBuf::from("./data"),
                collection: DEFAULT_COLLECTION.to_string(),
            }
        );
    }

    #[test]
    fn network_database_urls_are_rejected() {
        let err = ConnectionString::parse("mongodb://localhost:27017").expect_err("usage");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.hint().is_some());
    }

    #[test]
    fn bad_collection_names_are_rejected() {
        let err = ConnectionString::parse("file:///tmp/x?collection=../escape").expect_err("usage");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn precedence_is_flag_env_default() {
        let default_dir = Path::new("/home/me/.notekeep/db");
        assert_eq!(
            resolve_connection(Some("memory:"), Some("/env/dir"), default_dir).expect("flag"),
            ConnectionString::Memory
        );
        assert_eq!(
            resolve_connection(None, Some("/env/dir"), default_dir).expect("env"),
            ConnectionString::collection("/env/dir")
        );
        assert_eq!(
            resolve_connection(None, Some("  "), default_dir).expect("blank env"),
            ConnectionString::collection(default_dir)
        );
        assert_eq!(
            resolve_connection(None, None, default_dir).expect("default"),
            ConnectionString::collection(default_dir)
        );
    }

    #[test]
    fn env_errors_name_the_variable() {
        let err = resolve_connection(None, Some("redis://x"), Path::new("/d")).expect_err("usage");
        assert!(err.message().expect("message").starts_with("NOTEKEEP_DB_URL:"));
    }
}
