//! Audio archive storage with SQLite.
//!
//! Rows are scoped by username. Users are created lazily by every write
//! path and by [`ArchiveStore::exists`]; nothing in the bot deletes them.
//! Each stored item also carries a random UUID handle so inline buttons can
//! reference it without exposing row ids.

mod schema;

use crate::media::Audio;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};

pub use schema::SCHEMA;

/// Errors produced by the archive store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An SQLite statement failed.
    #[error("failed to {operation}: {source}")]
    Persistence {
        /// What the store was doing.
        operation: &'static str,
        /// Underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },
    /// No stored audio carries the requested handle.
    #[error("no stored audio with handle {handle}")]
    NotFound {
        /// The unknown handle.
        handle: String,
    },
    /// The database directory could not be created.
    #[error("failed to create storage directory {path}: {source}")]
    Directory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// A previous holder of the connection panicked.
    #[error("storage connection lock poisoned")]
    LockPoisoned,
}

/// Shorthand for results returned by the store.
pub type StorageResult<T> = Result<T, StorageError>;

trait PersistenceContext<T> {
    fn during(self, operation: &'static str) -> StorageResult<T>;
}

impl<T> PersistenceContext<T> for rusqlite::Result<T> {
    fn during(self, operation: &'static str) -> StorageResult<T> {
        self.map_err(|source| StorageError::Persistence { operation, source })
    }
}

/// An archived audio item as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAudio {
    /// Source URL
    pub url: String,
    /// Title at extraction time
    pub title: String,
    /// Audio payload
    pub data: Vec<u8>,
    /// Retrieval handle issued at save time
    pub uuid: String,
}

/// User-scoped audio archive over a single SQLite connection.
pub struct ArchiveStore {
    conn: Mutex<Connection>,
}

impl ArchiveStore {
    /// Open (or create) the archive database at `path`.
    ///
    /// Creates the parent directory if needed. Call [`Self::ensure_schema`]
    /// before use.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or the database cannot be opened.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path).during("open database")?;
        info!(path = %path.display(), "Opened audio archive");
        Self::with_connection(conn)
    }

    /// Open a private in-memory archive.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory().during("open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        // Cascading deletes depend on this; SQLite disables it per connection by default
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .during("enable foreign keys")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Create the `users` and `audios` tables if they do not exist.
    ///
    /// Safe to call on every start.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema statements fail.
    pub fn ensure_schema(&self) -> StorageResult<()> {
        self.conn()?
            .execute_batch(SCHEMA)
            .during("create schema")
    }

    /// Whether `username` already archived `url`.
    ///
    /// Creates the user row when the username has not been seen before.
    ///
    /// # Errors
    ///
    /// Returns an error if the user lookup/creation or the count query fails.
    pub fn exists(&self, url: &str, username: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let user_id = get_or_create_user(&conn, username)?;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM audios WHERE url = ? AND user_id = ?",
                params![url, user_id],
                |row| row.get(0),
            )
            .during("check archived url")?;

        Ok(count > 0)
    }

    /// Insert `audio` for `username` under the retrieval handle `uuid`.
    ///
    /// Does not de-duplicate; call [`Self::exists`] first.
    ///
    /// # Errors
    ///
    /// Returns an error if the user cannot be resolved or the insert fails.
    pub fn save(&self, audio: &Audio, username: &str, uuid: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        let user_id = get_or_create_user(&conn, username)?;

        conn.execute(
            "INSERT INTO audios (url, data, title, uuid, user_id) VALUES (?, ?, ?, ?, ?)",
            params![audio.url, audio.data, audio.title, uuid, user_id],
        )
        .during("save audio")?;

        debug!(username = %username, title = %audio.title, uuid = %uuid, "Saved audio");
        Ok(())
    }

    /// Delete every item titled `title` owned by `username`.
    ///
    /// Returns the number of removed rows; zero is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the user cannot be resolved or the delete fails.
    pub fn remove(&self, title: &str, username: &str) -> StorageResult<usize> {
        let conn = self.conn()?;
        let user_id = get_or_create_user(&conn, username)?;

        let removed = conn
            .execute(
                "DELETE FROM audios WHERE user_id = ? AND title = ?",
                params![user_id, title],
            )
            .during("remove audio")?;

        debug!(username = %username, title = %title, removed, "Removed audio");
        Ok(removed)
    }

    /// Resolve a handle to the stored title and its owner's username.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] for an unknown handle.
    pub fn lookup_by_handle(&self, uuid: &str) -> StorageResult<(String, String)> {
        let conn = self.conn()?;

        let (title, user_id): (String, i64) = match conn.query_row(
            "SELECT title, user_id FROM audios WHERE uuid = ?",
            params![uuid],
            |row| Ok((row.get(0)?, row.get(1)?)),
        ) {
            Ok(found) => found,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(StorageError::NotFound {
                    handle: uuid.to_string(),
                })
            }
            Err(e) => return Err(e).during("look up title by handle"),
        };

        let username: String = conn
            .query_row(
                "SELECT username FROM users WHERE id = ?",
                params![user_id],
                |row| row.get(0),
            )
            .during("look up username by user id")?;

        Ok((title, username))
    }

    /// Fetch the full stored item behind a handle.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] for an unknown handle.
    pub fn audio_by_handle(&self, uuid: &str) -> StorageResult<StoredAudio> {
        let conn = self.conn()?;

        match conn.query_row(
            "SELECT url, data, title, uuid FROM audios WHERE uuid = ?",
            params![uuid],
            map_stored_audio,
        ) {
            Ok(audio) => Ok(audio),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(StorageError::NotFound {
                handle: uuid.to_string(),
            }),
            Err(e) => Err(e).during("fetch audio by handle"),
        }
    }

    /// All items archived by `username`, in storage order.
    ///
    /// Unknown users get an empty list; no user row is created.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn playlist(&self, username: &str) -> StorageResult<Vec<StoredAudio>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT a.url, a.data, a.title, a.uuid FROM audios a
                 JOIN users u ON a.user_id = u.id
                 WHERE u.username = ?
                 ORDER BY a.id",
            )
            .during("prepare playlist query")?;

        let rows = stmt
            .query_map(params![username], map_stored_audio)
            .during("query playlist")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .during("read playlist row")
    }

    /// Id of `username`, without creating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_user(&self, username: &str) -> StorageResult<Option<i64>> {
        let conn = self.conn()?;
        find_user_id(&conn, username)
    }

    /// Remove a user row; their archived audio goes with it.
    ///
    /// Administrative path, not reachable from chat. Returns whether a row
    /// was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_user(&self, username: &str) -> StorageResult<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM users WHERE username = ?", params![username])
            .during("delete user")?;

        if removed > 0 {
            info!(username = %username, "Deleted user and archived audio");
        }
        Ok(removed > 0)
    }
}

fn map_stored_audio(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredAudio> {
    Ok(StoredAudio {
        url: row.get(0)?,
        data: row.get(1)?,
        title: row.get(2)?,
        uuid: row.get(3)?,
    })
}

fn find_user_id(conn: &Connection, username: &str) -> StorageResult<Option<i64>> {
    match conn.query_row(
        "SELECT id FROM users WHERE username = ?",
        params![username],
        |row| row.get(0),
    ) {
        Ok(id) => Ok(Some(id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).during("look up user"),
    }
}

fn get_or_create_user(conn: &Connection, username: &str) -> StorageResult<i64> {
    if let Some(id) = find_user_id(conn, username)? {
        return Ok(id);
    }

    debug!(username = %username, "Creating user");
    conn.execute(
        "INSERT INTO users (username) VALUES (?)",
        params![username],
    )
    .during("create user")?;

    Ok(conn.last_insert_rowid())
}
