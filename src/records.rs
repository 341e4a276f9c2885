//! Image records and the repositories that persist them.
//!
//! A record is the metadata half of an uploaded image: who owns it, the
//! server-generated stored filename shared by the original and all of its
//! derivatives, and the display name the client sent. The set of derivatives
//! is deliberately *not* part of the record; see [`crate::discovery`].
//!
//! Two repositories are provided:
//!
//! - [`MemoryRepository`]: a mutex-guarded map, for tests and embedding.
//! - [`SqliteRepository`]: a SQLite database file, safe to share between
//!   processes. A missing file is created with the current schema.
//!
//! Both enforce uniqueness of `(owner, stored_filename)`.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Database schema version {0} is newer than this build supports")]
    UnsupportedSchema(i64),
    #[error("Image {owner}/{filename} already exists")]
    Duplicate { owner: Owner, filename: String },
    #[error("Repository lock poisoned")]
    Poisoned,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid owner name '{0}'")]
pub struct InvalidOwner(pub String);

/// Identity under which images are namespaced.
///
/// Rendered verbatim into filesystem paths and URLs, so only values that are
/// a single safe path segment are accepted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Owner(String);

impl Owner {
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidOwner> {
        let name = name.into();
        let bad = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0']);
        if bad {
            return Err(InvalidOwner(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Owner {
    type Error = InvalidOwner;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Owner::new(value)
    }
}

impl From<Owner> for String {
    fn from(owner: Owner) -> Self {
        owner.0
    }
}

/// Metadata for one uploaded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub owner: Owner,
    /// Server-generated `{32 hex}.{format}`; never derived from user input.
    pub stored_filename: String,
    /// Client-supplied name, for display only.
    pub original_filename: String,
    pub upload_time: DateTime<Utc>,
    /// SHA-256 of the original bytes, lowercase hex.
    pub checksum: String,
    /// Size of the original file in bytes.
    pub file_size: u64,
}

/// Fields the repository needs to create a record; it stamps `upload_time`.
#[derive(Debug, Clone)]
pub struct NewImage<'a> {
    pub owner: &'a Owner,
    pub stored_filename: &'a str,
    pub original_filename: &'a str,
    pub checksum: &'a str,
    pub file_size: u64,
}

/// CRUD access to image records.
pub trait ImageRepository: Send + Sync {
    /// Insert a record. Fails with [`RepositoryError::Duplicate`] if the
    /// `(owner, stored_filename)` pair is taken.
    fn create(&self, new: NewImage<'_>) -> Result<ImageRecord, RepositoryError>;

    fn find(&self, owner: &Owner, stored_filename: &str)
    -> Result<Option<ImageRecord>, RepositoryError>;

    /// Remove a record. Returns `false` if it was already gone.
    fn delete(&self, record: &ImageRecord) -> Result<bool, RepositoryError>;

    /// All records of an owner, newest upload first.
    fn list(&self, owner: &Owner) -> Result<Vec<ImageRecord>, RepositoryError>;
}

type RecordKey = (Owner, String);

/// Record table behind [`MemoryRepository`].
#[derive(Debug, Default)]
struct RecordTable {
    records: BTreeMap<RecordKey, ImageRecord>,
}

impl RecordTable {
    fn insert(&mut self, new: NewImage<'_>) -> Result<ImageRecord, RepositoryError> {
        let key = (new.owner.clone(), new.stored_filename.to_string());
        if self.records.contains_key(&key) {
            return Err(RepositoryError::Duplicate {
                owner: new.owner.clone(),
                filename: new.stored_filename.to_string(),
            });
        }
        let record = ImageRecord {
            owner: new.owner.clone(),
            stored_filename: new.stored_filename.to_string(),
            original_filename: new.original_filename.to_string(),
            upload_time: Utc::now(),
            checksum: new.checksum.to_string(),
            file_size: new.file_size,
        };
        self.records.insert(key, record.clone());
        Ok(record)
    }

    fn get(&self, owner: &Owner, stored_filename: &str) -> Option<ImageRecord> {
        self.records
            .get(&(owner.clone(), stored_filename.to_string()))
            .cloned()
    }

    fn remove(&mut self, record: &ImageRecord) -> bool {
        self.records
            .remove(&(record.owner.clone(), record.stored_filename.clone()))
            .is_some()
    }

    fn for_owner(&self, owner: &Owner) -> Vec<ImageRecord> {
        let mut records: Vec<ImageRecord> = self
            .records
            .values()
            .filter(|r| &r.owner == owner)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.upload_time
                .cmp(&a.upload_time)
                .then_with(|| a.stored_filename.cmp(&b.stored_filename))
        });
        records
    }
}

fn lock(table: &Mutex<RecordTable>) -> Result<MutexGuard<'_, RecordTable>, RepositoryError> {
    table.lock().map_err(|_| RepositoryError::Poisoned)
}

/// In-memory repository.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    table: Mutex<RecordTable>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ImageRepository for MemoryRepository {
    fn create(&self, new: NewImage<'_>) -> Result<ImageRecord, RepositoryError> {
        lock(&self.table)?.insert(new)
    }

    fn find(
        &self,
        owner: &Owner,
        stored_filename: &str,
    ) -> Result<Option<ImageRecord>, RepositoryError> {
        Ok(lock(&self.table)?.get(owner, stored_filename))
    }

    fn delete(&self, record: &ImageRecord) -> Result<bool, RepositoryError> {
        Ok(lock(&self.table)?.remove(record))
    }

    fn list(&self, owner: &Owner) -> Result<Vec<ImageRecord>, RepositoryError> {
        Ok(lock(&self.table)?.for_owner(owner))
    }
}

/// Embedded schema migrations, applied in order and tracked in
/// `schema_migrations`.
const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    "CREATE TABLE IF NOT EXISTS images (
        owner             TEXT    NOT NULL,
        stored_filename   TEXT    NOT NULL,
        original_filename TEXT    NOT NULL,
        upload_time       INTEGER NOT NULL,
        checksum          TEXT    NOT NULL,
        file_size         INTEGER NOT NULL,
        UNIQUE (owner, stored_filename)
    );
    CREATE INDEX IF NOT EXISTS idx_images_owner_time ON images (owner, upload_time);",
)];

const COLS: &str = "owner, stored_filename, original_filename, upload_time, checksum, file_size";

/// How long a writer waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Repository persisted in a SQLite database file.
///
/// Every mutation is a single statement against the file, so several
/// processes can share one database: uniqueness of `(owner, stored_filename)`
/// is enforced by the schema, not by an in-process copy of the table.
#[derive(Debug)]
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open (or create) the database at `path` and apply pending migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::with_connection(conn)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, RepositoryError> {
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn.lock().map_err(|_| RepositoryError::Poisoned)
    }
}

fn run_migrations(conn: &Connection) -> Result<(), RepositoryError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
            [version],
            |row| row.get(0),
        )?;
        if already {
            continue;
        }

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT OR IGNORE INTO schema_migrations (version) VALUES (?1)",
            [version],
        )?;
        tx.commit()?;
    }

    let newest: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;
    let known = MIGRATIONS.last().map(|&(v, _)| v);
    if newest > known {
        return Err(RepositoryError::UnsupportedSchema(newest.unwrap_or_default()));
    }
    Ok(())
}

impl ImageRecord {
    /// Build a record from a row selected with [`COLS`].
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let owner: String = row.get(0)?;
        let owner = Owner::new(owner).map_err(|e| conversion_error(0, Type::Text, e))?;
        let micros: i64 = row.get(3)?;
        let upload_time = DateTime::from_timestamp_micros(micros).ok_or_else(|| {
            let err = io::Error::new(io::ErrorKind::InvalidData, format!("timestamp {micros}"));
            conversion_error(3, Type::Integer, err)
        })?;
        let file_size: i64 = row.get(5)?;
        Ok(Self {
            owner,
            stored_filename: row.get(1)?,
            original_filename: row.get(2)?,
            upload_time,
            checksum: row.get(4)?,
            file_size: u64::try_from(file_size)
                .map_err(|e| conversion_error(5, Type::Integer, e))?,
        })
    }
}

fn conversion_error(
    idx: usize,
    ty: Type,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl ImageRepository for SqliteRepository {
    fn create(&self, new: NewImage<'_>) -> Result<ImageRecord, RepositoryError> {
        // Stored at microsecond precision; the returned record matches what
        // a later `find` reads back.
        let micros = Utc::now().timestamp_micros();
        let upload_time = DateTime::from_timestamp_micros(micros).unwrap_or_else(Utc::now);
        let file_size = i64::try_from(new.file_size).map_err(|_| {
            RepositoryError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("file size {} out of range", new.file_size),
            ))
        })?;

        let inserted = self.conn()?.execute(
            &format!("INSERT INTO images ({COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                new.owner.as_str(),
                new.stored_filename,
                new.original_filename,
                micros,
                new.checksum,
                file_size,
            ],
        );
        match inserted {
            Ok(_) => Ok(ImageRecord {
                owner: new.owner.clone(),
                stored_filename: new.stored_filename.to_string(),
                original_filename: new.original_filename.to_string(),
                upload_time,
                checksum: new.checksum.to_string(),
                file_size: new.file_size,
            }),
            Err(e) if is_unique_violation(&e) => Err(RepositoryError::Duplicate {
                owner: new.owner.clone(),
                filename: new.stored_filename.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn find(
        &self,
        owner: &Owner,
        stored_filename: &str,
    ) -> Result<Option<ImageRecord>, RepositoryError> {
        let record = self
            .conn()?
            .query_row(
                &format!("SELECT {COLS} FROM images WHERE owner = ?1 AND stored_filename = ?2"),
                params![owner.as_str(), stored_filename],
                ImageRecord::from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn delete(&self, record: &ImageRecord) -> Result<bool, RepositoryError> {
        let n = self.conn()?.execute(
            "DELETE FROM images WHERE owner = ?1 AND stored_filename = ?2",
            params![record.owner.as_str(), record.stored_filename],
        )?;
        Ok(n > 0)
    }

    fn list(&self, owner: &Owner) -> Result<Vec<ImageRecord>, RepositoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLS} FROM images WHERE owner = ?1
             ORDER BY upload_time DESC, stored_filename ASC"
        ))?;
        let rows = stmt
            .query_map([owner.as_str()], ImageRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn alice() -> Owner {
        Owner::new("alice").unwrap()
    }

    fn new_image<'a>(owner: &'a Owner, filename: &'a str) -> NewImage<'a> {
        NewImage {
            owner,
            stored_filename: filename,
            original_filename: "holiday.jpg",
            checksum: "abc",
            file_size: 42,
        }
    }

    // =========================================================================
    // Owner
    // =========================================================================

    #[test]
    fn owner_accepts_plain_names() {
        assert_eq!(Owner::new("alice").unwrap().as_str(), "alice");
        assert_eq!(Owner::new("user.42").unwrap().to_string(), "user.42");
    }

    #[test]
    fn owner_rejects_path_like_names() {
        for bad in ["", ".", "..", "a/b", "a\\b", "../etc"] {
            assert!(Owner::new(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn owner_deserialize_validates() {
        assert!(serde_json::from_str::<Owner>("\"bob\"").is_ok());
        assert!(serde_json::from_str::<Owner>("\"..\"").is_err());
    }

    // =========================================================================
    // MemoryRepository
    // =========================================================================

    #[test]
    fn create_then_find() {
        let repo = MemoryRepository::new();
        let owner = alice();
        let created = repo.create(new_image(&owner, "a.png")).unwrap();
        assert_eq!(created.original_filename, "holiday.jpg");
        assert_eq!(created.file_size, 42);

        let found = repo.find(&owner, "a.png").unwrap();
        assert_eq!(found, Some(created));
    }

    #[test]
    fn find_is_scoped_by_owner() {
        let repo = MemoryRepository::new();
        let owner = alice();
        repo.create(new_image(&owner, "a.png")).unwrap();

        let bob = Owner::new("bob").unwrap();
        assert_eq!(repo.find(&bob, "a.png").unwrap(), None);
    }

    #[test]
    fn create_rejects_duplicate_pair() {
        let repo = MemoryRepository::new();
        let owner = alice();
        repo.create(new_image(&owner, "a.png")).unwrap();
        let result = repo.create(new_image(&owner, "a.png"));
        assert!(matches!(result, Err(RepositoryError::Duplicate { .. })));

        // Same filename under another owner is fine.
        let bob = Owner::new("bob").unwrap();
        assert!(repo.create(new_image(&bob, "a.png")).is_ok());
    }

    #[test]
    fn delete_reports_whether_removed() {
        let repo = MemoryRepository::new();
        let owner = alice();
        let record = repo.create(new_image(&owner, "a.png")).unwrap();
        assert!(repo.delete(&record).unwrap());
        assert!(!repo.delete(&record).unwrap());
        assert_eq!(repo.find(&owner, "a.png").unwrap(), None);
    }

    #[test]
    fn list_is_newest_first_and_owner_scoped() {
        let repo = MemoryRepository::new();
        let owner = alice();
        repo.create(new_image(&owner, "first.png")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        repo.create(new_image(&owner, "second.png")).unwrap();
        let bob = Owner::new("bob").unwrap();
        repo.create(new_image(&bob, "other.png")).unwrap();

        let names: Vec<String> = repo
            .list(&owner)
            .unwrap()
            .into_iter()
            .map(|r| r.stored_filename)
            .collect();
        assert_eq!(names, ["second.png", "first.png"]);
    }

    // =========================================================================
    // SqliteRepository
    // =========================================================================

    #[test]
    fn sqlite_missing_file_opens_empty() {
        let tmp = TempDir::new().unwrap();
        let repo = SqliteRepository::open(tmp.path().join("images.db")).unwrap();
        assert!(repo.list(&alice()).unwrap().is_empty());
    }

    #[test]
    fn sqlite_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/images.db");
        let owner = alice();

        let repo = SqliteRepository::open(&path).unwrap();
        let record = repo.create(new_image(&owner, "a.png")).unwrap();
        drop(repo);

        let reopened = SqliteRepository::open(&path).unwrap();
        assert_eq!(reopened.find(&owner, "a.png").unwrap(), Some(record.clone()));

        assert!(reopened.delete(&record).unwrap());
        assert!(!reopened.delete(&record).unwrap());
        let again = SqliteRepository::open(&path).unwrap();
        assert_eq!(again.find(&owner, "a.png").unwrap(), None);
    }

    #[test]
    fn sqlite_handles_share_one_database() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("images.db");
        let owner = alice();

        let a = SqliteRepository::open(&path).unwrap();
        let b = SqliteRepository::open(&path).unwrap();
        a.create(new_image(&owner, "a.png")).unwrap();
        b.create(new_image(&owner, "b.png")).unwrap();

        let mut names: Vec<String> = SqliteRepository::open(&path)
            .unwrap()
            .list(&owner)
            .unwrap()
            .into_iter()
            .map(|r| r.stored_filename)
            .collect();
        names.sort();
        assert_eq!(names, ["a.png", "b.png"]);

        // A name taken through one handle is a duplicate through the other.
        let result = b.create(new_image(&owner, "a.png"));
        assert!(matches!(result, Err(RepositoryError::Duplicate { .. })));
    }

    #[test]
    fn sqlite_concurrent_creates_keep_every_record() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("images.db");
        SqliteRepository::open(&path).unwrap();

        std::thread::scope(|scope| {
            for t in 0..4 {
                let path = &path;
                scope.spawn(move || {
                    let repo = SqliteRepository::open(path).unwrap();
                    let owner = alice();
                    for i in 0..10 {
                        let name = format!("{t}-{i}.png");
                        repo.create(new_image(&owner, &name)).unwrap();
                    }
                });
            }
        });

        let repo = SqliteRepository::open(&path).unwrap();
        assert_eq!(repo.list(&alice()).unwrap().len(), 40);
    }

    #[test]
    fn sqlite_list_is_newest_first_and_owner_scoped() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let owner = alice();
        repo.create(new_image(&owner, "first.png")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        repo.create(new_image(&owner, "second.png")).unwrap();
        let bob = Owner::new("bob").unwrap();
        repo.create(new_image(&bob, "other.png")).unwrap();

        let names: Vec<String> = repo
            .list(&owner)
            .unwrap()
            .into_iter()
            .map(|r| r.stored_filename)
            .collect();
        assert_eq!(names, ["second.png", "first.png"]);
    }

    #[test]
    fn sqlite_rejects_newer_schema() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("images.db");
        SqliteRepository::open(&path).unwrap();
        Connection::open(&path)
            .unwrap()
            .execute("INSERT INTO schema_migrations (version) VALUES (99)", [])
            .unwrap();
        assert!(matches!(
            SqliteRepository::open(&path),
            Err(RepositoryError::UnsupportedSchema(99))
        ));
    }

    #[test]
    fn sqlite_non_database_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("images.db");
        std::fs::write(&path, "definitely not sqlite, padded to look like a header").unwrap();
        assert!(matches!(
            SqliteRepository::open(&path),
            Err(RepositoryError::Database(_))
        ));
    }
}
