//! Key/value settings store and the UI preferences persisted in it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{AppError, Result};
use crate::model::{Document, DocumentKind};

pub const KEY_SHOW_DUE: &str = "invoice-preview:showDueAmount";
pub const KEY_SHOW_PAID: &str = "invoice-preview:showPaidAmount";
pub const KEY_DOCUMENT_KIND: &str = "invoice:documentType";

pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

impl<S: SettingsStore + ?Sized> SettingsStore for &S {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.values
            .lock()
            .map_err(|_| AppError::Store("memory store mutex poisoned".to_string()))
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Settings persisted in the `app_meta` table of a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

/// Log form of a SQLite failure, e.g. `ConstraintViolation (extended 2067): UNIQUE constraint failed`.
fn describe_sqlite_error(err: &rusqlite::Error) -> String {
    let rusqlite::Error::SqliteFailure(failure, msg) = err else {
        return err.to_string();
    };
    format!(
        "{:?} (extended {}): {}",
        failure.code,
        failure.extended_code,
        msg.as_deref().unwrap_or("no message")
    )
}

fn configure_sqlite(conn: &Connection) -> std::result::Result<(), rusqlite::Error> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\n\
         PRAGMA synchronous = NORMAL;\n\
         PRAGMA temp_store = MEMORY;\n\
         PRAGMA busy_timeout = 5000;\n",
    )?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

fn init_schema(conn: &Connection) -> std::result::Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS app_meta (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        );
        "#,
    )
}

const SELECT_VALUE: &str = "SELECT value FROM app_meta WHERE key = ?1";
const UPSERT_VALUE: &str = "INSERT OR REPLACE INTO app_meta (key, value) VALUES (?1, ?2)";
const DELETE_VALUE: &str = "DELETE FROM app_meta WHERE key = ?1";

/// First existing database among the candidate directories, else the first candidate.
pub fn resolve_db_path(candidates: &[PathBuf], file_name: &str) -> Result<PathBuf> {
    for dir in candidates {
        let p = dir.join(file_name);
        if p.exists() {
            return Ok(p);
        }
    }
    candidates
        .first()
        .map(|d| d.join(file_name))
        .ok_or_else(|| AppError::Store("unable to resolve database path".to_string()))
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        configure_sqlite(&conn)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn with_conn<T, F>(&self, op_name: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, rusqlite::Error>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|_| AppError::Store("db mutex poisoned".to_string()))?;
        f(&guard).map_err(|e| {
            tracing::warn!(target: "sqlite", op = op_name, error = %describe_sqlite_error(&e), "query failed");
            AppError::Sqlite(e)
        })
    }
}

impl SettingsStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_conn("get", |conn| {
            let mut stmt = conn.prepare_cached(SELECT_VALUE)?;
            stmt.query_row(params![key], |row| row.get::<_, String>(0)).optional()
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn("set", |conn| conn.prepare_cached(UPSERT_VALUE)?.execute(params![key, value]).map(drop))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_conn("remove", |conn| conn.prepare_cached(DELETE_VALUE)?.execute(params![key]).map(drop))
    }
}

/// Reads a key, treating an unavailable store as "no value".
pub(crate) fn read_or_none<S: SettingsStore + ?Sized>(store: &S, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(target: "settings", key, error = %e, "settings read failed; using default");
            None
        }
    }
}

/// Writes a key, treating an unavailable store as a no-op.
pub(crate) fn write_or_skip<S: SettingsStore + ?Sized>(store: &S, key: &str, value: &str) {
    if let Err(e) = store.set(key, value) {
        tracing::warn!(target: "settings", key, error = %e, "settings write failed; change not persisted");
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

fn flag_str(v: bool) -> &'static str {
    if v { "1" } else { "0" }
}

/// Preview preferences that outlive the edited document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preferences {
    pub show_due_amount: bool,
    pub show_paid_amount: bool,
    pub document_kind: DocumentKind,
}

impl Preferences {
    /// Reads stored preferences; missing or unreadable keys fall back to the document's flags.
    pub fn load<S: SettingsStore + ?Sized>(store: &S, doc: &Document) -> Self {
        let show_due_amount = read_or_none(store, KEY_SHOW_DUE)
            .as_deref()
            .and_then(parse_flag)
            .unwrap_or(doc.show_due_amount);
        let show_paid_amount = read_or_none(store, KEY_SHOW_PAID)
            .as_deref()
            .and_then(parse_flag)
            .unwrap_or(doc.show_paid_amount);
        let document_kind = read_or_none(store, KEY_DOCUMENT_KIND)
            .as_deref()
            .and_then(DocumentKind::parse)
            .unwrap_or_default();
        Self { show_due_amount, show_paid_amount, document_kind }
    }

    pub fn save_show_due<S: SettingsStore + ?Sized>(&mut self, store: &S, v: bool) {
        self.show_due_amount = v;
        write_or_skip(store, KEY_SHOW_DUE, flag_str(v));
    }

    pub fn save_show_paid<S: SettingsStore + ?Sized>(&mut self, store: &S, v: bool) {
        self.show_paid_amount = v;
        write_or_skip(store, KEY_SHOW_PAID, flag_str(v));
    }

    pub fn save_document_kind<S: SettingsStore + ?Sized>(&mut self, store: &S, kind: DocumentKind) {
        self.document_kind = kind;
        write_or_skip(store, KEY_DOCUMENT_KIND, kind.as_str());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A store whose backend is gone, like storage disabled in a private window.
    pub(crate) struct BrokenStore;

    impl SettingsStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(AppError::Store("unavailable".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(AppError::Store("unavailable".to_string()))
        }

        fn remove(&self, _key: &str) -> Result<()> {
            Err(AppError::Store("unavailable".to_string()))
        }
    }

    #[test]
    fn sqlite_store_roundtrips_and_upserts() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "a").unwrap();
        store.set("k", "b").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("b"));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn sqlite_failures_are_described_with_codes() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(2067),
            Some("UNIQUE constraint failed: app_meta.key".to_string()),
        );
        assert_eq!(
            describe_sqlite_error(&err),
            "ConstraintViolation (extended 2067): UNIQUE constraint failed: app_meta.key"
        );
        let bare = rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(5), None);
        assert_eq!(describe_sqlite_error(&bare), "DatabaseBusy (extended 5): no message");
        assert_eq!(describe_sqlite_error(&rusqlite::Error::QueryReturnedNoRows), "Query returned no rows");
    }

    #[test]
    fn preferences_default_to_document_flags() {
        let store = MemoryStore::new();
        let mut doc = Document::sample();
        doc.show_paid_amount = false;
        let prefs = Preferences::load(&store, &doc);
        assert!(prefs.show_due_amount);
        assert!(!prefs.show_paid_amount);
        assert_eq!(prefs.document_kind, DocumentKind::Invoice);
    }

    #[test]
    fn preferences_persist_on_change() {
        let store = SqliteStore::open_in_memory().unwrap();
        let doc = Document::sample();
        let mut prefs = Preferences::load(&store, &doc);
        prefs.save_show_due(&store, false);
        prefs.save_document_kind(&store, DocumentKind::Quotation);

        assert_eq!(store.get(KEY_SHOW_DUE).unwrap().as_deref(), Some("0"));
        let reloaded = Preferences::load(&store, &doc);
        assert!(!reloaded.show_due_amount);
        assert!(reloaded.show_paid_amount);
        assert_eq!(reloaded.document_kind, DocumentKind::Quotation);
    }

    #[test]
    fn unavailable_store_degrades_to_defaults() {
        let doc = Document::sample();
        let mut prefs = Preferences::load(&BrokenStore, &doc);
        assert!(prefs.show_due_amount);
        prefs.save_show_paid(&BrokenStore, false);
        assert!(!prefs.show_paid_amount);
    }

    #[test]
    fn db_path_prefers_existing_file() {
        let base = std::env::temp_dir().join(format!("invoice-builder-test-{}", uuid::Uuid::new_v4()));
        let a = base.join("a");
        let b = base.join("b");
        std::fs::create_dir_all(&b).unwrap();
        std::fs::write(b.join("settings.db"), b"").unwrap();

        let resolved = resolve_db_path(&[a.clone(), b.clone()], "settings.db").unwrap();
        assert_eq!(resolved, b.join("settings.db"));
        std::fs::remove_dir_all(&base).unwrap();

        assert_eq!(resolve_db_path(&[a.clone()], "settings.db").unwrap(), a.join("settings.db"));
        assert!(resolve_db_path(&[], "settings.db").is_err());
    }
}
