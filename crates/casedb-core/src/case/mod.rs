//! The case database: connection, single-user lock, transactions and managers

pub(crate) mod content;
mod reader;
mod transaction;

pub use content::{NewFileSystem, NewImage};
pub use reader::MAX_READ_ALL_SIZE;
pub use transaction::CaseDbTransaction;

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::blackboard::Blackboard;
use crate::communications::CommunicationsManager;
use crate::config::CaseDbConfig;
use crate::error::{CaseDbError, Result};
use crate::events::{CaseEvent, EventBus};
use crate::host_address::HostAddressManager;
use crate::hosts::HostManager;
use crate::native::{HandleCache, NativeBackend, RawImageBackend};
use crate::os_accounts::{OsAccountManager, OsAccountRealmManager};
use crate::persons::PersonManager;
use crate::schema;
use crate::scoring::ScoringManager;
use crate::tagging::TaggingManager;
use crate::timeline::TimelineManager;

/// A forensic case database.
///
/// All access goes through one SQLite connection guarded by a mutex, which
/// acts as the single-user case lock. Managers borrow the case and take the
/// lock per call.
pub struct CaseDatabase {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    config: CaseDbConfig,
    handles: HandleCache,
    events: EventBus,
}

impl CaseDatabase {
    /// Create a new case at `path` with the raw image backend
    pub fn new_case(path: impl AsRef<Path>, config: CaseDbConfig) -> Result<Self> {
        Self::new_case_with_backend(path, config, Arc::new(RawImageBackend::new()))
    }

    pub fn new_case_with_backend(
        path: impl AsRef<Path>,
        config: CaseDbConfig,
        backend: Arc<dyn NativeBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let db_path = path.as_ref().to_path_buf();
        if db_path.exists() {
            return Err(CaseDbError::data(format!(
                "case database already exists at {}",
                db_path.display()
            )));
        }
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        schema::initialize(&conn)?;

        let case_uuid = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT OR REPLACE INTO tsk_db_info_extended (name, value) VALUES ('CASE_UUID', ?1)",
            params![case_uuid],
        )?;
        conn.execute(
            "INSERT OR REPLACE INTO tsk_db_info_extended (name, value) VALUES ('CREATED_WITH', ?1)",
            params![backend.version()],
        )?;

        tracing::info!("Created case database {} ({})", db_path.display(), case_uuid);
        Ok(Self::from_parts(conn, db_path, config, backend))
    }

    /// Open an existing case with the raw image backend
    pub fn open_case(path: impl AsRef<Path>, config: CaseDbConfig) -> Result<Self> {
        Self::open_case_with_backend(path, config, Arc::new(RawImageBackend::new()))
    }

    pub fn open_case_with_backend(
        path: impl AsRef<Path>,
        config: CaseDbConfig,
        backend: Arc<dyn NativeBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let db_path = path.as_ref().to_path_buf();
        if !db_path.exists() {
            return Err(CaseDbError::not_found(format!(
                "no case database at {}",
                db_path.display()
            )));
        }

        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let (major, minor) = schema::schema_version(&conn)?;
        if major > schema::SCHEMA_MAJOR_VERSION {
            return Err(CaseDbError::core(format!(
                "case schema {}.{} is newer than supported {}.{}",
                major,
                minor,
                schema::SCHEMA_MAJOR_VERSION,
                schema::SCHEMA_MINOR_VERSION
            )));
        }
        // Older cases get any tables they are missing
        schema::initialize(&conn)?;

        tracing::info!("Opened case database {} (schema {}.{})", db_path.display(), major, minor);
        Ok(Self::from_parts(conn, db_path, config, backend))
    }

    fn from_parts(
        conn: Connection,
        db_path: PathBuf,
        config: CaseDbConfig,
        backend: Arc<dyn NativeBackend>,
    ) -> Self {
        let handles = HandleCache::new(backend, config.handle_cache_capacity);
        Self {
            conn: Mutex::new(conn),
            db_path,
            config,
            handles,
            events: EventBus::new(),
        }
    }

    /// Release native handles. The connection closes when the case drops.
    pub fn close(&self) -> Result<()> {
        self.handles.clear()?;
        tracing::info!("Closed case {}", self.db_path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn config(&self) -> &CaseDbConfig {
        &self.config
    }

    pub fn handle_cache(&self) -> &HandleCache {
        &self.handles
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Register a callback for case events
    pub fn subscribe(&self, callback: impl Fn(&CaseEvent) + Send + Sync + 'static) {
        self.events.subscribe(callback);
    }

    /// Acquire the case lock for a read or a single statement
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CaseDbError::core("case database lock poisoned"))
    }

    /// Acquire the case lock and begin a transaction
    pub fn begin_transaction(&self) -> Result<CaseDbTransaction<'_>> {
        CaseDbTransaction::begin(self.connection()?, &self.events)
    }

    /// Run `f` in a transaction, committing on success and rolling back on error
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&mut CaseDbTransaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut trans = self.begin_transaction()?;
        match f(&mut trans) {
            Ok(value) => {
                trans.commit()?;
                Ok(value)
            }
            Err(e) => {
                trans.rollback()?;
                Err(e)
            }
        }
    }

    /// Value stored in `tsk_db_info_extended`
    pub fn get_info_value(&self, name: &str) -> Result<Option<String>> {
        let conn = self.connection()?;
        Ok(conn
            .query_row(
                "SELECT value FROM tsk_db_info_extended WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn case_uuid(&self) -> Result<String> {
        self.get_info_value("CASE_UUID")?
            .ok_or_else(|| CaseDbError::core("case has no CASE_UUID"))
    }

    pub fn schema_version(&self) -> Result<(i32, i32)> {
        schema::schema_version(&*self.connection()?)
    }

    pub fn blackboard(&self) -> Blackboard<'_> {
        Blackboard::new(self)
    }

    pub fn hosts(&self) -> HostManager<'_> {
        HostManager::new(self)
    }

    pub fn host_addresses(&self) -> HostAddressManager<'_> {
        HostAddressManager::new(self)
    }

    pub fn persons(&self) -> PersonManager<'_> {
        PersonManager::new(self)
    }

    pub fn communications(&self) -> CommunicationsManager<'_> {
        CommunicationsManager::new(self)
    }

    pub fn timeline(&self) -> TimelineManager<'_> {
        TimelineManager::new(self)
    }

    pub fn scoring(&self) -> ScoringManager<'_> {
        ScoringManager::new(self)
    }

    pub fn tagging(&self) -> TaggingManager<'_> {
        TaggingManager::new(self)
    }

    pub fn os_account_realms(&self) -> OsAccountRealmManager<'_> {
        OsAccountRealmManager::new(self)
    }

    pub fn os_accounts(&self) -> OsAccountManager<'_> {
        OsAccountManager::new(self)
    }
}

impl Drop for CaseDatabase {
    fn drop(&mut self) {
        if let Err(e) = self.handles.clear() {
            tracing::warn!("Failed to release handles for {}: {}", self.db_path.display(), e);
        }
    }
}

/// Comma separated list for `IN (...)` clauses
pub(crate) fn id_list(ids: &[i64]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// A new empty case in a temp dir; keep the dir alive for the test
    pub fn create_test_case() -> (TempDir, CaseDatabase) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = CaseDbConfig::default();
        config.examiner_login = "tester".to_string();
        let case = CaseDatabase::new_case(temp_dir.path().join("case.db"), config).unwrap();
        (temp_dir, case)
    }

    /// Add an image row without touching the native backend
    pub fn add_test_image(case: &CaseDatabase, name: &str) -> i64 {
        case.add_image(NewImage::new(vec![PathBuf::from(format!("/evidence/{}", name))]))
            .unwrap()
            .id
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn test_new_and_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cases").join("case.db");

        let uuid = {
            let case = CaseDatabase::new_case(&path, CaseDbConfig::default()).unwrap();
            case.case_uuid().unwrap()
        };

        let case = CaseDatabase::open_case(&path, CaseDbConfig::default()).unwrap();
        assert_eq!(case.case_uuid().unwrap(), uuid);
        assert_eq!(case.schema_version().unwrap(), (9, 0));
    }

    #[test]
    fn test_new_case_refuses_existing_file() {
        let (temp_dir, _case) = create_test_case();
        let err = CaseDatabase::new_case(temp_dir.path().join("case.db"), CaseDbConfig::default())
            .err()
            .unwrap();
        assert!(err.is_data_error());
    }

    #[test]
    fn test_invalid_config_refused() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("case.db");

        let mut config = CaseDbConfig::default();
        config.sector_size = 0;
        let err = CaseDatabase::new_case(&path, config).err().unwrap();
        assert!(matches!(err, CaseDbError::InvalidArgument(_)));
        assert!(!path.exists());

        let mut config = CaseDbConfig::default();
        config.sector_size = 1000;
        assert!(CaseDatabase::new_case(&path, config).is_err());

        drop(CaseDatabase::new_case(&path, CaseDbConfig::default()).unwrap());
        let mut config = CaseDbConfig::default();
        config.handle_cache_capacity = 0;
        let err = CaseDatabase::open_case(&path, config).err().unwrap();
        assert!(err.is_data_error());
    }

    #[test]
    fn test_open_missing_case() {
        let temp_dir = TempDir::new().unwrap();
        let err = CaseDatabase::open_case(temp_dir.path().join("none.db"), CaseDbConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, CaseDbError::NotFound(_)));
    }

    #[test]
    fn test_with_transaction_rolls_back_on_error() {
        let (_temp_dir, case) = create_test_case();

        let result: Result<()> = case.with_transaction(|trans| {
            trans.execute(
                "INSERT INTO tsk_persons (name) VALUES ('Temp')",
                [],
            )?;
            Err(CaseDbError::data("abort"))
        });
        assert!(result.is_err());

        let count: i64 = case
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM tsk_persons", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_events_fire_after_commit_only() {
        let (_temp_dir, case) = create_test_case();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        case.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        {
            let mut trans = case.begin_transaction().unwrap();
            trans.queue_event(CaseEvent::DataSourceAdded(1));
            // dropped without commit
        }
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        let mut trans = case.begin_transaction().unwrap();
        trans.queue_event(CaseEvent::DataSourceAdded(1));
        trans.commit().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_id_list() {
        assert_eq!(id_list(&[1, 2, 3]), "1, 2, 3");
        assert_eq!(id_list(&[]), "");
    }
}
