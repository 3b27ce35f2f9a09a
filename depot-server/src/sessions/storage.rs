//! redb-based session store
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `sessions` | `session_id` | `Session` (JSON) | Active session records |
//! | `invoice_index` | `invoice_ref` | `Vec<session_id>` (JSON) | Sessions per invoice |
//! | `status_index` | `status` | `Vec<session_id>` (JSON) | Sessions per status |
//! | `takeovers` | `request_id` | `TakeoverRequest` (JSON) | Active takeover requests |
//! | `pending_owner_index` | `owner` | `Vec<request_id>` (JSON) | Pending requests per snapshot owner |
//! | `session_history` | `session_id` | `Session` (JSON) | Archived sessions (reset) |
//! | `takeover_history` | `request_id` | `TakeoverRequest` (JSON) | Archived requests (reset) |
//!
//! Every mutation maintains its indices inside the same write transaction as
//! the record write, and redb's single-writer transactions give each record
//! an atomic read-modify-write. The one-`in_progress`-session-per-invoice
//! invariant is checked under that transaction, against the invoice index.

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use shared::session::{Session, SessionStatus, TakeoverRequest};
use shared::{EngineError, EngineResult};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

const SESSIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");
const INVOICE_INDEX_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("invoice_index");
const STATUS_INDEX_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("status_index");
const TAKEOVERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("takeovers");
const PENDING_OWNER_INDEX_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("pending_owner_index");
const SESSION_HISTORY_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("session_history");
const TAKEOVER_HISTORY_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("takeover_history");

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        EngineError::Storage(err.to_string())
    }
}

/// Durable keyed storage for sessions and takeover requests.
///
/// Implementations must provide per-record atomic read-modify-write and
/// enforce the per-invoice `in_progress` uniqueness invariant, so the
/// lifecycle manager stays independent of the storage technology.
pub trait SessionStore: Send + Sync {
    /// Insert a new session. Fails with `Validation` if the id already
    /// exists, or `StateConflict` if inserting an `in_progress` session
    /// while another session for the same invoice is `in_progress`.
    fn insert_session(&self, session: &Session) -> EngineResult<()>;

    fn get_session(&self, id: &str) -> EngineResult<Option<Session>>;

    /// Atomic read-modify-write of one session. The closure runs under the
    /// write transaction; its error aborts the update and nothing is
    /// persisted. Returns the updated record.
    fn update_session(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut Session) -> EngineResult<()>,
    ) -> EngineResult<Session>;

    fn sessions_for_invoice(&self, invoice_ref: &str) -> EngineResult<Vec<Session>>;

    fn sessions_with_status(&self, status: SessionStatus) -> EngineResult<Vec<Session>>;

    fn all_sessions(&self) -> EngineResult<Vec<Session>>;

    /// Insert a new takeover request and index it by snapshot owner.
    fn insert_takeover(&self, request: &TakeoverRequest) -> EngineResult<()>;

    fn get_takeover(&self, id: &str) -> EngineResult<Option<TakeoverRequest>>;

    /// Atomic read-modify-write of one takeover request; keeps the
    /// pending-by-owner index in step with the request's status.
    fn update_takeover(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut TakeoverRequest) -> EngineResult<()>,
    ) -> EngineResult<TakeoverRequest>;

    /// The pending request for a (session, requester) pair, if any.
    fn pending_takeover_for(
        &self,
        session_id: &str,
        requester: &str,
    ) -> EngineResult<Option<TakeoverRequest>>;

    /// All pending requests whose snapshot owner matches.
    fn pending_for_owner(&self, owner: &str) -> EngineResult<Vec<TakeoverRequest>>;

    /// Archive the entire active set (sessions and takeover requests) into
    /// the history tables and clear the active tables. Returns
    /// (sessions archived, requests archived).
    fn reset_all(&self) -> EngineResult<(usize, usize)>;
}

type StorageResult<T> = Result<T, StorageError>;

/// Session store backed by redb.
#[derive(Clone)]
pub struct RedbSessionStore {
    db: Arc<Database>,
}

impl RedbSessionStore {
    /// Open or create the database at the given path.
    ///
    /// redb commits with immediate durability (copy-on-write with atomic
    /// pointer swap), so a power loss mid-operation leaves the store at the
    /// last committed state.
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let db = Database::create(path).map_err(StorageError::from)?;
        let store = Self { db: Arc::new(db) };
        store.init_tables()?;
        Ok(store)
    }

    /// Open an ephemeral in-memory database (tests, scratch deployments).
    pub fn open_in_memory() -> EngineResult<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(StorageError::from)?;
        let store = Self { db: Arc::new(db) };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let _ = txn.open_table(SESSIONS_TABLE)?;
            let _ = txn.open_table(INVOICE_INDEX_TABLE)?;
            let _ = txn.open_table(STATUS_INDEX_TABLE)?;
            let _ = txn.open_table(TAKEOVERS_TABLE)?;
            let _ = txn.open_table(PENDING_OWNER_INDEX_TABLE)?;
            let _ = txn.open_table(SESSION_HISTORY_TABLE)?;
            let _ = txn.open_table(TAKEOVER_HISTORY_TABLE)?;
        }
        txn.commit()?;
        Ok(())
    }

    // ========== Index helpers (within a write transaction) ==========

    fn index_ids(
        txn: &WriteTransaction,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> StorageResult<Vec<String>> {
        let table = txn.open_table(table)?;
        match table.get(key)? {
            Some(value) => Ok(serde_json::from_slice(value.value())?),
            None => Ok(Vec::new()),
        }
    }

    fn index_add(
        txn: &WriteTransaction,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        id: &str,
    ) -> StorageResult<()> {
        let mut ids = Self::index_ids(txn, table, key)?;
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
        let mut table = txn.open_table(table)?;
        table.insert(key, serde_json::to_vec(&ids)?.as_slice())?;
        Ok(())
    }

    fn index_remove(
        txn: &WriteTransaction,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        id: &str,
    ) -> StorageResult<()> {
        let mut ids = Self::index_ids(txn, table, key)?;
        ids.retain(|existing| existing != id);
        let mut table = txn.open_table(table)?;
        if ids.is_empty() {
            table.remove(key)?;
        } else {
            table.insert(key, serde_json::to_vec(&ids)?.as_slice())?;
        }
        Ok(())
    }

    fn load_session_txn(txn: &WriteTransaction, id: &str) -> StorageResult<Option<Session>> {
        let table = txn.open_table(SESSIONS_TABLE)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn store_session_txn(txn: &WriteTransaction, session: &Session) -> StorageResult<()> {
        let mut table = txn.open_table(SESSIONS_TABLE)?;
        let value = serde_json::to_vec(session)?;
        table.insert(session.id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Check the one-`in_progress`-per-invoice invariant inside a write
    /// transaction, ignoring `exclude_id` (the session being written).
    fn check_invoice_uniqueness(
        txn: &WriteTransaction,
        invoice_ref: &str,
        exclude_id: &str,
    ) -> EngineResult<()> {
        let ids = Self::index_ids(txn, INVOICE_INDEX_TABLE, invoice_ref)
            .map_err(EngineError::from)?;
        for id in ids {
            if id == exclude_id {
                continue;
            }
            if let Some(other) =
                Self::load_session_txn(txn, &id).map_err(EngineError::from)?
                && other.status() == SessionStatus::InProgress
            {
                return Err(EngineError::state_conflict(
                    SessionStatus::InProgress,
                    other.owner().map(str::to_string),
                    format!(
                        "invoice {} already has session {} in progress",
                        invoice_ref, other.id
                    ),
                ));
            }
        }
        Ok(())
    }

    fn read_index_ids(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> StorageResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        match table.get(key)? {
            Some(value) => Ok(serde_json::from_slice(value.value())?),
            None => Ok(Vec::new()),
        }
    }

    fn read_all<T: serde::de::DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
    ) -> StorageResult<Vec<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        let mut records = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    fn sessions_by_ids(&self, ids: &[String]) -> EngineResult<Vec<Session>> {
        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(session) = self.get_session(id)? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }
}

impl SessionStore for RedbSessionStore {
    fn insert_session(&self, session: &Session) -> EngineResult<()> {
        let txn = self.db.begin_write().map_err(StorageError::from)?;

        if Self::load_session_txn(&txn, &session.id)
            .map_err(EngineError::from)?
            .is_some()
        {
            return Err(EngineError::validation(format!(
                "session {} already exists",
                session.id
            )));
        }
        if session.status() == SessionStatus::InProgress {
            Self::check_invoice_uniqueness(&txn, &session.invoice_ref, &session.id)?;
        }

        Self::store_session_txn(&txn, session).map_err(EngineError::from)?;
        Self::index_add(&txn, INVOICE_INDEX_TABLE, &session.invoice_ref, &session.id)
            .map_err(EngineError::from)?;
        Self::index_add(
            &txn,
            STATUS_INDEX_TABLE,
            session.status().as_str(),
            &session.id,
        )
        .map_err(EngineError::from)?;

        txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    fn get_session(&self, id: &str) -> EngineResult<Option<Session>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn
            .open_table(SESSIONS_TABLE)
            .map_err(StorageError::from)?;
        match table.get(id).map_err(StorageError::from)? {
            Some(value) => Ok(Some(
                serde_json::from_slice(value.value()).map_err(StorageError::from)?,
            )),
            None => Ok(None),
        }
    }

    fn update_session(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut Session) -> EngineResult<()>,
    ) -> EngineResult<Session> {
        let txn = self.db.begin_write().map_err(StorageError::from)?;

        let mut session = Self::load_session_txn(&txn, id)
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::not_found(format!("session {id}")))?;
        let old_status = session.status();

        apply(&mut session)?;

        let new_status = session.status();
        if new_status == SessionStatus::InProgress && old_status != SessionStatus::InProgress {
            Self::check_invoice_uniqueness(&txn, &session.invoice_ref, id)?;
        }

        Self::store_session_txn(&txn, &session).map_err(EngineError::from)?;
        if new_status != old_status {
            Self::index_remove(&txn, STATUS_INDEX_TABLE, old_status.as_str(), id)
                .map_err(EngineError::from)?;
            Self::index_add(&txn, STATUS_INDEX_TABLE, new_status.as_str(), id)
                .map_err(EngineError::from)?;
        }

        txn.commit().map_err(StorageError::from)?;
        Ok(session)
    }

    fn sessions_for_invoice(&self, invoice_ref: &str) -> EngineResult<Vec<Session>> {
        let ids = self.read_index_ids(INVOICE_INDEX_TABLE, invoice_ref)?;
        self.sessions_by_ids(&ids)
    }

    fn sessions_with_status(&self, status: SessionStatus) -> EngineResult<Vec<Session>> {
        let ids = self.read_index_ids(STATUS_INDEX_TABLE, status.as_str())?;
        self.sessions_by_ids(&ids)
    }

    fn all_sessions(&self) -> EngineResult<Vec<Session>> {
        Ok(self.read_all(SESSIONS_TABLE)?)
    }

    fn insert_takeover(&self, request: &TakeoverRequest) -> EngineResult<()> {
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut table = txn.open_table(TAKEOVERS_TABLE).map_err(StorageError::from)?;
            let value = serde_json::to_vec(request).map_err(StorageError::from)?;
            table
                .insert(request.id.as_str(), value.as_slice())
                .map_err(StorageError::from)?;
        }
        if request.is_pending() {
            Self::index_add(
                &txn,
                PENDING_OWNER_INDEX_TABLE,
                &request.current_owner,
                &request.id,
            )
            .map_err(EngineError::from)?;
        }
        txn.commit().map_err(StorageError::from)?;
        Ok(())
    }

    fn get_takeover(&self, id: &str) -> EngineResult<Option<TakeoverRequest>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn
            .open_table(TAKEOVERS_TABLE)
            .map_err(StorageError::from)?;
        match table.get(id).map_err(StorageError::from)? {
            Some(value) => Ok(Some(
                serde_json::from_slice(value.value()).map_err(StorageError::from)?,
            )),
            None => Ok(None),
        }
    }

    fn update_takeover(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut TakeoverRequest) -> EngineResult<()>,
    ) -> EngineResult<TakeoverRequest> {
        let txn = self.db.begin_write().map_err(StorageError::from)?;

        let mut request = {
            let table = txn.open_table(TAKEOVERS_TABLE).map_err(StorageError::from)?;
            match table.get(id).map_err(StorageError::from)? {
                Some(value) => serde_json::from_slice::<TakeoverRequest>(value.value())
                    .map_err(StorageError::from)?,
                None => return Err(EngineError::not_found(format!("takeover request {id}"))),
            }
        };
        let was_pending = request.is_pending();

        apply(&mut request)?;

        {
            let mut table = txn.open_table(TAKEOVERS_TABLE).map_err(StorageError::from)?;
            let value = serde_json::to_vec(&request).map_err(StorageError::from)?;
            table
                .insert(id, value.as_slice())
                .map_err(StorageError::from)?;
        }
        if was_pending && !request.is_pending() {
            Self::index_remove(&txn, PENDING_OWNER_INDEX_TABLE, &request.current_owner, id)
                .map_err(EngineError::from)?;
        }

        txn.commit().map_err(StorageError::from)?;
        Ok(request)
    }

    fn pending_takeover_for(
        &self,
        session_id: &str,
        requester: &str,
    ) -> EngineResult<Option<TakeoverRequest>> {
        let requests: Vec<TakeoverRequest> = self.read_all(TAKEOVERS_TABLE)?;
        Ok(requests.into_iter().find(|request| {
            request.is_pending()
                && request.session_id == session_id
                && request.requested_by == requester
        }))
    }

    fn pending_for_owner(&self, owner: &str) -> EngineResult<Vec<TakeoverRequest>> {
        let ids = self.read_index_ids(PENDING_OWNER_INDEX_TABLE, owner)?;
        let mut requests = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(request) = self.get_takeover(id)?
                && request.is_pending()
            {
                requests.push(request);
            }
        }
        Ok(requests)
    }

    fn reset_all(&self) -> EngineResult<(usize, usize)> {
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        let (session_count, takeover_count) = {
            let mut sessions_table =
                txn.open_table(SESSIONS_TABLE).map_err(StorageError::from)?;
            let mut history_table = txn
                .open_table(SESSION_HISTORY_TABLE)
                .map_err(StorageError::from)?;

            let mut session_ids = Vec::new();
            for result in sessions_table.iter().map_err(StorageError::from)? {
                let (key, value) = result.map_err(StorageError::from)?;
                session_ids.push((key.value().to_string(), value.value().to_vec()));
            }
            for (id, value) in &session_ids {
                history_table
                    .insert(id.as_str(), value.as_slice())
                    .map_err(StorageError::from)?;
                sessions_table
                    .remove(id.as_str())
                    .map_err(StorageError::from)?;
            }

            let mut takeovers_table =
                txn.open_table(TAKEOVERS_TABLE).map_err(StorageError::from)?;
            let mut takeover_history = txn
                .open_table(TAKEOVER_HISTORY_TABLE)
                .map_err(StorageError::from)?;
            let mut takeover_ids = Vec::new();
            for result in takeovers_table.iter().map_err(StorageError::from)? {
                let (key, value) = result.map_err(StorageError::from)?;
                takeover_ids.push((key.value().to_string(), value.value().to_vec()));
            }
            for (id, value) in &takeover_ids {
                takeover_history
                    .insert(id.as_str(), value.as_slice())
                    .map_err(StorageError::from)?;
                takeovers_table
                    .remove(id.as_str())
                    .map_err(StorageError::from)?;
            }

            // Indices only describe the active set; drop them wholesale.
            for index in [
                INVOICE_INDEX_TABLE,
                STATUS_INDEX_TABLE,
                PENDING_OWNER_INDEX_TABLE,
            ] {
                let mut table = txn.open_table(index).map_err(StorageError::from)?;
                let keys: Vec<String> = table
                    .iter()
                    .map_err(StorageError::from)?
                    .filter_map(|r| r.ok())
                    .map(|(k, _)| k.value().to_string())
                    .collect();
                for key in keys {
                    table.remove(key.as_str()).map_err(StorageError::from)?;
                }
            }

            (session_ids.len(), takeover_ids.len())
        };
        txn.commit().map_err(StorageError::from)?;
        tracing::info!(
            sessions = session_count,
            takeovers = takeover_count,
            "Active set archived to history"
        );
        Ok((session_count, takeover_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::session::{ExpectedItem, SessionKind, SessionState};

    fn test_session(invoice: &str, state: SessionState) -> Session {
        Session::new(
            invoice,
            format!("ORD-{invoice}"),
            SessionKind::Pick,
            state,
            vec![ExpectedItem {
                sku: "SKU-A".to_string(),
                name: "Widget".to_string(),
                qty_expected: 5,
                unit_price: rust_decimal::Decimal::new(199, 2),
            }],
            "alice",
        )
    }

    fn in_progress(owner: &str) -> SessionState {
        SessionState::InProgress {
            owner: owner.to_string(),
        }
    }

    #[test]
    fn test_insert_and_get_roundtrip() {
        let store = RedbSessionStore::open_in_memory().unwrap();
        let session = test_session("INV-1", in_progress("alice"));
        store.insert_session(&session).unwrap();

        let loaded = store.get_session(&session.id).unwrap().unwrap();
        assert_eq!(loaded, session);
        assert!(store.get_session("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let store = RedbSessionStore::open_in_memory().unwrap();
        let session = test_session("INV-1", SessionState::Draft);
        store.insert_session(&session).unwrap();
        let err = store.insert_session(&session).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_invoice_uniqueness_on_insert() {
        let store = RedbSessionStore::open_in_memory().unwrap();
        store
            .insert_session(&test_session("INV-1", in_progress("alice")))
            .unwrap();

        let err = store
            .insert_session(&test_session("INV-1", in_progress("bob")))
            .unwrap_err();
        assert!(matches!(err, EngineError::StateConflict { .. }));

        // A draft for the same invoice is fine
        store
            .insert_session(&test_session("INV-1", SessionState::Draft))
            .unwrap();
    }

    #[test]
    fn test_invoice_uniqueness_on_update() {
        let store = RedbSessionStore::open_in_memory().unwrap();
        store
            .insert_session(&test_session("INV-1", in_progress("alice")))
            .unwrap();
        let draft = test_session("INV-1", SessionState::Draft);
        store.insert_session(&draft).unwrap();

        // Claiming the draft while alice holds INV-1 must fail
        let err = store
            .update_session(&draft.id, &mut |session| {
                session.state = in_progress("bob");
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::StateConflict { .. }));

        // And nothing was persisted
        let reloaded = store.get_session(&draft.id).unwrap().unwrap();
        assert_eq!(reloaded.status(), SessionStatus::Draft);
    }

    #[test]
    fn test_update_maintains_status_index() {
        let store = RedbSessionStore::open_in_memory().unwrap();
        let session = test_session("INV-1", in_progress("alice"));
        store.insert_session(&session).unwrap();

        assert_eq!(
            store
                .sessions_with_status(SessionStatus::InProgress)
                .unwrap()
                .len(),
            1
        );

        store
            .update_session(&session.id, &mut |s| {
                s.state = SessionState::Draft;
                Ok(())
            })
            .unwrap();

        assert!(
            store
                .sessions_with_status(SessionStatus::InProgress)
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            store.sessions_with_status(SessionStatus::Draft).unwrap()[0].id,
            session.id
        );
    }

    #[test]
    fn test_update_closure_error_aborts() {
        let store = RedbSessionStore::open_in_memory().unwrap();
        let session = test_session("INV-1", in_progress("alice"));
        store.insert_session(&session).unwrap();

        let err = store
            .update_session(&session.id, &mut |s| {
                s.state = SessionState::Draft;
                Err(EngineError::validation("nope"))
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let reloaded = store.get_session(&session.id).unwrap().unwrap();
        assert_eq!(reloaded.status(), SessionStatus::InProgress);
    }

    #[test]
    fn test_sessions_for_invoice() {
        let store = RedbSessionStore::open_in_memory().unwrap();
        store
            .insert_session(&test_session("INV-1", SessionState::Draft))
            .unwrap();
        store
            .insert_session(&test_session("INV-1", in_progress("alice")))
            .unwrap();
        store
            .insert_session(&test_session("INV-2", SessionState::Draft))
            .unwrap();

        assert_eq!(store.sessions_for_invoice("INV-1").unwrap().len(), 2);
        assert_eq!(store.sessions_for_invoice("INV-2").unwrap().len(), 1);
        assert!(store.sessions_for_invoice("INV-3").unwrap().is_empty());
        assert_eq!(store.all_sessions().unwrap().len(), 3);
    }

    #[test]
    fn test_takeover_storage_and_pending_index() {
        let store = RedbSessionStore::open_in_memory().unwrap();
        let request = TakeoverRequest::new("ses-1", "bob", "alice");
        store.insert_takeover(&request).unwrap();

        let pending = store.pending_for_owner("alice").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, request.id);
        assert!(
            store
                .pending_takeover_for("ses-1", "bob")
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .pending_takeover_for("ses-1", "carol")
                .unwrap()
                .is_none()
        );

        // Resolving drops it from the pending index
        store
            .update_takeover(&request.id, &mut |r| {
                r.resolve(false);
                Ok(())
            })
            .unwrap();
        assert!(store.pending_for_owner("alice").unwrap().is_empty());
        assert!(
            store
                .pending_takeover_for("ses-1", "bob")
                .unwrap()
                .is_none()
        );
        // The record itself survives
        assert!(store.get_takeover(&request.id).unwrap().is_some());
    }

    #[test]
    fn test_reset_all_archives_and_clears() {
        let store = RedbSessionStore::open_in_memory().unwrap();
        store
            .insert_session(&test_session("INV-1", in_progress("alice")))
            .unwrap();
        store
            .insert_session(&test_session("INV-2", SessionState::Draft))
            .unwrap();
        store
            .insert_takeover(&TakeoverRequest::new("ses-1", "bob", "alice"))
            .unwrap();

        let (sessions, takeovers) = store.reset_all().unwrap();
        assert_eq!(sessions, 2);
        assert_eq!(takeovers, 1);

        assert!(store.all_sessions().unwrap().is_empty());
        assert!(store.sessions_for_invoice("INV-1").unwrap().is_empty());
        assert!(
            store
                .sessions_with_status(SessionStatus::InProgress)
                .unwrap()
                .is_empty()
        );
        assert!(store.pending_for_owner("alice").unwrap().is_empty());

        // A fresh session for the previously-busy invoice is allowed
        store
            .insert_session(&test_session("INV-1", in_progress("bob")))
            .unwrap();
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.redb");
        let session = test_session("INV-1", SessionState::Draft);
        {
            let store = RedbSessionStore::open(&path).unwrap();
            store.insert_session(&session).unwrap();
        }
        let store = RedbSessionStore::open(&path).unwrap();
        assert_eq!(
            store.get_session(&session.id).unwrap().unwrap().invoice_ref,
            "INV-1"
        );
    }
}
