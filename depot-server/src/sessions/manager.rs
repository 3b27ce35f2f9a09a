//! Session lifecycle manager
//!
//! Single entry point for every mutating session operation. Each operation
//! takes the session's lock for its full read-validate-write span,
//! re-validates the precondition inside the store's atomic update, appends
//! exactly one audit entry before persisting, and publishes a notification
//! only after the persist succeeded.

use crate::gateway::{InvoiceGateway, SkuResolver};
use crate::inventory::{self, PoolStore};
use crate::notify::Notifier;
use crate::scan::{classify_identifier, ScanIdentifier, ScanRequest};
use crate::sessions::locks::SessionLocks;
use crate::sessions::storage::SessionStore;
use shared::notify::{SessionEvent, SessionNotification};
use shared::session::{
    AuditAction, DeductionStatus, ExpectedItem, ScanOutcome, Session, SessionKind, SessionState,
    SessionStatus,
};
use shared::util::now_millis;
use shared::{EngineError, EngineResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    invoice_gateway: Arc<dyn InvoiceGateway>,
    sku_resolver: Arc<dyn SkuResolver>,
    pool_store: Arc<dyn PoolStore>,
    notifier: Notifier,
    locks: Arc<SessionLocks>,
    gateway_timeout: Duration,
    pool_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        invoice_gateway: Arc<dyn InvoiceGateway>,
        sku_resolver: Arc<dyn SkuResolver>,
        pool_store: Arc<dyn PoolStore>,
        notifier: Notifier,
        gateway_timeout: Duration,
        pool_timeout: Duration,
    ) -> Self {
        Self {
            store,
            invoice_gateway,
            sku_resolver,
            pool_store,
            notifier,
            locks: Arc::new(SessionLocks::new()),
            gateway_timeout,
            pool_timeout,
        }
    }

    /// Lock map shared with the takeover coordinator, so ownership transfers
    /// serialize with lifecycle operations on the same session.
    pub fn locks(&self) -> Arc<SessionLocks> {
        self.locks.clone()
    }

    /// Subscribe to the in-process notification broadcast.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.notifier.subscribe()
    }

    async fn with_gateway_timeout<T, F>(&self, what: &str, fut: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        tokio::time::timeout(self.gateway_timeout, fut)
            .await
            .map_err(|_| EngineError::Timeout(format!("{what} exceeded its budget")))?
    }

    async fn with_pool_timeout<T, F>(&self, what: &str, fut: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        tokio::time::timeout(self.pool_timeout, fut)
            .await
            .map_err(|_| EngineError::Timeout(format!("{what} exceeded its budget")))?
    }

    fn notify(&self, session: &Session, event: SessionEvent, actor: &str, target: Option<&str>) {
        let mut notification = SessionNotification::new(
            &session.id,
            &session.invoice_ref,
            session.status(),
            event,
            actor,
        );
        if let Some(target) = target {
            notification = notification.with_target(target);
        }
        self.notifier.publish(notification);
    }

    // ========== Creation ==========

    /// Resolve the invoice and start a new `in_progress` session owned by
    /// `actor`.
    ///
    /// If the invoice already has a session, the outcome depends on its
    /// state: completed and draft/approved sessions and a session held by
    /// another worker are a `StateConflict` carrying enough context for the
    /// caller to offer claim/wait/cancel; the actor's own active session is
    /// returned as-is; a cancelled session is transparently restarted.
    pub async fn start_session(
        &self,
        order_ref: &str,
        kind: SessionKind,
        actor: &str,
    ) -> EngineResult<Session> {
        let invoice = self
            .with_gateway_timeout("invoice lookup", self.invoice_gateway.fetch_invoice(order_ref))
            .await?;

        // Serialize creation per invoice; session-id locks cannot cover a
        // session that does not exist yet.
        let _guard = self
            .locks
            .acquire(&format!("invoice:{}", invoice.invoice_id))
            .await;

        if let Some(existing) = self.existing_session_outcome(&invoice.invoice_id, actor)? {
            return match existing {
                ExistingSession::Resume(session) => Ok(session),
                ExistingSession::Restart(id) => {
                    let _session_guard = self.locks.acquire(&id).await;
                    self.restart_locked(&id, actor).await
                }
                ExistingSession::Conflict(err) => Err(err),
            };
        }

        let items = expected_items(&invoice)?;
        let mut session = Session::new(
            &invoice.invoice_id,
            &invoice.order_id,
            kind,
            SessionState::InProgress {
                owner: actor.to_string(),
            },
            items,
            actor,
        );
        session.push_audit(AuditAction::SessionStarted, actor, None);
        self.store.insert_session(&session)?;

        info!(session_id = %session.id, invoice_ref = %session.invoice_ref, owner = %actor, "Session started");
        self.notify(&session, SessionEvent::Started, actor, None);
        Ok(session)
    }

    /// Resolve the invoice and create a session directly in `approved`
    /// (supervisor pre-approval), without assigning an owner.
    pub async fn approve_order_for_picking(
        &self,
        order_ref: &str,
        kind: SessionKind,
        actor: &str,
    ) -> EngineResult<Session> {
        let invoice = self
            .with_gateway_timeout("invoice lookup", self.invoice_gateway.fetch_invoice(order_ref))
            .await?;

        let _guard = self
            .locks
            .acquire(&format!("invoice:{}", invoice.invoice_id))
            .await;

        if let Some(existing) = self.existing_session_outcome(&invoice.invoice_id, actor)? {
            return match existing {
                ExistingSession::Resume(session) => Err(EngineError::state_conflict(
                    session.status(),
                    session.owner().map(str::to_string),
                    format!("session {} is already in progress", session.id),
                )),
                // Approval never assigns an owner, so a cancelled session
                // cannot be transparently restarted here.
                ExistingSession::Restart(id) => Err(EngineError::state_conflict(
                    SessionStatus::Cancelled,
                    None,
                    format!("cancelled session {id} exists; restart it instead"),
                )),
                ExistingSession::Conflict(err) => Err(err),
            };
        }

        let items = expected_items(&invoice)?;
        let mut session = Session::new(
            &invoice.invoice_id,
            &invoice.order_id,
            kind,
            SessionState::Approved {
                approved_by: actor.to_string(),
                approved_at: now_millis(),
            },
            items,
            actor,
        );
        session.push_audit(AuditAction::SessionApproved, actor, None);
        self.store.insert_session(&session)?;

        info!(session_id = %session.id, invoice_ref = %session.invoice_ref, approved_by = %actor, "Order approved for picking");
        self.notify(&session, SessionEvent::Approved, actor, None);
        Ok(session)
    }

    /// Classify what an existing session for the invoice means for a new
    /// creation attempt. Conflict precedence: completed, then active, then
    /// pre-claim, then cancelled (restartable).
    fn existing_session_outcome(
        &self,
        invoice_ref: &str,
        actor: &str,
    ) -> EngineResult<Option<ExistingSession>> {
        let sessions = self.store.sessions_for_invoice(invoice_ref)?;
        if sessions.is_empty() {
            return Ok(None);
        }

        for session in &sessions {
            if let SessionState::Completed { completed_by, .. } = &session.state {
                return Ok(Some(ExistingSession::Conflict(EngineError::state_conflict(
                    SessionStatus::Completed,
                    None,
                    format!("invoice {invoice_ref} already completed by {completed_by}"),
                ))));
            }
        }
        for session in &sessions {
            if let Some(owner) = session.owner() {
                if owner == actor {
                    return Ok(Some(ExistingSession::Resume(session.clone())));
                }
                return Ok(Some(ExistingSession::Conflict(EngineError::state_conflict(
                    session.status(),
                    Some(owner.to_string()),
                    format!("invoice {invoice_ref} is being picked by {owner}"),
                ))));
            }
        }
        for session in &sessions {
            match session.status() {
                SessionStatus::Draft => {
                    return Ok(Some(ExistingSession::Conflict(EngineError::state_conflict(
                        SessionStatus::Draft,
                        None,
                        format!(
                            "session {} for invoice {invoice_ref} exists; claim it instead",
                            session.id
                        ),
                    ))));
                }
                SessionStatus::Approved => {
                    return Ok(Some(ExistingSession::Conflict(EngineError::state_conflict(
                        SessionStatus::Approved,
                        None,
                        format!(
                            "approved session {} for invoice {invoice_ref} exists; have an admin assign or cancel it",
                            session.id
                        ),
                    ))));
                }
                _ => {}
            }
        }
        if let Some(cancelled) = sessions
            .iter()
            .find(|s| s.status() == SessionStatus::Cancelled)
        {
            return Ok(Some(ExistingSession::Restart(cancelled.id.clone())));
        }
        Ok(None)
    }

    // ========== Transitions ==========

    /// `draft → in_progress`, assigning `actor` as owner.
    pub async fn claim_session(&self, id: &str, actor: &str) -> EngineResult<Session> {
        let _guard = self.locks.acquire(id).await;
        let session = self.store.update_session(id, &mut |session| {
            match &session.state {
                SessionState::Draft => {}
                other => return Err(wrong_state(other, "only draft sessions can be claimed")),
            }
            session.state = SessionState::InProgress {
                owner: actor.to_string(),
            };
            session.push_audit(AuditAction::SessionClaimed, actor, None);
            session.touch(actor);
            Ok(())
        })?;

        self.notify(&session, SessionEvent::Claimed, actor, None);
        Ok(session)
    }

    /// `in_progress → draft`, clearing the owner. Scan progress is kept.
    pub async fn release_session(&self, id: &str, actor: &str) -> EngineResult<Session> {
        let _guard = self.locks.acquire(id).await;
        let session = self.store.update_session(id, &mut |session| {
            require_owned_in_progress(session, actor)?;
            session.state = SessionState::Draft;
            session.push_audit(AuditAction::SessionReleased, actor, None);
            session.touch(actor);
            Ok(())
        })?;

        self.notify(&session, SessionEvent::Released, actor, None);
        Ok(session)
    }

    /// `draft → approved`; no owner is assigned.
    pub async fn approve_session(&self, id: &str, actor: &str) -> EngineResult<Session> {
        let _guard = self.locks.acquire(id).await;
        let session = self.store.update_session(id, &mut |session| {
            match &session.state {
                SessionState::Draft => {}
                other => return Err(wrong_state(other, "only draft sessions can be approved")),
            }
            session.state = SessionState::Approved {
                approved_by: actor.to_string(),
                approved_at: now_millis(),
            };
            session.push_audit(AuditAction::SessionApproved, actor, None);
            session.touch(actor);
            Ok(())
        })?;

        self.notify(&session, SessionEvent::Approved, actor, None);
        Ok(session)
    }

    /// `in_progress → ready_to_check`, owner only.
    pub async fn mark_ready_to_check(&self, id: &str, actor: &str) -> EngineResult<Session> {
        let _guard = self.locks.acquire(id).await;
        let session = self.store.update_session(id, &mut |session| {
            require_owned_in_progress(session, actor)?;
            session.state = SessionState::ReadyToCheck {
                owner: actor.to_string(),
            };
            session.push_audit(AuditAction::SessionMarkedReady, actor, None);
            session.touch(actor);
            Ok(())
        })?;

        self.notify(&session, SessionEvent::MarkedReady, actor, None);
        Ok(session)
    }

    /// `in_progress → completed`, owner only. Without `force`, every
    /// expected item must have been scanned to at least its quantity.
    pub async fn complete_session(
        &self,
        id: &str,
        actor: &str,
        force: bool,
    ) -> EngineResult<Session> {
        let _guard = self.locks.acquire(id).await;
        let session = self.store.update_session(id, &mut |session| {
            require_owned_in_progress(session, actor)?;
            if !force && !session.all_items_complete() {
                let missing: Vec<String> = session
                    .missing_items()
                    .iter()
                    .map(|(item, short)| format!("{} short {short}", item.sku))
                    .collect();
                return Err(EngineError::validation(format!(
                    "cannot complete with missing items: {}",
                    missing.join(", ")
                )));
            }
            session.state = SessionState::Completed {
                completed_by: actor.to_string(),
                completed_at: now_millis(),
                forced: force,
            };
            let detail = force.then(|| "forced".to_string());
            session.push_audit(AuditAction::SessionCompleted, actor, detail);
            session.touch(actor);
            Ok(())
        })?;

        info!(session_id = %id, actor = %actor, forced = force, "Session completed");
        self.notify(&session, SessionEvent::Completed, actor, None);
        Ok(session)
    }

    /// Any non-terminal state → `cancelled`. Discards scan progress. Owned
    /// sessions can only be cancelled by their owner.
    pub async fn cancel_session(
        &self,
        id: &str,
        actor: &str,
        reason: Option<String>,
    ) -> EngineResult<Session> {
        let _guard = self.locks.acquire(id).await;
        let session = self.store.update_session(id, &mut |session| {
            if session.is_terminal() {
                return Err(wrong_state(&session.state, "session is already closed"));
            }
            if let Some(owner) = session.owner()
                && owner != actor
            {
                return Err(EngineError::access_denied(format!(
                    "session {id} is owned by {owner}"
                )));
            }
            session.clear_scans();
            session.state = SessionState::Cancelled {
                cancelled_by: actor.to_string(),
                cancelled_at: now_millis(),
                reason: reason.clone(),
            };
            session.push_audit(AuditAction::SessionCancelled, actor, reason.clone());
            session.touch(actor);
            Ok(())
        })?;

        self.notify(&session, SessionEvent::Cancelled, actor, None);
        Ok(session)
    }

    /// `cancelled → in_progress` with `actor` as owner, same id, scans
    /// cleared.
    pub async fn restart_cancelled_session(&self, id: &str, actor: &str) -> EngineResult<Session> {
        let _guard = self.locks.acquire(id).await;
        self.restart_locked(id, actor).await
    }

    async fn restart_locked(&self, id: &str, actor: &str) -> EngineResult<Session> {
        let session = self.store.update_session(id, &mut |session| {
            match &session.state {
                SessionState::Cancelled { .. } => {}
                other => {
                    return Err(wrong_state(other, "only cancelled sessions can be restarted"))
                }
            }
            session.clear_scans();
            session.state = SessionState::InProgress {
                owner: actor.to_string(),
            };
            session.push_audit(AuditAction::SessionRestarted, actor, None);
            session.touch(actor);
            Ok(())
        })?;

        info!(session_id = %id, owner = %actor, "Cancelled session restarted");
        self.notify(&session, SessionEvent::Restarted, actor, None);
        Ok(session)
    }

    // ========== Admin operations ==========

    /// Cancel from any non-terminal state, bypassing ownership. The audit
    /// entry names the admin and the dispossessed owner, who is also the
    /// notification target.
    pub async fn force_cancel(
        &self,
        id: &str,
        admin: &str,
        reason: Option<String>,
    ) -> EngineResult<Session> {
        let _guard = self.locks.acquire(id).await;
        let mut dispossessed: Option<String> = None;
        let session = self.store.update_session(id, &mut |session| {
            if session.is_terminal() {
                return Err(wrong_state(&session.state, "session is already closed"));
            }
            dispossessed = session.owner().map(str::to_string);
            session.clear_scans();
            session.state = SessionState::Cancelled {
                cancelled_by: admin.to_string(),
                cancelled_at: now_millis(),
                reason: reason.clone(),
            };
            let detail = match (&dispossessed, &reason) {
                (Some(owner), Some(reason)) => format!("owner was {owner}: {reason}"),
                (Some(owner), None) => format!("owner was {owner}"),
                (None, Some(reason)) => reason.clone(),
                (None, None) => "unowned".to_string(),
            };
            session.push_audit(AuditAction::SessionForceCancelled, admin, Some(detail));
            session.touch(admin);
            Ok(())
        })?;

        warn!(session_id = %id, admin = %admin, owner = ?dispossessed, "Session force-cancelled");
        self.notify(
            &session,
            SessionEvent::ForceCancelled,
            admin,
            dispossessed.as_deref(),
        );
        Ok(session)
    }

    /// Hand the session to `target` from any non-terminal state, bypassing
    /// ownership. The previous owner, if any, is the notification target.
    pub async fn force_assign(&self, id: &str, target: &str, admin: &str) -> EngineResult<Session> {
        let _guard = self.locks.acquire(id).await;
        let mut dispossessed: Option<String> = None;
        let session = self.store.update_session(id, &mut |session| {
            if session.is_terminal() {
                return Err(wrong_state(&session.state, "session is already closed"));
            }
            dispossessed = session.owner().map(str::to_string);
            session.state = SessionState::InProgress {
                owner: target.to_string(),
            };
            let detail = match &dispossessed {
                Some(owner) => format!("{owner} -> {target}"),
                None => format!("-> {target}"),
            };
            session.push_audit(AuditAction::SessionForceAssigned, admin, Some(detail));
            session.touch(admin);
            Ok(())
        })?;

        warn!(session_id = %id, admin = %admin, target = %target, owner = ?dispossessed, "Session force-assigned");
        self.notify(
            &session,
            SessionEvent::ForceAssigned,
            admin,
            dispossessed.as_deref(),
        );
        Ok(session)
    }

    // ========== Scanning ==========

    /// Reconcile one scan against an in-progress session owned by `actor`.
    ///
    /// The identifier is either a warehouse item code (resolved to a SKU via
    /// the catalog) or a raw SKU, matched against the invoice lines
    /// case-insensitively. A stock deduction that fails with
    /// `InsufficientStock` does not fail the scan: the shortfall is reported
    /// through the outcome and the audit trail. Other deduction errors,
    /// including a pool store blowing its timeout budget, propagate and
    /// leave the scan unrecorded.
    pub async fn scan(
        &self,
        session_id: &str,
        actor: &str,
        request: ScanRequest,
    ) -> EngineResult<ScanOutcome> {
        if request.quantity == 0 {
            return Err(EngineError::validation("scan quantity must be positive"));
        }

        let _guard = self.locks.acquire(session_id).await;

        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| EngineError::not_found(format!("session {session_id}")))?;
        require_owned_in_progress(&session, actor)?;

        let (sku, item_code) = self.resolve_identifier(&request.identifier).await?;
        let expected = session
            .expected_item(&sku)
            .ok_or_else(|| EngineError::not_found(format!("{sku} is not on this invoice")))?
            .clone();
        let canonical_sku = expected.sku.clone();

        let deduction = self
            .attempt_deduction(&session, item_code.as_deref(), &request)
            .await?;

        let scanned_at = now_millis();
        let updated = self.store.update_session(session_id, &mut |session| {
            require_owned_in_progress(session, actor)?;
            session
                .record_scan(&canonical_sku, request.quantity, scanned_at)
                .ok_or_else(|| {
                    EngineError::not_found(format!("{canonical_sku} is not on this invoice"))
                })?;
            session.push_audit(
                AuditAction::ItemScanned,
                actor,
                Some(format!("{canonical_sku} x{}", request.quantity)),
            );
            if let DeductionStatus::Failed { reason } = &deduction {
                session.push_audit(AuditAction::DeductionFailed, actor, Some(reason.clone()));
            }
            session.touch(actor);
            Ok(())
        })?;

        self.notify(&updated, SessionEvent::ItemScanned, actor, None);

        let qty_scanned = updated.scanned_qty(&canonical_sku);
        Ok(ScanOutcome {
            sku: canonical_sku,
            name: expected.name,
            qty_expected: expected.qty_expected,
            qty_scanned,
            qty_remaining: expected.qty_expected.saturating_sub(qty_scanned),
            is_complete: qty_scanned >= expected.qty_expected,
            is_overpicked: qty_scanned > expected.qty_expected,
            all_items_complete: updated.all_items_complete(),
            deduction,
        })
    }

    /// Resolve a scanned identifier to `(sku, item_code)`. Item codes must
    /// be known to the catalog; a SKU without an item code is still
    /// scannable, it just cannot reach a stock pool.
    async fn resolve_identifier(&self, raw: &str) -> EngineResult<(String, Option<String>)> {
        match classify_identifier(raw) {
            ScanIdentifier::ItemCode(code) => {
                let sku = self
                    .with_gateway_timeout("sku lookup", self.sku_resolver.sku_for_item_code(&code))
                    .await?
                    .ok_or_else(|| EngineError::not_found(format!("item code {code}")))?;
                Ok((sku, Some(code)))
            }
            ScanIdentifier::Sku(sku) => {
                let code = self
                    .with_gateway_timeout(
                        "item code lookup",
                        self.sku_resolver.item_code_for_sku(&sku),
                    )
                    .await?;
                Ok((sku, code))
            }
        }
    }

    /// Attempt the scan-triggered stock deduction. `InsufficientStock` is
    /// converted into a reportable status; anything else propagates.
    async fn attempt_deduction(
        &self,
        session: &Session,
        item_code: Option<&str>,
        request: &ScanRequest,
    ) -> EngineResult<DeductionStatus> {
        // Return sessions put stock back through a separate process; a scan
        // only records the count.
        if session.kind == SessionKind::Return {
            return Ok(DeductionStatus::Skipped);
        }
        let Some(item_code) = item_code else {
            return Ok(DeductionStatus::Skipped);
        };

        match self
            .with_pool_timeout(
                "stock deduction",
                inventory::deduct(
                    self.pool_store.as_ref(),
                    item_code,
                    request.quantity,
                    request.pool_hint,
                ),
            )
            .await
        {
            Ok(_) => Ok(DeductionStatus::Applied),
            Err(EngineError::InsufficientStock {
                item_code,
                requested,
                available,
            }) => {
                let reason =
                    format!("{item_code}: requested {requested}, available {available}");
                warn!(
                    session_id = %session.id,
                    item_code = %item_code,
                    requested,
                    available,
                    "Stock deduction failed, scan recorded anyway"
                );
                Ok(DeductionStatus::Failed { reason })
            }
            Err(other) => Err(other),
        }
    }

    // ========== Queries ==========

    pub fn get_session(&self, id: &str) -> EngineResult<Session> {
        self.store
            .get_session(id)?
            .ok_or_else(|| EngineError::not_found(format!("session {id}")))
    }

    /// All non-terminal sessions.
    pub fn active_sessions(&self) -> EngineResult<Vec<Session>> {
        Ok(self
            .store
            .all_sessions()?
            .into_iter()
            .filter(|session| !session.is_terminal())
            .collect())
    }

    pub fn sessions_for_invoice(&self, invoice_ref: &str) -> EngineResult<Vec<Session>> {
        self.store.sessions_for_invoice(invoice_ref)
    }

    pub fn sessions_with_status(&self, status: SessionStatus) -> EngineResult<Vec<Session>> {
        self.store.sessions_with_status(status)
    }

    /// Archive the entire active set to history and clear it.
    pub fn reset_all(&self) -> EngineResult<(usize, usize)> {
        self.store.reset_all()
    }
}

enum ExistingSession {
    Resume(Session),
    Restart(String),
    Conflict(EngineError),
}

fn wrong_state(state: &SessionState, message: &str) -> EngineError {
    EngineError::state_conflict(
        state.status(),
        state.owner().map(str::to_string),
        message.to_string(),
    )
}

/// The common precondition: session is `in_progress` and `actor` owns it.
fn require_owned_in_progress(session: &Session, actor: &str) -> EngineResult<()> {
    match &session.state {
        SessionState::InProgress { owner } if owner == actor => Ok(()),
        SessionState::InProgress { owner } => Err(EngineError::access_denied(format!(
            "session {} is owned by {owner}",
            session.id
        ))),
        other => Err(wrong_state(other, "session is not in progress")),
    }
}

fn expected_items(invoice: &shared::invoice::Invoice) -> EngineResult<Vec<ExpectedItem>> {
    let items: Vec<ExpectedItem> = invoice
        .fulfillable_items()
        .map(|item| ExpectedItem {
            sku: item.sku.clone(),
            name: item.name.clone(),
            qty_expected: item.qty_invoiced,
            unit_price: item.unit_price,
        })
        .collect();
    if items.is_empty() {
        return Err(EngineError::validation(format!(
            "invoice {} has no fulfillable items",
            invoice.invoice_id
        )));
    }
    Ok(items)
}
