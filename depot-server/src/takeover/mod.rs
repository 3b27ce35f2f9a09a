//! Ownership-transfer coordination
//!
//! A worker who wants a session someone else holds files a takeover request;
//! only the owner snapshotted at request time may answer it. Accepting
//! re-validates the session under the same per-session lock the lifecycle
//! manager uses, so a transfer cannot race a release or completion.

use crate::notify::Notifier;
use crate::sessions::locks::SessionLocks;
use crate::sessions::storage::SessionStore;
use shared::notify::{SessionEvent, SessionNotification};
use shared::session::{AuditAction, SessionState, TakeoverRequest};
use shared::{EngineError, EngineResult};
use std::sync::Arc;
use tracing::info;

pub struct TakeoverCoordinator {
    store: Arc<dyn SessionStore>,
    notifier: Notifier,
    locks: Arc<SessionLocks>,
}

impl TakeoverCoordinator {
    /// `locks` must be the lifecycle manager's lock map.
    pub fn new(store: Arc<dyn SessionStore>, notifier: Notifier, locks: Arc<SessionLocks>) -> Self {
        Self {
            store,
            notifier,
            locks,
        }
    }

    fn notify(&self, request: &TakeoverRequest, event: SessionEvent, actor: &str, target: &str) {
        if let Ok(Some(session)) = self.store.get_session(&request.session_id) {
            self.notifier.publish(
                SessionNotification::new(
                    &session.id,
                    &session.invoice_ref,
                    session.status(),
                    event,
                    actor,
                )
                .with_target(target),
            );
        }
    }

    /// File a takeover request for an in-progress session held by someone
    /// else. Idempotent per (session, requester): an existing pending
    /// request is returned instead of a duplicate.
    pub async fn create_request(
        &self,
        session_id: &str,
        requester: &str,
    ) -> EngineResult<TakeoverRequest> {
        let _guard = self.locks.acquire(session_id).await;

        let session = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| EngineError::not_found(format!("session {session_id}")))?;
        let owner = match &session.state {
            SessionState::InProgress { owner } => owner.clone(),
            other => {
                return Err(EngineError::state_conflict(
                    other.status(),
                    other.owner().map(str::to_string),
                    "takeover requires an in-progress session",
                ))
            }
        };
        if owner == requester {
            return Err(EngineError::validation(format!(
                "{requester} already owns session {session_id}"
            )));
        }

        if let Some(existing) = self.store.pending_takeover_for(session_id, requester)? {
            return Ok(existing);
        }

        let request = TakeoverRequest::new(session_id, requester, &owner);
        self.store.insert_takeover(&request)?;
        self.store.update_session(session_id, &mut |session| {
            session.push_audit(
                AuditAction::TakeoverRequested,
                requester,
                Some(format!("owner {owner}")),
            );
            Ok(())
        })?;

        info!(session_id = %session_id, requester = %requester, owner = %owner, "Takeover requested");
        self.notify(&request, SessionEvent::TakeoverRequested, requester, &owner);
        Ok(request)
    }

    /// Answer a pending request. Only the snapshotted owner may respond.
    /// Accepting transfers ownership after re-validating that the session is
    /// still in progress under that same owner; on a conflict the request
    /// stays pending.
    pub async fn respond(
        &self,
        request_id: &str,
        accept: bool,
        responder: &str,
    ) -> EngineResult<TakeoverRequest> {
        let session_id = self
            .store
            .get_takeover(request_id)?
            .ok_or_else(|| EngineError::not_found(format!("takeover request {request_id}")))?
            .session_id;

        let _guard = self.locks.acquire(&session_id).await;

        // Re-read under the lock: a concurrent response may have resolved
        // the request while we waited for it.
        let request = self
            .store
            .get_takeover(request_id)?
            .ok_or_else(|| EngineError::not_found(format!("takeover request {request_id}")))?;
        if responder != request.current_owner {
            return Err(EngineError::access_denied(format!(
                "only {} may respond to request {request_id}",
                request.current_owner
            )));
        }
        if !request.is_pending() {
            return Err(EngineError::validation(format!(
                "takeover request {request_id} was already answered"
            )));
        }

        let (action, event) = if accept {
            // Transfer first; a conflict here leaves the request pending.
            self.store.update_session(&request.session_id, &mut |session| {
                match &session.state {
                    SessionState::InProgress { owner } if *owner == request.current_owner => {}
                    other => {
                        return Err(EngineError::state_conflict(
                            other.status(),
                            other.owner().map(str::to_string),
                            "session changed hands since the request was filed",
                        ))
                    }
                }
                session.state = SessionState::InProgress {
                    owner: request.requested_by.clone(),
                };
                session.push_audit(
                    AuditAction::TakeoverAccepted,
                    responder,
                    Some(format!("-> {}", request.requested_by)),
                );
                session.touch(responder);
                Ok(())
            })?;
            (AuditAction::TakeoverAccepted, SessionEvent::TakeoverAccepted)
        } else {
            self.store.update_session(&request.session_id, &mut |session| {
                session.push_audit(AuditAction::TakeoverDeclined, responder, None);
                Ok(())
            })?;
            (AuditAction::TakeoverDeclined, SessionEvent::TakeoverDeclined)
        };

        let resolved = self
            .store
            .update_takeover(request_id, &mut |request| {
                request.resolve(accept);
                Ok(())
            })?;

        info!(
            request_id = %request_id,
            session_id = %resolved.session_id,
            accepted = accept,
            action = ?action,
            "Takeover request answered"
        );
        self.notify(&resolved, event, responder, &resolved.requested_by);
        Ok(resolved)
    }

    /// Pending requests awaiting the given owner's answer.
    pub fn pending_for_owner(&self, owner: &str) -> EngineResult<Vec<TakeoverRequest>> {
        self.store.pending_for_owner(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify;
    use crate::sessions::storage::RedbSessionStore;
    use rust_decimal::Decimal;
    use shared::session::{ExpectedItem, Session, SessionKind, SessionStatus, TakeoverStatus};

    fn in_progress_session(owner: &str) -> Session {
        Session::new(
            "INV-1",
            "ORD-1",
            SessionKind::Pick,
            SessionState::InProgress {
                owner: owner.to_string(),
            },
            vec![ExpectedItem {
                sku: "SKU-A".to_string(),
                name: "Widget".to_string(),
                qty_expected: 1,
                unit_price: Decimal::ONE,
            }],
            owner,
        )
    }

    fn coordinator() -> (TakeoverCoordinator, Arc<RedbSessionStore>) {
        let (coordinator, store, _locks) = coordinator_with_locks();
        (coordinator, store)
    }

    fn coordinator_with_locks() -> (TakeoverCoordinator, Arc<RedbSessionStore>, Arc<SessionLocks>) {
        let store = Arc::new(RedbSessionStore::open_in_memory().unwrap());
        let (notifier, _receiver) = notify::channel(64);
        let locks = Arc::new(SessionLocks::new());
        let coordinator = TakeoverCoordinator::new(store.clone(), notifier, locks.clone());
        (coordinator, store, locks)
    }

    #[tokio::test]
    async fn test_create_request_snapshots_owner() {
        let (coordinator, store) = coordinator();
        let session = in_progress_session("alice");
        store.insert_session(&session).unwrap();

        let request = coordinator.create_request(&session.id, "bob").await.unwrap();
        assert_eq!(request.current_owner, "alice");
        assert_eq!(request.requested_by, "bob");
        assert!(request.is_pending());

        let audited = store.get_session(&session.id).unwrap().unwrap();
        assert_eq!(
            audited.audit_log.last().unwrap().action,
            AuditAction::TakeoverRequested
        );
    }

    #[tokio::test]
    async fn test_create_request_is_idempotent() {
        let (coordinator, store) = coordinator();
        let session = in_progress_session("alice");
        store.insert_session(&session).unwrap();

        let first = coordinator.create_request(&session.id, "bob").await.unwrap();
        let second = coordinator.create_request(&session.id, "bob").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(coordinator.pending_for_owner("alice").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_request_rejects_owner_and_wrong_state() {
        let (coordinator, store) = coordinator();
        let session = in_progress_session("alice");
        store.insert_session(&session).unwrap();

        let err = coordinator
            .create_request(&session.id, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let draft = Session::new(
            "INV-2",
            "ORD-2",
            SessionKind::Pick,
            SessionState::Draft,
            vec![],
            "alice",
        );
        store.insert_session(&draft).unwrap();
        let err = coordinator
            .create_request(&draft.id, "bob")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StateConflict { .. }));
    }

    #[tokio::test]
    async fn test_accept_transfers_ownership() {
        let (coordinator, store) = coordinator();
        let session = in_progress_session("alice");
        store.insert_session(&session).unwrap();
        let request = coordinator.create_request(&session.id, "bob").await.unwrap();

        let resolved = coordinator.respond(&request.id, true, "alice").await.unwrap();
        assert_eq!(resolved.status, TakeoverStatus::Accepted);
        assert!(resolved.responded_at.is_some());

        let session = store.get_session(&session.id).unwrap().unwrap();
        assert_eq!(session.owner(), Some("bob"));
        assert_eq!(session.status(), SessionStatus::InProgress);
        assert_eq!(
            session.audit_log.last().unwrap().action,
            AuditAction::TakeoverAccepted
        );
    }

    #[tokio::test]
    async fn test_decline_leaves_ownership() {
        let (coordinator, store) = coordinator();
        let session = in_progress_session("alice");
        store.insert_session(&session).unwrap();
        let request = coordinator.create_request(&session.id, "bob").await.unwrap();

        let resolved = coordinator.respond(&request.id, false, "alice").await.unwrap();
        assert_eq!(resolved.status, TakeoverStatus::Declined);

        let session = store.get_session(&session.id).unwrap().unwrap();
        assert_eq!(session.owner(), Some("alice"));
        assert!(coordinator.pending_for_owner("alice").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_respond_requires_snapshot_owner() {
        let (coordinator, store) = coordinator();
        let session = in_progress_session("alice");
        store.insert_session(&session).unwrap();
        let request = coordinator.create_request(&session.id, "bob").await.unwrap();

        // Not even the requester may answer their own request
        let err = coordinator.respond(&request.id, true, "bob").await.unwrap_err();
        assert!(matches!(err, EngineError::AccessDenied(_)));
        let err = coordinator
            .respond(&request.id, true, "carol")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn test_respond_twice_is_rejected() {
        let (coordinator, store) = coordinator();
        let session = in_progress_session("alice");
        store.insert_session(&session).unwrap();
        let request = coordinator.create_request(&session.id, "bob").await.unwrap();

        coordinator.respond(&request.id, false, "alice").await.unwrap();
        let err = coordinator
            .respond(&request.id, true, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_racing_responses_resolve_the_request_once() {
        let (coordinator, store, locks) = coordinator_with_locks();
        let session = in_progress_session("alice");
        store.insert_session(&session).unwrap();
        let request = coordinator.create_request(&session.id, "bob").await.unwrap();

        // Park an accept and a decline behind the session lock so both are
        // in flight before either resolves the request
        let guard = locks.acquire(&session.id).await;
        let coordinator = Arc::new(coordinator);
        let accept = {
            let coordinator = coordinator.clone();
            let id = request.id.clone();
            tokio::spawn(async move { coordinator.respond(&id, true, "alice").await })
        };
        let decline = {
            let coordinator = coordinator.clone();
            let id = request.id.clone();
            tokio::spawn(async move { coordinator.respond(&id, false, "alice").await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(guard);

        let accept = accept.await.unwrap();
        let decline = decline.await.unwrap();

        // Exactly one answer lands; the loser is told the request was
        // already answered, and the stored record matches the winner
        let resolved = store.get_takeover(&request.id).unwrap().unwrap();
        let owner = store
            .get_session(&session.id)
            .unwrap()
            .unwrap()
            .owner()
            .map(str::to_string);
        match (accept, decline) {
            (Ok(request), Err(EngineError::Validation(_))) => {
                assert_eq!(request.status, TakeoverStatus::Accepted);
                assert_eq!(resolved.status, TakeoverStatus::Accepted);
                assert_eq!(owner.as_deref(), Some("bob"));
            }
            (Err(EngineError::Validation(_)), Ok(request)) => {
                assert_eq!(request.status, TakeoverStatus::Declined);
                assert_eq!(resolved.status, TakeoverStatus::Declined);
                assert_eq!(owner.as_deref(), Some("alice"));
            }
            other => panic!("expected one winner and one rejection: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_accept_conflicts_when_session_changed_hands() {
        let (coordinator, store) = coordinator();
        let session = in_progress_session("alice");
        store.insert_session(&session).unwrap();
        let request = coordinator.create_request(&session.id, "bob").await.unwrap();

        // Session moves on before alice answers
        store
            .update_session(&session.id, &mut |session| {
                session.state = SessionState::Draft;
                Ok(())
            })
            .unwrap();

        let err = coordinator
            .respond(&request.id, true, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StateConflict { .. }));

        // The request is still pending and may be declined
        let resolved = coordinator.respond(&request.id, false, "alice").await.unwrap();
        assert_eq!(resolved.status, TakeoverStatus::Declined);
    }
}
