//! Outbound notification queue and worker
//!
//! State-change notifications are fire-and-forget: the lifecycle manager
//! publishes after a successful persist and never waits on delivery. A full
//! queue drops the notification with a warning rather than blocking or
//! failing the operation that produced it.

use async_trait::async_trait;
use shared::notify::SessionNotification;
use shared::EngineResult;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

const BROADCAST_CAPACITY: usize = 256;

/// Delivery seam for the notification worker (push service, message bus).
#[async_trait]
pub trait NotificationEmitter: Send + Sync {
    async fn emit(&self, notification: &SessionNotification) -> EngineResult<()>;
}

/// Emitter that only writes the notification to the log.
pub struct LogEmitter;

#[async_trait]
impl NotificationEmitter for LogEmitter {
    async fn emit(&self, notification: &SessionNotification) -> EngineResult<()> {
        info!(
            session_id = %notification.session_id,
            invoice_ref = %notification.invoice_ref,
            event = ?notification.event,
            actor = %notification.actor,
            target = ?notification.target,
            "Session notification"
        );
        Ok(())
    }
}

/// Publish side: feeds the outbound queue and an in-process broadcast.
#[derive(Clone)]
pub struct Notifier {
    outbound: mpsc::Sender<SessionNotification>,
    broadcast: broadcast::Sender<SessionNotification>,
}

/// Create the notification channel pair. The receiver feeds a
/// [`NotificationWorker`].
pub fn channel(capacity: usize) -> (Notifier, mpsc::Receiver<SessionNotification>) {
    let (outbound, receiver) = mpsc::channel(capacity);
    let (broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);
    (Notifier { outbound, broadcast }, receiver)
}

impl Notifier {
    /// Fan out one notification. Never blocks and never fails the caller.
    pub fn publish(&self, notification: SessionNotification) {
        // In-process subscribers; no-subscriber send errors are normal.
        let _ = self.broadcast.send(notification.clone());

        match self.outbound.try_send(notification) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    session_id = %dropped.session_id,
                    event = ?dropped.event,
                    "Notification queue full, dropping notification"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Notification worker stopped, notification discarded");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.broadcast.subscribe()
    }
}

/// Background worker draining the outbound queue into an emitter.
pub struct NotificationWorker {
    receiver: mpsc::Receiver<SessionNotification>,
    emitter: Arc<dyn NotificationEmitter>,
}

impl NotificationWorker {
    pub fn new(
        receiver: mpsc::Receiver<SessionNotification>,
        emitter: Arc<dyn NotificationEmitter>,
    ) -> Self {
        Self { receiver, emitter }
    }

    /// Drain the queue until all senders are dropped. Emit failures are
    /// logged and the loop keeps going; one bad delivery must not stall the
    /// queue.
    pub async fn run(mut self) {
        info!("Notification worker started");
        while let Some(notification) = self.receiver.recv().await {
            if let Err(err) = self.emitter.emit(&notification).await {
                warn!(
                    session_id = %notification.session_id,
                    event = ?notification.event,
                    error = %err,
                    "Failed to emit notification"
                );
            }
        }
        info!("Notification worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use shared::notify::SessionEvent;
    use shared::session::SessionStatus;

    #[derive(Default)]
    struct CollectingEmitter {
        seen: Mutex<Vec<SessionNotification>>,
    }

    #[async_trait]
    impl NotificationEmitter for CollectingEmitter {
        async fn emit(&self, notification: &SessionNotification) -> EngineResult<()> {
            self.seen.lock().push(notification.clone());
            Ok(())
        }
    }

    fn notification(session_id: &str) -> SessionNotification {
        SessionNotification::new(
            session_id,
            "INV-1",
            SessionStatus::InProgress,
            SessionEvent::Started,
            "alice",
        )
    }

    #[tokio::test]
    async fn test_worker_drains_queue() {
        let (notifier, receiver) = channel(8);
        let emitter = Arc::new(CollectingEmitter::default());
        let worker = NotificationWorker::new(receiver, emitter.clone());

        notifier.publish(notification("ses-1"));
        notifier.publish(notification("ses-2"));
        drop(notifier);

        worker.run().await;

        let seen = emitter.seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].session_id, "ses-1");
        assert_eq!(seen[1].session_id, "ses-2");
    }

    #[tokio::test]
    async fn test_publish_drops_on_full_queue() {
        let (notifier, receiver) = channel(1);

        notifier.publish(notification("ses-1"));
        // Queue capacity 1 and no worker draining; this one is dropped.
        notifier.publish(notification("ses-2"));

        let emitter = Arc::new(CollectingEmitter::default());
        drop(notifier);
        NotificationWorker::new(receiver, emitter.clone()).run().await;
        assert_eq!(emitter.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_subscribers_see_events() {
        let (notifier, _receiver) = channel(8);
        let mut subscriber = notifier.subscribe();

        notifier.publish(notification("ses-1"));

        let seen = subscriber.recv().await.unwrap();
        assert_eq!(seen.session_id, "ses-1");
        assert_eq!(seen.event, SessionEvent::Started);
    }
}
