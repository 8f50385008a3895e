use shared::AuthStateChange;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 32;

/// Fan-out of session changes to every live subscription
#[derive(Clone)]
pub struct AuthEvents {
    sender: broadcast::Sender<AuthStateChange>,
    subscribed: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            sender,
            subscribed: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn subscribe(&self) -> AuthSubscription {
        self.subscribed.fetch_add(1, Ordering::SeqCst);
        let released = self.released.clone();
        AuthSubscription {
            receiver: self.sender.subscribe(),
            release: Some(Box::new(move || {
                released.fetch_add(1, Ordering::SeqCst);
            })),
        }
    }

    pub fn emit(&self, change: AuthStateChange) {
        tracing::debug!("auth state change: {:?}", change.event);
        // No receivers is fine; nobody is listening yet
        let _ = self.sender.send(change);
    }

    pub fn subscribed(&self) -> usize {
        self.subscribed.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.subscribed().saturating_sub(self.released())
    }
}

/// Live subscription to session changes. Released exactly once, either by
/// [`AuthSubscription::unsubscribe`] or on drop.
pub struct AuthSubscription {
    receiver: broadcast::Receiver<AuthStateChange>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl AuthSubscription {
    /// Next change, or `None` once the service side has gone away
    pub async fn recv(&mut self) -> Option<AuthStateChange> {
        loop {
            match self.receiver.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("auth subscription lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        self.release();
    }
}
