//! Startup session restore and the long-lived session-change listener.

use futures::future::{AbortHandle, Abortable, Aborted};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::error::{BootstrapTimeout, Notice};
use crate::remote::AuthSubscription;
use crate::store::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Authenticated,
    Anonymous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    Idle,
    Initializing,
    Ready(Readiness),
    /// The session check itself failed, distinct from "no session"
    Failed(Notice),
}

impl BootstrapPhase {
    pub fn is_settled(&self) -> bool {
        matches!(self, BootstrapPhase::Ready(_) | BootstrapPhase::Failed(_))
    }
}

pub struct Bootstrapper {
    store: SessionStore,
    timeout: Duration,
    phase: watch::Sender<BootstrapPhase>,
}

impl Bootstrapper {
    pub fn new(store: SessionStore, config: &SessionConfig) -> Self {
        let (phase, _) = watch::channel(BootstrapPhase::Idle);
        Self {
            store,
            timeout: config.bootstrap_timeout(),
            phase,
        }
    }

    pub fn phase(&self) -> BootstrapPhase {
        *self.phase.borrow()
    }

    /// Subscribe to session changes, then restore the stored session within
    /// the configured bound. Must be called inside a tokio runtime.
    pub fn start(self) -> BootstrapHandle {
        let Bootstrapper {
            store,
            timeout,
            phase,
        } = self;
        let phase_rx = phase.subscribe();
        phase.send_replace(BootstrapPhase::Initializing);
        tracing::info!("Checking for an existing session");

        // Subscribe first so no change between restore and listen is lost
        let subscription = store.remote().subscribe();
        let (listener, registration) = AbortHandle::new_pair();
        let listener_task = tokio::spawn(Abortable::new(
            listen(store.clone(), subscription),
            registration,
        ));
        let init_task = tokio::spawn(initialize(store, timeout, phase));

        BootstrapHandle {
            phase: phase_rx,
            listener,
            listener_task: Some(listener_task),
            init_task: Some(init_task),
        }
    }
}

async fn initialize(store: SessionStore, timeout: Duration, phase: watch::Sender<BootstrapPhase>) {
    let epoch = store.epoch();

    let settled = tokio::select! {
        settled = restore(&store, epoch) => settled,
        _ = tokio::time::sleep(timeout) => {
            let err = BootstrapTimeout { after: timeout };
            tracing::error!("{}", err);
            if store.fail_session_check(epoch, Notice::SessionCheckTimedOut) {
                BootstrapPhase::Failed(Notice::SessionCheckTimedOut)
            } else {
                readiness(&store)
            }
        }
    };

    store.finish_loading(epoch);
    tracing::info!("Session bootstrap finished: {:?}", settled);
    phase.send_replace(settled);
}

async fn restore(store: &SessionStore, epoch: u64) -> BootstrapPhase {
    match store.remote().get_session().await {
        Ok(Some(session)) => {
            tracing::info!("Restoring session for user {}", session.user.id);
            if let Err(e) = store.establish(epoch, session).await {
                tracing::warn!("Restored session discarded: {}", e);
            }
            readiness(store)
        }
        Ok(None) => {
            store.apply_if_current(epoch, |s| s.clear_identity());
            BootstrapPhase::Ready(Readiness::Anonymous)
        }
        Err(e) => {
            tracing::error!("Session check failed: {}", e);
            if store.fail_session_check(epoch, Notice::ServiceUnavailable) {
                BootstrapPhase::Failed(Notice::ServiceUnavailable)
            } else {
                readiness(store)
            }
        }
    }
}

fn readiness(store: &SessionStore) -> BootstrapPhase {
    if store.current_state().is_authenticated() {
        BootstrapPhase::Ready(Readiness::Authenticated)
    } else {
        BootstrapPhase::Ready(Readiness::Anonymous)
    }
}

async fn listen(store: SessionStore, mut subscription: AuthSubscription) {
    while let Some(change) = subscription.recv().await {
        store.handle_auth_change(change).await;
    }
    tracing::debug!("Session change stream closed");
}

/// Keeps the session-change listener alive. The subscription is released
/// when the handle is shut down or dropped.
pub struct BootstrapHandle {
    phase: watch::Receiver<BootstrapPhase>,
    listener: AbortHandle,
    listener_task: Option<JoinHandle<Result<(), Aborted>>>,
    init_task: Option<JoinHandle<()>>,
}

impl BootstrapHandle {
    pub fn phase(&self) -> BootstrapPhase {
        *self.phase.borrow()
    }

    /// Wait until the initial check has settled
    pub async fn ready(&self) -> BootstrapPhase {
        let mut phase = self.phase.clone();
        loop {
            let current = *phase.borrow_and_update();
            if current.is_settled() {
                return current;
            }
            if phase.changed().await.is_err() {
                return *phase.borrow();
            }
        }
    }

    /// Stop listening and wait for the listener to release its subscription
    pub async fn shutdown(mut self) {
        self.listener.abort();
        if let Some(init) = self.init_task.take() {
            init.abort();
            let _ = init.await;
        }
        if let Some(listener) = self.listener_task.take() {
            let _ = listener.await;
        }
        tracing::debug!("Session listener stopped");
    }
}

impl Drop for BootstrapHandle {
    fn drop(&mut self) {
        self.listener.abort();
        if let Some(init) = self.init_task.take() {
            init.abort();
        }
    }
}
