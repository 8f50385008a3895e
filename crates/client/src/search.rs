use futures::future::{AbortHandle, Abortable, Aborted};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::error::GuardFailure;
use crate::resources::{Resource, ResourceAccess};

/// Latest published search: the term and the rows it matched
#[derive(Debug, Clone)]
pub struct SearchResults<R> {
    pub term: String,
    pub items: Vec<R>,
}

impl<R> Default for SearchResults<R> {
    fn default() -> Self {
        Self {
            term: String::new(),
            items: Vec::new(),
        }
    }
}

/// Search-as-you-type over one collection. Only the last term typed within
/// the debounce window reaches the service.
pub struct DebouncedSearch<R> {
    access: ResourceAccess<R>,
    delay: Duration,
    pending: Mutex<Option<AbortHandle>>,
    results: Arc<watch::Sender<SearchResults<R>>>,
}

impl<R: Resource + Clone> DebouncedSearch<R> {
    pub fn new(access: ResourceAccess<R>, config: &SessionConfig) -> Self {
        let (results, _) = watch::channel(SearchResults::default());
        Self {
            access,
            delay: config.search_debounce(),
            pending: Mutex::new(None),
            results: Arc::new(results),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchResults<R>> {
        self.results.subscribe()
    }

    /// Schedule a search for `term`, superseding any pending one
    pub fn search(&self, term: &str) -> SearchTask<R> {
        let (handle, registration) = AbortHandle::new_pair();
        if let Some(previous) = self.pending().replace(handle.clone()) {
            previous.abort();
        }

        let access = self.access.clone();
        let results = self.results.clone();
        let delay = self.delay;
        let term = term.to_string();
        let superseded = handle.clone();

        let join = tokio::spawn(Abortable::new(
            async move {
                tokio::time::sleep(delay).await;
                let items = access.list(Some(&term)).await?;
                if superseded.is_aborted() {
                    tracing::debug!("Discarding results for superseded term {:?}", term);
                    return Ok(None);
                }
                results.send_replace(SearchResults {
                    term,
                    items: items.clone(),
                });
                Ok::<_, GuardFailure>(Some(items))
            },
            registration,
        ));

        SearchTask { handle, join }
    }

    pub fn cancel(&self) {
        if let Some(pending) = self.pending().take() {
            pending.abort();
        }
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, Option<AbortHandle>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R> Drop for DebouncedSearch<R> {
    fn drop(&mut self) {
        let pending = self
            .pending
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = pending.take() {
            pending.abort();
        }
    }
}

type SearchOutput<R> = Result<Option<Vec<R>>, GuardFailure>;

/// Handle to one scheduled search
pub struct SearchTask<R> {
    handle: AbortHandle,
    join: JoinHandle<Result<SearchOutput<R>, Aborted>>,
}

impl<R> SearchTask<R> {
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_aborted()
    }

    /// Wait for the task. `Ok(None)` means it was superseded or cancelled
    /// and published nothing.
    pub async fn join(self) -> Result<Option<Vec<R>>, GuardFailure> {
        match self.join.await {
            Ok(Ok(output)) => output,
            Ok(Err(Aborted)) => Ok(None),
            Err(e) => {
                tracing::error!("Search task failed: {}", e);
                Ok(None)
            }
        }
    }
}
