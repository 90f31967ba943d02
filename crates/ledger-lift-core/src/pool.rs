//! Bounded page-level parallelism.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tracing::debug;

use crate::error::ExtractError;
use crate::model::PageSummary;

/// Cooperative cancellation shared between a caller and page workers.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub type PageCallback = Arc<dyn Fn(&PageSummary) + Send + Sync>;

/// Per-run controls: a cancellation flag and an optional observer that sees
/// each page summary as soon as that page finishes.
#[derive(Clone, Default)]
pub struct RunControl {
    pub cancel: CancelFlag,
    pub on_page: Option<PageCallback>,
}

impl RunControl {
    #[must_use]
    pub fn with_cancel(cancel: CancelFlag) -> Self {
        Self {
            cancel,
            on_page: None,
        }
    }

    #[must_use]
    pub fn on_page(mut self, callback: impl Fn(&PageSummary) + Send + Sync + 'static) -> Self {
        self.on_page = Some(Arc::new(callback));
        self
    }

    pub(crate) fn report(&self, summary: &PageSummary) {
        if let Some(callback) = &self.on_page {
            callback(summary);
        }
    }
}

impl std::fmt::Debug for RunControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunControl")
            .field("cancel", &self.cancel)
            .field("on_page", &self.on_page.is_some())
            .finish()
    }
}

/// Runs `work` for every page on at most `max_workers` scoped threads.
///
/// Workers pull the next page from a shared cursor and check `cancel`
/// before starting each one. Results come back in the order of `pages`.
/// A cancelled run returns [`ExtractError::Cancelled`].
pub fn run_pages<T, F>(
    pages: &[u32],
    max_workers: usize,
    cancel: &CancelFlag,
    work: F,
) -> Result<Vec<T>, ExtractError>
where
    T: Send,
    F: Fn(u32) -> T + Sync,
{
    if cancel.is_cancelled() {
        return Err(ExtractError::Cancelled);
    }

    let workers = max_workers.clamp(1, pages.len().max(1));
    let cursor = AtomicUsize::new(0);
    let slots = pages.iter().map(|_| Mutex::new(None)).collect::<Vec<_>>();
    debug!(pages = pages.len(), workers, "starting page workers");

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                while !cancel.is_cancelled() {
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(&page) = pages.get(index) else {
                        break;
                    };
                    let result = work(page);
                    *slots[index].lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
                }
            });
        }
    });

    if cancel.is_cancelled() {
        debug!("page workers cancelled");
        return Err(ExtractError::Cancelled);
    }

    slots
        .into_iter()
        .map(|slot| {
            slot.into_inner()
                .unwrap_or_else(PoisonError::into_inner)
                .ok_or(ExtractError::Cancelled)
        })
        .collect()
}
