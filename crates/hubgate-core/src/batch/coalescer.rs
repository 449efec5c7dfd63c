//! Batch window registry and delivery

use super::{BulkLister, Lookup};
use crate::error::{HubError, HubResult};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type Delivery<T> = oneshot::Sender<HubResult<Option<T>>>;

/// Lookups gathered for one group while its window is open
struct BatchWindow<T> {
    opened_at: Instant,
    waiters: Vec<(String, Delivery<T>)>,
}

struct Shared<L: BulkLister> {
    lister: L,
    window: Duration,
    /// At most one open window per group. Joining and opening both go
    /// through the entry API, so they are atomic per key.
    registry: DashMap<L::Group, BatchWindow<L::Item>>,
}

/// Coalesces single-item lookups into bulk listings
///
/// Cloning is cheap and clones share the same registry.
pub struct BatchCoalescer<L: BulkLister> {
    shared: Arc<Shared<L>>,
}

impl<L: BulkLister> Clone for BatchCoalescer<L> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<L: BulkLister> BatchCoalescer<L> {
    pub fn new(lister: L, window: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                lister,
                window,
                registry: DashMap::new(),
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.shared.window
    }

    pub fn lister(&self) -> &L {
        &self.shared.lister
    }

    /// Number of windows currently open
    pub fn pending_windows(&self) -> usize {
        self.shared.registry.len()
    }

    /// Look up one item, waiting for the batch it joins to complete
    ///
    /// If `cancel` fires first this caller stops waiting and gets
    /// [`HubError::Cancelled`]; the batch itself still runs for everyone
    /// else. Must be called from within a tokio runtime.
    pub async fn lookup(
        &self,
        cancel: &CancellationToken,
        group: L::Group,
        item_key: &str,
    ) -> HubResult<Option<L::Item>> {
        if cancel.is_cancelled() {
            return Err(HubError::Cancelled);
        }

        let label = group.to_string();
        let receiver = self.enqueue(group, item_key);

        tokio::select! {
            delivered = receiver => {
                delivered.unwrap_or_else(|_| Err(HubError::batch_aborted(label.as_str())))
            }
            _ = cancel.cancelled() => {
                debug!(group = %label, item = item_key, "lookup cancelled while waiting for batch");
                Err(HubError::Cancelled)
            }
        }
    }

    /// Attach a waiter to the open window for `group`, opening one if needed
    fn enqueue(&self, group: L::Group, item_key: &str) -> oneshot::Receiver<HubResult<Option<L::Item>>> {
        let (sender, receiver) = oneshot::channel();

        match self.shared.registry.entry(group.clone()) {
            Entry::Occupied(mut entry) => {
                let window = entry.get_mut();
                window.waiters.push((item_key.to_string(), sender));
                debug!(
                    group = %group,
                    item = item_key,
                    waiters = window.waiters.len(),
                    "joined open batch window"
                );
            }
            Entry::Vacant(entry) => {
                entry.insert(BatchWindow {
                    opened_at: Instant::now(),
                    waiters: vec![(item_key.to_string(), sender)],
                });
                debug!(group = %group, item = item_key, "opened batch window");

                // The batch runs detached so no single caller going away can
                // abort it.
                let shared = Arc::clone(&self.shared);
                tokio::spawn(run_batch(shared, group));
            }
        }

        receiver
    }
}

async fn run_batch<L: BulkLister>(shared: Arc<Shared<L>>, group: L::Group) {
    tokio::time::sleep(shared.window).await;

    let Some((_, window)) = shared.registry.remove(&group) else {
        warn!(group = %group, "batch window vanished before closing");
        return;
    };

    let waiters = window.waiters.len();
    let started = Instant::now();
    let result = shared.lister.list(&group).await;
    let list_ms = started.elapsed().as_millis() as u64;
    let open_ms = window.opened_at.elapsed().as_millis() as u64;

    match result {
        Ok(items) => {
            info!(
                group = %group,
                waiters,
                items = items.len(),
                list_ms,
                open_ms,
                "batch completed"
            );
            deliver(window.waiters, &items, L::item_key);
        }
        Err(error) => {
            warn!(group = %group, waiters, error = %error, "batch listing failed");
            for (_, sender) in window.waiters {
                let _ = sender.send(Err(error.clone()));
            }
        }
    }
}

fn deliver<T: Clone>(
    waiters: Vec<(String, Delivery<T>)>,
    items: &[T],
    item_key: fn(&T) -> &str,
) {
    let mut index: HashMap<&str, &T> = HashMap::with_capacity(items.len());
    for item in items {
        index.entry(item_key(item)).or_insert(item);
    }

    for (key, sender) in waiters {
        let found = index.get(key.as_str()).map(|item| (*item).clone());
        if sender.send(Ok(found)).is_err() {
            debug!(item = %key, "waiter left before delivery");
        }
    }
}

#[async_trait]
impl<L: BulkLister> Lookup for BatchCoalescer<L> {
    type Group = L::Group;
    type Item = L::Item;

    async fn lookup(
        &self,
        cancel: &CancellationToken,
        group: Self::Group,
        item_key: &str,
    ) -> HubResult<Option<Self::Item>> {
        BatchCoalescer::lookup(self, cancel, group, item_key).await
    }
}
