//! Time-windowed request coalescing
//!
//! Turns many concurrent "read one item of group G" calls into a single
//! "list everything in G" call. The first lookup for a group opens a window;
//! lookups for the same group that arrive before it closes join it. When the
//! window elapses, one bulk listing is fetched and each caller receives the
//! entry matching its own key, or `None` if the listing lacks it.

mod coalescer;


pub use coalescer::BatchCoalescer;

use crate::error::HubResult;
use async_trait::async_trait;
use std::fmt::Display;
use std::hash::Hash;
use tokio_util::sync::CancellationToken;

/// A bulk-list operation that a coalescer can batch lookups into
#[async_trait]
pub trait BulkLister: Send + Sync + 'static {
    /// Coarse key a listing is fetched for (e.g. a repository)
    type Group: Clone + Eq + Hash + Display + Send + Sync + 'static;
    /// One element of the listing
    type Item: Clone + Send + Sync + 'static;

    /// Fetch the complete listing for a group, across all pages
    async fn list(&self, group: &Self::Group) -> HubResult<Vec<Self::Item>>;

    /// Fine key identifying an item within its group
    fn item_key(item: &Self::Item) -> &str;
}

/// Single-item read capability handed to resource logic
///
/// `Ok(None)` means the listing succeeded and the item does not exist,
/// which is distinct from any `Err`.
#[async_trait]
pub trait Lookup: Send + Sync {
    type Group: Send + 'static;
    type Item: Send + 'static;

    async fn lookup(
        &self,
        cancel: &CancellationToken,
        group: Self::Group,
        item_key: &str,
    ) -> HubResult<Option<Self::Item>>;
}
