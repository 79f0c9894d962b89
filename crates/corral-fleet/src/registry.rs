//! Shared connection registry.
//!
//! Backends reach their hypervisors through connections that are expensive
//! to open and safe to share. The registry refcounts one opened handle per
//! connection identity so concurrent backends reuse it instead of opening
//! duplicates.
//!
//! The registry is an explicitly owned value: the application constructs it,
//! threads it to whoever needs it, and calls [`shutdown`] when tearing down.
//! There is no global static and no process-exit hook; the force-close in
//! `shutdown` is a safety net for leaked acquisitions, not the primary
//! release path.
//!
//! [`shutdown`]: SharedConnectionRegistry::shutdown

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use corral_core::{ConnectionUri, Result};

/// Opens and closes native backend connections.
///
/// Both operations may perform I/O. The registry guarantees `open` is called
/// at most once per connection identity while the refcount stays above zero.
#[async_trait]
pub trait ConnectionOpener: Send + Sync + 'static {
    /// The native connection handle this opener produces.
    type Handle: Send + Sync + 'static;

    /// Opens a connection to the given endpoint.
    async fn open(&self, uri: &ConnectionUri) -> Result<Self::Handle>;

    /// Closes a previously opened connection.
    async fn close(&self, uri: &ConnectionUri, handle: &Self::Handle) -> Result<()>;
}

struct Slot<H> {
    handle: Option<Arc<H>>,
    refcount: usize,
    /// Set when the slot has been evicted from the map; a racing `acquire`
    /// that still holds the old `Arc` must retry against a fresh slot.
    evicted: bool,
}

impl<H> Slot<H> {
    fn new() -> Self {
        Self {
            handle: None,
            refcount: 0,
            evicted: false,
        }
    }
}

/// Refcounted cache of opened backend connections, keyed by endpoint
/// identity.
///
/// Synchronization is per connection identity: the map lock is held only
/// long enough to fetch or insert a slot, and the open/close I/O happens
/// under that slot's own lock. Unrelated connections never serialize
/// against each other, while duplicate-open races for one identity are
/// impossible.
pub struct SharedConnectionRegistry<O: ConnectionOpener> {
    opener: O,
    slots: Mutex<HashMap<ConnectionUri, Arc<Mutex<Slot<O::Handle>>>>>,
}

impl<O: ConnectionOpener> SharedConnectionRegistry<O> {
    /// Creates a registry that opens connections through the given opener.
    pub fn new(opener: O) -> Self {
        Self {
            opener,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the opened handle for the given identity, opening it on first
    /// acquisition, and increments its refcount.
    pub async fn acquire(&self, uri: &ConnectionUri) -> Result<Arc<O::Handle>> {
        loop {
            let slot = {
                let mut slots = self.slots.lock().await;
                Arc::clone(
                    slots
                        .entry(uri.clone())
                        .or_insert_with(|| Arc::new(Mutex::new(Slot::new()))),
                )
            };

            let mut slot = slot.lock().await;
            if slot.evicted {
                // Lost a race against a release that evicted this slot.
                continue;
            }

            let handle = match &slot.handle {
                Some(handle) => Arc::clone(handle),
                None => {
                    debug!(uri = %uri, "opening backend connection");
                    let handle = Arc::new(self.opener.open(uri).await?);
                    slot.handle = Some(Arc::clone(&handle));
                    handle
                }
            };

            slot.refcount += 1;
            return Ok(handle);
        }
    }

    /// Decrements the refcount for the given identity, closing and evicting
    /// the entry when it reaches zero.
    ///
    /// Releasing an identity whose refcount is already zero is logged as a
    /// warning and otherwise ignored.
    pub async fn release(&self, uri: &ConnectionUri) {
        let slot = {
            let slots = self.slots.lock().await;
            slots.get(uri).cloned()
        };

        let Some(slot) = slot else {
            warn!(uri = %uri, "release of connection that was never acquired");
            return;
        };

        let mut guard = slot.lock().await;
        if guard.refcount == 0 {
            warn!(uri = %uri, "release of connection with zero refcount");
            return;
        }

        guard.refcount -= 1;
        if guard.refcount > 0 {
            return;
        }

        guard.evicted = true;
        let handle = guard.handle.take();
        {
            let mut slots = self.slots.lock().await;
            slots.remove(uri);
        }

        if let Some(handle) = handle {
            debug!(uri = %uri, "closing backend connection");
            if let Err(e) = self.opener.close(uri, &handle).await {
                warn!(uri = %uri, error = %e, "failed to close backend connection");
            }
        }
    }

    /// Returns the current refcount for an identity. Zero if unknown.
    pub async fn refcount(&self, uri: &ConnectionUri) -> usize {
        let slot = {
            let slots = self.slots.lock().await;
            slots.get(uri).cloned()
        };
        match slot {
            Some(slot) => slot.lock().await.refcount,
            None => 0,
        }
    }

    /// Force-closes every still-open entry.
    ///
    /// Application-driven teardown. Surviving entries indicate acquisitions
    /// that were never released; each one is logged as a leak.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut slots = self.slots.lock().await;
            slots.drain().collect()
        };

        for (uri, slot) in drained {
            let mut guard = slot.lock().await;
            guard.evicted = true;
            if let Some(handle) = guard.handle.take() {
                warn!(
                    uri = %uri,
                    refcount = guard.refcount,
                    "connection leaked at shutdown; force-closing"
                );
                if let Err(e) = self.opener.close(&uri, &handle).await {
                    warn!(uri = %uri, error = %e, "failed to force-close leaked connection");
                }
            }
        }
    }
}
