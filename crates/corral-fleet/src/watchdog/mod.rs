//! Health watchdog.
//!
//! A single periodic poller that probes every watched domain's liveness and
//! applies a [`WatchdogStrategy`] to decide between resurrection and
//! terminal death. Per domain the state machine is
//! `Alive -> Suspect -> Dead` (terminal), with `Suspect -> Alive` recovery.
//!
//! The watchdog never stops or destroys a domain itself: it only removes a
//! confirmed-dead domain from its watched set and reports it to the
//! registered listeners. The listeners decide what eviction means.

mod strategy;

pub use strategy::{GracePeriodStrategy, WatchdogStrategy};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::backend::{Domain, DomainHandle};

/// Observer notified once per confirmed domain death, from the watchdog's
/// own task, after the domain has already left the watched set.
#[async_trait]
pub trait DeathListener: Send + Sync {
    /// Called exactly once when `domain` is confirmed dead.
    async fn domain_died(&self, domain: &DomainHandle);
}

/// Liveness state of a watched domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Last probe reported alive.
    Alive,

    /// Observed not-alive, still within its grace period (a zombie).
    Suspect,
}

struct Watched {
    handle: DomainHandle,
    /// Zombie timer: set the instant the domain is first observed
    /// not-alive, cleared the instant it is observed alive again.
    suspect_since: Option<Instant>,
}

/// Periodic background poller tracking per-domain liveness.
pub struct HealthWatchdog {
    watched: Mutex<Vec<Watched>>,
    listeners: RwLock<Vec<Arc<dyn DeathListener>>>,
    strategy: Arc<dyn WatchdogStrategy>,
    watching: AtomicBool,
    poll_interval: Duration,
    probe_timeout: Duration,
}

impl HealthWatchdog {
    /// Creates a watchdog with the given policy and timing.
    ///
    /// Evaluation starts disabled; call
    /// [`start_watching`](Self::start_watching) to arm it.
    pub fn new(
        strategy: Arc<dyn WatchdogStrategy>,
        poll_interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            watched: Mutex::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            strategy,
            watching: AtomicBool::new(false),
            poll_interval,
            probe_timeout,
        }
    }

    /// Adds a domain to the watched set. Idempotent.
    pub async fn watch(&self, handle: DomainHandle) {
        let mut watched = self.watched.lock().await;
        if watched.iter().any(|w| w.handle == handle) {
            return;
        }
        debug!(domain = %handle.id(), "watching domain");
        watched.push(Watched {
            handle,
            suspect_since: None,
        });
    }

    /// Removes a domain from the watched set. Idempotent; returns whether
    /// the domain was being watched.
    pub async fn unwatch(&self, handle: &DomainHandle) -> bool {
        let mut watched = self.watched.lock().await;
        let before = watched.len();
        watched.retain(|w| &w.handle != handle);
        before != watched.len()
    }

    /// Returns the liveness of a watched domain, or `None` if unwatched.
    pub async fn liveness(&self, handle: &DomainHandle) -> Option<Liveness> {
        let watched = self.watched.lock().await;
        watched.iter().find(|w| &w.handle == handle).map(|w| {
            if w.suspect_since.is_some() {
                Liveness::Suspect
            } else {
                Liveness::Alive
            }
        })
    }

    /// Number of currently watched domains.
    pub async fn watched_len(&self) -> usize {
        self.watched.lock().await.len()
    }

    /// Arms poll-tick evaluation.
    pub fn start_watching(&self) {
        self.watching.store(true, Ordering::SeqCst);
    }

    /// Disarms evaluation. The periodic task keeps ticking but ticks are
    /// no-ops, and a tick in flight abandons the rest of its snapshot.
    pub fn stop_watching(&self) {
        self.watching.store(false, Ordering::SeqCst);
    }

    /// Registers a death listener. Listeners are notified sequentially in
    /// registration order.
    pub async fn add_listener(&self, listener: Arc<dyn DeathListener>) {
        self.listeners.write().await.push(listener);
    }

    /// Removes a previously registered listener (by handle identity).
    pub async fn remove_listener(&self, listener: &Arc<dyn DeathListener>) {
        self.listeners
            .write()
            .await
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Runs one evaluation pass over a snapshot of the watched set.
    ///
    /// This is what the periodic task calls every tick; it is public so the
    /// poll logic can be driven directly, without real sleeping.
    pub async fn poll_once(&self) {
        if !self.watching.load(Ordering::SeqCst) {
            return;
        }

        let snapshot: Vec<DomainHandle> = {
            let watched = self.watched.lock().await;
            watched.iter().map(|w| w.handle.clone()).collect()
        };

        for handle in snapshot {
            // Watching turned off mid-tick: abandon the rest of the snapshot.
            if !self.watching.load(Ordering::SeqCst) {
                return;
            }
            self.evaluate(&handle).await;
        }
    }

    async fn evaluate(&self, handle: &DomainHandle) {
        let alive = match tokio::time::timeout(self.probe_timeout, handle.is_alive()).await {
            Ok(Ok(alive)) => alive,
            Ok(Err(e)) => {
                // Fail-open: a probe fault is not evidence of death.
                warn!(domain = %handle.id(), error = %e, "liveness probe failed; treating as alive");
                true
            }
            Err(_) => {
                warn!(
                    domain = %handle.id(),
                    timeout_ms = self.probe_timeout.as_millis() as u64,
                    "liveness probe timed out; treating as alive"
                );
                true
            }
        };

        if alive {
            let mut watched = self.watched.lock().await;
            if let Some(entry) = watched.iter_mut().find(|w| &w.handle == handle) {
                if entry.suspect_since.take().is_some() {
                    info!(domain = %handle.id(), "domain recovered");
                }
            }
            return;
        }

        // Not alive: start or read the zombie timer. The domain may have
        // been unwatched concurrently, in which case there is nothing to do.
        let suspect_for = {
            let mut watched = self.watched.lock().await;
            let Some(entry) = watched.iter_mut().find(|w| &w.handle == handle) else {
                return;
            };
            let since = *entry.suspect_since.get_or_insert_with(Instant::now);
            since.elapsed()
        };

        // Policy runs outside the lock: it may attempt a resurrection,
        // which is backend I/O.
        if !self.strategy.domain_dead(handle, suspect_for).await {
            return;
        }

        // Terminal. Remove first so a later tick can never re-confirm, then
        // notify a snapshot of the listeners.
        let removed = self.unwatch(handle).await;
        if !removed {
            return;
        }

        info!(
            domain = %handle.id(),
            suspect_ms = suspect_for.as_millis() as u64,
            "domain confirmed dead"
        );

        let listeners: Vec<Arc<dyn DeathListener>> = self.listeners.read().await.clone();
        for listener in listeners {
            listener.domain_died(handle).await;
        }
    }

    /// Runs the periodic poll loop until `shutdown` flips to `true` (or its
    /// sender is dropped). Each tick is one [`poll_once`](Self::poll_once).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("watchdog poll loop stopping");
                        return;
                    }
                }
            }
        }
    }
}
