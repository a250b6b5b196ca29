//! Provider Resilience Pool.
//!
//! Every remote call to a provider is admitted through one [`ProviderPool`],
//! which combines, per provider:
//!
//! - a [`CircuitBreaker`] that fails fast while the provider is unhealthy,
//! - a concurrency ceiling with a priority/FIFO admission queue,
//! - a short-lived [`ResultCache`] shared by all providers.
//!
//! ```text
//! acquire(provider, priority)
//!   ├─ breaker Open, cooldown pending ──> Err(ProviderUnavailable)
//!   ├─ breaker Open, cooldown elapsed ──> HalfOpen, single probe permit
//!   ├─ active < ceiling ───────────────> permit
//!   └─ otherwise ──────────────────────> queued until a slot frees
//! ```
//!
//! The pool is process-local and is meant to be constructed once and shared
//! (it is cheap to clone). All breaker/queue mutation for a provider happens
//! under one lock, so failure counting and dispatch never race.

mod breaker;
mod cache;
mod queue;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{PoolConfig, ProviderLimits};
use crate::error::TaskError;
use crate::provider::{GenerateOptions, Generation, Provider};

pub use breaker::{Admission, BreakerMode, CircuitBreaker, Transition};
pub use cache::{CacheKey, ResultCache};
pub use queue::Priority;

use queue::{AdmissionQueue, QueueEntry};

/// Cache lookup parameters for [`ProviderPool::generate`].
#[derive(Debug, Clone)]
pub struct CacheSpec {
    pub key: CacheKey,
    pub ttl: Duration,
}

/// Point-in-time view of one provider's admission state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSnapshot {
    pub provider: String,
    pub mode: BreakerMode,
    pub consecutive_failures: u32,
    pub active: usize,
    pub queued: usize,
    pub max_concurrency: usize,
    /// Milliseconds until an open breaker admits a probe.
    pub retry_in_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub cache_evicted: usize,
    pub breakers_reset: usize,
    pub queue_pruned: usize,
}

struct ProviderSlot {
    limits: ProviderLimits,
    breaker: CircuitBreaker,
    active: usize,
    queue: AdmissionQueue,
}

impl ProviderSlot {
    fn new(limits: ProviderLimits) -> Self {
        Self {
            breaker: CircuitBreaker::new(limits.failure_threshold, limits.cooldown),
            limits,
            active: 0,
            queue: AdmissionQueue::default(),
        }
    }
}

/// How a permit left the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    /// `probe` marks the half-open probe, the only call that may settle the breaker.
    Success { probe: bool },
    Failure { probe: bool },
    /// Dispatched to a waiter that had already gone away; only the slot is freed.
    Abandoned,
}

struct PoolInner {
    config: PoolConfig,
    slots: Mutex<HashMap<String, ProviderSlot>>,
    cache: ResultCache<Generation>,
    seq: AtomicU64,
    shutdown: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// Per-provider admission point shared by every pipeline run in the process.
#[derive(Clone)]
pub struct ProviderPool {
    inner: Arc<PoolInner>,
}

impl ProviderPool {
    /// Builds a pool and, when called inside a tokio runtime, starts its
    /// background sweep. Stop it with [`ProviderPool::shutdown`].
    pub fn new(config: PoolConfig) -> Self {
        let pool = Self::without_sweeper(config);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => pool.start_sweeper(&handle),
            Err(_) => tracing::warn!(
                target: "forge.pool",
                "no tokio runtime; pool sweep disabled"
            ),
        }
        pool
    }

    /// Builds a pool with no background sweep; [`ProviderPool::sweep`] can still
    /// be called explicitly.
    pub fn without_sweeper(config: PoolConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(PoolInner {
                config,
                slots: Mutex::new(HashMap::new()),
                cache: ResultCache::new(),
                seq: AtomicU64::new(0),
                shutdown,
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Requests a call slot for `provider`.
    ///
    /// Fails immediately with [`TaskError::ProviderUnavailable`] while the
    /// breaker is open; otherwise returns a permit once the provider has a
    /// free slot, suspending in the admission queue if it has none.
    pub async fn acquire(&self, provider: &str, priority: Priority) -> Result<PoolPermit, TaskError> {
        let rx = {
            let mut slots = self.lock_slots();
            let slot = self.slot_mut(&mut slots, provider);
            let (admission, transition) = slot.breaker.admit(Instant::now());
            log_transition(provider, transition);

            match admission {
                Admission::Rejected => {
                    tracing::debug!(target: "forge.pool", provider, "rejected: breaker open");
                    return Err(TaskError::ProviderUnavailable {
                        provider: provider.to_string(),
                    });
                }
                Admission::Probe => {
                    slot.active += 1;
                    tracing::info!(target: "forge.pool", provider, "admitting half-open probe");
                    return Ok(PoolPermit::new(self.clone(), provider, true).into_probe());
                }
                Admission::Allowed if slot.active < slot.limits.max_concurrency => {
                    slot.active += 1;
                    return Ok(PoolPermit::new(self.clone(), provider, true));
                }
                Admission::Allowed => {
                    let (tx, rx) = oneshot::channel();
                    let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
                    slot.queue.push(QueueEntry {
                        priority,
                        seq,
                        enqueued_at: Instant::now(),
                        tx,
                    });
                    tracing::debug!(
                        target: "forge.pool",
                        provider,
                        priority = priority.rank(),
                        queued = slot.queue.len(),
                        "queued: concurrency ceiling reached"
                    );
                    rx
                }
            }
        };

        match rx.await {
            Ok(Ok(mut permit)) => {
                permit.held = true;
                Ok(permit)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(TaskError::ProviderUnavailable {
                provider: provider.to_string(),
            }),
        }
    }

    /// Returns the cached payload for `key` if younger than `ttl`, otherwise
    /// runs `producer` (which is expected to go through `acquire`/`release`)
    /// and caches its success. Concurrent calls for one key share one fetch.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        producer: F,
    ) -> Result<Generation, TaskError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Generation, TaskError>>,
    {
        self.inner.cache.get_or_fetch(key, ttl, producer).await
    }

    /// One admitted `generate` call, optionally served from the cache.
    pub async fn generate(
        &self,
        provider: &dyn Provider,
        priority: Priority,
        prompt: &str,
        options: &GenerateOptions,
        cache: Option<&CacheSpec>,
    ) -> Result<Generation, TaskError> {
        let fetch = move || async move {
            let permit = self.acquire(provider.name(), priority).await?;
            let result = provider.generate(prompt, options).await;
            permit.release(result.is_ok());
            result.map_err(|source| TaskError::TaskTransportFailure {
                provider: provider.name().to_string(),
                source,
            })
        };

        match cache {
            Some(spec) => self.get_or_fetch(&spec.key, spec.ttl, fetch).await,
            None => fetch().await,
        }
    }

    pub fn snapshot(&self) -> Vec<ProviderSnapshot> {
        let now = Instant::now();
        let slots = self.lock_slots();
        let mut out: Vec<ProviderSnapshot> = slots
            .iter()
            .map(|(name, slot)| ProviderSnapshot {
                provider: name.clone(),
                mode: slot.breaker.mode(),
                consecutive_failures: slot.breaker.consecutive_failures(),
                active: slot.active,
                queued: slot.queue.len(),
                max_concurrency: slot.limits.max_concurrency,
                retry_in_ms: match slot.breaker.mode() {
                    BreakerMode::Open => slot
                        .breaker
                        .retry_at()
                        .map(|at| at.saturating_duration_since(now).as_millis() as u64),
                    _ => None,
                },
            })
            .collect();
        out.sort_by(|a, b| a.provider.cmp(&b.provider));
        out
    }

    pub fn provider_snapshot(&self, provider: &str) -> Option<ProviderSnapshot> {
        self.snapshot().into_iter().find(|s| s.provider == provider)
    }

    /// Evicts expired cache entries, prunes cancelled queue entries and resets
    /// breakers whose failure history is older than `stale_breaker_after`.
    pub fn sweep(&self) -> SweepReport {
        let now = Instant::now();
        let max_age = self.inner.config.stale_breaker_after();
        let mut report = SweepReport {
            cache_evicted: self.inner.cache.evict_expired(),
            ..SweepReport::default()
        };

        let mut slots = self.lock_slots();
        for (name, slot) in slots.iter_mut() {
            report.queue_pruned += slot.queue.prune_cancelled();
            if slot.breaker.is_stale(now, max_age) {
                let transition = slot.breaker.reset();
                report.breakers_reset += 1;
                tracing::info!(target: "forge.pool", provider = %name, "stale breaker history reset");
                log_transition(name, transition);
            }
        }

        if report != SweepReport::default() {
            tracing::debug!(
                target: "forge.pool",
                cache_evicted = report.cache_evicted,
                breakers_reset = report.breakers_reset,
                queue_pruned = report.queue_pruned,
                "pool sweep"
            );
        }
        report
    }

    /// Stops the background sweep. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.inner.shutdown.send(true);
        let handle = lock(&self.inner.sweeper).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn start_sweeper(&self, handle: &tokio::runtime::Handle) {
        let weak: Weak<PoolInner> = Arc::downgrade(&self.inner);
        let mut shutdown_rx = self.inner.shutdown.subscribe();
        let period = self.inner.config.sweep_interval();

        let task = handle.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        ProviderPool { inner }.sweep();
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(target: "forge.pool", "pool sweep stopped");
        });

        *lock(&self.inner.sweeper) = Some(task);
    }

    fn settle(&self, provider: &str, settlement: Settlement) {
        let mut slots = self.lock_slots();
        let slot = self.slot_mut(&mut slots, provider);
        slot.active = slot.active.saturating_sub(1);

        let transition = match settlement {
            Settlement::Success { probe } => slot.breaker.record_success(probe),
            Settlement::Failure { probe } => slot.breaker.record_failure(Instant::now(), probe),
            Settlement::Abandoned => None,
        };
        log_transition(provider, transition);

        if slot.breaker.mode() != BreakerMode::Closed {
            let drained = reject_queued(slot, provider);
            if drained > 0 {
                tracing::warn!(
                    target: "forge.pool",
                    provider,
                    drained,
                    "breaker open: rejected queued calls"
                );
            }
        } else {
            self.dispatch(slot, provider);
        }
    }

    /// Hands free slots to queued waiters in priority order.
    fn dispatch(&self, slot: &mut ProviderSlot, provider: &str) {
        while slot.active < slot.limits.max_concurrency {
            let Some(entry) = slot.queue.pop() else {
                break;
            };
            slot.active += 1;
            let waited_ms = entry.enqueued_at.elapsed().as_millis() as u64;
            let permit = PoolPermit::new(self.clone(), provider, false);
            match entry.tx.send(Ok(permit)) {
                Ok(()) => tracing::trace!(
                    target: "forge.pool",
                    provider,
                    seq = entry.seq,
                    waited_ms,
                    "dispatched queued call"
                ),
                Err(Ok(mut permit)) => {
                    // Waiter was cancelled; reuse the slot for the next entry.
                    permit.settled = true;
                    slot.active -= 1;
                }
                Err(Err(_)) => slot.active -= 1,
            }
        }
    }

    fn slot_mut<'a>(
        &self,
        slots: &'a mut HashMap<String, ProviderSlot>,
        provider: &str,
    ) -> &'a mut ProviderSlot {
        slots
            .entry(provider.to_string())
            .or_insert_with(|| ProviderSlot::new(self.inner.config.limits_for(provider)))
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, ProviderSlot>> {
        lock(&self.inner.slots)
    }
}

impl std::fmt::Debug for ProviderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderPool")
            .field("providers", &self.snapshot())
            .finish()
    }
}

fn reject_queued(slot: &mut ProviderSlot, provider: &str) -> usize {
    let mut drained = 0;
    for entry in slot.queue.drain() {
        let _ = entry.tx.send(Err(TaskError::ProviderUnavailable {
            provider: provider.to_string(),
        }));
        drained += 1;
    }
    drained
}

fn log_transition(provider: &str, transition: Option<Transition>) {
    let Some(t) = transition else {
        return;
    };
    match t.to {
        BreakerMode::Open => tracing::warn!(
            target: "forge.pool",
            provider,
            from = %t.from,
            to = %t.to,
            "circuit breaker opened"
        ),
        _ => tracing::info!(
            target: "forge.pool",
            provider,
            from = %t.from,
            to = %t.to,
            "circuit breaker transition"
        ),
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// An admitted call slot.
///
/// Report the call's outcome with [`PoolPermit::release`]. A permit dropped
/// while held (e.g. its task timed out) counts as a failure.
pub struct PoolPermit {
    pool: ProviderPool,
    provider: String,
    held: bool,
    probe: bool,
    settled: bool,
}

impl PoolPermit {
    fn new(pool: ProviderPool, provider: &str, held: bool) -> Self {
        Self {
            pool,
            provider: provider.to_string(),
            held,
            probe: false,
            settled: false,
        }
    }

    fn into_probe(mut self) -> Self {
        self.probe = true;
        self
    }

    /// Whether this permit is the breaker's half-open recovery probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Frees the slot and records the call outcome on the provider's breaker.
    pub fn release(mut self, success: bool) {
        self.settled = true;
        let probe = self.probe;
        let settlement = if success {
            Settlement::Success { probe }
        } else {
            Settlement::Failure { probe }
        };
        self.pool.settle(&self.provider, settlement);
    }
}

impl Drop for PoolPermit {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.settled = true;
        let settlement = if self.held {
            Settlement::Failure { probe: self.probe }
        } else {
            Settlement::Abandoned
        };
        self.pool.settle(&self.provider, settlement);
    }
}

impl std::fmt::Debug for PoolPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolPermit")
            .field("provider", &self.provider)
            .field("held", &self.held)
            .field("probe", &self.probe)
            .finish()
    }
}
