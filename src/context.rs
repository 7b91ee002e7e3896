//! Execution contexts: where an index lives and runs.
//!
//! An [`ExecutionContext`] stands in for an accelerator. It owns
//!
//! - a dedicated `rayon` thread pool (the parallel execution units),
//! - a [`MemoryPool`] that accounts for the bytes resident in it,
//! - a cancellation flag checked by in-flight builds and searches.
//!
//! Contexts are created explicitly by the caller and passed to every build,
//! search and conversion call; there is no process-wide resource singleton.
//! Cloning a context is cheap and shares the same pool, memory and flag.

use crate::error::{CagraError, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Memory domain of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Residency {
    /// Host memory.
    Host,
    /// Accelerator with the given ordinal.
    Device(u32),
}

impl fmt::Display for Residency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Residency::Host => write!(f, "host"),
            Residency::Device(id) => write!(f, "device:{id}"),
        }
    }
}

/// Context construction options.
#[derive(Debug, Clone, Default)]
pub struct ContextConfig {
    /// Worker threads; `None` lets rayon pick.
    pub num_threads: Option<usize>,
    /// Byte budget of the memory pool; `None` is unlimited.
    pub memory_limit: Option<usize>,
}

impl ContextConfig {
    /// Set the worker thread count.
    #[must_use]
    pub fn with_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }

    /// Set the memory budget.
    #[must_use]
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }
}

/// Handle to an execution context.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    residency: Residency,
    pool: rayon::ThreadPool,
    memory: MemoryPool,
    cancelled: AtomicBool,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("residency", &self.inner.residency)
            .field("threads", &self.inner.pool.current_num_threads())
            .field("memory", &self.inner.memory)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl ExecutionContext {
    /// Create a context.
    pub fn new(residency: Residency, config: ContextConfig) -> Result<Self> {
        if config.num_threads == Some(0) {
            return Err(CagraError::config("num_threads must be greater than 0"));
        }
        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(move |i| format!("cagra-{residency}-{i}"));
        if let Some(n) = config.num_threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| CagraError::config(format!("failed to start worker pool: {e}")))?;
        tracing::debug!(
            %residency,
            threads = pool.current_num_threads(),
            memory_limit = ?config.memory_limit,
            "execution context created"
        );
        Ok(Self {
            inner: Arc::new(ContextInner {
                residency,
                pool,
                memory: MemoryPool::new(config.memory_limit),
                cancelled: AtomicBool::new(false),
            }),
        })
    }

    /// Host context with default options.
    pub fn host() -> Result<Self> {
        Self::new(Residency::Host, ContextConfig::default())
    }

    /// Device context with default options.
    pub fn device(ordinal: u32) -> Result<Self> {
        Self::new(Residency::Device(ordinal), ContextConfig::default())
    }

    /// Memory domain.
    pub fn residency(&self) -> Residency {
        self.inner.residency
    }

    /// Memory pool of this context.
    pub fn memory(&self) -> &MemoryPool {
        &self.inner.memory
    }

    /// Worker threads.
    pub fn num_threads(&self) -> usize {
        self.inner.pool.current_num_threads()
    }

    /// Abort in-flight and future work on this context.
    ///
    /// Calls observing the flag return [`CagraError::Cancelled`]; partial
    /// results are dropped.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Relaxed)
    }

    /// Fail with `Cancelled` once the context has been cancelled.
    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CagraError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run `f` on this context's workers.
    pub(crate) fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        self.inner.pool.install(f)
    }

    /// Whether two handles refer to the same context.
    pub fn same_as(&self, other: &ExecutionContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Byte accounting for one context.
///
/// Reservations are RAII guards: the bytes return to the pool when the
/// [`Reservation`] is dropped.
#[derive(Clone)]
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    limit: Option<usize>,
    used: AtomicUsize,
    peak: AtomicUsize,
}

impl fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPool")
            .field("limit", &self.inner.limit)
            .field("used", &self.used())
            .finish()
    }
}

impl MemoryPool {
    fn new(limit: Option<usize>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                limit,
                used: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Reserve `bytes`, failing with `InsufficientMemory` past the limit.
    pub fn reserve(&self, bytes: usize) -> Result<Reservation> {
        let mut current = self.inner.used.load(Ordering::Relaxed);
        loop {
            let next = current.checked_add(bytes).ok_or(CagraError::InsufficientMemory {
                requested: bytes,
                available: self.available(),
            })?;
            if let Some(limit) = self.inner.limit {
                if next > limit {
                    return Err(CagraError::InsufficientMemory {
                        requested: bytes,
                        available: limit.saturating_sub(current),
                    });
                }
            }
            match self.inner.used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.inner.peak.fetch_max(next, Ordering::Relaxed);
                    return Ok(Reservation {
                        pool: self.clone(),
                        bytes,
                    });
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Bytes currently reserved.
    pub fn used(&self) -> usize {
        self.inner.used.load(Ordering::Relaxed)
    }

    /// Highest reservation total seen.
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::Relaxed)
    }

    /// Configured limit.
    pub fn limit(&self) -> Option<usize> {
        self.inner.limit
    }

    /// Bytes still available (`usize::MAX` when unlimited).
    pub fn available(&self) -> usize {
        match self.inner.limit {
            Some(limit) => limit.saturating_sub(self.used()),
            None => usize::MAX,
        }
    }
}

/// Bytes held in a [`MemoryPool`] until dropped.
pub struct Reservation {
    pool: MemoryPool,
    bytes: usize,
}

impl Reservation {
    /// Reserved size.
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation").field("bytes", &self.bytes).finish()
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.pool.inner.used.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}
