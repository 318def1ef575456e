//! Resource management

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::Imars3dError;

/// Number of workers to use given the available CPUs.
///
/// `reserved` CPUs are left for the coordinator and the operating system. There is always at
/// least one worker, and never more than `limit` if one is given.
pub fn worker_count(available: usize, reserved: usize, limit: Option<usize>) -> usize {
    let workers = available.saturating_sub(reserved).max(1);
    match limit {
        Some(limit) => workers.min(limit.max(1)),
        None => workers,
    }
}

/// Shared memory pool in bytes.
#[derive(Debug)]
struct MemoryPool {
    total: usize,
    used: AtomicUsize,
}

/// Memory reserved from a [ResourceManager], released when dropped.
#[derive(Debug)]
pub struct MemoryPermit {
    pool: Option<Arc<MemoryPool>>,
    bytes: usize,
}

impl MemoryPermit {
    /// Number of bytes held by this permit.
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for MemoryPermit {
    fn drop(&mut self) {
        if let Some(pool) = &self.pool {
            pool.used.fetch_sub(self.bytes, Ordering::AcqRel);
        }
    }
}

/// [crate::resource_manager::ResourceManager] decides how many workers to run and how much
/// memory may be used for staging image stacks shared between them.
#[derive(Clone, Debug)]
pub struct ResourceManager {
    /// Number of workers.
    workers: usize,

    /// Optional memory pool for staged input.
    memory: Option<Arc<MemoryPool>>,
}

impl ResourceManager {
    /// Returns a new ResourceManager object.
    ///
    /// # Arguments
    ///
    /// * `worker_limit`: Optional upper bound on the number of workers
    /// * `reserved_cpus`: CPUs not used for workers
    /// * `memory_limit`: Optional limit in bytes on staged input
    pub fn new(worker_limit: Option<usize>, reserved_cpus: usize, memory_limit: Option<usize>) -> Self {
        Self {
            workers: worker_count(num_cpus::get(), reserved_cpus, worker_limit),
            memory: memory_limit.map(|total| {
                Arc::new(MemoryPool {
                    total,
                    used: AtomicUsize::new(0),
                })
            }),
        }
    }

    /// Number of workers.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Total memory pool in bytes, if limited.
    pub fn memory_limit(&self) -> Option<usize> {
        self.memory.as_ref().map(|pool| pool.total)
    }

    /// Reserve memory for staging.
    ///
    /// Fails immediately rather than waiting if the pool cannot satisfy the request.
    pub fn memory(&self, bytes: usize) -> Result<MemoryPermit, Imars3dError> {
        let Some(pool) = &self.memory else {
            return Ok(MemoryPermit { pool: None, bytes });
        };
        if bytes > pool.total {
            return Err(Imars3dError::InsufficientMemory {
                requested: bytes,
                total: pool.total,
            });
        }
        pool.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used + bytes <= pool.total).then_some(used + bytes)
            })
            .map_err(|used| Imars3dError::InsufficientMemory {
                requested: bytes,
                total: pool.total - used,
            })?;
        Ok(MemoryPermit {
            pool: Some(pool.clone()),
            bytes,
        })
    }
}
