//! Node-local memory admission control.
//!
//! The budget is a single counter guarded by one mutex: `available =
//! capacity - sum(reserved)`. It is local to the node that accepted the job
//! and is not synchronized across nodes. Reservations are advisory; actual
//! process memory is never measured.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::config::MemoryConfig;
use crate::core::model::JobId;
use crate::core::JobError;

/// Memory held by one admitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// Job holding the memory.
    pub job_id: JobId,
    /// Reserved amount in MB.
    pub memory_mb: u64,
}

struct Ledger {
    available: u64,
    reservations: HashMap<JobId, u64>,
}

/// Accept/reject decisions against the node's memory budget.
pub struct AdmissionController {
    config: MemoryConfig,
    ledger: Mutex<Ledger>,
}

impl AdmissionController {
    /// Create a controller with the full capacity available.
    #[must_use]
    pub fn new(config: MemoryConfig) -> Self {
        let available = config.capacity_mb;
        Self {
            config,
            ledger: Mutex::new(Ledger {
                available,
                reservations: HashMap::new(),
            }),
        }
    }

    /// Reject explicit requests above the per-job ceiling.
    ///
    /// # Errors
    ///
    /// `JobError::MemoryCeilingExceeded` or `JobError::InvalidRequest` for a zero request.
    pub fn check_request(&self, requested_mb: Option<u64>) -> Result<(), JobError> {
        match requested_mb {
            Some(0) => Err(JobError::InvalidRequest("memory must be greater than 0".into())),
            Some(requested) if requested > self.config.max_job_memory_mb => {
                Err(JobError::MemoryCeilingExceeded {
                    requested,
                    ceiling: self.config.max_job_memory_mb,
                })
            }
            _ => Ok(()),
        }
    }

    /// Memory a job needs: the request value, else the command default, else
    /// the global default.
    ///
    /// # Errors
    ///
    /// Same as [`check_request`](Self::check_request).
    pub fn resolve_memory(
        &self,
        requested_mb: Option<u64>,
        command_default_mb: Option<u64>,
    ) -> Result<u64, JobError> {
        self.check_request(requested_mb)?;
        Ok(requested_mb
            .or(command_default_mb)
            .unwrap_or(self.config.default_job_memory_mb))
    }

    /// Atomically check and take `memory_mb` for `job_id`.
    ///
    /// Reserving twice for the same job returns the existing reservation
    /// without taking more memory.
    ///
    /// # Errors
    ///
    /// `JobError::InsufficientCapacity` if less than `memory_mb` is available;
    /// the budget is left untouched.
    pub fn reserve(&self, job_id: &JobId, memory_mb: u64) -> Result<Reservation, JobError> {
        let mut ledger = self.ledger.lock();
        if let Some(&held) = ledger.reservations.get(job_id) {
            return Ok(Reservation {
                job_id: job_id.clone(),
                memory_mb: held,
            });
        }
        if memory_mb > ledger.available {
            tracing::warn!(
                job_id = %job_id,
                requested = memory_mb,
                available = ledger.available,
                "admission rejected"
            );
            return Err(JobError::InsufficientCapacity {
                requested: memory_mb,
                available: ledger.available,
            });
        }
        ledger.available -= memory_mb;
        ledger.reservations.insert(job_id.clone(), memory_mb);
        tracing::debug!(job_id = %job_id, memory_mb, available = ledger.available, "memory reserved");
        Ok(Reservation {
            job_id: job_id.clone(),
            memory_mb,
        })
    }

    /// Return a job's memory to the budget. Only the first call for a
    /// reservation has an effect; it returns the released amount.
    pub fn release(&self, job_id: &JobId) -> Option<u64> {
        let mut ledger = self.ledger.lock();
        let released = ledger.reservations.remove(job_id)?;
        ledger.available += released;
        tracing::debug!(job_id = %job_id, released, available = ledger.available, "memory released");
        Some(released)
    }

    /// Unreserved memory.
    #[must_use]
    pub fn available(&self) -> u64 {
        self.ledger.lock().available
    }

    /// Total budget.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.config.capacity_mb
    }

    /// Memory held by `job_id`, if any.
    #[must_use]
    pub fn reserved(&self, job_id: &JobId) -> Option<u64> {
        self.ledger.lock().reservations.get(job_id).copied()
    }
}
