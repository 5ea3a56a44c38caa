//! Connection admission
//!
//! A counting permit pool sized to the number of connection slots. Every
//! admitted connection consumes one permit; once all are gone, further
//! accepts block. Permits are not returned on close in the normal flow, so
//! a run admits at most `max_conns` connections in total.

use std::sync::{Condvar, Mutex, PoisonError};

use crate::error::DesockResult;

/// Counting admission primitive
pub trait Admission: Send + Sync {
    /// Take a permit if one is available right now
    fn try_acquire(&self) -> DesockResult<bool>;

    /// Take a permit, blocking until one is available
    fn acquire(&self) -> DesockResult<()>;

    /// Return a permit
    fn release(&self) -> DesockResult<()>;

    /// Permits currently available (hint, may be stale)
    fn available(&self) -> usize;
}

/// Process-local permit pool
pub struct LocalPermits {
    permits: Mutex<usize>,
    condvar: Condvar,
}

impl LocalPermits {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            condvar: Condvar::new(),
        }
    }
}

impl Admission for LocalPermits {
    fn try_acquire(&self) -> DesockResult<bool> {
        let mut permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        if *permits == 0 {
            return Ok(false);
        }
        *permits -= 1;
        Ok(true)
    }

    fn acquire(&self) -> DesockResult<()> {
        let mut permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        while *permits == 0 {
            permits = self.condvar.wait(permits).unwrap_or_else(PoisonError::into_inner);
        }
        *permits -= 1;
        Ok(())
    }

    fn release(&self) -> DesockResult<()> {
        {
            let mut permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
            *permits += 1;
        }
        self.condvar.notify_one();
        Ok(())
    }

    fn available(&self) -> usize {
        *self.permits.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
