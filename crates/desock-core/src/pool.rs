//! Connection pool
//!
//! Maps descriptors onto connection slots. A slot is handed out at accept or
//! connect, shared by every descriptor `dup`ed from it and freed when the
//! last of them is closed.

use crate::error::{PoolError, PoolResult};
use crate::Fd;

/// Descriptor to connection slot mapping with per-slot reference counts
#[derive(Debug, Clone)]
pub struct ConnPool {
    /// Open descriptors per slot; zero means free
    refcounts: Box<[u32]>,

    /// Slot per descriptor
    fd_map: Box<[Option<usize>]>,
}

impl ConnPool {
    /// Create an empty pool with `max_conns` slots over a table of
    /// `fd_table_size` descriptors
    pub fn new(max_conns: usize, fd_table_size: usize) -> Self {
        Self {
            refcounts: vec![0u32; max_conns].into_boxed_slice(),
            fd_map: vec![None; fd_table_size].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn max_conns(&self) -> usize {
        self.refcounts.len()
    }

    #[inline]
    pub fn fd_table_size(&self) -> usize {
        self.fd_map.len()
    }

    fn index(&self, fd: Fd) -> PoolResult<usize> {
        usize::try_from(fd)
            .ok()
            .filter(|&i| i < self.fd_map.len())
            .ok_or(PoolError::FdOutOfRange { fd, limit: self.fd_map.len() })
    }

    /// Bind `fd` to the lowest free slot and return it.
    ///
    /// A descriptor that is already mapped is released first, the way a
    /// kernel reuses a descriptor number only after it was closed.
    pub fn open(&mut self, fd: Fd) -> PoolResult<usize> {
        let index = self.index(fd)?;
        if self.fd_map[index].is_some() {
            self.close(fd)?;
        }

        let slot = self
            .refcounts
            .iter()
            .position(|&count| count == 0)
            .ok_or(PoolError::NoFreeSlot { max_conns: self.refcounts.len() })?;

        self.refcounts[slot] = 1;
        self.fd_map[index] = Some(slot);
        Ok(slot)
    }

    /// Unbind `fd`. Returns the slot it referenced, `None` when unmapped.
    pub fn close(&mut self, fd: Fd) -> PoolResult<Option<usize>> {
        let index = self.index(fd)?;
        let Some(slot) = self.fd_map[index].take() else {
            return Ok(None);
        };

        self.refcounts[slot] = self.refcounts[slot].saturating_sub(1);
        Ok(Some(slot))
    }

    /// Make `new` an alias of `old`'s slot, closing `new` first
    pub fn duplicate(&mut self, old: Fd, new: Fd) -> PoolResult<usize> {
        let old_index = self.index(old)?;
        let new_index = self.index(new)?;
        let slot = self.fd_map[old_index].ok_or(PoolError::Unmapped { fd: old })?;

        if old_index == new_index {
            return Ok(slot);
        }

        self.close(new)?;
        self.fd_map[new_index] = Some(slot);
        self.refcounts[slot] += 1;
        Ok(slot)
    }

    /// Slot behind `fd`; out-of-range descriptors are never mapped
    #[inline]
    pub fn lookup(&self, fd: Fd) -> Option<usize> {
        let index = usize::try_from(fd).ok()?;
        self.fd_map.get(index).copied().flatten()
    }

    pub fn any_open(&self) -> bool {
        self.refcounts.iter().any(|&count| count > 0)
    }

    /// Number of slots in use
    pub fn open_count(&self) -> usize {
        self.refcounts.iter().filter(|&&count| count > 0).count()
    }

    #[inline]
    pub fn refcount(&self, slot: usize) -> u32 {
        self.refcounts.get(slot).copied().unwrap_or(0)
    }

    /// Unbind every descriptor and free every slot
    pub fn clear(&mut self) {
        self.refcounts.fill(0);
        self.fd_map.fill(None);
    }

    /// Descriptors currently mapped to a slot, ascending
    pub fn mapped_fds(&self) -> impl Iterator<Item = (Fd, usize)> + '_ {
        self.fd_map
            .iter()
            .enumerate()
            .filter_map(|(fd, slot)| slot.map(|s| (fd as Fd, s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_lowest_free_slot() {
        let mut pool = ConnPool::new(4, 64);

        assert_eq!(pool.open(10).unwrap(), 0);
        assert_eq!(pool.open(11).unwrap(), 1);
        assert_eq!(pool.open(12).unwrap(), 2);

        pool.close(11).unwrap();
        assert_eq!(pool.open(13).unwrap(), 1);
        assert_eq!(pool.open_count(), 3);
    }

    #[test]
    fn test_dup_close_refcounting() {
        let mut pool = ConnPool::new(2, 64);

        let slot = pool.open(5).unwrap();
        assert_eq!(pool.duplicate(5, 6).unwrap(), slot);
        assert_eq!(pool.refcount(slot), 2);
        assert_eq!(pool.lookup(6), Some(slot));

        assert_eq!(pool.close(5).unwrap(), Some(slot));
        assert!(pool.any_open());
        assert_eq!(pool.lookup(5), None);

        assert_eq!(pool.close(6).unwrap(), Some(slot));
        assert!(!pool.any_open());
        assert_eq!(pool.refcount(slot), 0);

        // Second close of the same descriptor is harmless
        assert_eq!(pool.close(6).unwrap(), None);
        assert_eq!(pool.refcount(slot), 0);
    }

    #[test]
    fn test_dup_over_open_descriptor() {
        let mut pool = ConnPool::new(4, 64);

        let a = pool.open(3).unwrap();
        let b = pool.open(4).unwrap();

        // dup2(3, 4): 4 drops its own connection and joins 3's
        assert_eq!(pool.duplicate(3, 4).unwrap(), a);
        assert_eq!(pool.refcount(a), 2);
        assert_eq!(pool.refcount(b), 0);
        assert_eq!(pool.open_count(), 1);
    }

    #[test]
    fn test_dup_onto_itself() {
        let mut pool = ConnPool::new(2, 16);
        let slot = pool.open(7).unwrap();

        assert_eq!(pool.duplicate(7, 7).unwrap(), slot);
        assert_eq!(pool.refcount(slot), 1);
    }

    #[test]
    fn test_reopen_mapped_descriptor() {
        let mut pool = ConnPool::new(2, 16);

        assert_eq!(pool.open(3).unwrap(), 0);
        assert_eq!(pool.open(3).unwrap(), 0);
        assert_eq!(pool.refcount(0), 1);
        assert_eq!(pool.open_count(), 1);
    }

    #[test]
    fn test_errors() {
        let mut pool = ConnPool::new(1, 8);

        assert_eq!(pool.open(8), Err(PoolError::FdOutOfRange { fd: 8, limit: 8 }));
        assert_eq!(pool.open(-1), Err(PoolError::FdOutOfRange { fd: -1, limit: 8 }));
        assert_eq!(pool.duplicate(2, 3), Err(PoolError::Unmapped { fd: 2 }));

        pool.open(1).unwrap();
        assert_eq!(pool.open(2), Err(PoolError::NoFreeSlot { max_conns: 1 }));

        assert_eq!(pool.lookup(100), None);
        assert_eq!(pool.lookup(-5), None);
    }

    #[test]
    fn test_clear_frees_every_slot() {
        let mut pool = ConnPool::new(2, 64);
        pool.open(4).unwrap();
        pool.open(5).unwrap();
        pool.duplicate(4, 9).unwrap();

        pool.clear();
        assert!(!pool.any_open());
        assert_eq!(pool.lookup(9), None);
        assert_eq!(pool.open(6).unwrap(), 0);
    }

    #[test]
    fn test_mapped_fds() {
        let mut pool = ConnPool::new(4, 16);
        pool.open(9).unwrap();
        pool.open(2).unwrap();
        pool.duplicate(9, 12).unwrap();

        let mapped: Vec<_> = pool.mapped_fds().collect();
        assert_eq!(mapped, vec![(2, 1), (9, 0), (12, 0)]);
    }
}
