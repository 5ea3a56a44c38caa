//! Safe wrapper around `libc::fd_set`

use std::mem::MaybeUninit;

use desock_core::Fd;

/// Descriptor set as passed to `select`/`pselect`
#[derive(Clone, Copy)]
pub struct FdSet {
    raw: libc::fd_set,
}

impl FdSet {
    /// Highest descriptor number plus one a set can hold
    pub const CAPACITY: usize = libc::FD_SETSIZE as usize;

    pub fn new() -> Self {
        let mut raw = MaybeUninit::<libc::fd_set>::uninit();
        unsafe {
            libc::FD_ZERO(raw.as_mut_ptr());
            Self { raw: raw.assume_init() }
        }
    }

    pub fn from_raw(raw: libc::fd_set) -> Self {
        Self { raw }
    }

    pub fn into_raw(self) -> libc::fd_set {
        self.raw
    }

    pub fn as_raw_mut(&mut self) -> &mut libc::fd_set {
        &mut self.raw
    }

    #[inline]
    fn in_range(fd: Fd) -> bool {
        usize::try_from(fd).map_or(false, |i| i < Self::CAPACITY)
    }

    /// Out-of-range descriptors are ignored
    pub fn insert(&mut self, fd: Fd) {
        if Self::in_range(fd) {
            unsafe { libc::FD_SET(fd, &mut self.raw) };
        }
    }

    pub fn remove(&mut self, fd: Fd) {
        if Self::in_range(fd) {
            unsafe { libc::FD_CLR(fd, &mut self.raw) };
        }
    }

    pub fn contains(&self, fd: Fd) -> bool {
        Self::in_range(fd) && unsafe { libc::FD_ISSET(fd, &self.raw) }
    }

    pub fn clear(&mut self) {
        unsafe { libc::FD_ZERO(&mut self.raw) };
    }

    /// Members below `nfds`, ascending
    pub fn iter(&self, nfds: Fd) -> impl Iterator<Item = Fd> + '_ {
        let end = nfds.clamp(0, Self::CAPACITY as Fd);
        (0..end).filter(move |&fd| self.contains(fd))
    }
}

impl Default for FdSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Fd> for FdSet {
    fn from_iter<I: IntoIterator<Item = Fd>>(iter: I) -> Self {
        let mut set = FdSet::new();
        for fd in iter {
            set.insert(fd);
        }
        set
    }
}

impl std::fmt::Debug for FdSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter(Self::CAPACITY as Fd)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove() {
        let mut set = FdSet::new();
        set.insert(3);
        set.insert(64);
        set.insert(-1);
        set.insert(FdSet::CAPACITY as Fd);

        assert!(set.contains(3));
        assert!(set.contains(64));
        assert!(!set.contains(4));
        assert_eq!(set.iter(100).collect::<Vec<_>>(), vec![3, 64]);
        assert_eq!(set.iter(10).collect::<Vec<_>>(), vec![3]);

        set.remove(3);
        assert!(!set.contains(3));
        set.clear();
        assert_eq!(set.iter(100).count(), 0);
    }

    #[test]
    fn test_from_iter() {
        let set: FdSet = [5, 1, 9].into_iter().collect();
        assert_eq!(set.iter(16).collect::<Vec<_>>(), vec![1, 5, 9]);
    }
}
