//! Per-descriptor metadata
//!
//! One entry per descriptor number below the table size. An entry is
//! `desock` once `socket()` created a stream socket we simulate, or once
//! the descriptor was handed out by an emulated accept.

use desock_core::Fd;

/// epoll interest recorded by an emulated `epoll_ctl`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpollRegistration {
    /// epoll instance the descriptor was added to
    pub epfd: Fd,
    /// Requested event mask (including flags such as EPOLLONESHOT)
    pub events: u32,
    /// Caller data returned with every event
    pub data: u64,
    /// Cleared after a one-shot registration fired, set again by MOD
    pub armed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FdEntry {
    /// Simulated socket
    pub desock: bool,
    /// listen() was called; this is the admission descriptor
    pub listening: bool,
    /// Socket domain (AF_INET or AF_INET6)
    pub domain: i32,
    pub epoll: Option<EpollRegistration>,
}

/// Descriptor metadata table
#[derive(Debug, Clone)]
pub struct FdTable {
    entries: Box<[FdEntry]>,
    /// Highest descriptor ever tracked
    max_fd: Option<usize>,
}

impl FdTable {
    pub fn new(size: usize) -> Self {
        Self {
            entries: vec![FdEntry::default(); size].into_boxed_slice(),
            max_fd: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    fn index(&self, fd: Fd) -> Option<usize> {
        usize::try_from(fd).ok().filter(|&i| i < self.entries.len())
    }

    pub fn in_range(&self, fd: Fd) -> bool {
        self.index(fd).is_some()
    }

    pub fn get(&self, fd: Fd) -> Option<&FdEntry> {
        self.index(fd).map(|i| &self.entries[i])
    }

    pub fn get_mut(&mut self, fd: Fd) -> Option<&mut FdEntry> {
        self.index(fd).map(move |i| &mut self.entries[i])
    }

    /// Tracked simulated socket (listening or not)
    pub fn is_tracked(&self, fd: Fd) -> bool {
        self.get(fd).map_or(false, |e| e.desock)
    }

    pub fn is_listening(&self, fd: Fd) -> bool {
        self.get(fd).map_or(false, |e| e.desock && e.listening)
    }

    fn note_fd(&mut self, index: usize) {
        self.max_fd = Some(self.max_fd.map_or(index, |max| max.max(index)));
    }

    /// Start simulating `fd`. Returns false when it is outside the table.
    pub fn track(&mut self, fd: Fd, domain: i32) -> bool {
        let Some(index) = self.index(fd) else {
            return false;
        };
        self.entries[index] = FdEntry { desock: true, listening: false, domain, epoll: None };
        self.note_fd(index);
        true
    }

    pub fn clear(&mut self, fd: Fd) {
        if let Some(entry) = self.get_mut(fd) {
            *entry = FdEntry::default();
        }
    }

    /// Make `new` describe the same socket as `old`; epoll interest is
    /// per descriptor and is not copied
    pub fn copy(&mut self, old: Fd, new: Fd) -> bool {
        let (Some(from), Some(to)) = (self.index(old), self.index(new)) else {
            return false;
        };
        self.entries[to] = FdEntry { epoll: None, ..self.entries[from] };
        self.note_fd(to);
        true
    }

    pub fn max_fd(&self) -> Option<Fd> {
        self.max_fd.map(|i| i as Fd)
    }

    /// Tracked descriptors, ascending
    pub fn tracked(&self) -> impl Iterator<Item = (Fd, &FdEntry)> + '_ {
        let end = self.max_fd.map_or(0, |max| max + 1);
        self.entries[..end]
            .iter()
            .enumerate()
            .filter(|(_, e)| e.desock)
            .map(|(i, e)| (i as Fd, e))
    }

    /// Tracked descriptors with armed interest on `epfd`, ascending
    pub fn armed_on(&self, epfd: Fd) -> Vec<Fd> {
        self.tracked()
            .filter(|(_, e)| matches!(e.epoll, Some(reg) if reg.epfd == epfd && reg.armed))
            .map(|(fd, _)| fd)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_and_clear() {
        let mut table = FdTable::new(16);
        assert!(table.track(3, libc::AF_INET));
        assert!(!table.track(16, libc::AF_INET));
        assert!(!table.track(-1, libc::AF_INET));

        assert!(table.is_tracked(3));
        assert!(!table.is_tracked(4));
        assert_eq!(table.max_fd(), Some(3));

        table.clear(3);
        assert!(!table.is_tracked(3));
        // High-water mark is kept
        assert_eq!(table.max_fd(), Some(3));
    }

    #[test]
    fn test_copy_drops_epoll_interest() {
        let mut table = FdTable::new(16);
        table.track(4, libc::AF_INET6);
        table.get_mut(4).unwrap().epoll = Some(EpollRegistration { epfd: 9, events: 1, data: 42, armed: true });

        assert!(table.copy(4, 10));
        let copy = table.get(10).unwrap();
        assert!(copy.desock);
        assert_eq!(copy.domain, libc::AF_INET6);
        assert_eq!(copy.epoll, None);
        assert_eq!(table.max_fd(), Some(10));
    }

    #[test]
    fn test_armed_on() {
        let mut table = FdTable::new(16);
        for fd in [2, 5, 7] {
            table.track(fd, libc::AF_INET);
        }
        table.get_mut(2).unwrap().epoll = Some(EpollRegistration { epfd: 1, events: 1, data: 0, armed: true });
        table.get_mut(5).unwrap().epoll = Some(EpollRegistration { epfd: 1, events: 1, data: 0, armed: false });
        table.get_mut(7).unwrap().epoll = Some(EpollRegistration { epfd: 1, events: 1, data: 0, armed: true });

        assert_eq!(table.armed_on(1), vec![2, 7]);
        assert!(table.armed_on(8).is_empty());
        assert_eq!(table.tracked().map(|(fd, _)| fd).collect::<Vec<_>>(), vec![2, 5, 7]);
    }
}
