//! Process-shared POSIX semaphore
//!
//! `sem_init(pshared = 1)` on memory from a `MAP_SHARED | MAP_ANONYMOUS`
//! mapping, so the count survives `fork` and is shared with children.

use std::num::NonZeroUsize;
use std::ptr::NonNull;

use desock_core::{Admission, DesockError, DesockResult};
use nix::errno::Errno;
use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};

/// Counting semaphore shared across threads and forked processes
pub struct SharedSemaphore {
    sem: NonNull<libc::sem_t>,
    map_len: usize,
}

// Safety: sem_t is designed for concurrent use through a shared pointer;
// the mapping lives until drop.
unsafe impl Send for SharedSemaphore {}
unsafe impl Sync for SharedSemaphore {}

impl SharedSemaphore {
    pub fn new(permits: usize) -> DesockResult<Self> {
        let value = libc::c_uint::try_from(permits).map_err(|_| DesockError::Semaphore(libc::EINVAL))?;
        let map_len = NonZeroUsize::new(std::mem::size_of::<libc::sem_t>())
            .ok_or(DesockError::Semaphore(libc::EINVAL))?;

        let mapping = unsafe {
            mmap_anonymous(
                None,
                map_len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
            )
        }
        .map_err(|e| DesockError::Semaphore(e as i32))?;

        let sem = mapping.cast::<libc::sem_t>();
        if unsafe { libc::sem_init(sem.as_ptr(), 1, value) } == -1 {
            let errno = Errno::last() as i32;
            unsafe {
                let _ = munmap(mapping, map_len.get());
            }
            return Err(DesockError::Semaphore(errno));
        }

        Ok(Self { sem, map_len: map_len.get() })
    }
}

impl Admission for SharedSemaphore {
    fn try_acquire(&self) -> DesockResult<bool> {
        loop {
            if unsafe { libc::sem_trywait(self.sem.as_ptr()) } == 0 {
                return Ok(true);
            }
            match Errno::last() {
                Errno::EAGAIN => return Ok(false),
                Errno::EINTR => continue,
                e => return Err(DesockError::Semaphore(e as i32)),
            }
        }
    }

    fn acquire(&self) -> DesockResult<()> {
        loop {
            if unsafe { libc::sem_wait(self.sem.as_ptr()) } == 0 {
                return Ok(());
            }
            match Errno::last() {
                Errno::EINTR => continue,
                e => return Err(DesockError::Semaphore(e as i32)),
            }
        }
    }

    fn release(&self) -> DesockResult<()> {
        if unsafe { libc::sem_post(self.sem.as_ptr()) } == -1 {
            return Err(DesockError::Semaphore(Errno::last() as i32));
        }
        Ok(())
    }

    fn available(&self) -> usize {
        let mut value: libc::c_int = 0;
        if unsafe { libc::sem_getvalue(self.sem.as_ptr(), &mut value) } == -1 {
            return 0;
        }
        usize::try_from(value).unwrap_or(0)
    }
}

impl Drop for SharedSemaphore {
    fn drop(&mut self) {
        unsafe {
            libc::sem_destroy(self.sem.as_ptr());
            let _ = munmap(self.sem.cast::<libc::c_void>(), self.map_len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_across_fork() {
        let sem = SharedSemaphore::new(1).unwrap();

        match unsafe { libc::fork() } {
            -1 => panic!("fork failed"),
            0 => {
                // Child takes the only permit and exits without running destructors
                let taken = matches!(sem.try_acquire(), Ok(true));
                unsafe { libc::_exit(if taken { 0 } else { 1 }) }
            }
            child => {
                let mut status = 0;
                unsafe { libc::waitpid(child, &mut status, 0) };
                assert!(libc::WIFEXITED(status));
                assert_eq!(libc::WEXITSTATUS(status), 0);

                assert!(!sem.try_acquire().unwrap());
                assert_eq!(sem.available(), 0);
            }
        }
    }
}
