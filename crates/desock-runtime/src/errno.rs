//! errno mapping for hook failures
//!
//! The interposer turns a failed hook into `-1` plus errno; fatal errors
//! (see [`DesockError::is_fatal`]) are reported and the process aborted.

use desock_core::{ConfigError, DecodeError, DesockError, PoolError};
use nix::errno::Errno;

/// errno a failed hook surfaces to the target program
pub fn errno_of(err: &DesockError) -> Errno {
    match err {
        DesockError::Pool(PoolError::Unmapped { .. }) => Errno::EBADF,
        DesockError::Pool(PoolError::FdOutOfRange { .. }) => Errno::EBADF,
        DesockError::Pool(PoolError::NoFreeSlot { .. }) => Errno::EMFILE,
        DesockError::Decode(DecodeError::Truncated { .. })
        | DesockError::Decode(DecodeError::Oversized { .. }) => Errno::EIO,
        DesockError::Decode(_) => Errno::EPROTO,
        DesockError::Config(ConfigError::InvalidValue(_)) => Errno::EINVAL,
        DesockError::InvalidChannelId(_) => Errno::EINVAL,
        DesockError::ShmAttach { errno, .. } | DesockError::Semaphore(errno) | DesockError::Os(errno) => {
            Errno::from_raw(*errno)
        }
    }
}

/// Convert a hook result into the errno form a libc wrapper returns
pub fn into_errno<T>(result: Result<T, DesockError>) -> Result<T, Errno> {
    result.map_err(|e| errno_of(&e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmapped_is_ebadf() {
        let err = DesockError::Pool(PoolError::Unmapped { fd: 9 });
        assert_eq!(errno_of(&err), Errno::EBADF);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_os_errno_passthrough() {
        assert_eq!(errno_of(&DesockError::Os(libc::EINTR)), Errno::EINTR);
        assert_eq!(
            errno_of(&DesockError::ShmAttach { id: 3, errno: libc::ENOENT }),
            Errno::ENOENT
        );
    }

    #[test]
    fn test_into_errno() {
        let ok: Result<usize, DesockError> = Ok(4);
        assert_eq!(into_errno(ok), Ok(4));

        let err: Result<usize, DesockError> = Err(DecodeError::InvalidTag { offset: 0, tag: 7 }.into());
        assert_eq!(into_errno(err), Err(Errno::EPROTO));
    }
}
