//! Error types for desock

use core::fmt;

use crate::Fd;

/// Result type for decoder operations
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Result type for connection pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Result type for everything above the decoder
pub type DesockResult<T> = Result<T, DesockError>;

/// Structural problems in a packet channel buffer.
///
/// The buffer comes from a trusted generator, so any of these means the
/// channel is corrupt. They are reported, never acted upon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Header or payload runs past the end of the buffer
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Record tag is not Data, Separator or End
    InvalidTag { offset: usize, tag: u32 },

    /// Data record addressed to a connection beyond the slot count
    ConnectionOutOfRange {
        offset: usize,
        conn: u32,
        max_conns: usize,
    },

    /// Payload size does not fit the address space
    Oversized { offset: usize, size: u64 },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated { offset, needed, available } => write!(
                f,
                "record at {:#x} truncated: needs {} bytes, {} available",
                offset, needed, available
            ),
            DecodeError::InvalidTag { offset, tag } => {
                write!(f, "invalid record tag {} at {:#x}", tag, offset)
            }
            DecodeError::ConnectionOutOfRange { offset, conn, max_conns } => write!(
                f,
                "record at {:#x} targets connection {} (max {})",
                offset, conn, max_conns
            ),
            DecodeError::Oversized { offset, size } => {
                write!(f, "record at {:#x} has oversized payload of {} bytes", offset, size)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Connection pool failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Descriptor outside the configured descriptor table
    FdOutOfRange { fd: Fd, limit: usize },

    /// Every connection slot is in use
    NoFreeSlot { max_conns: usize },

    /// Descriptor is not mapped to a connection
    Unmapped { fd: Fd },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::FdOutOfRange { fd, limit } => {
                write!(f, "descriptor {} outside descriptor table of {}", fd, limit)
            }
            PoolError::NoFreeSlot { max_conns } => {
                write!(f, "all {} connection slots in use", max_conns)
            }
            PoolError::Unmapped { fd } => write!(f, "descriptor {} is not a connection", fd),
        }
    }
}

impl std::error::Error for PoolError {}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors surfaced by the hooks and the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesockError {
    /// Packet channel is corrupt
    Decode(DecodeError),

    /// Descriptor bookkeeping failed
    Pool(PoolError),

    /// Limits or switches are invalid
    Config(ConfigError),

    /// Channel id in the environment does not parse
    InvalidChannelId(String),

    /// shmctl/shmat on the channel segment failed
    ShmAttach { id: i32, errno: i32 },

    /// Semaphore setup or wait failed
    Semaphore(i32),

    /// Other OS error with errno
    Os(i32),
}

impl DesockError {
    /// Whether the harness is misconfigured or the channel is corrupt.
    ///
    /// Fatal errors cannot be surfaced to the target program as a socket
    /// error; the interposer reports them and stops the process.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DesockError::Pool(PoolError::Unmapped { .. }) | DesockError::Os(_))
    }
}

impl fmt::Display for DesockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DesockError::Decode(e) => write!(f, "packet channel: {}", e),
            DesockError::Pool(e) => write!(f, "connection pool: {}", e),
            DesockError::Config(e) => write!(f, "{}", e),
            DesockError::InvalidChannelId(raw) => write!(f, "invalid packet channel id {:?}", raw),
            DesockError::ShmAttach { id, errno } => {
                write!(f, "cannot attach shared memory {}: errno {}", id, errno)
            }
            DesockError::Semaphore(errno) => write!(f, "admission semaphore: errno {}", errno),
            DesockError::Os(errno) => write!(f, "OS error: errno {}", errno),
        }
    }
}

impl std::error::Error for DesockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DesockError::Decode(e) => Some(e),
            DesockError::Pool(e) => Some(e),
            DesockError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DecodeError> for DesockError {
    fn from(e: DecodeError) -> Self {
        DesockError::Decode(e)
    }
}

impl From<PoolError> for DesockError {
    fn from(e: PoolError) -> Self {
        DesockError::Pool(e)
    }
}

impl From<ConfigError> for DesockError {
    fn from(e: ConfigError) -> Self {
        DesockError::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = DesockError::Pool(PoolError::Unmapped { fd: 7 });
        assert_eq!(format!("{}", e), "connection pool: descriptor 7 is not a connection");

        let e = DecodeError::InvalidTag { offset: 16, tag: 9 };
        assert_eq!(format!("{}", e), "invalid record tag 9 at 0x10");
    }

    #[test]
    fn test_error_conversion() {
        let err: DesockError = PoolError::NoFreeSlot { max_conns: 4 }.into();
        assert!(matches!(err, DesockError::Pool(PoolError::NoFreeSlot { max_conns: 4 })));

        let err: DesockError = DecodeError::Oversized { offset: 0, size: u64::MAX }.into();
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(!DesockError::Pool(PoolError::Unmapped { fd: 3 }).is_fatal());
        assert!(!DesockError::Os(4).is_fatal());
        assert!(DesockError::Pool(PoolError::FdOutOfRange { fd: 5000, limit: 1024 }).is_fatal());
        assert!(DesockError::Decode(DecodeError::InvalidTag { offset: 0, tag: 0 }).is_fatal());
        assert!(DesockError::Config(ConfigError::InvalidValue("x")).is_fatal());
    }
}
