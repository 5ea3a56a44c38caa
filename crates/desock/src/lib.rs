//! # desock - Desocketing for network fuzzing
//!
//! Feeds a server program its network input from a fuzzer-generated packet
//! channel instead of real sockets. Multi-connection captures replay in
//! capture order; admission of new connections is bounded by a semaphore.
//!
//! ## Quick Start
//!
//! ```ignore
//! use desock::prelude::*;
//!
//! let stream = StreamBuilder::new().data(0, b"GET / HTTP/1.0\r\n\r\n").finish();
//!
//! let desock = Desock::new(DesockConfig::new(), LocalPermits::new(8))?;
//! desock.attach(stream);
//!
//! desock.on_socket(3, libc::AF_INET, libc::SOCK_STREAM)?;
//! desock.on_listen(3)?;
//! desock.on_accept(3, 4)?;
//!
//! let mut buf = [0u8; 64];
//! let n = desock.on_read(4, &mut buf)?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Interposer (LD_PRELOAD)                    │
//! │      socket, accept, read, select, epoll_wait, close ...    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ Intercept::{Emulated, Forward}
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 desock-runtime: Desock                      │
//! │   hooks, select/epoll emulation, descriptor table           │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                   │
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌─────────────┐
//!    │  Decoder  │      │ ConnPool  │      │  Admission  │
//!    │  cursors  │      │ refcounts │      │  semaphore  │
//!    └───────────┘      └───────────┘      └─────────────┘
//!          │
//!          ▼
//!    ┌─────────────────────────────────────────────────────────┐
//!    │          Packet channel (SysV shm / stdin / Vec)        │
//!    │     Data | Separator | End records, 8-byte aligned      │
//!    └─────────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use desock_core::{
    Admission,
    ConfigError,
    ConnPool,
    DecodeError,
    DecodeResult,
    Decoder,
    DesockConfig,
    DesockError,
    DesockResult,
    Fd,
    LocalPermits,
    Packet,
    PoolError,
    ReadinessMap,
    Record,
    RecordIter,
    RecordKind,
    StreamBuilder,
    encode_packets,
    HEADER_SIZE,
};

// Re-export logging macros
pub use desock_core::{derror, dwarn, dinfo, ddebug, dtrace};
pub use desock_core::log::{LogLevel, escape_payload, init as init_logging, log_level, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use desock_core::env::{env_get, env_get_bool, env_get_opt, env_is_set};

// Re-export runtime types
pub use desock_runtime::{
    ChannelMode,
    Desock,
    FdSet,
    Intercept,
    PacketBuffer,
    PlatformAdmission,
    ShmSegment,
    CHANNEL_ENV,
    errno_of,
    new_platform_admission,
};
pub use desock_runtime::global::{get, init};

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use desock_runtime::{EpollEvent, EpollOp};

/// Common imports for interposers and harness tools
pub mod prelude {
    pub use crate::{
        Admission, ChannelMode, Desock, DesockConfig, DesockError, DesockResult, Fd, FdSet,
        Intercept, LocalPermits, PacketBuffer, StreamBuilder,
    };

    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub use crate::{EpollEvent, EpollOp};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_session() {
        let desock = Desock::new(DesockConfig::new().fd_table_size(16), LocalPermits::new(1)).unwrap();
        desock.attach(StreamBuilder::new().data(0, b"ping").finish());

        assert!(desock.on_socket(3, libc::AF_INET, libc::SOCK_STREAM).unwrap());
        desock.on_listen(3).unwrap();
        assert_eq!(desock.on_accept(3, 4).unwrap(), Intercept::Emulated(4));

        let mut buf = [0u8; 8];
        assert_eq!(desock.on_read(4, &mut buf).unwrap(), Intercept::Emulated(4));
        assert_eq!(&buf[..4], b"ping");
        assert_eq!(desock.mode(), ChannelMode::Active);
    }
}
