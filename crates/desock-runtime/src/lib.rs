//! # desock-runtime
//!
//! The virtualized socket layer. An interposer that shadows the C library's
//! socket functions calls into [`Desock`]; every hook either emulates the
//! call against the packet channel or tells the interposer to forward it.
//!
//! This crate provides:
//! - Packet channel attach (SysV shared memory, stdin or an owned buffer)
//! - Admission permits (process-shared POSIX semaphore on Linux)
//! - Descriptor metadata table and `fd_set` wrapper
//! - Syscall hooks and `select`/`pselect`/`epoll` emulation
//! - The process-wide instance

pub mod channel;
pub mod errno;
pub mod fd_table;
pub mod fdset;
pub mod global;
pub mod hooks;
pub mod select;
pub mod semaphore;
pub mod sockaddr;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod epoll;

// Re-exports
pub use channel::{PacketBuffer, ShmSegment, CHANNEL_ENV};
pub use errno::errno_of;
pub use fd_table::{EpollRegistration, FdEntry, FdTable};
pub use fdset::FdSet;
pub use hooks::{shutdown_from_raw, ChannelMode, Desock, Intercept};
pub use semaphore::{new_platform_admission, PlatformAdmission};

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use epoll::{EpollEvent, EpollOp};
