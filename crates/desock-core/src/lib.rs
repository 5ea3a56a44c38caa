//! # desock-core
//!
//! Core types for desocketed network fuzzing: the packet channel format,
//! the channel decoder and the connection pool.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Shared memory, semaphores and the syscall hooks live in `desock-runtime`.
//!
//! ## Modules
//!
//! - `record` - Packet channel record layout and traversal
//! - `stream` - Builder that serializes packets into a channel buffer
//! - `decoder` - Per-connection cursors, reads and readiness computation
//! - `readiness` - Readiness bitmap (one bit per connection slot)
//! - `pool` - Descriptor to connection-slot mapping with refcounts
//! - `admission` - Admission permit trait and a portable permit pool
//! - `error` - Error types
//! - `config` - Limits and switches with environment overrides
//! - `env` - Environment variable utilities
//! - `log` - Leveled stderr logging macros

pub mod record;
pub mod stream;
pub mod decoder;
pub mod readiness;
pub mod pool;
pub mod admission;
pub mod error;
pub mod config;
pub mod env;
pub mod log;

// Re-exports for convenience
pub use record::{Record, RecordKind, RecordIter, HEADER_SIZE};
pub use stream::{encode_packets, Packet, StreamBuilder};
pub use decoder::Decoder;
pub use readiness::ReadinessMap;
pub use pool::ConnPool;
pub use admission::{Admission, LocalPermits};
pub use error::{
    ConfigError, DecodeError, DecodeResult, DesockError, DesockResult, PoolError, PoolResult,
};
pub use config::DesockConfig;

/// Descriptor number as seen by the target program.
pub type Fd = i32;
