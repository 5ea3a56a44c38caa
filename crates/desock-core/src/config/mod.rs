//! Desock configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder methods (programmatic)
//! 2. Environment variables (runtime)
//! 3. Library defaults
//!
//! # Example
//!
//! ```
//! use desock_core::DesockConfig;
//!
//! let config = DesockConfig::new().max_conns(4).echo_io(true);
//! assert!(config.validate().is_ok());
//! ```

pub mod defaults;

use crate::env::{env_get, env_get_bool};
use crate::error::ConfigError;

/// Limits and switches of the virtual socket layer.
///
/// Use `from_env()` to start with the library defaults and apply any
/// environment variable overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesockConfig {
    /// Connection slots; also the number of admission permits
    pub max_conns: usize,
    /// Descriptor table size
    pub fd_table_size: usize,
    /// Read the channel from stdin when no shared memory id is set
    pub stdin_fallback: bool,
    /// Echo payloads at trace level
    pub echo_io: bool,
}

impl Default for DesockConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DesockConfig {
    /// Create config from library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `DESOCK_MAX_CONNS` - Connection slots
    /// - `DESOCK_FD_TABLE_SIZE` - Descriptor table size
    /// - `DESOCK_STDIN_FALLBACK` - Read the channel from stdin (0/1)
    /// - `DESOCK_ECHO_IO` - Echo payloads at trace level (0/1)
    pub fn from_env() -> Self {
        Self {
            max_conns: env_get("DESOCK_MAX_CONNS", defaults::MAX_CONNS),
            fd_table_size: env_get("DESOCK_FD_TABLE_SIZE", defaults::FD_TABLE_SIZE),
            stdin_fallback: env_get_bool("DESOCK_STDIN_FALLBACK", defaults::STDIN_FALLBACK),
            echo_io: env_get_bool("DESOCK_ECHO_IO", defaults::ECHO_IO),
        }
    }

    /// Create config with explicit defaults (no env override).
    pub fn new() -> Self {
        Self {
            max_conns: defaults::MAX_CONNS,
            fd_table_size: defaults::FD_TABLE_SIZE,
            stdin_fallback: defaults::STDIN_FALLBACK,
            echo_io: defaults::ECHO_IO,
        }
    }

    // Builder methods

    pub fn max_conns(mut self, n: usize) -> Self {
        self.max_conns = n;
        self
    }

    pub fn fd_table_size(mut self, n: usize) -> Self {
        self.fd_table_size = n;
        self
    }

    pub fn stdin_fallback(mut self, enable: bool) -> Self {
        self.stdin_fallback = enable;
        self
    }

    pub fn echo_io(mut self, enable: bool) -> Self {
        self.echo_io = enable;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_conns == 0 {
            return Err(ConfigError::InvalidValue("max_conns must be > 0"));
        }
        if self.max_conns > defaults::MAX_CONNS_LIMIT {
            return Err(ConfigError::InvalidValue("max_conns must be <= 1024"));
        }
        if self.fd_table_size == 0 {
            return Err(ConfigError::InvalidValue("fd_table_size must be > 0"));
        }
        if self.fd_table_size > defaults::FD_TABLE_SIZE_LIMIT {
            return Err(ConfigError::InvalidValue("fd_table_size must be <= 65536"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("Desock Configuration:");
        eprintln!("  max_conns:       {}", self.max_conns);
        eprintln!("  fd_table_size:   {}", self.fd_table_size);
        eprintln!("  stdin_fallback:  {}", self.stdin_fallback);
        eprintln!("  echo_io:         {}", self.echo_io);
    }
}
