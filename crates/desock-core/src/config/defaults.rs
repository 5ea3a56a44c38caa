//! Library defaults for `DesockConfig`

/// Connection slots, and admission permits
pub const MAX_CONNS: usize = 8;

/// Descriptors tracked by the fd table and the pool
pub const FD_TABLE_SIZE: usize = 1024;

/// Read the packet channel from stdin when no segment id is set
pub const STDIN_FALLBACK: bool = false;

/// Echo every read and written payload at trace level
pub const ECHO_IO: bool = false;

/// Upper bound for `max_conns`
pub const MAX_CONNS_LIMIT: usize = 1024;

/// Upper bound for `fd_table_size`
pub const FD_TABLE_SIZE_LIMIT: usize = 65536;
