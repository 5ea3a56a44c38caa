//! Process-wide instance
//!
//! The interposer has no place to keep state of its own; it calls `init()`
//! from its constructor (or lazily from the first hook) and `get()` after.

use std::sync::OnceLock;

use desock_core::{dinfo, DesockConfig, DesockResult};

use crate::hooks::Desock;

static DESOCK: OnceLock<Desock> = OnceLock::new();

/// Build the instance from the environment on first call.
///
/// Fails when the configuration is invalid, the channel cannot be attached
/// or the admission semaphore cannot be created. A racing loser's instance
/// is dropped; every caller gets the same one.
pub fn init() -> DesockResult<&'static Desock> {
    if let Some(desock) = DESOCK.get() {
        return Ok(desock);
    }

    desock_core::log::init();
    let config = DesockConfig::from_env();
    config.validate()?;
    let desock = Desock::from_env(config)?;
    dinfo!(
        "desock: initialized (max_conns={}, fd_table_size={})",
        desock.config().max_conns,
        desock.config().fd_table_size
    );
    Ok(DESOCK.get_or_init(|| desock))
}

/// The instance, if `init()` succeeded
pub fn get() -> Option<&'static Desock> {
    DESOCK.get()
}
