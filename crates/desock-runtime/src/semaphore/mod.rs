//! Admission permits
//!
//! The permit pool must be shared by every thread of the target, and by its
//! forked children, so concurrent accepts serialize against `max_conns`.
//! Linux gets an unnamed POSIX semaphore in a shared anonymous mapping.
//! Other platforms fall back to the process-local permit pool.

use desock_core::DesockResult;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod posix_linux;
        pub use posix_linux::SharedSemaphore;
        pub use posix_linux::SharedSemaphore as PlatformAdmission;

        /// Create the platform admission pool with `permits` permits
        pub fn new_platform_admission(permits: usize) -> DesockResult<PlatformAdmission> {
            SharedSemaphore::new(permits)
        }
    } else {
        pub use desock_core::LocalPermits as PlatformAdmission;

        /// Create the platform admission pool with `permits` permits
        pub fn new_platform_admission(permits: usize) -> DesockResult<PlatformAdmission> {
            Ok(PlatformAdmission::new(permits))
        }
    }
}
