//! `select`/`pselect` emulation
//!
//! Simulated descriptors in the read set are reported only when the decoder
//! says their connection is next, so the target consumes the channel in
//! capture order. The listening descriptor is readable while an admission
//! permit is available; taking it is remembered for the next accept.
//! Untracked descriptors are dropped from the result.

use std::time::Duration;

use desock_core::{ddebug, Admission, DesockResult, Fd};

use crate::fdset::FdSet;
use crate::hooks::Desock;

impl<A: Admission> Desock<A> {
    /// Emulated `select`. A zero timeout polls; any other timeout (or none)
    /// may block while waiting for an admission permit.
    ///
    /// Returns the total number of bits left set across the three sets.
    pub fn select(
        &self,
        nfds: Fd,
        read: Option<&mut FdSet>,
        write: Option<&mut FdSet>,
        except: Option<&mut FdSet>,
        timeout: Option<Duration>,
    ) -> DesockResult<usize> {
        if read.is_none() && write.is_none() && except.is_none() {
            return Ok(0);
        }
        let polling = timeout.map_or(false, |t| t.is_zero());

        let mut listener = None;
        let mut candidates = Vec::new();
        let mut ready = Vec::new();
        let mut writable = Vec::new();
        {
            let mut state = self.lock();
            state.refresh()?;

            if let Some(set) = read.as_deref() {
                for fd in set.iter(nfds) {
                    match state.fds.get(fd) {
                        Some(e) if e.desock && e.listening => {
                            listener.get_or_insert(fd);
                        }
                        Some(e) if e.desock => {
                            candidates.push(fd);
                            if state.is_next_ready(fd) {
                                ready.push(fd);
                            }
                        }
                        _ => {}
                    }
                }
            }

            if let Some(set) = write.as_deref() {
                writable = set
                    .iter(nfds)
                    .filter(|&fd| state.fds.is_tracked(fd) && !state.fds.is_listening(fd))
                    .collect();
            }
        }

        // A blocking call never returns empty-handed while connections exist
        if ready.is_empty() && !polling {
            ready = candidates;
        }

        let listener = match listener {
            Some(fd) => {
                let may_block = ready.is_empty() && writable.is_empty() && !polling;
                self.offer_listener(may_block)?.then_some(fd)
            }
            None => None,
        };

        if let Some(set) = read {
            *set = ready.iter().copied().chain(listener).collect();
        }
        if let Some(set) = write {
            *set = writable.iter().copied().collect();
        }
        if let Some(set) = except {
            set.clear();
        }

        let count = ready.len() + usize::from(listener.is_some()) + writable.len();
        ddebug!(
            "desock::select({}, read={:?}, write={:?}, listener={:?}) = {}",
            nfds,
            ready,
            writable,
            listener,
            count
        );
        Ok(count)
    }

    /// Emulated `pselect`; the signal mask has no effect on emulated waits
    pub fn pselect(
        &self,
        nfds: Fd,
        read: Option<&mut FdSet>,
        write: Option<&mut FdSet>,
        except: Option<&mut FdSet>,
        timeout: Option<Duration>,
    ) -> DesockResult<usize> {
        self.select(nfds, read, write, except, timeout)
    }
}

// ============================================================================
// Tests
// ============================================================================
