//! epoll emulation
//!
//! Interest in simulated descriptors is kept in the descriptor table instead
//! of the kernel. `epoll_wait` reports those registrations against decoder
//! readiness and forwards to the real call when nothing simulated fires.

use std::time::Duration;

use desock_core::{ddebug, Admission, DesockError, DesockResult, Fd};

use crate::fd_table::EpollRegistration;
use crate::hooks::{Desock, Intercept, State};

const EPOLLIN: u32 = libc::EPOLLIN as u32;
const EPOLLOUT: u32 = libc::EPOLLOUT as u32;
const EPOLLONESHOT: u32 = libc::EPOLLONESHOT as u32;

/// `struct epoll_event` without the packing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpollEvent {
    pub events: u32,
    pub data: u64,
}

impl EpollEvent {
    pub fn new(events: u32, data: u64) -> Self {
        Self { events, data }
    }

    pub fn from_raw(raw: &libc::epoll_event) -> Self {
        Self { events: raw.events, data: raw.u64 }
    }

    pub fn to_raw(self) -> libc::epoll_event {
        libc::epoll_event { events: self.events, u64: self.data }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpollOp {
    Add,
    Modify,
    Delete,
}

impl EpollOp {
    pub fn from_raw(op: i32) -> Option<Self> {
        match op {
            libc::EPOLL_CTL_ADD => Some(EpollOp::Add),
            libc::EPOLL_CTL_MOD => Some(EpollOp::Modify),
            libc::EPOLL_CTL_DEL => Some(EpollOp::Delete),
            _ => None,
        }
    }
}

/// Write one event for `fd` if `fired` is non-empty; one-shot interest is
/// disarmed once reported
fn fire(state: &mut State, fd: Fd, fired: u32, out: &mut EpollEvent) -> bool {
    let Some(reg) = state.fds.get_mut(fd).and_then(|e| e.epoll.as_mut()) else {
        return false;
    };
    let fired = reg.events & fired;
    if fired == 0 {
        return false;
    }
    *out = EpollEvent::new(fired, reg.data);
    if reg.events & EPOLLONESHOT != 0 {
        reg.armed = false;
    }
    true
}

impl<A: Admission> Desock<A> {
    /// Emulated `epoll_ctl`. Interest is recorded for every descriptor in
    /// the table; only untracked ones also go to the kernel.
    pub fn epoll_ctl(
        &self,
        epfd: Fd,
        op: EpollOp,
        fd: Fd,
        event: Option<EpollEvent>,
    ) -> DesockResult<Intercept<()>> {
        let mut state = self.lock();
        let Some(entry) = state.fds.get_mut(fd) else {
            return Ok(Intercept::Forward);
        };
        let tracked = entry.desock;

        // Simulated descriptors never reach the kernel, so its EEXIST and
        // ENOENT checks happen here
        if tracked {
            let registered = matches!(entry.epoll, Some(reg) if reg.epfd == epfd);
            match op {
                EpollOp::Add if registered => return Err(DesockError::Os(libc::EEXIST)),
                EpollOp::Modify | EpollOp::Delete if !registered => {
                    return Err(DesockError::Os(libc::ENOENT));
                }
                _ => {}
            }
        }

        match (op, event) {
            (EpollOp::Add | EpollOp::Modify, Some(event)) => {
                entry.epoll = Some(EpollRegistration {
                    epfd,
                    events: event.events,
                    data: event.data,
                    armed: true,
                });
            }
            (EpollOp::Add | EpollOp::Modify, None) if tracked => {
                return Err(DesockError::Os(libc::EINVAL));
            }
            (EpollOp::Add | EpollOp::Modify, None) => {}
            (EpollOp::Delete, _) => entry.epoll = None,
        }

        if !tracked {
            return Ok(Intercept::Forward);
        }
        ddebug!("desock::epoll_ctl({}, {:?}, {}) = 0", epfd, op, fd);
        Ok(Intercept::Emulated(()))
    }

    /// Emulated `epoll_wait`. A zero timeout polls. When no simulated
    /// descriptor fires, the interposer runs the real call so untracked
    /// descriptors registered with the kernel are still served.
    pub fn epoll_wait(
        &self,
        epfd: Fd,
        events: &mut [EpollEvent],
        timeout: Option<Duration>,
    ) -> DesockResult<Intercept<usize>> {
        if events.is_empty() {
            return Ok(Intercept::Forward);
        }
        let polling = timeout.map_or(false, |t| t.is_zero());
        let capacity = events.len();
        let mut count = 0;
        let mut listener = None;

        {
            let mut guard = self.lock();
            let state = &mut *guard;
            state.refresh()?;

            let mut fallback = Vec::new();
            for fd in state.fds.armed_on(epfd) {
                if count == capacity {
                    break;
                }
                let Some(entry) = state.fds.get(fd) else { continue };
                let Some(reg) = entry.epoll else { continue };

                if entry.listening {
                    if reg.events & EPOLLIN != 0 {
                        listener.get_or_insert(fd);
                    }
                    continue;
                }

                let mask = if state.is_next_ready(fd) { EPOLLIN | EPOLLOUT } else { EPOLLOUT };
                if fire(state, fd, mask, &mut events[count]) {
                    count += 1;
                } else if reg.events & EPOLLIN != 0 {
                    fallback.push(fd);
                }
            }

            // Same guarantee as select: a blocking wait sees every connection
            if count == 0 && !polling {
                for fd in fallback.into_iter().take(capacity) {
                    if fire(state, fd, EPOLLIN | EPOLLOUT, &mut events[count]) {
                        count += 1;
                    }
                }
            }
        }

        if let Some(fd) = listener {
            if count < capacity && self.offer_listener(count == 0 && !polling)? {
                let mut state = self.lock();
                if fire(&mut state, fd, EPOLLIN, &mut events[count]) {
                    count += 1;
                }
            }
        }

        ddebug!("desock::epoll_wait({}, {}) = {}", epfd, capacity, count);
        if count == 0 {
            return Ok(Intercept::Forward);
        }
        Ok(Intercept::Emulated(count))
    }
}

// ============================================================================
// Tests
// ============================================================================
