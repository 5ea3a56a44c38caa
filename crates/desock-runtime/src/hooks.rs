//! Syscall hooks
//!
//! Plain Rust entry points for an interposer that shadows the C library's
//! socket functions. Each hook either emulates the call against the packet
//! channel ([`Intercept::Emulated`]) or asks the interposer to call the real
//! function ([`Intercept::Forward`]).
//!
//! # Channel-backed mode
//!
//! ```text
//! Inactive --first accept/connect--> Active --last connection closed--> Finished
//! ```
//!
//! The decoder is positioned on the first round when the first connection is
//! registered. Once every connection is gone the channel stays off for the
//! rest of the process.
//!
//! # Locking
//!
//! Decoder, pool and descriptor table live behind one mutex. The lock is
//! never held while waiting for an admission permit.

use std::net::{Shutdown, SocketAddr};
use std::sync::{Mutex, MutexGuard, PoisonError};

use desock_core::log::echo_payload;
use desock_core::{ddebug, dinfo};
use desock_core::{Admission, ConnPool, Decoder, DesockConfig, DesockResult, Fd, PoolError};

use crate::channel::{self, PacketBuffer};
use crate::fd_table::FdTable;
use crate::semaphore::{new_platform_admission, PlatformAdmission};
use crate::sockaddr::stub_peer;

/// Outcome of a hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intercept<T> {
    /// The call was handled; return this value to the caller
    Emulated(T),
    /// Not a simulated socket; call the real function
    Forward,
}

impl<T> Intercept<T> {
    pub fn is_forward(&self) -> bool {
        matches!(self, Intercept::Forward)
    }

    pub fn emulated(self) -> Option<T> {
        match self {
            Intercept::Emulated(v) => Some(v),
            Intercept::Forward => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Intercept<U> {
        match self {
            Intercept::Emulated(v) => Intercept::Emulated(f(v)),
            Intercept::Forward => Intercept::Forward,
        }
    }
}

/// Whether reads are served from the packet channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// No connection registered yet, or no channel attached
    Inactive,
    /// Reads on connections come from the decoder
    Active,
    /// Every connection was closed; terminal
    Finished,
}

/// Map a `shutdown(2)` `how` argument
pub fn shutdown_from_raw(how: i32) -> Option<Shutdown> {
    match how {
        libc::SHUT_RD => Some(Shutdown::Read),
        libc::SHUT_WR => Some(Shutdown::Write),
        libc::SHUT_RDWR => Some(Shutdown::Both),
        _ => None,
    }
}

pub(crate) struct State {
    pub(crate) decoder: Decoder<PacketBuffer>,
    pub(crate) pool: ConnPool,
    pub(crate) fds: FdTable,
    /// Channel waiting for the first connection
    source: Option<PacketBuffer>,
    pub(crate) mode: ChannelMode,
    /// Permits taken by select/epoll on behalf of the next accept
    pub(crate) pre_admitted: usize,
}

impl State {
    fn new(config: &DesockConfig) -> Self {
        Self {
            decoder: Decoder::new(config.max_conns),
            pool: ConnPool::new(config.max_conns, config.fd_table_size),
            fds: FdTable::new(config.fd_table_size),
            source: None,
            mode: ChannelMode::Inactive,
            pre_admitted: 0,
        }
    }

    pub(crate) fn refresh(&mut self) -> DesockResult<()> {
        if self.mode == ChannelMode::Active {
            self.decoder.recompute_readiness()?;
        }
        Ok(())
    }

    /// Descriptors without a connection, and everything outside
    /// channel-backed mode, never hold back a readiness report
    pub(crate) fn is_next_ready(&self, fd: Fd) -> bool {
        if self.mode != ChannelMode::Active {
            return true;
        }
        match self.pool.lookup(fd) {
            Some(slot) => self.decoder.has_data(slot),
            None => true,
        }
    }

    fn activate(&mut self) -> DesockResult<()> {
        if self.mode != ChannelMode::Inactive {
            return Ok(());
        }
        if let Some(source) = self.source.take() {
            let len = source.as_ref().len();
            self.decoder.attach(source)?;
            self.mode = ChannelMode::Active;
            dinfo!("desock: channel active ({} bytes, {} connection slots)", len, self.decoder.max_conns());
        }
        Ok(())
    }

    fn shutdown_read(&mut self, fd: Fd) -> DesockResult<()> {
        self.pool.close(fd)?;
        if self.mode == ChannelMode::Active && !self.pool.any_open() {
            self.mode = ChannelMode::Finished;
            dinfo!("desock: last connection closed, channel finished");
        }
        Ok(())
    }

    fn close(&mut self, fd: Fd) -> DesockResult<()> {
        if self.pool.lookup(fd).is_some() {
            self.shutdown_read(fd)?;
        }
        self.fds.clear(fd);
        Ok(())
    }
}

/// The virtual socket layer of one process
pub struct Desock<A = PlatformAdmission> {
    state: Mutex<State>,
    admission: A,
    config: DesockConfig,
}

impl Desock<PlatformAdmission> {
    /// Platform permit pool plus whatever channel the environment names
    pub fn from_env(config: DesockConfig) -> DesockResult<Self> {
        let admission = new_platform_admission(config.max_conns)?;
        let desock = Self::new(config, admission)?;
        if let Some(buffer) = channel::open_from_env(&desock.config)? {
            desock.attach(buffer);
        }
        Ok(desock)
    }
}

impl<A: Admission> Desock<A> {
    pub fn new(config: DesockConfig, admission: A) -> DesockResult<Self> {
        config.validate()?;
        Ok(Self {
            state: Mutex::new(State::new(&config)),
            admission,
            config,
        })
    }

    pub fn config(&self) -> &DesockConfig {
        &self.config
    }

    pub fn admission(&self) -> &A {
        &self.admission
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Use `buffer` as the packet channel. Decoding restarts from the first
    /// round at the next accept or connect.
    ///
    /// Connections of the previous channel lose their slot: their
    /// descriptors stay simulated, reads on them fail with EBADF.
    pub fn attach(&self, buffer: impl Into<PacketBuffer>) {
        let mut state = self.lock();
        if state.pool.any_open() {
            dinfo!("desock: dropping {} connection(s) of the previous channel", state.pool.open_count());
            state.pool.clear();
        }
        state.decoder.reset();
        state.source = Some(buffer.into());
        state.mode = ChannelMode::Inactive;
    }

    pub fn mode(&self) -> ChannelMode {
        self.lock().mode
    }

    /// Every connection's cursor sits on End, or the channel is finished
    pub fn is_end_of_stream(&self) -> bool {
        let state = self.lock();
        match state.mode {
            ChannelMode::Active => state.decoder.is_end_of_stream(),
            ChannelMode::Finished => true,
            ChannelMode::Inactive => false,
        }
    }

    /// Permits held for upcoming accepts
    pub fn pending_admissions(&self) -> usize {
        self.lock().pre_admitted
    }

    // ------------------------------------------------------------------
    // Socket lifecycle
    // ------------------------------------------------------------------

    /// `socket()` returned `fd`. Stream sockets of the inet families are
    /// simulated from now on; returns whether `fd` is tracked.
    pub fn on_socket(&self, fd: Fd, domain: i32, ty: i32) -> DesockResult<bool> {
        // Type in the low bits; SOCK_NONBLOCK/SOCK_CLOEXEC above them
        let stream = ty & 0xf == libc::SOCK_STREAM;
        let inet = domain == libc::AF_INET || domain == libc::AF_INET6;
        if !stream || !inet {
            return Ok(false);
        }

        let tracked = self.lock().fds.track(fd, domain);
        ddebug!("desock::socket({}, {}) = {}", domain, ty, if tracked { fd } else { -1 });
        Ok(tracked)
    }

    pub fn on_bind(&self, fd: Fd) -> DesockResult<Intercept<()>> {
        if !self.lock().fds.is_tracked(fd) {
            return Ok(Intercept::Forward);
        }
        ddebug!("desock::bind({}) = 0", fd);
        Ok(Intercept::Emulated(()))
    }

    /// Marks `fd` as the admission descriptor
    pub fn on_listen(&self, fd: Fd) -> DesockResult<Intercept<()>> {
        let mut state = self.lock();
        match state.fds.get_mut(fd) {
            Some(entry) if entry.desock => entry.listening = true,
            _ => return Ok(Intercept::Forward),
        }
        ddebug!("desock::listen({}) = 0", fd);
        Ok(Intercept::Emulated(()))
    }

    /// `accept()` on `listener`; `accepted` is the descriptor the interposer
    /// allocated for the new connection. Blocks while every permit is taken.
    pub fn on_accept(&self, listener: Fd, accepted: Fd) -> DesockResult<Intercept<Fd>> {
        let domain = match self.lock().fds.get(listener) {
            Some(entry) if entry.desock && entry.listening => entry.domain,
            _ => return Ok(Intercept::Forward),
        };

        self.admit()?;
        let slot = self.register_connection(accepted, domain, true)?;
        ddebug!("desock::accept({}) = {} (connection {})", listener, accepted, slot);
        Ok(Intercept::Emulated(accepted))
    }

    /// Client-side counterpart of `on_accept`
    pub fn on_connect(&self, fd: Fd) -> DesockResult<Intercept<()>> {
        let domain = match self.lock().fds.get(fd) {
            Some(entry) if entry.desock && !entry.listening => entry.domain,
            _ => return Ok(Intercept::Forward),
        };

        self.admit()?;
        let slot = self.register_connection(fd, domain, false)?;
        ddebug!("desock::connect({}) = 0 (connection {})", fd, slot);
        Ok(Intercept::Emulated(()))
    }

    /// Take a permit, preferring one already held by readiness emulation
    fn admit(&self) -> DesockResult<()> {
        {
            let mut state = self.lock();
            if state.pre_admitted > 0 {
                state.pre_admitted -= 1;
                return Ok(());
            }
        }

        if !self.admission.try_acquire()? {
            ddebug!("desock: waiting for a connection slot");
            self.admission.acquire()?;
        }
        Ok(())
    }

    /// Whether the listening descriptor can be reported readable: true when a
    /// permit is held for the next accept, or one could be taken now. With
    /// `may_block`, waits for a permit instead of giving up.
    pub(crate) fn offer_listener(&self, may_block: bool) -> DesockResult<bool> {
        if self.lock().pre_admitted > 0 {
            return Ok(true);
        }

        if !self.admission.try_acquire()? {
            if !may_block {
                return Ok(false);
            }
            ddebug!("desock: waiting for a connection slot");
            self.admission.acquire()?;
        }

        self.lock().pre_admitted += 1;
        Ok(true)
    }

    /// Bind `fd` to a connection slot. An accepted descriptor gets a fresh
    /// entry; a connecting one keeps what was recorded since `socket()`,
    /// epoll interest included.
    fn register_connection(&self, fd: Fd, domain: i32, accepted: bool) -> DesockResult<usize> {
        let mut state = self.lock();
        let tracked = if accepted {
            state.fds.track(fd, domain)
        } else {
            state.fds.is_tracked(fd) || state.fds.track(fd, domain)
        };
        if !tracked {
            return Err(PoolError::FdOutOfRange { fd, limit: state.fds.len() }.into());
        }
        let slot = state.pool.open(fd)?;
        state.activate()?;
        Ok(slot)
    }

    // ------------------------------------------------------------------
    // Data path
    // ------------------------------------------------------------------

    /// Serve a read from the connection behind `fd`. A simulated socket
    /// without a live connection fails with EBADF.
    pub fn on_read(&self, fd: Fd, buf: &mut [u8]) -> DesockResult<Intercept<usize>> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !state.fds.is_tracked(fd) {
            return Ok(Intercept::Forward);
        }

        let slot = match (state.mode, state.pool.lookup(fd)) {
            (ChannelMode::Active, Some(slot)) => slot,
            _ => {
                ddebug!("desock::read({}, {}) = EBADF", fd, buf.len());
                return Err(PoolError::Unmapped { fd }.into());
            }
        };

        let n = state.decoder.read(slot, buf)?;
        ddebug!("desock::read({}, {}) = {}", fd, buf.len(), n);
        if self.config.echo_io {
            echo_payload("read", fd, &buf[..n]);
        }
        Ok(Intercept::Emulated(n))
    }

    /// Accept and discard everything written to a simulated socket
    pub fn on_write(&self, fd: Fd, buf: &[u8]) -> DesockResult<Intercept<usize>> {
        if !self.lock().fds.is_tracked(fd) {
            return Ok(Intercept::Forward);
        }
        ddebug!("desock::write({}, {}) = {}", fd, buf.len(), buf.len());
        if self.config.echo_io {
            echo_payload("write", fd, buf);
        }
        Ok(Intercept::Emulated(buf.len()))
    }

    /// Closing the read side releases the connection; the write side is a no-op
    pub fn on_shutdown(&self, fd: Fd, how: Shutdown) -> DesockResult<Intercept<()>> {
        let mut state = self.lock();
        if !state.fds.is_tracked(fd) {
            return Ok(Intercept::Forward);
        }
        if matches!(how, Shutdown::Read | Shutdown::Both) {
            state.shutdown_read(fd)?;
        }
        ddebug!("desock::shutdown({}, {:?}) = 0", fd, how);
        Ok(Intercept::Emulated(()))
    }

    /// Bookkeeping for `close()`; the interposer still closes the real descriptor
    pub fn on_close(&self, fd: Fd) -> DesockResult<()> {
        let mut state = self.lock();
        if !state.fds.is_tracked(fd) {
            return Ok(());
        }
        state.close(fd)?;
        ddebug!("desock::close({}) = 0", fd);
        Ok(())
    }

    /// Bookkeeping for `dup`/`dup2`/`dup3` after the real call made `new`
    /// a copy of `old`
    pub fn on_duplicate(&self, old: Fd, new: Fd) -> DesockResult<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if old == new {
            return Ok(());
        }

        if state.fds.is_tracked(old) {
            if state.pool.lookup(old).is_some() {
                state.pool.duplicate(old, new)?;
            } else if state.pool.lookup(new).is_some() {
                state.shutdown_read(new)?;
            }
            if !state.fds.copy(old, new) {
                return Err(PoolError::FdOutOfRange { fd: new, limit: state.fds.len() }.into());
            }
            ddebug!("desock::dup({}, {}) = {}", old, new, new);
        } else if state.fds.is_tracked(new) {
            // An unrelated descriptor replaced a simulated one
            state.close(new)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Readiness
    // ------------------------------------------------------------------

    pub fn is_next_ready(&self, fd: Fd) -> bool {
        self.lock().is_next_ready(fd)
    }

    pub fn refresh_readiness(&self) -> DesockResult<()> {
        self.lock().refresh()
    }

    /// Address reported by `accept`/`getpeername` for a simulated socket
    pub fn peer_addr(&self, fd: Fd) -> Option<SocketAddr> {
        let state = self.lock();
        let entry = state.fds.get(fd).filter(|e| e.desock)?;
        stub_peer(entry.domain)
    }
}
