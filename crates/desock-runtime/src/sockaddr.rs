//! Peer address stubs
//!
//! Every simulated peer is a loopback client on port 1234; `accept` and
//! `getpeername` callers get that address in the socket's own domain.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

/// Port reported for every simulated peer
pub const STUB_PORT: u16 = 1234;

/// Stub peer address for a socket of `domain`; `None` for other domains
pub fn stub_peer(domain: i32) -> Option<SocketAddr> {
    match domain {
        libc::AF_INET => Some(SocketAddr::from((Ipv4Addr::LOCALHOST, STUB_PORT))),
        libc::AF_INET6 => Some(SocketAddr::from((Ipv6Addr::LOCALHOST, STUB_PORT))),
        _ => None,
    }
}

/// Encode `addr` into `storage` and return the address length to report.
///
/// The caller copies at most its own buffer length out of `storage`, the
/// way the kernel truncates an address that does not fit.
pub fn write_sockaddr(addr: &SocketAddr, storage: &mut libc::sockaddr_storage) -> libc::socklen_t {
    // Safety: sockaddr_storage is large and aligned enough for any sockaddr
    unsafe {
        std::ptr::write_bytes(storage as *mut libc::sockaddr_storage, 0, 1);
        match addr {
            SocketAddr::V4(v4) => {
                let sin = &mut *(storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_in);
                sin.sin_family = libc::AF_INET as libc::sa_family_t;
                sin.sin_port = v4.port().to_be();
                sin.sin_addr = libc::in_addr { s_addr: u32::from(*v4.ip()).to_be() };
                std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t
            }
            SocketAddr::V6(v6) => {
                let sin6 = &mut *(storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_in6);
                sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
                sin6.sin6_port = v6.port().to_be();
                sin6.sin6_flowinfo = v6.flowinfo();
                sin6.sin6_addr = libc::in6_addr { s6_addr: v6.ip().octets() };
                sin6.sin6_scope_id = v6.scope_id();
                std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t
            }
        }
    }
}
