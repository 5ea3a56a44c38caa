#![no_main]
use std::time::Duration;

use arbitrary::Arbitrary;
use desock_core::{Admission, DesockConfig, LocalPermits, StreamBuilder};
use desock_runtime::{Desock, FdSet, Intercept};
use libfuzzer_sys::fuzz_target;

const LISTENER: i32 = 3;
const FIRST_FD: i32 = 4;
const FDS: i32 = 12;

#[derive(Arbitrary, Debug)]
enum Op {
    Accept,
    Read { fd: u8, len: u8 },
    Write { fd: u8 },
    Select { fds: u16 },
    Dup { old: u8, new: u8 },
    Shutdown { fd: u8 },
    Close { fd: u8 },
}

#[derive(Arbitrary, Debug)]
struct Session {
    packets: Vec<(u8, Vec<u8>, bool)>,
    ops: Vec<Op>,
}

fn fd(raw: u8) -> i32 {
    FIRST_FD + i32::from(raw) % FDS
}

fuzz_target!(|session: Session| {
    const CONNS: usize = 4;

    let mut builder = StreamBuilder::new();
    for (conn, payload, ends_round) in &session.packets {
        builder = builder.data(u32::from(*conn) % CONNS as u32, payload);
        if *ends_round {
            builder = builder.separator();
        }
    }

    let config = DesockConfig::new().max_conns(CONNS).fd_table_size(64);
    let Ok(desock) = Desock::new(config, LocalPermits::new(CONNS)) else {
        return;
    };
    desock.attach(builder.finish());
    let _ = desock.on_socket(LISTENER, libc::AF_INET, libc::SOCK_STREAM);
    let _ = desock.on_listen(LISTENER);

    let mut next_fd = FIRST_FD;
    for op in session.ops.iter().take(256) {
        let result = match *op {
            Op::Accept => {
                // accept blocks once every permit is gone
                if desock.pending_admissions() == 0 && desock.admission().available() == 0 {
                    continue;
                }
                let accepted = next_fd;
                next_fd = FIRST_FD + (next_fd - FIRST_FD + 1) % FDS;
                desock.on_accept(LISTENER, accepted).map(|_| ())
            }
            Op::Read { fd: raw, len } => {
                let mut buf = vec![0u8; usize::from(len)];
                match desock.on_read(fd(raw), &mut buf) {
                    Ok(Intercept::Emulated(n)) => {
                        assert!(n <= buf.len());
                        Ok(())
                    }
                    Ok(Intercept::Forward) => Ok(()),
                    Err(e) => Err(e),
                }
            }
            Op::Write { fd: raw } => desock.on_write(fd(raw), b"reply").map(|_| ()),
            Op::Select { fds } => {
                let mut read: FdSet = (0..16).filter(|i| fds & (1 << i) != 0).collect();
                desock.select(16, Some(&mut read), None, None, Some(Duration::ZERO)).map(|_| ())
            }
            Op::Dup { old, new } => desock.on_duplicate(fd(old), fd(new)),
            Op::Shutdown { fd: raw } => desock.on_shutdown(fd(raw), std::net::Shutdown::Read).map(|_| ()),
            Op::Close { fd: raw } => desock.on_close(fd(raw)),
        };

        // Only running out of slots and unmapped descriptors are expected
        if let Err(e) = result {
            assert!(
                !e.is_fatal() || matches!(e, desock_core::DesockError::Pool(desock_core::PoolError::NoFreeSlot { .. })),
                "{}",
                e
            );
        }
    }
});
