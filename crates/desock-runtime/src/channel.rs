//! Packet channel sources
//!
//! The generator hands the stream over as a SysV shared-memory segment whose
//! id is passed in `DESOCK_PACKET_CHANNEL`. Without it, the stream can be
//! read from stdin (`DESOCK_STDIN_FALLBACK=1`) or attached programmatically.

use std::io::Read;
use std::ptr::NonNull;

use desock_core::env::parse_c_ulong;
use desock_core::{dinfo, DesockConfig, DesockError, DesockResult};
use nix::errno::Errno;

/// Environment variable carrying the shared-memory id of the channel
pub const CHANNEL_ENV: &str = "DESOCK_PACKET_CHANNEL";

/// Read-only attachment of a SysV shared-memory segment
pub struct ShmSegment {
    id: i32,
    addr: NonNull<u8>,
    len: usize,
}

// Safety: the segment is attached read-only and the generator finishes
// writing before the target starts; nothing writes through this mapping.
unsafe impl Send for ShmSegment {}
unsafe impl Sync for ShmSegment {}

impl ShmSegment {
    /// Attach segment `id` read-only. The length comes from `IPC_STAT`.
    pub fn attach(id: i32) -> DesockResult<Self> {
        let shm_error = || DesockError::ShmAttach { id, errno: Errno::last() as i32 };

        let mut ds: libc::shmid_ds = unsafe { std::mem::zeroed() };
        if unsafe { libc::shmctl(id, libc::IPC_STAT, &mut ds) } == -1 {
            return Err(shm_error());
        }

        let addr = unsafe { libc::shmat(id, std::ptr::null(), libc::SHM_RDONLY) };
        if addr as isize == -1 {
            return Err(shm_error());
        }
        let addr = NonNull::new(addr.cast::<u8>()).ok_or(DesockError::ShmAttach { id, errno: libc::EINVAL })?;

        Ok(Self { id, addr, len: ds.shm_segsz as usize })
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<[u8]> for ShmSegment {
    fn as_ref(&self) -> &[u8] {
        // Safety: the mapping stays attached until drop and is `len` bytes long
        unsafe { std::slice::from_raw_parts(self.addr.as_ptr(), self.len) }
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        unsafe {
            libc::shmdt(self.addr.as_ptr() as *const libc::c_void);
        }
    }
}

impl std::fmt::Debug for ShmSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmSegment")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("len", &self.len)
            .finish()
    }
}

/// Backing storage of a packet channel
#[derive(Debug)]
pub enum PacketBuffer {
    /// Segment shared with the generator
    Shared(ShmSegment),
    /// Stream read from stdin or handed over by the caller
    Owned(Vec<u8>),
}

impl AsRef<[u8]> for PacketBuffer {
    fn as_ref(&self) -> &[u8] {
        match self {
            PacketBuffer::Shared(segment) => segment.as_ref(),
            PacketBuffer::Owned(bytes) => bytes,
        }
    }
}

impl From<Vec<u8>> for PacketBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        PacketBuffer::Owned(bytes)
    }
}

/// Parse the channel id the way the generator formats it (decimal, `0x`
/// hex or leading-`0` octal)
pub fn parse_channel_id(raw: &str) -> DesockResult<i32> {
    parse_c_ulong(raw)
        .and_then(|id| i32::try_from(id).ok())
        .ok_or_else(|| DesockError::InvalidChannelId(raw.to_string()))
}

/// Read a whole stream from `reader`
pub fn read_stream<R: Read>(mut reader: R) -> DesockResult<PacketBuffer> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| DesockError::Os(e.raw_os_error().unwrap_or(libc::EIO)))?;
    Ok(PacketBuffer::Owned(bytes))
}

/// Locate the channel for this process.
///
/// Returns `None` when no channel id is set and the stdin fallback is off;
/// the hooks then stay inactive.
pub fn open_from_env(config: &DesockConfig) -> DesockResult<Option<PacketBuffer>> {
    if let Ok(raw) = std::env::var(CHANNEL_ENV) {
        let id = parse_channel_id(&raw)?;
        let segment = ShmSegment::attach(id)?;
        dinfo!("desock: attached packet channel {} ({} bytes)", id, segment.len());
        return Ok(Some(PacketBuffer::Shared(segment)));
    }

    if config.stdin_fallback {
        let buffer = read_stream(std::io::stdin().lock())?;
        dinfo!("desock: read packet channel from stdin ({} bytes)", buffer.as_ref().len());
        return Ok(Some(buffer));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use desock_core::StreamBuilder;

    #[test]
    fn test_parse_channel_id() {
        assert_eq!(parse_channel_id("32769").unwrap(), 32769);
        assert_eq!(parse_channel_id("0x10").unwrap(), 16);
        assert_eq!(parse_channel_id("010").unwrap(), 8);

        assert!(matches!(parse_channel_id("12x"), Err(DesockError::InvalidChannelId(_))));
        assert!(matches!(parse_channel_id("4294967296"), Err(DesockError::InvalidChannelId(_))));
        assert!(matches!(parse_channel_id(""), Err(DesockError::InvalidChannelId(_))));
    }

    #[test]
    fn test_read_stream() {
        let stream = StreamBuilder::new().data(0, b"hi").finish();
        let buffer = read_stream(stream.as_slice()).unwrap();
        assert_eq!(buffer.as_ref(), stream.as_slice());
    }

    #[test]
    fn test_attach_missing_segment() {
        // Ids are never negative
        let err = ShmSegment::attach(-1).unwrap_err();
        assert!(matches!(err, DesockError::ShmAttach { id: -1, .. }));
    }

    #[test]
    fn test_attach_real_segment() {
        let stream = StreamBuilder::new().data(1, b"shared").finish();

        let id = unsafe { libc::shmget(libc::IPC_PRIVATE, stream.len(), libc::IPC_CREAT | 0o600) };
        assert!(id >= 0);
        unsafe {
            let addr = libc::shmat(id, std::ptr::null(), 0);
            assert_ne!(addr as isize, -1);
            std::ptr::copy_nonoverlapping(stream.as_ptr(), addr.cast::<u8>(), stream.len());
            libc::shmdt(addr);
        }

        let segment = ShmSegment::attach(id).unwrap();
        assert_eq!(segment.len(), stream.len());
        assert_eq!(segment.as_ref(), stream.as_slice());
        drop(segment);

        unsafe {
            libc::shmctl(id, libc::IPC_RMID, std::ptr::null_mut());
        }
    }
}
