//! Types shared between the delsnoop BPF object and its user-space loader.
//!
//! The record layout here is the kernel/user wire contract: `DeleteEvent`
//! is copied byte-for-byte out of the per-CPU perf rings, so it must be
//! `#[repr(C)]`, fixed-size and padding-free on both sides.

#![cfg_attr(not(test), no_std)]

/// Length of a task's `comm` name, including the NUL terminator.
pub const COMM_LEN: usize = 16;

/// Capacity of the captured pathname, including the NUL terminator.
pub const FILENAME_LEN: usize = 256;

/// Size of one record on the wire: pid + comm + filename, no padding.
pub const RECORD_SIZE: usize = 4 + COMM_LEN + FILENAME_LEN;

/// One observed deletion attempt.
///
/// Produced once per `unlinkat` entry, fully zeroed before population and
/// submitted whole. `pid`/`comm`/`filename` sit at offsets 0/4/20 with no
/// padding, for a total of 276 bytes on the wire.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DeleteEvent {
    /// Process id of the caller (thread-group id, not the thread id).
    pub pid: u32,
    /// Short program name, NUL-padded.
    pub comm: [u8; COMM_LEN],
    /// Pathname argument as supplied to the syscall, NUL-padded. Best
    /// effort: truncated at 255 bytes, possibly empty if the user-space
    /// read faulted.
    pub filename: [u8; FILENAME_LEN],
}

impl DeleteEvent {
    /// Create a fully zeroed record.
    pub const fn zeroed() -> Self {
        Self {
            pid: 0,
            comm: [0; COMM_LEN],
            filename: [0; FILENAME_LEN],
        }
    }

    /// Decode a record from a raw perf sample.
    ///
    /// Returns `None` when the sample is shorter than a whole record.
    /// Trailing bytes (perf read alignment) are ignored.
    pub fn read_from(buf: &[u8]) -> Option<Self> {
        if buf.len() < core::mem::size_of::<Self>() {
            return None;
        }
        // The perf buffers are not guaranteed to align the sample payload.
        Some(unsafe { core::ptr::read_unaligned(buf.as_ptr().cast()) })
    }

    /// `comm` up to its NUL terminator.
    pub fn comm_bytes(&self) -> &[u8] {
        truncate_at_nul(&self.comm)
    }

    /// `filename` up to its NUL terminator.
    pub fn filename_bytes(&self) -> &[u8] {
        truncate_at_nul(&self.filename)
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for DeleteEvent {}

/// Extract the process id from a combined `bpf_get_current_pid_tgid`
/// value. The low half is the thread id and is deliberately discarded.
#[inline]
pub fn pid_of(pid_tgid: u64) -> u32 {
    (pid_tgid >> 32) as u32
}

/// Cut a NUL-padded buffer down to its string content. A buffer with no
/// NUL is returned whole.
pub fn truncate_at_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{offset_of, size_of};

    #[test]
    fn wire_layout_is_276_bytes() {
        assert_eq!(size_of::<DeleteEvent>(), 276);
        assert_eq!(size_of::<DeleteEvent>(), RECORD_SIZE);
        assert_eq!(offset_of!(DeleteEvent, pid), 0);
        assert_eq!(offset_of!(DeleteEvent, comm), 4);
        assert_eq!(offset_of!(DeleteEvent, filename), 20);
    }

    #[test]
    fn pid_of_keeps_the_process_id() {
        // tgid 4321 in the upper half, thread id 9999 in the lower half
        let pid_tgid = (4321u64 << 32) | 9999;
        assert_eq!(pid_of(pid_tgid), 4321);
    }

    #[test]
    fn pid_of_discards_a_differing_thread_id() {
        let main_thread = (100u64 << 32) | 100;
        let worker_thread = (100u64 << 32) | 242;
        assert_eq!(pid_of(main_thread), pid_of(worker_thread));
    }

    #[test]
    fn truncate_stops_at_the_first_nul() {
        assert_eq!(truncate_at_nul(b"rm\0\0\0"), b"rm");
        assert_eq!(truncate_at_nul(b"a\0b\0"), b"a");
        assert_eq!(truncate_at_nul(b"\0"), b"");
    }

    #[test]
    fn truncate_keeps_a_buffer_with_no_nul() {
        let full = [b'x'; FILENAME_LEN];
        assert_eq!(truncate_at_nul(&full).len(), FILENAME_LEN);
    }

    fn sample(pid: u32, comm: &[u8], filename: &[u8]) -> Vec<u8> {
        let mut event = DeleteEvent::zeroed();
        event.pid = pid;
        event.comm[..comm.len()].copy_from_slice(comm);
        event.filename[..filename.len()].copy_from_slice(filename);
        let mut buf = vec![0u8; size_of::<DeleteEvent>()];
        buf[..4].copy_from_slice(&event.pid.to_ne_bytes());
        buf[4..20].copy_from_slice(&event.comm);
        buf[20..].copy_from_slice(&event.filename);
        buf
    }

    #[test]
    fn read_from_decodes_a_whole_sample() {
        let buf = sample(77, b"rm", b"/tmp/victim.txt");
        let event = DeleteEvent::read_from(&buf).unwrap();
        assert_eq!(event.pid, 77);
        assert_eq!(event.comm_bytes(), b"rm");
        assert_eq!(event.filename_bytes(), b"/tmp/victim.txt");
    }

    #[test]
    fn read_from_ignores_trailing_bytes() {
        let mut buf = sample(1, b"sh", b"/a");
        buf.extend_from_slice(&[0xAA; 12]);
        let event = DeleteEvent::read_from(&buf).unwrap();
        assert_eq!(event.pid, 1);
        assert_eq!(event.filename_bytes(), b"/a");
    }

    #[test]
    fn read_from_rejects_short_samples() {
        let buf = sample(1, b"sh", b"/a");
        assert!(DeleteEvent::read_from(&buf[..buf.len() - 1]).is_none());
    }

    #[test]
    fn ascii_paths_round_trip_up_to_255_bytes() {
        for len in [1usize, 2, 100, 254, 255] {
            let path: Vec<u8> = (0..len).map(|i| b'a' + (i % 26) as u8).collect();
            let buf = sample(9, b"unlink", &path);
            let event = DeleteEvent::read_from(&buf).unwrap();
            assert_eq!(event.filename_bytes(), &path[..], "len {len}");
        }
    }

    #[test]
    fn a_256_byte_path_is_truncated_to_255_plus_terminator() {
        // The in-kernel string copy keeps the last byte for the NUL, so a
        // payload that fills the field holds only the first 255 bytes.
        let long: Vec<u8> = (0..256).map(|i| b'A' + (i % 26) as u8).collect();
        let mut event = DeleteEvent::zeroed();
        event.filename[..FILENAME_LEN - 1].copy_from_slice(&long[..FILENAME_LEN - 1]);
        assert_eq!(event.filename_bytes(), &long[..255]);
        assert_eq!(event.filename[FILENAME_LEN - 1], 0);
    }
}
