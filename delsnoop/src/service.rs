//! Probe lifecycle: load the BPF object, attach the tracepoint, drain the
//! per-CPU perf rings.
//!
//! Attachment problems (verifier rejection, missing privileges, license
//! mismatch) are fatal here, before any event is produced. Once attached,
//! the probe itself never fails visibly; the only runtime signal is the
//! per-ring lost-sample count, which is surfaced through the sink.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use aya::maps::perf::AsyncPerfEventArray;
use aya::programs::TracePoint;
use aya::util::online_cpus;
use aya::Ebpf;
use bytes::BytesMut;
use delsnoop_common::{DeleteEvent, RECORD_SIZE};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::sink::EventSink;

/// Tracepoint the probe hooks: entry of the unlinkat syscall, never its
/// exit.
pub const TRACEPOINT_CATEGORY: &str = "syscalls";
pub const TRACEPOINT_NAME: &str = "sys_enter_unlinkat";

/// Memlock ceiling for the perf rings on kernels that still account BPF
/// memory against RLIMIT_MEMLOCK.
const MEMLOCK_LIMIT: u64 = 64 * 1024 * 1024;

/// Perf samples per read batch, and the capacity of each read buffer
/// (one padded record).
const READ_BATCH: usize = 16;
const SAMPLE_CAPACITY: usize = RECORD_SIZE.next_power_of_two();

/// The embedded BPF object.
pub fn ebpf_bytecode() -> &'static [u8] {
    aya::include_bytes_aligned!(concat!(env!("OUT_DIR"), "/delsnoop"))
}

/// A loaded and attached unlinkat observer. Dropping it detaches the
/// probe.
pub struct Observer {
    ebpf: Ebpf,
}

impl Observer {
    /// Load the embedded object and attach the tracepoint.
    pub fn load() -> anyhow::Result<Self> {
        bump_memlock_rlimit();

        let mut ebpf = Ebpf::load(ebpf_bytecode()).context("load eBPF object")?;

        let program: &mut TracePoint = ebpf
            .program_mut(TRACEPOINT_NAME)
            .ok_or_else(|| anyhow!("program {TRACEPOINT_NAME} not found in object"))?
            .try_into()?;
        program.load().context("load tracepoint program")?;
        program
            .attach(TRACEPOINT_CATEGORY, TRACEPOINT_NAME)
            .with_context(|| format!("attach {TRACEPOINT_CATEGORY}/{TRACEPOINT_NAME}"))?;

        Ok(Self { ebpf })
    }

    /// Open every online CPU's ring with `page_count` mmap pages and
    /// spawn one reader task per CPU. Records stay in per-CPU FIFO order;
    /// no cross-CPU merge is attempted.
    pub fn spawn_readers(
        &mut self,
        page_count: usize,
        sink: Arc<dyn EventSink>,
    ) -> anyhow::Result<Vec<JoinHandle<()>>> {
        let mut events = AsyncPerfEventArray::try_from(
            self.ebpf
                .take_map("EVENTS")
                .ok_or_else(|| anyhow!("EVENTS map not found in object"))?,
        )?;

        let cpus = online_cpus()
            .map_err(|(_, err)| err)
            .context("list online CPUs")?;

        let mut handles = Vec::with_capacity(cpus.len());
        for cpu_id in cpus {
            let mut ring = events
                .open(cpu_id, Some(page_count))
                .with_context(|| format!("open perf ring for cpu {cpu_id}"))?;
            let sink = sink.clone();

            handles.push(tokio::spawn(async move {
                let mut buffers = (0..READ_BATCH)
                    .map(|_| BytesMut::with_capacity(SAMPLE_CAPACITY))
                    .collect::<Vec<_>>();

                loop {
                    let batch = match ring.read_events(&mut buffers).await {
                        Ok(batch) => batch,
                        Err(err) => {
                            warn!(cpu_id, error = %err, "perf read failed");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            continue;
                        }
                    };

                    if batch.lost > 0 {
                        sink.lost(batch.lost as u64);
                        warn!(
                            cpu_id,
                            lost = batch.lost,
                            "records dropped under back-pressure"
                        );
                    }

                    for buf in buffers.iter().take(batch.read) {
                        match DeleteEvent::read_from(buf) {
                            Some(event) => sink.record(&event),
                            None => debug!(cpu_id, len = buf.len(), "short perf sample"),
                        }
                    }
                }
            }));
        }

        Ok(handles)
    }
}

/// Startup checks. None of these are fatal by themselves; attachment
/// reports the authoritative error.
pub fn preflight() {
    if !is_root() {
        warn!("not running as root; attaching the probe will likely fail");
    }

    match kernel_version() {
        Some((major, minor, patch)) => debug!(major, minor, patch, "kernel version"),
        None => warn!("could not determine kernel version"),
    }
}

/// Check if running as root.
pub fn is_root() -> bool {
    unsafe { libc::getuid() == 0 }
}

/// Parse the running kernel version out of /proc.
pub fn kernel_version() -> Option<(u32, u32, u32)> {
    let release = std::fs::read_to_string("/proc/sys/kernel/osrelease").ok()?;
    let parts: Vec<&str> = release.trim().split('.').collect();

    if parts.len() >= 2 {
        let major = parts[0].parse().ok()?;
        let minor = parts[1].split('-').next()?.parse().ok()?;
        let patch = parts
            .get(2)
            .and_then(|p| p.split('-').next())
            .and_then(|p| p.parse().ok())
            .unwrap_or(0);

        Some((major, minor, patch))
    } else {
        None
    }
}

/// Raise RLIMIT_MEMLOCK for older kernels that charge map memory to it.
fn bump_memlock_rlimit() {
    let rlim = libc::rlimit {
        rlim_cur: MEMLOCK_LIMIT,
        rlim_max: MEMLOCK_LIMIT,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        debug!("raising the locked memory limit failed, ret is: {ret}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_capacity_holds_a_whole_record() {
        assert!(SAMPLE_CAPACITY >= RECORD_SIZE);
        assert!(SAMPLE_CAPACITY.is_power_of_two());
    }

    #[test]
    fn kernel_version_parses_on_this_host() {
        // osrelease is always present on Linux
        let version = kernel_version();
        assert!(version.is_some());
        assert!(version.unwrap().0 >= 2);
    }
}
