#![no_std]
#![no_main]

use aya_ebpf::{
    helpers::{bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_probe_read_user_str_bytes},
    macros::{map, tracepoint},
    maps::PerfEventArray,
    programs::TracePointContext,
};
use delsnoop_common::{pid_of, DeleteEvent};

/// Per-CPU perf rings carrying one `DeleteEvent` per observed call. The
/// probe is producer-only; user space sizes and drains the rings, and a
/// full ring drops the submission.
#[map]
static EVENTS: PerfEventArray<DeleteEvent> = PerfEventArray::new(0);

/// Byte offset of the pathname argument in the raw `sys_enter_unlinkat`
/// tracepoint buffer: 8 bytes of common fields, 8 for the syscall number,
/// then `dfd` at 16 and `pathname` at 24.
const PATHNAME_OFFSET: usize = 24;

#[tracepoint]
pub fn sys_enter_unlinkat(ctx: TracePointContext) -> u32 {
    match try_sys_enter_unlinkat(&ctx) {
        Ok(()) => 0,
        Err(_) => 0,
    }
}

fn try_sys_enter_unlinkat(ctx: &TracePointContext) -> Result<(), i64> {
    let mut event = DeleteEvent::zeroed();

    event.pid = pid_of(bpf_get_current_pid_tgid());

    if let Ok(comm) = bpf_get_current_comm() {
        event.comm = comm;
    }

    // Cross-address-space read of the caller's pathname. A faulting or
    // oversized source leaves a truncated or empty filename; the record
    // is submitted either way.
    if let Ok(pathname) = unsafe { ctx.read_at::<*const u8>(PATHNAME_OFFSET) } {
        if !pathname.is_null() {
            let _ = unsafe { bpf_probe_read_user_str_bytes(pathname, &mut event.filename) };
        }
    }

    EVENTS.output(ctx, &event, 0);

    Ok(())
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";
