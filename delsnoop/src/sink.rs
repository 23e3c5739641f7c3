//! Sinks for delivered deletion records.
//!
//! The probe side never filters or interprets; whatever policy a consumer
//! wants lives behind this seam.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use delsnoop_common::DeleteEvent;
use tracing::info;

/// Consumer of delivered records. Implementations must tolerate being
/// called concurrently from one reader task per CPU.
pub trait EventSink: Send + Sync {
    /// One fully decoded record.
    fn record(&self, event: &DeleteEvent);

    /// `count` records were dropped in the kernel under back-pressure.
    fn lost(&self, _count: u64) {}
}

/// Production sink: logs every record as a structured event and keeps
/// running totals for the shutdown summary.
#[derive(Default)]
pub struct LogSink {
    delivered: AtomicU64,
    lost: AtomicU64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn lost_total(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }
}

impl EventSink for LogSink {
    fn record(&self, event: &DeleteEvent) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        info!(
            pid = event.pid,
            command = %String::from_utf8_lossy(event.comm_bytes()),
            file = %String::from_utf8_lossy(event.filename_bytes()),
            "file deleted"
        );
    }

    fn lost(&self, count: u64) {
        self.lost.fetch_add(count, Ordering::Relaxed);
    }
}

/// Buffering sink for tests and harnesses: keeps records in delivery
/// order.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<DeleteEvent>>,
    lost: AtomicU64,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DeleteEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lost_total(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &DeleteEvent) {
        self.events.lock().unwrap().push(*event);
    }

    fn lost(&self, count: u64) {
        self.lost.fetch_add(count, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(pid: u32, filename: &[u8]) -> DeleteEvent {
        let mut event = DeleteEvent::zeroed();
        event.pid = pid;
        event.filename[..filename.len()].copy_from_slice(filename);
        event
    }

    #[test]
    fn memory_sink_keeps_delivery_order() {
        let sink = MemorySink::new();
        sink.record(&event(1, b"/tmp/a"));
        sink.record(&event(2, b"/tmp/b"));
        sink.record(&event(3, b"/tmp/c"));

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events.iter().map(|e| e.pid).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(events[1].filename_bytes(), b"/tmp/b");
    }

    #[test]
    fn log_sink_counts_delivered_and_lost() {
        let sink = LogSink::new();
        assert_eq!(sink.delivered(), 0);

        sink.record(&event(7, b"/tmp/x"));
        sink.record(&event(7, b"/tmp/y"));
        sink.lost(3);
        sink.lost(2);

        assert_eq!(sink.delivered(), 2);
        assert_eq!(sink.lost_total(), 5);
    }
}
