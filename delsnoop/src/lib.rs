//! User-space side of delsnoop: loads the unlinkat probe, drains the
//! per-CPU perf rings and hands each record to a sink.

pub mod config;
pub mod service;
pub mod sink;
