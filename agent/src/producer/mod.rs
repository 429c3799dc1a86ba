//! Capabilities of the hosting runtime for taking profile snapshots.

use anyhow::Result;
use bytes::BytesMut;

pub mod runtime;
pub use runtime::RuntimeProducer;

/// Source of raw profile data for the process the agent lives in.
///
/// CPU profiles and traces are started, left running for a while and then
/// stopped; every other profile is written in one go. Stops and writes may
/// block and are run on tokio's blocking pool.
pub trait ProfileProducer: Send + Sync {
    fn start_cpu_profile(&self) -> Result<Box<dyn RunningProfile>>;

    fn write_heap_profile(&self, buf: &mut BytesMut) -> Result<()>;

    /// Looks up a named profile (`block`, `mutex`, `goroutine`, `threadcreate`).
    fn lookup(&self, name: &str) -> Option<Box<dyn NamedProfile>>;

    fn start_trace(&self) -> Result<Box<dyn RunningProfile>>;
}

/// A capture in progress.
pub trait RunningProfile: Send {
    /// Stops the capture and flushes everything recorded so far into `buf`.
    fn stop(self: Box<Self>, buf: &mut BytesMut) -> Result<()>;
}

pub trait NamedProfile {
    fn write_to(&self, buf: &mut BytesMut, debug: u8) -> Result<()>;
}
