use anyhow::{anyhow, Context, Result};
use bytes::BytesMut;
use pprof::protos::Message;
use procfs::process::Process;
use serde::Serialize;

use super::{NamedProfile, ProfileProducer, RunningProfile};

const SAMPLE_FREQUENCY: i32 = 100;
const BLOCKLIST: &[&str] = &["libc", "libgcc", "pthread", "vdso"];

/// Producer for the current process.
///
/// CPU profiles come from `pprof` sampling and are encoded as pprof
/// protobuf. Heap and thread profiles are read from procfs and encoded as
/// JSON. Block and mutex contention and execution traces have no source in
/// a Rust process, so those profiles are reported as unavailable.
pub struct RuntimeProducer {
    frequency: i32,
}

impl Default for RuntimeProducer {
    fn default() -> Self {
        Self {
            frequency: SAMPLE_FREQUENCY,
        }
    }
}

impl RuntimeProducer {
    pub fn new(frequency: i32) -> Self {
        Self { frequency }
    }
}

struct CpuProfile {
    guard: pprof::ProfilerGuard<'static>,
}

impl RunningProfile for CpuProfile {
    fn stop(self: Box<Self>, buf: &mut BytesMut) -> Result<()> {
        let report = self.guard.report().build().context("unable to build CPU report")?;
        let profile = report.pprof().context("unable to convert CPU report")?;
        profile.encode(buf).context("unable to encode CPU profile")?;
        Ok(())
    }
}

#[derive(Serialize, Debug)]
struct HeapSnapshot {
    /// all sizes in kB
    vm_size: Option<u64>,
    vm_peak: Option<u64>,
    vm_rss: Option<u64>,
    vm_hwm: Option<u64>,
    vm_data: Option<u64>,
    vm_swap: Option<u64>,
}

#[derive(Serialize, Debug)]
struct ThreadEntry {
    tid: i32,
    name: String,
    state: char,
    start_ticks: u64,
}

#[derive(Serialize, Debug)]
struct ThreadCreateSnapshot {
    count: usize,
    start_ticks: Vec<u64>,
}

fn threads() -> Result<Vec<ThreadEntry>> {
    let me = Process::myself().context("unable to open /proc/self")?;
    let mut entries = vec![];
    for task in me.tasks()? {
        // threads may exit while we walk the list
        let Ok(task) = task else { continue };
        let Ok(stat) = task.stat() else { continue };
        entries.push(ThreadEntry {
            tid: task.tid,
            name: stat.comm,
            state: stat.state,
            start_ticks: stat.starttime,
        });
    }
    Ok(entries)
}

fn write_json<T: Serialize>(buf: &mut BytesMut, value: &T) -> Result<()> {
    let encoded = serde_json::to_vec(value)?;
    buf.extend_from_slice(&encoded);
    Ok(())
}

struct ThreadDump;

impl NamedProfile for ThreadDump {
    fn write_to(&self, buf: &mut BytesMut, _debug: u8) -> Result<()> {
        write_json(buf, &threads()?)
    }
}

struct ThreadCreate;

impl NamedProfile for ThreadCreate {
    fn write_to(&self, buf: &mut BytesMut, _debug: u8) -> Result<()> {
        let mut start_ticks: Vec<_> = threads()?.into_iter().map(|t| t.start_ticks).collect();
        start_ticks.sort_unstable();
        write_json(
            buf,
            &ThreadCreateSnapshot {
                count: start_ticks.len(),
                start_ticks,
            },
        )
    }
}

impl ProfileProducer for RuntimeProducer {
    fn start_cpu_profile(&self) -> Result<Box<dyn RunningProfile>> {
        let guard = pprof::ProfilerGuardBuilder::default()
            .frequency(self.frequency)
            .blocklist(BLOCKLIST)
            .build()?;
        Ok(Box::new(CpuProfile { guard }))
    }

    fn write_heap_profile(&self, buf: &mut BytesMut) -> Result<()> {
        let status = Process::myself()?.status()?;
        write_json(
            buf,
            &HeapSnapshot {
                vm_size: status.vmsize,
                vm_peak: status.vmpeak,
                vm_rss: status.vmrss,
                vm_hwm: status.vmhwm,
                vm_data: status.vmdata,
                vm_swap: status.vmswap,
            },
        )
    }

    fn lookup(&self, name: &str) -> Option<Box<dyn NamedProfile>> {
        match name {
            "goroutine" => Some(Box::new(ThreadDump)),
            "threadcreate" => Some(Box::new(ThreadCreate)),
            _ => None,
        }
    }

    fn start_trace(&self) -> Result<Box<dyn RunningProfile>> {
        Err(anyhow!("execution tracing is not supported by this runtime"))
    }
}
