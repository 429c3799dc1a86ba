use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::task;
use tokio_util::sync::CancellationToken;

use crate::producer::ProfileProducer;
use crate::timer::TimerPool;
use crate::ProfileType;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to start CPU profile: {0}")]
    StartCpu(anyhow::Error),

    #[error("failed to stop CPU profile: {0}")]
    StopCpu(anyhow::Error),

    #[error("failed to write heap profile: {0}")]
    Heap(anyhow::Error),

    #[error("failed to write {ptype} profile: {err}")]
    Write { ptype: ProfileType, err: anyhow::Error },

    #[error("failed to start trace: {0}")]
    StartTrace(anyhow::Error),

    #[error("failed to stop trace: {0}")]
    StopTrace(anyhow::Error),

    #[error("unknown profile type {0}")]
    UnknownType(ProfileType),

    #[error("capture task failed: {0}")]
    Join(#[from] task::JoinError),
}

/// Takes one snapshot of a given type into a caller-owned buffer.
pub struct Capturer {
    producer: Arc<dyn ProfileProducer>,
    timers: Arc<TimerPool>,
    cpu_duration: Duration,
    trace_duration: Duration,
}

impl Capturer {
    pub fn new(
        producer: Arc<dyn ProfileProducer>,
        timers: Arc<TimerPool>,
        cpu_duration: Duration,
        trace_duration: Duration,
    ) -> Self {
        Self {
            producer,
            timers,
            cpu_duration,
            trace_duration,
        }
    }

    /// Captures a `ptype` profile into `buf`.
    ///
    /// CPU profiles and traces run for their configured duration, or until
    /// `cancel` fires; in both cases the data recorded so far is flushed.
    pub async fn capture(
        &self,
        ptype: ProfileType,
        cancel: &CancellationToken,
        buf: &mut BytesMut,
    ) -> Result<(), CaptureError> {
        match ptype {
            ProfileType::Cpu => {
                let running = self
                    .producer
                    .start_cpu_profile()
                    .map_err(CaptureError::StartCpu)?;
                self.timers.sleep(self.cpu_duration, cancel).await;
                off_thread(buf, move |buf| running.stop(buf).map_err(CaptureError::StopCpu)).await
            }
            ProfileType::Heap => {
                let producer = Arc::clone(&self.producer);
                off_thread(buf, move |buf| {
                    producer.write_heap_profile(buf).map_err(CaptureError::Heap)
                })
                .await
            }
            ProfileType::Block
            | ProfileType::Mutex
            | ProfileType::Goroutine
            | ProfileType::Threadcreate => {
                let producer = Arc::clone(&self.producer);
                off_thread(buf, move |buf| {
                    let profile = producer
                        .lookup(ptype.as_str())
                        .ok_or(CaptureError::UnknownType(ptype))?;
                    profile
                        .write_to(buf, 0)
                        .map_err(|err| CaptureError::Write { ptype, err })
                })
                .await
            }
            ProfileType::Trace => {
                let running = self
                    .producer
                    .start_trace()
                    .map_err(CaptureError::StartTrace)?;
                self.timers.sleep(self.trace_duration, cancel).await;
                off_thread(buf, move |buf| running.stop(buf).map_err(CaptureError::StopTrace)).await
            }
            ProfileType::Unknown => Err(CaptureError::UnknownType(ptype)),
        }
    }
}

/// Runs a blocking write (symbolization, procfs reads) on the blocking pool.
/// The buffer travels with it and comes back afterwards.
async fn off_thread<F>(buf: &mut BytesMut, write: F) -> Result<(), CaptureError>
where
    F: FnOnce(&mut BytesMut) -> Result<(), CaptureError> + Send + 'static,
{
    let mut owned = std::mem::take(buf);
    let (owned, res) = task::spawn_blocking(move || {
        let res = write(&mut owned);
        (owned, res)
    })
    .await?;
    *buf = owned;
    res
}
