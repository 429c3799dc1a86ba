use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::capture::Capturer;
use crate::client::{DeliveryError, ProfileClient, Transport};
use crate::error::{AgentError, CollectError};
use crate::labels::Labels;
use crate::producer::{ProfileProducer, RuntimeProducer};
use crate::retry::RetryError;
use crate::rotation::{EnabledProfiles, Rotation};
use crate::timer::{Jitter, TimerPool};
use crate::ProfileType;

pub const DEFAULT_DURATION: Duration = Duration::from_secs(10);
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Options of an [`Agent`], fixed once it is built.
pub struct AgentBuilder {
    collector: String,
    service: String,
    profiles: EnabledProfiles,
    cpu_duration: Duration,
    trace_duration: Duration,
    tick: Duration,
    labels: Labels,
    transport: Option<Arc<dyn Transport>>,
    producer: Option<Arc<dyn ProfileProducer>>,
    seed: Option<u64>,
}

impl AgentBuilder {
    pub fn new(collector: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            collector: collector.into(),
            service: service.into(),
            profiles: EnabledProfiles::default(),
            cpu_duration: DEFAULT_DURATION,
            trace_duration: DEFAULT_DURATION,
            tick: DEFAULT_TICK_INTERVAL,
            labels: Labels::new(),
            transport: None,
            producer: None,
            seed: None,
        }
    }

    pub fn with_profiles(mut self, profiles: EnabledProfiles) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_cpu_profile(mut self, enabled: bool) -> Self {
        self.profiles.cpu = enabled;
        self
    }

    pub fn with_cpu_duration(mut self, d: Duration) -> Self {
        self.cpu_duration = d;
        self
    }

    pub fn with_heap_profile(mut self) -> Self {
        self.profiles.heap = true;
        self
    }

    pub fn with_block_profile(mut self) -> Self {
        self.profiles.block = true;
        self
    }

    pub fn with_mutex_profile(mut self) -> Self {
        self.profiles.mutex = true;
        self
    }

    pub fn with_goroutine_profile(mut self) -> Self {
        self.profiles.goroutine = true;
        self
    }

    pub fn with_threadcreate_profile(mut self) -> Self {
        self.profiles.threadcreate = true;
        self
    }

    /// Enables execution traces of the given length.
    pub fn with_trace(mut self, d: Duration) -> Self {
        self.profiles.trace = true;
        self.trace_duration = d;
        self
    }

    pub fn with_tick_interval(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push(key, value);
        self
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels.extend(labels.iter());
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_producer(mut self, producer: Arc<dyn ProfileProducer>) -> Self {
        self.producer = Some(producer);
        self
    }

    /// Seeds the tick jitter, making the schedule reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<Agent, AgentError> {
        let rotation = Rotation::new(self.profiles)?;
        let timers = Arc::new(TimerPool::new());
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(reqwest::Client::new()));
        let producer = self
            .producer
            .unwrap_or_else(|| Arc::new(RuntimeProducer::default()));
        let jitter = match self.seed {
            Some(seed) => Jitter::new(seed),
            None => Jitter::from_entropy(),
        };

        let capturer = Capturer::new(
            producer,
            Arc::clone(&timers),
            self.cpu_duration,
            self.trace_duration,
        );
        let client = ProfileClient::new(
            transport,
            Arc::clone(&timers),
            &self.collector,
            &self.service,
            &self.labels.to_string(),
        );

        Ok(Agent {
            collector: self.collector,
            scheduler: Some(Scheduler {
                rotation,
                capturer,
                client,
                jitter,
                timers,
                tick: self.tick,
            }),
            running: None,
        })
    }

    /// Builds the agent and starts it right away.
    pub fn start(self, parent: &CancellationToken) -> Result<Agent, AgentError> {
        let mut agent = self.build()?;
        agent.start(parent)?;
        Ok(agent)
    }
}

struct Running {
    stop: CancellationToken,
    done: JoinHandle<()>,
}

/// Continuous profiling agent.
///
/// Once started, a single background task captures one profile per tick,
/// rotating through the enabled types, and uploads each to the collector.
pub struct Agent {
    collector: String,
    scheduler: Option<Scheduler>,
    running: Option<Running>,
}

impl Agent {
    /// Spawns the profiling task. It stops when [`stop`](Self::stop) is
    /// called or `parent` is cancelled.
    pub fn start(&mut self, parent: &CancellationToken) -> Result<(), AgentError> {
        if self.collector.is_empty() {
            return Err(AgentError::EmptyCollectorAddr);
        }
        if let Err(reason) = url::Url::parse(&self.collector) {
            return Err(AgentError::InvalidCollectorAddr {
                addr: self.collector.clone(),
                reason,
            });
        }
        let scheduler = self.scheduler.take().ok_or(AgentError::AlreadyStarted)?;

        let stop = parent.child_token();
        let done = tokio::spawn(scheduler.run(stop.clone()));
        self.running = Some(Running { stop, done });
        Ok(())
    }

    /// Stops the profiling task and waits until it has fully exited.
    pub async fn stop(&mut self) -> Result<(), AgentError> {
        let Running { stop, done } = self.running.take().ok_or(AgentError::NotRunning)?;
        stop.cancel();
        done.await?;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.as_ref().map_or(false, |r| !r.done.is_finished())
    }

    /// Captures and uploads a single profile without starting the loop.
    pub async fn collect_once(&mut self, ptype: ProfileType) -> Result<(), AgentError> {
        let scheduler = self.scheduler.as_mut().ok_or(AgentError::AlreadyStarted)?;
        let mut buf = BytesMut::new();
        scheduler
            .collect_and_send(ptype, &mut buf, &CancellationToken::new())
            .await?;
        Ok(())
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.stop.cancel();
        }
    }
}

/// State owned by the profiling task.
struct Scheduler {
    rotation: Rotation,
    capturer: Capturer,
    client: ProfileClient,
    jitter: Jitter,
    timers: Arc<TimerPool>,
    tick: Duration,
}

impl Scheduler {
    async fn run(mut self, stop: CancellationToken) {
        let mut ptype = self.rotation.next(ProfileType::Unknown);
        let mut delay = self.jitter.tick(Duration::ZERO);
        let mut buf = BytesMut::new();
        info!("profiling agent started, first {ptype} profile in {delay:?}");

        loop {
            if !self.timers.sleep(delay, &stop).await {
                break;
            }

            if let Err(e) = self.collect_and_send(ptype, &mut buf, &stop).await {
                match &e {
                    CollectError::Delivery(
                        RetryError::Terminal(DeliveryError::Canceled) | RetryError::Canceled { .. },
                    ) => debug!("{ptype} profile dropped: {e}"),
                    _ => error!("{e}"),
                }
            }
            buf.clear();

            ptype = self.rotation.next(ptype);
            let base = if Rotation::completes_rotation(ptype) {
                // full set taken, rest for the whole tick
                self.tick
            } else {
                Duration::ZERO
            };
            delay = self.jitter.tick(base);
            debug!("next {ptype} profile in {delay:?}");
        }

        info!("profiling agent stopped");
    }

    async fn collect_and_send(
        &mut self,
        ptype: ProfileType,
        buf: &mut BytesMut,
        cancel: &CancellationToken,
    ) -> Result<(), CollectError> {
        let captured_at = Utc::now();
        self.capturer.capture(ptype, cancel, buf).await?;

        debug!("sending {ptype} profile, {} bytes", buf.len());
        if buf.is_empty() {
            warn!("{ptype} profile is empty");
        }
        let body = buf.split().freeze();
        self.client.deliver(ptype, captured_at, body, cancel).await?;
        Ok(())
    }
}
