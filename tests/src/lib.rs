//! A stand-in collector and producer for exercising the agent end to end.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use profile_agent::producer::{NamedProfile, ProfileProducer, RunningProfile};

/// One profile as received by [`MockCollector`].
#[derive(Debug)]
pub struct Upload {
    pub params: HashMap<String, String>,
    pub body: Bytes,
    /// status the collector answered with
    pub status: StatusCode,
}

struct CollectorState {
    statuses: Mutex<VecDeque<StatusCode>>,
    /// answer with headers only, the body never completes
    stall: bool,
    stalled: Mutex<Vec<hyper::body::Sender>>,
    uploads: UnboundedSender<Upload>,
}

/// HTTP collector accepting `POST /api/0/profiles` on an ephemeral port.
///
/// Answers with the scripted statuses in order, then with 200. Every
/// request is reported on `uploads`, whatever the answer.
pub struct MockCollector {
    pub addr: SocketAddr,
    pub uploads: UnboundedReceiver<Upload>,
}

impl MockCollector {
    pub async fn start(statuses: impl IntoIterator<Item = u16>) -> Result<Self> {
        Self::serve(statuses, false).await
    }

    /// Collector that sends the `status` line and headers of every answer,
    /// then never finishes the body.
    pub async fn start_stalling(status: u16) -> Result<Self> {
        Self::serve([status], true).await
    }

    async fn serve(statuses: impl IntoIterator<Item = u16>, stall: bool) -> Result<Self> {
        let statuses = statuses
            .into_iter()
            .map(StatusCode::from_u16)
            .collect::<Result<_, _>>()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(CollectorState {
            statuses: Mutex::new(statuses),
            stall,
            stalled: Mutex::new(vec![]),
            uploads: tx,
        });

        let app = Router::new()
            .route("/api/0/profiles", post(ingest))
            .with_state(state);
        let server = axum::Server::try_bind(&"127.0.0.1:0".parse()?)?
            .serve(app.into_make_service());
        let addr = server.local_addr();
        tokio::spawn(async move {
            if let Err(e) = server.await {
                tracing::error!("mock collector failed: {e}");
            }
        });

        Ok(Self { addr, uploads: rx })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

async fn ingest(
    State(st): State<Arc<CollectorState>>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let status = st.statuses.lock().pop_front().unwrap_or(StatusCode::OK);
    let _ = st.uploads.send(Upload { params, body, status });

    if st.stall {
        let (sender, body) = Body::channel();
        // keep the sender so the body stays open
        st.stalled.lock().push(sender);
        return (status, [(header::CONTENT_LENGTH, "100")], axum::body::boxed(body)).into_response();
    }
    (status, format!("{}", status.as_u16())).into_response()
}

/// Producer with fixed payloads, so uploads can be checked byte for byte.
#[derive(Default)]
pub struct StaticProducer;

pub const CPU_PAYLOAD: &[u8] = b"static cpu profile";
pub const HEAP_PAYLOAD: &[u8] = b"static heap profile";

struct StaticRunning(&'static [u8]);

impl RunningProfile for StaticRunning {
    fn stop(self: Box<Self>, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(self.0);
        Ok(())
    }
}

struct StaticNamed(&'static str);

impl NamedProfile for StaticNamed {
    fn write_to(&self, buf: &mut BytesMut, debug: u8) -> Result<()> {
        buf.extend_from_slice(format!("{} debug={debug}", self.0).as_bytes());
        Ok(())
    }
}

impl ProfileProducer for StaticProducer {
    fn start_cpu_profile(&self) -> Result<Box<dyn RunningProfile>> {
        Ok(Box::new(StaticRunning(CPU_PAYLOAD)))
    }

    fn write_heap_profile(&self, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(HEAP_PAYLOAD);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<Box<dyn NamedProfile>> {
        match name {
            "goroutine" => Some(Box::new(StaticNamed("goroutine"))),
            "threadcreate" => Some(Box::new(StaticNamed("threadcreate"))),
            _ => None,
        }
    }

    fn start_trace(&self) -> Result<Box<dyn RunningProfile>> {
        Err(anyhow!("tracing is not supported"))
    }
}
