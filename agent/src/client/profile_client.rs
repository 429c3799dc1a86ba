use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use reqwest::{Method, Request, Response, Url};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{DeliveryError, Transport};
use crate::retry::{Backoff, Failure, RetryError};
use crate::timer::TimerPool;
use crate::ProfileType;

pub const PROFILES_PATH: &str = "/api/0/profiles";
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub const BACKOFF: Backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(120), 10);

#[derive(Serialize)]
struct ProfileQuery<'a> {
    service: &'a str,
    labels: &'a str,
    #[serde(rename = "type")]
    ptype: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
}

/// Uploads captured profiles to the collector.
pub struct ProfileClient {
    transport: Arc<dyn Transport>,
    timers: Arc<TimerPool>,
    collector: String,
    service: String,
    labels: String,
    backoff: Backoff,
}

impl ProfileClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        timers: Arc<TimerPool>,
        collector: &str,
        service: &str,
        labels: &str,
    ) -> Self {
        Self {
            transport,
            timers,
            collector: collector.to_owned(),
            service: service.to_owned(),
            labels: labels.to_owned(),
            backoff: BACKOFF,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn profile_url(
        &self,
        ptype: ProfileType,
        captured_at: DateTime<Utc>,
    ) -> Result<Url, DeliveryError> {
        // only traces carry their capture time
        let created_at = (ptype == ProfileType::Trace)
            .then(|| captured_at.format(CREATED_AT_FORMAT).to_string());
        let query = serde_qs::to_string(&ProfileQuery {
            service: &self.service,
            labels: &self.labels,
            ptype: ptype.as_str(),
            created_at,
        })?;

        let url = Url::parse(&format!("{}{}?{}", self.collector, PROFILES_PATH, query))?;
        Ok(url)
    }

    /// Sends one profile, retrying transient failures with backoff.
    pub async fn deliver(
        &self,
        ptype: ProfileType,
        captured_at: DateTime<Utc>,
        body: Bytes,
        cancel: &CancellationToken,
    ) -> Result<(), RetryError<DeliveryError>> {
        let url = self
            .profile_url(ptype, captured_at)
            .map_err(RetryError::Terminal)?;
        let mut request = Request::new(Method::POST, url);
        *request.body_mut() = Some(body.into());

        self.backoff
            .retry(&self.timers, cancel, || {
                let request = request.try_clone();
                async move {
                    let request = request.ok_or(Failure::Terminal(DeliveryError::BodyNotReplayable))?;
                    self.execute(request, cancel).await
                }
            })
            .await
    }

    /// Executes a single attempt and classifies its outcome.
    pub async fn execute(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<(), Failure<DeliveryError>> {
        until_canceled(cancel, self.send(request)).await.map(drop)
    }

    /// Like [`execute`](Self::execute), but copies a successful response body into `sink`.
    pub async fn execute_into(
        &self,
        request: Request,
        cancel: &CancellationToken,
        sink: &mut BytesMut,
    ) -> Result<(), Failure<DeliveryError>> {
        until_canceled(cancel, async {
            let response = self.send(request).await?;
            let status = response.status();
            let body = response
                .bytes()
                .await
                .map_err(|err| Failure::Retryable(DeliveryError::ReadBody { status, err }))?;
            sink.extend_from_slice(&body);
            Ok(())
        })
        .await
    }

    async fn send(&self, request: Request) -> Result<Response, Failure<DeliveryError>> {
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| Failure::Retryable(DeliveryError::Transport(e)))?;

        let status = response.status();
        if status.as_u16() < 400 {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .map_err(|err| Failure::Retryable(DeliveryError::ReadBody { status, err }))?;
        if status.is_server_error() {
            return Err(Failure::Retryable(DeliveryError::Server { status, body }));
        }
        Err(Failure::Terminal(DeliveryError::BadRequest { status, body }))
    }
}

/// Runs a whole attempt, body read included, unless `cancel` fires first.
async fn until_canceled<T>(
    cancel: &CancellationToken,
    attempt: impl Future<Output = Result<T, Failure<DeliveryError>>>,
) -> Result<T, Failure<DeliveryError>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Failure::Terminal(DeliveryError::Canceled)),
        res = attempt => res,
    }
}
