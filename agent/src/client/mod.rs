use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Request, Response, StatusCode};
use thiserror::Error;

pub mod profile_client;
pub use profile_client::ProfileClient;

/// Something that can execute an HTTP request, e.g. a [`reqwest::Client`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn execute(&self, request: Request) -> Result<Response> {
        Ok(reqwest::Client::execute(self, request).await?)
    }
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("context canceled")]
    Canceled,

    #[error("invalid profile url: {0}")]
    Url(#[from] url::ParseError),

    #[error("unable to encode query: {0}")]
    Query(#[from] serde_qs::Error),

    #[error("request body can't be replayed")]
    BodyNotReplayable,

    #[error("transport error: {0}")]
    Transport(anyhow::Error),

    #[error("unexpected response {status}: {err}")]
    ReadBody { status: StatusCode, err: reqwest::Error },

    #[error("unexpected response from collector {status}: {body}")]
    Server { status: StatusCode, body: String },

    #[error("bad request: collector responded with {status}: {body}")]
    BadRequest { status: StatusCode, body: String },
}
