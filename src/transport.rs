use std::{future::Future, io};

use bytes::Bytes;
use futures::stream::BoxStream;
use reqwest::{
    Body, Client, Method, RequestBuilder, StatusCode,
    header::{CONTENT_LENGTH, CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::TransportError;

/// Status and raw body of an HTTP exchange.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// A file body read lazily while it is sent.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// The HTTP calls the upload engine needs.
///
/// JSON calls go to the files API relative to its base URL and are
/// authenticated. Byte uploads go to absolute, pre-signed URLs and carry no
/// credentials. A `content_type` of `None` sends no `Content-Type` header.
pub trait Transport: Send + Sync {
    fn send_json(
        &self,
        method: Method,
        path: &str,
        body: &Value,
    ) -> impl Future<Output = Result<Reply, TransportError>> + Send;

    fn send_bytes(
        &self,
        method: Method,
        url: &Url,
        body: Bytes,
        content_type: Option<&str>,
    ) -> impl Future<Output = Result<Reply, TransportError>> + Send;

    /// Like `send_bytes`, for a body too large to hold in memory.
    fn send_stream(
        &self,
        method: Method,
        url: &Url,
        body: ByteStream,
        content_length: u64,
        content_type: Option<&str>,
    ) -> impl Future<Output = Result<Reply, TransportError>> + Send;
}

pub struct HttpTransport {
    client: Client,
    api_base_url: Url,
    auth_token: String,
}

impl HttpTransport {
    pub fn new(api_base_url: Url, auth_token: String) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(concat!("screenapp-upload/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base_url,
            auth_token,
        })
    }

    fn upload_request(
        &self,
        method: Method,
        url: &Url,
        content_length: u64,
        content_type: Option<&str>,
    ) -> RequestBuilder {
        let request = self
            .client
            .request(method, url.clone())
            .header(CONTENT_LENGTH, content_length);
        match content_type {
            Some(content_type) => request.header(CONTENT_TYPE, content_type),
            None => request,
        }
    }
}

async fn into_reply(response: reqwest::Response) -> Reply {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Reply { status, body }
}

impl Transport for HttpTransport {
    async fn send_json(
        &self,
        method: Method,
        path: &str,
        body: &Value,
    ) -> Result<Reply, TransportError> {
        let url = self.api_base_url.join(path)?;
        debug!(%method, %url, "sending API request");

        let response = self
            .client
            .request(method, url)
            .bearer_auth(&self.auth_token)
            .json(body)
            .send()
            .await?;

        let reply = into_reply(response).await;
        debug!(status = %reply.status, "API response received");

        Ok(reply)
    }

    async fn send_bytes(
        &self,
        method: Method,
        url: &Url,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<Reply, TransportError> {
        let host = url.host_str().unwrap_or_default();
        debug!(%method, host, bytes = body.len(), "uploading bytes");

        let response = self
            .upload_request(method, url, body.len() as u64, content_type)
            .body(body)
            .send()
            .await?;

        Ok(into_reply(response).await)
    }

    async fn send_stream(
        &self,
        method: Method,
        url: &Url,
        body: ByteStream,
        content_length: u64,
        content_type: Option<&str>,
    ) -> Result<Reply, TransportError> {
        let host = url.host_str().unwrap_or_default();
        debug!(%method, host, bytes = content_length, "streaming upload");

        let response = self
            .upload_request(method, url, content_length, content_type)
            .body(Body::wrap_stream(body))
            .send()
            .await?;

        Ok(into_reply(response).await)
    }
}
