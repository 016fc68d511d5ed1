//! An in-memory stand-in for the files API and its storage URLs.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::Destination;
use crate::error::TransportError;
use crate::transport::{ByteStream, Reply, Transport};

const STORAGE_HOST: &str = "https://storage.test";
const FINALIZE_PREFIX: &str = "files/upload/multipart/finalize/";

pub fn destination() -> Destination {
    Destination {
        team_id: "team-1".to_string(),
        folder_id: "folder-1".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Json {
        method: Method,
        path: String,
        body: Value,
    },
    Bytes {
        url: String,
        len: usize,
        content_type: Option<String>,
    },
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    uploads: Vec<(u32, Vec<u8>)>,
    url_attempts: HashMap<u32, u32>,
    used_urls: HashSet<String>,
    url_failures: HashMap<u32, usize>,
    transfer_failures: HashMap<u32, usize>,
}

#[derive(Default)]
pub struct FakeServer {
    state: Mutex<State>,
    fail_init: bool,
    fail_finalize: bool,
    init_body: Option<Value>,
    part_url_body: Option<Value>,
    upload_urls_body: Option<Value>,
    finalize_body: Option<Value>,
    transfer_delay: Option<Duration>,
    cancel_after: Option<(u32, CancellationToken)>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn reply(status: StatusCode, body: Value) -> Reply {
    Reply {
        status,
        body: body.to_string(),
    }
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn fail_finalize(mut self) -> Self {
        self.fail_finalize = true;
        self
    }

    pub fn with_init_body(mut self, body: Value) -> Self {
        self.init_body = Some(body);
        self
    }

    pub fn with_part_url_body(mut self, body: Value) -> Self {
        self.part_url_body = Some(body);
        self
    }

    pub fn with_upload_urls_body(mut self, body: Value) -> Self {
        self.upload_urls_body = Some(body);
        self
    }

    pub fn with_finalize_body(mut self, body: Value) -> Self {
        self.finalize_body = Some(body);
        self
    }

    /// The next `times` URL requests for `part_number` are answered with 503.
    pub fn fail_part_url(self, part_number: u32, times: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .url_failures
            .insert(part_number, times);
        self
    }

    /// The next `times` PUTs for `part_number` are answered with 503.
    pub fn fail_transfer(self, part_number: u32, times: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .transfer_failures
            .insert(part_number, times);
        self
    }

    pub fn with_transfer_delay(mut self, delay: Duration) -> Self {
        self.transfer_delay = Some(delay);
        self
    }

    /// Cancels `token` once `part_number` has been stored.
    pub fn cancel_after_part(mut self, part_number: u32, token: CancellationToken) -> Self {
        self.cancel_after = Some((part_number, token));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Part numbers in the order their URLs were requested.
    pub fn requested_parts(&self) -> Vec<u32> {
        self.calls()
            .iter()
            .filter_map(|call| match call {
                Call::Json { path, .. } if path.starts_with("files/upload/multipart/url/") => {
                    path.rsplit('/').next().and_then(|p| p.parse().ok())
                }
                _ => None,
            })
            .collect()
    }

    /// Part numbers in the order their bytes were stored.
    pub fn stored_parts(&self) -> Vec<u32> {
        self.state
            .lock()
            .unwrap()
            .uploads
            .iter()
            .map(|(part, _)| *part)
            .collect()
    }

    /// Stored bodies ordered by part number.
    pub fn uploaded_parts(&self) -> Vec<Vec<u8>> {
        let mut uploads = self.state.lock().unwrap().uploads.clone();
        uploads.sort_by_key(|(part, _)| *part);
        uploads.into_iter().map(|(_, data)| data).collect()
    }

    pub fn finalize_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| {
                matches!(call, Call::Json { path, .. } if path.starts_with(FINALIZE_PREFIX))
            })
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn handle_json(&self, path: &str, body: &Value) -> Reply {
        let mut state = self.state.lock().unwrap();

        if path.starts_with("files/upload/multipart/init/") {
            if self.fail_init {
                return reply(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "boom"}));
            }
            let body = self
                .init_body
                .clone()
                .unwrap_or_else(|| json!({"data": {"fileId": "file-1", "uploadId": "upload-1"}}));
            return reply(StatusCode::OK, body);
        }

        if path.starts_with("files/upload/multipart/url/") {
            let part: u32 = path
                .rsplit('/')
                .next()
                .and_then(|p| p.parse().ok())
                .unwrap_or_default();
            if let Some(remaining) = state.url_failures.get_mut(&part)
                && *remaining > 0
            {
                *remaining -= 1;
                return reply(StatusCode::SERVICE_UNAVAILABLE, json!({}));
            }
            if let Some(body) = &self.part_url_body {
                return reply(StatusCode::OK, body.clone());
            }
            let attempt = state.url_attempts.entry(part).or_default();
            *attempt += 1;
            let url = format!("{}/upload-1/part/{}?attempt={}", STORAGE_HOST, part, attempt);
            return reply(StatusCode::OK, json!({"data": {"uploadUrl": url}}));
        }

        if path.starts_with(FINALIZE_PREFIX) {
            if self.fail_finalize {
                return reply(StatusCode::BAD_GATEWAY, json!({}));
            }
            if let Some(body) = &self.finalize_body {
                return reply(StatusCode::OK, body.clone());
            }
            let file = &body["file"];
            return reply(
                StatusCode::OK,
                json!({"data": {"file": {
                    "fileId": "file-1",
                    "contentType": file["contentType"],
                    "name": file["name"],
                    "url": "https://cdn.test/file-1",
                }}}),
            );
        }

        if path.starts_with("files/upload/urls/") {
            let body = self.upload_urls_body.clone().unwrap_or_else(|| {
                json!({"success": true, "data": {"uploadParams": [{
                    "fileId": "simple-file",
                    "uploadUrl": format!("{}/simple/simple-file", STORAGE_HOST),
                }]}})
            });
            return reply(StatusCode::OK, body);
        }

        if path.starts_with("files/upload/finalize/") {
            let file = &body["file"];
            return reply(
                StatusCode::OK,
                json!({"success": true, "data": {"file": {
                    "fileId": file["fileId"],
                    "contentType": file["contentType"],
                    "name": file["name"],
                }}}),
            );
        }

        reply(StatusCode::NOT_FOUND, json!({}))
    }

    fn store(&self, url: &Url, body: &Bytes) -> Reply {
        let mut state = self.state.lock().unwrap();

        if !state.used_urls.insert(url.to_string()) {
            return reply(StatusCode::FORBIDDEN, json!({"error": "url already used"}));
        }

        // Simple uploads are stored as part 1
        let part: u32 = url
            .path_segments()
            .and_then(|mut segments| {
                let _ = segments.next();
                match segments.next() {
                    Some("part") => segments.next().and_then(|p| p.parse().ok()),
                    _ => Some(1),
                }
            })
            .unwrap_or(1);

        if let Some(remaining) = state.transfer_failures.get_mut(&part)
            && *remaining > 0
        {
            *remaining -= 1;
            return reply(StatusCode::SERVICE_UNAVAILABLE, json!({}));
        }

        state.uploads.push((part, body.to_vec()));
        drop(state);

        if let Some((after, token)) = &self.cancel_after
            && *after == part
        {
            token.cancel();
        }

        reply(StatusCode::OK, json!({}))
    }
}

impl Transport for FakeServer {
    async fn send_json(
        &self,
        method: Method,
        path: &str,
        body: &Value,
    ) -> Result<Reply, TransportError> {
        self.state.lock().unwrap().calls.push(Call::Json {
            method,
            path: path.to_string(),
            body: body.clone(),
        });
        Ok(self.handle_json(path, body))
    }

    async fn send_bytes(
        &self,
        _method: Method,
        url: &Url,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<Reply, TransportError> {
        self.state.lock().unwrap().calls.push(Call::Bytes {
            url: url.to_string(),
            len: body.len(),
            content_type: content_type.map(str::to_string),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.transfer_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(self.store(url, &body))
    }

    async fn send_stream(
        &self,
        method: Method,
        url: &Url,
        mut body: ByteStream,
        content_length: u64,
        content_type: Option<&str>,
    ) -> Result<Reply, TransportError> {
        let mut collected = BytesMut::new();
        while let Some(chunk) = body.try_next().await.unwrap() {
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(collected.len() as u64, content_length);
        self.send_bytes(method, url, collected.freeze(), content_type).await
    }
}
