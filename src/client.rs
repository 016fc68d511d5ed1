use std::path::Path;

use bytes::Bytes;
use futures::StreamExt;
use reqwest::Method;
use serde::{Serialize, de::DeserializeOwned};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;

use crate::config::{Config, Destination};
use crate::error::{ConfigError, Phase, UploadError};
use crate::rest_types::{
    ContentTypeRequest, Envelope, FinalizeFile, FinalizeMultipartRequest, FinalizeResponse,
    FinalizeSimpleFile, FinalizeSimpleRequest, InitMultipartUploadResponse, PartUrlResponse,
    StoredObject, UploadUrlsRequest, UploadUrlsResponse,
};
use crate::transport::{HttpTransport, Reply, Transport};


const INIT_MULTIPART_ROUTE: &str = "files/upload/multipart/init";
const PART_URL_ROUTE: &str = "files/upload/multipart/url";
const FINALIZE_MULTIPART_ROUTE: &str = "files/upload/multipart/finalize";
const UPLOAD_URLS_ROUTE: &str = "files/upload/urls";
const FINALIZE_SIMPLE_ROUTE: &str = "files/upload/finalize";

/// An open multipart session on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub file_id: String,
    pub upload_id: String,
    pub destination: Destination,
    pub content_type: String,
}

/// A pre-signed address that accepts exactly one PUT.
///
/// Not `Clone`: [`UploadClient::transfer_part`] consumes it.
#[derive(Debug)]
pub struct PartDestination {
    pub part_number: u32,
    pub url: Url,
}

/// Optional descriptive fields for the single-shot finalize call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub description: Option<String>,
    pub recorder_name: Option<String>,
    pub recorder_email: Option<String>,
    pub needs_conversion: bool,
}

impl Default for FileMetadata {
    fn default() -> Self {
        Self {
            description: None,
            recorder_name: None,
            recorder_email: None,
            needs_conversion: true,
        }
    }
}

/// A single-shot upload target handed out by the upload URLs endpoint.
#[derive(Debug)]
pub struct SimpleUploadTarget {
    pub file_id: String,
    pub url: Url,
}

pub struct UploadClient<T = HttpTransport> {
    transport: T,
    destination: Destination,
}

impl UploadClient<HttpTransport> {
    pub fn from_config(config: &Config) -> Result<Self, UploadError> {
        let transport = HttpTransport::new(config.api_base_url.clone(), config.auth_token.clone())
            .map_err(|e| UploadError::protocol(Phase::Init, e.to_string()))?;
        Ok(Self::new(transport, config.destination.clone()))
    }
}

impl<T: Transport> UploadClient<T> {
    pub fn new(transport: T, destination: Destination) -> Self {
        Self {
            transport,
            destination,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn route(&self, base: &str, tail: &[&str]) -> String {
        let mut path = format!(
            "{}/{}/{}",
            base, self.destination.team_id, self.destination.folder_id
        );
        for segment in tail {
            path.push('/');
            path.push_str(segment);
        }
        path
    }

    /// Sends one JSON call and unwraps the `data` envelope.
    async fn call<B, R>(
        &self,
        phase: Phase,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<Envelope<R>, UploadError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let body = serde_json::to_value(body)
            .map_err(|e| UploadError::protocol(phase, format!("Unable to encode request: {}", e)))?;

        let reply = self
            .transport
            .send_json(method, path, &body)
            .await
            .map_err(|e| UploadError::protocol(phase, e.to_string()))?;

        if !reply.is_success() {
            return Err(UploadError::rejected(phase, reply.status, &reply.body));
        }

        reply
            .json()
            .map_err(|e| UploadError::protocol(phase, format!("Malformed response: {}", e)))
    }

    async fn put_bytes(&self, phase: Phase, url: &Url, body: Bytes) -> Result<(), UploadError> {
        let reply = self
            .transport
            .send_bytes(Method::PUT, url, body, None)
            .await
            .map_err(|e| UploadError::transfer(phase, e.to_string()))?;
        check_transfer(phase, reply)
    }

    pub async fn initialize(&self, content_type: &str) -> Result<UploadSession, UploadError> {
        let path = self.route(INIT_MULTIPART_ROUTE, &[]);
        let envelope: Envelope<InitMultipartUploadResponse> = self
            .call(
                Phase::Init,
                Method::PUT,
                &path,
                &ContentTypeRequest { content_type },
            )
            .await?;

        let data = envelope
            .data
            .ok_or_else(|| UploadError::protocol(Phase::Init, "Response has no data"))?;
        let file_id = data
            .file_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| UploadError::protocol(Phase::Init, "Response is missing fileId"))?;
        let upload_id = data
            .upload_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| UploadError::protocol(Phase::Init, "Response is missing uploadId"))?;

        info!(%file_id, %upload_id, "multipart upload initialized");

        Ok(UploadSession {
            file_id,
            upload_id,
            destination: self.destination.clone(),
            content_type: content_type.to_string(),
        })
    }

    pub async fn get_part_destination(
        &self,
        session: &UploadSession,
        part_number: u32,
    ) -> Result<PartDestination, UploadError> {
        let phase = Phase::Part(part_number);
        let part = part_number.to_string();
        let path = self.route(
            PART_URL_ROUTE,
            &[session.file_id.as_str(), session.upload_id.as_str(), part.as_str()],
        );

        let envelope: Envelope<PartUrlResponse> = self
            .call(
                phase,
                Method::PUT,
                &path,
                &ContentTypeRequest {
                    content_type: &session.content_type,
                },
            )
            .await?;

        let raw_url = envelope
            .data
            .and_then(|data| data.upload_url)
            .ok_or_else(|| UploadError::protocol(phase, "Response is missing uploadUrl"))?;
        let url = Url::parse(&raw_url)
            .map_err(|e| UploadError::protocol(phase, format!("Invalid uploadUrl: {}", e)))?;

        Ok(PartDestination { part_number, url })
    }

    pub async fn transfer_part(
        &self,
        destination: PartDestination,
        chunk: Bytes,
    ) -> Result<(), UploadError> {
        let phase = Phase::Part(destination.part_number);
        debug!(
            part_number = destination.part_number,
            bytes = chunk.len(),
            "transferring part"
        );
        self.put_bytes(phase, &destination.url, chunk).await
    }

    pub async fn finalize(
        &self,
        session: &UploadSession,
        file_name: &str,
    ) -> Result<StoredObject, UploadError> {
        let path = self.route(
            FINALIZE_MULTIPART_ROUTE,
            &[session.file_id.as_str(), session.upload_id.as_str()],
        );
        let request = FinalizeMultipartRequest {
            file: FinalizeFile {
                content_type: &session.content_type,
                name: file_name,
            },
        };

        let envelope: Envelope<FinalizeResponse> = self
            .call(Phase::Finalize, Method::PUT, &path, &request)
            .await?;

        envelope
            .data
            .and_then(|data| data.file)
            .ok_or_else(|| UploadError::protocol(Phase::Finalize, "Response is missing file"))
    }

    pub async fn request_upload_url(
        &self,
        content_type: &str,
        file_name: &str,
    ) -> Result<SimpleUploadTarget, UploadError> {
        let path = self.route(UPLOAD_URLS_ROUTE, &[]);
        let request = UploadUrlsRequest {
            files: vec![FinalizeFile {
                content_type,
                name: file_name,
            }],
        };

        let envelope: Envelope<UploadUrlsResponse> = self
            .call(Phase::Init, Method::POST, &path, &request)
            .await?;

        if envelope.success != Some(true) {
            return Err(UploadError::protocol(Phase::Init, "Failed to get upload URL"));
        }
        let param = envelope
            .data
            .and_then(|data| data.upload_params.into_iter().next())
            .ok_or_else(|| UploadError::protocol(Phase::Init, "Failed to get upload URL"))?;
        let url = Url::parse(&param.upload_url)
            .map_err(|e| UploadError::protocol(Phase::Init, format!("Invalid uploadUrl: {}", e)))?;

        Ok(SimpleUploadTarget {
            file_id: param.file_id,
            url,
        })
    }

    pub async fn finalize_simple(
        &self,
        file_id: &str,
        content_type: &str,
        file_name: &str,
        metadata: &FileMetadata,
    ) -> Result<StoredObject, UploadError> {
        let path = self.route(FINALIZE_SIMPLE_ROUTE, &[]);
        let request = FinalizeSimpleRequest {
            file: FinalizeSimpleFile {
                file_id,
                content_type,
                name: file_name,
                description: metadata.description.as_deref(),
                recorder_name: metadata.recorder_name.as_deref(),
                recorder_email: metadata.recorder_email.as_deref(),
                needs_conversion: metadata.needs_conversion,
            },
        };

        let envelope: Envelope<serde_json::Value> = self
            .call(Phase::Finalize, Method::POST, &path, &request)
            .await?;

        let data = envelope
            .data
            .ok_or_else(|| UploadError::protocol(Phase::Finalize, "Response has no data"))?;
        let file = match data.get("file") {
            Some(file) if file.is_object() => file.clone(),
            _ => data,
        };
        serde_json::from_value(file).map_err(|e| {
            UploadError::protocol(Phase::Finalize, format!("Malformed response: {}", e))
        })
    }

    /// Uploads a whole file with one URL and one PUT, then finalizes it.
    ///
    /// The file is streamed from disk, so its size is bounded only by what
    /// the storage URL accepts.
    pub async fn simple_upload(
        &self,
        path: &Path,
        content_type: &str,
        metadata: &FileMetadata,
    ) -> Result<StoredObject, UploadError> {
        let file_name = file_name(path)?;
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| UploadError::io(path, e))?;
        let file_size = file
            .metadata()
            .await
            .map_err(|e| UploadError::io(path, e))?
            .len();
        if file_size == 0 {
            return Err(UploadError::EmptyFile(path.to_path_buf()));
        }

        info!(%file_name, "requesting upload URL");
        let target = self.request_upload_url(content_type, &file_name).await?;
        info!(file_id = %target.file_id, bytes = file_size, "uploading file");

        let phase = Phase::Part(1);
        let reply = self
            .transport
            .send_stream(
                Method::PUT,
                &target.url,
                ReaderStream::new(file).boxed(),
                file_size,
                Some(content_type),
            )
            .await
            .map_err(|e| UploadError::transfer(phase, e.to_string()))?;
        check_transfer(phase, reply)?;

        info!(file_id = %target.file_id, "finalizing upload");
        self.finalize_simple(&target.file_id, content_type, &file_name, metadata)
            .await
    }
}

/// The name a local file is stored under remotely.
pub fn file_name(path: &Path) -> Result<String, UploadError> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            ConfigError::Invalid {
                name: "FILE_PATH",
                reason: format!("'{}' does not name a file", path.display()),
            }
            .into()
        })
}

fn check_transfer(phase: Phase, reply: Reply) -> Result<(), UploadError> {
    let Reply { status, body } = reply;
    if !status.is_success() {
        return Err(UploadError::transfer(
            phase,
            crate::error::status_message(status, &body),
        ));
    }
    Ok(())
}
