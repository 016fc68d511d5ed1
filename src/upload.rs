use std::{io::Read, path::Path, time::Duration};

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chunks::{ChunkReader, DEFAULT_CHUNK_SIZE_BYTES, check_chunk_size, part_count};
use crate::client::{UploadClient, UploadSession, file_name};
use crate::error::{Phase, UploadError};
use crate::rest_types::StoredObject;
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Size of every part except the last.
    pub chunk_size: u64,
    /// Parts in flight at once. 1 uploads strictly in order.
    pub concurrency: usize,
    /// Tries per part, each with a freshly issued destination.
    pub part_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE_BYTES,
            concurrency: 4,
            part_attempts: 1,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartProgress {
    pub part_number: u32,
    pub parts_completed: u32,
    pub total_parts: u64,
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    Started { total_parts: u64, total_bytes: u64 },
    Initialized(UploadSession),
    PartUploaded(PartProgress),
    Finalizing { parts: u32 },
    Complete(StoredObject),
}

/// Where an upload stands, folded from its events.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
    Init,
    Initializing,
    UploadingParts { parts_completed: u32, total_parts: u64 },
    Finalizing,
    Done(StoredObject),
    Failed(Option<Phase>),
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Done(_) | UploadState::Failed(_))
    }

    pub fn advance(self, event: &UploadEvent) -> UploadState {
        if self.is_terminal() {
            return self;
        }
        match (self, event) {
            (UploadState::Init, UploadEvent::Started { .. }) => UploadState::Initializing,
            (UploadState::Initializing, UploadEvent::Initialized(_)) => {
                UploadState::UploadingParts {
                    parts_completed: 0,
                    total_parts: 0,
                }
            }
            (UploadState::UploadingParts { .. }, UploadEvent::PartUploaded(progress)) => {
                UploadState::UploadingParts {
                    parts_completed: progress.parts_completed,
                    total_parts: progress.total_parts,
                }
            }
            (UploadState::UploadingParts { .. }, UploadEvent::Finalizing { .. }) => {
                UploadState::Finalizing
            }
            (UploadState::Finalizing, UploadEvent::Complete(object)) => {
                UploadState::Done(object.clone())
            }
            (_, _) => UploadState::Failed(None),
        }
    }

    pub fn fail(self, error: &UploadError) -> UploadState {
        if self.is_terminal() {
            return self;
        }
        UploadState::Failed(error.phase())
    }
}

impl<T: Transport> UploadClient<T> {
    /// Gets a destination for one part and transfers the chunk to it.
    ///
    /// Every attempt asks for a new destination, since a destination is
    /// spent by the PUT whether or not it succeeded.
    pub async fn upload_part(
        &self,
        session: &UploadSession,
        part_number: u32,
        chunk: Bytes,
        options: &UploadOptions,
    ) -> Result<(), UploadError> {
        let mut attempt = 1;
        loop {
            let result = async {
                let destination = self.get_part_destination(session, part_number).await?;
                self.transfer_part(destination, chunk.clone()).await
            }
            .await;

            match result {
                Ok(()) => return Ok(()),
                Err(e) if attempt < options.part_attempts => {
                    warn!(part_number, attempt, error = %e, "part upload failed, retrying");
                    tokio::time::sleep(options.retry_backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Drives one multipart upload: init, every part, then finalize.
    ///
    /// Local checks (file readable, not empty) run before the stream is
    /// returned, so a bad file never opens a session. Parts are dispatched
    /// in order and at most `options.concurrency` run at once. The first part
    /// error drops every other in-flight part and ends the stream without
    /// finalizing. Cancelling `cancel` stops dispatching at the next part
    /// boundary.
    pub fn multipart_upload<'a>(
        &'a self,
        path: &'a Path,
        content_type: &'a str,
        options: &'a UploadOptions,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'a, Result<UploadEvent, UploadError>>, UploadError> {
        check_chunk_size(options.chunk_size)?;
        let file_name = file_name(path)?;
        let file_size = std::fs::metadata(path)
            .map_err(|e| UploadError::io(path, e))?
            .len();
        if file_size == 0 {
            return Err(UploadError::EmptyFile(path.to_path_buf()));
        }
        let chunks = ChunkReader::open(path, options.chunk_size)?;

        Ok(self.upload_chunks(chunks, file_name, file_size, content_type, options, cancel))
    }

    /// The session half of [`Self::multipart_upload`], fed from any reader.
    pub fn upload_chunks<'a, R>(
        &'a self,
        chunks: ChunkReader<R>,
        file_name: String,
        file_size: u64,
        content_type: &'a str,
        options: &'a UploadOptions,
        cancel: CancellationToken,
    ) -> BoxStream<'a, Result<UploadEvent, UploadError>>
    where
        R: Read + Send + 'a,
    {
        let total_parts = part_count(file_size, chunks.chunk_size());

        let stream = async_stream::try_stream! {
            yield UploadEvent::Started {
                total_parts,
                total_bytes: file_size,
            };

            if cancel.is_cancelled() {
                Err(UploadError::Cancelled(Phase::Init))?;
            }
            let session = self.initialize(content_type).await?;
            yield UploadEvent::Initialized(session.clone());

            let session = &session;
            let parts = futures::stream::iter(chunks.zip(1u32..))
                .map(move |(chunk, part_number)| {
                    let cancel = cancel.clone();
                    async move {
                        if cancel.is_cancelled() {
                            return Err(UploadError::Cancelled(Phase::Part(part_number)));
                        }
                        let chunk = chunk.map_err(|e| e.during(Phase::Part(part_number)))?;
                        let len = chunk.len() as u64;
                        self.upload_part(session, part_number, chunk, options).await?;
                        Ok::<_, UploadError>((part_number, len))
                    }
                })
                .buffer_unordered(options.concurrency.max(1));
            tokio::pin!(parts);

            let mut parts_completed = 0u32;
            let mut bytes_uploaded = 0u64;
            while let Some((part_number, len)) = parts.try_next().await? {
                parts_completed += 1;
                bytes_uploaded += len;
                yield UploadEvent::PartUploaded(PartProgress {
                    part_number,
                    parts_completed,
                    total_parts,
                    bytes_uploaded,
                    total_bytes: file_size,
                });
            }

            info!(parts = parts_completed, "all parts uploaded");
            yield UploadEvent::Finalizing { parts: parts_completed };

            let object = self.finalize(session, &file_name).await?;
            info!(file_id = %object.file_id, "upload finalized");
            yield UploadEvent::Complete(object);
        };

        Box::pin(stream)
    }

    /// Runs [`Self::multipart_upload`] to the end, reporting each event.
    pub async fn multipart_upload_with<F>(
        &self,
        path: &Path,
        content_type: &str,
        options: &UploadOptions,
        cancel: CancellationToken,
        mut on_event: F,
    ) -> Result<StoredObject, UploadError>
    where
        F: FnMut(&UploadEvent),
    {
        let mut stream = self.multipart_upload(path, content_type, options, cancel)?;
        let mut state = UploadState::Init;

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    state = state.fail(&e);
                    warn!(?state, error = %e, "upload failed");
                    return Err(e);
                }
            };
            on_event(&event);
            state = state.advance(&event);
            if let UploadState::Done(object) = state {
                return Ok(object);
            }
        }

        Err(UploadError::protocol(
            Phase::Finalize,
            "Upload ended without a finalized file",
        ))
    }
}
