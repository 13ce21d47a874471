//! Resumable, verified single-file transfers
//!
//! Bytes are streamed into `<destination>.hbpart` and hashed as they are
//! written. Only after the size and hash check out is the temporary file
//! renamed onto the destination and the hash recorded in the [`HashStore`].

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use url::Url;

use crate::app::client::http::is_transient_status;
use crate::app::download::config::DownloadConfig;
use crate::app::download::resume::{resume_point, temp_path_for};
use crate::app::download::transfer::{TransferPhase, TransferState};
use crate::app::events::{DownloadEvent, EventSink};
use crate::app::hash::{ContentHash, HashAlgorithm};
use crate::app::models::ProductFile;
use crate::app::retry::retry_after;
use crate::app::signals::ShutdownSignal;
use crate::app::store::{hash_file, DownloadRecord, FileIdentity, HashStore};
use crate::errors::{DownloadError, DownloadResult};

/// One file to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequest {
    pub url: Url,
    pub destination: PathBuf,
    pub declared_size: Option<u64>,
    pub declared_hash: Option<ContentHash>,
}

impl FileRequest {
    pub fn from_product(file: &ProductFile, destination: PathBuf) -> Self {
        Self {
            url: file.url.clone(),
            destination,
            declared_size: file.declared_size,
            declared_hash: file.declared_hash.clone(),
        }
    }
}

/// Successful result of [`DownloadEngine::download`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The file was (re)fetched and moved into place
    Complete {
        /// Bytes received from the network in this call
        bytes_transferred: u64,
        size: u64,
        hash: Option<ContentHash>,
    },
    /// The destination already held the right content; nothing was fetched
    AlreadyUpToDate,
}

/// Why a single HTTP attempt ended early
enum AttemptError {
    /// Worth another attempt from the current offset
    Interrupted {
        reason: String,
        retry_after: Option<Duration>,
    },
    Cancelled,
    Fatal(DownloadError),
}

impl AttemptError {
    fn interrupted(reason: impl Into<String>) -> Self {
        AttemptError::Interrupted {
            reason: reason.into(),
            retry_after: None,
        }
    }
}

impl From<DownloadError> for AttemptError {
    fn from(e: DownloadError) -> Self {
        AttemptError::Fatal(e)
    }
}

/// Drives files through NotStarted → InProgress → Verifying → Complete/Failed
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    http: Client,
    store: Arc<HashStore>,
    download_root: PathBuf,
    config: DownloadConfig,
}

impl DownloadEngine {
    pub fn new(
        http: Client,
        store: Arc<HashStore>,
        download_root: impl Into<PathBuf>,
        config: DownloadConfig,
    ) -> Self {
        Self {
            http,
            store,
            download_root: download_root.into(),
            config,
        }
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<HashStore> {
        &self.store
    }

    pub fn download_root(&self) -> &Path {
        &self.download_root
    }

    /// Fetch one file, skipping it when the destination is already up to date
    ///
    /// On failure or cancellation the temporary file is left in place so the
    /// next run can resume or an operator can inspect it.
    pub async fn download(
        &self,
        request: &FileRequest,
        events: &EventSink,
        mut shutdown: ShutdownSignal,
    ) -> DownloadResult<DownloadOutcome> {
        let identity = FileIdentity::for_destination(&self.download_root, &request.destination);
        let record = self.store.lookup(&identity).await;
        emit_phase(events, &request.destination, TransferPhase::NotStarted);

        if self
            .is_up_to_date(request, &identity, record.as_ref())
            .await?
        {
            debug!("{} is up to date", request.destination.display());
            emit_phase(events, &request.destination, TransferPhase::Complete);
            return Ok(DownloadOutcome::AlreadyUpToDate);
        }

        if shutdown.is_triggered() {
            return Err(DownloadError::Cancelled { offset: 0 });
        }

        match self
            .transfer(request, identity, record.as_ref(), events, &mut shutdown)
            .await
        {
            Ok(outcome) => {
                emit_phase(events, &request.destination, TransferPhase::Complete);
                Ok(outcome)
            }
            Err(e) => {
                if !matches!(e, DownloadError::Cancelled { .. }) {
                    emit_phase(events, &request.destination, TransferPhase::Failed);
                }
                Err(e)
            }
        }
    }

    /// Whether the destination can be reported as AlreadyUpToDate without a fetch
    async fn is_up_to_date(
        &self,
        request: &FileRequest,
        identity: &FileIdentity,
        stored: Option<&DownloadRecord>,
    ) -> DownloadResult<bool> {
        let size = match tokio::fs::metadata(&request.destination).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return Ok(false),
        };

        let record = stored.filter(|r| r.size == size);
        match request.declared_size {
            Some(declared) if declared != size => {
                info!(
                    "{} is {} bytes but {} are declared; fetching again",
                    request.destination.display(),
                    size,
                    declared
                );
                return Ok(false);
            }
            // Without a declared size the last recorded size is the reference.
            None if stored.is_some() && record.is_none() => return Ok(false),
            _ => {}
        }

        let policy = &self.config.hash_policy;
        if !policy.verifies() {
            return Ok(true);
        }

        let expected = request
            .declared_hash
            .clone()
            .or_else(|| record.map(|r| r.hash.clone()));

        let Some(expected) = expected else {
            // Nothing to compare against: accept the file as it is.
            if policy.write {
                let (hash, _) = hash_file(
                    &request.destination,
                    HashAlgorithm::Md5,
                    self.config.chunk_size,
                )
                .await?;
                self.store.record(identity.clone(), hash, size).await?;
            }
            return Ok(true);
        };

        if policy.trusts_stored_hash() {
            if let Some(stored) = record {
                if stored.hash == expected {
                    return Ok(true);
                }
            }
        }

        let actual = match hash_file(
            &request.destination,
            expected.algorithm(),
            self.config.chunk_size,
        )
        .await
        {
            Ok((hash, _)) => hash,
            Err(e) => {
                warn!(
                    "Could not hash existing {}: {}",
                    request.destination.display(),
                    e
                );
                return Ok(false);
            }
        };

        if actual != expected {
            info!(
                "{} does not match {}; fetching again",
                request.destination.display(),
                expected
            );
            return Ok(false);
        }

        if record.map(|r| &r.hash) != Some(&actual) {
            self.store.record(identity.clone(), actual, size).await?;
        }
        Ok(true)
    }

    /// Algorithm for the running hash, or `None` when hashing is disabled
    fn running_algorithm(
        &self,
        request: &FileRequest,
        record: Option<&DownloadRecord>,
    ) -> Option<HashAlgorithm> {
        if !self.config.hash_policy.verifies() {
            return None;
        }
        Some(
            request
                .declared_hash
                .as_ref()
                .map(ContentHash::algorithm)
                .or_else(|| record.map(|r| r.hash.algorithm()))
                .unwrap_or(HashAlgorithm::Md5),
        )
    }

    async fn transfer(
        &self,
        request: &FileRequest,
        identity: FileIdentity,
        record: Option<&DownloadRecord>,
        events: &EventSink,
        shutdown: &mut ShutdownSignal,
    ) -> DownloadResult<DownloadOutcome> {
        let destination = &request.destination;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| DownloadError::DestinationUnwritable {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let algorithm = self.running_algorithm(request, record);
        let temp_path = temp_path_for(destination);
        let point = resume_point(
            &temp_path,
            self.config.resume,
            request.declared_size,
            algorithm,
            self.config.chunk_size,
        )
        .await;

        let mut file = open_temp(&temp_path).await?;
        let mut state = TransferState::new(temp_path.clone(), request.declared_size, algorithm);
        let mut resumed = point.offset > 0;
        reposition(&mut file, &temp_path, point.offset).await?;
        state.resume_from(point.offset, point.hasher);

        let (hash, verified) = loop {
            state.phase = TransferPhase::InProgress;
            emit_phase(events, destination, TransferPhase::InProgress);
            self.fetch_remaining(request, &mut state, &mut file, events, shutdown)
                .await?;
            file.sync_all().await.map_err(unwritable(&temp_path))?;

            state.phase = TransferPhase::Verifying;
            emit_phase(events, destination, TransferPhase::Verifying);
            match verify(request, record, &mut state) {
                Err(DownloadError::IntegrityMismatch { .. }) if resumed => {
                    warn!(
                        "Resumed data in {} did not verify; fetching from the start",
                        temp_path.display()
                    );
                    resumed = false;
                    reposition(&mut file, &temp_path, 0).await?;
                    state.restart();
                }
                Err(e) => {
                    state.phase = TransferPhase::Failed;
                    return Err(e);
                }
                Ok(result) => break result,
            }
        };
        drop(file);

        tokio::fs::rename(&temp_path, destination)
            .await
            .map_err(|source| DownloadError::DestinationUnwritable {
                path: destination.clone(),
                source,
            })?;
        state.phase = TransferPhase::Complete;

        let size = state.bytes_written;
        if let Some(hash) = &hash {
            if verified || self.config.hash_policy.write {
                self.store.record(identity, hash.clone(), size).await?;
            }
        }

        info!(
            "Downloaded {} ({} bytes, {} fetched)",
            destination.display(),
            size,
            state.bytes_transferred
        );
        Ok(DownloadOutcome::Complete {
            bytes_transferred: state.bytes_transferred,
            size,
            hash,
        })
    }

    /// Run attempts until every expected byte is on disk or the budget is spent
    async fn fetch_remaining(
        &self,
        request: &FileRequest,
        state: &mut TransferState,
        file: &mut File,
        events: &EventSink,
        shutdown: &mut ShutdownSignal,
    ) -> DownloadResult<()> {
        if state.is_complete() {
            debug!(
                "{} already holds all {} bytes",
                state.partial_path.display(),
                state.bytes_written
            );
            return Ok(());
        }

        let mut schedule = self.config.retry.schedule();
        loop {
            let attempt = schedule.start_attempt();
            let result = self.attempt(request, state, file, events, shutdown).await;

            let (reason, server_delay) = match result {
                Ok(()) => return Ok(()),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Cancelled) => {
                    return Err(DownloadError::Cancelled {
                        offset: state.bytes_written,
                    })
                }
                Err(AttemptError::Interrupted {
                    reason,
                    retry_after,
                }) => (reason, retry_after),
            };

            if !schedule.can_retry() {
                warn!(
                    "Giving up on {} at byte {} after {} attempts: {}",
                    request.url, state.bytes_written, attempt, reason
                );
                return Err(DownloadError::TransferFailed {
                    offset: state.bytes_written,
                    attempts: attempt,
                    reason,
                });
            }

            let mut delay = schedule.next_delay();
            if let Some(requested) = server_delay {
                delay = delay.max(requested.min(self.config.retry.max_retry_after));
            }
            warn!(
                "Attempt {} for {} stopped at byte {}: {}. Retrying in {}ms",
                attempt,
                request.url,
                state.bytes_written,
                reason,
                delay.as_millis()
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.triggered() => {
                    return Err(DownloadError::Cancelled { offset: state.bytes_written });
                }
            }
        }
    }

    /// One HTTP request, resuming from `state.bytes_written`
    async fn attempt(
        &self,
        request: &FileRequest,
        state: &mut TransferState,
        file: &mut File,
        events: &EventSink,
        shutdown: &mut ShutdownSignal,
    ) -> Result<(), AttemptError> {
        let offset = state.bytes_written;
        let mut builder = self.http.get(request.url.clone());
        if offset > 0 {
            builder = builder.header(RANGE, format!("bytes={}-", offset));
        }

        let response = tokio::select! {
            sent = builder.send() => sent.map_err(|e| AttemptError::interrupted(e.to_string()))?,
            _ = shutdown.triggered() => return Err(AttemptError::Cancelled),
        };

        let status = response.status();
        match status {
            StatusCode::PARTIAL_CONTENT => match parse_content_range(response.headers()) {
                Some((start, total)) if start == offset => {
                    if state.total_expected.is_none() {
                        state.total_expected = total;
                    }
                }
                other => {
                    warn!(
                        "Unexpected Content-Range {:?} for offset {}; restarting {}",
                        other, offset, request.url
                    );
                    reposition(file, &state.partial_path, 0).await?;
                    state.restart();
                    return Err(AttemptError::interrupted("unexpected Content-Range"));
                }
            },
            StatusCode::OK => {
                if offset > 0 {
                    info!(
                        "{} ignored the range request; restarting from zero",
                        request.url.host_str().unwrap_or("file host")
                    );
                    reposition(file, &state.partial_path, 0).await?;
                    state.restart();
                }
                if state.total_expected.is_none() {
                    state.total_expected = response.content_length();
                }
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                let total = parse_content_range(response.headers())
                    .and_then(|(_, total)| total)
                    .or(state.total_expected);
                if total == Some(offset) {
                    state.total_expected = total;
                    return Ok(());
                }
                reposition(file, &state.partial_path, 0).await?;
                state.restart();
                return Err(AttemptError::interrupted(format!(
                    "range starting at {} not satisfiable",
                    offset
                )));
            }
            s if s == StatusCode::TOO_MANY_REQUESTS || is_transient_status(s) => {
                return Err(AttemptError::Interrupted {
                    reason: format!("HTTP {}", s.as_u16()),
                    retry_after: retry_after(response.headers()),
                });
            }
            s => return Err(DownloadError::Rejected { status: s.as_u16() }.into()),
        }

        let mut stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::with_capacity(self.config.chunk_size);
        let mut last_progress = Instant::now();

        let outcome = loop {
            let next = tokio::select! {
                next = tokio::time::timeout(self.config.read_timeout, stream.next()) => next,
                _ = shutdown.triggered() => break Err(AttemptError::Cancelled),
            };

            match next {
                Err(_) => {
                    break Err(AttemptError::interrupted(format!(
                        "no data for {}s",
                        self.config.read_timeout.as_secs()
                    )))
                }
                Ok(None) => break Ok(()),
                Ok(Some(Err(e))) => break Err(AttemptError::interrupted(e.to_string())),
                Ok(Some(Ok(bytes))) => {
                    pending.extend_from_slice(&bytes);
                    while pending.len() >= self.config.chunk_size {
                        let rest = pending.split_off(self.config.chunk_size);
                        write_chunk(file, state, &pending).await?;
                        pending = rest;
                    }

                    if last_progress.elapsed() >= self.config.progress_interval {
                        last_progress = Instant::now();
                        events.emit(DownloadEvent::FileProgress {
                            destination: request.destination.clone(),
                            bytes_written: state.bytes_written + pending.len() as u64,
                            total: state.total_expected,
                        });
                    }
                }
            }
        };

        // Whatever arrived is a valid prefix, keep it for the next attempt.
        if !pending.is_empty() {
            write_chunk(file, state, &pending).await?;
        }
        file.flush()
            .await
            .map_err(unwritable(&state.partial_path))?;
        events.emit(DownloadEvent::FileProgress {
            destination: request.destination.clone(),
            bytes_written: state.bytes_written,
            total: state.total_expected,
        });
        outcome?;

        match state.total_expected {
            Some(total) if state.bytes_written < total => Err(AttemptError::interrupted(format!(
                "connection closed at byte {} of {}",
                state.bytes_written, total
            ))),
            _ => Ok(()),
        }
    }
}

/// Check size and hash of a fully written temporary file
///
/// Returns the computed hash and whether it was checked against anything.
fn verify(
    request: &FileRequest,
    record: Option<&DownloadRecord>,
    state: &mut TransferState,
) -> DownloadResult<(Option<ContentHash>, bool)> {
    let size = state.bytes_written;
    if let Some(expected) = request.declared_size {
        if size != expected {
            return Err(DownloadError::SizeMismatch {
                path: state.partial_path.clone(),
                expected,
                actual: size,
            });
        }
    }

    let Some(actual) = state.finish_hash() else {
        return Ok((None, false));
    };

    let expected = request.declared_hash.clone().or_else(|| {
        record
            .filter(|r| r.size == size && r.hash.algorithm() == actual.algorithm())
            .map(|r| r.hash.clone())
    });

    match expected {
        Some(expected) if expected != actual => Err(DownloadError::IntegrityMismatch {
            path: state.partial_path.clone(),
            expected,
            actual,
        }),
        Some(_) => Ok((Some(actual), true)),
        None => Ok((Some(actual), false)),
    }
}

async fn open_temp(path: &Path) -> DownloadResult<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .await
        .map_err(unwritable(path))
}

/// Cut the temporary file to `offset` bytes and continue writing there
async fn reposition(file: &mut File, path: &Path, offset: u64) -> DownloadResult<()> {
    file.set_len(offset).await.map_err(unwritable(path))?;
    file.seek(SeekFrom::Start(offset))
        .await
        .map_err(unwritable(path))?;
    Ok(())
}

async fn write_chunk(
    file: &mut File,
    state: &mut TransferState,
    chunk: &[u8],
) -> Result<(), AttemptError> {
    file.write_all(chunk)
        .await
        .map_err(unwritable(&state.partial_path))?;
    state.absorb(chunk);
    Ok(())
}

fn unwritable(path: &Path) -> impl FnOnce(std::io::Error) -> DownloadError + '_ {
    move |source| DownloadError::DestinationUnwritable {
        path: path.to_path_buf(),
        source,
    }
}

fn emit_phase(events: &EventSink, destination: &Path, phase: TransferPhase) {
    events.emit(DownloadEvent::FilePhase {
        destination: destination.to_path_buf(),
        phase,
    });
}

/// Parse `bytes <start>-<end>/<total>` into the start offset and total size
fn parse_content_range(headers: &HeaderMap) -> Option<(u64, Option<u64>)> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let rest = value.trim().strip_prefix("bytes")?.trim();
    let (range, total) = rest.split_once('/')?;
    let total = total.trim().parse::<u64>().ok();
    if range.trim() == "*" {
        return total.map(|t| (t, Some(t)));
    }
    let (start, _) = range.split_once('-')?;
    Some((start.trim().parse().ok()?, total))
}
