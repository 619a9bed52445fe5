//! Chunked, back-pressured file upload pipeline
//!
//! One batch at a time owns the aux channel: the first step of every
//! batch is `create_aux_channel()`, and a `false` there surfaces as a
//! user-visible warning without disturbing the running batch. Within a
//! batch files transfer sequentially; within a file, chunks go out at
//! strictly ascending offsets and the sender yields whenever the channel
//! buffer crosses its high-water mark.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use deskstream_core::protocol::{encode_file_chunk, ControlMessage};

use crate::dashboard::{DashboardUpdate, FileUploadUpdate};
use crate::error::Error;
use crate::transport::PeerTransport;
use crate::Result;

/// Pause inserted after a chunk when the aux buffer is above the
/// high-water mark
pub const BACKPRESSURE_PAUSE: Duration = Duration::from_millis(50);

/// Transport surface the pipeline drives; implemented by
/// [`PeerTransport`] and by in-process fakes in tests.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Allocate the aux channel; `false` means another batch owns it.
    async fn create_aux_channel(&self) -> Result<bool>;

    /// Resolve when the aux channel is open.
    async fn wait_aux_open(&self) -> Result<()>;

    /// Close and release the aux channel.
    async fn close_aux(&self);

    /// Send a control op on the primary channel.
    async fn send_control(&self, message: &ControlMessage);

    /// Send one framed chunk on the aux channel.
    async fn send_aux(&self, frame: Bytes) -> Result<()>;

    /// Whether the aux buffer is at or above the high-water mark.
    async fn aux_near_threshold(&self) -> bool;

    /// Wait for the aux buffer to drain to the low-water mark.
    async fn drain_aux(&self);
}

#[async_trait]
impl UploadTransport for PeerTransport {
    async fn create_aux_channel(&self) -> Result<bool> {
        PeerTransport::create_aux_channel(self).await
    }

    async fn wait_aux_open(&self) -> Result<()> {
        PeerTransport::wait_aux_open(self).await
    }

    async fn close_aux(&self) {
        PeerTransport::close_aux(self).await;
    }

    async fn send_control(&self, message: &ControlMessage) {
        PeerTransport::send_control(self, message).await;
    }

    async fn send_aux(&self, frame: Bytes) -> Result<()> {
        PeerTransport::send_aux(self, frame).await
    }

    async fn aux_near_threshold(&self) -> bool {
        PeerTransport::aux_near_threshold(self).await
    }

    async fn drain_aux(&self) {
        PeerTransport::drain_aux(self).await;
    }
}

/// One file scheduled for transfer
#[derive(Debug, Clone, PartialEq)]
pub struct UploadItem {
    pub local_path: PathBuf,
    /// Server-side path: `/`-separated, no leading separator, no colons
    pub remote_path: String,
    pub size: u64,
}

/// Sequential batch uploader
pub struct UploadPipeline<T: UploadTransport + ?Sized> {
    transport: std::sync::Arc<T>,
    updates: mpsc::UnboundedSender<DashboardUpdate>,
    chunk_size: usize,
}

impl<T: UploadTransport + ?Sized> UploadPipeline<T> {
    pub fn new(
        transport: std::sync::Arc<T>,
        updates: mpsc::UnboundedSender<DashboardUpdate>,
        chunk_size: usize,
    ) -> Self {
        Self {
            transport,
            updates,
            chunk_size,
        }
    }

    /// Upload the given files and directory trees.
    ///
    /// Rejected with [`Error::UploadBusy`] (and a dashboard warning) when
    /// another batch holds the aux channel; the running batch is left
    /// untouched.
    pub async fn upload(&self, paths: Vec<PathBuf>) -> Result<()> {
        if !self.transport.create_aux_channel().await? {
            warn!("upload rejected, aux channel already in use");
            let _ = self
                .updates
                .send(DashboardUpdate::FileUpload(FileUploadUpdate::busy_warning()));
            return Err(Error::UploadBusy);
        }

        let result = self.run_batch(paths).await;
        self.transport.close_aux().await;
        result
    }

    async fn run_batch(&self, paths: Vec<PathBuf>) -> Result<()> {
        self.transport.wait_aux_open().await?;
        let collected = collect_items(&paths).await;
        info!(files = collected.items.len(), "upload batch starting");

        for (path, reason) in &collected.failures {
            self.report_path_failure(path, reason).await;
        }
        for item in &collected.items {
            match self.send_file(item).await {
                Ok(()) => {}
                Err(Error::DataChannel(reason)) => {
                    // Channel-wide fault: report this file and abort the
                    // remainder of the batch.
                    self.report_failure(item, &reason).await;
                    return Err(Error::DataChannel(reason));
                }
                Err(err) => {
                    // Per-file fault: report it and continue with the
                    // next sibling.
                    self.report_failure(item, &err.to_string()).await;
                }
            }
        }
        info!("upload batch complete");
        Ok(())
    }

    async fn send_file(&self, item: &UploadItem) -> Result<()> {
        let _ = self.updates.send(DashboardUpdate::FileUpload(
            FileUploadUpdate::start(&item.remote_path, item.size),
        ));
        self.transport
            .send_control(&ControlMessage::FileUploadStart {
                path: item.remote_path.clone(),
                size: item.size,
            })
            .await;

        let mut file = tokio::fs::File::open(&item.local_path)
            .await
            .map_err(|e| per_file(item, format!("open failed: {e}")))?;
        let mut buffer = vec![0u8; self.chunk_size];
        let mut offset: u64 = 0;

        loop {
            let read = file
                .read(&mut buffer)
                .await
                .map_err(|e| per_file(item, format!("read at offset {offset} failed: {e}")))?;
            if read == 0 {
                break;
            }
            let frame = encode_file_chunk(&buffer[..read])?;
            self.transport.send_aux(frame).await?;
            offset += read as u64;

            let percent = if item.size == 0 {
                100
            } else {
                ((offset * 100) / item.size).min(100) as u8
            };
            let _ = self.updates.send(DashboardUpdate::FileUpload(
                FileUploadUpdate::progress(&item.remote_path, item.size, percent),
            ));

            if self.transport.aux_near_threshold().await {
                debug!(offset, "aux buffer above high-water mark, yielding");
                tokio::time::sleep(BACKPRESSURE_PAUSE).await;
            }
        }

        self.transport.drain_aux().await;
        self.transport
            .send_control(&ControlMessage::FileUploadEnd {
                path: item.remote_path.clone(),
            })
            .await;
        let _ = self.updates.send(DashboardUpdate::FileUpload(
            FileUploadUpdate::end(&item.remote_path, item.size),
        ));
        debug!(path = %item.remote_path, bytes = offset, "file uploaded");
        Ok(())
    }

    async fn report_failure(&self, item: &UploadItem, reason: &str) {
        self.report_path_failure(&item.remote_path, reason).await;
    }

    async fn report_path_failure(&self, path: &str, reason: &str) {
        warn!(path, reason, "file upload failed");
        self.transport
            .send_control(&ControlMessage::FileUploadError {
                path: path.to_string(),
                reason: reason.to_string(),
            })
            .await;
        let _ = self.updates.send(DashboardUpdate::FileUpload(
            FileUploadUpdate::error(path, reason),
        ));
    }
}

fn per_file(item: &UploadItem, reason: String) -> Error {
    Error::Upload {
        path: item.remote_path.clone(),
        reason,
    }
}

/// Server-side path form: `/` separators, no leading separator, colons
/// replaced (they delimit the upload control ops).
fn sanitize_remote(path: &str) -> String {
    path.replace('\\', "/")
        .replace(':', "_")
        .trim_start_matches('/')
        .to_string()
}

/// Result of expanding the selected paths: the transferable files plus
/// per-path failures (missing entries, unreadable directories)
#[derive(Debug, Default)]
pub struct CollectOutcome {
    pub items: Vec<UploadItem>,
    /// `(remote path, reason)` for entries that could not be collected
    pub failures: Vec<(String, String)>,
}

/// Expand files and directory trees into a flat, ordered upload list.
///
/// Directories are walked depth-first with entries in name order; empty
/// directories contribute nothing. Unreadable entries land in
/// [`CollectOutcome::failures`] instead of failing the batch.
pub async fn collect_items(roots: &[PathBuf]) -> CollectOutcome {
    let mut outcome = CollectOutcome::default();
    for root in roots {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let remote = sanitize_remote(&name);
        match tokio::fs::metadata(root).await {
            Ok(metadata) if metadata.is_dir() => {
                walk_tree(root.clone(), remote, &mut outcome).await;
            }
            Ok(metadata) => outcome.items.push(UploadItem {
                local_path: root.clone(),
                remote_path: remote,
                size: metadata.len(),
            }),
            Err(e) => outcome.failures.push((remote, format!("stat failed: {e}"))),
        }
    }
    outcome
}

// Iterative depth-first walk; a directory's files come before its
// subtrees and each subtree stays contiguous.
async fn walk_tree(dir: PathBuf, prefix: String, outcome: &mut CollectOutcome) {
    let mut stack = vec![(dir, prefix)];
    while let Some((dir, prefix)) = stack.pop() {
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) => {
                outcome
                    .failures
                    .push((prefix, format!("read_dir failed: {e}")));
                continue;
            }
        };
        let mut entries = Vec::new();
        loop {
            match reader.next_entry().await {
                Ok(Some(entry)) => entries.push(entry.path()),
                Ok(None) => break,
                Err(e) => {
                    outcome
                        .failures
                        .push((prefix.clone(), format!("read_dir failed: {e}")));
                    break;
                }
            }
        }
        entries.sort();

        let mut subdirs = Vec::new();
        for path in entries {
            let name = match path.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => continue,
            };
            let remote = format!("{prefix}/{}", sanitize_remote(&name));
            match tokio::fs::metadata(&path).await {
                Ok(metadata) if metadata.is_dir() => subdirs.push((path, remote)),
                Ok(metadata) => outcome.items.push(UploadItem {
                    local_path: path,
                    remote_path: remote,
                    size: metadata.len(),
                }),
                Err(e) => outcome
                    .failures
                    .push((remote, format!("stat failed: {e}"))),
            }
        }
        // LIFO stack: push in reverse so subtrees pop in name order.
        for entry in subdirs.into_iter().rev() {
            stack.push(entry);
        }
    }
}
