//! Upload pipeline behaviour against an in-process transport fake:
//! chunk framing, offset ordering, back-pressure yields, mutual
//! exclusion and fault scoping.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use deskstream_client::dashboard::{DashboardUpdate, UploadStatus, NO_FILE};
use deskstream_client::upload::{UploadPipeline, UploadTransport, BACKPRESSURE_PAUSE};
use deskstream_client::{Error, Result};
use deskstream_core::protocol::{decode_frame, AuxFrame, ControlMessage, FILE_CHUNK_PREFIX};

/// Everything the pipeline did, in order.
#[derive(Debug, Clone, PartialEq)]
enum Action {
    Control(ControlMessage),
    Frame(Vec<u8>),
    Drain,
    Close,
}

#[derive(Default)]
struct FakeTransport {
    busy: AtomicBool,
    holds_channel: AtomicBool,
    fail_after_frames: Option<u32>,
    frames_sent: AtomicU32,
    threshold_hits: AtomicU32,
    threshold_budget: AtomicU32,
    actions: Mutex<Vec<Action>>,
}

impl FakeTransport {
    fn log(&self, action: Action) {
        self.actions.lock().unwrap().push(action);
    }

    fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap().clone()
    }

    fn frames(&self) -> Vec<Vec<u8>> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Frame(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }

    fn controls(&self) -> Vec<ControlMessage> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Control(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl UploadTransport for FakeTransport {
    async fn create_aux_channel(&self) -> Result<bool> {
        if self.busy.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(!self.holds_channel.swap(true, Ordering::SeqCst))
    }

    async fn wait_aux_open(&self) -> Result<()> {
        Ok(())
    }

    async fn close_aux(&self) {
        self.holds_channel.store(false, Ordering::SeqCst);
        self.log(Action::Close);
    }

    async fn send_control(&self, message: &ControlMessage) {
        self.log(Action::Control(message.clone()));
    }

    async fn send_aux(&self, frame: Bytes) -> Result<()> {
        let sent = self.frames_sent.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after_frames {
            if sent >= limit {
                return Err(Error::DataChannel("simulated channel fault".into()));
            }
        }
        self.log(Action::Frame(frame.to_vec()));
        Ok(())
    }

    async fn aux_near_threshold(&self) -> bool {
        if self.threshold_budget.load(Ordering::SeqCst) > 0 {
            self.threshold_budget.fetch_sub(1, Ordering::SeqCst);
            self.threshold_hits.fetch_add(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    async fn drain_aux(&self) {
        self.log(Action::Drain);
    }
}

fn pipeline(
    transport: Arc<FakeTransport>,
    chunk_size: usize,
) -> (
    UploadPipeline<FakeTransport>,
    mpsc::UnboundedReceiver<DashboardUpdate>,
) {
    let (update_tx, update_rx) = mpsc::unbounded_channel();
    (
        UploadPipeline::new(transport, update_tx, chunk_size),
        update_rx,
    )
}

async fn temp_file(name: &str, contents: &[u8]) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    tokio::fs::write(&path, contents).await.unwrap();
    (dir, path)
}

#[tokio::test]
async fn test_small_chunk_framing_and_offsets() {
    // 200 bytes at a 64-byte chunk: three full frames plus the remainder,
    // each carrying one prefix byte, offsets strictly ascending.
    let payload: Vec<u8> = (0..200u8).collect();
    let (_dir, path) = temp_file("a.txt", &payload).await;

    let transport = Arc::new(FakeTransport::default());
    let (pipeline, _updates) = pipeline(Arc::clone(&transport), 64);
    pipeline.upload(vec![path]).await.unwrap();

    let frames = transport.frames();
    let lengths: Vec<usize> = frames.iter().map(Vec::len).collect();
    assert_eq!(lengths, vec![65, 65, 65, 9]);

    // Reassemble: prefix bytes stripped, payload bytes in offset order.
    let mut reassembled = Vec::new();
    for frame in &frames {
        assert_eq!(frame[0], FILE_CHUNK_PREFIX);
        match decode_frame(frame).unwrap() {
            AuxFrame::FileChunk(chunk) => reassembled.extend_from_slice(&chunk),
        }
    }
    assert_eq!(reassembled, payload);

    let controls = transport.controls();
    assert_eq!(
        controls.first().unwrap(),
        &ControlMessage::FileUploadStart {
            path: "a.txt".into(),
            size: 200
        }
    );
    assert_eq!(
        controls.last().unwrap(),
        &ControlMessage::FileUploadEnd { path: "a.txt".into() }
    );

    // Drain happens after the final chunk and before the END marker.
    let actions = transport.actions();
    let drain_at = actions.iter().position(|a| a == &Action::Drain).unwrap();
    let last_frame_at = actions
        .iter()
        .rposition(|a| matches!(a, Action::Frame(_)))
        .unwrap();
    assert!(drain_at > last_frame_at);
}

#[tokio::test]
async fn test_zero_length_file_sends_start_then_end() {
    let (_dir, path) = temp_file("empty.bin", b"").await;

    let transport = Arc::new(FakeTransport::default());
    let (pipeline, _updates) = pipeline(Arc::clone(&transport), 64);
    pipeline.upload(vec![path]).await.unwrap();

    assert!(transport.frames().is_empty());
    assert_eq!(
        transport.controls(),
        vec![
            ControlMessage::FileUploadStart {
                path: "empty.bin".into(),
                size: 0
            },
            ControlMessage::FileUploadEnd {
                path: "empty.bin".into()
            },
        ]
    );
}

#[tokio::test]
async fn test_second_batch_rejected_while_first_holds_channel() {
    let (_dir, path) = temp_file("b.txt", b"data").await;

    let transport = Arc::new(FakeTransport {
        busy: AtomicBool::new(true),
        ..Default::default()
    });
    let (pipeline, mut updates) = pipeline(Arc::clone(&transport), 64);

    let err = pipeline.upload(vec![path]).await.unwrap_err();
    assert!(matches!(err, Error::UploadBusy));

    // The running batch is untouched: no control traffic, no close.
    assert!(transport.actions().is_empty());

    match updates.try_recv().unwrap() {
        DashboardUpdate::FileUpload(update) => {
            assert_eq!(update.status, UploadStatus::Warning);
            assert_eq!(update.file_name, NO_FILE);
        }
        other => panic!("unexpected update {other:?}"),
    }
}

#[tokio::test]
async fn test_file_end_precedes_next_file_start() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("batch");
    tokio::fs::create_dir_all(&base).await.unwrap();
    tokio::fs::write(base.join("one.txt"), b"11").await.unwrap();
    tokio::fs::write(base.join("two.txt"), b"22").await.unwrap();

    let transport = Arc::new(FakeTransport::default());
    let (pipeline, _updates) = pipeline(Arc::clone(&transport), 64);
    pipeline.upload(vec![base]).await.unwrap();

    let markers: Vec<String> = transport
        .controls()
        .into_iter()
        .map(|m| m.encode())
        .collect();
    assert_eq!(
        markers,
        vec![
            "FILE_UPLOAD_START:batch/one.txt:2",
            "FILE_UPLOAD_END:batch/one.txt",
            "FILE_UPLOAD_START:batch/two.txt:2",
            "FILE_UPLOAD_END:batch/two.txt",
        ]
    );
}

#[tokio::test]
async fn test_missing_entry_continues_with_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.txt");
    tokio::fs::write(&good, b"ok").await.unwrap();

    let transport = Arc::new(FakeTransport::default());
    let (pipeline, _updates) = pipeline(Arc::clone(&transport), 64);
    pipeline
        .upload(vec![good, PathBuf::from("/definitely/not/here.txt")])
        .await
        .unwrap();

    // The missing path is reported per-file; the sibling still transfers.
    let controls = transport.controls();
    assert!(controls
        .iter()
        .any(|m| matches!(m, ControlMessage::FileUploadError { path, .. } if path == "here.txt")));
    assert!(controls
        .iter()
        .any(|m| matches!(m, ControlMessage::FileUploadEnd { path } if path == "good.txt")));
    assert_eq!(transport.frames().len(), 1);
}

#[tokio::test]
async fn test_channel_fault_aborts_batch() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("batch");
    tokio::fs::create_dir_all(&base).await.unwrap();
    tokio::fs::write(base.join("one.txt"), vec![0u8; 100]).await.unwrap();
    tokio::fs::write(base.join("two.txt"), vec![0u8; 100]).await.unwrap();

    let transport = Arc::new(FakeTransport {
        fail_after_frames: Some(1),
        ..Default::default()
    });
    let (pipeline, _updates) = pipeline(Arc::clone(&transport), 64);

    let err = pipeline.upload(vec![base]).await.unwrap_err();
    assert!(matches!(err, Error::DataChannel(_)));

    // The second sibling never started.
    let starts = transport
        .controls()
        .into_iter()
        .filter(|m| matches!(m, ControlMessage::FileUploadStart { .. }))
        .count();
    assert_eq!(starts, 1);
    let errors: Vec<ControlMessage> = transport
        .controls()
        .into_iter()
        .filter(|m| matches!(m, ControlMessage::FileUploadError { .. }))
        .collect();
    assert_eq!(errors.len(), 1);

    // The aux channel is released even on failure.
    assert!(transport.actions().contains(&Action::Close));
}

#[tokio::test(start_paused = true)]
async fn test_backpressure_yields_between_chunks() {
    let payload = vec![7u8; 200];
    let (_dir, path) = temp_file("slow.bin", &payload).await;

    let transport = Arc::new(FakeTransport {
        threshold_budget: AtomicU32::new(2),
        ..Default::default()
    });
    let (pipeline, _updates) = pipeline(Arc::clone(&transport), 64);

    let started = tokio::time::Instant::now();
    pipeline.upload(vec![path]).await.unwrap();

    // Two threshold hits mean at least two back-pressure pauses elapsed.
    assert_eq!(transport.threshold_hits.load(Ordering::SeqCst), 2);
    assert!(started.elapsed() >= 2 * BACKPRESSURE_PAUSE);
    assert_eq!(transport.frames().len(), 4);
}
