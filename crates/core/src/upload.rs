//! Sequential multipart upload
//!
//! Parts are read from the local file and sent one after another through a
//! [`MultipartSession`]. The first failure aborts the session (best-effort)
//! and is returned. Small files, and every zero-byte file, go up in a single
//! `put_object` call instead.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::plan::{Direction, MAX_PARTS, Piece, TransferJob, fit_part_size};
use crate::progress::{
    PieceState, ProgressCallback, ProgressSampler, ProgressTracker, SAMPLE_INTERVAL,
};
use crate::session::MultipartSession;
use crate::traits::{ObjectMetadata, ObjectStore};

/// Parameters of an upload
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub source: PathBuf,
    pub bucket: String,
    pub key: String,
    pub part_size: u64,
    /// Use a multipart session even when the file fits in one part
    pub force_multipart: bool,
    pub metadata: ObjectMetadata,
}

/// Summary of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub total_bytes: u64,
    pub parts: usize,
    pub multipart: bool,
    pub elapsed: Duration,
}

/// Whether a file of `size` bytes goes through a multipart session
pub fn use_multipart(size: u64, part_size: u64, force: bool) -> bool {
    size > 0 && (force || size > part_size)
}

/// Upload `request.source` to `request.bucket`/`request.key`
pub async fn run_upload(
    store: Arc<dyn ObjectStore>,
    request: &UploadRequest,
    progress: Option<ProgressCallback>,
) -> Result<UploadReport> {
    let started = Instant::now();

    let mut file = File::open(&request.source).await.map_err(|e| {
        Error::planning(Error::InvalidPath(format!(
            "cannot open {}: {e}",
            request.source.display()
        )))
    })?;
    let meta = file
        .metadata()
        .await
        .map_err(|e| Error::planning(Error::Io(e)))?;
    if meta.is_dir() {
        return Err(Error::InvalidPath(format!(
            "{} is a directory",
            request.source.display()
        )));
    }
    let total_size = meta.len();

    TransferJob::new(total_size, request.part_size, 1, Direction::Upload)?;
    let part_size = fit_part_size(total_size, request.part_size);
    if part_size != request.part_size {
        debug!(
            requested = request.part_size,
            part_size,
            max_parts = MAX_PARTS,
            "part size raised to fit the part limit"
        );
    }
    let job = TransferJob::new(total_size, part_size, 1, Direction::Upload)?;
    let multipart = use_multipart(total_size, part_size, request.force_multipart);
    let pieces = if multipart {
        job.pieces()
    } else {
        vec![Piece {
            index: 0,
            start: 0,
            end: total_size.saturating_sub(1),
        }]
    };
    let parts = pieces.len();

    info!(
        bucket = %request.bucket,
        key = %request.key,
        total_size,
        parts,
        multipart,
        "starting upload"
    );

    let tracker = Arc::new(ProgressTracker::new(parts, total_size));
    let sampler = progress
        .map(|callback| ProgressSampler::start(Arc::clone(&tracker), callback, SAMPLE_INTERVAL));

    let outcome = if multipart {
        upload_parts(&store, request, &mut file, &pieces, &tracker).await
    } else {
        put_single(&store, request, &mut file, total_size, &tracker).await
    };

    if let Some(sampler) = sampler {
        sampler.finish().await;
    }
    outcome?;

    let report = UploadReport {
        total_bytes: tracker.transferred(),
        parts,
        multipart,
        elapsed: started.elapsed(),
    };
    info!(total_bytes = report.total_bytes, elapsed = ?report.elapsed, "upload complete");
    Ok(report)
}

async fn put_single(
    store: &Arc<dyn ObjectStore>,
    request: &UploadRequest,
    file: &mut File,
    size: u64,
    tracker: &ProgressTracker,
) -> Result<()> {
    let mut data = Vec::with_capacity(size as usize);
    file.read_to_end(&mut data).await?;

    tracker.set_state(0, PieceState::Active);
    match store
        .put_object(&request.bucket, &request.key, data, &request.metadata)
        .await
    {
        Ok(()) => {
            tracker.add_transferred(size);
            tracker.set_state(0, PieceState::Done);
            Ok(())
        }
        Err(e) => {
            tracker.set_state(0, PieceState::Failed);
            Err(e)
        }
    }
}

async fn upload_parts(
    store: &Arc<dyn ObjectStore>,
    request: &UploadRequest,
    file: &mut File,
    pieces: &[Piece],
    tracker: &ProgressTracker,
) -> Result<()> {
    let mut session = MultipartSession::create(
        Arc::clone(store),
        &request.bucket,
        &request.key,
        &request.metadata,
    )
    .await?;

    for piece in pieces {
        tracker.set_state(piece.index, PieceState::Active);
        if let Err(e) = send_part(&mut session, file, *piece).await {
            tracker.set_state(piece.index, PieceState::Failed);
            abort_quietly(&mut session).await;
            return Err(e);
        }
        tracker.add_transferred(piece.len());
        tracker.set_state(piece.index, PieceState::Done);
    }

    if let Err(e) = session.complete().await {
        abort_quietly(&mut session).await;
        return Err(e);
    }
    Ok(())
}

async fn send_part(session: &mut MultipartSession, file: &mut File, piece: Piece) -> Result<()> {
    let write_error = |source| Error::Write {
        index: piece.index,
        offset: piece.start,
        source,
    };

    let mut data = vec![0u8; piece.len() as usize];
    file.seek(SeekFrom::Start(piece.start))
        .await
        .map_err(write_error)?;
    file.read_exact(&mut data).await.map_err(write_error)?;

    session
        .upload_part(piece.part_number()?, data)
        .await
        .map_err(|source| Error::PieceTransfer {
            index: piece.index,
            start: piece.start,
            end: piece.end,
            source: Box::new(source),
        })?;
    Ok(())
}

async fn abort_quietly(session: &mut MultipartSession) {
    if let Err(e) = session.abort().await {
        warn!(upload_id = %session.upload_id(), "ignoring abort failure: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionStage;
    use crate::progress::ProgressSnapshot;
    use crate::traits::MockObjectStore;
    use mockall::Sequence;
    use mockall::predicate::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn source_file(dir: &TempDir, len: usize) -> PathBuf {
        let path = dir.path().join("source.bin");
        let data: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
        std::fs::write(&path, data).unwrap();
        path
    }

    fn request(source: PathBuf, part_size: u64) -> UploadRequest {
        UploadRequest {
            source,
            bucket: "bucket".to_string(),
            key: "dest.bin".to_string(),
            part_size,
            force_multipart: false,
            metadata: ObjectMetadata::default(),
        }
    }

    fn expect_create(store: &mut MockObjectStore, seq: &mut Sequence) {
        store
            .expect_create_multipart()
            .with(eq("bucket"), eq("dest.bin"), always())
            .times(1)
            .in_sequence(seq)
            .returning(|_, _, _| Ok("upload-7".to_string()));
    }

    #[test]
    fn test_use_multipart() {
        assert!(!use_multipart(0, 10, true));
        assert!(!use_multipart(10, 10, false));
        assert!(use_multipart(11, 10, false));
        assert!(use_multipart(5, 10, true));
    }

    #[tokio::test]
    async fn test_parts_sent_in_order_then_completed() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 25);
        let expected = std::fs::read(&source).unwrap();

        let mut store = MockObjectStore::new();
        let mut seq = Sequence::new();
        expect_create(&mut store, &mut seq);
        for (n, range) in [(1, 0..10), (2, 10..20), (3, 20..25)] {
            let body = expected[range].to_vec();
            store
                .expect_upload_part()
                .withf(move |_, _, id, part, data| id == "upload-7" && *part == n && *data == body)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _, _, part, _| Ok(format!("\"tag-{part}\"")));
        }
        store
            .expect_complete_multipart()
            .withf(|_, _, id, parts| {
                id == "upload-7"
                    && parts.iter().map(|p| p.part_number).collect::<Vec<_>>() == vec![1, 2, 3]
                    && parts.iter().all(|p| p.etag == format!("\"tag-{}\"", p.part_number))
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(()));
        store.expect_abort_multipart().never();
        store.expect_put_object().never();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback =
            Arc::new(move |s: ProgressSnapshot| sink.lock().unwrap().push(s));

        let report = run_upload(Arc::new(store), &request(source, 10), Some(callback))
            .await
            .unwrap();

        assert_eq!(report.total_bytes, 25);
        assert_eq!(report.parts, 3);
        assert!(report.multipart);
        let seen = seen.lock().unwrap();
        let last = seen.last().unwrap();
        assert_eq!(last.histogram.done, 3);
        assert_eq!(last.transferred_bytes, 25);
    }

    #[tokio::test]
    async fn test_part_count_capped_at_limit() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 2 * MAX_PARTS as usize);

        let mut store = MockObjectStore::new();
        let mut seq = Sequence::new();
        expect_create(&mut store, &mut seq);
        store
            .expect_upload_part()
            .times(MAX_PARTS as usize)
            .in_sequence(&mut seq)
            .returning(|_, _, _, part, _| Ok(format!("\"tag-{part}\"")));
        store
            .expect_complete_multipart()
            .withf(|_, _, _, parts| parts.len() == MAX_PARTS as usize)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(()));

        let report = run_upload(Arc::new(store), &request(source, 1), None)
            .await
            .unwrap();
        assert_eq!(report.parts, MAX_PARTS as usize);
        assert_eq!(report.total_bytes, 2 * MAX_PARTS);
    }

    #[tokio::test]
    async fn test_part_failure_aborts_once_without_completing() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 40);

        let mut store = MockObjectStore::new();
        let mut seq = Sequence::new();
        expect_create(&mut store, &mut seq);
        store
            .expect_upload_part()
            .with(always(), always(), always(), eq(1), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _, _| Ok("\"tag-1\"".to_string()));
        store
            .expect_upload_part()
            .with(always(), always(), always(), eq(2), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _, _| Err(Error::Network("connection reset".into())));
        store
            .expect_abort_multipart()
            .with(eq("bucket"), eq("dest.bin"), eq("upload-7"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        store.expect_complete_multipart().never();

        let err = run_upload(Arc::new(store), &request(source, 10), None)
            .await
            .unwrap_err();

        match &err {
            Error::PieceTransfer { index, start, end, .. } => {
                assert_eq!((*index, *start, *end), (1, 10, 19));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_abort_failure_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 15);

        let mut store = MockObjectStore::new();
        let mut seq = Sequence::new();
        expect_create(&mut store, &mut seq);
        store
            .expect_upload_part()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _, _| Err(Error::Auth("AccessDenied".into())));
        store
            .expect_abort_multipart()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(Error::Network("abort timed out".into())));
        store.expect_complete_multipart().never();

        let err = run_upload(Arc::new(store), &request(source, 10), None)
            .await
            .unwrap_err();

        // The part error surfaces, not the abort error
        assert!(matches!(err.root(), Error::Auth(_)));
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn test_completion_failure_aborts() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 12);

        let mut store = MockObjectStore::new();
        let mut seq = Sequence::new();
        expect_create(&mut store, &mut seq);
        store
            .expect_upload_part()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _, _, part, _| Ok(format!("\"tag-{part}\"")));
        store
            .expect_complete_multipart()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Err(Error::General("InvalidPart".into())));
        store
            .expect_abort_multipart()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        let err = run_upload(Arc::new(store), &request(source, 10), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Session {
                stage: SessionStage::Complete,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_small_file_uses_put_object() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 8);
        let expected = std::fs::read(&source).unwrap();

        let mut store = MockObjectStore::new();
        store
            .expect_put_object()
            .withf(move |bucket, key, data, meta| {
                bucket == "bucket"
                    && key == "dest.bin"
                    && *data == expected
                    && meta.content_type.as_deref() == Some("text/plain")
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        store.expect_create_multipart().never();

        let mut req = request(source, 10);
        req.metadata.content_type = Some("text/plain".to_string());
        let report = run_upload(Arc::new(store), &req, None).await.unwrap();

        assert!(!report.multipart);
        assert_eq!(report.parts, 1);
        assert_eq!(report.total_bytes, 8);
    }

    #[tokio::test]
    async fn test_empty_file_uses_put_object_even_when_forced() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir, 0);

        let mut store = MockObjectStore::new();
        store
            .expect_put_object()
            .withf(|_, _, data, _| data.is_empty())
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        store.expect_create_multipart().never();

        let mut req = request(source, 10);
        req.force_multipart = true;
        let report = run_upload(Arc::new(store), &req, None).await.unwrap();
        assert_eq!(report.total_bytes, 0);
        assert!(!report.multipart);
    }

    #[tokio::test]
    async fn test_missing_source_is_planning_error() {
        let dir = TempDir::new().unwrap();
        let store = MockObjectStore::new();

        let err = run_upload(
            Arc::new(store),
            &request(dir.path().join("nope.bin"), 10),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Planning(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_directory_rejected() {
        let dir = TempDir::new().unwrap();
        let store = MockObjectStore::new();

        let err = run_upload(Arc::new(store), &request(dir.path().to_path_buf(), 10), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));
    }
}
