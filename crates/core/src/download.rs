//! Parallel chunked download
//!
//! Looks up the object size, pre-sizes the destination, then lets a
//! [`WorkerPool`] fetch every chunk with a ranged GET and write it at its
//! offset. Chunk failures do not stop sibling workers unless the
//! [`FailurePolicy`] says so; the first recorded error is returned after
//! all workers have finished. The partially written destination is left
//! in place.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::plan::{Direction, Piece, TransferJob};
use crate::pool::{FailurePolicy, PieceWorker, WorkerPool};
use crate::progress::{ProgressCallback, ProgressSampler, ProgressTracker, SAMPLE_INTERVAL};
use crate::traits::ObjectStore;
use crate::writer::DestinationWriter;

/// Parameters of a download
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub bucket: String,
    pub key: String,
    pub destination: PathBuf,
    pub chunk_size: u64,
    pub concurrency: usize,
    pub failure_policy: FailurePolicy,
}

/// Summary of a successful download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub total_bytes: u64,
    pub pieces: usize,
    pub elapsed: Duration,
}

struct RangeFetcher {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
    writer: DestinationWriter,
}

#[async_trait]
impl PieceWorker for RangeFetcher {
    async fn transfer(&self, piece: Piece) -> Result<u64> {
        let transfer_error = |source: Error| Error::PieceTransfer {
            index: piece.index,
            start: piece.start,
            end: piece.end,
            source: Box::new(source),
        };

        let data = self
            .store
            .range_get(&self.bucket, &self.key, piece.start, piece.end)
            .await
            .map_err(transfer_error)?;

        if data.len() as u64 != piece.len() {
            return Err(transfer_error(Error::Network(format!(
                "expected {} bytes, received {}",
                piece.len(),
                data.len()
            ))));
        }

        self.writer
            .write_at(piece.start, data)
            .await
            .map_err(|source| Error::Write {
                index: piece.index,
                offset: piece.start,
                source,
            })?;

        Ok(piece.len())
    }
}

/// Download one object into `request.destination`
///
/// `progress` is invoked every [`SAMPLE_INTERVAL`] and once more after the
/// last worker exits.
pub async fn run_download(
    store: Arc<dyn ObjectStore>,
    request: &DownloadRequest,
    progress: Option<ProgressCallback>,
) -> Result<DownloadReport> {
    let started = Instant::now();

    // Validate parameters before touching the network
    TransferJob::new(0, request.chunk_size, request.concurrency, Direction::Download)?;

    let total_size = store
        .head_size(&request.bucket, &request.key)
        .await
        .map_err(Error::planning)?;
    let job = TransferJob::new(
        total_size,
        request.chunk_size,
        request.concurrency,
        Direction::Download,
    )?;

    let writer = DestinationWriter::create(&request.destination, total_size)
        .await
        .map_err(|e| Error::planning(Error::Io(e)))?;

    let pieces = job.pieces();
    let chunks = pieces.len();
    info!(
        bucket = %request.bucket,
        key = %request.key,
        total_size,
        chunks,
        concurrency = job.concurrency,
        "starting download"
    );

    let tracker = Arc::new(ProgressTracker::new(chunks, total_size));
    let sampler = progress
        .map(|callback| ProgressSampler::start(Arc::clone(&tracker), callback, SAMPLE_INTERVAL));

    let fetcher = Arc::new(RangeFetcher {
        store,
        bucket: request.bucket.clone(),
        key: request.key.clone(),
        writer: writer.clone(),
    });
    let failures = WorkerPool::new(job.concurrency, request.failure_policy)
        .run(pieces, Arc::clone(&tracker), fetcher)
        .await;

    if let Some(sampler) = sampler {
        sampler.finish().await;
    }

    if let Some(first) = failures.into_iter().next() {
        let histogram = tracker.histogram();
        warn!(
            failed = histogram.failed,
            done = histogram.done,
            "download incomplete, destination left partially written"
        );
        return Err(first.error);
    }

    writer.sync().await.map_err(Error::Io)?;

    let report = DownloadReport {
        total_bytes: tracker.transferred(),
        pieces: chunks,
        elapsed: started.elapsed(),
    };
    info!(total_bytes = report.total_bytes, elapsed = ?report.elapsed, "download complete");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressSnapshot;
    use crate::traits::{CompletedPart, ObjectMetadata};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// In-memory object with fault injection and an in-flight gauge
    struct MemoryStore {
        data: Vec<u8>,
        fail_starts: HashSet<u64>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: Mutex<Vec<(u64, u64)>>,
    }

    impl MemoryStore {
        fn new(data: Vec<u8>) -> Self {
            Self {
                data,
                fail_starts: HashSet::new(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_at(mut self, start: u64) -> Self {
            self.fail_starts.insert(start);
            self
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn head_size(&self, _bucket: &str, key: &str) -> Result<u64> {
            if key == "missing" {
                return Err(Error::NotFound(key.to_string()));
            }
            Ok(self.data.len() as u64)
        }

        async fn range_get(
            &self,
            _bucket: &str,
            _key: &str,
            start: u64,
            end: u64,
        ) -> Result<Vec<u8>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.lock().unwrap().push((start, end));
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_starts.contains(&start) {
                return Err(Error::Network(format!("injected failure at {start}")));
            }
            Ok(self.data[start as usize..=end as usize].to_vec())
        }

        async fn create_multipart(&self, _: &str, _: &str, _: &ObjectMetadata) -> Result<String> {
            unimplemented!("download store")
        }

        async fn upload_part(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: i32,
            _: Vec<u8>,
        ) -> Result<String> {
            unimplemented!("download store")
        }

        async fn complete_multipart(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: &[CompletedPart],
        ) -> Result<()> {
            unimplemented!("download store")
        }

        async fn abort_multipart(&self, _: &str, _: &str, _: &str) -> Result<()> {
            unimplemented!("download store")
        }

        async fn put_object(&self, _: &str, _: &str, _: Vec<u8>, _: &ObjectMetadata) -> Result<()> {
            unimplemented!("download store")
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn request(dir: &TempDir, name: &str, chunk_size: u64, concurrency: usize) -> DownloadRequest {
        DownloadRequest {
            bucket: "bucket".to_string(),
            key: "object".to_string(),
            destination: dir.path().join(name),
            chunk_size,
            concurrency,
            failure_policy: FailurePolicy::Drain,
        }
    }

    fn recording_callback() -> (ProgressCallback, Arc<Mutex<Vec<ProgressSnapshot>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback =
            Arc::new(move |s: ProgressSnapshot| sink.lock().unwrap().push(s));
        (callback, seen)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_successful_download_matches_source() {
        let dir = TempDir::new().unwrap();
        let data = pattern(10_000);
        let store = Arc::new(MemoryStore::new(data.clone()));
        let req = request(&dir, "out.bin", 1024, 4);
        let (callback, seen) = recording_callback();

        let report = run_download(store.clone(), &req, Some(callback)).await.unwrap();

        assert_eq!(report.total_bytes, 10_000);
        assert_eq!(report.pieces, 10);
        assert_eq!(std::fs::read(&req.destination).unwrap(), data);
        assert!(store.peak.load(Ordering::SeqCst) <= 4);

        let mut calls = store.calls.lock().unwrap().clone();
        calls.sort_unstable();
        assert_eq!(calls.len(), 10);
        assert_eq!(calls[9], (9216, 9999));

        let seen = seen.lock().unwrap();
        let last = seen.last().unwrap();
        assert_eq!(last.transferred_bytes, last.total_bytes);
        assert_eq!(last.histogram.done, 10);
        assert_eq!(last.percent, 100.0);
        assert!(seen.windows(2).all(|w| w[0].transferred_bytes <= w[1].transferred_bytes));
        assert!(seen.iter().all(|s| s.transferred_bytes <= s.total_bytes));
        assert!(seen.iter().all(|s| s.histogram.active <= 4));
    }

    #[tokio::test]
    async fn test_result_independent_of_concurrency() {
        let dir = TempDir::new().unwrap();
        let data = pattern(7_777);

        let serial = request(&dir, "serial.bin", 500, 1);
        let parallel = request(&dir, "parallel.bin", 500, 8);
        run_download(Arc::new(MemoryStore::new(data.clone())), &serial, None)
            .await
            .unwrap();
        run_download(Arc::new(MemoryStore::new(data.clone())), &parallel, None)
            .await
            .unwrap();

        let serial_bytes = std::fs::read(&serial.destination).unwrap();
        assert_eq!(serial_bytes, std::fs::read(&parallel.destination).unwrap());
        assert_eq!(serial_bytes, data);
    }

    #[tokio::test]
    async fn test_single_chunk_failure_drains_siblings() {
        let dir = TempDir::new().unwrap();
        let data = pattern(4_000);
        let store = Arc::new(MemoryStore::new(data.clone()).failing_at(1_000));
        let req = request(&dir, "out.bin", 500, 3);
        let (callback, seen) = recording_callback();

        let err = run_download(store.clone(), &req, Some(callback)).await.unwrap_err();

        match &err {
            Error::PieceTransfer { index, start, end, .. } => {
                assert_eq!(*index, 2);
                assert_eq!((*start, *end), (1_000, 1_499));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.exit_code(), 3);

        // Every chunk was still requested
        assert_eq!(store.calls.lock().unwrap().len(), 8);

        let last = seen.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.histogram.failed, 1);
        assert_eq!(last.histogram.done, 7);
        assert_eq!(last.transferred_bytes, 3_500);

        // Destination keeps its full size with the failed range zeroed
        let written = std::fs::read(&req.destination).unwrap();
        assert_eq!(written.len(), 4_000);
        assert!(written[1_000..1_500].iter().all(|&b| b == 0));
        assert_eq!(&written[..1_000], &data[..1_000]);
        assert_eq!(&written[1_500..], &data[1_500..]);
    }

    #[tokio::test]
    async fn test_abort_all_policy_reports_first_error() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new(pattern(100_000)).failing_at(0));
        let mut req = request(&dir, "out.bin", 100, 2);
        req.failure_policy = FailurePolicy::AbortAll;

        let err = run_download(store.clone(), &req, None).await.unwrap_err();
        assert!(matches!(err, Error::PieceTransfer { index: 0, .. }));
        assert!(store.calls.lock().unwrap().len() < 1_000);
    }

    #[tokio::test]
    async fn test_head_failure_is_planning_error() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new(pattern(10)));
        let mut req = request(&dir, "out.bin", 4, 2);
        req.key = "missing".to_string();

        let err = run_download(store.clone(), &req, None).await.unwrap_err();
        assert!(matches!(err, Error::Planning(_)));
        assert_eq!(err.exit_code(), 5);
        assert!(store.calls.lock().unwrap().is_empty());
        assert!(!req.destination.exists());
    }

    #[tokio::test]
    async fn test_zero_length_object() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new(Vec::new()));
        let req = request(&dir, "empty.bin", 1024, 4);

        let report = run_download(store.clone(), &req, None).await.unwrap();
        assert_eq!(report.total_bytes, 0);
        assert_eq!(report.pieces, 0);
        assert_eq!(std::fs::metadata(&req.destination).unwrap().len(), 0);
        assert!(store.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_parameters_rejected_before_head() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new(pattern(10)));

        let err = run_download(store.clone(), &request(&dir, "a", 0, 1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidJob(_)));

        let err = run_download(store, &request(&dir, "b", 10, 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidJob(_)));
    }
}
