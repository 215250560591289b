//! Client against a real in-process server: interrupted upload, resume,
//! merge and the already-merged short circuit.

use std::path::Path;
use std::sync::Arc;

use chunkdrop_client::{
    ByteProgress, ChunkUpload, ClientConfig, HttpTransport, TransportFuture, UploadCoordinator,
    UploadError, UploadEvent, UploadTransport,
};
use chunkdrop_protocol::{FileHash, MergeRequest, MergeResponse, VerifyRequest, VerifyResponse};
use chunkdrop_server::{ServerConfig, UploadServer};
use md5::{Digest, Md5};
use tokio::net::TcpListener;

const MIB: usize = 1024 * 1024;

/// Delegates to HTTP but fails every chunk at or above `fail_from`,
/// simulating a client that died mid-upload.
struct Interrupted {
    inner: HttpTransport,
    fail_from: u64,
}

impl UploadTransport for Interrupted {
    fn verify(&self, request: VerifyRequest) -> TransportFuture<'_, VerifyResponse> {
        self.inner.verify(request)
    }

    fn upload_chunk(&self, chunk: ChunkUpload, progress: ByteProgress) -> TransportFuture<'_, ()> {
        if chunk.key.index >= self.fail_from {
            return Box::pin(async {
                Err(UploadError::Server {
                    status: 503,
                    body: "connection lost".into(),
                })
            });
        }
        self.inner.upload_chunk(chunk, progress)
    }

    fn merge(&self, request: MergeRequest) -> TransportFuture<'_, MergeResponse> {
        self.inner.merge(request)
    }
}

async fn start_server(upload_dir: &Path) -> (Arc<UploadServer>, String) {
    let server = UploadServer::new(ServerConfig {
        upload_dir: upload_dir.to_path_buf(),
        ..ServerConfig::default()
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());

    let serving = Arc::clone(&server);
    tokio::spawn(async move { serving.serve(listener).await });
    (server, endpoint)
}

fn config(endpoint: &str) -> ClientConfig {
    ClientConfig {
        endpoint: endpoint.to_string(),
        chunk_size: MIB as u64,
        concurrency: 3,
    }
}

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 ^ (i >> 16) as u8).collect()
}

#[tokio::test]
async fn interrupted_upload_resumes_and_merges() {
    let uploads = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();
    let (server, endpoint) = start_server(uploads.path()).await;

    let data = sample(8 * MIB);
    let path = source.path().join("disk.img");
    std::fs::write(&path, &data).unwrap();
    let file_hash = FileHash::parse(hex::encode(Md5::digest(&data))).unwrap();

    // First attempt stores chunks 0..3 and dies.
    let first = UploadCoordinator::new(
        Arc::new(Interrupted {
            inner: HttpTransport::new(&endpoint).unwrap(),
            fail_from: 3,
        }),
        config(&endpoint),
    );
    let result = first.upload_file(&path).await;
    assert!(matches!(result, Err(UploadError::ChunksFailed(ref failed)) if failed == &vec![3, 4, 5, 6, 7]));
    assert!(!uploads.path().join(format!("{file_hash}.img")).exists());

    // After a "restart" the server reports exactly what it holds.
    let mut second = UploadCoordinator::http(config(&endpoint)).unwrap();
    let resume = second.verify("disk.img", &file_hash).await.unwrap();
    assert!(resume.should_upload);
    assert_eq!(resume.uploaded.into_iter().collect::<Vec<_>>(), vec![0, 1, 2]);

    let mut events = second.take_events().unwrap();
    let summary = second.upload_file(&path).await.unwrap();
    assert_eq!(summary.file_hash, file_hash);
    assert_eq!(summary.chunks, 8);
    assert_eq!(summary.uploaded, 5);
    assert_eq!(summary.skipped, 3);

    let mut uploaded = Vec::new();
    let mut fractions = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            UploadEvent::ChunkUploaded { index } => uploaded.push(index),
            UploadEvent::Progress { fraction, .. } => fractions.push(fraction),
            _ => {}
        }
    }
    uploaded.sort_unstable();
    assert_eq!(uploaded, vec![3, 4, 5, 6, 7]);
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(fractions.last().copied(), Some(1.0));

    let merged = uploads.path().join(format!("{file_hash}.img"));
    assert_eq!(std::fs::read(&merged).unwrap(), data);
    assert!(!uploads.path().join(format!("chunkDir_{file_hash}")).exists());

    server.shutdown();
}

#[tokio::test]
async fn already_merged_file_is_skipped() {
    let uploads = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();
    let (server, endpoint) = start_server(uploads.path()).await;

    let data = sample(3 * MIB + 17);
    let path = source.path().join("notes.txt");
    std::fs::write(&path, &data).unwrap();

    let summary = UploadCoordinator::http(config(&endpoint))
        .unwrap()
        .upload_file(&path)
        .await
        .unwrap();
    assert!(!summary.already_complete);
    assert_eq!(summary.uploaded, 4);

    let mut again = UploadCoordinator::http(config(&endpoint)).unwrap();
    let mut events = again.take_events().unwrap();
    let summary = again.upload_file(&path).await.unwrap();
    assert!(summary.already_complete);
    assert_eq!(summary.uploaded, 0);

    let mut saw_chunk_traffic = false;
    let mut saw_already_complete = false;
    while let Ok(event) = events.try_recv() {
        match event {
            UploadEvent::ChunkUploaded { .. } | UploadEvent::Merged { .. } => {
                saw_chunk_traffic = true
            }
            UploadEvent::AlreadyComplete { .. } => saw_already_complete = true,
            _ => {}
        }
    }
    assert!(saw_already_complete);
    assert!(!saw_chunk_traffic);

    server.shutdown();
}

#[tokio::test]
async fn merge_with_wrong_chunk_size_is_rejected_and_retriable() {
    let uploads = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();
    let (server, endpoint) = start_server(uploads.path()).await;

    let data = sample(2 * MIB + 5);
    let path = source.path().join("a.bin");
    std::fs::write(&path, &data).unwrap();
    let file_hash = FileHash::parse(hex::encode(Md5::digest(&data))).unwrap();

    // Store every chunk but never merge.
    let coordinator = UploadCoordinator::http(config(&endpoint)).unwrap();
    let plan = chunkdrop_transfer::ChunkPlan::for_file(&path, MIB as u64)
        .await
        .unwrap();
    let outcomes = coordinator
        .upload_chunks(
            &chunkdrop_transfer::ChunkReader::new(&path),
            &plan,
            &file_hash,
            "a.bin",
            &Default::default(),
        )
        .await;
    assert!(outcomes.iter().all(|o| o.is_stored()));

    let result = coordinator
        .request_merge("a.bin", &file_hash, 512 * 1024, Some(3))
        .await;
    assert!(matches!(result, Err(UploadError::MergeRejected { code: 1, .. })));
    assert!(!uploads.path().join(format!("{file_hash}.bin")).exists());

    coordinator
        .request_merge("a.bin", &file_hash, MIB as u64, Some(3))
        .await
        .unwrap();
    assert_eq!(
        std::fs::read(uploads.path().join(format!("{file_hash}.bin"))).unwrap(),
        data
    );

    server.shutdown();
}
