use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rust_inference_backend::AppState;
use rust_inference_backend::config::AppConfig;
use rust_inference_backend::services::ingest::{IngestTrigger, MaterializeStatus};
use rust_inference_backend::services::object_store::InMemoryObjectStore;
use rust_inference_backend::services::shared_fs::{Area, SharedFs};
use std::sync::Arc;
use std::time::Duration;

async fn setup() -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::development(dir.path());
    let shared_fs = Arc::new(SharedFs::mount(dir.path()).await.unwrap());
    let store = Arc::new(InMemoryObjectStore::new());
    let state = AppState::new(store, shared_fs, config);
    (state, dir)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_materialize_converges_to_one_file() {
    let (state, dir) = setup().await;

    let payloads: Vec<Vec<u8>> = (0..8u8)
        .map(|i| format!("payload-{i}-{}", "x".repeat(64)).into_bytes())
        .collect();

    let mut handles = Vec::new();
    for payload in &payloads {
        let ingest = state.ingest.clone();
        let data = BASE64.encode(payload);
        handles.push(tokio::spawn(async move {
            ingest
                .handle_trigger(IngestTrigger::DirectRequest {
                    key: None,
                    data: Some(data),
                    filename: Some("race.bin".to_string()),
                })
                .await
        }));
    }

    let mut created = 0;
    let mut file_ids = Vec::new();
    for handle in handles {
        let ident = handle.await.unwrap().expect("every contender must succeed");
        if ident.status == MaterializeStatus::Created {
            created += 1;
        }
        file_ids.push(ident.file_id);
    }

    // Winners and short-circuited losers alike agree on the identifier
    assert!(created >= 1);
    assert!(file_ids.windows(2).all(|w| w[0] == w[1]));

    // Exactly one final content is observable, matching one of the payloads
    let final_bytes = std::fs::read(dir.path().join("models").join("race.bin")).unwrap();
    assert!(payloads.iter().any(|p| p == &final_bytes));

    // No temp files survive the race
    let leftovers: Vec<String> = std::fs::read_dir(dir.path().join("models"))
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".tmp-"))
        .collect();
    assert!(leftovers.is_empty(), "stray temp files: {leftovers:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ten_concurrent_predicts_agree() {
    let (state, _dir) = setup().await;

    let path = state.shared_fs.resolve(Area::Models, "shared.bin");
    let mut temp = state.shared_fs.begin_write(&path).await.unwrap();
    temp.write_all(&vec![42u8; 4096]).await.unwrap();
    state.shared_fs.commit(temp, &path).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let predict = state.predict.clone();
        handles.push(tokio::spawn(async move {
            predict.process(&format!("reader-{i}"), "shared.bin").await
        }));
    }

    let mut checksums = Vec::new();
    for handle in handles {
        let prediction = handle.await.unwrap().expect("concurrent reads must all succeed");
        assert_eq!(prediction.payload.file_size, 4096);
        checksums.push(prediction.payload.checksum);
    }

    checksums.dedup();
    assert_eq!(checksums.len(), 1, "all readers must see identical content");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reader_never_observes_partial_content() {
    let (state, _dir) = setup().await;
    let shared_fs = state.shared_fs.clone();

    let old = b"old-complete-content".to_vec();
    let new = vec![7u8; 8192];

    let path = shared_fs.resolve(Area::Models, "swap.bin");
    let mut temp = shared_fs.begin_write(&path).await.unwrap();
    temp.write_all(&old).await.unwrap();
    shared_fs.commit(temp, &path).await.unwrap();

    // Writer: stage the replacement slowly, with a delay between the
    // temp write and the rename, then commit.
    let writer = {
        let shared_fs = shared_fs.clone();
        let path = path.clone();
        let new = new.clone();
        tokio::spawn(async move {
            let mut temp = shared_fs.begin_write(&path).await.unwrap();
            temp.write_all(&new[..4096]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            temp.write_all(&new[4096..]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            shared_fs.commit(temp, &path).await.unwrap();
        })
    };

    // Readers poll throughout the swap window: every read must return one
    // of the two complete versions, never a truncated mixture.
    while !writer.is_finished() {
        let seen = shared_fs.read(&path).await.unwrap();
        assert!(
            seen == old || seen == new,
            "reader observed a partial file of {} bytes",
            seen.len()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    writer.await.unwrap();

    assert_eq!(shared_fs.read(&path).await.unwrap(), new);
}
