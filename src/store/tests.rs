use super::*;
use crate::pipeline::types::{
    AnalyzeMediaRequest, FrameLevel, Task, TaskKind, TaskStatus,
};

fn sample_task(id: &str) -> Task {
    Task::new(
        id.to_string(),
        AnalyzeMediaRequest {
            media_id: "m1".to_string(),
            media_type: TaskKind::VideoAnalysis,
            catalog_id: Some("vid_001".to_string()),
            brand_name: Some("acme".to_string()),
            frame_level: FrameLevel::Medium,
            smart_frame_count: None,
            transcript_url: None,
            custom_prompt: None,
        },
    )
}

#[tokio::test]
async fn create_get_delete_roundtrip() {
    let store = MemoryTaskStore::new();
    store.create(sample_task("t1")).await.unwrap();

    let fetched = store.get("t1").await.unwrap().unwrap();
    assert_eq!(fetched.status, TaskStatus::Pending);

    store.delete("t1").await.unwrap();
    assert!(store.get("t1").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_create_is_rejected() {
    let store = MemoryTaskStore::new();
    store.create(sample_task("t1")).await.unwrap();
    let err = store.create(sample_task("t1")).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(_)));
}

#[tokio::test]
async fn delete_missing_task_reports_not_found() {
    let store = MemoryTaskStore::new();
    let err = store.delete("nope").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn update_mutates_and_bumps_updated_at() {
    let store = MemoryTaskStore::new();
    store.create(sample_task("t1")).await.unwrap();
    let before = store.get("t1").await.unwrap().unwrap().updated_at;

    let applied = store
        .update(
            "t1",
            Box::new(|task| {
                task.status = TaskStatus::Processing;
                task.progress = 30;
                task.message = "Extracting frames".to_string();
            }),
        )
        .await
        .unwrap();
    assert!(applied);

    let task = store.get("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Processing);
    assert_eq!(task.progress, 30);
    assert!(task.updated_at >= before);
}

#[tokio::test]
async fn late_write_to_terminal_record_is_dropped() {
    let store = MemoryTaskStore::new();
    store.create(sample_task("t1")).await.unwrap();
    store
        .update("t1", Box::new(|t| t.status = TaskStatus::Failed))
        .await
        .unwrap();

    // a stale pipeline trying to complete the record after the fact
    let applied = store
        .update(
            "t1",
            Box::new(|t| {
                t.status = TaskStatus::Completed;
                t.progress = 100;
            }),
        )
        .await
        .unwrap();
    assert!(!applied);

    let task = store.get("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.progress, 0);
}

#[tokio::test]
async fn list_returns_all_records() {
    let store = MemoryTaskStore::new();
    for id in ["a", "b", "c"] {
        store.create(sample_task(id)).await.unwrap();
    }
    assert_eq!(store.list().await.unwrap().len(), 3);
    assert_eq!(store.len().await, 3);
}

#[tokio::test]
async fn readers_never_observe_partial_updates() {
    use std::sync::Arc;

    let store = Arc::new(MemoryTaskStore::new());
    store.create(sample_task("t1")).await.unwrap();

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for i in 0..50u8 {
                store
                    .update(
                        "t1",
                        Box::new(move |t| {
                            t.progress = i;
                            t.message = format!("step {i}");
                        }),
                    )
                    .await
                    .unwrap();
            }
        })
    };

    let reader = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                let task = store.get("t1").await.unwrap().unwrap();
                // message and progress always move together
                if task.progress > 0 {
                    assert_eq!(task.message, format!("step {}", task.progress));
                }
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();
}
