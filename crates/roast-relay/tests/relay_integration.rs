// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::float_cmp)] // Test assertions with constants
#![allow(clippy::cast_precision_loss)] // Test data conversions

//! End-to-end relay tests
//!
//! Drives a `RelayEngine` backed by an in-memory SQLite store through the
//! session lifecycle, fan-out and history paths.

use roast_relay::{
    ChannelSource, ControlCommand, Mark, PersistenceGateway, RelayConfig, RelayEngine, RelayError,
    Sample, ServerMessage, SharedGateway, SqliteStore, ViewerHandle,
};
use std::sync::Arc;
use std::time::Duration;

fn relay() -> (Arc<RelayEngine>, Arc<SqliteStore>) {
    relay_with(RelayConfig::default())
}

fn relay_with(config: RelayConfig) -> (Arc<RelayEngine>, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let shared: SharedGateway = store.clone();
    let engine = Arc::new(RelayEngine::new(config, shared).unwrap());
    (engine, store)
}

async fn start(engine: &RelayEngine, name: &str) -> ServerMessage {
    engine
        .dispatcher()
        .dispatch(ControlCommand::Start {
            session_name: name.to_string(),
        })
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn second_start_is_rejected() {
    let (engine, _) = relay();

    let first = serde_json::to_value(start(&engine, "Batch1").await).unwrap();
    let first_id = first["session_id"].as_str().unwrap().to_string();
    assert!(!first_id.is_empty());

    let second = serde_json::to_value(start(&engine, "Batch2").await).unwrap();
    assert_eq!(second["error"], true);
    assert!(second.get("session_id").is_none());

    assert_eq!(engine.session().id(), first_id);
    assert_eq!(engine.session().name(), "Batch1");
}

#[tokio::test]
async fn concurrent_starts_have_exactly_one_winner() {
    let (engine, store) = relay();

    let tasks: Vec<_> = (0..12)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { start(&engine, &format!("batch-{}", i)).await })
        })
        .collect();

    let mut winners = 0;
    for task in tasks {
        let reply = serde_json::to_value(task.await.unwrap()).unwrap();
        if reply.get("error").is_none() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(store.list_sessions().unwrap().len(), 1);
}

#[tokio::test]
async fn recorded_samples_keep_ingest_order() {
    let (engine, store) = relay();
    start(&engine, "Batch1").await;
    let session = engine.session().current().unwrap();
    // let the clock pass the stamped readings
    tokio::time::sleep(Duration::from_millis(10)).await;

    let (tx, source) = ChannelSource::new(8);
    for (offset, value) in [(1, 10.0), (2, 12.5), (3, 15.0)] {
        tx.send(Sample::new(value, session.created_at_ms + offset))
            .await
            .unwrap();
    }
    drop(tx);

    assert_eq!(engine.run(source).await.unwrap(), 3);
    engine.flush().await;

    let samples = store.list_samples(&session.id).unwrap();
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![10.0, 12.5, 15.0]);
    assert!(samples.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
}

#[tokio::test]
async fn get_while_idle_reports_no_session() {
    let (engine, _) = relay();
    let reply = engine
        .dispatcher()
        .handle_frame(r#"{"cmd":"get"}"#)
        .await
        .unwrap()
        .unwrap();

    let json = serde_json::to_value(reply).unwrap();
    assert_eq!(json["type"], "get_response");
    assert_eq!(json["has_session"], false);
    assert_eq!(json["error"], true);
}

#[tokio::test]
async fn delete_removes_session_and_samples() {
    let (engine, store) = relay();
    start(&engine, "Batch1").await;
    let session = engine.session().current().unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    engine.ingest(Sample::new(100.0, session.created_at_ms + 1));
    engine.ingest(Sample::new(101.0, session.created_at_ms + 2));
    engine.flush().await;

    engine.dispatcher().dispatch(ControlCommand::Stop).await.unwrap();

    let outcome = engine.history().delete_session(&session.id).await;
    assert!(outcome.status);
    assert!(store.list_samples(&session.id).unwrap().is_empty());
    assert!(store.list_sessions().unwrap().is_empty());
}

#[tokio::test]
async fn idle_stop_changes_nothing() {
    let (engine, store) = relay();
    let reply = engine.dispatcher().dispatch(ControlCommand::Stop).await.unwrap();
    assert!(reply.is_none());
    assert!(!engine.session().is_active());
    assert!(store.list_sessions().unwrap().is_empty());
}

#[tokio::test]
async fn blocked_viewer_does_not_delay_others() {
    let config = RelayConfig::builder().viewer_queue_capacity(2).build();
    let (engine, _) = relay_with(config);

    // subscribed but never drained
    let (blocked, _blocked_rx) = ViewerHandle::channel(engine.config().viewer_queue_capacity);
    engine.hub().subscribe(&blocked);

    let mut readers = Vec::new();
    for _ in 0..3 {
        let (viewer, mut rx) = ViewerHandle::channel(256);
        engine.hub().subscribe(&viewer);
        readers.push(tokio::spawn(async move {
            let mut temps = Vec::new();
            while temps.len() < 50 {
                match rx.recv().await {
                    Some(frame) => {
                        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
                        temps.push(json["temp"].as_f64().unwrap());
                    }
                    None => break,
                }
            }
            temps
        }));
    }

    let (tx, source) = ChannelSource::new(64);
    let ingest = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run(source).await })
    };
    for i in 0..50 {
        tx.send(Sample::new(i as f64, i)).await.unwrap();
    }
    drop(tx);

    let ingested = tokio::time::timeout(Duration::from_secs(5), ingest)
        .await
        .expect("ingest loop stalled")
        .unwrap()
        .unwrap();
    assert_eq!(ingested, 50);

    let expected: Vec<f64> = (0..50).map(|i| i as f64).collect();
    for reader in readers {
        let temps = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .expect("healthy viewer starved")
            .unwrap();
        // per-viewer FIFO
        assert_eq!(temps, expected);
    }

    assert!(engine.hub().stats().frames_dropped >= 48);
}

#[tokio::test]
async fn recorded_samples_fall_inside_session_window() {
    let (engine, store) = relay();

    engine.ingest(Sample::now(1.0));
    start(&engine, "Batch1").await;
    let session = engine.session().current().unwrap();

    for i in 0..5 {
        tokio::time::sleep(Duration::from_millis(2)).await;
        engine.ingest(Sample::now(10.0 + i as f64));
    }
    tokio::time::sleep(Duration::from_millis(2)).await;
    engine.dispatcher().dispatch(ControlCommand::Stop).await.unwrap();

    for i in 0..3 {
        tokio::time::sleep(Duration::from_millis(2)).await;
        engine.ingest(Sample::now(50.0 + i as f64));
    }
    engine.flush().await;

    let record = store.list_sessions().unwrap().remove(0);
    let samples = store.list_samples(&session.id).unwrap();
    assert_eq!(samples.len(), 5);
    assert!(samples
        .iter()
        .all(|s| s.timestamp_ms >= record.created_at_ms && s.timestamp_ms < record.ended_at_ms));
}

#[tokio::test]
async fn stop_immediately_after_ingest_still_covers_sample() {
    let (engine, store) = relay();

    for _ in 0..50 {
        start(&engine, "Batch").await;
        engine.ingest(Sample::now(200.0));
        engine.dispatcher().dispatch(ControlCommand::Stop).await.unwrap();
    }
    engine.flush().await;

    let records = store.list_sessions().unwrap();
    assert_eq!(records.len(), 50);
    for record in &records {
        assert!(record.is_ended());
        for sample in store.list_samples(&record.id).unwrap() {
            assert!(sample.timestamp_ms >= record.created_at_ms);
            assert!(sample.timestamp_ms < record.ended_at_ms);
        }
    }
}

#[tokio::test]
async fn mark_without_session_writes_nothing() {
    let (engine, store) = relay();
    let stored = engine
        .history()
        .record_mark(Mark {
            session_id: String::new(),
            name: "First Crack".into(),
            created_at_ms: 1,
            temperature: 196.0,
        })
        .await
        .unwrap();

    assert!(!stored);
    assert!(store.list_marks("").unwrap().is_empty());
}

#[tokio::test]
async fn get_reports_marks_and_samples_of_active_session() {
    let (engine, _) = relay();
    start(&engine, "Batch1").await;
    let session = engine.session().current().unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    engine.ingest(Sample::new(180.0, session.created_at_ms + 5));
    engine.flush().await;
    engine
        .history()
        .record_mark(Mark {
            session_id: session.id.clone(),
            name: "Charge".into(),
            created_at_ms: session.created_at_ms + 6,
            temperature: 180.0,
        })
        .await
        .unwrap();

    let reply = engine
        .dispatcher()
        .dispatch(ControlCommand::Get)
        .await
        .unwrap()
        .unwrap();
    let json = serde_json::to_value(reply).unwrap();
    assert_eq!(json["has_session"], true);
    assert_eq!(json["session_name"], "Batch1");
    assert_eq!(json["temps"].as_array().unwrap().len(), 1);
    assert_eq!(json["marks"][0]["on_temp"], 180.0);
}

#[tokio::test]
async fn malformed_frame_is_reported() {
    let (engine, _) = relay();
    let dispatcher = engine.dispatcher();
    assert!(matches!(
        dispatcher.handle_frame("not json").await,
        Err(RelayError::MalformedCommand(_))
    ));
    assert!(matches!(
        dispatcher.handle_frame(r#"{"cmd":"format_disk"}"#).await,
        Err(RelayError::MalformedCommand(_))
    ));
}
