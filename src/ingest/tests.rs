use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tungstenite::protocol::Message as WsMessage;

use super::adapter::{FilterReason, sanitize_company_name};
use super::{IngestAdapter, IngestCounts, Routed, UpstreamLink, route, serve_upstream};
use crate::broker::Relay;
use crate::broker::leaderboard::Cohort;
use crate::broker::message::{Payload, SnapshotKind};
use crate::client::Client;
use crate::persistence::{MemorySnapshotStore, SnapshotStore};
use crate::transport::message::ServerMessage;

fn line(category: &str, data: serde_json::Value) -> Vec<u8> {
    json!({"category": category, "data": data}).to_string().into_bytes()
}

#[test]
fn route_publishes_ordinary_categories() {
    let Routed::Publish(event) = route(&line("marketStatus", json!({"open": true}))).unwrap()
    else {
        panic!("expected publish");
    };
    assert_eq!(event.topic, "marketStatus");
    assert_eq!(event.payload, Payload::Opaque(json!({"open": true})));
}

#[test]
fn route_filters_internal_and_reserved() {
    assert_eq!(
        route(&line("candleData_web_AAPL", json!({}))).unwrap(),
        Routed::Filtered {
            category: "candleData_web_AAPL".to_string(),
            reason: FilterReason::Internal
        }
    );
    assert_eq!(
        route(&line("leaderboard", json!([]))).unwrap(),
        Routed::Filtered {
            category: "leaderboard".to_string(),
            reason: FilterReason::Reserved
        }
    );
}

#[test]
fn route_rejects_malformed_input() {
    assert!(route(b"not json").is_err());
    assert!(route(br#"{"data": 1}"#).is_err());
    assert!(route(&line("candleData_AAPL", json!({"open": "abc"}))).is_err());
}

#[test]
fn route_credentials_accepts_bare_or_wrapped_body() {
    let bare = route(&line("loginCredentials", json!("<?php $users = []; ?>"))).unwrap();
    let wrapped = route(&line(
        "loginCredentials",
        json!({"data": "<?php $users = []; ?>"}),
    ))
    .unwrap();
    let expected = Routed::Snapshot {
        kind: SnapshotKind::LoginCredentials,
        bytes: b"<?php $users = []; ?>".to_vec(),
    };
    assert_eq!(bare, expected);
    assert_eq!(wrapped, expected);
    assert!(route(&line("loginCredentials", json!(42))).is_err());
}

#[test]
fn route_stock_list_is_persisted_as_json() {
    let routed = route(&line("stockList", json!(["AAPL", "MSFT"]))).unwrap();
    assert_eq!(
        routed,
        Routed::Snapshot {
            kind: SnapshotKind::StockList,
            bytes: br#"["AAPL","MSFT"]"#.to_vec(),
        }
    );
}

#[test]
fn company_names_are_sanitized() {
    assert_eq!(sanitize_company_name("Apple Inc. (NASDAQ)"), "Apple Inc.");
    assert_eq!(sanitize_company_name("McDonald's"), "McDonald?s");
    assert_eq!(sanitize_company_name(r#"The "Big" Co"#), "The =Big= Co");
    assert_eq!(sanitize_company_name("A (x) B (y)"), "A B");

    let Routed::Snapshot { kind, bytes } = route(&line(
        "companyNames",
        json!([{"AAPL": "Apple Inc. (NASDAQ)"}, {"MCD": "McDonald's"}]),
    ))
    .unwrap() else {
        panic!("expected snapshot");
    };
    assert_eq!(kind, SnapshotKind::CompanyNames);
    let map: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(map, json!({"AAPL": "Apple Inc.", "MCD": "McDonald?s"}));
}

#[test]
fn adapter_persists_and_counts() {
    let store = Arc::new(MemorySnapshotStore::new());
    let adapter = IngestAdapter::new(store.clone());

    assert!(adapter.handle(&line("stockList", json!(["AAPL"]))).is_none());
    assert!(adapter.handle(&line("portfolio_web", json!({}))).is_none());
    assert!(adapter.handle(b"{broken").is_none());
    assert!(adapter.handle(&line("marketStatus", json!(1))).is_some());
    adapter.record_malformed();

    assert_eq!(
        adapter.counts(),
        IngestCounts {
            published: 1,
            filtered: 1,
            malformed: 2,
            persisted: 1,
        }
    );
    assert_eq!(
        store.load_snapshot("stockList.json").unwrap().unwrap(),
        br#"["AAPL"]"#
    );
}

#[tokio::test]
async fn serve_upstream_feeds_relay_in_order() {
    let upstream = UpstreamLink::new(8);
    let (handle, _task) = Relay::new(Cohort::Open)
        .with_upstream(upstream.clone())
        .spawn(16);
    let adapter = IngestAdapter::new(Arc::new(MemorySnapshotStore::new()));

    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let client = Client::new(tx);
    let id = client.id.clone();
    handle.connect(client).await.unwrap();

    let (server_side, client_side) = tokio::io::duplex(4096);
    let relay = handle.clone();
    let link = upstream.clone();
    let pump = tokio::spawn(async move {
        serve_upstream(server_side, &relay, &adapter, &link, 1024).await
    });

    let (read_half, mut write_half) = tokio::io::split(client_side);
    let mut notices = BufReader::new(read_half).lines();

    // let the pump attach to the notice channel
    tokio::time::sleep(Duration::from_millis(50)).await;

    handle
        .subscribe(&id, "candleData_AAPL".to_string())
        .await
        .unwrap();
    let notice = tokio::time::timeout(Duration::from_secs(2), notices.next_line())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notice.as_deref(), Some("candleData_AAPL"));

    let mut batch = String::new();
    for close in [1, 2, 3] {
        batch.push_str(
            &json!({
                "category": "candleData_AAPL",
                "data": {"open": close, "high": close, "low": close, "close": close}
            })
            .to_string(),
        );
        batch.push('\n');
    }
    batch.push_str("garbage\n\n");
    write_half.write_all(batch.as_bytes()).await.unwrap();
    write_half.shutdown().await.unwrap();
    drop(write_half);

    let served = tokio::time::timeout(Duration::from_secs(2), pump)
        .await
        .unwrap()
        .unwrap();
    assert!(served.is_ok());

    // stats round-trips through the relay queue, so every publish has landed
    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.events_published, 3);

    let mut closes = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        let msg: ServerMessage = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        if let ServerMessage::Event { payload, .. } = msg {
            closes.push(payload["close"].as_f64().unwrap());
        }
    }
    assert_eq!(closes, vec![1.0, 2.0, 3.0]);
}

#[tokio::test]
async fn serve_upstream_skips_oversized_lines() {
    let (handle, _task) = Relay::new(Cohort::Open).spawn(16);
    let adapter = IngestAdapter::new(Arc::new(MemorySnapshotStore::new()));
    let upstream = UpstreamLink::new(8);

    let (server_side, mut client_side) = tokio::io::duplex(4096);
    let oversized = format!("{}\n", "x".repeat(200));
    let ok = format!("{}\n", json!({"category": "marketStatus", "data": "open"}));
    client_side.write_all(oversized.as_bytes()).await.unwrap();
    client_side.write_all(ok.as_bytes()).await.unwrap();
    client_side.shutdown().await.unwrap();

    serve_upstream(server_side, &handle, &adapter, &upstream, 64)
        .await
        .unwrap();

    let counts = adapter.counts();
    assert_eq!(counts.malformed, 1);
    assert_eq!(counts.published, 1);
    assert_eq!(handle.stats().await.unwrap().events_published, 1);
}

#[tokio::test]
async fn serve_upstream_counts_invalid_utf8_and_continues() {
    let (handle, _task) = Relay::new(Cohort::Open).spawn(16);
    let adapter = IngestAdapter::new(Arc::new(MemorySnapshotStore::new()));
    let upstream = UpstreamLink::new(8);

    let (server_side, mut client_side) = tokio::io::duplex(4096);
    client_side
        .write_all(b"{\"category\":\"x\",\"data\":\"\xff\xfe\"}\n")
        .await
        .unwrap();
    let ok = format!("{}\n", json!({"category": "marketStatus", "data": "open"}));
    client_side.write_all(ok.as_bytes()).await.unwrap();
    client_side.shutdown().await.unwrap();

    serve_upstream(server_side, &handle, &adapter, &upstream, 1024)
        .await
        .unwrap();

    let counts = adapter.counts();
    assert_eq!(counts.malformed, 1);
    assert_eq!(counts.published, 1);
    assert_eq!(handle.stats().await.unwrap().events_published, 1);
}

#[tokio::test]
async fn serve_upstream_keeps_reading_when_notices_are_never_read() {
    let upstream = UpstreamLink::new(1024);
    let (handle, _task) = Relay::new(Cohort::Open)
        .with_upstream(upstream.clone())
        .spawn(16);
    let adapter = IngestAdapter::new(Arc::new(MemorySnapshotStore::new()));

    let (tx, _rx) = mpsc::unbounded_channel::<WsMessage>();
    let client = Client::new(tx);
    let id = client.id.clone();
    handle.connect(client).await.unwrap();

    // a small pipe the peer never drains in the notice direction
    let (server_side, client_side) = tokio::io::duplex(256);
    let relay = handle.clone();
    let link = upstream.clone();
    let pump = tokio::spawn(async move {
        serve_upstream(server_side, &relay, &adapter, &link, 1024).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    for n in 0..200 {
        handle
            .subscribe(&id, format!("candleData_SYM{n}"))
            .await
            .unwrap();
    }
    // stats queues behind the subscribes, so every notice has been sent
    handle.stats().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (_read_half, mut write_half) = tokio::io::split(client_side);
    let ok = format!("{}\n", json!({"category": "marketStatus", "data": "open"}));
    write_half.write_all(ok.as_bytes()).await.unwrap();

    let mut published = 0;
    for _ in 0..100 {
        published = handle.stats().await.unwrap().events_published;
        if published == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(published, 1);

    write_half.shutdown().await.unwrap();
    let served = tokio::time::timeout(Duration::from_secs(2), pump)
        .await
        .unwrap()
        .unwrap();
    assert!(served.is_ok());
}
