// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use codeswarm_core::domain::protocol::NodeTarget;
use codeswarm_sdk::{
    ClientError, CodeswarmClient, EventFeed, FeedEvent, FeedStatus, LaunchRequest,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

fn record() -> Value {
    json!({
        "swarm_id": "abc12345ffff",
        "alias": "alpha",
        "job_id": "77",
        "node_count": 2,
        "status": "running",
        "created_at": "2026-01-01T00:00:00Z"
    })
}

async fn ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(|mut socket: WebSocket| async move {
        let message = json!({
            "type": "turn_started",
            "payload": {"swarm_id": "abc12345ffff", "node_id": 0, "injection_id": "t1"}
        });
        let _ = socket.send(Message::Text(message.to_string().into())).await;
        let _ = socket.send(Message::Text("not json".to_string().into())).await;
        let _ = socket
            .send(Message::Text(
                json!({"type": "turn_complete", "payload": {}}).to_string().into(),
            ))
            .await;
        while let Some(Ok(_)) = socket.recv().await {}
    })
}

async fn start_stub() -> SocketAddr {
    let app = Router::new()
        .route("/swarms", get(|| async { Json(json!([record()])) }))
        .route(
            "/swarms/{alias}",
            get(|Path(alias): Path<String>| async move {
                if alias == "alpha" {
                    (StatusCode::OK, Json(record()))
                } else {
                    (StatusCode::NOT_FOUND, Json(json!({"error": "Unknown swarm"})))
                }
            }),
        )
        .route(
            "/launch",
            post(|| async {
                (
                    StatusCode::CONFLICT,
                    Json(json!({"error": "Alias 'alpha' is already in use"})),
                )
            }),
        )
        .route(
            "/inject/{alias}",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["nodes"], json!(1));
                Json(json!({"request_id": "req-1"}))
            }),
        )
        .route("/ws", get(ws_handler));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_client_maps_backend_errors() {
    let addr = start_stub().await;
    let client = CodeswarmClient::new(&format!("http://{}", addr)).unwrap();

    let swarms = client.list_swarms().await.unwrap();
    assert_eq!(swarms.len(), 1);
    assert_eq!(swarms[0].job_id.as_deref(), Some("77"));

    assert_eq!(client.get_swarm("alpha").await.unwrap().node_count, 2);

    let missing = client.get_swarm("ghost").await.unwrap_err();
    assert!(missing.is_not_found());
    match missing {
        ClientError::Api { message, .. } => assert_eq!(message, "Unknown swarm"),
        other => panic!("unexpected {:?}", other),
    }

    let conflict = client
        .launch(&LaunchRequest {
            nodes: 1,
            prompt: "hi".into(),
            alias: Some("alpha".into()),
        })
        .await
        .unwrap_err();
    assert!(conflict.is_conflict());

    let accepted = client
        .inject("alpha", "hello", NodeTarget::Node(1))
        .await
        .unwrap();
    assert_eq!(accepted.request_id, "req-1");
}

#[tokio::test]
async fn test_feed_emits_snapshot_then_messages() {
    let addr = start_stub().await;
    let client = CodeswarmClient::new(&format!("http://{}", addr)).unwrap();
    let mut feed = EventFeed::spawn(client);

    let first = tokio::time::timeout(Duration::from_secs(5), feed.recv())
        .await
        .unwrap()
        .unwrap();
    match first {
        FeedEvent::Snapshot(records) => assert_eq!(records[0].alias, "alpha"),
        other => panic!("expected snapshot, got {:?}", other),
    }
    assert_eq!(feed.current_status(), FeedStatus::Connected);

    // The unparseable frame in between is skipped.
    let mut kinds = Vec::new();
    for _ in 0..2 {
        match tokio::time::timeout(Duration::from_secs(5), feed.recv()).await.unwrap() {
            Some(FeedEvent::Message(m)) => kinds.push(m.kind),
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(kinds, vec!["turn_started", "turn_complete"]);

    let mut status = feed.status();
    feed.close().await;
    assert_eq!(*status.borrow_and_update(), FeedStatus::Stopped);
}
