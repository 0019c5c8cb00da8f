// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use codeswarm_core::infrastructure::backoff::BackoffPolicy;
use codeswarm_core::infrastructure::router_client::RouterClient;
use codeswarm_core::infrastructure::transport::{
    ConnectionState, TcpTransport, Transport, TransportConfig, TransportError,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::timeout;

fn config(address: String) -> TransportConfig {
    TransportConfig {
        address,
        backoff: BackoffPolicy::fixed(Duration::from_millis(20)),
        connect_deadline: Duration::from_secs(5),
        subscriber_capacity: 64,
    }
}

async fn read_json_line(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> Value {
    let mut line = String::new();
    timeout(Duration::from_secs(5), reader.read_line(&mut line))
        .await
        .expect("timed out reading line")
        .unwrap();
    serde_json::from_str(line.trim()).unwrap()
}

#[tokio::test]
async fn test_messages_queued_before_connect_arrive_in_order() {
    // Reserve a port, then free it so the first attempts fail.
    let address = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };

    let transport = TcpTransport::spawn(config(address.clone()));
    for n in 0..3 {
        transport.send(json!({ "n": n })).unwrap();
    }

    tokio::time::sleep(Duration::from_millis(60)).await;
    let listener = TcpListener::bind(&address).await.unwrap();
    let (socket, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    let (read_half, _write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    for n in 0..3 {
        assert_eq!(read_json_line(&mut reader).await, json!({ "n": n }));
    }

    transport.wait_connected(Duration::from_secs(5)).await.unwrap();
    transport.close();
}

#[tokio::test]
async fn test_split_and_malformed_lines() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let (go_tx, go_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        go_rx.await.unwrap();
        socket.write_all(br#"{"type":"event","eve"#).await.unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        socket
            .write_all(b"nt\":\"usage\",\"data\":{}}\nthis is not json\n\n{\"type\":\"event\",\"event\":\"assistant\",\"data\":{}}\n")
            .await
            .unwrap();
        socket.flush().await.unwrap();
        // Keep the socket open until the client has read everything.
        tokio::time::sleep(Duration::from_millis(500)).await;
    });

    let transport = TcpTransport::connect(config(address)).await.unwrap();
    let mut inbound = transport.subscribe();
    go_tx.send(()).unwrap();

    let first = timeout(Duration::from_secs(5), inbound.recv()).await.unwrap().unwrap();
    assert_eq!(first["event"], "usage");
    let second = timeout(Duration::from_secs(5), inbound.recv()).await.unwrap().unwrap();
    assert_eq!(second["event"], "assistant");

    transport.close();
    server.await.unwrap();
}

#[tokio::test]
async fn test_initial_connect_deadline() {
    let address = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };

    let mut cfg = config(address);
    cfg.connect_deadline = Duration::from_millis(150);
    let result = TcpTransport::connect(cfg).await;
    assert!(matches!(
        result,
        Err(TransportError::ConnectFailed { .. }) | Err(TransportError::ConnectTimeout(_))
    ));
}

#[tokio::test]
async fn test_reconnects_after_peer_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let transport = TcpTransport::spawn(config(address));
    let mut state = transport.connection_state();

    // First connection: accept and drop immediately.
    let (socket, _) = listener.accept().await.unwrap();
    drop(socket);

    timeout(Duration::from_secs(5), async {
        loop {
            state.changed().await.unwrap();
            if matches!(*state.borrow(), ConnectionState::Reconnecting { .. }) {
                break;
            }
        }
    })
    .await
    .unwrap();

    // Second connection receives traffic sent afterwards.
    let (socket, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    transport.wait_connected(Duration::from_secs(5)).await.unwrap();
    transport.send(json!({"after": "reconnect"})).unwrap();

    let (read_half, _write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    assert_eq!(read_json_line(&mut reader).await, json!({"after": "reconnect"}));

    transport.close();
}

#[tokio::test]
async fn test_router_client_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    // Minimal router: answer every command with a correlated swarm_list.
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = socket.into_split();
        let mut reader = BufReader::new(read_half);
        let command = read_json_line(&mut reader).await;
        let response = json!({
            "protocol": "codeswarm.router.v1",
            "type": "event",
            "event": "swarm_list",
            "data": {"request_id": command["request_id"], "swarms": {}}
        });
        let mut line = serde_json::to_vec(&response).unwrap();
        line.push(b'\n');
        write_half.write_all(&line).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let transport = Arc::new(TcpTransport::connect(config(address)).await.unwrap());
    let client = RouterClient::new(transport.clone());
    let event = client
        .request(
            codeswarm_core::domain::protocol::Command::SwarmList,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(event.event, "swarm_list");

    transport.close();
    server.await.unwrap();
}
