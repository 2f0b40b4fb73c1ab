// Each integration test file is compiled as its own independent binary crate,
// each pulling in its own copy of this module. Helpers used by some test
// binaries but not others trigger false "dead code" warnings in the binaries
// that don't call them. Allow dead_code to silence these per-binary false
// positives.
#![allow(dead_code)]

pub mod server;

use std::path::PathBuf;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Path to the demo service's proto file, used as `--proto` for the bridge.
pub fn demo_proto() -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("testing")
        .join("demo-server")
        .join("proto")
        .join("demo.proto")
        .to_string_lossy()
        .into_owned()
}

/// Connect to a bridge's WebSocket endpoint.
pub async fn connect(url: &str) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("failed to connect to bridge");
    ws
}

/// Send a JSON frame.
pub async fn send(ws: &mut WsClient, frame: Value) {
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .expect("failed to send frame");
}

/// Receive the next JSON frame, with a generous timeout so a hung test fails
/// fast instead of blocking the suite.
pub async fn recv(ws: &mut WsClient) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for frame")
        .expect("connection closed unexpectedly")
        .expect("websocket error");
    match msg {
        Message::Text(text) => serde_json::from_str(&text).expect("frame was not valid JSON"),
        other => panic!("expected a text frame, got {other:?}"),
    }
}
