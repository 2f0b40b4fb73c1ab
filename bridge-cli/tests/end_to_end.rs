mod common;

use serde_json::json;

use common::server::{BridgeServer, DemoServer};

/// Scenario 1 (§8): unary success.
#[tokio::test]
async fn unary_say_hello_succeeds() {
    let demo = DemoServer::start();
    let bridge = BridgeServer::start(&common::demo_proto(), &demo.target);
    let mut ws = common::connect(&bridge.ws_url()).await;

    common::send(
        &mut ws,
        json!({
            "type": "start",
            "callId": "u1",
            "method": "demo.Greeter/SayHello",
            "payload": {"name": "Alice"},
        }),
    )
    .await;

    let headers = common::recv(&mut ws).await;
    assert_eq!(headers["type"], "headers");
    assert_eq!(headers["callId"], "u1");
    assert_eq!(headers["metadata"]["server"], "mock");

    let data = common::recv(&mut ws).await;
    assert_eq!(data["type"], "data");
    assert_eq!(data["payload"]["message"], "Hello, Alice!");

    let status = common::recv(&mut ws).await;
    assert_eq!(status["type"], "status");
    assert_eq!(status["status"]["code"], 0);
}

/// Scenario 2 (§8): server streaming.
#[tokio::test]
async fn greet_many_streams_responses_in_order() {
    let demo = DemoServer::start();
    let bridge = BridgeServer::start(&common::demo_proto(), &demo.target);
    let mut ws = common::connect(&bridge.ws_url()).await;

    common::send(
        &mut ws,
        json!({
            "type": "start",
            "callId": "s1",
            "method": "demo.Greeter/GreetMany",
            "payload": {"name": "Bob", "count": "3"},
        }),
    )
    .await;

    let headers = common::recv(&mut ws).await;
    assert_eq!(headers["type"], "headers");

    for i in 1..=3 {
        let data = common::recv(&mut ws).await;
        assert_eq!(data["type"], "data");
        assert_eq!(data["payload"]["message"], format!("Hello {i} to Bob"));
    }

    let status = common::recv(&mut ws).await;
    assert_eq!(status["status"]["code"], 0);
}

/// Scenario 3 (§8): client streaming.
#[tokio::test]
async fn accumulate_greetings_joins_writes() {
    let demo = DemoServer::start();
    let bridge = BridgeServer::start(&common::demo_proto(), &demo.target);
    let mut ws = common::connect(&bridge.ws_url()).await;

    common::send(
        &mut ws,
        json!({
            "type": "start",
            "callId": "c1",
            "method": "demo.Greeter/AccumulateGreetings",
        }),
    )
    .await;
    let _headers = common::recv(&mut ws).await;

    for name in ["A", "B", "C"] {
        common::send(
            &mut ws,
            json!({"type": "write", "callId": "c1", "payload": {"name": name}}),
        )
        .await;
    }
    common::send(&mut ws, json!({"type": "end", "callId": "c1"})).await;

    let data = common::recv(&mut ws).await;
    assert_eq!(data["type"], "data");
    assert_eq!(data["payload"]["message"], "Hello A, B, C");

    let status = common::recv(&mut ws).await;
    assert_eq!(status["status"]["code"], 0);
}

/// Scenario 4 (§8): bidi with cancel. After cancel, a further write for the
/// same callId is rejected as NOT_FOUND.
#[tokio::test]
async fn chat_cancel_then_write_is_not_found() {
    let demo = DemoServer::start();
    let bridge = BridgeServer::start(&common::demo_proto(), &demo.target);
    let mut ws = common::connect(&bridge.ws_url()).await;

    common::send(
        &mut ws,
        json!({"type": "start", "callId": "b1", "method": "demo.Greeter/Chat"}),
    )
    .await;
    let _headers = common::recv(&mut ws).await;

    common::send(
        &mut ws,
        json!({"type": "write", "callId": "b1", "payload": {"name": "X"}}),
    )
    .await;
    let data = common::recv(&mut ws).await;
    assert_eq!(data["payload"]["message"], "Hello, X!");

    common::send(&mut ws, json!({"type": "cancel", "callId": "b1"})).await;

    common::send(
        &mut ws,
        json!({"type": "write", "callId": "b1", "payload": {"name": "Y"}}),
    )
    .await;
    let err = common::recv(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["error"]["code"], 5);
}

/// A second `start` for a callId that is still live is rejected.
#[tokio::test]
async fn duplicate_start_is_rejected() {
    let demo = DemoServer::start();
    let bridge = BridgeServer::start(&common::demo_proto(), &demo.target);
    let mut ws = common::connect(&bridge.ws_url()).await;

    let start = json!({
        "type": "start",
        "callId": "dup1",
        "method": "demo.Greeter/Chat",
    });
    common::send(&mut ws, start.clone()).await;
    let _headers = common::recv(&mut ws).await;

    common::send(&mut ws, start).await;
    let err = common::recv(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["error"]["code"], 6);
    assert_eq!(err["callId"], "dup1");
}

/// Starting an unresolvable method yields NOT_FOUND.
#[tokio::test]
async fn unknown_method_is_not_found() {
    let demo = DemoServer::start();
    let bridge = BridgeServer::start(&common::demo_proto(), &demo.target);
    let mut ws = common::connect(&bridge.ws_url()).await;

    common::send(
        &mut ws,
        json!({
            "type": "start",
            "callId": "unk1",
            "method": "demo.Greeter/NoSuchMethod",
        }),
    )
    .await;

    let err = common::recv(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["error"]["code"], 5);
    assert_eq!(err["callId"], "unk1");
}
