//! End-to-end relay tests against a server bound on a random port

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use dropwire_core::{ClientSignal, SdpPayload, ServerSignal};
use dropwire_relay::{RelayConfig, RelayHandle, RelayServer};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn start_relay() -> RelayHandle {
    start_relay_with_ttl(600).await
}

async fn start_relay_with_ttl(ttl_secs: u64) -> RelayHandle {
    let config = RelayConfig::new()
        .with_ws_addr("127.0.0.1:0")
        .with_http_addr("127.0.0.1:0")
        .with_token_ttl_secs(ttl_secs);
    RelayServer::new(config)
        .expect("valid config")
        .start()
        .await
        .expect("relay should start")
}

/// Connect a client and consume the `connected` acknowledgement
async fn connect_client(handle: &RelayHandle) -> WsClient {
    let (mut client, _) = connect_async(handle.ws_url())
        .await
        .expect("client should connect");

    let ack = next_signal(&mut client).await;
    assert!(matches!(ack, ServerSignal::Connected));

    client
}

async fn next_signal(client: &mut WsClient) -> ServerSignal {
    loop {
        let msg = timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for a signal")
            .expect("stream ended unexpectedly")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return ServerSignal::from_json(&text).expect("valid signal"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

async fn send_signal(client: &mut WsClient, signal: &ClientSignal) {
    client
        .send(Message::Text(signal.to_json().expect("serializable")))
        .await
        .expect("send should succeed");
}

fn sample_candidate(tag: &str) -> dropwire_core::CandidatePayload {
    dropwire_core::CandidatePayload {
        candidate: format!("candidate:{} 1 UDP 2122252543 192.168.1.5 44444 typ host", tag),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}

#[tokio::test]
async fn offer_is_echoed_to_its_sender_only() {
    let handle = start_relay().await;
    let mut alice = connect_client(&handle).await;
    let mut bob = connect_client(&handle).await;

    send_signal(
        &mut alice,
        &ClientSignal::Offer {
            sdp: SdpPayload::offer("v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\n"),
        },
    )
    .await;

    match next_signal(&mut alice).await {
        ServerSignal::OfferCreated { sdp } => assert!(sdp.is_offer()),
        other => panic!("expected offer-created, got {:?}", other),
    }

    // Bob must see nothing: probe by having him trigger his own echo
    send_signal(
        &mut bob,
        &ClientSignal::Answer {
            sdp: SdpPayload::answer("v=0\r\n"),
        },
    )
    .await;
    assert!(matches!(
        next_signal(&mut bob).await,
        ServerSignal::AnswerCreated { .. }
    ));

    handle.shutdown().await;
}

#[tokio::test]
async fn candidates_reach_exactly_the_other_connections() {
    let handle = start_relay().await;
    let mut alice = connect_client(&handle).await;
    let mut bob = connect_client(&handle).await;
    let mut carol = connect_client(&handle).await;
    assert_eq!(handle.connection_count().await, 3);

    send_signal(
        &mut alice,
        &ClientSignal::IceCandidate {
            candidate: sample_candidate("42"),
        },
    )
    .await;

    for client in [&mut bob, &mut carol] {
        match next_signal(client).await {
            ServerSignal::IceCandidate { candidate } => {
                assert!(candidate.candidate.contains("candidate:42"));
            }
            other => panic!("expected ice-candidate, got {:?}", other),
        }
    }

    // Alice hears only her own next echo, not her candidate back
    send_signal(
        &mut alice,
        &ClientSignal::Offer {
            sdp: SdpPayload::offer("v=0\r\n"),
        },
    )
    .await;
    assert!(matches!(
        next_signal(&mut alice).await,
        ServerSignal::OfferCreated { .. }
    ));

    handle.shutdown().await;
}

#[tokio::test]
async fn malformed_message_gets_error_and_connection_survives() {
    let handle = start_relay().await;
    let mut client = connect_client(&handle).await;

    client
        .send(Message::Text("{{{ definitely not json".to_string()))
        .await
        .expect("send should succeed");

    assert!(matches!(
        next_signal(&mut client).await,
        ServerSignal::Error { .. }
    ));

    // Unknown type is also answered, also without dropping the connection
    client
        .send(Message::Text(r#"{"type":"make-coffee"}"#.to_string()))
        .await
        .expect("send should succeed");
    assert!(matches!(
        next_signal(&mut client).await,
        ServerSignal::Error { .. }
    ));

    // Still fully functional
    send_signal(
        &mut client,
        &ClientSignal::Offer {
            sdp: SdpPayload::offer("v=0\r\n"),
        },
    )
    .await;
    assert!(matches!(
        next_signal(&mut client).await,
        ServerSignal::OfferCreated { .. }
    ));

    handle.shutdown().await;
}

#[tokio::test]
async fn disconnect_removes_connection_from_broadcast_set() {
    let handle = start_relay().await;
    let mut alice = connect_client(&handle).await;
    let mut bob = connect_client(&handle).await;
    let mut carol = connect_client(&handle).await;

    carol.close(None).await.expect("close should succeed");

    // Wait for the relay to process the disconnect
    let mut remaining = 50;
    while handle.connection_count().await != 2 && remaining > 0 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        remaining -= 1;
    }
    assert_eq!(handle.connection_count().await, 2);

    send_signal(
        &mut alice,
        &ClientSignal::IceCandidate {
            candidate: sample_candidate("7"),
        },
    )
    .await;
    assert!(matches!(
        next_signal(&mut bob).await,
        ServerSignal::IceCandidate { .. }
    ));

    handle.shutdown().await;
}

#[tokio::test]
async fn token_store_reveal_consume_flow() {
    let handle = start_relay().await;
    let base = handle.http_url();
    let client = reqwest::Client::new();

    // Store an offer payload
    let response = client
        .post(format!("{}/store", base))
        .json(&serde_json::json!({ "token": "OFFER_SDP_X" }))
        .send()
        .await
        .expect("store request");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json body");
    let id = body["id"].as_str().expect("id field").to_string();

    // Reveal page renders and does not consume
    let page = client
        .get(format!("{}/t/{}", base, id))
        .send()
        .await
        .expect("reveal request");
    assert_eq!(page.status(), 200);
    let html = page.text().await.expect("page body");
    assert!(html.contains(&id));

    // First consume returns the payload
    let response = client
        .get(format!("{}/consume/{}", base, id))
        .send()
        .await
        .expect("consume request");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["token"], "OFFER_SDP_X");

    // Second consume reads as expired
    let response = client
        .get(format!("{}/consume/{}", base, id))
        .send()
        .await
        .expect("second consume request");
    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["error"], "expired");

    handle.shutdown().await;
}

#[tokio::test]
async fn store_without_token_is_rejected() {
    let handle = start_relay().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/store", handle.http_url()))
        .json(&serde_json::json!({}))
        .send()
        .await
        .expect("store request");
    assert_eq!(response.status(), 400);

    handle.shutdown().await;
}

#[tokio::test]
async fn expired_token_reads_as_missing_over_http() {
    let handle = start_relay_with_ttl(1).await;
    let base = handle.http_url();
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/store", base))
        .json(&serde_json::json!({ "token": "SHORTLIVED" }))
        .send()
        .await
        .expect("store request");
    let body: serde_json::Value = response.json().await.expect("json body");
    let id = body["id"].as_str().expect("id field").to_string();

    tokio::time::sleep(Duration::from_millis(1200)).await;

    let reveal = client
        .get(format!("{}/t/{}", base, id))
        .send()
        .await
        .expect("reveal request");
    assert_eq!(reveal.status(), 404);

    let consume = client
        .get(format!("{}/consume/{}", base, id))
        .send()
        .await
        .expect("consume request");
    assert_eq!(consume.status(), 404);

    handle.shutdown().await;
}
