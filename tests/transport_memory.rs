// tests/transport_memory.rs

use bytes::Bytes;
use tokio::time::{timeout, Duration};

use ocpp_rpc::{
    // ---
    create_memory_transport,
    create_memory_transport_with_hub,
    EndpointId,
    InboundEvent,
    MemoryHub,
    RpcError,
};

#[tokio::test]
async fn memory_subscribe_then_send_delivers() {
    // ---
    // Arrange
    // ---
    let hub = MemoryHub::new();
    let csms = create_memory_transport_with_hub("csms", hub.clone())
        .await
        .expect("failed to create memory transport");
    let station = create_memory_transport_with_hub("CS-001", hub.clone())
        .await
        .expect("failed to create memory transport");

    let mut inbox = csms.subscribe().await.expect("subscribe failed");
    let payload = Bytes::from_static(br#"[2,"1","Heartbeat",{}]"#);

    // ---
    // Act
    // ---
    station
        .send(&EndpointId::from("csms"), payload.clone())
        .await
        .expect("send failed");

    // ---
    // Assert
    // ---
    let received = timeout(Duration::from_millis(100), inbox.inbox.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("inbox closed unexpectedly");

    match received {
        InboundEvent::Frame { source, payload: got } => {
            assert_eq!(source.as_str(), "CS-001");
            assert_eq!(got, payload);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn memory_preserves_order_from_one_sender() {
    // ---
    let hub = MemoryHub::new();
    let csms = create_memory_transport_with_hub("csms", hub.clone()).await.unwrap();
    let station = create_memory_transport_with_hub("CS-001", hub.clone()).await.unwrap();

    let mut inbox = csms.subscribe().await.unwrap();
    let destination = EndpointId::from("csms");

    for n in 0..20u32 {
        station
            .send(&destination, Bytes::from(n.to_string()))
            .await
            .unwrap();
    }

    for n in 0..20u32 {
        match inbox.inbox.recv().await {
            Some(InboundEvent::Frame { payload, .. }) => {
                assert_eq!(payload, Bytes::from(n.to_string()));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}

#[tokio::test]
async fn memory_send_before_subscribe_fails() {
    // ---
    let hub = MemoryHub::new();
    let station = create_memory_transport_with_hub("CS-001", hub.clone()).await.unwrap();
    let _csms = create_memory_transport_with_hub("csms", hub.clone()).await.unwrap();

    let err = station
        .send(&EndpointId::from("csms"), Bytes::from_static(b"[]"))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Transport(_)));
}

#[tokio::test]
async fn memory_close_notifies_remaining_endpoints() {
    // ---
    let hub = MemoryHub::new();
    let csms = create_memory_transport_with_hub("csms", hub.clone()).await.unwrap();
    let station = create_memory_transport_with_hub("CS-001", hub.clone()).await.unwrap();

    let mut csms_inbox = csms.subscribe().await.unwrap();
    let mut station_inbox = station.subscribe().await.unwrap();

    station.close().await.unwrap();

    match timeout(Duration::from_millis(100), csms_inbox.inbox.recv()).await {
        Ok(Some(InboundEvent::Closed { peer })) => assert_eq!(peer.as_str(), "CS-001"),
        other => panic!("expected Closed, got {other:?}"),
    }
    assert!(station_inbox.inbox.recv().await.is_none());
    assert!(!hub.is_connected(&EndpointId::from("CS-001")).await);
}

#[tokio::test]
async fn memory_global_hub_links_transports() {
    // ---
    let a = create_memory_transport("global-a").await.unwrap();
    let b = create_memory_transport("global-b").await.unwrap();

    let mut inbox = b.subscribe().await.unwrap();
    a.send(&EndpointId::from("global-b"), Bytes::from_static(b"ping"))
        .await
        .unwrap();

    match inbox.inbox.recv().await {
        Some(InboundEvent::Frame { source, payload }) => {
            assert_eq!(source, *a.transport_id());
            assert_eq!(payload, Bytes::from_static(b"ping"));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    a.close().await.unwrap();
    b.close().await.unwrap();
}
