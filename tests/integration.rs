use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use ocpp_rpc::{
    //
    create_memory_transport_with_hub,
    CorrelatorObserver,
    EndpointId,
    ErrorCode,
    Frame,
    InboundEvent,
    MemoryHub,
    Outcome,
    RequestId,
    RequestInfo,
    Result,
    RpcError,
    RpcPeer,
    RpcPeerBuilder,
};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BootNotificationRequest {
    charge_point_vendor: String,
    charge_point_model: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BootNotificationResponse {
    status: String,
    current_time: String,
    interval: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct HeartbeatRequest {}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeartbeatResponse {
    current_time: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataTransferRequest {
    vendor_id: String,
    data: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct DataTransferResponse {
    status: String,
    data: u32,
}

ocpp_rpc::ocpp_action!(
    BootNotification,
    "BootNotification",
    BootNotificationRequest => BootNotificationResponse
);
ocpp_rpc::ocpp_action!(Heartbeat, "Heartbeat", HeartbeatRequest => HeartbeatResponse);
ocpp_rpc::ocpp_action!(
    DataTransfer,
    "DataTransfer",
    DataTransferRequest => DataTransferResponse
);

const NOW: &str = "2024-01-01T00:00:00Z";

/// A CSMS and one charging station on a private hub.
struct Link {
    hub: Arc<MemoryHub>,
    csms: RpcPeer,
    station: RpcPeer,
}

impl Link {
    // ---
    async fn new() -> Result<Self> {
        Self::with_station(|builder| builder).await
    }

    async fn with_station(
        configure: impl FnOnce(RpcPeerBuilder) -> RpcPeerBuilder,
    ) -> Result<Self> {
        // ---
        let hub = MemoryHub::new();

        let csms = create_memory_transport_with_hub("csms", hub.clone()).await?;
        let csms = RpcPeerBuilder::new(csms).build().await?;

        let station = create_memory_transport_with_hub("CS-001", hub.clone()).await?;
        let station = configure(RpcPeerBuilder::new(station)).build().await?;

        Ok(Self { hub, csms, station })
    }

    fn csms_id() -> EndpointId {
        EndpointId::from("csms")
    }

    fn station_id() -> EndpointId {
        EndpointId::from("CS-001")
    }

    async fn shutdown(self) {
        self.station.shutdown().await;
        self.csms.shutdown().await;
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_typed_call_round_trip() -> Result<()> {
    // ---
    init_logging();
    let link = Link::new().await?;

    link.csms
        .register::<BootNotification, _, _>(|source, request| async move {
            assert_eq!(source.as_str(), "CS-001");
            assert_eq!(request.charge_point_vendor, "Acme");
            Ok(BootNotificationResponse {
                status: "Accepted".into(),
                current_time: NOW.into(),
                interval: 300,
            })
        });

    let request = BootNotificationRequest {
        charge_point_vendor: "Acme".into(),
        charge_point_model: "X1".into(),
    };
    let response = link
        .station
        .call::<BootNotification>(&Link::csms_id(), &request, None)
        .await?;

    assert_eq!(response.status, "Accepted");
    assert_eq!(response.interval, 300);
    assert_eq!(link.station.correlator().pending_count(), 0);

    let stats = link.station.correlator().stats();
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.responses, 1);

    link.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_calls_answered_out_of_order() -> Result<()> {
    // ---
    init_logging();
    let link = Link::new().await?;

    // Later requests are answered sooner.
    link.csms
        .register::<DataTransfer, _, _>(|_, request| async move {
            let delay = Duration::from_millis(u64::from(100 - request.data * 10));
            tokio::time::sleep(delay).await;
            Ok(DataTransferResponse {
                status: "Accepted".into(),
                data: request.data,
            })
        });

    let mut handles = Vec::new();
    for n in 0..10 {
        let station = link.station.clone();
        handles.push(tokio::spawn(async move {
            let request = DataTransferRequest {
                vendor_id: "acme".into(),
                data: n,
            };
            let response = station
                .call::<DataTransfer>(&Link::csms_id(), &request, None)
                .await?;
            Ok::<_, RpcError>((n, response.data))
        }));
    }

    for handle in handles {
        let (sent, received) = handle.await.expect("caller task panicked")?;
        assert_eq!(sent, received);
    }

    assert_eq!(link.station.correlator().stats().responses, 10);
    assert_eq!(link.station.correlator().stats().orphans, 0);

    link.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_answer_within_timeout_resolves_caller() -> Result<()> {
    // ---
    let link = Link::new().await?;

    link.station.register_raw("GetLocalListVersion", |_, _| async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok(json!({ "versionNumber": 7 }))
    });

    let start = Instant::now();
    let future = link
        .csms
        .correlator()
        .send_with_id(
            RequestId::from("abc"),
            &Link::station_id(),
            "GetLocalListVersion",
            json!({}),
            Some(Duration::from_secs(5)),
        )
        .await?;

    let payload = future.await?;
    assert_eq!(payload["versionNumber"], 7);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2), "{elapsed:?}");
    assert!(!link.csms.correlator().is_pending(&RequestId::from("abc")));
    assert_eq!(link.csms.correlator().pending_count(), 0);

    link.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_late_answer_after_timeout_is_orphan() -> Result<()> {
    // ---
    let link = Link::new().await?;

    link.station.register_raw("GetDiagnostics", |_, _| async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        Ok(json!({ "fileName": "diag.log" }))
    });

    let start = Instant::now();
    let future = link
        .csms
        .correlator()
        .send_with_id(
            RequestId::from("xyz"),
            &Link::station_id(),
            "GetDiagnostics",
            json!({}),
            Some(Duration::from_secs(2)),
        )
        .await?;

    match future.await {
        Err(RpcError::Timeout { request_id, after }) => {
            assert_eq!(request_id.as_str(), "xyz");
            assert_eq!(after, Duration::from_secs(2));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3), "{elapsed:?}");

    // The station answers at t=3s; nobody is waiting any more.
    tokio::time::sleep(Duration::from_secs(2)).await;

    let stats = link.csms.correlator().stats();
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.orphans, 1);
    assert_eq!(stats.responses, 0);

    link.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_unknown_action_gets_not_implemented() -> Result<()> {
    // ---
    let link = Link::new().await?;

    let err = link
        .station
        .call::<Heartbeat>(&Link::csms_id(), &HeartbeatRequest {}, None)
        .await
        .unwrap_err();

    match err {
        RpcError::Application { code, .. } => assert_eq!(code, ErrorCode::NotImplemented),
        other => panic!("expected CALLERROR, got {other:?}"),
    }
    assert_eq!(link.station.correlator().stats().call_errors, 1);

    link.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_handler_error_code_reaches_caller() -> Result<()> {
    // ---
    let link = Link::new().await?;

    link.station.register_raw("UnlockConnector", |_, payload: Value| async move {
        if payload["connectorId"] == 0 {
            return Err(RpcError::application(
                ErrorCode::PropertyConstraintViolation,
                "connectorId must be positive",
            ));
        }
        Ok(json!({ "status": "Unlocked" }))
    });

    let future = link
        .csms
        .send(&Link::station_id(), "UnlockConnector", json!({ "connectorId": 0 }), None)
        .await?;

    match future.await {
        Err(RpcError::Application { code, description, .. }) => {
            assert_eq!(code, ErrorCode::PropertyConstraintViolation);
            assert_eq!(description, "connectorId must be positive");
        }
        other => panic!("expected CALLERROR, got {other:?}"),
    }

    let ok = link
        .csms
        .send(&Link::station_id(), "UnlockConnector", json!({ "connectorId": 1 }), None)
        .await?
        .await?;
    assert_eq!(ok["status"], "Unlocked");

    link.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_disconnect_closes_every_pending_call() -> Result<()> {
    // ---
    let link = Link::new().await?;

    // The station never answers.
    link.station.register_raw("Reset", |_, _| async {
        std::future::pending::<()>().await;
        Ok(Value::Null)
    });

    let mut futures = Vec::new();
    for _ in 0..3 {
        futures.push(
            link.csms
                .send(&Link::station_id(), "Reset", json!({ "type": "Soft" }), None)
                .await?,
        );
    }
    assert_eq!(link.csms.correlator().pending_count(), 3);

    assert!(link.hub.disconnect(&Link::station_id()).await);

    for future in futures {
        assert!(matches!(future.await, Err(RpcError::ConnectionClosed)));
    }
    assert_eq!(link.csms.correlator().pending_count(), 0);
    assert_eq!(link.csms.correlator().stats().connection_closed, 3);

    // Further calls to the vanished station fail up front.
    let err = link
        .csms
        .send(&Link::station_id(), "Reset", json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Transport(_)));

    link.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_closes_own_pending_calls() -> Result<()> {
    // ---
    let link = Link::new().await?;

    link.csms.register_raw("Authorize", |_, _| async {
        std::future::pending::<()>().await;
        Ok(Value::Null)
    });

    let future = link
        .station
        .send(&Link::csms_id(), "Authorize", json!({ "idTag": "ABC123" }), None)
        .await?;

    link.station.shutdown().await;
    assert!(matches!(future.await, Err(RpcError::ConnectionClosed)));

    // A second shutdown is a no-op.
    link.station.shutdown().await;
    link.csms.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_send_frame_runs_handler_without_reply() -> Result<()> {
    // ---
    let link = Link::new().await?;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    link.csms.register_raw("NotifyPeriodicEventStream", move |source, payload| {
        let tx = tx.clone();
        async move {
            let _ = tx.send((source, payload));
            Ok(Value::Null)
        }
    });

    link.station
        .send_unconfirmed(&Link::csms_id(), "NotifyPeriodicEventStream", json!({ "id": 4 }))
        .await?;

    let (source, payload) = rx.recv().await.expect("handler not called");
    assert_eq!(source.as_str(), "CS-001");
    assert_eq!(payload["id"], 4);

    // Anything sent back would land on the station as an orphan.
    tokio::task::yield_now().await;
    assert_eq!(link.station.correlator().stats().orphans, 0);

    link.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_malformed_call_gets_format_violation() -> Result<()> {
    // ---
    let link = Link::new().await?;

    let raw = create_memory_transport_with_hub("raw", link.hub.clone()).await?;
    let mut inbox = raw.subscribe().await?;

    raw.send(&Link::csms_id(), bytes::Bytes::from_static(br#"[2,"m1",42,{}]"#))
        .await?;

    let reply = match inbox.inbox.recv().await {
        Some(InboundEvent::Frame { payload, .. }) => Frame::parse(&payload).unwrap(),
        other => panic!("expected a reply frame, got {other:?}"),
    };

    match reply {
        Frame::CallError(error) => {
            assert_eq!(error.request_id.as_str(), "m1");
            assert_eq!(error.code, ErrorCode::FormatViolation);
        }
        other => panic!("expected CALLERROR, got {other:?}"),
    }

    raw.close().await?;
    link.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_retry_sends_fresh_call_after_timeout() -> Result<()> {
    // ---
    let link = Link::with_station(|builder| {
        builder
            .default_timeout(Duration::from_secs(1))
            .retry_max_attempts(2)
            .retry_initial_delay(Duration::from_millis(100))
    })
    .await?;

    let attempts = Arc::new(AtomicU32::new(0));
    let seen = attempts.clone();
    link.csms.register::<Heartbeat, _, _>(move |_, _| {
        let attempt = seen.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if attempt == 1 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(HeartbeatResponse {
                current_time: NOW.into(),
            })
        }
    });

    let response = link
        .station
        .call::<Heartbeat>(&Link::csms_id(), &HeartbeatRequest {}, None)
        .await?;
    assert_eq!(response.current_time, NOW);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    let stats = link.station.correlator().stats();
    assert_eq!(stats.sent, 2);
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.responses, 1);

    link.shutdown().await;
    Ok(())
}

#[derive(Default)]
struct CountingObserver {
    sent: AtomicUsize,
    resolved: AtomicUsize,
    orphans: AtomicUsize,
}

impl CorrelatorObserver for CountingObserver {
    fn on_sent(&self, _info: &RequestInfo<'_>) {
        self.sent.fetch_add(1, Ordering::SeqCst);
    }

    fn on_resolved(&self, info: &RequestInfo<'_>, outcome: Outcome, _elapsed: Duration) {
        assert_eq!(info.action, "Heartbeat");
        assert_eq!(outcome, Outcome::Response);
        self.resolved.fetch_add(1, Ordering::SeqCst);
    }

    fn on_orphan(&self, _source: &EndpointId, _request_id: &RequestId) {
        self.orphans.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_custom_observer_sees_every_event() -> Result<()> {
    // ---
    let observer = Arc::new(CountingObserver::default());
    let hook = observer.clone();
    let link = Link::with_station(move |builder| builder.observer(hook)).await?;

    link.csms.register::<Heartbeat, _, _>(|_, _| async {
        Ok(HeartbeatResponse {
            current_time: NOW.into(),
        })
    });

    for _ in 0..3 {
        link.station
            .call::<Heartbeat>(&Link::csms_id(), &HeartbeatRequest {}, None)
            .await?;
    }

    assert_eq!(observer.sent.load(Ordering::SeqCst), 3);
    assert_eq!(observer.resolved.load(Ordering::SeqCst), 3);
    assert_eq!(observer.orphans.load(Ordering::SeqCst), 0);

    link.shutdown().await;
    Ok(())
}
