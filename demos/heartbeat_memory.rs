//! CSMS and charging station over the in-memory transport.
//!
//! The station boots, sends a few heartbeats, and the CSMS starts a
//! transaction on it while those are in flight: both sides issue CALLs over
//! the same link and every answer finds its caller.
//!
//! ```bash
//! RUST_LOG=ocpp_rpc=debug cargo run --example heartbeat_memory
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{
    BootNotification, BootNotificationRequest, BootNotificationResponse, Heartbeat,
    HeartbeatResponse, RegistrationStatus, RemoteStartTransaction, RemoteStartTransactionRequest,
    RemoteStartTransactionResponse, CSMS_ID,
};
use ocpp_rpc::{create_memory_transport_with_hub, EndpointId, MemoryHub, Result, RpcPeerBuilder};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const STATION_ID: &str = "CS-001";

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let hub = MemoryHub::new();

    let csms = RpcPeerBuilder::new(create_memory_transport_with_hub(CSMS_ID, hub.clone()).await?)
        .default_timeout(Duration::from_secs(5))
        .build()
        .await?;

    let station =
        RpcPeerBuilder::new(create_memory_transport_with_hub(STATION_ID, hub.clone()).await?)
            .default_timeout(Duration::from_secs(5))
            .retry_max_attempts(3)
            .build()
            .await?;

    // CSMS side
    csms.register::<BootNotification, _, _>(|source, request| async move {
        println!(
            "csms: {source} booted ({} {})",
            request.charge_point_vendor, request.charge_point_model
        );
        Ok(BootNotificationResponse {
            status: RegistrationStatus::Accepted,
            current_time: common::now(),
            interval: 1,
        })
    });
    csms.register::<Heartbeat, _, _>(|_, _| async {
        Ok(HeartbeatResponse {
            current_time: common::now(),
        })
    });

    // Station side
    station.register::<RemoteStartTransaction, _, _>(|_, request| async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        println!("station: starting on connector {} for {}", request.connector_id, request.id_tag);
        Ok(RemoteStartTransactionResponse {
            status: "Accepted".into(),
        })
    });

    let csms_id = EndpointId::from(CSMS_ID);
    let boot = station
        .call::<BootNotification>(
            &csms_id,
            &BootNotificationRequest {
                charge_point_vendor: "Acme".into(),
                charge_point_model: "X1".into(),
            },
            None,
        )
        .await?;
    println!("station: registration {:?}, heartbeat every {}s", boot.status, boot.interval);

    let remote_start = {
        let csms = csms.clone();
        tokio::spawn(async move {
            let request = RemoteStartTransactionRequest {
                connector_id: 1,
                id_tag: "ABC123".into(),
            };
            csms.call::<RemoteStartTransaction>(&EndpointId::from(STATION_ID), &request, None)
                .await
        })
    };

    for _ in 0..3 {
        let beat = station
            .call::<Heartbeat>(&csms_id, &common::HeartbeatRequest {}, None)
            .await?;
        println!("station: heartbeat acknowledged at {}", beat.current_time);
        tokio::time::sleep(Duration::from_secs(u64::from(boot.interval))).await;
    }

    let started = remote_start.await.expect("remote start task panicked")?;
    println!("csms: remote start {}", started.status);

    println!("\nstation stats: {:?}", station.correlator().stats());
    println!("csms stats:    {:?}", csms.correlator().stats());

    station.shutdown().await;
    csms.shutdown().await;
    Ok(())
}
