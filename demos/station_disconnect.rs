//! What callers see when a charging station drops off mid-request.
//!
//! The CSMS sends several CALLs to a station that is slow to answer, then
//! the station's connection goes away. Every outstanding caller resolves
//! with `ConnectionClosed`; one that had a short timeout resolves with
//! `Timeout` first.
//!
//! ```bash
//! cargo run --example station_disconnect
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::CSMS_ID;
use ocpp_rpc::{
    create_memory_transport_with_hub, EndpointId, MemoryHub, Result, RpcError, RpcPeerBuilder,
};
use serde_json::{json, Value};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let hub = MemoryHub::new();
    let station_id = EndpointId::from("CS-042");

    let csms = RpcPeerBuilder::new(create_memory_transport_with_hub(CSMS_ID, hub.clone()).await?)
        .build()
        .await?;
    let station = create_memory_transport_with_hub(station_id.clone(), hub.clone()).await?;
    let station = RpcPeerBuilder::new(station).build().await?;

    // The station takes its time with everything.
    station.register_raw("GetConfiguration", |_, _| async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(json!({ "configurationKey": [] }))
    });

    let mut calls = Vec::new();
    for (n, timeout) in [(1, None), (2, None), (3, Some(Duration::from_millis(100)))] {
        let future = csms
            .send(&station_id, "GetConfiguration", json!({}), timeout)
            .await?;
        println!("csms: call #{n} sent as {}", future.request_id());
        calls.push((n, tokio::spawn(future)));
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    println!("csms: {} calls pending, dropping {station_id}", csms.correlator().pending_count());
    hub.disconnect(&station_id).await;

    for (n, call) in calls {
        let outcome: std::result::Result<Value, RpcError> =
            call.await.expect("caller task panicked");
        match outcome {
            Ok(payload) => println!("csms: call #{n} answered: {payload}"),
            Err(err) => println!("csms: call #{n} failed: {err}"),
        }
    }

    println!("\ncsms stats: {:?}", csms.correlator().stats());

    station.shutdown().await;
    csms.shutdown().await;
    Ok(())
}
