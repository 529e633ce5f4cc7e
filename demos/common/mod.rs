//! OCPP 1.6 message types shared by the demos.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};

pub const CSMS_ID: &str = "csms";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationRequest {
    // ---
    pub charge_point_vendor: String,
    pub charge_point_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationResponse {
    // ---
    pub status: RegistrationStatus,
    pub current_time: String,
    pub interval: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Accepted,
    Pending,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub current_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStartTransactionRequest {
    // ---
    pub connector_id: u32,
    pub id_tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStartTransactionResponse {
    pub status: String,
}

ocpp_rpc::ocpp_action!(
    pub BootNotification,
    "BootNotification",
    BootNotificationRequest => BootNotificationResponse
);
ocpp_rpc::ocpp_action!(pub Heartbeat, "Heartbeat", HeartbeatRequest => HeartbeatResponse);
ocpp_rpc::ocpp_action!(
    pub RemoteStartTransaction,
    "RemoteStartTransaction",
    RemoteStartTransactionRequest => RemoteStartTransactionResponse
);

/// Unix timestamp. A real CSMS sends RFC 3339 here.
pub fn now() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("@{secs}")
}
