use serde::de::DeserializeOwned;
use serde::Serialize;

/// A typed OCPP action: the action name plus its request and response payloads.
///
/// Implement it by hand or with [`ocpp_action!`](crate::ocpp_action). The
/// correlator and router use it to encode requests, decode responses, and
/// dispatch inbound calls without per-message glue.
pub trait Action: Send + Sync + 'static {
    /// Action name as it appears in the CALL frame (e.g. `"Heartbeat"`).
    const NAME: &'static str;

    type Request: Serialize + DeserializeOwned + Send + Sync + 'static;
    type Response: Serialize + DeserializeOwned + Send + 'static;
}
