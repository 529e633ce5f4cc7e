// src/macros.rs

//
// Crate-internal logging macros
//
// logging feature enabled  → tracing
// logging feature disabled → errors and warnings go to stderr, the rest is
//                            compiled out
//
// Orphan responses and dropped frames are reported at warn level, so they
// stay visible even in builds without tracing.
//

#![allow(unused_macros)]

// --------------------
// ERROR
// --------------------

#[cfg(feature = "logging")]
macro_rules! log_error {
    ($($arg:tt)*) => {
        tracing::error!($($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_error {
    ($($arg:tt)*) => {
        eprintln!("[ocpp-rpc] error: {}", format_args!($($arg)*))
    };
}

// --------------------
// WARN
// --------------------

#[cfg(feature = "logging")]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        tracing::warn!($($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        eprintln!("[ocpp-rpc] warn: {}", format_args!($($arg)*))
    };
}

// --------------------
// INFO
// --------------------

#[cfg(feature = "logging")]
macro_rules! log_info {
    ($($arg:tt)*) => {
        tracing::info!($($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        let _ = format_args!($($arg)*);
    }};
}

// --------------------
// DEBUG
// --------------------

#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        let _ = format_args!($($arg)*);
    }};
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;

/// Declare a typed OCPP action.
///
/// Binds an action name to its request and response payload types so that
/// callers and handlers never juggle raw JSON or action strings.
///
/// ```
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// pub struct HeartbeatRequest {}
///
/// #[derive(Debug, Serialize, Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// pub struct HeartbeatResponse {
///     pub current_time: String,
/// }
///
/// ocpp_rpc::ocpp_action!(pub Heartbeat, "Heartbeat", HeartbeatRequest => HeartbeatResponse);
///
/// use ocpp_rpc::Action;
/// assert_eq!(Heartbeat::NAME, "Heartbeat");
/// ```
#[macro_export]
macro_rules! ocpp_action {
    ($vis:vis $name:ident, $action:literal, $req:ty => $resp:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        $vis struct $name;

        impl $crate::Action for $name {
            const NAME: &'static str = $action;
            type Request = $req;
            type Response = $resp;
        }
    };
}
