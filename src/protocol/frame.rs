//! OCPP-J frame codec.
//!
//! Every OCPP-J message is a JSON array whose first element is the message
//! type id and whose second element is the message id:
//!
//! ```text
//! [2, "<id>", "<action>", {payload}]                       CALL
//! [3, "<id>", {payload}]                                   CALLRESULT
//! [4, "<id>", "<code>", "<description>", {details}]        CALLERROR
//! [5, "<id>", "<code>", "<description>", {details}]        CALLRESULTERROR
//! [6, "<id>", "<action>", {payload}]                       SEND
//! ```
//!
//! This module replaces per-message parse/serialize code with one codec; the
//! payload stays an untyped [`Value`] until a typed [`Action`](crate::Action)
//! asks for it.

use bytes::Bytes;
use serde_json::{json, Value};
use thiserror::Error;

use crate::{ErrorCode, RequestId, Result};

/// OCPP-J message type id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Call,
    CallResult,
    CallError,
    CallResultError,
    Send,
}

impl MessageType {
    /// Map a wire type id to a message type.
    pub fn from_id(id: u64) -> Option<Self> {
        match id {
            2 => Some(MessageType::Call),
            3 => Some(MessageType::CallResult),
            4 => Some(MessageType::CallError),
            5 => Some(MessageType::CallResultError),
            6 => Some(MessageType::Send),
            _ => None,
        }
    }

    pub fn id(self) -> u64 {
        match self {
            MessageType::Call => 2,
            MessageType::CallResult => 3,
            MessageType::CallError => 4,
            MessageType::CallResultError => 5,
            MessageType::Send => 6,
        }
    }

    /// Whether frames of this type answer a CALL we sent.
    pub fn is_response(self) -> bool {
        matches!(self, MessageType::CallResult | MessageType::CallError)
    }
}

/// A request: CALL when a reply is expected, SEND when it is not.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub request_id: RequestId,
    pub action: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub request_id: RequestId,
    pub payload: Value,
}

/// Error body shared by CALLERROR and CALLRESULTERROR.
#[derive(Debug, Clone, PartialEq)]
pub struct CallError {
    pub request_id: RequestId,
    pub code: ErrorCode,
    pub description: String,
    pub details: Value,
}

impl CallError {
    pub fn new(request_id: RequestId, code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            request_id,
            code,
            description: description.into(),
            details: Value::Object(Default::default()),
        }
    }
}

/// A decoded OCPP-J frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Call(Call),
    CallResult(CallResult),
    CallError(CallError),
    CallResultError(CallError),
    Send(Call),
}

/// A frame that could not be decoded.
///
/// Whatever could be extracted before decoding failed is kept, so that a
/// malformed *response* can still be routed to the caller waiting on it.
#[derive(Debug, Clone, Error)]
#[error("malformed frame: {reason}")]
pub struct FrameError {
    pub message_type: Option<MessageType>,
    pub request_id: Option<RequestId>,
    pub reason: String,
}

impl FrameError {
    fn new(
        message_type: Option<MessageType>,
        request_id: Option<RequestId>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            message_type,
            request_id,
            reason: reason.into(),
        }
    }
}

impl Frame {
    /// Decode a raw frame.
    pub fn parse(raw: &[u8]) -> std::result::Result<Frame, FrameError> {
        // ---
        let value: Value = serde_json::from_slice(raw)
            .map_err(|e| FrameError::new(None, None, format!("invalid JSON: {e}")))?;

        let mut items = match value {
            Value::Array(items) => items,
            _ => return Err(FrameError::new(None, None, "frame is not a JSON array")),
        };

        let type_id = items
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| FrameError::new(None, None, "missing message type id"))?;

        let request_id = items.get(1).and_then(Value::as_str).map(RequestId::from);

        let message_type = match MessageType::from_id(type_id) {
            Some(t) => t,
            None => {
                return Err(FrameError::new(
                    None,
                    request_id,
                    format!("unsupported message type {type_id}"),
                ))
            }
        };

        let request_id = request_id
            .ok_or_else(|| FrameError::new(Some(message_type), None, "missing message id"))?;

        let fail =
            |reason: String| FrameError::new(Some(message_type), Some(request_id.clone()), reason);

        let expected_len = match message_type {
            MessageType::Call | MessageType::Send => 4,
            MessageType::CallResult => 3,
            MessageType::CallError | MessageType::CallResultError => 5,
        };
        if items.len() != expected_len {
            return Err(fail(format!(
                "expected {expected_len} elements, got {}",
                items.len()
            )));
        }

        match message_type {
            MessageType::Call | MessageType::Send => {
                let action = items[2]
                    .as_str()
                    .ok_or_else(|| fail("action is not a string".into()))?
                    .to_string();
                let payload = take_object(&mut items[3])
                    .ok_or_else(|| fail("payload is not an object".into()))?;

                let call = Call {
                    request_id: request_id.clone(),
                    action,
                    payload,
                };
                Ok(if message_type == MessageType::Call {
                    Frame::Call(call)
                } else {
                    Frame::Send(call)
                })
            }
            MessageType::CallResult => {
                let payload = take_object(&mut items[2])
                    .ok_or_else(|| fail("payload is not an object".into()))?;
                Ok(Frame::CallResult(CallResult {
                    request_id: request_id.clone(),
                    payload,
                }))
            }
            MessageType::CallError | MessageType::CallResultError => {
                let code = items[2]
                    .as_str()
                    .map(ErrorCode::from)
                    .ok_or_else(|| fail("error code is not a string".into()))?;
                let description = items[3]
                    .as_str()
                    .ok_or_else(|| fail("error description is not a string".into()))?
                    .to_string();
                let details = take_object(&mut items[4])
                    .ok_or_else(|| fail("error details is not an object".into()))?;

                let error = CallError {
                    request_id: request_id.clone(),
                    code,
                    description,
                    details,
                };
                Ok(if message_type == MessageType::CallError {
                    Frame::CallError(error)
                } else {
                    Frame::CallResultError(error)
                })
            }
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Frame::Call(_) => MessageType::Call,
            Frame::CallResult(_) => MessageType::CallResult,
            Frame::CallError(_) => MessageType::CallError,
            Frame::CallResultError(_) => MessageType::CallResultError,
            Frame::Send(_) => MessageType::Send,
        }
    }

    pub fn request_id(&self) -> &RequestId {
        match self {
            Frame::Call(call) | Frame::Send(call) => &call.request_id,
            Frame::CallResult(result) => &result.request_id,
            Frame::CallError(error) | Frame::CallResultError(error) => &error.request_id,
        }
    }

    /// Encode as the OCPP-J JSON array.
    pub fn to_value(&self) -> Value {
        // ---
        let type_id = self.message_type().id();
        match self {
            Frame::Call(call) | Frame::Send(call) => {
                json!([type_id, call.request_id, call.action, call.payload])
            }
            Frame::CallResult(result) => json!([type_id, result.request_id, result.payload]),
            Frame::CallError(error) | Frame::CallResultError(error) => json!([
                type_id,
                error.request_id,
                error.code,
                error.description,
                error.details
            ]),
        }
    }

    /// Encode to wire bytes.
    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(&self.to_value())?))
    }
}

fn take_object(value: &mut Value) -> Option<Value> {
    if value.is_object() {
        Some(value.take())
    } else {
        None
    }
}
