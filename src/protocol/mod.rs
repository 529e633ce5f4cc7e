//! OCPP-J wire protocol: frame codec, error codes and typed actions.
mod action;
mod error_code;
mod frame;

pub use action::Action;
pub use error_code::ErrorCode;
pub use frame::{Call, CallError, CallResult, Frame, FrameError, MessageType};
