//! Inbound side: dispatch of CALL and SEND frames to action handlers.
//!
//! A CALL is always answered: with a CALLRESULT carrying the handler's
//! response, or with a CALLERROR when there is no handler, the payload does
//! not fit the action, or the handler fails. A SEND is never answered.

mod handler;

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    // ---
    log_debug,
    log_warn,
    Action,
    Call,
    CallError,
    CallResult,
    EndpointId,
    ErrorCode,
    Frame,
    FrameError,
    Result,
    RpcError,
};

use handler::{HandlerFn, RawHandler, TypedHandler};

type HandlerRegistry = Arc<RwLock<HashMap<String, Arc<dyn HandlerFn>>>>;

/// Registry of action handlers.
///
/// Cheap to clone; clones share the registry, so handlers registered after
/// the receive loop started are picked up.
#[derive(Clone, Default)]
pub struct CallRouter {
    handlers: HandlerRegistry,
}

fn read_ignore_poison<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_ignore_poison<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CallRouter {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for action `A`, replacing any earlier one.
    ///
    /// The handler receives the calling endpoint and the decoded request. An
    /// [`RpcError::Application`] from the handler is sent back with its own
    /// error code; any other error becomes `InternalError`.
    pub fn register<A, F, Fut>(&self, handler: F)
    where
        A: Action,
        F: Fn(EndpointId, A::Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<A::Response>> + Send + 'static,
    {
        // ---
        self.insert(A::NAME.to_string(), Arc::new(TypedHandler::<A, F>::new(handler)));
    }

    /// Register a handler on raw JSON payloads for `action`.
    pub fn register_raw<F, Fut>(&self, action: impl Into<String>, handler: F)
    where
        F: Fn(EndpointId, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        // ---
        self.insert(action.into(), Arc::new(RawHandler::new(handler)));
    }

    pub fn has_handler(&self, action: &str) -> bool {
        read_ignore_poison(&self.handlers).contains_key(action)
    }

    fn insert(&self, action: String, handler: Arc<dyn HandlerFn>) {
        // ---
        let mut handlers = write_ignore_poison(&self.handlers);
        if handlers.insert(action.clone(), handler).is_some() {
            log_debug!("replaced handler for {action}");
        }
    }

    fn lookup(&self, action: &str) -> Option<Arc<dyn HandlerFn>> {
        read_ignore_poison(&self.handlers).get(action).cloned()
    }

    /// Run the handler for an inbound CALL or SEND from `source`.
    ///
    /// Returns the frame to send back, if any: always `Some` for a CALL,
    /// always `None` for a SEND. Response frames are not handled here.
    pub async fn handle(&self, source: &EndpointId, frame: Frame) -> Option<Frame> {
        // ---
        match frame {
            Frame::Call(call) => Some(self.handle_call(source, call).await),
            Frame::Send(send) => {
                self.handle_send(source, send).await;
                None
            }
            other => {
                log_warn!(
                    "router ignoring {:?} {} from {source}",
                    other.message_type(),
                    other.request_id()
                );
                None
            }
        }
    }

    async fn handle_call(&self, source: &EndpointId, call: Call) -> Frame {
        // ---
        let Call {
            request_id,
            action,
            payload,
        } = call;

        let Some(handler) = self.lookup(&action) else {
            log_warn!("{source} called {action} ({request_id}): no handler");
            return Frame::CallError(CallError::new(
                request_id,
                ErrorCode::NotImplemented,
                format!("{action} is not implemented"),
            ));
        };

        match handler.call(source.clone(), payload).await {
            Ok(payload) => Frame::CallResult(CallResult {
                request_id,
                payload,
            }),
            Err(RpcError::Application {
                code,
                description,
                details,
            }) => Frame::CallError(CallError {
                request_id,
                code,
                description,
                details,
            }),
            Err(err) => {
                log_warn!("{action} handler failed for {source} ({request_id}): {err}");
                Frame::CallError(CallError::new(
                    request_id,
                    ErrorCode::InternalError,
                    err.to_string(),
                ))
            }
        }
    }

    async fn handle_send(&self, source: &EndpointId, send: Call) {
        // ---
        let Some(handler) = self.lookup(&send.action) else {
            log_debug!("{source} sent {} with no handler; dropped", send.action);
            return;
        };

        if let Err(err) = handler.call(source.clone(), send.payload).await {
            log_warn!("{} handler failed for {source}: {err}", send.action);
        }
    }

    /// CALLERROR answering a request-side frame that could not be decoded.
    ///
    /// `None` when the frame carried no usable id, or was not a CALL (SENDs
    /// are never answered).
    pub fn reject_malformed(err: &FrameError) -> Option<Frame> {
        // ---
        let request_id = err.request_id.clone()?;
        let code = match err.message_type {
            None => ErrorCode::MessageTypeNotSupported,
            Some(crate::MessageType::Call) => ErrorCode::FormatViolation,
            Some(_) => return None,
        };
        Some(Frame::CallError(CallError::new(request_id, code, err.reason.clone())))
    }
}
