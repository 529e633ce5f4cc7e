use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use crate::{Action, EndpointId, ErrorCode, Result, RpcError};

pub(super) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased async action handler.
///
/// Takes the sending endpoint and the raw JSON payload, and produces the
/// raw JSON response payload.
pub(super) trait HandlerFn: Send + Sync {
    fn call(&self, source: EndpointId, payload: Value) -> BoxFuture<'static, Result<Value>>;
}

/// Handler for a typed [`Action`].
pub(super) struct TypedHandler<A, F> {
    func: F,
    _phantom: PhantomData<fn(A)>,
}

impl<A, F> TypedHandler<A, F> {
    pub fn new(func: F) -> Self {
        Self {
            func,
            _phantom: PhantomData,
        }
    }
}

impl<A, F, Fut> HandlerFn for TypedHandler<A, F>
where
    A: Action,
    F: Fn(EndpointId, A::Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<A::Response>> + Send + 'static,
{
    fn call(&self, source: EndpointId, payload: Value) -> BoxFuture<'static, Result<Value>> {
        // ---
        let request: A::Request = match serde_json::from_value(payload) {
            Ok(request) => request,
            Err(err) => {
                let err = RpcError::application(
                    ErrorCode::FormatViolation,
                    format!("{} payload: {err}", A::NAME),
                );
                return Box::pin(async move { Err(err) });
            }
        };

        let fut = (self.func)(source, request);

        Box::pin(async move {
            let response = fut.await?;
            Ok(serde_json::to_value(response)?)
        })
    }
}

/// Handler working on raw JSON payloads.
pub(super) struct RawHandler<F> {
    func: F,
}

impl<F> RawHandler<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F, Fut> HandlerFn for RawHandler<F>
where
    F: Fn(EndpointId, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn call(&self, source: EndpointId, payload: Value) -> BoxFuture<'static, Result<Value>> {
        Box::pin((self.func)(source, payload))
    }
}
