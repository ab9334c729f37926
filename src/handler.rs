//! Handler capability: a callable returning an awaitable result

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::BusError;

/// A subscription handler: takes the merged publication args, returns an
/// awaitable result
pub trait Handler: Send + Sync + 'static {
    /// Invoke the handler with the merged args for one publication
    fn call(&self, args: Value) -> BoxFuture<'static, Result<(), BusError>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), BusError>> + Send + 'static,
{
    fn call(&self, args: Value) -> BoxFuture<'static, Result<(), BusError>> {
        Box::pin((self)(args))
    }
}
