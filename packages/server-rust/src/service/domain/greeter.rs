use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use callguard_core::Status;
use tower::Service;

use super::account::SESSION_TOKEN;
use crate::auth::{AuthFunc, StaticTokenAuth};
use crate::call::{CallRequest, UnaryCall};
use crate::service::registry::RpcService;

pub const SERVICE_NAME: &str = "example.v1.Greeter";

#[derive(Debug, Clone, Default)]
pub struct HelloRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloReply {
    pub message: String,
}

/// Greets callers holding a session token.
#[derive(Debug, Clone, Default)]
pub struct Greeter;

impl Greeter {
    /// # Errors
    ///
    /// `InvalidArgument` for an empty name.
    pub fn say_hello(&self, call: &UnaryCall<HelloRequest>) -> Result<HelloReply, Status> {
        let name = &call.message().name;
        call.state()
            .logger()?
            .in_scope(|| tracing::info!(name = name.as_str(), "received hello"));
        if name.is_empty() {
            return Err(Status::invalid_argument("Name cannot be empty"));
        }
        Ok(HelloReply {
            message: format!("Hello {name}"),
        })
    }
}

impl RpcService for Greeter {
    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn auth_override(&self) -> Option<Arc<dyn AuthFunc>> {
        Some(Arc::new(StaticTokenAuth::new(SESSION_TOKEN)))
    }
}

impl Service<UnaryCall<HelloRequest>> for Arc<Greeter> {
    type Response = HelloReply;
    type Error = Status;
    type Future = Pin<Box<dyn Future<Output = Result<HelloReply, Status>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: UnaryCall<HelloRequest>) -> Self::Future {
        let greeter = Arc::clone(self);
        Box::pin(async move { greeter.say_hello(&call) })
    }
}
