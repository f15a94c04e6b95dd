use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};

use callguard_core::Status;
use tower::Service;

use crate::auth::{AllowAll, AuthFunc};
use crate::call::UnaryCall;
use crate::service::registry::RpcService;

pub const SERVICE_NAME: &str = "example.v1.Account";

/// Token issued by `login` and accepted by the greeter.
pub const SESSION_TOKEN: &str = "worldhello";

/// How long an issued token stays valid.
pub const SESSION_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginReply {
    pub token: String,
    pub expires_at: SystemTime,
}

/// Issues session tokens. Open to unauthenticated callers.
#[derive(Debug, Clone, Default)]
pub struct Account;

impl Account {
    /// # Errors
    ///
    /// `Unauthenticated` for anything but the demo credentials.
    pub fn login(&self, request: &LoginRequest) -> Result<LoginReply, Status> {
        if request.username == "hello" && request.password == "world" {
            return Ok(LoginReply {
                token: SESSION_TOKEN.to_string(),
                expires_at: SystemTime::now() + SESSION_TTL,
            });
        }
        Err(Status::unauthenticated("Authentication failed"))
    }
}

impl RpcService for Account {
    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn auth_override(&self) -> Option<Arc<dyn AuthFunc>> {
        Some(Arc::new(AllowAll))
    }
}

impl Service<UnaryCall<LoginRequest>> for Arc<Account> {
    type Response = LoginReply;
    type Error = Status;
    type Future = Pin<Box<dyn Future<Output = Result<LoginReply, Status>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: UnaryCall<LoginRequest>) -> Self::Future {
        let account = Arc::clone(self);
        Box::pin(async move { account.login(call.message()) })
    }
}
