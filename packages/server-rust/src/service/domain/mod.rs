//! Demo business services served through the call pipeline.
//!
//! Each service implements `RpcService` (name and auth override) and
//! `tower::Service` on `Arc<Self>` once per method request type.
//!
//! - [`greeter`]: `SayHello`, requires the session token
//! - [`account`]: `Login`, open, issues the session token
//! - [`health`]: `Check` and streaming `Watch`, open

pub mod account;
pub mod greeter;
pub mod health;

use std::sync::Arc;

pub use account::{Account, LoginReply, LoginRequest};
pub use greeter::{Greeter, HelloReply, HelloRequest};
pub use health::{Health, HealthCheckRequest, HealthCheckResponse, HealthConfig, ServingStatus};

use crate::service::registry::ServiceRegistry;

/// Handles to the registered demo services.
#[derive(Debug, Clone)]
pub struct DemoServices {
    pub greeter: Arc<Greeter>,
    pub account: Arc<Account>,
    pub health: Arc<Health>,
}

/// Registers every demo service.
pub fn register_all(registry: &ServiceRegistry, health: HealthConfig) -> DemoServices {
    DemoServices {
        greeter: registry.register(Greeter),
        account: registry.register(Account),
        health: registry.register(Health::new(health)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
