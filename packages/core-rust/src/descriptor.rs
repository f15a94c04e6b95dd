//! Immutable per-call metadata computed once when a call enters the server.

use std::time::{Duration, Instant};

/// Identity and start time of a single call.
#[derive(Debug, Clone)]
pub struct CallDescriptor {
    /// Fully-qualified service name, e.g. `example.v1.Greeter`.
    pub service: String,
    /// Method name, e.g. `SayHello`.
    pub method: String,
    /// The full method path as received, e.g. `/example.v1.Greeter/SayHello`.
    pub full_method: String,
    /// Moment the call entered the server.
    pub start: Instant,
}

impl CallDescriptor {
    /// Builds a descriptor from a `/<service>/<method>` path, stamping the
    /// start time with `Instant::now()`.
    ///
    /// Malformed paths are tolerated: without a leading slash or without a
    /// separating slash the service is empty and the method is the remainder.
    pub fn new(full_method: impl Into<String>) -> Self {
        let full_method = full_method.into();
        let (service, method) = split_full_method(&full_method);
        Self {
            service: service.to_string(),
            method: method.to_string(),
            full_method,
            start: Instant::now(),
        }
    }

    /// Time since the call entered the server.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Splits `/<service>/<method>` into its service and method parts.
#[must_use]
pub fn split_full_method(full_method: &str) -> (&str, &str) {
    let Some(path) = full_method.strip_prefix('/') else {
        return ("", full_method);
    };
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}
