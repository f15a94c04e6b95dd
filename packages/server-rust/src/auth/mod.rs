//! Authentication functions and the skip predicate consulted before them.
//!
//! - [`AuthFunc`]: decides whether a call may proceed, deriving its state
//! - [`SkipAuth`]: global predicate that bypasses authentication entirely
//! - [`token`]: static bearer-token check
//! - [`jwt`]: HS256 bearer JWT check

pub mod jwt;
pub mod token;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use callguard_core::{Metadata, Status, AUTHORIZATION_KEY};

use crate::call::{CallState, Principal};

pub use jwt::JwtAuth;
pub use token::StaticTokenAuth;

/// Scheme recognized by the built-in auth functions.
pub const BEARER_SCHEME: &str = "bearer";

// ---------------------------------------------------------------------------
// AuthFunc
// ---------------------------------------------------------------------------

/// Authentication decision for a single call.
///
/// Accepting returns the state handed to the rest of the chain (usually with
/// a [`Principal`] attached); rejecting returns the status the call ends with.
#[async_trait]
pub trait AuthFunc: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns `Unauthenticated` (or a more specific status) to reject the call.
    async fn authenticate(&self, state: CallState, metadata: &Metadata)
        -> Result<CallState, Status>;
}

/// Extracts the credential from `authorization: <scheme> <credential>`.
///
/// The scheme is compared ASCII case-insensitively.
///
/// # Errors
///
/// Returns `Unauthenticated` if the header is missing, malformed, or carries
/// a different scheme.
pub fn auth_from_metadata<'a>(
    metadata: &'a Metadata,
    expected_scheme: &str,
) -> Result<&'a str, Status> {
    let unauthenticated =
        || Status::unauthenticated(format!("Request unauthenticated with {expected_scheme}"));

    let value = metadata.get(AUTHORIZATION_KEY).ok_or_else(unauthenticated)?;
    let Some((scheme, credential)) = value.split_once(' ') else {
        return Err(Status::unauthenticated("Bad authorization string"));
    };
    if !scheme.eq_ignore_ascii_case(expected_scheme) {
        return Err(unauthenticated());
    }
    Ok(credential)
}

/// Rejects every call. The default when no auth function is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectAll;

#[async_trait]
impl AuthFunc for RejectAll {
    async fn authenticate(&self, _: CallState, _: &Metadata) -> Result<CallState, Status> {
        Err(Status::unauthenticated("Unauthenticated"))
    }
}

/// Admits every call with an anonymous principal.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl AuthFunc for AllowAll {
    async fn authenticate(&self, state: CallState, _: &Metadata) -> Result<CallState, Status> {
        Ok(state.with_principal(Principal::anonymous()))
    }
}

// ---------------------------------------------------------------------------
// SkipAuth
// ---------------------------------------------------------------------------

/// Global predicate over `(service, method)`; `true` bypasses authentication.
pub trait SkipAuth: Send + Sync + 'static {
    fn skip(&self, service: &str, method: &str) -> bool;
}

impl<F> SkipAuth for F
where
    F: Fn(&str, &str) -> bool + Send + Sync + 'static,
{
    fn skip(&self, service: &str, method: &str) -> bool {
        self(service, method)
    }
}

/// Skip predicate listing whole services and individual methods.
///
/// An empty list skips nothing.
#[derive(Debug, Clone, Default)]
pub struct SkipList {
    services: HashSet<String>,
    methods: HashMap<String, HashSet<String>>,
}

impl SkipList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips every method of `service`.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.services.insert(service.into());
        self
    }

    /// Skips `method` of `service` only.
    #[must_use]
    pub fn with_method(mut self, service: impl Into<String>, method: impl Into<String>) -> Self {
        self.methods
            .entry(service.into())
            .or_default()
            .insert(method.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.methods.is_empty()
    }
}

impl SkipAuth for SkipList {
    fn skip(&self, service: &str, method: &str) -> bool {
        self.services.contains(service)
            || self
                .methods
                .get(service)
                .is_some_and(|methods| methods.contains(method))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
