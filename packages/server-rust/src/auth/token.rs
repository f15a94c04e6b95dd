//! Static bearer-token authentication.

use async_trait::async_trait;
use callguard_core::{Metadata, Status};
use subtle::ConstantTimeEq;

use super::{auth_from_metadata, AuthFunc, BEARER_SCHEME};
use crate::call::{CallState, Principal};

/// Accepts calls whose bearer credential equals a fixed token.
#[derive(Clone)]
pub struct StaticTokenAuth {
    token: String,
}

impl StaticTokenAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticTokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenAuth")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl AuthFunc for StaticTokenAuth {
    async fn authenticate(
        &self,
        state: CallState,
        metadata: &Metadata,
    ) -> Result<CallState, Status> {
        let credential = auth_from_metadata(metadata, BEARER_SCHEME)?;
        if bool::from(credential.as_bytes().ct_eq(self.token.as_bytes())) {
            Ok(state.with_principal(Principal::bearer(credential)))
        } else {
            Err(Status::unauthenticated("Unauthenticated"))
        }
    }
}

#[cfg(test)]
mod tests {
    use callguard_core::{Code, AUTHORIZATION_KEY};

    use super::*;

    async fn run(value: &str) -> Result<CallState, Status> {
        let md = Metadata::from_pairs([(AUTHORIZATION_KEY, value)]).unwrap();
        StaticTokenAuth::new("worldhello")
            .authenticate(CallState::new(), &md)
            .await
    }

    #[tokio::test]
    async fn matching_token_is_accepted() {
        let state = run("bearer worldhello").await.unwrap();
        let principal = state.require_principal().unwrap();
        assert_eq!(principal.token.as_deref(), Some("worldhello"));
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let err = run("bearer xxx").await.unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
        assert_eq!(err.message(), "Unauthenticated");
    }

    #[tokio::test]
    async fn prefix_of_token_is_rejected() {
        assert!(run("bearer world").await.is_err());
    }

    #[tokio::test]
    async fn wrong_scheme_reports_parser_error() {
        let err = run("basic worldhello").await.unwrap_err();
        assert_eq!(err.message(), "Request unauthenticated with bearer");
    }

    #[test]
    fn debug_hides_token() {
        let rendered = format!("{:?}", StaticTokenAuth::new("secret"));
        assert!(!rendered.contains("secret"));
    }
}
