//! Bearer JWT authentication (HS256).

use async_trait::async_trait;
use callguard_core::{Metadata, Status};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::{auth_from_metadata, AuthFunc, BEARER_SCHEME};
use crate::call::{CallState, Principal};

/// Claims read from an accepted token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject; becomes [`Principal::subject`].
    pub sub: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
}

/// Accepts calls carrying a valid, unexpired HS256 token signed with a
/// shared secret.
#[derive(Clone)]
pub struct JwtAuth {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuth {
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Additionally requires the `aud` claim to contain `audience`.
    #[must_use]
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.validation.set_audience(&[audience]);
        self
    }
}

impl std::fmt::Debug for JwtAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuth").finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthFunc for JwtAuth {
    async fn authenticate(
        &self,
        state: CallState,
        metadata: &Metadata,
    ) -> Result<CallState, Status> {
        let token = auth_from_metadata(metadata, BEARER_SCHEME)?;
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "jwt rejected");
            Status::unauthenticated("Unauthenticated")
        })?;
        Ok(state.with_principal(Principal::bearer(token).with_subject(data.claims.sub)))
    }
}
