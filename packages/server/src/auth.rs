//! Bearer-token authentication.
//!
//! The identity provider issues HS256-signed JWTs carrying the caller's
//! subject identifier (`sub`) and display name (`name`); this module
//! verifies them against the shared secret and exposes the result to
//! handlers as the [`Identity`] extractor. Reads are anonymous; every
//! mutation handler takes an `Identity`.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Claims required of every token. Extra claims are ignored.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    name: String,
    exp: u64,
}

/// Verification (and local issuing) keys derived from the shared secret.
pub struct AuthKeys {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl AuthKeys {
    #[must_use]
    pub fn from_secret(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        Self {
            decoding: DecodingKey::from_secret(secret),
            encoding: EncodingKey::from_secret(secret),
            validation,
        }
    }

    /// Verifies a bearer token and extracts the caller identity.
    ///
    /// # Errors
    ///
    /// `ApiError::Unauthorized` on any signature, expiry, or claim problem.
    pub fn verify(&self, token: &str) -> Result<Identity, ApiError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| ApiError::Unauthorized)?;
        Ok(Identity {
            user_id: data.claims.sub,
            display_name: data.claims.name,
        })
    }

    /// Issues a token signed with the shared secret.
    ///
    /// For local development and tests; deployed environments get tokens
    /// from the identity provider.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue(&self, sub: &str, name: &str, ttl: Duration) -> anyhow::Result<String> {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .saturating_add(ttl)
            .as_secs();
        let claims = Claims {
            sub: sub.to_string(),
            name: name.to_string(),
            exp,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }
}

/// The authenticated caller, as asserted by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Token `sub` claim: the opaque subject identifier.
    pub user_id: String,
    /// Token `name` claim.
    pub display_name: String,
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
    Arc<AuthKeys>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = Arc::<AuthKeys>::from_ref(state);
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;
        let token = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;
        keys.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn keys() -> Arc<AuthKeys> {
        Arc::new(AuthKeys::from_secret(b"test-secret"))
    }

    async fn extract(keys: &Arc<AuthKeys>, header: Option<&str>) -> Result<Identity, ApiError> {
        let mut builder = Request::builder().uri("/questions");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        Identity::from_request_parts(&mut parts, keys).await
    }

    #[tokio::test]
    async fn issued_token_round_trips() {
        let keys = keys();
        let token = keys.issue("user-1", "Ada", Duration::from_secs(60)).unwrap();

        let identity = extract(&keys, Some(&format!("Bearer {token}")))
            .await
            .unwrap();
        assert_eq!(identity.user_id, "user-1");
        assert_eq!(identity.display_name, "Ada");
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let result = extract(&keys(), None).await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_unauthorized() {
        let result = extract(&keys(), Some("Basic dXNlcjpwdw==")).await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[tokio::test]
    async fn wrong_secret_is_unauthorized() {
        let other = AuthKeys::from_secret(b"other-secret");
        let token = other.issue("user-1", "Ada", Duration::from_secs(60)).unwrap();

        let result = extract(&keys(), Some(&format!("Bearer {token}"))).await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[tokio::test]
    async fn expired_token_is_unauthorized() {
        let keys = keys();
        // Already-expired claim; jsonwebtoken's default leeway is 60s, so
        // back-date well past it.
        let claims = Claims {
            sub: "user-1".to_string(),
            name: "Ada".to_string(),
            exp: 1_000,
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();

        let result = extract(&keys, Some(&format!("Bearer {token}"))).await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }
}
