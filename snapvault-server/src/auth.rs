//! Bearer token authentication
//!
//! Tokens are HS256 JWTs issued by the external auth provider; the `sub`
//! claim is the user id every gallery row is scoped by.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use snapvault_common::config::AuthSettings;

use crate::{ApiError, AppState};

/// Claims read from the token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// Caller identity inserted into request extensions by [`require_auth`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
}

/// Verifies bearer tokens against the shared secret
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(settings: &AuthSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match &settings.jwt_audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        Self {
            key: DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthUser, ApiError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            debug!(error = ?e, "Rejected bearer token");
            ApiError::Unauthorized
        })?;

        if data.claims.sub.trim().is_empty() {
            return Err(ApiError::Unauthorized);
        }

        Ok(AuthUser { id: data.claims.sub })
    }
}

fn bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Middleware for protected routes
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req).ok_or(ApiError::Unauthorized)?;
    let user = state.auth.verify(token)?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn settings(audience: Option<&str>) -> AuthSettings {
        AuthSettings {
            jwt_secret: "test-secret".to_string(),
            jwt_audience: audience.map(str::to_string),
        }
    }

    fn token(secret: &str, sub: &str, aud: Option<&str>, exp_offset: i64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
            aud: aud.map(str::to_string),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_yields_user() {
        let verifier = TokenVerifier::new(&settings(None));
        let user = verifier.verify(&token("test-secret", "user-42", None, 3600)).unwrap();
        assert_eq!(user.id, "user-42");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let verifier = TokenVerifier::new(&settings(None));
        let result = verifier.verify(&token("other", "user-42", None, 3600));
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = TokenVerifier::new(&settings(None));
        let result = verifier.verify(&token("test-secret", "user-42", None, -3600));
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_audience_checked_when_configured() {
        let verifier = TokenVerifier::new(&settings(Some("authenticated")));
        assert!(verifier
            .verify(&token("test-secret", "u", Some("authenticated"), 3600))
            .is_ok());
        assert!(verifier
            .verify(&token("test-secret", "u", Some("anon"), 3600))
            .is_err());
    }

    #[test]
    fn test_empty_subject_rejected() {
        let verifier = TokenVerifier::new(&settings(None));
        assert!(verifier.verify(&token("test-secret", " ", None, 3600)).is_err());
    }
}
